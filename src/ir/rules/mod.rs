//! Optimization rules and the fixpoint driver.
//!
//! Grounded on the teacher's `optimizer/mod.rs` fixpoint shape (apply
//! all rules once per iteration, stop at a fixpoint or after
//! `max_iterations`), adapted to mutate the arena graph in place rather
//! than rebuild a value tree — a rule reports whether it changed
//! anything instead of the driver diffing before/after trees.

pub mod filter_pushdown;

use crate::error::CoreResult;
use crate::ir::compiler_state::CompilerState;
use crate::ir::graph::Graph;

/// A single optimization rule. `apply` runs once over the whole graph
/// and reports whether it changed anything, so the driver can detect
/// a fixpoint without comparing whole-graph snapshots.
pub trait Rule {
    fn name(&self) -> &'static str;
    fn apply(&self, graph: &mut Graph, cs: &CompilerState) -> CoreResult<bool>;
}

/// Runs the registered rules to fixpoint.
pub struct Optimizer {
    rules: Vec<Box<dyn Rule>>,
    max_iterations: usize,
}

impl Optimizer {
    pub fn new() -> Self {
        Optimizer {
            rules: vec![Box::new(filter_pushdown::FilterPushdownRule)],
            max_iterations: 10,
        }
    }

    pub fn with_max_iterations(max_iterations: usize) -> Self {
        Optimizer {
            max_iterations,
            ..Self::new()
        }
    }

    /// Apply every registered rule repeatedly until none report a
    /// change or `max_iterations` is reached.
    pub fn optimize(&self, graph: &mut Graph, cs: &CompilerState) -> CoreResult<()> {
        for iteration in 0..self.max_iterations {
            let mut changed = false;
            for rule in &self.rules {
                if rule.apply(graph, cs)? {
                    changed = true;
                    tracing::debug!(rule = rule.name(), iteration, "optimization rule changed the graph");
                }
            }
            if !changed {
                tracing::debug!(iteration, "optimizer reached fixpoint");
                break;
            }
        }
        Ok(())
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}
