//! Property tests over sequences of public graph mutations: no
//! cycles, every expression node has at least one parent, clone
//! produces disjoint ids, and `prune`/`keep` are idempotent /
//! identity respectively.

use std::collections::HashSet;

use carnotstitch::ir::node::BuiltinFunction;
use carnotstitch::ir::{Graph, NodeId, NodeKind};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Map,
    Filter,
}

fn build_graph(steps: &[Step]) -> (Graph, NodeId) {
    let mut graph = Graph::new();
    let mut tip = graph.add_node(NodeKind::MemorySource {
        table: "t".to_string(),
        column_names: vec!["abc".to_string()],
    });

    for step in steps {
        match step {
            Step::Map => {
                let col = graph.add_node(NodeKind::Column { name: "abc".to_string() });
                let node = graph.add_node(NodeKind::Map {
                    col_exprs: vec![("abc".to_string(), col)],
                    keep_input_columns: false,
                });
                graph.add_edge(tip, node).unwrap();
                graph.optionally_clone_with_edge(node, col).unwrap();
                tip = node;
            }
            Step::Filter => {
                let col = graph.add_node(NodeKind::Column { name: "abc".to_string() });
                let lit = graph.add_node(NodeKind::Int(1));
                let expr = graph.add_node(NodeKind::Func {
                    name: BuiltinFunction::Equals,
                    args: vec![col, lit],
                });
                let node = graph.add_node(NodeKind::Filter { expr: Some(expr) });
                graph.add_edge(tip, node).unwrap();
                graph.optionally_clone_with_edge(node, expr).unwrap();
                tip = node;
            }
        }
    }

    let sink = graph.add_node(NodeKind::MemorySink { name: "out".to_string() });
    graph.add_edge(tip, sink).unwrap();
    (graph, sink)
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![Just(Step::Map), Just(Step::Filter)]
}

proptest! {
    /// No matter what chain of maps/filters is appended between source
    /// and sink, the resulting graph has no cycles (topological sort
    /// succeeds and covers every operator) and every expression node
    /// is owned by exactly one parent.
    #[test]
    fn mutation_sequences_preserve_core_invariants(steps in proptest::collection::vec(step_strategy(), 0..12)) {
        let (graph, _sink) = build_graph(&steps);

        let order = graph.topological_sort();
        prop_assert!(order.is_ok());
        prop_assert_eq!(order.unwrap().len(), graph.operator_ids().len());

        for id in graph.node_ids() {
            let node = graph.node(id).unwrap();
            if node.kind.is_expression() {
                prop_assert!(graph.expr_owner(id).is_some());
            }
        }
    }

    /// `deep_clone` shares no node id with the original, and preserves
    /// the node and structural-edge counts.
    #[test]
    fn clone_is_id_disjoint_and_structurally_equal(steps in proptest::collection::vec(step_strategy(), 0..8)) {
        let (graph, _sink) = build_graph(&steps);
        let clone = graph.deep_clone();

        let original_ids: HashSet<NodeId> = graph.node_ids().collect();
        let clone_ids: HashSet<NodeId> = clone.node_ids().collect();
        prop_assert!(original_ids.is_disjoint(&clone_ids));

        prop_assert_eq!(original_ids.len(), clone_ids.len());
        prop_assert_eq!(graph.operator_ids().len(), clone.operator_ids().len());
    }

    /// `prune` then `keep` round-trips: pruning a set and then keeping
    /// everything remaining is idempotent, and `keep(all)` changes
    /// nothing.
    #[test]
    fn keep_all_is_identity(steps in proptest::collection::vec(step_strategy(), 0..8)) {
        let (mut graph, _sink) = build_graph(&steps);
        let all: Vec<NodeId> = graph.node_ids().collect();
        let before = all.len();
        graph.keep(&all).unwrap();
        prop_assert_eq!(graph.node_ids().count(), before);
    }
}

#[test]
fn prune_then_recheck_is_idempotent() {
    let (mut graph, sink) = build_graph(&[Step::Map, Step::Filter, Step::Map]);
    let doomed = graph.parents(sink);
    graph.prune(&doomed).unwrap();
    let remaining_after_first: HashSet<NodeId> = graph.node_ids().collect();

    // Pruning the same (now absent) ids again must not error and must
    // not change the graph further.
    graph.prune(&doomed).unwrap();
    let remaining_after_second: HashSet<NodeId> = graph.node_ids().collect();
    assert_eq!(remaining_after_first, remaining_after_second);
}
