//! Tracks which processes are new or have departed since the last
//! deploy call, feeding both the symaddr-map cleanup step and the
//! "only probe new processes" step of the deploy pipeline.
//!
//! Grounded on `uprobe_manager.cc`'s `proc_tracker_` usage in
//! `DeployUProbes` (`proc_tracker_.Update(pids)`, then
//! `.deleted_upids()`/`.new_upids()`).

use std::collections::HashSet;

use crate::uprobe::upid::Upid;

#[derive(Debug, Default)]
pub struct ProcTracker {
    upids: HashSet<Upid>,
    new_upids: HashSet<Upid>,
    deleted_upids: HashSet<Upid>,
}

impl ProcTracker {
    pub fn new() -> Self {
        ProcTracker::default()
    }

    /// Diff `pids` against the previously tracked set, repopulating
    /// `new_upids`/`deleted_upids` for this iteration and adopting
    /// `pids` as the current set.
    pub fn update(&mut self, pids: &HashSet<Upid>) {
        self.new_upids = pids.difference(&self.upids).copied().collect();
        self.deleted_upids = self.upids.difference(pids).copied().collect();
        self.upids = pids.clone();
    }

    pub fn upids(&self) -> &HashSet<Upid> {
        &self.upids
    }

    pub fn new_upids(&self) -> &HashSet<Upid> {
        &self.new_upids
    }

    pub fn deleted_upids(&self) -> &HashSet<Upid> {
        &self.deleted_upids
    }
}
