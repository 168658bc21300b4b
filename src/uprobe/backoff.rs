//! Exponential backoff scheduler for dlopen rescans.
//!
//! Scanning every traced process on every deploy call to catch a late
//! `dlopen("libssl.so")` is prohibitive. Instead each upid gets a
//! modulus that grows exponentially once it's been considered for
//! rescan, and a global counter combined with the upid's own pid value
//! jitters which upids are due on any given call — otherwise every
//! upid with the same modulus would all come due on the same
//! iteration. Grounded on `uprobe_manager.cc`'s
//! `PIDsToRescanForUProbes`.

use std::collections::{HashMap, HashSet};

use crate::uprobe::upid::Upid;

const INITIAL_MODULUS: u32 = 1;
const MAXIMUM_MODULUS: u32 = 1 << 12;

#[derive(Debug)]
pub struct RescanBackoff {
    modulus: HashMap<Upid, u32>,
    rescan_counter: u64,
    backoff_factor: f64,
}

impl RescanBackoff {
    pub fn new(backoff_factor: f64) -> Self {
        RescanBackoff {
            modulus: HashMap::new(),
            rescan_counter: 0,
            backoff_factor,
        }
    }

    /// Compute which upids are due for a rescan this call.
    ///
    /// `upids_with_mmap` is every upid that got an mmap notification
    /// since the last call; `known_upids`/`new_upids` come from the
    /// same `ProcTracker` iteration, since only upids that are known
    /// and *not* new this round are rescan candidates (new upids get a
    /// full scan already).
    pub fn pids_to_rescan(
        &mut self,
        upids_with_mmap: &HashSet<Upid>,
        known_upids: &HashSet<Upid>,
        new_upids: &HashSet<Upid>,
    ) -> HashSet<Upid> {
        self.rescan_counter += 1;

        let mut upids_to_rescan = HashSet::new();
        for upid in upids_with_mmap {
            if !known_upids.contains(upid) || new_upids.contains(upid) {
                continue;
            }

            let modulus = self.modulus.entry(*upid).or_insert(INITIAL_MODULUS);
            let modulus_u64 = u64::from(*modulus);
            if (self.rescan_counter % modulus_u64) == (u64::from(upid.pid) % modulus_u64) {
                upids_to_rescan.insert(*upid);
                let next = (f64::from(*modulus) * self.backoff_factor) as u32;
                *modulus = next.min(MAXIMUM_MODULUS).max(INITIAL_MODULUS);
            }
        }

        upids_to_rescan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upid(pid: u32) -> Upid {
        Upid::new(1, pid, 0)
    }

    #[test]
    fn new_upids_are_never_eligible() {
        let mut backoff = RescanBackoff::new(2.0);
        let known = HashSet::from([upid(5)]);
        let new = HashSet::from([upid(5)]);
        let mmap = HashSet::from([upid(5)]);
        assert!(backoff.pids_to_rescan(&mmap, &known, &new).is_empty());
    }

    #[test]
    fn unknown_upids_are_never_eligible() {
        let mut backoff = RescanBackoff::new(2.0);
        let known = HashSet::new();
        let new = HashSet::new();
        let mmap = HashSet::from([upid(5)]);
        assert!(backoff.pids_to_rescan(&mmap, &known, &new).is_empty());
    }

    #[test]
    fn modulus_grows_after_each_eligible_rescan() {
        let mut backoff = RescanBackoff::new(2.0);
        let pid = upid(0); // pid % modulus always 0, simplest case to track.
        let known = HashSet::from([pid]);
        let new = HashSet::new();
        let mmap = HashSet::from([pid]);

        // counter=1: modulus starts at 1, 1 % 1 == 0 % 1 -> eligible, modulus -> 2.
        let first = backoff.pids_to_rescan(&mmap, &known, &new);
        assert!(first.contains(&pid));

        // counter=2: modulus=2, 2 % 2 == 0 -> eligible, modulus -> 4.
        let second = backoff.pids_to_rescan(&mmap, &known, &new);
        assert!(second.contains(&pid));

        // counter=3: modulus=4, 3 % 4 == 3 != 0 -> not eligible.
        let third = backoff.pids_to_rescan(&mmap, &known, &new);
        assert!(!third.contains(&pid));
    }
}
