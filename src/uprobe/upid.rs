//! Unique process identifier used across the uprobe manager.
//!
//! A bare OS pid is recycled by the kernel; pairing it with the
//! process's start time (in clock ticks since boot) and an agent/asid
//! scope makes it safe to use as a long-lived map key, mirroring
//! `md::UPID` in `uprobe_manager.cc`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Upid {
    pub asid: u32,
    pub pid: u32,
    pub start_time_ticks: u64,
}

impl Upid {
    pub fn new(asid: u32, pid: u32, start_time_ticks: u64) -> Self {
        Upid {
            asid,
            pid,
            start_time_ticks,
        }
    }
}

impl std::fmt::Display for Upid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.asid, self.pid, self.start_time_ticks)
    }
}
