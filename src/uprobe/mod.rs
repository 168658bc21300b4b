//! UProbe lifecycle management: deploying, deduplicating, and
//! backing off user-space probe attachment for traced processes.
//!
//! ```text
//! notify_mmap(upid) ---------------------------> upids_with_mmap
//!                                                      |
//! spawn_deploy(pids) -> deploy_uprobes (mutex) <-------+
//!                          |  proc_tracker.update
//!                          |  cleanup dead pids' symbol maps
//!                          |  OpenSSL probes (new + dlopen-rescan)
//!                          +  Go probes (TLS, HTTP/2)
//! ```

pub mod backoff;
pub mod collaborators;
pub mod manager;
pub mod proc_tracker;
pub mod symbols;
pub mod templates;
pub mod upid;

pub use manager::{DeploymentReport, UProbeManager};
pub use upid::Upid;
