//! Query-plan IR, CQL protocol stitching, and uprobe lifecycle
//! management for an eBPF-based observability agent.
//!
//! ## Subsystems
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`ir`] | Mutable query-plan graph: node arena, type resolution, optimization rules, proto serialization |
//! | [`protocol`] | Wire framing and request/response stitching for captured socket traffic (CQL) |
//! | [`uprobe`] | Deploying and deduplicating user-space probes on traced processes, with dlopen-rescan backoff |
//! | [`presets`] | Loading the preset-query catalog |
//! | [`config`] | Hierarchical configuration (defaults, TOML file, env overrides) |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`error`] | The crate-wide [`error::CoreError`] threaded through all three subsystems |
//!
//! None of this executes a plan, compiles source query text, or
//! attaches a real BPF probe to a live kernel — see each module's
//! docs for its Non-goals.

pub mod config;
pub mod error;
pub mod ir;
pub mod logging;
pub mod presets;
pub mod protocol;
pub mod uprobe;

pub use config::Config;
pub use error::{CoreError, CoreResult};
