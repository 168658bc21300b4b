//! Network protocol support.
//!
//! ```text
//! captured TCP bytes -> [cql::parser] -> Frame -> [cql::stitcher] -> Record
//! ```
//!
//! Only CQL is implemented; the module is structured so a second
//! protocol (e.g. HTTP/2) would add its own submodule alongside `cql`
//! without touching the stitching algorithm shape.

pub mod cql;
pub mod wire;

pub const DEFAULT_CQL_PORT: u16 = 9042;
/// Frames larger than this are presumed corrupt framing rather than a
/// legitimately huge query/result, and are dropped.
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;
