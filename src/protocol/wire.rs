//! Wire-level capture types shared across protocol parsers.
//!
//! A capture source (uprobe manager, pcap replay, test fixture) hands
//! raw bytes plus a direction and timestamp to a protocol's parser; the
//! parser turns that into a `Frame` (see [`crate::protocol::cql::parser`]).

use serde::{Deserialize, Serialize};

/// Which way data traveled on the wire, relative to the traced process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Send,
    Recv,
}

/// A chunk of captured bytes ready for protocol framing.
#[derive(Debug, Clone)]
pub struct RawData {
    pub direction: Direction,
    pub bytes: Vec<u8>,
    pub timestamp_ns: i64,
}

impl RawData {
    pub fn new(direction: Direction, bytes: Vec<u8>, timestamp_ns: i64) -> Self {
        RawData {
            direction,
            bytes,
            timestamp_ns,
        }
    }
}
