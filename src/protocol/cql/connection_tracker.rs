//! Per-connection frame buffering ahead of stitching.
//!
//! `stitcher.cc` itself is stateless — it operates on whatever deques
//! the caller hands it. The connection-level buffering and stale-frame
//! eviction here is additive: the original's connection tracker (not
//! in this pack) owns this responsibility in the full Stirling
//! pipeline, so this module provides a minimal analog scoped to what
//! the CQL source connector needs (one tracker per TCP connection,
//! periodic eviction of requests that never got a response).

use std::collections::VecDeque;

use crate::protocol::cql::parser::Frame;
use crate::protocol::cql::stitcher::{stitch_frames, Record, RecordsWithErrorCount};

/// Buffers request/response frames for one connection and periodically
/// stitches + evicts them.
pub struct ConnectionTracker {
    req_frames: VecDeque<Frame>,
    resp_frames: VecDeque<Frame>,
    /// Requests older than this (relative to an externally supplied
    /// `now`) are dropped unmatched rather than held forever, per the
    /// config's `stitcher.max_request_age_ns`.
    max_request_age_ns: i64,
}

impl ConnectionTracker {
    pub fn new(max_request_age_ns: i64) -> Self {
        ConnectionTracker {
            req_frames: VecDeque::new(),
            resp_frames: VecDeque::new(),
            max_request_age_ns,
        }
    }

    pub fn push_request(&mut self, frame: Frame) {
        self.req_frames.push_back(frame);
    }

    pub fn push_response(&mut self, frame: Frame) {
        self.resp_frames.push_back(frame);
    }

    /// Stitch whatever responses are currently buffered against the
    /// buffered requests.
    pub fn stitch(&mut self) -> RecordsWithErrorCount<Record> {
        stitch_frames(&mut self.req_frames, &mut self.resp_frames)
    }

    /// Drop requests from the front of the deque that are either
    /// already `consumed` (stitched, just waiting for the prefix-pop
    /// that normally clears them) or older than `max_request_age_ns`
    /// relative to `now`. Stops at the first request that is neither,
    /// preserving `stitch_frames`'s front-only pop contract. Returns
    /// how many were evicted, so the source connector can fold it into
    /// its own error counters.
    pub fn evict_stale(&mut self, now: i64) -> usize {
        let mut evicted = 0;
        while let Some(front) = self.req_frames.front() {
            let stale = front.consumed || now - front.timestamp_ns > self.max_request_age_ns;
            if !stale {
                break;
            }
            self.req_frames.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn pending_request_count(&self) -> usize {
        self.req_frames.len()
    }
}
