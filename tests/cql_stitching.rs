//! End-to-end CQL capture replay through the public parser + stitcher
//! API, covering testable-properties scenarios 6 and 7.

use std::collections::VecDeque;

use carnotstitch::protocol::cql::{parse_frame, stitch_frames};
use carnotstitch::protocol::wire::Direction;

const OP_OPTIONS: u8 = 0x05;
const OP_READY: u8 = 0x02;
const OP_EVENT: u8 = 0x0c;

fn cql_string(s: &str) -> Vec<u8> {
    let mut out = (s.len() as u16).to_be_bytes().to_vec();
    out.extend_from_slice(s.as_bytes());
    out
}

fn frame_bytes(opcode: u8, stream: i16, body: &[u8]) -> Vec<u8> {
    let mut buf = vec![0x04, 0x00];
    buf.extend_from_slice(&stream.to_be_bytes());
    buf.push(opcode);
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(body);
    buf
}

/// Scenario 6: requests on streams 1, 2, 1 (stream 1 reused) followed
/// by out-of-order responses on streams 2, 1, 1. Exactly 3 records,
/// error_count 0, paired FIFO per stream.
#[test]
fn reused_stream_ids_pair_fifo() {
    let req_bytes = [
        frame_bytes(OP_OPTIONS, 1, &[]),
        frame_bytes(OP_OPTIONS, 2, &[]),
        frame_bytes(OP_OPTIONS, 1, &[]),
    ]
    .concat();
    let resp_bytes = [
        frame_bytes(OP_READY, 2, &[]),
        frame_bytes(OP_READY, 1, &[]),
        frame_bytes(OP_READY, 1, &[]),
    ]
    .concat();

    let mut req_frames = VecDeque::new();
    let mut offset = 0;
    while offset < req_bytes.len() {
        let (frame, consumed) =
            parse_frame(Direction::Send, &req_bytes[offset..], offset as i64).unwrap();
        offset += consumed;
        req_frames.push_back(frame);
    }

    let mut resp_frames = VecDeque::new();
    let mut offset = 0;
    while offset < resp_bytes.len() {
        let (frame, consumed) =
            parse_frame(Direction::Recv, &resp_bytes[offset..], 1000 + offset as i64).unwrap();
        offset += consumed;
        resp_frames.push_back(frame);
    }

    let result = stitch_frames(&mut req_frames, &mut resp_frames);
    assert_eq!(result.error_count, 0);
    assert_eq!(result.records.len(), 3);
}

/// Scenario 7: a single Event response with no matching request
/// synthesizes a Register request with latency 0 and contributes no
/// error.
#[test]
fn solitary_event_response_synthesizes_register_request() {
    let mut body = cql_string("STATUS_CHANGE");
    body.extend_from_slice(&cql_string("UP"));
    let raw = frame_bytes(OP_EVENT, -1, &body);

    let mut req_frames = VecDeque::new();
    let mut resp_frames = VecDeque::new();
    let (frame, _) = parse_frame(Direction::Recv, &raw, 500).unwrap();
    resp_frames.push_back(frame);

    let result = stitch_frames(&mut req_frames, &mut resp_frames);
    assert_eq!(result.error_count, 0);
    assert_eq!(result.records.len(), 1);
    let record = &result.records[0];
    assert_eq!(record.req.timestamp_ns, record.resp.timestamp_ns);
    assert_eq!(record.resp.msg, "STATUS_CHANGE UP");
}
