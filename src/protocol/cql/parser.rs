//! CQL native protocol framing: a 9-byte header (version, flags,
//! stream id, opcode, body length) followed by `length` bytes of body.
//!
//! Grounded on `stitcher.cc`'s `Frame` usage (`hdr.opcode`,
//! `hdr.stream`, `timestamp_ns`) — the header layout itself follows
//! the public CQL native protocol spec (v3+), which the original's
//! `frame_body_decoder.h` (not in this pack) implements in full; this
//! module extracts only the fields `stitcher.cc` actually reads.

use crate::error::{CoreError, CoreResult};
use crate::protocol::cql::opcode::{Opcode, ReqOp, RespOp};
use crate::protocol::wire::Direction;

const HEADER_LEN: usize = 9;

/// A single CQL frame, header plus body, carrying the capture
/// direction and timestamp, and a "consumed" flag the stitcher uses to
/// batch-drop matched requests from the front of the deque.
#[derive(Debug, Clone)]
pub struct Frame {
    pub version: u8,
    pub stream: i16,
    pub opcode: Opcode,
    pub body: Vec<u8>,
    pub direction: Direction,
    pub timestamp_ns: i64,
    pub consumed: bool,
}

/// Parse one frame from the front of `buf`, returning the frame and
/// the number of bytes consumed. `CoreError::NeedsMoreData` means
/// `buf` doesn't yet hold a complete frame — the caller should retry
/// once more bytes have arrived. `direction` is stamped onto the
/// returned frame and does not affect decoding; `find_frame_boundary`
/// is the one that uses it to validate a resync candidate.
pub fn parse_frame(direction: Direction, buf: &[u8], timestamp_ns: i64) -> CoreResult<(Frame, usize)> {
    if buf.len() < HEADER_LEN {
        return Err(CoreError::NeedsMoreData);
    }
    let version = buf[0] & 0x7f;
    let stream = i16::from_be_bytes([buf[2], buf[3]]);
    let opcode = Opcode::try_from(buf[4])?;
    let length = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) as usize;
    let total = HEADER_LEN + length;
    if buf.len() < total {
        return Err(CoreError::NeedsMoreData);
    }
    let body = buf[HEADER_LEN..total].to_vec();
    Ok((
        Frame {
            version,
            stream,
            opcode,
            body,
            direction,
            timestamp_ns,
            consumed: false,
        },
        total,
    ))
}

/// Scan forward from `start` for a byte offset that could plausibly be
/// the start of a frame traveling in `direction`: a byte at the opcode
/// position that decodes to an `Opcode` valid for that direction
/// (`ReqOp` for `Send`, `RespOp` or `Event` for `Recv`). Used to
/// resync after a corrupt prefix `parse_frame` couldn't decode.
/// Returns `buf.len()` if no plausible header is found before the end
/// of `buf`.
pub fn find_frame_boundary(direction: Direction, buf: &[u8], start: usize) -> usize {
    let mut offset = start;
    while offset + HEADER_LEN <= buf.len() {
        let opcode_byte = buf[offset + 4];
        if let Ok(opcode) = Opcode::try_from(opcode_byte) {
            let plausible = match direction {
                Direction::Send => ReqOp::try_from(opcode).is_ok(),
                Direction::Recv => RespOp::try_from(opcode).is_ok(),
            };
            if plausible {
                return offset;
            }
        }
        offset += 1;
    }
    buf.len()
}

/// A cursor over a frame body, exposing the `[int]`/`[short]`/
/// `[string]`/`[long string]`/`[bytes]`/`[string list]` primitives the
/// opcode handlers in `cql::stitcher` need.
pub struct BodyReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        BodyReader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(CoreError::ParseError {
                message: "CQL body truncated".into(),
            });
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    pub fn read_u8(&mut self) -> CoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_int(&mut self) -> CoreResult<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_short(&mut self) -> CoreResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_string(&mut self) -> CoreResult<String> {
        let len = self.read_short()? as usize;
        let b = self.take(len)?;
        String::from_utf8(b.to_vec()).map_err(|e| CoreError::ParseError {
            message: format!("invalid utf8 in CQL string: {e}"),
        })
    }

    pub fn read_long_string(&mut self) -> CoreResult<String> {
        let len = self.read_int()? as usize;
        let b = self.take(len)?;
        String::from_utf8(b.to_vec()).map_err(|e| CoreError::ParseError {
            message: format!("invalid utf8 in CQL long string: {e}"),
        })
    }

    pub fn read_bytes(&mut self) -> CoreResult<Vec<u8>> {
        let len = self.read_int()?;
        if len < 0 {
            return Ok(Vec::new());
        }
        Ok(self.take(len as usize)?.to_vec())
    }

    pub fn read_short_bytes(&mut self) -> CoreResult<Vec<u8>> {
        let len = self.read_short()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_string_list(&mut self) -> CoreResult<Vec<String>> {
        let n = self.read_short()?;
        (0..n).map(|_| self.read_string()).collect()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(opcode: u8, stream: i16, body: &[u8]) -> Vec<u8> {
        let mut buf = vec![0x04, 0x00];
        buf.extend_from_slice(&stream.to_be_bytes());
        buf.push(opcode);
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        buf.extend_from_slice(body);
        buf
    }

    #[test]
    fn parses_complete_frame() {
        let buf = header(0x07, 5, b"hello");
        let (frame, consumed) = parse_frame(Direction::Send, &buf, 1000).unwrap();
        assert_eq!(frame.stream, 5);
        assert_eq!(frame.opcode, Opcode::Query);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn reports_needs_more_data_on_short_buffer() {
        let buf = header(0x07, 5, b"hello");
        let err = parse_frame(Direction::Send, &buf[..5], 1000).unwrap_err();
        assert!(matches!(err, CoreError::NeedsMoreData));
    }

    #[test]
    fn finds_boundary_past_corrupt_prefix() {
        let mut buf = vec![0xff];
        buf.extend_from_slice(&header(0x02, 1, b""));
        let boundary = find_frame_boundary(Direction::Recv, &buf, 0);
        assert_eq!(boundary, 1);
        let (frame, _) = parse_frame(Direction::Recv, &buf[boundary..], 0).unwrap();
        assert_eq!(frame.opcode, Opcode::Ready);
    }

    #[test]
    fn boundary_is_buf_len_when_nothing_plausible() {
        let buf = vec![0xff; 20];
        assert_eq!(find_frame_boundary(Direction::Send, &buf, 0), buf.len());
    }

    #[test]
    fn body_reader_reads_long_string() {
        let mut body = 5i32.to_be_bytes().to_vec();
        body.extend_from_slice(b"hello");
        let mut r = BodyReader::new(&body);
        assert_eq!(r.read_long_string().unwrap(), "hello");
    }
}
