//! CQL native protocol opcodes, split into request/response op sets.
//!
//! Grounded on `stitcher.cc`'s `ReqOp`/`RespOp` switch statements —
//! the opcode space is shared on the wire, but a frame is only ever
//! meaningful as one or the other depending on which direction it
//! traveled.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Error,
    Startup,
    Ready,
    Authenticate,
    Options,
    Supported,
    Query,
    Result,
    Prepare,
    Execute,
    Register,
    Event,
    Batch,
    AuthChallenge,
    AuthResponse,
    AuthSuccess,
}

impl TryFrom<u8> for Opcode {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => Opcode::Error,
            0x01 => Opcode::Startup,
            0x02 => Opcode::Ready,
            0x03 => Opcode::Authenticate,
            0x05 => Opcode::Options,
            0x06 => Opcode::Supported,
            0x07 => Opcode::Query,
            0x08 => Opcode::Result,
            0x09 => Opcode::Prepare,
            0x0a => Opcode::Execute,
            0x0b => Opcode::Register,
            0x0c => Opcode::Event,
            0x0d => Opcode::Batch,
            0x0e => Opcode::AuthChallenge,
            0x0f => Opcode::AuthResponse,
            0x10 => Opcode::AuthSuccess,
            other => {
                return Err(CoreError::ParseError {
                    message: format!("unrecognized CQL opcode 0x{other:02x}"),
                })
            }
        })
    }
}

/// The request-direction opcodes `stitcher.cc`'s `ProcessReq` handles.
/// Anything else arriving as a request frame is unhandled, matching
/// the original's `default: error::Internal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReqOp {
    Startup,
    AuthResponse,
    Options,
    Query,
    Prepare,
    Execute,
    Batch,
    Register,
}

impl TryFrom<Opcode> for ReqOp {
    type Error = CoreError;

    fn try_from(op: Opcode) -> Result<Self, Self::Error> {
        Ok(match op {
            Opcode::Startup => ReqOp::Startup,
            Opcode::AuthResponse => ReqOp::AuthResponse,
            Opcode::Options => ReqOp::Options,
            Opcode::Query => ReqOp::Query,
            Opcode::Prepare => ReqOp::Prepare,
            Opcode::Execute => ReqOp::Execute,
            Opcode::Batch => ReqOp::Batch,
            Opcode::Register => ReqOp::Register,
            other => {
                return Err(CoreError::ParseError {
                    message: format!("unhandled request opcode {other:?}"),
                })
            }
        })
    }
}

/// The response-direction opcodes `stitcher.cc`'s `ProcessResp` handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RespOp {
    Error,
    Ready,
    Authenticate,
    Supported,
    Result,
    Event,
    AuthChallenge,
    AuthSuccess,
}

impl TryFrom<Opcode> for RespOp {
    type Error = CoreError;

    fn try_from(op: Opcode) -> Result<Self, Self::Error> {
        Ok(match op {
            Opcode::Error => RespOp::Error,
            Opcode::Ready => RespOp::Ready,
            Opcode::Authenticate => RespOp::Authenticate,
            Opcode::Supported => RespOp::Supported,
            Opcode::Result => RespOp::Result,
            Opcode::Event => RespOp::Event,
            Opcode::AuthChallenge => RespOp::AuthChallenge,
            Opcode::AuthSuccess => RespOp::AuthSuccess,
            other => {
                return Err(CoreError::ParseError {
                    message: format!("unhandled response opcode {other:?}"),
                })
            }
        })
    }
}
