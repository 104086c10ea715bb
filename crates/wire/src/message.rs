//! Message type identifiers
//!
//! Stable numeric identifiers for every message on the IDE link. Values are
//! fixed across versions; all lie in the legal wire range `[0x01, 0x20]`.

use crate::error::Error;

/// Message types on the IDE link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    ChunkCode = 0x01,
    DeleteChunk = 0x02,
    StartChunk = 0x03,
    StopChunk = 0x04,
    StartAll = 0x05,
    StopAll = 0x06,
    GetVar = 0x07,
    SetVar = 0x08,
    DeleteVar = 0x09,
    GetVersion = 0x0A,
    GetAllCode = 0x0B,
    DeleteAllCode = 0x0C,
    SystemReset = 0x0D,
    TaskStarted = 0x0E,
    TaskDone = 0x0F,
    TaskReturnedValue = 0x10,
    TaskError = 0x11,
    OutputValue = 0x12,
    VarValue = 0x13,
    Version = 0x14,
    Ping = 0x15,
    Broadcast = 0x16,
    ChunkAttribute = 0x17,
    VarName = 0x18,
    Comment = 0x19,
    CommentPosition = 0x1A,
    DeleteComment = 0x1B,
}

impl MessageType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Error> {
        use MessageType::*;
        let message = match byte {
            0x01 => ChunkCode,
            0x02 => DeleteChunk,
            0x03 => StartChunk,
            0x04 => StopChunk,
            0x05 => StartAll,
            0x06 => StopAll,
            0x07 => GetVar,
            0x08 => SetVar,
            0x09 => DeleteVar,
            0x0A => GetVersion,
            0x0B => GetAllCode,
            0x0C => DeleteAllCode,
            0x0D => SystemReset,
            0x0E => TaskStarted,
            0x0F => TaskDone,
            0x10 => TaskReturnedValue,
            0x11 => TaskError,
            0x12 => OutputValue,
            0x13 => VarValue,
            0x14 => Version,
            0x15 => Ping,
            0x16 => Broadcast,
            0x17 => ChunkAttribute,
            0x18 => VarName,
            0x19 => Comment,
            0x1A => CommentPosition,
            0x1B => DeleteComment,
            other => return Err(Error::UnknownMessageType(other)),
        };
        Ok(message)
    }
}
