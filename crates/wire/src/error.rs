//! Wire errors

use thiserror::Error;

/// Wire result type
pub type Result<T> = std::result::Result<T, Error>;

/// Wire errors
///
/// The protocol contract says malformed traffic is handled silently, so these
/// never cross the dispatcher surface; they exist so decoding call sites can
/// distinguish the failure they are ignoring.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("unknown message type {0:#04x}")]
    UnknownMessageType(u8),

    #[error("unknown value tag {0}")]
    UnknownValueTag(u8),

    #[error("value payload truncated")]
    TruncatedValue,

    #[error("value string is not valid utf-8")]
    InvalidUtf8,
}
