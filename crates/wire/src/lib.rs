//! Tessera wire protocol
//!
//! Framing and value encoding for the byte link between the VM and the IDE.
//! Everything here is pure byte-level code: no I/O, no runtime state.

pub mod error;
pub mod frame;
pub mod message;
pub mod value;

pub use error::{Error, Result};
pub use frame::{deframe, resync_from, Deframe, FrameKind};
pub use message::MessageType;
pub use value::{decode_value, encode_value, Value, MAX_VALUE_BYTES};
