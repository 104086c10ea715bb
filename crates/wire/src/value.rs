//! Tagged runtime values
//!
//! Values cross the link as a type-prefixed body: one tag byte, then the
//! payload. Tags: 1 integer (i32 little-endian), 2 string (UTF-8),
//! 3 boolean (one byte), 4 byte array (raw storage bytes). The VM emits all
//! four; variable assignment accepts 1, 2, and 3.

use crate::error::{Error, Result};

/// Ceiling on an encoded value body, tag byte included
pub const MAX_VALUE_BYTES: usize = 500;

pub const TAG_INT: u8 = 1;
pub const TAG_STRING: u8 = 2;
pub const TAG_BOOL: u8 = 3;
pub const TAG_BYTES: u8 = 4;

/// A tagged runtime value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    Str(String),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Int(0)
    }
}

/// Encode a value into a type-prefixed body.
///
/// String and byte-array payloads are truncated to fit the body ceiling.
pub fn encode_value(value: &Value) -> Vec<u8> {
    let max_payload = MAX_VALUE_BYTES - 1;
    match value {
        Value::Int(n) => {
            let mut body = Vec::with_capacity(5);
            body.push(TAG_INT);
            body.extend_from_slice(&n.to_le_bytes());
            body
        }
        Value::Str(s) => {
            let bytes = s.as_bytes();
            let take = bytes.len().min(max_payload);
            let mut body = Vec::with_capacity(1 + take);
            body.push(TAG_STRING);
            body.extend_from_slice(&bytes[..take]);
            body
        }
        Value::Bool(b) => vec![TAG_BOOL, u8::from(*b)],
        Value::Bytes(bytes) => {
            let take = bytes.len().min(max_payload);
            let mut body = Vec::with_capacity(1 + take);
            body.push(TAG_BYTES);
            body.extend_from_slice(&bytes[..take]);
            body
        }
    }
}

/// Decode a type-prefixed body into a value.
///
/// Only the tags accepted for variable assignment decode (1, 2, 3); byte
/// arrays travel outbound only.
pub fn decode_value(body: &[u8]) -> Result<Value> {
    let (&tag, payload) = body.split_first().ok_or(Error::TruncatedValue)?;
    match tag {
        TAG_INT => {
            let bytes: [u8; 4] = payload
                .get(..4)
                .ok_or(Error::TruncatedValue)?
                .try_into()
                .expect("slice of length 4");
            Ok(Value::Int(i32::from_le_bytes(bytes)))
        }
        TAG_STRING => String::from_utf8(payload.to_vec())
            .map(Value::Str)
            .map_err(|_| Error::InvalidUtf8),
        TAG_BOOL => {
            let &flag = payload.first().ok_or(Error::TruncatedValue)?;
            Ok(Value::Bool(flag != 0))
        }
        other => Err(Error::UnknownValueTag(other)),
    }
}
