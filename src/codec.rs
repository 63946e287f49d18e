//! Value codecs for cached results.
//!
//! A [`Codec`] turns a call's result into the bytes stored under its cache
//! key and back. One codec instance is attached to each cached call site.
//!
//! [`JsonCodec`] frames every value with a one-byte [`SerializationFlag`]:
//! values that serialize to a bare JSON string are stored as raw UTF-8,
//! everything else as compact JSON. This keeps string entries readable by
//! other clients of the same store.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{CacheError, Result};

/// Encode/decode capability for one value type.
pub trait Codec<T>: Send + Sync {
    /// Encode a value for storage.
    fn serialize(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode a stored entry.
    ///
    /// Returns [`CacheError::Serialization`] for malformed or incompatible
    /// input.
    fn deserialize(&self, bytes: &[u8]) -> Result<T>;
}

/// Leading byte of a [`JsonCodec`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SerializationFlag {
    /// Raw UTF-8 string payload.
    String = 1,
    /// Compact JSON payload.
    Json = 2,
}

impl SerializationFlag {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for SerializationFlag {
    type Error = CacheError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(SerializationFlag::String),
            2 => Ok(SerializationFlag::Json),
            other => Err(CacheError::Serialization(format!(
                "unknown serialization format flag: {other}"
            ))),
        }
    }
}

/// serde_json codec with [`SerializationFlag`] framing.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<T> Codec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &T) -> Result<Vec<u8>> {
        encode_json(value)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T> {
        decode_json(bytes)
    }
}

/// Encode with [`JsonCodec`] framing.
pub(crate) fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    match serde_json::to_value(value)? {
        Value::String(s) => {
            let mut out = Vec::with_capacity(s.len() + 1);
            out.push(SerializationFlag::String.as_byte());
            out.extend_from_slice(s.as_bytes());
            Ok(out)
        }
        other => {
            let mut out = vec![SerializationFlag::Json.as_byte()];
            serde_json::to_writer(&mut out, &other)?;
            Ok(out)
        }
    }
}

/// Decode an entry written with [`JsonCodec`] framing.
pub(crate) fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (&flag, payload) = bytes
        .split_first()
        .ok_or_else(|| CacheError::Serialization("empty cache entry".to_string()))?;
    match SerializationFlag::try_from(flag)? {
        SerializationFlag::String => {
            let s = std::str::from_utf8(payload).map_err(|e| {
                CacheError::Serialization(format!("string entry is not UTF-8: {e}"))
            })?;
            Ok(serde_json::from_value(Value::String(s.to_string()))?)
        }
        SerializationFlag::Json => Ok(serde_json::from_slice(payload)?),
    }
}
