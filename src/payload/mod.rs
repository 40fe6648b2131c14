//! Versioned payload envelope.
//!
//! Values never cross a tier boundary as bare serialized bytes. Every payload
//! carries a fixed header (magic + format tag) so a reader can reject
//! incompatible or corrupt data instead of deserializing an arbitrary object
//! graph. A mismatched envelope read from the remote tier is treated as a
//! miss by the caller and the corrupt entry is deleted.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Envelope magic, bumped when the header layout changes.
pub const ENVELOPE_MAGIC: [u8; 4] = *b"TCK1";

/// Header length: magic plus one format-tag byte.
pub const ENVELOPE_HEADER_LEN: usize = ENVELOPE_MAGIC.len() + 1;

/// Wire format of the payload body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationFormat {
    /// UTF-8 JSON via `serde_json`.
    Json,
}

impl SerializationFormat {
    #[inline]
    pub fn tag(self) -> u8 {
        match self {
            SerializationFormat::Json => 0x01,
        }
    }

    #[inline]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(SerializationFormat::Json),
            _ => None,
        }
    }
}

impl Default for SerializationFormat {
    fn default() -> Self {
        SerializationFormat::Json
    }
}

/// Errors produced while encoding or decoding an envelope.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The value failed to serialize.
    #[error("value failed to serialize: {0}")]
    Encode(#[source] serde_json::Error),

    /// Payload shorter than the envelope header.
    #[error("payload truncated ({len} bytes, need at least {ENVELOPE_HEADER_LEN})")]
    Truncated { len: usize },

    /// Envelope magic did not match; produced by a different or newer writer.
    #[error("bad envelope magic")]
    BadMagic,

    /// Unknown format tag.
    #[error("unknown serialization format tag {tag:#04x}")]
    UnknownFormat { tag: u8 },

    /// The body failed to deserialize.
    #[error("payload body failed to deserialize: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Convenience result type for payload operations.
pub type PayloadResult<T> = Result<T, PayloadError>;

/// Serializes `value` into an enveloped payload.
pub fn encode<T: Serialize>(format: SerializationFormat, value: &T) -> PayloadResult<Vec<u8>> {
    let body = match format {
        SerializationFormat::Json => serde_json::to_vec(value).map_err(PayloadError::Encode)?,
    };

    let mut out = Vec::with_capacity(ENVELOPE_HEADER_LEN + body.len());
    out.extend_from_slice(&ENVELOPE_MAGIC);
    out.push(format.tag());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decodes an enveloped payload back into a value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> PayloadResult<T> {
    if bytes.len() < ENVELOPE_HEADER_LEN {
        return Err(PayloadError::Truncated { len: bytes.len() });
    }
    if bytes[..ENVELOPE_MAGIC.len()] != ENVELOPE_MAGIC {
        return Err(PayloadError::BadMagic);
    }

    let tag = bytes[ENVELOPE_MAGIC.len()];
    let format = SerializationFormat::from_tag(tag).ok_or(PayloadError::UnknownFormat { tag })?;

    let body = &bytes[ENVELOPE_HEADER_LEN..];
    match format {
        SerializationFormat::Json => serde_json::from_slice(body).map_err(PayloadError::Decode),
    }
}
