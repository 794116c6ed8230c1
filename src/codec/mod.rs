//! Payload decoding for query results.
//!
//! Decoding selects behaviour from an explicit [`ContentType`] rather than by
//! inspecting the payload. Errors are terminal for the single message being
//! decoded; nothing at this layer retries.
//!
//! A result carrying only some of the requested datasets decodes normally.
//! Whether that counts as "done" is decided by the poll loop and correlator.

mod content_type;

pub use content_type::{ContentType, QUERY_RESULT_BINARY, QUERY_RESULT_JSON};

use prost::Message;
use thiserror::Error;

use crate::types::QueryResult;

/// Underlying failure of one encoding.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error(transparent)]
    Binary(#[from] prost::DecodeError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while decoding a result payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The content type is missing or is not a result encoding.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// The payload is truncated, corrupt, or syntactically invalid.
    #[error("failed to decode {encoding} payload: {source}")]
    DecodeFailed {
        encoding: ContentType,
        #[source]
        source: PayloadError,
    },
}

/// Resolves a raw `Content-Type` header into an encoding.
pub fn negotiate(content_type: Option<&str>) -> Result<ContentType, DecodeError> {
    let raw = content_type.unwrap_or_default();
    ContentType::parse(raw).ok_or_else(|| DecodeError::UnsupportedContentType(raw.to_string()))
}

/// Decodes a result body given its raw `Content-Type` header.
pub fn decode_with_header(
    content_type: Option<&str>,
    body: &[u8],
) -> Result<QueryResult, DecodeError> {
    decode(negotiate(content_type)?, body)
}

/// Decodes a result body in the given encoding.
pub fn decode(content_type: ContentType, body: &[u8]) -> Result<QueryResult, DecodeError> {
    match content_type {
        ContentType::Binary => {
            QueryResult::decode(body).map_err(|e| DecodeError::DecodeFailed {
                encoding: content_type,
                source: e.into(),
            })
        }
        ContentType::Json => {
            serde_json::from_slice(body).map_err(|e| DecodeError::DecodeFailed {
                encoding: content_type,
                source: e.into(),
            })
        }
    }
}

/// Encodes a result in the given encoding.
pub fn encode(content_type: ContentType, result: &QueryResult) -> Vec<u8> {
    match content_type {
        ContentType::Binary => result.encode_to_vec(),
        // Serializing plain data with string keys cannot fail.
        ContentType::Json => serde_json::to_vec(result).unwrap_or_default(),
    }
}
