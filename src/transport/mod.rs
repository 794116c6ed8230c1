//! Outbound HTTP and credential capabilities.
//!
//! The delivery core never builds an HTTP client itself. Key-set fetches and
//! result polls go through a [`Transport`], and bearer credentials come from a
//! [`TokenProvider`]. Production code uses [`ReqwestTransport`]; tests swap in
//! scripted fakes.

mod http_client;
mod token;

pub use http_client::ReqwestTransport;
pub use token::{StaticToken, TokenError, TokenProvider};

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use thiserror::Error;

/// User agent sent on every outbound request.
pub const USER_AGENT: &str = concat!("query-delivery/", env!("CARGO_PKG_VERSION"));

/// Errors from issuing an HTTP request.
///
/// A transport error means no HTTP response was obtained. Non-2xx responses
/// are not transport errors; callers inspect the status themselves.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be built or sent (bad URL, invalid header).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The server could not be reached.
    #[error("connection failed: {0}")]
    Connect(String),

    /// No response arrived within the transport's timeout.
    #[error("request timed out")]
    Timeout,

    /// Any other client-side failure, including body read errors.
    #[error("HTTP client error: {0}")]
    Client(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Issues one HTTP request and returns the fully buffered response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError>;
}
