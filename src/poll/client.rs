//! Single-shot result fetches.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::{Request, StatusCode};
use thiserror::Error;
use tracing::{debug, trace};

use crate::codec::{self, ContentType, DecodeError};
use crate::transport::{self, TokenError, TokenProvider, Transport, TransportError};
use crate::types::{DataSetType, QueryResult, RequestId};

/// Errors from one fetch attempt. All of them are retried by the poll loop.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("failed to obtain access token: {0}")]
    Token(#[from] TokenError),

    #[error("invalid poll request: {0}")]
    InvalidRequest(String),

    #[error("poll request failed: {0}")]
    Transport(#[from] TransportError),

    /// Anything other than 200 or 202.
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(StatusCode),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// What one fetch learned about a request.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The result is complete; polling can stop.
    Complete(QueryResult),
    /// Still processing. Carries the partial result when one was returned.
    Pending(Option<QueryResult>),
}

/// Something that can be asked for the current state of a request.
#[async_trait]
pub trait ResultSource: Send + Sync {
    async fn fetch(&self, request_id: &RequestId) -> Result<FetchOutcome, PollError>;
}

/// Fetches results from the query API.
pub struct ResultClient {
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenProvider>,
    base_url: String,
    accept: ContentType,
    required: Vec<DataSetType>,
}

impl ResultClient {
    /// Creates a client for `{endpoint}/{api_version}`.
    ///
    /// An endpoint without a scheme gets `https://`.
    pub fn new(
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenProvider>,
        endpoint: &str,
        api_version: &str,
    ) -> Self {
        ResultClient {
            transport,
            tokens,
            base_url: base_url(endpoint, api_version),
            accept: ContentType::default(),
            required: Vec::new(),
        }
    }

    /// Selects the response encoding requested via `Accept`.
    pub fn with_accept(mut self, accept: ContentType) -> Self {
        self.accept = accept;
        self
    }

    /// Datasets that must be present before a result counts as complete.
    pub fn with_required_datasets(mut self, required: Vec<DataSetType>) -> Self {
        self.required = required;
        self
    }

    /// URL polled for a request.
    pub fn result_url(&self, request_id: &RequestId) -> String {
        format!(
            "{}/queries/url/{}",
            self.base_url,
            escape_path_segment(request_id.as_str())
        )
    }

    /// Classifies a decoded `200` body.
    fn classify(&self, result: QueryResult) -> FetchOutcome {
        if !result.is_complete() {
            return FetchOutcome::Pending(Some(result));
        }
        let missing = result.missing_datasets(&self.required);
        if !missing.is_empty() {
            debug!(
                request_id = %result.request_id,
                missing = ?missing,
                "Result flagged complete but lacks required datasets"
            );
            return FetchOutcome::Pending(Some(result));
        }
        FetchOutcome::Complete(result)
    }
}

#[async_trait]
impl ResultSource for ResultClient {
    async fn fetch(&self, request_id: &RequestId) -> Result<FetchOutcome, PollError> {
        let token = self.tokens.token().await?;
        let request = Request::get(self.result_url(request_id))
            .header(ACCEPT, self.accept.media_type())
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(USER_AGENT, transport::USER_AGENT)
            .body(Bytes::new())
            .map_err(|e| PollError::InvalidRequest(e.to_string()))?;

        let response = self.transport.send(request).await?;
        let status = response.status();
        trace!(request_id = %request_id, %status, "Poll response");

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.into_body();
        let decode = |body: &[u8]| -> Result<QueryResult, DecodeError> {
            let mut result = match content_type.as_deref() {
                Some(ct) => codec::decode_with_header(Some(ct), body)?,
                // Servers that omit Content-Type answer in the requested encoding.
                None => codec::decode(self.accept, body)?,
            };
            result.stamp_request_id(request_id);
            Ok(result)
        };

        match status {
            StatusCode::OK => Ok(self.classify(decode(&body)?)),
            StatusCode::ACCEPTED => {
                let partial = if body.is_empty() {
                    None
                } else {
                    decode(&body).ok()
                };
                Ok(FetchOutcome::Pending(partial))
            }
            other => Err(PollError::UnexpectedStatus(other)),
        }
    }
}

fn base_url(endpoint: &str, api_version: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    let endpoint = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    };
    let version = api_version.trim_matches('/');
    if version.is_empty() {
        endpoint
    } else {
        format!("{endpoint}/{version}")
    }
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
fn escape_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
