//! HTTP signature authentication for inbound callbacks.
//!
//! Callbacks carry a draft-cavage style `Signature` header naming the signer's
//! key identifier, the algorithm, the covered headers and the signature value.
//! The verifier resolves the key through [`KeyCache`](crate::keys::KeyCache),
//! rebuilds the signing string, checks the body digest, and verifies.
//!
//! Every failure maps to `401 Unauthorized` with a fixed body: nothing about
//! the key, the signature or the reason is echoed back to the caller.

pub mod canonical;
pub mod middleware;
pub mod params;
pub mod sign;
pub mod verify;


pub use canonical::{body_digest, signing_string};
pub use middleware::verify_signature;
pub use params::SignatureParams;
pub use sign::{RequestSigner, SignError};
pub use verify::{DEFAULT_MAX_BODY_BYTES, SIGNATURE_HEADER, SignatureVerifier, VerifierConfig};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::keys::{KeyAlgorithm, KeyError};
use crate::types::KeyId;

/// Body of every rejection.
const UNAUTHORIZED_BODY: &str = "Unauthorized";

/// Reasons an inbound request failed authentication.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("missing Signature header")]
    MissingHeader,

    #[error("malformed Signature header: {0}")]
    Malformed(String),

    #[error("Signature header missing {0} parameter")]
    MissingParameter(&'static str),

    /// The signature does not cover a header the configuration requires.
    #[error("signature does not cover required header {0}")]
    HeaderNotCovered(String),

    /// A covered header is absent from the request.
    #[error("covered header {0} missing from request")]
    MissingCoveredHeader(String),

    #[error("body digest mismatch")]
    DigestMismatch,

    #[error("unsupported Digest algorithm")]
    UnsupportedDigest,

    #[error("unparseable Date header")]
    InvalidDate,

    #[error("Date header outside allowed clock skew")]
    StaleDate,

    #[error("key id {0} is not trusted")]
    UntrustedKey(KeyId),

    #[error("unsupported signature algorithm {0:?}")]
    UnsupportedAlgorithm(String),

    #[error("signature algorithm {declared} does not match {key} key")]
    AlgorithmMismatch {
        declared: KeyAlgorithm,
        key: KeyAlgorithm,
    },

    #[error("signature is not valid base64 or DER")]
    InvalidEncoding,

    #[error("key resolution failed: {0}")]
    Key(#[from] KeyError),

    #[error("signature does not verify")]
    BadSignature,
}

impl IntoResponse for SignatureError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, UNAUTHORIZED_BODY).into_response()
    }
}
