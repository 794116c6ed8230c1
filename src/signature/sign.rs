//! Producing signed requests.
//!
//! Used by tests and by callers that emit callbacks themselves. The signer
//! fills in `Date` (when absent) and `Digest`, then signs the covered headers.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::Utc;
use http::header::{DATE, HeaderValue, InvalidHeaderValue};
use http::{HeaderMap, Method};
use jsonwebtoken::EncodingKey;
use thiserror::Error;

use super::canonical::{REQUEST_TARGET, body_digest, signing_string};
use super::params::SignatureParams;
use super::verify::SIGNATURE_HEADER;
use crate::keys::KeyAlgorithm;
use crate::types::KeyId;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("invalid signing key: {0}")]
    Key(#[from] jsonwebtoken::errors::Error),

    #[error("covered header {0} missing from request")]
    MissingHeader(String),

    #[error("invalid header value: {0}")]
    HeaderValue(#[from] InvalidHeaderValue),

    #[error("signature is not valid base64")]
    Encoding,
}

/// Signs outbound requests with a private key.
pub struct RequestSigner {
    key_id: KeyId,
    algorithm: KeyAlgorithm,
    key: EncodingKey,
    covered: Vec<String>,
}

impl RequestSigner {
    /// Signer for a PKCS#8 PEM-encoded P-256 private key.
    pub fn ecdsa_p256_pem(key_id: impl Into<KeyId>, pem: &[u8]) -> Result<Self, SignError> {
        Ok(Self::with_key(
            key_id.into(),
            KeyAlgorithm::EcdsaSha256,
            EncodingKey::from_ec_pem(pem)?,
        ))
    }

    /// Signer for a PEM-encoded RSA private key.
    pub fn rsa_pem(key_id: impl Into<KeyId>, pem: &[u8]) -> Result<Self, SignError> {
        Ok(Self::with_key(
            key_id.into(),
            KeyAlgorithm::RsaSha256,
            EncodingKey::from_rsa_pem(pem)?,
        ))
    }

    fn with_key(key_id: KeyId, algorithm: KeyAlgorithm, key: EncodingKey) -> Self {
        RequestSigner {
            key_id,
            algorithm,
            key,
            covered: [REQUEST_TARGET, "date", "digest"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Overrides the covered header list.
    pub fn with_covered_headers(mut self, headers: &[&str]) -> Self {
        self.covered = headers.iter().map(|h| h.to_ascii_lowercase()).collect();
        self
    }

    /// Adds `Date`, `Digest` and `Signature` headers for the request.
    pub fn sign(
        &self,
        method: &Method,
        path_and_query: &str,
        headers: &mut HeaderMap,
        body: &[u8],
    ) -> Result<(), SignError> {
        if !headers.contains_key(DATE) {
            let now = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
            headers.insert(DATE, HeaderValue::from_str(&now)?);
        }
        headers.insert("digest", HeaderValue::from_str(&body_digest(body))?);

        let message = signing_string(method, path_and_query, headers, &self.covered)
            .map_err(SignError::MissingHeader)?;
        let signature =
            jsonwebtoken::crypto::sign(message.as_bytes(), &self.key, self.algorithm.jwt_algorithm())?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SignError::Encoding)?;

        let params = SignatureParams {
            key_id: self.key_id.clone(),
            algorithm: Some(self.algorithm.header_name().to_string()),
            headers: self.covered.clone(),
            signature: STANDARD.encode(signature),
        };
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&params.to_header_value())?,
        );
        Ok(())
    }
}
