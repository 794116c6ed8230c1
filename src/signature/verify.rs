//! Verification of signed inbound requests.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use http::{HeaderMap, Method};
use tracing::{debug, instrument};

use super::SignatureError;
use super::canonical::{REQUEST_TARGET, digest_matches, signing_string};
use super::params::SignatureParams;
use crate::keys::{KeyAlgorithm, KeyCache, KeyMaterial};
use crate::types::KeyId;

/// Header carrying the signature parameter block.
pub const SIGNATURE_HEADER: &str = "signature";

/// Default tolerated difference between the `Date` header and local time.
const DEFAULT_MAX_CLOCK_SKEW_SECS: u64 = 300;

/// Default inbound body limit (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Configuration for a [`SignatureVerifier`].
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Skip verification entirely. For trusted internal topologies only.
    pub skip_verification: bool,

    /// Headers every signature must cover.
    ///
    /// Default: `(request-target)` and `digest`.
    pub required_headers: Vec<String>,

    /// Maximum skew between a covered `Date` header and local time.
    ///
    /// `None` disables the check. Default: 5 minutes.
    pub max_clock_skew: Option<Duration>,

    /// URL prefixes a key identifier must start with. Empty accepts any.
    pub trusted_key_prefixes: Vec<String>,

    /// Largest request body buffered for verification.
    pub max_body_bytes: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl VerifierConfig {
    pub fn new() -> Self {
        VerifierConfig {
            skip_verification: false,
            required_headers: vec![REQUEST_TARGET.to_string(), "digest".to_string()],
            max_clock_skew: Some(Duration::from_secs(DEFAULT_MAX_CLOCK_SKEW_SECS)),
            trusted_key_prefixes: Vec::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_skip_verification(mut self, skip: bool) -> Self {
        self.skip_verification = skip;
        self
    }

    pub fn with_required_headers(mut self, headers: &[&str]) -> Self {
        self.required_headers = headers.iter().map(|h| h.to_ascii_lowercase()).collect();
        self
    }

    pub fn with_max_clock_skew(mut self, skew: Option<Duration>) -> Self {
        self.max_clock_skew = skew;
        self
    }

    pub fn with_trusted_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.trusted_key_prefixes.push(prefix.into());
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

/// Authenticates inbound requests against keys resolved by a [`KeyCache`].
pub struct SignatureVerifier {
    keys: Arc<KeyCache>,
    config: VerifierConfig,
}

impl SignatureVerifier {
    pub fn new(keys: Arc<KeyCache>, config: VerifierConfig) -> Self {
        SignatureVerifier { keys, config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn skips_verification(&self) -> bool {
        self.config.skip_verification
    }

    /// Verifies a request, returning the signer's key identifier.
    ///
    /// Checks run cheapest first; the key is only resolved once the header,
    /// covered-header list, digest and date have passed.
    #[instrument(skip_all, fields(method = %method, target = %path_and_query))]
    pub async fn verify(
        &self,
        method: &Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<KeyId, SignatureError> {
        let raw = headers
            .get(SIGNATURE_HEADER)
            .ok_or(SignatureError::MissingHeader)?
            .to_str()
            .map_err(|_| SignatureError::Malformed("non-ASCII header".to_string()))?;
        let params = SignatureParams::parse(raw)?;

        if !self.is_trusted(&params.key_id) {
            return Err(SignatureError::UntrustedKey(params.key_id));
        }

        for required in &self.config.required_headers {
            if !params.covers(required) {
                return Err(SignatureError::HeaderNotCovered(required.clone()));
            }
        }

        let signing_string = signing_string(method, path_and_query, headers, &params.headers)
            .map_err(SignatureError::MissingCoveredHeader)?;

        if let Some(digest) = headers.get("digest") {
            let digest = digest
                .to_str()
                .map_err(|_| SignatureError::Malformed("non-ASCII digest".to_string()))?;
            match digest_matches(digest, body) {
                Some(true) => {}
                Some(false) => return Err(SignatureError::DigestMismatch),
                None => return Err(SignatureError::UnsupportedDigest),
            }
        }

        if params.covers("date")
            && let Some(max_skew) = self.config.max_clock_skew
        {
            check_date(headers, max_skew)?;
        }

        let key = self.keys.get_key(&params.key_id).await?;
        let algorithm = resolve_algorithm(params.algorithm.as_deref(), &key)?;
        let signature = normalize_signature(&params.signature, algorithm)?;

        let valid = jsonwebtoken::crypto::verify(
            &signature,
            signing_string.as_bytes(),
            key.decoding_key(),
            algorithm.jwt_algorithm(),
        )
        .unwrap_or(false);

        if !valid {
            return Err(SignatureError::BadSignature);
        }

        debug!(key_id = %params.key_id, "Signature verified");
        Ok(params.key_id)
    }

    fn is_trusted(&self, key_id: &KeyId) -> bool {
        self.config.trusted_key_prefixes.is_empty()
            || self
                .config
                .trusted_key_prefixes
                .iter()
                .any(|prefix| key_id.as_str().starts_with(prefix.as_str()))
    }
}

/// `hs2019` (or no algorithm) defers to the key's own algorithm.
fn resolve_algorithm(
    declared: Option<&str>,
    key: &KeyMaterial,
) -> Result<KeyAlgorithm, SignatureError> {
    let Some(declared) = declared.filter(|d| !d.eq_ignore_ascii_case("hs2019")) else {
        return Ok(key.algorithm());
    };
    let algorithm = KeyAlgorithm::from_header_name(declared)
        .ok_or_else(|| SignatureError::UnsupportedAlgorithm(declared.to_string()))?;
    if algorithm != key.algorithm() {
        return Err(SignatureError::AlgorithmMismatch {
            declared: algorithm,
            key: key.algorithm(),
        });
    }
    Ok(algorithm)
}

fn check_date(headers: &HeaderMap, max_skew: Duration) -> Result<(), SignatureError> {
    let raw = headers
        .get("date")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| SignatureError::MissingCoveredHeader("date".to_string()))?;
    let date = DateTime::parse_from_rfc2822(raw)
        .map_err(|_| SignatureError::InvalidDate)?
        .with_timezone(&Utc);

    let skew = (Utc::now() - date).abs();
    match skew.to_std() {
        Ok(skew) if skew <= max_skew => Ok(()),
        _ => Err(SignatureError::StaleDate),
    }
}

/// Converts the wire signature (standard base64) into the base64url form
/// `jsonwebtoken` expects. ECDSA signatures in DER form are converted to
/// fixed-width `r || s`.
fn normalize_signature(value: &str, algorithm: KeyAlgorithm) -> Result<String, SignatureError> {
    let raw = STANDARD
        .decode(value)
        .or_else(|_| URL_SAFE_NO_PAD.decode(value.trim_end_matches('=')))
        .map_err(|_| SignatureError::InvalidEncoding)?;

    let raw = match algorithm {
        KeyAlgorithm::EcdsaSha256 if raw.len() != P256_FIXED_LEN => {
            der_to_fixed(&raw).ok_or(SignatureError::InvalidEncoding)?
        }
        _ => raw,
    };
    Ok(URL_SAFE_NO_PAD.encode(raw))
}

const P256_SCALAR_LEN: usize = 32;
const P256_FIXED_LEN: usize = 2 * P256_SCALAR_LEN;

/// Parses `SEQUENCE { INTEGER r, INTEGER s }` into 64 bytes.
pub(crate) fn der_to_fixed(der: &[u8]) -> Option<Vec<u8>> {
    let (tag, body, rest) = der_element(der)?;
    if tag != 0x30 || !rest.is_empty() {
        return None;
    }
    let (r_tag, r, body) = der_element(body)?;
    let (s_tag, s, tail) = der_element(body)?;
    if r_tag != 0x02 || s_tag != 0x02 || !tail.is_empty() {
        return None;
    }

    let mut out = Vec::with_capacity(P256_FIXED_LEN);
    for int in [r, s] {
        let int = strip_leading_zeros(int);
        if int.len() > P256_SCALAR_LEN {
            return None;
        }
        out.extend(std::iter::repeat_n(0u8, P256_SCALAR_LEN - int.len()));
        out.extend_from_slice(int);
    }
    Some(out)
}

/// Splits one short-or-long-form DER element into (tag, contents, remainder).
fn der_element(input: &[u8]) -> Option<(u8, &[u8], &[u8])> {
    let (&tag, input) = input.split_first()?;
    let (&len_byte, input) = input.split_first()?;
    let (len, input) = if len_byte < 0x80 {
        (len_byte as usize, input)
    } else {
        let count = (len_byte & 0x7f) as usize;
        if count == 0 || count > 2 || input.len() < count {
            return None;
        }
        let len = input[..count]
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | *b as usize);
        (len, &input[count..])
    };
    if input.len() < len {
        return None;
    }
    Some((tag, &input[..len], &input[len..]))
}

fn strip_leading_zeros(mut bytes: &[u8]) -> &[u8] {
    while let [0, rest @ ..] = bytes {
        bytes = rest;
    }
    bytes
}
