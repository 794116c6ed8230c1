//! Key-set documents and the verification keys decoded from them.
//!
//! A key-set document is a JSON Web Key Set. The entry used for webhook
//! verification is the one with `kid` equal to `public`; failing that, the
//! first entry marked for signature use.

use std::fmt;

use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use thiserror::Error;

use crate::transport::TransportError;
use crate::types::KeyId;

/// `kid` of the key-set entry used for verification.
pub const PUBLIC_KEY_ID: &str = "public";

/// Errors that can occur while resolving a key identifier to a key.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The key identifier is not a usable absolute URL.
    #[error("invalid key id {0:?}")]
    InvalidKeyId(String),

    /// The key-set request failed before a response arrived.
    #[error("failed to fetch key set {key_id}: {source}")]
    Fetch {
        key_id: KeyId,
        #[source]
        source: TransportError,
    },

    /// The key-set endpoint answered with something other than 200.
    #[error("key set {key_id} returned HTTP {status}")]
    UnexpectedStatus {
        key_id: KeyId,
        status: http::StatusCode,
    },

    /// The document is not a valid JSON Web Key Set.
    #[error("malformed key set: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The set has no entry tagged for verification.
    #[error("no public key in key set")]
    NoPublicKey,

    /// The selected entry uses a key type or curve we cannot verify with.
    #[error("unsupported key: {0}")]
    Unsupported(String),
}

/// Signature algorithm bound to a verification key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// ECDSA over P-256 with SHA-256.
    EcdsaSha256,
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    RsaSha256,
}

impl KeyAlgorithm {
    /// Parses the `algorithm` parameter of a signature header.
    pub fn from_header_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ecdsa-sha256" => Some(KeyAlgorithm::EcdsaSha256),
            "rsa-sha256" => Some(KeyAlgorithm::RsaSha256),
            _ => None,
        }
    }

    /// The name used in signature headers.
    pub fn header_name(&self) -> &'static str {
        match self {
            KeyAlgorithm::EcdsaSha256 => "ecdsa-sha256",
            KeyAlgorithm::RsaSha256 => "rsa-sha256",
        }
    }

    pub(crate) fn jwt_algorithm(&self) -> Algorithm {
        match self {
            KeyAlgorithm::EcdsaSha256 => Algorithm::ES256,
            KeyAlgorithm::RsaSha256 => Algorithm::RS256,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_name())
    }
}

/// A decoded public key ready for signature verification.
#[derive(Clone)]
pub struct KeyMaterial {
    key: DecodingKey,
    algorithm: KeyAlgorithm,
}

impl KeyMaterial {
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Parses a key-set document and decodes its verification key.
pub fn decode_public_key(document: &[u8]) -> Result<KeyMaterial, KeyError> {
    let set: JwkSet = serde_json::from_slice(document)?;
    let jwk = select_public(&set).ok_or(KeyError::NoPublicKey)?;
    decode_jwk(jwk)
}

fn select_public(set: &JwkSet) -> Option<&Jwk> {
    set.keys
        .iter()
        .find(|k| k.common.key_id.as_deref() == Some(PUBLIC_KEY_ID))
        .or_else(|| {
            set.keys
                .iter()
                .find(|k| matches!(k.common.public_key_use, Some(PublicKeyUse::Signature)))
        })
}

fn decode_jwk(jwk: &Jwk) -> Result<KeyMaterial, KeyError> {
    let algorithm = match &jwk.algorithm {
        AlgorithmParameters::EllipticCurve(params) => match params.curve {
            EllipticCurve::P256 => KeyAlgorithm::EcdsaSha256,
            ref other => return Err(KeyError::Unsupported(format!("EC curve {other:?}"))),
        },
        AlgorithmParameters::RSA(_) => KeyAlgorithm::RsaSha256,
        // Never format these parameters: an octet key is a shared secret.
        _ => return Err(KeyError::Unsupported("non-EC/RSA key type".to_string())),
    };

    let key = DecodingKey::from_jwk(jwk).map_err(|e| KeyError::Unsupported(e.to_string()))?;
    Ok(KeyMaterial { key, algorithm })
}
