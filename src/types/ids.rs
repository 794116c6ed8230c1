//! Newtype wrappers for domain identifiers.
//!
//! Request IDs and key IDs are both plain strings on the wire. Wrapping them
//! keeps a key URL from being passed where a request ID is expected.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identifier the scoring service assigned to one submitted query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(s: impl Into<String>) -> Self {
        RequestId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId(s.to_string())
    }
}

/// URL of a signer's public key-set document.
///
/// Immutable once observed: the same URL always names the same key set, which
/// is what makes caching by key ID sound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(pub String);

impl KeyId {
    pub fn new(s: impl Into<String>) -> Self {
        KeyId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex-encoded SHA-256 of the key ID.
    ///
    /// Used to derive filesystem names; the raw URL is never used as a path.
    pub fn digest_hex(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for KeyId {
    fn from(s: String) -> Self {
        KeyId(s)
    }
}

impl From<&str> for KeyId {
    fn from(s: &str) -> Self {
        KeyId(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod request_id {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn serde_roundtrip(s in "[A-Za-z0-9_-]{1,64}") {
                let id = RequestId::new(&s);
                let json = serde_json::to_string(&id).unwrap();
                prop_assert_eq!(&json, &format!("\"{}\"", s));
                let parsed: RequestId = serde_json::from_str(&json).unwrap();
                prop_assert_eq!(id, parsed);
            }

            #[test]
            fn comparison_matches_underlying(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
                prop_assert_eq!(RequestId::new(&a) == RequestId::new(&b), a == b);
            }
        }

        #[test]
        fn empty_id_is_detected() {
            assert!(RequestId::new("").is_empty());
            assert!(!RequestId::new("abc").is_empty());
        }
    }

    mod key_id {
        use super::*;
        use proptest::prelude::*;

        #[test]
        fn digest_is_sha256_hex() {
            let id = KeyId::new("https://auth.example.com/keys/callback/public");
            let digest = id.digest_hex();
            assert_eq!(digest.len(), 64);
            assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        }

        #[test]
        fn digest_of_known_input() {
            // sha256("abc")
            assert_eq!(
                KeyId::new("abc").digest_hex(),
                "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
            );
        }

        proptest! {
            #[test]
            fn digest_is_deterministic(s in ".{0,100}") {
                prop_assert_eq!(KeyId::new(&s).digest_hex(), KeyId::new(&s).digest_hex());
            }

            #[test]
            fn distinct_ids_have_distinct_digests(a in ".{0,50}", b in ".{0,50}") {
                prop_assume!(a != b);
                prop_assert_ne!(KeyId::new(&a).digest_hex(), KeyId::new(&b).digest_hex());
            }
        }
    }
}
