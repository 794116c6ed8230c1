//! Signer key resolution for webhook verification.
//!
//! A webhook signature names its signer by key identifier, a URL serving a
//! JSON Web Key Set. [`KeyCache`] turns that identifier into a verification
//! key, memoizing in memory and optionally on disk.

pub mod cache;
pub mod disk;
pub mod keyset;

pub use cache::{DEFAULT_NAMESPACE, KeyCache, KeyCacheConfig};
pub use disk::DiskCache;
pub use keyset::{KeyAlgorithm, KeyError, KeyMaterial, PUBLIC_KEY_ID, decode_public_key};
