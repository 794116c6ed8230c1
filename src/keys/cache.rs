//! Memoizing resolver from key identifiers to verification keys.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use http::header::{ACCEPT, USER_AGENT};
use http::{Request, StatusCode};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use super::disk::DiskCache;
use super::keyset::{KeyError, KeyMaterial, decode_public_key};
use crate::transport::{self, Transport};
use crate::types::KeyId;

/// Default namespace directory for cached key sets.
pub const DEFAULT_NAMESPACE: &str = "query-delivery";

/// Configuration for a [`KeyCache`].
#[derive(Debug, Clone)]
pub struct KeyCacheConfig {
    /// Root data directory. `None` keeps the cache in memory only.
    pub data_dir: Option<PathBuf>,

    /// Per-application subdirectory under `data_dir`.
    pub namespace: String,
}

impl Default for KeyCacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyCacheConfig {
    /// Memory-only cache in the default namespace.
    pub fn new() -> Self {
        KeyCacheConfig {
            data_dir: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// Resolves key identifiers to verification keys.
///
/// Lookup order is memory, then disk, then network. Misses are serialized per
/// key identifier, so N concurrent lookups of the same unseen key issue one
/// network fetch, while lookups of different keys proceed independently.
pub struct KeyCache {
    transport: Arc<dyn Transport>,
    disk: Option<DiskCache>,
    keys: RwLock<HashMap<KeyId, Arc<KeyMaterial>>>,
    /// One async lock per key currently being filled.
    in_flight: Mutex<HashMap<KeyId, Arc<tokio::sync::Mutex<()>>>>,
    fetches: AtomicU64,
}

impl KeyCache {
    pub fn new(transport: Arc<dyn Transport>, config: KeyCacheConfig) -> Self {
        let disk = config
            .data_dir
            .map(|dir| DiskCache::new(dir, &config.namespace));
        KeyCache {
            transport,
            disk,
            keys: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            fetches: AtomicU64::new(0),
        }
    }

    /// Returns the verification key for `key_id`.
    ///
    /// Network, status and decoding failures are returned as-is; nothing is
    /// retried here.
    #[instrument(skip(self), fields(key_id = %key_id))]
    pub async fn get_key(&self, key_id: &KeyId) -> Result<Arc<KeyMaterial>, KeyError> {
        if let Some(key) = self.cached(key_id) {
            return Ok(key);
        }

        // Declared before `_held` so the gate is released after the lock,
        // including when this future is dropped mid-fetch.
        let gate = InFlightGate::enter(self, key_id);
        let _held = gate.lock().await;
        self.fill(key_id).await
    }

    /// Number of network fetches issued so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Forgets a key in memory and on disk, forcing the next lookup to refetch.
    pub fn invalidate(&self, key_id: &KeyId) {
        self.keys.write().remove(key_id);
        if let Some(disk) = &self.disk
            && let Err(e) = disk.remove(key_id)
        {
            warn!(key_id = %key_id, error = %e, "Failed to remove cached key file");
        }
        info!(key_id = %key_id, "Invalidated cached key");
    }

    fn cached(&self, key_id: &KeyId) -> Option<Arc<KeyMaterial>> {
        self.keys.read().get(key_id).cloned()
    }

    /// Runs under the per-key gate.
    async fn fill(&self, key_id: &KeyId) -> Result<Arc<KeyMaterial>, KeyError> {
        if let Some(key) = self.cached(key_id) {
            debug!("Key populated by concurrent lookup");
            return Ok(key);
        }

        if let Some(key) = self.load_from_disk(key_id) {
            return Ok(self.remember(key_id, key));
        }

        let document = self.fetch(key_id).await?;
        let key = decode_public_key(&document)?;
        self.persist(key_id, &document);
        info!(algorithm = %key.algorithm(), "Fetched signing key");
        Ok(self.remember(key_id, key))
    }

    fn remember(&self, key_id: &KeyId, key: KeyMaterial) -> Arc<KeyMaterial> {
        let key = Arc::new(key);
        self.keys.write().insert(key_id.clone(), Arc::clone(&key));
        key
    }

    /// Any disk problem degrades to a network fetch.
    fn load_from_disk(&self, key_id: &KeyId) -> Option<KeyMaterial> {
        let disk = self.disk.as_ref()?;
        let document = match disk.load(key_id) {
            Ok(Some(document)) => document,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read cached key file, refetching");
                return None;
            }
        };

        match decode_public_key(&document) {
            Ok(key) => {
                debug!(path = %disk.path_for(key_id).display(), "Loaded key from disk");
                Some(key)
            }
            Err(e) => {
                warn!(error = %e, "Discarding corrupt cached key file");
                if let Err(e) = disk.remove(key_id) {
                    warn!(error = %e, "Failed to remove corrupt cached key file");
                }
                None
            }
        }
    }

    /// Best effort: the key is usable even if it cannot be written.
    fn persist(&self, key_id: &KeyId, document: &[u8]) {
        if let Some(disk) = &self.disk
            && let Err(e) = disk.store(key_id, document)
        {
            warn!(error = %e, "Failed to persist key to disk cache");
        }
    }

    async fn fetch(&self, key_id: &KeyId) -> Result<Bytes, KeyError> {
        let request = Request::get(key_id.as_str())
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, transport::USER_AGENT)
            .body(Bytes::new())
            .map_err(|_| KeyError::InvalidKeyId(key_id.to_string()))?;

        self.fetches.fetch_add(1, Ordering::Relaxed);
        debug!("Fetching key set");

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|source| KeyError::Fetch {
                key_id: key_id.clone(),
                source,
            })?;

        if response.status() != StatusCode::OK {
            return Err(KeyError::UnexpectedStatus {
                key_id: key_id.clone(),
                status: response.status(),
            });
        }
        Ok(response.into_body())
    }
}

/// A lookup's share of the per-key fill lock.
///
/// The `in_flight` entry is created on entry and removed when the last
/// holder leaves. Clones are only taken and released under the `in_flight`
/// lock, so a count of one on release means the map holds the last reference.
struct InFlightGate<'a> {
    cache: &'a KeyCache,
    key_id: &'a KeyId,
    gate: Option<Arc<tokio::sync::Mutex<()>>>,
}

impl<'a> InFlightGate<'a> {
    fn enter(cache: &'a KeyCache, key_id: &'a KeyId) -> Self {
        let gate = cache
            .in_flight
            .lock()
            .entry(key_id.clone())
            .or_default()
            .clone();
        InFlightGate {
            cache,
            key_id,
            gate: Some(gate),
        }
    }

    async fn lock(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        }
    }
}

impl Drop for InFlightGate<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.cache.in_flight.lock();
        drop(self.gate.take());
        if in_flight
            .get(self.key_id)
            .is_some_and(|current| Arc::strong_count(current) == 1)
        {
            in_flight.remove(self.key_id);
        }
    }
}
