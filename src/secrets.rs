//! Secret store and the in-process cipher-key cache that
//! sits in front of it. Grounded in `enterprise::security::vault`'s
//! pattern of a versioned, time-stamped secret value, simplified to what
//! the codec actually needs: raw key bytes with a bounded refresh horizon.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::codec::CipherKey;
use crate::error::{CacheError, CacheResult};

/// Raw secret bytes as returned by the store.
#[derive(Clone)]
pub struct SecretBytes(pub Vec<u8>);

/// External secret store. Implementations typically wrap a managed
/// secrets manager; the engine never talks to one directly, only through
/// this trait.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a secret by name.
    async fn get(&self, name: &str) -> CacheResult<SecretBytes>;
}

/// Fixed in-memory secret store, useful for tests and for deployments that
/// inject key material directly via configuration rather than a managed
/// vault.
pub struct StaticSecretStore {
    secrets: HashMap<String, SecretBytes>,
}

impl StaticSecretStore {
    /// Construct a store from a fixed name -> bytes map.
    pub fn new(secrets: HashMap<String, Vec<u8>>) -> Self {
        Self {
            secrets: secrets.into_iter().map(|(k, v)| (k, SecretBytes(v))).collect(),
        }
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn get(&self, name: &str) -> CacheResult<SecretBytes> {
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::Config(format!("no such secret: {name}")))
    }
}

struct CachedKey {
    key: CipherKey,
    fetched_at: Instant,
}

/// Caches a single named cipher key fetched from a [`SecretStore`], serving
/// stale reads up to `refresh_horizon` before re-fetching.
pub struct KeyCache {
    store: Arc<dyn SecretStore>,
    secret_name: String,
    refresh_horizon: Duration,
    cached: Mutex<Option<CachedKey>>,
}

impl KeyCache {
    /// Construct a key cache for `secret_name`, refreshing at most once per
    /// `refresh_horizon`.
    pub fn new(store: Arc<dyn SecretStore>, secret_name: impl Into<String>, refresh_horizon: Duration) -> Self {
        Self {
            store,
            secret_name: secret_name.into(),
            refresh_horizon,
            cached: Mutex::new(None),
        }
    }

    /// Return the current cipher key, tolerating a stale in-process copy
    /// until `refresh_horizon` elapses.
    pub async fn get(&self) -> CacheResult<CipherKey> {
        {
            let guard = self.cached.lock();
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at.elapsed() < self.refresh_horizon {
                    return Ok(cached.key.clone());
                }
            }
        }

        let bytes = self.store.get(&self.secret_name).await?;
        if bytes.0.len() != 32 {
            return Err(CacheError::Config(format!(
                "secret '{}' is {} bytes, expected 32",
                self.secret_name,
                bytes.0.len()
            )));
        }
        let mut raw = [0u8; 32];
        raw.copy_from_slice(&bytes.0);
        let key = CipherKey(raw);

        *self.cached.lock() = Some(CachedKey {
            key: key.clone(),
            fetched_at: Instant::now(),
        });

        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetches_and_caches_key() {
        let mut secrets = HashMap::new();
        secrets.insert("cache-key".to_string(), vec![3u8; 32]);
        let store: Arc<dyn SecretStore> = Arc::new(StaticSecretStore::new(secrets));
        let cache = KeyCache::new(store, "cache-key", Duration::from_secs(60));

        let key1 = cache.get().await.unwrap();
        let key2 = cache.get().await.unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[tokio::test]
    async fn rejects_wrong_length_secret() {
        let mut secrets = HashMap::new();
        secrets.insert("bad-key".to_string(), vec![1u8; 16]);
        let store: Arc<dyn SecretStore> = Arc::new(StaticSecretStore::new(secrets));
        let cache = KeyCache::new(store, "bad-key", Duration::from_secs(60));
        assert!(cache.get().await.is_err());
    }
}
