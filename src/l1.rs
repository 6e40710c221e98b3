//! L1: small-object store keyed by fingerprint, with a per-row TTL and
//! either an inline body or a pointer into L2.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::codec::Envelope;
use crate::config::CipherAlgorithm;
use crate::error::{CacheError, CacheResult};
use crate::fingerprint::Fingerprint;

/// One row per fingerprint. Unknown fields are preserved on round-trip via
/// `#[serde(flatten)]` into `extra`, so a record written by a newer schema
/// version survives being read back by this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L1Record {
    /// Retained response headers.
    pub headers: HashMap<String, String>,
    /// Origin status code, or the "no cache yet" sentinel.
    pub status_code: String,
    /// Absolute freshness cutoff, ms since epoch.
    pub expires_at_millis: i64,
    /// Absolute purge eligibility, ms since epoch. The backend is expected
    /// to physically remove the row at this instant (its TTL attribute);
    /// reads past this instant are treated as MISS regardless.
    pub purge_at_millis: i64,
    /// Cipher algorithm used for `body`, if encrypted.
    pub cipher_alg: Option<CipherAlgorithm>,
    /// The body, present when `pointer` is `None`: either the ciphertext
    /// envelope's `ct`/`iv` (if encrypted) or the cleartext bytes.
    pub inline_body: Option<Vec<u8>>,
    /// IV for `inline_body` when encrypted.
    pub inline_iv: Option<Vec<u8>>,
    /// Set when the body lives in L2 instead of inline; carries the L2
    /// object key (`cache/<fingerprint>`).
    pub l2_key: Option<String>,
    /// Fields from schema versions this build doesn't know about.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl L1Record {
    /// Build the AEAD envelope from this record's inline ciphertext, if
    /// present and encrypted.
    pub fn inline_envelope(&self) -> Option<Envelope> {
        match (self.cipher_alg, &self.inline_body, &self.inline_iv) {
            (Some(alg), Some(ct), Some(iv)) => Some(Envelope {
                alg,
                iv: iv.clone(),
                ct: ct.clone(),
            }),
            _ => None,
        }
    }

    /// Whether this row is still eligible to be served (not past
    /// `purge_at_millis`); the record is treated as MISS otherwise even if
    /// the backend hasn't physically removed it yet.
    pub fn is_live_at(&self, now_millis: i64) -> bool {
        now_millis < self.purge_at_millis
    }

    /// Whether this row is still fresh (not past `expires_at_millis`).
    pub fn is_fresh_at(&self, now_millis: i64) -> bool {
        now_millis < self.expires_at_millis
    }
}

/// Injected L1 backend: `put`/`get`/`delete`, keyed by fingerprint,
/// with a per-row TTL interpreted against wall clock.
#[async_trait]
pub trait L1Backend: Send + Sync {
    /// Write `record` under `key`, with a backend-level TTL hint matching
    /// `record.purge_at_millis`.
    async fn put(&self, key: &Fingerprint, record: L1Record, ttl: Duration) -> CacheResult<()>;

    /// Read the record for `key`, if present.
    async fn get(&self, key: &Fingerprint) -> CacheResult<Option<L1Record>>;

    /// Remove the row for `key`.
    async fn delete(&self, key: &Fingerprint) -> CacheResult<()>;
}

/// In-memory L1 backend for tests and single-container demos. Does not
/// enforce the TTL itself (reads still re-check `purge_at_millis`), the
/// same trust model as a managed table store with delayed TTL sweeps.
#[derive(Default)]
pub struct InMemoryL1Backend {
    rows: Arc<parking_lot::RwLock<HashMap<Fingerprint, L1Record>>>,
}

impl InMemoryL1Backend {
    /// Construct an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl L1Backend for InMemoryL1Backend {
    async fn put(&self, key: &Fingerprint, record: L1Record, _ttl: Duration) -> CacheResult<()> {
        self.rows.write().insert(key.clone(), record);
        Ok(())
    }

    async fn get(&self, key: &Fingerprint) -> CacheResult<Option<L1Record>> {
        Ok(self.rows.read().get(key).cloned())
    }

    async fn delete(&self, key: &Fingerprint) -> CacheResult<()> {
        self.rows.write().remove(key);
        Ok(())
    }
}

/// `sled`-backed L1 implementation: an embedded low-latency KV store,
/// suitable as a concrete stand-in for a managed table store (e.g. a
/// DynamoDB-style service) in tests and single-node deployments.
pub struct SledL1Backend {
    tree: sled::Tree,
}

impl SledL1Backend {
    /// Open (or create) an L1 tree named `tree_name` inside `db`.
    pub fn new(db: &sled::Db, tree_name: &str) -> CacheResult<Self> {
        let tree = db
            .open_tree(tree_name)
            .map_err(|e| CacheError::BackendFailure { tier: "L1", message: e.to_string() })?;
        Ok(Self { tree })
    }
}

#[async_trait]
impl L1Backend for SledL1Backend {
    async fn put(&self, key: &Fingerprint, record: L1Record, _ttl: Duration) -> CacheResult<()> {
        let bytes = bincode::serialize(&record)
            .map_err(|e| CacheError::BackendFailure { tier: "L1", message: e.to_string() })?;
        self.tree
            .insert(key.as_str().as_bytes(), bytes)
            .map_err(|e| CacheError::BackendFailure { tier: "L1", message: e.to_string() })?;
        Ok(())
    }

    async fn get(&self, key: &Fingerprint) -> CacheResult<Option<L1Record>> {
        let Some(bytes) = self
            .tree
            .get(key.as_str().as_bytes())
            .map_err(|e| CacheError::BackendFailure { tier: "L1", message: e.to_string() })?
        else {
            return Ok(None);
        };
        let record = bincode::deserialize(&bytes)
            .map_err(|e| CacheError::BackendFailure { tier: "L1", message: e.to_string() })?;
        Ok(Some(record))
    }

    async fn delete(&self, key: &Fingerprint) -> CacheResult<()> {
        self.tree
            .remove(key.as_str().as_bytes())
            .map_err(|e| CacheError::BackendFailure { tier: "L1", message: e.to_string() })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(now_millis: i64) -> L1Record {
        L1Record {
            headers: HashMap::new(),
            status_code: "200".to_string(),
            expires_at_millis: now_millis + 1000,
            purge_at_millis: now_millis + 2000,
            cipher_alg: None,
            inline_body: Some(b"hello".to_vec()),
            inline_iv: None,
            l2_key: None,
            extra: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn in_memory_l1_round_trips() {
        let backend = InMemoryL1Backend::new();
        let key = Fingerprint::testing_from_raw("deadbeef");
        backend.put(&key, sample_record(0), Duration::from_secs(2)).await.unwrap();
        let fetched = backend.get(&key).await.unwrap().unwrap();
        assert_eq!(fetched.inline_body, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let backend = InMemoryL1Backend::new();
        let key = Fingerprint::testing_from_raw("cafef00d");
        backend.put(&key, sample_record(0), Duration::from_secs(2)).await.unwrap();
        backend.delete(&key).await.unwrap();
        assert!(backend.get(&key).await.unwrap().is_none());
    }

    #[test]
    fn unknown_fields_round_trip_through_json() {
        let mut record = sample_record(0);
        record
            .extra
            .insert("future_field".to_string(), serde_json::json!("kept"));
        let json = serde_json::to_string(&record).unwrap();
        let parsed: L1Record = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.extra.get("future_field"), Some(&serde_json::json!("kept")));
    }
}
