//! Walks a single fingerprint through every tier: an encrypted fresh
//! origin fetch large enough to land in L2, an L0 promotion on the next
//! call, and a stale-fallback once the origin starts failing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tiercache::config::{CacheProfile, CipherAlgorithm, EngineConfig};
use tiercache::fingerprint::{AuthShape, CanonicalValue, Descriptor, DuplicateKeyPolicy};
use tiercache::l1::InMemoryL1Backend;
use tiercache::l2::InMemoryL2Backend;
use tiercache::origin::{FnOriginFetcher, OriginError, OriginResponse};
use tiercache::secrets::{KeyCache, StaticSecretStore};
use tiercache::Pipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let mut secrets = HashMap::new();
    secrets.insert("tiered-cache-key".to_string(), vec![11u8; 32]);
    let key_cache = Arc::new(KeyCache::new(
        Arc::new(StaticSecretStore::new(secrets)),
        "tiered-cache-key",
        std::time::Duration::from_secs(300),
    ));

    let origin_up = Arc::new(AtomicBool::new(true));
    let origin_up_clone = origin_up.clone();
    // Oversized body forces L2 placement against the default 10 KiB threshold.
    let large_body = vec![b'x'; 32 * 1024];
    let large_body_clone = large_body.clone();
    let origin = Arc::new(FnOriginFetcher::new(move |_descriptor: &Descriptor| {
        let origin_up = origin_up_clone.clone();
        let body = large_body_clone.clone();
        async move {
            if origin_up.load(Ordering::SeqCst) {
                Ok(OriginResponse {
                    body,
                    headers: HashMap::from([("content-type".to_string(), "application/octet-stream".to_string())]),
                    status_code: "200".to_string(),
                    origin_provided_expires_at_millis: None,
                })
            } else {
                Err(OriginError("upstream unavailable".to_string()))
            }
        }
    }));

    let mut config = EngineConfig::default();
    config.cipher_algorithm = CipherAlgorithm::XChaCha20Poly1305;
    let pipeline = Pipeline::new(
        config,
        Arc::new(InMemoryL1Backend::new()),
        Arc::new(InMemoryL2Backend::new()),
        origin,
        Some(key_cache),
    )?;

    let descriptor = Descriptor {
        method: "GET".to_string(),
        host: "assets.internal".to_string(),
        path: "/bundle.bin".to_string(),
        query: vec![],
        duplicate_key_policy: DuplicateKeyPolicy::Join,
        body: CanonicalValue::Null,
        auth_shape: AuthShape::default(),
    };
    let profile = CacheProfile {
        host_id: "assets".to_string(),
        path_id: "bundle".to_string(),
        retain_headers: vec!["content-type".to_string()],
        encrypt: true,
        default_expiry_seconds: 1,
        error_extension_seconds: 60,
        ..Default::default()
    };

    let t0 = 1_700_000_000_000;
    let first = pipeline.fetch_at(&descriptor, &profile, t0).await?;
    tracing::info!(source = ?first.source, bytes = first.artifact.body.len(), "fetched from origin, encrypted and placed in L2");
    assert_eq!(first.artifact.body, large_body);

    let second = pipeline.fetch_at(&descriptor, &profile, t0 + 1).await?;
    tracing::info!(source = ?second.source, "promoted into L0 on the next call");

    origin_up.store(false, Ordering::SeqCst);
    let t1 = t0 + 5_000;
    let third = pipeline.fetch_at(&descriptor, &profile, t1).await?;
    tracing::info!(source = ?third.source, "origin down, served stale with a rewritten expiry");
    assert_eq!(third.artifact.body, large_body);

    Ok(())
}
