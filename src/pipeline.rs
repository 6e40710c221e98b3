//! Read pipeline: the engine's central contract. Orchestrates
//! L0 -> L1/L2 -> origin, applies stale-on-error fallback, and writes
//! results back through the tiers on a fill.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::artifact::{CachedArtifact, Source, TaggedArtifact};
use crate::codec::{Codec, Envelope};
use crate::config::{CacheProfile, EngineConfig};
use crate::error::{CacheError, CacheResult};
use crate::expiry;
use crate::fingerprint::{Descriptor, Fingerprint, Fingerprinter};
use crate::l0::{InMemoryL0, LookupStatus};
use crate::l1::{L1Backend, L1Record};
use crate::l2::{object_key, L2Backend};
use crate::origin::OriginFetcher;
use crate::secrets::KeyCache;
use crate::singleflight::SingleFlight;

fn mark_as_error(status_code: &str) -> String {
    format!("{status_code}:error")
}

/// Everything the pipeline needs to fetch-and-fill, wired once at startup
/// and shared (via `Arc`) across every concurrent request in the container.
pub struct Pipeline {
    config: EngineConfig,
    fingerprinter: Fingerprinter,
    l0: Option<Arc<InMemoryL0<Fingerprint, CachedArtifact>>>,
    l1: Arc<dyn L1Backend>,
    l2: Arc<dyn L2Backend>,
    origin: Arc<dyn OriginFetcher>,
    key_cache: Option<Arc<KeyCache>>,
    single_flight: Arc<SingleFlight<TaggedArtifact>>,
}

impl Pipeline {
    /// Build a pipeline from validated configuration and its injected
    /// collaborators. `key_cache` is required when any profile this
    /// pipeline serves sets `encrypt = true`.
    pub fn new(
        config: EngineConfig,
        l1: Arc<dyn L1Backend>,
        l2: Arc<dyn L2Backend>,
        origin: Arc<dyn OriginFetcher>,
        key_cache: Option<Arc<KeyCache>>,
    ) -> CacheResult<Self> {
        config.validate()?;
        let fingerprinter = Fingerprinter::new(config.hash_algorithm, config.application_id.clone());
        let l0 = if config.l0.enabled && config.features.in_memory_l0 {
            Some(Arc::new(InMemoryL0::new(config.l0.sizing.resolve())))
        } else {
            None
        };

        Ok(Self {
            config,
            fingerprinter,
            l0,
            l1,
            l2,
            origin,
            key_cache,
            single_flight: Arc::new(SingleFlight::new()),
        })
    }

    /// Fetch the artifact for `descriptor` under `profile`, using
    /// `now_millis` as the current wall-clock instant. Exposed separately
    /// from a real-time convenience wrapper so callers (and tests) can pin
    /// time explicitly.
    pub async fn fetch_at(
        &self,
        descriptor: &Descriptor,
        profile: &CacheProfile,
        now_millis: i64,
    ) -> CacheResult<TaggedArtifact> {
        let fingerprint = self.fingerprinter.fingerprint(descriptor)?;
        let mut stale: Option<CachedArtifact> = None;

        // Step 1-2: L0 probe.
        if let Some(l0) = &self.l0 {
            let lookup = l0.get(&fingerprint, now_millis);
            match lookup.status {
                LookupStatus::Hit => {
                    return Ok(TaggedArtifact {
                        artifact: lookup.value.expect("HIT always carries a value"),
                        source: Source::L0,
                    });
                }
                LookupStatus::Expired => {
                    stale = lookup.value;
                }
                LookupStatus::Miss => {}
            }
        }

        // Step 3-4: L1/L2 probe. A backend read failure here is never fatal
        // to the call: it downgrades to MISS and falls through to the
        // origin fetch below, same as the stale-reconstruct failure just
        // underneath it.
        let l1_record = match self.l1.get(&fingerprint).await {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "L1 read failed, treating as miss and proceeding to origin");
                None
            }
        };

        if let Some(record) = l1_record {
            if record.is_live_at(now_millis) {
                if record.is_fresh_at(now_millis) {
                    match self.reconstruct(&fingerprint, &record).await {
                        Ok(artifact) => {
                            let source = if record.l2_key.is_some() { Source::L2 } else { Source::L1 };
                            if let Some(l0) = &self.l0 {
                                l0.set(fingerprint.clone(), artifact.clone(), artifact.expires_at_millis);
                            }
                            return Ok(TaggedArtifact { artifact, source });
                        }
                        Err(err) => {
                            warn!(error = %err, "failed to reconstruct fresh L1/L2 record, treating as miss and proceeding to origin");
                        }
                    }
                } else {
                    match self.reconstruct(&fingerprint, &record).await {
                        Ok(candidate) => {
                            let keep = match &stale {
                                Some(existing) => candidate.expires_at_millis > existing.expires_at_millis,
                                None => true,
                            };
                            if keep {
                                stale = Some(candidate);
                            }
                        }
                        Err(err) => warn!(error = %err, "failed to reconstruct stale L1 candidate"),
                    }
                }
            }
        }

        // Step 5: origin fetch, coalesced per fingerprint.
        let descriptor_owned = descriptor.clone();
        let profile_owned = profile.clone();
        let origin = self.origin.clone();
        let l1 = self.l1.clone();
        let l2 = self.l2.clone();
        let l0 = self.l0.clone();
        let key_cache = self.key_cache.clone();
        let config = self.config.clone();
        let fp_for_fetch = fingerprint.clone();

        let outcome = self
            .single_flight
            .run(fingerprint.clone(), move || async move {
                fetch_and_fill(
                    &descriptor_owned,
                    &profile_owned,
                    &fp_for_fetch,
                    now_millis,
                    origin,
                    l1,
                    l2,
                    l0,
                    key_cache,
                    &config,
                )
                .await
            })
            .await;

        match outcome {
            Ok(artifact) => Ok((*artifact).clone()),
            // Only origin/backend-shaped failures fall back to stale-or-empty;
            // anything else (e.g. a configuration error) is a real bug and
            // propagates instead of being hidden behind a cache miss.
            Err(origin_err) if !origin_err.is_origin_style() => Err(origin_err),
            Err(origin_err) => {
                if let Some(mut stale_artifact) = stale {
                    let window = expiry::compute_stale_fallback_window(profile, &self.config.l1, now_millis);
                    stale_artifact.expires_at_millis = window.expires_at_millis;
                    stale_artifact.purge_at_millis = window.purge_at_millis;
                    stale_artifact.status_code = mark_as_error(&stale_artifact.status_code);

                    if let Some(l0) = &self.l0 {
                        l0.set(fingerprint.clone(), stale_artifact.clone(), window.expires_at_millis);
                    }

                    Ok(TaggedArtifact { artifact: stale_artifact, source: Source::StaleOnError })
                } else {
                    warn!(error = %origin_err, "origin fetch failed with no stale candidate");
                    Ok(TaggedArtifact {
                        artifact: CachedArtifact::empty_no_cache(now_millis),
                        source: Source::Error,
                    })
                }
            }
        }
    }

    /// Convenience wrapper using the actual wall clock.
    pub async fn fetch(&self, descriptor: &Descriptor, profile: &CacheProfile) -> CacheResult<TaggedArtifact> {
        let now_millis = chrono::Utc::now().timestamp_millis();
        self.fetch_at(descriptor, profile, now_millis).await
    }

    async fn reconstruct(&self, fingerprint: &Fingerprint, record: &L1Record) -> CacheResult<CachedArtifact> {
        let ciphertext_or_plain = match &record.l2_key {
            Some(_) => self
                .l2
                .get(fingerprint)
                .await?
                .ok_or_else(|| CacheError::BackendFailure {
                    tier: "L2",
                    message: format!("L1 pointer for {fingerprint} has no matching L2 object"),
                })?,
            None => record
                .inline_body
                .clone()
                .ok_or_else(|| CacheError::BackendFailure { tier: "L1", message: "record has neither inline body nor L2 pointer".to_string() })?,
        };

        let body = match record.cipher_alg {
            Some(alg) => {
                let key_cache = self.key_cache.as_ref().ok_or_else(|| {
                    CacheError::Config("encrypted record but no key cache configured".to_string())
                })?;
                let key = key_cache.get().await?;
                let iv = record
                    .inline_iv
                    .clone()
                    .ok_or_else(|| CacheError::IntegrityFailure("encrypted record missing IV".to_string()))?;
                let envelope = Envelope { alg, iv, ct: ciphertext_or_plain };
                Codec::decrypt(key.as_bytes(), &envelope)?
            }
            None => ciphertext_or_plain,
        };

        Ok(CachedArtifact {
            body,
            headers: record.headers.clone(),
            status_code: record.status_code.clone(),
            expires_at_millis: record.expires_at_millis,
            purge_at_millis: record.purge_at_millis,
        })
    }
}

/// Runs as the single-flight leader: fetch the origin, compute the expiry
/// window, encrypt and place the body, write L1 (and L2 if oversized), and
/// write L0. Shared verbatim with every waiter coalesced onto this call.
#[allow(clippy::too_many_arguments)]
async fn fetch_and_fill(
    descriptor: &Descriptor,
    profile: &CacheProfile,
    fingerprint: &Fingerprint,
    now_millis: i64,
    origin: Arc<dyn OriginFetcher>,
    l1: Arc<dyn L1Backend>,
    l2: Arc<dyn L2Backend>,
    l0: Option<Arc<InMemoryL0<Fingerprint, CachedArtifact>>>,
    key_cache: Option<Arc<KeyCache>>,
    config: &EngineConfig,
) -> CacheResult<TaggedArtifact> {
    let response = origin
        .fetch(descriptor)
        .await
        .map_err(|e| CacheError::OriginFailure(e.to_string()))?;

    let window = expiry::compute_fresh_window(profile, &config.l1, now_millis, response.origin_provided_expires_at_millis)?;

    let retained_headers = response
        .headers
        .into_iter()
        .filter(|(k, _)| profile.retain_headers.iter().any(|h| h.eq_ignore_ascii_case(k)))
        .collect();

    let (encoded_body, cipher_alg, iv) = if profile.encrypt {
        let key_cache = key_cache
            .as_ref()
            .ok_or_else(|| CacheError::Config("profile requests encryption but no key cache was configured".to_string()))?;
        let key = key_cache.get().await?;
        let envelope = Codec::encrypt(config.cipher_algorithm, key.as_bytes(), &response.body)?;
        (envelope.ct, Some(envelope.alg), Some(envelope.iv))
    } else {
        (response.body.clone(), None, None)
    };

    let placement = crate::placement::decide(encoded_body.len(), config.l1.placement_threshold_bytes);
    let (inline_body, l2_key) = match placement {
        crate::placement::Placement::Inline => (Some(encoded_body), None),
        crate::placement::Placement::Pointer => {
            l2.put(fingerprint, encoded_body).await?;
            (None, Some(object_key(fingerprint)))
        }
    };

    let record = L1Record {
        headers: retained_headers,
        status_code: response.status_code.clone(),
        expires_at_millis: window.expires_at_millis,
        purge_at_millis: window.purge_at_millis,
        cipher_alg,
        inline_body,
        inline_iv: iv,
        l2_key,
        extra: Default::default(),
    };

    let ttl_millis = (window.purge_at_millis - now_millis).max(0) as u64;
    if let Err(err) = l1.put(fingerprint, record.clone(), Duration::from_millis(ttl_millis)).await {
        warn!(error = %err, "best-effort L1 write after successful origin fetch failed");
    }

    let artifact = CachedArtifact {
        body: response.body,
        headers: record.headers,
        status_code: response.status_code,
        expires_at_millis: window.expires_at_millis,
        purge_at_millis: window.purge_at_millis,
    };

    if let Some(l0) = &l0 {
        l0.set(fingerprint.clone(), artifact.clone(), window.expires_at_millis);
    }

    Ok(TaggedArtifact { artifact, source: Source::Origin })
}
