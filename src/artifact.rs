//! The unit stored at every tier and the small metadata that travels with
//! it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Sentinel status code meaning "no cache has ever been produced for this
/// fingerprint." MUST never be promoted into L0 or served as a hit.
pub const NO_CACHE_STATUS: &str = "__no_cache__";

/// Where an artifact returned by the pipeline actually came from. Carried
/// alongside the artifact so callers can make policy decisions (metrics,
/// `Cache-Status` style headers) without re-deriving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    /// Served from the in-process L0 cache.
    L0,
    /// Served from the L1 small-object store.
    L1,
    /// Served from the L2 blob store (via an L1 pointer).
    L2,
    /// Freshly fetched from the origin.
    Origin,
    /// Origin failed; an expired artifact was returned with a short
    /// forward expiry.
    StaleOnError,
    /// Origin failed and no stale candidate existed.
    Error,
}

/// The cached representation of a single origin response. Immutable after
/// creation except for `expires_at`/`purge_at`, which are rewritten on the
/// stale-fallback path.
///
/// Always handed out by value — internal tiers never leak a reference to
/// mutable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedArtifact {
    /// Opaque response payload.
    pub body: Vec<u8>,
    /// Headers selected by the profile's retain-list.
    pub headers: HashMap<String, String>,
    /// Origin status code, or [`NO_CACHE_STATUS`] if no cache has ever been
    /// produced. The sentinel is never served as a hit.
    pub status_code: String,
    /// Absolute wall-clock instant (ms since epoch) when this artifact
    /// ceases to be fresh.
    pub expires_at_millis: i64,
    /// Absolute wall-clock instant (ms since epoch) after which the
    /// artifact may be physically removed from L1/L2. Strictly later than
    /// `expires_at_millis`.
    pub purge_at_millis: i64,
}

impl CachedArtifact {
    /// Construct the "nothing cached yet" placeholder artifact returned on
    /// the hard-error path (no stale candidate available).
    pub fn empty_no_cache(now_millis: i64) -> Self {
        Self {
            body: Vec::new(),
            headers: HashMap::new(),
            status_code: NO_CACHE_STATUS.to_string(),
            expires_at_millis: now_millis,
            purge_at_millis: now_millis,
        }
    }

    /// Whether this artifact is the "no cache yet produced" sentinel.
    pub fn is_no_cache_sentinel(&self) -> bool {
        self.status_code == NO_CACHE_STATUS
    }

    /// Whether this artifact is fresh at `now_millis`.
    pub fn is_fresh_at(&self, now_millis: i64) -> bool {
        now_millis < self.expires_at_millis
    }

    /// Whether this artifact is still eligible to be served from a tier at
    /// `now_millis` (past `purge_at` means the backend should have already
    /// removed it, so a lookup observing this must be treated as a MISS).
    pub fn is_purged_at(&self, now_millis: i64) -> bool {
        now_millis >= self.purge_at_millis
    }
}

/// An artifact annotated with where it came from; the shape returned by the
/// read pipeline to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedArtifact {
    /// The artifact itself.
    pub artifact: CachedArtifact,
    /// Which tier (or the origin / error path) produced it.
    pub source: Source,
}
