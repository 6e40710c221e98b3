//! Origin fetcher: the opaque, slow data source the cache
//! engine fronts. Treated as an external collaborator — the engine only
//! depends on this trait, never on a concrete HTTP client.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::fingerprint::Descriptor;

/// What the origin returned on success.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    /// Response body.
    pub body: Vec<u8>,
    /// Response headers (full set; the profile's retain-list filters these
    /// down before storage).
    pub headers: HashMap<String, String>,
    /// Origin status code as a string (e.g. `"200"`, `"404"`).
    pub status_code: String,
    /// Expiry the origin itself furnished, if any (e.g. from
    /// `Cache-Control`/`Expires`), as milliseconds since epoch.
    pub origin_provided_expires_at_millis: Option<i64>,
}

/// Any non-success from the origin. Opaque — the pipeline only
/// needs to know a fetch failed, not why, to apply stale-fallback.
#[derive(Debug, Clone)]
pub struct OriginError(pub String);

impl std::fmt::Display for OriginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "origin error: {}", self.0)
    }
}

impl std::error::Error for OriginError {}

/// The injected origin fetcher contract. Implementations
/// typically wrap an HTTP client; that client is explicitly out of scope
/// for this crate.
#[async_trait]
pub trait OriginFetcher: Send + Sync {
    /// Fetch fresh data for `descriptor`. Any non-success is treated as a
    /// fetch failure for fallback purposes by the read pipeline.
    async fn fetch(&self, descriptor: &Descriptor) -> Result<OriginResponse, OriginError>;
}

/// An [`OriginFetcher`] built from an async closure, for tests and small
/// call sites that don't want to define a type.
pub struct FnOriginFetcher<F> {
    f: F,
}

impl<F> FnOriginFetcher<F> {
    /// Wrap `f` as an [`OriginFetcher`].
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> OriginFetcher for FnOriginFetcher<F>
where
    F: Fn(&Descriptor) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<OriginResponse, OriginError>> + Send,
{
    async fn fetch(&self, descriptor: &Descriptor) -> Result<OriginResponse, OriginError> {
        (self.f)(descriptor).await
    }
}
