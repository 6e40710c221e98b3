//! Error taxonomy for the tiered cache engine.
//!
//! Mirrors the enterprise-wide error pattern used across the rest of the
//! crate: a flat `thiserror` enum with one variant per recoverable/fatal
//! failure kind, plus a crate-wide `CacheResult` alias.

use thiserror::Error;

/// Errors produced by the cache engine.
///
/// Most variants are recovered internally by the read pipeline (stale
/// fallback, MISS downgrade); only [`CacheError::Config`] is fatal, and only
/// at initialization.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The origin fetcher failed (unreachable, timed out, 5xx). Recoverable
    /// via stale-fallback.
    #[error("origin fetch failed: {0}")]
    OriginFailure(String),

    /// The origin returned a cacheable-but-negative response. Cached with a
    /// shortened horizon to prevent dog-piling.
    #[error("origin returned a negative response: {0}")]
    OriginBadResponse(String),

    /// An L1 or L2 backend call failed.
    #[error("{tier} backend failure: {message}")]
    BackendFailure {
        /// Which tier failed (`"L1"` or `"L2"`).
        tier: &'static str,
        /// Backend-provided detail.
        message: String,
    },

    /// Decryption or integrity/authentication check failed. The entry is
    /// treated as a MISS by the caller; this variant exists to carry the
    /// warn-level log context.
    #[error("integrity check failed: {0}")]
    IntegrityFailure(String),

    /// Invalid profile, missing key material, or a disallowed algorithm.
    /// Fatal at initialization.
    #[error("configuration error: {0}")]
    Config(String),

    /// Surfaced only to the caller whose task was cancelled while awaiting
    /// a shared single-flight fetch; other waiters are unaffected.
    #[error("operation cancelled")]
    Cancellation,
}

impl CacheError {
    /// True for failures the read pipeline treats as "origin is down, fall
    /// back to stale if available."
    pub fn is_origin_style(&self) -> bool {
        matches!(
            self,
            CacheError::OriginFailure(_)
                | CacheError::OriginBadResponse(_)
                | CacheError::BackendFailure { .. }
        )
    }
}

/// Result type used throughout the cache engine.
pub type CacheResult<T> = Result<T, CacheError>;
