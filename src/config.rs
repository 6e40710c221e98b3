//! Explicit configuration surface for the cache engine.
//!
//! Follows `enterprise::EnterpriseConfig`'s convention of a plain
//! `serde`-derived struct with a `Default` impl, rather than a builder
//! macro.

use serde::{Deserialize, Serialize};

/// Hash family used by the fingerprinter. Bit width is always ≥ 256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-256 (32 bytes).
    Sha256,
    /// SHA3-256 (32 bytes).
    Sha3_256,
}

/// Symmetric cipher used by the codec. The algorithm actually used for
/// a given artifact is stored alongside it (`alg` tag) so keys can rotate
/// across algorithms without invalidating older artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherAlgorithm {
    /// AES-256 in Galois/Counter Mode.
    Aes256Gcm,
    /// ChaCha20-Poly1305 (RFC 8439).
    ChaCha20Poly1305,
    /// XChaCha20-Poly1305, extended 192-bit nonce.
    XChaCha20Poly1305,
}

/// L0 sizing policy: either an explicit entry cap, or a derivation from a
/// memory budget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum L0Sizing {
    /// Hard cap on the number of L0 entries.
    MaxEntries(usize),
    /// Derive capacity from `memory_budget_mib / 1024 * entries_per_gib`,
    /// floored at 1, falling back to `default_max_entries` when the budget
    /// cannot be observed from the runtime.
    FromBudget {
        /// Memory budget in MiB, if observable from the runtime.
        memory_budget_mib: Option<u64>,
        /// Entries expected per GiB of budget.
        entries_per_gib: u64,
        /// Fallback cap when `memory_budget_mib` is `None`.
        default_max_entries: usize,
    },
}

impl L0Sizing {
    /// Resolve to a concrete entry capacity, applying the floor of 1.
    pub fn resolve(&self) -> usize {
        match self {
            L0Sizing::MaxEntries(n) => (*n).max(1),
            L0Sizing::FromBudget {
                memory_budget_mib,
                entries_per_gib,
                default_max_entries,
            } => match memory_budget_mib {
                Some(mib) => (((*mib as u128 * *entries_per_gib as u128) / 1024) as usize).max(1),
                None => (*default_max_entries).max(1),
            },
        }
    }
}

/// L0 configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L0Config {
    /// Sizing policy; `features.in_memory_l0 = false` disables L0 entirely
    /// regardless of this value.
    pub sizing: L0Sizing,
    /// Whether L0 is enabled at all. When `false` the pipeline begins at L1.
    pub enabled: bool,
}

impl Default for L0Config {
    fn default() -> Self {
        Self {
            sizing: L0Sizing::FromBudget {
                memory_budget_mib: None,
                entries_per_gib: 50_000,
                default_max_entries: 1_000,
            },
            enabled: true,
        }
    }
}

/// L1 configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct L1Config {
    /// Size boundary (post-encoding) above which the body is placed in L2
    /// and L1 carries only a pointer.
    pub placement_threshold_bytes: usize,
    /// Hours after `expiresAt` that an artifact may still be physically
    /// present before the backend purges it. Bounds `purge_extension_secs`.
    pub purge_expired_after_hours: u64,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            placement_threshold_bytes: 10 * 1024,
            purge_expired_after_hours: 24,
        }
    }
}

/// Per-origin cache policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheProfile {
    /// Log label identifying the origin host.
    pub host_id: String,
    /// Log label identifying the origin path.
    pub path_id: String,
    /// Default freshness horizon in seconds, used when the origin supplies
    /// no expiry or `override_origin_expiry` is set.
    pub default_expiry_seconds: i64,
    /// Align computed expiry down to the nearest interval boundary within
    /// the civil day of `interval_time_zone`.
    pub expiry_on_interval: bool,
    /// IANA time zone name used for interval alignment.
    pub interval_time_zone: String,
    /// Response headers to retain in the cached artifact.
    pub retain_headers: Vec<String>,
    /// Whether artifacts for this profile are encrypted at rest.
    pub encrypt: bool,
    /// Ignore the origin-supplied expiry and always use
    /// `default_expiry_seconds`.
    pub override_origin_expiry: bool,
    /// Stale-fallback forward horizon in seconds, applied on origin failure.
    pub error_extension_seconds: i64,
}

impl Default for CacheProfile {
    fn default() -> Self {
        Self {
            host_id: "default".to_string(),
            path_id: "default".to_string(),
            default_expiry_seconds: 300,
            expiry_on_interval: false,
            interval_time_zone: "UTC".to_string(),
            retain_headers: Vec::new(),
            encrypt: false,
            override_origin_expiry: false,
            error_extension_seconds: 300,
        }
    }
}

/// Feature toggles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// When `false`, L0 is disabled entirely; pipeline begins at L1.
    pub in_memory_l0: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self { in_memory_l0: true }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prefixes the fingerprint domain so tenants sharing L1/L2 cannot
    /// collide.
    pub application_id: String,
    /// Hash family used by the fingerprinter.
    pub hash_algorithm: HashAlgorithm,
    /// Cipher used by the codec when a profile requests encryption.
    pub cipher_algorithm: CipherAlgorithm,
    /// L0 tier configuration.
    pub l0: L0Config,
    /// L1/L2 placement and purge configuration.
    pub l1: L1Config,
    /// Default stale-fallback horizon used when a profile omits one.
    pub default_error_extension_seconds: i64,
    /// Feature toggles.
    pub features: FeatureFlags,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            application_id: "default-app".to_string(),
            hash_algorithm: HashAlgorithm::Sha256,
            cipher_algorithm: CipherAlgorithm::Aes256Gcm,
            l0: L0Config::default(),
            l1: L1Config::default(),
            default_error_extension_seconds: 300,
            features: FeatureFlags::default(),
        }
    }
}

impl EngineConfig {
    /// Validate the configuration, returning a fatal
    /// [`crate::error::CacheError::Config`] on the first problem found.
    pub fn validate(&self) -> crate::error::CacheResult<()> {
        use crate::error::CacheError;

        if self.application_id.trim().is_empty() {
            return Err(CacheError::Config("application_id must not be empty".into()));
        }
        if self.l1.purge_expired_after_hours == 0 {
            return Err(CacheError::Config(
                "l1.purge_expired_after_hours must be > 0".into(),
            ));
        }
        if self.default_error_extension_seconds <= 0 {
            return Err(CacheError::Config(
                "default_error_extension_seconds must be > 0".into(),
            ));
        }
        Ok(())
    }
}
