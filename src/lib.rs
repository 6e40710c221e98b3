//! # tiercache
//!
//! A tiered read-through cache engine for short-lived, memory-bounded
//! compute containers. Fronts a slow, opaque origin with three
//! progressively larger and slower tiers:
//!
//! - `l0`: in-process, microsecond-latency, capacity-bounded LRU
//! - `l1`: low-latency key/value store, keyed by content fingerprint
//! - `l2`: bulk object store for payloads too large to inline in L1
//!
//! ## Architecture
//!
//! - `fingerprint`: stable content-addressed IDs for request descriptors
//! - `codec`: authenticated symmetric encryption of payloads at rest
//! - `secrets`: injected secret store plus an in-process key cache
//! - `l0` / `l1` / `l2`: the three cache tiers
//! - `placement`: size-based L1-inline vs L2-pointer decision
//! - `expiry`: wall-clock and interval-aligned expiry/purge computation
//! - `origin`: the injected, opaque data source contract
//! - `singleflight`: at-most-one-concurrent-fetch coordination per fingerprint
//! - `pipeline`: the read-through orchestration that ties all of the above
//!   together
//! - `config` / `error`: the ambient configuration surface and error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifact;
pub mod codec;
pub mod config;
pub mod error;
pub mod expiry;
pub mod fingerprint;
pub mod l0;
pub mod l1;
pub mod l2;
pub mod origin;
pub mod pipeline;
pub mod placement;
pub mod secrets;
pub mod singleflight;

pub use artifact::{CachedArtifact, Source, TaggedArtifact};
pub use config::EngineConfig;
pub use error::{CacheError, CacheResult};
pub use fingerprint::{Descriptor, Fingerprint, Fingerprinter};
pub use origin::{OriginError, OriginFetcher, OriginResponse};
pub use pipeline::Pipeline;

/// Crate version, as declared in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name, as declared in `Cargo.toml`.
pub const NAME: &str = env!("CARGO_PKG_NAME");
