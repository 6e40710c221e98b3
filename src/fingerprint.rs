//! Fingerprinter: a stable, content-addressed ID for a request
//! descriptor, partitioned by application identifier so two tenants sharing
//! L1/L2 can never collide.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sha3::Sha3_256;

use crate::config::HashAlgorithm;
use crate::error::{CacheError, CacheResult};

/// A canonicalized value used as fingerprinter input. Keys are sorted via
/// `BTreeMap`; `Undefined` is a distinguished sentinel rather than an
/// elided field, so two descriptors that differ only in an explicitly-unset
/// key still hash identically to one that omits the key.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
    /// Sentinel for an absent/undefined field.
    Undefined,
    /// JSON-style null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integers too large for `f64` are carried as decimal strings, never
    /// as native machine integers, so a `BigInt` and a same-valued `f64`
    /// never diverge based on representation.
    BigInt(String),
    /// Floating point. NaN/±∞ are rejected before they reach this type.
    Number(f64),
    /// UTF-8 text.
    Text(String),
    /// Ordered sequence.
    Array(Vec<CanonicalValue>),
    /// Key-sorted mapping.
    Object(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
    fn write_into(&self, out: &mut Vec<u8>) -> CacheResult<()> {
        match self {
            CanonicalValue::Undefined => out.extend_from_slice(b"\0undefined\0"),
            CanonicalValue::Null => out.extend_from_slice(b"\0null\0"),
            CanonicalValue::Bool(b) => {
                out.extend_from_slice(if *b { b"\0true\0" } else { b"\0false\0" })
            }
            CanonicalValue::BigInt(s) => {
                out.extend_from_slice(b"\0bigint:");
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            CanonicalValue::Number(n) => {
                if n.is_nan() || n.is_infinite() {
                    return Err(CacheError::Config(
                        "fingerprint input contains NaN or infinite float".to_string(),
                    ));
                }
                out.extend_from_slice(b"\0num:");
                out.extend_from_slice(n.to_bits().to_be_bytes().as_slice());
                out.push(0);
            }
            CanonicalValue::Text(s) => {
                out.extend_from_slice(b"\0str:");
                out.extend_from_slice(&(s.len() as u64).to_be_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            CanonicalValue::Array(items) => {
                out.extend_from_slice(b"\0arr:");
                out.extend_from_slice(&(items.len() as u64).to_be_bytes());
                for item in items {
                    item.write_into(out)?;
                }
            }
            CanonicalValue::Object(map) => {
                out.extend_from_slice(b"\0obj:");
                out.extend_from_slice(&(map.len() as u64).to_be_bytes());
                // BTreeMap already iterates in sorted key order.
                for (k, v) in map {
                    out.extend_from_slice(&(k.len() as u64).to_be_bytes());
                    out.extend_from_slice(k.as_bytes());
                    v.write_into(out)?;
                }
            }
        }
        Ok(())
    }
}

/// Policy for canonicalizing duplicate query-string keys, enumerated at the
/// canonicalizer rather than deferred to ad-hoc serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateKeyPolicy {
    /// Join all values for a key with a fixed separator.
    Join,
    /// Encode each value under its own `key[]`-style suffixed entry.
    Suffixed,
    /// Encode each value under an indexed suffix (`key.0`, `key.1`, ...).
    Indexed,
}

/// The *shape* (not value) of authentication material attached to a
/// request: which slots are present, and their nesting, but never secret
/// values. Two descriptors differing only in secret value must still
/// collide; two descriptors differing in whether an auth slot is present at
/// all must never collide.
#[derive(Debug, Clone, Default)]
pub struct AuthShape {
    /// Sorted, deduplicated set of present authentication field names
    /// (e.g. `["bearer"]`, `["basic", "mfa"]`). Empty means unauthenticated.
    pub present_fields: Vec<String>,
}

/// Input to the fingerprinter: everything that should vary the identity of
/// a cached artifact. Transient fields (timeouts, retry knobs, debug
/// toggles) are deliberately not representable here.
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// HTTP method, or equivalent verb for non-HTTP origins.
    pub method: String,
    /// Origin host.
    pub host: String,
    /// Origin path.
    pub path: String,
    /// Query parameters as (key, value) pairs, in original order; sorting
    /// and duplicate handling happens during canonicalization.
    pub query: Vec<(String, String)>,
    /// How duplicate query keys are folded into the canonical form.
    pub duplicate_key_policy: DuplicateKeyPolicy,
    /// Request body, canonicalized recursively.
    pub body: CanonicalValue,
    /// Shape only of any auth material.
    pub auth_shape: AuthShape,
}

fn canonicalize_query(
    query: &[(String, String)],
    policy: DuplicateKeyPolicy,
) -> CanonicalValue {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (k, v) in query {
        grouped.entry(k.clone()).or_default().push(v.clone());
    }

    let mut out = BTreeMap::new();
    for (key, values) in grouped {
        match policy {
            DuplicateKeyPolicy::Join => {
                out.insert(key, CanonicalValue::Text(values.join("\u{1}")));
            }
            DuplicateKeyPolicy::Suffixed => {
                let arr = values.into_iter().map(CanonicalValue::Text).collect();
                out.insert(format!("{key}[]"), CanonicalValue::Array(arr));
            }
            DuplicateKeyPolicy::Indexed => {
                for (i, v) in values.into_iter().enumerate() {
                    out.insert(format!("{key}.{i}"), CanonicalValue::Text(v));
                }
            }
        }
    }
    CanonicalValue::Object(out)
}

/// Fixed-width hex fingerprint, lowercase, domain-partitioned by
/// application identifier. `Eq + Hash + Clone` so it can key concurrent
/// maps the way `enterprise::cache::tier::LruCache` is generic over
/// `K: Eq + Hash + Clone`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The raw lowercase hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build a `Fingerprint` directly from a raw string, bypassing
    /// [`Fingerprinter`]. For tests and call sites that already hold a
    /// computed key (e.g. reading one back from storage).
    pub fn testing_from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pure, deterministic fingerprinter over a [`Descriptor`], partitioned by
/// `application_id`.
pub struct Fingerprinter {
    algorithm: HashAlgorithm,
    application_id: String,
}

impl Fingerprinter {
    /// Construct a fingerprinter for a given application/tenant partition.
    pub fn new(algorithm: HashAlgorithm, application_id: impl Into<String>) -> Self {
        Self {
            algorithm,
            application_id: application_id.into(),
        }
    }

    /// Compute the fingerprint for a descriptor. Identical canonicalized
    /// inputs always yield identical fingerprints; descriptors
    /// under different application identifiers never collide.
    pub fn fingerprint(&self, descriptor: &Descriptor) -> CacheResult<Fingerprint> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(b"\0app:");
        buf.extend_from_slice(self.application_id.as_bytes());
        buf.push(0);
        buf.extend_from_slice(descriptor.method.to_ascii_uppercase().as_bytes());
        buf.push(0);
        buf.extend_from_slice(descriptor.host.as_bytes());
        buf.push(0);
        buf.extend_from_slice(descriptor.path.as_bytes());
        buf.push(0);

        canonicalize_query(&descriptor.query, descriptor.duplicate_key_policy).write_into(&mut buf)?;
        descriptor.body.write_into(&mut buf)?;

        buf.extend_from_slice(b"\0auth:");
        let mut fields = descriptor.auth_shape.present_fields.clone();
        fields.sort();
        fields.dedup();
        for field in &fields {
            buf.extend_from_slice(field.as_bytes());
            buf.push(0);
        }

        let hex = match self.algorithm {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(&buf);
                hex::encode(hasher.finalize())
            }
            HashAlgorithm::Sha3_256 => {
                let mut hasher = Sha3_256::new();
                hasher.update(&buf);
                hex::encode(hasher.finalize())
            }
        };

        Ok(Fingerprint(hex))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_descriptor() -> Descriptor {
        Descriptor {
            method: "GET".to_string(),
            host: "api.example.com".to_string(),
            path: "/v1/widgets".to_string(),
            query: vec![
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string()),
            ],
            duplicate_key_policy: DuplicateKeyPolicy::Join,
            body: CanonicalValue::Undefined,
            auth_shape: AuthShape::default(),
        }
    }

    #[test]
    fn stable_under_key_reordering() {
        let fp = Fingerprinter::new(HashAlgorithm::Sha256, "tenant-a");
        let d1 = base_descriptor();
        let mut d2 = base_descriptor();
        d2.query.reverse();

        assert_eq!(
            fp.fingerprint(&d1).unwrap(),
            fp.fingerprint(&d2).unwrap()
        );
    }

    #[test]
    fn domain_separation_by_application_id() {
        let d = base_descriptor();
        let a = Fingerprinter::new(HashAlgorithm::Sha256, "tenant-a")
            .fingerprint(&d)
            .unwrap();
        let b = Fingerprinter::new(HashAlgorithm::Sha256, "tenant-b")
            .fingerprint(&d)
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn auth_presence_changes_fingerprint_but_not_values() {
        let fp = Fingerprinter::new(HashAlgorithm::Sha256, "tenant-a");
        let mut unauth = base_descriptor();
        unauth.auth_shape = AuthShape::default();

        let mut authed = base_descriptor();
        authed.auth_shape = AuthShape {
            present_fields: vec!["bearer".to_string()],
        };

        assert_ne!(fp.fingerprint(&unauth).unwrap(), fp.fingerprint(&authed).unwrap());
    }

    #[test]
    fn rejects_nan_and_infinite_floats() {
        let fp = Fingerprinter::new(HashAlgorithm::Sha256, "tenant-a");
        let mut d = base_descriptor();
        d.body = CanonicalValue::Number(f64::NAN);
        assert!(fp.fingerprint(&d).is_err());

        let mut d2 = base_descriptor();
        d2.body = CanonicalValue::Number(f64::INFINITY);
        assert!(fp.fingerprint(&d2).is_err());
    }

    #[test]
    fn fingerprint_is_fixed_width_lowercase_hex() {
        let fp = Fingerprinter::new(HashAlgorithm::Sha256, "tenant-a");
        let out = fp.fingerprint(&base_descriptor()).unwrap();
        assert_eq!(out.as_str().len(), 64);
        assert!(out.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn bigint_serializes_as_decimal_not_float() {
        let fp = Fingerprinter::new(HashAlgorithm::Sha256, "tenant-a");
        let mut d1 = base_descriptor();
        d1.body = CanonicalValue::BigInt("9007199254740993".to_string());
        let mut d2 = base_descriptor();
        d2.body = CanonicalValue::Number(9007199254740993.0);
        assert_ne!(fp.fingerprint(&d1).unwrap(), fp.fingerprint(&d2).unwrap());
    }

    proptest::proptest! {
        #[test]
        fn fingerprint_stable_under_arbitrary_query_key_permutation(
            keys in proptest::collection::hash_set("[a-z]{1,6}", 0..8),
            seed in proptest::prelude::any::<u64>(),
        ) {
            use rand::rngs::StdRng;
            use rand::seq::SliceRandom;
            use rand::SeedableRng;

            let original: Vec<(String, String)> = keys
                .into_iter()
                .enumerate()
                .map(|(i, k)| (k, i.to_string()))
                .collect();
            let mut shuffled = original.clone();
            let mut rng = StdRng::seed_from_u64(seed);
            shuffled.shuffle(&mut rng);

            let mut d1 = base_descriptor();
            d1.query = original;
            let mut d2 = base_descriptor();
            d2.query = shuffled;

            let fp = Fingerprinter::new(HashAlgorithm::Sha256, "tenant-a");
            proptest::prop_assert_eq!(fp.fingerprint(&d1).unwrap(), fp.fingerprint(&d2).unwrap());
        }
    }
}
