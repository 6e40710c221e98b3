//! Codec: authenticated symmetric encryption of cache payloads at rest.
//! Adapted directly from `enterprise::crypto::symmetric`'s ciphers, behind
//! one small `Codec` facade so the rest of the engine doesn't need to
//! match on algorithm.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use chacha20poly1305::{ChaCha20Poly1305, XChaCha20Poly1305, XNonce};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::config::CipherAlgorithm;
use crate::error::{CacheError, CacheResult};

/// Self-describing ciphertext envelope persisted at L1/L2:
/// `{alg, iv, ct}`. Carrying `alg` per-artifact (rather than globally) is
/// what makes key/algorithm rotation possible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Algorithm this ciphertext was sealed with.
    pub alg: CipherAlgorithm,
    /// Fresh-per-encryption nonce/IV.
    pub iv: Vec<u8>,
    /// Ciphertext, including the AEAD authentication tag.
    pub ct: Vec<u8>,
}

const AES_NONCE_LEN: usize = 12;
const CHACHA_NONCE_LEN: usize = 12;
const XCHACHA_NONCE_LEN: usize = 24;

/// Symmetric codec. Holds no key state itself — the key is supplied per
/// call so callers can rotate keys without recreating the codec.
pub struct Codec;

impl Codec {
    /// Encrypt `plaintext` under `key` using `alg`, producing a fresh IV
    /// per call. `key` must be exactly 32 bytes for every supported
    /// algorithm.
    pub fn encrypt(alg: CipherAlgorithm, key: &[u8], plaintext: &[u8]) -> CacheResult<Envelope> {
        if key.len() != 32 {
            return Err(CacheError::Config(format!(
                "cipher key must be 32 bytes, got {}",
                key.len()
            )));
        }

        let (iv, ct) = match alg {
            CipherAlgorithm::Aes256Gcm => {
                let cipher = Aes256Gcm::new_from_slice(key)
                    .map_err(|e| CacheError::Config(format!("bad AES-256-GCM key: {e}")))?;
                let mut iv = vec![0u8; AES_NONCE_LEN];
                OsRng.fill_bytes(&mut iv);
                let nonce = AesNonce::from_slice(&iv);
                let ct = cipher
                    .encrypt(nonce, Payload { msg: plaintext, aad: b"" })
                    .map_err(|_| CacheError::IntegrityFailure("AES-256-GCM encrypt failed".into()))?;
                (iv, ct)
            }
            CipherAlgorithm::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new_from_slice(key)
                    .map_err(|e| CacheError::Config(format!("bad ChaCha20-Poly1305 key: {e}")))?;
                let mut iv = vec![0u8; CHACHA_NONCE_LEN];
                OsRng.fill_bytes(&mut iv);
                let nonce = chacha20poly1305::Nonce::from_slice(&iv);
                let ct = cipher
                    .encrypt(nonce, Payload { msg: plaintext, aad: b"" })
                    .map_err(|_| CacheError::IntegrityFailure("ChaCha20-Poly1305 encrypt failed".into()))?;
                (iv, ct)
            }
            CipherAlgorithm::XChaCha20Poly1305 => {
                let cipher = XChaCha20Poly1305::new_from_slice(key)
                    .map_err(|e| CacheError::Config(format!("bad XChaCha20-Poly1305 key: {e}")))?;
                let mut iv = vec![0u8; XCHACHA_NONCE_LEN];
                OsRng.fill_bytes(&mut iv);
                let nonce = XNonce::from_slice(&iv);
                let ct = cipher
                    .encrypt(nonce, Payload { msg: plaintext, aad: b"" })
                    .map_err(|_| CacheError::IntegrityFailure("XChaCha20-Poly1305 encrypt failed".into()))?;
                (iv, ct)
            }
        };

        Ok(Envelope { alg, iv, ct })
    }

    /// Decrypt `envelope` under `key`. The cipher tag is authenticated
    /// before any plaintext is returned; a failure here is always an
    /// [`CacheError::IntegrityFailure`], never partially decrypted output.
    pub fn decrypt(key: &[u8], envelope: &Envelope) -> CacheResult<Vec<u8>> {
        if key.len() != 32 {
            return Err(CacheError::Config(format!(
                "cipher key must be 32 bytes, got {}",
                key.len()
            )));
        }

        match envelope.alg {
            CipherAlgorithm::Aes256Gcm => {
                if envelope.iv.len() != AES_NONCE_LEN {
                    return Err(CacheError::IntegrityFailure("bad AES-GCM nonce length".into()));
                }
                let cipher = Aes256Gcm::new_from_slice(key)
                    .map_err(|e| CacheError::Config(format!("bad AES-256-GCM key: {e}")))?;
                let nonce = AesNonce::from_slice(&envelope.iv);
                cipher
                    .decrypt(nonce, Payload { msg: &envelope.ct, aad: b"" })
                    .map_err(|_| CacheError::IntegrityFailure("AES-256-GCM authentication failed".into()))
            }
            CipherAlgorithm::ChaCha20Poly1305 => {
                if envelope.iv.len() != CHACHA_NONCE_LEN {
                    return Err(CacheError::IntegrityFailure("bad ChaCha20-Poly1305 nonce length".into()));
                }
                let cipher = ChaCha20Poly1305::new_from_slice(key)
                    .map_err(|e| CacheError::Config(format!("bad ChaCha20-Poly1305 key: {e}")))?;
                let nonce = chacha20poly1305::Nonce::from_slice(&envelope.iv);
                cipher
                    .decrypt(nonce, Payload { msg: &envelope.ct, aad: b"" })
                    .map_err(|_| CacheError::IntegrityFailure("ChaCha20-Poly1305 authentication failed".into()))
            }
            CipherAlgorithm::XChaCha20Poly1305 => {
                if envelope.iv.len() != XCHACHA_NONCE_LEN {
                    return Err(CacheError::IntegrityFailure("bad XChaCha20-Poly1305 nonce length".into()));
                }
                let cipher = XChaCha20Poly1305::new_from_slice(key)
                    .map_err(|e| CacheError::Config(format!("bad XChaCha20-Poly1305 key: {e}")))?;
                let nonce = XNonce::from_slice(&envelope.iv);
                cipher
                    .decrypt(nonce, Payload { msg: &envelope.ct, aad: b"" })
                    .map_err(|_| CacheError::IntegrityFailure("XChaCha20-Poly1305 authentication failed".into()))
            }
        }
    }
}

/// 32-byte symmetric key, zeroized on drop. Produced by [`crate::secrets`]
/// and cached in-process with a bounded refresh horizon.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct CipherKey(pub [u8; 32]);

impl CipherKey {
    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_for_every_algorithm() {
        let key = [7u8; 32];
        for alg in [
            CipherAlgorithm::Aes256Gcm,
            CipherAlgorithm::ChaCha20Poly1305,
            CipherAlgorithm::XChaCha20Poly1305,
        ] {
            let envelope = Codec::encrypt(alg, &key, b"hello tiered cache").unwrap();
            assert_eq!(envelope.alg, alg);
            let plaintext = Codec::decrypt(&key, &envelope).unwrap();
            assert_eq!(plaintext, b"hello tiered cache");
        }
    }

    #[test]
    fn tamper_is_rejected_before_plaintext_is_returned() {
        let key = [7u8; 32];
        let mut envelope = Codec::encrypt(CipherAlgorithm::Aes256Gcm, &key, b"secret").unwrap();
        let last = envelope.ct.len() - 1;
        envelope.ct[last] ^= 0xFF;

        let err = Codec::decrypt(&key, &envelope).unwrap_err();
        assert!(matches!(err, CacheError::IntegrityFailure(_)));
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let key_a = [1u8; 32];
        let key_b = [2u8; 32];
        let envelope = Codec::encrypt(CipherAlgorithm::ChaCha20Poly1305, &key_a, b"data").unwrap();
        assert!(Codec::decrypt(&key_b, &envelope).is_err());
    }

    #[test]
    fn nonce_is_fresh_per_encryption() {
        let key = [9u8; 32];
        let a = Codec::encrypt(CipherAlgorithm::Aes256Gcm, &key, b"same plaintext").unwrap();
        let b = Codec::encrypt(CipherAlgorithm::Aes256Gcm, &key, b"same plaintext").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ct, b.ct);
    }
}
