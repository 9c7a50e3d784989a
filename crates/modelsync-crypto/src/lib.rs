//! Master key material and the encryptor contract
//!
//! The sync-up daemon bootstraps one cluster-wide master key and installs it
//! into the local [`Encryptor`]. This crate owns the key material type (random
//! 32 bytes, base64 on the wire, zeroized on drop) and the in-process
//! encryptor that holds the active key.

#![deny(unsafe_code)]

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a master key in bytes
pub const MASTER_KEY_LEN: usize = 32;

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Crypto errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key encoding: {0}")]
    InvalidEncoding(String),

    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("encryptor state poisoned")]
    Poisoned,
}

/// Raw master key bytes
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial([u8; MASTER_KEY_LEN]);

impl KeyMaterial {
    /// Generate fresh key material from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; MASTER_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; MASTER_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Decode the base64 form stored in the master key document.
    pub fn decode(encoded: &str) -> CryptoResult<Self> {
        let mut decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;

        if decoded.len() != MASTER_KEY_LEN {
            let actual = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::InvalidLength {
                expected: MASTER_KEY_LEN,
                actual,
            });
        }

        let mut bytes = [0u8; MASTER_KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self(bytes))
    }

    pub fn encode(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Short blake3 fingerprint, safe to log.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.0);
        hash.to_hex()[..16].to_string()
    }

    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyMaterial")
            .field(&self.fingerprint())
            .finish()
    }
}

/// Holder of the active master key
pub trait Encryptor: Send + Sync {
    /// Whether any key has been installed.
    fn has_key(&self) -> bool;

    /// Fingerprint of the installed key, if any.
    fn fingerprint(&self) -> Option<String>;

    /// Make `material` the active key.
    fn install_key(&self, material: KeyMaterial) -> CryptoResult<()>;

    /// Produce fresh key material (not installed).
    fn generate_key(&self) -> KeyMaterial;
}

/// In-process encryptor holding the active master key
#[derive(Default)]
pub struct MasterKeyEncryptor {
    key: RwLock<Option<KeyMaterial>>,
    installs: AtomicU64,
}

impl MasterKeyEncryptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful key installs since creation.
    pub fn install_count(&self) -> u64 {
        self.installs.load(Ordering::SeqCst)
    }

    /// Run `f` against the active key without copying it out.
    pub fn with_key<R>(&self, f: impl FnOnce(Option<&KeyMaterial>) -> R) -> CryptoResult<R> {
        let guard = self.key.read().map_err(|_| CryptoError::Poisoned)?;
        Ok(f(guard.as_ref()))
    }
}

impl fmt::Debug for MasterKeyEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKeyEncryptor")
            .field("fingerprint", &self.fingerprint())
            .field("installs", &self.install_count())
            .finish()
    }
}

impl Encryptor for MasterKeyEncryptor {
    fn has_key(&self) -> bool {
        self.key.read().map(|key| key.is_some()).unwrap_or(false)
    }

    fn fingerprint(&self) -> Option<String> {
        self.key
            .read()
            .ok()
            .and_then(|key| key.as_ref().map(KeyMaterial::fingerprint))
    }

    fn install_key(&self, material: KeyMaterial) -> CryptoResult<()> {
        let fingerprint = material.fingerprint();
        let mut key = self.key.write().map_err(|_| CryptoError::Poisoned)?;
        *key = Some(material);
        self.installs.fetch_add(1, Ordering::SeqCst);
        tracing::info!(fingerprint = %fingerprint, "Installed master key");
        Ok(())
    }

    fn generate_key(&self) -> KeyMaterial {
        KeyMaterial::generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generated_keys_differ() {
        let a = KeyMaterial::generate();
        let b = KeyMaterial::generate();
        assert_ne!(a, b);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(matches!(
            KeyMaterial::decode("not base64!"),
            Err(CryptoError::InvalidEncoding(_))
        ));
        assert_eq!(
            KeyMaterial::decode("c2hvcnQ="),
            Err(CryptoError::InvalidLength {
                expected: MASTER_KEY_LEN,
                actual: 5
            })
        );
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = KeyMaterial::from_bytes([7u8; MASTER_KEY_LEN]);
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains(&key.encode()));
        assert!(rendered.contains(&key.fingerprint()));
    }

    #[test]
    fn test_encryptor_install() {
        let encryptor = MasterKeyEncryptor::new();
        assert!(!encryptor.has_key());
        assert!(encryptor.fingerprint().is_none());

        let key = encryptor.generate_key();
        let fingerprint = key.fingerprint();
        encryptor.install_key(key).unwrap();

        assert!(encryptor.has_key());
        assert_eq!(encryptor.fingerprint(), Some(fingerprint));
        assert_eq!(encryptor.install_count(), 1);
        assert!(encryptor.with_key(|k| k.is_some()).unwrap());
    }

    proptest! {
        #[test]
        fn prop_decode_never_panics(input in ".{0,64}") {
            if let Ok(key) = KeyMaterial::decode(&input) {
                prop_assert_eq!(key.as_bytes().len(), MASTER_KEY_LEN);
            }
        }
    }
}
