//! Collaborator traits
//!
//! - [`KeyMaterialProvider`]: key generation and digests
//! - [`Clock`]: time abstraction for testability

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::enums::{CryptographicAlgorithm, HashingAlgorithm};
use crate::error::KmsResult;
use crate::key::{Digest, KeyMaterial};

/// Freshly generated private and public halves of a key pair
#[derive(Debug)]
pub struct KeyPairMaterial {
    pub private: KeyMaterial,
    pub public: KeyMaterial,
}

/// Source of key material and digests
///
/// Implementations supply raw random bytes and a hash function; the provided
/// methods pair every piece of material with its digest. Failures surface as
/// `UnsupportedAlgorithm`.
pub trait KeyMaterialProvider: Send + Sync {
    /// Random key bytes for `algorithm` at `length_bits`
    fn random_key_bytes(
        &self,
        algorithm: CryptographicAlgorithm,
        length_bits: i32,
    ) -> KmsResult<Vec<u8>>;

    /// Random `(private, public)` key bytes for `algorithm` at `length_bits`
    fn random_key_pair_bytes(
        &self,
        algorithm: CryptographicAlgorithm,
        length_bits: i32,
    ) -> KmsResult<(Vec<u8>, Vec<u8>)>;

    /// Hash `bytes` with [`KeyMaterialProvider::hashing_algorithm`]
    fn digest(&self, bytes: &[u8]) -> KmsResult<Vec<u8>>;

    /// Algorithm used by [`KeyMaterialProvider::digest`]
    fn hashing_algorithm(&self) -> HashingAlgorithm;

    /// Wrap caller-supplied bytes, computing their digest
    fn import_key_material(&self, bytes: Vec<u8>) -> KmsResult<KeyMaterial> {
        let digest = Digest {
            algorithm: self.hashing_algorithm(),
            value: self.digest(&bytes)?,
        };
        Ok(KeyMaterial::sealed(bytes, digest))
    }

    fn generate_key_material(
        &self,
        algorithm: CryptographicAlgorithm,
        length_bits: i32,
    ) -> KmsResult<KeyMaterial> {
        let bytes = self.random_key_bytes(algorithm, length_bits)?;
        self.import_key_material(bytes)
    }

    fn generate_key_pair(
        &self,
        algorithm: CryptographicAlgorithm,
        length_bits: i32,
    ) -> KmsResult<KeyPairMaterial> {
        let (private, public) = self.random_key_pair_bytes(algorithm, length_bits)?;
        Ok(KeyPairMaterial {
            private: self.import_key_material(private)?,
            public: self.import_key_material(public)?,
        })
    }
}

/// Time abstraction for testability
pub trait Clock: Send + Sync {
    /// Current time in POSIX seconds
    fn now(&self) -> i64;
}

/// Real clock implementation using system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Clock pinned to a settable instant
#[derive(Debug, Default)]
pub struct FixedClock {
    seconds: AtomicI64,
}

impl FixedClock {
    pub fn new(seconds: i64) -> Self {
        Self {
            seconds: AtomicI64::new(seconds),
        }
    }

    pub fn set(&self, seconds: i64) {
        self.seconds.store(seconds, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.seconds.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.seconds.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now(), 1_500);
        clock.set(10);
        assert_eq!(clock.now(), 10);
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
