//! Deterministic provider for unit tests

use std::sync::atomic::{AtomicU8, Ordering};

use crate::enums::{CryptographicAlgorithm, HashingAlgorithm};
use crate::error::{KmsError, KmsResult};
use crate::traits::KeyMaterialProvider;

/// Fills keys with an incrementing byte; digests are the reversed bytes
#[derive(Debug, Default)]
pub struct StubProvider {
    counter: AtomicU8,
}

impl StubProvider {
    fn fill(&self, length_bits: i32) -> KmsResult<Vec<u8>> {
        if length_bits <= 0 || length_bits % 8 != 0 {
            return Err(KmsError::UnsupportedAlgorithm(format!(
                "length {length_bits}"
            )));
        }
        let byte = self.counter.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        Ok(vec![byte; (length_bits / 8) as usize])
    }
}

impl KeyMaterialProvider for StubProvider {
    fn random_key_bytes(
        &self,
        algorithm: CryptographicAlgorithm,
        length_bits: i32,
    ) -> KmsResult<Vec<u8>> {
        if algorithm == CryptographicAlgorithm::Rsa {
            return Err(KmsError::UnsupportedAlgorithm(algorithm.to_string()));
        }
        self.fill(length_bits)
    }

    fn random_key_pair_bytes(
        &self,
        algorithm: CryptographicAlgorithm,
        length_bits: i32,
    ) -> KmsResult<(Vec<u8>, Vec<u8>)> {
        if algorithm == CryptographicAlgorithm::Rsa {
            return Err(KmsError::UnsupportedAlgorithm(algorithm.to_string()));
        }
        Ok((self.fill(length_bits)?, self.fill(length_bits)?))
    }

    fn digest(&self, bytes: &[u8]) -> KmsResult<Vec<u8>> {
        Ok(bytes.iter().rev().copied().collect())
    }

    fn hashing_algorithm(&self) -> HashingAlgorithm {
        HashingAlgorithm::Sha256
    }
}
