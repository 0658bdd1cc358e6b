//! Software key material provider
//!
//! Generates symmetric keys from the thread-local CSPRNG, X25519 key pairs
//! for ECDH, and SHA-256 digests.

use rand::RngCore;
use sha2::{Digest as _, Sha256};
use tracing::debug;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use tessera_core::{CryptographicAlgorithm, HashingAlgorithm, KeyMaterialProvider, KmsResult};

use crate::error::{CryptoError, CryptoResult};

/// Smallest HMAC key accepted, in bits
pub const MIN_HMAC_BITS: i32 = 8;

/// Largest HMAC key accepted, in bits
pub const MAX_HMAC_BITS: i32 = 4096;

/// X25519 scalar size in bytes
pub const X25519_KEY_SIZE: usize = 32;

/// Key provider backed by the operating system's randomness
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareKeyProvider;

impl SoftwareKeyProvider {
    pub fn new() -> Self {
        Self
    }

    /// Byte length of a symmetric key, validating the algorithm and length
    pub fn symmetric_key_size(
        algorithm: CryptographicAlgorithm,
        length_bits: i32,
    ) -> CryptoResult<usize> {
        let invalid = || CryptoError::InvalidKeyLength {
            algorithm: algorithm.to_string(),
            length: length_bits,
        };
        match algorithm {
            CryptographicAlgorithm::Aes => match length_bits {
                128 | 192 | 256 => Ok(length_bits as usize / 8),
                _ => Err(invalid()),
            },
            // Two- and three-key variants, stored with parity bits
            CryptographicAlgorithm::TripleDes => match length_bits {
                112 => Ok(16),
                168 => Ok(24),
                _ => Err(invalid()),
            },
            CryptographicAlgorithm::HmacSha1
            | CryptographicAlgorithm::HmacSha224
            | CryptographicAlgorithm::HmacSha256
            | CryptographicAlgorithm::HmacSha384
            | CryptographicAlgorithm::HmacSha512 => {
                if (MIN_HMAC_BITS..=MAX_HMAC_BITS).contains(&length_bits) && length_bits % 8 == 0 {
                    Ok(length_bits as usize / 8)
                } else {
                    Err(invalid())
                }
            }
            other => Err(CryptoError::UnsupportedAlgorithm(format!(
                "{other} symmetric keys"
            ))),
        }
    }

    fn x25519_pair(length_bits: i32) -> CryptoResult<(Vec<u8>, Vec<u8>)> {
        if length_bits != 255 && length_bits != 256 {
            return Err(CryptoError::InvalidKeyLength {
                algorithm: CryptographicAlgorithm::Ecdh.to_string(),
                length: length_bits,
            });
        }
        let mut seed = Zeroizing::new([0u8; X25519_KEY_SIZE]);
        rand::rng().fill_bytes(seed.as_mut());
        let secret = StaticSecret::from(*seed);
        let public = PublicKey::from(&secret);
        Ok((secret.to_bytes().to_vec(), public.as_bytes().to_vec()))
    }
}

impl KeyMaterialProvider for SoftwareKeyProvider {
    fn random_key_bytes(
        &self,
        algorithm: CryptographicAlgorithm,
        length_bits: i32,
    ) -> KmsResult<Vec<u8>> {
        let size = Self::symmetric_key_size(algorithm, length_bits)?;
        let mut bytes = vec![0u8; size];
        rand::rng().fill_bytes(&mut bytes);
        debug!(%algorithm, length_bits, "Generated symmetric key material");
        Ok(bytes)
    }

    fn random_key_pair_bytes(
        &self,
        algorithm: CryptographicAlgorithm,
        length_bits: i32,
    ) -> KmsResult<(Vec<u8>, Vec<u8>)> {
        let pair = match algorithm {
            CryptographicAlgorithm::Ecdh => Self::x25519_pair(length_bits)?,
            other => {
                return Err(CryptoError::UnsupportedAlgorithm(format!("{other} key pairs")).into());
            }
        };
        debug!(%algorithm, length_bits, "Generated key pair material");
        Ok(pair)
    }

    fn digest(&self, bytes: &[u8]) -> KmsResult<Vec<u8>> {
        Ok(Sha256::digest(bytes).to_vec())
    }

    fn hashing_algorithm(&self) -> HashingAlgorithm {
        HashingAlgorithm::Sha256
    }
}
