//! Error types for tessera-crypto

use thiserror::Error;

use tessera_core::KmsError;

/// Errors that can occur while generating key material
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid key length: {algorithm} does not support {length} bits")]
    InvalidKeyLength { algorithm: String, length: i32 },

    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),
}

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

impl From<CryptoError> for KmsError {
    fn from(err: CryptoError) -> Self {
        KmsError::UnsupportedAlgorithm(err.to_string())
    }
}
