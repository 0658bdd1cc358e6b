//! # Tessera Crypto
//!
//! Software implementation of [`tessera_core::KeyMaterialProvider`].
//!
//! ## Supported algorithms
//!
//! - AES: 128, 192, and 256 bits
//! - 3DES: 112 and 168 bits
//! - HMAC-SHA1/224/256/384/512: any multiple of 8 from 8 to 4096 bits
//! - ECDH key pairs over X25519 (length 255 or 256)
//!
//! Digests are SHA-256.

pub mod error;
pub mod provider;

// Re-exports
pub use error::{CryptoError, CryptoResult};
pub use provider::{MAX_HMAC_BITS, MIN_HMAC_BITS, SoftwareKeyProvider, X25519_KEY_SIZE};
