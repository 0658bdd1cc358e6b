//! Key material, key values, and key blocks
//!
//! [`KeyMaterial`] pairs raw key bytes with the [`Digest`] computed over them.
//! Material is only ever built by a [`KeyMaterialProvider`], which computes
//! the digest in the same step, so the two never drift apart. Dropping the
//! material zeroizes the bytes.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::attribute::{Attribute, AttributeName};
use crate::enums::{CryptographicAlgorithm, HashingAlgorithm, KeyFormatType};
use crate::error::{KmsError, KmsResult};
use crate::primitive::PrimitiveValue;
use crate::traits::KeyMaterialProvider;

/// Hash of a key's material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    pub algorithm: HashingAlgorithm,
    pub value: Vec<u8>,
}

impl Digest {
    pub fn to_attribute(&self) -> KmsResult<Attribute> {
        Attribute::of(AttributeName::Digest)
            .with_value(
                PrimitiveValue::Enumeration(self.algorithm.into()),
                Some("Hashing Algorithm"),
            )?
            .with_value(
                PrimitiveValue::ByteString(self.value.clone()),
                Some("Digest Value"),
            )
    }
}

/// Raw key bytes and their digest
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMaterial {
    bytes: Vec<u8>,
    digest: Digest,
}

impl KeyMaterial {
    pub(crate) fn sealed(bytes: Vec<u8>, digest: Digest) -> Self {
        Self { bytes, digest }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("bytes", &format_args!("[{} bytes REDACTED]", self.bytes.len()))
            .field("digest", &self.digest)
            .finish()
    }
}

/// Key material plus attributes embedded alongside it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub material: Option<KeyMaterial>,
    pub attributes: Vec<Attribute>,
}

/// Key value with its format and cryptographic metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBlock {
    pub format: KeyFormatType,
    pub algorithm: Option<CryptographicAlgorithm>,
    pub length: Option<i32>,
    pub value: KeyValue,
}

impl KeyBlock {
    pub fn new(
        format: KeyFormatType,
        algorithm: Option<CryptographicAlgorithm>,
        length: Option<i32>,
        material: Option<KeyMaterial>,
    ) -> Self {
        Self {
            format,
            algorithm,
            length,
            value: KeyValue {
                material,
                attributes: Vec::new(),
            },
        }
    }

    pub fn material(&self) -> Option<&KeyMaterial> {
        self.value.material.as_ref()
    }

    pub fn digest(&self) -> Option<&Digest> {
        self.value.material.as_ref().map(KeyMaterial::digest)
    }

    /// Recompute the digest and compare it with the stored one
    pub fn verify_digest(&self, provider: &dyn KeyMaterialProvider) -> KmsResult<bool> {
        let material = self
            .material()
            .ok_or_else(|| KmsError::illegal("key block holds no key material"))?;
        if material.digest.algorithm != provider.hashing_algorithm() {
            return Err(KmsError::UnsupportedAlgorithm(format!(
                "digest algorithm {} not offered by provider",
                material.digest.algorithm
            )));
        }
        Ok(provider.digest(&material.bytes)? == material.digest.value)
    }

    /// Drop the material together with its digest
    pub fn destroy_material(&mut self) {
        self.value.material = None;
    }
}
