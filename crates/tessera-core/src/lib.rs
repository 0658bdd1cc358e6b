//! # Tessera Core
//!
//! Managed object model and lifecycle engine for Tessera KMS.
//!
//! ## Layers
//!
//! - [`PrimitiveValue`]: typed scalars with a canonical 8-byte aligned encoding
//! - [`Attribute`]: named, typed structures of primitive values
//! - [`KeyBlock`] / [`KeyValue`] / [`KeyMaterial`]: key bytes paired with their digest
//! - [`ManagedObject`]: identity plus a closed [`ObjectKind`]
//! - Lifecycle engine: activate, revoke, destroy, archive, recover, lease,
//!   usage allocation, check, and [`rekey`]
//!
//! ## Key Traits
//!
//! - [`KeyMaterialProvider`]: key generation and digests
//! - [`Clock`]: time abstraction for testability

pub mod attribute;
pub mod credential;
pub mod enums;
pub mod error;
pub mod identifier;
pub mod key;
pub mod lifecycle;
pub mod object;
pub mod primitive;
pub mod rekey;
pub mod traits;
pub mod typed;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types
pub use attribute::*;
pub use credential::*;
pub use enums::*;
pub use error::*;
pub use identifier::*;
pub use key::*;
pub use lifecycle::*;
pub use object::*;
pub use primitive::*;
pub use rekey::*;
pub use traits::*;
pub use typed::*;
