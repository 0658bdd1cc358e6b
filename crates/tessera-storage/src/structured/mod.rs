//! Structured storage using redb
//!
//! This module provides durable storage for:
//! - Managed objects, keyed by unique identifier
//! - A Name Value index over those objects
//! - Per-object permission entries
//!
//! redb allows one write transaction at a time, so every update of every
//! object is serialized.

mod object_store;
mod permission_store;
mod tables;

pub use object_store::RedbObjectStore;
pub use permission_store::RedbPermissionStore;
pub use tables::{RedbStorage, RedbStorageConfig};
