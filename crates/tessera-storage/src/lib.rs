//! # Tessera Storage
//!
//! Storage backends for Tessera KMS.
//!
//! ## Features
//!
//! - **ObjectStore trait**: transactional fetch-mutate-commit of managed objects
//! - **PermissionStore trait**: per-object credential bindings
//! - **InMemoryObjectStore / InMemoryPermissionStore**: `DashMap` backends with
//!   one lock per object
//! - **RedbObjectStore / RedbPermissionStore**: durable backends on redb
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera_storage::{Commit, InMemoryObjectStore, ObjectStore};
//!
//! let store = InMemoryObjectStore::new();
//! store.put(object)?;
//! store.update(&id, &mut |object| {
//!     object.activate(now)?;
//!     Ok(Commit::Update)
//! })?;
//! ```

pub mod error;
pub mod memory;
pub mod store;
pub mod structured;

// Re-exports
pub use error::{StorageError, StorageResult};
pub use memory::{InMemoryObjectStore, InMemoryPermissionStore};
pub use store::{Commit, ObjectStore, PermissionStore, UpdateFn};
pub use structured::{RedbObjectStore, RedbPermissionStore, RedbStorage, RedbStorageConfig};
