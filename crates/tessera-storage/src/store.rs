//! Store traits
//!
//! [`ObjectStore::update`] is the only way the lifecycle service mutates a
//! stored object. It runs fetch, mutate, and commit as one atomic unit:
//! concurrent updates of the same identifier serialize, and a closure that
//! returns an error commits nothing.

use std::collections::BTreeMap;

use tessera_core::{KmsResult, ManagedObject, ObjectType, UniqueIdentifier, UserPermissionEntry};

/// What to persist once an update closure succeeds
#[derive(Debug)]
pub enum Commit {
    /// Write back the mutated object
    Update,
    /// Write back the mutated object and insert a new one in the same transaction
    UpdateAndInsert(ManagedObject),
    /// Delete the object
    Remove,
}

/// Closure applied by [`ObjectStore::update`]
pub type UpdateFn<'a> = dyn FnMut(&mut ManagedObject) -> KmsResult<Commit> + 'a;

/// Persistent home of managed objects
pub trait ObjectStore: Send + Sync {
    /// Fetch an object by identifier
    fn get(&self, id: &UniqueIdentifier) -> KmsResult<ManagedObject>;

    /// Fetch the first object carrying the given Name Value
    fn get_by_name(&self, name: &str) -> KmsResult<ManagedObject>;

    /// Identifiers of every object carrying the given Name Value
    fn locate(&self, name: &str) -> KmsResult<Vec<UniqueIdentifier>>;

    /// Insert or replace an object
    fn put(&self, object: ManagedObject) -> KmsResult<()>;

    /// Delete an object; returns whether it existed
    fn remove(&self, id: &UniqueIdentifier) -> KmsResult<bool>;

    /// Number of stored objects per object type
    fn count_by_kind(&self) -> KmsResult<BTreeMap<ObjectType, usize>>;

    /// Atomically fetch, mutate, and commit one object
    fn update(&self, id: &UniqueIdentifier, f: &mut UpdateFn<'_>) -> KmsResult<()>;
}

/// Persistent home of per-object credential bindings
pub trait PermissionStore: Send + Sync {
    fn put_permission(&self, entry: UserPermissionEntry) -> KmsResult<()>;

    /// Fetch the entry for `id`, failing with `ItemNotFound` when absent
    fn get_permission(&self, id: &UniqueIdentifier) -> KmsResult<UserPermissionEntry>;
}
