//! In-memory store implementations
//!
//! Objects live behind one mutex each, so updates of the same identifier
//! serialize while different identifiers proceed in parallel. The maps
//! themselves are `DashMap`s; no code path waits on an object mutex while it
//! holds a map shard.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use tessera_core::{
    KmsError, KmsResult, ManagedObject, ObjectType, UniqueIdentifier, UserPermissionEntry,
};

use crate::store::{Commit, ObjectStore, PermissionStore, UpdateFn};

/// `None` marks an object removed while another thread waited on it
type Slot = Arc<Mutex<Option<ManagedObject>>>;

/// In-memory implementation of [`ObjectStore`]
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: DashMap<UniqueIdentifier, Slot>,
    names: DashMap<String, BTreeSet<UniqueIdentifier>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn slot(&self, id: &UniqueIdentifier) -> KmsResult<Slot> {
        self.objects
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| KmsError::not_found(id.to_string()))
    }

    fn reindex(&self, id: &UniqueIdentifier, old: &[String], new: &[String]) {
        for name in old.iter().filter(|n| !new.contains(n)) {
            if let Some(mut ids) = self.names.get_mut(name) {
                ids.remove(id);
            }
            self.names.remove_if(name, |_, ids| ids.is_empty());
        }
        for name in new.iter().filter(|n| !old.contains(n)) {
            self.names
                .entry(name.clone())
                .or_default()
                .insert(id.clone());
        }
    }

    fn insert_new(&self, object: ManagedObject) -> KmsResult<()> {
        let id = object.unique_id.clone();
        self.reindex(&id, &[], &object.name_values());
        self.objects
            .insert(id.clone(), Arc::new(Mutex::new(Some(object))));
        trace!(unique_id = %id, "Inserted object");
        Ok(())
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn get(&self, id: &UniqueIdentifier) -> KmsResult<ManagedObject> {
        let slot = self.slot(id)?;
        let guard = slot.lock();
        guard
            .clone()
            .ok_or_else(|| KmsError::not_found(id.to_string()))
    }

    fn get_by_name(&self, name: &str) -> KmsResult<ManagedObject> {
        let ids = self.locate(name)?;
        for id in ids {
            match self.get(&id) {
                Ok(object) => return Ok(object),
                Err(KmsError::ItemNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(KmsError::not_found(format!("name '{name}'")))
    }

    fn locate(&self, name: &str) -> KmsResult<Vec<UniqueIdentifier>> {
        Ok(self
            .names
            .get(name)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn put(&self, object: ManagedObject) -> KmsResult<()> {
        match self.slot(&object.unique_id) {
            Ok(slot) => {
                let mut guard = slot.lock();
                let old = guard.as_ref().map(ManagedObject::name_values).unwrap_or_default();
                self.reindex(&object.unique_id, &old, &object.name_values());
                *guard = Some(object);
                Ok(())
            }
            Err(_) => self.insert_new(object),
        }
    }

    fn remove(&self, id: &UniqueIdentifier) -> KmsResult<bool> {
        let Ok(slot) = self.slot(id) else {
            return Ok(false);
        };
        let mut guard = slot.lock();
        let Some(object) = guard.take() else {
            return Ok(false);
        };
        self.reindex(id, &object.name_values(), &[]);
        drop(guard);
        self.objects.remove(id);
        debug!(unique_id = %id, "Removed object");
        Ok(true)
    }

    fn count_by_kind(&self) -> KmsResult<BTreeMap<ObjectType, usize>> {
        let slots: Vec<Slot> = self
            .objects
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut counts = BTreeMap::new();
        for slot in slots {
            if let Some(object) = slot.lock().as_ref() {
                *counts.entry(object.object_type()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    fn update(&self, id: &UniqueIdentifier, f: &mut UpdateFn<'_>) -> KmsResult<()> {
        let slot = self.slot(id)?;
        let mut guard = slot.lock();
        let Some(current) = guard.as_ref() else {
            return Err(KmsError::not_found(id.to_string()));
        };
        let old_names = current.name_values();
        let mut working = current.clone();

        match f(&mut working)? {
            Commit::Update => {
                self.reindex(id, &old_names, &working.name_values());
                *guard = Some(working);
            }
            Commit::UpdateAndInsert(inserted) => {
                self.reindex(id, &old_names, &working.name_values());
                *guard = Some(working);
                self.insert_new(inserted)?;
            }
            Commit::Remove => {
                self.reindex(id, &old_names, &[]);
                *guard = None;
                drop(guard);
                self.objects.remove(id);
            }
        }
        trace!(unique_id = %id, "Committed update");
        Ok(())
    }
}

/// In-memory implementation of [`PermissionStore`]
#[derive(Debug, Default)]
pub struct InMemoryPermissionStore {
    entries: DashMap<UniqueIdentifier, UserPermissionEntry>,
}

impl InMemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PermissionStore for InMemoryPermissionStore {
    fn put_permission(&self, entry: UserPermissionEntry) -> KmsResult<()> {
        self.entries.insert(entry.unique_id.clone(), entry);
        Ok(())
    }

    fn get_permission(&self, id: &UniqueIdentifier) -> KmsResult<UserPermissionEntry> {
        self.entries
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| KmsError::not_found(format!("permission entry for {id}")))
    }
}
