//! Managed object storage on redb
//!
//! Objects are stored whole, postcard-encoded, under their unique identifier.
//! The NAMES table maps each Name Value to the identifiers carrying it and is
//! maintained inside the same write transaction as the object itself.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use tessera_core::{KmsError, KmsResult, ManagedObject, ObjectType, UniqueIdentifier};

use super::tables::{
    BytesTable, NAMES, OBJECTS, RedbStorage, db_err, decode, encode, read_owned,
};
use crate::error::StorageResult;
use crate::store::{Commit, ObjectStore, UpdateFn};

/// redb implementation of [`ObjectStore`]
pub struct RedbObjectStore {
    storage: Arc<RedbStorage>,
}

impl RedbObjectStore {
    /// Create a new object store
    pub fn new(storage: Arc<RedbStorage>) -> Self {
        Self { storage }
    }
}

fn write_object(objects: &mut BytesTable<'_>, object: &ManagedObject) -> StorageResult<()> {
    let value = encode(object)?;
    objects
        .insert(object.unique_id.as_bytes(), value.as_slice())
        .map_err(db_err)?;
    Ok(())
}

fn reindex(
    names: &mut BytesTable<'_>,
    id: &UniqueIdentifier,
    old: &[String],
    new: &[String],
) -> StorageResult<()> {
    for name in old.iter().filter(|n| !new.contains(n)) {
        let mut ids: Vec<String> = match read_owned(names, name.as_bytes())? {
            Some(bytes) => decode(&bytes)?,
            None => continue,
        };
        ids.retain(|existing| existing != id.as_str());
        if ids.is_empty() {
            names.remove(name.as_bytes()).map_err(db_err)?;
        } else {
            names
                .insert(name.as_bytes(), encode(&ids)?.as_slice())
                .map_err(db_err)?;
        }
    }
    for name in new.iter().filter(|n| !old.contains(n)) {
        let mut ids: Vec<String> = match read_owned(names, name.as_bytes())? {
            Some(bytes) => decode(&bytes)?,
            None => Vec::new(),
        };
        if !ids.iter().any(|existing| existing == id.as_str()) {
            ids.push(id.to_string());
        }
        names
            .insert(name.as_bytes(), encode(&ids)?.as_slice())
            .map_err(db_err)?;
    }
    Ok(())
}

impl ObjectStore for RedbObjectStore {
    fn get(&self, id: &UniqueIdentifier) -> KmsResult<ManagedObject> {
        let bytes = self
            .storage
            .get(OBJECTS, id.as_bytes())?
            .ok_or_else(|| KmsError::not_found(id.to_string()))?;
        Ok(decode(&bytes)?)
    }

    fn get_by_name(&self, name: &str) -> KmsResult<ManagedObject> {
        match self.locate(name)?.first() {
            Some(id) => self.get(id),
            None => Err(KmsError::not_found(format!("name '{name}'"))),
        }
    }

    fn locate(&self, name: &str) -> KmsResult<Vec<UniqueIdentifier>> {
        let ids: Vec<String> = match self.storage.get(NAMES, name.as_bytes())? {
            Some(bytes) => decode(&bytes)?,
            None => Vec::new(),
        };
        Ok(ids.into_iter().map(UniqueIdentifier::from).collect())
    }

    #[instrument(skip(self, object), fields(unique_id = %object.unique_id))]
    fn put(&self, object: ManagedObject) -> KmsResult<()> {
        let write_txn = self.storage.db().begin_write().map_err(db_err)?;
        {
            let mut objects = write_txn.open_table(OBJECTS).map_err(db_err)?;
            let mut names = write_txn.open_table(NAMES).map_err(db_err)?;

            let old_names = match read_owned(&objects, object.unique_id.as_bytes())? {
                Some(bytes) => decode::<ManagedObject>(&bytes)?.name_values(),
                None => Vec::new(),
            };
            write_object(&mut objects, &object)?;
            reindex(&mut names, &object.unique_id, &old_names, &object.name_values())?;
        }
        write_txn.commit().map_err(db_err)?;
        debug!("Stored object");
        Ok(())
    }

    #[instrument(skip(self))]
    fn remove(&self, id: &UniqueIdentifier) -> KmsResult<bool> {
        let write_txn = self.storage.db().begin_write().map_err(db_err)?;
        let removed = {
            let mut objects = write_txn.open_table(OBJECTS).map_err(db_err)?;
            let mut names = write_txn.open_table(NAMES).map_err(db_err)?;

            match read_owned(&objects, id.as_bytes())? {
                Some(bytes) => {
                    let old: ManagedObject = decode(&bytes)?;
                    objects.remove(id.as_bytes()).map_err(db_err)?;
                    reindex(&mut names, id, &old.name_values(), &[])?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit().map_err(db_err)?;
        Ok(removed)
    }

    fn count_by_kind(&self) -> KmsResult<BTreeMap<ObjectType, usize>> {
        let mut counts = BTreeMap::new();
        for bytes in self.storage.values(OBJECTS)? {
            let object: ManagedObject = decode(&bytes)?;
            *counts.entry(object.object_type()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    #[instrument(skip(self, f))]
    fn update(&self, id: &UniqueIdentifier, f: &mut UpdateFn<'_>) -> KmsResult<()> {
        // Dropping the transaction on any early return aborts it.
        let write_txn = self.storage.db().begin_write().map_err(db_err)?;
        {
            let mut objects = write_txn.open_table(OBJECTS).map_err(db_err)?;
            let mut names = write_txn.open_table(NAMES).map_err(db_err)?;

            let bytes = read_owned(&objects, id.as_bytes())?
                .ok_or_else(|| KmsError::not_found(id.to_string()))?;
            let mut working: ManagedObject = decode(&bytes)?;
            let old_names = working.name_values();

            match f(&mut working)? {
                Commit::Update => {
                    write_object(&mut objects, &working)?;
                    reindex(&mut names, id, &old_names, &working.name_values())?;
                }
                Commit::UpdateAndInsert(inserted) => {
                    write_object(&mut objects, &working)?;
                    reindex(&mut names, id, &old_names, &working.name_values())?;
                    write_object(&mut objects, &inserted)?;
                    reindex(&mut names, &inserted.unique_id, &[], &inserted.name_values())?;
                }
                Commit::Remove => {
                    objects.remove(id.as_bytes()).map_err(db_err)?;
                    reindex(&mut names, id, &old_names, &[])?;
                }
            }
        }
        write_txn.commit().map_err(db_err)?;
        debug!("Committed update");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structured::RedbStorageConfig;
    use tempfile::TempDir;
    use tessera_core::{
        CryptographicObject, KeyBlock, KeyFormatType, ObjectKind, State, Template, name_attribute,
    };

    fn create_test_store() -> (RedbObjectStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = RedbStorageConfig {
            db_path: temp_dir.path().join("objects.redb"),
            ..Default::default()
        };
        let storage = Arc::new(RedbStorage::open(config).unwrap());
        (RedbObjectStore::new(storage), temp_dir)
    }

    fn key(id: &str, name: Option<&str>) -> ManagedObject {
        let body = CryptographicObject::new(KeyBlock::new(KeyFormatType::Raw, None, None, None));
        let mut object =
            ManagedObject::new(UniqueIdentifier::from(id), ObjectKind::SymmetricKey(body), 0);
        if let Some(name) = name {
            object.names.insert(name_attribute(name).unwrap());
        }
        object
    }

    #[test]
    fn test_put_get_remove() {
        let (store, _temp) = create_test_store();
        store.put(key("a", Some("alpha"))).unwrap();
        assert_eq!(store.get(&"a".into()).unwrap(), key("a", Some("alpha")));
        assert_eq!(store.get_by_name("alpha").unwrap().unique_id.as_str(), "a");

        assert!(store.remove(&"a".into()).unwrap());
        assert!(!store.remove(&"a".into()).unwrap());
        assert!(matches!(
            store.get(&"a".into()),
            Err(KmsError::ItemNotFound(_))
        ));
        assert!(store.locate("alpha").unwrap().is_empty());
    }

    #[test]
    fn test_failed_update_aborts() {
        let (store, _temp) = create_test_store();
        store.put(key("a", None)).unwrap();
        let result = store.update(&"a".into(), &mut |object| {
            object.activate(5)?;
            Err(KmsError::denied("no"))
        });
        assert!(matches!(result, Err(KmsError::PermissionDenied(_))));
        assert_eq!(store.get(&"a".into()).unwrap().state(), Some(State::PreActive));
    }

    #[test]
    fn test_update_commits() {
        let (store, _temp) = create_test_store();
        store.put(key("a", None)).unwrap();
        store
            .update(&"a".into(), &mut |object| {
                object.activate(5)?;
                Ok(Commit::Update)
            })
            .unwrap();
        assert_eq!(store.get(&"a".into()).unwrap().state(), Some(State::Active));
    }

    #[test]
    fn test_update_and_insert_moves_names() {
        let (store, _temp) = create_test_store();
        store.put(key("a", Some("alpha"))).unwrap();
        store
            .update(&"a".into(), &mut |object| {
                let mut successor = key("b", None);
                successor.names = object.names.take();
                Ok(Commit::UpdateAndInsert(successor))
            })
            .unwrap();
        assert_eq!(store.locate("alpha").unwrap(), vec![UniqueIdentifier::from("b")]);
        assert!(store.get(&"a".into()).unwrap().names.is_empty());
    }

    #[test]
    fn test_update_remove_and_counts() {
        let (store, _temp) = create_test_store();
        store.put(key("a", None)).unwrap();
        store
            .put(ManagedObject::new(
                "t".into(),
                ObjectKind::Template(Template::default()),
                0,
            ))
            .unwrap();
        let counts = store.count_by_kind().unwrap();
        assert_eq!(counts.get(&ObjectType::Template), Some(&1));

        store
            .update(&"t".into(), &mut |_| Ok(Commit::Remove))
            .unwrap();
        let counts = store.count_by_kind().unwrap();
        assert_eq!(counts.get(&ObjectType::Template), None);
        assert_eq!(counts.get(&ObjectType::SymmetricKey), Some(&1));
    }
}
