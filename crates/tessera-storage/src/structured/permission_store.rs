//! Permission entry storage on redb

use std::sync::Arc;

use tracing::debug;

use tessera_core::{KmsError, KmsResult, UniqueIdentifier, UserPermissionEntry};

use super::tables::{PERMISSIONS, RedbStorage, decode, encode};
use crate::store::PermissionStore;

/// redb implementation of [`PermissionStore`]
pub struct RedbPermissionStore {
    storage: Arc<RedbStorage>,
}

impl RedbPermissionStore {
    /// Create a new permission store
    pub fn new(storage: Arc<RedbStorage>) -> Self {
        Self { storage }
    }
}

impl PermissionStore for RedbPermissionStore {
    fn put_permission(&self, entry: UserPermissionEntry) -> KmsResult<()> {
        let value = encode(&entry)?;
        self.storage
            .put(PERMISSIONS, entry.unique_id.as_bytes(), &value)?;
        debug!(unique_id = %entry.unique_id, "Stored permission entry");
        Ok(())
    }

    fn get_permission(&self, id: &UniqueIdentifier) -> KmsResult<UserPermissionEntry> {
        let bytes = self
            .storage
            .get(PERMISSIONS, id.as_bytes())?
            .ok_or_else(|| KmsError::not_found(format!("permission entry for {id}")))?;
        Ok(decode(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structured::RedbStorageConfig;
    use tempfile::TempDir;
    use tessera_core::Credential;

    #[test]
    fn test_roundtrip_entry() {
        let temp_dir = TempDir::new().unwrap();
        let config = RedbStorageConfig {
            db_path: temp_dir.path().join("permissions.redb"),
            ..Default::default()
        };
        let store = RedbPermissionStore::new(Arc::new(RedbStorage::open(config).unwrap()));

        let entry = UserPermissionEntry::new(
            "key-1".into(),
            Some(Credential::username_password("alice", "pw")),
        );
        store.put_permission(entry.clone()).unwrap();
        assert_eq!(store.get_permission(&"key-1".into()).unwrap(), entry);
        assert!(matches!(
            store.get_permission(&"key-2".into()),
            Err(KmsError::ItemNotFound(_))
        ));
    }
}
