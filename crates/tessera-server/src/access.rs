//! Per-object access control
//!
//! Every object created through the service is bound to the credential of the
//! request that created it (or to none). Later operations must present an
//! equal credential.

use std::sync::Arc;

use tracing::{debug, warn};

use tessera_core::{Credential, KmsError, KmsResult, UniqueIdentifier, UserPermissionEntry};
use tessera_storage::PermissionStore;

/// Grants and verifies object permissions
pub struct AccessControl {
    store: Arc<dyn PermissionStore>,
}

impl AccessControl {
    pub fn new(store: Arc<dyn PermissionStore>) -> Self {
        Self { store }
    }

    /// Bind `unique_id` to `credential`
    pub fn grant(&self, unique_id: &UniqueIdentifier, credential: Option<&Credential>) -> KmsResult<()> {
        self.store
            .put_permission(UserPermissionEntry::new(unique_id.clone(), credential.cloned()))?;
        debug!(unique_id = %unique_id, bound = credential.is_some(), "Permission granted");
        Ok(())
    }

    /// Check `credential` against the entry stored for `unique_id`
    pub fn verify(&self, unique_id: &UniqueIdentifier, credential: Option<&Credential>) -> KmsResult<()> {
        let entry = self.store.get_permission(unique_id)?;
        match (entry.credential.as_ref(), credential) {
            (Some(_), None) => {
                warn!(unique_id = %unique_id, "Denied: object requires a credential");
                Err(KmsError::denied(format!("{unique_id} requires a credential")))
            }
            (Some(stored), Some(presented)) if stored != presented => {
                warn!(unique_id = %unique_id, "Denied: credential mismatch");
                Err(KmsError::denied(format!("credential does not match {unique_id}")))
            }
            _ => Ok(()),
        }
    }
}
