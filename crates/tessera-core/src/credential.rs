//! Request credentials and per-object permission entries

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::identifier::UniqueIdentifier;

/// Credential presented with a request
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Credential {
    UsernamePassword { username: String, password: String },
    Device { device_identifier: String },
}

impl Credential {
    pub fn username_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credential::UsernamePassword {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn device(device_identifier: impl Into<String>) -> Self {
        Credential::Device {
            device_identifier: device_identifier.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Credential::Device { device_identifier } => f
                .debug_struct("Device")
                .field("device_identifier", device_identifier)
                .finish(),
        }
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        if let Credential::UsernamePassword { password, .. } = self {
            password.zeroize();
        }
    }
}

/// Binds a managed object to the credential allowed to operate on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermissionEntry {
    pub unique_id: UniqueIdentifier,
    pub credential: Option<Credential>,
}

impl UserPermissionEntry {
    pub fn new(unique_id: UniqueIdentifier, credential: Option<Credential>) -> Self {
        Self {
            unique_id,
            credential,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let credential = Credential::username_password("alice", "hunter2");
        let debug = format!("{:?}", credential);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(
            Credential::username_password("alice", "pw"),
            Credential::username_password("alice", "pw")
        );
        assert_ne!(
            Credential::username_password("alice", "pw"),
            Credential::username_password("alice", "other")
        );
        assert_ne!(
            Credential::device("dev-1"),
            Credential::username_password("dev-1", "")
        );
    }
}
