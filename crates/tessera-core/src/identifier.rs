//! Unique identifiers for managed objects

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-assigned identifier of a managed object, immutable once assigned
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UniqueIdentifier(String);

impl UniqueIdentifier {
    /// Allocate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<&str> for UniqueIdentifier {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UniqueIdentifier {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for UniqueIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
