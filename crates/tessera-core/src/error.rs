//! Error types for Tessera KMS
//!
//! Every failure that can reach a client is a [`KmsError`]. The wire layer
//! reports it as a `{status, reason, message}` triple, with the reason taken
//! from [`KmsError::reason`].

use thiserror::Error;

use crate::enums::{ResultReason, State};

/// Errors surfaced by the lifecycle engine and service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KmsError {
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Unique identifier missing: no target supplied and no ID placeholder available")]
    UniqueIdentifierMissing,

    #[error("Illegal operation: {0}")]
    IllegalOperation(String),

    #[error("Object is not pre-active (current state: {0})")]
    ObjectNotPreActive(State),

    #[error("Object is archived: {0}")]
    ObjectArchived(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Malformed value: {0}")]
    MalformedValue(String),

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Unknown member '{member}' of attribute '{attribute}'")]
    UnknownAttributeMember { attribute: String, member: String },

    #[error("Attribute is managed by the server: {0}")]
    ReadOnlyAttribute(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Operation not supported: {0}")]
    OperationNotSupported(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl KmsError {
    /// Create a new ItemNotFound error
    pub fn not_found(item: impl Into<String>) -> Self {
        Self::ItemNotFound(item.into())
    }

    /// Create a new IllegalOperation error
    pub fn illegal(message: impl Into<String>) -> Self {
        Self::IllegalOperation(message.into())
    }

    /// Create a new PermissionDenied error
    pub fn denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    /// Create a new MalformedValue error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedValue(message.into())
    }

    /// Create a new InvalidField error
    pub fn invalid_field(message: impl Into<String>) -> Self {
        Self::InvalidField(message.into())
    }

    /// The result reason reported to the client for this error
    pub fn reason(&self) -> ResultReason {
        match self {
            KmsError::ItemNotFound(_) => ResultReason::ItemNotFound,
            KmsError::UniqueIdentifierMissing => ResultReason::MissingData,
            KmsError::IllegalOperation(_) | KmsError::ObjectNotPreActive(_) => {
                ResultReason::IllegalOperation
            }
            KmsError::ObjectArchived(_) => ResultReason::ObjectArchived,
            KmsError::PermissionDenied(_) | KmsError::ReadOnlyAttribute(_) => {
                ResultReason::PermissionDenied
            }
            KmsError::UnsupportedAlgorithm(_) => ResultReason::CryptographicFailure,
            KmsError::MalformedValue(_) => ResultReason::InvalidMessage,
            KmsError::UnknownAttribute(_)
            | KmsError::UnknownAttributeMember { .. }
            | KmsError::InvalidField(_) => ResultReason::InvalidField,
            KmsError::OperationNotSupported(_) => ResultReason::OperationNotSupported,
            KmsError::Storage(_) => ResultReason::GeneralFailure,
        }
    }
}

/// Result type alias for Tessera operations
pub type KmsResult<T> = Result<T, KmsError>;
