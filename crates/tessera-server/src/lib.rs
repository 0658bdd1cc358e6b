//! # Tessera Server
//!
//! Lifecycle service for Tessera KMS.
//!
//! ## Features
//!
//! - **LifecycleService**: resolves targets, checks credentials, and runs the
//!   lifecycle engine inside one store transaction per operation
//! - **RequestContext**: per-batch credential and ID placeholder
//! - **AccessControl**: per-object credential bindings
//! - **Flat attribute maps**: `key -> text` requests and responses
//! - **ServerConfig**: TOML configuration and the `tessera-kms` command line
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera_server::{LifecycleService, Operation, Request, RequestItem, ServerConfig};
//!
//! let service = LifecycleService::from_config(&ServerConfig::default())?;
//! let response = service.process(Request::new(vec![
//!     RequestItem::new(Operation::Create)
//!         .with("Object Type", "Symmetric Key")
//!         .with("Cryptographic Algorithm", "AES")
//!         .with("Cryptographic Length", "256"),
//!     // No identifier: acts on the key created above
//!     RequestItem::new(Operation::Activate),
//! ]));
//! ```

pub mod access;
pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod service;

// Re-exports
pub use access::AccessControl;
pub use config::{Cli, Command, ServerConfig, StorageBackend};
pub use context::RequestContext;
pub use error::{ServerError, ServerResult};
pub use message::{
    AttributeMap, Operation, Params, Request, RequestItem, Response, ResponseItem, flatten, keys,
    unflatten,
};
pub use service::LifecycleService;
