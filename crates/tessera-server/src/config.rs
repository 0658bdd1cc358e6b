//! Server configuration and command line

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use tessera_logging::LogConfig;
use tessera_storage::RedbStorageConfig;

use crate::error::ServerResult;

/// Where managed objects and permission entries live
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local maps, lost on exit
    #[default]
    Memory,
    /// Durable redb database file
    Redb {
        path: PathBuf,
        #[serde(default = "default_cache_size")]
        cache_size: usize,
    },
}

fn default_cache_size() -> usize {
    RedbStorageConfig::default().cache_size
}

impl StorageBackend {
    /// redb backend at `path` with the default cache size
    pub fn redb(path: impl Into<PathBuf>) -> Self {
        StorageBackend::Redb {
            path: path.into(),
            cache_size: default_cache_size(),
        }
    }
}

/// Configuration for a Tessera KMS server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Storage backend
    pub storage: StorageBackend,
    /// Lease Time in seconds given to new cryptographic objects that set none
    pub default_lease_time: Option<u32>,
    /// Logging configuration
    pub logging: LogConfig,
}

impl ServerConfig {
    /// Load a configuration from a TOML file
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> ServerResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Set the storage backend
    pub fn with_storage(mut self, storage: StorageBackend) -> Self {
        self.storage = storage;
        self
    }

    /// Set the default lease time
    pub fn with_default_lease_time(mut self, seconds: u32) -> Self {
        self.default_lease_time = Some(seconds);
        self
    }

    /// Set the logging configuration
    pub fn with_logging(mut self, logging: LogConfig) -> Self {
        self.logging = logging;
        self
    }
}

#[derive(Parser)]
#[command(name = "tessera-kms", about = "Key lifecycle management server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Process a JSON request batch and print the JSON response
    Run {
        /// Server configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Request batch file (JSON)
        #[arg(long)]
        batch: PathBuf,
    },
    /// Print the number of stored objects per object type
    Counts {
        /// Server configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
