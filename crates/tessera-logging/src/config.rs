//! Logging configuration, read from the `[logging]` table of the server config

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Prefix of every log file written by the server
pub const LOG_FILE_PREFIX: &str = "tessera-kms";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub console: ConsoleFormat,
    /// Rolling JSONL files, off unless a directory is given
    pub file: Option<FileConfig>,
    pub jsonl: JsonlConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: ConsoleFormat::Json,
            file: None,
            jsonl: JsonlConfig::default(),
        }
    }
}

impl LogConfig {
    /// Human-readable debug output on stderr
    pub fn verbose() -> Self {
        Self {
            level: "debug".to_string(),
            console: ConsoleFormat::Pretty,
            ..Self::default()
        }
    }

    /// Warnings only, as JSONL on stderr
    pub fn quiet() -> Self {
        Self {
            level: "warn".to_string(),
            ..Self::default()
        }
    }

    /// Write JSONL into `directory` as well, rotating daily
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.file = Some(FileConfig {
            directory: directory.into(),
            ..FileConfig::default()
        });
        self
    }
}

/// What the server writes to stderr
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    Off,
    #[default]
    Json,
    /// Colored when stderr is a terminal
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub directory: PathBuf,
    pub rotation: RotationStrategy,
    /// Rotated files kept on disk; `None` keeps all of them
    pub max_files: Option<usize>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            rotation: RotationStrategy::Daily,
            max_files: Some(14),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// One file, truncated at startup
    Never,
}

/// Extra detail carried by JSONL records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonlConfig {
    /// Full span stack, so every line carries the batch and item spans
    pub span_list: bool,
    /// Source file and line
    pub location: bool,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            span_list: true,
            location: false,
        }
    }
}
