//! Load boundary errors
//!
//! Only reading configuration and procedure data can fail. Everything past
//! the loaders clamps or degrades instead of returning errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{table} table is missing required column `{column}`")]
    MissingColumn { table: &'static str, column: &'static str },

    #[error("{table} table has no header row")]
    EmptyTable { table: &'static str },

    #[error("invalid configuration value `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

impl LoadError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LoadError::Io { path: path.into(), source }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        LoadError::Json { path: path.into(), source }
    }

    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        LoadError::InvalidConfig { field, reason: reason.into() }
    }
}
