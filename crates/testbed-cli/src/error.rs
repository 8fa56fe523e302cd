//! Error types for the testbed CLI.

use std::path::PathBuf;

use testbed_core::app::{BuildError, RegistryError};
use testbed_core::config::ConfigError;
use thiserror::Error;

pub(crate) type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub(crate) enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{} already exists (use --force to overwrite)", .0.display())]
    Exists(PathBuf),

    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot determine the current directory: {0}")]
    CurrentDir(#[source] std::io::Error),

    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}
