//! CLI-specific error types

use thiserror::Error;

/// Errors that stop a reconciliation run before it starts
#[derive(Debug, Error)]
pub enum CliError {
    /// Gate construction or other core error
    #[error(transparent)]
    Core(#[from] viewgate_core::Error),

    /// Manifest could not be loaded
    #[error("Manifest error: {0}")]
    Catalog(#[from] viewgate_core::CatalogError),

    /// Configuration file could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] viewgate_core::ConfigError),

    /// Permission database could not be opened
    #[error("Storage error: {0}")]
    Storage(#[from] viewgate_core::PermissionStoreError),

    /// Messages file is not valid JSON
    #[error("Invalid messages file: {0}")]
    Messages(#[from] serde_json::Error),

    /// IO error (filesystem, stdout, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid combination of options
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}
