//! Top-level error types for viewgate
//!
//! This module provides a simplified, user-facing error type that flattens
//! the per-concern error enums into actionable categories.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::enforce::EnforcementError;
use crate::reconcile::ReconcileError;
use crate::store::PermissionStoreError;

/// Top-level error type for viewgate operations
///
/// - [`Error::ApplicationNotFound`] - Fix the application name
/// - [`Error::Catalog`] - Fix the handler registry or manifest
/// - [`Error::StoreUnavailable`] - Storage is down, wait and retry
/// - [`Error::Store`] - Storage rejected the operation
/// - [`Error::Config`] - Fix configuration
#[derive(Debug, Error)]
pub enum Error {
    /// The identifier does not name a loaded application
    #[error("application not found: {0}")]
    ApplicationNotFound(String),

    /// The handler catalog is invalid
    #[error("catalog error: {0}")]
    Catalog(String),

    /// The permission store could not be reached
    #[error("permission store unavailable: {0}")]
    StoreUnavailable(String),

    /// The permission store rejected the operation (duplicate key, corrupt data)
    #[error("permission store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if an application was not found
    pub fn is_application_not_found(&self) -> bool {
        matches!(self, Self::ApplicationNotFound(_))
    }

    /// Returns true if this is a catalog error
    pub fn is_catalog(&self) -> bool {
        matches!(self, Self::Catalog(_))
    }

    /// Returns true if the store is unavailable
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Returns true if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this error is potentially retryable
    ///
    /// Only store outages are retryable. Everything else needs a fix to the
    /// registry, configuration or stored data first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl From<CatalogError> for Error {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::ApplicationNotFound(app) => Self::ApplicationNotFound(app.to_string()),
            other => Self::Catalog(other.to_string()),
        }
    }
}

impl From<PermissionStoreError> for Error {
    fn from(err: PermissionStoreError) -> Self {
        if err.is_retryable() {
            Self::StoreUnavailable(err.to_string())
        } else {
            Self::Store(err.to_string())
        }
    }
}

impl From<ReconcileError> for Error {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::ApplicationNotFound(app) => Self::ApplicationNotFound(app.to_string()),
            ReconcileError::Catalog(msg) => Self::Catalog(msg),
            ReconcileError::StoreUnavailable(e) => e.into(),
        }
    }
}

impl From<EnforcementError> for Error {
    fn from(err: EnforcementError) -> Self {
        match err {
            EnforcementError::StoreUnavailable(e) => e.into(),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for viewgate operations
pub type Result<T> = std::result::Result<T, Error>;
