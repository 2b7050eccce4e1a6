//! Error taxonomy for the synchronization pipeline.
//!
//! Per-unit failures (a placeholder dropped from one translated string) are
//! not errors; they travel as [`UnitFailure`] records inside batch outcomes so
//! the rest of the batch can still be merged.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Catalog file for a configured locale is absent. The locale is skipped.
    #[error("catalog for locale '{locale}' not found at {}", path.display())]
    CatalogNotFound { locale: String, path: PathBuf },

    /// Catalog document is not a tree of strings.
    #[error("malformed catalog for locale '{locale}': {reason}")]
    MalformedCatalog { locale: String, reason: String },

    /// One batch could not be translated; only its units are affected.
    #[error("batch {batch} for locale '{locale}' failed: {reason}")]
    BatchTranslation {
        locale: String,
        batch: usize,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Reading or writing catalog storage failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub fn configuration(message: impl Into<String>) -> Self {
        SyncError::Configuration(message.into())
    }

    /// [`SyncError::MalformedCatalog`] for `locale`.
    pub fn malformed(locale: &str, reason: impl Into<String>) -> Self {
        SyncError::MalformedCatalog {
            locale: locale.to_string(),
            reason: reason.into(),
        }
    }
}

/// A single key path that could not be resolved, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    pub path: String,
    pub reason: String,
}

impl UnitFailure {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
