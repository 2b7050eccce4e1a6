//! Hand-authored content supplied without calling the translation service.
//!
//! The pipeline only sees [`ContentProvider`]; where the strings come from
//! (a JSON table on disk, a static map in a test) is not its concern.

use crate::error::SyncError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub trait ContentProvider: Send + Sync {
    /// Authored text for `path` in `locale`, if any.
    fn get(&self, locale: &str, path: &str) -> Option<String>;

    /// Every path this provider has content for in `locale`, sorted.
    fn paths(&self, _locale: &str) -> Vec<String> {
        Vec::new()
    }
}

/// `{locale: {dotted_path: text}}` tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct DirectValues {
    tables: BTreeMap<String, BTreeMap<String, String>>,
}

impl DirectValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `{locale: {path: text}}` JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(|e| {
            SyncError::configuration(format!("invalid direct-value table: {}", e))
        })
    }

    /// Read and parse the table at `path`.
    ///
    /// # Returns
    /// An I/O error if the file cannot be read, a configuration error if it
    /// is not a valid table.
    pub fn from_file(path: &Path) -> Result<Self, SyncError> {
        let text = fs::read_to_string(path).map_err(|source| SyncError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Add or replace the text for `path` in `locale`'s table.
    pub fn insert(
        &mut self,
        locale: impl Into<String>,
        path: impl Into<String>,
        text: impl Into<String>,
    ) -> &mut Self {
        self.tables
            .entry(locale.into())
            .or_default()
            .insert(path.into(), text.into());
        self
    }

    /// Locales that have a table, in sorted order.
    pub fn locales(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Total number of values across all locales.
    pub fn len(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContentProvider for DirectValues {
    fn get(&self, locale: &str, path: &str) -> Option<String> {
        self.tables.get(locale)?.get(path).cloned()
    }

    fn paths(&self, locale: &str) -> Vec<String> {
        self.tables
            .get(locale)
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default()
    }
}
