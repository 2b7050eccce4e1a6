//! Splitting pending translation work into service-sized batches.

use crate::error::SyncError;
use std::collections::BTreeMap;

/// One key path awaiting translation into one locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationUnit {
    pub path: String,
    pub source: String,
    pub locale: String,
}

impl TranslationUnit {
    /// Create a unit translating `source` (the reference text at `path`)
    /// into `locale`.
    pub fn new(path: impl Into<String>, source: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            locale: locale.into(),
        }
    }
}

/// An ordered group of units for a single locale, submitted once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Position of this batch within its locale's run (0-based)
    pub index: usize,
    pub locale: String,
    pub units: Vec<TranslationUnit>,
}

impl Batch {
    /// Number of units in the batch.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// `{path: source_text}` as sent to the translation service.
    pub fn source_texts(&self) -> BTreeMap<String, String> {
        self.units
            .iter()
            .map(|unit| (unit.path.clone(), unit.source.clone()))
            .collect()
    }

    /// Key paths of the batch, in submission order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(|unit| unit.path.as_str())
    }
}

/// Split `units` in their given order into batches of at most `max_size`.
///
/// A batch never spans two locales: a locale change starts a new batch even
/// when the current one has room. Batch indices restart at 0 for each locale.
pub fn chunk(units: Vec<TranslationUnit>, max_size: usize) -> Result<Vec<Batch>, SyncError> {
    if max_size == 0 {
        return Err(SyncError::configuration("batch size must be at least 1"));
    }

    let mut batches: Vec<Batch> = Vec::new();
    for unit in units {
        let (has_room, next_index) = match batches.last() {
            Some(batch) if batch.locale == unit.locale => {
                (batch.len() < max_size, batch.index + 1)
            }
            _ => (false, 0),
        };

        if has_room {
            if let Some(batch) = batches.last_mut() {
                batch.units.push(unit);
            }
        } else {
            batches.push(Batch {
                index: next_index,
                locale: unit.locale.clone(),
                units: vec![unit],
            });
        }
    }

    Ok(batches)
}
