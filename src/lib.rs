//! Keeps locale catalogs in line with a reference catalog: finds missing and
//! untranslated keys, fills them from authored values or a translation
//! service, and writes the catalogs back without disturbing existing content.

pub mod batch;
pub mod catalog;
pub mod config;
pub mod diff;
pub mod error;
pub mod flatten;
pub mod languages;
pub mod merge;
pub mod orchestrator;
pub mod placeholder;
pub mod provider;
pub mod report;
pub mod retry;
pub mod translation;

pub use error::{SyncError, UnitFailure};
pub use orchestrator::Orchestrator;
