//! Per-locale outcomes, run summary and translation-service metrics.

use crate::error::UnitFailure;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

/// Lifecycle of one locale within a run.
///
/// `PENDING -> LOADED -> DIFFED -> [TRANSLATING ->] MERGED -> SAVED`, with
/// `SKIPPED` (no catalog) and `FAILED` (load/parse/save error) as the other
/// terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocaleState {
    Pending,
    Loaded,
    Diffed,
    Translating,
    Merged,
    Saved,
    Skipped,
    Failed,
}

impl LocaleState {
    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_advance_to(self, next: LocaleState) -> bool {
        use LocaleState::*;
        match (self, next) {
            (Pending, Loaded | Skipped | Failed) => true,
            (Loaded, Diffed | Failed) => true,
            (Diffed, Translating | Merged | Failed) => true,
            (Translating, Merged | Failed) => true,
            (Merged, Saved | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LocaleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LocaleState::Pending => "PENDING",
            LocaleState::Loaded => "LOADED",
            LocaleState::Diffed => "DIFFED",
            LocaleState::Translating => "TRANSLATING",
            LocaleState::Merged => "MERGED",
            LocaleState::Saved => "SAVED",
            LocaleState::Skipped => "SKIPPED",
            LocaleState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Outcome of synchronizing one target locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocaleReport {
    pub locale: String,
    pub state: LocaleState,
    /// Missing keys filled from the locale's own direct-value table
    pub added_direct: usize,
    /// Keys the translation service changed or added
    pub translated: usize,
    /// Translations identical to the text already in the catalog
    pub unchanged: usize,
    /// Missing keys filled from the fallback table or reference text
    pub fallback: usize,
    /// Fallback-equal keys left alone by the exclusion policy
    pub excluded: usize,
    /// Keys still missing or fallback-equal with no way to resolve them
    pub pending: usize,
    /// Drift groups removed before diffing
    pub drift_removed: usize,
    pub failed: Vec<UnitFailure>,
    /// Whether the catalog file was rewritten
    pub written: bool,
    /// Why the locale was skipped or failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LocaleReport {
    /// Fresh `PENDING` report with all counters at zero.
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            state: LocaleState::Pending,
            added_direct: 0,
            translated: 0,
            unchanged: 0,
            fallback: 0,
            excluded: 0,
            pending: 0,
            drift_removed: 0,
            failed: Vec::new(),
            written: false,
            error: None,
        }
    }

    /// Move to `next`, logging the transition.
    pub fn advance(&mut self, next: LocaleState) {
        if !self.state.can_advance_to(next) {
            warn!(
                "{}: unexpected state transition {} -> {}",
                self.locale, self.state, next
            );
        }
        info!("{}: {} -> {}", self.locale, self.state, next);
        self.state = next;
    }

    /// Record why the locale was skipped and move to `SKIPPED`.
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.error = Some(reason.into());
        self.advance(LocaleState::Skipped);
    }

    /// Record the error and move to `FAILED`.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.error = Some(reason.into());
        self.advance(LocaleState::Failed);
    }

    /// Keys added or rewritten by this run.
    pub fn changed(&self) -> usize {
        self.added_direct + self.translated + self.fallback
    }

    /// One human-readable line for the end-of-run summary.
    ///
    /// # Returns
    /// `"<locale>: <STATE> (<reason>)"` for skipped and failed locales,
    /// otherwise the state followed by every counter.
    pub fn summary_line(&self) -> String {
        match self.state {
            LocaleState::Skipped | LocaleState::Failed => format!(
                "{}: {} ({})",
                self.locale,
                self.state,
                self.error.as_deref().unwrap_or("no details")
            ),
            _ => format!(
                "{}: {} (direct: {}, translated: {}, unchanged: {}, fallback: {}, excluded: {}, pending: {}, failed: {})",
                self.locale,
                self.state,
                self.added_direct,
                self.translated,
                self.unchanged,
                self.fallback,
                self.excluded,
                self.pending,
                self.failed.len()
            ),
        }
    }
}

/// Summary of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub reference_locale: String,
    /// Why the reference catalog could not be used, if it could not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_error: Option<String>,
    pub locales: Vec<LocaleReport>,
    pub api: MetricsReport,
}

impl RunReport {
    /// True when any locale ended in `FAILED`; drives the exit status.
    pub fn has_failed_locale(&self) -> bool {
        self.locales
            .iter()
            .any(|report| report.state == LocaleState::Failed)
    }

    /// Report for the locale `code`, if it was a target of this run.
    pub fn locale(&self, code: &str) -> Option<&LocaleReport> {
        self.locales.iter().find(|report| report.locale == code)
    }

    /// Keys added or rewritten across all locales.
    pub fn total_changed(&self) -> usize {
        self.locales.iter().map(LocaleReport::changed).sum()
    }

    /// `(locale, failure)` for every key path that could not be resolved.
    pub fn failed_paths(&self) -> Vec<(&str, &UnitFailure)> {
        self.locales
            .iter()
            .flat_map(|report| {
                report
                    .failed
                    .iter()
                    .map(move |failure| (report.locale.as_str(), failure))
            })
            .collect()
    }
}

/// Counters for calls made to the translation service during one run.
#[derive(Debug, Default)]
pub struct ApiMetrics {
    api_calls: AtomicUsize,
    api_failures: AtomicUsize,
    rejected_units: AtomicUsize,
}

impl ApiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request sent to the translation service.
    pub fn record_api_call(&self) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one batch whose request ultimately failed.
    pub fn record_api_failure(&self) {
        self.api_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Units dropped because their translation broke a placeholder.
    pub fn record_rejected_units(&self, count: usize) {
        self.rejected_units.fetch_add(count, Ordering::Relaxed);
    }

    /// Snapshot of the counters with the derived success rate.
    pub fn report(&self) -> MetricsReport {
        let calls = self.api_calls.load(Ordering::Relaxed);
        let failures = self.api_failures.load(Ordering::Relaxed);
        let api_success_rate = if calls > 0 {
            (calls.saturating_sub(failures) as f64 / calls as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            api_calls: calls,
            api_failures: failures,
            api_success_rate,
            rejected_units: self.rejected_units.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsReport {
    pub api_calls: usize,
    pub api_failures: usize,
    /// Percentage (0-100) of calls that returned a usable batch
    pub api_success_rate: f64,
    pub rejected_units: usize,
}
