//! Placeholder preservation checks for translated strings.
//!
//! Interpolation parameters such as `{{count}}` must survive translation
//! byte-for-byte, otherwise the storefront renders a broken string.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Validation report containing errors and warnings about one translation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    /// Placeholders from the source that the translation dropped or altered
    pub errors: Vec<String>,

    /// Suspicious but acceptable differences
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// True when the translation must be rejected.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        !self.has_errors() && !self.has_warnings()
    }
}

/// Checks `{{name}}` placeholders between a source text and its translation.
pub struct PlaceholderValidator;

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

impl PlaceholderValidator {
    /// Check that every placeholder in `source` appears verbatim in `translated`.
    ///
    /// A missing placeholder is an error. New placeholders, or a placeholder
    /// appearing a different number of times, are warnings.
    pub fn validate(source: &str, translated: &str) -> ValidationReport {
        let mut report = ValidationReport::default();
        let source_counts = Self::count(source);
        let translated_counts = Self::count(translated);

        for (placeholder, expected) in &source_counts {
            match translated_counts.get(placeholder) {
                None => report
                    .errors
                    .push(format!("missing placeholder {}", placeholder)),
                Some(found) if found != expected => report.warnings.push(format!(
                    "placeholder {} appears {} time(s), source has {}",
                    placeholder, found, expected
                )),
                Some(_) => {}
            }
        }

        for placeholder in translated_counts.keys() {
            if !source_counts.contains_key(placeholder) {
                report
                    .warnings
                    .push(format!("unexpected placeholder {}", placeholder));
            }
        }

        report
    }

    /// Distinct placeholders in order of first appearance.
    pub fn extract(text: &str) -> Vec<&str> {
        let mut seen = Vec::new();
        for m in Self::regex().find_iter(text) {
            if !seen.contains(&m.as_str()) {
                seen.push(m.as_str());
            }
        }
        seen
    }

    fn count(text: &str) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for m in Self::regex().find_iter(text) {
            *counts.entry(m.as_str()).or_insert(0) += 1;
        }
        counts
    }

    fn regex() -> &'static Regex {
        PLACEHOLDER_REGEX.get_or_init(|| Regex::new(r"\{\{[^{}]+\}\}").unwrap())
    }
}
