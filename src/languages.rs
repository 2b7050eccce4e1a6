//! Locale code → natural-language name registry.
//!
//! The translation prompt names the target language in English ("Portuguese
//! (Brazilian)") rather than by code. Codes not listed here fall back to the
//! code itself.

use std::sync::OnceLock;

/// Metadata for one storefront locale.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Catalog file stem (e.g. "en", "zh-Hant")
    pub code: &'static str,

    /// English name used in prompts (e.g. "Spanish")
    pub name: &'static str,
}

/// Global language registry singleton.
pub struct LanguageRegistry {
    languages: Vec<LanguageConfig>,
}

static REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

impl LanguageRegistry {
    /// Shared registry, built on first use.
    pub fn get() -> &'static LanguageRegistry {
        REGISTRY.get_or_init(|| LanguageRegistry {
            languages: default_languages(),
        })
    }

    /// Case-insensitive lookup; `zh_hant` and `zh-Hant` resolve the same.
    pub fn get_by_code(&self, code: &str) -> Option<&LanguageConfig> {
        let wanted = code.replace('_', "-");
        self.languages
            .iter()
            .find(|lang| lang.code.eq_ignore_ascii_case(&wanted))
    }

    /// English name for `code`, or the code itself when unknown.
    pub fn name_for<'a>(&'a self, code: &'a str) -> &'a str {
        match self.get_by_code(code) {
            Some(lang) => lang.name,
            None => code,
        }
    }
}

fn default_languages() -> Vec<LanguageConfig> {
    let table: &[(&'static str, &'static str)] = &[
        ("ar", "Arabic"),
        ("de", "German"),
        ("en", "English"),
        ("es", "Spanish"),
        ("fr", "French"),
        ("hi", "Hindi"),
        ("id", "Indonesian"),
        ("it", "Italian"),
        ("ja", "Japanese"),
        ("ko", "Korean"),
        ("pt", "Portuguese (Brazilian)"),
        ("ru", "Russian"),
        ("th", "Thai"),
        ("tr", "Turkish"),
        ("vi", "Vietnamese"),
        ("zh", "Simplified Chinese"),
        ("zh-Hant", "Traditional Chinese"),
    ];

    table
        .iter()
        .map(|&(code, name)| LanguageConfig { code, name })
        .collect()
}
