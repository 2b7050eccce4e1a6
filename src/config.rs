use crate::error::SyncError;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

const DEFAULT_DOMAIN_CONTEXT: &str =
    "A spiritual and cultural e-commerce website about traditional wisdom and Buddhist services";

#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub locales_dir: PathBuf,
    pub reference_locale: String,
    pub target_locales: Vec<String>,

    // Diffing
    pub excluded_paths: Vec<String>,
    pub detect_fallback: bool,
    pub prune_drift: bool,

    // Batching
    pub batch_size: usize,
    pub concurrency_limit: usize,

    // Content resolution
    pub domain_context: String,
    pub direct_values_file: Option<PathBuf>,
    pub fallback_locale: Option<String>,
    pub fill_with_reference: bool,

    // OpenAI
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_api_url: String,
    pub openai_temperature: f32,
    pub openai_max_tokens: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Only `TARGET_LOCALES` is required; everything else has a default.
    /// Call [`Config::validate`] before using the result.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            // Storage
            locales_dir: PathBuf::from(
                std::env::var("LOCALES_DIR")
                    .unwrap_or_else(|_| "client/src/i18n/locales".to_string()),
            ),
            reference_locale: std::env::var("REFERENCE_LOCALE")
                .unwrap_or_else(|_| "en".to_string()),
            target_locales: parse_list(
                &std::env::var("TARGET_LOCALES").context("TARGET_LOCALES not set")?,
            ),

            // Diffing
            excluded_paths: std::env::var("EXCLUDED_PATHS")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            detect_fallback: env_flag("DETECT_FALLBACK", true)?,
            prune_drift: env_flag("PRUNE_DRIFT", false)?,

            // Batching
            batch_size: env_parse("BATCH_SIZE", 50)?,
            concurrency_limit: env_parse("CONCURRENCY_LIMIT", 4)?,

            // Content resolution
            domain_context: std::env::var("DOMAIN_CONTEXT")
                .unwrap_or_else(|_| DEFAULT_DOMAIN_CONTEXT.to_string()),
            direct_values_file: non_empty_var("DIRECT_VALUES_FILE").map(PathBuf::from),
            fallback_locale: non_empty_var("FALLBACK_LOCALE"),
            fill_with_reference: env_flag("FILL_WITH_REFERENCE", false)?,

            // OpenAI - optional, translation is disabled without a key
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4.1-mini".to_string()),
            openai_api_url: std::env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_API_URL.to_string()),
            openai_temperature: env_parse("OPENAI_TEMPERATURE", 0.3)?,
            openai_max_tokens: env_parse("OPENAI_MAX_TOKENS", 4000)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.batch_size == 0 {
            return Err(SyncError::configuration("BATCH_SIZE must be at least 1"));
        }
        if self.concurrency_limit == 0 {
            return Err(SyncError::configuration(
                "CONCURRENCY_LIMIT must be at least 1",
            ));
        }
        if self.reference_locale.trim().is_empty() {
            return Err(SyncError::configuration("REFERENCE_LOCALE is empty"));
        }
        if self.target_locales.is_empty() {
            return Err(SyncError::configuration(
                "TARGET_LOCALES must name at least one locale",
            ));
        }
        if self.target_locales.contains(&self.reference_locale) {
            return Err(SyncError::configuration(format!(
                "TARGET_LOCALES must not include the reference locale '{}'",
                self.reference_locale
            )));
        }
        Ok(())
    }

    /// Whether an OpenAI API key was provided.
    pub fn translation_enabled(&self) -> bool {
        self.openai_api_key.is_some()
    }
}

/// Split a comma-separated list, dropping blanks and duplicates.
fn parse_list(value: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !items.iter().any(|existing| existing == item) {
            items.push(item.to_string());
        }
    }
    items
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty_var(name) {
        Some(value) => value
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", name, value)),
        None => Ok(default),
    }
}

fn env_flag(name: &str, default: bool) -> Result<bool> {
    match non_empty_var(name) {
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("{} must be a boolean, got: {}", name, value),
        },
        None => Ok(default),
    }
}
