use crate::batch::Batch;
use crate::config::Config;
use crate::error::{SyncError, UnitFailure};
use crate::placeholder::PlaceholderValidator;
use crate::report::ApiMetrics;
use crate::retry::{retry_transient, Backoff};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Prompt pair sent to the translation service for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationPrompt {
    pub system: String,
    pub user: String,
}

/// Failure talking to the translation service.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("translation API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("failed to reach translation API: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("translation API response contained no choices")]
    EmptyResponse,

    #[error("invalid translation API response: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Rate limits, server errors and network failures are transient;
    /// other 4xx responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Status { status, .. } => *status == 429 || *status >= 500,
            BackendError::Transport(_) => true,
            BackendError::EmptyResponse | BackendError::Decode(_) | BackendError::Other(_) => {
                false
            }
        }
    }
}

/// The external translation capability: prompt in, raw model text out.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn complete(&self, prompt: &TranslationPrompt) -> Result<String, BackendError>;
}

// ==================== OpenAI Backend ====================

/// OpenAI Chat Completion request for translation
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// Check if a model is a reasoning model that doesn't support temperature
fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("gpt-5")
        || model.starts_with("o1")
        || model.starts_with("o3")
        || model.starts_with("o4")
}

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    backoff: Backoff,
}

impl OpenAiBackend {
    /// Build from configuration; `None` when no API key is configured.
    pub fn from_config(client: reqwest::Client, config: &Config) -> Option<Self> {
        let api_key = config.openai_api_key.clone()?;
        Some(Self {
            client,
            api_key,
            api_url: config.openai_api_url.clone(),
            model: config.openai_model.clone(),
            temperature: config.openai_temperature,
            max_tokens: config.openai_max_tokens,
            backoff: Backoff::translation(),
        })
    }

    /// Override the retry schedule for transient failures.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    fn build_request(&self, prompt: &TranslationPrompt) -> ChatRequest {
        // Reasoning models need higher token limits and don't support temperature
        let is_reasoning = is_reasoning_model(&self.model);
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
            max_completion_tokens: if is_reasoning {
                self.max_tokens.max(16000)
            } else {
                self.max_tokens
            },
            temperature: if is_reasoning {
                None
            } else {
                Some(self.temperature)
            },
            reasoning_effort: is_reasoning.then(|| "low".to_string()),
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<String, BackendError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(BackendError::Status { status, body });
        }

        let body = response.text().await?;
        let chat_response: ChatResponse =
            serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))?;
        chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(BackendError::EmptyResponse)
    }
}

#[async_trait]
impl TranslationBackend for OpenAiBackend {
    async fn complete(&self, prompt: &TranslationPrompt) -> Result<String, BackendError> {
        let request = self.build_request(prompt);
        retry_transient(
            &self.backoff,
            "Translation batch",
            || self.send(&request),
            BackendError::is_retryable,
        )
        .await
    }
}

// ==================== Invoker ====================

/// Result of translating one batch. Units failing the placeholder check are
/// listed in `rejected`; everything else is in `resolved`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchTranslation {
    pub resolved: BTreeMap<String, String>,
    pub rejected: Vec<UnitFailure>,
}

/// Sends batches to a [`TranslationBackend`] and checks what comes back.
///
/// At most `concurrency_limit` calls are in flight at once across every
/// locale sharing this invoker.
pub struct TranslationInvoker {
    backend: Arc<dyn TranslationBackend>,
    source_language: String,
    domain_context: String,
    limiter: Semaphore,
    metrics: ApiMetrics,
}

impl TranslationInvoker {
    /// Create an invoker sending batches to `backend`.
    ///
    /// # Arguments
    /// * `backend` - Translation service client
    /// * `source_language` - English name of the reference language, e.g. "English"
    /// * `domain_context` - Short description of the product, included in every prompt
    /// * `concurrency_limit` - Maximum calls in flight; 0 is treated as 1
    pub fn new(
        backend: Arc<dyn TranslationBackend>,
        source_language: impl Into<String>,
        domain_context: impl Into<String>,
        concurrency_limit: usize,
    ) -> Self {
        Self {
            backend,
            source_language: source_language.into(),
            domain_context: domain_context.into(),
            limiter: Semaphore::new(concurrency_limit.max(1)),
            metrics: ApiMetrics::new(),
        }
    }

    /// Call counters accumulated so far.
    pub fn metrics(&self) -> &ApiMetrics {
        &self.metrics
    }

    /// Translate one batch into `target_language` (a natural-language name).
    ///
    /// Transport errors, unparsable output and key-set mismatches fail the
    /// whole batch. Placeholder violations reject only the affected unit.
    pub async fn translate(
        &self,
        batch: &Batch,
        target_language: &str,
    ) -> Result<BatchTranslation, SyncError> {
        let batch_error = |reason: String| SyncError::BatchTranslation {
            locale: batch.locale.clone(),
            batch: batch.index,
            reason,
        };

        let texts = batch.source_texts();
        let prompt = build_prompt(
            &texts,
            &self.source_language,
            target_language,
            &self.domain_context,
        )
        .map_err(|e| batch_error(format!("failed to encode batch: {}", e)))?;

        let raw = {
            let _permit = self
                .limiter
                .acquire()
                .await
                .map_err(|e| batch_error(e.to_string()))?;
            debug!(
                "{}: sending batch {} ({} keys)",
                batch.locale,
                batch.index,
                texts.len()
            );
            self.metrics.record_api_call();
            self.backend.complete(&prompt).await
        };

        let translated = raw
            .map_err(|e| e.to_string())
            .and_then(|raw| parse_response(&raw, &texts))
            .map_err(|reason| {
                self.metrics.record_api_failure();
                batch_error(reason)
            })?;

        let mut outcome = BatchTranslation::default();
        for (path, text) in translated {
            let source = texts.get(&path).map(String::as_str).unwrap_or_default();
            let report = PlaceholderValidator::validate(source, &text);
            if report.has_warnings() {
                warn!(
                    "{}: placeholder warnings for '{}': {:?}",
                    batch.locale, path, report.warnings
                );
            }
            if report.has_errors() {
                outcome
                    .rejected
                    .push(UnitFailure::new(path, report.errors.join("; ")));
            } else {
                outcome.resolved.insert(path, text);
            }
        }

        self.metrics.record_rejected_units(outcome.rejected.len());
        Ok(outcome)
    }
}

/// Build the prompt pair for one batch.
pub fn build_prompt(
    texts: &BTreeMap<String, String>,
    source_language: &str,
    target_language: &str,
    domain_context: &str,
) -> Result<TranslationPrompt, serde_json::Error> {
    let texts_json = serde_json::to_string_pretty(texts)?;

    let mut placeholders: Vec<&str> = Vec::new();
    for text in texts.values() {
        for placeholder in PlaceholderValidator::extract(text) {
            if !placeholders.contains(&placeholder) {
                placeholders.push(placeholder);
            }
        }
    }
    let placeholder_note = if placeholders.is_empty() {
        String::new()
    } else {
        format!(
            "Placeholders in these texts that must appear unchanged: {}\n\n",
            placeholders.join(", ")
        )
    };

    let system = format!(
        "You are a professional translator specializing in {}. Return only valid JSON.",
        target_language
    );
    let user = format!(
        r#"Translate the following JSON key-value pairs from {source} to {target}.
Context: {context}

Important rules:
1. Keep all {{{{variable}}}} placeholders exactly as they are (e.g., {{{{count}}}})
2. Translate naturally and professionally for the target language
3. Keep the same JSON structure with the same keys
4. Use culturally appropriate terms for domain-specific vocabulary
5. Return ONLY valid JSON, no explanation

{placeholders}Texts to translate:
{texts}"#,
        source = source_language,
        target = target_language,
        context = domain_context,
        placeholders = placeholder_note,
        texts = texts_json
    );

    Ok(TranslationPrompt { system, user })
}

/// Remove markdown code fencing the model may wrap around its JSON.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // The opening fence line may carry a language tag ("```json").
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse the service output and require exactly the submitted key set.
pub fn parse_response(
    raw: &str,
    expected: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, String> {
    let body = strip_code_fence(raw);
    let parsed: BTreeMap<String, String> = serde_json::from_str(body)
        .map_err(|e| format!("response is not a JSON object of strings: {}", e))?;

    let missing: Vec<&str> = expected
        .keys()
        .filter(|key| !parsed.contains_key(*key))
        .map(String::as_str)
        .collect();
    let extra: Vec<&str> = parsed
        .keys()
        .filter(|key| !expected.contains_key(*key))
        .map(String::as_str)
        .collect();

    if !missing.is_empty() || !extra.is_empty() {
        return Err(format!(
            "key set mismatch (missing: {:?}, unexpected: {:?})",
            missing, extra
        ));
    }

    Ok(parsed)
}
