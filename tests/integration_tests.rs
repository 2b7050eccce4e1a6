//! Integration tests for locale-sync
//!
//! These tests drive the whole pipeline through the public API against
//! catalogs in temporary directories.

use async_trait::async_trait;
use locale_sync::catalog::CatalogStore;
use locale_sync::config::Config;
use locale_sync::provider::DirectValues;
use locale_sync::report::LocaleState;
use locale_sync::translation::{BackendError, TranslationBackend, TranslationPrompt};
use locale_sync::Orchestrator;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

// ==================== Test Helpers ====================

fn create_test_config(dir: &Path, targets: &[&str]) -> Config {
    Config {
        locales_dir: dir.to_path_buf(),
        reference_locale: "en".to_string(),
        target_locales: targets.iter().map(|t| t.to_string()).collect(),
        excluded_paths: vec![],
        detect_fallback: true,
        prune_drift: false,
        batch_size: 50,
        concurrency_limit: 2,
        domain_context: "A storefront for handmade goods".to_string(),
        direct_values_file: None,
        fallback_locale: None,
        fill_with_reference: false,
        openai_api_key: None,
        openai_model: "gpt-4.1-mini".to_string(),
        openai_api_url: "http://localhost".to_string(),
        openai_temperature: 0.3,
        openai_max_tokens: 4000,
    }
}

fn write_catalog(dir: &Path, locale: &str, text: &str) {
    std::fs::write(dir.join(format!("{}.json", locale)), text).expect("Failed to write catalog");
}

fn read_catalog(dir: &Path, locale: &str) -> String {
    std::fs::read_to_string(dir.join(format!("{}.json", locale))).expect("Failed to read catalog")
}

/// Pull the `{path: text}` object out of a translation prompt.
fn prompt_texts(prompt: &TranslationPrompt) -> BTreeMap<String, String> {
    let marker = "Texts to translate:\n";
    let start = prompt.user.find(marker).expect("prompt has texts") + marker.len();
    serde_json::from_str(&prompt.user[start..]).expect("texts are JSON")
}

/// Translates by upper-casing, keeping `{{placeholders}}` intact.
#[derive(Default)]
struct UpperBackend {
    calls: AtomicUsize,
}

#[async_trait]
impl TranslationBackend for UpperBackend {
    async fn complete(&self, prompt: &TranslationPrompt) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let translated: BTreeMap<String, String> = prompt_texts(prompt)
            .into_iter()
            .map(|(path, text)| {
                let upper = text
                    .split("{{")
                    .enumerate()
                    .map(|(i, part)| match (i, part.split_once("}}")) {
                        (0, _) | (_, None) => part.to_uppercase(),
                        (_, Some((name, rest))) => format!("{{{{{}}}}}{}", name, rest.to_uppercase()),
                    })
                    .collect::<String>();
                (path, upper)
            })
            .collect();
        Ok(serde_json::to_string(&translated).expect("serialize"))
    }
}

/// Fails any batch containing a path that starts with `poison`.
struct PoisonBackend;

#[async_trait]
impl TranslationBackend for PoisonBackend {
    async fn complete(&self, prompt: &TranslationPrompt) -> Result<String, BackendError> {
        let texts = prompt_texts(prompt);
        if texts.keys().any(|path| path.starts_with("poison")) {
            return Err(BackendError::Status {
                status: 400,
                body: "content policy".to_string(),
            });
        }
        let translated: BTreeMap<String, String> = texts
            .into_iter()
            .map(|(path, text)| (path, format!("~{}", text)))
            .collect();
        Ok(serde_json::to_string(&translated).expect("serialize"))
    }
}

/// Records the highest number of overlapping calls.
#[derive(Default)]
struct SlowBackend {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl TranslationBackend for SlowBackend {
    async fn complete(&self, prompt: &TranslationPrompt) -> Result<String, BackendError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(serde_json::to_string(&prompt_texts(prompt)).expect("serialize"))
    }
}

fn numbered_catalog(count: usize) -> String {
    let entries: serde_json::Map<String, serde_json::Value> = (0..count)
        .map(|i| (format!("key{:03}", i), serde_json::Value::String(format!("Text {}", i))))
        .collect();
    serde_json::to_string_pretty(&serde_json::json!({ "items": entries })).expect("serialize")
}

// ==================== Pipeline Tests ====================

#[tokio::test]
async fn test_direct_value_scenario_end_to_end() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    write_catalog(temp_dir.path(), "en", r#"{"a": {"b": "X", "c": "Y"}}"#);
    write_catalog(temp_dir.path(), "ja", r#"{"a": {"b": "X"}}"#);

    let mut values = DirectValues::new();
    values.insert("ja", "a.c", "Z");

    let report = Orchestrator::new(create_test_config(temp_dir.path(), &["ja"]))
        .expect("valid config")
        .with_provider(Arc::new(values))
        .run()
        .await;

    let ja = report.locale("ja").expect("ja report");
    assert_eq!(ja.state, LocaleState::Saved);
    assert_eq!(ja.added_direct, 1);

    let saved: serde_json::Value =
        serde_json::from_str(&read_catalog(temp_dir.path(), "ja")).expect("valid JSON");
    assert_eq!(saved, serde_json::json!({"a": {"b": "X", "c": "Z"}}));
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    write_catalog(
        temp_dir.path(),
        "en",
        r#"{"cart": {"title": "Your cart", "count": "{{count}} items"}, "footer": "Thanks"}"#,
    );
    write_catalog(temp_dir.path(), "fr", r#"{"footer": "Merci"}"#);

    let backend = Arc::new(UpperBackend::default());
    let orchestrator = Orchestrator::new(create_test_config(temp_dir.path(), &["fr"]))
        .expect("valid config")
        .with_backend(backend.clone());

    let first = orchestrator.run().await;
    assert_eq!(first.locale("fr").expect("fr").translated, 2);
    assert!(first.locale("fr").expect("fr").written);
    let after_first = read_catalog(temp_dir.path(), "fr");
    assert!(after_first.contains("\"{{count}} ITEMS\""));
    assert!(after_first.contains("\"footer\": \"Merci\""));

    let second = orchestrator.run().await;
    let fr = second.locale("fr").expect("fr");
    assert_eq!(fr.translated, 0);
    assert_eq!(fr.changed(), 0);
    assert!(!fr.written);
    assert_eq!(read_catalog(temp_dir.path(), "fr"), after_first);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_existing_translations_survive_merge() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    write_catalog(
        temp_dir.path(),
        "en",
        r#"{"nav": {"home": "Home", "shop": "Shop"}, "legal": "Terms"}"#,
    );
    write_catalog(
        temp_dir.path(),
        "de",
        r#"{"legal": "AGB", "nav": {"home": "Startseite"}, "extra": "Nur hier"}"#,
    );

    Orchestrator::new(create_test_config(temp_dir.path(), &["de"]))
        .expect("valid config")
        .with_backend(Arc::new(UpperBackend::default()))
        .run()
        .await;

    let (catalog, _) = CatalogStore::new(temp_dir.path()).load("de").expect("load");
    assert_eq!(catalog.leaf("legal"), Some("AGB"));
    assert_eq!(catalog.leaf("nav.home"), Some("Startseite"));
    assert_eq!(catalog.leaf("nav.shop"), Some("SHOP"));
    assert_eq!(catalog.leaf("extra"), Some("Nur hier"));

    // Existing key order is kept and the new key lands at the end of its group
    let keys: Vec<&String> = catalog.root().keys().collect();
    assert_eq!(keys, vec!["legal", "nav", "extra"]);
    let nav_keys: Vec<&String> = catalog
        .get("nav")
        .and_then(|node| node.as_group())
        .expect("nav group")
        .keys()
        .collect();
    assert_eq!(nav_keys, vec!["home", "shop"]);
}

#[tokio::test]
async fn test_120_missing_keys_use_three_batches() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    write_catalog(temp_dir.path(), "en", &numbered_catalog(120));
    write_catalog(temp_dir.path(), "ko", "{}");

    let backend = Arc::new(UpperBackend::default());
    let report = Orchestrator::new(create_test_config(temp_dir.path(), &["ko"]))
        .expect("valid config")
        .with_backend(backend.clone())
        .run()
        .await;

    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.api.api_calls, 3);
    assert_eq!(report.locale("ko").expect("ko").translated, 120);
}

// ==================== Failure Isolation Tests ====================

#[tokio::test]
async fn test_failed_batch_does_not_block_others() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    write_catalog(
        temp_dir.path(),
        "en",
        r#"{"a": "Alpha", "b": "Beta", "poison": "Gamma", "z": "Zeta"}"#,
    );
    write_catalog(temp_dir.path(), "es", "{}");

    let config = Config {
        batch_size: 2,
        ..create_test_config(temp_dir.path(), &["es"])
    };
    let report = Orchestrator::new(config)
        .expect("valid config")
        .with_backend(Arc::new(PoisonBackend))
        .run()
        .await;

    // Batches: [a, b] ok, [poison, z] failed
    let es = report.locale("es").expect("es");
    assert_eq!(es.state, LocaleState::Saved);
    assert_eq!(es.translated, 2);
    let failed: Vec<&str> = es.failed.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(failed, vec!["poison", "z"]);
    assert!(es.failed[0].reason.contains("400"));
    assert!(!report.has_failed_locale());
    assert_eq!(report.api.api_failures, 1);

    let (catalog, _) = CatalogStore::new(temp_dir.path()).load("es").expect("load");
    assert_eq!(catalog.leaf("a"), Some("~Alpha"));
    assert_eq!(catalog.leaf("b"), Some("~Beta"));
    assert_eq!(catalog.leaf("poison"), None);
}

#[tokio::test]
async fn test_skipped_and_failed_locales_do_not_affect_others() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    write_catalog(temp_dir.path(), "en", r#"{"greeting": "Hello"}"#);
    write_catalog(temp_dir.path(), "it", "{ not json");
    write_catalog(temp_dir.path(), "pt", "{}");

    let report = Orchestrator::new(create_test_config(temp_dir.path(), &["vi", "it", "pt"]))
        .expect("valid config")
        .with_backend(Arc::new(UpperBackend::default()))
        .run()
        .await;

    assert_eq!(report.locale("vi").expect("vi").state, LocaleState::Skipped);
    assert_eq!(report.locale("it").expect("it").state, LocaleState::Failed);
    assert_eq!(report.locale("pt").expect("pt").state, LocaleState::Saved);
    assert!(report.has_failed_locale());
    assert!(!temp_dir.path().join("vi.json").exists());
    assert_eq!(read_catalog(temp_dir.path(), "it"), "{ not json");
}

#[tokio::test]
async fn test_placeholder_loss_rejects_only_that_key() {
    struct DropPlaceholder;

    #[async_trait]
    impl TranslationBackend for DropPlaceholder {
        async fn complete(&self, prompt: &TranslationPrompt) -> Result<String, BackendError> {
            let translated: BTreeMap<String, String> = prompt_texts(prompt)
                .into_iter()
                .map(|(path, text)| (path, text.replace("{{count}}", "some")))
                .collect();
            Ok(serde_json::to_string(&translated).expect("serialize"))
        }
    }

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    write_catalog(
        temp_dir.path(),
        "en",
        r#"{"stock": {"left": "Only {{count}} left", "out": "Sold out"}}"#,
    );
    write_catalog(temp_dir.path(), "th", "{}");

    let report = Orchestrator::new(create_test_config(temp_dir.path(), &["th"]))
        .expect("valid config")
        .with_backend(Arc::new(DropPlaceholder))
        .run()
        .await;

    let th = report.locale("th").expect("th");
    assert_eq!(th.translated, 1);
    assert_eq!(th.failed.len(), 1);
    assert_eq!(th.failed[0].path, "stock.left");
    assert_eq!(report.api.rejected_units, 1);

    let (catalog, _) = CatalogStore::new(temp_dir.path()).load("th").expect("load");
    assert_eq!(catalog.leaf("stock.out"), Some("Sold out"));
    assert_eq!(catalog.leaf("stock.left"), None);
}

// ==================== Concurrency Tests ====================

#[tokio::test]
async fn test_concurrency_limit_bounds_in_flight_calls() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    write_catalog(temp_dir.path(), "en", &numbered_catalog(30));
    for locale in ["fr", "de", "es", "it"] {
        write_catalog(temp_dir.path(), locale, "{}");
    }

    let backend = Arc::new(SlowBackend::default());
    let config = Config {
        batch_size: 5,
        concurrency_limit: 2,
        ..create_test_config(temp_dir.path(), &["fr", "de", "es", "it"])
    };
    let report = Orchestrator::new(config)
        .expect("valid config")
        .with_backend(backend.clone())
        .run()
        .await;

    assert_eq!(report.api.api_calls, 24);
    assert!(backend.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert!(report.locales.iter().all(|r| r.state == LocaleState::Saved));
    let order: Vec<&str> = report.locales.iter().map(|r| r.locale.as_str()).collect();
    assert_eq!(order, vec!["fr", "de", "es", "it"]);
}

// ==================== OpenAI End-to-End Tests ====================

#[tokio::test]
async fn test_openai_backend_end_to_end() {
    let mock_server = MockServer::start().await;
    let content = "```json\n{\"welcome\": \"Bienvenue\"}\n```";

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer test-openai-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": content}}
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    write_catalog(temp_dir.path(), "en", r#"{"welcome": "Welcome"}"#);
    write_catalog(temp_dir.path(), "fr", "{}");

    let config = Config {
        openai_api_key: Some("test-openai-key".to_string()),
        openai_api_url: format!("{}/v1/chat/completions", mock_server.uri()),
        ..create_test_config(temp_dir.path(), &["fr"])
    };
    let report = Orchestrator::from_config(config, reqwest::Client::new())
        .expect("valid config")
        .run()
        .await;

    assert_eq!(report.locale("fr").expect("fr").translated, 1);
    assert_eq!(
        read_catalog(temp_dir.path(), "fr"),
        "{\n  \"welcome\": \"Bienvenue\"\n}\n"
    );
}

#[tokio::test]
async fn test_report_serializes_for_json_output() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    write_catalog(temp_dir.path(), "en", r#"{"a": "A"}"#);
    write_catalog(temp_dir.path(), "fr", r#"{"a": "A"}"#);

    let report = Orchestrator::new(create_test_config(temp_dir.path(), &["fr", "ja"]))
        .expect("valid config")
        .run()
        .await;

    let json = serde_json::to_value(&report).expect("serialize");
    assert_eq!(json["reference_locale"], "en");
    assert_eq!(json["locales"][0]["state"], "SAVED");
    assert_eq!(json["locales"][0]["pending"], 1);
    assert_eq!(json["locales"][1]["state"], "SKIPPED");
    assert!(json["locales"][1]["error"]
        .as_str()
        .expect("error message")
        .contains("not found"));
}
