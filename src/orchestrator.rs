//! Drives one synchronization run: load the reference, then bring every
//! target locale in line with it.

use crate::batch::{chunk, TranslationUnit};
use crate::catalog::{Catalog, CatalogStore};
use crate::config::Config;
use crate::diff::{find_drift, prune_drift, ExclusionPolicy, KeyDiff};
use crate::error::{SyncError, UnitFailure};
use crate::flatten::{flatten, FlatCatalog};
use crate::languages::LanguageRegistry;
use crate::merge;
use crate::provider::{ContentProvider, DirectValues};
use crate::report::{LocaleReport, LocaleState, RunReport};
use crate::translation::{OpenAiBackend, TranslationBackend, TranslationInvoker};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// One configured synchronization run over a locales directory.
pub struct Orchestrator {
    config: Config,
    store: CatalogStore,
    policy: ExclusionPolicy,
    provider: Arc<dyn ContentProvider>,
    invoker: Option<TranslationInvoker>,
    dry_run: bool,
}

impl Orchestrator {
    /// Orchestrator with no direct values and no translation service.
    pub fn new(config: Config) -> Result<Self, SyncError> {
        config.validate()?;
        let policy = ExclusionPolicy::new(&config.excluded_paths)?;
        Ok(Self {
            store: CatalogStore::new(&config.locales_dir),
            policy,
            provider: Arc::new(DirectValues::new()),
            invoker: None,
            dry_run: false,
            config,
        })
    }

    /// Wire up everything the configuration names: the direct-value file and,
    /// when an API key is present, the OpenAI backend.
    pub fn from_config(config: Config, client: reqwest::Client) -> Result<Self, SyncError> {
        let provider = match &config.direct_values_file {
            Some(path) => {
                let values = DirectValues::from_file(path)?;
                let locales: Vec<&str> = values.locales().collect();
                info!(
                    "Loaded {} direct values for [{}] from {}",
                    values.len(),
                    locales.join(", "),
                    path.display()
                );
                Some(values)
            }
            None => None,
        };
        let backend = OpenAiBackend::from_config(client, &config);

        let mut orchestrator = Self::new(config)?;
        if let Some(values) = provider {
            orchestrator = orchestrator.with_provider(Arc::new(values));
        }
        if let Some(backend) = backend {
            orchestrator = orchestrator.with_backend(Arc::new(backend));
        }
        Ok(orchestrator)
    }

    /// Replace the source of direct and fallback-locale values.
    pub fn with_provider(mut self, provider: Arc<dyn ContentProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Enable translation through `backend`.
    ///
    /// The source language in prompts is the English name of the reference
    /// locale, and in-flight calls share one `CONCURRENCY_LIMIT` cap.
    pub fn with_backend(mut self, backend: Arc<dyn TranslationBackend>) -> Self {
        let source_language = LanguageRegistry::get()
            .name_for(&self.config.reference_locale)
            .to_string();
        self.invoker = Some(TranslationInvoker::new(
            backend,
            source_language,
            self.config.domain_context.clone(),
            self.config.concurrency_limit,
        ));
        self
    }

    /// Compute and report everything without writing files or calling the
    /// translation service.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run the pipeline over every target locale.
    ///
    /// Problems never abort the run. A reference catalog that cannot be
    /// loaded or saved marks every target `FAILED`; per-locale problems end
    /// up in that locale's report.
    pub async fn run(&self) -> RunReport {
        let reference_locale = self.config.reference_locale.as_str();
        let reference = match self.load_reference() {
            Ok(reference) => reference,
            Err(e) => {
                error!("Reference catalog unusable: {}", e);
                return self.reference_failure(&e);
            }
        };

        let reference_flat = flatten(reference.root());
        info!(
            "Reference '{}' has {} keys",
            reference_locale,
            reference_flat.len()
        );
        if !self.policy.is_empty() {
            for pattern in self.policy.unmatched(reference_flat.keys()) {
                warn!("Exclusion pattern '{}' matches no reference key", pattern);
            }
        }

        let locales: Vec<LocaleReport> = stream::iter(&self.config.target_locales)
            .map(|locale| self.sync_locale(locale, &reference, &reference_flat))
            .buffered(self.config.concurrency_limit)
            .collect()
            .await;

        let api = self
            .invoker
            .as_ref()
            .map(|invoker| invoker.metrics().report())
            .unwrap_or_default();

        RunReport {
            reference_locale: reference_locale.to_string(),
            reference_error: None,
            locales,
            api,
        }
    }

    fn load_reference(&self) -> Result<Catalog, SyncError> {
        let (mut reference, _) = self.store.load(&self.config.reference_locale)?;
        self.augment_reference(&mut reference)?;
        Ok(reference)
    }

    /// Report for a run whose reference catalog could not be used.
    fn reference_failure(&self, error: &SyncError) -> RunReport {
        let reason = format!("reference catalog unusable: {}", error);
        let locales = self
            .config
            .target_locales
            .iter()
            .map(|locale| {
                let mut report = LocaleReport::new(locale.as_str());
                report.fail(reason.as_str());
                report
            })
            .collect();

        RunReport {
            reference_locale: self.config.reference_locale.clone(),
            reference_error: Some(error.to_string()),
            locales,
            api: Default::default(),
        }
    }

    /// Add authored reference text for paths the reference does not have yet.
    fn augment_reference(&self, reference: &mut Catalog) -> Result<(), SyncError> {
        let additions: Vec<(String, String)> = self
            .provider
            .paths(reference.locale())
            .into_iter()
            .filter(|path| reference.get(path).is_none())
            .filter_map(|path| {
                let text = self.provider.get(reference.locale(), &path)?;
                Some((path, text))
            })
            .collect();
        if additions.is_empty() {
            return Ok(());
        }

        let summary = merge::apply(reference, additions);
        info!(
            "{}: added {} direct values to the reference",
            reference.locale(),
            summary.applied
        );
        if !self.dry_run && self.store.save(reference)? {
            info!("{}: reference catalog saved", reference.locale());
        }
        Ok(())
    }

    async fn sync_locale(
        &self,
        locale: &str,
        reference: &Catalog,
        reference_flat: &FlatCatalog,
    ) -> LocaleReport {
        let mut report = LocaleReport::new(locale);

        let (mut catalog, notes) = match self.store.load(locale) {
            Ok(loaded) => loaded,
            Err(e @ SyncError::CatalogNotFound { .. }) => {
                warn!("{}: skipping, {}", locale, e);
                report.skip(e.to_string());
                return report;
            }
            Err(e) => {
                error!("{}: {}", locale, e);
                report.fail(e.to_string());
                return report;
            }
        };
        report.advance(LocaleState::Loaded);

        if self.config.prune_drift {
            let drift = find_drift(reference.root(), catalog.root());
            for path in &drift {
                warn!("{}: removing drifted group '{}'", locale, path);
            }
            report.drift_removed = prune_drift(&mut catalog, &drift);
        }

        let diff = KeyDiff::compute(
            reference_flat,
            &flatten(catalog.root()),
            &self.policy,
            self.config.detect_fallback,
        );
        report.excluded = diff.excluded.len();
        report.advance(LocaleState::Diffed);
        info!(
            "{}: {} missing, {} fallback-equal, {} excluded",
            locale,
            diff.missing.len(),
            diff.fallback_equal.len(),
            diff.excluded.len()
        );

        let (mut resolved, pending) = self.resolve_locally(locale, &diff, reference_flat, &mut report);

        match &self.invoker {
            Some(invoker) if !pending.is_empty() && !self.dry_run => {
                report.advance(LocaleState::Translating);
                self.translate(invoker, &catalog, pending, &mut resolved, &mut report)
                    .await;
            }
            Some(_) if !pending.is_empty() => {
                info!(
                    "{}: dry run, {} keys would be translated",
                    locale,
                    pending.len()
                );
                report.pending += pending.len();
            }
            _ => {}
        }

        let summary = merge::apply(&mut catalog, resolved);
        report.advance(LocaleState::Merged);

        let dirty = !notes.is_clean() || report.drift_removed > 0 || !summary.is_noop();
        if self.dry_run {
            info!("{}", report.summary_line());
            return report;
        }
        if dirty {
            match self.store.save(&catalog) {
                Ok(written) => report.written = written,
                Err(e) => {
                    error!("{}: {}", locale, e);
                    report.fail(e.to_string());
                    return report;
                }
            }
        }
        report.advance(LocaleState::Saved);
        info!("{}", report.summary_line());
        report
    }

    /// Resolve what can be resolved without the translation service.
    ///
    /// Missing keys try the locale's own direct values, then the fallback
    /// locale's; fallback-equal keys try only the locale's own. Returns the
    /// resolved values and the units left for the translation service.
    fn resolve_locally(
        &self,
        locale: &str,
        diff: &KeyDiff,
        reference_flat: &FlatCatalog,
        report: &mut LocaleReport,
    ) -> (BTreeMap<String, String>, Vec<TranslationUnit>) {
        let translate = self.invoker.is_some();
        let fallback_locale = self
            .config
            .fallback_locale
            .as_deref()
            .filter(|fallback| *fallback != locale);

        let mut resolved = BTreeMap::new();
        let mut pending = Vec::new();

        for path in &diff.missing {
            let Some(source) = reference_flat.get(path) else {
                continue;
            };
            if let Some(text) = self.provider.get(locale, path) {
                report.added_direct += 1;
                resolved.insert(path.clone(), text);
            } else if let Some(text) =
                fallback_locale.and_then(|fallback| self.provider.get(fallback, path))
            {
                report.fallback += 1;
                resolved.insert(path.clone(), text);
            } else if translate {
                pending.push(TranslationUnit::new(path.as_str(), source.as_str(), locale));
            } else if self.config.fill_with_reference {
                report.fallback += 1;
                resolved.insert(path.clone(), source.clone());
            } else {
                report.pending += 1;
            }
        }

        for path in &diff.fallback_equal {
            let Some(source) = reference_flat.get(path) else {
                continue;
            };
            match self.provider.get(locale, path) {
                Some(text) if text != *source => {
                    report.added_direct += 1;
                    resolved.insert(path.clone(), text);
                }
                _ if translate => {
                    pending.push(TranslationUnit::new(path.as_str(), source.as_str(), locale));
                }
                _ => report.pending += 1,
            }
        }

        (resolved, pending)
    }

    /// Translate `units` and add every result that changes `catalog` to
    /// `resolved`. Results identical to the current text count as unchanged.
    async fn translate(
        &self,
        invoker: &TranslationInvoker,
        catalog: &Catalog,
        units: Vec<TranslationUnit>,
        resolved: &mut BTreeMap<String, String>,
        report: &mut LocaleReport,
    ) {
        let locale = catalog.locale();
        let batches = match chunk(units, self.config.batch_size) {
            Ok(batches) => batches,
            Err(e) => {
                error!("{}: {}", locale, e);
                return;
            }
        };
        let language = LanguageRegistry::get().name_for(locale);
        info!(
            "{}: translating into {} in {} batches",
            locale,
            language,
            batches.len()
        );

        let outcomes: Vec<_> = stream::iter(&batches)
            .map(|batch| async move { (batch, invoker.translate(batch, language).await) })
            .buffer_unordered(self.config.concurrency_limit)
            .collect()
            .await;

        for (batch, outcome) in outcomes {
            match outcome {
                Ok(translation) => {
                    for (path, text) in translation.resolved {
                        if catalog.leaf(&path) == Some(text.as_str()) {
                            report.unchanged += 1;
                        } else {
                            report.translated += 1;
                            resolved.insert(path, text);
                        }
                    }
                    report.failed.extend(translation.rejected);
                }
                Err(e) => {
                    warn!("{}", e);
                    let reason = e.to_string();
                    report.failed.extend(
                        batch
                            .paths()
                            .map(|path| UnitFailure::new(path, reason.as_str())),
                    );
                }
            }
        }
        report.failed.sort_by(|a, b| a.path.cmp(&b.path));
    }
}
