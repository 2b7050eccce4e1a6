use anyhow::{Context, Result};
use locale_sync::{config::Config, report::RunReport, Orchestrator};
use std::time::Duration;
use tracing::{error, info, warn};

const USAGE: &str = "Usage: locale-sync [--dry-run] [--json]";

#[derive(Debug, Default)]
struct Args {
    dry_run: bool,
    json: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--dry-run" => args.dry_run = true,
            "--json" => args.json = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument '{}'\n{}", other, USAGE),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when variables come from the environment)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("locale_sync=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let config = Config::from_env()?;

    info!(
        "Synchronizing {} locales against '{}' in {}",
        config.target_locales.len(),
        config.reference_locale,
        config.locales_dir.display()
    );
    if args.dry_run {
        info!("Dry run: no files will be written and no translations requested");
    } else if !config.translation_enabled() {
        warn!("OPENAI_API_KEY not set: keys without a direct or fallback value stay unresolved");
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .context("Failed to build HTTP client")?;

    let orchestrator = Orchestrator::from_config(config, client)?.dry_run(args.dry_run);
    let report = orchestrator.run().await;

    log_summary(&report);
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to encode report")?
        );
    }

    if report.has_failed_locale() {
        std::process::exit(1);
    }
    Ok(())
}

fn log_summary(report: &RunReport) {
    info!("==================== Summary ====================");
    if let Some(reason) = &report.reference_error {
        error!("Reference catalog could not be used: {}", reason);
    }
    for locale in &report.locales {
        info!("{}", locale.summary_line());
    }
    for (locale, failure) in report.failed_paths() {
        warn!("{}: {} not resolved: {}", locale, failure.path, failure.reason);
    }
    if report.api.api_calls > 0 {
        info!(
            "Translation API: {} calls, {} failed ({:.1}% success), {} units rejected",
            report.api.api_calls,
            report.api.api_failures,
            report.api.api_success_rate,
            report.api.rejected_units
        );
    }
    info!("{} keys added or updated", report.total_changed());
}
