mod config;
mod error;
mod models;
mod output;
mod scrapers;
mod store;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Config, NavigatorKind};
use output::{emit_payload, write_backup, PersistenceReport, RunPayload};
use scrapers::{
    BrowserNavigator, CategoryOrchestrator, HttpNavigator, ListingExtractor, Navigator,
    PaginationWalker, RetryPolicy, WalkSettings,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use store::{dedupe, persist_all, PersistStats, SqliteProductStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Walk the storefront catalog, upsert every product and report the run.
#[derive(Parser, Debug)]
#[command(name = "parrilla-scout", version)]
struct Cli {
    /// TOML configuration file; built-in defaults are used without one
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show the browser window instead of running headless
    #[arg(long)]
    headed: bool,

    /// Verbose logs and debug page dumps for failed categories
    #[arg(long)]
    debug: bool,

    /// Only scrape the category with this slug (repeatable)
    #[arg(long = "category", value_name = "SLUG")]
    categories: Vec<String>,

    /// Where to write the JSON backup
    #[arg(long)]
    backup: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let loaded = config::load_config(cli.config.as_deref());

    let debug = cli.debug || loaded.as_ref().map(|c| c.debug).unwrap_or(false);
    init_tracing(debug);

    let config = match loaded.and_then(|config| apply_cli(config, &cli)) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("❌ Fatal: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,parrilla_scout={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn apply_cli(mut config: Config, cli: &Cli) -> Result<Config> {
    if cli.headed {
        config.browser.headless = false;
    }
    if cli.debug {
        config.debug = true;
    }
    if let Some(backup) = &cli.backup {
        config.output.backup_path = backup.clone();
    }
    config.select_categories(&cli.categories)?;
    Ok(config)
}

async fn acquire_navigator(config: &Config) -> Result<Box<dyn Navigator>> {
    match config.browser.navigator {
        NavigatorKind::Browser => {
            let browser_config = config.browser.clone();
            let navigator =
                tokio::task::spawn_blocking(move || BrowserNavigator::launch(&browser_config))
                    .await
                    .context("Browser launch task failed")??;
            Ok(Box::new(navigator))
        }
        NavigatorKind::Http => Ok(Box::new(HttpNavigator::new(&config.browser)?)),
    }
}

/// Load the storefront home page once; if that fails nothing else will work.
async fn warm_up(navigator: &dyn Navigator, config: &Config, retry: &RetryPolicy) -> Result<()> {
    let url = config.scraper.home_url.as_str();
    let timeout = Duration::from_secs(config.scraper.timeout_secs);

    info!("📡 Opening home page via {}...", navigator.name());
    retry
        .run("home page", |_| navigator.fetch_rendered_page(url, timeout))
        .await
        .map_err(|gave_up| {
            anyhow::anyhow!(
                "home page {} unreachable after {} attempts: {}",
                url,
                gave_up.attempts,
                gave_up.error
            )
        })?;

    info!("✅ Home page loaded");
    Ok(())
}

/// 1 when nothing reached the store, 2 when the backup could not be written
fn exit_status(backup_written: bool, stats: &PersistStats) -> u8 {
    if stats.store_unreachable() {
        1
    } else if !backup_written {
        2
    } else {
        0
    }
}

async fn run(config: Config) -> Result<u8> {
    let started = Instant::now();

    info!("{}", "=".repeat(70));
    info!("🔥 Parrilla Scout - full catalog scrape");
    info!("🗂️  Categories: {}", config.categories.len());
    info!("{}", "=".repeat(70));

    let store = SqliteProductStore::connect(&config.db.path)
        .await
        .context("Product store unreachable")?;

    let navigator = acquire_navigator(&config)
        .await
        .context("Navigation capability unavailable")?;
    let extractor = ListingExtractor::with_selectors(&config.selectors)?;
    let retry = RetryPolicy::exponential(
        config.scraper.max_attempts,
        Duration::from_millis(config.scraper.backoff_base_ms),
    );

    warm_up(navigator.as_ref(), &config, &retry)
        .await
        .context("Navigation capability unavailable")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupt received; finishing the current category");
            on_signal.cancel();
        }
    });

    let context = {
        let walker = PaginationWalker::new(
            navigator.as_ref(),
            &extractor,
            retry,
            WalkSettings {
                max_pages: config.scraper.max_pages,
                timeout: Duration::from_secs(config.scraper.timeout_secs),
                page_delay: Duration::from_millis(config.scraper.page_delay_ms),
                ..WalkSettings::default()
            },
        );
        let mut orchestrator = CategoryOrchestrator::new(
            walker,
            Duration::from_millis(config.scraper.category_delay_ms),
            cancel,
        );
        if config.debug {
            orchestrator = orchestrator.with_debug_dumps(config.output.debug_dump_dir.clone());
        }
        orchestrator.run(&config.categories).await
    };
    drop(navigator);

    let products = dedupe(context.records());

    info!("💾 Saving {} unique products...", products.len());
    let stats = persist_all(&store, &products).await;
    match store.count().await {
        Ok(rows) => info!("🗄️  Store now holds {} products", rows),
        Err(e) => warn!("⚠️ Could not count stored products: {}", e),
    }
    let summary = context
        .summary(products.len())
        .with_persistence_errors(stats.errors);

    let backup_written = match write_backup(&config.output.backup_path, products.as_slice()).await {
        Ok(()) => true,
        Err(e) => {
            error!("❌ Backup not written: {:#}", e);
            false
        }
    };

    info!("{}", "=".repeat(70));
    info!("📊 FINAL SUMMARY ({:?})", summary.status);
    info!("✅ Extracted: {} ({} unique)", summary.total, summary.unique_products);
    for (category, count) in &summary.per_category {
        info!("   - {}: {} products", category, count);
    }
    if summary.anomalies > 0 {
        warn!(
            "⚠️ {} extraction anomalies, {} cards discarded",
            summary.anomalies, summary.discarded_cards
        );
    }
    for failure in &summary.failures {
        warn!("   ❌ {}: {}", failure.category, failure.reason);
    }
    info!(
        "🗄️  Store: {} inserted, {} updated, {} errors",
        stats.inserted, stats.updated, stats.errors
    );
    info!("⏱️  Duration: {:.2}s", started.elapsed().as_secs_f64());
    info!("{}", "=".repeat(70));

    let payload = RunPayload {
        products: products.as_slice(),
        summary: &summary,
        persistence: PersistenceReport::new(stats),
        backup_written,
        cancelled: context.cancelled,
        duration_seconds: started.elapsed().as_secs_f64(),
        timestamp: chrono::Utc::now(),
    };
    emit_payload(&payload)?;

    Ok(exit_status(backup_written, &stats))
}
