//! Runs every configured category in order and collects the results.

use crate::models::{Category, CategoryFailureReport, Product, RunSummary};
use crate::scrapers::pagination::PaginationWalker;
use crate::scrapers::types::CategoryRun;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything a run has gathered so far.
///
/// Threaded through the orchestrator and handed back to the caller; nothing
/// about the run lives in globals.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub runs: Vec<CategoryRun>,
    pub cancelled: bool,
}

impl RunContext {
    fn with_run(mut self, run: CategoryRun) -> Self {
        self.runs.push(run);
        self
    }

    /// All extracted records in category, then page, then card order
    pub fn records(&self) -> Vec<Product> {
        self.runs
            .iter()
            .flat_map(|run| run.outcome.records().iter().cloned())
            .collect()
    }

    pub fn total_records(&self) -> usize {
        self.runs.iter().map(|run| run.outcome.records().len()).sum()
    }

    /// Freeze the per-category results into the end-of-run summary
    pub fn summary(&self, unique_products: usize) -> RunSummary {
        let mut per_category = BTreeMap::new();
        let mut failures = Vec::new();
        let mut anomalies = 0;
        let mut discarded = 0;

        for run in &self.runs {
            *per_category.entry(run.category.name.clone()).or_insert(0) +=
                run.outcome.records().len();
            anomalies += run.anomalies.len();
            discarded += run.discarded_cards();

            if let Some(reason) = run.outcome.failure() {
                failures.push(CategoryFailureReport::new(
                    &run.category,
                    reason,
                    run.pages_completed,
                    run.outcome.records().len(),
                ));
            }
        }

        RunSummary::new(per_category, unique_products, anomalies, failures)
            .with_discarded_cards(discarded)
    }
}

/// Iterates the fixed category list with one [`PaginationWalker`].
///
/// A failed category is recorded and the run moves on. Cancellation is only
/// honoured between categories.
pub struct CategoryOrchestrator<'a> {
    walker: PaginationWalker<'a>,
    category_delay: Duration,
    cancel: CancellationToken,
    debug_dump_dir: Option<PathBuf>,
}

impl<'a> CategoryOrchestrator<'a> {
    pub fn new(walker: PaginationWalker<'a>, category_delay: Duration, cancel: CancellationToken) -> Self {
        Self {
            walker,
            category_delay,
            cancel,
            debug_dump_dir: None,
        }
    }

    /// Save the last page of each failed category under `dir`
    pub fn with_debug_dumps(mut self, dir: PathBuf) -> Self {
        self.debug_dump_dir = Some(dir);
        self
    }

    pub async fn run(&self, categories: &[Category]) -> RunContext {
        let mut context = RunContext::default();

        for (i, category) in categories.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(
                    "🛑 Run cancelled before category '{}'; {} of {} categories processed",
                    category.name,
                    i,
                    categories.len()
                );
                context.cancelled = true;
                break;
            }

            info!("{}", "=".repeat(70));
            info!("📂 CATEGORY {}/{}: {}", i + 1, categories.len(), category.name);
            info!("{}", "=".repeat(70));

            let run = self.walker.walk(category).await;
            if run.outcome.failure().is_some() {
                self.dump_failed_page(&run).await;
            }

            context = context.with_run(run);
            info!("📊 Running total: {} products", context.total_records());

            if i + 1 < categories.len() && !self.category_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.category_delay) => {}
                    _ = self.cancel.cancelled() => {}
                }
            }
        }

        context
    }

    async fn dump_failed_page(&self, run: &CategoryRun) {
        let (Some(dir), Some(markup)) = (&self.debug_dump_dir, &run.last_markup) else {
            return;
        };

        let path = dir.join(format!("{}.html", run.category.slug));
        let written = match tokio::fs::create_dir_all(dir).await {
            Ok(()) => tokio::fs::write(&path, markup).await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => info!("🔍 Saved last page of '{}' to {}", run.category.name, path.display()),
            Err(e) => warn!("Could not save debug page {}: {}", path.display(), e),
        }
    }
}
