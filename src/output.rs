//! Run artifacts: the JSON backup file and the sentinel-framed payload on stdout.

use crate::models::{Product, RunSummary};
use crate::store::PersistStats;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::info;

pub const OUTPUT_START: &str = "__N8N_OUTPUT_START__";
pub const OUTPUT_END: &str = "__N8N_OUTPUT_END__";

/// Overwrite `path` with the full deduplicated product set
pub async fn write_backup(path: &Path, products: &[Product]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(products)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write backup {}", path.display()))?;

    info!("💾 Saved {} products to {}", products.len(), path.display());
    Ok(())
}

/// How the store write went
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceReport {
    pub succeeded: bool,
    #[serde(flatten)]
    pub stats: PersistStats,
}

impl PersistenceReport {
    pub fn new(stats: PersistStats) -> Self {
        Self {
            succeeded: stats.errors == 0,
            stats,
        }
    }
}

/// Machine-readable run result for the automation that launched us
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPayload<'a> {
    pub products: &'a [Product],
    pub summary: &'a RunSummary,
    pub persistence: PersistenceReport,
    pub backup_written: bool,
    pub cancelled: bool,
    pub duration_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

/// The payload as single-line JSON between the two sentinel lines
pub fn render_payload(payload: &RunPayload<'_>) -> Result<String> {
    let json = serde_json::to_string(payload).context("Failed to serialize run payload")?;
    Ok(format!("{}\n{}\n{}\n", OUTPUT_START, json, OUTPUT_END))
}

pub fn emit_payload(payload: &RunPayload<'_>) -> Result<()> {
    let framed = render_payload(payload)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(framed.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
