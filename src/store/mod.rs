//! Reconciliation: dedupe extracted records by link and upsert them.

pub mod sqlite;

use crate::error::StoreError;
use crate::models::Product;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{error, info, warn};

pub use sqlite::SqliteProductStore;

/// What an upsert did to the stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Persistence capability: insert-or-update keyed by canonical link
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Create the row if the link is new, otherwise overwrite every field but
    /// `created_at`. Concurrent calls for one link must not lose updates.
    async fn upsert_product(&self, product: &Product) -> Result<UpsertOutcome, StoreError>;
}

/// Products keyed by link, in first-discovery order.
///
/// A later record with a known link replaces the earlier one in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductSet {
    products: Vec<Product>,
    index: HashMap<String, usize>,
}

impl ProductSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the product that was replaced, if the link was already present
    pub fn insert(&mut self, product: Product) -> Option<Product> {
        match self.index.get(&product.link) {
            Some(&slot) => Some(std::mem::replace(&mut self.products[slot], product)),
            None => {
                self.index.insert(product.link.clone(), self.products.len());
                self.products.push(product);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Product> {
        self.products.iter()
    }

    pub fn as_slice(&self) -> &[Product] {
        &self.products
    }
}

/// Collapse records sharing a link; the last one in iteration order wins.
pub fn dedupe(records: impl IntoIterator<Item = Product>) -> ProductSet {
    let mut duplicates = 0;
    let mut set = ProductSet::new();
    for product in records {
        if set.insert(product).is_some() {
            duplicates += 1;
        }
    }
    if duplicates > 0 {
        info!("🔁 Merged {} duplicate records by link", duplicates);
    }
    set
}

/// Upsert counters for one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistStats {
    pub inserted: usize,
    pub updated: usize,
    pub errors: usize,
}

impl PersistStats {
    /// Nothing reached the store even though there was something to write
    pub fn store_unreachable(&self) -> bool {
        self.errors > 0 && self.inserted == 0 && self.updated == 0
    }
}

/// Upsert every product, one after another. A failed product is logged and
/// skipped; it stays in the backup and output.
pub async fn persist_all(store: &dyn ProductStore, products: &ProductSet) -> PersistStats {
    if products.is_empty() {
        warn!("⚠️ No products to save");
        return PersistStats::default();
    }

    let mut stats = PersistStats::default();
    for product in products.iter() {
        match store.upsert_product(product).await {
            Ok(UpsertOutcome::Inserted) => stats.inserted += 1,
            Ok(UpsertOutcome::Updated) => stats.updated += 1,
            Err(e) => {
                stats.errors += 1;
                error!("❌ Could not save product '{}': {}", product.name, e);
            }
        }
    }

    info!(
        "✅ Store: {} inserted, {} updated, {} errors",
        stats.inserted, stats.updated, stats.errors
    );
    stats
}
