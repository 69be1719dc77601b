use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::CategoryFailure;

/// Stock state shown on a product card
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AvailabilityStatus {
    Available,
    Unavailable,
    Unknown,
}

impl AvailabilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Unavailable => "Unavailable",
            Self::Unknown => "Unknown",
        }
    }

    /// Inverse of [`as_str`](Self::as_str); anything else reads back as `Unknown`.
    #[cfg(test)]
    pub fn from_stored(value: &str) -> Self {
        match value {
            "Available" => Self::Available,
            "Unavailable" => Self::Unavailable,
            _ => Self::Unknown,
        }
    }
}

/// A catalog partition with its own paginated listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub url: String,
    pub slug: String,
}

impl Category {
    pub fn new(name: &str, url: &str, slug: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            slug: slug.to_string(),
        }
    }
}

/// One product card as it was read off a listing page.
///
/// `link` is already absolute; everything else is the card's text before
/// normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProduct {
    pub external_id: Option<String>,
    pub sku: Option<String>,
    pub name: String,
    pub price_text: Option<String>,
    pub image_url: Option<String>,
    pub link: String,
    pub availability_text: Option<String>,
}

/// Core product data model, keyed by its canonical `link`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub external_id: Option<String>,
    pub sku: Option<String>,
    pub name: String,
    pub price_text: Option<String>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub price_value: Option<Decimal>,
    pub image_url: Option<String>,
    pub link: String,
    pub category: String,
    pub availability_status: AvailabilityStatus,
    pub source_page: String,
    pub scraped_at: DateTime<Utc>,
}

/// A category the run could not finish
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryFailureReport {
    pub category: String,
    pub reason: String,
    pub pages_completed: u32,
    pub partial_records: usize,
}

impl CategoryFailureReport {
    pub fn new(
        category: &Category,
        reason: &CategoryFailure,
        pages_completed: u32,
        partial_records: usize,
    ) -> Self {
        Self {
            category: category.name.clone(),
            reason: reason.to_string(),
            pages_completed,
            partial_records,
        }
    }
}

/// How the run as a whole went
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

/// End-of-run report: per-category counts, grand total and failures.
///
/// Built once from the finished category runs and never mutated afterwards.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub per_category: BTreeMap<String, usize>,
    pub total: usize,
    pub unique_products: usize,
    pub anomalies: usize,
    /// Cards dropped for a missing name or an unusable link
    pub discarded_cards: usize,
    pub failures: Vec<CategoryFailureReport>,
    pub status: RunStatus,
}

impl RunSummary {
    pub fn new(
        per_category: BTreeMap<String, usize>,
        unique_products: usize,
        anomalies: usize,
        failures: Vec<CategoryFailureReport>,
    ) -> Self {
        let total = per_category.values().sum();
        let status = if failures.is_empty() {
            RunStatus::Success
        } else if total == 0 && failures.len() == per_category.len() {
            RunStatus::Failed
        } else {
            RunStatus::Partial
        };

        Self {
            per_category,
            total,
            unique_products,
            anomalies,
            discarded_cards: 0,
            failures,
            status,
        }
    }

    pub fn with_discarded_cards(mut self, discarded_cards: usize) -> Self {
        self.discarded_cards = discarded_cards;
        self
    }

    /// A run whose products did not all reach the store is at best partial
    pub fn with_persistence_errors(mut self, errors: usize) -> Self {
        if errors > 0 && self.status == RunStatus::Success {
            self.status = RunStatus::Partial;
        }
        self
    }
}
