use crate::error::{CategoryFailure, ExtractionAnomaly};
use crate::models::{Category, Product, RawProduct};

/// Where a listing page sits in the walk
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    pub category: &'a Category,
    /// URL the markup was loaded from; relative links resolve against it
    pub page_url: &'a str,
    /// 1-based page number
    pub page_number: u32,
}

/// What one listing page yielded
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub records: Vec<RawProduct>,
    /// Product cards found before validation
    pub cards_seen: usize,
    pub has_next_page: bool,
    pub anomalies: Vec<ExtractionAnomaly>,
}

/// Terminal state of one category walk
#[derive(Debug, Clone)]
pub enum CategoryOutcome {
    Completed {
        records: Vec<Product>,
    },
    /// Pages that succeeded before the failure are kept.
    Failed {
        records: Vec<Product>,
        reason: CategoryFailure,
    },
}

impl CategoryOutcome {
    pub fn records(&self) -> &[Product] {
        match self {
            Self::Completed { records } | Self::Failed { records, .. } => records,
        }
    }

    pub fn failure(&self) -> Option<&CategoryFailure> {
        match self {
            Self::Completed { .. } => None,
            Self::Failed { reason, .. } => Some(reason),
        }
    }
}

/// A finished category walk together with its bookkeeping
#[derive(Debug, Clone)]
pub struct CategoryRun {
    pub category: Category,
    pub outcome: CategoryOutcome,
    pub pages_completed: u32,
    pub anomalies: Vec<ExtractionAnomaly>,
    /// Markup of the last page that was fetched, kept for debug dumps
    pub last_markup: Option<String>,
}

impl CategoryRun {
    pub fn discarded_cards(&self) -> usize {
        self.anomalies.iter().filter(|a| a.discards_card()).count()
    }
}
