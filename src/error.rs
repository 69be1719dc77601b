use std::time::Duration;
use thiserror::Error;

/// Failure to get rendered markup for a URL
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("timed out after {timeout:?} loading {url}")]
    Timeout { url: String, timeout: Duration },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("cannot load {url}: {reason}")]
    Permanent { url: String, reason: String },
}

impl FetchError {
    /// Network hiccups and timeouts are worth another attempt; bad URLs are not.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Permanent { .. })
    }

    pub fn navigation(url: &str, reason: impl ToString) -> Self {
        Self::Navigation {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn permanent(url: &str, reason: impl ToString) -> Self {
        Self::Permanent {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("malformed url '{raw}': {reason}")]
    MalformedUrl { raw: String, reason: String },
}

/// Non-fatal oddities found while reading a listing page
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionAnomaly {
    #[error("card {card}: required field '{field}' missing, card discarded")]
    RequiredFieldMissing { card: usize, field: &'static str },

    #[error("card {card}: {source}")]
    MalformedLink {
        card: usize,
        #[source]
        source: NormalizeError,
    },

    #[error("card {card}: optional field '{field}' missing")]
    OptionalFieldMissing { card: usize, field: &'static str },

    #[error("card {card}: image url dropped: {source}")]
    MalformedImage {
        card: usize,
        #[source]
        source: NormalizeError,
    },

    #[error("card {card}: unrecognised availability text '{text}'")]
    UnmatchedAvailability { card: usize, text: String },

    #[error("page {page} rendered no product cards")]
    EmptyPage { page: u32 },
}

impl ExtractionAnomaly {
    /// True when the card this anomaly refers to was dropped.
    pub fn discards_card(&self) -> bool {
        matches!(
            self,
            Self::RequiredFieldMissing { .. } | Self::MalformedLink { .. }
        )
    }
}

/// Why a category stopped before its listing ran out
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CategoryFailure {
    #[error("page {page} still failing after {attempts} attempts: {last}")]
    RetriesExhausted {
        page: u32,
        attempts: u32,
        last: FetchError,
    },

    #[error("page {page} cannot be fetched: {error}")]
    Permanent { page: u32, error: FetchError },

    #[error("stopped at the {max_pages}-page limit while more pages were advertised")]
    PageLimitReached { max_pages: u32 },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cannot open product store: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("schema setup failed: {0}")]
    Schema(#[source] sqlx::Error),

    #[error("upsert of {link} failed: {source}")]
    Upsert {
        link: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("product store unavailable: {0}")]
    Unavailable(String),
}
