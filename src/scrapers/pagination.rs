//! Walks one category's listing page by page.

use crate::error::{CategoryFailure, ExtractionAnomaly, FetchError};
use crate::models::{Category, Product};
use crate::scrapers::extractor::PageExtractor;
use crate::scrapers::normalize::normalize_product;
use crate::scrapers::retry::{GaveUp, RetryPolicy};
use crate::scrapers::traits::Navigator;
use crate::scrapers::types::{CategoryOutcome, CategoryRun, PageContext};
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Query parameter the storefront uses for listing pages
const PAGE_PARAM: &str = "pagina";

#[derive(Debug, Clone)]
pub struct WalkSettings {
    /// Hard stop in case next-page detection misfires
    pub max_pages: u32,
    /// Bound on a single page load
    pub timeout: Duration,
    /// Pause between consecutive pages
    pub page_delay: Duration,
    /// Slack past the navigator's own deadline before a load is abandoned
    pub load_grace: Duration,
}

impl Default for WalkSettings {
    fn default() -> Self {
        Self {
            max_pages: 20,
            timeout: Duration::from_secs(30),
            page_delay: Duration::from_millis(1500),
            load_grace: Duration::from_secs(2),
        }
    }
}

/// URL of listing page `page_number` for a category seed URL.
///
/// Page 1 is the seed itself; later pages set `?pagina=N`.
pub fn page_url(seed: &str, page_number: u32) -> Result<String, FetchError> {
    let mut url = Url::parse(seed).map_err(|e| FetchError::permanent(seed, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::permanent(seed, "not an http(s) URL"));
    }
    if page_number <= 1 {
        return Ok(url.to_string());
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != PAGE_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(PAGE_PARAM, &page_number.to_string());

    Ok(url.to_string())
}

/// Drives the extractor across the pages of one category.
///
/// Init -> FetchPage(n) -> extract -> Advance(n + 1) | Stop. A page fetch is
/// retried per the [`RetryPolicy`]; when it still fails the category stops
/// with the records collected so far.
pub struct PaginationWalker<'a> {
    navigator: &'a dyn Navigator,
    extractor: &'a dyn PageExtractor,
    retry: RetryPolicy,
    settings: WalkSettings,
}

impl<'a> PaginationWalker<'a> {
    pub fn new(
        navigator: &'a dyn Navigator,
        extractor: &'a dyn PageExtractor,
        retry: RetryPolicy,
        settings: WalkSettings,
    ) -> Self {
        Self {
            navigator,
            extractor,
            retry,
            settings,
        }
    }

    pub async fn walk(&self, category: &Category) -> CategoryRun {
        info!("📁 Walking category: {}", category.name);

        let mut records: Vec<Product> = Vec::new();
        let mut anomalies: Vec<ExtractionAnomaly> = Vec::new();
        let mut last_markup = None;
        let mut page_number = 1;

        let failure = loop {
            let url = match page_url(&category.url, page_number) {
                Ok(url) => url,
                Err(error) => {
                    break Some(CategoryFailure::Permanent {
                        page: page_number,
                        error,
                    })
                }
            };

            debug!("📄 {} page {}: {}", category.name, page_number, url);
            let markup = match self.fetch_page(&url, page_number).await {
                Ok(markup) => markup,
                Err(gave_up) => break Some(Self::fetch_failure(page_number, gave_up)),
            };

            let page = PageContext {
                category,
                page_url: &url,
                page_number,
            };
            let listing = self.extractor.extract(&markup, &page);
            last_markup = Some(markup);

            if listing.cards_seen == 0 {
                warn!(
                    "⚠️ {} page {} rendered no product cards (next page advertised: {})",
                    category.name, page_number, listing.has_next_page
                );
                anomalies.push(ExtractionAnomaly::EmptyPage { page: page_number });
            } else {
                info!(
                    "✅ {} page {}: {} products",
                    category.name,
                    page_number,
                    listing.records.len()
                );
            }

            let scraped_at = Utc::now();
            records.extend(
                listing
                    .records
                    .into_iter()
                    .map(|raw| normalize_product(raw, category, &url, scraped_at)),
            );
            anomalies.extend(listing.anomalies);

            if !listing.has_next_page {
                break None;
            }
            if page_number >= self.settings.max_pages {
                break Some(CategoryFailure::PageLimitReached {
                    max_pages: self.settings.max_pages,
                });
            }

            page_number += 1;
            if !self.settings.page_delay.is_zero() {
                tokio::time::sleep(self.settings.page_delay).await;
            }
        };

        let pages_completed = match failure {
            Some(CategoryFailure::PageLimitReached { .. }) | None => page_number,
            Some(_) => page_number - 1,
        };

        let outcome = match failure {
            None => {
                info!(
                    "✅ Category '{}' done: {} products over {} pages",
                    category.name,
                    records.len(),
                    pages_completed
                );
                CategoryOutcome::Completed { records }
            }
            Some(reason) => {
                warn!(
                    "❌ Category '{}' stopped after {} pages with {} products: {}",
                    category.name,
                    pages_completed,
                    records.len(),
                    reason
                );
                CategoryOutcome::Failed { records, reason }
            }
        };

        CategoryRun {
            category: category.clone(),
            outcome,
            pages_completed,
            anomalies,
            last_markup,
        }
    }

    async fn fetch_page(&self, url: &str, page_number: u32) -> Result<String, GaveUp> {
        let timeout = self.settings.timeout;
        let bound = timeout + self.navigator.settle_time() + self.settings.load_grace;
        let label = format!("page {}", page_number);

        self.retry
            .run(&label, |_| async move {
                match tokio::time::timeout(bound, self.navigator.fetch_rendered_page(url, timeout))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout {
                        url: url.to_string(),
                        timeout,
                    }),
                }
            })
            .await
    }

    fn fetch_failure(page: u32, gave_up: GaveUp) -> CategoryFailure {
        if gave_up.retryable {
            CategoryFailure::RetriesExhausted {
                page,
                attempts: gave_up.attempts,
                last: gave_up.error,
            }
        } else {
            CategoryFailure::Permanent {
                page,
                error: gave_up.error,
            }
        }
    }
}
