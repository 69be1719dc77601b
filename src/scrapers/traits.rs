use crate::error::FetchError;
use async_trait::async_trait;
use std::time::Duration;

/// Something that can load a URL and hand back the rendered page markup.
///
/// Implemented by the headless browser and by the plain HTTP client, so the
/// walker does not care how a page gets rendered.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Load `url` and return its markup, giving up after `timeout`
    async fn fetch_rendered_page(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;

    /// Time spent on a page after it has loaded (scrolling for lazy content).
    /// Callers add it on top of `timeout` when bounding a call.
    fn settle_time(&self) -> Duration {
        Duration::ZERO
    }

    /// Short name for logs
    fn name(&self) -> &'static str;
}
