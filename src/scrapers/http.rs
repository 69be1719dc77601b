use crate::config::BrowserConfig;
use crate::error::FetchError;
use crate::scrapers::traits::Navigator;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Plain HTTP navigator for storefronts that render cards server-side.
///
/// No JavaScript runs, so it only suits templates whose listing markup is in
/// the initial response.
pub struct HttpNavigator {
    client: Client,
}

impl HttpNavigator {
    pub fn new(config: &BrowserConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language).context("Invalid accept_language")?,
        );

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

/// Server trouble and throttling may clear up; other statuses will not.
fn classify_status(url: &str, status: StatusCode) -> FetchError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        FetchError::navigation(url, format!("HTTP {}", status))
    } else {
        FetchError::permanent(url, format!("HTTP {}", status))
    }
}

fn classify_request(url: &str, timeout: Duration, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            timeout,
        }
    } else if error.is_builder() {
        FetchError::permanent(url, error)
    } else {
        FetchError::navigation(url, error)
    }
}

#[async_trait]
impl Navigator for HttpNavigator {
    async fn fetch_rendered_page(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        debug!("Fetching URL: {}", url);

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_request(url, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(url, status));
        }

        let html = response
            .text()
            .await
            .map_err(|e| classify_request(url, timeout, e))?;
        debug!("Downloaded {} bytes of HTML", html.len());

        Ok(html)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
