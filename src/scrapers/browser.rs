use crate::config::BrowserConfig;
use crate::error::FetchError;
use crate::scrapers::traits::Navigator;
use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Keeps the browser alive between page loads; page delays are far shorter.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(600);

/// Headless Chrome session shared by the whole run.
///
/// One browser and one tab are opened at launch. Dropping the navigator shuts
/// the browser down, so it is released on every exit path.
pub struct BrowserNavigator {
    // Held so the Chrome process lives as long as the navigator
    _browser: Browser,
    // One load at a time; an abandoned load finishes before the next starts
    tab: Arc<Mutex<Arc<Tab>>>,
    scroll_passes: u32,
    settle: Duration,
}

impl BrowserNavigator {
    /// Launch Chrome according to `config`
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        info!("🌐 Launching Chrome (headless={})...", config.headless);

        let options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(false)
            .window_size(Some((config.window_width, config.window_height)))
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;
        let tab = browser.new_tab().context("Failed to open browser tab")?;
        tab.set_user_agent(&config.user_agent, Some(&config.accept_language), None)
            .context("Failed to set user agent")?;

        Ok(Self {
            _browser: browser,
            tab: Arc::new(Mutex::new(tab)),
            scroll_passes: config.scroll_passes,
            settle: Duration::from_millis(config.settle_ms),
        })
    }

    /// Blocking page load: navigate, scroll to trigger lazy cards, read the DOM.
    ///
    /// Navigation as a whole gets `timeout`; scrolling comes on top of it.
    fn render(tab: &Tab, url: &str, timeout: Duration, scroll_passes: u32, settle: Duration) -> Result<String> {
        let started = Instant::now();
        tab.set_default_timeout(timeout);
        tab.navigate_to(url)?;

        let remaining = timeout
            .checked_sub(started.elapsed())
            .filter(|left| !left.is_zero())
            .ok_or_else(|| anyhow::anyhow!("navigation to {} timed out", url))?;
        tab.set_default_timeout(remaining);
        tab.wait_until_navigated()?;

        for _ in 0..scroll_passes {
            tab.evaluate("window.scrollBy(0, window.innerHeight)", false)?;
            thread::sleep(settle);
        }

        let html = tab.get_content()?;
        debug!("Rendered {} ({} bytes)", url, html.len());
        Ok(html)
    }
}

fn classify(url: &str, timeout: Duration, error: anyhow::Error) -> FetchError {
    let message = format!("{:#}", error);
    let lowered = message.to_lowercase();
    if lowered.contains("timeout") || lowered.contains("timed out") {
        FetchError::Timeout {
            url: url.to_string(),
            timeout,
        }
    } else {
        FetchError::navigation(url, message)
    }
}

#[async_trait]
impl Navigator for BrowserNavigator {
    async fn fetch_rendered_page(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let tab = Arc::clone(&self.tab);
        let owned_url = url.to_string();
        let scroll_passes = self.scroll_passes;
        let settle = self.settle;

        tokio::task::spawn_blocking(move || {
            let tab = tab
                .lock()
                .map_err(|_| anyhow::anyhow!("browser tab lock poisoned"))?;
            Self::render(&tab, &owned_url, timeout, scroll_passes, settle)
        })
        .await
            .map_err(|e| FetchError::navigation(url, format!("browser task failed: {}", e)))?
            .map_err(|e| classify(url, timeout, e))
    }

    fn settle_time(&self) -> Duration {
        self.settle * self.scroll_passes
    }

    fn name(&self) -> &'static str {
        "headless-chrome"
    }
}

impl Drop for BrowserNavigator {
    fn drop(&mut self) {
        info!("🔒 Closing browser");
    }
}
