use crate::models::Category;
use crate::scrapers::extractor::ListingSelectors;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub selectors: ListingSelectors,
    #[serde(default = "default_categories")]
    pub categories: Vec<Category>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            scraper: ScraperConfig::default(),
            browser: BrowserConfig::default(),
            db: DbConfig::default(),
            output: OutputConfig::default(),
            selectors: ListingSelectors::default(),
            categories: default_categories(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScraperConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_category_delay_ms")]
    pub category_delay_ms: u64,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_home_url")]
    pub home_url: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
            max_pages: default_max_pages(),
            page_delay_ms: default_page_delay_ms(),
            category_delay_ms: default_category_delay_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            home_url: default_home_url(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_pages() -> u32 {
    20
}
fn default_page_delay_ms() -> u64 {
    1500
}
fn default_category_delay_ms() -> u64 {
    2000
}
fn default_backoff_base_ms() -> u64 {
    2000
}
fn default_home_url() -> String {
    "https://www.lojamestreparrillero.com.br/".to_string()
}

/// Which navigation capability renders listing pages
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NavigatorKind {
    #[default]
    Browser,
    Http,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrowserConfig {
    #[serde(default)]
    pub navigator: NavigatorKind,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    /// Viewport-height scrolls after load, for lazily rendered cards
    #[serde(default = "default_scroll_passes")]
    pub scroll_passes: u32,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            navigator: NavigatorKind::default(),
            headless: default_headless(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            window_width: default_window_width(),
            window_height: default_window_height(),
            scroll_passes: default_scroll_passes(),
            settle_ms: default_settle_ms(),
        }
    }
}

fn default_headless() -> bool {
    true
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}
fn default_accept_language() -> String {
    "pt-BR".to_string()
}
fn default_window_width() -> u32 {
    1920
}
fn default_window_height() -> u32 {
    1080
}
fn default_scroll_passes() -> u32 {
    3
}
fn default_settle_ms() -> u64 {
    800
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/produtos.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_backup_path")]
    pub backup_path: PathBuf,
    /// Where failed category pages are saved when `debug` is on
    #[serde(default = "default_debug_dump_dir")]
    pub debug_dump_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            backup_path: default_backup_path(),
            debug_dump_dir: default_debug_dump_dir(),
        }
    }
}

fn default_backup_path() -> PathBuf {
    PathBuf::from("produtos_parrilla.json")
}
fn default_debug_dump_dir() -> PathBuf {
    PathBuf::from("debug")
}

const STORE: &str = "https://www.lojamestreparrillero.com.br";

fn default_categories() -> Vec<Category> {
    [
        ("Churrasqueiras e Parrillas", "churrasqueiraseparrillas"),
        ("Bancada de Embutir", "bancadadeembutir"),
        ("Churrasqueiras para Alvenaria", "churrasqueirasparaalvenaria"),
        ("Bancada", "bancada"),
        ("Portátil Externa", "portatilexterna"),
        ("Sem Fumaça", "semfumaca"),
        ("Acessórios", "acessorios"),
    ]
    .iter()
    .map(|(name, slug)| Category::new(name, &format!("{}/{}", STORE, slug), slug))
    .collect()
}

impl Config {
    /// Keep only the categories whose slug is listed, in configured order
    pub fn select_categories(&mut self, slugs: &[String]) -> Result<()> {
        if slugs.is_empty() {
            return Ok(());
        }
        if let Some(unknown) = slugs
            .iter()
            .find(|slug| !self.categories.iter().any(|c| &c.slug == *slug))
        {
            anyhow::bail!("Unknown category slug: '{}'", unknown);
        }
        self.categories.retain(|c| slugs.contains(&c.slug));
        Ok(())
    }
}

/// Load configuration from `path`, or use the built-in defaults when no file
/// is given. `DB_PATH` in the environment overrides `db.path`.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };

    if let Ok(db_path) = std::env::var("DB_PATH") {
        if !db_path.trim().is_empty() {
            config.db.path = PathBuf::from(db_path);
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.scraper.max_attempts == 0 {
        anyhow::bail!("scraper.max_attempts must be >= 1");
    }
    if config.scraper.max_pages == 0 {
        anyhow::bail!("scraper.max_pages must be >= 1");
    }
    if config.scraper.timeout_secs == 0 {
        anyhow::bail!("scraper.timeout_secs must be > 0");
    }
    if config.categories.is_empty() {
        anyhow::bail!("at least one category must be configured");
    }

    for category in &config.categories {
        if category.name.trim().is_empty() || category.slug.trim().is_empty() {
            anyhow::bail!("every category needs a name and a slug");
        }
        url::Url::parse(&category.url)
            .with_context(|| format!("category '{}' has an invalid url", category.name))?;
    }

    let mut slugs: Vec<&str> = config.categories.iter().map(|c| c.slug.as_str()).collect();
    slugs.sort_unstable();
    if slugs.windows(2).any(|pair| pair[0] == pair[1]) {
        anyhow::bail!("category slugs must be unique");
    }

    Ok(())
}
