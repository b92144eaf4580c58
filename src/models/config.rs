//! Application configuration structures.

use std::fs;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Placeholder substituted with the listing page number.
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Bulletin listing location and link conventions
    #[serde(default)]
    pub source: SourceConfig,

    /// HTTP transport settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Per-date pipeline and bulletin parsing settings
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Persistence settings
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.http.max_connections == 0 {
            return Err(AppError::validation("http.max_connections must be > 0"));
        }
        if self.http.max_per_host == 0 {
            return Err(AppError::validation("http.max_per_host must be > 0"));
        }
        if self.source.max_pages == 0 {
            return Err(AppError::validation("source.max_pages must be > 0"));
        }
        if !self.source.page_query.contains(PAGE_PLACEHOLDER) {
            return Err(AppError::validation(format!(
                "source.page_query must contain {PAGE_PLACEHOLDER}"
            )));
        }
        Url::parse(&self.source.base_url)
            .map_err(|e| AppError::validation(format!("source.base_url: {e}")))?;
        self.source.link_regex()?;
        if self.ingest.max_concurrent == 0 {
            return Err(AppError::validation("ingest.max_concurrent must be > 0"));
        }
        if self.ingest.section_marker.trim().is_empty() {
            return Err(AppError::validation("ingest.section_marker is empty"));
        }
        if self.ingest.total_marker.trim().is_empty() {
            return Err(AppError::validation("ingest.total_marker is empty"));
        }
        if self.database.max_connections == 0 {
            return Err(AppError::validation("database.max_connections must be > 0"));
        }
        Ok(())
    }
}

/// Where the bulletin listing lives and how its links look.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Listing URL; page 1 is served here without a page query
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Query appended to `base_url` for pages after the first
    #[serde(default = "defaults::page_query")]
    pub page_query: String,

    /// Highest listing page the locator will scan
    #[serde(default = "defaults::max_pages")]
    pub max_pages: u32,

    /// Bulletin file-name pattern; capture group 1 is the `YYYYMMDD` date
    #[serde(default = "defaults::file_link_pattern")]
    pub file_link_pattern: String,
}

impl SourceConfig {
    /// URL of the given listing page.
    pub fn page_url(&self, page: u32) -> String {
        if page <= 1 {
            return self.base_url.clone();
        }
        let query = self
            .page_query
            .replace(PAGE_PLACEHOLDER, &page.to_string());
        format!("{}{}", self.base_url, query)
    }

    /// Compile the file link pattern, requiring a date capture group.
    pub fn link_regex(&self) -> Result<Regex> {
        let regex = Regex::new(&self.file_link_pattern)?;
        if regex.captures_len() < 2 {
            return Err(AppError::validation(
                "source.file_link_pattern needs a capture group for the date",
            ));
        }
        Ok(regex)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            page_query: defaults::page_query(),
            max_pages: defaults::max_pages(),
            file_link_pattern: defaults::file_link_pattern(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum requests in flight across all pipelines
    #[serde(default = "defaults::http_max_connections")]
    pub max_connections: usize,

    /// Maximum requests in flight to any single host
    #[serde(default = "defaults::max_per_host")]
    pub max_per_host: usize,

    /// Idle keep-alive connections retained per host
    #[serde(default = "defaults::max_idle_per_host")]
    pub max_idle_per_host: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_connections: defaults::http_max_connections(),
            max_per_host: defaults::max_per_host(),
            max_idle_per_host: defaults::max_idle_per_host(),
        }
    }
}

/// Pipeline and bulletin parsing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum per-date pipelines running at once
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Row text identifying the metric-ton section
    #[serde(default = "defaults::section_marker")]
    pub section_marker: String,

    /// Row text prefix that starts the next unit section
    #[serde(default = "defaults::section_end_prefix")]
    pub section_end_prefix: String,

    /// Product-code text marking aggregate rows
    #[serde(default = "defaults::total_marker")]
    pub total_marker: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::max_concurrent(),
            section_marker: defaults::section_marker(),
            section_end_prefix: defaults::section_end_prefix(),
            total_marker: defaults::total_marker(),
        }
    }
}

/// Database connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    #[serde(default)]
    pub url: Option<String>,

    /// Pool size
    #[serde(default = "defaults::db_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: defaults::db_max_connections(),
        }
    }
}

mod defaults {
    // Source defaults
    pub fn base_url() -> String {
        "https://spimex.com/markets/oil_products/trades/results/".into()
    }
    pub fn page_query() -> String {
        "?page=page-{page}".into()
    }
    pub fn max_pages() -> u32 {
        64
    }
    pub fn file_link_pattern() -> String {
        r"oil_xls_(\d{8})\d{6}\.xls".into()
    }

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; spimex-loader/0.1)".into()
    }
    pub fn timeout() -> u64 {
        10
    }
    pub fn http_max_connections() -> usize {
        100
    }
    pub fn max_per_host() -> usize {
        20
    }
    pub fn max_idle_per_host() -> usize {
        20
    }

    // Ingest defaults
    pub fn max_concurrent() -> usize {
        50
    }
    pub fn section_marker() -> String {
        "Единица измерения: Метрическая тонна".into()
    }
    pub fn section_end_prefix() -> String {
        "Единица измерения:".into()
    }
    pub fn total_marker() -> String {
        "Итого".into()
    }

    // Database defaults
    pub fn db_max_connections() -> u32 {
        10
    }
}
