//! ClickHouse configuration.

use pipeline_core::limits::{DEFAULT_BULK_SIZE, DEFAULT_MAX_CLAUSE_SIZE, DEFAULT_SCROLL_SIZE};
use serde::{Deserialize, Serialize};
use url::Url;

/// ClickHouse document store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    /// ClickHouse HTTP URL
    pub url: String,
    /// Database holding one table per index
    #[serde(default = "default_database")]
    pub database: String,
    /// Username (optional)
    pub username: Option<String>,
    /// Password (optional)
    pub password: Option<String>,
    /// Documents per bulk insert
    #[serde(default = "default_bulk_size")]
    pub bulk_size: usize,
    /// Values per `has(...)` clause
    #[serde(default = "default_max_clause_size")]
    pub max_clause_size: usize,
    /// Documents per fetch page
    #[serde(default = "default_scroll_size")]
    pub scroll_size: usize,
    /// Query timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_database() -> String {
    "grimoire".to_string()
}

fn default_bulk_size() -> usize {
    DEFAULT_BULK_SIZE
}

fn default_max_clause_size() -> usize {
    DEFAULT_MAX_CLAUSE_SIZE
}

fn default_scroll_size() -> usize {
    DEFAULT_SCROLL_SIZE
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: default_database(),
            username: None,
            password: None,
            bulk_size: default_bulk_size(),
            max_clause_size: default_max_clause_size(),
            scroll_size: default_scroll_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ClickHouseConfig {
    /// URL with any embedded credentials removed, safe to log.
    pub fn anonymized_url(&self) -> String {
        anonymize_url(&self.url)
    }
}

/// Strips user and password from a URL. Unparseable input is returned as is.
pub fn anonymize_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.to_string()
        }
        Err(_) => raw.to_string(),
    }
}
