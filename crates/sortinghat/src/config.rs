//! SortingHat configuration.

use serde::{Deserialize, Serialize};

/// SortingHat client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortingHatConfig {
    /// Registry base URL (e.g., "http://sortinghat:8000/api")
    pub url: String,
    /// Bearer token (optional)
    #[serde(default)]
    pub token: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for SortingHatConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/api".to_string(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}
