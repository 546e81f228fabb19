//! Redpanda configuration.

use serde::{Deserialize, Serialize};

/// Where a queue is first read from when no offset was committed yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartFrom {
    #[default]
    Earliest,
    Latest,
}

/// Redpanda work queue configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedpandaConfig {
    /// Broker addresses
    pub brokers: Vec<String>,
    /// Prepended to the queue key to form the topic name
    #[serde(default)]
    pub topic_prefix: String,
    /// Partition holding the queue
    #[serde(default)]
    pub partition: i32,
    /// SASL username (for cloud authentication)
    #[serde(default)]
    pub sasl_username: Option<String>,
    /// SASL password (for cloud authentication)
    #[serde(default)]
    pub sasl_password: Option<String>,
    /// First read position of a queue
    #[serde(default)]
    pub start_from: StartFrom,
    /// Longest wait for a fetch to fill, in milliseconds
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: i32,
    /// Upper bound of bytes per fetch
    #[serde(default = "default_fetch_max_bytes")]
    pub fetch_max_bytes: i32,
}

fn default_max_wait_ms() -> i32 {
    500
}

fn default_fetch_max_bytes() -> i32 {
    8 * 1024 * 1024
}

impl Default for RedpandaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic_prefix: String::new(),
            partition: 0,
            sasl_username: None,
            sasl_password: None,
            start_from: StartFrom::default(),
            max_wait_ms: default_max_wait_ms(),
            fetch_max_bytes: default_fetch_max_bytes(),
        }
    }
}

impl RedpandaConfig {
    /// Returns the broker list as a comma-separated string.
    pub fn broker_string(&self) -> String {
        self.brokers.join(",")
    }

    /// Topic backing a queue key.
    pub fn topic(&self, queue_key: &str) -> String {
        format!("{}{}", self.topic_prefix, queue_key)
    }

    /// Whether TLS and SASL are used (Redpanda Cloud).
    pub fn has_credentials(&self) -> bool {
        self.sasl_username.is_some() && self.sasl_password.is_some()
    }
}
