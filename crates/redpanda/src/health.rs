//! Redpanda health checks.

use crate::config::RedpandaConfig;
use crate::consumer::connect;
use tracing::{debug, error};

/// Check Redpanda connection health.
pub async fn check_connection(config: &RedpandaConfig) -> bool {
    match connect(config).await {
        Ok(client) => match client.list_topics().await {
            Ok(topics) => {
                debug!(topics = topics.len(), "Redpanda connection healthy");
                true
            }
            Err(e) => {
                error!("Failed to list Redpanda topics: {}", e);
                false
            }
        },
        Err(e) => {
            error!("Failed to connect to Redpanda: {}", e);
            false
        }
    }
}

/// Queue keys whose topic does not exist yet.
pub async fn missing_queues(config: &RedpandaConfig, queue_keys: &[&str]) -> Vec<String> {
    let all = || queue_keys.iter().map(|k| k.to_string()).collect();

    let client = match connect(config).await {
        Ok(client) => client,
        Err(_) => return all(),
    };

    match client.list_topics().await {
        Ok(existing_topics) => {
            let existing: std::collections::HashSet<_> =
                existing_topics.iter().map(|t| t.name.as_str()).collect();

            queue_keys
                .iter()
                .filter(|k| !existing.contains(config.topic(k).as_str()))
                .map(|k| k.to_string())
                .collect()
        }
        Err(_) => all(),
    }
}
