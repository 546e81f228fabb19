//! Redpanda-backed work queue.
//!
//! Uses rskafka for Kafka-compatible consumption with:
//! - One topic per queue key, read on a single partition
//! - Offsets tracked in process, advanced past everything a drain returned
//! - JSON deserialization of queue records

use crate::config::{RedpandaConfig, StartFrom};
use async_trait::async_trait;
use pipeline_core::{Error, QueueRecord, Result, WorkQueue};
use rskafka::client::{
    partition::{OffsetAt, PartitionClient, UnknownTopicHandling},
    Client, ClientBuilder, Credentials, SaslConfig,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Creates a TLS configuration for Redpanda Cloud.
pub(crate) fn create_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Connects to the configured brokers.
pub(crate) async fn connect(config: &RedpandaConfig) -> Result<Client> {
    let mut builder = ClientBuilder::new(vec![config.broker_string()]);

    // Add TLS and SASL auth if credentials provided (for Redpanda Cloud)
    if let (Some(username), Some(password)) = (&config.sasl_username, &config.sasl_password) {
        builder = builder
            .tls_config(create_tls_config())
            .sasl_config(SaslConfig::ScramSha256(Credentials::new(
                username.clone(),
                password.clone(),
            )));
    }

    builder
        .build()
        .await
        .map_err(|e| Error::queue(format!("Failed to connect to Redpanda: {}", e)))
}

/// Decodes one record value; undecodable values are skipped with a warning.
pub fn decode_record(offset: i64, value: Option<&[u8]>) -> Option<QueueRecord> {
    let value = value?;
    match serde_json::from_slice::<QueueRecord>(value) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(offset, error = %e, "Failed to deserialize queue record");
            None
        }
    }
}

/// Per-topic read state.
struct TopicCursor {
    partition: Arc<PartitionClient>,
    /// Next offset to read
    offset: i64,
}

/// Work queue reading queue records from Redpanda topics.
pub struct RedpandaQueue {
    config: RedpandaConfig,
    client: RwLock<Option<Arc<Client>>>,
    cursors: Mutex<HashMap<String, TopicCursor>>,
}

impl RedpandaQueue {
    pub fn new(config: RedpandaConfig) -> Self {
        info!(
            brokers = %config.broker_string(),
            partition = config.partition,
            "Creating Redpanda work queue"
        );

        Self {
            config,
            client: RwLock::new(None),
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RedpandaConfig {
        &self.config
    }

    async fn ensure_connected(&self) -> Result<Arc<Client>> {
        {
            let client = self.client.read().await;
            if let Some(ref c) = *client {
                return Ok(c.clone());
            }
        }

        let client = Arc::new(connect(&self.config).await?);
        *self.client.write().await = Some(client.clone());
        Ok(client)
    }

    async fn open_cursor(&self, topic: &str) -> Result<TopicCursor> {
        let client = self.ensure_connected().await?;
        let partition = client
            .partition_client(topic.to_string(), self.config.partition, UnknownTopicHandling::Error)
            .await
            .map_err(|e| Error::queue(format!("Failed to get partition client: {}", e)))?;

        let at = match self.config.start_from {
            StartFrom::Earliest => OffsetAt::Earliest,
            StartFrom::Latest => OffsetAt::Latest,
        };
        let offset = partition
            .get_offset(at)
            .await
            .map_err(|e| Error::queue(format!("Failed to get offset: {}", e)))?;

        info!(topic = %topic, partition = self.config.partition, offset, "Queue cursor initialized");

        Ok(TopicCursor {
            partition: Arc::new(partition),
            offset,
        })
    }

    /// Drops the cached connection and cursors (for error recovery).
    ///
    /// Cursors restart from `start_from` on the next drain.
    pub async fn reset_connection(&self) {
        *self.client.write().await = None;
        self.cursors.lock().await.clear();
        info!("Redpanda connection reset");
    }

    /// Checks that the brokers answer.
    pub async fn health_check(&self) -> bool {
        crate::health::check_connection(&self.config).await
    }
}

#[async_trait]
impl WorkQueue for RedpandaQueue {
    /// Reads the topic up to its high watermark and moves the cursor past it.
    ///
    /// The cursor lock is held for the whole drain, so concurrent drains in
    /// this process never see the same record.
    async fn drain_all(&self, queue_key: &str) -> Result<Vec<QueueRecord>> {
        let topic = self.config.topic(queue_key);
        let mut cursors = self.cursors.lock().await;

        if !cursors.contains_key(&topic) {
            let cursor = self.open_cursor(&topic).await?;
            cursors.insert(topic.clone(), cursor);
        }
        let cursor = cursors
            .get_mut(&topic)
            .ok_or_else(|| Error::internal("queue cursor missing after insert"))?;

        let high_watermark = cursor
            .partition
            .get_offset(OffsetAt::Latest)
            .await
            .map_err(|e| Error::queue(format!("Failed to get offset: {}", e)))?;

        let start = cursor.offset;
        let mut next = cursor.offset;
        let mut records = Vec::new();

        while next < high_watermark {
            let (batch, _watermark) = cursor
                .partition
                .fetch_records(next, 1..self.config.fetch_max_bytes, self.config.max_wait_ms)
                .await
                .map_err(|e| Error::queue(format!("Failed to fetch records: {}", e)))?;

            if batch.is_empty() {
                break;
            }

            for record in batch {
                if record.offset >= high_watermark {
                    // Left for the next drain
                    next = high_watermark;
                    break;
                }
                next = record.offset + 1;
                if let Some(decoded) = decode_record(record.offset, record.record.value.as_deref()) {
                    records.push(decoded);
                }
            }
        }

        cursor.offset = next;

        debug!(
            topic = %topic,
            records = records.len(),
            offset_start = start,
            offset_end = next,
            "Drained Redpanda queue"
        );

        Ok(records)
    }
}
