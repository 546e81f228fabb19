//! ClickHouse client wrapper.

use crate::config::ClickHouseConfig;
use crate::schema::table_name;
use clickhouse::Client;
use pipeline_core::Result;
use tracing::info;

/// ClickHouse client bound to one database.
#[derive(Clone)]
pub struct ClickHouseClient {
    inner: Client,
    config: ClickHouseConfig,
}

impl ClickHouseClient {
    /// Creates a new ClickHouse client.
    pub fn new(config: ClickHouseConfig) -> Result<Self> {
        let mut client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database)
            .with_option("max_execution_time", config.timeout_secs.to_string());

        if let Some(ref user) = config.username {
            client = client.with_user(user);
        }

        if let Some(ref pass) = config.password {
            client = client.with_password(pass);
        }

        info!(
            url = %config.anonymized_url(),
            database = %config.database,
            "Created ClickHouse client"
        );

        Ok(Self {
            inner: client,
            config,
        })
    }

    /// Returns the inner clickhouse client.
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClickHouseConfig {
        &self.config
    }

    /// Fully qualified, quoted table name backing `index`.
    pub fn table(&self, index: &str) -> String {
        format!("`{}`.`{}`", self.config.database, table_name(index))
    }
}

/// Maps a driver error onto the store error kind.
pub(crate) fn store_error(context: &'static str) -> impl FnOnce(clickhouse::error::Error) -> pipeline_core::Error {
    move |e| pipeline_core::Error::store(format!("{}: {}", context, e))
}
