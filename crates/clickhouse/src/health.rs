//! ClickHouse health checks.

use crate::client::{store_error, ClickHouseClient};
use crate::schema::create_database;
use pipeline_core::Result;
use tracing::{debug, error};

/// Check ClickHouse connection health.
pub async fn check_connection(client: &ClickHouseClient) -> bool {
    match client.inner().query("SELECT 1").fetch_one::<u8>().await {
        Ok(_) => {
            debug!("ClickHouse connection healthy");
            true
        }
        Err(e) => {
            error!(url = %client.config().anonymized_url(), "ClickHouse health check failed: {}", e);
            false
        }
    }
}

/// Creates the configured database if it does not exist yet.
///
/// Runs against `default`, since the target database may be missing.
pub async fn init_database(client: &ClickHouseClient) -> Result<()> {
    client
        .inner()
        .clone()
        .with_database("default")
        .query(&create_database(&client.config().database))
        .execute()
        .await
        .map_err(store_error("Failed to execute DDL"))?;

    debug!(database = %client.config().database, "ClickHouse database initialized");
    Ok(())
}
