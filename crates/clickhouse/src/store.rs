//! `DocumentStore` backed by ClickHouse tables.

use async_stream::try_stream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use pipeline_core::{
    Document, DocumentStore, Error, FetchFilter, IndexMapping, ItemStream, Result,
};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::client::{store_error, ClickHouseClient};
use crate::config::ClickHouseConfig;
use crate::insert::insert_documents;
use crate::query::{filter_sql, page_sql, FetchedRow};
use crate::schema::{
    create_alias_view, create_index_table, drop_index_table, mapping_comment,
    parse_mapping_comment, table_name,
};

#[derive(Debug, Row, Deserialize)]
struct CommentRow {
    comment: String,
}

#[derive(Debug, Row, Deserialize)]
struct KeyRow {
    key: String,
}

#[derive(Debug, Row, Deserialize)]
struct MaxOffsetRow {
    max_offset: Option<i64>,
}

/// Document store keeping one ClickHouse table per index.
#[derive(Clone)]
pub struct ClickHouseStore {
    client: ClickHouseClient,
}

impl ClickHouseStore {
    pub fn new(config: ClickHouseConfig) -> Result<Self> {
        Ok(Self {
            client: ClickHouseClient::new(config)?,
        })
    }

    pub fn from_client(client: ClickHouseClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ClickHouseClient {
        &self.client
    }

    /// Whether the table backing `index` exists.
    pub async fn exists(&self, index: &str) -> Result<bool> {
        let count: u64 = self
            .client
            .inner()
            .query("SELECT count() FROM system.tables WHERE database = ? AND name = ?")
            .bind(self.client.config().database.as_str())
            .bind(table_name(index))
            .fetch_one()
            .await
            .map_err(store_error("Query error"))?;
        Ok(count > 0)
    }

    /// Mapping recorded when the index was created.
    pub async fn mapping(&self, index: &str) -> Result<Option<IndexMapping>> {
        let comments: Vec<CommentRow> = self
            .client
            .inner()
            .query("SELECT comment FROM system.tables WHERE database = ? AND name = ?")
            .bind(self.client.config().database.as_str())
            .bind(table_name(index))
            .fetch_all()
            .await
            .map_err(store_error("Query error"))?;
        Ok(comments
            .first()
            .and_then(|row| parse_mapping_comment(&row.comment)))
    }

    fn origin_clause(origin: Option<&str>) -> &'static str {
        if origin.is_some() {
            " AND origin = ?"
        } else {
            ""
        }
    }
}

#[async_trait]
impl DocumentStore for ClickHouseStore {
    fn url(&self) -> String {
        self.client.config().anonymized_url()
    }

    fn bulk_size(&self) -> usize {
        self.client.config().bulk_size
    }

    fn max_clause_size(&self) -> usize {
        self.client.config().max_clause_size
    }

    async fn create_if_absent(
        &self,
        index: &str,
        mapping: Option<&IndexMapping>,
        aliases: &[String],
    ) -> Result<()> {
        let table = self.client.table(index);
        self.client
            .inner()
            .query(&create_index_table(&table))
            .bind(mapping_comment(mapping))
            .execute()
            .await
            .map_err(store_error("Failed to execute DDL"))?;

        for alias in aliases {
            self.client
                .inner()
                .query(&create_alias_view(&self.client.table(alias), &table))
                .execute()
                .await
                .map_err(store_error("Failed to execute DDL"))?;
        }

        info!(index = %index, aliases = aliases.len(), url = %self.url(), "Index ready");
        Ok(())
    }

    async fn delete(&self, index: &str) -> Result<()> {
        self.client
            .inner()
            .query(&drop_index_table(&self.client.table(index)))
            .execute()
            .await
            .map_err(store_error("Failed to drop table"))?;

        info!(index = %index, "Index deleted");
        Ok(())
    }

    async fn bulk_upload(&self, index: &str, docs: Vec<Document>, id_field: &str) -> Result<usize> {
        let mut written = 0;
        for chunk in docs.chunks(self.bulk_size().max(1)) {
            written += insert_documents(&self.client, index, chunk, id_field).await?;
        }
        Ok(written)
    }

    async fn delete_older_than(&self, index: &str, retention_hours: u64) -> Result<u64> {
        if !self.exists(index).await? {
            return Ok(0);
        }

        let table = self.client.table(index);
        let condition = "ingested_at < now64(3) - toIntervalHour(?)";

        let expired: u64 = self
            .client
            .inner()
            .query(&format!("SELECT count() FROM {} WHERE {}", table, condition))
            .bind(retention_hours)
            .fetch_one()
            .await
            .map_err(store_error("Query error"))?;

        if expired > 0 {
            self.client
                .inner()
                .query(&format!("ALTER TABLE {} DELETE WHERE {}", table, condition))
                .bind(retention_hours)
                .execute()
                .await
                .map_err(store_error("Delete error"))?;
        }

        debug!(index = %index, retention_hours, expired, "Expired documents deleted");
        Ok(expired)
    }

    async fn latest_enriched_timestamp(
        &self,
        index: &str,
        origin: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>> {
        if !self.exists(index).await? {
            return Ok(None);
        }

        let sql = format!(
            "SELECT toUnixTimestamp64Milli(max(updated_at)) FROM {} FINAL WHERE updated_at > fromUnixTimestamp64Milli(0){}",
            self.client.table(index),
            Self::origin_clause(origin)
        );
        let mut query = self.client.inner().query(&sql);
        if let Some(origin) = origin {
            query = query.bind(origin);
        }

        let millis: i64 = query.fetch_one().await.map_err(store_error("Query error"))?;
        if millis <= 0 {
            return Ok(None);
        }
        Ok(DateTime::from_timestamp_millis(millis))
    }

    async fn latest_enriched_offset(
        &self,
        index: &str,
        origin: Option<&str>,
    ) -> Result<Option<i64>> {
        if !self.exists(index).await? {
            return Ok(None);
        }

        let sql = format!(
            "SELECT max(item_offset) AS max_offset FROM {} FINAL WHERE 1 = 1{}",
            self.client.table(index),
            Self::origin_clause(origin)
        );
        let mut query = self.client.inner().query(&sql);
        if let Some(origin) = origin {
            query = query.bind(origin);
        }

        let row: MaxOffsetRow = query.fetch_one().await.map_err(store_error("Query error"))?;
        Ok(row.max_offset)
    }

    async fn all_field_names(&self, index: &str) -> Result<BTreeSet<String>> {
        if !self.exists(index).await? {
            return Ok(BTreeSet::new());
        }

        let keys: Vec<KeyRow> = self
            .client
            .inner()
            .query(&format!(
                "SELECT DISTINCT arrayJoin(JSONExtractKeys(doc)) AS key FROM {}",
                self.client.table(index)
            ))
            .fetch_all()
            .await
            .map_err(store_error("Query error"))?;

        let mut names: BTreeSet<String> = keys.into_iter().map(|row| row.key).collect();
        if let Some(mapping) = self.mapping(index).await? {
            names.extend(mapping.properties.into_keys());
        }
        Ok(names)
    }

    fn fetch<'a>(&'a self, index: &'a str, filter: FetchFilter) -> ItemStream<'a, Document> {
        Box::pin(try_stream! {
            if self.exists(index).await? {
                let table = self.client.table(index);
                let conditions = filter_sql(&filter);
                let page_size = self.client.config().scroll_size.max(1);
                let mut after: Option<String> = None;

                loop {
                    let (sql, binds) = page_sql(&table, &conditions, after.as_deref(), page_size);
                    let rows: Vec<FetchedRow> = binds
                        .bind(self.client.inner().query(&sql))
                        .fetch_all()
                        .await
                        .map_err(store_error("Fetch error"))?;

                    let count = rows.len();
                    for row in rows {
                        let doc: Document = serde_json::from_str(&row.doc).map_err(Error::from)?;
                        after = Some(row.id);
                        yield doc;
                    }

                    debug!(index = %index, count, "Fetched page");
                    if count < page_size {
                        break;
                    }
                }
            }
        })
    }

    async fn get_many(&self, index: &str, ids: &[String]) -> Result<Vec<Document>> {
        if ids.is_empty() || !self.exists(index).await? {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, doc FROM {} FINAL WHERE has(?, id) ORDER BY id",
            self.client.table(index)
        );

        let mut docs = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.max_clause_size().max(1)) {
            let rows: Vec<FetchedRow> = self
                .client
                .inner()
                .query(&sql)
                .bind(chunk)
                .fetch_all()
                .await
                .map_err(store_error("Query error"))?;

            for row in rows {
                docs.push(serde_json::from_str(&row.doc)?);
            }
        }
        Ok(docs)
    }
}
