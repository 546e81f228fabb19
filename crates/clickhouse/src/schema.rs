//! ClickHouse table schemas.
//!
//! Every index is one table:
//! - `id` is the document key; ReplacingMergeTree keeps the newest write
//! - `updated_at` / `item_offset` carry the resume position of the item
//! - `doc` holds the full JSON document
//! - the index mapping is kept as the table comment
//!
//! Aliases are plain views over the table.

use pipeline_core::IndexMapping;

/// Longest table name kept readable before hashing kicks in.
const MAX_TABLE_NAME: usize = 180;

/// SQL for creating the database.
pub fn create_database(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS `{}`", table_name(database))
}

/// SQL for creating the table backing an index. The comment is bound.
pub fn create_index_table(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {} (
    id String,
    origin String,

    -- Resume position
    updated_at DateTime64(3),
    item_offset Nullable(Int64),

    -- Full document
    doc String,

    -- Write time, used by retention
    ingested_at DateTime64(3) DEFAULT now64(3)
)
ENGINE = ReplacingMergeTree(ingested_at)
ORDER BY id
COMMENT ?
"#,
        table
    )
}

/// SQL for an alias view over an index table.
pub fn create_alias_view(alias: &str, table: &str) -> String {
    format!("CREATE VIEW IF NOT EXISTS {} AS SELECT * FROM {}", alias, table)
}

pub fn drop_index_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", table)
}

/// Serializes a mapping into the table comment.
pub fn mapping_comment(mapping: Option<&IndexMapping>) -> String {
    mapping
        .and_then(|m| serde_json::to_string(m).ok())
        .unwrap_or_default()
}

/// Reads a mapping back from a table comment.
pub fn parse_mapping_comment(comment: &str) -> Option<IndexMapping> {
    if comment.is_empty() {
        return None;
    }
    serde_json::from_str(comment).ok()
}

/// Table name for an index.
///
/// Index names may carry URLs (`git_https://host/repo`), so anything
/// outside `[A-Za-z0-9_]` becomes `_` and a hash of the original name is
/// appended to keep rewritten names apart.
pub fn table_name(index: &str) -> String {
    let clean: String = index
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if clean == index && clean.len() <= MAX_TABLE_NAME {
        return clean;
    }

    let mut short: String = clean.chars().take(MAX_TABLE_NAME).collect();
    short.push_str(&format!("_{:016x}", fnv1a(index.as_bytes())));
    short
}

/// FNV-1a, stable across builds unlike the std hasher.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
