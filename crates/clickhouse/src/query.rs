//! Translation of fetch filters into ClickHouse SQL.

use clickhouse::query::Query;
use clickhouse::Row;
use pipeline_core::{FetchFilter, FieldMatch};
use serde::Deserialize;

/// `id` and document of a fetched row.
#[derive(Debug, Clone, Row, Deserialize)]
pub struct FetchedRow {
    pub id: String,
    pub doc: String,
}

/// Value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Str(String),
    Int(i64),
    Strs(Vec<String>),
}

/// WHERE clause with its bound values, in placeholder order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFilter {
    clauses: Vec<String>,
    binds: Vec<BindValue>,
}

impl SqlFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition. Every `?` in `clause` must have a value in `binds`.
    pub fn push(&mut self, clause: impl Into<String>, binds: impl IntoIterator<Item = BindValue>) {
        self.clauses.push(clause.into());
        self.binds.extend(binds);
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// ` WHERE a AND b`, or nothing.
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn binds(&self) -> &[BindValue] {
        &self.binds
    }

    /// Binds all values onto `query`.
    pub fn bind(&self, mut query: Query) -> Query {
        for value in &self.binds {
            query = match value {
                BindValue::Str(s) => query.bind(s.as_str()),
                BindValue::Int(i) => query.bind(*i),
                BindValue::Strs(values) => query.bind(values.as_slice()),
            };
        }
        query
    }
}

/// SQL expression reading a (possibly nested) string field out of `doc`.
///
/// Path segments are bound, so the expression adds one value per segment.
fn field_expr(field: &FieldMatch) -> (String, Vec<BindValue>) {
    path_expr(&field.path())
}

fn path_expr(path: &[&str]) -> (String, Vec<BindValue>) {
    let placeholders = vec!["?"; path.len()].join(", ");
    let binds = path.iter().map(|s| BindValue::Str(s.to_string())).collect();
    (format!("JSONExtractString(doc, {})", placeholders), binds)
}

/// Joins equality (or prefix) conditions with OR.
fn disjunction(matches: &[FieldMatch], prefix: bool) -> (String, Vec<BindValue>) {
    let mut parts = Vec::with_capacity(matches.len());
    let mut binds = Vec::new();
    for m in matches {
        let (expr, path_binds) = field_expr(m);
        parts.push(if prefix {
            format!("startsWith({}, ?)", expr)
        } else {
            format!("{} = ?", expr)
        });
        binds.extend(path_binds);
        binds.push(BindValue::Str(m.value.clone()));
    }
    (format!("({})", parts.join(" OR ")), binds)
}

/// Builds the WHERE clause for a fetch filter.
pub fn filter_sql(filter: &FetchFilter) -> SqlFilter {
    let mut sql = SqlFilter::new();

    if let Some(from_date) = filter.from_date {
        sql.push(
            "updated_at >= fromUnixTimestamp64Milli(?)",
            [BindValue::Int(from_date.timestamp_millis())],
        );
    }

    if let Some(offset) = filter.from_offset {
        sql.push("item_offset >= ?", [BindValue::Int(offset)]);
    }

    if let Some(origin) = &filter.origin {
        sql.push("origin = ?", [BindValue::Str(origin.clone())]);
    }

    if let Some((field, values)) = &filter.terms {
        let path: Vec<&str> = field.split('.').collect();
        let (expr, mut binds) = path_expr(&path);
        // has(array, value): the array comes first
        binds.insert(0, BindValue::Strs(values.clone()));
        sql.push(format!("has(?, {})", expr), binds);
    }

    for m in &filter.must {
        let (expr, mut binds) = field_expr(m);
        binds.push(BindValue::Str(m.value.clone()));
        sql.push(format!("{} = ?", expr), binds);
    }

    if !filter.any_of.is_empty() {
        let (clause, binds) = disjunction(&filter.any_of, false);
        sql.push(clause, binds);
    }

    if !filter.prefixes.is_empty() {
        let (clause, binds) = disjunction(&filter.prefixes, true);
        sql.push(clause, binds);
    }

    sql
}

/// One keyset page: rows with `id` after `after`, in id order.
pub fn page_sql(table: &str, filter: &SqlFilter, after: Option<&str>, limit: usize) -> (String, SqlFilter) {
    let mut page = filter.clone();
    if let Some(after) = after {
        page.push("id > ?", [BindValue::Str(after.to_string())]);
    }
    let sql = format!(
        "SELECT id, doc FROM {} FINAL{} ORDER BY id LIMIT {}",
        table,
        page.where_sql(),
        limit.max(1)
    );
    (sql, page)
}
