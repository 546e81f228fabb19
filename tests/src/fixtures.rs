//! Test fixtures and data generators.

use chrono::{DateTime, TimeZone, Utc};
use pipeline_core::{BackendParams, Document, RawItem};
use serde_json::{json, Value};

/// Origin of the default test repository.
pub const ORIGIN: &str = "https://example.com/grimoire.git";

/// Second repository, sharing raw indexes with `ORIGIN` in some tests.
pub const OTHER_ORIGIN: &str = "https://example.com/other.git";

/// 2024-01-01T00:00:00Z
pub const BASE_UPDATED_ON: f64 = 1_704_067_200.0;

/// Update time of the `n`th generated commit: one per hour.
pub fn commit_updated_on(n: usize) -> f64 {
    BASE_UPDATED_ON + (n as f64) * 3600.0
}

pub fn ts(updated_on: f64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt((updated_on * 1000.0) as i64)
        .single()
        .unwrap_or_default()
}

/// A commit by `author` (`Name <email>`).
pub fn commit(origin: &str, n: usize, author: &str) -> RawItem {
    let mut item = RawItem::new(format!("{}-{}", short(origin), n), origin, commit_updated_on(n));
    item.data = json!({"hash": format!("{:040x}", n), "author": author});
    item
}

/// `count` commits, each by a distinct author.
pub fn commits(origin: &str, count: usize) -> Vec<RawItem> {
    (0..count)
        .map(|n| commit(origin, n, &format!("Dev {} <dev{}@example.com>", n, n)))
        .collect()
}

/// Commits carrying offsets 1..=count instead of meaningful dates.
pub fn offset_commits(origin: &str, count: usize) -> Vec<RawItem> {
    (0..count)
        .map(|n| {
            let mut item = commit(origin, n, &format!("Dev {} <dev{}@example.com>", n, n));
            item.offset = Some(n as i64 + 1);
            item
        })
        .collect()
}

/// A commit without an author: enriching it yields nothing.
pub fn anonymous_commit(origin: &str, n: usize) -> RawItem {
    let mut item = RawItem::new(format!("{}-anon-{}", short(origin), n), origin, commit_updated_on(n));
    item.data = json!({"hash": format!("{:040x}", n)});
    item
}

/// A commit the mock enricher refuses.
pub fn broken_commit(origin: &str, n: usize) -> RawItem {
    let mut item = commit(origin, n, "Broken <broken@example.com>");
    item.uuid = format!("{}-broken-{}", short(origin), n);
    item.data["fail"] = Value::Bool(true);
    item
}

pub fn git_params(origin: &str) -> BackendParams {
    BackendParams::new([origin])
}

pub fn git_params_with(origin: &str, extra: &[&str]) -> BackendParams {
    let mut args = vec![origin];
    args.extend_from_slice(extra);
    BackendParams::new(args)
}

/// Unwraps a JSON object literal into a document.
pub fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap_or_default()
}

fn short(origin: &str) -> &str {
    origin
        .rsplit('/')
        .next()
        .unwrap_or(origin)
        .trim_end_matches(".git")
}
