//! Ocean feeder tests: fetch parameters, raw index handling, queue feeding
//! and the failure policy.

use integration_tests::fixtures::*;
use integration_tests::mocks::MemoryStore;
use integration_tests::setup::{TestContext, QUEUE_KEY};
use pipeline_core::{Capabilities, ErrorKind, FailurePolicy, Position};
use serde_json::Value;
use worker::feeder::raw_index_name;
use worker::FeedRequest;

fn raw_index() -> String {
    raw_index_name("git", ORIGIN)
}

#[tokio::test]
async fn test_feed_writes_raw_items() {
    let ctx = TestContext::with_items(commits(ORIGIN, 5));
    let mut pipeline = ctx.pipeline();

    let outcome = pipeline.feed(&ctx.feed_request(ORIGIN)).await.unwrap();
    let report = outcome.completed().expect("feed should complete");

    assert_eq!(report.items, 5);
    assert_eq!(report.origin, ORIGIN);
    assert_eq!(report.raw_index, raw_index());

    let docs = ctx.store.docs(&raw_index());
    assert_eq!(docs.len(), 5);
    for doc in &docs {
        assert_eq!(doc["backend_name"], "git");
        assert_eq!(doc["tag"], ORIGIN);
    }
}

#[tokio::test]
async fn test_feed_only_collects_its_origin() {
    let mut items = commits(ORIGIN, 3);
    items.extend(commits(OTHER_ORIGIN, 2));
    let ctx = TestContext::with_items(items);
    let mut pipeline = ctx.pipeline();

    pipeline.feed(&ctx.feed_request(OTHER_ORIGIN)).await.unwrap();

    assert_eq!(ctx.store.count(&raw_index_name("git", OTHER_ORIGIN)), 2);
    assert!(!ctx.store.has_index(&raw_index()));
}

#[tokio::test]
async fn test_raw_index_created_with_mapping_and_aliases() {
    let ctx = TestContext::with_items(commits(ORIGIN, 1));
    let mut pipeline = ctx.pipeline();

    let mut request = ctx.feed_request(ORIGIN);
    request.aliases = vec!["git-raw".into()];
    pipeline.feed(&request).await.unwrap();

    let mapping = ctx.store.mapping(&raw_index()).expect("mapping applied");
    assert!(mapping.properties.contains_key("data"));
    assert_eq!(ctx.store.aliases(&raw_index()), vec!["git-raw".to_string()]);
}

#[tokio::test]
async fn test_epoch_from_date_is_not_forwarded() {
    let ctx = TestContext::with_items(commits(ORIGIN, 2));
    let mut pipeline = ctx.pipeline();

    let request = FeedRequest::new("git", git_params_with(ORIGIN, &["--from-date", "1970-01-01"]));
    pipeline.feed(&request).await.unwrap();

    let params = ctx.source.last_fetch().unwrap();
    assert_eq!(params.from_date, None);
    assert_eq!(ctx.store.count(&raw_index()), 2);
}

#[tokio::test]
async fn test_from_date_filters_fetch() {
    let ctx = TestContext::with_items(commits(ORIGIN, 5));
    let mut pipeline = ctx.pipeline();

    // Commit 2 is at 2024-01-01T02:00:00Z
    let request = FeedRequest::new(
        "git",
        git_params_with(ORIGIN, &["--from-date", "2024-01-01T02:00:00Z"]),
    );
    let report = pipeline.feed(&request).await.unwrap().completed().unwrap();

    assert_eq!(
        ctx.source.last_fetch().unwrap().from_date,
        Some(ts(commit_updated_on(2)))
    );
    assert_eq!(report.items, 3);
}

#[tokio::test]
async fn test_zero_offset_is_not_forwarded() {
    let ctx = TestContext::with_items(offset_commits(ORIGIN, 4));
    ctx.source.set_capabilities(Capabilities::offset());
    let mut pipeline = ctx.pipeline();

    let request = FeedRequest::new("git", git_params_with(ORIGIN, &["--offset", "0"]));
    pipeline.feed(&request).await.unwrap();
    assert_eq!(ctx.source.last_fetch().unwrap().from_offset, None);

    let request = FeedRequest::new("git", git_params_with(ORIGIN, &["--offset", "3"]));
    let report = pipeline.feed(&request).await.unwrap().completed().unwrap();
    assert_eq!(ctx.source.last_fetch().unwrap().from_offset, Some(3));
    assert_eq!(report.items, 2);
}

#[tokio::test]
async fn test_undeclared_parameters_are_dropped() {
    let ctx = TestContext::with_items(commits(ORIGIN, 1));
    let mut pipeline = ctx.pipeline();

    let request = FeedRequest::new(
        "git",
        git_params_with(ORIGIN, &["--category", "commit", "--latest-items"]),
    );
    pipeline.feed(&request).await.unwrap();
    let params = ctx.source.last_fetch().unwrap();
    assert_eq!(params.category, None);
    assert!(!params.latest_items);

    ctx.source
        .set_capabilities(Capabilities::timestamp().with_category().with_latest_items());
    pipeline.feed(&request).await.unwrap();
    let params = ctx.source.last_fetch().unwrap();
    assert_eq!(params.category.as_deref(), Some("commit"));
    assert!(params.latest_items);
}

#[tokio::test]
async fn test_resume_position_overrides_from_date() {
    let ctx = TestContext::with_items(commits(ORIGIN, 5));
    let mut pipeline = ctx.pipeline();

    let mut request = FeedRequest::new("git", git_params_with(ORIGIN, &["--from-date", "2020-01-01"]));
    request.resume = Some(Position::Timestamp(ts(commit_updated_on(3))));
    let report = pipeline.feed(&request).await.unwrap().completed().unwrap();

    assert_eq!(
        ctx.source.last_fetch().unwrap().from_date,
        Some(ts(commit_updated_on(3)))
    );
    assert_eq!(report.items, 2);
}

#[tokio::test]
async fn test_archive_flag_is_forwarded() {
    let ctx = TestContext::with_items(commits(ORIGIN, 1));
    let mut pipeline = ctx.pipeline();

    let mut request = ctx.feed_request(ORIGIN);
    request.fetch_archive = true;
    pipeline.feed(&request).await.unwrap();

    assert!(ctx.source.last_fetch().unwrap().from_archive);
}

#[tokio::test]
async fn test_clean_deletes_default_raw_index() {
    let ctx = TestContext::with_items(commits(ORIGIN, 2));
    ctx.store.seed(&raw_index(), vec![doc(serde_json::json!({"uuid": "stale"}))], "uuid");
    let mut pipeline = ctx.pipeline();

    let mut request = ctx.feed_request(ORIGIN);
    request.clean = true;
    pipeline.feed(&request).await.unwrap();

    assert_eq!(ctx.store.deleted(), vec![raw_index()]);
    assert_eq!(ctx.store.count(&raw_index()), 2);
}

#[tokio::test]
async fn test_clean_never_deletes_named_raw_index() {
    let ctx = TestContext::with_items(commits(ORIGIN, 2));
    ctx.store.seed("shared_raw", vec![doc(serde_json::json!({"uuid": "other-source"}))], "uuid");
    let mut pipeline = ctx.pipeline();

    let mut request = ctx.feed_request(ORIGIN);
    request.clean = true;
    request.raw_index = Some("shared_raw".into());
    pipeline.feed(&request).await.unwrap();

    assert!(ctx.store.deleted().is_empty());
    assert_eq!(ctx.store.count("shared_raw"), 3);
}

#[tokio::test]
async fn test_project_is_assigned_to_items() {
    let ctx = TestContext::with_items(commits(ORIGIN, 2));
    let mut pipeline = ctx.pipeline();

    let mut request = ctx.feed_request(ORIGIN);
    request.project = Some("grimoire".into());
    pipeline.feed(&request).await.unwrap();

    for doc in ctx.store.docs(&raw_index()) {
        assert_eq!(doc["project"], Value::from("grimoire"));
    }
}

#[tokio::test]
async fn test_items_uploaded_in_bulk_size_chunks() {
    let ctx = TestContext::with_store(MemoryStore::new().with_bulk_size(10));
    ctx.source.add_items(commits(ORIGIN, 25));
    let mut pipeline = ctx.pipeline();

    pipeline.feed(&ctx.feed_request(ORIGIN)).await.unwrap();

    assert_eq!(ctx.store.uploads_to(&raw_index()), vec![10, 10, 5]);
}

#[tokio::test]
async fn test_refeeding_is_idempotent() {
    let ctx = TestContext::with_items(commits(ORIGIN, 4));
    let mut pipeline = ctx.pipeline();

    pipeline.feed(&ctx.feed_request(ORIGIN)).await.unwrap();
    let first = ctx.store.docs(&raw_index());
    pipeline.feed(&ctx.feed_request(ORIGIN)).await.unwrap();

    assert_eq!(ctx.store.docs(&raw_index()), first);
}

#[tokio::test]
async fn test_queue_feeding_takes_items_by_tag() {
    let ctx = TestContext::new();
    for item in commits(ORIGIN, 2) {
        ctx.queue.push(QUEUE_KEY, ORIGIN, item);
    }
    for item in commits(OTHER_ORIGIN, 1) {
        ctx.queue.push(QUEUE_KEY, OTHER_ORIGIN, item);
    }
    let mut pipeline = ctx.pipeline();

    let mut request = ctx.feed_request(ORIGIN);
    request.use_queue = true;
    let report = pipeline.feed(&request).await.unwrap().completed().unwrap();

    assert_eq!(report.items, 2);
    assert!(ctx.source.fetches().is_empty());
    assert_eq!(ctx.queue.pending(QUEUE_KEY), 0);

    // The other tag stays buffered in this session
    let drain = pipeline.queue().unwrap();
    assert_eq!(drain.buffered(OTHER_ORIGIN), 1);
    assert_eq!(drain.tags(), vec![ORIGIN, OTHER_ORIGIN]);

    let mut request = ctx.feed_request(OTHER_ORIGIN);
    request.use_queue = true;
    let report = pipeline.feed(&request).await.unwrap().completed().unwrap();
    assert_eq!(report.items, 1);
    assert_eq!(ctx.queue.drain_count(), 2);
}

#[tokio::test]
async fn test_separate_sessions_do_not_share_drained_items() {
    let ctx = TestContext::new();
    for item in commits(ORIGIN, 3) {
        ctx.queue.push(QUEUE_KEY, ORIGIN, item);
    }

    let mut request = ctx.feed_request(ORIGIN);
    request.use_queue = true;

    let mut first = ctx.pipeline();
    let mut second = ctx.pipeline();
    let a = first.feed(&request).await.unwrap().completed().unwrap();
    let b = second.feed(&request).await.unwrap().completed().unwrap();

    assert_eq!(a.items, 3);
    assert_eq!(b.items, 0);
}

#[tokio::test]
async fn test_unknown_backend_is_an_error_under_any_policy() {
    let ctx = TestContext::new();
    let request = FeedRequest::new("jira", git_params(ORIGIN));

    for policy in [FailurePolicy::LogAndContinue, FailurePolicy::Propagate] {
        let mut pipeline = ctx.pipeline_with_policy(policy);
        let err = pipeline.feed(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownBackend);
    }
}

#[tokio::test]
async fn test_fetch_failure_is_settled_by_policy() {
    let ctx = TestContext::with_items(commits(ORIGIN, 2));
    ctx.source.set_fail_fetch(true);

    let mut pipeline = ctx.pipeline_with_policy(FailurePolicy::LogAndContinue);
    let outcome = pipeline.feed(&ctx.feed_request(ORIGIN)).await.unwrap();
    assert_eq!(outcome.failure_kind(), Some(ErrorKind::Feed));

    let mut pipeline = ctx.pipeline_with_policy(FailurePolicy::Propagate);
    let err = pipeline.feed(&ctx.feed_request(ORIGIN)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Feed);
    assert_eq!(err.code(), "FEED_001");
}

#[tokio::test]
async fn test_invalid_backend_params_fail_the_feed() {
    let ctx = TestContext::new();
    let mut pipeline = ctx.pipeline();

    let outcome = pipeline
        .feed(&FeedRequest::new("git", Default::default()))
        .await
        .unwrap();
    assert_eq!(outcome.failure_kind(), Some(ErrorKind::Feed));
}

#[tokio::test]
async fn test_enrich_only_connector_cannot_be_fed() {
    let ctx = TestContext::new();
    let mut pipeline = ctx.pipeline();

    let outcome = pipeline
        .feed(&FeedRequest::new("archive", git_params(ORIGIN)))
        .await
        .unwrap();
    assert_eq!(outcome.failure_kind(), Some(ErrorKind::Feed));
}

#[tokio::test]
async fn test_request_without_backend_name_is_rejected() {
    let ctx = TestContext::with_items(commits(ORIGIN, 2));
    let mut pipeline = ctx.pipeline();

    let err = pipeline
        .feed(&FeedRequest::new("", git_params(ORIGIN)))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(ctx.source.fetches().is_empty());
    assert!(!ctx.store.has_index(&raw_index()));
}
