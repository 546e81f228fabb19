//! Pipeline session tests: collect-and-enrich, identity lookups and the
//! scheduler.

use integration_tests::fixtures::*;
use integration_tests::setup::TestContext;
use pipeline_core::{ErrorKind, Position, RawItem};
use worker::feeder::raw_index_name;
use worker::{
    PipelineScheduler, SchedulerConfig, SourceTask, TaskSet, IDENTITIES_INDEX,
};

fn enrich_index(origin: &str) -> String {
    format!("{}_enrich", raw_index_name("git", origin))
}

fn more_commits(origin: &str, range: std::ops::Range<usize>) -> Vec<RawItem> {
    range
        .map(|n| commit(origin, n, &format!("Dev {} <dev{}@example.com>", n, n)))
        .collect()
}

#[tokio::test]
async fn test_collect_and_enrich_resumes_from_enriched_position() {
    let ctx = TestContext::with_items(commits(ORIGIN, 3));
    let mut pipeline = ctx.pipeline();
    let feed = ctx.feed_request(ORIGIN);
    let task = ctx.enrich_task(ORIGIN);

    let first = pipeline.collect_and_enrich(&feed, &task).await.unwrap();
    assert_eq!(first.position, None);
    assert_eq!(ctx.source.last_fetch().unwrap().from_date, None);
    assert_eq!(first.feed.unwrap().completed().unwrap().items, 3);
    assert_eq!(first.enrich.completed().unwrap().enriched, 3);

    ctx.source.add_items(more_commits(ORIGIN, 3..5));
    let second = pipeline.collect_and_enrich(&feed, &task).await.unwrap();

    let position = Position::Timestamp(ts(commit_updated_on(2)));
    assert_eq!(second.position, Some(position));
    assert_eq!(
        ctx.source.last_fetch().unwrap().from_date,
        position.as_timestamp()
    );
    assert_eq!(second.feed.unwrap().completed().unwrap().items, 3);
    assert_eq!(second.enrich.completed().unwrap().enriched, 3);
    assert_eq!(ctx.store.count(&enrich_index(ORIGIN)), 5);
}

#[tokio::test]
async fn test_collect_and_enrich_enriches_after_failed_feed() {
    let ctx = TestContext::new();
    let docs = commits(ORIGIN, 2)
        .iter()
        .map(|i| i.to_document().unwrap())
        .collect();
    ctx.store.seed(&raw_index_name("git", ORIGIN), docs, "uuid");
    ctx.source.set_fail_fetch(true);
    let mut pipeline = ctx.pipeline();

    let report = pipeline
        .collect_and_enrich(&ctx.feed_request(ORIGIN), &ctx.enrich_task(ORIGIN))
        .await
        .unwrap();

    assert_eq!(report.feed.unwrap().failure_kind(), Some(ErrorKind::Feed));
    assert_eq!(report.enrich.completed().unwrap().enriched, 2);
}

#[tokio::test]
async fn test_collect_and_enrich_without_position_skips_feed() {
    let ctx = TestContext::with_items(commits(ORIGIN, 2));
    let mut pipeline = ctx.pipeline();

    // The enrich side cannot build its backend, so no position resolves
    let task = worker::EnrichTask::new("git", Default::default());
    let report = pipeline
        .collect_and_enrich(&ctx.feed_request(ORIGIN), &task)
        .await
        .unwrap();

    assert!(report.feed.is_none());
    assert_eq!(report.enrich.failure_kind(), Some(ErrorKind::Enrich));
    assert!(ctx.source.fetches().is_empty());
}

#[tokio::test]
async fn test_collect_and_enrich_unknown_backend() {
    let ctx = TestContext::new();
    let mut pipeline = ctx.pipeline();

    let task = worker::EnrichTask::new("jira", git_params(ORIGIN));
    let err = pipeline
        .collect_and_enrich(&ctx.feed_request(ORIGIN), &task)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownBackend);
}

#[tokio::test]
async fn test_items_for_merged_uuid() {
    let mut items = vec![
        commit(ORIGIN, 0, "Jane Roe <jane@example.com>"),
        commit(ORIGIN, 1, "Dev 1 <dev1@example.com>"),
        commit(ORIGIN, 2, "Jane Roe <jane@example.com>"),
    ];
    items.push(anonymous_commit(ORIGIN, 3));
    let ctx = TestContext::with_items(items);
    let mut pipeline = ctx.pipeline();
    let task = ctx.enrich_task(ORIGIN);
    pipeline
        .collect_and_enrich(&ctx.feed_request(ORIGIN), &task)
        .await
        .unwrap();

    let mut found = pipeline
        .items_for_uuid("sh-jane@example.com", &task)
        .await
        .unwrap();
    found.sort_by(|a, b| a.uuid.cmp(&b.uuid));

    let uuids: Vec<_> = found.iter().map(|i| i.uuid.as_str()).collect();
    assert_eq!(uuids, vec!["grimoire-0", "grimoire-2"]);
    assert!(pipeline
        .items_for_uuid("sh-nobody@example.com", &task)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_populate_identities_index() {
    let ctx = TestContext::with_items(commits(ORIGIN, 3));
    let mut pipeline = ctx.pipeline();
    pipeline
        .collect_and_enrich(&ctx.feed_request(ORIGIN), &ctx.enrich_task(ORIGIN))
        .await
        .unwrap();

    let written = pipeline
        .populate_identities_index(&enrich_index(ORIGIN))
        .await
        .unwrap();

    assert_eq!(written, 3);
    let cached = ctx.store.docs(IDENTITIES_INDEX);
    assert_eq!(cached.len(), 3);
    assert!(cached.iter().all(|d| d["sh_uuid"].as_str().unwrap().starts_with("sh-")));
    assert!(cached.iter().all(|d| d.contains_key("last_seen")));
}

#[tokio::test]
async fn test_scheduler_round_runs_every_task() {
    let mut items = commits(ORIGIN, 3);
    items.extend(commits(OTHER_ORIGIN, 2));
    let ctx = TestContext::with_items(items);

    let mut broken = ctx.enrich_task(ORIGIN);
    broken.filter_raw = Some("no-separator".into());

    let tasks = TaskSet {
        collect: vec![ctx.feed_request(ORIGIN)],
        sources: vec![SourceTask {
            collect: ctx.feed_request(OTHER_ORIGIN),
            enrich: ctx.enrich_task(OTHER_ORIGIN),
        }],
        enrich: vec![ctx.enrich_task(ORIGIN), broken],
        identities_cache: vec![enrich_index(ORIGIN)],
    };
    let mut scheduler = PipelineScheduler::new(SchedulerConfig::default(), ctx.pipeline(), tasks);

    let report = scheduler.run_round().await.unwrap();

    assert_eq!(report.completed, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(report.identities_cached, 3);
    assert_eq!(ctx.store.count(&enrich_index(ORIGIN)), 3);
    assert_eq!(ctx.store.count(&enrich_index(OTHER_ORIGIN)), 2);
}

#[tokio::test]
async fn test_scheduler_round_aborts_on_unknown_backend() {
    let ctx = TestContext::with_items(commits(ORIGIN, 1));
    let tasks = TaskSet {
        collect: vec![worker::FeedRequest::new("jira", git_params(ORIGIN))],
        enrich: vec![ctx.enrich_task(ORIGIN)],
        ..TaskSet::default()
    };
    let mut scheduler = PipelineScheduler::new(SchedulerConfig::default(), ctx.pipeline(), tasks);

    let err = scheduler.run_round().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownBackend);
    assert!(!ctx.store.has_index(&enrich_index(ORIGIN)));
}

#[tokio::test]
async fn test_scheduler_run_once_returns() {
    let ctx = TestContext::with_items(commits(ORIGIN, 2));
    let tasks = TaskSet {
        collect: vec![ctx.feed_request(ORIGIN)],
        ..TaskSet::default()
    };
    let config = SchedulerConfig {
        interval_secs: 1,
        run_once: true,
    };

    PipelineScheduler::new(config, ctx.pipeline(), tasks)
        .start()
        .await
        .unwrap();

    assert_eq!(ctx.store.count(&raw_index_name("git", ORIGIN)), 2);
}
