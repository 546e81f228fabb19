//! Identity loading tests: batching, deduplication and registry failures.

use futures::stream;
use integration_tests::fixtures::*;
use integration_tests::mocks::{parse_author, MockEnrichFactory, MockRegistry};
use integration_tests::setup::TestContext;
use pipeline_core::{
    EnrichBackend, EnrichContext, EnrichFactory, EnrichedItem, ErrorKind, FailurePolicy, Item,
    RawItem, Result,
};
use std::collections::HashSet;
use worker::feeder::raw_index_name;
use worker::{load_identities, EnrichStage};

fn mock_enrich() -> Box<dyn EnrichBackend> {
    MockEnrichFactory::new()
        .build(&EnrichContext::default())
        .unwrap()
}

fn raw_stream(items: Vec<RawItem>) -> impl futures::Stream<Item = Result<Item>> {
    stream::iter(items.into_iter().map(|item| Ok(Item::from(item))))
}

fn seed_raw(ctx: &TestContext, items: Vec<RawItem>) {
    let docs = items.iter().map(|i| i.to_document().unwrap()).collect();
    ctx.store.seed(&raw_index_name("git", ORIGIN), docs, "uuid");
}

#[tokio::test]
async fn test_batches_flush_past_one_hundred() {
    let registry = MockRegistry::new();
    let enrich = mock_enrich();

    let loaded = load_identities(raw_stream(commits(ORIGIN, 250)), enrich.as_ref(), &registry)
        .await
        .unwrap();

    assert_eq!(loaded, 250);
    assert_eq!(registry.batch_sizes(), vec![101, 101, 48]);
    assert!(registry.connectors().iter().all(|c| c == "git"));
}

#[tokio::test]
async fn test_duplicates_collapse_within_a_batch() {
    let registry = MockRegistry::new();
    let enrich = mock_enrich();

    let items = (0..5)
        .map(|n| commit(ORIGIN, n, "Jane Roe <jane@example.com>"))
        .collect();
    let loaded = load_identities(raw_stream(items), enrich.as_ref(), &registry)
        .await
        .unwrap();

    assert_eq!(loaded, 1);
    assert_eq!(registry.batch_sizes(), vec![1]);
    assert!(registry
        .registered()
        .contains(&parse_author("Jane Roe <jane@example.com>")));
}

#[tokio::test]
async fn test_items_without_identities_submit_nothing() {
    let registry = MockRegistry::new();
    let enrich = mock_enrich();

    let items = (0..3).map(|n| anonymous_commit(ORIGIN, n)).collect();
    let loaded = load_identities(raw_stream(items), enrich.as_ref(), &registry)
        .await
        .unwrap();

    assert_eq!(loaded, 0);
    assert!(registry.batch_sizes().is_empty());
}

#[tokio::test]
async fn test_enriched_items_carry_no_identities_for_mock_connector() {
    let registry = MockRegistry::new();
    let enrich = mock_enrich();

    let items = stream::iter(vec![Ok(Item::from(EnrichedItem::new().with("id", "1")))]);
    let loaded = load_identities(items, enrich.as_ref(), &registry).await.unwrap();

    assert_eq!(loaded, 0);
}

#[tokio::test]
async fn test_registry_failure_is_an_identity_batch_error() {
    let registry = MockRegistry::new();
    registry.set_should_fail(true);
    let enrich = mock_enrich();

    let err = load_identities(raw_stream(commits(ORIGIN, 3)), enrich.as_ref(), &registry)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Enrich);
    assert_eq!(err.code(), "ENRICH_002");
}

#[tokio::test]
async fn test_identities_registered_before_enrichment() {
    let ctx = TestContext::new();
    seed_raw(&ctx, commits(ORIGIN, 3));
    let pipeline = ctx.pipeline();

    let report = pipeline
        .enrich(&ctx.enrich_task(ORIGIN))
        .await
        .unwrap()
        .completed()
        .unwrap();

    assert_eq!(report.identities, 3);
    let loading = report
        .stages
        .iter()
        .position(|s| *s == EnrichStage::LoadingIdentities)
        .unwrap();
    let enriching = report
        .stages
        .iter()
        .position(|s| *s == EnrichStage::Enriching)
        .unwrap();
    assert!(loading < enriching);
    assert_eq!(ctx.identities.registered().len(), 3);
}

#[tokio::test]
async fn test_registry_failure_aborts_enrichment() {
    let ctx = TestContext::new();
    seed_raw(&ctx, commits(ORIGIN, 3));
    ctx.identities.set_should_fail(true);
    let enrich_index = format!("{}_enrich", raw_index_name("git", ORIGIN));

    let pipeline = ctx.pipeline_with_policy(FailurePolicy::LogAndContinue);
    let outcome = pipeline.enrich(&ctx.enrich_task(ORIGIN)).await.unwrap();
    assert_eq!(outcome.failure_kind(), Some(ErrorKind::Enrich));
    assert_eq!(ctx.store.count(&enrich_index), 0);

    let pipeline = ctx.pipeline_with_policy(FailurePolicy::Propagate);
    let err = pipeline.enrich(&ctx.enrich_task(ORIGIN)).await.unwrap_err();
    assert_eq!(err.code(), "ENRICH_002");
}

#[tokio::test]
async fn test_only_identities_skips_enrichment() {
    let ctx = TestContext::new();
    seed_raw(&ctx, commits(ORIGIN, 4));
    let pipeline = ctx.pipeline();

    let mut task = ctx.enrich_task(ORIGIN);
    task.only_identities = true;
    let report = pipeline.enrich(&task).await.unwrap().completed().unwrap();

    assert_eq!(report.identities, 4);
    assert_eq!(report.enriched, 0);
    assert!(!report.stages.contains(&EnrichStage::Enriching));
    assert_eq!(ctx.store.count(&report.enrich_index), 0);
}

#[tokio::test]
async fn test_no_registry_means_no_identity_loading() {
    let ctx = TestContext::new();
    seed_raw(&ctx, commits(ORIGIN, 2));
    let pipeline = worker::Pipeline::builder(ctx.connectors.clone(), ctx.store.clone()).build();

    let report = pipeline
        .enrich(&ctx.enrich_task(ORIGIN))
        .await
        .unwrap()
        .completed()
        .unwrap();

    assert_eq!(report.identities, 0);
    assert_eq!(report.enriched, 2);
    assert!(!report.stages.contains(&EnrichStage::LoadingIdentities));
}

#[tokio::test]
async fn test_identity_loading_is_idempotent() {
    let ctx = TestContext::new();
    seed_raw(&ctx, commits(ORIGIN, 3));
    let pipeline = ctx.pipeline();

    pipeline.enrich(&ctx.enrich_task(ORIGIN)).await.unwrap();
    let first: HashSet<_> = ctx.identities.registered();
    let mut task = ctx.enrich_task(ORIGIN);
    task.no_incremental = true;
    pipeline.enrich(&task).await.unwrap();

    assert_eq!(ctx.identities.registered(), first);
}
