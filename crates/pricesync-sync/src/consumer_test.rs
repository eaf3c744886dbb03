use std::sync::atomic::Ordering;

use pricesync_aws::QueueError;
use pricesync_core::FetchStatus;

use super::*;
use crate::testing::{
    dec, listing, ok, orchestrator, status, FakeFallback, FakeQueue, FakeSource, MemoryStore,
};

#[test]
fn identifier_is_read_from_json_body() {
    assert_eq!(
        parse_identifier(r#"{"identifier":"B000TEST01"}"#).as_deref(),
        Some("B000TEST01")
    );
    assert_eq!(
        parse_identifier(r#" { "identifier": " B000TEST01 ", "source": "admin" } "#).as_deref(),
        Some("B000TEST01")
    );
}

#[test]
fn bare_identifier_body_is_accepted() {
    assert_eq!(parse_identifier("B000TEST01\n").as_deref(), Some("B000TEST01"));
    assert_eq!(parse_identifier("\"B000TEST01\"").as_deref(), Some("B000TEST01"));
}

#[test]
fn bodies_without_identifier_are_rejected() {
    assert_eq!(parse_identifier(r#"{"asin":"B000TEST01"}"#), None);
    assert_eq!(parse_identifier(r#"{"identifier":""}"#), None);
    assert_eq!(parse_identifier(r#"{"identifier":42}"#), None);
    assert_eq!(parse_identifier("{not json"), None);
    assert_eq!(parse_identifier(""), None);
    assert_eq!(parse_identifier("two words"), None);
}

#[tokio::test]
async fn messages_are_acknowledged_after_terminal_outcomes() {
    let store = MemoryStore::with_listings(vec![listing(1, "A", 10), listing(2, "B", 10)]);
    let source = FakeSource::new(10)
        .answer(ok("A", 11))
        .answer(status("B", FetchStatus::Error));
    let queue = FakeQueue::default().batch(&[
        r#"{"identifier":"A"}"#,
        r#"{"identifier":"B"}"#,
        r#"{"identifier":"UNKNOWN"}"#,
        "<<garbage>>",
        r#"{"identifier":"A"}"#,
    ]);
    let mut orch = orchestrator(source, FakeFallback::default(), store.clone());

    let summary = QueueConsumer::new(queue.clone(), DrainMode::UntilEmpty)
        .drain(&mut orch)
        .await
        .unwrap();

    assert_eq!(queue.acked(), vec!["r-0", "r-1", "r-2", "r-3", "r-4"]);
    assert_eq!(summary.ok, 1);
    assert_eq!(summary.soft_failures, 1);
    assert_eq!(summary.unknown, 1);
    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(store.listing("A").price, dec(11));
}

#[tokio::test]
async fn drain_continues_across_receives_until_idle() {
    let store = MemoryStore::with_listings(vec![listing(1, "A", 10), listing(2, "B", 10)]);
    let source = FakeSource::new(10).answer(ok("A", 10)).answer(ok("B", 10));
    let queue = FakeQueue::default()
        .batch(&[r#"{"identifier":"A"}"#])
        .batch(&[r#"{"identifier":"B"}"#]);
    let fallback = FakeFallback::default();
    let mut orch = orchestrator(source, fallback.clone(), store);

    let summary = QueueConsumer::new(queue.clone(), DrainMode::UntilEmpty)
        .drain(&mut orch)
        .await
        .unwrap();

    assert_eq!(summary.ok, 2);
    assert_eq!(queue.acked().len(), 2);
    assert_eq!(fallback.opens.load(Ordering::SeqCst), 1);
    assert_eq!(fallback.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn repeated_request_in_a_later_receive_is_synced_again() {
    let store = MemoryStore::with_listings(vec![listing(1, "A", 10)]);
    let source = FakeSource::new(10).answer(ok("A", 11)).answer(ok("A", 12));
    let queue = FakeQueue::default()
        .batch(&[r#"{"identifier":"A"}"#])
        .batch(&[r#"{"identifier":"A"}"#]);
    let mut orch = orchestrator(source.clone(), FakeFallback::default(), store.clone());

    let summary = QueueConsumer::new(queue.clone(), DrainMode::UntilEmpty)
        .drain(&mut orch)
        .await
        .unwrap();

    assert_eq!(queue.acked(), vec!["r-0", "r-100"]);
    assert_eq!(summary.ok, 2);
    assert_eq!(summary.duplicates, 0);
    assert_eq!(source.calls().len(), 2);
    assert_eq!(store.listing("A").price, dec(12));
}

#[tokio::test]
async fn follow_mode_keeps_syncing_repeated_requests() {
    let store = MemoryStore::with_listings(vec![listing(1, "A", 10)]);
    let source = FakeSource::new(10).answer(ok("A", 11)).answer(ok("A", 12));
    let queue = FakeQueue::default()
        .batch(&[r#"{"identifier":"A"}"#])
        .batch(&[r#"{"identifier":"A"}"#])
        .failure(QueueError::Api {
            status: 503,
            body: "ServiceUnavailable".to_string(),
        });
    let mut orch = orchestrator(source.clone(), FakeFallback::default(), store.clone());

    let err = QueueConsumer::new(queue.clone(), DrainMode::Forever)
        .drain(&mut orch)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Queue(_)));
    assert_eq!(queue.acked(), vec!["r-0", "r-100"]);
    assert_eq!(source.calls().len(), 2);
    assert_eq!(store.listing("A").price, dec(12));
}

#[tokio::test]
async fn queue_failure_stops_the_drain() {
    let store = MemoryStore::with_listings(vec![listing(1, "A", 10)]);
    let source = FakeSource::new(10).answer(ok("A", 10));
    let queue = FakeQueue::default()
        .failure(QueueError::Api {
            status: 403,
            body: "AccessDenied".to_string(),
        })
        .batch(&[r#"{"identifier":"A"}"#]);
    let mut orch = orchestrator(source.clone(), FakeFallback::default(), store);

    let err = QueueConsumer::new(queue.clone(), DrainMode::UntilEmpty)
        .drain(&mut orch)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Queue(_)));
    assert!(source.calls().is_empty());
    assert!(queue.acked().is_empty());
}

#[tokio::test]
async fn store_failure_leaves_message_unacknowledged() {
    let store = MemoryStore::with_listings(vec![listing(1, "A", 10)]).failing_appends();
    let source = FakeSource::new(10).answer(ok("A", 10));
    let queue = FakeQueue::default().batch(&[r#"{"identifier":"A"}"#, r#"{"identifier":"B"}"#]);
    let mut orch = orchestrator(source, FakeFallback::default(), store);

    let err = QueueConsumer::new(queue.clone(), DrainMode::UntilEmpty)
        .drain(&mut orch)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Store(_)));
    assert!(queue.acked().is_empty());
}

#[tokio::test]
async fn cancellation_leaves_remaining_messages_for_redelivery() {
    let store = MemoryStore::with_listings(vec![listing(1, "A", 10)]);
    let queue = FakeQueue::default().batch(&[r#"{"identifier":"A"}"#]);
    let mut orch = orchestrator(FakeSource::new(10), FakeFallback::default(), store);
    orch.cancellation().store(true, Ordering::SeqCst);

    let summary = QueueConsumer::new(queue.clone(), DrainMode::Forever)
        .drain(&mut orch)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert!(queue.acked().is_empty());
}
