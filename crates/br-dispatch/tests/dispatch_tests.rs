//! End-to-end tests of the dispatch workflow against the in-memory publisher
//! and a real ledger file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use br_common::OutboundMessage;
use br_dispatch::{
    DispatchError, DispatchOutcome, Dispatcher, ExecutionLedger, FileLedger, LedgerOrdering,
    NoPacing,
};
use br_queue::{InMemoryPublisher, QueueError, TopicPublisher};
use tempfile::TempDir;
use tokio::sync::Barrier;

struct Fixture {
    dir: TempDir,
    ledger_path: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ledger_path = dir.path().join("execution.log");
        Self { dir, ledger_path }
    }

    fn source(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn ledger(&self) -> Arc<FileLedger> {
        Arc::new(FileLedger::new(&self.ledger_path))
    }

    fn ledger_lines(&self) -> Vec<String> {
        match std::fs::read_to_string(&self.ledger_path) {
            Ok(contents) => contents.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }
}

fn unpaced(publisher: Arc<dyn TopicPublisher>, ledger: Arc<dyn ExecutionLedger>) -> Dispatcher {
    Dispatcher::new(publisher, ledger).with_pacing(Box::new(NoPacing))
}

#[tokio::test]
async fn test_sends_non_blank_lines_in_order() {
    let fixture = Fixture::new();
    let source = fixture.source("batch.txt", "first\n\n   \nsecond\n\t\nthird\n");
    let publisher = Arc::new(InMemoryPublisher::new("orders"));

    let outcome = unpaced(publisher.clone(), fixture.ledger())
        .dispatch(&source)
        .await
        .unwrap();

    let sent = publisher.sent();
    let bodies: Vec<String> = sent.iter().map(OutboundMessage::body_text).collect();
    assert_eq!(bodies, vec!["first", "second", "third"]);

    let correlation_ids: HashSet<&str> = sent.iter().map(|m| m.correlation_id.as_str()).collect();
    assert_eq!(correlation_ids.len(), 1);

    let message_ids: HashSet<&str> = sent.iter().map(|m| m.message_id.as_str()).collect();
    assert_eq!(message_ids.len(), 3);

    match outcome {
        DispatchOutcome::Dispatched {
            correlation_id,
            sent,
            skipped,
            ..
        } => {
            assert_eq!(sent, 3);
            assert_eq!(skipped, 3);
            assert!(correlation_ids.contains(correlation_id.as_str()));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_records_absolute_path_once() {
    let fixture = Fixture::new();
    let source = fixture.source("batch.txt", "a\nb\n");
    let publisher = Arc::new(InMemoryPublisher::new("orders"));

    unpaced(publisher, fixture.ledger())
        .dispatch(&source)
        .await
        .unwrap();

    let expected = std::path::absolute(&source).unwrap();
    assert_eq!(fixture.ledger_lines(), vec![expected.to_string_lossy().to_string()]);
}

#[tokio::test]
async fn test_second_run_sends_nothing() {
    let fixture = Fixture::new();
    let source = fixture.source("batch.txt", "a\nb\n");
    let publisher = Arc::new(InMemoryPublisher::new("orders"));

    unpaced(publisher.clone(), fixture.ledger())
        .dispatch(&source)
        .await
        .unwrap();
    let outcome = unpaced(publisher.clone(), fixture.ledger())
        .dispatch(&source)
        .await
        .unwrap();

    assert!(matches!(outcome, DispatchOutcome::AlreadyProcessed { .. }));
    assert_eq!(publisher.sent_count(), 2);
    assert_eq!(fixture.ledger_lines().len(), 1);
}

#[tokio::test]
async fn test_ledger_match_ignores_case() {
    let fixture = Fixture::new();
    let source = fixture.source("batch.txt", "a\n");
    let absolute = std::path::absolute(&source).unwrap();
    let recorded = absolute.to_string_lossy().to_uppercase();
    std::fs::write(&fixture.ledger_path, format!("{}\n", recorded)).unwrap();
    let publisher = Arc::new(InMemoryPublisher::new("orders"));

    let outcome = unpaced(publisher.clone(), fixture.ledger())
        .dispatch(&source)
        .await
        .unwrap();

    assert!(matches!(outcome, DispatchOutcome::AlreadyProcessed { .. }));
    assert_eq!(publisher.sent_count(), 0);
    assert_eq!(fixture.ledger_lines(), vec![recorded]);
}

#[tokio::test]
async fn test_dot_segments_resolve_to_the_same_ledger_entry() {
    let fixture = Fixture::new();
    let source = fixture.source("batch.txt", "a\nb\n");
    std::fs::create_dir(fixture.dir.path().join("sub")).unwrap();
    let alias = fixture.dir.path().join("sub").join("..").join(".").join("batch.txt");
    let publisher = Arc::new(InMemoryPublisher::new("orders"));

    unpaced(publisher.clone(), fixture.ledger())
        .dispatch(&source)
        .await
        .unwrap();
    let outcome = unpaced(publisher.clone(), fixture.ledger())
        .dispatch(&alias)
        .await
        .unwrap();

    match outcome {
        DispatchOutcome::AlreadyProcessed { path } => assert_eq!(path, source),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(publisher.sent_count(), 2);
    assert_eq!(fixture.ledger_lines().len(), 1);
}

#[tokio::test]
async fn test_file_with_only_blank_lines_is_still_recorded() {
    let fixture = Fixture::new();
    let source = fixture.source("empty.txt", "\n  \n\n");
    let publisher = Arc::new(InMemoryPublisher::new("orders"));

    let outcome = unpaced(publisher.clone(), fixture.ledger())
        .dispatch(&source)
        .await
        .unwrap();

    assert!(matches!(outcome, DispatchOutcome::Dispatched { sent: 0, .. }));
    assert_eq!(publisher.sent_count(), 0);
    assert_eq!(fixture.ledger_lines().len(), 1);
}

#[tokio::test]
async fn test_missing_source_fails_without_ledger_entry() {
    let fixture = Fixture::new();
    let publisher = Arc::new(InMemoryPublisher::new("orders"));

    let result = unpaced(publisher.clone(), fixture.ledger())
        .dispatch(&fixture.dir.path().join("absent.txt"))
        .await;

    assert!(matches!(result, Err(DispatchError::Io { .. })));
    assert_eq!(publisher.sent_count(), 0);
    assert!(fixture.ledger_lines().is_empty());
}

#[tokio::test]
async fn test_failed_send_keeps_ledger_entry() {
    let fixture = Fixture::new();
    let source = fixture.source("batch.txt", "a\nb\nc\nd\n");
    let publisher = Arc::new(InMemoryPublisher::failing_after("orders", 2));

    let result = unpaced(publisher.clone(), fixture.ledger())
        .dispatch(&source)
        .await;

    match result {
        Err(DispatchError::Send { sent, source }) => {
            assert_eq!(sent, 2);
            assert!(matches!(source, QueueError::Send(_)));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(publisher.sent_count(), 2);
    assert_eq!(fixture.ledger_lines().len(), 1);

    // The file is treated as done; the remaining lines are never sent
    let rerun = unpaced(publisher.clone(), fixture.ledger())
        .dispatch(&source)
        .await
        .unwrap();
    assert!(matches!(rerun, DispatchOutcome::AlreadyProcessed { .. }));
    assert_eq!(publisher.sent_count(), 2);
}

#[tokio::test]
async fn test_after_send_ordering_allows_rerun_after_failure() {
    let fixture = Fixture::new();
    let source = fixture.source("batch.txt", "a\nb\nc\n");
    let failing = Arc::new(InMemoryPublisher::failing_after("orders", 1));

    let result = unpaced(failing, fixture.ledger())
        .with_ledger_ordering(LedgerOrdering::AfterSend)
        .dispatch(&source)
        .await;

    assert!(matches!(result, Err(DispatchError::Send { sent: 1, .. })));
    assert!(fixture.ledger_lines().is_empty());

    let healthy = Arc::new(InMemoryPublisher::new("orders"));
    let outcome = unpaced(healthy.clone(), fixture.ledger())
        .with_ledger_ordering(LedgerOrdering::AfterSend)
        .dispatch(&source)
        .await
        .unwrap();

    assert!(matches!(outcome, DispatchOutcome::Dispatched { sent: 3, .. }));
    assert_eq!(healthy.sent_count(), 3);
    assert_eq!(fixture.ledger_lines().len(), 1);
}

/// Publisher that notes whether the ledger already listed the source when
/// the first message went out.
struct LedgerObservingPublisher {
    inner: InMemoryPublisher,
    ledger_path: PathBuf,
    ledger_had_entry: parking_lot::Mutex<Option<bool>>,
}

#[async_trait]
impl TopicPublisher for LedgerObservingPublisher {
    fn identifier(&self) -> &str {
        self.inner.identifier()
    }

    async fn publish(&self, message: OutboundMessage) -> br_queue::Result<String> {
        let recorded = std::fs::read_to_string(&self.ledger_path)
            .map(|contents| !contents.trim().is_empty())
            .unwrap_or(false);
        self.ledger_had_entry.lock().get_or_insert(recorded);
        self.inner.publish(message).await
    }
}

#[tokio::test]
async fn test_ledger_written_before_first_send_by_default() {
    let fixture = Fixture::new();
    let source = fixture.source("batch.txt", "a\nb\n");
    let publisher = Arc::new(LedgerObservingPublisher {
        inner: InMemoryPublisher::new("orders"),
        ledger_path: fixture.ledger_path.clone(),
        ledger_had_entry: parking_lot::Mutex::new(None),
    });

    unpaced(publisher.clone(), fixture.ledger())
        .dispatch(&source)
        .await
        .unwrap();

    assert_eq!(*publisher.ledger_had_entry.lock(), Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_default_pacing_pauses_between_bursts() {
    let fixture = Fixture::new();
    let contents: String = (1..=25).map(|i| format!("message {}\n", i)).collect();
    let source = fixture.source("batch.txt", &contents);
    let publisher = Arc::new(InMemoryPublisher::new("orders"));

    Dispatcher::new(publisher.clone(), fixture.ledger())
        .dispatch(&source)
        .await
        .unwrap();

    let sent_at = publisher.sent_at();
    assert_eq!(sent_at.len(), 25);

    // Message n (1-based) is followed by a pause when gap index n-1 is long
    let paused_after: Vec<usize> = sent_at
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[1] - pair[0] >= Duration::from_secs(10))
        .map(|(i, _)| i + 1)
        .collect();

    assert_eq!(paused_after, vec![11, 21]);
}

/// Ledger whose membership checks all complete before any caller moves on.
struct LockstepLedger {
    inner: FileLedger,
    barrier: Barrier,
}

#[async_trait]
impl ExecutionLedger for LockstepLedger {
    async fn has_processed(&self, path: &Path) -> br_dispatch::Result<bool> {
        let seen = self.inner.has_processed(path).await?;
        self.barrier.wait().await;
        Ok(seen)
    }

    async fn record(&self, path: &Path) -> br_dispatch::Result<()> {
        self.inner.record(path).await
    }
}

#[tokio::test]
async fn test_overlapping_runs_both_send() {
    // The ledger is not a lock: two runs that check before either records
    // both dispatch the file.
    let fixture = Fixture::new();
    let source = fixture.source("batch.txt", "a\nb\n");
    let ledger = Arc::new(LockstepLedger {
        inner: FileLedger::new(&fixture.ledger_path),
        barrier: Barrier::new(2),
    });
    let publisher = Arc::new(InMemoryPublisher::new("orders"));

    let mut first = unpaced(publisher.clone(), ledger.clone());
    let mut second = unpaced(publisher.clone(), ledger.clone());

    let (a, b) = tokio::join!(first.dispatch(&source), second.dispatch(&source));

    assert!(matches!(a.unwrap(), DispatchOutcome::Dispatched { sent: 2, .. }));
    assert!(matches!(b.unwrap(), DispatchOutcome::Dispatched { sent: 2, .. }));
    assert_eq!(publisher.sent_count(), 4);
    assert_eq!(fixture.ledger_lines().len(), 2);
}
