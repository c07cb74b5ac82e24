//! End-to-end runs of the replication loop against the mock transport.

use std::time::Duration;

use relaygram_core::{MediaKind, MediaRef, MessageId, SourceMessage};
use relaygram_engine::{AbortReason, Replicator, ReplicatorConfig, RunOutcome};
use relaygram_state::{Checkpoint, IdentityMap, JsonStateStore, MemoryStateStore, StateStore};
use relaygram_transport::{MockTransport, SendKind};
use tempfile::TempDir;
use tokio::sync::watch;

const SOURCE: i64 = -1001;
const DEST: i64 = -1002;

fn config() -> ReplicatorConfig {
    ReplicatorConfig {
        send_delay: Duration::ZERO,
        rate_limit_margin: Duration::from_secs(1),
        ..ReplicatorConfig::new(SOURCE, DEST)
    }
}

fn photo(id: MessageId, group: &str) -> SourceMessage {
    SourceMessage::media(id, MediaRef::new(MediaKind::Photo, format!("photo-{id}"))).in_group(group)
}

/// 1 text; 2, 3, 4 an album; 5 a reply to 1.
fn channel() -> Vec<SourceMessage> {
    vec![
        SourceMessage::text(1, "hello"),
        photo(2, "G1").with_text("album caption"),
        photo(3, "G1"),
        photo(4, "G1"),
        SourceMessage::text(5, "replying").replying_to(1),
    ]
}

/// Every id at or below a persisted checkpoint must be mapped or recorded as failed.
fn assert_history_consistent(store: &MemoryStateStore, failed: &[MessageId]) {
    for snapshot in store.history() {
        for id in 1..=snapshot.checkpoint.last_message_id {
            assert!(
                snapshot.identity_map.contains(id) || failed.contains(&id),
                "checkpoint {} persisted while {} was neither mapped nor failed",
                snapshot.checkpoint.last_message_id,
                id
            );
        }
    }
}

#[tokio::test]
async fn test_replicates_text_album_and_reply() {
    let transport = MockTransport::with_backlog(channel());
    let store = MemoryStateStore::new();

    let report = Replicator::new(transport.clone(), store.clone(), config())
        .run()
        .await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.units_sent, 3);
    assert_eq!(report.messages_sent, 5);
    assert_eq!(report.checkpoint_after, 5);

    let sent = transport.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].kind, SendKind::Single);
    assert_eq!(sent[0].source_ids, vec![1]);
    assert_eq!(sent[1].kind, SendKind::Group);
    assert_eq!(sent[1].source_ids, vec![2, 3, 4]);
    assert_eq!(sent[2].source_ids, vec![5]);
    assert_eq!(sent[2].reply_to, transport.dest_id_of(1));
    assert!(sent.iter().all(|s| s.chat == DEST));

    assert_eq!(store.checkpoint(), Some(Checkpoint::new(5)));
    let map = store.identity_map();
    assert_eq!(map.len(), 5);
    for id in 1..=5 {
        assert_eq!(map.get(id), transport.dest_id_of(id));
    }
    assert_history_consistent(&store, &[]);
}

#[tokio::test]
async fn test_second_run_sends_nothing() {
    let transport = MockTransport::with_backlog(channel());
    let store = MemoryStateStore::new();

    Replicator::new(transport.clone(), store.clone(), config())
        .run()
        .await;
    transport.clear();

    let report = Replicator::new(transport.clone(), store.clone(), config())
        .run()
        .await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.units_total, 0);
    assert_eq!(transport.total_sends(), 0);
    assert_eq!(transport.fetches(), vec![0, 5]);
    assert_eq!(store.checkpoint(), Some(Checkpoint::new(5)));
}

#[tokio::test]
async fn test_incremental_run_picks_up_new_posts() {
    let transport = MockTransport::with_backlog(channel());
    let store = MemoryStateStore::new();

    Replicator::new(transport.clone(), store.clone(), config())
        .run()
        .await;
    transport.publish(vec![SourceMessage::text(6, "more").replying_to(5)]);

    let report = Replicator::new(transport.clone(), store.clone(), config())
        .run()
        .await;

    assert_eq!(report.checkpoint_before, 5);
    assert_eq!(report.checkpoint_after, 6);
    let last = transport.sent().pop().unwrap();
    assert_eq!(last.source_ids, vec![6]);
    assert_eq!(last.reply_to, transport.dest_id_of(5));
}

#[tokio::test]
async fn test_reply_to_unreplicated_message_is_sent_plain() {
    let transport = MockTransport::with_backlog(vec![
        SourceMessage::text(11, "reply to something old").replying_to(3),
    ]);
    let store = MemoryStateStore::with_state(Checkpoint::new(10), IdentityMap::new());

    let report = Replicator::new(transport.clone(), store.clone(), config())
        .run()
        .await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].reply_to, None);
    assert_eq!(store.checkpoint(), Some(Checkpoint::new(11)));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_waits_and_preserves_state() {
    let transport = MockTransport::with_backlog(channel());
    transport.rate_limit_once(3, Duration::from_secs(30));
    let store = MemoryStateStore::new();

    let start = tokio::time::Instant::now();
    let report = Replicator::new(transport.clone(), store.clone(), config())
        .run()
        .await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.rate_limit_waits, 1);
    assert!(start.elapsed() >= Duration::from_secs(31));

    // The album was attempted twice but delivered once.
    let attempts = transport.attempts();
    assert_eq!(
        attempts.iter().filter(|a| a.contains(&3)).count(),
        2
    );
    assert_eq!(transport.total_sends(), 3);

    // State was written before the wait, at the pre-album checkpoint.
    let history = store.history();
    assert_eq!(history[0].checkpoint, Checkpoint::new(1));
    assert_eq!(history[1].checkpoint, Checkpoint::new(1));
    assert_eq!(history[1].identity_map.len(), 1);
    assert_eq!(store.checkpoint(), Some(Checkpoint::new(5)));
    assert_history_consistent(&store, &[]);
}

#[tokio::test]
async fn test_failed_unit_is_recorded_and_skipped() {
    let transport = MockTransport::with_backlog(channel());
    transport.fail_permanently(3, "MEDIA_INVALID");
    let store = MemoryStateStore::new();

    let report = Replicator::new(transport.clone(), store.clone(), config())
        .run()
        .await;

    assert_eq!(report.outcome, RunOutcome::CompletedWithErrors);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.units_failed, 1);
    assert_eq!(report.units_sent, 2);
    assert_eq!(report.checkpoint_after, 5);

    let failures = store.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].source_ids, vec![2, 3, 4]);
    assert_eq!(failures[0].group_id.as_deref(), Some("G1"));
    assert!(failures[0].error.contains("MEDIA_INVALID"));

    let map = store.identity_map();
    assert!(!map.contains(2) && !map.contains(3) && !map.contains(4));
    assert_eq!(store.checkpoint(), Some(Checkpoint::new(5)));
    assert_history_consistent(&store, &[2, 3, 4]);

    // The reply after the failed album still resolves.
    assert_eq!(transport.sent()[1].reply_to, transport.dest_id_of(1));
}

#[tokio::test]
async fn test_storage_failure_aborts() {
    let transport = MockTransport::with_backlog(channel());
    let store = MemoryStateStore::new();
    store.fail_writes("disk full");

    let report = Replicator::new(transport.clone(), store.clone(), config())
        .run()
        .await;

    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert_eq!(report.abort_reason, Some(AbortReason::Storage));
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.checkpoint_after, 0);
    // The first unit went out; nothing after the failed persist did.
    assert_eq!(transport.total_sends(), 1);
    assert_eq!(store.checkpoint(), None);
}

#[tokio::test]
async fn test_unreadable_state_aborts_before_fetching() {
    let transport = MockTransport::with_backlog(channel());
    let store = MemoryStateStore::new();
    store.fail_reads("permission denied");

    let report = Replicator::new(transport.clone(), store.clone(), config())
        .run()
        .await;

    assert_eq!(report.abort_reason, Some(AbortReason::Storage));
    assert!(transport.fetches().is_empty());
}

#[tokio::test]
async fn test_fetch_failure_aborts_without_sending() {
    let transport = MockTransport::with_backlog(channel());
    transport.fail_fetch("connection reset");
    let store = MemoryStateStore::with_state(Checkpoint::new(0), IdentityMap::new());

    let report = Replicator::new(transport.clone(), store.clone(), config())
        .run()
        .await;

    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert_eq!(report.abort_reason, Some(AbortReason::Transport));
    assert!(report.error.unwrap().contains("connection reset"));
    assert_eq!(transport.total_sends(), 0);
    assert_eq!(store.checkpoint(), Some(Checkpoint::new(0)));
}

#[tokio::test]
async fn test_checkpoint_never_moves_backwards() {
    let transport = MockTransport::with_backlog(channel());
    transport.fail_permanently(1, "CHAT_WRITE_FORBIDDEN");
    let store = MemoryStateStore::new();

    Replicator::new(transport.clone(), store.clone(), config())
        .run()
        .await;
    transport.publish(vec![SourceMessage::text(7, "later")]);
    Replicator::new(transport.clone(), store.clone(), config())
        .run()
        .await;

    let checkpoints: Vec<_> = store
        .history()
        .iter()
        .map(|s| s.checkpoint.last_message_id)
        .collect();
    assert!(checkpoints.windows(2).all(|w| w[0] <= w[1]), "{checkpoints:?}");
    assert_eq!(checkpoints.last(), Some(&7));
}

#[tokio::test]
async fn test_already_mapped_messages_are_not_resent() {
    // Crash between writing the map and the checkpoint: 1 is mapped, checkpoint is 0.
    let mut map = IdentityMap::new();
    map.put(1, 900).unwrap();
    let transport = MockTransport::with_backlog(channel());
    let store = MemoryStateStore::with_state(Checkpoint::new(0), map);

    let report = Replicator::new(transport.clone(), store.clone(), config())
        .run()
        .await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.skipped_mapped, 1);
    assert_eq!(report.backlog_len, 5);

    let sent = transport.sent();
    assert!(sent.iter().all(|s| !s.source_ids.contains(&1)));
    // The reply still threads to the earlier destination message.
    assert_eq!(sent.last().unwrap().reply_to, Some(900));
    assert_eq!(store.identity_map().get(1), Some(900));
    assert_eq!(store.checkpoint(), Some(Checkpoint::new(5)));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_backoff_then_resume() {
    let transport = MockTransport::with_backlog(channel());
    transport.rate_limit_once(2, Duration::from_secs(3600));
    let store = MemoryStateStore::new();

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        let _ = tx.send(true);
    });

    let start = tokio::time::Instant::now();
    let report = Replicator::new(transport.clone(), store.clone(), config())
        .with_shutdown(rx)
        .run()
        .await;

    assert!(start.elapsed() < Duration::from_secs(3600));
    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert_eq!(report.abort_reason, Some(AbortReason::Interrupted));
    assert_eq!(report.checkpoint_after, 1);
    assert_eq!(store.checkpoint(), Some(Checkpoint::new(1)));
    assert_eq!(transport.total_sends(), 1);

    let report = Replicator::new(transport.clone(), store.clone(), config())
        .run()
        .await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.checkpoint_before, 1);
    let sent = transport.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent.iter().filter(|s| s.source_ids.contains(&1)).count(), 1);
    assert_eq!(store.checkpoint(), Some(Checkpoint::new(5)));
}

#[tokio::test]
async fn test_shutdown_before_first_unit() {
    let transport = MockTransport::with_backlog(channel());
    let store = MemoryStateStore::new();
    let (_tx, rx) = watch::channel(true);

    let report = Replicator::new(transport.clone(), store.clone(), config())
        .with_shutdown(rx)
        .run()
        .await;

    assert_eq!(report.abort_reason, Some(AbortReason::Interrupted));
    assert_eq!(transport.total_sends(), 0);
    assert_eq!(store.checkpoint(), Some(Checkpoint::new(0)));
}

#[tokio::test]
async fn test_checkpoint_cadence() {
    let transport = MockTransport::with_backlog(channel());
    let store = MemoryStateStore::new();
    let config = ReplicatorConfig {
        checkpoint_every: 2,
        ..config()
    };

    Replicator::new(transport.clone(), store.clone(), config)
        .run()
        .await;

    let checkpoints: Vec<_> = store
        .history()
        .iter()
        .map(|s| s.checkpoint.last_message_id)
        .collect();
    assert_eq!(checkpoints, vec![4, 5]);
}

#[tokio::test]
async fn test_album_members_sent_in_id_order() {
    let transport = MockTransport::with_backlog(vec![photo(5, "A"), photo(7, "A"), photo(6, "A")]);
    let store = MemoryStateStore::new();

    Replicator::new(transport.clone(), store.clone(), config())
        .run()
        .await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].source_ids, vec![5, 6, 7]);
    assert_eq!(store.checkpoint(), Some(Checkpoint::new(7)));
}

#[tokio::test]
async fn test_albums_closed_together_go_out_in_source_order() {
    // "10" sorts before "9"; the reply in album "10" targets album "9".
    let transport = MockTransport::with_backlog(vec![
        photo(2, "9"),
        photo(3, "10").replying_to(2),
        SourceMessage::text(4, "after"),
    ]);
    let store = MemoryStateStore::new();

    let report = Replicator::new(transport.clone(), store.clone(), config())
        .run()
        .await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    let sent = transport.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].source_ids, vec![2]);
    assert_eq!(sent[1].source_ids, vec![3]);
    assert!(sent[1].reply_to.is_some());
    assert_eq!(sent[1].reply_to, transport.dest_id_of(2));
    assert_eq!(sent[2].source_ids, vec![4]);
    assert_eq!(store.checkpoint(), Some(Checkpoint::new(4)));
    assert_history_consistent(&store, &[]);
}

#[tokio::test]
async fn test_interleaved_albums_hold_checkpoint() {
    let transport = MockTransport::with_backlog(vec![photo(1, "G"), photo(2, "H"), photo(3, "G")]);
    let store = MemoryStateStore::new();

    let report = Replicator::new(transport.clone(), store.clone(), config())
        .run()
        .await;

    let sent = transport.sent();
    assert_eq!(sent[0].source_ids, vec![1, 3]);
    assert_eq!(sent[1].source_ids, vec![2]);

    // After album G, message 2 is still outstanding.
    let history = store.history();
    assert_eq!(history[0].checkpoint, Checkpoint::new(1));
    assert_eq!(report.checkpoint_after, 3);
    assert_history_consistent(&store, &[]);
}

#[tokio::test(start_paused = true)]
async fn test_send_delay_between_units() {
    let transport = MockTransport::with_backlog(channel());
    let store = MemoryStateStore::new();
    let config = ReplicatorConfig {
        send_delay: Duration::from_secs(2),
        ..config()
    };

    let start = tokio::time::Instant::now();
    Replicator::new(transport.clone(), store.clone(), config)
        .run()
        .await;

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(4));
    assert!(elapsed < Duration::from_secs(6));
}

#[tokio::test]
async fn test_json_store_survives_restart() {
    let dir = TempDir::new().unwrap();
    let transport = MockTransport::with_backlog(channel());

    let store = JsonStateStore::open(dir.path()).unwrap();
    let report = Replicator::new(transport.clone(), store, config()).run().await;
    assert_eq!(report.outcome, RunOutcome::Completed);

    let reopened = JsonStateStore::open(dir.path()).unwrap();
    assert_eq!(reopened.load_checkpoint().unwrap(), Checkpoint::new(5));
    assert_eq!(reopened.load_identity_map().unwrap().len(), 5);

    transport.clear();
    let report = Replicator::new(transport.clone(), reopened, config()).run().await;
    assert_eq!(report.units_sent, 0);
    assert_eq!(transport.total_sends(), 0);
}
