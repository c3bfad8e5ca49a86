//! Integration tests for the shared destination reconciliation pass.

mod support;

use busysync_core::{generate_uid, sync_destination, SyncWindow};
use busysync_domain::{
    BusySyncError, OperationKind, ProviderKind, RemoteEvent, SyncResult, SyncStage, SyncState,
};
use chrono::{Duration, Utc};
use support::calendar::{MockDestination, RecordingSink};
use support::{event, today_at};

const USER: &str = "user-1";

fn window() -> SyncWindow {
    SyncWindow::starting_today(Utc::now(), 30)
}

fn destination() -> MockDestination {
    MockDestination::new("dest-1", USER, ProviderKind::Google)
}

#[tokio::test]
async fn test_single_local_event_against_empty_remote() {
    let dest = destination();
    let sink = RecordingSink::default();
    let a = event("A", 10);

    let result = sync_destination(&dest, &[a.clone()], window(), 25, &sink).await.unwrap();

    assert_eq!(result, SyncResult::new(1, 0));
    assert_eq!(*dest.push_calls.lock().unwrap(), vec![vec!["A".to_string()]]);
    assert_eq!(*dest.delete_calls.lock().unwrap(), vec![Vec::<String>::new()]);

    let statuses = sink.statuses.lock().unwrap();
    let stages: Vec<_> = statuses.iter().map(|s| s.stage).collect();
    assert_eq!(
        stages[..3],
        [Some(SyncStage::Fetching), Some(SyncStage::Comparing), Some(SyncStage::Processing)]
    );
    let last = statuses.last().unwrap();
    assert_eq!(last.status, SyncState::Idle);
    assert_eq!(last.local_event_count, 1);
    assert_eq!(last.remote_event_count, 1);
    assert!(last.in_sync);
    assert!(last.last_synced_at.is_some());

    let processing = statuses
        .iter()
        .filter(|s| s.stage == Some(SyncStage::Processing))
        .last()
        .unwrap();
    assert_eq!(processing.progress.unwrap().total, 1);
    assert_eq!(processing.last_operation.unwrap().kind, OperationKind::Add);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let dest = destination();
    let sink = RecordingSink::default();
    let locals = vec![event("A", 9), event("B", 11)];

    sync_destination(&dest, &locals, window(), 25, &sink).await.unwrap();
    let second = sync_destination(&dest, &locals, window(), 25, &sink).await.unwrap();

    assert_eq!(second, SyncResult::default());
    assert_eq!(dest.push_calls.lock().unwrap().len(), 1);
    assert_eq!(dest.delete_calls.lock().unwrap().len(), 1);
    let last = sink.statuses.lock().unwrap().last().cloned().unwrap();
    assert!(last.in_sync);
    assert_eq!(last.remote_event_count, 2);
}

#[tokio::test]
async fn test_removed_local_event_is_deleted_after_additions() {
    let gone = event("gone", 14);
    let stale_uid = generate_uid(USER, &gone).unwrap();
    let dest = destination().with_remote(vec![RemoteEvent {
        uid: stale_uid.clone(),
        start_time: gone.start_time,
        end_time: gone.end_time,
    }]);
    let sink = RecordingSink::default();

    let result = sync_destination(&dest, &[event("new", 8)], window(), 25, &sink).await.unwrap();

    assert_eq!(result, SyncResult::new(1, 1));
    assert_eq!(*dest.delete_calls.lock().unwrap(), vec![vec![stale_uid]]);
    assert_eq!(dest.remote_events().len(), 1);
}

#[tokio::test]
async fn test_foreign_events_are_never_touched() {
    let foreign = RemoteEvent {
        uid: "dentist-123@google.com".to_string(),
        start_time: today_at(12),
        end_time: today_at(13),
    };
    let dest = destination().with_remote(vec![foreign.clone()]);
    let sink = RecordingSink::default();

    sync_destination(&dest, &[], window(), 25, &sink).await.unwrap();

    assert!(dest.delete_calls.lock().unwrap().is_empty());
    assert!(dest.remote_events().contains(&foreign));
}

#[tokio::test]
async fn test_per_event_failure_does_not_abort_batch() {
    let dest = destination().fail_push_of("B");
    let sink = RecordingSink::default();
    let locals = vec![event("A", 9), event("B", 10), event("C", 11)];

    let result = sync_destination(&dest, &locals, window(), 25, &sink).await.unwrap();

    assert_eq!(result, SyncResult::new(2, 0));
    assert_eq!(dest.delete_calls.lock().unwrap().len(), 1);
    let last = sink.statuses.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.local_event_count, 3);
    assert_eq!(last.remote_event_count, 2);
    assert!(!last.in_sync);
}

#[tokio::test]
async fn test_duplicate_local_events_count_once() {
    let dest = destination();
    let sink = RecordingSink::default();
    let locals = vec![event("A", 9), event("B", 9)];

    let first = sync_destination(&dest, &locals, window(), 25, &sink).await.unwrap();
    let second = sync_destination(&dest, &locals, window(), 25, &sink).await.unwrap();

    assert_eq!(first, SyncResult::new(1, 0));
    assert_eq!(second, SyncResult::default());
    let last = sink.statuses.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.local_event_count, 1);
    assert_eq!(last.remote_event_count, 1);
    assert!(last.in_sync);
}

#[tokio::test]
async fn test_missing_push_results_count_as_failures() {
    let dest = destination().truncate_push_results();
    let sink = RecordingSink::default();
    let locals = vec![event("A", 9), event("B", 10)];

    let result = sync_destination(&dest, &locals, window(), 25, &sink).await.unwrap();

    assert_eq!(result, SyncResult::new(1, 0));
    let last = sink.statuses.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.status, SyncState::Idle);
    assert!(!last.in_sync);
}

#[tokio::test]
async fn test_pushes_are_chunked_by_batch_size() {
    let dest = destination();
    let sink = RecordingSink::default();
    let locals: Vec<_> = (0..5).map(|i| event(&format!("E{i}"), 8 + i)).collect();

    let result = sync_destination(&dest, &locals, window(), 2, &sink).await.unwrap();

    assert_eq!(result.added, 5);
    let sizes: Vec<usize> = dest.push_calls.lock().unwrap().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[tokio::test]
async fn test_events_outside_window_are_ignored() {
    let dest = destination();
    let sink = RecordingSink::default();
    let mut past = event("past", 0);
    past.start_time = today_at(-30);
    past.end_time = today_at(-29);
    let mut far = event("far", 0);
    far.start_time = today_at(24 * 40);
    far.end_time = far.start_time + Duration::hours(1);

    let result = sync_destination(&dest, &[past, far], window(), 25, &sink).await.unwrap();

    assert_eq!(result, SyncResult::default());
    assert!(dest.push_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_listing_failure_is_account_fatal() {
    let dest = destination().fail_listing(BusySyncError::Auth("token revoked".to_string()));
    let sink = RecordingSink::default();

    let err = sync_destination(&dest, &[event("A", 9)], window(), 25, &sink).await.unwrap_err();

    assert!(matches!(err, BusySyncError::Auth(_)));
    assert!(dest.push_calls.lock().unwrap().is_empty());
}
