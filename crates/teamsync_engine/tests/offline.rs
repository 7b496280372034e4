//! Offline queue replay through the engine.

use std::sync::Arc;
use std::time::Duration;
use teamsync_engine::{ManualClock, MockRemote, RemoteCall, SubmitOutcome, SyncEngine, SyncSettings};
use teamsync_model::{OperationId, OperationPayload};
use teamsync_store::InMemoryStore;

type Engine = SyncEngine<MockRemote, InMemoryStore>;

fn engine() -> Engine {
    SyncEngine::with_clock(
        SyncSettings::new(),
        MockRemote::new(),
        InMemoryStore::new(),
        Arc::new(ManualClock::new(1_000)),
    )
    .unwrap()
}

fn op(task: &str) -> OperationPayload {
    OperationPayload::SetTaskDone {
        task_id: task.into(),
        done: true,
    }
}

async fn queue_offline(engine: &Engine, tasks: &[&str]) -> Vec<OperationId> {
    engine.set_online(false);
    let mut ids = Vec::new();
    for task in tasks {
        match engine.submit(op(task)).await.unwrap() {
            SubmitOutcome::Queued(id) => ids.push(id),
            SubmitOutcome::Sent(id) => panic!("{id} sent while offline"),
        }
    }
    ids
}

fn submit_calls(engine: &Engine) -> Vec<OperationId> {
    engine
        .remote()
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            RemoteCall::SubmitOperation(id) => Some(id),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn replay_preserves_enqueue_order() {
    let engine = engine();
    let ids = queue_offline(&engine, &["a", "b", "c"]).await;
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    assert!(engine.set_online(true));
    let report = engine.replay_pending().await;

    assert_eq!(report.replayed, ids);
    assert!(report.is_drained());
    assert_eq!(submit_calls(&engine), ids);
}

#[tokio::test]
async fn failure_halts_replay_until_next_reconnect() {
    let engine = engine();
    let ids = queue_offline(&engine, &["a", "b", "c"]).await;
    let (a, b, c) = (ids[0], ids[1], ids[2]);
    engine.remote().fail_submit_call(1);

    engine.set_online(true);
    let report = engine.replay_pending().await;
    assert_eq!(report.replayed, vec![a]);
    assert_eq!(report.halted.as_ref().unwrap().operation_id, b);
    assert_eq!(report.remaining, 2);
    assert_eq!(submit_calls(&engine), vec![a, b]);

    let pending: Vec<_> = engine
        .pending_operations()
        .iter()
        .map(|op| op.operation_id)
        .collect();
    assert_eq!(pending, vec![b, c]);
    assert_eq!(engine.state().pending_operations, 2);

    engine.set_online(false);
    engine.set_online(true);
    let report = engine.replay_pending().await;
    assert_eq!(report.replayed, vec![b, c]);
    assert_eq!(submit_calls(&engine), vec![a, b, b, c]);
    let acknowledged: Vec<_> = engine
        .remote()
        .submitted()
        .iter()
        .map(|op| op.operation_id)
        .collect();
    assert_eq!(acknowledged, vec![a, b, c]);
}

#[tokio::test(start_paused = true)]
async fn concurrent_replays_do_not_interleave() {
    let engine = engine();
    queue_offline(&engine, &["a", "b"]).await;
    engine.remote().set_latency(Duration::from_millis(100));
    engine.set_online(true);

    let (first, second) = tokio::join!(engine.replay_pending(), engine.replay_pending());
    let (ran, skipped) = if first.already_running {
        (second, first)
    } else {
        (first, second)
    };
    assert!(skipped.already_running);
    assert!(skipped.replayed.is_empty());
    assert_eq!(ran.replayed.len(), 2);
    assert_eq!(engine.remote().submitted().len(), 2);
}

#[tokio::test]
async fn restored_queue_replays_after_restart() {
    let first = engine();
    let ids = queue_offline(&first, &["a", "b"]).await;
    let saved = first.pending_operations();
    drop(first);

    let restarted = engine().with_pending_operations(saved);
    assert_eq!(restarted.state().pending_operations, 2);
    let report = restarted.replay_pending().await;
    assert_eq!(report.replayed, ids);

    let next = restarted.submit(op("c")).await.unwrap();
    assert_eq!(next, SubmitOutcome::Sent(OperationId(3)));
}

#[tokio::test]
async fn reconnect_syncs_even_when_replay_halts() {
    let engine = engine();
    queue_offline(&engine, &["a"]).await;
    engine.remote().fail_submit_call(0);
    engine.set_online(true);

    let (report, outcome) = engine.handle_reconnect().await;
    assert!(report.halted.is_some());
    // No members configured, so the sync is a no-op rather than a failure.
    assert_eq!(outcome, teamsync_engine::SessionOutcome::NothingToSync);
    assert_eq!(engine.pending_operations().len(), 1);
}

#[tokio::test]
async fn online_submit_does_not_overtake_queued_writes() {
    let engine = engine();
    let queued = queue_offline(&engine, &["a"]).await;
    assert!(engine.set_online(true));

    let outcome = engine.submit(op("c")).await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Sent(OperationId(2)));

    let acknowledged: Vec<_> = engine
        .remote()
        .submitted()
        .iter()
        .map(|op| op.operation_id)
        .collect();
    assert_eq!(acknowledged, vec![queued[0], OperationId(2)]);
    assert_eq!(submit_calls(&engine), acknowledged);
}

#[tokio::test]
async fn halted_queue_keeps_later_writes_behind_it() {
    let engine = engine();
    let queued = queue_offline(&engine, &["a"]).await;
    engine.remote().fail_submit_call(0);
    engine.set_online(true);
    assert!(engine.replay_pending().await.halted.is_some());

    let outcome = engine.submit(op("b")).await.unwrap();
    let SubmitOutcome::Sent(later) = outcome else {
        panic!("expected replay to drain the queue, got {outcome:?}");
    };
    let acknowledged: Vec<_> = engine
        .remote()
        .submitted()
        .iter()
        .map(|op| op.operation_id)
        .collect();
    assert_eq!(acknowledged, vec![queued[0], later]);
    assert_eq!(submit_calls(&engine), vec![queued[0], queued[0], later]);
}
