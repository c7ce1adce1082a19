use std::time::Duration;

use pipedag_core::test_support::{disjoint_flow, linear_flow};
use pipedag_core::FinalTaskState;
use pipedag_lock::LocalLockManager;

use super::*;

fn server_with(flow: pipedag_core::Flow) -> RunServer {
    RunServer::new(flow, Arc::new(LocalLockManager::new()), false)
}

#[tokio::test]
async fn init_stage_transition_runs_through_to_ready() {
    let (flow, raw, _staging, _derived) = linear_flow();
    let server = server_with(flow);

    let can_continue = server
        .enter_stage_transition(raw, StageState::Uninitialized, StageState::Initializing, StageState::Ready)
        .await
        .unwrap();
    assert!(can_continue);
    assert_eq!(server.state.get(raw), StageState::Initializing);

    server
        .exit_stage_transition(raw, true, StageState::Initializing, StageState::Ready)
        .unwrap();
    assert_eq!(server.state.get(raw), StageState::Ready);
}

#[tokio::test]
async fn second_entrant_waits_then_sees_ready_without_executing() {
    let (flow, raw, _staging, _derived) = linear_flow();
    let server = Arc::new(server_with(flow));

    let first = server
        .enter_stage_transition(raw, StageState::Uninitialized, StageState::Initializing, StageState::Ready)
        .await
        .unwrap();
    assert!(first);

    let server_bg = Arc::clone(&server);
    let waiter = tokio::spawn(async move {
        server_bg
            .enter_stage_transition(raw, StageState::Uninitialized, StageState::Initializing, StageState::Ready)
            .await
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    server
        .exit_stage_transition(raw, true, StageState::Initializing, StageState::Ready)
        .unwrap();

    let second = waiter.await.unwrap().unwrap();
    assert!(!second, "second caller must not re-run the init body");
}

#[tokio::test]
async fn failed_exit_poisons_the_stage_for_waiters() {
    let (flow, raw, _staging, _derived) = linear_flow();
    let server = Arc::new(server_with(flow));

    server
        .enter_stage_transition(raw, StageState::Uninitialized, StageState::Initializing, StageState::Ready)
        .await
        .unwrap();

    let server_bg = Arc::clone(&server);
    let waiter = tokio::spawn(async move {
        server_bg
            .enter_stage_transition(raw, StageState::Uninitialized, StageState::Initializing, StageState::Ready)
            .await
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    server
        .exit_stage_transition(raw, false, StageState::Initializing, StageState::Ready)
        .unwrap();
    assert_eq!(server.state.get(raw), StageState::Failed);

    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(StageError::Failed { stage }) if stage == raw));
}

#[tokio::test]
async fn did_finish_task_releases_stage_lock_once_ref_count_hits_zero() {
    let (flow, raw, _staging, derived) = linear_flow();
    let server = server_with(flow);
    server.lock_manager.acquire(LockKey::Stage(raw)).await.unwrap();

    assert_eq!(server.ref_count.get(raw), 1);
    server.did_finish_task(TaskId(1), FinalTaskState::Completed).await;
    assert_eq!(server.ref_count.get(raw), 0);
    assert_eq!(server.lock_manager.get_state(&LockKey::Stage(raw)), pipedag_core::LockState::Unlocked);

    // derived has no downstream declaring it as upstream; ref count stays at its initial 0.
    assert_eq!(server.ref_count.get(derived), 0);
}

#[tokio::test]
async fn memo_second_caller_sees_stored_value() {
    let (flow, _a, _b) = disjoint_flow();
    let server = server_with(flow);
    let task = TaskId(0);
    let cache_keys = vec!["key-1".to_string()];

    let first = server.enter_task_memo(task, cache_keys.clone()).await.unwrap();
    assert!(!first.hit);

    let value = MaterializedValue::Raw(serde_json::json!({"v": 1}));
    server.store_task_memo(task, cache_keys.clone(), value.clone()).unwrap();

    let second = server.enter_task_memo(task, cache_keys).await.unwrap();
    assert!(second.hit);
    assert_eq!(second.value, Some(value));
}

#[tokio::test]
async fn memo_failed_entry_propagates_to_waiter() {
    let (flow, _a, _b) = disjoint_flow();
    let server = Arc::new(server_with(flow));
    let task = TaskId(0);
    let cache_keys = vec!["key-1".to_string()];

    server.enter_task_memo(task, cache_keys.clone()).await.unwrap();

    let server_bg = Arc::clone(&server);
    let keys_bg = cache_keys.clone();
    let waiter = tokio::spawn(async move { server_bg.enter_task_memo(task, keys_bg).await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    server.exit_task_memo(task, cache_keys, false);

    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(StageError::Failed { .. })));
}

#[tokio::test]
async fn add_names_rejects_duplicates_all_or_nothing() {
    let (flow, raw, _staging, _derived) = linear_flow();
    let server = server_with(flow);

    let first = server.add_names(raw, vec!["orders".into()], vec![]);
    assert!(first.success);

    let second = server.add_names(raw, vec!["orders".into(), "customers".into()], vec![]);
    assert!(!second.success);
    assert_eq!(second.table_duplicates, vec!["orders".to_string()]);

    // the non-duplicate name from the rejected batch must not have been reserved
    let third = server.add_names(raw, vec!["customers".into()], vec![]);
    assert!(third.success);
}

#[tokio::test]
async fn remove_names_frees_reservation_for_reuse() {
    let (flow, raw, _staging, _derived) = linear_flow();
    let server = server_with(flow);

    server.add_names(raw, vec!["orders".into()], vec![]);
    server.remove_names(raw, vec!["orders".into()], vec![]);
    let reserved_again = server.add_names(raw, vec!["orders".into()], vec![]);
    assert!(reserved_again.success);
}

#[tokio::test]
async fn dispatch_routes_shutdown_to_ok() {
    let (flow, _raw, _staging, _derived) = linear_flow();
    let server = server_with(flow);
    let response = server.handle_request(Request::Shutdown).await;
    assert!(matches!(response, Response::Ok));
}

#[tokio::test]
async fn dispatch_wraps_stage_error_into_wire_error() {
    let (flow, raw, _staging, _derived) = linear_flow();
    let server = server_with(flow);
    server.state.with_lock(|states| states[raw.index()] = StageState::Failed);

    let response = server.handle_request(Request::ExitInitStage { stage: raw, success: true }).await;
    match response {
        Response::Err(err) => assert_eq!(err.kind, "StageError"),
        other => panic!("expected Response::Err, got {other:?}"),
    }
}
