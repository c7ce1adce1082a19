// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios against a live `RunServer` + `RunClient` +
//! `MaterializationWrapper`, one process standing in for however many
//! workers would talk to the server in a real run.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use pipedag_core::{
    CachePolicy, FinalTaskState, Flow, FlowBuilder, LockState, MaterializedValue, TableRef, TaskId,
};
use pipedag_lock::{LocalLockManager, LockKey, LockManager};
use pipedag_runtime::{serve, MaterializationWrapper, RunClient, RunServer};
use pipedag_store::{InMemoryStore, Store};
use tokio_util::sync::CancellationToken;

async fn spawn(flow: Flow, ignore_fresh_input: bool) -> Arc<RunClient> {
    spawn_with_lock_manager(flow, ignore_fresh_input, Arc::new(LocalLockManager::new())).await
}

async fn spawn_with_lock_manager(
    flow: Flow,
    ignore_fresh_input: bool,
    lock_manager: Arc<dyn LockManager>,
) -> Arc<RunClient> {
    let server = Arc::new(RunServer::new(flow, lock_manager, ignore_fresh_input));
    let shutdown = CancellationToken::new();
    let addr = serve("127.0.0.1:0", server, shutdown).await.unwrap();
    Arc::new(RunClient::connect(addr).await.unwrap())
}

/// S1: a literal output memoized across runs against the same store, plus
/// invariant 7 (three `ignore_fresh_input` runs with a changed cache-fn
/// output trigger no re-run, and the un-flagged run afterwards does).
#[tokio::test]
async fn s1_literal_memo_across_runs_and_ignore_fresh_input() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    store.open().await.unwrap();

    let cache_value = Arc::new(AtomicI64::new(0));
    let out_calls = Arc::new(AtomicUsize::new(0));
    let child_calls = Arc::new(AtomicUsize::new(0));

    let build_flow = || {
        let mut builder = FlowBuilder::new();
        let stage = builder.add_stage("stage_1").unwrap();
        let cv = Arc::clone(&cache_value);
        let policy = CachePolicy::versioned("1").with_cache_fn(Arc::new(move || serde_json::json!(cv.load(Ordering::SeqCst))));
        let out = builder.add_task(stage, vec![], policy);
        let child = builder.add_task(stage, vec![], CachePolicy::versioned("1"));
        (builder.build().unwrap(), out, child)
    };

    async fn run(
        store: Arc<dyn Store>,
        flow: Flow,
        ignore_fresh_input: bool,
        out_id: TaskId,
        child_id: TaskId,
        out_calls: Arc<AtomicUsize>,
        child_calls: Arc<AtomicUsize>,
        new_value: i64,
    ) -> (MaterializedValue, MaterializedValue) {
        let client = spawn(flow.clone(), ignore_fresh_input).await;
        let wrapper = MaterializationWrapper::new(Arc::clone(&client), Arc::clone(&store), ignore_fresh_input);
        let out_task = flow.task(out_id).unwrap().clone();
        let child_task = flow.task(child_id).unwrap().clone();

        let oc = Arc::clone(&out_calls);
        let out_value = wrapper
            .call(&out_task, MaterializedValue::Raw(serde_json::json!(null)), move |_| {
                let oc = Arc::clone(&oc);
                async move {
                    oc.fetch_add(1, Ordering::SeqCst);
                    MaterializedValue::Raw(serde_json::json!(new_value))
                }
            })
            .await
            .unwrap();

        let cc = Arc::clone(&child_calls);
        let child_value = wrapper
            .call(&child_task, out_value.clone(), move |input| {
                let cc = Arc::clone(&cc);
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    input
                }
            })
            .await
            .unwrap();

        client.did_finish_task(out_id, FinalTaskState::Completed).await.unwrap();
        client.did_finish_task(child_id, FinalTaskState::Completed).await.unwrap();
        (out_value, child_value)
    }

    // Run once: both tasks execute, values are 0.
    let (flow, out_id, child_id) = build_flow();
    let (out_value, child_value) = run(
        Arc::clone(&store),
        flow,
        false,
        out_id,
        child_id,
        Arc::clone(&out_calls),
        Arc::clone(&child_calls),
        0,
    )
    .await;
    assert_eq!(out_value, MaterializedValue::Raw(serde_json::json!(0)));
    assert_eq!(child_value, MaterializedValue::Raw(serde_json::json!(0)));
    assert_eq!(out_calls.load(Ordering::SeqCst), 1);
    assert_eq!(child_calls.load(Ordering::SeqCst), 1);

    // Run again (fresh server, same store, same cache_value): cache hit,
    // neither spy fires even though the compute closures would return 999.
    let (flow, out_id, child_id) = build_flow();
    let (out_value, child_value) = run(
        Arc::clone(&store),
        flow,
        false,
        out_id,
        child_id,
        Arc::clone(&out_calls),
        Arc::clone(&child_calls),
        999,
    )
    .await;
    assert_eq!(out_value, MaterializedValue::Raw(serde_json::json!(0)));
    assert_eq!(child_value, MaterializedValue::Raw(serde_json::json!(0)));
    assert_eq!(out_calls.load(Ordering::SeqCst), 1, "cache hit must not recompute");
    assert_eq!(child_calls.load(Ordering::SeqCst), 1, "cache hit must not recompute");

    // The cache function's fresh input now differs, but ignore_fresh_input
    // suppresses its contribution to the key: three runs, still no re-run.
    cache_value.store(1, Ordering::SeqCst);
    for _ in 0..3 {
        let (flow, out_id, child_id) = build_flow();
        let (out_value, child_value) = run(
            Arc::clone(&store),
            flow,
            true,
            out_id,
            child_id,
            Arc::clone(&out_calls),
            Arc::clone(&child_calls),
            999,
        )
        .await;
        assert_eq!(out_value, MaterializedValue::Raw(serde_json::json!(0)));
        assert_eq!(child_value, MaterializedValue::Raw(serde_json::json!(0)));
    }
    assert_eq!(out_calls.load(Ordering::SeqCst), 1, "ignore_fresh_input must suppress the re-run");
    assert_eq!(child_calls.load(Ordering::SeqCst), 1, "ignore_fresh_input must suppress the re-run");

    // Finally, run without the flag: the cache function's output (now 1)
    // feeds into the key again, so both tasks run once more.
    let (flow, out_id, child_id) = build_flow();
    let (out_value, child_value) = run(
        Arc::clone(&store),
        flow,
        false,
        out_id,
        child_id,
        Arc::clone(&out_calls),
        Arc::clone(&child_calls),
        1,
    )
    .await;
    assert_eq!(out_value, MaterializedValue::Raw(serde_json::json!(1)));
    assert_eq!(child_value, MaterializedValue::Raw(serde_json::json!(1)));
    assert_eq!(out_calls.load(Ordering::SeqCst), 2);
    assert_eq!(child_calls.load(Ordering::SeqCst), 2);
}

/// S2: a table artifact handle survives a cache hit across runs instead of
/// being reassigned a fresh name.
#[tokio::test]
async fn s2_table_cache_reuses_artifact_handle_across_runs() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    store.open().await.unwrap();

    let build_flow = || {
        let mut builder = FlowBuilder::new();
        let stage = builder.add_stage("stage").unwrap();
        let out = builder.add_task(stage, vec![], CachePolicy::versioned("1"));
        (builder.build().unwrap(), out)
    };

    let out_calls = Arc::new(AtomicUsize::new(0));

    let (flow, out_id) = build_flow();
    let client = spawn(flow.clone(), false).await;
    let wrapper = MaterializationWrapper::new(Arc::clone(&client), Arc::clone(&store), false);
    let out_task = flow.task(out_id).unwrap().clone();

    let oc = Arc::clone(&out_calls);
    let first = wrapper
        .call(&out_task, MaterializedValue::Raw(serde_json::json!(null)), move |_| {
            let oc = Arc::clone(&oc);
            async move {
                oc.fetch_add(1, Ordering::SeqCst);
                MaterializedValue::Table(TableRef::new("pending", pipedag_core::StageId(0)))
            }
        })
        .await
        .unwrap();

    let (flow2, out_id2) = build_flow();
    let client2 = spawn(flow2.clone(), false).await;
    let wrapper2 = MaterializationWrapper::new(Arc::clone(&client2), Arc::clone(&store), false);
    let out_task2 = flow2.task(out_id2).unwrap().clone();

    let oc2 = Arc::clone(&out_calls);
    let second = wrapper2
        .call(&out_task2, MaterializedValue::Raw(serde_json::json!(null)), move |_| {
            let oc2 = Arc::clone(&oc2);
            async move {
                oc2.fetch_add(1, Ordering::SeqCst);
                MaterializedValue::Table(TableRef::new("pending", pipedag_core::StageId(0)))
            }
        })
        .await
        .unwrap();

    assert_eq!(out_calls.load(Ordering::SeqCst), 1, "second run must hit the cache");
    assert_eq!(first, second, "cache hit must return the original artifact handle");
}

/// S3: a lazy task's body always runs, but a normal downstream task only
/// recomputes when the lazy task's output actually changes.
#[tokio::test]
async fn s3_lazy_task_always_runs_downstream_only_on_change() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    store.open().await.unwrap();
    let out_calls = Arc::new(AtomicUsize::new(0));
    let child_calls = Arc::new(AtomicUsize::new(0));

    async fn run_once(
        store: Arc<dyn Store>,
        lazy_value: i64,
        out_calls: Arc<AtomicUsize>,
        child_calls: Arc<AtomicUsize>,
    ) {
        let mut builder = FlowBuilder::new();
        let stage = builder.add_stage("stage").unwrap();
        let out_id = builder.add_task(stage, vec![], CachePolicy::lazy());
        let child_id = builder.add_task(stage, vec![], CachePolicy::versioned("1"));
        let flow = builder.build().unwrap();

        let client = spawn(flow.clone(), false).await;
        let wrapper = MaterializationWrapper::new(Arc::clone(&client), Arc::clone(&store), false);

        let out_task = flow.task(out_id).unwrap().clone();
        let child_task = flow.task(child_id).unwrap().clone();

        let oc = Arc::clone(&out_calls);
        let out_value = wrapper
            .call(&out_task, MaterializedValue::Raw(serde_json::json!(null)), move |_| {
                let oc = Arc::clone(&oc);
                async move {
                    oc.fetch_add(1, Ordering::SeqCst);
                    MaterializedValue::Raw(serde_json::json!(lazy_value))
                }
            })
            .await
            .unwrap();

        let cc = Arc::clone(&child_calls);
        wrapper
            .call(&child_task, out_value, move |input| {
                let cc = Arc::clone(&cc);
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    input
                }
            })
            .await
            .unwrap();
    }

    run_once(Arc::clone(&store), 1, Arc::clone(&out_calls), Arc::clone(&child_calls)).await;
    assert_eq!(out_calls.load(Ordering::SeqCst), 1);
    assert_eq!(child_calls.load(Ordering::SeqCst), 1);

    // Same lazy output: the lazy task still runs (it never consults the
    // cache), but the child's bound args are unchanged so it hits cache.
    run_once(Arc::clone(&store), 1, Arc::clone(&out_calls), Arc::clone(&child_calls)).await;
    assert_eq!(out_calls.load(Ordering::SeqCst), 2);
    assert_eq!(child_calls.load(Ordering::SeqCst), 1);

    // Changed lazy output: the child's bound args differ, so it recomputes.
    run_once(Arc::clone(&store), 2, Arc::clone(&out_calls), Arc::clone(&child_calls)).await;
    assert_eq!(out_calls.load(Ordering::SeqCst), 3);
    assert_eq!(child_calls.load(Ordering::SeqCst), 2);
}

/// S4: `add_names` is all-or-nothing — a batch containing any duplicate
/// reserves nothing, and the original reservation still stands afterwards.
#[tokio::test]
async fn s4_duplicate_name_registration_is_all_or_nothing() {
    let mut builder = FlowBuilder::new();
    let stage = builder.add_stage("stage").unwrap();
    builder.add_task(stage, vec![], CachePolicy::default());
    let flow = builder.build().unwrap();

    let client = spawn(flow, false).await;

    let first = client.add_names(stage, vec!["t".to_string()], vec![]).await.unwrap();
    assert!(first.success);

    let second = client
        .add_names(stage, vec!["t".to_string(), "u".to_string()], vec![])
        .await
        .unwrap();
    assert!(!second.success);
    assert_eq!(second.table_duplicates, vec!["t".to_string()]);

    // "u" was part of the rejected batch and must not have been reserved.
    let third = client.add_names(stage, vec!["u".to_string()], vec![]).await.unwrap();
    assert!(third.success);
}

/// S5: a failed stage transition poisons the stage for every other caller
/// already waiting on it.
#[tokio::test]
async fn s5_failed_transition_poisons_stage_for_other_callers() {
    let mut builder = FlowBuilder::new();
    let stage = builder.add_stage("stage").unwrap();
    builder.add_task(stage, vec![], CachePolicy::default());
    let flow = builder.build().unwrap();

    let client = spawn(flow, false).await;

    let owner_should_execute = client.enter_init_stage(stage).await.unwrap();
    assert!(owner_should_execute);

    let waiter_client = Arc::clone(&client);
    let waiter = tokio::spawn(async move { waiter_client.enter_init_stage(stage).await });

    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    client.exit_init_stage(stage, false).await.unwrap();

    let waiter_result = waiter.await.unwrap();
    assert!(waiter_result.is_err(), "a waiter on a FAILED stage must see an error");

    let third = client.enter_init_stage(stage).await;
    assert!(third.is_err(), "a later caller must also observe the FAILED stage");
}

/// S6 / invariant 1: a stage's lock is released exactly once, the moment
/// its reference count reaches zero, and the count never dips negative.
#[tokio::test]
async fn s6_eager_lock_release_fires_exactly_once_at_zero_ref_count() {
    let mut builder = FlowBuilder::new();
    let a = builder.add_stage("a").unwrap();
    let b = builder.add_stage("b").unwrap();
    let t1 = builder.add_task(b, vec![a], CachePolicy::default());
    let t2 = builder.add_task(b, vec![a], CachePolicy::default());
    let flow = builder.build().unwrap();
    assert_eq!(flow.initial_ref_count(a), 2);

    let lock_manager: Arc<dyn LockManager> = Arc::new(LocalLockManager::new());
    let releases = Arc::new(AtomicUsize::new(0));
    let releases_clone = Arc::clone(&releases);
    lock_manager.add_listener(Box::new(move |key, old, new| {
        if key == LockKey::Stage(a) && old == LockState::Locked && new == LockState::Unlocked {
            releases_clone.fetch_add(1, Ordering::SeqCst);
        }
    }));
    lock_manager.acquire(LockKey::Stage(a)).await.unwrap();

    let client = spawn_with_lock_manager(flow, false, Arc::clone(&lock_manager)).await;

    assert_eq!(client.get_stage_ref_count(a).await.unwrap(), 2);

    client.did_finish_task(t1, FinalTaskState::Completed).await.unwrap();
    assert_eq!(client.get_stage_ref_count(a).await.unwrap(), 1);
    assert_eq!(releases.load(Ordering::SeqCst), 0, "lock must not release before the ref count hits zero");

    client.did_finish_task(t2, FinalTaskState::Completed).await.unwrap();
    assert_eq!(client.get_stage_ref_count(a).await.unwrap(), 0);
    assert_eq!(releases.load(Ordering::SeqCst), 1, "lock must release exactly once");
}
