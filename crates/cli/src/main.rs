// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal demo binary: builds a toy linear flow, runs it end to end
//! against an in-process run-state server, and prints each stage's and
//! task's outcome. Stands in for the out-of-scope flow DSL and task
//! executor so the run coordination core can be exercised without a
//! real orchestration framework wired up to it.

use std::sync::Arc;

use clap::Parser;
use pipedag_core::{CachePolicy, FinalTaskState, FlowBuilder, MaterializedValue, StageError};
use pipedag_lock::LocalLockManager;
use pipedag_runtime::{commit_stage, init_stage, serve, ConfigContext, MaterializationWrapper, RunClient, RunServer};
use pipedag_store::{InMemoryStore, Store};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Runs a small demo flow in-process and prints its outcome.
#[derive(Parser)]
struct Cli {
    /// Number of linear stages to chain, each with one task that reads
    /// the previous stage's output.
    #[arg(long, default_value_t = 3)]
    stages: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pipedag_cli=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    if cli.stages == 0 {
        return Err("--stages must be at least 1".into());
    }

    let mut builder = FlowBuilder::new();
    let mut stages = Vec::with_capacity(cli.stages as usize);
    let mut tasks = Vec::with_capacity(cli.stages as usize);
    for i in 0..cli.stages {
        let stage = builder.add_stage(format!("stage_{i}"))?;
        let upstream = stages.last().copied().into_iter().collect();
        let task = builder.add_task(stage, upstream, CachePolicy::versioned("1"));
        stages.push(stage);
        tasks.push(task);
    }
    let flow = builder.build()?;

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let lock_manager = Arc::new(LocalLockManager::new());
    let config = ConfigContext::new(Arc::clone(&store), lock_manager);
    config.open().await?;
    store.setup().await?;

    let server = Arc::new(RunServer::new(flow.clone(), Arc::clone(&config.lock_manager), config.ignore_fresh_input));
    let shutdown = CancellationToken::new();
    let addr = serve(&config.network_interface, server, shutdown.clone()).await?;
    info!(%addr, "run-state server listening");

    let client = Arc::new(RunClient::connect(addr).await?);
    let wrapper = MaterializationWrapper::new(Arc::clone(&client), Arc::clone(&store), config.ignore_fresh_input);

    let mut carry = MaterializedValue::Raw(serde_json::json!(0));
    for (&stage, &task_id) in stages.iter().zip(tasks.iter()) {
        let task = flow.task(task_id).cloned().ok_or("task missing from flow")?;
        let stage_name = flow.stage(stage).map(|s| s.name.clone()).unwrap_or_default();

        let ready_store = Arc::clone(&store);
        init_stage(&client, stage, move |should_execute| {
            let store = Arc::clone(&ready_store);
            async move {
                if should_execute {
                    store
                        .ensure_stage_is_ready(stage)
                        .await
                        .map_err(|_| StageError::Failed { stage })?;
                }
                Ok::<_, StageError>(())
            }
        })
        .await?;

        let input = carry.clone();
        let outcome = wrapper
            .call(&task, input, |input| async move {
                let n = match &input {
                    MaterializedValue::Raw(v) => v.as_i64().unwrap_or(0),
                    _ => 0,
                };
                MaterializedValue::Raw(serde_json::json!(n + 1))
            })
            .await;

        let value = match outcome {
            Ok(value) => {
                client.did_finish_task(task.id, FinalTaskState::Completed).await?;
                value
            }
            Err(e) => {
                client.did_finish_task(task.id, FinalTaskState::Failed).await?;
                return Err(format!("task {} in stage {stage_name} failed: {e}", task.id).into());
            }
        };

        commit_stage(&client, stage, |_| async { Ok::<_, StageError>(()) }).await?;

        println!("stage {stage_name} (task {}): {value:?}", task.id);
        carry = value;
    }

    config.close().await?;
    shutdown.cancel();
    Ok(())
}
