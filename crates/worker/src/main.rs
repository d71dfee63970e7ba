// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orcd: the agent-run lifecycle orchestrator worker process. Wires a
//! real `StreamingBus`/`RunStore`/`TaskBroker`/agent-and-workflow
//! drivers and runs the broker-consume loop until asked to shut down.

mod dispatch;
mod http_driver;
mod settings;

use anyhow::Context;
use orc_bus::RedisBus;
use orc_coordinator::Coordinator;
use orc_broker::RedisBroker;
use orc_store::PostgresStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = settings::load().context("failed to load worker configuration")?;
    tracing::info!(instance_id = %settings.worker.instance_id, "starting orchestrator worker");

    let bus = RedisBus::connect(&settings.worker.bus_url)
        .await
        .context("failed to connect to streaming bus")?;

    let store = PostgresStore::connect(&settings.worker.store_url)
        .await
        .context("failed to connect to state store")?;
    store.migrate().await.context("failed to run state store migrations")?;

    let broker = RedisBroker::connect(
        &settings.worker.broker_url,
        &settings.worker.broker_stream,
        "orc-workers",
        &settings.worker.instance_id,
    )
    .await
    .context("failed to connect to task broker")?;

    let agent_driver = Arc::new(http_driver::HttpAgentDriver::new(settings.agent_endpoint.clone()));
    let workflow_executor = Arc::new(http_driver::HttpWorkflowExecutor::new(
        settings.workflow_endpoint.clone(),
        settings.workflow_deterministic_endpoint.clone(),
    ));

    let coordinator = Arc::new(Coordinator::new(bus, store, settings.worker.clone()));

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received ctrl-c; draining in-flight runs");
            signal_shutdown.cancel();
        }
    });

    dispatch::run(
        coordinator,
        broker,
        agent_driver,
        workflow_executor,
        settings.worker.concurrency_limit,
        shutdown,
    )
    .await;

    tracing::info!("orchestrator worker shut down");
    Ok(())
}
