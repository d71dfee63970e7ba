//! The broker-consume loop: pulls deliveries off the [`TaskBroker`],
//! drives each through [`Coordinator::run`] under a concurrency limit,
//! and acks/nacks the delivery based on the outcome.

use orc_broker::{Delivery, TaskBroker};
use orc_bus::StreamingBus;
use orc_coordinator::Coordinator;
use orc_core::RunStartJob;
use orc_producer::{AgentDriver, EventProducer, ProducerError, WorkflowExecutor};
use orc_store::RunStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const POLL_WAIT: Duration = Duration::from_secs(5);

/// Run the consume loop until `shutdown` is cancelled. No new deliveries
/// are pulled once cancelled, but every delivery already handed to a
/// worker task is awaited before this function returns.
#[allow(clippy::too_many_arguments)]
pub async fn run<B, St, Br, A, W, P>(
    coordinator: Arc<Coordinator<B, St>>,
    broker: Br,
    agent_driver: Arc<A>,
    workflow_executor: Arc<W>,
    concurrency_limit: usize,
    shutdown: CancellationToken,
) where
    B: StreamingBus,
    St: RunStore,
    Br: TaskBroker,
    A: AgentDriver<Producer = P>,
    W: WorkflowExecutor<Producer = P>,
    P: EventProducer,
{
    let semaphore = Arc::new(Semaphore::new(concurrency_limit.max(1)));
    let mut in_flight = JoinSet::new();

    loop {
        if shutdown.is_cancelled() {
            tracing::info!("shutdown requested; no longer pulling new deliveries");
            break;
        }

        let delivery = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = broker.next_job(POLL_WAIT) => result,
        };

        let delivery = match delivery {
            Ok(Some(delivery)) => delivery,
            Ok(None) => continue,
            Err(err) => {
                tracing::error!(error = %err, "failed to poll task broker");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let coordinator = coordinator.clone();
        let broker = broker.clone();
        let agent_driver = agent_driver.clone();
        let workflow_executor = workflow_executor.clone();

        in_flight.spawn(async move {
            let _permit = permit;
            handle_delivery(&coordinator, &broker, &agent_driver, &workflow_executor, delivery).await;
        });
    }

    tracing::info!(remaining = in_flight.len(), "draining in-flight deliveries");
    while let Some(result) = in_flight.join_next().await {
        if let Err(err) = result {
            tracing::error!(error = %err, "delivery task panicked");
        }
    }
}

async fn handle_delivery<B, St, Br, A, W, P>(
    coordinator: &Coordinator<B, St>,
    broker: &Br,
    agent_driver: &Arc<A>,
    workflow_executor: &Arc<W>,
    delivery: Delivery,
) where
    B: StreamingBus,
    St: RunStore,
    Br: TaskBroker,
    A: AgentDriver<Producer = P>,
    W: WorkflowExecutor<Producer = P>,
    P: EventProducer,
{
    let run_id = delivery.job.run_id();
    let agent_driver = agent_driver.clone();
    let workflow_executor = workflow_executor.clone();
    let job_for_build = delivery.job.clone();

    let result = coordinator
        .run(delivery.job.clone(), move |_run_id| async move {
            match job_for_build {
                RunStartJob::Agent(agent_job) => agent_driver.drive(&agent_job).await,
                RunStartJob::Workflow(workflow_job) => workflow_executor.execute(&workflow_job).await,
            }
        })
        .await;

    match result {
        Ok(outcome) => {
            tracing::info!(run_id = run_id.as_str(), outcome = ?outcome, "run finished");
            if let Err(err) = broker.ack(&delivery).await {
                tracing::error!(run_id = run_id.as_str(), error = %err, "failed to ack delivery");
            }
        }
        Err(err) => {
            tracing::error!(run_id = run_id.as_str(), error = %err, "coordinator run failed before completion; nacking for redelivery");
            if let Err(err) = broker.nack(&delivery).await {
                tracing::error!(run_id = run_id.as_str(), error = %err, "failed to nack delivery");
            }
        }
    }
}
