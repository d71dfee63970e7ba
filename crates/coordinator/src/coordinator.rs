//! Run Coordinator (RC): claims a run, drives its event producer,
//! writes the terminal state, and always cleans up — whether the run
//! finished, failed, was stopped, or was never ours to begin with.

use crate::config::WorkerConfig;
use crate::error::CoordinatorError;
use crate::status_writer::StatusWriter;
use crate::stop_watcher;
use orc_bus::StreamingBus;
use orc_core::{
    Clock, ControlSignal, InstanceId, ResponseEvent, RunId, RunKind, RunStartJob, RunStatus,
    StreamNamespace, SystemClock, TerminalStatus,
};
use orc_producer::{EventProducer, ProducerError};
use orc_store::RunStore;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// What happened to a job handed to [`Coordinator::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// This worker claimed the run and drove it to the given terminal status.
    Claimed(RunStatus),
    /// Another worker already owns this run (or it was already terminal);
    /// this call did nothing.
    AlreadyClaimed,
}

pub struct Coordinator<B: StreamingBus, St: RunStore, C: Clock = SystemClock> {
    bus: B,
    store: St,
    clock: C,
    config: WorkerConfig,
    instance_id: InstanceId,
}

impl<B: StreamingBus, St: RunStore> Coordinator<B, St, SystemClock> {
    pub fn new(bus: B, store: St, config: WorkerConfig) -> Self {
        Self::with_clock(bus, store, config, SystemClock::default())
    }
}

impl<B: StreamingBus, St: RunStore, C: Clock> Coordinator<B, St, C> {
    pub fn with_clock(bus: B, store: St, config: WorkerConfig, clock: C) -> Self {
        let instance_id = InstanceId::from_string(config.instance_id.clone());
        Self {
            bus,
            store,
            clock,
            config,
            instance_id,
        }
    }

    /// Drive one job from claim through cleanup. `build_producer` is
    /// called only after the claim succeeds — instantiating the EP is
    /// part of session setup, not the claim itself.
    pub async fn run<P, F, Fut>(&self, job: RunStartJob, build_producer: F) -> Result<RunOutcome, CoordinatorError>
    where
        P: EventProducer,
        F: FnOnce(RunId) -> Fut,
        Fut: Future<Output = Result<P, ProducerError>>,
    {
        let namespace = job.stream_namespace()?;
        let run_id = job.run_id();
        let kind = job.kind();
        let lock_key = namespace.lock_key();

        if !self.claim(&lock_key).await? {
            tracing::info!(run_id = run_id.as_str(), "run already claimed by another instance");
            return Ok(RunOutcome::AlreadyClaimed);
        }

        // Edge policy: a job delivered after its run is already terminal.
        // Optional optimisation — correctness doesn't depend on it since
        // the status writer is idempotent, but it avoids redriving work.
        match self.store.get_run(&run_id).await {
            Ok(Some(row)) if row.is_frozen() => {
                tracing::info!(run_id = run_id.as_str(), "run already terminal in the state store; releasing lock");
                let _ = self.bus.delete(&lock_key).await;
                return Ok(RunOutcome::AlreadyClaimed);
            }
            _ => {}
        }

        let result = self.session(&namespace, &run_id, kind, build_producer).await;
        self.cleanup(&namespace, &lock_key).await;
        result.map(RunOutcome::Claimed)
    }

    /// Atomically claim `lock_key`. Returns `true` if this call is the
    /// owner, `false` if some other worker already owns the run.
    async fn claim(&self, lock_key: &str) -> Result<bool, CoordinatorError> {
        if self
            .bus
            .try_acquire_lock(lock_key, self.instance_id.as_str(), self.config.t_lock)
            .await?
        {
            return Ok(true);
        }
        if self.bus.lock_holder(lock_key).await?.is_some() {
            return Ok(false);
        }
        // Key was absent but the set still failed — a race with another
        // claimant. Retry once; if it's still absent after that, give up
        // rather than loop.
        Ok(self
            .bus
            .try_acquire_lock(lock_key, self.instance_id.as_str(), self.config.t_lock)
            .await?)
    }

    /// Session setup, drive loop, completion synthesis, and terminal
    /// write. Assumes the lock is already held; does not release it —
    /// that's `cleanup`'s job, unconditionally, after this returns.
    async fn session<P, F, Fut>(
        &self,
        namespace: &StreamNamespace,
        run_id: &RunId,
        kind: RunKind,
        build_producer: F,
    ) -> Result<RunStatus, CoordinatorError>
    where
        P: EventProducer,
        F: FnOnce(RunId) -> Fut,
        Fut: Future<Output = Result<P, ProducerError>>,
    {
        let cancel = CancellationToken::new();
        let heartbeat_key = namespace.heartbeat_key(&self.instance_id);

        self.bus.set(&heartbeat_key, "running", self.config.t_hb).await?;
        self.store.mark_running(run_id).await?;

        let watcher = tokio::spawn(stop_watcher::watch(
            self.bus.clone(),
            namespace.clone(),
            self.instance_id.clone(),
            self.config.clone(),
            cancel.clone(),
        ));

        let (final_status, terminal_message, pending) = match build_producer(run_id.clone()).await {
            Ok(producer) => {
                self.drive(namespace, &heartbeat_key, kind, producer, cancel.clone()).await
            }
            Err(err) => {
                tracing::error!(run_id = run_id.as_str(), error = %err, "failed to instantiate event producer");
                let mut pending = JoinSet::new();
                self.append_and_schedule_publish(namespace, &mut pending, ResponseEvent::synthetic_error(kind, &err.to_string()))
                    .await;
                (RunStatus::Failed, Some(err.to_string()), pending)
            }
        };

        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), watcher).await;

        self.write_terminal_and_broadcast(namespace, run_id, final_status, terminal_message, pending)
            .await;

        Ok(final_status)
    }

    /// Consume the producer as a lazy sequence, appending and
    /// publishing each event, checking the cancellation flag between
    /// events, until a `completed`/`failed`/`stopped` status event,
    /// cancellation, producer exhaustion, or producer failure ends the
    /// loop. A producer-emitted `status`/`workflow_status` event whose
    /// status is `error` is forwarded like any other event and does not
    /// end the run — `TerminalStatus::Error` exists only for the
    /// synthetic event this coordinator injects on its own failure path.
    async fn drive<P: EventProducer>(
        &self,
        namespace: &StreamNamespace,
        heartbeat_key: &str,
        kind: RunKind,
        mut producer: P,
        cancel: CancellationToken,
    ) -> (RunStatus, Option<String>, JoinSet<()>) {
        let mut pending = JoinSet::new();
        let mut count: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return (RunStatus::Stopped, None, pending);
            }

            match producer.next_event().await {
                Ok(Some(event)) => {
                    let ends_run = match event.terminal_status() {
                        Some((terminal, message)) if terminal != TerminalStatus::Error => {
                            Some((map_terminal(terminal), message))
                        }
                        _ => None,
                    };

                    self.append_and_schedule_publish(namespace, &mut pending, event).await;

                    if let Some((status, message)) = ends_run {
                        return (status, message, pending);
                    }

                    count += 1;
                    if count % self.config.heartbeat_event_stride.max(1) == 0 {
                        if let Err(err) = self.bus.expire(heartbeat_key, self.config.t_hb).await {
                            tracing::warn!(error = %err, "failed to refresh heartbeat TTL from event counter");
                        }
                    }
                }
                Ok(None) => {
                    // Normal completion synthesis: no terminal event was
                    // ever emitted, so the log is never empty.
                    let message = match kind {
                        RunKind::Agent => "Agent run completed successfully",
                        RunKind::Workflow => "Workflow execution completed successfully",
                    };
                    self.append_and_schedule_publish(
                        namespace,
                        &mut pending,
                        ResponseEvent::synthetic_completed(kind, message),
                    )
                    .await;
                    return (RunStatus::Completed, None, pending);
                }
                Err(err) => {
                    self.append_and_schedule_publish(
                        namespace,
                        &mut pending,
                        ResponseEvent::synthetic_error(kind, &err.to_string()),
                    )
                    .await;
                    return (RunStatus::Failed, Some(err.to_string()), pending);
                }
            }
        }
    }

    /// Append is awaited on the critical path — this is the
    /// backpressure refinement over the source, which fires both append
    /// and publish as detached tasks. Publish is scheduled in the
    /// bounded task group so a slow subscriber never blocks the loop.
    async fn append_and_schedule_publish(&self, namespace: &StreamNamespace, pending: &mut JoinSet<()>, event: ResponseEvent) {
        let responses_key = namespace.responses_key();
        if let Err(err) = self.bus.list_append(&responses_key, event.0).await {
            tracing::error!(error = %err, "failed to append response event");
            return;
        }
        let bus = self.bus.clone();
        let channel = namespace.new_response_channel();
        pending.spawn(async move {
            if let Err(err) = bus.publish(&channel, "new").await {
                tracing::warn!(error = %err, "failed to publish new-response notification");
            }
        });
    }

    async fn write_terminal_and_broadcast(
        &self,
        namespace: &StreamNamespace,
        run_id: &RunId,
        final_status: RunStatus,
        terminal_message: Option<String>,
        mut pending: JoinSet<()>,
    ) {
        let events = match self.bus.list_range(&namespace.responses_key(), 0, -1).await {
            Ok(raw) => raw.into_iter().map(ResponseEvent::new).collect(),
            Err(err) => {
                tracing::error!(run_id = run_id.as_str(), error = %err, "failed to read back response log for terminal write");
                Vec::new()
            }
        };

        let writer = StatusWriter::new(self.store.clone(), self.config.status_writer);
        let wrote = writer
            .write(run_id, final_status, terminal_message, events, self.clock.epoch_ms())
            .await;
        if !wrote {
            tracing::error!(run_id = run_id.as_str(), "status writer exhausted retries; state store terminal write lost");
        }

        let signal = ControlSignal::for_final_status(final_status);
        if let Err(err) = self.bus.publish(&namespace.global_control_channel(), signal.as_str()).await {
            tracing::warn!(run_id = run_id.as_str(), error = %err, "failed to publish final control signal");
        }

        let _ = tokio::time::timeout(self.config.t_drain, async {
            while pending.join_next().await.is_some() {}
        })
        .await;
    }

    async fn cleanup(&self, namespace: &StreamNamespace, lock_key: &str) {
        let _ = self.bus.expire(&namespace.responses_key(), self.config.t_resp).await;
        let _ = self.bus.delete(&namespace.heartbeat_key(&self.instance_id)).await;
        let _ = self.bus.delete(lock_key).await;
    }
}

fn map_terminal(terminal: TerminalStatus) -> RunStatus {
    match terminal {
        TerminalStatus::Completed => RunStatus::Completed,
        TerminalStatus::Failed | TerminalStatus::Error => RunStatus::Failed,
        TerminalStatus::Stopped => RunStatus::Stopped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_bus::InMemoryBus;
    use orc_core::{AgentRunStartJob, FakeClock, ModelParams, RunKind, WorkflowRunStartJob};
    use orc_producer::FakeProducer;
    use orc_store::{InMemoryStore, NewRun};
    use std::time::Duration;

    fn params() -> ModelParams {
        ModelParams {
            model_name: "m".into(),
            enable_thinking: false,
            reasoning_effort: None,
            stream: true,
            enable_context_manager: false,
        }
    }

    fn agent_job(run_id: &str) -> RunStartJob {
        RunStartJob::Agent(AgentRunStartJob {
            run_id: RunId::from_string(run_id),
            thread_id: "t1".into(),
            instance_id_hint: None,
            project_id: "p1".into(),
            params: params(),
            agent_config: None,
            is_agent_builder: false,
            target_agent_id: None,
            request_id: None,
        })
    }

    fn workflow_job(execution_id: &str, agent_run_id: &str) -> RunStartJob {
        RunStartJob::Workflow(WorkflowRunStartJob {
            execution_id: execution_id.into(),
            workflow_id: "wf-1".into(),
            workflow_name: "wf".into(),
            workflow_definition: serde_json::json!({}),
            variables: None,
            triggered_by: "webhook".into(),
            deterministic: false,
            thread_id: "t1".into(),
            project_id: "p1".into(),
            params: params(),
            agent_run_id: agent_run_id.into(),
        })
    }

    fn test_coordinator() -> (Coordinator<InMemoryBus, InMemoryStore, FakeClock>, InMemoryBus, InMemoryStore) {
        let bus = InMemoryBus::new();
        let store = InMemoryStore::new();
        let mut config = WorkerConfig::defaults_with_instance_id("inst-1");
        config.t_drain = Duration::from_secs(2);
        config.heartbeat_event_stride = 1;
        let coordinator = Coordinator::with_clock(bus.clone(), store.clone(), config, FakeClock::new());
        (coordinator, bus, store)
    }

    async fn seed(store: &InMemoryStore, run_id: &str) {
        store
            .create_run(NewRun {
                id: RunId::from_string(run_id),
                kind: RunKind::Agent,
                thread_id: "t1".into(),
                project_id: "p1".into(),
                params: params(),
                agent_config: None,
                workflow_definition: None,
                created_at_ms: 0,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn happy_path_completes_and_publishes_end_stream() {
        let (coordinator, bus, store) = test_coordinator();
        seed(&store, "r1").await;

        let mut sub = bus.subscribe(&["agent_run:r1:control".to_string()]).await.unwrap();

        let outcome = coordinator
            .run(agent_job("r1"), |_run_id| async {
                Ok(FakeProducer::new(vec![
                    ResponseEvent::new(serde_json::json!({"type": "assistant", "text": "hi"})),
                    ResponseEvent::new(serde_json::json!({"type": "status", "status": "completed", "message": "ok"})),
                ]))
            })
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Claimed(RunStatus::Completed));

        let row = store.get_run(&RunId::from_string("r1")).await.unwrap().unwrap();
        assert_eq!(row.status, RunStatus::Completed);
        assert_eq!(row.events.len(), 2);
        assert!(bus.lock_holder("run_lock:r1").await.unwrap().is_none());

        let (_, payload) = sub.next_message(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(payload, "END_STREAM");
    }

    #[tokio::test]
    async fn duplicate_delivery_is_a_no_op() {
        let (coordinator, bus, store) = test_coordinator();
        seed(&store, "r1").await;

        bus.try_acquire_lock("run_lock:r1", "other-instance", Duration::from_secs(60))
            .await
            .unwrap();

        let outcome = coordinator
            .run(agent_job("r1"), |_run_id| async { Ok(FakeProducer::new(vec![])) })
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::AlreadyClaimed);
        let row = store.get_run(&RunId::from_string("r1")).await.unwrap().unwrap();
        assert_eq!(row.status, RunStatus::Pending);
    }

    #[tokio::test]
    async fn external_stop_ends_the_drive_loop_and_marks_stopped() {
        let (coordinator, bus, store) = test_coordinator();
        seed(&store, "r2").await;

        let bus_for_stopper = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            bus_for_stopper
                .publish("agent_run:r2:control", "STOP")
                .await
                .unwrap();
        });

        // The drive loop only checks cancellation between producer
        // calls, not mid-call, so delay event 0 itself long enough for
        // the stop signal to land while that call is in flight — event
        // 1 must never be produced.
        let outcome = coordinator
            .run(agent_job("r2"), |_run_id| async {
                Ok(FakeProducer::with_delay(
                    vec![
                        ResponseEvent::new(serde_json::json!({"type": "assistant", "text": "part 1"})),
                        ResponseEvent::new(serde_json::json!({"type": "assistant", "text": "part 2"})),
                    ],
                    0,
                    Duration::from_millis(200),
                ))
            })
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Claimed(RunStatus::Stopped));
        let row = store.get_run(&RunId::from_string("r2")).await.unwrap().unwrap();
        assert_eq!(row.status, RunStatus::Stopped);
        assert_eq!(row.events.len(), 1);
        assert_eq!(row.events[0].type_tag(), Some("assistant"));
    }

    #[tokio::test]
    async fn producer_failure_maps_to_failed_with_error_event() {
        let (coordinator, _bus, store) = test_coordinator();
        seed(&store, "r3").await;

        let outcome = coordinator
            .run(agent_job("r3"), |_run_id| async {
                Ok(FakeProducer::failing_after(
                    vec![ResponseEvent::new(serde_json::json!({"type": "assistant", "text": "hello"}))],
                    "Boom",
                ))
            })
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Claimed(RunStatus::Failed));
        let row = store.get_run(&RunId::from_string("r3")).await.unwrap().unwrap();
        assert_eq!(row.status, RunStatus::Failed);
        assert!(row.error.as_deref().unwrap().contains("Boom"));
        assert_eq!(row.events.len(), 2);
    }

    #[tokio::test]
    async fn implicit_completion_appends_exactly_one_synthetic_terminator() {
        let (coordinator, _bus, store) = test_coordinator();
        seed(&store, "r4").await;

        let outcome = coordinator
            .run(agent_job("r4"), |_run_id| async {
                Ok(FakeProducer::new(vec![ResponseEvent::new(
                    serde_json::json!({"type": "tool", "name": "x"}),
                )]))
            })
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Claimed(RunStatus::Completed));
        let row = store.get_run(&RunId::from_string("r4")).await.unwrap().unwrap();
        assert_eq!(row.events.len(), 2);
        assert_eq!(row.events[1].terminal_status().unwrap().0, TerminalStatus::Completed);
    }

    #[tokio::test]
    async fn response_log_survives_for_late_subscribers_after_cleanup() {
        let (coordinator, bus, store) = test_coordinator();
        seed(&store, "r5").await;

        coordinator
            .run(agent_job("r5"), |_run_id| async {
                Ok(FakeProducer::new(vec![ResponseEvent::new(
                    serde_json::json!({"type": "status", "status": "completed"}),
                )]))
            })
            .await
            .unwrap();

        let replayed = bus.list_range("agent_run:r5:responses", 0, -1).await.unwrap();
        assert_eq!(replayed.len(), 1);
    }

    #[tokio::test]
    async fn already_terminal_run_releases_lock_without_rewriting() {
        let (coordinator, bus, store) = test_coordinator();
        seed(&store, "r6").await;
        store
            .write_terminal(&RunId::from_string("r6"), RunStatus::Completed, None, vec![], 0)
            .await
            .unwrap();

        let outcome = coordinator
            .run(agent_job("r6"), |_run_id| async { Ok(FakeProducer::new(vec![])) })
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::AlreadyClaimed);
        assert!(bus.lock_holder("run_lock:r6").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn error_status_event_is_forwarded_without_ending_the_run() {
        let (coordinator, _bus, store) = test_coordinator();
        seed(&store, "r7").await;

        let outcome = coordinator
            .run(agent_job("r7"), |_run_id| async {
                Ok(FakeProducer::new(vec![
                    ResponseEvent::new(serde_json::json!({"type": "status", "status": "error", "message": "transient"})),
                    ResponseEvent::new(serde_json::json!({"type": "status", "status": "completed"})),
                ]))
            })
            .await
            .unwrap();

        // The producer-emitted "error" status is just another event in
        // the log; only the trailing "completed" status ends the run.
        assert_eq!(outcome, RunOutcome::Claimed(RunStatus::Completed));
        let row = store.get_run(&RunId::from_string("r7")).await.unwrap().unwrap();
        assert_eq!(row.status, RunStatus::Completed);
        assert_eq!(row.events.len(), 2);
        assert_eq!(row.events[0].terminal_status().unwrap().0, TerminalStatus::Error);
    }

    #[tokio::test]
    async fn workflow_run_synthesizes_workflow_status_sentinel_on_implicit_completion() {
        let (coordinator, _bus, store) = test_coordinator();
        seed(&store, "exec-1").await;

        let outcome = coordinator
            .run(workflow_job("exec-1", "exec-1"), |_run_id| async {
                Ok(FakeProducer::new(vec![ResponseEvent::new(
                    serde_json::json!({"type": "tool", "name": "x"}),
                )]))
            })
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Claimed(RunStatus::Completed));
        let row = store.get_run(&RunId::from_string("exec-1")).await.unwrap().unwrap();
        assert_eq!(row.events.len(), 2);
        let terminator = &row.events[1];
        assert_eq!(terminator.type_tag(), Some("workflow_status"));
        assert_eq!(
            terminator.0.get("message").and_then(|v| v.as_str()),
            Some("Workflow execution completed successfully")
        );
    }

    use yare::parameterized;

    #[parameterized(
        completed = { TerminalStatus::Completed, RunStatus::Completed },
        failed = { TerminalStatus::Failed, RunStatus::Failed },
        error = { TerminalStatus::Error, RunStatus::Failed },
        stopped = { TerminalStatus::Stopped, RunStatus::Stopped },
    )]
    fn terminal_status_maps_to_the_right_run_status(terminal: TerminalStatus, expected: RunStatus) {
        assert_eq!(map_terminal(terminal), expected);
    }
}
