// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orc-producer: the Event Producer (EP) — a pluggable lazy sequence of
//! response events. The coordinator is generic over [`EventProducer`]
//! and never knows whether it's driving an agent or a workflow; the
//! actual LLM/tool loop and workflow graph executor live outside this
//! crate (they are genuinely someone else's subsystem), so what's here
//! is the seam and a canned fake for tests — the same split the
//! teacher draws between `AgentAdapter` and its `FakeAgentAdapter`.

mod error;
mod fake;

pub use error::ProducerError;
pub use fake::{FakeAgentDriver, FakeProducer, FakeWorkflowExecutor};

use async_trait::async_trait;
use orc_core::{AgentRunStartJob, ResponseEvent, WorkflowRunStartJob};

/// A lazy sequence of response events. The coordinator pulls one event
/// at a time so it can check the cancellation flag between each —
/// `EventProducer` itself does not know about stopping.
#[async_trait]
pub trait EventProducer: Send {
    /// Yield the next event, or `None` once the sequence is exhausted.
    async fn next_event(&mut self) -> Result<Option<ResponseEvent>, ProducerError>;
}

/// External collaborator that turns an agent run-start job into a live
/// event sequence. Implemented elsewhere, against the real model/tool
/// loop; this crate only defines the seam.
#[async_trait]
pub trait AgentDriver: Send + Sync + 'static {
    type Producer: EventProducer;

    async fn drive(&self, job: &AgentRunStartJob) -> Result<Self::Producer, ProducerError>;
}

/// External collaborator that turns a workflow run-start job into a
/// live event sequence (the deterministic and non-deterministic
/// workflow executors both implement this).
#[async_trait]
pub trait WorkflowExecutor: Send + Sync + 'static {
    type Producer: EventProducer;

    async fn execute(&self, job: &WorkflowRunStartJob) -> Result<Self::Producer, ProducerError>;
}
