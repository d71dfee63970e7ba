//! Scriptable fakes for tests: a canned event sequence, optionally with
//! per-event delays and a terminal failure, standing in for a real
//! agent/workflow driver.

use crate::{AgentDriver, EventProducer, ProducerError, WorkflowExecutor};
use async_trait::async_trait;
use orc_core::{AgentRunStartJob, ResponseEvent, WorkflowRunStartJob};
use std::time::Duration;
use tokio::sync::Mutex;

enum Step {
    Event(ResponseEvent, Option<Duration>),
    Fail(String),
}

/// A producer whose event sequence is scripted ahead of time. Drains
/// `steps` in order; a `Step::Fail` ends the sequence with an error
/// instead of `None`.
pub struct FakeProducer {
    steps: Mutex<std::vec::IntoIter<Step>>,
}

impl FakeProducer {
    pub fn new(events: Vec<ResponseEvent>) -> Self {
        Self {
            steps: Mutex::new(events.into_iter().map(|e| Step::Event(e, None)).collect::<Vec<_>>().into_iter()),
        }
    }

    /// Like [`FakeProducer::new`] but sleeps `delay` before yielding
    /// event `index` (0-based) — used to model a slow producer that a
    /// stop signal interrupts mid-sequence.
    pub fn with_delay(mut events: Vec<ResponseEvent>, index: usize, delay: Duration) -> Self {
        let steps: Vec<Step> = events
            .drain(..)
            .enumerate()
            .map(|(i, e)| Step::Event(e, if i == index { Some(delay) } else { None }))
            .collect();
        Self {
            steps: Mutex::new(steps.into_iter().collect::<Vec<_>>().into_iter()),
        }
    }

    /// Yields `events` then fails with `message` instead of exhausting
    /// cleanly.
    pub fn failing_after(events: Vec<ResponseEvent>, message: impl Into<String>) -> Self {
        let mut steps: Vec<Step> = events.into_iter().map(|e| Step::Event(e, None)).collect();
        steps.push(Step::Fail(message.into()));
        Self {
            steps: Mutex::new(steps.into_iter().collect::<Vec<_>>().into_iter()),
        }
    }
}

#[async_trait]
impl EventProducer for FakeProducer {
    async fn next_event(&mut self) -> Result<Option<ResponseEvent>, ProducerError> {
        let next = self.steps.get_mut().next();
        match next {
            Some(Step::Event(event, delay)) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(Some(event))
            }
            Some(Step::Fail(message)) => Err(ProducerError::AgentDriver(message)),
            None => Ok(None),
        }
    }
}

/// Hands back a pre-built [`FakeProducer`] for any job, ignoring the
/// job's contents — tests construct the producer directly and wire it
/// through this driver only to satisfy the `AgentDriver` seam.
pub struct FakeAgentDriver {
    next: Mutex<Option<FakeProducer>>,
}

impl FakeAgentDriver {
    pub fn new(producer: FakeProducer) -> Self {
        Self {
            next: Mutex::new(Some(producer)),
        }
    }
}

#[async_trait]
impl AgentDriver for FakeAgentDriver {
    type Producer = FakeProducer;

    async fn drive(&self, _job: &AgentRunStartJob) -> Result<Self::Producer, ProducerError> {
        self.next
            .lock()
            .await
            .take()
            .ok_or_else(|| ProducerError::AgentDriver("fake driver exhausted".to_string()))
    }
}

pub struct FakeWorkflowExecutor {
    next: Mutex<Option<FakeProducer>>,
}

impl FakeWorkflowExecutor {
    pub fn new(producer: FakeProducer) -> Self {
        Self {
            next: Mutex::new(Some(producer)),
        }
    }
}

#[async_trait]
impl WorkflowExecutor for FakeWorkflowExecutor {
    type Producer = FakeProducer;

    async fn execute(&self, _job: &WorkflowRunStartJob) -> Result<Self::Producer, ProducerError> {
        self.next
            .lock()
            .await
            .take()
            .ok_or_else(|| ProducerError::WorkflowExecutor("fake executor exhausted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_core::ResponseEvent;

    #[tokio::test]
    async fn scripted_sequence_yields_in_order_then_ends() {
        let mut producer = FakeProducer::new(vec![
            ResponseEvent::new(serde_json::json!({"type": "assistant", "text": "hi"})),
            ResponseEvent::new(serde_json::json!({"type": "status", "status": "completed"})),
        ]);
        let first = producer.next_event().await.unwrap().unwrap();
        assert_eq!(first.type_tag(), Some("assistant"));
        let second = producer.next_event().await.unwrap().unwrap();
        assert_eq!(second.type_tag(), Some("status"));
        assert!(producer.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failing_after_surfaces_the_error_instead_of_ending() {
        let mut producer = FakeProducer::failing_after(
            vec![ResponseEvent::new(serde_json::json!({"type": "assistant", "text": "hello"}))],
            "Boom",
        );
        assert!(producer.next_event().await.unwrap().is_some());
        let err = producer.next_event().await.unwrap_err();
        assert!(err.to_string().contains("Boom"));
    }
}
