//! Thin HTTP clients for the two external collaborators the
//! orchestrator never implements itself: the LLM/tool agent loop and
//! the workflow graph executor. Both live behind an HTTP boundary in
//! this deployment; each line of the response body is one JSON event,
//! decoded straight into a [`ResponseEvent`] with no further
//! interpretation — the orchestrator only ever reads `type`.

use async_trait::async_trait;
use orc_core::{AgentRunStartJob, ResponseEvent, WorkflowRunStartJob};
use orc_producer::{AgentDriver, EventProducer, ProducerError, WorkflowExecutor};

/// A response body read one newline-delimited JSON line at a time.
pub struct NdjsonProducer {
    buf: Vec<u8>,
    cursor: usize,
    body: Option<reqwest::Response>,
}

impl NdjsonProducer {
    fn new(body: reqwest::Response) -> Self {
        Self {
            buf: Vec::new(),
            cursor: 0,
            body: Some(body),
        }
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let rest = &self.buf[self.cursor..];
        let pos = rest.iter().position(|b| *b == b'\n')?;
        let line = rest[..pos].to_vec();
        self.cursor += pos + 1;
        Some(line)
    }
}

#[async_trait]
impl EventProducer for NdjsonProducer {
    async fn next_event(&mut self) -> Result<Option<ResponseEvent>, ProducerError> {
        loop {
            if let Some(line) = self.take_line() {
                if line.is_empty() {
                    continue;
                }
                let value = serde_json::from_slice(&line)
                    .map_err(|err| ProducerError::AgentDriver(err.to_string()))?;
                return Ok(Some(ResponseEvent::new(value)));
            }

            let Some(response) = self.body.as_mut() else {
                return Ok(None);
            };

            match response.chunk().await {
                Ok(Some(chunk)) => {
                    if self.cursor > 0 {
                        self.buf.drain(..self.cursor);
                        self.cursor = 0;
                    }
                    self.buf.extend_from_slice(&chunk);
                }
                Ok(None) => {
                    self.body = None;
                    let remainder = self.buf[self.cursor..].to_vec();
                    if remainder.is_empty() {
                        return Ok(None);
                    }
                    self.buf = remainder;
                    self.cursor = self.buf.len(); // force exhaustion after this final line
                    let value = serde_json::from_slice(&self.buf)
                        .map_err(|err| ProducerError::AgentDriver(err.to_string()))?;
                    return Ok(Some(ResponseEvent::new(value)));
                }
                Err(err) => return Err(ProducerError::AgentDriver(err.to_string())),
            }
        }
    }
}

/// Calls out to the configured agent-execution service and streams its
/// NDJSON response back as the run's event sequence.
pub struct HttpAgentDriver {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAgentDriver {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl AgentDriver for HttpAgentDriver {
    type Producer = NdjsonProducer;

    async fn drive(&self, job: &AgentRunStartJob) -> Result<Self::Producer, ProducerError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(job)
            .send()
            .await
            .map_err(|err| ProducerError::AgentDriver(err.to_string()))?
            .error_for_status()
            .map_err(|err| ProducerError::AgentDriver(err.to_string()))?;
        Ok(NdjsonProducer::new(response))
    }
}

/// Calls out to the configured workflow graph executor. Deployments
/// route `deterministic` jobs to a different endpoint than LLM-branched
/// ones; both return the same event shape, so the coordinator's
/// contract is unaffected by which one served a given job.
pub struct HttpWorkflowExecutor {
    client: reqwest::Client,
    endpoint: String,
    deterministic_endpoint: String,
}

impl HttpWorkflowExecutor {
    pub fn new(endpoint: impl Into<String>, deterministic_endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            endpoint: endpoint.into(),
            deterministic_endpoint: deterministic_endpoint.into(),
        }
    }
}

#[async_trait]
impl WorkflowExecutor for HttpWorkflowExecutor {
    type Producer = NdjsonProducer;

    async fn execute(&self, job: &WorkflowRunStartJob) -> Result<Self::Producer, ProducerError> {
        let endpoint = if job.deterministic {
            &self.deterministic_endpoint
        } else {
            &self.endpoint
        };
        let response = self
            .client
            .post(endpoint)
            .json(job)
            .send()
            .await
            .map_err(|err| ProducerError::WorkflowExecutor(err.to_string()))?
            .error_for_status()
            .map_err(|err| ProducerError::WorkflowExecutor(err.to_string()))?;
        Ok(NdjsonProducer::new(response))
    }
}
