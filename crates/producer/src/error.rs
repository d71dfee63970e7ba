//! Event-producer error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("agent driver failed: {0}")]
    AgentDriver(String),
    #[error("workflow executor failed: {0}")]
    WorkflowExecutor(String),
}
