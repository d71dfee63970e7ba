//! Task-broker error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("task broker connection error: {0}")]
    Connection(String),
    #[error("task broker command failed: {0}")]
    Command(String),
    #[error("malformed run-start job: {0}")]
    MalformedJob(String),
}

impl From<redis::RedisError> for BrokerError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
            BrokerError::Connection(err.to_string())
        } else {
            BrokerError::Command(err.to_string())
        }
    }
}
