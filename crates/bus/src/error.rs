//! Streaming-bus error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("streaming bus connection error: {0}")]
    Connection(String),
    #[error("streaming bus command failed: {0}")]
    Command(String),
    #[error("streaming bus returned malformed data: {0}")]
    MalformedData(String),
}

impl From<redis::RedisError> for BusError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
            BusError::Connection(err.to_string())
        } else {
            BusError::Command(err.to_string())
        }
    }
}
