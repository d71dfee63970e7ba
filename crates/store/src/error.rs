//! State-store error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store connection error: {0}")]
    Connection(String),
    #[error("state store query failed: {0}")]
    Query(String),
    #[error("run {0} not found")]
    NotFound(String),
    #[error("run {0} is already terminal; row is frozen")]
    AlreadyFrozen(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound("<unknown>".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => StoreError::Connection(err.to_string()),
            _ => StoreError::Query(err.to_string()),
        }
    }
}
