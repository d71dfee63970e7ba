// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orc-broker: the Task Broker (TB) — an at-least-once job queue
//! carrying run-start messages. The core never re-implements durable
//! queueing itself; this crate is the seam where a real broker plugs
//! in, same role `oj-storage`'s queue polling plays for the daemon's
//! own worker queues.

mod error;
mod memory;
mod redis_broker;
mod wire;

pub use error::BrokerError;
pub use memory::InMemoryBroker;
pub use redis_broker::RedisBroker;

use async_trait::async_trait;
use orc_core::RunStartJob;
use std::time::Duration;

/// A job handed to a worker, carrying the opaque tag needed to
/// acknowledge or release it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub job: RunStartJob,
    pub tag: String,
}

/// An at-least-once queue of run-start jobs.
#[async_trait]
pub trait TaskBroker: Clone + Send + Sync + 'static {
    /// Block up to `wait` for the next job. Returns `Ok(None)` on
    /// timeout with no job available.
    async fn next_job(&self, wait: Duration) -> Result<Option<Delivery>, BrokerError>;

    /// Acknowledge successful processing. Until this is called the
    /// broker may redeliver `delivery` to another worker.
    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError>;

    /// Release a job back to the queue immediately instead of waiting
    /// out a redelivery timeout — used when the coordinator observes a
    /// failure outside the drive loop (initial lock acquisition, a
    /// connection error) and wants a prompt retry elsewhere.
    async fn nack(&self, delivery: &Delivery) -> Result<(), BrokerError>;
}
