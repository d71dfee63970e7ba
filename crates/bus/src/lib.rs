// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orc-bus: the Streaming Bus (SB) — atomic set-if-absent-with-TTL locks,
//! append-only lists with TTL, and pub/sub, as one trait so the
//! coordinator is generic over whatever backs it in a given deployment.

mod error;
mod memory;
mod redis_bus;

pub use error::BusError;
pub use memory::InMemoryBus;
pub use redis_bus::RedisBus;

use async_trait::async_trait;
use std::time::Duration;

/// The in-memory key/value + pub/sub substrate used for locks, live
/// response logs, and control signaling.
#[async_trait]
pub trait StreamingBus: Clone + Send + Sync + 'static {
    type Subscription: BusSubscription;

    /// Atomically set `key` to `holder` with the given TTL, only if
    /// absent. Returns `true` if this call created the key.
    async fn try_acquire_lock(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, BusError>;

    /// Current holder of a lock key, if any.
    async fn lock_holder(&self, key: &str) -> Result<Option<String>, BusError>;

    /// Unconditionally set `key` to `value` with the given TTL — used
    /// for the heartbeat key, which the lock holder writes regardless
    /// of whether it already exists.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BusError>;

    async fn delete(&self, key: &str) -> Result<(), BusError>;

    /// Refresh (or set, if absent) a key's TTL without touching its value.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), BusError>;

    /// Append a JSON value to the tail of `key`'s list.
    async fn list_append(&self, key: &str, value: serde_json::Value) -> Result<(), BusError>;

    /// Inclusive range read, Redis `LRANGE` semantics (`-1` means "to the end").
    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<serde_json::Value>, BusError>;

    async fn list_len(&self, key: &str) -> Result<usize, BusError>;

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError>;

    async fn subscribe(&self, channels: &[String]) -> Result<Self::Subscription, BusError>;
}

/// A live subscription to one or more pub/sub channels.
#[async_trait]
pub trait BusSubscription: Send {
    /// Wait for the next message up to `timeout`. Returns `Ok(None)` on
    /// timeout — callers poll in a loop, checking other state (a
    /// cancellation flag, a heartbeat refresh floor) between polls. This
    /// bounds stop-signal latency to roughly `timeout` per iteration, the
    /// same shape as the source's `pubsub.get_message(timeout=0.5)`.
    async fn next_message(&mut self, timeout: Duration) -> Result<Option<(String, String)>, BusError>;

    async fn unsubscribe(&mut self) -> Result<(), BusError>;
}
