//! Worker configuration. Loaded by the binary crate via the `config`
//! crate (defaults -> `config/*.toml` -> `ORC_*` env vars); this struct
//! is the typed result that every orc-* crate consumes, independent of
//! how it got populated.

use std::time::Duration;

/// Retry policy for the Status Writer's terminal-row write.
#[derive(Debug, Clone, Copy)]
pub struct StatusWriterConfig {
    pub base: Duration,
    pub factor: u32,
    pub max_attempts: u32,
}

impl Default for StatusWriterConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            factor: 2,
            max_attempts: 3,
        }
    }
}

/// Everything a worker process needs to run the coordinator loop.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub bus_url: String,
    pub store_url: String,
    pub broker_url: String,
    pub broker_stream: String,

    /// Outside bound on how long one run may hold its lock.
    pub t_lock: Duration,
    /// Heartbeat key TTL; refreshed on a fast cadence by the Stop
    /// Watcher (every `t_hb / 2`) and, as a secondary floor, every
    /// `heartbeat_event_stride` drive-loop events. Short relative to
    /// `t_lock`: its only job is letting another instance detect a
    /// crashed worker quickly, not bounding run duration.
    pub t_hb: Duration,
    /// TTL on the response list once a run finishes.
    pub t_resp: Duration,
    /// Timeout waiting for in-flight append/publish tasks at cleanup.
    pub t_drain: Duration,

    pub status_writer: StatusWriterConfig,

    /// Refresh the heartbeat every this many drive-loop events, in
    /// addition to the Stop Watcher's own time-based floor.
    pub heartbeat_event_stride: u64,

    /// Max runs this worker process drives concurrently.
    pub concurrency_limit: usize,

    pub instance_id: String,
}

impl WorkerConfig {
    /// Defaults matching the source process, before any `config`-crate
    /// layering is applied.
    pub fn defaults_with_instance_id(instance_id: impl Into<String>) -> Self {
        Self {
            bus_url: "redis://127.0.0.1:6379".to_string(),
            store_url: "postgres://localhost/orchestrator".to_string(),
            broker_url: "redis://127.0.0.1:6379".to_string(),
            broker_stream: "orc:run-start".to_string(),
            t_lock: Duration::from_secs(6 * 3600),
            t_hb: Duration::from_secs(30),
            t_resp: Duration::from_secs(24 * 3600),
            t_drain: Duration::from_secs(30),
            status_writer: StatusWriterConfig::default(),
            heartbeat_event_stride: 50,
            concurrency_limit: 8,
            instance_id: instance_id.into(),
        }
    }
}
