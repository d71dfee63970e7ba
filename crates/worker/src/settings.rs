//! Layered configuration: built-in defaults, then `config/*.toml` if
//! present, then `ORC_*` environment variables — the same three-tier
//! shape `Technosorcery-silver-telegram`'s server config loader uses,
//! via the `config` crate instead of hand-rolled env parsing.

use orc_coordinator::{StatusWriterConfig, WorkerConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
struct RawSettings {
    bus_url: String,
    store_url: String,
    broker_url: String,
    broker_stream: String,
    agent_endpoint: String,
    workflow_endpoint: String,
    workflow_deterministic_endpoint: String,
    t_lock_secs: u64,
    t_hb_secs: u64,
    t_resp_secs: u64,
    t_drain_secs: u64,
    stw_base_ms: u64,
    stw_factor: u32,
    stw_max_attempts: u32,
    heartbeat_event_stride: u64,
    concurrency_limit: usize,
    instance_id: Option<String>,
}

impl Default for RawSettings {
    fn default() -> Self {
        let defaults = WorkerConfig::defaults_with_instance_id("unused");
        Self {
            bus_url: defaults.bus_url,
            store_url: defaults.store_url,
            broker_url: defaults.broker_url,
            broker_stream: defaults.broker_stream,
            agent_endpoint: "http://127.0.0.1:8088/agent-runs".to_string(),
            workflow_endpoint: "http://127.0.0.1:8088/workflow-runs".to_string(),
            workflow_deterministic_endpoint: "http://127.0.0.1:8088/workflow-runs/deterministic".to_string(),
            t_lock_secs: defaults.t_lock.as_secs(),
            t_hb_secs: defaults.t_hb.as_secs(),
            t_resp_secs: defaults.t_resp.as_secs(),
            t_drain_secs: defaults.t_drain.as_secs(),
            stw_base_ms: defaults.status_writer.base.as_millis() as u64,
            stw_factor: defaults.status_writer.factor,
            stw_max_attempts: defaults.status_writer.max_attempts,
            heartbeat_event_stride: defaults.heartbeat_event_stride,
            concurrency_limit: defaults.concurrency_limit,
            instance_id: None,
        }
    }
}

/// Fully resolved settings for one worker process: the typed
/// `WorkerConfig` every orc-* crate consumes, plus the bits only the
/// binary itself needs (the external driver endpoints).
pub struct Settings {
    pub worker: WorkerConfig,
    pub agent_endpoint: String,
    pub workflow_endpoint: String,
    pub workflow_deterministic_endpoint: String,
}

/// Load settings: built-in defaults, then `config/default.toml` and
/// `config/local.toml` (both optional, later wins), then `ORC_*`
/// environment variables (highest precedence, `__` as the nesting
/// separator though this schema is flat).
pub fn load() -> Result<Settings, config::ConfigError> {
    let defaults = RawSettings::default();
    let built_in = config::Config::try_from(&defaults)?;

    let raw: RawSettings = config::Config::builder()
        .add_source(built_in)
        .add_source(config::File::with_name("config/default").required(false))
        .add_source(config::File::with_name("config/local").required(false))
        .add_source(config::Environment::with_prefix("ORC"))
        .build()?
        .try_deserialize()?;

    let instance_id = raw
        .instance_id
        .unwrap_or_else(|| orc_core::InstanceId::new().as_str().to_string());

    let worker = WorkerConfig {
        bus_url: raw.bus_url,
        store_url: raw.store_url,
        broker_url: raw.broker_url,
        broker_stream: raw.broker_stream,
        t_lock: Duration::from_secs(raw.t_lock_secs),
        t_hb: Duration::from_secs(raw.t_hb_secs),
        t_resp: Duration::from_secs(raw.t_resp_secs),
        t_drain: Duration::from_secs(raw.t_drain_secs),
        status_writer: StatusWriterConfig {
            base: Duration::from_millis(raw.stw_base_ms),
            factor: raw.stw_factor,
            max_attempts: raw.stw_max_attempts,
        },
        heartbeat_event_stride: raw.heartbeat_event_stride,
        concurrency_limit: raw.concurrency_limit,
        instance_id,
    };

    Ok(Settings {
        worker,
        agent_endpoint: raw.agent_endpoint,
        workflow_endpoint: raw.workflow_endpoint,
        workflow_deterministic_endpoint: raw.workflow_deterministic_endpoint,
    })
}
