// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orc-store: the State Store (SS) — a durable transactional record of
//! runs, their parameters, current status, terminal error, and their
//! full ordered event log, keyed by run id.

mod error;
mod memory;
mod postgres;

pub use error::StoreError;
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use orc_core::{ModelParams, ResponseEvent, Run, RunId, RunKind, RunStatus};
use serde_json::Value;

/// Fields needed to insert a new `Pending` row. Everything status-
/// related starts at its initial value; callers never construct a
/// non-`Pending` row directly.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub id: RunId,
    pub kind: RunKind,
    pub thread_id: String,
    pub project_id: String,
    pub params: ModelParams,
    pub agent_config: Option<Value>,
    pub workflow_definition: Option<Value>,
    pub created_at_ms: u64,
}

/// The durable record of runs. One row per run id; mutated only through
/// `mark_running` and `write_terminal` once created — never deleted,
/// never read-modify-written outside those two calls.
#[async_trait]
pub trait RunStore: Clone + Send + Sync + 'static {
    async fn create_run(&self, run: NewRun) -> Result<(), StoreError>;

    /// Transition `Pending -> Running`. A no-op (not an error) if the
    /// row is already `Running` — the claim is what makes this call
    /// exclusive, not this method.
    async fn mark_running(&self, run_id: &RunId) -> Result<(), StoreError>;

    /// Write the terminal status, completion timestamp, error, and the
    /// full event list. Fails with `AlreadyFrozen` if the row already
    /// has a completion timestamp — terminal rows never change twice.
    async fn write_terminal(
        &self,
        run_id: &RunId,
        status: RunStatus,
        error: Option<String>,
        events: Vec<ResponseEvent>,
        completed_at_ms: u64,
    ) -> Result<(), StoreError>;

    async fn get_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError>;
}
