//! In-memory `RunStore` fake for tests.

use crate::error::StoreError;
use crate::{NewRun, RunStore};
use async_trait::async_trait;
use orc_core::{ResponseEvent, Run, RunId, RunStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct InMemoryStore {
    rows: Arc<Mutex<HashMap<String, Run>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryStore {
    async fn create_run(&self, run: NewRun) -> Result<(), StoreError> {
        let row = Run {
            id: run.id.clone(),
            kind: run.kind,
            thread_id: run.thread_id,
            project_id: run.project_id,
            params: run.params,
            agent_config: run.agent_config,
            workflow_definition: run.workflow_definition,
            created_at_ms: run.created_at_ms,
            status: RunStatus::Pending,
            error: None,
            completed_at_ms: None,
            events: Vec::new(),
        };
        self.rows.lock().insert(run.id.as_str().to_string(), row);
        Ok(())
    }

    async fn mark_running(&self, run_id: &RunId) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        let row = rows
            .get_mut(run_id.as_str())
            .ok_or_else(|| StoreError::NotFound(run_id.as_str().to_string()))?;
        if row.status == RunStatus::Pending {
            row.status = RunStatus::Running;
        }
        Ok(())
    }

    async fn write_terminal(
        &self,
        run_id: &RunId,
        status: RunStatus,
        error: Option<String>,
        events: Vec<ResponseEvent>,
        completed_at_ms: u64,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        let row = rows
            .get_mut(run_id.as_str())
            .ok_or_else(|| StoreError::NotFound(run_id.as_str().to_string()))?;
        if row.is_frozen() {
            return Err(StoreError::AlreadyFrozen(run_id.as_str().to_string()));
        }
        row.status = status;
        row.error = error;
        row.events = events;
        row.completed_at_ms = Some(completed_at_ms);
        Ok(())
    }

    async fn get_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError> {
        Ok(self.rows.lock().get(run_id.as_str()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_core::{ModelParams, RunKind};

    fn params() -> ModelParams {
        ModelParams {
            model_name: "m".into(),
            enable_thinking: false,
            reasoning_effort: None,
            stream: true,
            enable_context_manager: false,
        }
    }

    fn new_run(id: &str) -> NewRun {
        NewRun {
            id: RunId::from_string(id),
            kind: RunKind::Agent,
            thread_id: "t".into(),
            project_id: "p".into(),
            params: params(),
            agent_config: None,
            workflow_definition: None,
            created_at_ms: 0,
        }
    }

    #[tokio::test]
    async fn create_then_mark_running_then_terminal_roundtrips() {
        let store = InMemoryStore::new();
        let id = RunId::from_string("run-1");
        store.create_run(new_run(id.as_str())).await.unwrap();
        store.mark_running(&id).await.unwrap();
        let row = store.get_run(&id).await.unwrap().unwrap();
        assert_eq!(row.status, RunStatus::Running);

        store
            .write_terminal(&id, RunStatus::Completed, None, vec![], 100)
            .await
            .unwrap();
        let row = store.get_run(&id).await.unwrap().unwrap();
        assert_eq!(row.status, RunStatus::Completed);
        assert_eq!(row.completed_at_ms, Some(100));
    }

    #[tokio::test]
    async fn terminal_row_rejects_a_second_write() {
        let store = InMemoryStore::new();
        let id = RunId::from_string("run-1");
        store.create_run(new_run(id.as_str())).await.unwrap();
        store
            .write_terminal(&id, RunStatus::Completed, None, vec![], 100)
            .await
            .unwrap();
        let result = store
            .write_terminal(&id, RunStatus::Failed, Some("late".into()), vec![], 200)
            .await;
        assert!(matches!(result, Err(StoreError::AlreadyFrozen(_))));
    }

    #[tokio::test]
    async fn repeated_identical_terminal_write_after_freeze_still_fails_closed() {
        // STW idempotence is achieved one layer up (read-back short-circuit
        // before the second call); the store itself always refuses a second
        // physical write once frozen.
        let store = InMemoryStore::new();
        let id = RunId::from_string("run-1");
        store.create_run(new_run(id.as_str())).await.unwrap();
        store
            .write_terminal(&id, RunStatus::Completed, None, vec![], 100)
            .await
            .unwrap();
        let result = store
            .write_terminal(&id, RunStatus::Completed, None, vec![], 100)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn get_run_on_unknown_id_returns_none() {
        let store = InMemoryStore::new();
        let missing = RunId::from_string("nope");
        assert!(store.get_run(&missing).await.unwrap().is_none());
    }
}
