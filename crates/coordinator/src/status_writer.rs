//! Status Writer (STW): updates the terminal row in the State Store
//! with bounded retries, then reads back to verify what landed.

use crate::config::StatusWriterConfig;
use orc_core::{ResponseEvent, RunId, RunStatus};
use orc_store::RunStore;

pub struct StatusWriter<St: RunStore> {
    store: St,
    config: StatusWriterConfig,
}

impl<St: RunStore> StatusWriter<St> {
    pub fn new(store: St, config: StatusWriterConfig) -> Self {
        Self { store, config }
    }

    /// Write the terminal row. Retries transient store failures with
    /// exponential backoff. On success, reads the row back and logs a
    /// warning (but still returns `true`) if the stored status doesn't
    /// match what was just written — the write itself is authoritative.
    /// Returns `false` only once every attempt has failed.
    ///
    /// Idempotent: the store layer rejects a second physical write to
    /// an already-frozen row, so calling this twice with identical
    /// arguments is safe — the second call's read-back will simply
    /// observe the first call's result.
    pub async fn write(
        &self,
        run_id: &RunId,
        status: RunStatus,
        error: Option<String>,
        events: Vec<ResponseEvent>,
        completed_at_ms: u64,
    ) -> bool {
        let mut delay = self.config.base;
        for attempt in 1..=self.config.max_attempts {
            let result = self
                .store
                .write_terminal(run_id, status, error.clone(), events.clone(), completed_at_ms)
                .await;

            match result {
                Ok(()) => {
                    match self.store.get_run(run_id).await {
                        Ok(Some(row)) if row.status != status => {
                            tracing::warn!(
                                run_id = run_id.as_str(),
                                expected = %status,
                                observed = %row.status,
                                "status writer read-back mismatch"
                            );
                        }
                        Ok(None) => {
                            tracing::warn!(run_id = run_id.as_str(), "status writer read-back found no row");
                        }
                        Err(err) => {
                            tracing::warn!(run_id = run_id.as_str(), error = %err, "status writer read-back failed");
                        }
                        _ => {}
                    }
                    return true;
                }
                Err(err) => {
                    // Already frozen means some other write already landed the
                    // terminal state we were trying to write — idempotent success.
                    if matches!(err, orc_store::StoreError::AlreadyFrozen(_)) {
                        return true;
                    }
                    tracing::warn!(
                        run_id = run_id.as_str(),
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %err,
                        "status writer attempt failed"
                    );
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(delay).await;
                        delay *= self.config.factor;
                    }
                }
            }
        }
        tracing::error!(run_id = run_id.as_str(), "status writer exhausted all retries");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_store::InMemoryStore;
    use orc_store::{NewRun, RunStore};
    use orc_core::{ModelParams, RunKind};
    use std::time::Duration;

    fn new_run(id: &str) -> NewRun {
        NewRun {
            id: RunId::from_string(id),
            kind: RunKind::Agent,
            thread_id: "t".into(),
            project_id: "p".into(),
            params: ModelParams {
                model_name: "m".into(),
                enable_thinking: false,
                reasoning_effort: None,
                stream: true,
                enable_context_manager: false,
            },
            agent_config: None,
            workflow_definition: None,
            created_at_ms: 0,
        }
    }

    #[tokio::test]
    async fn write_succeeds_and_is_visible_on_read_back() {
        let store = InMemoryStore::new();
        let id = RunId::from_string("run-1");
        store.create_run(new_run(id.as_str())).await.unwrap();

        let writer = StatusWriter::new(store.clone(), StatusWriterConfig::default());
        let ok = writer.write(&id, RunStatus::Completed, None, vec![], 42).await;
        assert!(ok);

        let row = store.get_run(&id).await.unwrap().unwrap();
        assert_eq!(row.status, RunStatus::Completed);
        assert_eq!(row.completed_at_ms, Some(42));
    }

    #[tokio::test]
    async fn repeated_identical_write_is_idempotent() {
        let store = InMemoryStore::new();
        let id = RunId::from_string("run-1");
        store.create_run(new_run(id.as_str())).await.unwrap();

        let writer = StatusWriter::new(store.clone(), StatusWriterConfig::default());
        assert!(writer.write(&id, RunStatus::Completed, None, vec![], 42).await);
        assert!(writer.write(&id, RunStatus::Completed, None, vec![], 42).await);

        let row = store.get_run(&id).await.unwrap().unwrap();
        assert_eq!(row.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn write_against_missing_row_exhausts_retries_and_returns_false() {
        let store = InMemoryStore::new();
        let id = RunId::from_string("does-not-exist");
        let config = StatusWriterConfig {
            base: Duration::from_millis(1),
            factor: 1,
            max_attempts: 2,
        };
        let writer = StatusWriter::new(store, config);
        let ok = writer.write(&id, RunStatus::Completed, None, vec![], 1).await;
        assert!(!ok);
    }
}
