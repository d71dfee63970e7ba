//! Postgres-backed `RunStore` via `sqlx`.

use crate::error::StoreError;
use crate::{NewRun, RunStore};
use async_trait::async_trait;
use orc_core::{ModelParams, ResponseEvent, Run, RunId, RunKind, RunStatus};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(StoreError::from)?;
        Ok(Self { pool })
    }

    /// Create the `runs` table if it doesn't already exist. Cheap enough
    /// to call unconditionally on worker startup; idempotent.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                thread_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                params JSONB NOT NULL,
                agent_config JSONB,
                workflow_definition JSONB,
                created_at_ms BIGINT NOT NULL,
                status TEXT NOT NULL,
                error TEXT,
                completed_at_ms BIGINT,
                events JSONB NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    fn row_to_run(row: &sqlx::postgres::PgRow) -> Result<Run, StoreError> {
        let kind: String = row.try_get("kind").map_err(StoreError::from)?;
        let status: String = row.try_get("status").map_err(StoreError::from)?;
        let params: serde_json::Value = row.try_get("params").map_err(StoreError::from)?;
        let events: serde_json::Value = row.try_get("events").map_err(StoreError::from)?;
        Ok(Run {
            id: RunId::from_string(row.try_get::<String, _>("id").map_err(StoreError::from)?),
            kind: parse_kind(&kind)?,
            thread_id: row.try_get("thread_id").map_err(StoreError::from)?,
            project_id: row.try_get("project_id").map_err(StoreError::from)?,
            params: serde_json::from_value::<ModelParams>(params)
                .map_err(|e| StoreError::Query(e.to_string()))?,
            agent_config: row.try_get("agent_config").map_err(StoreError::from)?,
            workflow_definition: row.try_get("workflow_definition").map_err(StoreError::from)?,
            created_at_ms: row.try_get::<i64, _>("created_at_ms").map_err(StoreError::from)? as u64,
            status: parse_status(&status)?,
            error: row.try_get("error").map_err(StoreError::from)?,
            completed_at_ms: row
                .try_get::<Option<i64>, _>("completed_at_ms")
                .map_err(StoreError::from)?
                .map(|v| v as u64),
            events: serde_json::from_value::<Vec<ResponseEvent>>(events)
                .map_err(|e| StoreError::Query(e.to_string()))?,
        })
    }
}

fn parse_kind(s: &str) -> Result<RunKind, StoreError> {
    match s {
        "agent" => Ok(RunKind::Agent),
        "workflow" => Ok(RunKind::Workflow),
        other => Err(StoreError::Query(format!("unknown run kind {other}"))),
    }
}

fn parse_status(s: &str) -> Result<RunStatus, StoreError> {
    match s {
        "pending" => Ok(RunStatus::Pending),
        "running" => Ok(RunStatus::Running),
        "completed" => Ok(RunStatus::Completed),
        "failed" => Ok(RunStatus::Failed),
        "stopped" => Ok(RunStatus::Stopped),
        other => Err(StoreError::Query(format!("unknown run status {other}"))),
    }
}

#[async_trait]
impl RunStore for PostgresStore {
    async fn create_run(&self, run: NewRun) -> Result<(), StoreError> {
        let params = serde_json::to_value(&run.params).map_err(|e| StoreError::Query(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO runs (id, kind, thread_id, project_id, params, agent_config, workflow_definition, created_at_ms, status, events)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', '[]')
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(run.id.as_str())
        .bind(run.kind.to_string())
        .bind(&run.thread_id)
        .bind(&run.project_id)
        .bind(params)
        .bind(&run.agent_config)
        .bind(&run.workflow_definition)
        .bind(run.created_at_ms as i64)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn mark_running(&self, run_id: &RunId) -> Result<(), StoreError> {
        sqlx::query("UPDATE runs SET status = 'running' WHERE id = $1 AND status = 'pending'")
            .bind(run_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
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
        let events_json = serde_json::to_value(&events).map_err(|e| StoreError::Query(e.to_string()))?;
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET status = $2, error = $3, events = $4, completed_at_ms = $5
            WHERE id = $1 AND completed_at_ms IS NULL
            "#,
        )
        .bind(run_id.as_str())
        .bind(status.to_string())
        .bind(&error)
        .bind(events_json)
        .bind(completed_at_ms as i64)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        if result.rows_affected() == 0 {
            // Either the row doesn't exist, or it was already frozen.
            match self.get_run(run_id).await? {
                Some(existing) if existing.is_frozen() => {
                    return Err(StoreError::AlreadyFrozen(run_id.as_str().to_string()))
                }
                Some(_) => return Err(StoreError::Query("terminal write affected no rows".into())),
                None => return Err(StoreError::NotFound(run_id.as_str().to_string())),
            }
        }
        Ok(())
    }

    async fn get_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError> {
        let row = sqlx::query("SELECT * FROM runs WHERE id = $1")
            .bind(run_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        row.as_ref().map(Self::row_to_run).transpose()
    }
}
