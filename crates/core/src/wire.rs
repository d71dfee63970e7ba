//! Task-broker message shapes. Thin serialization boundary, no logic —
//! mirrors the role `oj-wire` plays for the teacher's daemon protocol.

use crate::ids::RunId;
use crate::namespace::StreamNamespace;
use crate::run::{ModelParams, RunKind};
use serde::{Deserialize, Serialize};

/// A run-start job for an ad-hoc agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunStartJob {
    pub run_id: RunId,
    pub thread_id: String,
    /// Advisory only — the lock, not this hint, decides ownership.
    #[serde(default)]
    pub instance_id_hint: Option<String>,
    pub project_id: String,
    #[serde(flatten)]
    pub params: ModelParams,
    #[serde(default)]
    pub agent_config: Option<serde_json::Value>,
    #[serde(default)]
    pub is_agent_builder: bool,
    #[serde(default)]
    pub target_agent_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// A run-start job for a webhook-initiated workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunStartJob {
    pub execution_id: String,
    pub workflow_id: String,
    pub workflow_name: String,
    pub workflow_definition: serde_json::Value,
    #[serde(default)]
    pub variables: Option<serde_json::Value>,
    pub triggered_by: String,
    #[serde(default)]
    pub deterministic: bool,
    pub thread_id: String,
    pub project_id: String,
    #[serde(flatten)]
    pub params: ModelParams,
    /// The key-namespace alias: subscribers use the `agent_run:*` URL
    /// pattern regardless of trigger path. Mandatory — see
    /// DESIGN NOTES "dual key namespace" / "mandatory namespace".
    pub agent_run_id: String,
}

/// The two job shapes the broker can carry, unified behind one type so
/// the coordinator's claim/drive/cleanup path doesn't fork on kind.
#[derive(Debug, Clone)]
pub enum RunStartJob {
    Agent(AgentRunStartJob),
    Workflow(WorkflowRunStartJob),
}

impl RunStartJob {
    pub fn run_id(&self) -> RunId {
        match self {
            RunStartJob::Agent(job) => job.run_id.clone(),
            RunStartJob::Workflow(job) => RunId::from_string(job.execution_id.clone()),
        }
    }

    pub fn kind(&self) -> RunKind {
        match self {
            RunStartJob::Agent(_) => RunKind::Agent,
            RunStartJob::Workflow(_) => RunKind::Workflow,
        }
    }

    /// The stream namespace this job's events publish under. Workflow
    /// jobs must carry a non-empty `agent_run_id` alias; agent jobs
    /// namespace on their own run id.
    pub fn stream_namespace(&self) -> Result<StreamNamespace, MissingNamespace> {
        match self {
            RunStartJob::Agent(job) => Ok(StreamNamespace::for_run(&job.run_id)),
            RunStartJob::Workflow(job) => {
                if job.agent_run_id.trim().is_empty() {
                    Err(MissingNamespace {
                        execution_id: job.execution_id.clone(),
                    })
                } else {
                    Ok(StreamNamespace::from_alias(job.agent_run_id.clone()))
                }
            }
        }
    }
}

/// A workflow run-start job carried no `agent_run_id` alias. Per the
/// spec's Open Questions, this must fail fast rather than guess at a
/// fallback namespace.
#[derive(Debug, Clone, thiserror::Error)]
#[error("workflow execution {execution_id} has no agent_run_id namespace alias")]
pub struct MissingNamespace {
    pub execution_id: String,
}
