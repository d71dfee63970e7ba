//! Run identifier, kind, and the monotone status state machine.

use crate::event::ResponseEvent;
use crate::ids::RunId;
use serde::{Deserialize, Serialize};

/// Which trigger path produced this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Agent,
    Workflow,
}

crate::simple_display! {
    RunKind {
        Agent => "agent",
        Workflow => "workflow",
    }
}

/// Status of a run. Transitions are monotone through a DAG:
/// `Pending -> Running -> {Completed | Failed | Stopped}`. No backward
/// transition is ever valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

crate::simple_display! {
    RunStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Stopped => "stopped",
    }
}

impl RunStatus {
    /// Terminal statuses are frozen: once written with a completion
    /// timestamp, the row never changes again.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Stopped)
    }

    /// Whether `self -> next` is a legal transition in the status DAG.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Pending, Stopped)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Stopped)
        )
    }
}

/// Model parameters carried on every run, independent of kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    pub model_name: String,
    #[serde(default)]
    pub enable_thinking: bool,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub enable_context_manager: bool,
}

/// A unit of work: an agent run or a workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub kind: RunKind,
    pub thread_id: String,
    pub project_id: String,
    pub params: ModelParams,
    #[serde(default)]
    pub agent_config: Option<serde_json::Value>,
    #[serde(default)]
    pub workflow_definition: Option<serde_json::Value>,
    pub created_at_ms: u64,
    pub status: RunStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub completed_at_ms: Option<u64>,
    #[serde(default)]
    pub events: Vec<ResponseEvent>,
}

impl Run {
    /// The row is immutable once a terminal status has a completion
    /// timestamp attached.
    pub fn is_frozen(&self) -> bool {
        self.status.is_terminal() && self.completed_at_ms.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_advance_to_running() {
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Running));
    }

    #[test]
    fn running_can_advance_to_any_terminal_status() {
        assert!(RunStatus::Running.can_transition_to(RunStatus::Completed));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Failed));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Stopped));
    }

    #[test]
    fn terminal_statuses_never_advance() {
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Failed.can_transition_to(RunStatus::Completed));
        assert!(!RunStatus::Stopped.can_transition_to(RunStatus::Failed));
    }

    #[test]
    fn pending_cannot_skip_backward_or_sideways_from_terminal() {
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Pending));
    }
}
