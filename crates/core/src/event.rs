//! Response events emitted by an [`EventProducer`](crate) and the control
//! signals coordinators exchange over the streaming bus.
//!
//! A response event is an opaque JSON object. The orchestrator inspects
//! only `type`, and when `type` is a terminal-status sentinel, the
//! `status`/`message`/`error` fields — everything else is forwarded
//! verbatim. Agent runs use the sentinel `"status"`; workflow runs use
//! `"workflow_status"` (see DESIGN NOTES "two event-type sentinels").

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The terminal status carried by a producer's own status event, distinct
/// from [`crate::run::RunStatus`] in that it additionally admits `Error`
/// (an EP-reported failure that has not yet been mapped onto the run).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Completed,
    Failed,
    Stopped,
    Error,
}

impl TerminalStatus {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "stopped" => Some(Self::Stopped),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// An opaque JSON event in a run's ordered log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseEvent(pub Value);

impl ResponseEvent {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn type_tag(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    /// Whether this event's `type` is one of the two terminal-status
    /// sentinels (`"status"` for agent runs, `"workflow_status"` for
    /// workflow runs).
    pub fn is_status_sentinel(&self) -> bool {
        matches!(self.type_tag(), Some("status") | Some("workflow_status"))
    }

    /// If this event is a terminal status event, the terminal status it
    /// carries and an optional human-readable message/error.
    pub fn terminal_status(&self) -> Option<(TerminalStatus, Option<String>)> {
        if !self.is_status_sentinel() {
            return None;
        }
        let status = self.0.get("status").and_then(Value::as_str)?;
        let status = TerminalStatus::from_str(status)?;
        let message = self
            .0
            .get("message")
            .or_else(|| self.0.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Some((status, message))
    }

    /// Build a synthetic completion event, used when a producer's
    /// sequence ends without ever emitting a terminal status event. The
    /// sentinel tag follows `kind`: agent runs get `"status"`, workflow
    /// runs get `"workflow_status"`.
    pub fn synthetic_completed(kind: crate::run::RunKind, message: &str) -> Self {
        let type_tag = match kind {
            crate::run::RunKind::Agent => "status",
            crate::run::RunKind::Workflow => "workflow_status",
        };
        Self(serde_json::json!({
            "type": type_tag,
            "status": "completed",
            "message": message,
        }))
    }

    /// Build a synthetic error event for an uncaught producer failure.
    /// Same sentinel-by-kind rule as [`ResponseEvent::synthetic_completed`].
    pub fn synthetic_error(kind: crate::run::RunKind, message: &str) -> Self {
        let type_tag = match kind {
            crate::run::RunKind::Agent => "status",
            crate::run::RunKind::Workflow => "workflow_status",
        };
        Self(serde_json::json!({
            "type": type_tag,
            "status": "error",
            "message": message,
        }))
    }
}

/// Literal ASCII payloads published on control channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Stop,
    EndStream,
    Error,
}

impl ControlSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlSignal::Stop => "STOP",
            ControlSignal::EndStream => "END_STREAM",
            ControlSignal::Error => "ERROR",
        }
    }

    pub fn parse(payload: &str) -> Option<Self> {
        match payload {
            "STOP" => Some(ControlSignal::Stop),
            "END_STREAM" => Some(ControlSignal::EndStream),
            "ERROR" => Some(ControlSignal::Error),
            _ => None,
        }
    }

    /// The broadcast signal for a given final run status.
    pub fn for_final_status(status: crate::run::RunStatus) -> Self {
        match status {
            crate::run::RunStatus::Completed => ControlSignal::EndStream,
            crate::run::RunStatus::Failed => ControlSignal::Error,
            crate::run::RunStatus::Stopped => ControlSignal::Stop,
            crate::run::RunStatus::Pending | crate::run::RunStatus::Running => {
                unreachable!("for_final_status called with a non-terminal status")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        completed = { "completed", TerminalStatus::Completed },
        failed = { "failed", TerminalStatus::Failed },
        stopped = { "stopped", TerminalStatus::Stopped },
        error = { "error", TerminalStatus::Error },
    )]
    fn status_event_recognized(status: &str, expected: TerminalStatus) {
        let event = ResponseEvent::new(serde_json::json!({
            "type": "status",
            "status": status,
            "message": "done",
        }));
        let (got, message) = event.terminal_status().unwrap();
        assert_eq!(got, expected);
        assert_eq!(message.as_deref(), Some("done"));
    }

    #[test]
    fn workflow_status_sentinel_recognized() {
        let event = ResponseEvent::new(serde_json::json!({
            "type": "workflow_status",
            "status": "failed",
            "error": "boom",
        }));
        let (status, message) = event.terminal_status().unwrap();
        assert_eq!(status, TerminalStatus::Failed);
        assert_eq!(message.as_deref(), Some("boom"));
    }

    #[test]
    fn non_status_event_is_not_terminal() {
        let event = ResponseEvent::new(serde_json::json!({"type": "assistant", "text": "hi"}));
        assert!(event.terminal_status().is_none());
    }

    #[test]
    fn unrecognized_status_value_is_not_terminal() {
        let event = ResponseEvent::new(serde_json::json!({"type": "status", "status": "paused"}));
        assert!(event.terminal_status().is_none());
    }

    #[test]
    fn control_signal_roundtrips_ascii_payload() {
        for sig in [ControlSignal::Stop, ControlSignal::EndStream, ControlSignal::Error] {
            assert_eq!(ControlSignal::parse(sig.as_str()), Some(sig));
        }
    }
}
