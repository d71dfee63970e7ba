//! Streaming-bus key and channel naming.
//!
//! Workflow runs may alias the `agent_run:*` key prefix via a caller-
//! supplied `agent_run_id`, so that subscribers use one URL pattern
//! regardless of trigger path (DESIGN NOTES "dual key namespace"). The
//! coordinator never hardcodes a prefix; it takes a [`StreamNamespace`]
//! at the boundary and fails fast if the caller has none to give it.

use crate::ids::{InstanceId, RunId};

/// The namespace a run's streaming-bus keys and channels live under.
///
/// Constructed explicitly, never defaulted — a workflow run with no
/// `agent_run_id` alias must fail at the boundary rather than silently
/// fall back to some guessed prefix (DESIGN NOTES, Open Questions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamNamespace(String);

impl StreamNamespace {
    /// Build a namespace from a run id (the common case: the namespace
    /// key equals the run's own id).
    pub fn for_run(run_id: &RunId) -> Self {
        Self(run_id.as_str().to_string())
    }

    /// Build a namespace from an explicit alias (the workflow path,
    /// where `agent_run_id` may differ from `execution_id`).
    pub fn from_alias(alias: impl Into<String>) -> Self {
        Self(alias.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn lock_key(&self) -> String {
        format!("run_lock:{}", self.0)
    }

    pub fn heartbeat_key(&self, instance_id: &InstanceId) -> String {
        format!("active_run:{}:{}", instance_id.as_str(), self.0)
    }

    pub fn responses_key(&self) -> String {
        format!("agent_run:{}:responses", self.0)
    }

    pub fn new_response_channel(&self) -> String {
        format!("agent_run:{}:new_response", self.0)
    }

    pub fn global_control_channel(&self) -> String {
        format!("agent_run:{}:control", self.0)
    }

    pub fn instance_control_channel(&self, instance_id: &InstanceId) -> String {
        format!("agent_run:{}:control:{}", self.0, instance_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_derived_namespace_names_all_keys_under_one_prefix() {
        let run_id = RunId::from_string("run-abc");
        let ns = StreamNamespace::for_run(&run_id);
        let inst = InstanceId::from_string("inst-1");
        assert_eq!(ns.lock_key(), "run_lock:run-abc");
        assert_eq!(ns.heartbeat_key(&inst), "active_run:inst-1:run-abc");
        assert_eq!(ns.responses_key(), "agent_run:run-abc:responses");
        assert_eq!(ns.new_response_channel(), "agent_run:run-abc:new_response");
        assert_eq!(ns.global_control_channel(), "agent_run:run-abc:control");
        assert_eq!(
            ns.instance_control_channel(&inst),
            "agent_run:run-abc:control:inst-1"
        );
    }

    #[test]
    fn aliased_namespace_uses_the_alias_not_the_execution_id() {
        let ns = StreamNamespace::from_alias("run-aliased");
        assert_eq!(ns.responses_key(), "agent_run:run-aliased:responses");
    }
}
