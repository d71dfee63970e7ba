//! Identifiers for runs and worker instances.

crate::define_id! {
    /// Unique identifier for a run (agent run or workflow execution).
    pub struct RunId("run-");
}

crate::define_id! {
    /// Unique identifier for a worker process instance.
    ///
    /// Distinct from [`RunId`] ownership: the instance id names *who* may
    /// hold a run's lock, not the run itself.
    pub struct InstanceId("inst-");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrips_through_string() {
        let id = RunId::new();
        let parsed = RunId::from_string(id.as_str());
        assert_eq!(id, parsed);
    }

    #[test]
    fn run_id_has_expected_prefix() {
        let id = RunId::new();
        assert!(id.as_str().starts_with("run-"));
    }

    #[test]
    fn instance_id_has_expected_prefix() {
        let id = InstanceId::new();
        assert!(id.as_str().starts_with("inst-"));
    }
}
