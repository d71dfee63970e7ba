//! Wire encoding for run-start jobs: one JSON envelope tagged by kind,
//! since `RunStartJob` itself carries no serde derive (it's a thin
//! runtime union, not a wire type).

use crate::BrokerError;
use orc_core::{AgentRunStartJob, RunStartJob, WorkflowRunStartJob};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WireJob {
    Agent(AgentRunStartJob),
    Workflow(WorkflowRunStartJob),
}

pub fn encode(job: &RunStartJob) -> Result<String, BrokerError> {
    let wire = match job {
        RunStartJob::Agent(j) => WireJob::Agent(j.clone()),
        RunStartJob::Workflow(j) => WireJob::Workflow(j.clone()),
    };
    serde_json::to_string(&wire).map_err(|e| BrokerError::MalformedJob(e.to_string()))
}

pub fn decode(payload: &str) -> Result<RunStartJob, BrokerError> {
    let wire: WireJob =
        serde_json::from_str(payload).map_err(|e| BrokerError::MalformedJob(e.to_string()))?;
    Ok(match wire {
        WireJob::Agent(j) => RunStartJob::Agent(j),
        WireJob::Workflow(j) => RunStartJob::Workflow(j),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_core::ModelParams;

    fn params() -> ModelParams {
        ModelParams {
            model_name: "m".into(),
            enable_thinking: false,
            reasoning_effort: None,
            stream: true,
            enable_context_manager: false,
        }
    }

    #[test]
    fn agent_job_roundtrips_through_the_wire_envelope() {
        let job = RunStartJob::Agent(AgentRunStartJob {
            run_id: orc_core::RunId::from_string("run-1"),
            thread_id: "t".into(),
            instance_id_hint: None,
            project_id: "p".into(),
            params: params(),
            agent_config: None,
            is_agent_builder: false,
            target_agent_id: None,
            request_id: None,
        });
        let encoded = encode(&job).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.run_id().as_str(), "run-1");
    }
}
