//! Agent Runner (spec §4.5): the generic adapter turning an agent
//! capability into something a graph node can call, with a timeout and a
//! uniform failure boundary.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::resilience::with_timeout;
use crate::state::Message;

use super::capability::{AgentCapability, AgentResponse};

/// The outcome of one agent invocation, after the timeout boundary has been
/// applied. `TimedOut` is distinct from a capability-reported failure: per
/// spec §4.5 step 6, the Agent Runner always enforces its own timeout rather
/// than trusting the capability to respect one.
pub enum AgentOutcome {
    Final(String),
    ToolRequests(Vec<crate::state::ToolRequest>),
    TimedOut,
    CapabilityFailed,
}

/// Wraps one [`AgentCapability`] with a per-call timeout (spec §4.5 step 6:
/// "always enforces an agent-level timeout").
pub struct AgentRunner {
    pub capability: Arc<dyn AgentCapability>,
    pub timeout: Duration,
}

impl AgentRunner {
    pub fn new(capability: Arc<dyn AgentCapability>, timeout: Duration) -> Self {
        Self { capability, timeout }
    }

    pub async fn invoke(
        &self,
        agent_name: &str,
        messages: &[Message],
        tool_schemas: &[serde_json::Value],
    ) -> AgentOutcome {
        let capability = self.capability.clone();
        let result = with_timeout(self.timeout, agent_name, async move {
            capability.invoke(messages, tool_schemas).await
        })
        .await;

        match result {
            Ok(AgentResponse::Final { text }) => AgentOutcome::Final(text),
            Ok(AgentResponse::ToolRequests { requests }) => AgentOutcome::ToolRequests(requests),
            Err(failure) if failure.kind == crate::error::FailureKind::Timeout => {
                warn!(agent = agent_name, "agent invocation timed out");
                AgentOutcome::TimedOut
            }
            Err(failure) => {
                warn!(agent = agent_name, kind = ?failure.kind, "agent capability failed");
                AgentOutcome::CapabilityFailed
            }
        }
    }
}
