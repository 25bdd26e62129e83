//! The agent capability contract (spec §6 "Agent capability (consumed)").
//!
//! `conclave` is agent-content-agnostic: the natural-language prompting each
//! agent uses is explicitly out of scope (spec §1). This trait is the single
//! seam through which an LLM provider — or a test double — is plugged in.

use async_trait::async_trait;

use crate::error::ClassifiedFailure;
use crate::state::{Message, ToolRequest};

/// What an [`AgentCapability`] returns for one invocation.
#[derive(Debug, Clone)]
pub enum AgentResponse {
    /// A final textual answer; no further tool calls requested.
    Final { text: String },
    /// The agent wants to invoke one or more tools before answering.
    ToolRequests { requests: Vec<ToolRequest> },
}

/// Given a message list and the tool schemas visible to this agent, return
/// either a final textual answer or a list of tool-invocation requests.
/// Implementations must be safe to call concurrently for distinct agents
/// (spec §6).
#[async_trait]
pub trait AgentCapability: Send + Sync {
    async fn invoke(
        &self,
        messages: &[Message],
        tool_schemas: &[serde_json::Value],
    ) -> Result<AgentResponse, ClassifiedFailure>;
}
