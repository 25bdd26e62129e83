//! Graph Builder (spec §4.6) and the nodes it wires together.

pub mod builder;
pub mod dispatch;
pub mod node;

pub use builder::{default_tool_visibility, AgentSet, Graph, GraphBuilder};
pub use node::{Node, NodeId, NodeOutput};
