//! Agent Runner (spec §4.5) and the capability contract it wraps (spec §6).

mod capability;
mod runner;

pub use capability::{AgentCapability, AgentResponse};
pub use runner::{AgentOutcome, AgentRunner};
