#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Conclave
//!
//! Execution engine for a multi-agent trading-analysis orchestrator: a
//! stateful directed graph that coordinates specialist analyst agents, a
//! bull/bear debate, a trader, and a three-perspective risk review into one
//! `BUY`/`SELL`/`HOLD` decision.
//!
//! `conclave` owns the graph, the shared run state and its reducers, the
//! tool-invocation contract (quotas, dedup, caching), and the resilience
//! layer wrapping every external call. It does not own agent prompts, an LLM
//! client, or data-source adapters — those are supplied by the caller
//! through [`agent::AgentCapability`] and [`tools::ToolHandler`].
//!
//! ## Entry point
//!
//! [`coordinator::analyze`] is the only fallible entry point; once input
//! validation passes, a run always completes with a classified decision —
//! failures downgrade to a `HOLD` with the reason recorded in the trace
//! rather than propagating as an error.

/// Immutable, environment- and caller-overridable configuration.
pub mod config;

/// Bull/bear debate continuation policy and focus-hint routing.
pub mod debate;

/// Error types: [`error::ConclaveError`] (control-plane) and
/// [`error::FailureKind`]/[`error::ClassifiedFailure`] (data-plane).
pub mod error;

/// `tracing_subscriber` initializers.
pub mod logging;

/// Resilience primitives: retry, circuit breaker, timeout, bounded cache,
/// fallback composition.
pub mod resilience;

/// Shared run state, message channels, ledgers, and field reducers.
pub mod state;

/// Tool registry, argument canonicalization/hashing, and the invoker
/// contract.
pub mod tools;

/// The agent capability seam and the runner that wraps it with a timeout.
pub mod agent;

/// Graph nodes and the builder that wires them into the fixed pipeline.
pub mod graph;

/// The Pregel-style scheduler that drives a graph to convergence.
pub mod scheduler;

/// The public entry point: [`coordinator::analyze`].
pub mod coordinator;

pub use agent::{AgentCapability, AgentResponse};
pub use config::{AnalyzeOptions, EngineConfig};
pub use coordinator::{analyze, AnalyzeResult, RunInputs};
pub use error::{ClassifiedFailure, ConclaveError, FailureKind};
pub use graph::{AgentSet, GraphBuilder};
pub use tools::{ToolDescriptor, ToolHandler, ToolRegistry};
