//! Scheduler / Execution Engine (spec §4.6, §5): drives a [`crate::graph::Graph`]
//! to convergence over a [`crate::state::RunState`].

pub mod engine;

pub use engine::{run, ScheduleOutcome, StopReason};
