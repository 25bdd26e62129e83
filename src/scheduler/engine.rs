//! Scheduler / Execution Engine (spec §4.6 "Scheduler algorithm", §5).
//!
//! A single-threaded cooperative event loop: at each super-step it runs
//! every currently-ready node concurrently (bounded by
//! `max_parallel_agents`), merges their patches through the field-sorted
//! reducer path, and computes the next ready set from the updated state.
//! Concurrency comes entirely from `.await` yielding at I/O boundaries, not
//! from OS threads — mirroring spec §5's scheduling model.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::graph::{Graph, NodeId};
use crate::state::reducers::{apply_patch, StatePatch};
use crate::state::trace::TraceEvent;
use crate::state::RunState;

/// Why the scheduler stopped running super-steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The frontier emptied normally (every branch reached a terminal node).
    Converged,
    /// `config.execution_timeout` elapsed before convergence.
    DeadlineBreached,
    /// `config.recursion_limit` (total node visits) would be exceeded.
    RecursionBreached,
}

pub struct ScheduleOutcome {
    pub state: RunState,
    pub stop_reason: StopReason,
}

/// Runs `graph` to convergence (or until a resource bound is hit), starting
/// from `state`. Never panics on a node failure — failures are recorded in
/// the trace and the run proceeds (spec §7 "Propagation policy").
pub async fn run(graph: &Graph, mut state: RunState, config: &EngineConfig) -> ScheduleOutcome {
    let deadline = tokio::time::Instant::now() + config.execution_timeout;
    let semaphore = std::sync::Arc::new(Semaphore::new(config.max_parallel_agents.max(1) as usize));

    let mut arrivals: HashMap<NodeId, usize> = HashMap::new();
    let mut frontier: Vec<NodeId> = graph.start_successors.clone();
    let mut visited: u32 = 0;

    loop {
        if frontier.is_empty() {
            info!("scheduler converged: frontier empty");
            return ScheduleOutcome {
                state,
                stop_reason: StopReason::Converged,
            };
        }

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            warn!("scheduler deadline breached before next super-step");
            return ScheduleOutcome {
                state,
                stop_reason: StopReason::DeadlineBreached,
            };
        }

        if visited + frontier.len() as u32 > config.recursion_limit {
            warn!(visited, frontier = frontier.len(), "scheduler recursion limit would be exceeded");
            return ScheduleOutcome {
                state,
                stop_reason: StopReason::RecursionBreached,
            };
        }

        let batch: Vec<NodeId> = {
            let mut seen = std::collections::HashSet::new();
            frontier.drain(..).filter(|n| seen.insert(*n)).collect()
        };
        debug!(?batch, "dispatching super-step");

        let run_batch = async {
            let mut futures = Vec::with_capacity(batch.len());
            for node_id in &batch {
                let node = graph.nodes.get(node_id).expect("graph has a node for every NodeId in its own edges").clone();
                let snapshot = state.clone();
                let permit = semaphore.clone().acquire_owned();
                let node_id = *node_id;
                futures.push(async move {
                    let _permit = permit.await.expect("semaphore is never closed");
                    let start = Utc::now();
                    let output = node.execute(&snapshot).await;
                    let end = Utc::now();
                    (node_id, output, start, end)
                });
            }
            futures::future::join_all(futures).await
        };

        let results = match tokio::time::timeout(remaining, run_batch).await {
            Ok(results) => results,
            Err(_) => {
                warn!("scheduler deadline breached mid super-step; in-flight patches discarded");
                return ScheduleOutcome {
                    state,
                    stop_reason: StopReason::DeadlineBreached,
                };
            }
        };

        visited += results.len() as u32;

        let mut combined = StatePatch::empty();
        for (node_id, output, start, end) in &results {
            combined = combined.merge_with(output.patch.clone());
            combined.trace_events.push(TraceEvent {
                node: node_id.as_trace_name(),
                start: *start,
                end: *end,
                status: output.status,
                error_kind: output.error_kind.clone(),
                tokens: None,
            });
        }
        let outcome = apply_patch(&mut state, combined);
        if !outcome.is_clean() {
            debug!(rejected = ?outcome.rejected_fields, "patch fields rejected by reducers");
        }

        let mut next_frontier = Vec::new();
        for (node_id, _output, _start, _end) in &results {
            for successor in graph.successors(*node_id, &state) {
                let required = graph.required_arrivals.get(&successor).copied().unwrap_or(1);
                let count = arrivals.entry(successor).or_insert(0);
                *count += 1;
                if *count >= required {
                    next_frontier.push(successor);
                    *count = 0;
                }
            }
        }
        frontier = next_frontier;
    }
}

/// Produces a deterministic fallback decision when the scheduler stops
/// before the pipeline reaches `RiskJudge` (spec §4.6, §4.8, §7).
pub fn deadline_fallback_reason(stop_reason: StopReason) -> &'static str {
    match stop_reason {
        StopReason::Converged => "",
        StopReason::DeadlineBreached => "execution deadline exceeded before a decision was reached",
        StopReason::RecursionBreached => "node-visit budget exhausted before a decision was reached",
    }
}

pub const DEFAULT_TOOL_TIMEOUT_MARGIN: Duration = Duration::from_millis(0);
