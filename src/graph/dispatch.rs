//! Dispatcher & Aggregator Nodes (spec §2, §4.6): synthetic nodes marking
//! the fan-out and fan-in boundaries of the analyst and risk parallel
//! regions. Dispatchers seed per-branch sub-state; aggregators verify
//! completeness at join points and synthesize deterministic fallbacks for
//! any branch that produced no data (spec §8 "Zero successful tool results
//! for an analyst").

use async_trait::async_trait;

use crate::state::{reducers::StatePatch, AnalystKind, Message, RiskPerspective, RunState};

use super::node::{Node, NodeId, NodeOutput};

/// Seeds each analyst's channel with a system prompt and the run's ticker
/// and trade date, so every branch starts from identical, deterministic
/// input (spec §2 "Dispatcher").
pub struct DispatcherNode;

#[async_trait]
impl Node for DispatcherNode {
    fn id(&self) -> NodeId {
        NodeId::Dispatcher
    }

    async fn execute(&self, state: &RunState) -> NodeOutput {
        let mut patch = StatePatch::empty();
        for kind in AnalystKind::ALL {
            if !state.channels.get(&kind).map(|c| !c.messages.is_empty()).unwrap_or(false) {
                patch.channel_appends.insert(
                    kind,
                    vec![
                        Message::system(format!("You are the {kind} analyst.")),
                        Message::user(format!(
                            "Analyze {} for trade date {}.",
                            state.ticker, state.trade_date
                        )),
                    ],
                );
            }
        }
        NodeOutput::success(patch)
    }
}

/// Fan-in barrier for the four analyst branches. Any analyst kind without a
/// populated report at this point gets a deterministic fallback so the
/// pipeline can proceed (spec §4.4, §7, §8).
pub struct AggregatorNode;

#[async_trait]
impl Node for AggregatorNode {
    fn id(&self) -> NodeId {
        NodeId::Aggregator
    }

    async fn execute(&self, state: &RunState) -> NodeOutput {
        let mut patch = StatePatch::empty();
        for kind in AnalystKind::ALL {
            if !state.report_complete(kind) {
                patch.reports.insert(
                    kind,
                    format!("No {kind} data available; analysis could not be completed within budget."),
                );
            }
        }
        NodeOutput::success(patch)
    }
}

/// Structural fan-out boundary into the three risk perspectives. No sub-state
/// beyond what the Trader already produced is required, so this is a no-op
/// patch that exists purely to make the fan-out visible in the trace.
pub struct RiskDispatcherNode;

#[async_trait]
impl Node for RiskDispatcherNode {
    fn id(&self) -> NodeId {
        NodeId::RiskDispatcher
    }

    async fn execute(&self, _state: &RunState) -> NodeOutput {
        NodeOutput::success(StatePatch::empty())
    }
}

/// Fan-in barrier for the three risk-perspective branches.
pub struct RiskAggregatorNode;

#[async_trait]
impl Node for RiskAggregatorNode {
    fn id(&self) -> NodeId {
        NodeId::RiskAggregator
    }

    async fn execute(&self, state: &RunState) -> NodeOutput {
        let mut patch = StatePatch::empty();
        for perspective in RiskPerspective::ALL {
            if state.risk_debate.response_for(perspective).is_none() {
                patch.risk_responses.insert(
                    perspective,
                    format!("{perspective} perspective unavailable; no objection raised."),
                );
            }
        }
        NodeOutput::success(patch)
    }
}
