//! Graph nodes (spec §4.5, §4.6, §4.7): the concrete units the Scheduler
//! executes. Dispatcher/Aggregator nodes live in [`super::dispatch`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::{AgentOutcome, AgentRunner};
use crate::debate;
use crate::error::FailureKind;
use crate::state::{
    reducers::{DebateDelta, StatePatch},
    AnalystKind, Message, RiskPerspective, RunState, TraceStatus,
};
use crate::tools::{EnvelopeStatus, ToolInvoker, ToolRegistry};

/// Identifies a node in the concrete pipeline (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeId {
    Dispatcher,
    Analyst(AnalystKind),
    Tools(AnalystKind),
    Aggregator,
    Bull,
    Bear,
    DebateJudge,
    ResearchManager,
    Trader,
    RiskDispatcher,
    Risk(RiskPerspective),
    RiskAggregator,
    RiskJudge,
}

impl NodeId {
    pub fn as_trace_name(&self) -> String {
        match self {
            NodeId::Dispatcher => "dispatcher".to_string(),
            NodeId::Analyst(kind) => format!("analyst.{kind}"),
            NodeId::Tools(kind) => format!("tools.{kind}"),
            NodeId::Aggregator => "aggregator".to_string(),
            NodeId::Bull => "debate.bull".to_string(),
            NodeId::Bear => "debate.bear".to_string(),
            NodeId::DebateJudge => "debate.judge".to_string(),
            NodeId::ResearchManager => "research_manager".to_string(),
            NodeId::Trader => "trader".to_string(),
            NodeId::RiskDispatcher => "risk_dispatcher".to_string(),
            NodeId::Risk(perspective) => format!("risk.{perspective}"),
            NodeId::RiskAggregator => "risk_aggregator".to_string(),
            NodeId::RiskJudge => "risk_judge".to_string(),
        }
    }
}

/// What a node hands back to the Scheduler: a patch plus the status to
/// record in the Run Trace (spec §6 "Trace schema").
pub struct NodeOutput {
    pub patch: StatePatch,
    pub status: TraceStatus,
    pub error_kind: Option<FailureKind>,
}

impl NodeOutput {
    pub fn success(patch: StatePatch) -> Self {
        Self {
            patch,
            status: TraceStatus::Success,
            error_kind: None,
        }
    }

    pub fn timeout(patch: StatePatch) -> Self {
        Self {
            patch,
            status: TraceStatus::Timeout,
            error_kind: Some(FailureKind::Timeout),
        }
    }

    pub fn error(patch: StatePatch, kind: FailureKind) -> Self {
        Self {
            patch,
            status: TraceStatus::Error,
            error_kind: Some(kind),
        }
    }
}

#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> NodeId;
    async fn execute(&self, state: &RunState) -> NodeOutput;
}

fn deterministic_fallback_report(kind: AnalystKind) -> String {
    format!(
        "No {kind} data available; analysis could not be completed within budget. This report was synthesized from a fallback."
    )
}

fn synthesize_report_from_tool_results(channel: &crate::state::MessageChannel, kind: AnalystKind) -> String {
    let tool_contents: Vec<&str> = channel
        .messages
        .iter()
        .filter(|m| m.role == crate::state::Role::Tool)
        .map(|m| m.content.as_str())
        .collect();
    if tool_contents.is_empty() {
        deterministic_fallback_report(kind)
    } else {
        format!(
            "Synthesized {kind} report from available data (quota reached): {}",
            tool_contents.join("; ")
        )
    }
}

/// Wraps one analyst's agent-runner + visible tool set into a node (spec
/// §4.5).
pub struct AnalystNode {
    pub kind: AnalystKind,
    pub runner: AgentRunner,
    pub tool_names: Vec<String>,
    pub registry: Arc<ToolRegistry>,
    pub quota: u32,
}

#[async_trait]
impl Node for AnalystNode {
    fn id(&self) -> NodeId {
        NodeId::Analyst(self.kind)
    }

    async fn execute(&self, state: &RunState) -> NodeOutput {
        if state.report_complete(self.kind) {
            return NodeOutput::success(StatePatch::empty());
        }

        let channel = state.channels.get(&self.kind).cloned().unwrap_or_default();
        let ledger_total = state.ledger_total(self.kind);

        if ledger_total >= self.quota {
            let report = synthesize_report_from_tool_results(&channel, self.kind);
            let mut patch = StatePatch::empty();
            patch.reports.insert(self.kind, report.clone());
            patch
                .channel_appends
                .insert(self.kind, vec![Message::assistant_text(report)]);
            return NodeOutput::success(patch);
        }

        let names: Vec<&str> = self.tool_names.iter().map(String::as_str).collect();
        let schemas = self.registry.schemas_for(&names);
        let node_name = self.id().as_trace_name();
        let outcome = self.runner.invoke(&node_name, &channel.messages, &schemas).await;

        match outcome {
            AgentOutcome::Final(text) => {
                let has_tool_result = channel.messages.iter().any(|m| m.role == crate::state::Role::Tool);
                let configured_for_direct_response = self.tool_names.is_empty();
                if has_tool_result || configured_for_direct_response {
                    let mut patch = StatePatch::empty();
                    patch.reports.insert(self.kind, text.clone());
                    patch
                        .channel_appends
                        .insert(self.kind, vec![Message::assistant_text(text)]);
                    NodeOutput::success(patch)
                } else {
                    // Agent answered without ever consulting its tools; the
                    // join point's fallback (spec §8 "Zero successful tool
                    // results for an analyst") fills the report instead of
                    // accepting an unsupported direct answer.
                    NodeOutput::success(StatePatch::empty())
                }
            }
            AgentOutcome::ToolRequests(requests) => {
                let mut patch = StatePatch::empty();
                patch
                    .channel_appends
                    .insert(self.kind, vec![Message::assistant_tool_requests(requests)]);
                NodeOutput::success(patch)
            }
            AgentOutcome::TimedOut => {
                let fallback = deterministic_fallback_report(self.kind);
                let mut patch = StatePatch::empty();
                patch.reports.insert(self.kind, fallback.clone());
                patch
                    .channel_appends
                    .insert(self.kind, vec![Message::assistant_text(fallback)]);
                NodeOutput::timeout(patch)
            }
            AgentOutcome::CapabilityFailed => {
                let fallback = deterministic_fallback_report(self.kind);
                let mut patch = StatePatch::empty();
                patch.reports.insert(self.kind, fallback.clone());
                patch
                    .channel_appends
                    .insert(self.kind, vec![Message::assistant_text(fallback)]);
                NodeOutput::error(patch, FailureKind::ApiError)
            }
        }
    }
}

/// Drives the tool invoker for every pending request in an analyst's last
/// assistant message (spec §4.2, §4.6 "tools → analyst unconditionally").
pub struct ToolsNode {
    pub kind: AnalystKind,
    pub invoker: Arc<ToolInvoker>,
    pub quota: u32,
}

#[async_trait]
impl Node for ToolsNode {
    fn id(&self) -> NodeId {
        NodeId::Tools(self.kind)
    }

    async fn execute(&self, state: &RunState) -> NodeOutput {
        let channel = state.channels.get(&self.kind).cloned().unwrap_or_default();
        let requests = channel
            .last_assistant_tool_requests()
            .map(|r| r.to_vec())
            .unwrap_or_default();
        if requests.is_empty() {
            return NodeOutput::success(StatePatch::empty());
        }

        let mut ledger = state.ledgers.get(&self.kind).cloned().unwrap_or_default();
        let mut messages = Vec::new();
        let mut ledger_records = Vec::new();
        let mut first_failure = None;

        for request in &requests {
            let outcome = self.invoker.invoke(request, &ledger, self.quota).await;
            if let Some((tool, hash)) = &outcome.ledger_record {
                ledger.record(tool, hash);
                ledger_records.push((self.kind, tool.clone(), hash.clone()));
            }
            if outcome.envelope.status == EnvelopeStatus::Error && first_failure.is_none() {
                first_failure = outcome.envelope.failure.as_ref().map(|f| f.kind.clone());
            }
            let content = outcome.envelope.content.to_string();
            let summary = format!("[{:?}] {}", outcome.envelope.status, content);
            messages.push(Message::tool_result(outcome.envelope.correlation_id.clone(), summary));
        }

        let mut patch = StatePatch::empty();
        patch.channel_appends.insert(self.kind, messages);
        patch.ledger_records = ledger_records;

        match first_failure {
            Some(kind) => NodeOutput::error(patch, kind),
            None => NodeOutput::success(patch),
        }
    }
}

fn debate_prompt(state: &RunState, role: &str) -> Vec<Message> {
    let mut messages = vec![Message::system(format!("You are the {role} researcher."))];
    for line in &state.debate.transcript {
        messages.push(Message::user(line.clone()));
    }
    if let Some(focus) = &state.debate.next_round_focus {
        messages.push(Message::user(format!("Focus this round on: {focus}")));
    }
    messages
}

pub struct BullNode {
    pub runner: AgentRunner,
}

#[async_trait]
impl Node for BullNode {
    fn id(&self) -> NodeId {
        NodeId::Bull
    }

    async fn execute(&self, state: &RunState) -> NodeOutput {
        let messages = debate_prompt(state, "bull");
        let outcome = self.runner.invoke("debate.bull", &messages, &[]).await;
        let text = match outcome {
            AgentOutcome::Final(text) => text,
            _ => "Bull case unavailable this round.".to_string(),
        };
        let mut patch = StatePatch::empty();
        patch.debate = Some(DebateDelta {
            bull_says: Some(text.clone()),
            transcript_append: vec![format!("Bull: {text}")],
            ..Default::default()
        });
        NodeOutput::success(patch)
    }
}

pub struct BearNode {
    pub runner: AgentRunner,
}

#[async_trait]
impl Node for BearNode {
    fn id(&self) -> NodeId {
        NodeId::Bear
    }

    async fn execute(&self, state: &RunState) -> NodeOutput {
        let messages = debate_prompt(state, "bear");
        let outcome = self.runner.invoke("debate.bear", &messages, &[]).await;
        let text = match outcome {
            AgentOutcome::Final(text) => text,
            _ => "Bear case unavailable this round.".to_string(),
        };
        let mut patch = StatePatch::empty();
        patch.debate = Some(DebateDelta {
            bear_says: Some(text.clone()),
            transcript_append: vec![format!("Bear: {text}")],
            ..Default::default()
        });
        NodeOutput::success(patch)
    }
}

/// Parses a judge response expressed as `{"score": f64, "feedback": str}`
/// JSON, falling back to a neutral score if the text isn't in that shape.
fn parse_judge_response(text: &str) -> (f64, String) {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => {
            let score = value.get("score").and_then(|v| v.as_f64()).unwrap_or(5.0);
            let feedback = value
                .get("feedback")
                .and_then(|v| v.as_str())
                .unwrap_or(text)
                .to_string();
            (score, feedback)
        }
        Err(_) => (5.0, text.to_string()),
    }
}

/// Scores the combined bull/bear exchange each round (spec §4.7: "a
/// judge-assigned numeric quality score for the combined exchange").
pub struct DebateJudgeNode {
    pub runner: AgentRunner,
    pub focus_table: Vec<(String, Vec<String>)>,
    pub early_consensus_threshold: f64,
}

#[async_trait]
impl Node for DebateJudgeNode {
    fn id(&self) -> NodeId {
        NodeId::DebateJudge
    }

    async fn execute(&self, state: &RunState) -> NodeOutput {
        let messages = debate_prompt(state, "debate judge");
        let outcome = self.runner.invoke("debate.judge", &messages, &[]).await;
        let (score, feedback) = match outcome {
            AgentOutcome::Final(text) => parse_judge_response(&text),
            _ => (5.0, "judge unavailable this round".to_string()),
        };
        let focus = debate::route_focus(&feedback, &self.focus_table);
        let mut patch = StatePatch::empty();
        patch.debate = Some(DebateDelta {
            quality_score: Some(score),
            judge_feedback: Some(feedback),
            advance_round: true,
            next_round_focus: Some(focus),
            consensus: if score >= self.early_consensus_threshold {
                Some(true)
            } else {
                None
            },
            ..Default::default()
        });
        NodeOutput::success(patch)
    }
}

pub struct ResearchManagerNode {
    pub runner: AgentRunner,
}

#[async_trait]
impl Node for ResearchManagerNode {
    fn id(&self) -> NodeId {
        NodeId::ResearchManager
    }

    async fn execute(&self, state: &RunState) -> NodeOutput {
        if state.debate.transcript.is_empty() {
            let mut patch = StatePatch::empty();
            patch.investment_plan = Some(debate::FALLBACK_INVESTMENT_PLAN.to_string());
            return NodeOutput::success(patch);
        }
        let mut messages = vec![Message::system(
            "You are the research manager. Synthesize a plan from the debate.",
        )];
        for line in &state.debate.transcript {
            messages.push(Message::user(line.clone()));
        }
        let outcome = self.runner.invoke("research_manager", &messages, &[]).await;
        let plan = match outcome {
            AgentOutcome::Final(text) => text,
            _ => debate::FALLBACK_INVESTMENT_PLAN.to_string(),
        };
        let mut patch = StatePatch::empty();
        patch.investment_plan = Some(plan);
        NodeOutput::success(patch)
    }
}

pub struct TraderNode {
    pub runner: AgentRunner,
}

#[async_trait]
impl Node for TraderNode {
    fn id(&self) -> NodeId {
        NodeId::Trader
    }

    async fn execute(&self, state: &RunState) -> NodeOutput {
        let plan = state
            .investment_plan
            .clone()
            .unwrap_or_else(|| debate::FALLBACK_INVESTMENT_PLAN.to_string());
        let messages = vec![
            Message::system("You are the trader. Propose a concrete plan from the investment plan."),
            Message::user(plan),
        ];
        let outcome = self.runner.invoke("trader", &messages, &[]).await;
        let trader_plan = match outcome {
            AgentOutcome::Final(text) => text,
            _ => "HOLD — trader unavailable".to_string(),
        };
        let mut patch = StatePatch::empty();
        patch.trader_plan = Some(trader_plan);
        NodeOutput::success(patch)
    }
}

pub struct RiskNode {
    pub perspective: RiskPerspective,
    pub runner: AgentRunner,
}

#[async_trait]
impl Node for RiskNode {
    fn id(&self) -> NodeId {
        NodeId::Risk(self.perspective)
    }

    async fn execute(&self, state: &RunState) -> NodeOutput {
        if state.risk_debate.response_for(self.perspective).is_some() {
            return NodeOutput::success(StatePatch::empty());
        }
        let trader_plan = state
            .trader_plan
            .clone()
            .unwrap_or_else(|| "No trader plan available.".to_string());
        let messages = vec![
            Message::system(format!("You are the {} risk perspective.", self.perspective)),
            Message::user(trader_plan),
        ];
        let node_name = self.id().as_trace_name();
        let outcome = self.runner.invoke(&node_name, &messages, &[]).await;
        let text = match outcome {
            AgentOutcome::Final(text) => text,
            _ => format!("{} perspective unavailable; no objection raised.", self.perspective),
        };
        let mut patch = StatePatch::empty();
        patch.risk_responses.insert(self.perspective, text.clone());
        patch.risk_transcript_append = vec![format!("{}: {text}", self.perspective)];
        NodeOutput::success(patch)
    }
}

/// Classifies a free-form decision narrative into one of `{BUY, SELL, HOLD}`
/// (spec §3 "Final Trade Decision", §7 "the decision is always one of
/// {BUY, SELL, HOLD}"). Case-insensitive, first classifiable token wins;
/// falls back to `HOLD` when nothing matches.
pub fn classify_decision(text: &str) -> &'static str {
    let upper = text.to_uppercase();
    let buy_pos = upper.find("BUY");
    let sell_pos = upper.find("SELL");
    let hold_pos = upper.find("HOLD");
    let mut candidates: Vec<(usize, &'static str)> = Vec::new();
    if let Some(p) = buy_pos {
        candidates.push((p, "BUY"));
    }
    if let Some(p) = sell_pos {
        candidates.push((p, "SELL"));
    }
    if let Some(p) = hold_pos {
        candidates.push((p, "HOLD"));
    }
    candidates.sort_by_key(|(pos, _)| *pos);
    candidates.first().map(|(_, tok)| *tok).unwrap_or("HOLD")
}

pub struct RiskJudgeNode {
    pub runner: AgentRunner,
}

#[async_trait]
impl Node for RiskJudgeNode {
    fn id(&self) -> NodeId {
        NodeId::RiskJudge
    }

    async fn execute(&self, state: &RunState) -> NodeOutput {
        let mut messages = vec![Message::system(
            "You are the risk judge. Issue a final BUY/SELL/HOLD decision.",
        )];
        for line in &state.risk_debate.transcript {
            messages.push(Message::user(line.clone()));
        }
        let outcome = self.runner.invoke("risk_judge", &messages, &[]).await;
        let (status, decision) = match outcome {
            AgentOutcome::Final(text) => (TraceStatus::Success, text),
            _ => (
                TraceStatus::Error,
                "HOLD — risk judge unavailable; insufficient data to decide".to_string(),
            ),
        };
        let mut patch = StatePatch::empty();
        patch.final_decision = Some(decision);
        patch.risk_judge_decision = Some(classify_decision(&patch.final_decision.clone().unwrap()).to_string());
        NodeOutput {
            patch,
            status,
            error_kind: if status == TraceStatus::Error {
                Some(FailureKind::ApiError)
            } else {
                None
            },
        }
    }
}
