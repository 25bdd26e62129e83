//! Run Coordinator (spec §4.8, §6 "Caller API"): the only public entry point.
//!
//! Input validation is the sole place `conclave` returns `Err`; once a
//! [`RunState`] exists, every failure — agent, tool, deadline, recursion — is
//! absorbed into a `HOLD` decision with the reason surfaced in the narrative
//! and trace (spec §7 "Propagation policy").

use chrono::NaiveDate;

use crate::config::{AnalyzeOptions, EngineConfig};
use crate::error::ConclaveError;
use crate::graph::{node::classify_decision, AgentSet, GraphBuilder};
use crate::scheduler::{self, StopReason};
use crate::state::{AnalystKind, RunState, RunTrace};
use crate::tools::{ToolInvoker, ToolRegistry};

use std::collections::HashMap;
use std::sync::Arc;

/// The caller-facing result of one analysis run (spec §6 "Caller API":
/// `reports: {market, sentiment, news, fundamentals, investment_plan,
/// trader_plan, risk_judgment}`). The four analyst reports stay keyed by
/// [`AnalystKind`]; the three downstream-pipeline artifacts get their own
/// fields since they have no analyst kind to key off of.
#[derive(Debug, Clone)]
pub struct AnalyzeResult {
    pub decision: String,
    pub narrative: String,
    pub reports: HashMap<AnalystKind, String>,
    pub investment_plan: Option<String>,
    pub trader_plan: Option<String>,
    pub risk_judgment: Option<String>,
    pub trace: RunTrace,
}

/// Everything a caller must supply beyond the ticker/trade date (spec §1,
/// §6): the agent capabilities, the tool registry, and per-call overrides.
/// `conclave` never constructs an LLM client or a data-source adapter
/// itself.
pub struct RunInputs {
    pub agents: AgentSet,
    pub registry: Arc<ToolRegistry>,
    pub invoker: Arc<ToolInvoker>,
    pub options: AnalyzeOptions,
}

/// Validates `ticker`, loads configuration, builds the graph, and drives it
/// to completion. The only fallible step is validation; everything after
/// always produces an [`AnalyzeResult`].
pub async fn analyze(
    ticker: &str,
    trade_date: NaiveDate,
    inputs: RunInputs,
) -> Result<AnalyzeResult, ConclaveError> {
    let trimmed = ticker.trim();
    if trimmed.is_empty() {
        return Err(ConclaveError::InvalidInput {
            reason: "ticker must not be empty".to_string(),
        });
    }
    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') {
        return Err(ConclaveError::InvalidInput {
            reason: format!("ticker {trimmed:?} contains unsupported characters"),
        });
    }

    let base_config = EngineConfig::from_env()?;
    let config = base_config.merge_options(&inputs.options);

    let focus_table = inputs
        .options
        .focus_keyword_overrides
        .clone()
        .unwrap_or_else(crate::debate::default_focus_table);

    let state = RunState::new(trimmed, trade_date, config.max_debate_rounds);

    let builder = GraphBuilder {
        config: config.clone(),
        agents: inputs.agents,
        registry: inputs.registry,
        invoker: inputs.invoker,
        tool_visibility: crate::graph::default_tool_visibility(),
        focus_table,
        agent_timeout: config.tool_timeout,
    };
    let graph = builder.build();

    let outcome = scheduler::run(&graph, state, &config).await;
    Ok(finalize(outcome, &config))
}

fn finalize(outcome: scheduler::ScheduleOutcome, config: &EngineConfig) -> AnalyzeResult {
    let scheduler::ScheduleOutcome { state, stop_reason } = outcome;

    let (decision, narrative) = match stop_reason {
        StopReason::Converged => match &state.final_decision {
            Some(text) => (classify_decision(text).to_string(), text.clone()),
            None => (
                "HOLD".to_string(),
                "HOLD — pipeline converged without a final decision".to_string(),
            ),
        },
        other => (
            "HOLD".to_string(),
            format!(
                "HOLD — {}",
                scheduler::engine::deadline_fallback_reason(other)
            ),
        ),
    };

    let _ = config;
    AnalyzeResult {
        decision,
        narrative,
        reports: state.reports.clone(),
        investment_plan: state.investment_plan.clone(),
        trader_plan: state.trader_plan.clone(),
        risk_judgment: state.risk_debate.judge_decision.clone(),
        trace: state.trace.clone(),
    }
}
