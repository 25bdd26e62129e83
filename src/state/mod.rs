//! Run state: the shared mapping the Scheduler owns and nodes patch (spec §3).

mod reducers;
pub mod trace;

pub use reducers::{apply_patch, PatchOutcome, Reducer};
pub use trace::{RunTrace, TraceEvent, TraceStatus};

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One of the four specialist analysis agents (spec GLOSSARY "Analyst kind").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnalystKind {
    Market,
    Social,
    News,
    Fundamentals,
}

impl AnalystKind {
    pub const ALL: [AnalystKind; 4] = [
        AnalystKind::Market,
        AnalystKind::Social,
        AnalystKind::News,
        AnalystKind::Fundamentals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalystKind::Market => "market",
            AnalystKind::Social => "social",
            AnalystKind::News => "news",
            AnalystKind::Fundamentals => "fundamentals",
        }
    }
}

impl std::fmt::Display for AnalystKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One of the three risk-perspective agents (spec GLOSSARY "Perspective").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskPerspective {
    Aggressive,
    Conservative,
    Neutral,
}

impl RiskPerspective {
    pub const ALL: [RiskPerspective; 3] = [
        RiskPerspective::Aggressive,
        RiskPerspective::Conservative,
        RiskPerspective::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskPerspective::Aggressive => "aggressive",
            RiskPerspective::Conservative => "conservative",
            RiskPerspective::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for RiskPerspective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Conversational role of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool-invocation request embedded in an assistant [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub name: String,
    pub arguments: serde_json::Value,
    pub correlation_id: String,
}

/// One entry in a per-analyst message channel (spec §3 "Per-analyst message
/// channel").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Present only on assistant messages that request tool invocations.
    pub tool_requests: Vec<ToolRequest>,
    /// Present only on tool-result messages; matches a [`ToolRequest`]'s
    /// `correlation_id`.
    pub correlation_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_requests: Vec::new(),
            correlation_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_requests: Vec::new(),
            correlation_id: None,
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_requests: Vec::new(),
            correlation_id: None,
        }
    }

    pub fn assistant_tool_requests(requests: Vec<ToolRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_requests: requests,
            correlation_id: None,
        }
    }

    pub fn tool_result(correlation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_requests: Vec::new(),
            correlation_id: Some(correlation_id.into()),
        }
    }

    /// Hash used for append-with-deduplication (content + role).
    pub fn dedup_key(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(format!("{:?}", self.role));
        hasher.update(self.content.as_bytes());
        for req in &self.tool_requests {
            hasher.update(req.name.as_bytes());
            hasher.update(req.correlation_id.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn has_tool_requests(&self) -> bool {
        !self.tool_requests.is_empty()
    }
}

/// An ordered, bounded, deduplicated sequence of [`Message`]s for one
/// analyst (spec §3, reducer: append-with-deduplication bounded to N).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageChannel {
    pub messages: Vec<Message>,
}

impl MessageChannel {
    pub fn last_assistant_tool_requests(&self) -> Option<&[ToolRequest]> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.tool_requests.as_slice())
    }

    pub fn has_any_tool_result(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::Tool)
    }

    /// Every assistant tool request in the channel has a matching tool-result
    /// message with the same correlation id (spec §8 universal invariant).
    pub fn pairing_invariant_holds(&self) -> bool {
        let mut outstanding: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for message in &self.messages {
            match message.role {
                Role::Assistant => {
                    for req in &message.tool_requests {
                        outstanding.insert(req.correlation_id.as_str());
                    }
                }
                Role::Tool => {
                    if let Some(id) = &message.correlation_id {
                        outstanding.remove(id.as_str());
                    }
                }
                _ => {}
            }
        }
        outstanding.is_empty()
    }
}

/// Bull/bear iterative exchange state (spec §3 "Investment Debate State").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebateState {
    pub bull_history: Vec<String>,
    pub bear_history: Vec<String>,
    pub transcript: Vec<String>,
    pub current_round: u32,
    pub max_rounds: u32,
    pub judge_feedback: Option<String>,
    pub consensus: bool,
    pub last_quality_score: Option<f64>,
    pub next_round_focus: Option<String>,
    /// Set the moment the first round's exchange is recorded; `None` before
    /// the debate has started. Drives the elapsed-time half of
    /// [`crate::debate::decide_exit`]'s continuation predicate.
    pub started_at: Option<DateTime<Utc>>,
}

/// Risk-perspective exchange state (spec §3 "Risk Debate State").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskDebateState {
    pub aggressive_response: Option<String>,
    pub conservative_response: Option<String>,
    pub neutral_response: Option<String>,
    pub transcript: Vec<String>,
    pub judge_decision: Option<String>,
    pub count: u32,
}

impl RiskDebateState {
    pub fn response_for(&self, perspective: RiskPerspective) -> &Option<String> {
        match perspective {
            RiskPerspective::Aggressive => &self.aggressive_response,
            RiskPerspective::Conservative => &self.conservative_response,
            RiskPerspective::Neutral => &self.neutral_response,
        }
    }

    pub fn all_present(&self) -> bool {
        self.aggressive_response.is_some()
            && self.conservative_response.is_some()
            && self.neutral_response.is_some()
    }
}

/// Per-analyst mapping from tool name to recorded argument-hashes plus a
/// running total (spec §3 "Tool Call Ledger").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub tool_name: String,
    pub arg_hashes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalystLedger {
    pub entries: HashMap<String, LedgerEntry>,
    pub total: u32,
}

impl AnalystLedger {
    pub fn contains(&self, tool_name: &str, arg_hash: &str) -> bool {
        self.entries
            .get(tool_name)
            .map(|e| e.arg_hashes.iter().any(|h| h == arg_hash))
            .unwrap_or(false)
    }

    pub fn record(&mut self, tool_name: &str, arg_hash: &str) {
        let entry = self
            .entries
            .entry(tool_name.to_string())
            .or_insert_with(|| LedgerEntry {
                tool_name: tool_name.to_string(),
                arg_hashes: Vec::new(),
            });
        if !entry.arg_hashes.iter().any(|h| h == arg_hash) {
            entry.arg_hashes.push(arg_hash.to_string());
            self.total += 1;
        }
    }
}

/// The canonical, per-run shared state (spec §3). Created once by the Run
/// Coordinator; the Scheduler owns it exclusively and hands nodes immutable
/// snapshots (`Clone`s), merging returned patches back in via [`apply_patch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub ticker: String,
    pub trade_date: NaiveDate,

    pub channels: HashMap<AnalystKind, MessageChannel>,
    pub reports: HashMap<AnalystKind, String>,

    pub debate: DebateState,
    pub investment_plan: Option<String>,
    pub trader_plan: Option<String>,
    pub risk_debate: RiskDebateState,
    pub final_decision: Option<String>,

    pub ledgers: HashMap<AnalystKind, AnalystLedger>,
    pub trace: RunTrace,
}

impl RunState {
    pub fn new(ticker: impl Into<String>, trade_date: NaiveDate, max_debate_rounds: u32) -> Self {
        let ticker = ticker.into().to_uppercase();
        let mut channels = HashMap::new();
        let mut ledgers = HashMap::new();
        for kind in AnalystKind::ALL {
            channels.insert(kind, MessageChannel::default());
            ledgers.insert(kind, AnalystLedger::default());
        }
        Self {
            ticker,
            trade_date,
            channels,
            reports: HashMap::new(),
            debate: DebateState {
                max_rounds: max_debate_rounds,
                ..Default::default()
            },
            investment_plan: None,
            trader_plan: None,
            risk_debate: RiskDebateState::default(),
            final_decision: None,
            ledgers,
            trace: RunTrace::default(),
        }
    }

    pub fn report_complete(&self, kind: AnalystKind) -> bool {
        self.reports.get(&kind).map(|r| !r.is_empty()).unwrap_or(false)
    }

    pub fn ledger_total(&self, kind: AnalystKind) -> u32 {
        self.ledgers.get(&kind).map(|l| l.total).unwrap_or(0)
    }
}
