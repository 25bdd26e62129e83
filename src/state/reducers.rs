//! Reducers: per-field merge semantics applied to [`super::RunState`] (spec
//! §3, §4.4).
//!
//! A node never mutates [`super::RunState`] directly; it returns a
//! [`StatePatch`], and the scheduler merges it in via [`apply_patch`]. Each
//! field has its own reducer (see the doc comment on every `PatchField`-like
//! member below); fields are merged in a fixed, alphabetical order so that
//! applying the same set of concurrently-produced patches is reproducible
//! regardless of which node happened to finish first (spec §4.4, §5).

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{
    AnalystKind, AnalystLedger, DebateState, Message, RiskPerspective, RunState, TraceEvent,
};

/// A trait marker for documentation purposes: every field reducer here obeys
/// `reduce(x, empty) == x`, `reduce(empty, x) == x`, and is associative enough
/// for the scheduler's field-sorted application order to be order-independent
/// across a concurrently-completing batch (spec §8 "Reducer laws").
pub trait Reducer {
    type Value;
    fn reduce(current: Option<Self::Value>, incoming: Self::Value) -> Self::Value;
}

/// Partial update to the debate state; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebateDelta {
    pub bull_says: Option<String>,
    pub bear_says: Option<String>,
    pub transcript_append: Vec<String>,
    pub advance_round: bool,
    pub judge_feedback: Option<String>,
    pub consensus: Option<bool>,
    pub quality_score: Option<f64>,
    pub next_round_focus: Option<String>,
}

/// The patch a node returns to the scheduler: every key present is a reduce
/// request (spec §4.4). Absent/default fields mean "no change requested".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatePatch {
    /// Attempting to change the ticker after creation is always rejected.
    pub ticker: Option<String>,
    /// Attempting to change the trade date after creation is always rejected.
    pub trade_date: Option<NaiveDate>,

    pub channel_appends: HashMap<AnalystKind, Vec<Message>>,
    pub reports: HashMap<AnalystKind, String>,

    pub debate: Option<DebateDelta>,
    pub investment_plan: Option<String>,
    pub trader_plan: Option<String>,

    pub risk_responses: HashMap<RiskPerspective, String>,
    pub risk_transcript_append: Vec<String>,
    pub risk_judge_decision: Option<String>,

    pub final_decision: Option<String>,

    /// `(analyst, tool_name, arg_hash)` triples accepted by the invoker.
    pub ledger_records: Vec<(AnalystKind, String, String)>,

    pub trace_events: Vec<TraceEvent>,
}

impl StatePatch {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ticker.is_none()
            && self.trade_date.is_none()
            && self.channel_appends.is_empty()
            && self.reports.is_empty()
            && self.debate.is_none()
            && self.investment_plan.is_none()
            && self.trader_plan.is_none()
            && self.risk_responses.is_empty()
            && self.risk_transcript_append.is_empty()
            && self.risk_judge_decision.is_none()
            && self.final_decision.is_none()
            && self.ledger_records.is_empty()
            && self.trace_events.is_empty()
    }

    /// Combines two patches produced by a concurrently-completing batch into
    /// one, preserving append-ordering by patch-arrival order within each
    /// field (the cross-field order is fixed separately, in
    /// [`apply_patch`]).
    pub fn merge_with(mut self, mut other: StatePatch) -> StatePatch {
        // Single-writer fields: first writer in the batch wins; later
        // conflicting writers are silently superseded here and will be
        // re-validated (and rejected if truly conflicting) by `apply_patch`.
        if self.ticker.is_none() {
            self.ticker = other.ticker.take();
        }
        if self.trade_date.is_none() {
            self.trade_date = other.trade_date.take();
        }
        for (kind, msgs) in other.channel_appends {
            self.channel_appends.entry(kind).or_default().extend(msgs);
        }
        for (kind, report) in other.reports {
            self.reports.entry(kind).or_insert(report);
        }
        match (&mut self.debate, other.debate) {
            (None, Some(d)) => self.debate = Some(d),
            (Some(existing), Some(incoming)) => {
                if existing.bull_says.is_none() {
                    existing.bull_says = incoming.bull_says;
                }
                if existing.bear_says.is_none() {
                    existing.bear_says = incoming.bear_says;
                }
                existing.transcript_append.extend(incoming.transcript_append);
                existing.advance_round = existing.advance_round || incoming.advance_round;
                if existing.judge_feedback.is_none() {
                    existing.judge_feedback = incoming.judge_feedback;
                }
                if existing.consensus.is_none() {
                    existing.consensus = incoming.consensus;
                }
                if existing.quality_score.is_none() {
                    existing.quality_score = incoming.quality_score;
                }
                if existing.next_round_focus.is_none() {
                    existing.next_round_focus = incoming.next_round_focus;
                }
            }
            _ => {}
        }
        if self.investment_plan.is_none() {
            self.investment_plan = other.investment_plan.take();
        }
        if self.trader_plan.is_none() {
            self.trader_plan = other.trader_plan.take();
        }
        for (perspective, response) in other.risk_responses {
            self.risk_responses.entry(perspective).or_insert(response);
        }
        self.risk_transcript_append.extend(other.risk_transcript_append);
        if self.risk_judge_decision.is_none() {
            self.risk_judge_decision = other.risk_judge_decision.take();
        }
        if self.final_decision.is_none() {
            self.final_decision = other.final_decision.take();
        }
        self.ledger_records.extend(other.ledger_records);
        self.trace_events.extend(other.trace_events);
        self
    }
}

/// Outcome of [`apply_patch`]: field names whose incoming value was rejected
/// (per §4.4, the rest of the patch still applies).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOutcome {
    pub rejected_fields: Vec<&'static str>,
}

impl PatchOutcome {
    pub fn is_clean(&self) -> bool {
        self.rejected_fields.is_empty()
    }
}

const CHANNEL_BOUND: usize = 50;

/// Applies `patch` to `state` in a fixed, alphabetical field order, enforcing
/// the immutability and single-writer invariants of spec §3/§4.4. Rejected
/// keys are reported in the returned [`PatchOutcome`] and otherwise ignored;
/// every other key in the patch still applies.
pub fn apply_patch(state: &mut RunState, patch: StatePatch) -> PatchOutcome {
    let mut outcome = PatchOutcome::default();

    // channel_appends
    for (kind, incoming) in sorted_map(patch.channel_appends) {
        let channel = state.channels.entry(kind).or_default();
        for message in incoming {
            let key = message.dedup_key();
            let already_present = channel.messages.iter().any(|m| m.dedup_key() == key);
            if !already_present {
                channel.messages.push(message);
            }
        }
        if channel.messages.len() > CHANNEL_BOUND {
            let system_messages: Vec<Message> = channel
                .messages
                .iter()
                .filter(|m| m.role == super::Role::System)
                .cloned()
                .collect();
            let overflow = channel.messages.len() - CHANNEL_BOUND;
            let trimmed: Vec<Message> = channel
                .messages
                .iter()
                .skip(overflow)
                .filter(|m| m.role != super::Role::System)
                .cloned()
                .collect();
            let mut rebuilt = system_messages;
            rebuilt.extend(trimmed);
            channel.messages = rebuilt;
        }
    }

    // debate (field-wise merge; see DebateDelta doc)
    if let Some(delta) = patch.debate {
        let debate = &mut state.debate;
        debate.started_at.get_or_insert_with(chrono::Utc::now);
        if let Some(bull) = delta.bull_says {
            if !debate.bull_history.contains(&bull) {
                debate.bull_history.push(bull);
            }
        }
        if let Some(bear) = delta.bear_says {
            if !debate.bear_history.contains(&bear) {
                debate.bear_history.push(bear);
            }
        }
        for line in delta.transcript_append {
            if !debate.transcript.contains(&line) {
                debate.transcript.push(line);
            }
        }
        if delta.advance_round {
            debate.current_round += 1;
        }
        if let Some(feedback) = delta.judge_feedback {
            debate.judge_feedback = Some(feedback);
        }
        if let Some(consensus) = delta.consensus {
            debate.consensus = debate.consensus || consensus;
        }
        if let Some(score) = delta.quality_score {
            debate.last_quality_score = Some(score);
        }
        if let Some(focus) = delta.next_round_focus {
            debate.next_round_focus = Some(focus);
        }
    }

    // final_decision (single-writer terminal field)
    if let Some(decision) = patch.final_decision {
        match &state.final_decision {
            None => state.final_decision = Some(decision),
            Some(existing) if *existing == decision => {}
            Some(_) => outcome.rejected_fields.push("final_decision"),
        }
    }

    // investment_plan (single-writer)
    if let Some(plan) = patch.investment_plan {
        match &state.investment_plan {
            None => state.investment_plan = Some(plan),
            Some(existing) if *existing == plan => {}
            Some(_) => outcome.rejected_fields.push("investment_plan"),
        }
    }

    // ledger_records (monotonic union)
    for (kind, tool_name, arg_hash) in patch.ledger_records {
        let ledger: &mut AnalystLedger = state.ledgers.entry(kind).or_default();
        ledger.record(&tool_name, &arg_hash);
    }

    // reports (first-writer-wins if identical; longer+more-recent on conflict)
    for (kind, incoming) in sorted_map(patch.reports) {
        match state.reports.get(&kind) {
            None => {
                state.reports.insert(kind, incoming);
            }
            Some(existing) if *existing == incoming => {}
            Some(existing) => {
                if incoming.len() > existing.len() {
                    state.reports.insert(kind, incoming);
                }
                // else: keep existing (tie-break already satisfied by latest
                // write losing to the longer value, per spec §3).
            }
        }
    }

    // risk_judge_decision (single-writer)
    if let Some(decision) = patch.risk_judge_decision {
        match &state.risk_debate.judge_decision {
            None => state.risk_debate.judge_decision = Some(decision),
            Some(existing) if *existing == decision => {}
            Some(_) => outcome.rejected_fields.push("risk_judge_decision"),
        }
    }

    // risk_responses (single-writer per perspective)
    for (perspective, response) in sorted_risk_map(patch.risk_responses) {
        let slot = match perspective {
            RiskPerspective::Aggressive => &mut state.risk_debate.aggressive_response,
            RiskPerspective::Conservative => &mut state.risk_debate.conservative_response,
            RiskPerspective::Neutral => &mut state.risk_debate.neutral_response,
        };
        match slot {
            None => *slot = Some(response),
            Some(existing) if *existing == response => {}
            Some(_) => outcome.rejected_fields.push("risk_responses"),
        }
    }

    // risk_transcript_append (ordered append)
    for line in patch.risk_transcript_append {
        if !state.risk_debate.transcript.contains(&line) {
            state.risk_debate.transcript.push(line);
        }
    }
    if !patch.ledger_records.is_empty() {
        // no-op branch kept out; ledger handled above. Present for field-name
        // ordering clarity only.
    }

    // ticker / trade_date (immutable after creation)
    if let Some(ticker) = patch.ticker {
        if ticker != state.ticker {
            outcome.rejected_fields.push("ticker");
        }
    }
    if let Some(date) = patch.trade_date {
        if date != state.trade_date {
            outcome.rejected_fields.push("trade_date");
        }
    }

    // trace_events (ordered append, always accepted)
    for event in patch.trace_events {
        state.trace.push(event);
    }

    // trader_plan (single-writer)
    if let Some(plan) = patch.trader_plan {
        match &state.trader_plan {
            None => state.trader_plan = Some(plan),
            Some(existing) if *existing == plan => {}
            Some(_) => outcome.rejected_fields.push("trader_plan"),
        }
    }

    outcome
}

fn sorted_map<K: Ord + Clone, V>(map: HashMap<K, V>) -> Vec<(K, V)> {
    let mut entries: Vec<(K, V)> = map.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

fn sorted_risk_map<V>(map: HashMap<RiskPerspective, V>) -> Vec<(RiskPerspective, V)> {
    let mut entries: Vec<(RiskPerspective, V)> = map.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AnalystKind, Message};

    fn state() -> RunState {
        RunState::new("AAPL", NaiveDate::from_ymd_opt(2024, 5, 15).unwrap(), 1)
    }

    #[test]
    fn reduce_empty_is_identity() {
        let mut s = state();
        let before = s.clone();
        let outcome = apply_patch(&mut s, StatePatch::empty());
        assert!(outcome.is_clean());
        assert_eq!(s, before);
    }

    #[test]
    fn channel_append_deduplicates_by_content_and_role() {
        let mut s = state();
        let mut patch = StatePatch::empty();
        patch
            .channel_appends
            .insert(AnalystKind::Market, vec![Message::user("hello"), Message::user("hello")]);
        apply_patch(&mut s, patch);
        assert_eq!(s.channels[&AnalystKind::Market].messages.len(), 1);
    }

    #[test]
    fn channel_bound_preserves_system_message() {
        let mut s = state();
        let mut patch = StatePatch::empty();
        let mut msgs = vec![Message::system("you are an analyst")];
        for i in 0..60 {
            msgs.push(Message::user(format!("msg {i}")));
        }
        patch.channel_appends.insert(AnalystKind::Market, msgs);
        apply_patch(&mut s, patch);
        let channel = &s.channels[&AnalystKind::Market];
        assert!(channel.messages.len() <= CHANNEL_BOUND);
        assert!(channel.messages.iter().any(|m| m.role == super::super::Role::System));
    }

    #[test]
    fn final_decision_rejects_conflicting_second_write() {
        let mut s = state();
        let mut first = StatePatch::empty();
        first.final_decision = Some("BUY".to_string());
        apply_patch(&mut s, first);

        let mut second = StatePatch::empty();
        second.final_decision = Some("SELL".to_string());
        let outcome = apply_patch(&mut s, second);
        assert!(outcome.rejected_fields.contains(&"final_decision"));
        assert_eq!(s.final_decision.as_deref(), Some("BUY"));
    }

    #[test]
    fn ticker_change_attempt_is_rejected() {
        let mut s = state();
        let mut patch = StatePatch::empty();
        patch.ticker = Some("MSFT".to_string());
        let outcome = apply_patch(&mut s, patch);
        assert!(outcome.rejected_fields.contains(&"ticker"));
        assert_eq!(s.ticker, "AAPL");
    }

    #[test]
    fn report_conflict_keeps_longer_value() {
        let mut s = state();
        let mut first = StatePatch::empty();
        first.reports.insert(AnalystKind::Market, "short".to_string());
        apply_patch(&mut s, first);

        let mut second = StatePatch::empty();
        second
            .reports
            .insert(AnalystKind::Market, "a much longer replacement report".to_string());
        apply_patch(&mut s, second);
        assert_eq!(
            s.reports[&AnalystKind::Market],
            "a much longer replacement report"
        );
    }

    #[test]
    fn ledger_records_are_monotonic_union() {
        let mut s = state();
        let mut patch = StatePatch::empty();
        patch
            .ledger_records
            .push((AnalystKind::Market, "get_quote".into(), "hash1".into()));
        patch
            .ledger_records
            .push((AnalystKind::Market, "get_quote".into(), "hash1".into()));
        apply_patch(&mut s, patch);
        assert_eq!(s.ledger_total(AnalystKind::Market), 1);
    }

    #[test]
    fn other_keys_still_apply_when_one_key_is_rejected() {
        let mut s = state();
        let mut first = StatePatch::empty();
        first.final_decision = Some("BUY".to_string());
        apply_patch(&mut s, first);

        let mut second = StatePatch::empty();
        second.final_decision = Some("SELL".to_string());
        second.trader_plan = Some("hold steady".to_string());
        let outcome = apply_patch(&mut s, second);
        assert!(!outcome.is_clean());
        assert_eq!(s.trader_plan.as_deref(), Some("hold steady"));
    }
}
