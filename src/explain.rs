//! Explanation Generator (C2): renders a typed drop reason into
//! human-readable text, a structured facts map, and a suggestion list.
//!
//! `explain` is a pure function of `(node, reason_code, context)` — no I/O,
//! no shared state — so C3 can call it inline while building the drop list.

use serde_json::{json, Value};
use std::collections::HashMap;

use crate::config::TransportPolicy;
use crate::model::{seconds_to_time, DropExplanation, DropReasonCode, PlanNode};

fn time_to_seconds_string(seconds: i32) -> String {
    seconds_to_time(seconds).format("%H:%M").to_string()
}

/// Everything C3 knows about a drop at the moment it happens. Not every
/// field applies to every reason code; callers pass what they have.
#[derive(Debug, Clone, Default)]
pub struct ExplainContext {
    pub arrival_time_sec: Option<i32>,
    pub window_close_sec: Option<i32>,
    pub wait_minutes: Option<f64>,
    pub day_end_sec: Option<i32>,
    pub hard_node_count: Option<usize>,
    pub required_departure_sec: Option<i32>,
    pub effective_earliest_start_sec: Option<i32>,
    pub transport_policy: Option<TransportPolicy>,
}

fn suggestions_for(code: DropReasonCode) -> Vec<&'static str> {
    match code {
        DropReasonCode::TimeWindowConflict => vec![
            "Move this stop to an earlier day segment.",
            "Check whether a later time window is available for this place.",
            "Swap this stop with one scheduled closer to its open hours.",
        ],
        DropReasonCode::InsufficientTotalTime => vec![
            "Shorten the visit to an earlier or shorter stop nearby.",
            "Split the day across two dates to fit this stop in.",
        ],
        DropReasonCode::ClosedDay => vec![
            "Choose a different day of the week for this stop.",
            "Look for an alternative place open on this date.",
        ],
        DropReasonCode::HighWaitTime => vec![
            "Reorder the route so this stop follows something closer by.",
            "Arrive later in the day to cut the wait before opening.",
        ],
        DropReasonCode::LowPriorityNotWorth => vec![
            "Raise this stop's priority if it matters more than the itinerary assumed.",
            "Consider it as an optional add-on if time opens up.",
        ],
        DropReasonCode::HardNodeProtection => vec![
            "Keep this as a flexible alternative for a future day.",
            "Swap one of today's fixed commitments to make room.",
        ],
        DropReasonCode::RobustTimeInfeasible => vec![
            "Tighten the transport buffer policy if travel times are overestimated.",
            "Plan this stop on a day with more slack before or after it.",
        ],
        DropReasonCode::EarlyDepartureConflict => vec![
            "Start the day earlier to make this stop's opening time.",
            "Move this stop to a day with a later mandatory departure.",
        ],
    }
}

fn facts_for(node: &PlanNode, code: DropReasonCode, ctx: &ExplainContext) -> HashMap<String, Value> {
    let mut facts = HashMap::new();

    if let Some(close) = ctx.window_close_sec {
        facts.insert("close_time".to_string(), json!(time_to_seconds_string(close)));
    }
    if let Some(arrival) = ctx.arrival_time_sec {
        facts.insert("arrival_time".to_string(), json!(time_to_seconds_string(arrival)));
    }
    if let Some(wait) = ctx.wait_minutes {
        facts.insert("wait_minutes".to_string(), json!(wait));
    }

    match code {
        DropReasonCode::EarlyDepartureConflict => {
            facts.insert(
                "required_departure".to_string(),
                json!(ctx.required_departure_sec.map(time_to_seconds_string)),
            );
            facts.insert(
                "effective_earliest_start".to_string(),
                json!(ctx.effective_earliest_start_sec.map(time_to_seconds_string)),
            );
        }
        DropReasonCode::RobustTimeInfeasible => {
            let policy = ctx.transport_policy.clone().unwrap_or_default();
            facts.insert("buffer_factor".to_string(), json!(policy.buffer_factor));
            facts.insert("fixed_buffer".to_string(), json!(policy.fixed_buffer_min));
        }
        DropReasonCode::HardNodeProtection => {
            facts.insert("hard_node_count".to_string(), json!(ctx.hard_node_count.unwrap_or(0)));
        }
        _ => {}
    }

    let _ = node;
    facts
}

fn text_for(node: &PlanNode, code: DropReasonCode, ctx: &ExplainContext) -> String {
    match code {
        DropReasonCode::TimeWindowConflict => format!(
            "{} was dropped because it could not be reached before its time window closed.",
            node.name
        ),
        DropReasonCode::InsufficientTotalTime => format!(
            "{} was dropped because the remaining day didn't have enough time left for it.",
            node.name
        ),
        DropReasonCode::ClosedDay => {
            format!("{} was dropped because it is closed on the planned day.", node.name)
        }
        DropReasonCode::HighWaitTime => format!(
            "{} was dropped because visiting it would mean waiting {} minutes for it to open.",
            node.name,
            ctx.wait_minutes.unwrap_or(0.0).round()
        ),
        DropReasonCode::LowPriorityNotWorth => format!(
            "{} was dropped because higher-priority stops filled the available time.",
            node.name
        ),
        DropReasonCode::HardNodeProtection => format!(
            "{} was dropped to protect {} fixed commitment(s) already on the route.",
            node.name,
            ctx.hard_node_count.unwrap_or(0)
        ),
        DropReasonCode::RobustTimeInfeasible => format!(
            "{} was dropped because it is reachable under ideal travel times but not once realistic buffers are applied.",
            node.name
        ),
        DropReasonCode::EarlyDepartureConflict => format!(
            "{} was dropped because its window opens after the day's required departure time.",
            node.name
        ),
    }
}

/// Renders `(node, reason_code, context)` into `{text, facts, suggestions}`.
pub fn explain(node: &PlanNode, code: DropReasonCode, ctx: &ExplainContext) -> DropExplanation {
    DropExplanation {
        text: text_for(node, code, ctx),
        facts: facts_for(node, code, ctx),
        suggestions: suggestions_for(code).into_iter().map(str::to_string).collect(),
    }
}
