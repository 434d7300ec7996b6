//! Token budget trimming for replayed conversation history
//!
//! Bounds every model call by keeping only the most recent turns that fit
//! a token budget. A leading system turn always survives, an assistant
//! tool-call turn and the tool turns answering it are kept or dropped as
//! one unit, and the latest exchange (last user turn onwards) is kept even
//! when it alone exceeds the budget.

use std::ops::Range;

use crate::domain::entities::{ConversationTurn, TurnRole};

/// Default history budget in tokens
pub const DEFAULT_MAX_HISTORY_TOKENS: u32 = 6000;

#[derive(Debug, Clone, Copy)]
pub struct TokenBudgetTrimmer {
    max_tokens: u32,
}

impl Default for TokenBudgetTrimmer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY_TOKENS)
    }
}

impl TokenBudgetTrimmer {
    pub fn new(max_tokens: u32) -> Self {
        Self { max_tokens }
    }

    /// Return the longest suffix of `messages` that fits the budget.
    ///
    /// `estimate` returns the token cost of a slice of turns; it is called
    /// once per system turn and once per atomic unit.
    pub fn trim<F>(&self, messages: &[ConversationTurn], estimate: F) -> Vec<ConversationTurn>
    where
        F: Fn(&[ConversationTurn]) -> u32,
    {
        if messages.is_empty() {
            return Vec::new();
        }

        let (system, rest) = match messages.first() {
            Some(first) if first.role == TurnRole::System => messages.split_at(1),
            _ => messages.split_at(0),
        };

        let units = group_units(rest);
        let Some(last) = units.len().checked_sub(1) else {
            return system.to_vec();
        };

        // The latest exchange is mandatory
        let mut start = units
            .iter()
            .rposition(|unit| rest[unit.start].role == TurnRole::User)
            .unwrap_or(last);

        let mut used = if system.is_empty() { 0 } else { estimate(system) };
        used = used.saturating_add(estimate(&rest[units[start].start..]));

        for i in (0..start).rev() {
            let cost = estimate(&rest[units[i].clone()]);
            if used.saturating_add(cost) > self.max_tokens {
                break;
            }
            used += cost;
            start = i;
        }

        let kept = &rest[units[start].start..];
        // A kept suffix never opens with a tool turn whose call was dropped
        let orphans = kept
            .iter()
            .take_while(|turn| turn.role == TurnRole::Tool)
            .count();

        let dropped = rest.len() - kept.len() + orphans;
        if dropped > 0 {
            tracing::debug!(
                dropped,
                kept = kept.len() - orphans,
                used,
                budget = self.max_tokens,
                "Trimmed conversation history"
            );
        }

        system
            .iter()
            .chain(kept[orphans..].iter())
            .cloned()
            .collect()
    }
}

/// Split turns into atomic units.
///
/// An assistant turn with tool calls absorbs every following tool turn
/// (matched or not) so no tool turn can start a unit unless it opens the slice.
fn group_units(turns: &[ConversationTurn]) -> Vec<Range<usize>> {
    let mut units: Vec<Range<usize>> = Vec::new();

    for (i, turn) in turns.iter().enumerate() {
        match units.last_mut() {
            Some(unit) if turn.role == TurnRole::Tool && turns[unit.start].has_tool_calls() => {
                unit.end = i + 1;
            }
            _ => units.push(i..i + 1),
        }
    }

    units
}
