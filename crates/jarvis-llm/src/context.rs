//! Context window selection under a token budget.

use crate::turn::Turn;
use crate::CHARS_PER_TOKEN;

/// A contiguous, chronologically ordered suffix of a conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindow<'a> {
    turns: &'a [Turn],
}

impl<'a> ContextWindow<'a> {
    /// A window with no prior turns.
    pub fn empty() -> Self {
        Self { turns: &[] }
    }

    pub fn turns(&self) -> &'a [Turn] {
        self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Sum of the estimated token cost of every turn in the window.
    pub fn estimated_tokens(&self) -> usize {
        self.turns.iter().map(|t| estimate_tokens(&t.text)).sum()
    }
}

impl Default for ContextWindow<'_> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Estimate the token cost of `text` as `ceil(utf8_len / CHARS_PER_TOKEN)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

/// Select the longest suffix of `history` whose estimated cost fits in
/// `budget_tokens`.
///
/// Walks backward from the newest turn and stops at the first turn that would
/// overflow the budget. That turn is excluded even when it is the newest one,
/// so the window can be empty.
pub fn select(history: &[Turn], budget_tokens: usize) -> ContextWindow<'_> {
    let mut total = 0usize;
    let mut start = history.len();

    for (index, turn) in history.iter().enumerate().rev() {
        let cost = estimate_tokens(&turn.text);
        if total + cost > budget_tokens {
            break;
        }
        total += cost;
        start = index;
    }

    ContextWindow {
        turns: &history[start..],
    }
}
