//! Context truncation.
//!
//! Drops the oldest non-system turns until the conversation fits the model's
//! input budget.
//!
//! | Rule | Behavior |
//! |------|----------|
//! | System messages | never dropped |
//! | Tool exchange | assistant `tool_calls` and their `tool` results dropped together |
//! | Order | preserved for everything kept |
//! | Already within budget | returned unchanged |
//! | Last turn alone over budget | kept whole |
//!
//! Truncation works on whole messages; content is never split.

use tracing::debug;

use crate::tokenizer::SizeEstimator;
use crate::traits::{ChatMessage, ChatRole};

/// Group non-system messages into turns that must be kept or dropped as one.
///
/// A `tool` message joins the turn of the assistant tool call it answers, so
/// dropping a turn never leaves a tool result without its call.
fn turns(messages: &[ChatMessage]) -> Vec<Vec<usize>> {
    let mut turns: Vec<Vec<usize>> = Vec::new();
    let mut open_exchange = false;

    for (i, message) in messages.iter().enumerate() {
        match message.role {
            ChatRole::System => {}
            ChatRole::Tool if open_exchange => {
                if let Some(turn) = turns.last_mut() {
                    turn.push(i);
                }
            }
            _ => {
                open_exchange = message.role == ChatRole::Assistant
                    && message.tool_calls.as_ref().is_some_and(|c| !c.is_empty());
                turns.push(vec![i]);
            }
        }
    }
    turns
}

/// Trim `messages` to fit `budget` as measured by `estimator`.
///
/// The result is idempotent: truncating it again returns it unchanged.
pub fn truncate_messages(
    messages: Vec<ChatMessage>,
    budget: usize,
    estimator: &SizeEstimator,
) -> Vec<ChatMessage> {
    let sizes: Vec<usize> = messages.iter().map(|m| estimator.message_size(m)).collect();
    let mut total: usize = sizes.iter().sum();
    if total <= budget {
        return messages;
    }

    let turns = turns(&messages);
    let mut remaining_turns = turns.len();
    let mut keep = vec![true; messages.len()];

    for turn in &turns {
        if total <= budget || remaining_turns <= 1 {
            break;
        }
        for &i in turn {
            keep[i] = false;
            total -= sizes[i];
        }
        remaining_turns -= 1;
    }

    let dropped = keep.iter().filter(|k| !**k).count();
    debug!(dropped, total, budget, "truncated conversation");

    messages
        .into_iter()
        .zip(keep)
        .filter_map(|(m, k)| k.then_some(m))
        .collect()
}
