//! Conversation turns and the bounded context window kept per user.
//!
//! Layout of a stored context: `[system, user, assistant, user, assistant, ...]`.
//! Index 0 is always the current system prompt and the tail is made of
//! user/assistant pairs, evicted oldest-first as a unit.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Maximum stored length for `context_size` retained pairs.
pub fn max_len(context_size: usize) -> usize {
    context_size.saturating_mul(2).saturating_add(1)
}

/// Append a user turn.
///
/// A trailing unanswered user turn (left behind by a failed call that was kept)
/// absorbs the new content instead, so the tail stays made of whole pairs.
pub fn push_user_turn(turns: &mut Vec<ConversationTurn>, content: &str) {
    let len = turns.len();
    match turns.last_mut() {
        Some(last) if last.role == Role::User && len > 1 => {
            last.content.push_str("\n\n");
            last.content.push_str(content);
        }
        _ => turns.push(ConversationTurn::user(content)),
    }
}

/// Evict the oldest user/assistant pairs until the window fits `max_len`.
///
/// Never touches the system turn and never evicts a trailing unanswered user
/// turn, so the request always carries the message being answered.
pub fn enforce_cap(turns: &mut Vec<ConversationTurn>, context_size: usize) -> usize {
    let cap = max_len(context_size);
    let head = usize::from(turns.first().map(|t| t.role == Role::System).unwrap_or(false));
    let pending = usize::from(turns.last().map(|t| t.role == Role::User).unwrap_or(false));

    let mut evicted = 0;
    while turns.len() > cap && turns.len() >= head + 2 + pending {
        turns.drain(head..head + 2);
        evicted += 1;
    }
    evicted
}

/// Make index 0 the current system prompt, inserting it if missing.
///
/// Stray system turns further down (older layouts) are dropped so the prompt
/// is never duplicated.
pub fn ensure_system_prompt(turns: &mut Vec<ConversationTurn>, prompt: &str) {
    match turns.first_mut() {
        Some(first) if first.role == Role::System => {
            if first.content != prompt {
                first.content = prompt.to_string();
            }
        }
        _ => turns.insert(0, ConversationTurn::system(prompt)),
    }

    let mut idx = 0usize;
    turns.retain(|t| {
        let keep = idx == 0 || t.role != Role::System;
        idx += 1;
        keep
    });
}

/// The system prompt, if the window carries one at index 0.
pub fn system_prompt(turns: &[ConversationTurn]) -> Option<&str> {
    turns
        .first()
        .filter(|t| t.role == Role::System)
        .map(|t| t.content.as_str())
}
