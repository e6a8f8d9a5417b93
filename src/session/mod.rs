//! Conversation session state
//!
//! The engine owns a [`SessionContext`] for the lifetime of one practice
//! session. Durable storage is the job of a [`SessionStore`].

mod store;

pub use store::{MemorySessionStore, SessionStore, StoredSession};

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Persona;
use crate::context::ContextMemory;

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The human practicing
    User,
    /// The synthetic character
    Character,
}

impl Speaker {
    /// Role label used in prompts
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Character => "character",
        }
    }
}

/// One appended turn of dialogue
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConversationMessage {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    /// Create a message stamped with the current time
    #[must_use]
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a user message
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Speaker::User, text)
    }

    /// Create a character message
    #[must_use]
    pub fn character(text: impl Into<String>) -> Self {
        Self::new(Speaker::Character, text)
    }
}

/// A practice scenario the session is set in
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Unique identifier
    pub id: String,

    /// Display title
    pub title: String,

    /// What the scenario is about
    #[serde(default)]
    pub description: String,

    /// Where the conversation takes place
    pub setting: Option<String>,

    /// Learning goals for the user
    #[serde(default)]
    pub goals: Vec<String>,

    /// Persona played by the character
    pub persona_id: Option<String>,
}

impl Scenario {
    /// Render scenario metadata for a prompt
    #[must_use]
    pub fn describe(&self) -> String {
        let mut lines = vec![format!("Scenario: {}", self.title)];
        if !self.description.is_empty() {
            lines.push(self.description.clone());
        }
        if let Some(setting) = &self.setting {
            lines.push(format!("Setting: {setting}"));
        }
        if !self.goals.is_empty() {
            lines.push(format!("Practice goals: {}", self.goals.join("; ")));
        }
        lines.join("\n")
    }
}

/// Append-only dialogue history, bounded to keep memory in check
#[derive(Debug, Clone)]
pub struct History {
    messages: VecDeque<ConversationMessage>,
    limit: usize,
}

impl History {
    /// Create a history holding at most `limit` messages
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Append a message, dropping the oldest on overflow
    pub fn push(&mut self, message: ConversationMessage) {
        if self.messages.len() >= self.limit {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    /// The most recent `n` messages in chronological order
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<ConversationMessage> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip).cloned().collect()
    }

    /// Iterate all retained messages
    pub fn iter(&self) -> impl Iterator<Item = &ConversationMessage> {
        self.messages.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Everything the engine knows about the running session
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub scenario: Scenario,
    pub persona: Persona,
    pub history: History,
    pub memory: ContextMemory,
    pub started_at: DateTime<Utc>,
}

impl SessionContext {
    /// Create a fresh session with the given bounds
    #[must_use]
    pub fn new(
        scenario: Scenario,
        persona: Persona,
        history_limit: usize,
        memory_capacity: usize,
    ) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            scenario,
            persona,
            history: History::new(history_limit),
            memory: ContextMemory::new(memory_capacity),
            started_at: Utc::now(),
        }
    }

    /// Number of complete user/character exchanges retained in history
    #[must_use]
    pub fn exchanges(&self) -> usize {
        self.history
            .iter()
            .filter(|m| m.speaker == Speaker::Character)
            .count()
    }

    /// Whole minutes elapsed since the session started
    #[must_use]
    pub fn duration_minutes(&self, now: DateTime<Utc>) -> u32 {
        let minutes = (now - self.started_at).num_minutes().max(0);
        u32::try_from(minutes).unwrap_or(u32::MAX)
    }

    /// One-line summary handed to the session store on end
    #[must_use]
    pub fn summary(&self) -> String {
        let exchanges = self.exchanges();
        let noun = if exchanges == 1 { "exchange" } else { "exchanges" };
        format!(
            "{exchanges} {noun} with {} in '{}'",
            self.persona.name(),
            self.scenario.title
        )
    }
}
