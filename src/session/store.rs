//! Session persistence interface

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::ConversationMessage;
use crate::Result;

/// Durable storage for practice sessions, provided by the hosting service
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Append messages to a session's transcript
    async fn append_messages(&self, session_id: &str, messages: &[ConversationMessage])
    -> Result<()>;

    /// Close a session with a summary and its duration
    async fn end_session(&self, session_id: &str, summary: &str, duration_minutes: u32)
    -> Result<()>;
}

/// A session as recorded by [`MemorySessionStore`]
#[derive(Debug, Clone, Default)]
pub struct StoredSession {
    pub messages: Vec<ConversationMessage>,
    pub summary: Option<String>,
    pub duration_minutes: Option<u32>,
    /// How many times `end_session` was called
    pub end_calls: usize,
}

/// Process-local session store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, StoredSession>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a recorded session
    pub async fn session(&self, session_id: &str) -> Option<StoredSession> {
        self.sessions.lock().await.get(session_id).cloned()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn append_messages(
        &self,
        session_id: &str,
        messages: &[ConversationMessage],
    ) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .messages
            .extend_from_slice(messages);
        Ok(())
    }

    async fn end_session(
        &self,
        session_id: &str,
        summary: &str,
        duration_minutes: u32,
    ) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(session_id.to_string()).or_default();
        session.summary = Some(summary.to_string());
        session.duration_minutes = Some(duration_minutes);
        session.end_calls += 1;
        Ok(())
    }
}
