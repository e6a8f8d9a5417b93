//! Bounded memory of recent exchanges

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of exchanges remembered
pub const DEFAULT_MEMORY_CAPACITY: usize = 10;

/// One remembered exchange
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMemoryEntry {
    pub user_message: String,
    pub reply: String,
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Ring buffer of recent exchanges; the oldest entry is dropped on overflow
#[derive(Debug, Clone)]
pub struct ContextMemory {
    entries: VecDeque<ContextMemoryEntry>,
    capacity: usize,
}

impl Default for ContextMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}

impl ContextMemory {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record an exchange
    pub fn record(&mut self, user_message: &str, reply: &str, tags: Vec<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(ContextMemoryEntry {
            user_message: user_message.to_string(),
            reply: reply.to_string(),
            tags,
            timestamp: Utc::now(),
        });
    }

    /// Entries from oldest to newest
    pub fn entries(&self) -> impl Iterator<Item = &ContextMemoryEntry> {
        self.entries.iter()
    }

    /// Distinct tags across all entries, most recent first
    #[must_use]
    pub fn recent_tags(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for tag in self.entries.iter().rev().flat_map(|e| e.tags.iter()) {
            if !seen.contains(tag) {
                seen.push(tag.clone());
            }
        }
        seen
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
