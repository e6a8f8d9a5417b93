//! Conversation context for character replies
//!
//! Combines:
//! - Transcript analysis (topic, tone, intent)
//! - Bounded memory of recent exchanges
//! - Prompt assembly from persona, scenario and history

mod analyzer;
mod memory;
mod prompt;

pub use analyzer::{Analysis, Intent, Tone, TopicContinuity, analyze, tone_of};
pub use memory::{ContextMemory, ContextMemoryEntry, DEFAULT_MEMORY_CAPACITY};
pub use prompt::{Prompt, PromptBuilder, PromptConfig};
