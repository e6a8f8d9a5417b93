//! Colloquy - Turn-taking engine for spoken conversation practice
//!
//! This library arbitrates a speech recognizer, a speech synthesizer and a
//! text-generation service so a learner and a synthetic character can hold
//! a spoken dialogue without talking over each other:
//! - Turn state machine with epoch-tagged events
//! - Speech capture with silence finalization and supervised retries
//! - Persona voices with emotion-driven prosody
//! - Context analysis, prompt assembly and a TTL reply cache
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Adapters                          │
//! │   Recognizer  │  Synthesizer  │  Text generator     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Controllers                         │
//! │   Capture  │  Synthesis  │  Response generator      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Turn engine                          │
//! │   Event loop  │  Turn machine  │  Session store     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod persona;
pub mod providers;
pub mod response;
pub mod session;
pub mod turn;
pub mod voice;

pub use config::Config;
pub use context::{Analysis, ContextMemory, PromptBuilder, Tone, analyze};
pub use error::{Error, Result};
pub use persona::Persona;
pub use response::{Reply, ReplySource, ResponseCache, ResponseGenerator, TextGenerator};
pub use session::{ConversationMessage, Scenario, SessionContext, SessionStore, Speaker};
pub use turn::{EngineEvent, EngineParts, TurnEngine, TurnState};
pub use voice::{
    SpeechCaptureController, SpeechRecognizer, SpeechSynthesisController, SpeechSynthesizer,
};
