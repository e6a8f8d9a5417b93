//! Turn-taking between the user and the character
//!
//! [`TurnMachine`] decides; [`TurnEngine`] runs it against the capture,
//! generation and synthesis controllers.

mod engine;
mod machine;

pub use engine::{EngineEvent, EngineParts, TurnEngine};
pub use machine::{
    DEFAULT_MIN_TRANSCRIPT_CHARS, Effect, EndReason, MachineConfig, TurnMachine, TurnState,
};
