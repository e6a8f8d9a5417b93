//! Concrete adapters for the engine's external capabilities

mod console;
mod openai;

pub use console::{ConsoleSynthesizer, LineRecognizer};
pub use openai::ChatCompletionsGenerator;
