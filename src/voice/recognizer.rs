//! Speech recognizer interface

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Recognizer session settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RecognizerConfig {
    /// Keep listening across utterances instead of stopping after one
    pub continuous: bool,
    /// Deliver partial transcripts while the user is still speaking
    pub interim_results: bool,
    /// BCP 47 language code
    pub language: String,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            continuous: true,
            interim_results: true,
            language: "en-US".to_string(),
        }
    }
}

/// Raw recognizer callback
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// A transcript hypothesis
    Result {
        text: String,
        is_final: bool,
        confidence: f32,
    },
    /// Recognition error, identified by code (e.g. `no-speech`, `not-allowed`)
    Error(String),
    /// The recognition session ended
    End,
}

/// A recognizer event stamped with the capture epoch it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedRecognizerEvent {
    pub epoch: u64,
    pub event: RecognizerEvent,
}

/// Where a recognizer delivers its callbacks
///
/// Each capture arm gets a fresh sink carrying that arm's epoch, so results
/// from an abandoned session are recognizable as stale.
#[derive(Debug, Clone)]
pub struct RecognizerSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<TaggedRecognizerEvent>,
}

impl RecognizerSink {
    #[must_use]
    pub const fn new(epoch: u64, tx: mpsc::UnboundedSender<TaggedRecognizerEvent>) -> Self {
        Self { epoch, tx }
    }

    /// Deliver a transcript hypothesis
    pub fn result(&self, text: impl Into<String>, is_final: bool, confidence: f32) {
        self.send(RecognizerEvent::Result {
            text: text.into(),
            is_final,
            confidence,
        });
    }

    /// Deliver an error code
    pub fn error(&self, code: impl Into<String>) {
        self.send(RecognizerEvent::Error(code.into()));
    }

    /// Signal that the session ended
    pub fn end(&self) {
        self.send(RecognizerEvent::End);
    }

    fn send(&self, event: RecognizerEvent) {
        // Receiver is gone once the engine has shut down
        let _ = self.tx.send(TaggedRecognizerEvent {
            epoch: self.epoch,
            event,
        });
    }
}

/// Failure to start a recognition session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("recognizer error {code}: {message}")]
pub struct RecognizerError {
    /// Error code, classified the same way as [`RecognizerEvent::Error`]
    pub code: String,
    pub message: String,
}

impl RecognizerError {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// A live speech recognizer
///
/// `start` begins a session that reports through `sink` until `stop` is
/// called or the recognizer ends it. Implementations must tolerate `stop`
/// when no session is running.
pub trait SpeechRecognizer: Send {
    /// Begin a recognition session
    ///
    /// # Errors
    ///
    /// Returns error if the session could not be started (e.g. permission
    /// denied or no input device)
    fn start(&mut self, config: &RecognizerConfig, sink: RecognizerSink)
    -> Result<(), RecognizerError>;

    /// End the current session, if any
    fn stop(&mut self);
}
