//! Speech capture controller
//!
//! Wraps a [`SpeechRecognizer`] and turns its raw callbacks into capture
//! events: interim and final transcripts, restarts and failures. Also
//! finalizes an utterance from the last interim transcript once the user has
//! been silent for the configured window.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::recognizer::{
    RecognizerConfig, RecognizerEvent, RecognizerSink, SpeechRecognizer, TaggedRecognizerEvent,
};
use super::retry::{ErrorClass, RetryDecision, RetryPolicy};

/// Default silence window before an interim transcript is finalized
pub const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Error codes that retrying cannot fix
const FATAL_CODES: &[&str] = &[
    "not-allowed",
    "service-not-allowed",
    "device-unavailable",
    "language-not-supported",
];

static FILLERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:um|uh|er|erm|uhm)\b,?").expect("valid regex"));

/// A transcript hypothesis after cleanup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
    pub confidence: f32,
}

/// A capture failure that will not be retried
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("speech capture failed: {code}")]
pub struct CaptureError {
    pub code: String,
    pub class: ErrorClass,
}

/// What a recognizer callback means for the conversation
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Partial transcript, for display only
    Interim(TranscriptEvent),
    /// Finished utterance
    Final(TranscriptEvent),
    /// Capture stopped and should be re-armed after `delay`
    Restart { attempt: u32, delay: Duration },
    /// Capture stopped for good
    Failed(CaptureError),
}

/// Capture settings
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub recognizer: RecognizerConfig,
    /// Interim results below this confidence are not forwarded
    pub confidence_threshold: f32,
    pub silence_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            recognizer: RecognizerConfig::default(),
            confidence_threshold: 0.0,
            silence_timeout: DEFAULT_SILENCE_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Drives a speech recognizer for the turn engine
pub struct SpeechCaptureController {
    recognizer: Box<dyn SpeechRecognizer>,
    config: CaptureConfig,
    /// Epoch of the running session, `None` when stopped
    epoch: Option<u64>,
    /// Last interim transcript not yet finalized
    pending: Option<String>,
    last_result_at: Option<Instant>,
    /// Retries since the last successful result
    attempts: u32,
    /// The last session ended without hearing anything
    ended_idle: bool,
}

impl SpeechCaptureController {
    #[must_use]
    pub fn new(recognizer: Box<dyn SpeechRecognizer>, config: CaptureConfig) -> Self {
        Self {
            recognizer,
            config,
            epoch: None,
            pending: None,
            last_result_at: None,
            attempts: 0,
            ended_idle: false,
        }
    }

    /// Start listening; results are tagged with `epoch`
    ///
    /// # Errors
    ///
    /// Returns the classified error if the recognizer refuses to start; the
    /// error counts against the retry budget like any other
    pub fn listen(
        &mut self,
        epoch: u64,
        tx: mpsc::UnboundedSender<TaggedRecognizerEvent>,
    ) -> Result<(), CaptureEvent> {
        self.recognizer.stop();
        self.pending = None;
        self.last_result_at = None;

        let sink = RecognizerSink::new(epoch, tx);
        match self.recognizer.start(&self.config.recognizer, sink) {
            Ok(()) => {
                self.epoch = Some(epoch);
                tracing::debug!(
                    epoch,
                    language = %self.config.recognizer.language,
                    "capture armed"
                );
                Ok(())
            }
            Err(e) => {
                tracing::debug!(
                    epoch,
                    code = %e.code,
                    message = %e.message,
                    "recognizer failed to start"
                );
                Err(self.on_error(epoch, &e.code))
            }
        }
    }

    /// Stop listening; later callbacks for the old epoch are ignored
    pub fn stop(&mut self) {
        if let Some(epoch) = self.epoch.take() {
            tracing::debug!(epoch, "capture stopped");
        }
        self.recognizer.stop();
        self.pending = None;
        self.last_result_at = None;
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.epoch.is_some()
    }

    /// Epoch of the running session
    #[must_use]
    pub const fn epoch(&self) -> Option<u64> {
        self.epoch
    }

    /// Interpret a recognizer callback
    ///
    /// Returns `None` for callbacks that need no reaction, including every
    /// callback from a session other than the current one.
    pub fn handle(&mut self, tagged: TaggedRecognizerEvent, now: Instant) -> Option<CaptureEvent> {
        if self.epoch != Some(tagged.epoch) {
            tracing::debug!(
                epoch = tagged.epoch,
                current = ?self.epoch,
                "ignoring stale recognizer event"
            );
            return None;
        }

        match tagged.event {
            RecognizerEvent::Result {
                text,
                is_final,
                confidence,
            } => self.on_result(&text, is_final, confidence, now),
            RecognizerEvent::Error(code) => {
                self.epoch = None;
                self.recognizer.stop();
                Some(self.on_error(tagged.epoch, &code))
            }
            RecognizerEvent::End => {
                self.epoch = None;
                self.last_result_at = None;
                if let Some(text) = self.pending.take() {
                    tracing::debug!(
                        epoch = tagged.epoch,
                        "recognizer ended mid-utterance, finalizing"
                    );
                    return Some(CaptureEvent::Final(TranscriptEvent {
                        text,
                        is_final: true,
                        confidence: 0.0,
                    }));
                }
                // Back-to-back idle ends wait, so a recognizer that stops
                // right after starting cannot spin the engine
                let delay = if self.ended_idle {
                    self.config.retry.base_delay
                } else {
                    Duration::ZERO
                };
                self.ended_idle = true;
                tracing::debug!(
                    epoch = tagged.epoch,
                    delay_ms = delay.as_millis(),
                    "recognizer session ended, restarting"
                );
                Some(CaptureEvent::Restart {
                    attempt: self.attempts,
                    delay,
                })
            }
        }
    }

    /// When the pending interim transcript should be finalized
    #[must_use]
    pub fn silence_deadline(&self) -> Option<Instant> {
        self.epoch?;
        self.pending.as_ref()?;
        Some(self.last_result_at? + self.config.silence_timeout)
    }

    /// Finalize the pending interim transcript if the silence window passed
    pub fn on_silence(&mut self, now: Instant) -> Option<CaptureEvent> {
        let deadline = self.silence_deadline()?;
        if now < deadline {
            return None;
        }

        let text = self.pending.take()?;
        self.last_result_at = None;
        tracing::debug!(
            epoch = ?self.epoch,
            "silence window elapsed, finalizing interim transcript"
        );

        Some(CaptureEvent::Final(TranscriptEvent {
            text,
            is_final: true,
            confidence: 0.0,
        }))
    }

    fn on_result(
        &mut self,
        text: &str,
        is_final: bool,
        confidence: f32,
        now: Instant,
    ) -> Option<CaptureEvent> {
        self.attempts = 0;
        self.ended_idle = false;
        self.last_result_at = Some(now);
        let text = strip_fillers(text);

        if is_final {
            self.pending = None;
            return Some(CaptureEvent::Final(TranscriptEvent {
                text,
                is_final: true,
                confidence,
            }));
        }

        if !text.is_empty() {
            self.pending = Some(text.clone());
        }

        if confidence < self.config.confidence_threshold {
            tracing::trace!(confidence, "interim result below confidence threshold");
            return None;
        }

        Some(CaptureEvent::Interim(TranscriptEvent {
            text,
            is_final: false,
            confidence,
        }))
    }

    fn on_error(&mut self, epoch: u64, code: &str) -> CaptureEvent {
        let class = classify_error(code);

        match self.config.retry.decide(class, self.attempts) {
            RetryDecision::Retry { attempt, delay } => {
                self.attempts = attempt;
                if self.config.retry.is_exhausted(attempt) {
                    tracing::debug!(
                        epoch,
                        code,
                        attempt,
                        delay_ms = delay.as_millis(),
                        "transient capture error past backoff budget, retrying slowly"
                    );
                } else {
                    tracing::warn!(
                        epoch,
                        code,
                        attempt,
                        delay_ms = delay.as_millis(),
                        "transient capture error, retrying"
                    );
                }
                CaptureEvent::Restart { attempt, delay }
            }
            RetryDecision::GiveUp => {
                tracing::error!(epoch, code, ?class, "capture failed");
                CaptureEvent::Failed(CaptureError {
                    code: code.to_string(),
                    class,
                })
            }
        }
    }
}

/// Classify a recognizer error code
///
/// Unknown codes are treated as transient.
#[must_use]
pub fn classify_error(code: &str) -> ErrorClass {
    if FATAL_CODES.contains(&code) {
        ErrorClass::Fatal
    } else {
        ErrorClass::Transient
    }
}

/// Remove hesitation tokens and collapse whitespace
#[must_use]
pub fn strip_fillers(text: &str) -> String {
    let stripped = FILLERS.replace_all(text, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
