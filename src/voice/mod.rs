//! Voice processing module
//!
//! Handles speech capture (recognizer supervision, silence finalization and
//! restart policy) and speech synthesis (voice selection, prosody and
//! playback lifecycle).

mod capture;
mod recognizer;
mod retry;
mod synthesis;

pub use capture::{
    CaptureConfig, CaptureError, CaptureEvent, DEFAULT_SILENCE_TIMEOUT, SpeechCaptureController,
    TranscriptEvent, classify_error, strip_fillers,
};
pub use recognizer::{
    RecognizerConfig, RecognizerError, RecognizerEvent, RecognizerSink, SpeechRecognizer,
    TaggedRecognizerEvent,
};
pub use retry::{ErrorClass, RetryDecision, RetryPolicy, delay_for_attempt};
pub use synthesis::{
    DEFAULT_VOICE, PlaybackOutcome, Prosody, SpeechSynthesisController, SpeechSynthesizer,
    SynthesisError, Utterance, VoiceTable,
};
