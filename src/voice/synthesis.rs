//! Speech synthesis controller
//!
//! Resolves the voice for a persona from an explicit table, applies
//! emotion-driven prosody and runs playback through a [`SpeechSynthesizer`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::Tone;
use crate::persona::{Persona, VoiceProfile};
use crate::{Error, Result};

/// Voice used when neither the table nor the persona names one
pub const DEFAULT_VOICE: &str = "default";

/// Errors reported by a synthesis engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    /// Playback was cancelled before it finished
    #[error("playback interrupted")]
    Interrupted,

    /// Synthesis or playback failed
    #[error("synthesis failed: {0}")]
    Failed(String),
}

/// A fully specified request to speak
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Utterance {
    pub text: String,
    pub voice: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub language: Option<String>,
}

/// How playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The utterance played to the end
    Completed,
    /// Playback was stopped deliberately
    Interrupted,
}

/// A speech synthesis engine
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak an utterance, resolving when playback ends
    ///
    /// # Errors
    ///
    /// Returns [`SynthesisError::Interrupted`] if [`cancel`](Self::cancel)
    /// stopped playback, [`SynthesisError::Failed`] otherwise
    async fn speak(&self, utterance: Utterance) -> std::result::Result<(), SynthesisError>;

    /// Stop any playback in progress
    fn cancel(&self);
}

/// Multiplicative prosody adjustment for an emotional tone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prosody {
    pub rate: f32,
    pub pitch: f32,
}

impl Prosody {
    pub const NEUTRAL: Self = Self {
        rate: 1.0,
        pitch: 1.0,
    };

    /// Adjustment applied to the voice baseline for `tone`
    #[must_use]
    pub const fn for_tone(tone: Tone) -> Self {
        match tone {
            Tone::Sad => Self {
                rate: 0.8,
                pitch: 0.9,
            },
            Tone::Excited => Self {
                rate: 1.2,
                pitch: 1.2,
            },
            Tone::Happy => Self {
                rate: 1.1,
                pitch: 1.1,
            },
            Tone::Angry => Self {
                rate: 1.1,
                pitch: 0.9,
            },
            Tone::Neutral => Self::NEUTRAL,
        }
    }
}

/// Explicit persona-to-voice assignments
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VoiceTable {
    /// Voice profiles keyed by persona id
    #[serde(default)]
    pub voices: HashMap<String, VoiceProfile>,
    /// Voice used when nothing else applies
    pub default_voice: Option<String>,
}

impl VoiceTable {
    /// Assign a voice profile to a persona
    pub fn insert(&mut self, persona_id: impl Into<String>, profile: VoiceProfile) {
        self.voices.insert(persona_id.into(), profile);
    }

    /// Resolve a persona's voice: table entry, then the persona's own
    /// profile, then the default voice
    #[must_use]
    pub fn resolve(&self, persona: &Persona) -> VoiceProfile {
        if let Some(profile) = self.voices.get(persona.id()) {
            return profile.clone();
        }
        if let Some(profile) = persona.voice_profile() {
            return profile.clone();
        }
        VoiceProfile::neutral(self.default_voice.as_deref().unwrap_or(DEFAULT_VOICE))
    }
}

/// Speaks replies with the right voice and prosody
#[derive(Clone)]
pub struct SpeechSynthesisController {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voices: Arc<VoiceTable>,
}

impl SpeechSynthesisController {
    #[must_use]
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, voices: VoiceTable) -> Self {
        Self {
            synthesizer,
            voices: Arc::new(voices),
        }
    }

    /// Build the utterance for `text` spoken by `persona` in `emotion`
    #[must_use]
    pub fn utterance(&self, text: &str, persona: &Persona, emotion: Tone) -> Utterance {
        let profile = self.voices.resolve(persona);
        let prosody = Prosody::for_tone(emotion);

        Utterance {
            text: text.to_string(),
            voice: profile.voice,
            rate: profile.rate * prosody.rate,
            pitch: profile.pitch * prosody.pitch,
            volume: profile.volume,
            language: profile.language,
        }
    }

    /// Speak and wait for playback to end
    ///
    /// An interruption is a normal outcome.
    ///
    /// # Errors
    ///
    /// Returns error if the synthesis engine fails for any other reason
    pub async fn speak(
        &self,
        text: &str,
        persona: &Persona,
        emotion: Tone,
    ) -> Result<PlaybackOutcome> {
        let utterance = self.utterance(text, persona, emotion);
        tracing::debug!(
            voice = %utterance.voice,
            rate = utterance.rate,
            pitch = utterance.pitch,
            %emotion,
            "speaking"
        );

        match self.synthesizer.speak(utterance).await {
            Ok(()) => Ok(PlaybackOutcome::Completed),
            Err(SynthesisError::Interrupted) => {
                tracing::debug!("playback interrupted");
                Ok(PlaybackOutcome::Interrupted)
            }
            Err(SynthesisError::Failed(reason)) => Err(Error::Synthesis(reason)),
        }
    }

    /// Stop playback in progress
    pub fn stop(&self) {
        self.synthesizer.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::persona::Identity;

    struct Recording {
        spoken: Mutex<Vec<Utterance>>,
        outcome: std::result::Result<(), SynthesisError>,
    }

    impl Recording {
        fn new(outcome: std::result::Result<(), SynthesisError>) -> Arc<Self> {
            Arc::new(Self {
                spoken: Mutex::new(Vec::new()),
                outcome,
            })
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for Recording {
        async fn speak(&self, utterance: Utterance) -> std::result::Result<(), SynthesisError> {
            self.spoken.lock().unwrap().push(utterance);
            self.outcome.clone()
        }

        fn cancel(&self) {}
    }

    fn persona(id: &str, voice: Option<VoiceProfile>) -> Persona {
        Persona {
            identity: Identity {
                id: id.to_string(),
                name: id.to_string(),
                tagline: None,
                description: None,
            },
            voice,
            ..Persona::default()
        }
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn sad_and_excited_prosody() {
        let controller =
            SpeechSynthesisController::new(Recording::new(Ok(())), VoiceTable::default());
        let p = persona("maya", None);

        let sad = controller.utterance("oh no", &p, Tone::Sad);
        assert!(close(sad.rate, 0.8) && close(sad.pitch, 0.9), "{sad:?}");

        let excited = controller.utterance("wow", &p, Tone::Excited);
        assert!(close(excited.rate, 1.2) && close(excited.pitch, 1.2), "{excited:?}");

        let neutral = controller.utterance("ok", &p, Tone::Neutral);
        assert!(close(neutral.rate, 1.0) && close(neutral.pitch, 1.0));
    }

    #[test]
    fn prosody_scales_the_voice_baseline() {
        let profile = VoiceProfile {
            rate: 1.5,
            pitch: 0.5,
            ..VoiceProfile::neutral("deep")
        };
        let controller =
            SpeechSynthesisController::new(Recording::new(Ok(())), VoiceTable::default());
        let u = controller.utterance("yay", &persona("leo", Some(profile)), Tone::Happy);

        assert_eq!(u.voice, "deep");
        assert!(close(u.rate, 1.65), "{u:?}");
        assert!(close(u.pitch, 0.55), "{u:?}");
    }

    #[test]
    fn voice_resolution_order() {
        let mut table = VoiceTable {
            default_voice: Some("fallback".to_string()),
            ..VoiceTable::default()
        };
        table.insert("maya", VoiceProfile::neutral("table-voice"));

        let own = Some(VoiceProfile::neutral("own-voice"));
        assert_eq!(table.resolve(&persona("maya", own.clone())).voice, "table-voice");
        assert_eq!(table.resolve(&persona("leo", own)).voice, "own-voice");
        assert_eq!(table.resolve(&persona("ana", None)).voice, "fallback");
        assert_eq!(VoiceTable::default().resolve(&persona("ana", None)).voice, DEFAULT_VOICE);
    }

    #[tokio::test]
    async fn interruption_is_a_normal_outcome() {
        let controller = SpeechSynthesisController::new(
            Recording::new(Err(SynthesisError::Interrupted)),
            VoiceTable::default(),
        );
        let outcome = controller
            .speak("hello", &persona("maya", None), Tone::Neutral)
            .await
            .unwrap();
        assert_eq!(outcome, PlaybackOutcome::Interrupted);
    }

    #[tokio::test]
    async fn engine_failure_is_an_error() {
        let controller = SpeechSynthesisController::new(
            Recording::new(Err(SynthesisError::Failed("device busy".to_string()))),
            VoiceTable::default(),
        );
        let result = controller
            .speak("hello", &persona("maya", None), Tone::Neutral)
            .await;
        assert!(matches!(result, Err(Error::Synthesis(reason)) if reason == "device busy"));
    }

    #[tokio::test]
    async fn completed_playback_records_utterance() {
        let synth = Recording::new(Ok(()));
        let controller = SpeechSynthesisController::new(synth.clone(), VoiceTable::default());
        let outcome = controller
            .speak("great to see you", &persona("maya", None), Tone::Happy)
            .await
            .unwrap();

        assert_eq!(outcome, PlaybackOutcome::Completed);
        let spoken = synth.spoken.lock().unwrap();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].text, "great to see you");
    }
}
