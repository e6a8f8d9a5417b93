//! Persona configuration
//!
//! A persona is the configured identity of the practice character: who it is,
//! how it talks, and which voice speaks for it. Personas are authored as JSON
//! alongside scenarios and carry an explicit voice profile, so voice selection
//! never has to guess from names.

use serde::{Deserialize, Serialize};

/// A persona defines the identity of a conversation character
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    /// Semantic version of this persona file
    #[serde(default = "default_version")]
    pub version: String,

    /// Core identity (required)
    pub identity: Identity,

    /// Voice configuration
    pub voice: Option<VoiceProfile>,

    /// Behavior and communication style
    pub personality: Option<Personality>,
}

/// Core identity of the character
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Unique identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Short descriptive phrase
    pub tagline: Option<String>,

    /// Longer description used in prompts
    pub description: Option<String>,
}

/// Neutral voice baseline for a persona
///
/// Emotion-driven prosody is applied multiplicatively on top of these values.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceProfile {
    /// Synthesis voice identifier
    pub voice: String,

    /// Speech rate multiplier
    #[serde(default = "default_unit")]
    pub rate: f32,

    /// Pitch multiplier
    #[serde(default = "default_unit")]
    pub pitch: f32,

    /// Output volume (0.0 to 1.0)
    #[serde(default = "default_unit")]
    pub volume: f32,

    /// Primary language (BCP 47 code)
    pub language: Option<String>,
}

impl VoiceProfile {
    /// Profile with a neutral baseline for the given voice
    #[must_use]
    pub fn neutral(voice: impl Into<String>) -> Self {
        Self {
            voice: voice.into(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            language: None,
        }
    }
}

/// Behavior and communication style
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Personality {
    /// Base system prompt
    pub system_prompt: Option<String>,

    /// Default communication tone
    pub tone: Option<String>,

    /// Personality traits
    #[serde(default)]
    pub traits: Vec<String>,

    /// Speaking style notes (e.g. "short sentences, asks follow-up questions")
    pub speaking_style: Option<String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

const fn default_unit() -> f32 {
    1.0
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            version: default_version(),
            identity: Identity {
                id: "partner".to_string(),
                name: "Partner".to_string(),
                tagline: None,
                description: None,
            },
            voice: None,
            personality: None,
        }
    }
}

impl Persona {
    /// Get the unique identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.identity.id
    }

    /// Get the display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Get the system prompt
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.personality.as_ref()?.system_prompt.as_deref()
    }

    /// Get the persona's own voice profile
    #[must_use]
    pub const fn voice_profile(&self) -> Option<&VoiceProfile> {
        self.voice.as_ref()
    }

    /// Personality traits, empty if none are configured
    #[must_use]
    pub fn traits(&self) -> &[String] {
        self.personality
            .as_ref()
            .map_or(&[], |p| p.traits.as_slice())
    }

    /// Render the persona as a prompt description
    #[must_use]
    pub fn describe(&self) -> String {
        let mut lines = vec![format!("You are {}.", self.name())];

        if let Some(tagline) = &self.identity.tagline {
            lines.push(tagline.clone());
        }
        if let Some(description) = &self.identity.description {
            lines.push(description.clone());
        }

        if let Some(personality) = &self.personality {
            if let Some(prompt) = &personality.system_prompt {
                lines.push(prompt.clone());
            }
            if !personality.traits.is_empty() {
                lines.push(format!("Traits: {}.", personality.traits.join(", ")));
            }
            if let Some(tone) = &personality.tone {
                lines.push(format!("Tone: {tone}."));
            }
            if let Some(style) = &personality.speaking_style {
                lines.push(format!("Speaking style: {style}."));
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_persona_has_partner_identity() {
        let p = Persona::default();
        assert_eq!(p.id(), "partner");
        assert_eq!(p.name(), "Partner");
        assert_eq!(p.version, "1.0.0");
        assert!(p.voice_profile().is_none());
        assert!(p.traits().is_empty());
    }

    #[test]
    fn parses_persona_json_with_voice_defaults() {
        let json = r#"{
            "identity": { "id": "maya", "name": "Maya" },
            "voice": { "voice": "nova", "pitch": 1.1 },
            "personality": { "traits": ["warm", "curious"], "tone": "casual" }
        }"#;

        let p: Persona = serde_json::from_str(json).unwrap();
        let voice = p.voice_profile().unwrap();
        assert_eq!(voice.voice, "nova");
        assert!((voice.rate - 1.0).abs() < f32::EPSILON);
        assert!((voice.pitch - 1.1).abs() < f32::EPSILON);
        assert_eq!(p.traits(), &["warm".to_string(), "curious".to_string()]);
    }

    #[test]
    fn describe_includes_traits_and_tone() {
        let p = Persona {
            personality: Some(Personality {
                traits: vec!["patient".to_string()],
                tone: Some("friendly".to_string()),
                ..Personality::default()
            }),
            ..Persona::default()
        };

        let text = p.describe();
        assert!(text.starts_with("You are Partner."));
        assert!(text.contains("Traits: patient."));
        assert!(text.contains("Tone: friendly."));
    }
}
