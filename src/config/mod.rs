//! Configuration management
//!
//! Settings resolve with priority env > TOML file > defaults. Personas and
//! scenarios come from override directories when set, otherwise from the
//! copies compiled into the binary.

mod file;

pub use file::{
    CacheFileConfig, CaptureFileConfig, ColloquyConfigFile, EngineFileConfig,
    GenerationFileConfig, VoiceFileConfig, config_file_path, load_config_file,
    load_config_file_from,
};

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::context::PromptConfig;
use crate::persona::Persona;
use crate::response::{
    DEFAULT_CAPACITY, DEFAULT_GENERATION_TIMEOUT, DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL_SECS,
    GeneratorConfig, ResponseCache,
};
use crate::session::Scenario;
use crate::turn::{DEFAULT_MIN_TRANSCRIPT_CHARS, MachineConfig};
use crate::voice::{CaptureConfig, RecognizerConfig, RetryPolicy, VoiceTable};
use crate::{Error, Result};

/// Default OpenAI-compatible endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default generation model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Scenario used when none is named
pub const DEFAULT_SCENARIO_ID: &str = "small-talk";

/// Engine-level settings
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub min_transcript_chars: usize,
    pub history_limit: usize,
    pub prompt_history_turns: usize,
    pub memory_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            min_transcript_chars: DEFAULT_MIN_TRANSCRIPT_CHARS,
            history_limit: 200,
            prompt_history_turns: 10,
            memory_capacity: crate::context::DEFAULT_MEMORY_CAPACITY,
        }
    }
}

/// Reply cache settings
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub capacity: usize,
    pub sweep_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            capacity: DEFAULT_CAPACITY,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Text generation settings
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    pub api_key: Option<SecretString>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_GENERATION_TIMEOUT,
            max_tokens: 150,
            temperature: 0.8,
            api_key: None,
        }
    }
}

/// Resolved configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub engine: EngineSettings,
    pub capture: CaptureConfig,
    pub cache: CacheSettings,
    pub generation: GenerationSettings,
    pub voices: VoiceTable,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if the resolved values are out of range
    pub fn load() -> Result<Self> {
        Self::resolve(load_config_file(), |key| std::env::var(key).ok())
    }

    /// Resolve a parsed config file against an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the resolved values are out of range
    pub fn resolve(
        file: ColloquyConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let defaults = Self::default();

        let engine = EngineSettings {
            min_transcript_chars: env_parse(&env, "COLLOQUY_MIN_TRANSCRIPT_CHARS")
                .or(file.engine.min_transcript_chars)
                .unwrap_or(defaults.engine.min_transcript_chars),
            history_limit: env_parse(&env, "COLLOQUY_HISTORY_LIMIT")
                .or(file.engine.history_limit)
                .unwrap_or(defaults.engine.history_limit),
            prompt_history_turns: env_parse(&env, "COLLOQUY_PROMPT_HISTORY_TURNS")
                .or(file.engine.prompt_history_turns)
                .unwrap_or(defaults.engine.prompt_history_turns),
            memory_capacity: env_parse(&env, "COLLOQUY_MEMORY_CAPACITY")
                .or(file.engine.memory_capacity)
                .unwrap_or(defaults.engine.memory_capacity),
        };

        let default_retry = RetryPolicy::default();
        let capture = CaptureConfig {
            recognizer: RecognizerConfig {
                language: env("COLLOQUY_LANGUAGE")
                    .or(file.capture.language)
                    .unwrap_or(defaults.capture.recognizer.language),
                ..RecognizerConfig::default()
            },
            confidence_threshold: env_parse(&env, "COLLOQUY_CONFIDENCE_THRESHOLD")
                .or(file.capture.confidence_threshold)
                .unwrap_or(defaults.capture.confidence_threshold),
            silence_timeout: env_parse(&env, "COLLOQUY_SILENCE_TIMEOUT_MS")
                .or(file.capture.silence_timeout_ms)
                .map_or(defaults.capture.silence_timeout, Duration::from_millis),
            retry: RetryPolicy {
                max_retries: env_parse(&env, "COLLOQUY_MAX_RETRIES")
                    .or(file.capture.max_retries)
                    .unwrap_or(default_retry.max_retries),
                base_delay: file
                    .capture
                    .retry_base_delay_ms
                    .map_or(default_retry.base_delay, Duration::from_millis),
                max_delay: file
                    .capture
                    .retry_max_delay_ms
                    .map_or(default_retry.max_delay, Duration::from_millis),
            },
        };

        let cache = CacheSettings {
            ttl: env_parse(&env, "COLLOQUY_CACHE_TTL_SECS")
                .or(file.cache.ttl_secs)
                .map_or(defaults.cache.ttl, Duration::from_secs),
            capacity: env_parse(&env, "COLLOQUY_CACHE_CAPACITY")
                .or(file.cache.capacity)
                .unwrap_or(defaults.cache.capacity),
            sweep_interval: env_parse(&env, "COLLOQUY_CACHE_SWEEP_SECS")
                .or(file.cache.sweep_secs)
                .map_or(defaults.cache.sweep_interval, Duration::from_secs),
        };

        let generation = GenerationSettings {
            base_url: env("COLLOQUY_BASE_URL")
                .or(file.generation.base_url)
                .unwrap_or(defaults.generation.base_url),
            model: env("COLLOQUY_MODEL")
                .or(file.generation.model)
                .unwrap_or(defaults.generation.model),
            timeout: env_parse(&env, "COLLOQUY_GENERATION_TIMEOUT_SECS")
                .or(file.generation.timeout_secs)
                .map_or(defaults.generation.timeout, Duration::from_secs),
            max_tokens: file
                .generation
                .max_tokens
                .unwrap_or(defaults.generation.max_tokens),
            temperature: file
                .generation
                .temperature
                .unwrap_or(defaults.generation.temperature),
            api_key: env("COLLOQUY_API_KEY")
                .or_else(|| env("OPENAI_API_KEY"))
                .or(file.generation.api_key)
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
        };

        let voices = VoiceTable {
            voices: file.voice.personas,
            default_voice: env("COLLOQUY_DEFAULT_VOICE").or(file.voice.default_voice),
        };

        let config = Self {
            engine,
            capture,
            cache,
            generation,
            voices,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.capture.confidence_threshold) {
            return Err(Error::Config(format!(
                "confidence_threshold must be between 0 and 1, got {}",
                self.capture.confidence_threshold
            )));
        }
        if self.cache.capacity == 0 {
            return Err(Error::Config("cache capacity must be at least 1".to_string()));
        }
        if self.cache.sweep_interval.is_zero() {
            return Err(Error::Config("cache sweep interval must be non-zero".to_string()));
        }
        if self.engine.history_limit == 0 {
            return Err(Error::Config("history_limit must be at least 1".to_string()));
        }
        if self.generation.timeout.is_zero() {
            return Err(Error::Config("generation timeout must be non-zero".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub const fn machine_config(&self) -> MachineConfig {
        MachineConfig {
            min_transcript_chars: self.engine.min_transcript_chars,
        }
    }

    #[must_use]
    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            timeout: self.generation.timeout,
            sweep_interval: self.cache.sweep_interval,
            prompt: PromptConfig {
                max_messages: self.engine.prompt_history_turns,
                ..PromptConfig::default()
            },
        }
    }

    #[must_use]
    pub fn response_cache(&self) -> ResponseCache {
        ResponseCache::new(self.cache.ttl, self.cache.capacity)
    }

    /// Load a persona: `COLLOQUY_PERSONAS_DIR` first, then embedded data
    ///
    /// # Errors
    ///
    /// Returns error if the persona exists in neither place
    pub fn load_persona(persona_id: &str) -> Result<Persona> {
        if let Some(dir) = override_dir("COLLOQUY_PERSONAS_DIR") {
            match load_json::<Persona>(&dir, persona_id) {
                Ok(persona) => {
                    tracing::info!(
                        persona_id,
                        path = %dir.display(),
                        "loaded persona from COLLOQUY_PERSONAS_DIR"
                    );
                    return Ok(persona);
                }
                Err(e) => {
                    tracing::warn!(
                        persona_id,
                        error = %e,
                        "COLLOQUY_PERSONAS_DIR set but persona not loadable, continuing"
                    );
                }
            }
        }

        Self::load_embedded_persona(persona_id)
    }

    /// Load a scenario: `COLLOQUY_SCENARIOS_DIR` first, then embedded data
    ///
    /// # Errors
    ///
    /// Returns error if the scenario exists in neither place
    pub fn load_scenario(scenario_id: &str) -> Result<Scenario> {
        if let Some(dir) = override_dir("COLLOQUY_SCENARIOS_DIR") {
            match load_json::<Scenario>(&dir, scenario_id) {
                Ok(scenario) => {
                    tracing::info!(
                        scenario_id,
                        path = %dir.display(),
                        "loaded scenario from COLLOQUY_SCENARIOS_DIR"
                    );
                    return Ok(scenario);
                }
                Err(e) => {
                    tracing::warn!(
                        scenario_id,
                        error = %e,
                        "COLLOQUY_SCENARIOS_DIR set but scenario not loadable, continuing"
                    );
                }
            }
        }

        Self::load_embedded_scenario(scenario_id)
    }

    /// Embedded persona data
    const EMBEDDED_PERSONAS: &[(&str, &str)] = &[
        ("partner", include_str!("../../personas/partner.json")),
        ("maya", include_str!("../../personas/maya.json")),
        ("leo", include_str!("../../personas/leo.json")),
    ];

    /// Embedded scenario data
    const EMBEDDED_SCENARIOS: &[(&str, &str)] = &[
        ("small-talk", include_str!("../../scenarios/small-talk.json")),
        ("cafe-order", include_str!("../../scenarios/cafe-order.json")),
        ("job-interview", include_str!("../../scenarios/job-interview.json")),
    ];

    /// Load an embedded persona compiled into the binary
    ///
    /// # Errors
    ///
    /// Returns error if persona ID is not found in embedded data
    pub fn load_embedded_persona(persona_id: &str) -> Result<Persona> {
        let (_, json) = Self::EMBEDDED_PERSONAS
            .iter()
            .find(|(id, _)| *id == persona_id)
            .ok_or_else(|| Error::PersonaNotFound(persona_id.to_string()))?;
        let persona = serde_json::from_str(json)?;
        tracing::debug!(persona_id, "loaded persona from embedded data");
        Ok(persona)
    }

    /// Load an embedded scenario compiled into the binary
    ///
    /// # Errors
    ///
    /// Returns error if scenario ID is not found in embedded data
    pub fn load_embedded_scenario(scenario_id: &str) -> Result<Scenario> {
        let (_, json) = Self::EMBEDDED_SCENARIOS
            .iter()
            .find(|(id, _)| *id == scenario_id)
            .ok_or_else(|| Error::Scenario(format!("unknown scenario: {scenario_id}")))?;
        let scenario = serde_json::from_str(json)?;
        tracing::debug!(scenario_id, "loaded scenario from embedded data");
        Ok(scenario)
    }

    /// Return the embedded persona array for enumeration
    #[must_use]
    pub const fn embedded_personas() -> &'static [(&'static str, &'static str)] {
        Self::EMBEDDED_PERSONAS
    }

    /// Return the embedded scenario array for enumeration
    #[must_use]
    pub const fn embedded_scenarios() -> &'static [(&'static str, &'static str)] {
        Self::EMBEDDED_SCENARIOS
    }
}

/// Parse an environment value, ignoring (with a warning) values that don't parse
fn env_parse<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}

fn override_dir(var: &str) -> Option<PathBuf> {
    let dir = PathBuf::from(std::env::var(var).ok()?);
    if dir.is_dir() {
        Some(dir)
    } else {
        tracing::warn!(path = %dir.display(), "{var} set but directory does not exist");
        None
    }
}

/// Load `<dir>/<id>.json`
fn load_json<T: serde::de::DeserializeOwned>(dir: &Path, id: &str) -> Result<T> {
    let path = dir.join(format!("{id}.json"));
    let content = std::fs::read_to_string(&path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
}
