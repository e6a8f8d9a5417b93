//! TOML configuration file loading
//!
//! Supports `~/.config/colloquy/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;
use crate::persona::VoiceProfile;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ColloquyConfigFile {
    /// Turn-taking settings
    #[serde(default)]
    pub engine: EngineFileConfig,

    /// Speech capture settings
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Reply cache settings
    #[serde(default)]
    pub cache: CacheFileConfig,

    /// Text generation settings
    #[serde(default)]
    pub generation: GenerationFileConfig,

    /// Voice selection
    #[serde(default)]
    pub voice: VoiceFileConfig,
}

/// Turn-taking configuration
#[derive(Debug, Default, Deserialize)]
pub struct EngineFileConfig {
    /// Final transcripts must be longer than this many characters
    pub min_transcript_chars: Option<usize>,

    /// Messages kept in the in-process history
    pub history_limit: Option<usize>,

    /// History messages included in each prompt
    pub prompt_history_turns: Option<usize>,

    /// Exchanges kept in context memory
    pub memory_capacity: Option<usize>,
}

/// Speech capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// Recognition language (e.g. "en-US")
    pub language: Option<String>,

    /// Interim results below this confidence are not shown
    pub confidence_threshold: Option<f32>,

    /// Silence before an interim transcript is finalized
    pub silence_timeout_ms: Option<u64>,

    /// Transient retries that back off before settling at the max delay
    pub max_retries: Option<u32>,

    pub retry_base_delay_ms: Option<u64>,

    pub retry_max_delay_ms: Option<u64>,
}

/// Reply cache configuration
#[derive(Debug, Default, Deserialize)]
pub struct CacheFileConfig {
    pub ttl_secs: Option<u64>,
    pub capacity: Option<usize>,
    /// How often expired replies are swept out
    pub sweep_secs: Option<u64>,
}

/// Text generation configuration
#[derive(Debug, Default, Deserialize)]
pub struct GenerationFileConfig {
    /// Base URL of an OpenAI-compatible API
    pub base_url: Option<String>,

    /// Model identifier (e.g. "gpt-4o-mini")
    pub model: Option<String>,

    /// Upper bound on one generation call
    pub timeout_secs: Option<u64>,

    pub max_tokens: Option<u32>,

    pub temperature: Option<f32>,

    /// API key; prefer the environment
    pub api_key: Option<String>,
}

/// Voice selection configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Voice used when a persona has none
    pub default_voice: Option<String>,

    /// Voice profiles keyed by persona id
    #[serde(default)]
    pub personas: HashMap<String, VoiceProfile>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ColloquyConfigFile::default()` if the file doesn't exist or can't
/// be parsed.
pub fn load_config_file() -> ColloquyConfigFile {
    let Some(path) = config_file_path() else {
        return ColloquyConfigFile::default();
    };

    if !path.exists() {
        return ColloquyConfigFile::default();
    }

    match load_config_file_from(&path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            ColloquyConfigFile::default()
        }
    }
}

/// Load and parse a specific config file
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn load_config_file_from(path: &Path) -> Result<ColloquyConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Return the config file path: `~/.config/colloquy/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("colloquy").join("config.toml"))
}
