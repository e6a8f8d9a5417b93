//! Reply generation with caching, timeout and fallback

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::cache::{CacheKey, CacheStats, ResponseCache, compress};
use crate::Result;
use crate::context::{Analysis, Prompt, PromptBuilder, PromptConfig, Tone, analyze, tone_of};
use crate::session::SessionContext;

/// Reply used whenever the text-generation service cannot answer
pub const FALLBACK_REPLY: &str = "Sorry, I lost my train of thought for a moment. \
Could you say that again?";

/// Confidence attached to fallback replies
pub const FALLBACK_CONFIDENCE: f32 = 0.5;

/// Confidence attached to generated and cached replies
pub const GENERATED_CONFIDENCE: f32 = 0.9;

/// Default generation timeout
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(15);

/// Default period between sweeps of expired cache entries
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Prompt-in, text-out generation service
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate reply text for a prompt
    ///
    /// # Errors
    ///
    /// Returns error if the service is unreachable, rate-limited or rejects
    /// the request
    async fn generate(&self, prompt: &Prompt) -> Result<String>;
}

/// Where a reply came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    Cached,
    Generated,
    Fallback,
}

impl ReplySource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Generated => "generated",
            Self::Fallback => "fallback",
        }
    }
}

/// A character reply ready to be spoken
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    /// Tone of the reply text, drives prosody
    pub emotion: Tone,
    pub confidence: f32,
    pub source: ReplySource,
    /// Classification of the user message this replies to
    pub analysis: Analysis,
}

/// Generator settings
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Upper bound on a single generation call
    pub timeout: Duration,
    /// Period of the expired-entry sweep, must be non-zero
    pub sweep_interval: Duration,
    pub prompt: PromptConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_GENERATION_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            prompt: PromptConfig::default(),
        }
    }
}

/// Produces replies: cache first, then the generation service, then fallback
pub struct ResponseGenerator {
    backend: Arc<dyn TextGenerator>,
    cache: Mutex<ResponseCache>,
    prompts: PromptBuilder,
    timeout: Duration,
    sweep_interval: Duration,
}

impl ResponseGenerator {
    #[must_use]
    pub fn new(
        backend: Arc<dyn TextGenerator>,
        cache: ResponseCache,
        config: GeneratorConfig,
    ) -> Self {
        Self {
            backend,
            cache: Mutex::new(cache),
            prompts: PromptBuilder::new(config.prompt),
            timeout: config.timeout,
            sweep_interval: config.sweep_interval,
        }
    }

    /// Produce a reply to `message`
    ///
    /// `session` is the session as it stood when the message was finalized.
    /// Never fails: service errors, timeouts and empty output yield the
    /// fallback reply.
    pub async fn generate(&self, message: &str, session: &SessionContext) -> Reply {
        let analysis = analyze(message, &session.history.recent(1));
        let key = CacheKey::new(message, session.persona.id(), analysis.emotional_tone);

        let cached = self.cache.lock().await.get(&key);
        if let Some(text) = cached {
            tracing::debug!(persona = %key.persona_id, tone = %key.tone, "reply cache hit");
            return Self::reply(text, ReplySource::Cached, analysis);
        }

        let prompt = self.prompts.build(message, &analysis, session);

        match tokio::time::timeout(self.timeout, self.backend.generate(&prompt)).await {
            Ok(Ok(raw)) => {
                let text = compress(raw.trim());
                if text.is_empty() {
                    tracing::warn!("generation returned empty text, using fallback");
                    return Self::fallback(analysis);
                }

                self.cache.lock().await.put(key, text.clone());
                Self::reply(text, ReplySource::Generated, analysis)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "generation failed, using fallback");
                Self::fallback(analysis)
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis(),
                    "generation timed out, using fallback"
                );
                Self::fallback(analysis)
            }
        }
    }

    /// Drop expired cache entries
    pub async fn evict_expired(&self) -> usize {
        self.cache.lock().await.evict()
    }

    /// Sweep expired cache entries every `sweep_interval` until aborted
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let generator = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(generator.sweep_interval);
            // Skip the first immediate tick
            interval.tick().await;

            loop {
                interval.tick().await;
                let evicted = generator.evict_expired().await;
                if evicted > 0 {
                    tracing::debug!(evicted, "swept expired replies");
                }
            }
        })
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.lock().await.stats()
    }

    fn reply(text: String, source: ReplySource, analysis: Analysis) -> Reply {
        Reply {
            emotion: tone_of(&text),
            text,
            confidence: GENERATED_CONFIDENCE,
            source,
            analysis,
        }
    }

    fn fallback(analysis: Analysis) -> Reply {
        Reply {
            text: FALLBACK_REPLY.to_string(),
            emotion: Tone::Neutral,
            confidence: FALLBACK_CONFIDENCE,
            source: ReplySource::Fallback,
            analysis,
        }
    }
}
