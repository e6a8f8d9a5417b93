//! Character reply production
//!
//! [`ResponseGenerator`] checks the [`ResponseCache`], builds a prompt and
//! calls the [`TextGenerator`] under a timeout, falling back to a fixed
//! reply when the service cannot answer.

mod cache;
mod generator;

pub use cache::{
    CacheKey, CacheStats, CachedResponse, DEFAULT_CAPACITY, DEFAULT_TTL_SECS, ResponseCache,
    compress, normalize_message,
};
pub use generator::{
    DEFAULT_GENERATION_TIMEOUT, DEFAULT_SWEEP_INTERVAL, FALLBACK_CONFIDENCE, FALLBACK_REPLY,
    GENERATED_CONFIDENCE, GeneratorConfig, Reply, ReplySource, ResponseGenerator, TextGenerator,
};
