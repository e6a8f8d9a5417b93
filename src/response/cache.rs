//! Bounded, time-boxed reply cache
//!
//! Entries expire `ttl` after they were stored and are dropped lazily on
//! access or in bulk by [`ResponseCache::evict`]. Above capacity the least
//! recently accessed entry goes first.

use std::num::NonZeroUsize;
use std::sync::LazyLock;
use std::time::Duration;

use lru::LruCache;
use regex::Regex;
use serde::Serialize;
use tokio::time::Instant;

use crate::context::Tone;

/// Default time-to-live (5 minutes)
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Default number of cached replies
pub const DEFAULT_CAPACITY: usize = 100;

static FILLER_PHRASES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:you know|i mean|basically)\b,?").expect("valid regex")
});

static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,.!?;:])").expect("valid regex"));

/// Identity of a cached reply
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Normalized user message
    pub message: String,
    pub persona_id: String,
    /// Emotional context the reply was generated for
    pub tone: Tone,
}

impl CacheKey {
    #[must_use]
    pub fn new(message: &str, persona_id: &str, tone: Tone) -> Self {
        Self {
            message: normalize_message(message),
            persona_id: persona_id.to_string(),
            tone,
        }
    }
}

/// A stored reply with its bookkeeping
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub key: CacheKey,
    pub payload: String,
    pub created_at: Instant,
    pub access_count: u64,
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// LRU reply cache with a TTL on every entry
#[derive(Debug)]
pub struct ResponseCache {
    entries: LruCache<CacheKey, CachedResponse>,
    ttl: Duration,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TTL_SECS), DEFAULT_CAPACITY)
    }
}

impl ResponseCache {
    /// Create a cache; a zero capacity is treated as one
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Look up a reply
    pub fn get(&mut self, key: &CacheKey) -> Option<String> {
        self.get_at(key, Instant::now())
    }

    /// Look up a reply as of `now`
    pub fn get_at(&mut self, key: &CacheKey, now: Instant) -> Option<String> {
        let expired = match self.entries.peek(key) {
            None => {
                self.misses += 1;
                return None;
            }
            Some(entry) => self.is_expired(entry, now),
        };

        if expired {
            self.entries.pop(key);
            self.evictions += 1;
            self.misses += 1;
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.access_count += 1;
        self.hits += 1;
        Some(entry.payload.clone())
    }

    /// Store a reply
    pub fn put(&mut self, key: CacheKey, payload: impl Into<String>) {
        self.put_at(key, payload, Instant::now());
    }

    /// Store a reply as of `now`
    pub fn put_at(&mut self, key: CacheKey, payload: impl Into<String>, now: Instant) {
        let entry = CachedResponse {
            key: key.clone(),
            payload: payload.into(),
            created_at: now,
            access_count: 0,
        };

        // Replacing an existing key is not an eviction
        let replacing = self.entries.contains(&key);
        if self.entries.push(key, entry).is_some() && !replacing {
            self.evictions += 1;
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub fn evict(&mut self) -> usize {
        self.evict_at(Instant::now())
    }

    /// Drop entries expired as of `now`
    pub fn evict_at(&mut self, now: Instant) -> usize {
        let expired: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.pop(key);
        }

        self.evictions += expired.len() as u64;
        expired.len()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            entries: self.entries.len(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &CachedResponse, now: Instant) -> bool {
        now.saturating_duration_since(entry.created_at) > self.ttl
    }
}

/// Normalize a user message for cache lookups
///
/// Lowercases, collapses whitespace and drops trailing punctuation so that
/// "Hello there!" and "hello  there" share an entry.
#[must_use]
pub fn normalize_message(message: &str) -> String {
    let collapsed = message
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_string()
}

/// Strip redundant filler phrases from a reply
#[must_use]
pub fn compress(text: &str) -> String {
    let stripped = FILLER_PHRASES.replace_all(text, " ");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    SPACE_BEFORE_PUNCT
        .replace_all(&collapsed, "$1")
        .trim_start_matches([',', ' '])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(message: &str) -> CacheKey {
        CacheKey::new(message, "maya", Tone::Neutral)
    }

    #[test]
    fn get_after_put_returns_payload() {
        let mut cache = ResponseCache::default();
        let now = Instant::now();
        cache.put_at(key("hello"), "Hi there!", now);

        assert_eq!(cache.get_at(&key("hello"), now).as_deref(), Some("Hi there!"));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn expired_entry_misses() {
        let mut cache = ResponseCache::new(Duration::from_secs(300), 10);
        let now = Instant::now();
        cache.put_at(key("hello"), "Hi", now);

        let within = now + Duration::from_secs(300);
        assert!(cache.get_at(&key("hello"), within).is_some());

        let after = now + Duration::from_secs(301);
        assert!(cache.get_at(&key("hello"), after).is_none());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_drops_least_recently_used() {
        let mut cache = ResponseCache::new(Duration::from_secs(300), 2);
        let now = Instant::now();
        cache.put_at(key("one"), "1", now);
        cache.put_at(key("two"), "2", now);

        // Touch "one" so "two" becomes least recently used
        assert!(cache.get_at(&key("one"), now).is_some());
        cache.put_at(key("three"), "3", now);

        assert!(cache.get_at(&key("two"), now).is_none());
        assert!(cache.get_at(&key("one"), now).is_some());
        assert!(cache.get_at(&key("three"), now).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn replacing_a_key_is_not_an_eviction() {
        let mut cache = ResponseCache::new(Duration::from_secs(300), 2);
        let now = Instant::now();
        cache.put_at(key("one"), "1", now);
        cache.put_at(key("one"), "uno", now);

        assert_eq!(cache.get_at(&key("one"), now).as_deref(), Some("uno"));
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evict_removes_only_expired() {
        let mut cache = ResponseCache::new(Duration::from_secs(10), 10);
        let start = Instant::now();
        cache.put_at(key("old"), "a", start);
        cache.put_at(key("new"), "b", start + Duration::from_secs(8));

        let removed = cache.evict_at(start + Duration::from_secs(11));
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get_at(&key("new"), start + Duration::from_secs(11)).is_some());
    }

    #[test]
    fn key_distinguishes_persona_and_tone() {
        let mut cache = ResponseCache::default();
        let now = Instant::now();
        cache.put_at(CacheKey::new("hi", "maya", Tone::Happy), "Hey!", now);

        assert!(cache.get_at(&CacheKey::new("hi", "maya", Tone::Sad), now).is_none());
        assert!(cache.get_at(&CacheKey::new("hi", "leo", Tone::Happy), now).is_none());
        assert!(cache.get_at(&CacheKey::new("hi", "maya", Tone::Happy), now).is_some());
    }

    #[test]
    fn normalization_merges_equivalent_messages() {
        assert_eq!(normalize_message("  Hello   THERE!  "), "hello there");
        assert_eq!(key("Hello there?"), key("hello there"));
    }

    #[test]
    fn compress_strips_fillers() {
        assert_eq!(
            compress("Well, you know, I basically love it."),
            "Well, I love it."
        );
        assert_eq!(compress("Basically, yes."), "yes.");
        assert_eq!(compress("I mean , sure"), "sure");
        assert_eq!(compress("Plain   reply"), "Plain reply");
    }

    #[test]
    fn compress_keeps_words_containing_fillers() {
        assert_eq!(compress("Meaning matters"), "Meaning matters");
    }
}
