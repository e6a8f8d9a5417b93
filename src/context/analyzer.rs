//! Transcript classification
//!
//! Classifies a transcript's topic continuity, emotional tone and intent from
//! keyword membership. Pure and side-effect free; the output feeds both the
//! response cache key and the prompt.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::ConversationMessage;

/// Whether a transcript continues the previous turn's topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicContinuity {
    New,
    Continuing,
}

/// Detected emotional tone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Happy,
    Sad,
    Angry,
    Excited,
    #[default]
    Neutral,
}

impl Tone {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Excited => "excited",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detected conversational intent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Question,
    Request,
    Statement,
    Greeting,
    #[default]
    Unknown,
}

impl Intent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Request => "request",
            Self::Statement => "statement",
            Self::Greeting => "greeting",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a single transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub topic_continuity: TopicContinuity,
    pub emotional_tone: Tone,
    pub intent: Intent,
}

impl Analysis {
    /// Tags recorded alongside context memory entries
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        let topic = match self.topic_continuity {
            TopicContinuity::New => "topic:new",
            TopicContinuity::Continuing => "topic:continuing",
        };
        vec![
            topic.to_string(),
            format!("tone:{}", self.emotional_tone),
            format!("intent:{}", self.intent),
        ]
    }
}

/// Tone keyword sets, tested in order; first match wins
const TONE_KEYWORDS: &[(Tone, &[&str])] = &[
    (
        Tone::Happy,
        &["happy", "glad", "great", "wonderful", "pleased", "delighted", "love", "enjoy"],
    ),
    (
        Tone::Sad,
        &["sad", "unhappy", "upset", "depressed", "lonely", "miss", "disappointed", "sorry"],
    ),
    (
        Tone::Angry,
        &["angry", "mad", "furious", "annoyed", "frustrated", "hate", "irritated"],
    ),
    (
        Tone::Excited,
        &["excited", "amazing", "awesome", "thrilled", "incredible", "wow", "can't wait"],
    ),
];

const QUESTION_OPENERS: &[&str] = &[
    "what", "why", "how", "when", "where", "who", "which", "is", "are", "can", "could", "do",
    "does", "did", "will", "would", "should", "have", "has",
];

const REQUEST_MARKERS: &[&str] = &[
    "please", "i need", "i want", "i'd like", "i would like", "let me", "let's", "help me",
    "give me", "tell me", "show me",
];

const STATEMENT_MARKERS: &[&str] = &[
    "i think", "i believe", "i feel", "i am", "i'm", "i was", "i have", "it is", "it's",
    "my ", "we ", "there is", "there's",
];

const GREETING_MARKERS: &[&str] = &[
    "hello", "hi", "hey", "good morning", "good afternoon", "good evening", "howdy",
    "nice to meet",
];

/// Analyze a transcript against the dialogue that preceded it
#[must_use]
pub fn analyze(text: &str, history: &[ConversationMessage]) -> Analysis {
    let normalized = text.trim().to_lowercase();
    let words = tokenize(&normalized);

    Analysis {
        topic_continuity: topic_continuity(&words, history.last()),
        emotional_tone: detect_tone(&normalized, &words),
        intent: detect_intent(&normalized, &words),
    }
}

/// Detect tone alone, used to tag generated replies
#[must_use]
pub fn tone_of(text: &str) -> Tone {
    let normalized = text.trim().to_lowercase();
    let words = tokenize(&normalized);
    detect_tone(&normalized, &words)
}

fn tokenize(normalized: &str) -> Vec<String> {
    normalized
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn content_words(words: &[String]) -> HashSet<&str> {
    words
        .iter()
        .map(String::as_str)
        .filter(|w| w.chars().count() > 3)
        .collect()
}

fn topic_continuity(words: &[String], previous: Option<&ConversationMessage>) -> TopicContinuity {
    let Some(previous) = previous else {
        return TopicContinuity::New;
    };

    let previous_words = tokenize(&previous.text.to_lowercase());
    let previous_content = content_words(&previous_words);
    let shares_content = content_words(words)
        .iter()
        .any(|w| previous_content.contains(w));

    if shares_content {
        TopicContinuity::Continuing
    } else {
        TopicContinuity::New
    }
}

fn matches_keyword(normalized: &str, words: &[String], keyword: &str) -> bool {
    if keyword.contains(' ') {
        normalized.contains(keyword)
    } else {
        words.iter().any(|w| w == keyword)
    }
}

fn detect_tone(normalized: &str, words: &[String]) -> Tone {
    TONE_KEYWORDS
        .iter()
        .find(|(_, keywords)| {
            keywords
                .iter()
                .any(|k| matches_keyword(normalized, words, k))
        })
        .map_or(Tone::Neutral, |(tone, _)| *tone)
}

fn detect_intent(normalized: &str, words: &[String]) -> Intent {
    let first = words.first().map(String::as_str);

    if normalized.ends_with('?') || first.is_some_and(|w| QUESTION_OPENERS.contains(&w)) {
        return Intent::Question;
    }

    if REQUEST_MARKERS
        .iter()
        .any(|m| matches_keyword(normalized, words, m))
    {
        return Intent::Request;
    }

    if STATEMENT_MARKERS.iter().any(|m| {
        // Markers with a trailing space anchor on a whole leading word
        if m.ends_with(' ') {
            normalized.starts_with(m) || normalized.contains(&format!(" {m}"))
        } else {
            matches_keyword(normalized, words, m)
        }
    }) {
        return Intent::Statement;
    }

    if GREETING_MARKERS
        .iter()
        .any(|m| matches_keyword(normalized, words, m))
    {
        return Intent::Greeting;
    }

    Intent::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(texts: &[&str]) -> Vec<ConversationMessage> {
        texts.iter().map(|t| ConversationMessage::user(*t)).collect()
    }

    #[test]
    fn first_turn_is_new_topic() {
        let a = analyze("I love hiking in the mountains", &[]);
        assert_eq!(a.topic_continuity, TopicContinuity::New);
    }

    #[test]
    fn shared_content_word_continues_topic() {
        let h = history(&["Do you like the mountains?"]);
        let a = analyze("The mountains are beautiful in spring", &h);
        assert_eq!(a.topic_continuity, TopicContinuity::Continuing);
    }

    #[test]
    fn short_words_do_not_count_as_shared_content() {
        let h = history(&["Is it the one?"]);
        let a = analyze("it is the car", &h);
        assert_eq!(a.topic_continuity, TopicContinuity::New);
    }

    #[test]
    fn only_immediately_preceding_turn_matters() {
        let h = history(&["Tell me about mountains", "What about the weather today?"]);
        let a = analyze("mountains again", &h);
        assert_eq!(a.topic_continuity, TopicContinuity::New);
    }

    #[test]
    fn tone_first_match_wins() {
        // happy is tested before sad
        assert_eq!(tone_of("I'm glad but also sad"), Tone::Happy);
        assert_eq!(tone_of("I feel so sad today"), Tone::Sad);
        assert_eq!(tone_of("This makes me furious"), Tone::Angry);
        assert_eq!(tone_of("I can't wait for the trip"), Tone::Excited);
        assert_eq!(tone_of("The meeting is at noon"), Tone::Neutral);
    }

    #[test]
    fn tone_matches_whole_words_only() {
        // "mad" inside "made" must not match
        assert_eq!(tone_of("I made dinner"), Tone::Neutral);
    }

    #[test]
    fn intent_classification() {
        assert_eq!(analyze("Where is the station?", &[]).intent, Intent::Question);
        assert_eq!(analyze("how are you", &[]).intent, Intent::Question);
        assert_eq!(analyze("Please pass the salt", &[]).intent, Intent::Request);
        assert_eq!(analyze("I think it will rain", &[]).intent, Intent::Statement);
        assert_eq!(analyze("Hello there", &[]).intent, Intent::Greeting);
        assert_eq!(analyze("Purple elephants", &[]).intent, Intent::Unknown);
    }

    #[test]
    fn question_wins_over_request() {
        assert_eq!(analyze("Could you help me please?", &[]).intent, Intent::Question);
    }

    #[test]
    fn tags_cover_all_dimensions() {
        let a = analyze("Hello, I'm so happy to be here", &[]);
        assert_eq!(
            a.tags(),
            ["topic:new", "tone:happy", "intent:statement"]
        );
    }
}
