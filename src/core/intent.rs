//! Reply-intent classification for inbound responses.
//!
//! Patterns are checked top to bottom and the first match wins, so an
//! opt-out phrase always beats a question mark in the same message.
//! Anything unmatched is [`ReplyIntent::Unknown`].

use serde::{Deserialize, Serialize};

/// Intent of a reply to outreach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyIntent {
    /// Asked to stop all contact.
    OptOut,
    /// Hostile or uninterested.
    Negative,
    /// Wants to proceed.
    Interested,
    /// Asked something before deciding.
    Question,
    /// Nothing recognized.
    Unknown,
}

impl ReplyIntent {
    /// Whether this reply counts toward the negative-response rate.
    pub const fn is_negative(self) -> bool {
        matches!(self, Self::Negative)
    }
}

enum Pattern {
    /// Whole message equals one of these after trimming.
    Exact(&'static [&'static str]),
    /// Message contains one of these phrases.
    Contains(&'static [&'static str]),
    /// Message ends with this character.
    EndsWith(char),
}

impl Pattern {
    fn matches(&self, normalized: &str) -> bool {
        match self {
            Self::Exact(words) => words.iter().any(|w| normalized == *w),
            Self::Contains(phrases) => phrases.iter().any(|p| normalized.contains(p)),
            Self::EndsWith(ch) => normalized.ends_with(*ch),
        }
    }
}

const RULES: &[(Pattern, ReplyIntent)] = &[
    (
        Pattern::Exact(&["stop", "stopall", "unsubscribe", "cancel", "end", "quit"]),
        ReplyIntent::OptOut,
    ),
    (
        Pattern::Contains(&[
            "remove me",
            "take me off",
            "do not contact",
            "don't contact",
            "stop texting",
            "stop calling",
            "unsubscribe",
        ]),
        ReplyIntent::OptOut,
    ),
    (
        Pattern::Contains(&[
            "not interested",
            "no thanks",
            "no thank you",
            "scam",
            "leave me alone",
            "wrong number",
            "go away",
        ]),
        ReplyIntent::Negative,
    ),
    (
        Pattern::Contains(&[
            "interested",
            "yes",
            "sounds good",
            "call me",
            "tell me more",
            "let's talk",
        ]),
        ReplyIntent::Interested,
    ),
    (
        Pattern::Contains(&["how much", "what is this", "who is this", "how does"]),
        ReplyIntent::Question,
    ),
    (Pattern::EndsWith('?'), ReplyIntent::Question),
];

/// Classify a reply body.
pub fn classify_reply(body: &str) -> ReplyIntent {
    let normalized = body.trim().to_lowercase();
    if normalized.is_empty() {
        return ReplyIntent::Unknown;
    }
    RULES
        .iter()
        .find(|(pattern, _)| pattern.matches(&normalized))
        .map_or(ReplyIntent::Unknown, |(_, intent)| *intent)
}
