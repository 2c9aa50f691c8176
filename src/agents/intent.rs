//! Intents
//!
//! The structured form of a user request. The dispatch engine only ever sees
//! an `Intent`; turning free text into one is the job of an
//! `IntentClassifier`, which can be swapped without touching dispatch.

use serde::{Deserialize, Serialize};

use crate::models::ConversationState;

/// What the user wants, already classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    /// Search papers on a topic. `None` means the configured default count.
    PaperQuery {
        topic: String,
        num_results: Option<usize>,
    },
    /// Articles similar to one from the last paper search.
    SimilarArticlesQuery { source_link: String },
    /// News about the current research topic.
    TrendingNewsQuery,
    /// Profile details for one or more explicit author ids.
    AuthorByIdQuery { author_ids: Vec<String> },
    AuthorByNameQuery { name: String },
    /// "yes", "the first one", "authors of that paper" and the like.
    AmbiguousFollowUp { reference_hint: String },
}

impl Intent {
    pub fn papers(topic: impl Into<String>) -> Self {
        Intent::PaperQuery {
            topic: topic.into(),
            num_results: None,
        }
    }

    pub fn author_by_id(author_id: impl Into<String>) -> Self {
        Intent::AuthorByIdQuery {
            author_ids: vec![author_id.into()],
        }
    }

    pub fn author_by_name(name: impl Into<String>) -> Self {
        Intent::AuthorByNameQuery { name: name.into() }
    }

    pub fn follow_up(reference_hint: impl Into<String>) -> Self {
        Intent::AmbiguousFollowUp {
            reference_hint: reference_hint.into(),
        }
    }
}

/// Turns an utterance into an `Intent`, given what the conversation already knows.
pub trait IntentClassifier: Send + Sync {
    /// `None` when the utterance names neither a topic nor an author.
    fn classify(&self, utterance: &str, state: &ConversationState) -> Option<Intent>;
}

/// A position in an ordered result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Index(usize),
    Last,
}

const ORDINALS: [(&str, usize); 10] = [
    ("first", 0),
    ("second", 1),
    ("third", 2),
    ("fourth", 3),
    ("fifth", 4),
    ("1st", 0),
    ("2nd", 1),
    ("3rd", 2),
    ("4th", 3),
    ("5th", 4),
];

/// Nouns that mark a preceding number as a list position ("the 3 one", "2 paper").
const POSITION_NOUNS: [&str; 6] = ["one", "paper", "article", "result", "study", "entry"];

/// Read a positional reference ("the second one", "#3", "last") out of a hint.
///
/// A bare number only counts when it stands alone, is written `#N`, or is
/// followed by a position noun, so "the GPT-4 paper" is not a position.
pub fn parse_position(hint: &str) -> Option<Position> {
    let lower = hint.to_lowercase();
    let tokens: Vec<&str> = lower
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !(c.is_alphanumeric() || c == '#')))
        .filter(|t| !t.is_empty())
        .collect();

    for (i, token) in tokens.iter().enumerate() {
        if *token == "last" {
            return Some(Position::Last);
        }
        if let Some((_, index)) = ORDINALS.iter().find(|(w, _)| w == token) {
            return Some(Position::Index(*index));
        }

        let (number, explicit) = match token.strip_prefix('#') {
            Some(rest) => (rest, true),
            None => (*token, false),
        };
        let Ok(n) = number.parse::<usize>() else {
            continue;
        };
        let standalone = tokens.len() == 1;
        let before_noun = tokens
            .get(i + 1)
            .map(|next| POSITION_NOUNS.contains(next))
            .unwrap_or(false);
        if n >= 1 && (explicit || standalone || before_noun) {
            return Some(Position::Index(n - 1));
        }
    }
    None
}

const ACKNOWLEDGEMENTS: [&str; 8] = ["yes", "yeah", "yep", "sure", "ok", "okay", "tell me more", "more"];

/// "yes", "sure", "tell me more" and the like, ignoring trailing punctuation.
pub fn is_acknowledgement(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    let bare = lower.trim_end_matches(|c: char| matches!(c, '!' | '.' | '?')).trim();
    ACKNOWLEDGEMENTS.contains(&bare)
}

/// Deterministic keyword-driven classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Scholar profile ids are 12 characters and end in "AAAAJ".
    fn author_ids(utterance: &str) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for token in utterance.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-')) {
            if token.len() == 12 && token.ends_with("AAAAJ") && !ids.iter().any(|id| id == token) {
                ids.push(token.to_string());
            }
        }
        ids
    }

    fn first_url(utterance: &str) -> Option<String> {
        utterance
            .split_whitespace()
            .find(|w| w.starts_with("http://") || w.starts_with("https://"))
            .map(|w| w.trim_end_matches(|c: char| matches!(c, ')' | ']' | ',' | '.' | '>')).to_string())
    }

    fn is_back_reference(lower: &str) -> bool {
        let phrases = [
            "the first", "the second", "the third", "the fourth", "the fifth", "the last",
            "author of", "authors of", "that paper", "this paper", "those papers",
            "that article", "this article", "that one", "this one",
        ];
        is_acknowledgement(lower) || phrases.iter().any(|p| lower.contains(p))
    }

    /// A topic spelled out after "papers on", "articles related to" and similar.
    ///
    /// Tails that point back at earlier results ("related to the first one")
    /// are not topics.
    fn has_explicit_topic(lower: &str) -> bool {
        const NOUNS: [&str; 7] = ["papers", "paper", "articles", "article", "research", "studies", "literature"];
        const LINKS: [&str; 6] = ["on ", "about ", "regarding ", "related to ", "in ", "for "];
        const BACK_REFERENCES: [&str; 11] = [
            "this", "that", "it", "these", "those", "the first", "the second", "the third",
            "the fourth", "the fifth", "the last",
        ];

        NOUNS.iter().any(|noun| {
            LINKS.iter().any(|link| {
                let phrase = format!("{} {}", noun, link);
                let Some(pos) = lower.find(&phrase) else {
                    return false;
                };
                let tail = clean_tail(&lower[pos + phrase.len()..]);
                !tail.is_empty()
                    && !BACK_REFERENCES.iter().any(|r| {
                        tail == *r || tail.starts_with(&format!("{} ", r))
                    })
            })
        })
    }

    fn wants_similar(lower: &str) -> bool {
        [
            "similar", "related articles", "related papers", "related work", "related research",
            "related to this", "related to that", "related to the first", "related to the second",
            "related to the third", "related to the last",
        ]
        .iter()
        .any(|k| lower.contains(k))
    }

    fn wants_news(lower: &str) -> bool {
        let bare = clean_tail(lower);
        bare == "news"
            || [
                "trending", "what's new", "whats new", "latest developments", "any news",
                "latest news", "recent news", "news on this", "news about this", "news on that",
                "news about that", "news in this", "news for this", "news on the topic",
                "news about the topic",
            ]
            .iter()
            .any(|k| lower.contains(k))
    }

    /// Leading phrases that introduce an author name.
    fn author_name(utterance: &str, lower: &str) -> Option<String> {
        let always = [
            "who is ", "who's ", "find author ", "author ", "papers by ", "find papers by ",
            "articles by ", "publications by ", "works by ", "research by ", "details for ",
        ];
        let if_person = ["tell me about ", "information about ", "info about "];

        for prefix in always {
            if let Some(pos) = lower.find(prefix) {
                if prefix.starts_with("who") || prefix.starts_with("find") || prefix == "author " {
                    if pos != 0 {
                        continue;
                    }
                }
                let rest = pos + prefix.len();
                let name = clean_tail(utterance.get(rest..).unwrap_or(&lower[rest..]));
                if !name.is_empty() {
                    return Some(name);
                }
            }
        }

        for prefix in if_person {
            if lower.starts_with(prefix) {
                let name = clean_tail(utterance.get(prefix.len()..).unwrap_or(&lower[prefix.len()..]));
                if looks_like_person(&name) {
                    return Some(name);
                }
            }
        }

        None
    }

    /// Strip request filler from the front and pick up an explicit count.
    ///
    /// A number is a count only when a result noun follows it ("3 papers");
    /// otherwise it belongs to the topic ("2 dimensional materials").
    fn paper_topic(utterance: &str) -> (String, Option<usize>) {
        const FILLER: &[&str] = &[
            "find", "show", "me", "search", "for", "get", "give", "list", "some", "the", "top",
            "papers", "paper", "articles", "article", "research", "on", "about", "regarding",
            "related", "to", "please", "i", "want", "need", "academic", "scholarly", "can", "you",
            "look", "results", "studies",
        ];
        const COUNTED: [&str; 7] = ["papers", "paper", "articles", "article", "results", "result", "studies"];

        fn bare(word: &str) -> String {
            word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase()
        }

        let words: Vec<&str> = utterance.split_whitespace().collect();
        let mut count = None;
        let mut start = 0;
        for (i, word) in words.iter().enumerate() {
            let current = bare(word);
            let next_is_counted = words
                .get(i + 1)
                .map(|next| COUNTED.contains(&bare(next).as_str()))
                .unwrap_or(false);
            match current.parse::<usize>() {
                Ok(n) if next_is_counted => {
                    count = Some(n);
                    start = i + 1;
                }
                Ok(_) => break,
                Err(_) if FILLER.contains(&current.as_str()) => start = i + 1,
                Err(_) => break,
            }
        }

        (clean_tail(&words[start.min(words.len())..].join(" ")), count)
    }
}

impl IntentClassifier for KeywordClassifier {
    fn classify(&self, utterance: &str, state: &ConversationState) -> Option<Intent> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return None;
        }
        let lower = utterance.to_lowercase();

        let ids = Self::author_ids(utterance);
        if !ids.is_empty() {
            return Some(Intent::AuthorByIdQuery { author_ids: ids });
        }

        let explicit_topic = Self::has_explicit_topic(&lower);

        if !explicit_topic && Self::wants_similar(&lower) {
            let source_link = Self::first_url(utterance).unwrap_or_else(|| utterance.to_string());
            return Some(Intent::SimilarArticlesQuery { source_link });
        }

        if !explicit_topic && Self::wants_news(&lower) {
            return Some(Intent::TrendingNewsQuery);
        }

        if !state.last_articles().is_empty() && Self::is_back_reference(&lower) {
            return Some(Intent::follow_up(utterance));
        }

        if let Some(name) = Self::author_name(utterance, &lower) {
            return Some(Intent::author_by_name(name));
        }

        let (topic, num_results) = Self::paper_topic(utterance);
        if topic.is_empty() {
            return None;
        }
        Some(Intent::PaperQuery { topic, num_results })
    }
}

fn clean_tail(text: &str) -> String {
    text.trim()
        .trim_end_matches(|c: char| matches!(c, '?' | '.' | '!' | ','))
        .trim()
        .to_string()
}

/// Two to four capitalised words.
fn looks_like_person(text: &str) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    (2..=4).contains(&words.len())
        && words
            .iter()
            .all(|w| w.chars().next().map(|c| c.is_uppercase()).unwrap_or(false))
}
