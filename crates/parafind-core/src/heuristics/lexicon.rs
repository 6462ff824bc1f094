//! Lexicons and detection patterns for decomposability heuristics.
//!
//! Every signal is a standalone function over prompt text so it can be
//! tested in isolation. Functions documented as taking lower-cased text
//! expect the caller to lower-case once; the marker counts run on the
//! original prompt because line structure matters there.

use lazy_static::lazy_static;
use regex::Regex;

/// Request verbs that may precede an explicit count ("generate 5 ...").
pub const REQUEST_VERBS: &[&str] = &[
    "generate", "create", "write", "make", "give", "provide", "list", "show", "tell", "name",
    "identify", "find", "spot", "translate", "correct", "develop", "produce", "craft", "prepare",
    "construct", "compile", "analyze", "evaluate", "compare", "contrast", "offer", "suggest",
    "need", "want", "require", "discuss",
];

/// Countable objects of a request, each with an optional plural suffix.
pub const REQUEST_OBJECTS: &[&str] = &[
    "examples?", "stories?", "variations?", "ideas?", "options?", "questions?", "sentences?",
    "paragraphs?", "items?", "tasks?", "entities?", "keywords?", "words?", "phrases?",
    "translations?", "summaries?", "reports?", "reviews?", "analyses?", "cases?", "scenarios?",
    "characters?", "profiles?", "descriptions?", "suggestions?", "recommendations?",
];

/// Words introducing an enumerated set, in several languages.
pub const LIST_INTRODUCERS: &[&str] = &[
    "following", "these", "each of", "all of", "todos?", "las?s?", "die", "der", "das", "les?",
    "la", "il", "и",
];

/// Plural nouns that follow a list introducer.
pub const LIST_NOUNS: &[&str] = &[
    "questions?", "items?", "prompts?", "sentences?", "paragraphs?", "tasks?", "texts?",
    "statements?", "passages?", "preguntas?", "frases?", "fragen", "sätze", "phrases",
    "вопросы", "предложения",
];

/// Words signalling that a request spans several things.
pub const MULTIPLICITY_MARKERS: &[&str] = &[
    "multiple", "several", "each", "all", "every", "various", "respectively", "varios?s?",
    "plusieurs", "mehrere", "多个", "многие",
];

fn alternation(words: &[&str]) -> String {
    format!("(?:{})", words.join("|"))
}

lazy_static! {
    /// Verb, count and countable object: "write 3 stories", "10 ideas".
    pub static ref NUMERIC_REQUEST_PATTERN: Regex = Regex::new(&format!(
        r"\b{}?\s*\d+\s*{}\b",
        alternation(REQUEST_VERBS),
        alternation(REQUEST_OBJECTS)
    )).unwrap();

    /// "the following questions", "these sentences", "las preguntas".
    pub static ref LIST_INTRODUCER_PATTERN: Regex = Regex::new(&format!(
        r"\b{}\s+{}\b",
        alternation(LIST_INTRODUCERS),
        alternation(LIST_NOUNS)
    )).unwrap();

    /// Numbered markers ("1.", "2)", "3:") or dash/bullet line starts.
    pub static ref NUMBERED_MARKER_PATTERN: Regex = Regex::new(
        r"(?:\d+[.):]|\n[-•*]\s+)"
    ).unwrap();

    /// A question mark followed by whitespace.
    pub static ref QUESTION_PATTERN: Regex = Regex::new(r"\?\s+").unwrap();

    /// A line starting with a bullet or a number.
    pub static ref BULLET_LINE_PATTERN: Regex = Regex::new(
        r"(?:\n\s*[-•*]\s+|\n\s*\d+[.)]\s+)"
    ).unwrap();

    pub static ref MULTIPLICITY_PATTERN: Regex = Regex::new(&format!(
        r"\b{}\b",
        alternation(MULTIPLICITY_MARKERS)
    )).unwrap();

    /// Three or more comma-separated words: "apple, banana, and cherry".
    pub static ref COMMA_LIST_PATTERN: Regex = Regex::new(
        r"\b\w+\b\s*,\s*\b\w+\b\s*(?:,\s*(?:and\s+)?\b\w+\b)+"
    ).unwrap();

    pub static ref FOR_EACH_PATTERN: Regex = Regex::new(r"\bfor\s+(?:every|each)\b").unwrap();

    /// A plural-looking word followed by a colon or semicolon: "words: ...".
    pub static ref PLURAL_COLON_PATTERN: Regex = Regex::new(r"\b\w+s\b\s*[:;]\s*\b").unwrap();
}

/// Explicit count of requested objects. Expects lower-cased text.
pub fn has_numeric_request(lower: &str) -> bool {
    NUMERIC_REQUEST_PATTERN.is_match(lower)
}

/// A list introducer followed by a plural noun. Expects lower-cased text.
pub fn has_list_introducer(lower: &str) -> bool {
    LIST_INTRODUCER_PATTERN.is_match(lower)
}

/// More than one numbered or bulleted marker.
pub fn has_numbered_items(prompt: &str) -> bool {
    NUMBERED_MARKER_PATTERN.find_iter(prompt).count() > 1
}

/// More than one question mark followed by whitespace.
pub fn has_multiple_questions(prompt: &str) -> bool {
    QUESTION_PATTERN.find_iter(prompt).count() > 1
}

/// More than one bulleted or numbered line.
pub fn has_bullet_list(prompt: &str) -> bool {
    BULLET_LINE_PATTERN.find_iter(prompt).count() > 1
}

/// A multiplicity word such as "several" or "each". Expects lower-cased text.
pub fn has_multiplicity_marker(lower: &str) -> bool {
    MULTIPLICITY_PATTERN.is_match(lower)
}

/// Comma-separated list of at least three items. Expects lower-cased text.
pub fn has_comma_list(lower: &str) -> bool {
    COMMA_LIST_PATTERN.is_match(lower)
}

/// "for each" / "for every". Expects lower-cased text.
pub fn has_for_each(lower: &str) -> bool {
    FOR_EACH_PATTERN.is_match(lower)
}

/// Plural noun followed by a colon. Expects lower-cased text.
pub fn has_plural_colon(lower: &str) -> bool {
    PLURAL_COLON_PATTERN.is_match(lower)
}
