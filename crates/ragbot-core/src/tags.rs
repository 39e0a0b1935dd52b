//! Topic tags for training sources, produced by a completion model.
//!
//! The model is asked for 3–5 comma-separated tags. Its answer is
//! normalized into lowercase hyphenated slugs and validated; anything
//! unusable collapses to [`FALLBACK_TAGS`].

use tracing::{debug, warn};

use crate::completion::{Completer, CompletionOptions, Message};

/// Returned whenever classification fails or its output is invalid.
pub const FALLBACK_TAGS: [&str; 2] = ["general", "uncategorized"];

/// Only this many leading characters of the text are sent to the model.
pub const MAX_INPUT_CHARS: usize = 2000;

const MIN_TAGS: usize = 3;
const MAX_TAGS: usize = 5;
const MAX_TAG_WORDS: usize = 3;

const TAG_PROMPT: &str = "Read the text below and reply with 3 to 5 short English topic tags \
that describe it. Reply with the tags only, separated by commas, each tag at most three words. \
Do not number them or add any other text.";

const TAG_OPTIONS: CompletionOptions = CompletionOptions {
    temperature: 0.0,
    max_tokens: 60,
};

pub fn fallback_tags() -> Vec<String> {
    FALLBACK_TAGS.iter().map(|t| t.to_string()).collect()
}

/// Classify `text` into 3–5 tags. Never fails: errors yield [`FALLBACK_TAGS`].
pub async fn classify_tags<C>(completer: &C, text: &str) -> Vec<String>
where
    C: Completer + ?Sized,
{
    if text.trim().is_empty() {
        return fallback_tags();
    }

    let excerpt: String = text.chars().take(MAX_INPUT_CHARS).collect();
    let messages = [Message::user(format!("{}\n\nText:\n{}", TAG_PROMPT, excerpt))];

    match completer.complete(&messages, &TAG_OPTIONS).await {
        Ok(output) => match parse_tags(&output) {
            Some(tags) => {
                debug!(?tags, "classified tags");
                tags
            }
            None => {
                warn!(output = %output.trim(), "tag output failed validation, using fallback");
                fallback_tags()
            }
        },
        Err(e) => {
            warn!(error = %e, model = completer.model_name(), "tag classification failed, using fallback");
            fallback_tags()
        }
    }
}

/// Parse and validate raw model output.
///
/// Returns `None` unless 3–5 distinct, non-empty tags remain after
/// normalization.
pub fn parse_tags(output: &str) -> Option<Vec<String>> {
    let mut tags: Vec<String> = Vec::new();
    for candidate in output.split(|c: char| c == ',' || c == '\n') {
        if let Some(tag) = normalize_tag(candidate) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }

    let valid_count = (MIN_TAGS..=MAX_TAGS).contains(&tags.len());
    let valid_words = tags
        .iter()
        .all(|t| t.split('-').count() <= MAX_TAG_WORDS);

    (valid_count && valid_words).then_some(tags)
}

/// Normalize one candidate into a slug: lowercase, whitespace and
/// underscores become hyphens, other non-alphanumerics are dropped, and at
/// most three words are kept. Returns `None` if nothing is left.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let words: Vec<&str> = slug
        .split('-')
        .filter(|w| !w.is_empty())
        .take(MAX_TAG_WORDS)
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(words.join("-"))
    }
}
