//! Overlapping word-window chunker.
//!
//! Splits training text into windows of at most `chunk_size` words, each
//! window advancing by `chunk_size - overlap` words so consecutive chunks
//! share `overlap` words of context.
//!
//! # Algorithm
//!
//! 1. Split the text into whitespace-separated words.
//! 2. Find sentence boundaries (words ending in `.`, `!` or `?`). With zero
//!    or one sentence, plain word windowing is used.
//! 3. A window starting at word `s` ends at `s + chunk_size`, or at the end
//!    of the text once the remainder fits.
//! 4. When more text remains, the end snaps back to the last sentence
//!    boundary in `[s + max(overlap + 1, chunk_size / 2), s + chunk_size]`.
//! 5. The next window starts `overlap` words before the end, but always at
//!    least one word after `s`.
//!
//! # Example
//!
//! ```rust
//! use ragbot_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("a b c d e f g h", 4, 1);
//! assert_eq!(chunks, vec!["a b c d", "d e f g", "g h"]);
//! ```

use crate::models::Chunk;

/// Split `text` into overlapping word windows.
///
/// - Empty or whitespace-only text yields no chunks.
/// - `chunk_size == 0` yields exactly `[text]`.
/// - The result is deterministic for the same arguments.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    if chunk_size == 0 {
        return vec![text.to_string()];
    }
    windows(text, chunk_size, overlap).collect()
}

/// Lazy form of [`chunk_text`]. The iterator is `Clone`; a clone restarts
/// from wherever the original was when cloned.
///
/// `chunk_size == 0` produces a single window of every word.
pub fn windows(text: &str, chunk_size: usize, overlap: usize) -> Windows<'_> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let size = if chunk_size == 0 {
        words.len().max(1)
    } else {
        chunk_size
    };

    let mut sentence_ends = sentence_ends(&words);
    if sentence_count(&sentence_ends, words.len()) <= 1 {
        sentence_ends.clear();
    }

    let next_start = if words.is_empty() { None } else { Some(0) };

    Windows {
        words,
        sentence_ends,
        size,
        overlap,
        next_start,
    }
}

/// Iterator over the word windows of a text. See [`windows`].
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    words: Vec<&'a str>,
    /// Exclusive word indices at which a sentence ends, ascending.
    sentence_ends: Vec<usize>,
    size: usize,
    overlap: usize,
    next_start: Option<usize>,
}

impl Windows<'_> {
    fn window_end(&self, start: usize) -> usize {
        let n = self.words.len();
        let limit = start + self.size;
        if limit >= n {
            return n;
        }

        let floor = start + (self.overlap + 1).max(self.size / 2);
        self.sentence_ends
            .iter()
            .rev()
            .copied()
            .find(|&end| end >= floor && end <= limit)
            .unwrap_or(limit)
    }
}

impl Iterator for Windows<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let start = self.next_start?;
        let end = self.window_end(start);

        self.next_start = if end >= self.words.len() {
            None
        } else {
            // Step is at least one word even when overlap >= size.
            Some(end.saturating_sub(self.overlap).max(start + 1))
        };

        Some(self.words[start..end].join(" "))
    }
}

fn sentence_ends(words: &[&str]) -> Vec<usize> {
    words
        .iter()
        .enumerate()
        .filter(|(_, w)| ends_sentence(w))
        .map(|(i, _)| i + 1)
        .collect()
}

fn sentence_count(ends: &[usize], word_count: usize) -> usize {
    match ends.last() {
        None => usize::from(word_count > 0),
        Some(&last) if last < word_count => ends.len() + 1,
        Some(_) => ends.len(),
    }
}

fn ends_sentence(word: &str) -> bool {
    let trimmed = word.trim_end_matches(|c: char| {
        matches!(c, '"' | '\'' | ')' | ']' | '\u{201D}' | '\u{2019}' | '\u{BB}')
    });
    trimmed.ends_with(|c: char| matches!(c, '.' | '!' | '?'))
}

/// Chunk markdown text section by section.
///
/// ATX headings (`#` to `######`, outside fenced code blocks) start a new
/// section. Each section body is split with [`chunk_text`], and every chunk
/// carries the nearest preceding heading and `source_url`.
pub fn chunk_markdown(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    source_url: Option<&str>,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for section in split_sections(text) {
        for piece in chunk_text(&section.body, chunk_size, overlap) {
            chunks.push(Chunk {
                text: piece,
                source_url: source_url.map(str::to_string),
                heading: section.heading.map(str::to_string),
            });
        }
    }
    chunks
}

struct Section<'a> {
    heading: Option<&'a str>,
    body: String,
}

fn split_sections(text: &str) -> Vec<Section<'_>> {
    let mut sections = vec![Section {
        heading: None,
        body: String::new(),
    }];
    let mut in_fence = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if !in_fence {
            if let Some(heading) = heading_text(line) {
                sections.push(Section {
                    heading: Some(heading),
                    body: String::new(),
                });
                continue;
            }
        }
        if let Some(current) = sections.last_mut() {
            current.body.push_str(line);
            current.body.push('\n');
        }
    }

    sections
}

fn heading_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim();
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}
