//! Q&A training files.
//!
//! One pair per line, question and answer separated by the first `|`:
//!
//! ```text
//! # comments and blank lines are skipped
//! What are your opening hours? | 9am to 5pm, Monday to Friday.
//! Do you ship abroad? | Yes, to the EU and the UK.
//! ```

use crate::error::ApiError;
use crate::models::Chunk;

pub const DELIMITER: char = '|';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {
    /// The chunk stored for this pair; the question doubles as its heading.
    pub fn to_chunk(&self) -> Chunk {
        Chunk {
            text: format!("Q: {}\nA: {}", self.question, self.answer),
            source_url: None,
            heading: Some(self.question.clone()),
        }
    }
}

/// Parse a Q&A file. Errors name the offending 1-based line.
pub fn parse_qa_pairs(content: &str) -> Result<Vec<QaPair>, ApiError> {
    if content.trim().is_empty() {
        return Err(ApiError::Validation("file is empty".into()));
    }

    let mut pairs = Vec::new();
    for (i, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line_no = i + 1;

        let (question, answer) = line.split_once(DELIMITER).ok_or_else(|| {
            ApiError::Validation(format!(
                "line {}: missing '{}' delimiter between question and answer",
                line_no, DELIMITER
            ))
        })?;

        let question = question.trim();
        let answer = answer.trim();
        if question.is_empty() {
            return Err(ApiError::Validation(format!("line {}: question is empty", line_no)));
        }
        if answer.is_empty() {
            return Err(ApiError::Validation(format!("line {}: answer is empty", line_no)));
        }

        pairs.push(QaPair {
            question: question.to_string(),
            answer: answer.to_string(),
        });
    }

    if pairs.is_empty() {
        return Err(ApiError::Validation("file contains no question/answer pairs".into()));
    }
    Ok(pairs)
}
