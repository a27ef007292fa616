//! Prompt assembly and the degraded (no-model) answer.
//!
//! A prompt is a fixed system instruction, a bounded context block built
//! from the selected chunks, and the user's question. Each context line is
//! tagged with its source document and the roles allowed to see it, and
//! the chunk text is cut to [`CONTEXT_CHAR_LIMIT`] characters.

use serde::Serialize;

use crate::rank::ScoredChunk;

pub const SYSTEM_PROMPT: &str = "Answer strictly using the provided context. \
If the context is insufficient, say you don't have enough information and propose safe next steps.";

/// Maximum characters of chunk text included per context line.
pub const CONTEXT_CHAR_LIMIT: usize = 600;

/// Prefix of every answer produced without a generative model.
pub const DEGRADED_MARKER: &str = "[no generative capability configured]";

/// Model identifier reported for degraded answers.
pub const DEGRADED_MODEL: &str = "none";

pub const NO_CONTEXT_MESSAGE: &str = "I couldn't find tenant-allowed information for that. \
Would you like me to (A) run a DB check, (B) escalate to HR, or (C) rephrase?";

/// An assembled prompt, ready for a chat-style model.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    /// One line per chunk, newline-separated. Empty when nothing was retrieved.
    pub context: String,
    pub query: String,
}

impl Prompt {
    /// The user turn: context block followed by the question.
    pub fn user_message(&self) -> String {
        if self.context.is_empty() {
            format!("Context:\n(none)\n\nQuestion: {}", self.query)
        } else {
            format!("Context:\n{}\n\nQuestion: {}", self.context, self.query)
        }
    }
}

/// Answer text plus the model that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub model: String,
    /// True when no generative model produced `text`.
    pub degraded: bool,
}

pub fn build_prompt(query: &str, chunks: &[ScoredChunk]) -> Prompt {
    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        context: chunks
            .iter()
            .map(context_line)
            .collect::<Vec<_>>()
            .join("\n"),
        query: query.to_string(),
    }
}

fn context_line(scored: &ScoredChunk) -> String {
    let chunk = &scored.chunk;
    let roles: Vec<&str> = chunk.allowed_roles.iter().map(|r| r.as_str()).collect();
    format!(
        "- [source: {} | roles: {}] {}",
        chunk.doc_id,
        roles.join(", "),
        truncate_chars(&chunk.text, CONTEXT_CHAR_LIMIT)
    )
}

/// The first `max` characters of `text`, on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Answer assembled from raw context when no model is available.
pub fn degraded_answer(prompt: &Prompt) -> Answer {
    let text = if prompt.context.is_empty() {
        format!("{DEGRADED_MARKER} {NO_CONTEXT_MESSAGE}")
    } else {
        format!("{DEGRADED_MARKER}\n{}", prompt.context)
    };
    Answer {
        text,
        model: DEGRADED_MODEL.to_string(),
        degraded: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Confidentiality, Role};

    fn scored(doc: &str, text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: "c1".to_string(),
                tenant_id: "acme".to_string(),
                doc_id: doc.to_string(),
                chunk_index: 0,
                text: text.to_string(),
                hash: String::new(),
                embedding: Vec::new(),
                allowed_roles: ["hr", "admin"].iter().map(|r| Role::parse(r).unwrap()).collect(),
                confidentiality: Confidentiality::Internal,
                pii_flags: Vec::new(),
                created_at: 0,
            },
            score: 0.8,
        }
    }

    #[test]
    fn test_context_line_tags_source_and_roles() {
        let prompt = build_prompt("q?", &[scored("leave_policy", "Twelve days.")]);
        assert_eq!(prompt.context, "- [source: leave_policy | roles: admin, hr] Twelve days.");
        assert!(prompt.user_message().ends_with("Question: q?"));
    }

    #[test]
    fn test_context_truncated_to_limit() {
        let long = "x".repeat(1000);
        let prompt = build_prompt("q", &[scored("d", &long)]);
        let xs = prompt.context.chars().filter(|c| *c == 'x').count();
        assert_eq!(xs, CONTEXT_CHAR_LIMIT);
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }

    #[test]
    fn test_degraded_answer_with_context() {
        let prompt = build_prompt("q", &[scored("handbook", "Office opens at nine.")]);
        let answer = degraded_answer(&prompt);
        assert!(answer.text.starts_with(DEGRADED_MARKER));
        assert!(answer.text.contains("Office opens at nine."));
        assert_eq!(answer.model, DEGRADED_MODEL);
        assert!(answer.degraded);
    }

    #[test]
    fn test_degraded_answer_without_context() {
        let answer = degraded_answer(&build_prompt("q", &[]));
        assert!(answer.text.starts_with(DEGRADED_MARKER));
        assert!(answer.text.contains("escalate to HR"));
    }
}
