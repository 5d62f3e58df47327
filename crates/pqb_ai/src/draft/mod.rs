use pqb_core::domain::Chunk;
use serde::{Deserialize, Serialize};

use crate::llm::{GenerationRole, Llm};

mod prompts;

pub const MAX_CONTEXT_CHARS: usize = 12_000;
pub const FALLBACK_CHARS: usize = 900;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroundTruthDraft {
    pub text: String,
    pub used_fallback: bool,
}

/// Drafts a reference answer from the reviewer's selected chunks only.
///
/// The draft is a starting point for editing; nothing here is persisted.
pub struct GroundTruthDrafter<'a> {
    llm: Option<&'a dyn Llm>,
    model: String,
}

fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn context_parts(chunks: &[Chunk]) -> Vec<&str> {
    chunks
        .iter()
        .map(|c| c.text.trim())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Concatenated chunk text cut to `FALLBACK_CHARS`, marked with `...` when cut at the limit.
pub fn fallback_answer(chunks: &[Chunk]) -> String {
    let parts = context_parts(chunks);
    if parts.is_empty() {
        return String::new();
    }
    let joined = parts.join(" ");
    let clipped = take_chars(&joined, FALLBACK_CHARS).trim();
    if clipped.chars().count() == FALLBACK_CHARS {
        format!("{clipped}...")
    } else {
        clipped.to_string()
    }
}

impl<'a> GroundTruthDrafter<'a> {
    pub fn new(llm: Option<&'a dyn Llm>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    pub fn draft(&self, question: &str, chunks: &[Chunk]) -> GroundTruthDraft {
        let parts = context_parts(chunks);
        if parts.is_empty() {
            return GroundTruthDraft {
                text: String::new(),
                used_fallback: true,
            };
        }

        if let Some(llm) = self.llm {
            let joined = parts.join("\n\n");
            let context = take_chars(&joined, MAX_CONTEXT_CHARS);
            let prompt = prompts::ground_truth_prompt(question.trim(), context);
            match llm.generate_as(GenerationRole::GroundTruth, &self.model, &prompt) {
                Ok(text) if !text.trim().is_empty() => {
                    return GroundTruthDraft {
                        text: text.trim().to_string(),
                        used_fallback: false,
                    };
                }
                Ok(_) => tracing::warn!("ground-truth draft was empty; using fallback"),
                Err(e) => {
                    tracing::warn!(code = %e.code, error = %e, "ground-truth draft failed; using fallback")
                }
            }
        }

        GroundTruthDraft {
            text: fallback_answer(chunks),
            used_fallback: true,
        }
    }
}
