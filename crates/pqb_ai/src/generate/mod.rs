use std::collections::BTreeSet;

use pqb_core::difficulty::{profile_for_slot, DifficultyProfile};
use pqb_core::domain::{Chunk, DifficultyLabel};
use serde::{Deserialize, Serialize};

use pqb_core::error::AppError;

use crate::llm::{first_line, GenerationRole, Llm};

mod prompts;

pub use prompts::COMMON_PROFILE_INSTRUCTION;
use prompts::Seeds;

pub const SNIPPET_WIDTH: usize = 220;
pub const SIMILARITY_THRESHOLD: f64 = 0.75;
const MAX_ALTERNATE_WINDOWS: usize = 8;

pub const FALLBACK_OFFLINE: &str = "offline";
pub const FALLBACK_NO_CHUNKS: &str = "paper has no chunks";
pub const FALLBACK_NO_DISTINCT_REPLY: &str = "model replies were empty or too similar to known questions";

/// A candidate question awaiting the reviewer's accept/skip decision. Nothing is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedQuestion {
    pub paper_id: String,
    pub question_text: String,
    pub profile_label: String,
    pub difficulty: DifficultyLabel,
    pub used_fallback: bool,
    /// Why the deterministic fallback was used; `None` for model output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// Whitespace-collapsed prefix of a chunk, at most `SNIPPET_WIDTH` characters.
pub fn snippet(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(SNIPPET_WIDTH).collect()
}

pub fn token_set(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Token Jaccard overlap against any previous question reaches the threshold.
pub fn is_too_similar(candidate: &str, previous: &[String]) -> bool {
    let cand = token_set(candidate);
    if cand.is_empty() {
        return false;
    }
    previous.iter().any(|p| {
        let prev = token_set(p);
        if prev.is_empty() {
            return false;
        }
        let inter = cand.intersection(&prev).count() as f64;
        let union = cand.union(&prev).count() as f64;
        inter / union >= SIMILARITY_THRESHOLD
    })
}

fn feedback_shift(feedback: &str, n: usize) -> usize {
    if feedback.is_empty() {
        return 0;
    }
    let sum: u64 = feedback.chars().map(|c| c as u64).sum();
    (sum % n as u64) as usize
}

struct SeedWindow {
    seed_a: String,
    seed_b: String,
    near: String,
}

impl SeedWindow {
    fn at(chunks: &[Chunk], offset: usize) -> Self {
        let n = chunks.len();
        let half = (n / 2).max(1);
        Self {
            seed_a: snippet(&chunks[offset % n].text),
            seed_b: snippet(&chunks[(offset + half) % n].text),
            near: snippet(&chunks[(offset + 1) % n].text),
        }
    }

    fn seeds(&self) -> Seeds<'_> {
        Seeds {
            seed_a: &self.seed_a,
            seed_b: &self.seed_b,
            near: &self.near,
        }
    }
}

pub struct QuestionGenerator<'a> {
    llm: Option<&'a dyn Llm>,
    model: String,
}

impl<'a> QuestionGenerator<'a> {
    /// `llm = None` produces deterministic fallback questions only.
    pub fn new(llm: Option<&'a dyn Llm>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    /// `Ok(None)` when the reply has no usable line.
    fn ask(&self, llm: &dyn Llm, prompt: &str) -> Result<Option<String>, AppError> {
        let raw = llm.generate_as(GenerationRole::Question, &self.model, prompt)?;
        Ok(first_line(&raw))
    }

    /// One question for `profile`. Seeds rotate with `slot_index` and `feedback`; model output
    /// too close to `avoid` is retried on alternate seed windows before falling back.
    pub fn generate_profile_question(
        &self,
        paper_id: &str,
        chunks: &[Chunk],
        profile: &DifficultyProfile,
        slot_index: usize,
        feedback: &str,
        avoid: &[String],
    ) -> GeneratedQuestion {
        let make = |question_text: String, fallback_reason: Option<String>| GeneratedQuestion {
            paper_id: paper_id.to_string(),
            question_text,
            profile_label: profile.label.to_string(),
            difficulty: profile.difficulty,
            used_fallback: fallback_reason.is_some(),
            fallback_reason,
        };

        if chunks.is_empty() {
            let multi_hop = profile.difficulty == DifficultyLabel::MultiHop;
            return make(
                prompts::empty_paper_question(multi_hop).to_string(),
                Some(FALLBACK_NO_CHUNKS.to_string()),
            );
        }

        let feedback = feedback.trim();
        let offset = slot_index + feedback_shift(feedback, chunks.len());
        let primary = SeedWindow::at(chunks, offset);

        let mut reason = FALLBACK_OFFLINE.to_string();
        if let Some(llm) = self.llm {
            reason = FALLBACK_NO_DISTINCT_REPLY.to_string();
            // Step 0 is the primary window; later steps are alternates.
            for step in 0..chunks.len().clamp(1, MAX_ALTERNATE_WINDOWS) {
                let window = SeedWindow::at(chunks, offset + step);
                let prompt = prompts::profile_prompt(
                    paper_id,
                    profile.reference_type,
                    window.seeds(),
                    feedback,
                    avoid,
                );
                match self.ask(llm, &prompt) {
                    Ok(Some(q)) if !is_too_similar(&q, avoid) => return make(q, None),
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(
                            paper_id,
                            code = %e.code,
                            retryable = e.retryable,
                            error = %e,
                            "question generation failed; using fallback"
                        );
                        reason = format!("{}: {}", e.code, e.message);
                        break;
                    }
                }
            }
        }

        tracing::debug!(paper_id, profile = profile.label, reason = %reason, "fallback question");
        make(
            prompts::fallback_question(paper_id, profile.reference_type, primary.seeds()),
            Some(reason),
        )
    }

    /// `count` questions cycling through the profiles; each one joins the avoid list of the next.
    pub fn generate_for_paper(
        &self,
        paper_id: &str,
        chunks: &[Chunk],
        count: usize,
        avoid: &[String],
    ) -> Vec<GeneratedQuestion> {
        let mut seen: Vec<String> = avoid.to_vec();
        let mut out = Vec::with_capacity(count);
        for slot in 0..count {
            let profile = profile_for_slot(slot);
            let q = self.generate_profile_question(paper_id, chunks, profile, slot, "", &seen);
            seen.push(q.question_text.clone());
            out.push(q);
        }
        tracing::info!(paper_id, count = out.len(), "generated candidate questions");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_collapses_whitespace_and_caps_width() {
        assert_eq!(snippet("  a\n\n b\tc  "), "a b c");
        assert_eq!(snippet(&"é".repeat(300)).chars().count(), SNIPPET_WIDTH);
    }

    #[test]
    fn similarity_uses_token_jaccard() {
        let prev = vec!["What is the attention mechanism?".to_string()];
        assert!(is_too_similar("what is THE attention mechanism", &prev));
        assert!(!is_too_similar("How are positional encodings computed?", &prev));
        assert!(!is_too_similar("???", &prev));
    }

    #[test]
    fn feedback_shift_is_codepoint_sum_mod_len() {
        assert_eq!(feedback_shift("", 4), 0);
        // 'a' = 97, 'b' = 98
        assert_eq!(feedback_shift("ab", 4), (97 + 98) % 4);
    }
}
