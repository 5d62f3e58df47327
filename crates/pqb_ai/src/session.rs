use std::collections::HashSet;

use pqb_core::chunks::ChunkStore;
use pqb_core::difficulty::classify;
use pqb_core::domain::{Chunk, DifficultyLabel, QuestionState, UnverifiedQuestion, VerifiedQuestion};
use pqb_core::error::{AppError, CHUNK_NOT_FOUND, INVALID_TRANSITION, RECORD_NOT_FOUND};
use pqb_core::verify::{EvidenceSelection, VerificationStateMachine, VerifyRequest};

use crate::draft::GroundTruthDrafter;
use crate::evidence::propose_evidence;
use crate::retrieve::{EvidenceCandidate, RetrievalOutcome};

/// One reviewer pass over one unverified question.
///
/// Everything is held in memory until `commit`, `reject` or `mark_needs_revision`; dropping the
/// session cancels it and leaves both collections untouched.
pub struct VerificationSession<'a> {
    machine: VerificationStateMachine<'a>,
    chunks: &'a ChunkStore,
    question: UnverifiedQuestion,
    retrieval: RetrievalOutcome,
    selection: EvidenceSelection,
    question_text: String,
    ground_truth: String,
    difficulty: DifficultyLabel,
    notes: String,
    manual_evidence: bool,
}

impl<'a> VerificationSession<'a> {
    /// Open a session for a question that is still awaiting verification. The initial
    /// selection is the evidence proposal for its default difficulty.
    pub fn start(
        machine: VerificationStateMachine<'a>,
        chunks: &'a ChunkStore,
        question: UnverifiedQuestion,
        retrieval: RetrievalOutcome,
    ) -> Result<Self, AppError> {
        match machine.state_of(&question.question_id)? {
            Some(QuestionState::Unverified) => {}
            Some(_) => {
                return Err(AppError::new(INVALID_TRANSITION, "Question is already verified")
                    .with_details(format!("question_id={}", question.question_id)));
            }
            None => {
                return Err(AppError::new(RECORD_NOT_FOUND, "Question not found")
                    .with_details(format!("question_id={}", question.question_id)));
            }
        }

        let proposed = propose_evidence(&retrieval.candidates, question.default_difficulty);
        let selection = EvidenceSelection::new(proposed)?;
        if let Some(cause) = &retrieval.degraded {
            tracing::warn!(
                question_id = %question.question_id,
                code = %cause.code,
                "review session started without retrieval candidates"
            );
        }

        Ok(Self {
            machine,
            chunks,
            question_text: question.question_text.clone(),
            difficulty: question.default_difficulty,
            question,
            retrieval,
            selection,
            ground_truth: String::new(),
            notes: String::new(),
            manual_evidence: false,
        })
    }

    pub fn question(&self) -> &UnverifiedQuestion {
        &self.question
    }

    pub fn candidates(&self) -> &[EvidenceCandidate] {
        &self.retrieval.candidates
    }

    pub fn degraded_cause(&self) -> Option<&AppError> {
        self.retrieval.degraded.as_ref()
    }

    pub fn selection(&self) -> &[String] {
        self.selection.as_slice()
    }

    pub fn question_text(&self) -> &str {
        &self.question_text
    }

    pub fn ground_truth(&self) -> &str {
        &self.ground_truth
    }

    pub fn difficulty(&self) -> DifficultyLabel {
        self.difficulty
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// Let `select` take chunk ids that retrieval did not offer. They must still exist.
    pub fn allow_manual_evidence(&mut self) {
        tracing::info!(question_id = %self.question.question_id, "manual evidence selection enabled");
        self.manual_evidence = true;
    }

    /// Replace the selection with `ordered_chunk_ids`, most important first.
    pub fn select<I, S>(&mut self, ordered_chunk_ids: I) -> Result<(), AppError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let selection = EvidenceSelection::new(ordered_chunk_ids)?;
        if self.manual_evidence {
            for chunk_id in selection.as_slice() {
                if !self.chunks.exists(chunk_id) {
                    return Err(AppError::new(CHUNK_NOT_FOUND, "Selected chunk does not exist")
                        .with_details(format!("chunk_id={chunk_id}")));
                }
            }
        } else {
            let offered: HashSet<&str> = self
                .retrieval
                .candidates
                .iter()
                .map(|c| c.chunk_id.as_str())
                .collect();
            if let Some(missing) = selection.as_slice().iter().find(|id| !offered.contains(id.as_str())) {
                return Err(AppError::new(
                    INVALID_TRANSITION,
                    "Selected chunk is not among the retrieval candidates",
                )
                .with_details(format!(
                    "question_id={}; chunk_id={missing}",
                    self.question.question_id
                )));
            }
        }
        self.selection = selection;
        Ok(())
    }

    pub fn selected_chunks(&self) -> Result<Vec<Chunk>, AppError> {
        self.selection
            .as_slice()
            .iter()
            .map(|id| self.chunks.read(id))
            .collect()
    }

    pub fn set_question_text(&mut self, text: &str) {
        self.question_text = text.trim().to_string();
    }

    pub fn set_ground_truth(&mut self, text: &str) {
        self.ground_truth = text.to_string();
    }

    /// Replace the ground truth with a draft built from the current selection.
    pub fn draft_ground_truth(&mut self, drafter: &GroundTruthDrafter<'_>) -> Result<&str, AppError> {
        let chunks = self.selected_chunks()?;
        let draft = drafter.draft(&self.question_text, &chunks);
        tracing::debug!(
            question_id = %self.question.question_id,
            used_fallback = draft.used_fallback,
            "ground truth drafted"
        );
        self.ground_truth = draft.text;
        Ok(&self.ground_truth)
    }

    pub fn set_difficulty(&mut self, difficulty: DifficultyLabel) {
        self.difficulty = difficulty;
    }

    pub fn suggested_difficulty(&self) -> DifficultyLabel {
        classify(&self.question_text, self.selection.as_slice())
    }

    pub fn set_notes(&mut self, notes: &str) {
        self.notes = notes.to_string();
    }

    pub fn commit(self, date_created: &str) -> Result<VerifiedQuestion, AppError> {
        let question_text = if self.question_text != self.question.question_text {
            Some(self.question_text)
        } else {
            None
        };
        self.machine.verify(VerifyRequest {
            question_id: self.question.question_id,
            question_text,
            ground_truth: self.ground_truth,
            golden_chunk_ids: self.selection,
            difficulty: self.difficulty,
            notes: self.notes,
            date_created: date_created.to_string(),
        })
    }

    pub fn reject(self, at: &str) -> Result<UnverifiedQuestion, AppError> {
        self.machine.reject(&self.question.question_id, at)
    }

    pub fn mark_needs_revision(self, at: &str) -> Result<UnverifiedQuestion, AppError> {
        self.machine
            .mark_needs_revision(&self.question.question_id, &self.notes, at)
    }
}
