use pqb_core::domain::DifficultyLabel;

use crate::retrieve::similarity::rank_order;
use crate::retrieve::EvidenceCandidate;

pub const DEFAULT_PROPOSAL_SIZE: usize = 3;
pub const MULTI_HOP_PROPOSAL_SIZE: usize = 4;

pub fn proposal_size(difficulty: DifficultyLabel) -> usize {
    match difficulty {
        DifficultyLabel::MultiHop => MULTI_HOP_PROPOSAL_SIZE,
        _ => DEFAULT_PROPOSAL_SIZE,
    }
}

/// Suggested starting selection: the best-scoring candidates, best first.
///
/// Only a suggestion; the reviewer's reordering is what gets persisted.
pub fn propose_evidence(candidates: &[EvidenceCandidate], difficulty: DifficultyLabel) -> Vec<String> {
    let mut ranked: Vec<(String, f32)> = candidates
        .iter()
        .map(|c| (c.chunk_id.clone(), c.score))
        .collect();
    ranked.sort_by(rank_order);
    ranked.dedup_by(|a, b| a.0 == b.0);
    ranked
        .into_iter()
        .take(proposal_size(difficulty))
        .map(|(id, _)| id)
        .collect()
}
