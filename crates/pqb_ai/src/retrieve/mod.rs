use std::collections::BTreeMap;

use pqb_core::config::{BenchmarkConfig, RetrievalConfig};
use pqb_core::domain::{chunk_id_for, parse_chunk_id};
use pqb_core::error::{AppError, INVALID_CONFIGURATION};
use serde::{Deserialize, Serialize};

use crate::embeddings::{build_embedder, Embedder};
use crate::index::{FlatIndex, VectorIndex};

pub mod similarity;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalHit {
    pub chunk_id: String,
    pub score: f32,
}

/// A retrieval hit offered to the reviewer, ranked from 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceCandidate {
    pub chunk_id: String,
    pub score: f32,
    pub rank: u32,
}

/// Candidates for a review session, or the reason there are none.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalOutcome {
    pub candidates: Vec<EvidenceCandidate>,
    pub degraded: Option<AppError>,
}

impl RetrievalOutcome {
    /// Turn a retrieval failure into an empty, explained result instead of an error.
    pub fn from_result(result: Result<Vec<EvidenceCandidate>, AppError>) -> Self {
        match result {
            Ok(candidates) => Self {
                candidates,
                degraded: None,
            },
            Err(e) => {
                tracing::warn!(code = %e.code, error = %e, "retrieval degraded");
                Self {
                    candidates: Vec::new(),
                    degraded: Some(e),
                }
            }
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Query facade over a loaded vector index. It never mutates the index.
pub struct RetrievalService {
    index: FlatIndex,
    embedder: Box<dyn Embedder>,
    model: String,
}

impl RetrievalService {
    pub fn new(index: FlatIndex, embedder: Box<dyn Embedder>) -> Self {
        let model = index.manifest().embedding_model.clone();
        Self {
            index,
            embedder,
            model,
        }
    }

    /// Load the index from `[retrieval] index_dir` with the configured embedder.
    pub fn open(cfg: &BenchmarkConfig) -> Result<Self, AppError> {
        let backend = build_embedder(&cfg.generation)?;
        let index = FlatIndex::load(&cfg.retrieval.index_dir)?;
        if index.manifest().embedding_model != backend.model {
            tracing::warn!(
                index_model = %index.manifest().embedding_model,
                configured_model = %backend.model,
                "index was built with a different embedding model"
            );
        }
        Ok(Self::new(index, backend.embedder))
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    fn embed_query(&self, question_text: &str) -> Result<Vec<f32>, AppError> {
        let q = question_text.trim();
        if q.is_empty() {
            return Err(AppError::new("RETRIEVAL_QUERY_EMPTY", "Query must not be empty"));
        }
        self.embedder.embed(&self.model, q)
    }

    /// Top `top_k` chunks by cosine similarity, clipped to the index size.
    pub fn search(&self, question_text: &str, top_k: usize) -> Result<Vec<RetrievalHit>, AppError> {
        if top_k == 0 {
            return Err(AppError::new(INVALID_CONFIGURATION, "top_k must be a positive integer"));
        }
        let qv = self.embed_query(question_text)?;
        let hits = self.index.search(&qv, top_k)?;
        tracing::debug!(top_k, returned = hits.len(), "retrieval search");
        Ok(hits
            .into_iter()
            .map(|(chunk_id, score)| RetrievalHit { chunk_id, score })
            .collect())
    }

    /// Wide candidate list for review: the `generous_top_k` best hits with their immediate
    /// neighbours, then anything scoring at least `threshold`, capped at `cap` and ranked.
    pub fn search_generous(
        &self,
        question_text: &str,
        cfg: &RetrievalConfig,
    ) -> Result<Vec<EvidenceCandidate>, AppError> {
        if cfg.generous_top_k == 0 || cfg.cap == 0 {
            return Err(AppError::new(
                INVALID_CONFIGURATION,
                "generous_top_k and cap must be positive",
            ));
        }
        let qv = self.embed_query(question_text)?;
        let scored = self.index.score_all(&qv)?;
        Ok(generous_candidates(&scored, cfg))
    }
}

/// `scored` must already be in rank order.
pub fn generous_candidates(scored: &[(String, f32)], cfg: &RetrievalConfig) -> Vec<EvidenceCandidate> {
    let by_id: BTreeMap<&str, f32> = scored.iter().map(|(id, s)| (id.as_str(), *s)).collect();
    let mut selected: BTreeMap<String, f32> = BTreeMap::new();

    for (chunk_id, score) in scored.iter().take(cfg.generous_top_k) {
        selected.insert(chunk_id.clone(), *score);
        let Some((paper_id, index)) = parse_chunk_id(chunk_id) else {
            continue;
        };
        let neighbours = [index.checked_sub(1), index.checked_add(1)];
        for n in neighbours.into_iter().flatten() {
            let neighbour_id = chunk_id_for(paper_id, n);
            if let Some(s) = by_id.get(neighbour_id.as_str()) {
                selected.insert(neighbour_id, *s);
            }
        }
    }

    for (chunk_id, score) in scored.iter() {
        if selected.len() >= cfg.cap {
            break;
        }
        if *score >= cfg.threshold {
            selected.insert(chunk_id.clone(), *score);
        }
    }

    let mut ranked: Vec<(String, f32)> = selected.into_iter().collect();
    ranked.sort_by(similarity::rank_order);
    ranked.truncate(cfg.cap);
    ranked
        .into_iter()
        .enumerate()
        .map(|(i, (chunk_id, score))| EvidenceCandidate {
            chunk_id,
            score,
            rank: i as u32 + 1,
        })
        .collect()
}
