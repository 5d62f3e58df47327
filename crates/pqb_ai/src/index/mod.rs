use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use pqb_core::chunks::ChunkStore;
use pqb_core::error::{AppError, INDEX_UNAVAILABLE};
use pqb_core::fsio::write_atomic;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::embeddings::Embedder;
use crate::retrieve::similarity::{cosine_similarity, l2_norm, rank_order};

pub const MANIFEST_FILE: &str = "index_manifest.json";
pub const VECTORS_FILE: &str = "index_vectors.json";
pub const METADATA_FILE: &str = "chunks_metadata.json";
pub const METRIC_COSINE: &str = "cosine";

const AI_INDEX_BUILD_FAILED: &str = "AI_INDEX_BUILD_FAILED";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexManifest {
    pub embedding_model: String,
    pub metric: String,
    pub dims: usize,
    pub chunk_count: usize,
    pub built_at: String, // RFC3339
}

/// Per-chunk pointer kept next to the vectors: where the text lives and what it hashed to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub chunk_id: String,
    pub paper_id: String,
    pub file_path: String,
    pub text_sha256: String,
}

/// Read-only similarity search over precomputed chunk vectors.
pub trait VectorIndex {
    fn manifest(&self) -> &IndexManifest;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `top_k` `(chunk_id, score)` pairs, best first, ties by ascending chunk id.
    fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<(String, f32)>, AppError>;

    fn metadata(&self, chunk_id: &str) -> Option<&ChunkMetadata>;
}

struct Row {
    chunk_id: String,
    vector: Vec<f32>,
    norm: f32,
}

/// Exhaustive cosine index loaded fully into memory.
pub struct FlatIndex {
    manifest: IndexManifest,
    rows: Vec<Row>,
    metadata: BTreeMap<String, ChunkMetadata>,
}

fn unavailable(message: &str, path: &Path, err: impl std::fmt::Display) -> AppError {
    AppError::new(INDEX_UNAVAILABLE, message)
        .with_details(format!("path={}; err={}", path.display(), err))
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, AppError> {
    let bytes = fs::read(path)
        .map_err(|e| unavailable(&format!("Failed to read {what}"), path, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| unavailable(&format!("Failed to decode {what}"), path, e))
}

impl FlatIndex {
    /// Load the artifact from `dir`. Any missing or inconsistent piece is `INDEX_UNAVAILABLE`.
    pub fn load(dir: &Path) -> Result<Self, AppError> {
        let manifest: IndexManifest = read_json(&dir.join(MANIFEST_FILE), "index manifest")?;
        let vectors: BTreeMap<String, Vec<f32>> = read_json(&dir.join(VECTORS_FILE), "index vectors")?;
        let metadata: Vec<ChunkMetadata> = read_json(&dir.join(METADATA_FILE), "chunk metadata")?;
        let index = Self::from_parts(manifest, vectors, metadata).map_err(|e| {
            let details = e.details.clone().unwrap_or_default();
            e.with_details(format!("dir={}; {}", dir.display(), details))
        })?;
        tracing::debug!(
            dir = %dir.display(),
            chunks = index.len(),
            dims = index.manifest.dims,
            "vector index loaded"
        );
        Ok(index)
    }

    pub fn from_parts(
        manifest: IndexManifest,
        vectors: BTreeMap<String, Vec<f32>>,
        metadata: Vec<ChunkMetadata>,
    ) -> Result<Self, AppError> {
        if manifest.metric != METRIC_COSINE {
            return Err(AppError::new(INDEX_UNAVAILABLE, "Unsupported index metric")
                .with_details(format!("metric={}", manifest.metric)));
        }
        let mut rows = Vec::with_capacity(vectors.len());
        for (chunk_id, vector) in vectors {
            if vector.len() != manifest.dims {
                return Err(AppError::new(INDEX_UNAVAILABLE, "Index vector dims mismatch")
                    .with_details(format!(
                        "chunk_id={chunk_id}; expected={}; got={}",
                        manifest.dims,
                        vector.len()
                    )));
            }
            let norm = l2_norm(&vector);
            rows.push(Row {
                chunk_id,
                vector,
                norm,
            });
        }
        let metadata = metadata
            .into_iter()
            .map(|m| (m.chunk_id.clone(), m))
            .collect();
        Ok(Self {
            manifest,
            rows,
            metadata,
        })
    }

    /// Every chunk scored against `vector`, in rank order.
    pub fn score_all(&self, vector: &[f32]) -> Result<Vec<(String, f32)>, AppError> {
        if vector.len() != self.manifest.dims {
            return Err(AppError::new(
                INDEX_UNAVAILABLE,
                "Query embedding dims do not match index dims",
            )
            .with_details(format!(
                "index_dims={}; query_dims={}; embedding_model={}",
                self.manifest.dims,
                vector.len(),
                self.manifest.embedding_model
            )));
        }
        let qnorm = l2_norm(vector);
        let mut hits: Vec<(String, f32)> = self
            .rows
            .iter()
            .map(|r| {
                (
                    r.chunk_id.clone(),
                    cosine_similarity(vector, &r.vector, qnorm, r.norm),
                )
            })
            .collect();
        hits.sort_by(rank_order);
        Ok(hits)
    }
}

impl VectorIndex for FlatIndex {
    fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<(String, f32)>, AppError> {
        let mut hits = self.score_all(vector)?;
        hits.truncate(top_k);
        Ok(hits)
    }

    fn metadata(&self, chunk_id: &str) -> Option<&ChunkMetadata> {
        self.metadata.get(chunk_id)
    }
}

/// Writes the index artifact from the chunk store, re-embedding only chunks whose text changed.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    dir: PathBuf,
}

impl IndexBuilder {
    pub fn open(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        self.dir.as_path()
    }

    fn previous(&self, model: &str) -> (BTreeMap<String, Vec<f32>>, BTreeMap<String, String>) {
        // A missing, unreadable, or foreign-model artifact just means a full rebuild.
        let Ok(index) = FlatIndex::load(&self.dir) else {
            return (BTreeMap::new(), BTreeMap::new());
        };
        if index.manifest.embedding_model != model {
            return (BTreeMap::new(), BTreeMap::new());
        }
        let hashes = index
            .metadata
            .values()
            .map(|m| (m.chunk_id.clone(), m.text_sha256.clone()))
            .collect();
        let vectors = index
            .rows
            .into_iter()
            .map(|r| (r.chunk_id, r.vector))
            .collect();
        (vectors, hashes)
    }

    pub fn build(
        &self,
        chunks: &ChunkStore,
        embedder: &dyn Embedder,
        model: &str,
        built_at: &str,
    ) -> Result<IndexManifest, AppError> {
        let mut current = Vec::new();
        for paper_id in chunks.paper_ids()? {
            current.extend(chunks.list(&paper_id)?);
        }
        if current.is_empty() {
            return Err(AppError::new(
                AI_INDEX_BUILD_FAILED,
                "No chunks available; ingest papers before building the index",
            )
            .with_details(format!("chunk_dir={}", chunks.root().display())));
        }
        current.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));

        let (mut vectors, hashes) = self.previous(model);
        let wanted: BTreeSet<&str> = current.iter().map(|c| c.chunk_id.as_str()).collect();
        vectors.retain(|k, _| wanted.contains(k.as_str()));

        let mut dims: Option<usize> = vectors.values().next().map(|v| v.len());
        let mut metadata = Vec::with_capacity(current.len());
        let mut embedded = 0usize;

        for chunk in current.iter() {
            let text_sha256 = hex::encode(Sha256::digest(chunk.text.as_bytes()));
            let fresh = hashes.get(&chunk.chunk_id) == Some(&text_sha256)
                && vectors.contains_key(&chunk.chunk_id);
            if !fresh {
                let v = embedder.embed(model, &chunk.text).map_err(|e| {
                    AppError::new("AI_EMBEDDINGS_FAILED", "Failed to compute embeddings")
                        .with_details(format!("chunk_id={}; err={}", chunk.chunk_id, e))
                        .with_retryable(e.retryable)
                })?;
                match dims {
                    Some(d) if d != v.len() => {
                        return Err(AppError::new(
                            AI_INDEX_BUILD_FAILED,
                            "Embedding dimension mismatch across chunks",
                        )
                        .with_details(format!(
                            "expected={d}; got={}; chunk_id={}",
                            v.len(),
                            chunk.chunk_id
                        )));
                    }
                    Some(_) => {}
                    None => dims = Some(v.len()),
                }
                vectors.insert(chunk.chunk_id.clone(), v);
                embedded += 1;
            }
            metadata.push(ChunkMetadata {
                chunk_id: chunk.chunk_id.clone(),
                paper_id: chunk.paper_id.clone(),
                file_path: chunks
                    .chunk_path(&chunk.paper_id, chunk.index)
                    .to_string_lossy()
                    .to_string(),
                text_sha256,
            });
        }

        let manifest = IndexManifest {
            embedding_model: model.to_string(),
            metric: METRIC_COSINE.to_string(),
            dims: dims.unwrap_or(0),
            chunk_count: vectors.len(),
            built_at: built_at.to_string(),
        };

        // The manifest goes last so a reader never sees it ahead of its vectors.
        self.write_json(VECTORS_FILE, &vectors, "index vectors")?;
        self.write_json(METADATA_FILE, &metadata, "chunk metadata")?;
        self.write_json(MANIFEST_FILE, &manifest, "index manifest")?;

        tracing::info!(
            dir = %self.dir.display(),
            chunks = manifest.chunk_count,
            embedded,
            "vector index built"
        );
        Ok(manifest)
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T, what: &str) -> Result<(), AppError> {
        let json = serde_json::to_string(value).map_err(|e| {
            AppError::new(AI_INDEX_BUILD_FAILED, format!("Failed to encode {what}"))
                .with_details(e.to_string())
        })?;
        write_atomic(&self.dir.join(name), json.as_bytes(), AI_INDEX_BUILD_FAILED, what)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(dims: usize) -> IndexManifest {
        IndexManifest {
            embedding_model: "mock".to_string(),
            metric: METRIC_COSINE.to_string(),
            dims,
            chunk_count: 0,
            built_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn search_clips_to_index_size_and_scores_zero_vectors_as_zero() {
        let mut vectors = BTreeMap::new();
        vectors.insert("p_chunk_0000".to_string(), vec![1.0, 0.0]);
        vectors.insert("p_chunk_0001".to_string(), vec![0.0, 0.0]);
        let index = FlatIndex::from_parts(manifest(2), vectors, Vec::new()).unwrap();

        let hits = index.search(&[1.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, "p_chunk_0000");
        assert_eq!(hits[1].1, 0.0);
    }

    #[test]
    fn inconsistent_artifacts_are_unavailable() {
        let mut vectors = BTreeMap::new();
        vectors.insert("p_chunk_0000".to_string(), vec![1.0, 0.0, 0.0]);
        let err = FlatIndex::from_parts(manifest(2), vectors, Vec::new())
            .err()
            .unwrap();
        assert_eq!(err.code, INDEX_UNAVAILABLE);

        let mut m = manifest(2);
        m.metric = "l2".to_string();
        assert!(FlatIndex::from_parts(m, BTreeMap::new(), Vec::new()).is_err());
    }

    #[test]
    fn missing_artifact_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = FlatIndex::load(dir.path()).err().unwrap();
        assert_eq!(err.code, INDEX_UNAVAILABLE);
        assert!(err.details.unwrap().contains(MANIFEST_FILE));
    }
}
