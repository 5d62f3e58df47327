pub mod chunker;
pub mod text_cleaner;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chunks::{ChunkStore, ManifestEntry};
use crate::domain::{Chunk, Paper};
use crate::error::{AppError, STORE_IO_FAILED};

use self::chunker::Chunker;
use self::text_cleaner::{clean_text, decode_lossy};

const SOURCE_EXTENSIONS: [&str; 2] = ["txt", "md"];

pub const PAPER_ID_COLLISION: &str = "PAPER_ID_COLLISION";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestOutcome {
    pub paper_id: String,
    pub chunk_count: u32,
    /// True when the manifest showed the source and chunk layout unchanged.
    pub skipped: bool,
}

/// Stable paper id from a source file name: the stem with anything outside
/// `[A-Za-z0-9._-]` replaced by `_`.
pub fn paper_id_from_path(path: &Path) -> Result<String, AppError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AppError::new("PAPER_SOURCE_INVALID", "Source file has no usable name")
                .with_details(format!("path={}", path.display()))
        })?;
    Ok(stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect())
}

/// Text sources in the corpus directory, sorted by path.
pub fn list_papers(corpus_dir: &Path) -> Result<Vec<Paper>, AppError> {
    if !corpus_dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(corpus_dir).map_err(|e| {
        AppError::new(STORE_IO_FAILED, "Failed to list corpus directory")
            .with_details(format!("path={}; err={}", corpus_dir.display(), e))
    })?;
    let mut paths: Vec<_> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|s| s.to_str())
                .map(|ext| SOURCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    // Paper ids are unique across the corpus.
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    let mut papers = Vec::with_capacity(paths.len());
    for p in paths {
        let paper_id = paper_id_from_path(&p)?;
        let source_path = p.to_string_lossy().to_string();
        if let Some(first) = seen.get(&paper_id) {
            return Err(AppError::new(
                PAPER_ID_COLLISION,
                "Two corpus sources map to the same paper id; rename one of them",
            )
            .with_details(format!("paper_id={paper_id}; first={first}; second={source_path}")));
        }
        seen.insert(paper_id.clone(), source_path.clone());
        papers.push(Paper {
            paper_id,
            source_path,
        });
    }
    Ok(papers)
}

/// Clean, chunk, and persist already-extracted text. Does not touch the manifest.
pub fn ingest_text(
    store: &ChunkStore,
    chunker: &Chunker,
    paper_id: &str,
    raw_text: &str,
) -> Result<Vec<Chunk>, AppError> {
    let cleaned = clean_text(raw_text);
    let chunks = chunker.chunk_paper(paper_id, &cleaned);
    store.write(paper_id, &chunks)?;
    Ok(chunks)
}

/// Ingest one source file. Skips the work when the manifest already records the same
/// source digest and chunk layout, unless `force` is set.
pub fn ingest_paper(
    store: &ChunkStore,
    chunker: &Chunker,
    source: &Path,
    updated_at: &str,
    force: bool,
) -> Result<IngestOutcome, AppError> {
    let paper_id = paper_id_from_path(source)?;
    let bytes = fs::read(source).map_err(|e| {
        AppError::new("PAPER_SOURCE_INVALID", "Failed to read paper source")
            .with_details(format!("path={}; err={}", source.display(), e))
    })?;
    let sha256 = hex::encode(Sha256::digest(&bytes));

    if !force {
        if let Some(entry) = store.read_manifest()?.get(&paper_id) {
            let unchanged = entry.sha256 == sha256
                && entry.window_tokens == chunker.window_tokens()
                && entry.overlap_tokens == chunker.overlap_tokens()
                && store.has_chunks(&paper_id)?;
            if unchanged {
                tracing::info!(paper_id, "paper unchanged; ingest skipped");
                return Ok(IngestOutcome {
                    paper_id,
                    chunk_count: entry.chunk_count,
                    skipped: true,
                });
            }
        }
    }

    let chunks = ingest_text(store, chunker, &paper_id, &decode_lossy(&bytes))?;
    let chunk_count = chunks.len() as u32;
    store.update_manifest(ManifestEntry {
        paper_id: paper_id.clone(),
        source_path: source.to_string_lossy().to_string(),
        sha256,
        chunk_count,
        window_tokens: chunker.window_tokens(),
        overlap_tokens: chunker.overlap_tokens(),
        updated_at: updated_at.to_string(),
    })?;
    tracing::info!(paper_id, chunk_count, "paper ingested");

    Ok(IngestOutcome {
        paper_id,
        chunk_count,
        skipped: false,
    })
}

pub fn ingest_all(
    store: &ChunkStore,
    chunker: &Chunker,
    corpus_dir: &Path,
    updated_at: &str,
    force: bool,
) -> Result<Vec<IngestOutcome>, AppError> {
    let papers = list_papers(corpus_dir)?;
    let mut out = Vec::with_capacity(papers.len());
    for paper in papers {
        out.push(ingest_paper(
            store,
            chunker,
            Path::new(&paper.source_path),
            updated_at,
            force,
        )?);
    }
    Ok(out)
}
