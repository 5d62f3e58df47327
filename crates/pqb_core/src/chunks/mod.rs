use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{chunk_id_for, parse_chunk_id, Chunk};
use crate::error::{AppError, CHUNK_NOT_FOUND, STORE_IO_FAILED};
use crate::fsio::{read_optional, write_atomic};

const SPANS_FILE: &str = "spans.json";
const MANIFEST_FILE: &str = "manifest.json";

/// Per-paper ingestion record kept in `<chunk_dir>/manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    pub paper_id: String,
    pub source_path: String,
    pub sha256: String,
    pub chunk_count: u32,
    pub window_tokens: usize,
    pub overlap_tokens: usize,
    pub updated_at: String, // RFC3339
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SpanFile {
    spans: Vec<[usize; 2]>,
}

/// Chunk persistence: `<root>/<paper_id>/<paper_id>_chunk_<NNNN>.txt`, body is raw UTF-8 text.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    pub fn open(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    fn paper_dir(&self, paper_id: &str) -> PathBuf {
        self.root.join(paper_id)
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Location of a chunk's text file; the file need not exist.
    pub fn chunk_path(&self, paper_id: &str, index: u32) -> PathBuf {
        self.paper_dir(paper_id)
            .join(format!("{}.txt", chunk_id_for(paper_id, index)))
    }

    pub fn ensure_dirs(&self) -> Result<(), AppError> {
        fs::create_dir_all(&self.root).map_err(|e| {
            AppError::new(STORE_IO_FAILED, "Failed to create chunk store directory")
                .with_details(format!("path={}; err={}", self.root.display(), e))
        })
    }

    /// Replace every chunk of `paper_id` with `chunks`.
    ///
    /// Each chunk file is written tmp-then-rename; files left over from a longer previous
    /// chunking are removed afterwards. Other papers are never touched.
    pub fn write(&self, paper_id: &str, chunks: &[Chunk]) -> Result<Vec<PathBuf>, AppError> {
        self.ensure_dirs()?;
        for (expected, chunk) in chunks.iter().enumerate() {
            if chunk.paper_id != paper_id || chunk.index as usize != expected {
                return Err(AppError::new(
                    "CHUNK_SET_INVALID",
                    "Chunks must belong to the paper and be indexed contiguously from 0",
                )
                .with_details(format!(
                    "paper_id={paper_id}; chunk_id={}; expected_index={expected}",
                    chunk.chunk_id
                )));
            }
        }

        let mut paths = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let path = self.chunk_path(paper_id, chunk.index);
            write_atomic(&path, chunk.text.as_bytes(), STORE_IO_FAILED, "chunk file")?;
            paths.push(path);
        }

        for (index, path) in self.enumerate_files(paper_id)? {
            if index as usize >= chunks.len() {
                fs::remove_file(&path).map_err(|e| {
                    AppError::new(STORE_IO_FAILED, "Failed to delete stale chunk file")
                        .with_details(format!("path={}; err={}", path.display(), e))
                })?;
            }
        }

        let spans = SpanFile {
            spans: chunks.iter().map(|c| [c.start, c.end]).collect(),
        };
        let json = serde_json::to_string_pretty(&spans).map_err(|e| {
            AppError::new(STORE_IO_FAILED, "Failed to encode chunk spans").with_details(e.to_string())
        })?;
        write_atomic(
            &self.paper_dir(paper_id).join(SPANS_FILE),
            json.as_bytes(),
            STORE_IO_FAILED,
            "chunk spans",
        )?;

        tracing::debug!(paper_id, chunk_count = chunks.len(), "chunks written");
        Ok(paths)
    }

    /// Chunk files of a paper sorted by index. Temp files and foreign names are ignored.
    fn enumerate_files(&self, paper_id: &str) -> Result<Vec<(u32, PathBuf)>, AppError> {
        let dir = self.paper_dir(paper_id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|e| {
            AppError::new(STORE_IO_FAILED, "Failed to list chunk directory")
                .with_details(format!("path={}; err={}", dir.display(), e))
        })?;

        let mut out = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("txt") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match parse_chunk_id(stem) {
                Some((pid, index)) if pid == paper_id => out.push((index, path)),
                _ => {}
            }
        }
        out.sort_by_key(|(index, _)| *index);
        Ok(out)
    }

    fn read_spans(&self, paper_id: &str) -> Result<Vec<[usize; 2]>, AppError> {
        let path = self.paper_dir(paper_id).join(SPANS_FILE);
        let Some(bytes) = read_optional(&path, STORE_IO_FAILED, "chunk spans")? else {
            return Ok(Vec::new());
        };
        let spans: SpanFile = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::new(STORE_IO_FAILED, "Failed to decode chunk spans")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        Ok(spans.spans)
    }

    fn read_text(path: &Path, chunk_id: &str) -> Result<String, AppError> {
        fs::read_to_string(path).map_err(|e| {
            let code = if e.kind() == std::io::ErrorKind::NotFound {
                CHUNK_NOT_FOUND
            } else {
                STORE_IO_FAILED
            };
            AppError::new(code, "Failed to read chunk")
                .with_details(format!("chunk_id={chunk_id}; path={}; err={}", path.display(), e))
        })
    }

    /// All chunks of a paper in index order; an unknown paper yields an empty list.
    pub fn list(&self, paper_id: &str) -> Result<Vec<Chunk>, AppError> {
        let spans = self.read_spans(paper_id)?;
        let files = self.enumerate_files(paper_id)?;
        let mut out = Vec::with_capacity(files.len());
        let mut cursor = 0usize;
        for (index, path) in files {
            let chunk_id = chunk_id_for(paper_id, index);
            let text = Self::read_text(&path, &chunk_id)?;
            let (start, end) = span_for(&spans, index, cursor, &text);
            cursor = end;
            out.push(Chunk {
                chunk_id,
                paper_id: paper_id.to_string(),
                index,
                start,
                end,
                text,
            });
        }
        Ok(out)
    }

    pub fn read(&self, chunk_id: &str) -> Result<Chunk, AppError> {
        let (paper_id, index) = parse_chunk_id(chunk_id).ok_or_else(|| {
            AppError::new(CHUNK_NOT_FOUND, "Chunk id is not a known chunk")
                .with_details(format!("chunk_id={chunk_id}"))
        })?;
        let path = self.chunk_path(paper_id, index);
        let text = Self::read_text(&path, chunk_id)?;
        let spans = self.read_spans(paper_id)?;
        let (start, end) = match spans.get(index as usize) {
            Some([s, e]) => (*s, *e),
            None => (0, text.split_whitespace().count()),
        };
        Ok(Chunk {
            chunk_id: chunk_id.to_string(),
            paper_id: paper_id.to_string(),
            index,
            start,
            end,
            text,
        })
    }

    pub fn exists(&self, chunk_id: &str) -> bool {
        parse_chunk_id(chunk_id)
            .map(|(paper_id, index)| self.chunk_path(paper_id, index).is_file())
            .unwrap_or(false)
    }

    pub fn has_chunks(&self, paper_id: &str) -> Result<bool, AppError> {
        Ok(!self.enumerate_files(paper_id)?.is_empty())
    }

    /// Papers that currently have a chunk directory, sorted.
    pub fn paper_ids(&self) -> Result<Vec<String>, AppError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root).map_err(|e| {
            AppError::new(STORE_IO_FAILED, "Failed to list chunk store")
                .with_details(format!("path={}; err={}", self.root.display(), e))
        })?;
        let mut ids: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(|s| s.to_string()))
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn read_manifest(&self) -> Result<BTreeMap<String, ManifestEntry>, AppError> {
        let path = self.manifest_path();
        let Some(bytes) = read_optional(&path, STORE_IO_FAILED, "chunk manifest")? else {
            return Ok(BTreeMap::new());
        };
        serde_json::from_slice(&bytes).map_err(|e| {
            AppError::new(STORE_IO_FAILED, "Failed to decode chunk manifest")
                .with_details(format!("path={}; err={}", path.display(), e))
        })
    }

    pub fn update_manifest(&self, entry: ManifestEntry) -> Result<(), AppError> {
        let mut manifest = self.read_manifest()?;
        manifest.insert(entry.paper_id.clone(), entry);
        let json = serde_json::to_string_pretty(&manifest).map_err(|e| {
            AppError::new(STORE_IO_FAILED, "Failed to encode chunk manifest").with_details(e.to_string())
        })?;
        write_atomic(&self.manifest_path(), json.as_bytes(), STORE_IO_FAILED, "chunk manifest")
    }
}

// Without a span sidecar (chunks written by another tool) spans are laid end to end.
fn span_for(spans: &[[usize; 2]], index: u32, cursor: usize, text: &str) -> (usize, usize) {
    match spans.get(index as usize) {
        Some([s, e]) => (*s, *e),
        None => (cursor, cursor + text.split_whitespace().count()),
    }
}
