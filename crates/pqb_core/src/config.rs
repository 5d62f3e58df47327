use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, INVALID_CONFIGURATION};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub window_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_tokens: 300,
            overlap_tokens: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default `top_k` for plain searches.
    pub top_k: usize,
    /// Number of top hits whose neighbours are pulled into a generous candidate list.
    pub generous_top_k: usize,
    pub threshold: f32,
    pub cap: usize,
    pub index_dir: PathBuf,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 20,
            generous_top_k: 8,
            threshold: 0.15,
            cap: 25,
            index_dir: PathBuf::from("data/vector_index"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Deterministic, text-only behaviour; never touches the network.
    Offline,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: ProviderKind,
    pub base_url: String,
    pub question_model: String,
    pub answer_model: String,
    pub embedding_provider: ProviderKind,
    pub embedding_model: String,
    pub embedding_dims: usize,
    pub timeout_secs: u64,
    pub questions_per_paper: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Offline,
            base_url: "http://127.0.0.1:11434".to_string(),
            question_model: "llama3.2:latest".to_string(),
            answer_model: "llama3.2:latest".to_string(),
            embedding_provider: ProviderKind::Offline,
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dims: 256,
            timeout_secs: 30,
            questions_per_paper: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub corpus_dir: PathBuf,
    pub chunk_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            corpus_dir: PathBuf::from("data/corpus"),
            chunk_dir: PathBuf::from("data/chunks"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BenchmarkConfig {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub paths: PathsConfig,
}

impl BenchmarkConfig {
    /// Load configuration from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let cfg = match path {
            None => Self::default(),
            Some(p) => {
                let raw = fs::read_to_string(p).map_err(|e| {
                    AppError::new(INVALID_CONFIGURATION, "Failed to read configuration file")
                        .with_details(format!("path={}; err={}", p.display(), e))
                })?;
                Self::from_toml_str(&raw).map_err(|e| {
                    let details = e.details.clone().unwrap_or_default();
                    e.with_details(format!("path={}; {}", p.display(), details))
                })?
            }
        };
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, AppError> {
        let cfg: Self = toml::from_str(raw).map_err(|e| {
            AppError::new(INVALID_CONFIGURATION, "Failed to parse configuration")
                .with_details(e.to_string())
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        validate_chunking(self.chunking.window_tokens, self.chunking.overlap_tokens)?;
        if self.retrieval.top_k == 0 || self.retrieval.cap == 0 {
            return Err(AppError::new(
                INVALID_CONFIGURATION,
                "Retrieval top_k and cap must be positive",
            )
            .with_details(format!(
                "top_k={}; cap={}",
                self.retrieval.top_k, self.retrieval.cap
            )));
        }
        if self.generation.embedding_dims == 0 {
            return Err(AppError::new(
                INVALID_CONFIGURATION,
                "Embedding dims must be positive",
            ));
        }
        Ok(())
    }

    /// Resolve relative paths against `base` (typically the config file's directory).
    pub fn rooted_at(mut self, base: &Path) -> Self {
        let join = |p: &PathBuf| if p.is_absolute() { p.clone() } else { base.join(p) };
        self.paths.data_dir = join(&self.paths.data_dir);
        self.paths.corpus_dir = join(&self.paths.corpus_dir);
        self.paths.chunk_dir = join(&self.paths.chunk_dir);
        self.retrieval.index_dir = join(&self.retrieval.index_dir);
        self
    }
}

pub fn validate_chunking(window_tokens: usize, overlap_tokens: usize) -> Result<(), AppError> {
    if window_tokens == 0 || overlap_tokens == 0 || overlap_tokens >= window_tokens {
        return Err(AppError::new(
            INVALID_CONFIGURATION,
            "Chunking requires 0 < overlap_tokens < window_tokens",
        )
        .with_details(format!(
            "window_tokens={window_tokens}; overlap_tokens={overlap_tokens}"
        )));
    }
    Ok(())
}
