use pqb_core::config::{GenerationConfig, ProviderKind};
use pqb_core::error::{AppError, INVALID_CONFIGURATION};
use sha2::{Digest, Sha256};

use crate::ollama::require_ollama;

pub trait Embedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError>;
}

pub mod ollama_embed;

/// Model name recorded in index manifests built by [`HashingEmbedder`].
pub const HASHING_MODEL: &str = "hashing-bow";

/// Offline bag-of-words embedder: lowercase `[a-z0-9_]+` tokens hashed into `dims` buckets,
/// L2-normalized. Deterministic across runs and platforms; the `model` argument is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Result<Self, AppError> {
        if dims == 0 {
            return Err(AppError::new(
                INVALID_CONFIGURATION,
                "Hashing embedder needs at least one dimension",
            ));
        }
        Ok(Self { dims })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(head) % self.dims as u64) as usize
    }
}

pub fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

impl Embedder for HashingEmbedder {
    fn embed(&self, _model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let mut v = vec![0.0f32; self.dims];
        for token in tokens(input) {
            v[self.bucket(&token)] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        Ok(v)
    }
}

/// Embedder plus the model name to pass to it, chosen by `[generation] embedding_provider`.
pub struct EmbeddingBackend {
    pub embedder: Box<dyn Embedder>,
    pub model: String,
}

pub fn build_embedder(cfg: &GenerationConfig) -> Result<EmbeddingBackend, AppError> {
    match cfg.embedding_provider {
        ProviderKind::Offline => Ok(EmbeddingBackend {
            embedder: Box::new(HashingEmbedder::new(cfg.embedding_dims)?),
            model: HASHING_MODEL.to_string(),
        }),
        ProviderKind::Ollama => {
            let client = require_ollama(cfg, "embeddings")?;
            Ok(EmbeddingBackend {
                embedder: Box::new(ollama_embed::OllamaEmbedder::new(client)),
                model: cfg.embedding_model.clone(),
            })
        }
    }
}
