use pqb_core::config::{GenerationConfig, ProviderKind};
use pqb_core::error::AppError;

use crate::ollama::require_ollama;

/// Which benchmark artifact a generate call produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationRole {
    Question,
    GroundTruth,
}

impl GenerationRole {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationRole::Question => "question",
            GenerationRole::GroundTruth => "ground_truth",
        }
    }

    /// The configured model for this role.
    pub fn model(self, cfg: &GenerationConfig) -> &str {
        match self {
            GenerationRole::Question => &cfg.question_model,
            GenerationRole::GroundTruth => &cfg.answer_model,
        }
    }
}

pub trait Llm {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError>;

    /// Backends that tune sampling per role override this.
    fn generate_as(&self, role: GenerationRole, model: &str, prompt: &str) -> Result<String, AppError> {
        let _ = role;
        self.generate(model, prompt)
    }
}

pub mod ollama_llm;

/// Text generation backend chosen by `[generation] provider`.
///
/// `None` means offline: callers take their deterministic fallback path.
pub fn build_llm(cfg: &GenerationConfig) -> Result<Option<Box<dyn Llm>>, AppError> {
    match cfg.provider {
        ProviderKind::Offline => Ok(None),
        ProviderKind::Ollama => {
            let client = require_ollama(cfg, "text generation")?;
            Ok(Some(Box::new(ollama_llm::OllamaLlm::new(client))))
        }
    }
}

/// First non-empty line of a model reply with surrounding quotes removed.
pub fn first_line(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.trim_matches(|c| c == '"' || c == '\'').trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}
