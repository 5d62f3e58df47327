use std::time::Duration;

use pqb_core::config::GenerationConfig;
use pqb_core::error::{AppError, INVALID_CONFIGURATION};

const LOCAL_HOST: &str = "http://127.0.0.1";

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    timeout: Duration,
}

impl OllamaClient {
    /// Create a client for Ollama. This is strictly limited to `127.0.0.1`.
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        validate_local_base_url(&base_url)?;
        Ok(Self {
            base_url,
            timeout: Duration::from_secs(30),
        })
    }

    pub fn from_config(cfg: &GenerationConfig) -> Result<Self, AppError> {
        Ok(Self::new(&cfg.base_url)?.with_timeout(Duration::from_secs(cfg.timeout_secs.max(1))))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn health_check(&self) -> Result<(), AppError> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = ureq::get(&url)
            .timeout(Duration::from_millis(800))
            .call();

        match resp {
            Ok(r) if r.status() == 200 => Ok(()),
            Ok(r) => Err(
                AppError::new("AI_OLLAMA_UNHEALTHY", "Ollama health check failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(e) => Err(AppError::new(
                "AI_OLLAMA_UNREACHABLE",
                "Failed to reach Ollama on 127.0.0.1",
            )
            .with_details(format!("base_url={}; err={}", self.base_url, e))
            .with_retryable(true)),
        }
    }
}

// Accepts exactly `http://127.0.0.1` or `http://127.0.0.1:<port>` with a port in 1..=65535.
fn validate_local_base_url(base_url: &str) -> Result<(), AppError> {
    let reject = || {
        AppError::new(
            "AI_REMOTE_NOT_ALLOWED",
            "Ollama base URL must be localhost (127.0.0.1)",
        )
        .with_details(format!("base_url={base_url}"))
    };

    let Some(rest) = base_url.strip_prefix(LOCAL_HOST) else {
        return Err(reject());
    };
    if rest.is_empty() {
        return Ok(());
    }
    let Some(port) = rest.strip_prefix(':') else {
        return Err(reject());
    };
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(reject());
    }
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(()),
        _ => Err(reject()),
    }
}

/// Client for a provider selected as `ollama`; unusable settings surface as configuration errors.
pub(crate) fn require_ollama(cfg: &GenerationConfig, what: &str) -> Result<OllamaClient, AppError> {
    OllamaClient::from_config(cfg).map_err(|e| {
        AppError::new(INVALID_CONFIGURATION, format!("Invalid Ollama settings for {what}"))
            .with_details(e.to_string())
    })
}
