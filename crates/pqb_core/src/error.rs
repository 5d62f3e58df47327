use serde::{Deserialize, Serialize};
use std::fmt;

pub const INVALID_CONFIGURATION: &str = "INVALID_CONFIGURATION";
pub const CHUNK_NOT_FOUND: &str = "CHUNK_NOT_FOUND";
pub const RECORD_NOT_FOUND: &str = "RECORD_NOT_FOUND";
pub const DUPLICATE_ID: &str = "DUPLICATE_ID";
pub const COUNTER_CORRUPTED: &str = "COUNTER_CORRUPTED";
pub const INDEX_UNAVAILABLE: &str = "INDEX_UNAVAILABLE";
pub const INVALID_TRANSITION: &str = "INVALID_TRANSITION";
pub const STORE_IO_FAILED: &str = "STORE_IO_FAILED";

/// Single structured error shape used across the core, AI, and CLI layers.
///
/// `code` is stable and machine-matchable; `details` names the path or
/// identifier involved so user-facing output never degrades to a generic message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }

    /// Data-integrity failures require operator intervention and are never repaired silently.
    pub fn is_integrity_violation(&self) -> bool {
        self.code == DUPLICATE_ID || self.code == COUNTER_CORRUPTED
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(details) = self.details.as_deref() {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}
