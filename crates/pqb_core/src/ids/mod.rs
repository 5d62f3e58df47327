use std::path::{Path, PathBuf};

use crate::error::{AppError, COUNTER_CORRUPTED};
use crate::fsio::{read_optional, write_atomic};

pub const COUNTER_FILE: &str = "question_id_counter.txt";

pub fn format_question_id(n: u64) -> String {
    format!("q_{n:06}")
}

/// Numeric part of a `q_NNNNNN` id.
pub fn parse_question_id(question_id: &str) -> Option<u64> {
    let digits = question_id.strip_prefix("q_")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Sole owner of the persisted question-id counter.
///
/// The counter file holds the next value to hand out. Callers are assumed to be sequential
/// (one process, one writer); every increment is persisted before the id is returned, so an
/// id can never be issued twice across restarts.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    path: PathBuf,
}

impl IdAllocator {
    pub fn open(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    fn read_counter(&self) -> Result<Option<u64>, AppError> {
        let Some(bytes) = read_optional(&self.path, COUNTER_CORRUPTED, "question id counter")? else {
            return Ok(None);
        };
        let raw = String::from_utf8_lossy(&bytes);
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AppError::new(
                COUNTER_CORRUPTED,
                "Question id counter is not a non-negative integer",
            )
            .with_details(format!("path={}; value={:?}", self.path.display(), trimmed)));
        }
        trimmed.parse::<u64>().map(Some).map_err(|e| {
            AppError::new(COUNTER_CORRUPTED, "Question id counter is out of range")
                .with_details(format!("path={}; err={}", self.path.display(), e))
        })
    }

    fn persist(&self, value: u64) -> Result<(), AppError> {
        write_atomic(
            &self.path,
            value.to_string().as_bytes(),
            COUNTER_CORRUPTED,
            "question id counter",
        )
    }

    /// Current counter value (the next id to be issued); 0 when no counter exists yet.
    pub fn peek(&self) -> Result<u64, AppError> {
        Ok(self.read_counter()?.unwrap_or(0))
    }

    /// Initialize a missing counter to `floor`. An existing counter is left untouched.
    pub fn seed_if_missing(&self, floor: u64) -> Result<bool, AppError> {
        if self.read_counter()?.is_some() {
            return Ok(false);
        }
        self.persist(floor)?;
        tracing::info!(path = %self.path.display(), floor, "question id counter initialized");
        Ok(true)
    }

    pub fn next_id(&self) -> Result<String, AppError> {
        let current = self.read_counter()?.unwrap_or(0);
        let next = current.checked_add(1).ok_or_else(|| {
            AppError::new(COUNTER_CORRUPTED, "Question id counter overflowed")
                .with_details(format!("path={}; value={current}", self.path.display()))
        })?;
        self.persist(next)?;
        Ok(format_question_id(current))
    }
}
