use std::collections::HashSet;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::{DifficultyLabel, QuestionRow, UnverifiedQuestion, VerifiedQuestion};
use crate::error::{AppError, DUPLICATE_ID, INVALID_TRANSITION, RECORD_NOT_FOUND, STORE_IO_FAILED};
use crate::fsio::{read_optional, write_atomic};
use crate::ids::{parse_question_id, IdAllocator};

pub const UNVERIFIED_FILE: &str = "unverified_questions.json";
pub const VERIFIED_FILE: &str = "verified_questions.json";

/// An ordered JSON array of question rows, rewritten whole on every mutation.
#[derive(Debug, Clone)]
pub struct QuestionStore<T> {
    path: PathBuf,
    _row: PhantomData<T>,
}

pub type UnverifiedStore = QuestionStore<UnverifiedQuestion>;
pub type VerifiedStore = QuestionStore<VerifiedQuestion>;

impl<T> QuestionStore<T>
where
    T: QuestionRow + Serialize + DeserializeOwned,
{
    pub fn open(path: PathBuf) -> Self {
        Self {
            path,
            _row: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Every row in insertion order. Duplicate ids on disk are an integrity error.
    pub fn list(&self) -> Result<Vec<T>, AppError> {
        let Some(bytes) = read_optional(&self.path, STORE_IO_FAILED, "question collection")? else {
            return Ok(Vec::new());
        };
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Vec::new());
        }
        let rows: Vec<T> = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::new("COLLECTION_CORRUPTED", "Failed to decode question collection")
                .with_details(format!("path={}; err={}", self.path.display(), e))
        })?;

        let mut seen = HashSet::new();
        for row in rows.iter() {
            if !seen.insert(row.question_id()) {
                return Err(AppError::new(
                    DUPLICATE_ID,
                    "Question collection contains a duplicated id",
                )
                .with_details(format!(
                    "path={}; question_id={}",
                    self.path.display(),
                    row.question_id()
                )));
            }
        }
        Ok(rows)
    }

    fn write_all(&self, rows: &[T]) -> Result<(), AppError> {
        let json = serde_json::to_string_pretty(rows).map_err(|e| {
            AppError::new(STORE_IO_FAILED, "Failed to encode question collection")
                .with_details(format!("path={}; err={}", self.path.display(), e))
        })?;
        write_atomic(&self.path, json.as_bytes(), STORE_IO_FAILED, "question collection")
    }

    pub fn find(&self, question_id: &str) -> Result<T, AppError> {
        self.list()?
            .into_iter()
            .find(|r| r.question_id() == question_id)
            .ok_or_else(|| self.not_found(question_id))
    }

    pub fn contains(&self, question_id: &str) -> Result<bool, AppError> {
        Ok(self.list()?.iter().any(|r| r.question_id() == question_id))
    }

    pub fn append(&self, record: T) -> Result<(), AppError> {
        let mut rows = self.list()?;
        if rows.iter().any(|r| r.question_id() == record.question_id()) {
            return Err(AppError::new(DUPLICATE_ID, "Question id already present in collection")
                .with_details(format!(
                    "path={}; question_id={}",
                    self.path.display(),
                    record.question_id()
                )));
        }
        rows.push(record);
        self.write_all(&rows)
    }

    /// Remove and return the matching row; the remaining rows keep their order.
    pub fn remove(&self, question_id: &str) -> Result<T, AppError> {
        let mut rows = self.list()?;
        let pos = rows
            .iter()
            .position(|r| r.question_id() == question_id)
            .ok_or_else(|| self.not_found(question_id))?;
        let removed = rows.remove(pos);
        self.write_all(&rows)?;
        Ok(removed)
    }

    /// Highest `q_NNNNNN` sequence number present, if any.
    pub fn max_sequence(&self) -> Result<Option<u64>, AppError> {
        Ok(self
            .list()?
            .iter()
            .filter_map(|r| parse_question_id(r.question_id()))
            .max())
    }

    fn not_found(&self, question_id: &str) -> AppError {
        AppError::new(RECORD_NOT_FOUND, "Question not found")
            .with_details(format!("path={}; question_id={question_id}", self.path.display()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewQuestion {
    pub paper_id: String,
    pub question_text: String,
    pub default_difficulty: DifficultyLabel,
}

/// Accept a generated question: mint an id from the shared allocator and queue it as unverified.
///
/// The id is consumed even if the append fails afterwards; ids are never reused.
pub fn accept_question(
    allocator: &IdAllocator,
    unverified: &UnverifiedStore,
    input: NewQuestion,
) -> Result<UnverifiedQuestion, AppError> {
    let question_text = input.question_text.trim();
    if question_text.is_empty() {
        return Err(AppError::new(
            INVALID_TRANSITION,
            "Cannot accept a question with empty text",
        )
        .with_details(format!("paper_id={}", input.paper_id)));
    }
    if input.paper_id.trim().is_empty() {
        return Err(AppError::new(
            INVALID_TRANSITION,
            "Cannot accept a question without a paper_id",
        ));
    }

    let record = UnverifiedQuestion {
        question_id: allocator.next_id()?,
        question_text: question_text.to_string(),
        paper_id: input.paper_id,
        default_difficulty: input.default_difficulty,
    };
    unverified.append(record.clone())?;
    tracing::info!(question_id = %record.question_id, paper_id = %record.paper_id, "question accepted");
    Ok(record)
}
