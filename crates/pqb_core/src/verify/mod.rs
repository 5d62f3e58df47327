use std::collections::HashSet;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::audit::{record_event, AuditEventType, NewAuditEvent};
use crate::chunks::ChunkStore;
use crate::domain::{DifficultyLabel, QuestionState, UnverifiedQuestion, VerifiedQuestion};
use crate::error::{AppError, CHUNK_NOT_FOUND, INVALID_TRANSITION, RECORD_NOT_FOUND};
use crate::questions::{UnverifiedStore, VerifiedStore};

/// Human-confirmed evidence, most important first.
///
/// Order is data: nothing downstream sorts it. Duplicates and blank ids are refused at
/// construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct EvidenceSelection(Vec<String>);

impl EvidenceSelection {
    pub fn new<I, S>(ordered_chunk_ids: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for id in ordered_chunk_ids {
            let id: String = id.into();
            let id = id.trim().to_string();
            if id.is_empty() {
                return Err(AppError::new(
                    INVALID_TRANSITION,
                    "Evidence selection contains a blank chunk id",
                ));
            }
            if !seen.insert(id.clone()) {
                return Err(AppError::new(
                    INVALID_TRANSITION,
                    "Evidence selection lists a chunk more than once",
                )
                .with_details(format!("chunk_id={id}")));
            }
            ids.push(id);
        }
        Ok(Self(ids))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl TryFrom<Vec<String>> for EvidenceSelection {
    type Error = AppError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EvidenceSelection> for Vec<String> {
    fn from(value: EvidenceSelection) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyRequest {
    pub question_id: String,
    /// Reviewer-edited wording; `None` keeps the accepted text.
    pub question_text: Option<String>,
    pub ground_truth: String,
    pub golden_chunk_ids: EvidenceSelection,
    pub difficulty: DifficultyLabel,
    pub notes: String,
    pub date_created: String, // RFC3339
}

/// Drives the question lifecycle across the two collections.
///
/// Transitions are the only writers of question records after acceptance. Audit events are
/// best effort: a failed audit write is logged and never undoes a committed transition.
pub struct VerificationStateMachine<'a> {
    unverified: &'a UnverifiedStore,
    verified: &'a VerifiedStore,
    chunks: &'a ChunkStore,
    audit: Option<&'a Connection>,
}

impl<'a> VerificationStateMachine<'a> {
    pub fn new(
        unverified: &'a UnverifiedStore,
        verified: &'a VerifiedStore,
        chunks: &'a ChunkStore,
    ) -> Self {
        Self {
            unverified,
            verified,
            chunks,
            audit: None,
        }
    }

    pub fn with_audit(mut self, conn: &'a Connection) -> Self {
        self.audit = Some(conn);
        self
    }

    /// Persisted state of a question. `NeedsRevision` is not distinguishable on disk, and
    /// rejected questions are simply gone.
    pub fn state_of(&self, question_id: &str) -> Result<Option<QuestionState>, AppError> {
        if self.unverified.contains(question_id)? {
            return Ok(Some(QuestionState::Unverified));
        }
        if self.verified.contains(question_id)? {
            return Ok(Some(QuestionState::Verified));
        }
        Ok(None)
    }

    /// `Unverified -> Verified`.
    ///
    /// The verified append happens before the unverified removal. If the process dies in
    /// between, calling `verify` again finishes the removal instead of appending twice.
    pub fn verify(&self, req: VerifyRequest) -> Result<VerifiedQuestion, AppError> {
        if req.ground_truth.trim().is_empty() {
            return Err(AppError::new(
                INVALID_TRANSITION,
                "Cannot verify a question without a ground truth answer",
            )
            .with_details(format!("question_id={}", req.question_id)));
        }
        if req.golden_chunk_ids.is_empty() {
            return Err(AppError::new(
                INVALID_TRANSITION,
                "Cannot verify a question without golden evidence chunks",
            )
            .with_details(format!("question_id={}", req.question_id)));
        }
        validate_timestamp(&req.date_created, &req.question_id)?;
        for chunk_id in req.golden_chunk_ids.as_slice() {
            if !self.chunks.exists(chunk_id) {
                return Err(AppError::new(CHUNK_NOT_FOUND, "Golden chunk does not exist")
                    .with_details(format!(
                        "question_id={}; chunk_id={}; chunk_dir={}",
                        req.question_id,
                        chunk_id,
                        self.chunks.root().display()
                    )));
            }
        }

        let pending = self.find_unverified(&req.question_id)?;
        let already_verified = self.verified.contains(&req.question_id)?;

        let record = match (pending, already_verified) {
            (None, false) => {
                return Err(AppError::new(RECORD_NOT_FOUND, "Question is not awaiting verification")
                    .with_details(format!(
                        "question_id={}; path={}",
                        req.question_id,
                        self.unverified.path().display()
                    )));
            }
            (None, true) => {
                return Err(AppError::new(INVALID_TRANSITION, "Question is already verified")
                    .with_details(format!("question_id={}", req.question_id)));
            }
            (Some(_), true) => {
                tracing::warn!(
                    question_id = %req.question_id,
                    "completing interrupted verification; keeping existing verified record"
                );
                self.unverified.remove(&req.question_id)?;
                return self.verified.find(&req.question_id);
            }
            (Some(pending), false) => {
                let question_text = req
                    .question_text
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .unwrap_or(pending.question_text.as_str())
                    .to_string();
                VerifiedQuestion {
                    question_id: pending.question_id,
                    question_text,
                    source_paper_id: pending.paper_id,
                    ground_truth: req.ground_truth.trim().to_string(),
                    golden_chunk_ids: req.golden_chunk_ids.into_vec(),
                    difficulty: req.difficulty,
                    date_created: req.date_created,
                    notes: req.notes.trim().to_string(),
                }
            }
        };

        self.verified.append(record.clone())?;
        self.unverified.remove(&record.question_id)?;
        tracing::info!(
            question_id = %record.question_id,
            evidence = record.golden_chunk_ids.len(),
            "question verified"
        );

        self.audit(
            NewAuditEvent::for_question(
                AuditEventType::QuestionVerified,
                &record.question_id,
                json!({
                    "golden_chunk_ids": record.golden_chunk_ids,
                    "difficulty": record.difficulty.as_str(),
                }),
                &record.date_created,
            )
            .with_paper(&record.source_paper_id),
        );
        Ok(record)
    }

    /// `Unverified -> Rejected`. The record is deleted; nothing else is kept.
    pub fn reject(&self, question_id: &str, at: &str) -> Result<UnverifiedQuestion, AppError> {
        self.ensure_pending(question_id)?;
        let removed = self.unverified.remove(question_id)?;
        tracing::info!(question_id, "question rejected");
        self.audit(
            NewAuditEvent::for_question(AuditEventType::QuestionRejected, question_id, json!({}), at)
                .with_paper(&removed.paper_id),
        );
        Ok(removed)
    }

    /// `Unverified -> NeedsRevision`. No store changes; the event only reaches the audit log.
    pub fn mark_needs_revision(
        &self,
        question_id: &str,
        notes: &str,
        at: &str,
    ) -> Result<UnverifiedQuestion, AppError> {
        self.ensure_pending(question_id)?;
        let record = self.unverified.find(question_id)?;
        tracing::info!(question_id, "question marked for revision");
        self.audit(
            NewAuditEvent::for_question(
                AuditEventType::QuestionNeedsRevision,
                question_id,
                json!({ "notes": notes }),
                at,
            )
            .with_paper(&record.paper_id),
        );
        Ok(record)
    }

    fn find_unverified(&self, question_id: &str) -> Result<Option<UnverifiedQuestion>, AppError> {
        match self.unverified.find(question_id) {
            Ok(r) => Ok(Some(r)),
            Err(e) if e.is(RECORD_NOT_FOUND) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Verified wins over a leftover unverified row from an interrupted `verify`; the leftover
    /// is removed before refusing.
    fn ensure_pending(&self, question_id: &str) -> Result<(), AppError> {
        let pending = self.unverified.contains(question_id)?;
        if self.verified.contains(question_id)? {
            if pending {
                tracing::warn!(question_id, "finishing interrupted verification before refusing");
                self.unverified.remove(question_id)?;
            }
            return Err(AppError::new(INVALID_TRANSITION, "Question is already verified")
                .with_details(format!("question_id={question_id}")));
        }
        if pending {
            return Ok(());
        }
        Err(AppError::new(RECORD_NOT_FOUND, "Question not found")
            .with_details(format!(
                "question_id={question_id}; path={}",
                self.unverified.path().display()
            )))
    }

    fn audit(&self, event: NewAuditEvent) {
        let Some(conn) = self.audit else {
            return;
        };
        if let Err(e) = record_event(conn, &event) {
            tracing::warn!(
                event_type = event.event_type.as_str(),
                error = %e,
                "audit event not recorded"
            );
        }
    }
}

fn validate_timestamp(value: &str, question_id: &str) -> Result<(), AppError> {
    OffsetDateTime::parse(value, &Rfc3339).map(|_| ()).map_err(|e| {
        AppError::new(INVALID_TRANSITION, "date_created must be an RFC3339 timestamp")
            .with_details(format!("question_id={question_id}; value={value}; err={e}"))
    })
}

/// Remove unverified rows whose id already exists in the verified collection.
///
/// Such rows are left behind only by a verification interrupted between its two writes.
pub fn reconcile(unverified: &UnverifiedStore, verified: &VerifiedStore) -> Result<Vec<String>, AppError> {
    let verified_ids: HashSet<String> = verified
        .list()?
        .into_iter()
        .map(|r| r.question_id)
        .collect();
    let stale: Vec<String> = unverified
        .list()?
        .into_iter()
        .map(|r| r.question_id)
        .filter(|id| verified_ids.contains(id))
        .collect();
    for id in stale.iter() {
        unverified.remove(id)?;
        tracing::warn!(question_id = %id, "removed unverified copy of an already verified question");
    }
    Ok(stale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_keeps_order_and_refuses_duplicates() {
        let sel = EvidenceSelection::new(["b_chunk_0002", "b_chunk_0000"]).unwrap();
        assert_eq!(sel.as_slice(), &["b_chunk_0002".to_string(), "b_chunk_0000".to_string()]);

        let err = EvidenceSelection::new(["x_chunk_0001", "x_chunk_0001"]).unwrap_err();
        assert_eq!(err.code, INVALID_TRANSITION);
        assert!(EvidenceSelection::new([" "]).is_err());
        assert!(EvidenceSelection::new(Vec::<String>::new()).unwrap().is_empty());
    }

    #[test]
    fn selection_deserializes_through_validation() {
        let ok: EvidenceSelection = serde_json::from_str(r#"["p_chunk_0003","p_chunk_0001"]"#).unwrap();
        assert_eq!(ok.len(), 2);
        assert!(serde_json::from_str::<EvidenceSelection>(r#"["a","a"]"#).is_err());
    }

    #[test]
    fn timestamps_must_be_rfc3339() {
        assert!(validate_timestamp("2026-03-01T10:00:00Z", "q_000001").is_ok());
        assert_eq!(
            validate_timestamp("yesterday", "q_000001").unwrap_err().code,
            INVALID_TRANSITION
        );
    }
}
