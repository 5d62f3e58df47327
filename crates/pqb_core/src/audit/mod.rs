use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    PaperIngested,
    QuestionAccepted,
    QuestionVerified,
    QuestionRejected,
    QuestionNeedsRevision,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::PaperIngested => "paper_ingested",
            AuditEventType::QuestionAccepted => "question_accepted",
            AuditEventType::QuestionVerified => "question_verified",
            AuditEventType::QuestionRejected => "question_rejected",
            AuditEventType::QuestionNeedsRevision => "question_needs_revision",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "paper_ingested" => Some(Self::PaperIngested),
            "question_accepted" => Some(Self::QuestionAccepted),
            "question_verified" => Some(Self::QuestionVerified),
            "question_rejected" => Some(Self::QuestionRejected),
            "question_needs_revision" => Some(Self::QuestionNeedsRevision),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub id: i64,
    pub event_type: AuditEventType,
    pub question_id: Option<String>,
    pub paper_id: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: String, // RFC3339
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAuditEvent {
    pub event_type: AuditEventType,
    pub question_id: Option<String>,
    pub paper_id: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: String,
}

impl NewAuditEvent {
    pub fn for_question(
        event_type: AuditEventType,
        question_id: &str,
        payload: serde_json::Value,
        created_at: &str,
    ) -> Self {
        Self {
            event_type,
            question_id: Some(question_id.to_string()),
            paper_id: None,
            payload,
            created_at: created_at.to_string(),
        }
    }

    pub fn with_paper(mut self, paper_id: &str) -> Self {
        self.paper_id = Some(paper_id.to_string());
        self
    }
}

pub fn record_event(conn: &Connection, input: &NewAuditEvent) -> Result<i64, AppError> {
    let payload_json = serde_json::to_string(&input.payload).map_err(|e| {
        AppError::new("DB_AUDIT_INVALID", "Failed to encode audit payload")
            .with_details(e.to_string())
    })?;
    conn.execute(
        r#"
        INSERT INTO audit_events(event_type, question_id, paper_id, payload_json, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            input.event_type.as_str(),
            input.question_id,
            input.paper_id,
            payload_json,
            input.created_at
        ],
    )
    .map_err(|e| {
        AppError::new("DB_AUDIT_WRITE_FAILED", "Failed to record audit event")
            .with_details(format!(
                "event_type={}; question_id={}; err={}",
                input.event_type.as_str(),
                input.question_id.as_deref().unwrap_or("-"),
                e
            ))
    })?;
    Ok(conn.last_insert_rowid())
}

/// Events in insertion order, optionally restricted to one question.
pub fn list_events(conn: &Connection, question_id: Option<&str>) -> Result<Vec<AuditEvent>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, event_type, question_id, paper_id, payload_json, created_at
            FROM audit_events
            WHERE (?1 IS NULL OR question_id = ?1)
            ORDER BY id ASC
            "#,
        )
        .map_err(|e| {
            AppError::new("DB_AUDIT_QUERY_FAILED", "Failed to query audit events")
                .with_details(e.to_string())
        })?;

    let rows = stmt
        .query_map(params![question_id], |row| {
            let event_type_raw: String = row.get(1)?;
            let event_type = AuditEventType::from_str(&event_type_raw).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    1,
                    rusqlite::types::Type::Text,
                    Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "invalid event_type",
                    )),
                )
            })?;
            let payload_json: String = row.get(4)?;
            let payload = serde_json::from_str(&payload_json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
            })?;
            Ok(AuditEvent {
                id: row.get(0)?,
                event_type,
                question_id: row.get(2)?,
                paper_id: row.get(3)?,
                payload,
                created_at: row.get(5)?,
            })
        })
        .map_err(|e| {
            AppError::new("DB_AUDIT_QUERY_FAILED", "Failed to read audit events")
                .with_details(e.to_string())
        })?;

    rows.collect::<Result<Vec<_>, _>>().map_err(|e| {
        AppError::new("DB_AUDIT_QUERY_FAILED", "Failed to decode audit event row")
            .with_details(e.to_string())
    })
}
