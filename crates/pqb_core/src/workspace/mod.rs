use std::fs;
use std::path::Path;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::{record_event, AuditEventType, NewAuditEvent};
use crate::chunks::ChunkStore;
use crate::config::BenchmarkConfig;
use crate::db;
use crate::domain::UnverifiedQuestion;
use crate::error::{AppError, STORE_IO_FAILED};
use crate::export::{export_dataset, ExportResult};
use crate::ids::{IdAllocator, COUNTER_FILE};
use crate::ingest::chunker::Chunker;
use crate::ingest::{ingest_all, IngestOutcome};
use crate::questions::{accept_question, NewQuestion, UnverifiedStore, VerifiedStore, UNVERIFIED_FILE, VERIFIED_FILE};
use crate::verify::{reconcile, VerificationStateMachine};

pub const AUDIT_DB_FILE: &str = "audit.sqlite";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceMetadata {
    pub data_dir: String,
    pub chunk_dir: String,
    pub paper_count: usize,
    pub unverified_count: usize,
    pub verified_count: usize,
    pub next_question_seq: u64,
}

/// One benchmark workspace on disk: chunk store, both question collections, the shared id
/// counter and the audit database.
pub struct BenchmarkWorkspace {
    config: BenchmarkConfig,
    chunker: Chunker,
    chunks: ChunkStore,
    allocator: IdAllocator,
    unverified: UnverifiedStore,
    verified: VerifiedStore,
    conn: Connection,
}

impl BenchmarkWorkspace {
    /// Open (creating directories as needed), seed a missing counter past any existing ids,
    /// and finish verifications interrupted by a crash.
    pub fn open(config: BenchmarkConfig) -> Result<Self, AppError> {
        config.validate()?;
        let data_dir = config.paths.data_dir.clone();
        ensure_dir(&data_dir)?;

        let chunker = Chunker::from_config(&config.chunking)?;
        let chunks = ChunkStore::open(config.paths.chunk_dir.clone());
        chunks.ensure_dirs()?;

        let allocator = IdAllocator::open(data_dir.join(COUNTER_FILE));
        let unverified = UnverifiedStore::open(data_dir.join(UNVERIFIED_FILE));
        let verified = VerifiedStore::open(data_dir.join(VERIFIED_FILE));

        let floor = [unverified.max_sequence()?, verified.max_sequence()?]
            .into_iter()
            .flatten()
            .max()
            .map(|max| max + 1)
            .unwrap_or(0);
        allocator.seed_if_missing(floor)?;

        let recovered = reconcile(&unverified, &verified)?;
        if !recovered.is_empty() {
            tracing::warn!(count = recovered.len(), "reconciled interrupted verifications");
        }

        let mut conn = db::open(&data_dir.join(AUDIT_DB_FILE))?;
        db::migrate(&mut conn)?;

        tracing::debug!(data_dir = %data_dir.display(), "workspace opened");
        Ok(Self {
            config,
            chunker,
            chunks,
            allocator,
            unverified,
            verified,
            conn,
        })
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    pub fn chunks(&self) -> &ChunkStore {
        &self.chunks
    }

    pub fn allocator(&self) -> &IdAllocator {
        &self.allocator
    }

    pub fn unverified(&self) -> &UnverifiedStore {
        &self.unverified
    }

    pub fn verified(&self) -> &VerifiedStore {
        &self.verified
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn state_machine(&self) -> VerificationStateMachine<'_> {
        VerificationStateMachine::new(&self.unverified, &self.verified, &self.chunks)
            .with_audit(&self.conn)
    }

    pub fn metadata(&self) -> Result<WorkspaceMetadata, AppError> {
        Ok(WorkspaceMetadata {
            data_dir: self.config.paths.data_dir.display().to_string(),
            chunk_dir: self.chunks.root().display().to_string(),
            paper_count: self.chunks.paper_ids()?.len(),
            unverified_count: self.unverified.list()?.len(),
            verified_count: self.verified.list()?.len(),
            next_question_seq: self.allocator.peek()?,
        })
    }

    pub fn ingest_corpus(&self, updated_at: &str, force: bool) -> Result<Vec<IngestOutcome>, AppError> {
        let outcomes = ingest_all(
            &self.chunks,
            &self.chunker,
            &self.config.paths.corpus_dir,
            updated_at,
            force,
        )?;
        for o in outcomes.iter().filter(|o| !o.skipped) {
            self.audit(NewAuditEvent {
                event_type: AuditEventType::PaperIngested,
                question_id: None,
                paper_id: Some(o.paper_id.clone()),
                payload: json!({ "chunk_count": o.chunk_count }),
                created_at: updated_at.to_string(),
            });
        }
        Ok(outcomes)
    }

    pub fn accept(&self, input: NewQuestion, at: &str) -> Result<UnverifiedQuestion, AppError> {
        let record = accept_question(&self.allocator, &self.unverified, input)?;
        self.audit(
            NewAuditEvent::for_question(
                AuditEventType::QuestionAccepted,
                &record.question_id,
                json!({
                    "question_text": record.question_text,
                    "default_difficulty": record.default_difficulty.as_str(),
                }),
                at,
            )
            .with_paper(&record.paper_id),
        );
        Ok(record)
    }

    pub fn export(&self, destination_dir: &Path, export_time: &str) -> Result<ExportResult, AppError> {
        export_dataset(&self.verified.list()?, destination_dir, export_time)
    }

    fn audit(&self, event: NewAuditEvent) {
        if let Err(e) = record_event(&self.conn, &event) {
            tracing::warn!(event_type = event.event_type.as_str(), error = %e, "audit event not recorded");
        }
    }
}

fn ensure_dir(path: &Path) -> Result<(), AppError> {
    fs::create_dir_all(path).map_err(|e| {
        AppError::new(STORE_IO_FAILED, "Failed to create workspace directory")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}
