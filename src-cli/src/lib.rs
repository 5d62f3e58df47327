use std::path::{Path, PathBuf};

use pqb_ai::draft::{GroundTruthDraft, GroundTruthDrafter};
use pqb_ai::embeddings::build_embedder;
use pqb_ai::evidence::propose_evidence;
use pqb_ai::generate::{GeneratedQuestion, QuestionGenerator};
use pqb_ai::index::{IndexBuilder, IndexManifest};
use pqb_ai::llm::{build_llm, GenerationRole};
use pqb_ai::ollama::OllamaClient;
use pqb_ai::retrieve::{EvidenceCandidate, RetrievalHit, RetrievalOutcome, RetrievalService};
use pqb_ai::session::VerificationSession;
use pqb_core::audit::{list_events, AuditEvent};
use pqb_core::config::BenchmarkConfig;
use pqb_core::difficulty::{canonical_profile, classify};
use pqb_core::domain::{DifficultyLabel, UnverifiedQuestion, VerifiedQuestion};
use pqb_core::error::{AppError, CHUNK_NOT_FOUND, INVALID_CONFIGURATION};
use pqb_core::export::ExportResult;
use pqb_core::ingest::IngestOutcome;
use pqb_core::questions::NewQuestion;
use pqb_core::workspace::{BenchmarkWorkspace, WorkspaceMetadata};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub mod cli;

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "pqb.toml";

#[derive(Debug, serde::Serialize)]
pub struct AiHealthStatus {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, serde::Serialize)]
pub struct GenerateResponse {
    pub questions: Vec<GeneratedQuestion>,
    pub accepted: Vec<UnverifiedQuestion>,
}

#[derive(Debug, Default)]
pub struct GenerateInput {
    pub paper_id: String,
    pub count: Option<usize>,
    /// Single-question mode: regenerate one slot of this profile.
    pub profile: Option<String>,
    pub slot: usize,
    pub feedback: String,
    pub accept: bool,
}

/// Read-only view of a review session: nothing is persisted.
#[derive(Debug, serde::Serialize)]
pub struct ReviewPreview {
    pub question: UnverifiedQuestion,
    pub candidates: Vec<EvidenceCandidate>,
    pub degraded: Option<AppError>,
    pub proposed_evidence: Vec<String>,
    pub suggested_difficulty: DifficultyLabel,
    pub ground_truth_draft: Option<GroundTruthDraft>,
}

#[derive(Debug, Default)]
pub struct VerifyInput {
    pub question_id: String,
    /// Ordered evidence; empty keeps the proposed selection.
    pub evidence: Vec<String>,
    pub ground_truth: Option<String>,
    pub draft: bool,
    pub difficulty: Option<DifficultyLabel>,
    pub notes: String,
    pub question_text: Option<String>,
    pub manual_evidence: bool,
}

pub fn now_rfc3339_utc() -> Result<String, AppError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| AppError::new("TIME_FORMAT_FAILED", "Failed to format time").with_details(e.to_string()))
}

/// Explicit path, else `pqb.toml` in the working directory, else defaults.
/// Relative paths inside a config file resolve against the file's directory.
pub fn load_config(path: Option<&Path>) -> Result<BenchmarkConfig, AppError> {
    let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
    let path = match path {
        Some(p) => Some(p),
        None if fallback.is_file() => Some(fallback.as_path()),
        None => None,
    };
    let cfg = BenchmarkConfig::load(path)?;
    Ok(match path.and_then(Path::parent) {
        Some(dir) if !dir.as_os_str().is_empty() => cfg.rooted_at(dir),
        _ => cfg,
    })
}

pub fn open_workspace(cfg: BenchmarkConfig) -> Result<BenchmarkWorkspace, AppError> {
    BenchmarkWorkspace::open(cfg)
}

pub fn status(ws: &BenchmarkWorkspace) -> Result<WorkspaceMetadata, AppError> {
    ws.metadata()
}

pub fn ingest(ws: &BenchmarkWorkspace, force: bool) -> Result<Vec<IngestOutcome>, AppError> {
    ws.ingest_corpus(&now_rfc3339_utc()?, force)
}

pub fn build_index(ws: &BenchmarkWorkspace) -> Result<IndexManifest, AppError> {
    let cfg = ws.config();
    let backend = build_embedder(&cfg.generation)?;
    IndexBuilder::open(cfg.retrieval.index_dir.clone()).build(
        ws.chunks(),
        backend.embedder.as_ref(),
        &backend.model,
        &now_rfc3339_utc()?,
    )
}

fn known_questions(ws: &BenchmarkWorkspace, paper_id: &str) -> Result<Vec<String>, AppError> {
    let mut out: Vec<String> = ws
        .unverified()
        .list()?
        .into_iter()
        .filter(|q| q.paper_id == paper_id)
        .map(|q| q.question_text)
        .collect();
    out.extend(
        ws.verified()
            .list()?
            .into_iter()
            .filter(|q| q.source_paper_id == paper_id)
            .map(|q| q.question_text),
    );
    Ok(out)
}

pub fn generate(ws: &BenchmarkWorkspace, input: GenerateInput) -> Result<GenerateResponse, AppError> {
    let cfg = &ws.config().generation;
    if !ws.chunks().has_chunks(&input.paper_id)? {
        return Err(AppError::new(CHUNK_NOT_FOUND, "Paper has no chunks; run ingest first")
            .with_details(format!("paper_id={}", input.paper_id)));
    }
    let chunks = ws.chunks().list(&input.paper_id)?;
    let avoid = known_questions(ws, &input.paper_id)?;

    let llm = build_llm(cfg)?;
    let generator = QuestionGenerator::new(llm.as_deref(), GenerationRole::Question.model(cfg));
    let questions = match input.profile.as_deref() {
        Some(label) => vec![generator.generate_profile_question(
            &input.paper_id,
            &chunks,
            canonical_profile(Some(label)),
            input.slot,
            &input.feedback,
            &avoid,
        )],
        None => {
            let count = input.count.unwrap_or(cfg.questions_per_paper);
            generator.generate_for_paper(&input.paper_id, &chunks, count, &avoid)
        }
    };

    let mut accepted = Vec::new();
    if input.accept {
        let at = now_rfc3339_utc()?;
        for q in questions.iter() {
            accepted.push(ws.accept(
                NewQuestion {
                    paper_id: q.paper_id.clone(),
                    question_text: q.question_text.clone(),
                    default_difficulty: q.difficulty,
                },
                &at,
            )?);
        }
    }
    Ok(GenerateResponse {
        questions,
        accepted,
    })
}

pub fn accept(
    ws: &BenchmarkWorkspace,
    paper_id: &str,
    question_text: &str,
    difficulty: DifficultyLabel,
) -> Result<UnverifiedQuestion, AppError> {
    ws.accept(
        NewQuestion {
            paper_id: paper_id.to_string(),
            question_text: question_text.to_string(),
            default_difficulty: difficulty,
        },
        &now_rfc3339_utc()?,
    )
}

pub fn list_unverified(ws: &BenchmarkWorkspace) -> Result<Vec<UnverifiedQuestion>, AppError> {
    ws.unverified().list()
}

pub fn list_verified(ws: &BenchmarkWorkspace) -> Result<Vec<VerifiedQuestion>, AppError> {
    ws.verified().list()
}

pub fn search(ws: &BenchmarkWorkspace, query: &str, top_k: Option<usize>) -> Result<Vec<RetrievalHit>, AppError> {
    let cfg = ws.config();
    RetrievalService::open(cfg)?.search(query, top_k.unwrap_or(cfg.retrieval.top_k))
}

/// Retrieval failures become an empty, explained candidate list.
pub fn retrieve_candidates(cfg: &BenchmarkConfig, question_text: &str) -> RetrievalOutcome {
    RetrievalOutcome::from_result(
        RetrievalService::open(cfg).and_then(|s| s.search_generous(question_text, &cfg.retrieval)),
    )
}

fn drafter_llm(cfg: &BenchmarkConfig) -> Result<Option<Box<dyn pqb_ai::llm::Llm>>, AppError> {
    build_llm(&cfg.generation)
}

pub fn review(ws: &BenchmarkWorkspace, question_id: &str, draft: bool) -> Result<ReviewPreview, AppError> {
    let question = ws.unverified().find(question_id)?;
    let outcome = retrieve_candidates(ws.config(), &question.question_text);
    let proposed_evidence = propose_evidence(&outcome.candidates, question.default_difficulty);
    let suggested_difficulty = classify(&question.question_text, &proposed_evidence);

    let ground_truth_draft = if draft {
        let llm = drafter_llm(ws.config())?;
        let drafter = GroundTruthDrafter::new(
            llm.as_deref(),
            GenerationRole::GroundTruth.model(&ws.config().generation),
        );
        let chunks = proposed_evidence
            .iter()
            .map(|id| ws.chunks().read(id))
            .collect::<Result<Vec<_>, _>>()?;
        Some(drafter.draft(&question.question_text, &chunks))
    } else {
        None
    };

    Ok(ReviewPreview {
        question,
        candidates: outcome.candidates,
        degraded: outcome.degraded,
        proposed_evidence,
        suggested_difficulty,
        ground_truth_draft,
    })
}

pub fn verify(ws: &BenchmarkWorkspace, input: VerifyInput) -> Result<VerifiedQuestion, AppError> {
    let question = ws.unverified().find(&input.question_id)?;
    let outcome = retrieve_candidates(ws.config(), &question.question_text);
    let mut session = VerificationSession::start(ws.state_machine(), ws.chunks(), question, outcome)?;

    if input.manual_evidence {
        session.allow_manual_evidence();
    }
    if !input.evidence.is_empty() {
        session.select(input.evidence)?;
    }
    if let Some(text) = input.question_text.as_deref() {
        session.set_question_text(text);
    }
    if let Some(difficulty) = input.difficulty {
        session.set_difficulty(difficulty);
    }
    session.set_notes(&input.notes);

    match (input.ground_truth, input.draft) {
        (Some(text), false) => session.set_ground_truth(&text),
        (None, true) => {
            let llm = drafter_llm(ws.config())?;
            let drafter = GroundTruthDrafter::new(
                llm.as_deref(),
                GenerationRole::GroundTruth.model(&ws.config().generation),
            );
            session.draft_ground_truth(&drafter)?;
        }
        (Some(_), true) => {
            return Err(AppError::new(
                INVALID_CONFIGURATION,
                "Give either a ground truth or --draft, not both",
            ));
        }
        (None, false) => {}
    }

    session.commit(&now_rfc3339_utc()?)
}

pub fn reject(ws: &BenchmarkWorkspace, question_id: &str) -> Result<UnverifiedQuestion, AppError> {
    ws.state_machine().reject(question_id, &now_rfc3339_utc()?)
}

pub fn revise(ws: &BenchmarkWorkspace, question_id: &str, notes: &str) -> Result<UnverifiedQuestion, AppError> {
    ws.state_machine()
        .mark_needs_revision(question_id, notes, &now_rfc3339_utc()?)
}

pub fn export(ws: &BenchmarkWorkspace, destination_dir: &Path) -> Result<ExportResult, AppError> {
    ws.export(destination_dir, &now_rfc3339_utc()?)
}

pub fn audit_log(ws: &BenchmarkWorkspace, question_id: Option<&str>) -> Result<Vec<AuditEvent>, AppError> {
    list_events(ws.conn(), question_id)
}

pub fn ai_health_check(cfg: &BenchmarkConfig) -> AiHealthStatus {
    let result = OllamaClient::from_config(&cfg.generation).and_then(|c| c.health_check());
    match result {
        Ok(()) => AiHealthStatus {
            ok: true,
            message: "Ollama is reachable on 127.0.0.1".to_string(),
        },
        Err(e) => AiHealthStatus {
            ok: false,
            message: e.to_string(),
        },
    }
}
