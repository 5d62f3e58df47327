use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::tempdir;

use pqb_ai::draft::GroundTruthDrafter;
use pqb_ai::embeddings::{HashingEmbedder, HASHING_MODEL};
use pqb_ai::index::IndexBuilder;
use pqb_ai::retrieve::{RetrievalOutcome, RetrievalService};
use pqb_ai::session::VerificationSession;
use pqb_core::config::{BenchmarkConfig, PathsConfig};
use pqb_core::domain::{DifficultyLabel, QuestionState, UnverifiedQuestion};
use pqb_core::error::{CHUNK_NOT_FOUND, INDEX_UNAVAILABLE, INVALID_TRANSITION};
use pqb_core::questions::NewQuestion;
use pqb_core::workspace::BenchmarkWorkspace;

const AT: &str = "2026-03-02T12:00:00Z";
const QUESTION: &str = "Which follows tok18 tok19 tok20 tok21?";

fn workspace(dir: &Path, build_index: bool) -> BenchmarkWorkspace {
    let corpus = dir.join("corpus");
    fs::create_dir_all(&corpus).unwrap();
    let words: Vec<String> = (0..40).map(|i| format!("tok{i}")).collect();
    fs::write(corpus.join("A.txt"), words.join(" ")).unwrap();

    let mut cfg = BenchmarkConfig {
        paths: PathsConfig {
            data_dir: dir.join("data"),
            corpus_dir: corpus,
            chunk_dir: dir.join("data/chunks"),
        },
        ..BenchmarkConfig::default()
    };
    cfg.chunking.window_tokens = 10;
    cfg.chunking.overlap_tokens = 2;
    cfg.retrieval.index_dir = dir.join("data/index");
    cfg.retrieval.generous_top_k = 1;
    cfg.retrieval.threshold = 0.9;

    let ws = BenchmarkWorkspace::open(cfg).unwrap();
    ws.ingest_corpus(AT, false).unwrap();
    if build_index {
        IndexBuilder::open(ws.config().retrieval.index_dir.clone())
            .build(ws.chunks(), &HashingEmbedder::new(256).unwrap(), HASHING_MODEL, AT)
            .unwrap();
    }
    ws
}

fn accept(ws: &BenchmarkWorkspace, difficulty: DifficultyLabel) -> UnverifiedQuestion {
    ws.accept(
        NewQuestion {
            paper_id: "A".to_string(),
            question_text: QUESTION.to_string(),
            default_difficulty: difficulty,
        },
        AT,
    )
    .unwrap()
}

fn retrieve(ws: &BenchmarkWorkspace, question: &str) -> RetrievalOutcome {
    let cfg = ws.config();
    RetrievalOutcome::from_result(
        RetrievalService::open(cfg).and_then(|s| s.search_generous(question, &cfg.retrieval)),
    )
}

#[test]
fn reviewer_flow_commits_selection_in_chosen_order() {
    let tmp = tempdir().unwrap();
    let ws = workspace(tmp.path(), true);
    let q = accept(&ws, DifficultyLabel::SingleHop);

    let outcome = retrieve(&ws, &q.question_text);
    assert!(!outcome.is_degraded());
    let candidate_ids: Vec<&str> = outcome.candidates.iter().map(|c| c.chunk_id.as_str()).collect();
    assert_eq!(candidate_ids[0], "A_chunk_0002");
    assert!(candidate_ids.contains(&"A_chunk_0001"));
    assert!(candidate_ids.contains(&"A_chunk_0003"));

    let mut session = VerificationSession::start(ws.state_machine(), ws.chunks(), q.clone(), outcome).unwrap();
    assert_eq!(session.selection()[0], "A_chunk_0002");
    assert!(session.selection().len() <= 3);

    let err = session.select(["A_chunk_0004"]).unwrap_err();
    assert_eq!(err.code, INVALID_TRANSITION);

    session.select(["A_chunk_0003", "A_chunk_0002"]).unwrap();
    assert_eq!(session.suggested_difficulty(), DifficultyLabel::MultiHop);
    session.set_difficulty(DifficultyLabel::MultiHop);

    let drafted = session
        .draft_ground_truth(&GroundTruthDrafter::new(None, "unused"))
        .unwrap()
        .to_string();
    assert!(drafted.starts_with("tok24"));
    session.set_ground_truth("tok22");
    session.set_notes("checked");

    let verified = session.commit(AT).unwrap();
    assert_eq!(verified.golden_chunk_ids, vec!["A_chunk_0003", "A_chunk_0002"]);
    assert_eq!(verified.ground_truth, "tok22");
    assert_eq!(verified.question_text, QUESTION);
    assert_eq!(
        ws.state_machine().state_of(&q.question_id).unwrap(),
        Some(QuestionState::Verified)
    );
}

#[test]
fn dropping_a_session_changes_nothing() {
    let tmp = tempdir().unwrap();
    let ws = workspace(tmp.path(), true);
    let q = accept(&ws, DifficultyLabel::SingleHop);
    let unverified_before = fs::read(ws.unverified().path()).unwrap();

    {
        let outcome = retrieve(&ws, &q.question_text);
        let mut session = VerificationSession::start(ws.state_machine(), ws.chunks(), q.clone(), outcome).unwrap();
        session.set_ground_truth("draft that is never saved");
        session.set_question_text("Edited wording?");
    }

    assert_eq!(fs::read(ws.unverified().path()).unwrap(), unverified_before);
    assert!(ws.verified().list().unwrap().is_empty());
}

#[test]
fn degraded_retrieval_requires_explicit_manual_evidence() {
    let tmp = tempdir().unwrap();
    let ws = workspace(tmp.path(), false);
    let q = accept(&ws, DifficultyLabel::SingleHop);

    let outcome = retrieve(&ws, &q.question_text);
    assert!(outcome.is_degraded());

    let mut session = VerificationSession::start(ws.state_machine(), ws.chunks(), q, outcome).unwrap();
    assert_eq!(session.degraded_cause().map(|e| e.code.as_str()), Some(INDEX_UNAVAILABLE));
    assert!(session.selection().is_empty());

    assert!(session.select(["A_chunk_0002"]).is_err());
    session.allow_manual_evidence();
    assert_eq!(session.select(["A_chunk_0099"]).unwrap_err().code, CHUNK_NOT_FOUND);
    session.select(["A_chunk_0002"]).unwrap();

    // Verification still needs a ground truth.
    session.set_ground_truth("   ");
    session.set_question_text("Which token follows tok20?");
    let err = session.commit(AT).unwrap_err();
    assert_eq!(err.code, INVALID_TRANSITION);
}

#[test]
fn edited_question_text_is_persisted_and_revision_keeps_the_record() {
    let tmp = tempdir().unwrap();
    let ws = workspace(tmp.path(), true);
    let first = accept(&ws, DifficultyLabel::MultiHop);
    let second = accept(&ws, DifficultyLabel::SingleHop);

    let outcome = retrieve(&ws, &first.question_text);
    let mut session = VerificationSession::start(ws.state_machine(), ws.chunks(), first.clone(), outcome).unwrap();
    session.set_question_text("  Which token follows tok20?  ");
    session.set_ground_truth("tok21");
    let verified = session.commit(AT).unwrap();
    assert_eq!(verified.question_text, "Which token follows tok20?");
    assert_eq!(verified.difficulty, DifficultyLabel::MultiHop);

    let outcome = retrieve(&ws, &second.question_text);
    let mut session = VerificationSession::start(ws.state_machine(), ws.chunks(), second.clone(), outcome).unwrap();
    session.set_notes("too vague");
    session.mark_needs_revision(AT).unwrap();
    assert_eq!(
        ws.state_machine().state_of(&second.question_id).unwrap(),
        Some(QuestionState::Unverified)
    );

    // A verified question cannot be reopened.
    let outcome = retrieve(&ws, &first.question_text);
    let err = VerificationSession::start(ws.state_machine(), ws.chunks(), first, outcome)
        .err()
        .unwrap();
    assert_eq!(err.code, INVALID_TRANSITION);

    let outcome = retrieve(&ws, &second.question_text);
    let session = VerificationSession::start(ws.state_machine(), ws.chunks(), second.clone(), outcome).unwrap();
    session.reject(AT).unwrap();
    assert_eq!(ws.state_machine().state_of(&second.question_id).unwrap(), None);
}
