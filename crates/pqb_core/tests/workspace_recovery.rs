use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::tempdir;

use pqb_core::config::{BenchmarkConfig, PathsConfig};
use pqb_core::domain::{DifficultyLabel, UnverifiedQuestion, VerifiedQuestion};
use pqb_core::error::COUNTER_CORRUPTED;
use pqb_core::ids::COUNTER_FILE;
use pqb_core::questions::{NewQuestion, UNVERIFIED_FILE, VERIFIED_FILE};
use pqb_core::workspace::BenchmarkWorkspace;

fn config_in(dir: &Path) -> BenchmarkConfig {
    BenchmarkConfig {
        paths: PathsConfig {
            data_dir: dir.join("data"),
            corpus_dir: dir.join("corpus"),
            chunk_dir: dir.join("data/chunks"),
        },
        ..BenchmarkConfig::default()
    }
}

fn unverified(id: &str) -> UnverifiedQuestion {
    UnverifiedQuestion {
        question_id: id.to_string(),
        question_text: format!("Question {id}?"),
        paper_id: "A".to_string(),
        default_difficulty: DifficultyLabel::SingleHop,
    }
}

fn verified(id: &str) -> VerifiedQuestion {
    VerifiedQuestion {
        question_id: id.to_string(),
        question_text: format!("Question {id}?"),
        source_paper_id: "A".to_string(),
        ground_truth: "answer".to_string(),
        golden_chunk_ids: vec!["A_chunk_0000".to_string()],
        difficulty: DifficultyLabel::SingleHop,
        date_created: "2026-01-05T08:00:00Z".to_string(),
        notes: String::new(),
    }
}

fn write_json<T: serde::Serialize>(path: &Path, rows: &[T]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(rows).unwrap()).unwrap();
}

#[test]
fn missing_counter_is_seeded_past_existing_ids() {
    let tmp = tempdir().unwrap();
    let data = tmp.path().join("data");
    write_json(&data.join(UNVERIFIED_FILE), &[unverified("q_000004")]);
    write_json(&data.join(VERIFIED_FILE), &[verified("q_000011")]);

    let ws = BenchmarkWorkspace::open(config_in(tmp.path())).unwrap();
    let q = ws
        .accept(
            NewQuestion {
                paper_id: "A".to_string(),
                question_text: "Fresh question?".to_string(),
                default_difficulty: DifficultyLabel::Negative,
            },
            "2026-01-06T00:00:00Z",
        )
        .unwrap();
    assert_eq!(q.question_id, "q_000012");
    assert_eq!(fs::read_to_string(data.join(COUNTER_FILE)).unwrap(), "13");
}

#[test]
fn ids_stay_unique_across_reopen() {
    let tmp = tempdir().unwrap();
    let mut issued = Vec::new();
    for round in 0..3 {
        let ws = BenchmarkWorkspace::open(config_in(tmp.path())).unwrap();
        for i in 0..2 {
            let q = ws
                .accept(
                    NewQuestion {
                        paper_id: "A".to_string(),
                        question_text: format!("Round {round} question {i}?"),
                        default_difficulty: DifficultyLabel::SingleHop,
                    },
                    "2026-01-06T00:00:00Z",
                )
                .unwrap();
            issued.push(q.question_id);
        }
    }
    assert_eq!(
        issued,
        vec!["q_000000", "q_000001", "q_000002", "q_000003", "q_000004", "q_000005"]
    );
}

#[test]
fn interrupted_verification_is_reconciled_on_open() {
    let tmp = tempdir().unwrap();
    let data = tmp.path().join("data");
    // Crash after the verified append but before the unverified removal.
    write_json(
        &data.join(UNVERIFIED_FILE),
        &[unverified("q_000001"), unverified("q_000002")],
    );
    write_json(&data.join(VERIFIED_FILE), &[verified("q_000001")]);

    let ws = BenchmarkWorkspace::open(config_in(tmp.path())).unwrap();
    assert_eq!(ws.unverified().list().unwrap(), vec![unverified("q_000002")]);
    assert_eq!(ws.verified().list().unwrap(), vec![verified("q_000001")]);
}

#[test]
fn corrupted_counter_blocks_open() {
    let tmp = tempdir().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join(COUNTER_FILE), "seven").unwrap();

    let err = BenchmarkWorkspace::open(config_in(tmp.path())).err().unwrap();
    assert_eq!(err.code, COUNTER_CORRUPTED);
    assert_eq!(fs::read_to_string(data.join(COUNTER_FILE)).unwrap(), "seven");
}
