use std::fs;

use tempfile::tempdir;

use pqb_core::domain::DifficultyLabel;
use pqb_lib::{GenerateInput, VerifyInput};

const CONFIG: &str = r#"
[chunking]
window_tokens = 12
overlap_tokens = 3

[retrieval]
index_dir = "data/index"

[paths]
data_dir = "data"
corpus_dir = "corpus"
chunk_dir = "data/chunks"
"#;

fn paper_text(topic: &str) -> String {
    (0..60).map(|i| format!("{topic}{i}")).collect::<Vec<_>>().join(" ")
}

#[test]
fn offline_pipeline_from_corpus_to_export() {
    let tmp = tempdir().unwrap();
    let corpus = tmp.path().join("corpus");
    fs::create_dir_all(&corpus).unwrap();
    fs::write(corpus.join("attn.txt"), paper_text("attention")).unwrap();
    fs::write(corpus.join("conv.txt"), paper_text("convolution")).unwrap();
    let config_path = tmp.path().join("pqb.toml");
    fs::write(&config_path, CONFIG).unwrap();

    let cfg = pqb_lib::load_config(Some(&config_path)).unwrap();
    assert_eq!(cfg.paths.corpus_dir, corpus);
    let ws = pqb_lib::open_workspace(cfg).unwrap();

    let ingested = pqb_lib::ingest(&ws, false).unwrap();
    assert_eq!(ingested.len(), 2);
    let manifest = pqb_lib::build_index(&ws).unwrap();
    assert!(manifest.chunk_count > 2);

    let generated = pqb_lib::generate(
        &ws,
        GenerateInput {
            paper_id: "attn".to_string(),
            count: Some(3),
            accept: true,
            ..GenerateInput::default()
        },
    )
    .unwrap();
    assert_eq!(generated.questions.len(), 3);
    assert_eq!(generated.accepted.len(), 3);
    let ids: Vec<&str> = generated.accepted.iter().map(|q| q.question_id.as_str()).collect();
    assert_eq!(ids, vec!["q_000000", "q_000001", "q_000002"]);

    let manual = pqb_lib::accept(&ws, "attn", "Which token follows attention10?", DifficultyLabel::SingleHop).unwrap();
    assert_eq!(manual.question_id, "q_000003");

    let preview = pqb_lib::review(&ws, &manual.question_id, true).unwrap();
    assert!(preview.degraded.is_none());
    assert!(!preview.proposed_evidence.is_empty());
    assert!(preview.proposed_evidence.len() <= 3);
    let draft = preview.ground_truth_draft.unwrap();
    assert!(draft.used_fallback);
    assert!(!draft.text.is_empty());

    let verified = pqb_lib::verify(
        &ws,
        VerifyInput {
            question_id: manual.question_id.clone(),
            evidence: vec![preview.proposed_evidence[0].clone()],
            draft: true,
            notes: "checked".to_string(),
            ..VerifyInput::default()
        },
    )
    .unwrap();
    assert_eq!(verified.golden_chunk_ids, vec![preview.proposed_evidence[0].clone()]);
    assert!(!verified.ground_truth.is_empty());

    pqb_lib::reject(&ws, "q_000000").unwrap();
    pqb_lib::revise(&ws, "q_000001", "needs a sharper angle").unwrap();
    assert_eq!(pqb_lib::list_unverified(&ws).unwrap().len(), 2);
    assert_eq!(pqb_lib::list_verified(&ws).unwrap().len(), 1);

    let events = pqb_lib::audit_log(&ws, Some("q_000001")).unwrap();
    assert_eq!(events.len(), 2);

    let dest = tmp.path().join("exports");
    fs::create_dir_all(&dest).unwrap();
    let export = pqb_lib::export(&ws, &dest).unwrap();
    assert!(std::path::Path::new(&export.export_dir).starts_with(&dest));
    assert_eq!(export.question_count, 1);
}

#[test]
fn verify_rejects_ground_truth_and_draft_together() {
    let tmp = tempdir().unwrap();
    let corpus = tmp.path().join("corpus");
    fs::create_dir_all(&corpus).unwrap();
    fs::write(corpus.join("attn.txt"), paper_text("attention")).unwrap();
    let config_path = tmp.path().join("pqb.toml");
    fs::write(&config_path, CONFIG).unwrap();

    let ws = pqb_lib::open_workspace(pqb_lib::load_config(Some(&config_path)).unwrap()).unwrap();
    pqb_lib::ingest(&ws, false).unwrap();
    let q = pqb_lib::accept(&ws, "attn", "What is attention3?", DifficultyLabel::Definition).unwrap();

    // No index: retrieval degrades, so evidence has to be given manually.
    let err = pqb_lib::verify(
        &ws,
        VerifyInput {
            question_id: q.question_id.clone(),
            evidence: vec!["attn_chunk_0000".to_string()],
            ground_truth: Some("x".to_string()),
            ..VerifyInput::default()
        },
    )
    .unwrap_err();
    assert_eq!(err.code, "INVALID_TRANSITION");

    let err = pqb_lib::verify(
        &ws,
        VerifyInput {
            question_id: q.question_id.clone(),
            evidence: vec!["attn_chunk_0000".to_string()],
            ground_truth: Some("x".to_string()),
            draft: true,
            manual_evidence: true,
            ..VerifyInput::default()
        },
    )
    .unwrap_err();
    assert_eq!(err.code, "INVALID_CONFIGURATION");

    let ok = pqb_lib::verify(
        &ws,
        VerifyInput {
            question_id: q.question_id,
            evidence: vec!["attn_chunk_0000".to_string()],
            ground_truth: Some("attention3 is a token".to_string()),
            manual_evidence: true,
            ..VerifyInput::default()
        },
    )
    .unwrap();
    assert_eq!(ok.difficulty, DifficultyLabel::Definition);
}
