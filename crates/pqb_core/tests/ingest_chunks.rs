use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::tempdir;

use pqb_core::chunks::ChunkStore;
use pqb_core::ingest::chunker::Chunker;
use pqb_core::ingest::{ingest_all, ingest_paper, PAPER_ID_COLLISION};

const AT: &str = "2026-04-01T00:00:00Z";

fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut out = BTreeMap::new();
    for entry in fs::read_dir(dir).unwrap().flatten() {
        let path = entry.path();
        if path.is_file() {
            out.insert(
                path.file_name().unwrap().to_string_lossy().to_string(),
                fs::read(&path).unwrap(),
            );
        }
    }
    out
}

fn paper_text(n: usize) -> String {
    (0..n)
        .map(|i| format!("word{i}"))
        .collect::<Vec<_>>()
        .join(if n % 2 == 0 { " " } else { "\n\t" })
}

#[test]
fn reingesting_unchanged_text_is_byte_identical() {
    let tmp = tempdir().unwrap();
    let corpus = tmp.path().join("corpus");
    fs::create_dir_all(&corpus).unwrap();
    fs::write(corpus.join("paper_a.txt"), paper_text(700)).unwrap();

    let store = ChunkStore::open(tmp.path().join("chunks"));
    let chunker = Chunker::new(300, 60).unwrap();

    let first = ingest_all(&store, &chunker, &corpus, AT, false).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].chunk_count, 3);
    assert!(!first[0].skipped);
    let before = snapshot(&tmp.path().join("chunks").join("paper_a"));

    let skipped = ingest_all(&store, &chunker, &corpus, AT, false).unwrap();
    assert!(skipped[0].skipped);

    let forced = ingest_all(&store, &chunker, &corpus, "2026-04-02T00:00:00Z", true).unwrap();
    assert!(!forced[0].skipped);
    assert_eq!(snapshot(&tmp.path().join("chunks").join("paper_a")), before);

    let spans: Vec<(usize, usize)> = store
        .list("paper_a")
        .unwrap()
        .iter()
        .map(|c| (c.start, c.end))
        .collect();
    assert_eq!(spans, vec![(0, 300), (240, 540), (480, 700)]);
}

#[test]
fn changed_source_or_layout_rechunks() {
    let tmp = tempdir().unwrap();
    let source = tmp.path().join("paper_b.md");
    fs::write(&source, paper_text(100)).unwrap();
    let store = ChunkStore::open(tmp.path().join("chunks"));

    let small = Chunker::new(20, 5).unwrap();
    let out = ingest_paper(&store, &small, &source, AT, false).unwrap();
    assert_eq!(out.chunk_count, 7);

    let large = Chunker::new(60, 10).unwrap();
    let out = ingest_paper(&store, &large, &source, AT, false).unwrap();
    assert!(!out.skipped);
    assert_eq!(out.chunk_count, 2);
    assert_eq!(store.list("paper_b").unwrap().len(), 2);

    fs::write(&source, paper_text(30)).unwrap();
    let out = ingest_paper(&store, &large, &source, AT, false).unwrap();
    assert!(!out.skipped);
    assert_eq!(out.chunk_count, 1);

    let manifest = store.read_manifest().unwrap();
    assert_eq!(manifest["paper_b"].chunk_count, 1);
    assert_eq!(manifest["paper_b"].window_tokens, 60);
}

#[test]
fn invalid_utf8_and_control_bytes_do_not_abort_ingest() {
    let tmp = tempdir().unwrap();
    let source = tmp.path().join("noisy.txt");
    let mut bytes = vec![0xEF, 0xBB, 0xBF];
    bytes.extend_from_slice(b"alpha\0beta \xFF gamma");
    fs::write(&source, bytes).unwrap();

    let store = ChunkStore::open(tmp.path().join("chunks"));
    let out = ingest_paper(&store, &Chunker::new(10, 2).unwrap(), &source, AT, false).unwrap();
    assert_eq!(out.chunk_count, 1);
    assert_eq!(store.read("noisy_chunk_0000").unwrap().text, "alpha beta gamma");
}

#[test]
fn colliding_paper_ids_abort_before_any_chunk_is_written() {
    let tmp = tempdir().unwrap();
    let corpus = tmp.path().join("corpus");
    fs::create_dir_all(&corpus).unwrap();
    fs::write(corpus.join("attention.txt"), paper_text(40)).unwrap();
    fs::write(corpus.join("attention.md"), paper_text(80)).unwrap();

    let store = ChunkStore::open(tmp.path().join("chunks"));
    let err = ingest_all(&store, &Chunker::new(20, 5).unwrap(), &corpus, AT, false)
        .err()
        .unwrap();
    assert_eq!(err.code, PAPER_ID_COLLISION);
    let details = err.details.unwrap();
    assert!(details.contains("attention.md"));
    assert!(details.contains("attention.txt"));
    assert!(!store.has_chunks("attention").unwrap());
    assert!(store.read_manifest().unwrap().is_empty());
}
