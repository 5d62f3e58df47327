use std::cell::Cell;

use pretty_assertions::assert_eq;
use tempfile::tempdir;

use pqb_ai::embeddings::Embedder;
use pqb_ai::index::{FlatIndex, IndexBuilder, VectorIndex};
use pqb_core::chunks::ChunkStore;
use pqb_core::domain::{chunk_id_for, Chunk};
use pqb_core::error::AppError;

const AT: &str = "2026-03-02T12:00:00Z";

struct CountingEmbedder {
    calls: Cell<usize>,
}

impl Embedder for CountingEmbedder {
    fn embed(&self, _model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        self.calls.set(self.calls.get() + 1);
        Ok(vec![input.len() as f32, 1.0])
    }
}

fn chunks(paper_id: &str, texts: &[&str]) -> Vec<Chunk> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| Chunk {
            chunk_id: chunk_id_for(paper_id, i as u32),
            paper_id: paper_id.to_string(),
            index: i as u32,
            start: 0,
            end: t.len(),
            text: t.to_string(),
        })
        .collect()
}

#[test]
fn rebuild_only_embeds_changed_chunks() {
    let tmp = tempdir().unwrap();
    let store = ChunkStore::open(tmp.path().join("chunks"));
    store.write("p", &chunks("p", &["one", "two", "three"])).unwrap();
    store.write("q", &chunks("q", &["four"])).unwrap();

    let builder = IndexBuilder::open(tmp.path().join("index"));
    let embedder = CountingEmbedder { calls: Cell::new(0) };

    builder.build(&store, &embedder, "mock", AT).unwrap();
    assert_eq!(embedder.calls.get(), 4);

    builder.build(&store, &embedder, "mock", AT).unwrap();
    assert_eq!(embedder.calls.get(), 4);

    store.write("p", &chunks("p", &["one", "TWO!"])).unwrap();
    let manifest = builder.build(&store, &embedder, "mock", AT).unwrap();
    assert_eq!(embedder.calls.get(), 5);
    assert_eq!(manifest.chunk_count, 3);

    let index = FlatIndex::load(builder.dir()).unwrap();
    assert!(index.metadata("p_chunk_0002").is_none());

    // A different model invalidates every cached vector.
    builder.build(&store, &embedder, "other", AT).unwrap();
    assert_eq!(embedder.calls.get(), 8);
}

#[test]
fn empty_chunk_store_cannot_be_indexed() {
    let tmp = tempdir().unwrap();
    let store = ChunkStore::open(tmp.path().join("chunks"));
    store.ensure_dirs().unwrap();
    let embedder = CountingEmbedder { calls: Cell::new(0) };
    let err = IndexBuilder::open(tmp.path().join("index"))
        .build(&store, &embedder, "mock", AT)
        .unwrap_err();
    assert_eq!(err.code, "AI_INDEX_BUILD_FAILED");
}
