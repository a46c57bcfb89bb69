use std::fs;
use tempfile::TempDir;

use docqa_core::corpus::{load_chunk_dir, Corpus};
use docqa_core::types::{Chunk, ChunkMetadata};
use docqa_core::Error;

fn chunk(id: &str, text: &str) -> Chunk {
    Chunk { id: id.to_string(), text: text.to_string(), metadata: ChunkMetadata::default() }
}

#[test]
fn load_chunk_dir_reads_only_chunk_files_in_order() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(
        dir.join("chunks_b.json"),
        r#"[{"id":"b:0","text":"webhook notification event","metadata":{"title":"Webhooks","category":"api","chunk_index":0}}]"#,
    )
    .unwrap();
    fs::create_dir(dir.join("nested")).unwrap();
    fs::write(dir.join("nested/chunks_a.json"), r#"[{"id":"a:0","text":"first time setup store"}]"#).unwrap();
    fs::write(dir.join("notes.json"), r#"[{"id":"x","text":"ignored"}]"#).unwrap();

    let chunks = load_chunk_dir(dir).expect("load");
    let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["b:0", "a:0"], "sorted by path, non-chunk files skipped");
    assert_eq!(chunks[0].metadata.category, "api");
    assert_eq!(chunks[1].metadata.category, "unknown", "missing metadata defaults to unknown category");
}

#[test]
fn load_chunk_dir_missing_dir_is_empty() {
    let tmp = TempDir::new().unwrap();
    let chunks = load_chunk_dir(&tmp.path().join("absent")).expect("load");
    assert!(chunks.is_empty());
}

#[test]
fn corpus_rejects_duplicate_ids() {
    let err = Corpus::new(vec![chunk("a", "one"), chunk("a", "two")]).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn corpus_lookup_by_id() {
    let corpus = Corpus::new(vec![chunk("a", "one"), chunk("b", "two")]).unwrap();
    assert_eq!(corpus.len(), 2);
    assert_eq!(corpus.get("b").map(|c| c.text.as_str()), Some("two"));
    assert!(corpus.get("c").is_none());
}
