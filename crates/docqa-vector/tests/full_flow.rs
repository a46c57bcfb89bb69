use docqa_core::corpus::Corpus;
use docqa_core::traits::{Embedder, VectorIndex};
use docqa_core::types::{Chunk, ChunkMetadata, Filter};
use docqa_embed::FakeEmbedder;
use docqa_vector::{LanceVectorIndex, LanceWriter, MemoryVectorIndex};

fn chunks() -> Vec<Chunk> {
    let mk = |id: &str, text: &str, category: &str| Chunk {
        id: id.to_string(),
        text: text.to_string(),
        metadata: ChunkMetadata { title: id.to_string(), category: category.to_string(), ..Default::default() },
    };
    vec![
        mk("webhooks:0", "webhook subscriptions deliver order events", "api"),
        mk("themes:0", "theme editor sections and blocks", "design"),
        mk("payments:0", "payout schedule for merchant bank accounts", "finance"),
        mk("graphql:0", "graphql admin api order queries", "api"),
    ]
}

fn filter(k: &str, v: &str) -> Filter { [(k.to_string(), v.to_string())].into_iter().collect() }

#[tokio::test]
async fn memory_index_ranks_and_filters() -> anyhow::Result<()> {
    let embedder = FakeEmbedder::new(128);
    let corpus = Corpus::new(chunks())?;
    let index = MemoryVectorIndex::from_corpus(&corpus, &embedder)?;
    assert_eq!(index.len(), 4);

    let q = embedder.embed_batch(&["theme editor sections and blocks".to_string()])?.remove(0);
    let hits = index.query(&q, 2, None).await?;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "themes:0");
    assert!((hits[0].score - 1.0).abs() < 1e-4);
    assert!(hits[0].score >= hits[1].score);

    let api_only = index.query(&q, 10, Some(&filter("category", "api"))).await?;
    assert_eq!(api_only.len(), 2);
    assert!(api_only.iter().all(|m| m.metadata.as_ref().map(|md| md.category.as_str()) == Some("api")));

    assert!(index.query(&q, 10, Some(&filter("embedding", "x"))).await.is_err());
    assert!(index.query(&[], 10, None).await.is_err());
    Ok(())
}

#[tokio::test]
async fn lance_write_then_query() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let embedder = FakeEmbedder::new(64);
    let chunks = chunks();

    let writer = LanceWriter::new(tmp.path(), "chunks").await?;
    let written = writer.ingest(&chunks, &embedder, 2).await?;
    assert_eq!(written, 4);

    let index = LanceVectorIndex::open(tmp.path(), "chunks").await?;
    let q = embedder.embed_batch(&["payout schedule for merchant bank accounts".to_string()])?.remove(0);
    let hits = index.query(&q, 3, None).await?;
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].id, "payments:0");
    assert!(hits[0].score > 0.99, "cosine score = 1 - distance (got {})", hits[0].score);
    assert_eq!(hits[0].metadata.as_ref().map(|m| m.category.as_str()), Some("finance"));

    let filtered = index.query(&q, 10, Some(&filter("category", "api"))).await?;
    let mut ids: Vec<_> = filtered.iter().map(|m| m.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["graphql:0", "webhooks:0"]);

    writer.reset().await?;
    let reopened = LanceVectorIndex::open(tmp.path(), "chunks").await?;
    assert!(reopened.query(&q, 3, None).await?.is_empty());
    Ok(())
}
