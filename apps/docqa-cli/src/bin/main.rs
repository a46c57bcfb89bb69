use std::env;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use docqa_core::config::Config;
use docqa_core::corpus::{load_chunk_dir, Corpus};
use docqa_embed::{get_default_embedder, use_fake_embeddings, BlockingEmbeddingProvider, CrossEncoderLoader};
use docqa_hybrid::HybridRetriever;
use docqa_text::TantivyKeywordIndex;
use docqa_vector::{LanceVectorIndex, LanceWriter};

const USAGE: &str = "Usage:
  docqa ingest [chunks_dir] [--reset] [--batch-size N]
  docqa query \"<query>\" [-k N] [--json]";

fn usage_exit() -> ! {
    eprintln!("{USAGE}");
    std::process::exit(1)
}

fn parse_number(args: &[String], i: usize, flag: &str) -> usize {
    match args.get(i + 1).map(|v| v.parse::<usize>()) {
        Some(Ok(n)) => n,
        _ => {
            eprintln!("Error: {flag} requires a number");
            std::process::exit(1)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        usage_exit();
    }
    let cmd = args.remove(0);
    match cmd.as_str() {
        "ingest" => ingest(&config, &args).await,
        "query" => query(&config, &args).await,
        "-h" | "--help" => {
            println!("{USAGE}");
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {cmd}");
            usage_exit()
        }
    }
}

async fn ingest(config: &Config, args: &[String]) -> anyhow::Result<()> {
    let data = config.data()?;
    let (mut chunks_dir, mut reset, mut batch_size) = (None, false, 32usize);
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--reset" => reset = true,
            "--batch-size" => { batch_size = parse_number(args, i, "--batch-size"); i += 1; }
            a if !a.starts_with('-') => chunks_dir = Some(PathBuf::from(a)),
            other => { eprintln!("Unknown flag: {other}"); usage_exit() }
        }
        i += 1;
    }
    let chunks_dir = chunks_dir.unwrap_or(data.chunks_dir);

    let chunks = load_chunk_dir(&chunks_dir)?;
    // fail on duplicate ids before anything is written
    Corpus::new(chunks.clone())?;
    info!(chunks = chunks.len(), dir = %chunks_dir.display(), "loaded corpus");

    std::fs::create_dir_all(&data.lancedb_dir)?;
    let writer = LanceWriter::new(&data.lancedb_dir, &data.lancedb_table).await?;
    if reset {
        writer.reset().await?;
    }
    let embedder = get_default_embedder(data.model_dir.as_deref())?;
    let written = writer.ingest(&chunks, embedder.as_ref(), batch_size).await?;
    println!("Ingest complete: {written} chunks into {} ({})", data.lancedb_dir.display(), data.lancedb_table);
    Ok(())
}

async fn query(config: &Config, args: &[String]) -> anyhow::Result<()> {
    let retrieval = config.retrieval()?;
    let data = config.data()?;
    let (mut text, mut k, mut json) = (None, retrieval.final_k, false);
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-k" => { k = parse_number(args, i, "-k"); i += 1; }
            "--json" => json = true,
            a if !a.starts_with('-') => text = Some(a.to_string()),
            other => { eprintln!("Unknown flag: {other}"); usage_exit() }
        }
        i += 1;
    }
    let Some(text) = text else { usage_exit() };

    let corpus = Arc::new(Corpus::new(load_chunk_dir(&data.chunks_dir)?)?);
    let keyword = TantivyKeywordIndex::from_corpus(&corpus)?;
    let vector = LanceVectorIndex::open(&data.lancedb_dir, &data.lancedb_table).await?;
    let embedder = BlockingEmbeddingProvider::from(get_default_embedder(data.model_dir.as_deref())?);

    let mut builder = HybridRetriever::builder(retrieval)
        .corpus(corpus)
        .vector_index(Arc::new(vector))
        .keyword_index(Arc::new(keyword))
        .embedding_provider(Arc::new(embedder));
    if !use_fake_embeddings() {
        builder = builder.rerank_loader(Arc::new(CrossEncoderLoader::new(data.reranker_model_dir.clone())));
    }
    let retriever = builder.build()?;

    let results = retriever.search_text(&text, k).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.is_empty() {
        println!("No results for \"{text}\"");
    } else {
        for (rank, r) in results.iter().enumerate() {
            let preview: String = r.text.chars().take(160).collect();
            println!("{:>2}. [{:.3}] ({}) {} / {}", rank + 1, r.score, r.search_type, r.metadata.title, r.metadata.category);
            println!("    {preview}");
        }
    }
    info!(stats = ?retriever.stats(), "query finished");
    retriever.close();
    Ok(())
}
