//! Immutable, id-indexed chunk corpus loaded once at startup.
//!
//! Chunk files are JSON arrays of `{id, text, metadata}` named
//! `chunks_*.json`. Every engine holds the corpus behind an `Arc` and resolves
//! hit ids through [`Corpus::get`].
use anyhow::{Context, Result as AnyResult};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::Chunk;

#[derive(Debug, Default)]
pub struct Corpus {
    chunks: Vec<Arc<Chunk>>,
    by_id: HashMap<String, usize>,
}

impl Corpus {
    /// Build a corpus; duplicate ids are a configuration error.
    pub fn new(chunks: Vec<Chunk>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(chunks.len());
        let mut stored = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.into_iter().enumerate() {
            if chunk.id.is_empty() {
                return Err(Error::InvalidConfig(format!("chunk #{i} has an empty id")));
            }
            if by_id.insert(chunk.id.clone(), i).is_some() {
                return Err(Error::InvalidConfig(format!("duplicate chunk id '{}'", chunk.id)));
            }
            stored.push(Arc::new(chunk));
        }
        Ok(Self { chunks: stored, by_id })
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Chunk>> {
        self.by_id.get(id).map(|&i| &self.chunks[i])
    }

    pub fn len(&self) -> usize { self.chunks.len() }

    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Chunk>> {
        self.chunks.iter()
    }
}

/// Load every `chunks_*.json` file under `dir` (sorted by path).
pub fn load_chunk_dir(dir: &Path) -> AnyResult<Vec<Chunk>> {
    let files = list_chunk_files(dir);
    if files.is_empty() {
        info!(dir = %dir.display(), "no chunk files found");
        return Ok(vec![]);
    }
    let mut all_chunks = Vec::new();
    for (file_index, file_path) in files.iter().enumerate() {
        let chunks = load_chunk_file(file_path)?;
        debug!(file = %file_path.display(), n = chunks.len(), "loaded chunk file {}/{}", file_index + 1, files.len());
        all_chunks.extend(chunks);
    }
    info!(files = files.len(), chunks = all_chunks.len(), "corpus loaded");
    Ok(all_chunks)
}

pub fn load_chunk_file(path: &Path) -> AnyResult<Vec<Chunk>> {
    let raw = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => String::from_utf8_lossy(&fs::read(path).with_context(|| format!("reading {}", path.display()))?).to_string(),
    };
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn list_chunk_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
        let path = entry.path();
        let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
        if name.starts_with("chunks_") && name.ends_with(".json") { files.push(path.to_path_buf()); }
    }
    files.sort();
    files
}
