//! Domain types shared by the keyword, vector and hybrid engines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type ChunkId = String;

/// Equality filter passed to the vector index (`field == value` for every pair).
pub type Filter = BTreeMap<String, String>;

/// Canonical chunk metadata, populated once when the chunk is loaded.
///
/// Missing fields in the source JSON default to empty strings (and `0` for
/// `chunk_index`); a missing category becomes `"unknown"` so every chunk
/// takes part in diversity selection under some category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkMetadata {
    pub title: String,
    pub section: String,
    pub category: String,
    pub merchant_level: String,
    pub source_url: String,
    pub chunk_index: usize,
}

impl Default for ChunkMetadata {
    fn default() -> Self {
        Self {
            title: String::new(),
            section: String::new(),
            category: "unknown".to_string(),
            merchant_level: String::new(),
            source_url: String::new(),
            chunk_index: 0,
        }
    }
}

/// A chunk of a source document that is independently indexed.
///
/// - `id`: globally unique, stable for the lifetime of the index
/// - `text`: the passage text
/// - `metadata`: title/section/category and provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

/// Indicates which signal produced a hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Semantic,
    Keyword,
}

/// One ranked hit from a single retrieval signal.
///
/// `rank` is zero-based within the source list; `score` is signal specific
/// but higher is always better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
    pub rank: usize,
    pub origin: Origin,
}

/// Which signal(s) found a fused result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Semantic,
    Keyword,
    Hybrid,
}

impl SearchType {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchType::Semantic => "semantic",
            SearchType::Keyword => "keyword",
            SearchType::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chunk after score fusion.
///
/// Created by the fusion stage. Diversity selection only touches
/// `final_score`; re-ranking only sets `rerank_score`.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedResult {
    pub chunk: Arc<Chunk>,
    pub semantic_score: f32,
    pub keyword_score: f32,
    pub final_score: f32,
    pub search_type: SearchType,
    pub semantic_rank: Option<usize>,
    pub keyword_rank: Option<usize>,
    pub rerank_score: Option<f32>,
}

impl FusedResult {
    pub fn id(&self) -> &str {
        &self.chunk.id
    }

    pub fn category(&self) -> &str {
        &self.chunk.metadata.category
    }
}

/// Coarse query intent; variants are listed in detection priority order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Api,
    Technical,
    Troubleshooting,
    Beginner,
    #[default]
    General,
}

/// A query after normalization, expansion and intent detection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessedQuery {
    pub original: String,
    pub expanded: String,
    pub keywords: Vec<String>,
    pub intent: Intent,
    pub technical_terms: Vec<String>,
}

/// Nearest-neighbour match returned by a [`crate::traits::VectorIndex`].
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: ChunkId,
    pub score: f32,
    pub metadata: Option<ChunkMetadata>,
}

/// Match returned by a [`crate::traits::KeywordIndex`]; the score is optional
/// because some full-text engines only return an ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch {
    pub id: ChunkId,
    pub score: Option<f32>,
}

/// Searchable fields of the keyword index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum KeywordField {
    Text,
    Title,
    Section,
    Category,
    Keywords,
    ApiEndpoints,
}

impl KeywordField {
    pub const ALL: [KeywordField; 6] = [
        KeywordField::Text,
        KeywordField::Title,
        KeywordField::Section,
        KeywordField::Category,
        KeywordField::Keywords,
        KeywordField::ApiEndpoints,
    ];

    pub fn name(self) -> &'static str {
        match self {
            KeywordField::Text => "text",
            KeywordField::Title => "title",
            KeywordField::Section => "section",
            KeywordField::Category => "category",
            KeywordField::Keywords => "keywords",
            KeywordField::ApiEndpoints => "api_endpoints",
        }
    }
}

/// One row of the public search output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
    pub search_type: SearchType,
}

impl From<&FusedResult> for RetrievedChunk {
    fn from(r: &FusedResult) -> Self {
        Self {
            text: r.chunk.text.clone(),
            metadata: r.chunk.metadata.clone(),
            score: r.rerank_score.unwrap_or(r.final_score),
            search_type: r.search_type,
        }
    }
}

/// Complete output of one pipeline run, as stored in the response cache.
pub type PipelineOutput = Vec<RetrievedChunk>;
