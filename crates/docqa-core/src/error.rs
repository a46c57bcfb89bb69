use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid startup configuration. Fatal before serving.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Embedding provider failed: {0}")]
    Embedding(String),

    #[error("Vector index failed: {0}")]
    VectorIndex(String),

    #[error("Keyword index failed: {0}")]
    KeywordIndex(String),

    #[error("Rerank model failed: {0}")]
    RerankModel(String),

    /// A mandatory upstream (the vector index) could not serve the request.
    #[error("Retrieval unavailable: {0}")]
    Unavailable(String),

    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// True for errors raised by an external collaborator rather than by
    /// configuration or caller input.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Error::Embedding(_)
                | Error::VectorIndex(_)
                | Error::KeywordIndex(_)
                | Error::RerankModel(_)
                | Error::Unavailable(_)
                | Error::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
