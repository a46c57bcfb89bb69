//! docqa-text
//!
//! Tantivy-backed keyword index over the chunk corpus, and the query
//! processor that feeds the keyword search variants.
pub mod enhance;
pub mod index;
pub mod query;
pub mod tantivy_utils;

pub use index::{KeywordIndexBuilder, TantivyKeywordIndex};
pub use query::QueryProcessor;
