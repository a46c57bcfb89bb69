//! docqa-vector
//!
//! `VectorIndex` adapters: a LanceDB chunk table (plus its bulk writer) and
//! an in-memory brute-force index.
pub mod filter;
pub mod memory;
pub mod schema;
pub mod search;
pub mod writer;

pub use memory::MemoryVectorIndex;
pub use search::LanceVectorIndex;
pub use writer::LanceWriter;
