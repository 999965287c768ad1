mod embedding;
mod retriever;

pub use embedding::{build_embedding_index, EmbeddingIndex, NullIndex};
pub use retriever::{RetrievalService, SearchOutcome};
