//! ABOUTME: Embedding Provider (C6): turns question text into fixed-dimension vectors

pub mod provider;

pub use provider::{
    embedding_retry_config, EmbeddingProvider, HttpEmbeddingProvider, LocalHashEmbeddingProvider,
};
