//! Vector retrieval over precomputed vacancy embeddings.
//!
//! # Architecture
//!
//! - `shards`: Reads `.npy` batch files into one id-aligned matrix
//! - `index`: HNSW index with cosine similarity search
//! - `service`: Swappable serving handle, startup build and rebuild
//! - `embeddings`: `Embedder` seam + local fastembed model
//! - `preprocess`: Query normalisation and enrichment

pub mod embeddings;
pub mod index;
pub mod preprocess;
pub mod service;
pub mod shards;

pub use embeddings::{EmbedKind, Embedder, EmbeddingError};
pub use index::IndexError;
pub use preprocess::{enrich_query, normalize_query};
pub use service::{IndexService, IndexStats};

#[cfg(feature = "local-embeddings")]
pub use embeddings::LocalEmbedder;
