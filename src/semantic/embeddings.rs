//! Embedding capability: text in, fixed-dimension vector out.
//!
//! - `Embedder`: the seam the match pipeline embeds queries through
//! - `LocalEmbedder`: fastembed-backed model, behind the `local-embeddings` feature
//!
//! The hosted embedder lives next to the completion client in `llm::yandex`.

/// Which side of an asymmetric retrieval model to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedKind {
    Document,
    Query,
}

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding service rejected credentials: {0}")]
    Unauthorized(String),

    #[error("embedding service unreachable: {0}")]
    Transport(String),

    #[error("embedding service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

impl EmbeddingError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, EmbeddingError::Unauthorized(_))
    }
}

pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str, kind: EmbedKind) -> Result<Vec<f32>, EmbeddingError>;
}

#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;

#[cfg(feature = "local-embeddings")]
mod local {
    use fastembed::{InitOptions, TextEmbedding};
    use std::path::PathBuf;
    use std::sync::Mutex;

    use super::{EmbedKind, Embedder, EmbeddingError};

    /// Wrapper around fastembed's TextEmbedding model.
    /// Uses a Mutex because fastembed's embed() requires &mut self.
    pub struct LocalEmbedder {
        model: Mutex<TextEmbedding>,
        model_name: String,
        dimensions: usize,
        prefixes: InputPrefixes,
    }

    /// Instructions an asymmetric model expects in front of its inputs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct InputPrefixes {
        query: &'static str,
        document: &'static str,
    }

    const BGE_QUERY_INSTRUCTION: &str = "Represent this sentence for searching relevant passages: ";

    fn input_prefixes(model_name: &str) -> InputPrefixes {
        let name = model_name.to_lowercase();
        if name.starts_with("multilingual-e5") {
            InputPrefixes {
                query: "query: ",
                document: "passage: ",
            }
        } else if name.starts_with("bge-") && name.contains("-en") {
            InputPrefixes {
                query: BGE_QUERY_INSTRUCTION,
                document: "",
            }
        } else {
            InputPrefixes {
                query: "",
                document: "",
            }
        }
    }

    impl LocalEmbedder {
        /// Models are cached in the `models/` subdirectory of `cache_dir` and
        /// downloaded on first use.
        pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, EmbeddingError> {
            let model_enum = parse_model_name(model_name)?;

            let models_dir = cache_dir.join("models");
            std::fs::create_dir_all(&models_dir).map_err(|e| {
                EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
            })?;

            let options = InitOptions::new(model_enum)
                .with_cache_dir(models_dir)
                .with_show_download_progress(true);

            let mut model = TextEmbedding::try_new(options)
                .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

            let dimensions = detect_dimensions(&mut model)?;
            log::info!("local embedding model '{model_name}' ready, dim={dimensions}");

            Ok(Self {
                model: Mutex::new(model),
                model_name: model_name.to_string(),
                dimensions,
                prefixes: input_prefixes(model_name),
            })
        }

        pub fn name(&self) -> &str {
            &self.model_name
        }

        pub fn dimensions(&self) -> usize {
            self.dimensions
        }
    }

    impl Embedder for LocalEmbedder {
        fn embed(&self, text: &str, kind: EmbedKind) -> Result<Vec<f32>, EmbeddingError> {
            let prefix = match kind {
                EmbedKind::Query => self.prefixes.query,
                EmbedKind::Document => self.prefixes.document,
            };
            let input = format!("{prefix}{text}");

            let mut model = self.model.lock().map_err(|e| {
                EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
            })?;

            model
                .embed(vec![input], None)
                .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?
                .into_iter()
                .next()
                .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
        }
    }

    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
        match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
            "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
            "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
            "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
            _ => Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-{{small,base,large}}-en-v1.5, multilingual-e5-{{small,base,large}}",
                name
            ))),
        }
    }

    fn detect_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to detect dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }

}
