use crate::llm::CompletionError;
use crate::matching::Stage;
use crate::semantic::{EmbeddingError, IndexError};

#[derive(thiserror::Error, Debug)]
pub enum MatchError {
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("query cannot be searched: {0}")]
    InvalidQuery(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("completion failed during {stage}: {source}")]
    Completion {
        stage: Stage,
        #[source]
        source: CompletionError,
    },

    #[error("vacancy store error: {0:?}")]
    Store(#[source] anyhow::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl MatchError {
    pub fn completion(stage: Stage) -> impl FnOnce(CompletionError) -> Self {
        move |source| MatchError::Completion { stage, source }
    }

    /// True when the remedy is fixing credentials rather than data or index.
    pub fn is_credentials_problem(&self) -> bool {
        match self {
            MatchError::Embedding(err) => err.is_unauthorized(),
            MatchError::Completion { source, .. } => source.is_unauthorized(),
            _ => false,
        }
    }
}

impl From<IndexError> for MatchError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::InvalidQuery => MatchError::InvalidQuery(err.to_string()),
            IndexError::DimensionMismatch { .. } => MatchError::InvalidQuery(err.to_string()),
            IndexError::IndexNotReady(reason) => MatchError::IndexUnavailable(reason),
            IndexError::Empty => MatchError::IndexUnavailable(err.to_string()),
        }
    }
}
