//! Text-completion capability used by the match pipeline.
//!
//! The pipeline only sees [`CompletionClient`]; the hosted implementation
//! lives in [`yandex`].

pub mod yandex;

use serde::{Deserialize, Serialize};

pub use yandex::{YandexClient, YandexCredentials};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }
}

/// One completion call.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    /// When set, the model is asked for JSON conforming to this schema.
    pub response_schema: Option<serde_json::Value>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    #[error("completion service rejected credentials: {0}")]
    Unauthorized(String),

    #[error("completion service unreachable: {0}")]
    Transport(String),

    #[error("completion service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("completion service returned an unreadable response: {0}")]
    MalformedResponse(String),
}

impl CompletionError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, CompletionError::Unauthorized(_))
    }
}

/// Returns the raw model text. An empty string is a valid (empty) answer.
pub trait CompletionClient: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}
