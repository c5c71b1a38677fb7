//! Yandex Foundation Models REST client.
//!
//! Serves both the completion endpoint (`/completion`) and the embedding
//! endpoint (`/textEmbedding`). Auth is either an API key or an IAM token.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{CompletionClient, CompletionError, CompletionRequest, Message};
use crate::config::LlmConfig;
use crate::semantic::embeddings::{EmbedKind, Embedder, EmbeddingError};

#[derive(Debug, Clone)]
pub enum YandexCredentials {
    ApiKey(String),
    IamToken(String),
}

impl YandexCredentials {
    /// API key wins when both are configured.
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        if !config.api_key.trim().is_empty() {
            Some(Self::ApiKey(config.api_key.trim().to_string()))
        } else if !config.iam_token.trim().is_empty() {
            Some(Self::IamToken(config.iam_token.trim().to_string()))
        } else {
            None
        }
    }

    fn header_value(&self) -> String {
        match self {
            Self::ApiKey(key) => format!("Api-Key {key}"),
            Self::IamToken(token) => format!("Bearer {token}"),
        }
    }
}

pub struct YandexClient {
    client: Client,
    endpoint: String,
    folder_id: String,
    credentials: YandexCredentials,
    completion_model: String,
    model_version: String,
    temperature: f32,
    query_model: String,
    doc_model: String,
}

/// Failure shared by both endpoints before it is mapped to the caller's error type.
#[derive(Debug)]
enum CallError {
    Unauthorized(String),
    Transport(String),
    Service { status: u16, body: String },
    Malformed(String),
}

impl From<CallError> for CompletionError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Unauthorized(msg) => CompletionError::Unauthorized(msg),
            CallError::Transport(msg) => CompletionError::Transport(msg),
            CallError::Service { status, body } => CompletionError::Service { status, body },
            CallError::Malformed(msg) => CompletionError::MalformedResponse(msg),
        }
    }
}

impl From<CallError> for EmbeddingError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Unauthorized(msg) => EmbeddingError::Unauthorized(msg),
            CallError::Transport(msg) => EmbeddingError::Transport(msg),
            CallError::Service { status, body } => EmbeddingError::Service { status, body },
            CallError::Malformed(msg) => EmbeddingError::Transport(msg),
        }
    }
}

impl YandexClient {
    pub fn new(
        config: &LlmConfig,
        credentials: YandexCredentials,
        query_model: &str,
        doc_model: &str,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            folder_id: config.folder_id.clone(),
            credentials,
            completion_model: config.completion_model.clone(),
            model_version: config.model_version.clone(),
            temperature: config.temperature,
            query_model: query_model.to_string(),
            doc_model: doc_model.to_string(),
        })
    }

    fn completion_model_uri(&self) -> String {
        format!(
            "gpt://{}/{}/{}",
            self.folder_id, self.completion_model, self.model_version
        )
    }

    fn embedding_model_uri(&self, kind: EmbedKind) -> String {
        let model = match kind {
            EmbedKind::Document => &self.doc_model,
            EmbedKind::Query => &self.query_model,
        };
        format!("emb://{}/{}/latest", self.folder_id, model)
    }

    fn headers(&self) -> Result<HeaderMap, CallError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&self.credentials.header_value())
                .map_err(|_| CallError::Unauthorized("credentials contain invalid characters".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-folder-id",
            HeaderValue::from_str(&self.folder_id)
                .map_err(|_| CallError::Unauthorized("folder id contains invalid characters".into()))?,
        );
        Ok(headers)
    }

    fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, CallError> {
        let resp = self
            .client
            .post(format!("{}/{path}", self.endpoint))
            .headers(self.headers()?)
            .json(body)
            .send()
            .map_err(|err| CallError::Transport(err.to_string()))?;

        let resp = check_status(resp)?;
        resp.json::<R>()
            .map_err(|err| CallError::Malformed(err.to_string()))
    }
}

fn check_status(resp: Response) -> Result<Response, CallError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(classify_status(status, body))
}

fn classify_status(status: StatusCode, body: String) -> CallError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CallError::Unauthorized(body),
        _ if body.contains("UNAUTHENTICATED") || body.to_lowercase().contains("api key") => {
            CallError::Unauthorized(body)
        }
        _ => CallError::Service {
            status: status.as_u16(),
            body,
        },
    }
}

impl CompletionClient for YandexClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = build_completion_body(
            self.completion_model_uri(),
            self.temperature,
            request,
        );
        let parsed: CompletionResponse = self.post("completion", &body)?;
        Ok(parsed.into_text())
    }
}

impl Embedder for YandexClient {
    fn embed(&self, text: &str, kind: EmbedKind) -> Result<Vec<f32>, EmbeddingError> {
        let body = EmbeddingBody {
            model_uri: self.embedding_model_uri(kind),
            text,
        };
        let parsed: EmbeddingResponse = self.post("textEmbedding", &body)?;
        if parsed.embedding.is_empty() {
            return Err(EmbeddingError::Service {
                status: 200,
                body: "empty embedding".to_string(),
            });
        }
        Ok(parsed.embedding)
    }
}

fn build_completion_body(
    model_uri: String,
    temperature: f32,
    request: &CompletionRequest,
) -> CompletionBody<'_> {
    CompletionBody {
        model_uri,
        completion_options: CompletionOptions {
            stream: false,
            temperature,
            // int64 fields travel as strings in this API
            max_tokens: request.max_tokens.map(|tokens| tokens.to_string()),
        },
        messages: &request.messages,
        json_schema: request
            .response_schema
            .as_ref()
            .map(|schema| JsonSchema { schema }),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionBody<'a> {
    model_uri: String,
    completion_options: CompletionOptions,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    json_schema: Option<JsonSchema<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionOptions {
    stream: bool,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<String>,
}

#[derive(Serialize)]
struct JsonSchema<'a> {
    schema: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    result: CompletionResult,
}

#[derive(Debug, Deserialize)]
struct CompletionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    message: AlternativeMessage,
}

#[derive(Debug, Deserialize)]
struct AlternativeMessage {
    #[serde(default)]
    text: String,
}

impl CompletionResponse {
    fn into_text(self) -> String {
        self.result
            .alternatives
            .into_iter()
            .next()
            .map(|alt| alt.message.text)
            .unwrap_or_default()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddingBody<'a> {
    model_uri: String,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}
