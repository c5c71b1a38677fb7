use crate::{
    app::{MatchError, MatchRequest, MatchResponse, MatchService},
    semantic::IndexStats,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    service: Arc<MatchService>,
}

pub fn router(service: Arc<MatchService>) -> Router {
    let shared_state = Arc::new(SharedState { service });

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/debug", get(debug))
        .route("/v1/match/vacancies", post(match_vacancies))
        .route("/v1/index/rebuild", post(rebuild_index))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::warn!("shutting down");
}

async fn start_app(service: Arc<MatchService>, addr: String) -> anyhow::Result<()> {
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Serves until SIGINT/SIGTERM. The index should already be built (or
/// marked unavailable) so readiness is known from the first request.
pub fn start_daemon(service: MatchService, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(Arc::new(service), addr).await })
}

#[derive(Debug)]
struct HttpError(MatchError);

impl HttpError {
    fn status(&self) -> StatusCode {
        if self.0.is_credentials_problem() {
            return StatusCode::UNAUTHORIZED;
        }
        match &self.0 {
            MatchError::InvalidRequest(_) | MatchError::InvalidQuery(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            MatchError::IndexUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            MatchError::Embedding(_) | MatchError::Completion { .. } => StatusCode::BAD_GATEWAY,
            MatchError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() || status == StatusCode::UNAUTHORIZED {
            log::error!("{}", self.0);
        }

        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<MatchError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn ready(State(state): State<Arc<SharedState>>) -> impl IntoResponse {
    let stats = state.service.index_stats();
    let status = if stats.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(stats))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DebugResponse {
    pub index: IndexStats,
    pub vacancies_in_store: usize,
}

async fn debug(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<DebugResponse>, HttpError> {
    let service = state.service.clone();

    tokio::task::block_in_place(move || {
        Ok(DebugResponse {
            index: service.index_stats(),
            vacancies_in_store: service.vacancies_total()?,
        }
        .into())
    })
}

async fn match_vacancies(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<MatchRequest>,
) -> Result<Json<MatchResponse>, HttpError> {
    let service = state.service.clone();

    log::debug!(
        "match request: {} chars, k_faiss={:?} k_stage1={:?} k_stage2={:?}",
        payload.resume.chars().count(),
        payload.k_faiss,
        payload.k_stage1,
        payload.k_stage2
    );

    tokio::task::block_in_place(move || service.run(&payload).map(Into::into).map_err(Into::into))
}

async fn rebuild_index(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<IndexStats>, HttpError> {
    let service = state.service.clone();

    tokio::task::block_in_place(move || {
        service
            .index()
            .rebuild()
            .map(Into::into)
            .map_err(|err| MatchError::IndexUnavailable(err.to_string()).into())
    })
}
