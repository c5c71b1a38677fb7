use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::tests::support::*;
use crate::web::router;

fn app(builder: FixtureBuilder) -> (Router, Fixture) {
    let fixture = builder.build();
    (router(fixture.service.clone()), fixture)
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn match_body() -> Value {
    json!({
        "resume": "Финансовый аналитик, МСФО",
        "k_faiss": 9,
        "k_stage1": 3,
        "k_stage2": 2
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn test_health() {
    let (app, _fixture) = app(FixtureBuilder::new().without_index_build());

    let (status, body) = send(app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["time"].is_string());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ready_follows_index_state() {
    let (pending, _fixture) = app(FixtureBuilder::new().without_index_build());
    let (status, body) = send(pending, Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);

    let (built, _fixture) = app(FixtureBuilder::new());
    let (status, body) = send(built, Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
    assert_eq!(body["vacancies_count"], 9);
    assert_eq!(body["dimension"], 9);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_match_vacancies() {
    let completion = ScriptedCompletion::with_selections(&[
        r#"{"selected":[7,3]}"#,
        r#"{"selected":[7]}"#,
    ]);
    let (app, _fixture) = app(FixtureBuilder::new().completion(completion));

    let (status, body) = send(app, Method::POST, "/v1/match/vacancies", Some(match_body())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["top_idx"].as_array().unwrap().len(), 9);
    assert_eq!(body["stage1"], json!([3, 7, 1]));
    assert_eq!(body["result"][0]["idx"], 7);
    assert_eq!(body["result"][0]["title"], "Финансовый директор");
    assert_eq!(body["result"][0]["seniority_level"], "Head");
    assert_eq!(body["result"][0]["hh_url"], "https://hh.ru/vacancy/7");
    // padding follows the model's pick
    assert_eq!(body["result"][1]["idx"], 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_match_rejects_bad_bounds() {
    let (app, fixture) = app(FixtureBuilder::new());

    let mut body = match_body();
    body["k_stage2"] = json!(0);
    let (status, body) = send(app, Method::POST, "/v1/match/vacancies", Some(body)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("k_stage2"));
    assert_eq!(fixture.completion.request_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_match_without_index() {
    let (app, fixture) = app(FixtureBuilder::new().without_shards());

    let (status, body) = send(app, Method::POST, "/v1/match/vacancies", Some(match_body())).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
    assert_eq!(fixture.completion.request_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_match_bad_credentials() {
    let (app, _fixture) = app(FixtureBuilder::new().embedder(FixedEmbedder::unauthorized()));

    let (status, _) = send(app, Method::POST, "/v1/match/vacancies", Some(match_body())).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_match_upstream_failure() {
    let completion = ScriptedCompletion::default();
    completion.push_selection(Err(crate::llm::CompletionError::Transport(
        "connection reset".into(),
    )));
    let (app, _fixture) = app(FixtureBuilder::new().completion(completion));

    let (status, body) = send(app, Method::POST, "/v1/match/vacancies", Some(match_body())).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("stage1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rebuild_index() {
    let (app, _fixture) = app(FixtureBuilder::new().without_index_build());

    let (status, body) = send(app.clone(), Method::POST, "/v1/index/rebuild", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
    assert_eq!(body["loaded_batches"], 3);

    let (status, _) = send(app, Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rebuild_without_shards() {
    let (app, _fixture) = app(FixtureBuilder::new().without_shards());

    let (status, _) = send(app, Method::POST, "/v1/index/rebuild", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_debug() {
    let (app, _fixture) = app(FixtureBuilder::new());

    let (status, body) = send(app, Method::GET, "/debug", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["vacancies_in_store"], 9);
    assert_eq!(body["index"]["ready"], true);
}
