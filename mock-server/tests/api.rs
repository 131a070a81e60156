use std::sync::Arc;

use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, app_with_state, AppState, Item, ERROR_ENVELOPE, GARBAGE_BODY};
use serde_json::Value;
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

// --- fixed endpoints ---

#[tokio::test]
async fn me_counts_visits() {
    let app = app();

    let first: Value = body_json(app.clone().oneshot(get("/me")).await.unwrap()).await;
    let second: Value = body_json(app.oneshot(get("/me")).await.unwrap()).await;

    assert_eq!(first["name"], "mock user");
    assert_eq!(first["visits"], 1);
    assert_eq!(second["visits"], 2);
}

#[tokio::test]
async fn echo_reflects_query_and_headers() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/echo?q=rust+lang&page=2")
                .header(http::header::ACCEPT, "text/javascript")
                .header(http::header::ACCEPT_LANGUAGE, "en-us")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let echoed: Value = body_json(resp).await;
    assert_eq!(echoed["query"]["q"], "rust lang");
    assert_eq!(echoed["query"]["page"], "2");
    assert_eq!(echoed["accept"], "text/javascript");
    assert_eq!(echoed["accept_language"], "en-us");
    assert!(echoed["authorization"].is_null());
}

#[tokio::test]
async fn broken_returns_error_envelope() {
    let resp = app().oneshot(get("/broken")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_bytes(resp).await, ERROR_ENVELOPE.as_bytes());
}

#[tokio::test]
async fn garbage_is_not_json() {
    let resp = app().oneshot(get("/garbage")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_bytes(resp).await;
    assert_eq!(body, GARBAGE_BODY.as_bytes());
    assert!(serde_json::from_slice::<Value>(&body).is_err());
}

#[tokio::test]
async fn slow_echoes_tag_after_delay() {
    let start = std::time::Instant::now();
    let resp = app().oneshot(get("/slow?ms=50&tag=b")).await.unwrap();

    assert!(start.elapsed() >= std::time::Duration::from_millis(50));
    let body: Value = body_json(resp).await;
    assert_eq!(body["tag"], "b");
}

#[tokio::test]
async fn hits_are_counted_per_path() {
    let state = Arc::new(AppState::default());
    let app = app_with_state(state.clone());

    app.clone().oneshot(get("/garbage")).await.unwrap();
    app.clone().oneshot(get("/garbage")).await.unwrap();
    app.clone().oneshot(get("/slow?tag=x")).await.unwrap();

    assert_eq!(state.hits("/garbage").await, 2);
    assert_eq!(state.hits("/slow").await, 1);

    let reported: Value = body_json(app.oneshot(get("/hits?path=/garbage")).await.unwrap()).await;
    assert_eq!(reported["hits"], 2);
}

#[tokio::test]
async fn unknown_path_returns_404() {
    let resp = app().oneshot(get("/nowhere")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- items ---

#[tokio::test]
async fn create_item_returns_201() {
    let resp = app()
        .oneshot(json_request("POST", "/items", r#"{"name":"bolt","quantity":4}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    let item: Item = body_json(resp).await;
    assert_eq!(item.name, "bolt");
    assert_eq!(item.quantity, 4);
}

#[tokio::test]
async fn create_item_malformed_json_returns_422() {
    let resp = app()
        .oneshot(json_request("POST", "/items", r#"{"not_name":1}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn get_item_bad_uuid_returns_400() {
    let resp = app().oneshot(get("/items/not-a-uuid")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn item_lifecycle() {
    use tower::Service;

    let mut app = app().into_service();

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request("POST", "/items", r#"{"name":"nut"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Item = body_json(resp).await;
    assert_eq!(created.quantity, 0);
    let id = created.id;

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request("PUT", &format!("/items/{id}"), r#"{"quantity":9}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Item = body_json(resp).await;
    assert_eq!(updated.name, "nut");
    assert_eq!(updated.quantity, 9);

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get("/items"))
        .await
        .unwrap();
    let items: Vec<Item> = body_json(resp).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, id);

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(
            Request::builder()
                .method("DELETE")
                .uri(&format!("/items/{id}"))
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get(&format!("/items/{id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
