use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{
    net::TcpListener,
    sync::{Mutex, RwLock},
};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct CreateItem {
    pub name: String,
    #[serde(default)]
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateItem {
    pub name: Option<String>,
    pub quantity: Option<u32>,
}

#[derive(Deserialize)]
pub struct SlowParams {
    #[serde(default)]
    pub ms: u64,
    #[serde(default)]
    pub tag: String,
}

#[derive(Deserialize)]
pub struct HitsParams {
    pub path: String,
}

/// Items plus a per-path request counter, so tests can tell whether a
/// response came from the wire or from a client-side cache.
#[derive(Default)]
pub struct AppState {
    items: RwLock<HashMap<Uuid, Item>>,
    hits: Mutex<HashMap<String, u64>>,
}

impl AppState {
    pub async fn hits(&self, path: &str) -> u64 {
        self.hits.lock().await.get(path).copied().unwrap_or(0)
    }
}

pub type Shared = Arc<AppState>;

pub const ERROR_ENVELOPE: &str = r#"{"error":{"message":"invalid token","code":190}}"#;
pub const GARBAGE_BODY: &str = "<html>definitely not json</html>";

pub fn app() -> Router {
    app_with_state(Arc::new(AppState::default()))
}

pub fn app_with_state(state: Shared) -> Router {
    Router::new()
        .route("/me", get(me))
        .route("/echo", get(echo))
        .route("/items", get(list_items).post(create_item))
        .route("/items/{id}", get(get_item).put(update_item).delete(delete_item))
        .route("/slow", get(slow))
        .route("/broken", get(broken))
        .route("/garbage", get(garbage))
        .route("/hits", get(hits))
        .layer(middleware::from_fn_with_state(state.clone(), count_hits))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn count_hits(State(state): State<Shared>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let count = {
        let mut hits = state.hits.lock().await;
        let count = hits.entry(path.clone()).or_insert(0);
        *count += 1;
        *count
    };
    debug!(method = %request.method(), %path, count, "request");
    next.run(request).await
}

async fn me(State(state): State<Shared>) -> Json<Value> {
    let visits = state.hits("/me").await;
    Json(json!({ "name": "mock user", "visits": visits }))
}

/// Reflects the query string and the negotiation headers back as JSON.
async fn echo(Query(query): Query<HashMap<String, String>>, headers: HeaderMap) -> Json<Value> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "query": query,
        "accept": header("accept"),
        "accept_language": header("accept-language"),
        "authorization": header("authorization"),
    }))
}

async fn slow(Query(params): Query<SlowParams>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(params.ms)).await;
    Json(json!({ "tag": params.tag, "ms": params.ms }))
}

async fn broken() -> Response {
    (
        StatusCode::BAD_REQUEST,
        [("content-type", "application/json")],
        ERROR_ENVELOPE,
    )
        .into_response()
}

async fn garbage() -> Response {
    (StatusCode::OK, [("content-type", "text/html")], GARBAGE_BODY).into_response()
}

async fn hits(State(state): State<Shared>, Query(params): Query<HitsParams>) -> Json<Value> {
    let hits = state.hits(&params.path).await;
    Json(json!({ "path": params.path, "hits": hits }))
}

async fn list_items(State(state): State<Shared>) -> Json<Vec<Item>> {
    let items = state.items.read().await;
    Json(items.values().cloned().collect())
}

async fn create_item(
    State(state): State<Shared>,
    Json(input): Json<CreateItem>,
) -> (StatusCode, Json<Item>) {
    let item = Item {
        id: Uuid::new_v4(),
        name: input.name,
        quantity: input.quantity,
    };
    state.items.write().await.insert(item.id, item.clone());
    (StatusCode::CREATED, Json(item))
}

async fn get_item(
    State(state): State<Shared>,
    Path(id): Path<Uuid>,
) -> Result<Json<Item>, StatusCode> {
    let items = state.items.read().await;
    items.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn update_item(
    State(state): State<Shared>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateItem>,
) -> Result<Json<Item>, StatusCode> {
    let mut items = state.items.write().await;
    let item = items.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    if let Some(name) = input.name {
        item.name = name;
    }
    if let Some(quantity) = input.quantity {
        item.quantity = quantity;
    }
    Ok(Json(item.clone()))
}

async fn delete_item(
    State(state): State<Shared>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    let mut items = state.items.write().await;
    items.remove(&id).map(|_| StatusCode::NO_CONTENT).ok_or(StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_serializes_to_json() {
        let item = Item {
            id: Uuid::nil(),
            name: "widget".to_string(),
            quantity: 3,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["name"], "widget");
        assert_eq!(json["quantity"], 3);
    }

    #[test]
    fn create_item_defaults_quantity_to_zero() {
        let input: CreateItem = serde_json::from_str(r#"{"name":"bolt"}"#).unwrap();
        assert_eq!(input.name, "bolt");
        assert_eq!(input.quantity, 0);
    }

    #[test]
    fn create_item_rejects_missing_name() {
        let result: Result<CreateItem, _> = serde_json::from_str(r#"{"quantity":1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn update_item_all_fields_optional() {
        let input: UpdateItem = serde_json::from_str(r#"{}"#).unwrap();
        assert!(input.name.is_none());
        assert!(input.quantity.is_none());
    }

    #[test]
    fn slow_params_default_to_no_delay() {
        let params: SlowParams = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(params.ms, 0);
        assert!(params.tag.is_empty());
    }

    #[test]
    fn error_envelope_is_valid_json() {
        let value: Value = serde_json::from_str(ERROR_ENVELOPE).unwrap();
        assert_eq!(value["error"]["code"], 190);
    }

    #[tokio::test]
    async fn hits_default_to_zero() {
        let state = AppState::default();
        assert_eq!(state.hits("/nowhere").await, 0);
    }
}
