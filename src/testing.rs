//! In-process catalog and content host for tests.
//!
//! Serves `/api/v1/...` like the catalog and `/content/{name}` like the
//! content host, and records every request it sees.
//!
//! A listing filtered by [`MockCatalog::AFTER_STATS_TAG`] is only answered
//! once `/api/v1/downloads/total` has been served.
//!
//! Image ids with fixed behavior on `POST /api/v1/downloads/{id}`:
//! - `missing`: 404
//! - `nogrant`: `{}`
//! - `badjson`: a non-JSON body
//! - `broken`: grant to content that 404s
//! - `vacation`: content with `content-disposition: filename="vacation.png"`
//! - `empty`: zero-byte content
//! - `slow`: content held back until [`MockCatalog::release_slow`]
//! - anything else: content with no disposition and no extension

use crate::api::ApiClient;
use axum::body::Body;
use axum::extract::{Path, RawQuery, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::Notify;

/// One request as seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
}

struct MockState {
    origin: String,
    hits: Mutex<Vec<Hit>>,
    total_downloads: AtomicU64,
    total_served: Notify,
    slow_released: Notify,
}

pub struct MockCatalog {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockCatalog {
    pub const AFTER_STATS_TAG: &'static str = "after-stats";

    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(MockState {
            origin: format!("http://{}", addr),
            hits: Mutex::new(Vec::new()),
            total_downloads: AtomicU64::new(13000),
            total_served: Notify::new(),
            slow_released: Notify::new(),
        });

        let router = Router::new()
            .route("/api/v1/images", get(list_images))
            .route("/api/v1/images/:id", get(get_image))
            .route("/api/v1/downloads/total", get(total_downloads))
            .route("/api/v1/downloads/:id", post(request_download))
            .route("/api/v1/downloads/:id/count", get(image_downloads))
            .route("/content/:name", get(content))
            .layer(middleware::from_fn_with_state(Arc::clone(&state), record))
            .with_state(Arc::clone(&state));

        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { addr, state }
    }

    /// Scheme and authority, e.g. `http://127.0.0.1:40123`
    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self) -> ApiClient {
        let client = reqwest::Client::builder().cookie_store(true).build().unwrap();
        ApiClient::with_client(client, &format!("{}/api/v1", self.origin())).unwrap()
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.state.hits.lock().unwrap().clone()
    }

    /// Let the pending or next `/content/slow` request complete
    pub fn release_slow(&self) {
        self.state.slow_released.notify_one();
    }

    /// Requests that reached the content host
    pub fn content_hits(&self) -> usize {
        self.hits()
            .iter()
            .filter(|h| h.path.starts_with("/content/"))
            .count()
    }
}

async fn record(State(state): State<Arc<MockState>>, request: Request, next: Next) -> Response {
    let hit = Hit {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        query: request.uri().query().map(str::to_string),
        content_type: request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };
    state.hits.lock().unwrap().push(hit);
    next.run(request).await
}

pub fn record_json(id: &str) -> Value {
    json!({
        "id": id,
        "name": format!("Image {}", id),
        "description": "fixture",
        "thumbnail_url": format!("https://cdn.example.com/t/{}.jpg", id),
        "hd_url": format!("https://cdn.example.com/hd/{}.jpg", id),
        "downloads": 7,
        "tags": ["nature"],
        "is_featured": false,
        "created_at": "2024-03-01T12:30:00",
        "updated_at": null,
        "file_size": 2048,
        "content_type": "image/jpeg"
    })
}

async fn list_images(State(state): State<Arc<MockState>>, RawQuery(query): RawQuery) -> Json<Value> {
    let tag = format!("tags={}", MockCatalog::AFTER_STATS_TAG);
    if query.is_some_and(|q| q.split('&').any(|pair| pair == tag)) {
        state.total_served.notified().await;
    }
    Json(json!({
        "images": [record_json("a"), record_json("b"), record_json("c")],
        "total": 57
    }))
}

async fn get_image(Path(id): Path<String>) -> Response {
    if id == "missing" {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(record_json(&id)).into_response()
}

async fn total_downloads(State(state): State<Arc<MockState>>) -> Json<Value> {
    state.total_served.notify_one();
    Json(json!({ "total_downloads": state.total_downloads.load(Ordering::SeqCst) }))
}

async fn image_downloads(Path(_id): Path<String>) -> Json<Value> {
    Json(json!({ "total_downloads": 7 }))
}

async fn request_download(State(state): State<Arc<MockState>>, Path(id): Path<String>) -> Response {
    match id.as_str() {
        "missing" => StatusCode::NOT_FOUND.into_response(),
        "nogrant" => Json(json!({})).into_response(),
        "badjson" => (StatusCode::OK, "not json").into_response(),
        "broken" => Json(json!({ "download_url": format!("{}/content/gone", state.origin) }))
            .into_response(),
        _ => {
            state.total_downloads.fetch_add(1, Ordering::SeqCst);
            Json(json!({ "download_url": format!("{}/content/{}", state.origin, id) }))
                .into_response()
        }
    }
}

async fn content(State(state): State<Arc<MockState>>, Path(name): Path<String>) -> Response {
    if name == "slow" {
        state.slow_released.notified().await;
    }

    match name.as_str() {
        "gone" => StatusCode::NOT_FOUND.into_response(),
        "vacation" => (
            [
                (header::CONTENT_TYPE, "image/png"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"vacation.png\""),
            ],
            "PNGDATA",
        )
            .into_response(),
        "empty" => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            Body::empty(),
        )
            .into_response(),
        _ => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            format!("bytes of {}", name),
        )
            .into_response(),
    }
}
