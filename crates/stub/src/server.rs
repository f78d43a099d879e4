//! HTTP surface of the reference backend

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bugtrack_common::ApiError;
use serde_json::Value;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::store::{parse_bug_id, BugStore, StoreError};

type SharedStore = Arc<RwLock<BugStore>>;

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            StoreError::Validation(_) | StoreError::InvalidId(_) => StatusCode::BAD_REQUEST,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(ApiError::new(self.to_string()))).into_response()
    }
}

fn parse_body(body: &Bytes) -> Result<Value, StoreError> {
    serde_json::from_slice(body)
        .map_err(|e| StoreError::Validation(format!("invalid JSON body: {}", e)))
}

/// Build the API router, mounted under `/api`.
pub fn router(store: SharedStore) -> Router {
    let api = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/bugs",
            get(list_bugs_handler)
                .post(create_bug_handler)
                .delete(delete_all_bugs_handler),
        )
        .route(
            "/bugs/:id",
            get(get_bug_handler)
                .put(update_bug_handler)
                .delete(delete_bug_handler),
        )
        .route(
            "/bugs/:id/comments",
            get(list_comments_handler).post(create_comment_handler),
        )
        .with_state(store);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API on `addr` until the process exits.
pub async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let store = Arc::new(RwLock::new(BugStore::new()));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Bugtrack stub listening on http://{}/api", listener.local_addr()?);
    axum::serve(listener, router(store)).await?;
    Ok(())
}

/// A stub backend running on an ephemeral port inside the current runtime.
pub struct StubServer {
    addr: SocketAddr,
    store: SharedStore,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl StubServer {
    pub async fn spawn() -> anyhow::Result<Self> {
        let store = Arc::new(RwLock::new(BugStore::new()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel::<()>();
        let app = router(store.clone());

        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!("Stub server stopped with error: {}", e);
            }
        });

        debug!("Stub server spawned on {}", addr);
        Ok(Self {
            addr,
            store,
            shutdown: Some(tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL of the API, e.g. `http://127.0.0.1:41234/api`.
    pub fn api_base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Direct access to the backing store, for assertions the API cannot express.
    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "bugtrack-stub"
    }))
}

async fn list_bugs_handler(State(store): State<SharedStore>) -> impl IntoResponse {
    Json(store.read().await.list_bugs())
}

async fn create_bug_handler(
    State(store): State<SharedStore>,
    body: Bytes,
) -> Result<Response, StoreError> {
    let body = parse_body(&body)?;
    let bug = store.write().await.create_bug(&body)?;
    Ok((StatusCode::CREATED, Json(bug)).into_response())
}

async fn delete_all_bugs_handler(State(store): State<SharedStore>) -> impl IntoResponse {
    store.write().await.delete_all();
    StatusCode::NO_CONTENT
}

async fn get_bug_handler(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> Result<Response, StoreError> {
    let id = parse_bug_id(&id)?;
    let bug = store.read().await.get_bug(id)?;
    Ok(Json(bug).into_response())
}

async fn update_bug_handler(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, StoreError> {
    let id = parse_bug_id(&id)?;
    let body = parse_body(&body)?;
    let bug = store.write().await.update_bug(id, &body)?;
    Ok(Json(bug).into_response())
}

async fn delete_bug_handler(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> Result<Response, StoreError> {
    let id = parse_bug_id(&id)?;
    store.write().await.delete_bug(id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn list_comments_handler(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> Result<Response, StoreError> {
    let id = parse_bug_id(&id)?;
    let comments = store.read().await.list_comments(id)?;
    Ok(Json(comments).into_response())
}

async fn create_comment_handler(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, StoreError> {
    let id = parse_bug_id(&id)?;
    let body = parse_body(&body)?;
    let comment = store.write().await.create_comment(id, &body)?;
    Ok((StatusCode::CREATED, Json(comment)).into_response())
}
