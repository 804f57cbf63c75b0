//! Axum gateway: the MAESTRO process. Wires the knowledge base, call
//! archive, reasoning backend, and capture pipeline together, and exposes
//! them over one websocket per session plus a small REST surface.

mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use maestro_core::{
    create_best_reasoner, ConnectionRegistry, CoreResult, KbLookup, KnowledgeBase,
    MaestroConfig, OutboundMessage, ReasoningService, SledCallStore, WebhookSink,
};
use maestro_voice::{transcription_backend_label, PipelineHandle};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Everything a request handler or socket session needs, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: MaestroConfig,
    pub db: sled::Db,
    pub kb: Arc<KnowledgeBase>,
    pub archive: Arc<SledCallStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub reasoner: Arc<dyn ReasoningService>,
    pub sink: Arc<WebhookSink>,
    /// One live capture pipeline per process, tagged with the owning
    /// session id.
    pub pipeline: Arc<Mutex<Option<(String, PipelineHandle)>>>,
    pub transcription_backend: &'static str,
}

impl AppState {
    fn initialize(config: MaestroConfig) -> CoreResult<Self> {
        let db = sled::open(&config.storage_path)?;
        let kb = Arc::new(KnowledgeBase::open(db.clone())?);
        let archive = Arc::new(SledCallStore::new(db.clone()));
        let reasoner = create_best_reasoner(&config);
        let sink = Arc::new(WebhookSink::from_env());

        Ok(Self {
            config,
            db,
            kb,
            archive,
            registry: ConnectionRegistry::new(),
            reasoner,
            sink,
            pipeline: Arc::new(Mutex::new(None)),
            transcription_backend: transcription_backend_label(),
        })
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/kb/add", post(kb_add))
        .route("/api/kb/search", get(kb_search))
        .route("/api/sessions/:session_id/history", get(session_history))
        .route("/ws/:session_id", get(ws::ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "alive",
        "active_sessions": state.registry.active_count(),
        "transcription_backend": state.transcription_backend,
    }))
}

#[derive(Debug, Deserialize)]
struct KbAddRequest {
    title: String,
    content: String,
    #[serde(default = "default_category")]
    category: String,
}

fn default_category() -> String {
    "general".to_string()
}

async fn kb_add(State(state): State<AppState>, Json(req): Json<KbAddRequest>) -> Response {
    match state.kb.add_document(&req.title, &req.content, &req.category) {
        Ok(_) => Json(json!({"status": "added", "title": req.title})).into_response(),
        Err(err) => {
            error!(target: "maestro::gateway", "KB add failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": err.to_string()})),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
}

async fn kb_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<KbLookup> {
    Json(state.kb.search(&params.q))
}

async fn session_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    use maestro_core::CallArchive;

    match state.archive.history(&session_id) {
        Ok(calls) => Json(json!({"session_id": session_id, "calls": calls})).into_response(),
        Err(err) => {
            error!(target: "maestro::gateway", "History lookup failed for {session_id}: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": err.to_string()})),
            )
                .into_response()
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env first. API keys stay in the backend only; the frontend
    // is a stateless client and never sees them.
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[maestro-gateway] .env not loaded: {e} (using system environment)");
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MaestroConfig::from_env();
    let port = config.port;
    let state = match AppState::initialize(config) {
        Ok(state) => state,
        Err(err) => {
            error!(target: "maestro::gateway", "Startup failed: {err}");
            std::process::exit(1);
        }
    };

    let app = router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(target: "maestro::gateway", "🎼 MAESTRO gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(err) = result {
                error!(target: "maestro::gateway", "Server error: {err}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!(target: "maestro::gateway", "Shutdown initiated (Ctrl+C received)");

            state.registry.broadcast(OutboundMessage::Shutdown);
            if let Some((owner, handle)) = state.pipeline.lock().await.take() {
                info!(
                    target: "maestro::gateway",
                    "Stopping the audio pipeline owned by session {owner}"
                );
                handle.shutdown().await;
            }
            if let Err(err) = state.db.flush_async().await {
                warn!(target: "maestro::gateway", "sled flush failed: {err}");
            }

            info!(target: "maestro::gateway", "✓ Graceful shutdown complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use maestro_core::PlaceholderReasoner;
    use tower::util::ServiceExt;

    fn test_state() -> AppState {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let kb = Arc::new(KnowledgeBase::open(db.clone()).unwrap());
        let archive = Arc::new(SledCallStore::new(db.clone()));

        AppState {
            config: MaestroConfig::default(),
            db,
            kb,
            archive,
            registry: ConnectionRegistry::new(),
            reasoner: Arc::new(PlaceholderReasoner),
            sink: Arc::new(WebhookSink::new(None, None)),
            pipeline: Arc::new(Mutex::new(None)),
            transcription_backend: "placeholder",
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_alive_with_no_sessions() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "alive");
        assert_eq!(json["active_sessions"], 0);
        assert_eq!(json["transcription_backend"], "placeholder");
    }

    #[tokio::test]
    async fn kb_add_then_search_finds_the_document() {
        let app = router(test_state());

        let request = Request::builder()
            .method("POST")
            .uri("/api/kb/add")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"title": "Gift Policy", "content": "We can send a gift basket after a major outage."}"#,
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let added = body_json(response).await;
        assert_eq!(added["status"], "added");
        assert_eq!(added["title"], "Gift Policy");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/kb/search?q=gift%20basket")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let lookup = body_json(response).await;
        assert_eq!(lookup["found"], true);
        assert_eq!(lookup["results"][0]["title"], "Gift Policy");
    }

    #[tokio::test]
    async fn history_for_an_unknown_session_is_empty() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/sessions/never-connected/history")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["session_id"], "never-connected");
        assert_eq!(json["calls"], json!([]));
    }

    #[tokio::test]
    async fn kb_search_requires_a_query() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/kb/search")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
