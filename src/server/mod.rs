// SPDX-License-Identifier: MIT

//! HTTP surface
//!
//! JSON endpoints for asking questions and ingesting documents, plus an SSE
//! endpoint that streams each node as it finishes.

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::RagError;
use crate::workflow::{
    MemoryScope, RunEvent, Termination, WorkflowManager, INSUFFICIENT_INFORMATION,
};

type AppState = Arc<WorkflowManager>;
type ApiError = (StatusCode, Json<Value>);

pub fn router(manager: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/ask", post(ask))
        .route("/api/ask/stream", post(ask_stream))
        .route("/api/documents", post(add_documents))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(manager)
}

pub async fn serve(manager: AppState, port: u16) -> Result<(), RagError> {
    let app = router(manager);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    /// Conversation memory is kept per username; anonymous requests get none
    #[serde(default)]
    pub username: Option<String>,
}

impl AskRequest {
    fn scope(&self, manager: &WorkflowManager) -> MemoryScope {
        self.username
            .as_deref()
            .and_then(|user| manager.session_key(user))
            .map_or(MemoryScope::Off, MemoryScope::Session)
    }
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub path: Vec<String>,
    pub termination: Termination,
    pub documents: usize,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

async fn ask(
    State(manager): State<AppState>,
    Json(payload): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let scope = payload.scope(&manager);
    match manager
        .run_workflow_for(&scope, payload.question, CancellationToken::new())
        .await
    {
        Ok(outcome) => Ok(Json(AskResponse {
            answer: outcome
                .state
                .generation()
                .unwrap_or(INSUFFICIENT_INFORMATION)
                .to_string(),
            documents: outcome.state.documents().len(),
            path: outcome.path,
            termination: outcome.termination,
        })),
        Err(e) => {
            log::error!("Workflow failed: {}", e);
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Workflow failed: {}", e),
            ))
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum StreamItem {
    Event(RunEvent),
    Error { error: String },
}

async fn ask_stream(
    State(manager): State<AppState>,
    Json(payload): Json<AskRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(100);
    let cancel = CancellationToken::new();
    let scope = payload.scope(&manager);

    match manager.stream_for(&scope, payload.question, cancel.clone()) {
        Ok(events) => {
            tokio::spawn(forward_events(events, tx, cancel));
        }
        Err(e) => {
            log::error!("Could not start streaming run: {}", e);
            let _ = tx.try_send(StreamItem::Error {
                error: e.to_string(),
            });
        }
    }

    let stream = ReceiverStream::new(rx).map(|item| {
        Ok(Event::default().json_data(item).unwrap_or_else(|e| {
            Event::default()
                .event("error")
                .data(format!("serialization failed: {}", e))
        }))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1)))
}

async fn forward_events(
    events: impl Stream<Item = Result<RunEvent, RagError>>,
    tx: mpsc::Sender<StreamItem>,
    cancel: CancellationToken,
) {
    let mut events = Box::pin(events);
    log::info!("Starting streaming run");
    while let Some(event) = events.next().await {
        let item = match event {
            Ok(event) => StreamItem::Event(event),
            Err(e) => {
                log::error!("Streaming run failed: {}", e);
                StreamItem::Error {
                    error: e.to_string(),
                }
            }
        };
        if tx.send(item).await.is_err() {
            log::info!("Client disconnected; cancelling run");
            cancel.cancel();
            // Drain so the run observes the cancellation and stops
            while events.next().await.is_some() {}
            return;
        }
    }
    log::info!("Streaming run finished");
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub source: String,
    pub text: String,
}

async fn add_documents(
    State(manager): State<AppState>,
    Json(payload): Json<IngestRequest>,
) -> Result<Json<Value>, ApiError> {
    match manager.ingest_text(&payload.source, &payload.text).await {
        Ok(chunks) => Ok(Json(json!({ "source": payload.source, "chunks": chunks }))),
        Err(e) => Err(error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())),
    }
}
