//! HTTP and WebSocket command surface.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::ledger::PlayerLedger;
use crate::quest::{KillEvent, PlayerId, QuestEngine, QuestOutcome, QuestRejection};
use crate::session::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub engine: QuestEngine,
    pub sessions: Arc<SessionRegistry>,
    pub ledger: Arc<PlayerLedger>,
    /// Feeds the kill event adapter
    pub kills: mpsc::Sender<KillEvent>,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    /// Tasks to advance; all active tasks when absent
    #[serde(default)]
    pub tasks: Option<Vec<usize>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutcomeResponse {
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Quest commands
        .route("/players/:id/quests/:quest/grant", post(grant_quest))
        .route("/players/:id/quests/:quest/abandon", post(abandon_quest))
        .route("/players/:id/quests/:quest/advance", post(advance_quest))
        .route("/players/:id/quests/:quest/claim", post(claim_reward))
        // Read-only views
        .route("/players/:id/journal", get(journal))
        .route("/players/:id/ledger", get(ledger))
        // World events
        .route("/kills", post(report_kill))
        // Notification stream
        .route("/players/:id/ws", get(ws_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([axum::http::header::CONTENT_TYPE]),
        )
        .with_state(state)
}

fn outcome_response(outcome: QuestOutcome) -> Response {
    match outcome {
        QuestOutcome::Applied => (
            StatusCode::OK,
            Json(OutcomeResponse {
                applied: true,
                reason: None,
            }),
        )
            .into_response(),
        QuestOutcome::Rejected(rejection) => {
            let status = match rejection {
                QuestRejection::UnknownQuest(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::CONFLICT,
            };
            (
                status,
                Json(OutcomeResponse {
                    applied: false,
                    reason: Some(rejection.to_string()),
                }),
            )
                .into_response()
        }
    }
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().timestamp_millis()
    }))
}

async fn grant_quest(
    State(state): State<AppState>,
    Path((id, quest)): Path<(u64, String)>,
) -> Response {
    outcome_response(state.engine.grant_quest(PlayerId(id), &quest).await)
}

async fn abandon_quest(
    State(state): State<AppState>,
    Path((id, quest)): Path<(u64, String)>,
) -> Response {
    outcome_response(state.engine.abandon_quest(PlayerId(id), &quest).await)
}

async fn advance_quest(
    State(state): State<AppState>,
    Path((id, quest)): Path<(u64, String)>,
    body: Option<Json<AdvanceRequest>>,
) -> Response {
    let player = PlayerId(id);
    let tasks = body.and_then(|Json(req)| req.tasks);
    let outcome = match tasks {
        Some(tasks) => state.engine.advance_quest(player, &quest, &tasks).await,
        None => state.engine.advance_active_tasks(player, &quest).await,
    };
    outcome_response(outcome)
}

async fn claim_reward(
    State(state): State<AppState>,
    Path((id, quest)): Path<(u64, String)>,
) -> Response {
    outcome_response(state.engine.claim_reward(PlayerId(id), &quest).await)
}

async fn journal(State(state): State<AppState>, Path(id): Path<u64>) -> impl IntoResponse {
    Json(state.engine.journal(PlayerId(id)).await)
}

async fn ledger(State(state): State<AppState>, Path(id): Path<u64>) -> impl IntoResponse {
    Json(state.ledger.snapshot(PlayerId(id)))
}

async fn report_kill(State(state): State<AppState>, Json(event): Json<KillEvent>) -> StatusCode {
    match state.kills.try_send(event) {
        Ok(()) => StatusCode::ACCEPTED,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("Kill event queue full, dropping event");
            StatusCode::SERVICE_UNAVAILABLE
        }
        Err(mpsc::error::TrySendError::Closed(_)) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<u64>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, PlayerId(id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, player: PlayerId) {
    let (mut sender, mut receiver) = socket.split();
    let (generation, mut rx) = state.sessions.connect(player);
    info!("{} connected to notification stream", player);

    // Forward queued notifications to the WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Binary(frame)).await.is_err() {
                break;
            }
        }
    });

    // The stream is outbound only; incoming frames are ignored until close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => break,
                other => debug!("Ignoring inbound frame: {:?}", other),
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.sessions.disconnect(player, generation);
    info!("{} disconnected from notification stream", player);
}
