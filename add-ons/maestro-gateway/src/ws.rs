//! Session websocket endpoint for `/ws/{session_id}`.
//!
//! Frontend responsibilities:
//! - call lifecycle messages (call_start / call_end)
//! - advisor feedback and manual knowledge queries
//! - rendering pushed actions, perceptions, and summaries
//!
//! Backend responsibilities:
//! - one decision engine per session
//! - one capture pipeline per process (a new session takes it over)
//! - streaming engine output back as JSON events

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use maestro_core::{ClientMessage, EngineEvent, MaestroAgent, OutboundMessage};
use maestro_voice::AudioPipeline;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::AppState;

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    info!(target: "maestro::gateway", "WebSocket connected: {session_id}");
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    // Outbound session channel. The engine and the registry both write
    // here; the forwarder serializes onto the socket writer.
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let forward_out = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(message) = ui_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(text) => {
                    if forward_out.send(Message::Text(text)).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(
                        target: "maestro::gateway",
                        "Failed to serialize an outbound message: {err}"
                    );
                }
            }
        }
    });

    state.registry.register(&session_id, ui_tx.clone());
    let _ = ui_tx.send(OutboundMessage::Connected {
        session_id: session_id.clone(),
        message: "MAESTRO agent online".to_string(),
    });

    let agent = MaestroAgent::new(
        session_id.clone(),
        state.config.clone(),
        state.kb.clone(),
        state.reasoner.clone(),
        state.sink.clone(),
        state.archive.clone(),
        ui_tx.clone(),
    );
    let engine_events = agent.sender();
    let engine = tokio::spawn(async move {
        let _ = agent.run().await;
    });

    // One live capture pipeline per process; starting a session steals
    // the device from whoever held it.
    {
        let mut guard = state.pipeline.lock().await;
        if let Some((owner, handle)) = guard.take() {
            info!(
                target: "maestro::gateway",
                "Stopping the audio pipeline owned by session {owner} to release the device"
            );
            handle.shutdown().await;
            sleep(Duration::from_millis(500)).await;
        }
        match AudioPipeline::start(&session_id, engine_events.clone()).await {
            Ok(handle) => *guard = Some((session_id.clone(), handle)),
            Err(err) => {
                warn!(
                    target: "maestro::gateway",
                    "Audio pipeline failed to start for session {session_id}: {err}"
                );
            }
        }
    }

    while let Some(result) = ws_rx.next().await {
        let message = match result {
            Ok(message) => message,
            Err(err) => {
                warn!(
                    target: "maestro::gateway",
                    "WebSocket receive error for {session_id}: {err}"
                );
                break;
            }
        };

        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client) => {
                    if engine_events.send(EngineEvent::Client(client)).is_err() {
                        warn!(
                            target: "maestro::gateway",
                            "Engine for session {session_id} is gone"
                        );
                        break;
                    }
                }
                Err(err) => {
                    warn!(
                        target: "maestro::gateway",
                        "Unparseable client message on {session_id}: {err}"
                    );
                }
            },
            Message::Close(_) => break,
            Message::Ping(payload) => {
                let _ = out_tx.send(Message::Pong(payload));
            }
            _ => {}
        }
    }

    // Disconnect: give the device back, stop the engine, flush the
    // socket writer.
    {
        let mut guard = state.pipeline.lock().await;
        let owned = guard
            .as_ref()
            .map(|(owner, _)| owner == &session_id)
            .unwrap_or(false);
        if owned {
            if let Some((_, handle)) = guard.take() {
                handle.shutdown().await;
            }
        }
    }
    let _ = engine_events.send(EngineEvent::Shutdown);
    let _ = engine.await;
    state.registry.unregister(&session_id);
    drop(ui_tx);
    drop(out_tx);
    let _ = forwarder.await;
    let _ = writer.await;
    info!(target: "maestro::gateway", "Session {session_id} disconnected");
}
