// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WebSocket client session.
//!
//! Reads JSON requests from the socket and hands them to the bridge; a
//! forward task drains the client's outbound queue into the socket.

use axum::extract::ws::{Message, WebSocket};
use doorlink::{ClientRequest, ErrorCode, HubBridge, ServerMessage, SessionId};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long queued messages may take to reach a leaving client.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// A WebSocket client session
pub struct ClientSession {
    bridge: Arc<HubBridge>,
}

impl ClientSession {
    pub fn new(bridge: Arc<HubBridge>) -> Self {
        Self { bridge }
    }

    /// Run the session until the client leaves or the bridge shuts down.
    pub async fn run(self, socket: WebSocket) {
        let (session_id, mut outbox) = self.bridge.connect();
        let (mut ws_tx, mut ws_rx) = socket.split();

        let forward = tokio::spawn(async move {
            while let Some(msg) = outbox.recv().await {
                match serde_json::to_string(&msg) {
                    Ok(json) => {
                        if ws_tx.send(Message::Text(json)).await.is_err() {
                            debug!("[{}] WebSocket send failed, closing", session_id);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("[{}] Failed to serialize message: {}", session_id, e);
                    }
                }
            }
            // Best effort; the peer may already be gone.
            let _ = ws_tx.close().await;
        });

        let mut shutdown = self.bridge.shutdown_signal();

        loop {
            tokio::select! {
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(session_id, &text).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("[{}] Client closed connection", session_id);
                            break;
                        }
                        Some(Ok(Message::Ping(_))) => {
                            // Axum handles pong automatically
                        }
                        Some(Ok(Message::Pong(_))) => {
                            debug!("[{}] Pong received", session_id);
                        }
                        Some(Ok(Message::Binary(_))) => {
                            warn!("[{}] Binary messages not supported", session_id);
                            self.bridge.clients().send_to(
                                session_id,
                                ServerMessage::error(
                                    ErrorCode::InvalidMessage,
                                    "Binary messages not supported",
                                ),
                            );
                        }
                        Some(Err(e)) => {
                            warn!("[{}] WebSocket error: {}", session_id, e);
                            break;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("[{}] Closing for shutdown", session_id);
                        break;
                    }
                }
            }
        }

        // Dropping the registry entry closes the outbox and ends `forward`.
        self.bridge.disconnect(session_id);
        let forward_abort = forward.abort_handle();
        if tokio::time::timeout(FLUSH_TIMEOUT, forward).await.is_err() {
            debug!("[{}] Forward task did not finish in time", session_id);
            forward_abort.abort();
        }
        info!("[{}] Session ended", session_id);
    }

    async fn handle_text(&self, session_id: SessionId, text: &str) {
        let request: ClientRequest = match serde_json::from_str(text) {
            Ok(r) => r,
            Err(e) => {
                debug!("[{}] Rejected message: {}", session_id, e);
                self.bridge.clients().send_to(
                    session_id,
                    ServerMessage::error(ErrorCode::InvalidMessage, format!("Invalid JSON: {}", e)),
                );
                return;
            }
        };

        debug!("[{}] Received: {:?}", session_id, request);
        self.bridge.handle_request(session_id, request).await;
    }
}
