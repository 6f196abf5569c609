//! Fanout server implementation.
//!
//! Accepts WebSocket connections at `/ws`; clients join and leave per-poll
//! viewer groups and receive viewer counts and tally updates. The admission
//! pipeline's publisher posts one-shot tally notifications to `/emit`,
//! which relays them into the matching poll's broadcast. `/health` reports
//! process liveness only.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use livepoll_types::PollId;

use crate::groups::ViewerGroups;
use crate::protocol::{ClientMessage, EmitRequest, ServerEvent};

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// The fanout server, configured with a port and the shared group registry.
pub struct FanoutServer {
    pub port: u16,
    pub groups: Arc<ViewerGroups>,
}

impl FanoutServer {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            groups: Arc::new(ViewerGroups::new()),
        }
    }

    pub fn with_groups(port: u16, groups: Arc<ViewerGroups>) -> Self {
        Self { port, groups }
    }

    /// The axum router; exposed so the daemon can serve it with graceful
    /// shutdown, and so tests can drive it directly.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/emit", post(emit_handler))
            .route("/health", get(health_handler))
            .layer(tower_http::cors::CorsLayer::permissive())
            .with_state(self.groups.clone())
    }

    /// Serve until the shutdown channel fires.
    pub async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), FanoutError> {
        let addr = format!("0.0.0.0:{}", self.port);
        info!("fanout server listening on {}", addr);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;
        Ok(())
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Relay a tally notification from the admission pipeline into the poll's
/// broadcast. Polls nobody is watching are dropped silently.
async fn emit_handler(
    State(groups): State<Arc<ViewerGroups>>,
    Json(body): Json<EmitRequest>,
) -> impl IntoResponse {
    if body.kind != "tally_update" {
        return StatusCode::BAD_REQUEST;
    }
    let reached = groups.publish_tallies(&body.poll_id, body.counts);
    debug!(poll_id = %body.poll_id, reached, "relayed tally update");
    StatusCode::NO_CONTENT
}

/// Upgrade an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(groups): State<Arc<ViewerGroups>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, groups))
}

type WsSender = Arc<tokio::sync::Mutex<SplitSink<WebSocket, Message>>>;

/// Handle a single WebSocket connection.
///
/// For every joined poll a forwarder task reads the group's broadcast and
/// pushes events down the socket. Disconnection is an implicit leave from
/// every joined poll.
async fn handle_socket(socket: WebSocket, groups: Arc<ViewerGroups>) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(tokio::sync::Mutex::new(ws_sender));

    // Forwarder task per joined poll, aborted on leave/disconnect.
    let mut joined: HashMap<PollId, JoinHandle<()>> = HashMap::new();

    debug!("fanout client connected");

    while let Some(msg_result) = ws_receiver.next().await {
        let msg = match msg_result {
            Ok(msg) => msg,
            Err(e) => {
                warn!("fanout receive error: {}", e);
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                handle_client_message(&text, &groups, &mut joined, &ws_sender).await;
            }
            Message::Close(_) => {
                debug!("fanout client sent close frame");
                break;
            }
            Message::Ping(data) => {
                let mut sender = ws_sender.lock().await;
                let _ = sender.send(Message::Pong(data)).await;
            }
            _ => {}
        }
    }

    // Implicit leave from everything this connection was watching.
    for (poll_id, handle) in joined.drain() {
        handle.abort();
        let remaining = groups.leave(&poll_id);
        debug!(%poll_id, remaining, "viewer disconnected");
    }
    debug!("fanout client disconnected");
}

async fn handle_client_message(
    text: &str,
    groups: &Arc<ViewerGroups>,
    joined: &mut HashMap<PollId, JoinHandle<()>>,
    ws_sender: &WsSender,
) {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            send_event(
                ws_sender,
                &ServerEvent::Error {
                    message: format!("invalid message: {e}"),
                },
            )
            .await;
            return;
        }
    };

    match client_msg {
        ClientMessage::JoinPoll { poll_id } => {
            if joined.contains_key(&poll_id) {
                return; // Already watching; joins are not stacked.
            }
            let (rx, count) = groups.join(&poll_id);
            debug!(%poll_id, count, "viewer joined");

            let sender = ws_sender.clone();
            let handle = tokio::spawn(async move {
                forward_events(rx, sender).await;
            });
            joined.insert(poll_id, handle);
        }
        ClientMessage::LeavePoll { poll_id } => {
            let Some(handle) = joined.remove(&poll_id) else {
                return; // Not watching this poll.
            };
            handle.abort();
            let remaining = groups.leave(&poll_id);
            debug!(%poll_id, remaining, "viewer left");
        }
    }
}

/// Forwarder task: reads group events and sends them to the client.
async fn forward_events(mut rx: broadcast::Receiver<ServerEvent>, ws_sender: WsSender) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("failed to encode fanout event: {}", e);
                        continue;
                    }
                };
                let mut sender = ws_sender.lock().await;
                if sender.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("fanout client lagged behind by {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("viewer group channel closed");
                break;
            }
        }
    }
}

async fn send_event(ws_sender: &WsSender, event: &ServerEvent) {
    if let Ok(payload) = serde_json::to_string(event) {
        let mut sender = ws_sender.lock().await;
        let _ = sender.send(Message::Text(payload)).await;
    }
}
