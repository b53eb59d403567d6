use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    time,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::jwt::validate_token;
use crate::feed::{
    FeedConfig, FeedController, FeedSnapshot, HostError, HostNotifier, Navigator,
    NotificationPermission,
};
use crate::notification::model::{FeedFilter, NavigationTarget};
use crate::notification::service::NotificationService;

const OUTBOUND_BUFFER: usize = 100;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Query parameters for WebSocket connections
#[derive(Debug, Deserialize)]
pub struct WebSocketParams {
    token: Option<String>,
}

/// State shared by every feed session
pub struct NotificationState {
    pub service: NotificationService,
    pub feed_config: FeedConfig,
}

/// Commands a connected client may send
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    MarkRead { id: Uuid },
    MarkAllRead,
    Delete { id: Uuid },
    Open { id: Uuid },
    SetFilter { filter: FeedFilter },
    LoadMore,
    Reload,
    Permission { permission: NotificationPermission },
}

/// Messages pushed to the client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Snapshot(FeedSnapshot),
    SystemNotification { title: String, message: String },
    Navigate { target: NavigationTarget, path: String },
    Error { message: String },
}

impl ServerMessage {
    fn to_message(&self) -> Result<Message, serde_json::Error> {
        serde_json::to_string(self).map(Message::Text)
    }
}

/// Host side of a feed session: popups and navigation become socket messages
struct WsHost {
    outbound: mpsc::Sender<Message>,
    permission: Mutex<NotificationPermission>,
}

impl WsHost {
    fn new(outbound: mpsc::Sender<Message>) -> Self {
        Self {
            outbound,
            permission: Mutex::new(NotificationPermission::Default),
        }
    }

    fn set_permission(&self, permission: NotificationPermission) {
        *self.permission.lock().unwrap_or_else(PoisonError::into_inner) = permission;
    }

    fn push(&self, message: ServerMessage) -> Result<(), HostError> {
        let message = message
            .to_message()
            .map_err(|e| HostError::Rejected(e.to_string()))?;
        self.outbound.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => HostError::Rejected("outbound buffer full".to_string()),
            TrySendError::Closed(_) => HostError::Disconnected,
        })
    }
}

impl HostNotifier for WsHost {
    fn permission(&self) -> NotificationPermission {
        *self.permission.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn show(&self, title: &str, message: &str) -> Result<(), HostError> {
        self.push(ServerMessage::SystemNotification {
            title: title.to_string(),
            message: message.to_string(),
        })
    }
}

impl Navigator for WsHost {
    fn navigate(&self, target: &NavigationTarget) -> Result<(), HostError> {
        self.push(ServerMessage::Navigate {
            target: target.clone(),
            path: target.path(),
        })
    }
}

/// Handle an invalid socket connection (authentication failure)
async fn handle_invalid_socket(mut socket: WebSocket, error_message: String) {
    let reply = ServerMessage::Error {
        message: error_message,
    };
    match reply.to_message() {
        Ok(message) => {
            if let Err(e) = socket.send(message).await {
                error!("Error sending error message on WS: {}", e);
            }
        }
        Err(e) => error!("Failed to serialize WS error: {}", e),
    }

    let _ = socket.close().await;
}

/// Applies one client command; returns a reply for the client, if any
async fn handle_command(feed: &FeedController, host: &WsHost, text: &str) -> Option<ServerMessage> {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            debug!("Unparseable feed command: {}", e);
            return Some(ServerMessage::Error {
                message: format!("Invalid command: {}", e),
            });
        }
    };

    match command {
        ClientCommand::MarkRead { id } => {
            feed.mark_as_read(id).await;
        }
        ClientCommand::MarkAllRead => {
            feed.mark_all_as_read().await;
        }
        ClientCommand::Delete { id } => {
            feed.delete(id).await;
        }
        ClientCommand::Open { id } => {
            if feed.open(id).await.is_none() {
                debug!("Opening notification {} produced no navigation", id);
            }
        }
        ClientCommand::SetFilter { filter } => feed.set_filter(filter),
        ClientCommand::LoadMore => {
            feed.load_more().await;
        }
        ClientCommand::Reload => feed.reload().await,
        ClientCommand::Permission { permission } => host.set_permission(permission),
    }
    None
}

async fn send(outbound: &mpsc::Sender<Message>, reply: ServerMessage) -> bool {
    match reply.to_message() {
        Ok(message) => outbound.send(message).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize feed message: {}", e);
            true
        }
    }
}

/// Runs one feed session until the client goes away
async fn handle_valid_connection(socket: WebSocket, user_id: Uuid, state: Arc<NotificationState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

    // Forward messages from channel to WebSocket
    let forward_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_sender.send(message).await {
                error!("Error forwarding message to WebSocket: {}", e);
                break;
            }
        }
    });

    let tx_heartbeat = tx.clone();
    let heartbeat_task = tokio::spawn(async move {
        let mut interval = time::interval(HEARTBEAT_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = tx_heartbeat.send(Message::Ping(vec![])).await {
                debug!("Stopping heartbeat: {}", e);
                break;
            }
        }
    });

    let host = Arc::new(WsHost::new(tx.clone()));
    let feed = FeedController::new(
        state.service.store(),
        state.service.channel(),
        host.clone(),
        host.clone(),
        state.feed_config,
    );
    let mut changes = feed.changes();

    feed.activate(user_id).await;
    changes.borrow_and_update();
    send(&tx, ServerMessage::Snapshot(feed.snapshot())).await;

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = handle_command(&feed, &host, &text).await {
                        if !send(&tx, reply).await {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("WebSocket closed by client");
                    break;
                }
                Some(Ok(Message::Pong(_))) => debug!("Received pong from client"),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    break;
                }
            },
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                changes.borrow_and_update();
                if !send(&tx, ServerMessage::Snapshot(feed.snapshot())).await {
                    break;
                }
            }
        }
    }

    feed.deactivate().await;
    forward_task.abort();
    heartbeat_task.abort();

    info!("WebSocket connection closed for user: {}", user_id);
}

/// Upgrades to a feed session; the JWT travels in the `token` query parameter
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WebSocketParams>,
    State(state): State<Arc<NotificationState>>,
) -> impl IntoResponse {
    let token = params.token.unwrap_or_default();

    let user_id = match validate_token(&token).and_then(|claims| claims.user_id()) {
        Ok(user_id) => user_id,
        Err(e) => {
            let error_message = format!("Invalid token: {}", e);
            return ws.on_upgrade(move |socket| async move {
                handle_invalid_socket(socket, error_message).await;
            });
        }
    };

    info!("User {} connected to notifications WebSocket", user_id);
    ws.on_upgrade(move |socket| async move {
        handle_valid_connection(socket, user_id, state).await;
    })
}
