use axum::{
    extract::Extension,
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::auth::middleware::{auth_middleware, require_admin};
use crate::notification::controller::{
    create_notification, delete_notification, list_notifications, mark_all_as_read, mark_as_read,
    unread_count,
};
use crate::notification::service::NotificationService;
use crate::websocket::notifications::{ws_handler, NotificationState};

/// REST endpoints plus the feed WebSocket
pub fn routes(service: Arc<NotificationService>, state: Arc<NotificationState>) -> Router {
    let rest = Router::new()
        .route("/api/notifications", get(list_notifications))
        // Manual creation is an administrative action
        .route(
            "/api/notifications",
            post(create_notification).route_layer(middleware::from_fn(require_admin)),
        )
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", post(mark_all_as_read))
        .route("/api/notifications/:id/read", patch(mark_as_read))
        .route("/api/notifications/:id", delete(delete_notification))
        .route_layer(middleware::from_fn(auth_middleware))
        .layer(Extension(service));

    // The socket authenticates with a query token instead of a header
    let ws = Router::new()
        .route("/api/notifications/ws", get(ws_handler))
        .with_state(state);

    rest.merge(ws)
}
