use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::notification::model::{
    CreateNotificationRequest, ListQuery, MarkAllReadResponse, NotificationError,
    NotificationErrorResponse, NotificationListResponse, UnreadCountResponse,
};
use crate::notification::service::NotificationService;

type ErrorReply = (StatusCode, Json<NotificationErrorResponse>);

fn notification_error_to_response(err: NotificationError) -> ErrorReply {
    let (status, error_message, code) = match err {
        NotificationError::DatabaseError(e) => {
            error!("Database error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                "DB_ERROR",
            )
        }
        NotificationError::SerializationError(e) => {
            error!("Serialization error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process notification data".to_string(),
                "SERIALIZATION_ERROR",
            )
        }
        NotificationError::NotFound => (
            StatusCode::NOT_FOUND,
            "Notification not found".to_string(),
            "NOT_FOUND",
        ),
        NotificationError::InvalidType(t) => (
            StatusCode::BAD_REQUEST,
            format!("Unknown notification type: {}", t),
            "INVALID_TYPE",
        ),
        NotificationError::ValidationError(message) => {
            (StatusCode::BAD_REQUEST, message, "VALIDATION_ERROR")
        }
        NotificationError::InternalError(e) => {
            error!("Internal error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "INTERNAL_SERVER_ERROR",
            )
        }
    };

    (
        status,
        Json(NotificationErrorResponse {
            error: error_message,
            code: code.to_string(),
        }),
    )
}

/// List the caller's notifications, newest first
#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = "notifications",
    params(
        ("type" = Option<NotificationType>, Query, description = "Only notifications of this type"),
        ("is_read" = Option<bool>, Query, description = "Filter by read state"),
        ("limit" = Option<i64>, Query, description = "Page size, 1 to 100", example = "20"),
        ("offset" = Option<i64>, Query, description = "Rows to skip", example = "0")
    ),
    responses(
        (status = 200, description = "Notifications retrieved", body = NotificationListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error", body = NotificationErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_notifications(
    Extension(user): Extension<AuthUser>,
    Extension(service): Extension<Arc<NotificationService>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<NotificationListResponse>, ErrorReply> {
    let notifications = service
        .list(user.user_id, &query)
        .await
        .map_err(notification_error_to_response)?;

    Ok(Json(NotificationListResponse {
        notifications,
        limit: query.effective_limit(),
        offset: query.effective_offset(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/notifications/unread-count",
    tag = "notifications",
    responses(
        (status = 200, description = "Unread count", body = UnreadCountResponse),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error", body = NotificationErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn unread_count(
    Extension(user): Extension<AuthUser>,
    Extension(service): Extension<Arc<NotificationService>>,
) -> Result<Json<UnreadCountResponse>, ErrorReply> {
    let unread_count = service
        .unread_count(user.user_id)
        .await
        .map_err(notification_error_to_response)?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

#[utoipa::path(
    patch,
    path = "/api/notifications/{id}/read",
    tag = "notifications",
    params(
        ("id" = UuidWrapper, Path, description = "Notification id")
    ),
    responses(
        (status = 204, description = "Marked as read"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not found or not yours", body = NotificationErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn mark_as_read(
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Extension(service): Extension<Arc<NotificationService>>,
) -> Result<StatusCode, ErrorReply> {
    service
        .mark_as_read(user.user_id, id)
        .await
        .map_err(notification_error_to_response)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/notifications/read-all",
    tag = "notifications",
    responses(
        (status = 200, description = "All notifications marked as read", body = MarkAllReadResponse),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error", body = NotificationErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn mark_all_as_read(
    Extension(user): Extension<AuthUser>,
    Extension(service): Extension<Arc<NotificationService>>,
) -> Result<Json<MarkAllReadResponse>, ErrorReply> {
    let updated = service
        .mark_all_as_read(user.user_id)
        .await
        .map_err(notification_error_to_response)?;
    info!("Marked {} notifications read for {}", updated, user.user_id);
    Ok(Json(MarkAllReadResponse { updated }))
}

#[utoipa::path(
    delete,
    path = "/api/notifications/{id}",
    tag = "notifications",
    params(
        ("id" = UuidWrapper, Path, description = "Notification id")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not found or not yours", body = NotificationErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_notification(
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Extension(service): Extension<Arc<NotificationService>>,
) -> Result<StatusCode, ErrorReply> {
    service
        .delete(user.user_id, id)
        .await
        .map_err(notification_error_to_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create a notification for any recipient (admin only)
#[utoipa::path(
    post,
    path = "/api/notifications",
    tag = "notifications",
    request_body = CreateNotificationRequest,
    responses(
        (status = 201, description = "Notification created and pushed", body = Notification),
        (status = 400, description = "Invalid input", body = NotificationErrorResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_notification(
    Extension(user): Extension<AuthUser>,
    Extension(service): Extension<Arc<NotificationService>>,
    Json(request): Json<CreateNotificationRequest>,
) -> impl IntoResponse {
    info!(
        "Admin {} creating notification for {}",
        user.user_id, request.recipient_id
    );

    match service.create_manual(request).await {
        Ok(notification) => (StatusCode::CREATED, Json(notification)).into_response(),
        Err(e) => notification_error_to_response(e).into_response(),
    }
}
