use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Default number of notifications fetched per feed page
pub const DEFAULT_PAGE_SIZE: i64 = 20;
/// Upper bound for a single page requested over the REST API
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    NewApplication,
    InterviewReminder,
    StatusChange,
    SystemUpdate,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::NewApplication => "new_application",
            NotificationType::InterviewReminder => "interview_reminder",
            NotificationType::StatusChange => "status_change",
            NotificationType::SystemUpdate => "system_update",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = NotificationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "new_application" => Ok(NotificationType::NewApplication),
            "interview_reminder" => Ok(NotificationType::InterviewReminder),
            "status_change" => Ok(NotificationType::StatusChange),
            "system_update" => Ok(NotificationType::SystemUpdate),
            other => Err(NotificationError::InvalidType(other.to_string())),
        }
    }
}

/// A notification delivered to a single recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    #[schema(value_type = UuidWrapper)]
    pub id: Uuid,
    #[schema(value_type = UuidWrapper)]
    pub recipient_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    #[schema(example = "New application received")]
    pub title: String,
    #[schema(example = "Jane Doe applied for Senior Rust Engineer")]
    pub message: String,
    /// Payload whose shape depends on `type`, e.g. `{"job_id": "..."}`
    #[schema(value_type = Object)]
    pub data: Value,
    pub is_read: bool,
    pub is_email_sent: bool,
    #[schema(value_type = DateTimeWrapper)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = DateTimeWrapper)]
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// Where clicking this notification should take the user.
    ///
    /// Returns `None` when the type requires a data field that is missing.
    pub fn navigation_target(&self) -> Option<NavigationTarget> {
        match self.notification_type {
            NotificationType::NewApplication => data_field(&self.data, "job_id")
                .map(|job_id| NavigationTarget::JobApplications { job_id }),
            NotificationType::InterviewReminder => data_field(&self.data, "interview_id")
                .map(|interview_id| NavigationTarget::Interview { interview_id }),
            NotificationType::StatusChange => data_field(&self.data, "application_id")
                .map(|application_id| NavigationTarget::Application { application_id }),
            NotificationType::SystemUpdate => Some(NavigationTarget::Dashboard),
        }
    }
}

// Ids arrive either as strings or as bare numbers depending on the writer
fn data_field(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Database row for a notification
#[derive(Debug, FromRow)]
pub struct NotificationRow {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub data: Value,
    pub is_read: bool,
    pub is_email_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = NotificationError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            recipient_id: row.recipient_id,
            notification_type: row.notification_type.parse()?,
            title: row.title,
            message: row.message,
            data: row.data,
            is_read: row.is_read,
            is_email_sent: row.is_email_sent,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Input for the insert path
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub data: Value,
}

/// Filters accepted by `list`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub notification_type: Option<NotificationType>,
    pub is_read: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    pub fn page(limit: i64, offset: i64) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
            ..Default::default()
        }
    }

    /// Limit clamped to `1..=MAX_PAGE_SIZE`, defaulting to one feed page
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    pub fn matches(&self, notification: &Notification) -> bool {
        self.notification_type
            .map_or(true, |t| t == notification.notification_type)
            && self.is_read.map_or(true, |r| r == notification.is_read)
    }
}

/// Which part of the feed is visible
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FeedFilter {
    #[default]
    All,
    Unread,
}

impl FeedFilter {
    pub fn accepts(&self, notification: &Notification) -> bool {
        match self {
            FeedFilter::All => true,
            FeedFilter::Unread => !notification.is_read,
        }
    }
}

/// Navigation intent produced by opening a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NavigationTarget {
    JobApplications { job_id: String },
    Interview { interview_id: String },
    Application { application_id: String },
    Dashboard,
}

impl NavigationTarget {
    pub fn path(&self) -> String {
        match self {
            NavigationTarget::JobApplications { job_id } => {
                format!("/dashboard/jobs/{}/applications", job_id)
            }
            NavigationTarget::Interview { interview_id } => {
                format!("/dashboard/interviews/{}", interview_id)
            }
            NavigationTarget::Application { application_id } => {
                format!("/dashboard/applications/{}", application_id)
            }
            NavigationTarget::Dashboard => "/dashboard".to_string(),
        }
    }
}

/// Request body for manual notification creation
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CreateNotificationRequest {
    #[schema(value_type = UuidWrapper)]
    pub recipient_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    #[schema(example = "Scheduled maintenance")]
    pub title: String,
    #[schema(example = "The job board will be read-only tonight from 22:00 UTC")]
    pub message: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Value,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
    #[schema(example = "20")]
    pub limit: i64,
    #[schema(example = "0")]
    pub offset: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UnreadCountResponse {
    #[schema(example = "3")]
    pub unread_count: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MarkAllReadResponse {
    #[schema(example = "3")]
    pub updated: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Notification not found")]
    NotFound,

    #[error("Unknown notification type: {0}")]
    InvalidType(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Error body returned by notification endpoints
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NotificationErrorResponse {
    #[schema(example = "Notification not found")]
    pub error: String,
    #[schema(example = "NOT_FOUND")]
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notification(notification_type: NotificationType, data: Value) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            notification_type,
            title: "title".to_string(),
            message: "message".to_string(),
            data,
            is_read: false,
            is_email_sent: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_navigation_targets_by_type() {
        let n = notification(NotificationType::NewApplication, json!({ "job_id": "j-1" }));
        assert_eq!(
            n.navigation_target(),
            Some(NavigationTarget::JobApplications {
                job_id: "j-1".to_string()
            })
        );

        let n = notification(NotificationType::InterviewReminder, json!({ "interview_id": 42 }));
        assert_eq!(
            n.navigation_target(),
            Some(NavigationTarget::Interview {
                interview_id: "42".to_string()
            })
        );

        let n = notification(NotificationType::StatusChange, json!({ "application_id": "a-9" }));
        assert_eq!(
            n.navigation_target().map(|t| t.path()),
            Some("/dashboard/applications/a-9".to_string())
        );

        let n = notification(NotificationType::SystemUpdate, json!({}));
        assert_eq!(n.navigation_target(), Some(NavigationTarget::Dashboard));
    }

    #[test]
    fn test_navigation_target_missing_field() {
        let n = notification(NotificationType::NewApplication, json!({ "interview_id": "x" }));
        assert_eq!(n.navigation_target(), None);

        let n = notification(NotificationType::StatusChange, Value::Null);
        assert_eq!(n.navigation_target(), None);
    }

    #[test]
    fn test_notification_type_wire_names() {
        for t in [
            NotificationType::NewApplication,
            NotificationType::InterviewReminder,
            NotificationType::StatusChange,
            NotificationType::SystemUpdate,
        ] {
            assert_eq!(t.as_str().parse::<NotificationType>().unwrap(), t);
        }
        assert!("comment_reply".parse::<NotificationType>().is_err());

        let n = notification(NotificationType::StatusChange, json!({}));
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains(r#""type":"status_change""#));
    }

    #[test]
    fn test_list_query_limits() {
        let query = ListQuery::default();
        assert_eq!(query.effective_limit(), DEFAULT_PAGE_SIZE);
        assert_eq!(query.effective_offset(), 0);

        let query = ListQuery {
            limit: Some(5000),
            offset: Some(-3),
            ..Default::default()
        };
        assert_eq!(query.effective_limit(), MAX_PAGE_SIZE);
        assert_eq!(query.effective_offset(), 0);
    }

    #[test]
    fn test_feed_filter() {
        let mut n = notification(NotificationType::SystemUpdate, json!({}));
        assert!(FeedFilter::Unread.accepts(&n));
        n.is_read = true;
        assert!(!FeedFilter::Unread.accepts(&n));
        assert!(FeedFilter::All.accepts(&n));
    }
}
