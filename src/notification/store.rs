use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use crate::notification::model::{
    ListQuery, NewNotification, Notification, NotificationError, NotificationRow,
};

/// Durable notification collection, one logical inbox per recipient
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Newest-first page of a recipient's notifications
    async fn list(
        &self,
        recipient_id: Uuid,
        query: &ListQuery,
    ) -> Result<Vec<Notification>, NotificationError>;

    async fn count(&self, recipient_id: Uuid, is_read: Option<bool>)
        -> Result<i64, NotificationError>;

    async fn set_read(&self, recipient_id: Uuid, id: Uuid) -> Result<(), NotificationError>;

    /// Flips every unread notification of the recipient, returning how many changed
    async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64, NotificationError>;

    async fn delete(&self, recipient_id: Uuid, id: Uuid) -> Result<(), NotificationError>;

    async fn insert(&self, notification: NewNotification)
        -> Result<Notification, NotificationError>;
}

#[derive(Debug, Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn list(
        &self,
        recipient_id: Uuid,
        query: &ListQuery,
    ) -> Result<Vec<Notification>, NotificationError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, recipient_id, notification_type, title, message, data,
                   is_read, is_email_sent, created_at, updated_at
            FROM jobboard.notifications
            WHERE recipient_id = $1
              AND ($2::text IS NULL OR notification_type = $2)
              AND ($3::boolean IS NULL OR is_read = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(recipient_id)
        .bind(query.notification_type.map(|t| t.as_str()))
        .bind(query.is_read)
        .bind(query.effective_limit())
        .bind(query.effective_offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to list notifications for {}: {}", recipient_id, e);
            NotificationError::DatabaseError(e)
        })?;

        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn count(
        &self,
        recipient_id: Uuid,
        is_read: Option<bool>,
    ) -> Result<i64, NotificationError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM jobboard.notifications
            WHERE recipient_id = $1 AND ($2::boolean IS NULL OR is_read = $2)
            "#,
        )
        .bind(recipient_id)
        .bind(is_read)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn set_read(&self, recipient_id: Uuid, id: Uuid) -> Result<(), NotificationError> {
        // is_read never goes back to false, so already-read rows still count as found
        let result = sqlx::query(
            r#"
            UPDATE jobboard.notifications
            SET is_read = true,
                updated_at = CASE WHEN is_read THEN updated_at ELSE NOW() END
            WHERE id = $1 AND recipient_id = $2
            "#,
        )
        .bind(id)
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(NotificationError::NotFound);
        }
        Ok(())
    }

    async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64, NotificationError> {
        let result = sqlx::query(
            r#"
            UPDATE jobboard.notifications
            SET is_read = true, updated_at = NOW()
            WHERE recipient_id = $1 AND is_read = false
            "#,
        )
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;

        info!(
            "Marked {} notifications as read for {}",
            result.rows_affected(),
            recipient_id
        );
        Ok(result.rows_affected())
    }

    async fn delete(&self, recipient_id: Uuid, id: Uuid) -> Result<(), NotificationError> {
        let result =
            sqlx::query("DELETE FROM jobboard.notifications WHERE id = $1 AND recipient_id = $2")
                .bind(id)
                .bind(recipient_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(NotificationError::NotFound);
        }
        Ok(())
    }

    async fn insert(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, NotificationError> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            INSERT INTO jobboard.notifications (
                id, recipient_id, notification_type, title, message, data,
                is_read, is_email_sent, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, false, false, NOW(), NOW())
            RETURNING id, recipient_id, notification_type, title, message, data,
                      is_read, is_email_sent, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(notification.recipient_id)
        .bind(notification.notification_type.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.data)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to insert notification: {}", e);
            NotificationError::DatabaseError(e)
        })?;

        Notification::try_from(row)
    }
}
