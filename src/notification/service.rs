use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::model::{Application, ApplicationStatus, Job};
use crate::notification::model::{
    CreateNotificationRequest, ListQuery, NewNotification, Notification, NotificationError,
    NotificationType,
};
use crate::notification::store::NotificationStore;
use crate::realtime::RealtimeChannel;

const MAX_TITLE_LENGTH: usize = 200;
const MAX_MESSAGE_LENGTH: usize = 2000;

/// Write path for notifications: persist, then push to live subscribers
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    channel: Arc<dyn RealtimeChannel>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn NotificationStore>, channel: Arc<dyn RealtimeChannel>) -> Self {
        Self { store, channel }
    }

    pub fn store(&self) -> Arc<dyn NotificationStore> {
        self.store.clone()
    }

    pub fn channel(&self) -> Arc<dyn RealtimeChannel> {
        self.channel.clone()
    }

    /// Inserts a notification and publishes the stored record.
    ///
    /// A failed publish is logged only; the row is durable and will show up
    /// on the recipient's next load.
    pub async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, NotificationError> {
        info!(
            "Creating notification for recipient {} of type {}",
            notification.recipient_id, notification.notification_type
        );

        let stored = self.store.insert(notification).await?;

        if let Err(e) = self.channel.publish(&stored).await {
            warn!(
                "Notification {} stored but not pushed to {}: {}",
                stored.id, stored.recipient_id, e
            );
        }

        Ok(stored)
    }

    /// Administrative creation; title and message are HTML-escaped
    pub async fn create_manual(
        &self,
        request: CreateNotificationRequest,
    ) -> Result<Notification, NotificationError> {
        let title = request.title.trim();
        let message = request.message.trim();

        if title.is_empty() || title.len() > MAX_TITLE_LENGTH {
            return Err(NotificationError::ValidationError(format!(
                "title must be between 1 and {} characters",
                MAX_TITLE_LENGTH
            )));
        }
        if message.is_empty() || message.len() > MAX_MESSAGE_LENGTH {
            return Err(NotificationError::ValidationError(format!(
                "message must be between 1 and {} characters",
                MAX_MESSAGE_LENGTH
            )));
        }
        let data = if request.data.is_null() {
            json!({})
        } else if request.data.is_object() {
            request.data
        } else {
            return Err(NotificationError::ValidationError(
                "data must be a JSON object".to_string(),
            ));
        };

        self.create_notification(NewNotification {
            recipient_id: request.recipient_id,
            notification_type: request.notification_type,
            title: html_escape::encode_safe(title).to_string(),
            message: html_escape::encode_safe(message).to_string(),
            data,
        })
        .await
    }

    /// Tells the employer that someone applied to their job
    pub async fn notify_new_application(&self, job: &Job, application: &Application) {
        let notification = NewNotification {
            recipient_id: job.employer_id,
            notification_type: NotificationType::NewApplication,
            title: "New application received".to_string(),
            message: format!("A candidate applied for {}", job.title),
            data: json!({
                "job_id": job.id.to_string(),
                "application_id": application.id.to_string(),
            }),
        };

        if let Err(e) = self.create_notification(notification).await {
            error!(
                "Failed to notify employer {} about application {}: {:?}",
                job.employer_id, application.id, e
            );
        }
    }

    /// Tells `recipient_id` that an application moved to `status`
    pub async fn notify_status_change(
        &self,
        recipient_id: Uuid,
        job: &Job,
        application: &Application,
        status: ApplicationStatus,
    ) {
        let message = match status {
            ApplicationStatus::Withdrawn => {
                format!("A candidate withdrew their application for {}", job.title)
            }
            _ => format!(
                "Your application for {} is now: {}",
                job.title,
                status.label()
            ),
        };
        let notification = NewNotification {
            recipient_id,
            notification_type: NotificationType::StatusChange,
            title: "Application status updated".to_string(),
            message,
            data: json!({
                "application_id": application.id.to_string(),
                "job_id": job.id.to_string(),
                "status": status.as_str(),
            }),
        };

        if let Err(e) = self.create_notification(notification).await {
            error!(
                "Failed to notify {} about status of application {}: {:?}",
                recipient_id, application.id, e
            );
        }
    }

    pub async fn list(
        &self,
        recipient_id: Uuid,
        query: &ListQuery,
    ) -> Result<Vec<Notification>, NotificationError> {
        self.store.list(recipient_id, query).await
    }

    pub async fn unread_count(&self, recipient_id: Uuid) -> Result<i64, NotificationError> {
        self.store.count(recipient_id, Some(false)).await
    }

    pub async fn mark_as_read(&self, recipient_id: Uuid, id: Uuid) -> Result<(), NotificationError> {
        info!("Marking notification {} as read", id);
        self.store.set_read(recipient_id, id).await
    }

    pub async fn mark_all_as_read(&self, recipient_id: Uuid) -> Result<u64, NotificationError> {
        self.store.mark_all_read(recipient_id).await
    }

    pub async fn delete(&self, recipient_id: Uuid, id: Uuid) -> Result<(), NotificationError> {
        info!("Deleting notification {} for {}", id, recipient_id);
        self.store.delete(recipient_id, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::BroadcastChannel;
    use crate::test_support::{sample_job, InMemoryNotificationStore};
    use serde_json::Value;
    use std::time::Duration;
    use tokio::time::timeout;

    fn service() -> (Arc<InMemoryNotificationStore>, Arc<BroadcastChannel>, NotificationService) {
        let store = Arc::new(InMemoryNotificationStore::new());
        let channel = Arc::new(BroadcastChannel::new());
        let service = NotificationService::new(store.clone(), channel.clone());
        (store, channel, service)
    }

    #[tokio::test]
    async fn test_create_persists_and_publishes() {
        let (store, channel, service) = service();
        let recipient = Uuid::new_v4();
        let mut sub = channel.subscribe(recipient).await.unwrap();

        let created = service
            .create_notification(NewNotification {
                recipient_id: recipient,
                notification_type: NotificationType::InterviewReminder,
                title: "Interview tomorrow".to_string(),
                message: "10:00 with the platform team".to_string(),
                data: json!({ "interview_id": "int-1" }),
            })
            .await
            .unwrap();

        assert_eq!(store.unread(recipient), 1);
        let pushed = timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pushed, created);
    }

    #[tokio::test]
    async fn test_manual_creation_escapes_html() {
        let (store, _channel, service) = service();
        let recipient = Uuid::new_v4();

        let created = service
            .create_manual(CreateNotificationRequest {
                recipient_id: recipient,
                notification_type: NotificationType::SystemUpdate,
                title: "<b>Maintenance</b>".to_string(),
                message: "Read-only tonight".to_string(),
                data: Value::Null,
            })
            .await
            .unwrap();

        assert_eq!(created.title, "&lt;b&gt;Maintenance&lt;/b&gt;");
        assert_eq!(created.data, json!({}));
        assert_eq!(store.all(recipient).len(), 1);
    }

    #[tokio::test]
    async fn test_manual_creation_validates_input() {
        let (_store, _channel, service) = service();

        let result = service
            .create_manual(CreateNotificationRequest {
                recipient_id: Uuid::new_v4(),
                notification_type: NotificationType::SystemUpdate,
                title: "   ".to_string(),
                message: "body".to_string(),
                data: Value::Null,
            })
            .await;
        assert!(matches!(result, Err(NotificationError::ValidationError(_))));

        let result = service
            .create_manual(CreateNotificationRequest {
                recipient_id: Uuid::new_v4(),
                notification_type: NotificationType::SystemUpdate,
                title: "title".to_string(),
                message: "body".to_string(),
                data: json!([1, 2]),
            })
            .await;
        assert!(matches!(result, Err(NotificationError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_status_change_payload_routes_to_application() {
        let (store, _channel, service) = service();
        let employer = Uuid::new_v4();
        let applicant = Uuid::new_v4();
        let job = sample_job(employer);
        let application = crate::test_support::InMemoryApplicationStore::new()
            .insert_with_status(applicant, job.id, ApplicationStatus::UnderReview);

        service
            .notify_status_change(applicant, &job, &application, ApplicationStatus::UnderReview)
            .await;

        let stored = store.all(applicant);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].notification_type, NotificationType::StatusChange);
        assert_eq!(
            stored[0].navigation_target().map(|t| t.path()),
            Some(format!("/dashboard/applications/{}", application.id))
        );
    }

    #[tokio::test]
    async fn test_trigger_failure_is_swallowed() {
        let (store, _channel, service) = service();
        store.set_fail_writes(true);
        let job = sample_job(Uuid::new_v4());
        let application = crate::test_support::InMemoryApplicationStore::new()
            .insert_with_status(Uuid::new_v4(), job.id, ApplicationStatus::Submitted);

        // Must not panic or propagate
        service.notify_new_application(&job, &application).await;
        assert_eq!(store.unread(job.employer_id), 0);
    }
}
