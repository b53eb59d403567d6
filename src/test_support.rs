//! In-memory stores and fixtures shared by the unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::application::model::{
    Application, ApplicationError, ApplicationStatus, InvalidTransition, Job, NewApplication,
};
use crate::application::store::ApplicationStore;
use crate::notification::model::{
    ListQuery, NewNotification, Notification, NotificationError, NotificationType,
};
use crate::notification::store::NotificationStore;

pub fn sample_notification(recipient_id: Uuid) -> Notification {
    sample_notification_at(recipient_id, Utc::now())
}

pub fn sample_notification_at(recipient_id: Uuid, created_at: DateTime<Utc>) -> Notification {
    Notification {
        id: Uuid::new_v4(),
        recipient_id,
        notification_type: NotificationType::NewApplication,
        title: "New application".to_string(),
        message: "Someone applied to your job".to_string(),
        data: json!({ "job_id": Uuid::new_v4().to_string() }),
        is_read: false,
        is_email_sent: false,
        created_at,
        updated_at: created_at,
    }
}

pub fn sample_job(employer_id: Uuid) -> Job {
    Job {
        id: Uuid::new_v4(),
        employer_id,
        title: "Senior Rust Engineer".to_string(),
        application_deadline: None,
    }
}

#[derive(Default)]
pub struct InMemoryNotificationStore {
    rows: Mutex<Vec<Notification>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `read + unread` notifications, one minute apart, newest unread first
    pub fn seed(&self, recipient_id: Uuid, unread: usize, read: usize) -> Vec<Notification> {
        let now = Utc::now();
        let seeded: Vec<Notification> = (0..unread + read)
            .map(|i| {
                let mut n = sample_notification_at(
                    recipient_id,
                    now - ChronoDuration::minutes(i as i64 + 1),
                );
                n.is_read = i >= unread;
                n
            })
            .collect();
        self.rows.lock().unwrap().extend(seeded.iter().cloned());
        seeded
    }

    pub fn push(&self, notification: Notification) {
        self.rows.lock().unwrap().push(notification);
    }

    pub fn unread(&self, recipient_id: Uuid) -> i64 {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.recipient_id == recipient_id && !n.is_read)
            .count() as i64
    }

    pub fn all(&self, recipient_id: Uuid) -> Vec<Notification> {
        let mut rows: Vec<Notification> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> Result<(), NotificationError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(NotificationError::InternalError("read unavailable".into()));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<(), NotificationError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(NotificationError::InternalError("write unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn list(
        &self,
        recipient_id: Uuid,
        query: &ListQuery,
    ) -> Result<Vec<Notification>, NotificationError> {
        self.check_reads()?;
        Ok(self
            .all(recipient_id)
            .into_iter()
            .filter(|n| query.matches(n))
            .skip(query.effective_offset() as usize)
            .take(query.effective_limit() as usize)
            .collect())
    }

    async fn count(
        &self,
        recipient_id: Uuid,
        is_read: Option<bool>,
    ) -> Result<i64, NotificationError> {
        self.check_reads()?;
        Ok(self
            .all(recipient_id)
            .iter()
            .filter(|n| is_read.map_or(true, |r| n.is_read == r))
            .count() as i64)
    }

    async fn set_read(&self, recipient_id: Uuid, id: Uuid) -> Result<(), NotificationError> {
        self.check_writes()?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|n| n.id == id && n.recipient_id == recipient_id)
            .ok_or(NotificationError::NotFound)?;
        row.is_read = true;
        Ok(())
    }

    async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64, NotificationError> {
        self.check_writes()?;
        let mut updated = 0;
        for row in self
            .rows
            .lock()
            .unwrap()
            .iter_mut()
            .filter(|n| n.recipient_id == recipient_id && !n.is_read)
        {
            row.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete(&self, recipient_id: Uuid, id: Uuid) -> Result<(), NotificationError> {
        self.check_writes()?;
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|n| !(n.id == id && n.recipient_id == recipient_id));
        if rows.len() == before {
            return Err(NotificationError::NotFound);
        }
        Ok(())
    }

    async fn insert(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, NotificationError> {
        self.check_writes()?;
        let now = Utc::now();
        let inserted = Notification {
            id: Uuid::new_v4(),
            recipient_id: notification.recipient_id,
            notification_type: notification.notification_type,
            title: notification.title,
            message: notification.message,
            data: notification.data,
            is_read: false,
            is_email_sent: false,
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().unwrap().push(inserted.clone());
        Ok(inserted)
    }
}

#[derive(Default)]
pub struct InMemoryApplicationStore {
    applications: Mutex<HashMap<Uuid, Application>>,
    jobs: Mutex<HashMap<Uuid, Job>>,
    fail_updates: AtomicBool,
    lookup_delay: Mutex<Option<Duration>>,
    update_gate: Mutex<Option<Arc<Notify>>>,
    parked_updates: AtomicUsize,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_job(&self, job: Job) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }

    pub fn insert_with_status(
        &self,
        applicant_id: Uuid,
        job_id: Uuid,
        status: ApplicationStatus,
    ) -> Application {
        let now = Utc::now();
        let application = Application {
            id: Uuid::new_v4(),
            job_id,
            applicant_id,
            status,
            cover_letter: None,
            resume_url: None,
            expected_salary: None,
            availability: None,
            applied_at: now,
            updated_at: now,
        };
        self.applications
            .lock()
            .unwrap()
            .insert(application.id, application.clone());
        application
    }

    pub fn status_of(&self, id: Uuid) -> Option<ApplicationStatus> {
        self.applications.lock().unwrap().get(&id).map(|a| a.status)
    }

    /// Applications for the pair that are not withdrawn
    pub fn active_count(&self, applicant_id: Uuid, job_id: Uuid) -> usize {
        self.applications
            .lock()
            .unwrap()
            .values()
            .filter(|a| {
                a.applicant_id == applicant_id
                    && a.job_id == job_id
                    && a.status != ApplicationStatus::Withdrawn
            })
            .count()
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn set_lookup_delay(&self, delay: Duration) {
        *self.lookup_delay.lock().unwrap() = Some(delay);
    }

    /// Parks every `update_status` call until the returned handle is notified
    pub fn hold_updates(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.update_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Resolves once `count` updates have reached the gate set by `hold_updates`
    pub async fn wait_for_parked(&self, count: usize) {
        while self.parked_updates.load(Ordering::SeqCst) < count {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, ApplicationError> {
        Ok(self.jobs.lock().unwrap().get(&job_id).cloned())
    }

    async fn get_application(
        &self,
        applicant_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<Application>, ApplicationError> {
        let delay = *self.lookup_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .applications
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.applicant_id == applicant_id && a.job_id == job_id)
            .max_by_key(|a| a.applied_at)
            .cloned())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Application>, ApplicationError> {
        Ok(self.applications.lock().unwrap().get(&id).cloned())
    }

    async fn create(&self, application: NewApplication) -> Result<Application, ApplicationError> {
        // Mirrors the partial unique index on (job_id, applicant_id)
        if self.active_count(application.applicant_id, application.job_id) > 0 {
            return Err(ApplicationError::AlreadyApplied);
        }
        let now = Utc::now();
        let created = Application {
            id: Uuid::new_v4(),
            job_id: application.job_id,
            applicant_id: application.applicant_id,
            status: ApplicationStatus::Submitted,
            cover_letter: application.submission.cover_letter,
            resume_url: application.submission.resume_url,
            expected_salary: application.submission.expected_salary,
            availability: application.submission.availability,
            applied_at: now,
            updated_at: now,
        };
        self.applications
            .lock()
            .unwrap()
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<(), ApplicationError> {
        let gate = self.update_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.parked_updates.fetch_add(1, Ordering::SeqCst);
            gate.notified().await;
        }
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(ApplicationError::InternalError("write unavailable".into()));
        }
        let mut applications = self.applications.lock().unwrap();
        let application = applications.get_mut(&id).ok_or(ApplicationError::NotFound)?;
        // Same compare-and-set as the conditional UPDATE in Postgres
        if application.status != from {
            return Err(ApplicationError::InvalidTransition(InvalidTransition {
                from: application.status,
                to,
            }));
        }
        application.status = to;
        application.updated_at = Utc::now();
        Ok(())
    }
}
