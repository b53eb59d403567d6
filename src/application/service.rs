use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::gate::{ApplyAffordance, LifecycleGate};
use crate::application::model::{
    Application, ApplicationError, ApplicationStatus, Job, NewApplication,
    SubmitApplicationRequest, WithdrawResponse,
};
use crate::application::store::ApplicationStore;
use crate::application::withdrawal::WithdrawalFlow;
use crate::notification::service::NotificationService;

/// Result of a withdraw request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawOutcome {
    /// Nothing changed yet; the caller must confirm after showing `warning`
    ConfirmationRequired {
        status: ApplicationStatus,
        warning: &'static str,
    },
    Withdrawn,
}

impl From<WithdrawOutcome> for WithdrawResponse {
    fn from(outcome: WithdrawOutcome) -> Self {
        match outcome {
            WithdrawOutcome::ConfirmationRequired { status, warning } => Self {
                status,
                confirmation_required: true,
                warning: warning.to_string(),
            },
            WithdrawOutcome::Withdrawn => Self {
                status: ApplicationStatus::Withdrawn,
                confirmation_required: false,
                warning: String::new(),
            },
        }
    }
}

/// Server side of the application lifecycle
#[derive(Clone)]
pub struct ApplicationService {
    store: Arc<dyn ApplicationStore>,
    gate: LifecycleGate,
    notifications: NotificationService,
}

impl ApplicationService {
    pub fn new(store: Arc<dyn ApplicationStore>, notifications: NotificationService) -> Self {
        Self {
            gate: LifecycleGate::new(store.clone()),
            store,
            notifications,
        }
    }

    async fn job(&self, job_id: Uuid) -> Result<Job, ApplicationError> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or(ApplicationError::JobNotFound)
    }

    async fn application(&self, id: Uuid) -> Result<Application, ApplicationError> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or(ApplicationError::NotFound)
    }

    pub async fn eligibility(
        &self,
        applicant_id: Uuid,
        job_id: Uuid,
    ) -> Result<ApplyAffordance, ApplicationError> {
        let job = self.job(job_id).await?;
        Ok(self.gate.check(applicant_id, &job, Utc::now()).await)
    }

    /// Creates an application if the gate says `eligible`, then tells the employer
    pub async fn submit(
        &self,
        applicant_id: Uuid,
        job_id: Uuid,
        submission: SubmitApplicationRequest,
    ) -> Result<Application, ApplicationError> {
        let job = self.job(job_id).await?;

        match self.gate.check(applicant_id, &job, Utc::now()).await {
            ApplyAffordance::Eligible => {}
            ApplyAffordance::AlreadyApplied => return Err(ApplicationError::AlreadyApplied),
            ApplyAffordance::DeadlinePassed => return Err(ApplicationError::DeadlinePassed),
            ApplyAffordance::Checking => return Err(ApplicationError::EligibilityUnavailable),
        }

        // The store still rejects a concurrent duplicate
        let application = self
            .store
            .create(NewApplication {
                job_id,
                applicant_id,
                submission,
            })
            .await?;
        info!(
            "Applicant {} applied to job {} ({})",
            applicant_id, job_id, application.id
        );

        self.notifications
            .notify_new_application(&job, &application)
            .await;
        Ok(application)
    }

    /// Moves an application along the pipeline on behalf of the job's employer
    pub async fn update_status(
        &self,
        employer_id: Uuid,
        application_id: Uuid,
        status: ApplicationStatus,
    ) -> Result<Application, ApplicationError> {
        // Only the applicant may withdraw
        if status == ApplicationStatus::Withdrawn {
            return Err(ApplicationError::Forbidden);
        }

        let application = self.application(application_id).await?;
        let job = self.job(application.job_id).await?;
        if job.employer_id != employer_id {
            warn!(
                "User {} tried to update application {} on someone else's job",
                employer_id, application_id
            );
            return Err(ApplicationError::Forbidden);
        }

        let next = application.status.transition(status)?;
        self.store
            .update_status(application_id, application.status, next)
            .await?;
        info!(
            "Application {} moved from {} to {}",
            application_id, application.status, next
        );

        let updated = Application {
            status: next,
            updated_at: Utc::now(),
            ..application
        };
        self.notifications
            .notify_status_change(updated.applicant_id, &job, &updated, next)
            .await;
        Ok(updated)
    }

    /// Withdraws the caller's application.
    ///
    /// Without `confirm` this only returns the warning for the current
    /// status. With it, the status becomes `withdrawn` once the store accepts
    /// the write, and the employer is notified.
    pub async fn withdraw(
        &self,
        applicant_id: Uuid,
        application_id: Uuid,
        confirm: bool,
    ) -> Result<WithdrawOutcome, ApplicationError> {
        let application = self.application(application_id).await?;
        if application.applicant_id != applicant_id {
            return Err(ApplicationError::Forbidden);
        }

        let flow = WithdrawalFlow::new(self.store.clone());
        let warning = flow.request(&application)?;
        if !confirm {
            return Ok(WithdrawOutcome::ConfirmationRequired {
                status: application.status,
                warning,
            });
        }

        let status = flow.confirm().await?;
        let withdrawn = Application {
            status,
            updated_at: Utc::now(),
            ..application
        };

        match self.job(withdrawn.job_id).await {
            Ok(job) => {
                self.notifications
                    .notify_status_change(job.employer_id, &job, &withdrawn, status)
                    .await
            }
            Err(e) => warn!(
                "Application {} withdrawn but employer not notified: {}",
                application_id, e
            ),
        }

        Ok(WithdrawOutcome::Withdrawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::store::MockApplicationStore;
    use crate::notification::model::NotificationType;
    use crate::realtime::BroadcastChannel;
    use crate::test_support::{sample_job, InMemoryApplicationStore, InMemoryNotificationStore};
    use chrono::Duration as ChronoDuration;

    struct Harness {
        applications: Arc<InMemoryApplicationStore>,
        notifications: Arc<InMemoryNotificationStore>,
        service: ApplicationService,
        job: Job,
    }

    fn harness() -> Harness {
        let applications = Arc::new(InMemoryApplicationStore::new());
        let notifications = Arc::new(InMemoryNotificationStore::new());
        let job = sample_job(Uuid::new_v4());
        applications.add_job(job.clone());
        let service = ApplicationService::new(
            applications.clone(),
            NotificationService::new(notifications.clone(), Arc::new(BroadcastChannel::new())),
        );
        Harness {
            applications,
            notifications,
            service,
            job,
        }
    }

    #[tokio::test]
    async fn test_submit_notifies_employer() {
        let h = harness();
        let applicant = Uuid::new_v4();

        let application = h
            .service
            .submit(applicant, h.job.id, SubmitApplicationRequest::default())
            .await
            .unwrap();
        assert_eq!(application.status, ApplicationStatus::Submitted);

        let inbox = h.notifications.all(h.job.employer_id);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].notification_type, NotificationType::NewApplication);
        assert_eq!(inbox[0].data["application_id"], application.id.to_string());
    }

    #[tokio::test]
    async fn test_no_duplicate_active_applications() {
        let h = harness();
        let applicant = Uuid::new_v4();

        h.service
            .submit(applicant, h.job.id, SubmitApplicationRequest::default())
            .await
            .unwrap();
        let second = h
            .service
            .submit(applicant, h.job.id, SubmitApplicationRequest::default())
            .await;
        assert!(matches!(second, Err(ApplicationError::AlreadyApplied)));

        let attempts: Vec<_> = (0..5)
            .map(|_| {
                let service = h.service.clone();
                let job_id = h.job.id;
                let applicant = Uuid::new_v4();
                tokio::spawn(async move {
                    let a = service
                        .submit(applicant, job_id, SubmitApplicationRequest::default())
                        .await;
                    let b = service
                        .submit(applicant, job_id, SubmitApplicationRequest::default())
                        .await;
                    (applicant, a.is_ok(), b.is_ok())
                })
            })
            .collect();
        for attempt in attempts {
            let (applicant, first, second) = attempt.await.unwrap();
            assert!(first && !second);
            assert_eq!(h.applications.active_count(applicant, h.job.id), 1);
        }
        assert_eq!(h.applications.active_count(applicant, h.job.id), 1);
    }

    #[tokio::test]
    async fn test_withdrawn_application_allows_reapply() {
        let h = harness();
        let applicant = Uuid::new_v4();
        let first = h
            .service
            .submit(applicant, h.job.id, SubmitApplicationRequest::default())
            .await
            .unwrap();

        let outcome = h.service.withdraw(applicant, first.id, true).await.unwrap();
        assert_eq!(outcome, WithdrawOutcome::Withdrawn);
        assert_eq!(
            h.service.eligibility(applicant, h.job.id).await.unwrap(),
            ApplyAffordance::Eligible
        );

        let second = h
            .service
            .submit(applicant, h.job.id, SubmitApplicationRequest::default())
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(h.applications.active_count(applicant, h.job.id), 1);
    }

    #[tokio::test]
    async fn test_deadline_blocks_submission() {
        let h = harness();
        let mut closed = sample_job(h.job.employer_id);
        closed.application_deadline = Some(Utc::now() - ChronoDuration::hours(1));
        h.applications.add_job(closed.clone());

        let result = h
            .service
            .submit(Uuid::new_v4(), closed.id, SubmitApplicationRequest::default())
            .await;
        assert!(matches!(result, Err(ApplicationError::DeadlinePassed)));

        let result = h
            .service
            .submit(Uuid::new_v4(), Uuid::new_v4(), SubmitApplicationRequest::default())
            .await;
        assert!(matches!(result, Err(ApplicationError::JobNotFound)));
    }

    #[tokio::test]
    async fn test_failed_lookup_refuses_submission() {
        let job = sample_job(Uuid::new_v4());
        let mut store = MockApplicationStore::new();
        let found = job.clone();
        store
            .expect_get_job()
            .returning(move |_| Ok(Some(found.clone())));
        store
            .expect_get_application()
            .returning(|_, _| Err(ApplicationError::InternalError("connection reset".into())));
        store.expect_create().never();

        let service = ApplicationService::new(
            Arc::new(store),
            NotificationService::new(
                Arc::new(InMemoryNotificationStore::new()),
                Arc::new(BroadcastChannel::new()),
            ),
        );

        assert_eq!(
            service.eligibility(Uuid::new_v4(), job.id).await.unwrap(),
            ApplyAffordance::Checking
        );
        let result = service
            .submit(Uuid::new_v4(), job.id, SubmitApplicationRequest::default())
            .await;
        assert!(matches!(result, Err(ApplicationError::EligibilityUnavailable)));
    }

    #[tokio::test]
    async fn test_employer_moves_status_and_applicant_is_told() {
        let h = harness();
        let applicant = Uuid::new_v4();
        let application =
            h.applications
                .insert_with_status(applicant, h.job.id, ApplicationStatus::UnderReview);

        let updated = h
            .service
            .update_status(
                h.job.employer_id,
                application.id,
                ApplicationStatus::InterviewScheduled,
            )
            .await
            .unwrap();
        assert_eq!(updated.status, ApplicationStatus::InterviewScheduled);

        let inbox = h.notifications.all(applicant);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].data["status"], "interview_scheduled");
    }

    #[tokio::test]
    async fn test_status_update_guards() {
        let h = harness();
        let application = h.applications.insert_with_status(
            Uuid::new_v4(),
            h.job.id,
            ApplicationStatus::InterviewScheduled,
        );

        let backwards = h
            .service
            .update_status(h.job.employer_id, application.id, ApplicationStatus::Submitted)
            .await;
        assert!(matches!(backwards, Err(ApplicationError::InvalidTransition(_))));

        let stranger = h
            .service
            .update_status(Uuid::new_v4(), application.id, ApplicationStatus::OfferMade)
            .await;
        assert!(matches!(stranger, Err(ApplicationError::Forbidden)));

        let withdraw = h
            .service
            .update_status(h.job.employer_id, application.id, ApplicationStatus::Withdrawn)
            .await;
        assert!(matches!(withdraw, Err(ApplicationError::Forbidden)));

        assert_eq!(
            h.applications.status_of(application.id),
            Some(ApplicationStatus::InterviewScheduled)
        );
        assert!(h.notifications.all(application.applicant_id).is_empty());
    }

    #[tokio::test]
    async fn test_withdraw_requires_confirmation() {
        let h = harness();
        let applicant = Uuid::new_v4();
        let application = h.applications.insert_with_status(
            applicant,
            h.job.id,
            ApplicationStatus::InterviewScheduled,
        );

        let outcome = h.service.withdraw(applicant, application.id, false).await.unwrap();
        assert!(matches!(
            outcome,
            WithdrawOutcome::ConfirmationRequired {
                status: ApplicationStatus::InterviewScheduled,
                ..
            }
        ));
        assert_eq!(
            h.applications.status_of(application.id),
            Some(ApplicationStatus::InterviewScheduled)
        );

        h.service.withdraw(applicant, application.id, true).await.unwrap();
        assert_eq!(
            h.applications.status_of(application.id),
            Some(ApplicationStatus::Withdrawn)
        );
        let inbox = h.notifications.all(h.job.employer_id);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].data["status"], "withdrawn");

        // Irreversible
        let again = h.service.withdraw(applicant, application.id, true).await;
        assert!(matches!(again, Err(ApplicationError::InvalidTransition(_))));
        let reopen = h
            .service
            .update_status(h.job.employer_id, application.id, ApplicationStatus::UnderReview)
            .await;
        assert!(matches!(reopen, Err(ApplicationError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_withdraw_failure_leaves_status() {
        let h = harness();
        let applicant = Uuid::new_v4();
        let application =
            h.applications
                .insert_with_status(applicant, h.job.id, ApplicationStatus::Submitted);
        h.applications.set_fail_updates(true);

        let result = h.service.withdraw(applicant, application.id, true).await;
        assert!(matches!(result, Err(ApplicationError::InternalError(_))));
        assert_eq!(
            h.applications.status_of(application.id),
            Some(ApplicationStatus::Submitted)
        );
        assert!(h.notifications.all(h.job.employer_id).is_empty());

        let other = h.service.withdraw(Uuid::new_v4(), application.id, true).await;
        assert!(matches!(other, Err(ApplicationError::Forbidden)));
    }

    #[tokio::test]
    async fn test_late_employer_update_cannot_undo_withdrawal() {
        let h = harness();
        let applicant = Uuid::new_v4();
        let application =
            h.applications
                .insert_with_status(applicant, h.job.id, ApplicationStatus::UnderReview);
        let release = h.applications.hold_updates();
        let service = Arc::new(h.service.clone());

        // Both writers validate against under_review before either write lands
        let withdraw = tokio::spawn({
            let service = service.clone();
            let id = application.id;
            async move { service.withdraw(applicant, id, true).await }
        });
        h.applications.wait_for_parked(1).await;
        let update = tokio::spawn({
            let service = service.clone();
            let (employer, id) = (h.job.employer_id, application.id);
            async move {
                service
                    .update_status(employer, id, ApplicationStatus::OfferMade)
                    .await
            }
        });
        h.applications.wait_for_parked(2).await;

        release.notify_one();
        assert_eq!(withdraw.await.unwrap().unwrap(), WithdrawOutcome::Withdrawn);
        release.notify_one();
        let err = update.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::InvalidTransition(crate::application::model::InvalidTransition {
                from: ApplicationStatus::Withdrawn,
                to: ApplicationStatus::OfferMade,
            })
        ));

        assert_eq!(
            h.applications.status_of(application.id),
            Some(ApplicationStatus::Withdrawn)
        );
        assert!(h.notifications.all(applicant).is_empty());
    }

    #[tokio::test]
    async fn test_late_withdrawal_cannot_undo_acceptance() {
        let h = harness();
        let applicant = Uuid::new_v4();
        let application =
            h.applications
                .insert_with_status(applicant, h.job.id, ApplicationStatus::OfferMade);
        let release = h.applications.hold_updates();
        let service = Arc::new(h.service.clone());

        let accept = tokio::spawn({
            let service = service.clone();
            let (employer, id) = (h.job.employer_id, application.id);
            async move {
                service
                    .update_status(employer, id, ApplicationStatus::Accepted)
                    .await
            }
        });
        h.applications.wait_for_parked(1).await;
        let withdraw = tokio::spawn({
            let service = service.clone();
            let id = application.id;
            async move { service.withdraw(applicant, id, true).await }
        });
        h.applications.wait_for_parked(2).await;

        release.notify_one();
        assert_eq!(
            accept.await.unwrap().unwrap().status,
            ApplicationStatus::Accepted
        );
        release.notify_one();
        assert!(matches!(
            withdraw.await.unwrap(),
            Err(ApplicationError::InvalidTransition(_))
        ));

        assert_eq!(
            h.applications.status_of(application.id),
            Some(ApplicationStatus::Accepted)
        );
        assert!(h.notifications.all(h.job.employer_id).is_empty());
    }
}
