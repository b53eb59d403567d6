use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, warn};
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use crate::application::model::{
    Application, ApplicationError, ApplicationRow, ApplicationStatus, InvalidTransition, Job,
    NewApplication,
};

/// Persistent application records and the jobs they point at
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, ApplicationError>;

    /// The applicant's most recent application to the job, if any
    async fn get_application(
        &self,
        applicant_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<Application>, ApplicationError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Application>, ApplicationError>;

    async fn create(&self, application: NewApplication) -> Result<Application, ApplicationError>;

    /// Moves the application from `from` to `to` only if it is still at `from`.
    ///
    /// A row that moved on in the meantime yields `InvalidTransition` carrying
    /// its current status.
    async fn update_status(
        &self,
        id: Uuid,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<(), ApplicationError>;
}

const APPLICATION_COLUMNS: &str = "id, job_id, applicant_id, status, cover_letter, resume_url, \
     expected_salary, availability, applied_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgApplicationStore {
    pool: PgPool,
}

impl PgApplicationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApplicationStore for PgApplicationStore {
    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, ApplicationError> {
        let job = sqlx::query_as::<_, Job>(
            "SELECT id, employer_id, title, application_deadline FROM jobboard.jobs WHERE id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn get_application(
        &self,
        applicant_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<Application>, ApplicationError> {
        let sql = format!(
            "SELECT {} FROM jobboard.applications \
             WHERE applicant_id = $1 AND job_id = $2 \
             ORDER BY applied_at DESC LIMIT 1",
            APPLICATION_COLUMNS
        );
        let row = sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(applicant_id)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Application::try_from).transpose()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Application>, ApplicationError> {
        let sql = format!(
            "SELECT {} FROM jobboard.applications WHERE id = $1",
            APPLICATION_COLUMNS
        );
        let row = sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Application::try_from).transpose()
    }

    async fn create(&self, application: NewApplication) -> Result<Application, ApplicationError> {
        let sql = format!(
            "INSERT INTO jobboard.applications (\
                 id, job_id, applicant_id, status, cover_letter, resume_url, \
                 expected_salary, availability, applied_at, updated_at\
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW()) \
             RETURNING {}",
            APPLICATION_COLUMNS
        );
        let submission = application.submission;

        let row = sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(application.job_id)
            .bind(application.applicant_id)
            .bind(ApplicationStatus::Submitted.as_str())
            .bind(submission.cover_letter)
            .bind(submission.resume_url)
            .bind(submission.expected_salary)
            .bind(submission.availability)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                // The partial unique index backs up the eligibility gate
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    warn!(
                        "Duplicate application from {} for job {}",
                        application.applicant_id, application.job_id
                    );
                    ApplicationError::AlreadyApplied
                }
                e => {
                    error!("Failed to insert application: {}", e);
                    ApplicationError::DatabaseError(e)
                }
            })?;

        Application::try_from(row)
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<(), ApplicationError> {
        let result = sqlx::query(
            "UPDATE jobboard.applications SET status = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to update status of application {}: {}", id, e);
            ApplicationError::DatabaseError(e)
        })?;

        if result.rows_affected() == 0 {
            // Either gone or another writer changed the status first
            return match self.get_by_id(id).await? {
                None => Err(ApplicationError::NotFound),
                Some(current) => {
                    warn!(
                        "Application {} is {} now, not {}; refusing move to {}",
                        id, current.status, from, to
                    );
                    Err(ApplicationError::InvalidTransition(InvalidTransition {
                        from: current.status,
                        to,
                    }))
                }
            };
        }
        Ok(())
    }
}
