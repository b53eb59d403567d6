use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle status of a job application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Submitted,
    UnderReview,
    InterviewScheduled,
    InterviewCompleted,
    OfferMade,
    Accepted,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 8] = [
        ApplicationStatus::Submitted,
        ApplicationStatus::UnderReview,
        ApplicationStatus::InterviewScheduled,
        ApplicationStatus::InterviewCompleted,
        ApplicationStatus::OfferMade,
        ApplicationStatus::Accepted,
        ApplicationStatus::Rejected,
        ApplicationStatus::Withdrawn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::InterviewScheduled => "interview_scheduled",
            ApplicationStatus::InterviewCompleted => "interview_completed",
            ApplicationStatus::OfferMade => "offer_made",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }

    /// Human readable label used in notification copy
    pub fn label(&self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "Submitted",
            ApplicationStatus::UnderReview => "Under review",
            ApplicationStatus::InterviewScheduled => "Interview scheduled",
            ApplicationStatus::InterviewCompleted => "Interview completed",
            ApplicationStatus::OfferMade => "Offer made",
            ApplicationStatus::Accepted => "Accepted",
            ApplicationStatus::Rejected => "Rejected",
            ApplicationStatus::Withdrawn => "Withdrawn",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Accepted | ApplicationStatus::Rejected | ApplicationStatus::Withdrawn
        )
    }

    // Position along the main review pipeline; exits have none
    fn rank(&self) -> Option<u8> {
        match self {
            ApplicationStatus::Submitted => Some(0),
            ApplicationStatus::UnderReview => Some(1),
            ApplicationStatus::InterviewScheduled => Some(2),
            ApplicationStatus::InterviewCompleted => Some(3),
            ApplicationStatus::OfferMade => Some(4),
            ApplicationStatus::Accepted => Some(5),
            ApplicationStatus::Rejected | ApplicationStatus::Withdrawn => None,
        }
    }

    /// The only way an application's status may change.
    ///
    /// Forward moves along the pipeline may skip steps. `rejected` and
    /// `withdrawn` are reachable from any non-terminal status. Nothing leaves
    /// a terminal status.
    pub fn transition(self, next: ApplicationStatus) -> Result<ApplicationStatus, InvalidTransition> {
        let invalid = InvalidTransition {
            from: self,
            to: next,
        };

        if self.is_terminal() {
            return Err(invalid);
        }

        match next {
            ApplicationStatus::Rejected | ApplicationStatus::Withdrawn => Ok(next),
            _ => match (self.rank(), next.rank()) {
                (Some(from), Some(to)) if to > from => Ok(next),
                _ => Err(invalid),
            },
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = ApplicationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ApplicationStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| ApplicationError::InvalidStatus(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Cannot move application from {from} to {to}")]
pub struct InvalidTransition {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
}

/// One candidate's application to one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Application {
    #[schema(value_type = UuidWrapper)]
    pub id: Uuid,
    #[schema(value_type = UuidWrapper)]
    pub job_id: Uuid,
    #[schema(value_type = UuidWrapper)]
    pub applicant_id: Uuid,
    pub status: ApplicationStatus,
    pub cover_letter: Option<String>,
    pub resume_url: Option<String>,
    pub expected_salary: Option<i64>,
    pub availability: Option<String>,
    #[schema(value_type = DateTimeWrapper)]
    pub applied_at: DateTime<Utc>,
    #[schema(value_type = DateTimeWrapper)]
    pub updated_at: DateTime<Utc>,
}

/// Database row for an application
#[derive(Debug, FromRow)]
pub struct ApplicationRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub applicant_id: Uuid,
    pub status: String,
    pub cover_letter: Option<String>,
    pub resume_url: Option<String>,
    pub expected_salary: Option<i64>,
    pub availability: Option<String>,
    pub applied_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = ApplicationError;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            job_id: row.job_id,
            applicant_id: row.applicant_id,
            status: row.status.parse()?,
            cover_letter: row.cover_letter,
            resume_url: row.resume_url,
            expected_salary: row.expected_salary,
            availability: row.availability,
            applied_at: row.applied_at,
            updated_at: row.updated_at,
        })
    }
}

/// The slice of a job posting the lifecycle needs
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub employer_id: Uuid,
    pub title: String,
    pub application_deadline: Option<DateTime<Utc>>,
}

/// Free-form fields submitted with an application
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct SubmitApplicationRequest {
    #[schema(example = "I have five years of production Rust experience.")]
    pub cover_letter: Option<String>,
    #[schema(example = "https://files.example.com/resumes/jane.pdf")]
    pub resume_url: Option<String>,
    #[schema(example = "120000")]
    pub expected_salary: Option<i64>,
    #[schema(example = "Two weeks notice")]
    pub availability: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewApplication {
    pub job_id: Uuid,
    pub applicant_id: Uuid,
    pub submission: SubmitApplicationRequest,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: ApplicationStatus,
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct WithdrawRequest {
    /// Must be true to perform the withdrawal; otherwise only the warning is returned
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WithdrawResponse {
    pub status: ApplicationStatus,
    #[schema(example = "true")]
    pub confirmation_required: bool,
    pub warning: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EligibilityResponse {
    #[schema(example = "eligible")]
    pub affordance: String,
    #[schema(example = "Apply now")]
    pub label: String,
    pub can_apply: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ApplicationError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Application not found")]
    NotFound,

    #[error("Job not found")]
    JobNotFound,

    #[error("An active application for this job already exists")]
    AlreadyApplied,

    #[error("The application deadline has passed")]
    DeadlinePassed,

    #[error("Eligibility could not be confirmed")]
    EligibilityUnavailable,

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Unknown application status: {0}")]
    InvalidStatus(String),

    #[error("Not authorized to perform this action")]
    Forbidden,

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Error body returned by application endpoints
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApplicationErrorResponse {
    #[schema(example = "An active application for this job already exists")]
    pub error: String,
    #[schema(example = "ALREADY_APPLIED")]
    pub code: String,
}
