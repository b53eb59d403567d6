use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::model::{Application, ApplicationError, ApplicationStatus, InvalidTransition};
use crate::application::store::ApplicationStore;

pub const SUBMITTED_WARNING: &str = "Your application has not been reviewed yet. \
     Withdrawing removes it from the employer's queue and cannot be undone.";
pub const UNDER_REVIEW_WARNING: &str = "The employer is currently reviewing your application. \
     Withdrawing now ends your candidacy for this job and cannot be undone.";
pub const INTERVIEW_SCHEDULED_WARNING: &str = "You have an interview scheduled for this job. \
     Withdrawing cancels your candidacy and the employer will be told you will not attend. \
     This cannot be undone.";
pub const GENERIC_WARNING: &str =
    "Are you sure you want to withdraw this application? This cannot be undone.";

/// Confirmation copy shown before withdrawing from `status`
pub fn warning_for(status: ApplicationStatus) -> &'static str {
    match status {
        ApplicationStatus::Submitted => SUBMITTED_WARNING,
        ApplicationStatus::UnderReview => UNDER_REVIEW_WARNING,
        ApplicationStatus::InterviewScheduled => INTERVIEW_SCHEDULED_WARNING,
        _ => GENERIC_WARNING,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalState {
    Idle,
    Confirming {
        application_id: Uuid,
        status: ApplicationStatus,
        warning: &'static str,
        /// Message from the last failed attempt, if any
        error: Option<String>,
    },
    Submitting {
        application_id: Uuid,
        status: ApplicationStatus,
        warning: &'static str,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum WithdrawalError {
    #[error(transparent)]
    NotWithdrawable(#[from] InvalidTransition),

    #[error("No withdrawal is awaiting confirmation")]
    NothingToConfirm,

    #[error("A withdrawal is already in progress")]
    InFlight,

    #[error("Withdrawal failed: {0}")]
    WriteFailed(#[from] ApplicationError),
}

impl From<WithdrawalError> for ApplicationError {
    fn from(err: WithdrawalError) -> Self {
        match err {
            WithdrawalError::NotWithdrawable(transition) => ApplicationError::InvalidTransition(transition),
            WithdrawalError::WriteFailed(e) => e,
            other => ApplicationError::InternalError(other.to_string()),
        }
    }
}

/// Guards the `* -> withdrawn` transition behind an explicit confirmation.
///
/// There is no optimistic status change: callers only observe `withdrawn`
/// once the store acknowledged the write.
pub struct WithdrawalFlow {
    store: Arc<dyn ApplicationStore>,
    state: Mutex<WithdrawalState>,
}

impl WithdrawalFlow {
    pub fn new(store: Arc<dyn ApplicationStore>) -> Self {
        Self {
            store,
            state: Mutex::new(WithdrawalState::Idle),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WithdrawalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> WithdrawalState {
        self.lock().clone()
    }

    pub fn is_open(&self) -> bool {
        !matches!(*self.lock(), WithdrawalState::Idle)
    }

    /// Whether the confirm control should be enabled
    pub fn confirm_enabled(&self) -> bool {
        matches!(*self.lock(), WithdrawalState::Confirming { .. })
    }

    /// Opens the confirmation for `application`, returning its warning copy
    pub fn request(&self, application: &Application) -> Result<&'static str, WithdrawalError> {
        application.status.transition(ApplicationStatus::Withdrawn)?;

        let mut state = self.lock();
        if matches!(*state, WithdrawalState::Submitting { .. }) {
            return Err(WithdrawalError::InFlight);
        }

        let warning = warning_for(application.status);
        *state = WithdrawalState::Confirming {
            application_id: application.id,
            status: application.status,
            warning,
            error: None,
        };
        Ok(warning)
    }

    /// Closes the confirmation without touching the application
    pub fn cancel(&self) {
        let mut state = self.lock();
        if matches!(*state, WithdrawalState::Confirming { .. }) {
            *state = WithdrawalState::Idle;
        }
    }

    /// Writes `withdrawn` and closes the flow on success.
    ///
    /// On failure the flow goes back to `Confirming` with the error recorded
    /// so the user can retry or cancel.
    pub async fn confirm(&self) -> Result<ApplicationStatus, WithdrawalError> {
        let (application_id, status, warning) = {
            let mut state = self.lock();
            match *state {
                WithdrawalState::Confirming {
                    application_id,
                    status,
                    warning,
                    ..
                } => {
                    *state = WithdrawalState::Submitting {
                        application_id,
                        status,
                        warning,
                    };
                    (application_id, status, warning)
                }
                WithdrawalState::Submitting { .. } => return Err(WithdrawalError::InFlight),
                WithdrawalState::Idle => return Err(WithdrawalError::NothingToConfirm),
            }
        };

        match self
            .store
            .update_status(application_id, status, ApplicationStatus::Withdrawn)
            .await
        {
            Ok(()) => {
                info!("Application {} withdrawn (was {})", application_id, status);
                *self.lock() = WithdrawalState::Idle;
                Ok(ApplicationStatus::Withdrawn)
            }
            // The status moved on since the confirmation opened; retrying cannot help
            Err(ApplicationError::InvalidTransition(transition)) => {
                warn!(
                    "Application {} changed to {} before withdrawal was confirmed",
                    application_id, transition.from
                );
                *self.lock() = WithdrawalState::Idle;
                Err(WithdrawalError::NotWithdrawable(transition))
            }
            Err(e) => {
                error!("Failed to withdraw application {}: {}", application_id, e);
                *self.lock() = WithdrawalState::Confirming {
                    application_id,
                    status,
                    warning,
                    error: Some(e.to_string()),
                };
                Err(WithdrawalError::WriteFailed(e))
            }
        }
    }
}
