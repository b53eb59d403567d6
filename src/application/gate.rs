use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::model::{ApplicationStatus, EligibilityResponse, Job};
use crate::application::store::ApplicationStore;

/// Upper bound on a single eligibility round-trip
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// What the apply control should show for an (applicant, job) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyAffordance {
    Checking,
    AlreadyApplied,
    DeadlinePassed,
    Eligible,
}

impl ApplyAffordance {
    /// Pure precedence: pending check, then existing application, then deadline
    pub fn derive(applied: bool, deadline_passed: bool, pending: bool) -> Self {
        if pending {
            ApplyAffordance::Checking
        } else if applied {
            ApplyAffordance::AlreadyApplied
        } else if deadline_passed {
            ApplyAffordance::DeadlinePassed
        } else {
            ApplyAffordance::Eligible
        }
    }

    pub fn can_submit(&self) -> bool {
        matches!(self, ApplyAffordance::Eligible)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyAffordance::Checking => "checking",
            ApplyAffordance::AlreadyApplied => "already_applied",
            ApplyAffordance::DeadlinePassed => "deadline_passed",
            ApplyAffordance::Eligible => "eligible",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ApplyAffordance::Checking => "Checking eligibility...",
            ApplyAffordance::AlreadyApplied => "Already applied",
            ApplyAffordance::DeadlinePassed => "Deadline passed",
            ApplyAffordance::Eligible => "Apply now",
        }
    }
}

impl From<ApplyAffordance> for EligibilityResponse {
    fn from(affordance: ApplyAffordance) -> Self {
        Self {
            affordance: affordance.as_str().to_string(),
            label: affordance.label().to_string(),
            can_apply: affordance.can_submit(),
        }
    }
}

/// A deadline equal to `now` has not passed yet
pub fn deadline_passed(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    deadline.map_or(false, |deadline| deadline < now)
}

/// Decides whether a new application may be created
#[derive(Clone)]
pub struct LifecycleGate {
    store: Arc<dyn ApplicationStore>,
    check_timeout: Duration,
}

impl LifecycleGate {
    pub fn new(store: Arc<dyn ApplicationStore>) -> Self {
        Self {
            store,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, check_timeout: Duration) -> Self {
        self.check_timeout = check_timeout;
        self
    }

    /// Resolves the affordance for `applicant_id` on `job` at `now`.
    ///
    /// A lookup that fails or does not answer within the timeout leaves the
    /// result at `Checking`, which never permits submission.
    pub async fn check(&self, applicant_id: Uuid, job: &Job, now: DateTime<Utc>) -> ApplyAffordance {
        let passed = deadline_passed(job.application_deadline, now);

        let lookup = timeout(
            self.check_timeout,
            self.store.get_application(applicant_id, job.id),
        )
        .await;

        let applied = match lookup {
            Ok(Ok(existing)) => existing.map_or(false, |a| a.status != ApplicationStatus::Withdrawn),
            Ok(Err(e)) => {
                warn!(
                    "Eligibility lookup failed for applicant {} on job {}: {}",
                    applicant_id, job.id, e
                );
                return ApplyAffordance::derive(false, passed, true);
            }
            Err(_) => {
                warn!(
                    "Eligibility lookup timed out for applicant {} on job {}",
                    applicant_id, job.id
                );
                return ApplyAffordance::derive(false, passed, true);
            }
        };

        let affordance = ApplyAffordance::derive(applied, passed, false);
        info!(
            "Eligibility for applicant {} on job {}: {}",
            applicant_id,
            job.id,
            affordance.as_str()
        );
        affordance
    }

    pub async fn can_apply(&self, applicant_id: Uuid, job: &Job, now: DateTime<Utc>) -> bool {
        self.check(applicant_id, job, now).await.can_submit()
    }
}
