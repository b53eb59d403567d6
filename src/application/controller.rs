use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::application::model::{
    Application, ApplicationError, ApplicationErrorResponse, EligibilityResponse,
    SubmitApplicationRequest, UpdateStatusRequest, WithdrawRequest, WithdrawResponse,
};
use crate::application::service::ApplicationService;
use crate::auth::middleware::AuthUser;

type ErrorReply = (StatusCode, Json<ApplicationErrorResponse>);

fn application_error_to_response(err: ApplicationError) -> ErrorReply {
    let status = match &err {
        ApplicationError::DatabaseError(e) => {
            error!("Database error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ApplicationError::InternalError(e) => {
            error!("Internal error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ApplicationError::NotFound | ApplicationError::JobNotFound => StatusCode::NOT_FOUND,
        ApplicationError::AlreadyApplied | ApplicationError::InvalidTransition(_) => {
            StatusCode::CONFLICT
        }
        ApplicationError::DeadlinePassed => StatusCode::GONE,
        ApplicationError::EligibilityUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ApplicationError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
        ApplicationError::Forbidden => StatusCode::FORBIDDEN,
    };

    let (message, code) = match err {
        ApplicationError::DatabaseError(_) => ("Database error".to_string(), "DB_ERROR"),
        ApplicationError::InternalError(_) => {
            ("Internal server error".to_string(), "INTERNAL_SERVER_ERROR")
        }
        ApplicationError::NotFound => (err.to_string(), "NOT_FOUND"),
        ApplicationError::JobNotFound => (err.to_string(), "JOB_NOT_FOUND"),
        ApplicationError::AlreadyApplied => (err.to_string(), "ALREADY_APPLIED"),
        ApplicationError::DeadlinePassed => (err.to_string(), "DEADLINE_PASSED"),
        ApplicationError::EligibilityUnavailable => (err.to_string(), "ELIGIBILITY_UNAVAILABLE"),
        ApplicationError::InvalidTransition(_) => (err.to_string(), "INVALID_TRANSITION"),
        ApplicationError::InvalidStatus(_) => (err.to_string(), "INVALID_STATUS"),
        ApplicationError::Forbidden => (err.to_string(), "FORBIDDEN"),
    };

    (
        status,
        Json(ApplicationErrorResponse {
            error: message,
            code: code.to_string(),
        }),
    )
}

/// What the apply control should show for the caller on this job
#[utoipa::path(
    get,
    path = "/api/jobs/{id}/eligibility",
    tag = "applications",
    params(
        ("id" = UuidWrapper, Path, description = "Job id")
    ),
    responses(
        (status = 200, description = "Eligibility resolved", body = EligibilityResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Job not found", body = ApplicationErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_eligibility(
    Path(job_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Extension(service): Extension<Arc<ApplicationService>>,
) -> Result<Json<EligibilityResponse>, ErrorReply> {
    let affordance = service
        .eligibility(user.user_id, job_id)
        .await
        .map_err(application_error_to_response)?;
    Ok(Json(affordance.into()))
}

#[utoipa::path(
    post,
    path = "/api/jobs/{id}/applications",
    tag = "applications",
    params(
        ("id" = UuidWrapper, Path, description = "Job id")
    ),
    request_body = SubmitApplicationRequest,
    responses(
        (status = 201, description = "Application submitted", body = Application),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Job not found", body = ApplicationErrorResponse),
        (status = 409, description = "Already applied", body = ApplicationErrorResponse),
        (status = 410, description = "Deadline passed", body = ApplicationErrorResponse),
        (status = 503, description = "Eligibility could not be confirmed", body = ApplicationErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn submit_application(
    Path(job_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Extension(service): Extension<Arc<ApplicationService>>,
    Json(request): Json<SubmitApplicationRequest>,
) -> Result<(StatusCode, Json<Application>), ErrorReply> {
    info!("User {} applying to job {}", user.user_id, job_id);

    let application = service
        .submit(user.user_id, job_id, request)
        .await
        .map_err(application_error_to_response)?;
    Ok((StatusCode::CREATED, Json(application)))
}

/// Move an application along the review pipeline (job owner only)
#[utoipa::path(
    patch,
    path = "/api/applications/{id}/status",
    tag = "applications",
    params(
        ("id" = UuidWrapper, Path, description = "Application id")
    ),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = Application),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the job's employer", body = ApplicationErrorResponse),
        (status = 404, description = "Application not found", body = ApplicationErrorResponse),
        (status = 409, description = "Transition not allowed", body = ApplicationErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_status(
    Path(application_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Extension(service): Extension<Arc<ApplicationService>>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Application>, ErrorReply> {
    let application = service
        .update_status(user.user_id, application_id, request.status)
        .await
        .map_err(application_error_to_response)?;
    Ok(Json(application))
}

/// Withdraw the caller's application.
///
/// Without `confirm: true` nothing changes and the status-specific warning is
/// returned for display.
#[utoipa::path(
    post,
    path = "/api/applications/{id}/withdraw",
    tag = "applications",
    params(
        ("id" = UuidWrapper, Path, description = "Application id")
    ),
    request_body = WithdrawRequest,
    responses(
        (status = 200, description = "Warning returned or application withdrawn", body = WithdrawResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the applicant", body = ApplicationErrorResponse),
        (status = 404, description = "Application not found", body = ApplicationErrorResponse),
        (status = 409, description = "Application already closed", body = ApplicationErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn withdraw_application(
    Path(application_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Extension(service): Extension<Arc<ApplicationService>>,
    request: Option<Json<WithdrawRequest>>,
) -> Result<Json<WithdrawResponse>, ErrorReply> {
    let Json(request) = request.unwrap_or_default();

    let outcome = service
        .withdraw(user.user_id, application_id, request.confirm)
        .await
        .map_err(application_error_to_response)?;
    Ok(Json(outcome.into()))
}
