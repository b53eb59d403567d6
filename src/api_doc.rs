use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Registers the bearer scheme referenced by the protected endpoints
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Job Board Realtime API",
        version = "0.1.0",
        description = "Notification feed and application lifecycle endpoints for the job board"
    ),
    paths(
        crate::routes::health::health_check,
        crate::notification::controller::list_notifications,
        crate::notification::controller::unread_count,
        crate::notification::controller::mark_as_read,
        crate::notification::controller::mark_all_as_read,
        crate::notification::controller::delete_notification,
        crate::notification::controller::create_notification,
        crate::application::controller::get_eligibility,
        crate::application::controller::submit_application,
        crate::application::controller::update_status,
        crate::application::controller::withdraw_application
    ),
    components(
        schemas(
            crate::routes::health::HealthResponse,
            // Notifications
            crate::notification::model::Notification,
            crate::notification::model::NotificationType,
            crate::notification::model::FeedFilter,
            crate::notification::model::CreateNotificationRequest,
            crate::notification::model::NotificationListResponse,
            crate::notification::model::UnreadCountResponse,
            crate::notification::model::MarkAllReadResponse,
            crate::notification::model::NotificationErrorResponse,
            // Applications
            crate::application::model::Application,
            crate::application::model::ApplicationStatus,
            crate::application::model::SubmitApplicationRequest,
            crate::application::model::UpdateStatusRequest,
            crate::application::model::WithdrawRequest,
            crate::application::model::WithdrawResponse,
            crate::application::model::EligibilityResponse,
            crate::application::model::ApplicationErrorResponse,
            // External type schemas
            crate::schema_ext::DateTimeWrapper,
            crate::schema_ext::UuidWrapper
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "notifications", description = "Notification feed endpoints"),
        (name = "applications", description = "Application lifecycle endpoints")
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;
