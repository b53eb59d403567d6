use axum::{
    extract::Extension,
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::application::controller::{
    get_eligibility, submit_application, update_status, withdraw_application,
};
use crate::application::service::ApplicationService;
use crate::auth::middleware::{auth_middleware, require_employer};

pub fn routes(service: Arc<ApplicationService>) -> Router {
    Router::new()
        .route("/api/jobs/:id/eligibility", get(get_eligibility))
        .route("/api/jobs/:id/applications", post(submit_application))
        .route(
            "/api/applications/:id/status",
            patch(update_status).route_layer(middleware::from_fn(require_employer)),
        )
        .route("/api/applications/:id/withdraw", post(withdraw_application))
        .route_layer(middleware::from_fn(auth_middleware))
        .layer(Extension(service))
}
