use axum::{
    async_trait,
    extract::FromRequestParts,
    headers::{authorization::Bearer, Authorization},
    http::{request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
    RequestPartsExt, TypedHeader,
};
use serde::Serialize;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::jwt::{validate_token, Role};

/// Authenticated user information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    /// Admins pass every role check
    pub fn has_role(&self, role: Role) -> bool {
        self.role == Role::Admin || self.role == role
    }
}

#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    error: String,
}

fn reject(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(AuthErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Validates the bearer token and stores an [`AuthUser`] in the extensions
pub async fn auth_middleware<B>(req: Request<B>, next: Next<B>) -> Result<Response, Response> {
    let (mut parts, body) = req.into_parts();

    let TypedHeader(Authorization(bearer)) = parts
        .extract::<TypedHeader<Authorization<Bearer>>>()
        .await
        .map_err(|e| {
            warn!("Authorization header extraction failed: {:?}", e);
            reject(
                StatusCode::UNAUTHORIZED,
                "Missing or invalid Authorization header. Please provide a Bearer token",
            )
        })?;

    let claims = validate_token(bearer.token()).map_err(|e| {
        warn!("Token validation failed: {}", e);
        reject(StatusCode::UNAUTHORIZED, "Invalid token. Please login again")
    })?;

    let user_id = claims.user_id().map_err(|e| {
        error!("User ID parsing failed: {}", e);
        reject(StatusCode::UNAUTHORIZED, "Invalid user identifier in token")
    })?;

    debug!("User authenticated: {} with role {}", user_id, claims.role);
    parts.extensions.insert(AuthUser {
        user_id,
        role: claims.role,
    });

    let req = Request::from_parts(parts, body);
    Ok(next.run(req).await)
}

/// Role gate; must run after [`auth_middleware`]
pub async fn require_role<B>(
    role: Role,
    req: Request<B>,
    next: Next<B>,
) -> Result<Response, Response> {
    let Some(auth_user) = req.extensions().get::<AuthUser>().copied() else {
        error!("AuthUser not found in request extensions");
        return Err(reject(StatusCode::UNAUTHORIZED, "Authentication required"));
    };

    if !auth_user.has_role(role) {
        warn!(
            "Insufficient permissions for user {} with role {}, required role: {}",
            auth_user.user_id, auth_user.role, role
        );
        return Err(reject(
            StatusCode::FORBIDDEN,
            format!("Insufficient permissions. Required role: {}", role),
        ));
    }

    Ok(next.run(req).await)
}

pub async fn require_admin<B>(req: Request<B>, next: Next<B>) -> Result<Response, Response> {
    require_role(Role::Admin, req, next).await
}

pub async fn require_employer<B>(req: Request<B>, next: Next<B>) -> Result<Response, Response> {
    require_role(Role::Employer, req, next).await
}

/// Extractor for authenticated user
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Authentication required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::generate_token;
    use axum::{body::Body, middleware::from_fn, routing::get, Router};
    use tower::ServiceExt;

    async fn whoami(user: AuthUser) -> String {
        format!("{}:{}", user.user_id, user.role)
    }

    fn app() -> Router {
        Router::new()
            .route(
                "/admin",
                get(whoami).route_layer(from_fn(require_admin)),
            )
            .route("/me", get(whoami))
            .route_layer(from_fn(auth_middleware))
    }

    fn request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_admin_passes_every_role_check() {
        let admin = AuthUser {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };
        let candidate = AuthUser {
            user_id: Uuid::new_v4(),
            role: Role::Candidate,
        };
        assert!(admin.has_role(Role::Employer));
        assert!(candidate.has_role(Role::Candidate));
        assert!(!candidate.has_role(Role::Employer));
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let response = app().oneshot(request("/me", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler() {
        std::env::set_var("JWT_SECRET", "test_secret");
        let user_id = Uuid::new_v4();
        let token = generate_token(&user_id, Role::Candidate).unwrap();

        let response = app().oneshot(request("/me", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_role_gate_forbids_other_roles() {
        std::env::set_var("JWT_SECRET", "test_secret");
        let token = generate_token(&Uuid::new_v4(), Role::Employer).unwrap();
        let response = app().oneshot(request("/admin", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let token = generate_token(&Uuid::new_v4(), Role::Admin).unwrap();
        let response = app().oneshot(request("/admin", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
