//! Authentication for the VetClinic API
//!
//! Bearer tokens are signed JWTs. The middleware resolves every token back
//! to the current user row so role and branch changes apply immediately.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::auth::logging::{log_auth_event, AuthEvent, AuthEventType};

pub mod authorize;
pub mod logging;
pub mod password;
pub mod service;
pub mod token;
pub mod token_blacklist;

pub use service::{
    create_default_auth_service, AuthResponse, AuthService, AuthServiceTrait, LoginRequest,
    ProfileResponse, ProfileUpdateRequest, RegisterRequest,
};
pub use token::{AuthConfig, SecurityError};

/// Authentication claims for JSON Web Tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Issued at (as timestamp)
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// Token ID, used for revocation
    pub jti: String,
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "unauthorized",
            "message": message,
        })),
    )
        .into_response()
}

fn bearer_token(req: &Request<Body>) -> Result<&str, &'static str> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or("Missing Authorization header")?;
    let value = value
        .to_str()
        .map_err(|_| "Invalid Authorization header format")?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or("Authorization header does not contain a Bearer token")
}

/// Authentication middleware for protected routes
///
/// On success the request carries the caller's [`crate::access::Actor`]
/// and the token [`Claims`] as extensions.
pub async fn auth_middleware(
    State(auth): State<Arc<dyn AuthServiceTrait>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let request_path = req.uri().path().to_string();
    let start_time = Instant::now();

    let token = match bearer_token(&req) {
        Ok(token) => token.to_string(),
        Err(reason) => {
            debug!("{} for {}", reason, request_path);
            log_auth_event(
                AuthEvent::new(AuthEventType::TokenValidation, None, false)
                    .with_details(reason)
                    .with_resource(request_path)
                    .with_duration(start_time.elapsed().as_millis() as u64)
                    .with_auth_method("jwt"),
            );
            return unauthorized("Authentication required");
        }
    };

    match auth.authenticate(&token).await {
        Ok((actor, claims)) => {
            log_auth_event(
                AuthEvent::new(AuthEventType::TokenValidation, Some(&claims.sub), true)
                    .with_resource(request_path)
                    .with_duration(start_time.elapsed().as_millis() as u64)
                    .with_auth_method("jwt"),
            );
            req.extensions_mut().insert(actor);
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            log_auth_event(
                AuthEvent::new(AuthEventType::TokenValidation, None, false)
                    .with_details(e.message().to_string())
                    .with_resource(request_path)
                    .with_duration(start_time.elapsed().as_millis() as u64)
                    .with_auth_method("jwt"),
            );
            unauthorized("Invalid or expired token")
        }
    }
}

/// Wrap the application with CORS and the security response headers
#[cfg(feature = "with-web")]
pub fn configure_auth(app: axum::Router) -> axum::Router {
    use axum::http::{HeaderName, HeaderValue, Method};
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::set_header::SetResponseHeaderLayer;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(std::time::Duration::from_secs(3600));

    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::if_not_present(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=63072000; includeSubDomains"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("permissions-policy"),
            HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
        ));

    app.layer(cors).layer(security_headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Actor;
    use axum::{middleware, routing::get, Extension, Router};
    use tower::ServiceExt;
    use vet_clinic_data::database::initialize_in_memory_pool;

    async fn whoami(Extension(actor): Extension<Actor>) -> String {
        actor.username
    }

    fn app() -> (Router, Arc<dyn AuthServiceTrait>) {
        let pool = initialize_in_memory_pool().unwrap();
        let auth = create_default_auth_service(pool, AuthConfig::new("secret", "test-issuer", 10));
        let router = Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn_with_state(auth.clone(), auth_middleware));
        (router, auth)
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let (router, _) = app();
        let response = router
            .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler() {
        let (router, auth) = app();
        let admin = auth.bootstrap_admin("root", "root-password").await.unwrap().unwrap();
        let login = auth
            .login(LoginRequest {
                username: admin.username.clone(),
                password: "root-password".to_string(),
            })
            .await
            .unwrap();

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header(header::AUTHORIZATION, format!("Bearer {}", login.access_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"root");
    }

    #[tokio::test]
    async fn test_garbage_token_is_unauthorized() {
        let (router, _) = app();
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
