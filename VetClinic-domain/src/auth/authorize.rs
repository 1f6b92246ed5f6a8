use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use futures::future::BoxFuture;
use serde_json::json;
use tracing::{debug, warn};

use vet_clinic_data::models::Role;

use crate::access::Actor;
use crate::auth::logging::{log_access_denied, log_auth_event, AuthEvent, AuthEventType};

/// Middleware for role-based access control
///
/// Lets the request through when the [`Actor`] placed by the auth middleware
/// holds any of `required_roles`. A superuser counts as ADMIN.
pub async fn require_roles(req: Request<Body>, next: Next, required_roles: Vec<Role>) -> Response {
    let request_path = req.uri().path().to_string();

    match req.extensions().get::<Actor>().cloned() {
        Some(actor) if actor.has_any_role(&required_roles) => {
            debug!("User {} authorized for {}", actor.username, request_path);
            next.run(req).await
        }
        Some(actor) => {
            warn!(
                "User {} ({}) lacks required roles {:?} for {}",
                actor.username, actor.role, required_roles, request_path
            );
            let codes: Vec<String> = required_roles.iter().map(|r| r.as_str().to_string()).collect();
            log_access_denied(&actor.user_id.to_string(), &request_path, &codes);

            (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "forbidden",
                    "message": "You don't have permission to perform this action",
                    "required_roles": codes,
                })),
            )
                .into_response()
        }
        None => {
            // Only reachable when the layer is mounted outside auth_middleware
            warn!("No actor in request extensions for {}", request_path);
            log_auth_event(
                AuthEvent::new(AuthEventType::AccessDenied, None, false)
                    .with_details("Authentication context missing in request extensions")
                    .with_resource(request_path)
                    .with_auth_method("rbac"),
            );

            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "internal_error",
                    "message": "Authentication context missing",
                })),
            )
                .into_response()
        }
    }
}

/// Middleware factory requiring one role
///
/// ```ignore
/// let admin_routes = Router::new()
///     .route("/users", get(list_users))
///     .layer(middleware::from_fn(require_role(Role::Admin)));
/// ```
pub fn require_role(
    role: Role,
) -> impl Fn(Request<Body>, Next) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static {
    require_any_role(&[role])
}

/// Middleware factory requiring any of several roles
pub fn require_any_role(
    roles: &[Role],
) -> impl Fn(Request<Body>, Next) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static {
    let roles = roles.to_vec();
    move |req: Request<Body>, next: Next| -> BoxFuture<'static, Response> {
        let roles = roles.clone();
        Box::pin(async move { require_roles(req, next, roles).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::get, Router};
    use tower::ServiceExt;

    fn actor(role: Role, is_superuser: bool) -> Actor {
        Actor {
            user_id: 7,
            username: "tester".to_string(),
            role,
            branch_id: Some(1),
            is_superuser,
        }
    }

    async fn call(roles: &[Role], caller: Option<Actor>) -> StatusCode {
        let app = Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(middleware::from_fn(require_any_role(roles)));

        let mut req = Request::builder().uri("/test").body(Body::empty()).unwrap();
        if let Some(caller) = caller {
            req.extensions_mut().insert(caller);
        }
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_matching_role_passes() {
        assert_eq!(call(&[Role::Admin, Role::AdminOp], Some(actor(Role::AdminOp, false))).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_role_is_forbidden() {
        assert_eq!(call(&[Role::Admin], Some(actor(Role::Vet, false))).await, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_superuser_passes_admin_check() {
        assert_eq!(call(&[Role::Admin], Some(actor(Role::Owner, true))).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_actor_is_an_internal_error() {
        assert_eq!(call(&[Role::Admin], None).await, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
