use axum::{
    extract::{Json, State},
    http::StatusCode,
    Extension,
};
use tracing::{info, instrument};

use vet_clinic_domain::access::Actor;
use vet_clinic_domain::auth::{AuthResponse, Claims, LoginRequest, ProfileResponse, ProfileUpdateRequest, RegisterRequest};

use crate::api::state::AppState;
use crate::entities::{ApiResult, ErrorResponse, MessageResponse};

/// Register an owner account and sign it in
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid or duplicate data", body = ErrorResponse),
        (status = 409, description = "Username, email or phone already in use", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let response = state.auth.register(request).await?;
    info!("Owner {} registered", response.user.username);
    Ok((StatusCode::CREATED, Json(response)))
}

/// Exchange username and password for a bearer token
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> ApiResult<Json<AuthResponse>> {
    Ok(Json(state.auth.login(request).await?))
}

/// Revoke the token used for this request
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 200, description = "Token revoked", body = MessageResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip(state, claims))]
pub async fn logout(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Extension(claims): Extension<Claims>,
) -> Json<MessageResponse> {
    state.auth.logout(&actor, &claims).await;
    Json(MessageResponse::new("Signed out"))
}

/// Current account and owner profile
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Profile", body = ProfileResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip(state))]
pub async fn profile(State(state): State<AppState>, Extension(actor): Extension<Actor>) -> ApiResult<Json<ProfileResponse>> {
    Ok(Json(state.auth.profile(&actor).await?))
}

/// Edit the current account; requires the current password
#[utoipa::path(
    put,
    path = "/api/v1/auth/me",
    request_body = ProfileUpdateRequest,
    responses(
        (status = 200, description = "Profile updated", body = ProfileResponse),
        (status = 400, description = "Invalid data or wrong current password", body = ErrorResponse),
        (status = 409, description = "Email or phone already in use", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip(state, request))]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<ProfileUpdateRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    Ok(Json(state.auth.update_profile(&actor, request).await?))
}
