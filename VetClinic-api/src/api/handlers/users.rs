use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    Extension,
};
use tracing::instrument;

use vet_clinic_data::models::User;
use vet_clinic_domain::access::Actor;
use vet_clinic_domain::services::staff::{CreateUserRequest, PromoteVetRequest, UpdateUserRequest};

use crate::api::state::AppState;
use crate::entities::{ApiResult, ErrorResponse};

#[utoipa::path(
    get,
    path = "/api/v1/users",
    responses(
        (status = 200, description = "Every account by username", body = [User]),
        (status = 403, description = "Administrators only", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>, Extension(actor): Extension<Actor>) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.staff.list_users(&actor).await?))
}

/// Create an account of any role
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 400, description = "Invalid account data", body = ErrorResponse),
        (status = 403, description = "Branch or superuser flag not allowed", body = ErrorResponse),
        (status = 409, description = "Username or email taken", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.staff.create_user(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Edit role, branch, flags and contact data of an account
#[utoipa::path(
    put,
    path = "/api/v1/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Account updated", body = User),
        (status = 400, description = "Invalid account data", body = ErrorResponse),
        (status = 403, description = "Account or branch not manageable", body = ErrorResponse),
        (status = 404, description = "Unknown user", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
#[instrument(skip(state, request))]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.staff.update_user(&actor, id, request).await?))
}

/// Accounts that can be promoted to vet
#[utoipa::path(
    get,
    path = "/api/v1/users/vet-candidates",
    responses((status = 200, description = "Non-vet accounts", body = [User])),
    security(("bearer" = [])),
    tag = "users"
)]
#[instrument(skip(state))]
pub async fn vet_candidates(State(state): State<AppState>, Extension(actor): Extension<Actor>) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.staff.vet_candidates(&actor).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/promote-vet",
    params(("id" = i64, Path, description = "User id")),
    request_body = PromoteVetRequest,
    responses(
        (status = 200, description = "User is now a vet", body = User),
        (status = 400, description = "Invalid branch", body = ErrorResponse),
        (status = 403, description = "Branch not allowed", body = ErrorResponse),
        (status = 404, description = "Unknown user", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
#[instrument(skip(state))]
pub async fn promote_vet(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(request): Json<PromoteVetRequest>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.staff.promote_to_vet(&actor, id, request).await?))
}
