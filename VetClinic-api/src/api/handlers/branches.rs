use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    Extension,
};
use tracing::instrument;

use vet_clinic_data::models::{Branch, BranchInput};
use vet_clinic_domain::access::Actor;
use vet_clinic_domain::services::branch::ContactDirectory;

use crate::api::state::AppState;
use crate::entities::{ApiResult, ErrorResponse};

/// Every branch with its contact links
#[utoipa::path(
    get,
    path = "/api/v1/contact",
    responses((status = 200, description = "Contact directory", body = ContactDirectory)),
    tag = "branches"
)]
#[instrument(skip(state))]
pub async fn contact_directory(State(state): State<AppState>) -> ApiResult<Json<ContactDirectory>> {
    Ok(Json(state.branches.contact_directory().await?))
}

/// List branches ordered by name
#[utoipa::path(
    get,
    path = "/api/v1/branches",
    responses((status = 200, description = "Branches", body = [Branch])),
    security(("bearer" = [])),
    tag = "branches"
)]
#[instrument(skip(state))]
pub async fn list_branches(State(state): State<AppState>) -> ApiResult<Json<Vec<Branch>>> {
    Ok(Json(state.branches.list().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/branches/{id}",
    params(("id" = i64, Path, description = "Branch id")),
    responses(
        (status = 200, description = "Branch", body = Branch),
        (status = 404, description = "Unknown branch", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "branches"
)]
#[instrument(skip(state))]
pub async fn get_branch(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Branch>> {
    Ok(Json(state.branches.get(id).await?))
}

/// Create a branch (superuser only)
#[utoipa::path(
    post,
    path = "/api/v1/branches",
    request_body = BranchInput,
    responses(
        (status = 201, description = "Branch created", body = Branch),
        (status = 403, description = "Not a superuser", body = ErrorResponse),
        (status = 409, description = "Name already in use", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "branches"
)]
#[instrument(skip(state))]
pub async fn create_branch(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(input): Json<BranchInput>,
) -> ApiResult<(StatusCode, Json<Branch>)> {
    let branch = state.branches.create(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(branch)))
}

/// Edit a branch (superuser only)
#[utoipa::path(
    put,
    path = "/api/v1/branches/{id}",
    params(("id" = i64, Path, description = "Branch id")),
    request_body = BranchInput,
    responses(
        (status = 200, description = "Branch updated", body = Branch),
        (status = 403, description = "Not a superuser", body = ErrorResponse),
        (status = 404, description = "Unknown branch", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "branches"
)]
#[instrument(skip(state))]
pub async fn update_branch(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(input): Json<BranchInput>,
) -> ApiResult<Json<Branch>> {
    Ok(Json(state.branches.update(&actor, id, input).await?))
}
