use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    Extension,
};
use tracing::instrument;

use vet_clinic_data::models::{Owner, OwnerWithPets};
use vet_clinic_domain::access::Actor;
use vet_clinic_domain::services::owner::{CreateOwnerRequest, OwnerDetail};

use crate::api::state::AppState;
use crate::entities::{ApiResult, ErrorResponse, SearchQuery};

/// Search owners by name, username, phone, address or city
#[utoipa::path(
    get,
    path = "/api/v1/owners",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching owners with their pet count", body = [OwnerWithPets]),
        (status = 403, description = "Staff only", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "owners"
)]
#[instrument(skip(state))]
pub async fn search_owners(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<OwnerWithPets>>> {
    let term = query.q.unwrap_or_default();
    Ok(Json(state.owners.search(&actor, &term).await?))
}

/// Create an owner account with its profile
#[utoipa::path(
    post,
    path = "/api/v1/owners",
    request_body = CreateOwnerRequest,
    responses(
        (status = 201, description = "Owner created", body = Owner),
        (status = 400, description = "Invalid data", body = ErrorResponse),
        (status = 409, description = "Username already in use", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "owners"
)]
#[instrument(skip(state, request))]
pub async fn create_owner(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateOwnerRequest>,
) -> ApiResult<(StatusCode, Json<Owner>)> {
    let owner = state.owners.create(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(owner)))
}

#[utoipa::path(
    get,
    path = "/api/v1/owners/{id}",
    params(("id" = i64, Path, description = "Owner id")),
    responses(
        (status = 200, description = "Owner with pets, appointments and records", body = OwnerDetail),
        (status = 404, description = "Unknown owner", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "owners"
)]
#[instrument(skip(state))]
pub async fn get_owner(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<Json<OwnerDetail>> {
    Ok(Json(state.owners.detail(&actor, id).await?))
}
