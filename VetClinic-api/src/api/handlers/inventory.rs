use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    Extension,
};
use tracing::instrument;

use vet_clinic_data::models::Medication;
use vet_clinic_domain::access::Actor;
use vet_clinic_domain::services::inventory::{InventoryQuery, InventoryView, MedicationRequest};

use crate::api::state::AppState;
use crate::entities::{ApiResult, ErrorResponse, MessageResponse};

/// Pharmacy stock of a manageable branch
#[utoipa::path(
    get,
    path = "/api/v1/inventory",
    params(InventoryQuery),
    responses(
        (status = 200, description = "Branch inventory", body = InventoryView),
        (status = 403, description = "Administrators only", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "inventory"
)]
#[instrument(skip(state))]
pub async fn admin_inventory(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<InventoryQuery>,
) -> ApiResult<Json<InventoryView>> {
    Ok(Json(state.inventory.admin_view(&actor, query).await?))
}

/// Pharmacy stock of the calling vet's branch
#[utoipa::path(
    get,
    path = "/api/v1/inventory/mine",
    params(InventoryQuery),
    responses((status = 200, description = "Branch inventory", body = InventoryView)),
    security(("bearer" = [])),
    tag = "inventory"
)]
#[instrument(skip(state))]
pub async fn vet_inventory(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<InventoryQuery>,
) -> ApiResult<Json<InventoryView>> {
    Ok(Json(state.inventory.vet_view(&actor, query).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory",
    request_body = MedicationRequest,
    responses(
        (status = 201, description = "Medication added", body = Medication),
        (status = 400, description = "Invalid data", body = ErrorResponse),
        (status = 409, description = "Name already used in the branch", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "inventory"
)]
#[instrument(skip(state))]
pub async fn create_medication(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<MedicationRequest>,
) -> ApiResult<(StatusCode, Json<Medication>)> {
    let medication = state.inventory.create(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(medication)))
}

#[utoipa::path(
    put,
    path = "/api/v1/inventory/{id}",
    params(("id" = i64, Path, description = "Medication id")),
    request_body = MedicationRequest,
    responses(
        (status = 200, description = "Medication updated", body = Medication),
        (status = 404, description = "Unknown medication", body = ErrorResponse),
        (status = 409, description = "Name already used in the branch", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "inventory"
)]
#[instrument(skip(state))]
pub async fn update_medication(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(request): Json<MedicationRequest>,
) -> ApiResult<Json<Medication>> {
    Ok(Json(state.inventory.update(&actor, id, request).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/inventory/{id}",
    params(("id" = i64, Path, description = "Medication id")),
    responses(
        (status = 200, description = "Medication removed", body = MessageResponse),
        (status = 404, description = "Unknown medication", body = ErrorResponse),
        (status = 409, description = "Medication has recorded usage", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "inventory"
)]
#[instrument(skip(state))]
pub async fn delete_medication(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    state.inventory.delete(&actor, id).await?;
    Ok(Json(MessageResponse::new("Medication removed")))
}
