use axum::{
    extract::{Json, Path, Query, State},
    Extension,
};
use tracing::instrument;

use vet_clinic_data::models::MedicalRecord;
use vet_clinic_domain::access::Actor;
use vet_clinic_domain::services::record::{RecordOverview, RecordQuery};

use crate::api::state::AppState;
use crate::entities::{ApiResult, ErrorResponse};

/// Clinical records in scope with summary figures
#[utoipa::path(
    get,
    path = "/api/v1/records",
    params(RecordQuery),
    responses(
        (status = 200, description = "Records overview", body = RecordOverview),
        (status = 403, description = "Administrators and vets only", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "records"
)]
#[instrument(skip(state))]
pub async fn records_overview(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<RecordQuery>,
) -> ApiResult<Json<RecordOverview>> {
    Ok(Json(state.records.overview(&actor, query).await?))
}

/// Records written by the calling vet, newest first
#[utoipa::path(
    get,
    path = "/api/v1/records/mine",
    responses((status = 200, description = "Own records", body = [MedicalRecord])),
    security(("bearer" = [])),
    tag = "records"
)]
#[instrument(skip(state))]
pub async fn my_records(State(state): State<AppState>, Extension(actor): Extension<Actor>) -> ApiResult<Json<Vec<MedicalRecord>>> {
    Ok(Json(state.records.mine(&actor).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/records/{id}",
    params(("id" = i64, Path, description = "Record id")),
    responses(
        (status = 200, description = "Medical record", body = MedicalRecord),
        (status = 403, description = "Record of someone else's pet", body = ErrorResponse),
        (status = 404, description = "Unknown record", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "records"
)]
#[instrument(skip(state))]
pub async fn get_record(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<Json<MedicalRecord>> {
    Ok(Json(state.records.detail(&actor, id).await?))
}
