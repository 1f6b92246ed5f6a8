use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    Extension,
};
use tracing::instrument;

use vet_clinic_data::models::Patient;
use vet_clinic_domain::access::Actor;
use vet_clinic_domain::services::patient::{CreatePatientRequest, PatientDetail, TransferOutcome, TransferRequest};
use vet_clinic_domain::services::record::{RegisterRecordRequest, RegisteredRecord};
use vet_clinic_domain::services::vaccine::{MarkOutcome, MarkVaccineRequest, UnmarkOutcome, VaccineCalendar};

use crate::api::state::AppState;
use crate::entities::{ApiResult, ErrorResponse};

/// Patients visible to the caller, by name
#[utoipa::path(
    get,
    path = "/api/v1/patients",
    responses((status = 200, description = "Patients", body = [Patient])),
    security(("bearer" = [])),
    tag = "patients"
)]
#[instrument(skip(state))]
pub async fn list_patients(State(state): State<AppState>, Extension(actor): Extension<Actor>) -> ApiResult<Json<Vec<Patient>>> {
    Ok(Json(state.patients.list(&actor).await?))
}

/// Owners register their own pets; administrators name the owner
#[utoipa::path(
    post,
    path = "/api/v1/patients",
    request_body = CreatePatientRequest,
    responses(
        (status = 201, description = "Patient registered", body = Patient),
        (status = 400, description = "Invalid data or unknown owner", body = ErrorResponse),
        (status = 403, description = "Role not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "patients"
)]
#[instrument(skip(state))]
pub async fn create_patient(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreatePatientRequest>,
) -> ApiResult<(StatusCode, Json<Patient>)> {
    let patient = state.patients.create(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}",
    params(("id" = i64, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Patient with clinical history and agenda", body = PatientDetail),
        (status = 404, description = "Unknown patient", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "patients"
)]
#[instrument(skip(state))]
pub async fn get_patient(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<Json<PatientDetail>> {
    Ok(Json(state.patients.detail(&actor, id).await?))
}

/// Hand a pet over to another owner
#[utoipa::path(
    post,
    path = "/api/v1/patients/{id}/transfer",
    params(("id" = i64, Path, description = "Patient id")),
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Preview or completed transfer", body = TransferOutcome),
        (status = 400, description = "Wrong password or destination", body = ErrorResponse),
        (status = 404, description = "Pet not found among the caller's pets", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "patients"
)]
#[instrument(skip(state, request))]
pub async fn transfer_patient(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(request): Json<TransferRequest>,
) -> ApiResult<Json<TransferOutcome>> {
    Ok(Json(state.patients.transfer(&actor, id, request).await?))
}

/// Write a medical record for the patient
#[utoipa::path(
    post,
    path = "/api/v1/patients/{id}/records",
    params(("id" = i64, Path, description = "Patient id")),
    request_body = RegisterRecordRequest,
    responses(
        (status = 201, description = "Record written", body = RegisteredRecord),
        (status = 400, description = "Invalid data", body = ErrorResponse),
        (status = 403, description = "Vets only", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "records"
)]
#[instrument(skip(state))]
pub async fn register_record(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(request): Json<RegisterRecordRequest>,
) -> ApiResult<(StatusCode, Json<RegisteredRecord>)> {
    let registered = state.records.register(&actor, id, request).await?;
    Ok((StatusCode::CREATED, Json(registered)))
}

/// Vaccination schedule of the pet with what has been applied
#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}/vaccines",
    params(("id" = i64, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Vaccine calendar", body = VaccineCalendar),
        (status = 404, description = "Pet not found among the caller's pets", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "vaccines"
)]
#[instrument(skip(state))]
pub async fn vaccine_calendar(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<Json<VaccineCalendar>> {
    Ok(Json(state.vaccines.calendar(&actor, Some(id)).await?))
}

/// Record a vaccine as applied
#[utoipa::path(
    put,
    path = "/api/v1/patients/{id}/vaccines/{vaccine_id}",
    params(
        ("id" = i64, Path, description = "Patient id"),
        ("vaccine_id" = i64, Path, description = "Vaccine id")
    ),
    request_body = MarkVaccineRequest,
    responses(
        (status = 200, description = "Record created or updated", body = MarkOutcome),
        (status = 400, description = "Future date or vaccine of another species", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "vaccines"
)]
#[instrument(skip(state))]
pub async fn mark_vaccine(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((id, vaccine_id)): Path<(i64, i64)>,
    Json(request): Json<MarkVaccineRequest>,
) -> ApiResult<Json<MarkOutcome>> {
    Ok(Json(state.vaccines.mark(&actor, id, vaccine_id, request).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/patients/{id}/vaccines/{vaccine_id}",
    params(
        ("id" = i64, Path, description = "Patient id"),
        ("vaccine_id" = i64, Path, description = "Vaccine id")
    ),
    responses((status = 200, description = "Record removed if it existed", body = UnmarkOutcome)),
    security(("bearer" = [])),
    tag = "vaccines"
)]
#[instrument(skip(state))]
pub async fn unmark_vaccine(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((id, vaccine_id)): Path<(i64, i64)>,
) -> ApiResult<Json<UnmarkOutcome>> {
    Ok(Json(state.vaccines.unmark(&actor, id, vaccine_id).await?))
}
