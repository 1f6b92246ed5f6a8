use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    Extension,
};
use tracing::{info, instrument};

use vet_clinic_data::models::Appointment;
use vet_clinic_data::repository::VisitOutcome;
use vet_clinic_domain::access::Actor;
use vet_clinic_domain::services::appointment::{
    ActionOutcome, ActionRequest, AppointmentBoard, AppointmentDetail, AppointmentQuery,
    AssignVetRequest, PendingQueue, RequestAppointment, ScheduleAppointment,
};
use vet_clinic_domain::services::visit::CompleteVisitRequest;

use crate::api::state::AppState;
use crate::entities::{ApiResult, ErrorResponse};

/// Appointments visible to the caller, grouped for the board
#[utoipa::path(
    get,
    path = "/api/v1/appointments",
    params(AppointmentQuery),
    responses((status = 200, description = "Upcoming, pending and past appointments", body = AppointmentBoard)),
    security(("bearer" = [])),
    tag = "appointments"
)]
#[instrument(skip(state))]
pub async fn list_appointments(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<AppointmentQuery>,
) -> ApiResult<Json<AppointmentBoard>> {
    Ok(Json(state.appointments.list(&actor, query).await?))
}

/// An owner asks for an appointment for one of their pets
#[utoipa::path(
    post,
    path = "/api/v1/appointments",
    request_body = RequestAppointment,
    responses(
        (status = 201, description = "Pending appointment", body = Appointment),
        (status = 400, description = "Past date or unknown branch", body = ErrorResponse),
        (status = 403, description = "Owners only", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "appointments"
)]
#[instrument(skip(state))]
pub async fn request_appointment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<RequestAppointment>,
) -> ApiResult<(StatusCode, Json<Appointment>)> {
    let appointment = state.appointments.request(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

/// An administrator books a confirmed appointment with a vet
#[utoipa::path(
    post,
    path = "/api/v1/appointments/schedule",
    request_body = ScheduleAppointment,
    responses(
        (status = 201, description = "Scheduled appointment", body = Appointment),
        (status = 400, description = "Past time or vet not available in the branch", body = ErrorResponse),
        (status = 403, description = "Branch not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "appointments"
)]
#[instrument(skip(state))]
pub async fn schedule_appointment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<ScheduleAppointment>,
) -> ApiResult<(StatusCode, Json<Appointment>)> {
    let appointment = state.appointments.schedule(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

/// Requests waiting for a vet, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/appointments/pending",
    responses((status = 200, description = "Pending queue with available vets", body = PendingQueue)),
    security(("bearer" = [])),
    tag = "appointments"
)]
#[instrument(skip(state))]
pub async fn pending_queue(State(state): State<AppState>, Extension(actor): Extension<Actor>) -> ApiResult<Json<PendingQueue>> {
    Ok(Json(state.appointments.pending_queue(&actor).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/appointments/{id}",
    params(("id" = i64, Path, description = "Appointment id")),
    responses(
        (status = 200, description = "Appointment with record and contact links", body = AppointmentDetail),
        (status = 404, description = "Unknown or out of scope", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "appointments"
)]
#[instrument(skip(state))]
pub async fn get_appointment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<Json<AppointmentDetail>> {
    Ok(Json(state.appointments.detail(&actor, id).await?))
}

/// Confirm a vet and a time
#[utoipa::path(
    post,
    path = "/api/v1/appointments/{id}/assign",
    params(("id" = i64, Path, description = "Appointment id")),
    request_body = AssignVetRequest,
    responses(
        (status = 200, description = "Scheduled appointment", body = Appointment),
        (status = 400, description = "Past time, closed appointment or vet not available", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "appointments"
)]
#[instrument(skip(state))]
pub async fn assign_vet(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(request): Json<AssignVetRequest>,
) -> ApiResult<Json<Appointment>> {
    Ok(Json(state.appointments.assign_vet(&actor, id, request).await?))
}

/// Cancel, mark attended or reopen
#[utoipa::path(
    post,
    path = "/api/v1/appointments/{id}/actions",
    params(("id" = i64, Path, description = "Appointment id")),
    request_body = ActionRequest,
    responses((status = 200, description = "Resulting appointment", body = ActionOutcome)),
    security(("bearer" = [])),
    tag = "appointments"
)]
#[instrument(skip(state))]
pub async fn apply_action(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(request): Json<ActionRequest>,
) -> ApiResult<Json<ActionOutcome>> {
    Ok(Json(state.appointments.apply_action(&actor, id, request.action).await?))
}

/// Record the visit and reconcile dispensed medications with stock
#[utoipa::path(
    post,
    path = "/api/v1/appointments/{id}/complete",
    params(("id" = i64, Path, description = "Appointment id")),
    request_body = CompleteVisitRequest,
    responses(
        (status = 200, description = "Record and stock changes", body = VisitOutcome),
        (status = 400, description = "Invalid quantities or medication of another branch", body = ErrorResponse),
        (status = 403, description = "Not the vet of this appointment", body = ErrorResponse),
        (status = 409, description = "Insufficient stock", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "appointments"
)]
#[instrument(skip(state))]
pub async fn complete_visit(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(request): Json<CompleteVisitRequest>,
) -> ApiResult<Json<VisitOutcome>> {
    let outcome = state.visits.complete(&actor, id, request).await?;
    info!("Appointment {} completed by {}", id, actor.username);
    Ok(Json(outcome))
}
