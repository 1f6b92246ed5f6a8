use axum::{
    extract::{Json, Query, State},
    Extension,
};
use tracing::instrument;

use vet_clinic_domain::access::Actor;
use vet_clinic_domain::services::analytics::{AdminAnalytics, AnalyticsQuery, Indicators, VetTeamReport};

use crate::api::state::AppState;
use crate::entities::{ApiResult, ErrorResponse};

/// Pharmacy usage, vet output and owner activity
#[utoipa::path(
    get,
    path = "/api/v1/analytics",
    params(AnalyticsQuery),
    responses(
        (status = 200, description = "Administration analytics", body = AdminAnalytics),
        (status = 403, description = "Administrators only", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "analytics"
)]
#[instrument(skip(state))]
pub async fn admin_analytics(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<AdminAnalytics>> {
    Ok(Json(state.analytics.admin_analytics(&actor, query).await?))
}

/// Workload of every vet in scope
#[utoipa::path(
    get,
    path = "/api/v1/analytics/vets",
    responses((status = 200, description = "Vet team workload", body = VetTeamReport)),
    security(("bearer" = [])),
    tag = "analytics"
)]
#[instrument(skip(state))]
pub async fn vet_team(State(state): State<AppState>, Extension(actor): Extension<Actor>) -> ApiResult<Json<VetTeamReport>> {
    Ok(Json(state.analytics.vet_team(&actor).await?))
}

/// Appointment indicators over the last 30 days
#[utoipa::path(
    get,
    path = "/api/v1/analytics/indicators",
    responses((status = 200, description = "Indicators", body = Indicators)),
    security(("bearer" = [])),
    tag = "analytics"
)]
#[instrument(skip(state))]
pub async fn indicators(State(state): State<AppState>, Extension(actor): Extension<Actor>) -> ApiResult<Json<Indicators>> {
    Ok(Json(state.analytics.indicators(&actor).await?))
}
