use axum::{
    extract::{Json, State},
    Extension,
};
use tracing::instrument;

use vet_clinic_domain::access::Actor;
use vet_clinic_domain::services::dashboard::{Dashboard, Landing};

use crate::api::state::AppState;
use crate::entities::ApiResult;

/// Public figures and featured products for the home page
#[utoipa::path(
    get,
    path = "/api/v1/landing",
    responses((status = 200, description = "Landing figures", body = Landing)),
    tag = "dashboard"
)]
#[instrument(skip(state))]
pub async fn landing(State(state): State<AppState>) -> ApiResult<Json<Landing>> {
    Ok(Json(state.dashboard.landing().await?))
}

/// Dashboard of the caller's role
#[utoipa::path(
    get,
    path = "/api/v1/dashboard",
    responses((status = 200, description = "Role dashboard", body = Dashboard)),
    security(("bearer" = [])),
    tag = "dashboard"
)]
#[instrument(skip(state))]
pub async fn dashboard(State(state): State<AppState>, Extension(actor): Extension<Actor>) -> ApiResult<Json<Dashboard>> {
    Ok(Json(state.dashboard.dashboard(&actor).await?))
}
