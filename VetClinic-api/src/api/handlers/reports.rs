use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Extension,
};
use tracing::{info, instrument};

use vet_clinic_domain::access::Actor;
use vet_clinic_domain::services::reports::{DossierQuery, InventoryReportQuery, ReportFile, REPORT_CONTENT_TYPE};

use crate::api::state::AppState;
use crate::entities::{ApiResult, ErrorResponse};

fn attachment(report: ReportFile) -> Response {
    let disposition = format!("attachment; filename={}", report.file_name);
    let mut response = report.content.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(REPORT_CONTENT_TYPE));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

/// Pharmacy dispensation export
#[utoipa::path(
    get,
    path = "/api/v1/reports/inventory",
    params(InventoryReportQuery),
    responses(
        (status = 200, description = "Spreadsheet export", content_type = "application/vnd.ms-excel", body = String),
        (status = 403, description = "Administrators only", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "reports"
)]
#[instrument(skip(state))]
pub async fn inventory_report(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<InventoryReportQuery>,
) -> ApiResult<Response> {
    let report = state.reports.inventory_report(&actor, query).await?;
    info!("Serving {}", report.file_name);
    Ok(attachment(report))
}

/// Complete dossier of one owner
#[utoipa::path(
    get,
    path = "/api/v1/reports/owners/{id}",
    params(("id" = i64, Path, description = "Owner id"), DossierQuery),
    responses(
        (status = 200, description = "Spreadsheet export", content_type = "application/vnd.ms-excel", body = String),
        (status = 403, description = "Branch not allowed", body = ErrorResponse),
        (status = 404, description = "Unknown owner or no appointments in the branch", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "reports"
)]
#[instrument(skip(state))]
pub async fn owner_dossier(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Query(query): Query<DossierQuery>,
) -> ApiResult<Response> {
    let report = state.reports.owner_dossier(&actor, id, query).await?;
    info!("Serving {}", report.file_name);
    Ok(attachment(report))
}
