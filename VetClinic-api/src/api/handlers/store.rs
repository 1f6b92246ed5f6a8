use axum::{
    extract::{Json, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Extension,
};
use tracing::{debug, instrument};

use vet_clinic_data::models::Product;
use vet_clinic_domain::access::Actor;
use vet_clinic_domain::services::store::{Catalogue, CatalogueQuery, ProductDetail, ProductRequest};

use crate::api::state::AppState;
use crate::entities::{ApiResult, ErrorResponse};

/// Caller of a public route that may carry a bearer token; a bad token
/// is treated as anonymous
async fn optional_caller(state: &AppState, headers: &HeaderMap) -> Option<Actor> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .trim();
    match state.auth.authenticate(token).await {
        Ok((actor, _)) => Some(actor),
        Err(e) => {
            debug!("Ignoring bearer token on public route: {}", e);
            None
        }
    }
}

/// Available products, optionally filtered
#[utoipa::path(
    get,
    path = "/api/v1/store/products",
    params(CatalogueQuery),
    responses((status = 200, description = "Catalogue", body = Catalogue)),
    tag = "store"
)]
#[instrument(skip(state))]
pub async fn catalogue(State(state): State<AppState>, Query(query): Query<CatalogueQuery>) -> ApiResult<Json<Catalogue>> {
    Ok(Json(state.store.catalogue(query).await?))
}

/// Product with related items and a WhatsApp contact link
#[utoipa::path(
    get,
    path = "/api/v1/store/products/{id}",
    params(("id" = i64, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product detail", body = ProductDetail),
        (status = 404, description = "Unknown or unavailable product", body = ErrorResponse)
    ),
    tag = "store"
)]
#[instrument(skip(state, headers))]
pub async fn product_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<ProductDetail>> {
    let caller = optional_caller(&state, &headers).await;
    Ok(Json(state.store.detail(caller.as_ref(), id).await?))
}

/// Every product, most recently updated first
#[utoipa::path(
    get,
    path = "/api/v1/admin/products",
    responses(
        (status = 200, description = "Products", body = [Product]),
        (status = 403, description = "Administrators only", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "store"
)]
#[instrument(skip(state))]
pub async fn admin_products(State(state): State<AppState>, Extension(actor): Extension<Actor>) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(state.store.admin_list(&actor).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/products",
    request_body = ProductRequest,
    responses(
        (status = 201, description = "Product created", body = Product),
        (status = 400, description = "Invalid data", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "store"
)]
#[instrument(skip(state))]
pub async fn create_product(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<ProductRequest>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    let product = state.store.create(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/products/{id}",
    params(("id" = i64, Path, description = "Product id")),
    request_body = ProductRequest,
    responses(
        (status = 200, description = "Product updated", body = Product),
        (status = 404, description = "Unknown product", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "store"
)]
#[instrument(skip(state))]
pub async fn update_product(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(request): Json<ProductRequest>,
) -> ApiResult<Json<Product>> {
    Ok(Json(state.store.update(&actor, id, request).await?))
}
