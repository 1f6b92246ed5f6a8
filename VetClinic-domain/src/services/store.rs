//! Public storefront and its administration

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use validator::Validate;

use vet_clinic_data::database::DatabasePool;
use vet_clinic_data::models::{Product, ProductCategory, ProductFilter, ProductInput, Role};
use vet_clinic_data::repository::ProductRepository;

use crate::access::Actor;
use crate::error::{validate_payload, ServiceError};
use crate::services::contact::{phone_digits, whatsapp_url, CLINIC_NAME, DEFAULT_PHONE};

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::IntoParams), into_params(parameter_in = Query))]
pub struct CatalogueQuery {
    /// `food`, `medicine` or `accessories`; anything else is ignored
    pub category: Option<String>,
    /// Name or description
    pub q: Option<String>,
}

/// Product as submitted by an admin; the price is in currency units
#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct ProductRequest {
    #[validate(length(min = 1, max = 150, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: ProductCategory,
    #[validate(range(min = 0.01, message = "The price must be at least 0.01"))]
    pub price: f64,
    #[serde(default)]
    pub contact_phone: String,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

impl ProductRequest {
    fn input(&self) -> ProductInput {
        ProductInput {
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            category: self.category,
            price_cents: (self.price * 100.0).round() as i64,
            contact_phone: self.contact_phone.trim().to_string(),
            available: self.available,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct Catalogue {
    pub products: Vec<Product>,
    pub category: Option<ProductCategory>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct ProductDetail {
    pub product: Product,
    pub price: String,
    pub related: Vec<Product>,
    pub whatsapp_phone: String,
    pub whatsapp_message: String,
    pub whatsapp_url: String,
}

#[async_trait]
pub trait StoreServiceTrait: Send + Sync {
    async fn catalogue(&self, query: CatalogueQuery) -> Result<Catalogue, ServiceError>;

    /// Unavailable products are only visible to admins
    async fn detail(&self, actor: Option<&Actor>, product_id: i64) -> Result<ProductDetail, ServiceError>;

    async fn admin_list(&self, actor: &Actor) -> Result<Vec<Product>, ServiceError>;

    async fn create(&self, actor: &Actor, request: ProductRequest) -> Result<Product, ServiceError>;

    async fn update(&self, actor: &Actor, id: i64, request: ProductRequest) -> Result<Product, ServiceError>;

    /// Most recently updated available products
    async fn featured(&self, limit: usize) -> Result<Vec<Product>, ServiceError>;
}

pub struct StoreService {
    products: ProductRepository,
}

impl StoreService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            products: ProductRepository::new(pool),
        }
    }
}

pub(crate) fn product_message(product: &Product) -> String {
    format!(
        "Hi {}! I'm interested in {} (${}). Is it available?",
        CLINIC_NAME,
        product.name,
        product.price_display()
    )
}

#[async_trait]
impl StoreServiceTrait for StoreService {
    async fn catalogue(&self, query: CatalogueQuery) -> Result<Catalogue, ServiceError> {
        let category = query
            .category
            .as_deref()
            .and_then(|raw| raw.trim().parse::<ProductCategory>().ok());
        let search = query
            .q
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        let products = self.products.list(&ProductFilter {
            available_only: true,
            category,
            search: search.clone(),
            ..ProductFilter::default()
        })?;
        debug!("Catalogue returned {} products", products.len());
        Ok(Catalogue {
            products,
            category,
            search,
        })
    }

    async fn detail(&self, actor: Option<&Actor>, product_id: i64) -> Result<ProductDetail, ServiceError> {
        let is_admin = actor.map_or(false, |a| a.has_role(Role::Admin));
        let product = self
            .products
            .get(product_id)?
            .filter(|p| p.available || is_admin)
            .ok_or_else(|| ServiceError::not_found(format!("Product {} not found", product_id)))?;

        let phone = if phone_digits(&product.contact_phone).is_empty() {
            DEFAULT_PHONE
        } else {
            product.contact_phone.as_str()
        };
        let message = product_message(&product);
        Ok(ProductDetail {
            related: self.products.related(product.id, product.category, 4)?,
            price: product.price_display(),
            whatsapp_phone: phone_digits(phone),
            whatsapp_url: whatsapp_url(phone, Some(&message)),
            whatsapp_message: message,
            product,
        })
    }

    async fn admin_list(&self, actor: &Actor) -> Result<Vec<Product>, ServiceError> {
        actor.require_any(&[Role::Admin])?;
        Ok(self.products.list(&ProductFilter {
            newest_first: true,
            ..ProductFilter::default()
        })?)
    }

    async fn create(&self, actor: &Actor, request: ProductRequest) -> Result<Product, ServiceError> {
        actor.require_any(&[Role::Admin])?;
        validate_payload(&request)?;
        let product = self.products.create(&request.input())?;
        info!("{} created product {} '{}'", actor.username, product.id, product.name);
        Ok(product)
    }

    async fn update(&self, actor: &Actor, id: i64, request: ProductRequest) -> Result<Product, ServiceError> {
        actor.require_any(&[Role::Admin])?;
        validate_payload(&request)?;
        let product = self.products.update(id, &request.input())?;
        info!("{} updated product {}", actor.username, product.id);
        Ok(product)
    }

    async fn featured(&self, limit: usize) -> Result<Vec<Product>, ServiceError> {
        Ok(self.products.list(&ProductFilter {
            available_only: true,
            newest_first: true,
            limit: Some(limit),
            ..ProductFilter::default()
        })?)
    }
}

pub fn create_default_store_service(pool: DatabasePool) -> Arc<dyn StoreServiceTrait> {
    Arc::new(StoreService::new(pool))
}
