use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::errors::RepositoryError;
use super::query::Conditions;
use crate::database::DatabasePool;
use crate::models::{
    now_utc, timestamp_at, to_db_timestamp, Product, ProductCategory, ProductFilter, ProductInput,
};

const PRODUCT_COLUMNS: &str = "SELECT id, name, description, category, price_cents,
        contact_phone, available, created_at, updated_at
    FROM products";

fn map_product(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        price_cents: row.get(4)?,
        contact_phone: row.get(5)?,
        available: row.get(6)?,
        created_at: timestamp_at(row, 7)?,
        updated_at: timestamp_at(row, 8)?,
    })
}

fn fetch(conn: &Connection, id: i64) -> rusqlite::Result<Product> {
    conn.query_row(&format!("{} WHERE id = ?1", PRODUCT_COLUMNS), [id], map_product)
}

/// Repository for storefront products
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: DatabasePool,
}

impl ProductRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Products matching `filter`, by name unless `newest_first` is set
    pub fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        debug!("Listing products with {:?}", filter);
        let mut conds = Conditions::new();
        if filter.available_only {
            conds.push("available = 1", []);
        }
        conds.push_opt("category = ?", filter.category.map(|c| c.as_str().to_string()));
        conds.search(&["name", "description"], filter.search.as_deref());

        let order = if filter.newest_first {
            "updated_at DESC, id DESC"
        } else {
            "name COLLATE NOCASE, id"
        };
        let limit = filter
            .limit
            .map(|n| format!(" LIMIT {}", n))
            .unwrap_or_default();

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{}{} ORDER BY {}{}",
            PRODUCT_COLUMNS,
            conds.where_sql(),
            order,
            limit
        ))?;
        let products = stmt
            .query_map(params_from_iter(conds.params()), map_product)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }

    pub fn get(&self, id: i64) -> Result<Option<Product>, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(fetch(&conn, id).optional()?)
    }

    pub fn create(&self, input: &ProductInput) -> Result<Product, RepositoryError> {
        let conn = self.pool.get()?;
        let now = to_db_timestamp(&now_utc());
        conn.execute(
            "INSERT INTO products (name, description, category, price_cents, contact_phone,
                available, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                input.name.trim(),
                input.description.trim(),
                input.category,
                input.price_cents,
                input.contact_phone.trim(),
                input.available,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!("Created product {} '{}'", id, input.name.trim());
        Ok(fetch(&conn, id)?)
    }

    pub fn update(&self, id: i64, input: &ProductInput) -> Result<Product, RepositoryError> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE products SET name = ?1, description = ?2, category = ?3, price_cents = ?4,
                contact_phone = ?5, available = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                input.name.trim(),
                input.description.trim(),
                input.category,
                input.price_cents,
                input.contact_phone.trim(),
                input.available,
                to_db_timestamp(&now_utc()),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(format!("Product {}", id)));
        }
        info!("Updated product {}", id);
        Ok(fetch(&conn, id)?)
    }

    /// Other available products of the same category, most recently updated first
    pub fn related(
        &self,
        product_id: i64,
        category: ProductCategory,
        limit: usize,
    ) -> Result<Vec<Product>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE available = 1 AND category = ?1 AND id <> ?2
             ORDER BY updated_at DESC, id DESC LIMIT ?3",
            PRODUCT_COLUMNS
        ))?;
        let products = stmt
            .query_map(params![category, product_id, limit as i64], map_product)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }

    pub fn count_available(&self) -> Result<i64, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM products WHERE available = 1", [], |row| row.get(0))?)
    }
}
