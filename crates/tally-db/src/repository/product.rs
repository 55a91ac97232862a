//! # Product Repository
//!
//! Catalogue records and the stock ledger.
//!
//! ## Stock Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Every stock change, one shape                        │
//! │                                                                         │
//! │  BEGIN                                                                 │
//! │    SELECT product                                  (stock = 10)        │
//! │    apply_stock_delta(product, +5, restock, ..)     tally-core          │
//! │    UPDATE products SET stock = 15                                      │
//! │      WHERE id = ? AND stock = 10      ◄── compare-and-set              │
//! │    INSERT INTO stock_entries (10 → 15, restock, actor)                 │
//! │  COMMIT                                                                │
//! │                                                                         │
//! │  0 rows updated → someone else moved the stock first → rollback        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Checkout (in the cart repository) uses the same two helpers,
//! [`fetch_product`] and [`save_stock_change`], inside its own transaction.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tally_core::product::{NewProduct, ProductPatch};
use tally_core::validation::validate_restock_quantity;
use tally_core::{
    apply_stock_delta, CoreError, Page, PageRequest, Product, ProductCategory, StockEntry,
    StockReason,
};

use crate::error::{DbError, DbResult};
use crate::repository::like_pattern;

const PRODUCT_COLUMNS: &str =
    "id, name, description, price_cents, barcode, category, stock, created_at, updated_at";

/// Note written on restocks that come without one.
pub const DEFAULT_RESTOCK_NOTE: &str = "Stock updated";

/// List filters. Both are optional.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<ProductCategory>,
    /// Case-insensitive substring of the name.
    pub search: Option<String>,
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = ProductRepository::new(pool);
/// let product = repo.restock("uuid-here", 5, None, Some("manager-id")).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Creates a product. A non-zero opening stock writes an `initial` ledger
    /// entry in the same transaction.
    ///
    /// ## Errors
    /// - `Validation` for bad fields
    /// - `Conflict` if the barcode is taken
    pub async fn create(&self, input: &NewProduct, actor_id: Option<&str>) -> DbResult<Product> {
        let input = input.validate().map_err(CoreError::from)?;
        debug!(barcode = %input.barcode, "Creating product");

        let mut tx = self.pool.begin().await?;
        ensure_barcode_free(&mut tx, &input.barcode, None).await?;

        let now = Utc::now();
        let mut product = Product {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            description: input.description,
            price_cents: input.price_cents,
            barcode: input.barcode,
            category: input.category,
            stock: 0,
            created_at: now,
            updated_at: now,
        };
        let opening = if input.stock > 0 {
            Some(apply_stock_delta(
                &mut product,
                input.stock,
                StockReason::Initial,
                Some("Initial stock".to_string()),
                actor_id,
                now,
            )?)
        } else {
            None
        };

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, description, price_cents, barcode, category, stock,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(&product.barcode)
        .bind(product.category)
        .bind(product.stock)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?;

        if let Some(entry) = &opening {
            insert_entry(&mut tx, entry).await?;
        }

        tx.commit().await?;
        info!(product_id = %product.id, stock = product.stock, "Product created");
        Ok(product)
    }

    /// ## Errors
    /// `NotFound` if no product has this id.
    pub async fn get(&self, id: &str) -> DbResult<Product> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// ## Errors
    /// `NotFound` if no product has this barcode.
    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Product> {
        let barcode = barcode.trim();
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE barcode = ?1"
        ))
        .bind(barcode)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Product", barcode))
    }

    /// Products ordered by name.
    pub async fn list(&self, filter: &ProductFilter, request: PageRequest) -> DbResult<Page<Product>> {
        let search = filter.search.as_deref().filter(|s| !s.trim().is_empty()).map(like_pattern);
        debug!(category = ?filter.category, search = ?search, page = request.page, "Listing products");

        const WHERE: &str = r#"
            WHERE (?1 IS NULL OR category = ?1)
              AND (?2 IS NULL OR LOWER(name) LIKE ?2 ESCAPE '\')
        "#;

        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products {WHERE} ORDER BY name COLLATE NOCASE, id LIMIT ?3 OFFSET ?4"
        ))
        .bind(filter.category)
        .bind(&search)
        .bind(request.limit)
        .bind(request.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products {WHERE}"))
            .bind(filter.category)
            .bind(&search)
            .fetch_one(&self.pool)
            .await?;

        Ok(Page::new(products, total, request))
    }

    /// Updates descriptive fields. Stock is not touched.
    ///
    /// ## Errors
    /// - `NotFound`, `Validation`
    /// - `Conflict` if the new barcode belongs to another product
    pub async fn update(&self, id: &str, patch: &ProductPatch) -> DbResult<Product> {
        let mut tx = self.pool.begin().await?;
        let mut product = fetch_product(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))?;

        if patch.is_empty() {
            return Ok(product);
        }
        patch.apply(&mut product, Utc::now()).map_err(CoreError::from)?;
        ensure_barcode_free(&mut tx, &product.barcode, Some(id)).await?;

        sqlx::query(
            r#"
            UPDATE products SET
                name = ?2, description = ?3, price_cents = ?4, barcode = ?5,
                category = ?6, updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(&product.barcode)
        .bind(product.category)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(product_id = %id, "Product updated");
        Ok(product)
    }

    /// Adds `quantity` units. The note defaults to [`DEFAULT_RESTOCK_NOTE`].
    ///
    /// ## Errors
    /// - `Validation` for a negative quantity
    /// - `NotFound` if the product is gone
    pub async fn restock(
        &self,
        id: &str,
        quantity: i64,
        note: Option<String>,
        actor_id: Option<&str>,
    ) -> DbResult<Product> {
        validate_restock_quantity(quantity).map_err(CoreError::from)?;
        let note = note
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RESTOCK_NOTE.to_string());
        self.apply_delta(id, quantity, StockReason::Restock, Some(note), actor_id)
            .await
    }

    /// Moves stock by `delta` for `reason` and records it in the ledger.
    ///
    /// ## Errors
    /// `InsufficientStock` if the stock would go below zero. Nothing is
    /// written in that case.
    pub async fn apply_delta(
        &self,
        id: &str,
        delta: i64,
        reason: StockReason,
        note: Option<String>,
        actor_id: Option<&str>,
    ) -> DbResult<Product> {
        debug!(product_id = %id, delta, reason = ?reason, "Applying stock delta");

        let mut tx = self.pool.begin().await?;
        let mut product = fetch_product(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))?;

        let previous = product.stock;
        let entry = apply_stock_delta(&mut product, delta, reason, note, actor_id, Utc::now())?;
        save_stock_change(&mut tx, &product, previous, &entry).await?;

        tx.commit().await?;
        info!(
            product_id = %id,
            previous_stock = entry.previous_stock,
            new_stock = entry.new_stock,
            "Stock changed"
        );
        Ok(product)
    }

    /// Ledger entries for a product, newest first.
    pub async fn history(&self, id: &str) -> DbResult<Vec<StockEntry>> {
        // 404 rather than an empty list for unknown products
        self.get(id).await?;

        let entries = sqlx::query_as::<_, StockEntry>(
            r#"
            SELECT id, product_id, quantity_change, previous_stock, new_stock, reason,
                   note, actor_id, created_at
            FROM stock_entries
            WHERE product_id = ?1
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Deletes a product and its ledger.
    ///
    /// ## Errors
    /// `InvalidState` while any cart holds the product.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        if fetch_product(&mut tx, id).await?.is_none() {
            return Err(DbError::not_found("Product", id));
        }

        let in_carts: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM cart_items WHERE product_id = ?1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if in_carts > 0 {
            warn!(product_id = %id, carts = in_carts, "Refusing to delete product held in carts");
            return Err(CoreError::invalid_state(
                "product",
                format!("is in {in_carts} cart(s) and cannot be deleted"),
            )
            .into());
        }

        sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(product_id = %id, "Product deleted");
        Ok(())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Shared helpers (also used by checkout)
// =============================================================================

pub(crate) async fn fetch_product(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(product)
}

/// Writes the product's new stock, provided it still holds `previous`, and
/// appends the ledger entry.
///
/// ## Errors
/// `TransactionFailed` if another writer changed the stock in between.
pub(crate) async fn save_stock_change(
    conn: &mut SqliteConnection,
    product: &Product,
    previous: i64,
    entry: &StockEntry,
) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE products SET stock = ?2, updated_at = ?3 WHERE id = ?1 AND stock = ?4",
    )
    .bind(&product.id)
    .bind(product.stock)
    .bind(product.updated_at)
    .bind(previous)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        warn!(product_id = %product.id, "Stock changed concurrently");
        return Err(DbError::TransactionFailed(format!(
            "stock of product {} changed concurrently, retry",
            product.id
        )));
    }

    insert_entry(conn, entry).await
}

async fn insert_entry(conn: &mut SqliteConnection, entry: &StockEntry) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_entries (
            id, product_id, quantity_change, previous_stock, new_stock, reason,
            note, actor_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.product_id)
    .bind(entry.quantity_change)
    .bind(entry.previous_stock)
    .bind(entry.new_stock)
    .bind(entry.reason)
    .bind(&entry.note)
    .bind(&entry.actor_id)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn ensure_barcode_free(
    conn: &mut SqliteConnection,
    barcode: &str,
    except_id: Option<&str>,
) -> DbResult<()> {
    let taken: Option<String> =
        sqlx::query_scalar("SELECT id FROM products WHERE barcode = ?1 AND (?2 IS NULL OR id != ?2)")
            .bind(barcode)
            .bind(except_id)
            .fetch_optional(&mut *conn)
            .await?;

    match taken {
        Some(_) => Err(CoreError::Conflict {
            field: "barcode",
            value: barcode.to_string(),
        }
        .into()),
        None => Ok(()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
