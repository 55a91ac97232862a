//! # Purchase Repository
//!
//! Purchase orders and their line items.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                 │
//! │    load purchase                                                       │
//! │    Purchase::apply_patch(..)      ← transition rules, stamping, auth   │
//! │    UPDATE purchases (+ rewrite purchase_items if items changed)        │
//! │    recompute_stats(vendor_id)     ← vendor figures from purchases      │
//! │  COMMIT                                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Create and delete follow the same shape. Bulk updates run this path once
//! per purchase, each in its own transaction.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use tally_core::purchase::{next_po_number, NewPurchase, PurchasePatch};
use tally_core::report::{DateRange, OverdueSummary, PurchaseAnalytics, StatusAmount};
use tally_core::{
    CoreError, Page, PageRequest, PaymentStatus, PaymentTerms, PermissionTable, Purchase,
    PurchaseCategory, PurchaseItem, PurchaseStatus, User,
};

use crate::error::{DbError, DbResult};
use crate::repository::like_pattern;
use crate::repository::report::{
    category_expenses, monthly_amounts, terms_amounts, vendor_expenses, SpendScope,
};
use crate::repository::vendor::{fetch_vendor, recompute_stats};

const PURCHASE_COLUMNS: &str = "id, purchase_order_number, vendor_id, description, category, \
                                total_amount_cents, status, payment_status, payment_terms, \
                                invoice_number, notes, purchase_date, expected_delivery_date, \
                                actual_delivery_date, approval_date, payment_date, created_by, \
                                approved_by, updated_by, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PurchaseRow {
    id: String,
    purchase_order_number: String,
    vendor_id: String,
    description: String,
    category: PurchaseCategory,
    total_amount_cents: i64,
    status: PurchaseStatus,
    payment_status: PaymentStatus,
    payment_terms: PaymentTerms,
    invoice_number: Option<String>,
    notes: Option<String>,
    purchase_date: DateTime<Utc>,
    expected_delivery_date: Option<DateTime<Utc>>,
    actual_delivery_date: Option<DateTime<Utc>>,
    approval_date: Option<DateTime<Utc>>,
    payment_date: Option<DateTime<Utc>>,
    created_by: String,
    approved_by: Option<String>,
    updated_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PurchaseRow {
    fn into_purchase(self, items: Vec<PurchaseItem>) -> Purchase {
        Purchase {
            id: self.id,
            purchase_order_number: self.purchase_order_number,
            vendor_id: self.vendor_id,
            description: self.description,
            category: self.category,
            items,
            total_amount_cents: self.total_amount_cents,
            status: self.status,
            payment_status: self.payment_status,
            payment_terms: self.payment_terms,
            invoice_number: self.invoice_number,
            notes: self.notes,
            purchase_date: self.purchase_date,
            expected_delivery_date: self.expected_delivery_date,
            actual_delivery_date: self.actual_delivery_date,
            approval_date: self.approval_date,
            payment_date: self.payment_date,
            created_by: self.created_by,
            approved_by: self.approved_by,
            updated_by: self.updated_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// =============================================================================
// Public Types
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct PurchaseFilter {
    pub status: Option<PurchaseStatus>,
    pub category: Option<PurchaseCategory>,
    pub vendor_id: Option<String>,
    /// Inclusive bounds on `purchase_date`.
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Matches description, PO number or invoice number.
    pub search: Option<String>,
}

/// A page of purchases plus the sum over every match, not just the page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseList {
    #[serde(flatten)]
    pub page: Page<Purchase>,
    pub total_amount_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkUpdateResult {
    /// Purchases that exist.
    pub matched: u64,
    /// Purchases the patch actually changed.
    pub modified: u64,
    pub failures: Vec<BulkFailure>,
}

// =============================================================================
// Purchase Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseRepository { pool }
    }

    /// Raises a pending purchase against an existing vendor.
    ///
    /// Without a client-supplied number the next `PO-<year>-<seq>` is used.
    ///
    /// ## Errors
    /// - `NotFound` if the vendor doesn't exist
    /// - `Conflict` if the supplied PO number is taken
    /// - `Validation` for bad fields or an empty item list
    pub async fn create(&self, input: &NewPurchase, actor: &User) -> DbResult<Purchase> {
        debug!(vendor_id = %input.vendor_id, actor_id = %actor.id, "Creating purchase");
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        if fetch_vendor(&mut tx, &input.vendor_id).await?.is_none() {
            return Err(DbError::not_found("Vendor", &input.vendor_id));
        }

        let supplied = input
            .purchase_order_number
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());
        let number = match supplied {
            Some(number) => {
                ensure_po_free(&mut tx, number).await?;
                number.to_string()
            }
            None => next_number(&mut tx, now).await?,
        };

        let purchase = Purchase::create(input, number, &actor.id, now)?;

        insert_purchase(&mut tx, &purchase).await?;
        replace_items(&mut tx, &purchase).await?;
        recompute_stats(&mut tx, &purchase.vendor_id).await?;
        tx.commit().await?;

        info!(
            purchase_id = %purchase.id,
            po = %purchase.purchase_order_number,
            total_cents = purchase.total_amount_cents,
            "Purchase created"
        );
        Ok(purchase)
    }

    pub async fn get(&self, id: &str) -> DbResult<Purchase> {
        let mut conn = self.pool.acquire().await?;
        fetch_purchase(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Purchase", id))
    }

    /// Newest purchase date first.
    pub async fn list(&self, filter: &PurchaseFilter, request: PageRequest) -> DbResult<PurchaseList> {
        const WHERE: &str = r#"
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR category = ?2)
              AND (?3 IS NULL OR vendor_id = ?3)
              AND (?4 IS NULL OR purchase_date >= ?4)
              AND (?5 IS NULL OR purchase_date <= ?5)
              AND (?6 IS NULL
                   OR lower(description) LIKE ?6 ESCAPE '\'
                   OR lower(purchase_order_number) LIKE ?6 ESCAPE '\'
                   OR lower(coalesce(invoice_number, '')) LIKE ?6 ESCAPE '\')
        "#;
        let search = filter.search.as_deref().map(like_pattern);

        let rows = sqlx::query_as::<_, PurchaseRow>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases {WHERE} \
             ORDER BY purchase_date DESC, created_at DESC LIMIT ?7 OFFSET ?8"
        ))
        .bind(filter.status)
        .bind(filter.category)
        .bind(&filter.vendor_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(&search)
        .bind(request.limit)
        .bind(request.offset())
        .fetch_all(&self.pool)
        .await?;

        let (total, total_amount_cents): (i64, i64) = sqlx::query_as(&format!(
            "SELECT COUNT(*), COALESCE(SUM(total_amount_cents), 0) FROM purchases {WHERE}"
        ))
        .bind(filter.status)
        .bind(filter.category)
        .bind(&filter.vendor_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(&search)
        .fetch_one(&self.pool)
        .await?;

        let mut conn = self.pool.acquire().await?;
        let purchases = with_items(&mut conn, rows).await?;

        Ok(PurchaseList {
            page: Page::new(purchases, total, request),
            total_amount_cents,
        })
    }

    /// Applies a patch on behalf of `actor`.
    ///
    /// ## Errors
    /// - `NotFound` if the purchase is absent
    /// - `Forbidden` if the status change implies approval the actor lacks
    /// - `InvalidTransition`, `InvalidState`, `Validation` from the patch
    pub async fn update(
        &self,
        id: &str,
        patch: &PurchasePatch,
        actor: &User,
        permissions: &PermissionTable,
    ) -> DbResult<Purchase> {
        let (purchase, _) = self.update_one(id, patch, actor, permissions).await?;
        Ok(purchase)
    }

    async fn update_one(
        &self,
        id: &str,
        patch: &PurchasePatch,
        actor: &User,
        permissions: &PermissionTable,
    ) -> DbResult<(Purchase, bool)> {
        let mut tx = self.pool.begin().await?;
        let mut purchase = fetch_purchase(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Purchase", id))?;
        let from = purchase.status;

        let changed = purchase
            .apply_patch(patch, actor, permissions, Utc::now())
            .map_err(|e| {
                if matches!(e, CoreError::Forbidden(_)) {
                    warn!(purchase_id = %id, actor_id = %actor.id, role = %actor.role, "Approval refused");
                }
                e
            })?;

        if !changed {
            debug!(purchase_id = %id, "Patch changed nothing");
            return Ok((purchase, false));
        }

        write_purchase(&mut tx, &purchase).await?;
        if patch.items.is_some() {
            replace_items(&mut tx, &purchase).await?;
        }
        recompute_stats(&mut tx, &purchase.vendor_id).await?;
        tx.commit().await?;

        info!(
            purchase_id = %id,
            from = %from,
            to = %purchase.status,
            actor_id = %actor.id,
            "Purchase updated"
        );
        Ok((purchase, true))
    }

    /// Applies the same patch to each purchase in turn. A failure on one does
    /// not stop the others.
    pub async fn bulk_update(
        &self,
        ids: &[String],
        patch: &PurchasePatch,
        actor: &User,
        permissions: &PermissionTable,
    ) -> DbResult<BulkUpdateResult> {
        debug!(count = ids.len(), actor_id = %actor.id, "Bulk updating purchases");
        let mut result = BulkUpdateResult::default();

        for id in ids {
            match self.update_one(id, patch, actor, permissions).await {
                Ok((_, changed)) => {
                    result.matched += 1;
                    if changed {
                        result.modified += 1;
                    }
                }
                Err(e) => {
                    if !matches!(e, DbError::NotFound { .. }) {
                        result.matched += 1;
                    }
                    result.failures.push(BulkFailure {
                        id: id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            matched = result.matched,
            modified = result.modified,
            failed = result.failures.len(),
            "Bulk update finished"
        );
        Ok(result)
    }

    /// ## Errors
    /// `InvalidState` unless the purchase is still pending.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let purchase = fetch_purchase(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Purchase", id))?;
        purchase.ensure_deletable()?;

        sqlx::query("DELETE FROM purchases WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        recompute_stats(&mut tx, &purchase.vendor_id).await?;
        tx.commit().await?;

        info!(purchase_id = %id, po = %purchase.purchase_order_number, "Purchase deleted");
        Ok(())
    }

    /// Breakdown of received/paid spend, a status summary over all purchases,
    /// and the currently overdue total.
    pub async fn analytics(&self, range: Option<DateRange>) -> DbResult<PurchaseAnalytics> {
        let scope = SpendScope {
            from: range.map(|r| r.from),
            to: range.map(|r| r.to),
            ..SpendScope::default()
        };

        let status_summary = sqlx::query_as::<_, StatusAmount>(
            r#"
            SELECT status, COUNT(*) AS count, COALESCE(SUM(total_amount_cents), 0) AS total_cents
            FROM purchases
            WHERE (?1 IS NULL OR purchase_date >= ?1) AND (?2 IS NULL OR purchase_date <= ?2)
            GROUP BY status
            ORDER BY count DESC
            "#,
        )
        .bind(scope.from)
        .bind(scope.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(PurchaseAnalytics {
            category_totals: category_expenses(&self.pool, &scope).await?,
            monthly_trends: monthly_amounts(&self.pool, &scope, false).await?,
            status_summary,
            top_vendors: vendor_expenses(&self.pool, &scope, 10).await?,
            payment_terms: terms_amounts(&self.pool, &scope).await?,
            overdue: self.overdue(Utc::now()).await?,
        })
    }

    /// Approved or received purchases past their payment terms as of `now`.
    pub async fn overdue(&self, now: DateTime<Utc>) -> DbResult<OverdueSummary> {
        let rows = sqlx::query_as::<_, PurchaseRow>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE status IN ('approved', 'received')"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_purchase(Vec::new()))
            .filter(|p| p.is_overdue(now))
            .fold(OverdueSummary::default(), |mut summary, p| {
                summary.count += 1;
                summary.total_cents += p.total_amount_cents;
                summary
            }))
    }
}

// =============================================================================
// Row Helpers
// =============================================================================

async fn fetch_purchase(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Purchase>> {
    let row = sqlx::query_as::<_, PurchaseRow>(&format!(
        "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(with_items(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

async fn with_items(conn: &mut SqliteConnection, rows: Vec<PurchaseRow>) -> DbResult<Vec<Purchase>> {
    let mut purchases = Vec::with_capacity(rows.len());
    for row in rows {
        let items = sqlx::query_as::<_, PurchaseItem>(
            r#"
            SELECT description, quantity, unit_price_cents, total_price_cents
            FROM purchase_items
            WHERE purchase_id = ?1
            ORDER BY position
            "#,
        )
        .bind(&row.id)
        .fetch_all(&mut *conn)
        .await?;
        purchases.push(row.into_purchase(items));
    }
    Ok(purchases)
}

async fn ensure_po_free(conn: &mut SqliteConnection, number: &str) -> DbResult<()> {
    let taken: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM purchases WHERE purchase_order_number = ?1")
            .bind(number)
            .fetch_one(&mut *conn)
            .await?;
    if taken > 0 {
        return Err(CoreError::Conflict {
            field: "purchaseOrderNumber",
            value: number.to_string(),
        }
        .into());
    }
    Ok(())
}

async fn next_number(conn: &mut SqliteConnection, now: DateTime<Utc>) -> DbResult<String> {
    let existing: Vec<String> = sqlx::query_scalar(
        "SELECT purchase_order_number FROM purchases WHERE purchase_order_number LIKE ?1",
    )
    .bind(format!("PO-{}-%", now.year()))
    .fetch_all(&mut *conn)
    .await?;

    Ok(next_po_number(existing.iter().map(String::as_str), now)?)
}

async fn insert_purchase(conn: &mut SqliteConnection, p: &Purchase) -> DbResult<()> {
    sqlx::query(&format!(
        "INSERT INTO purchases ({PURCHASE_COLUMNS}) VALUES \
         (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)"
    ))
    .bind(&p.id)
    .bind(&p.purchase_order_number)
    .bind(&p.vendor_id)
    .bind(&p.description)
    .bind(p.category)
    .bind(p.total_amount_cents)
    .bind(p.status)
    .bind(p.payment_status)
    .bind(p.payment_terms)
    .bind(&p.invoice_number)
    .bind(&p.notes)
    .bind(p.purchase_date)
    .bind(p.expected_delivery_date)
    .bind(p.actual_delivery_date)
    .bind(p.approval_date)
    .bind(p.payment_date)
    .bind(&p.created_by)
    .bind(&p.approved_by)
    .bind(&p.updated_by)
    .bind(p.created_at)
    .bind(p.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn write_purchase(conn: &mut SqliteConnection, p: &Purchase) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE purchases SET
            description = ?2, category = ?3, total_amount_cents = ?4, status = ?5,
            payment_status = ?6, payment_terms = ?7, invoice_number = ?8, notes = ?9,
            expected_delivery_date = ?10, actual_delivery_date = ?11, approval_date = ?12,
            payment_date = ?13, approved_by = ?14, updated_by = ?15, updated_at = ?16
        WHERE id = ?1
        "#,
    )
    .bind(&p.id)
    .bind(&p.description)
    .bind(p.category)
    .bind(p.total_amount_cents)
    .bind(p.status)
    .bind(p.payment_status)
    .bind(p.payment_terms)
    .bind(&p.invoice_number)
    .bind(&p.notes)
    .bind(p.expected_delivery_date)
    .bind(p.actual_delivery_date)
    .bind(p.approval_date)
    .bind(p.payment_date)
    .bind(&p.approved_by)
    .bind(&p.updated_by)
    .bind(p.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn replace_items(conn: &mut SqliteConnection, p: &Purchase) -> DbResult<()> {
    sqlx::query("DELETE FROM purchase_items WHERE purchase_id = ?1")
        .bind(&p.id)
        .execute(&mut *conn)
        .await?;

    for (position, item) in p.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO purchase_items (
                purchase_id, position, description, quantity, unit_price_cents, total_price_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&p.id)
        .bind(position as i64)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.total_price_cents)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
