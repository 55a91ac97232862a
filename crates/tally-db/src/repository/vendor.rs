//! # Vendor Repository
//!
//! Vendors and their rolled-up purchase statistics.
//!
//! The stored statistics (`total_purchases`, `total_spent_cents`,
//! `last_purchase_date`) are only written by [`recompute_stats`], which every
//! purchase write calls inside its own transaction.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use tally_core::report::{DateRange, TermsAmount, VendorAnalytics, VendorStatusCount};
use tally_core::vendor::{PurchaseFigures, VendorInput};
use tally_core::{
    Address, CoreError, Page, PageRequest, PaymentTerms, PurchaseCategory, Vendor, VendorStats,
    VendorStatus,
};

use crate::error::{DbError, DbResult};
use crate::repository::like_pattern;
use crate::repository::report::{vendor_expenses, SpendScope};

const VENDOR_COLUMNS: &str = "id, name, company_name, email, phone, street, city, state, \
                              zip_code, country, tax_id, payment_terms, categories, status, \
                              rating, notes, total_purchases, total_spent_cents, \
                              last_purchase_date, created_by, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct VendorRow {
    id: String,
    name: String,
    company_name: Option<String>,
    email: String,
    phone: Option<String>,
    street: Option<String>,
    city: Option<String>,
    state: Option<String>,
    zip_code: Option<String>,
    country: String,
    tax_id: Option<String>,
    payment_terms: PaymentTerms,
    categories: String,
    status: VendorStatus,
    rating: Option<i64>,
    notes: Option<String>,
    total_purchases: i64,
    total_spent_cents: i64,
    last_purchase_date: Option<DateTime<Utc>>,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VendorRow> for Vendor {
    type Error = DbError;

    fn try_from(row: VendorRow) -> DbResult<Vendor> {
        let categories: Vec<PurchaseCategory> = serde_json::from_str(&row.categories)?;
        Ok(Vendor {
            id: row.id,
            name: row.name,
            company_name: row.company_name,
            email: row.email,
            phone: row.phone,
            address: Address {
                street: row.street,
                city: row.city,
                state: row.state,
                zip_code: row.zip_code,
                country: row.country,
            },
            tax_id: row.tax_id,
            payment_terms: row.payment_terms,
            categories,
            status: row.status,
            rating: row.rating,
            notes: row.notes,
            stats: VendorStats {
                total_purchases: row.total_purchases,
                total_spent_cents: row.total_spent_cents,
                last_purchase_date: row.last_purchase_date,
            },
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct VendorFilter {
    pub status: Option<VendorStatus>,
    /// Matches name, company name or email.
    pub search: Option<String>,
}

/// A vendor with statistics computed live over all of its purchases.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorDetail {
    #[serde(flatten)]
    pub vendor: Vendor,
    pub purchase_count: i64,
    pub total_amount_cents: i64,
    pub avg_amount_cents: i64,
}

#[derive(sqlx::FromRow)]
struct LiveTotals {
    purchase_count: i64,
    total_amount_cents: i64,
}

#[derive(Debug, Clone)]
pub struct VendorRepository {
    pool: SqlitePool,
}

impl VendorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        VendorRepository { pool }
    }

    /// ## Errors
    /// - `Validation` for bad fields
    /// - `Conflict` if the email belongs to another vendor
    pub async fn create(&self, input: &VendorInput, actor_id: &str) -> DbResult<Vendor> {
        let vendor = Vendor::create(input, actor_id, Utc::now()).map_err(CoreError::from)?;
        debug!(email = %vendor.email, "Creating vendor");

        let mut tx = self.pool.begin().await?;
        ensure_email_free(&mut tx, &vendor.email, None).await?;

        sqlx::query(
            r#"
            INSERT INTO vendors (
                id, name, company_name, email, phone, street, city, state, zip_code,
                country, tax_id, payment_terms, categories, status, rating, notes,
                total_purchases, total_spent_cents, last_purchase_date,
                created_by, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                0, 0, NULL, ?17, ?18, ?19
            )
            "#,
        )
        .bind(&vendor.id)
        .bind(&vendor.name)
        .bind(&vendor.company_name)
        .bind(&vendor.email)
        .bind(&vendor.phone)
        .bind(&vendor.address.street)
        .bind(&vendor.address.city)
        .bind(&vendor.address.state)
        .bind(&vendor.address.zip_code)
        .bind(&vendor.address.country)
        .bind(&vendor.tax_id)
        .bind(vendor.payment_terms)
        .bind(serde_json::to_string(&vendor.categories)?)
        .bind(vendor.status)
        .bind(vendor.rating)
        .bind(&vendor.notes)
        .bind(&vendor.created_by)
        .bind(vendor.created_at)
        .bind(vendor.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(vendor_id = %vendor.id, name = %vendor.name, "Vendor created");
        Ok(vendor)
    }

    pub async fn get(&self, id: &str) -> DbResult<Vendor> {
        let mut conn = self.pool.acquire().await?;
        fetch_vendor(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Vendor", id))
    }

    /// The vendor plus live purchase count, total and average.
    pub async fn get_detail(&self, id: &str) -> DbResult<VendorDetail> {
        let vendor = self.get(id).await?;

        let live = sqlx::query_as::<_, LiveTotals>(
            r#"
            SELECT COUNT(*) AS purchase_count,
                   COALESCE(SUM(total_amount_cents), 0) AS total_amount_cents
            FROM purchases
            WHERE vendor_id = ?1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        let avg_amount_cents = if live.purchase_count == 0 {
            0
        } else {
            live.total_amount_cents / live.purchase_count
        };

        Ok(VendorDetail {
            vendor,
            purchase_count: live.purchase_count,
            total_amount_cents: live.total_amount_cents,
            avg_amount_cents,
        })
    }

    pub async fn list(&self, filter: &VendorFilter, request: PageRequest) -> DbResult<Page<Vendor>> {
        const WHERE: &str = r#"
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL
                   OR lower(name) LIKE ?2 ESCAPE '\'
                   OR lower(coalesce(company_name, '')) LIKE ?2 ESCAPE '\'
                   OR email LIKE ?2 ESCAPE '\')
        "#;
        let search = filter.search.as_deref().map(like_pattern);

        let rows = sqlx::query_as::<_, VendorRow>(&format!(
            "SELECT {VENDOR_COLUMNS} FROM vendors {WHERE} \
             ORDER BY name COLLATE NOCASE LIMIT ?3 OFFSET ?4"
        ))
        .bind(filter.status)
        .bind(&search)
        .bind(request.limit)
        .bind(request.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM vendors {WHERE}"))
            .bind(filter.status)
            .bind(&search)
            .fetch_one(&self.pool)
            .await?;

        let vendors = rows
            .into_iter()
            .map(Vendor::try_from)
            .collect::<DbResult<Vec<_>>>()?;
        Ok(Page::new(vendors, total, request))
    }

    /// Replaces the descriptive fields. Statistics are untouched.
    pub async fn update(&self, id: &str, input: &VendorInput) -> DbResult<Vendor> {
        let mut tx = self.pool.begin().await?;
        let mut vendor = fetch_vendor(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Vendor", id))?;

        vendor.apply(input, Utc::now()).map_err(CoreError::from)?;
        ensure_email_free(&mut tx, &vendor.email, Some(id)).await?;

        sqlx::query(
            r#"
            UPDATE vendors SET
                name = ?2, company_name = ?3, email = ?4, phone = ?5, street = ?6,
                city = ?7, state = ?8, zip_code = ?9, country = ?10, tax_id = ?11,
                payment_terms = ?12, categories = ?13, status = ?14, rating = ?15,
                notes = ?16, updated_at = ?17
            WHERE id = ?1
            "#,
        )
        .bind(&vendor.id)
        .bind(&vendor.name)
        .bind(&vendor.company_name)
        .bind(&vendor.email)
        .bind(&vendor.phone)
        .bind(&vendor.address.street)
        .bind(&vendor.address.city)
        .bind(&vendor.address.state)
        .bind(&vendor.address.zip_code)
        .bind(&vendor.address.country)
        .bind(&vendor.tax_id)
        .bind(vendor.payment_terms)
        .bind(serde_json::to_string(&vendor.categories)?)
        .bind(vendor.status)
        .bind(vendor.rating)
        .bind(&vendor.notes)
        .bind(vendor.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(vendor_id = %id, "Vendor updated");
        Ok(vendor)
    }

    /// ## Errors
    /// `InvalidState` while any purchase references the vendor.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let purchases: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM purchases WHERE vendor_id = ?1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if purchases > 0 {
            return Err(CoreError::invalid_state(
                "vendor",
                format!("{purchases} purchase(s) still reference it"),
            )
            .into());
        }

        let result = sqlx::query("DELETE FROM vendors WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Vendor", id));
        }
        tx.commit().await?;

        info!(vendor_id = %id, "Vendor deleted");
        Ok(())
    }

    /// Top vendors by received/paid spend (optionally within `range`), plus
    /// status and payment-terms distributions over all vendors.
    pub async fn analytics(&self, range: Option<DateRange>) -> DbResult<VendorAnalytics> {
        let scope = SpendScope {
            from: range.map(|r| r.from),
            to: range.map(|r| r.to),
            ..SpendScope::default()
        };
        let top_vendors = vendor_expenses(&self.pool, &scope, 10).await?;

        let status_distribution = sqlx::query_as::<_, VendorStatusCount>(
            "SELECT status, COUNT(*) AS count FROM vendors GROUP BY status ORDER BY count DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let payment_terms_distribution = sqlx::query_as::<_, TermsAmount>(
            r#"
            SELECT payment_terms, COUNT(*) AS count, COALESCE(SUM(total_spent_cents), 0) AS total_cents
            FROM vendors
            GROUP BY payment_terms
            ORDER BY count DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(VendorAnalytics {
            top_vendors,
            status_distribution,
            payment_terms_distribution,
        })
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vendors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

pub(crate) async fn fetch_vendor(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Vendor>> {
    sqlx::query_as::<_, VendorRow>(&format!("SELECT {VENDOR_COLUMNS} FROM vendors WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Vendor::try_from)
        .transpose()
}

/// Recomputes the stored statistics from the vendor's purchases.
pub(crate) async fn recompute_stats(
    conn: &mut SqliteConnection,
    vendor_id: &str,
) -> DbResult<VendorStats> {
    let figures = sqlx::query_as::<_, PurchaseFigures>(
        "SELECT status, total_amount_cents, purchase_date FROM purchases WHERE vendor_id = ?1",
    )
    .bind(vendor_id)
    .fetch_all(&mut *conn)
    .await?;

    let stats = VendorStats::from_purchases(&figures);

    sqlx::query(
        r#"
        UPDATE vendors
        SET total_purchases = ?2, total_spent_cents = ?3, last_purchase_date = ?4
        WHERE id = ?1
        "#,
    )
    .bind(vendor_id)
    .bind(stats.total_purchases)
    .bind(stats.total_spent_cents)
    .bind(stats.last_purchase_date)
    .execute(&mut *conn)
    .await?;

    debug!(
        vendor_id = %vendor_id,
        total_purchases = stats.total_purchases,
        total_spent_cents = stats.total_spent_cents,
        "Vendor stats recomputed"
    );
    Ok(stats)
}

async fn ensure_email_free(
    conn: &mut SqliteConnection,
    email: &str,
    except_id: Option<&str>,
) -> DbResult<()> {
    let taken: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM vendors WHERE email = ?1 AND (?2 IS NULL OR id != ?2)",
    )
    .bind(email)
    .bind(except_id)
    .fetch_one(&mut *conn)
    .await?;

    if taken > 0 {
        return Err(CoreError::Conflict {
            field: "email",
            value: email.to_string(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;

    fn input(name: &str, email: &str) -> VendorInput {
        VendorInput {
            name: name.to_string(),
            company_name: Some(format!("{name} Ltd")),
            email: email.to_string(),
            phone: None,
            address: Address::default(),
            tax_id: None,
            payment_terms: PaymentTerms::Net15,
            categories: vec![PurchaseCategory::Materials, PurchaseCategory::Other],
            status: VendorStatus::Active,
            rating: Some(4),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_read_back() {
        let db = fixtures::db().await;
        let vendor = db
            .vendors()
            .create(&input("Coastal", "Orders@Coastal.example"), "admin-1")
            .await
            .unwrap();

        let stored = db.vendors().get(&vendor.id).await.unwrap();
        assert_eq!(stored, vendor);
        assert_eq!(stored.email, "orders@coastal.example");
        assert_eq!(stored.address.country, "USA");
        assert_eq!(stored.stats, VendorStats::default());

        let detail = db.vendors().get_detail(&vendor.id).await.unwrap();
        assert_eq!(detail.purchase_count, 0);
        assert_eq!(detail.avg_amount_cents, 0);
    }

    #[tokio::test]
    async fn test_email_must_be_unique() {
        let db = fixtures::db().await;
        db.vendors().create(&input("A", "same@example.com"), "u").await.unwrap();
        let other = db.vendors().create(&input("B", "b@example.com"), "u").await.unwrap();

        assert!(matches!(
            db.vendors().create(&input("C", "SAME@example.com"), "u").await,
            Err(DbError::Domain(CoreError::Conflict { field: "email", .. }))
        ));
        assert!(matches!(
            db.vendors().update(&other.id, &input("B", "same@example.com")).await,
            Err(DbError::Domain(CoreError::Conflict { .. }))
        ));

        let renamed = db.vendors().update(&other.id, &input("Bee", "b@example.com")).await.unwrap();
        assert_eq!(renamed.name, "Bee");
    }

    #[tokio::test]
    async fn test_list_filters() {
        let db = fixtures::db().await;
        db.vendors().create(&input("Harbour Glass", "glass@example.com"), "u").await.unwrap();
        db.vendors().create(&input("Hops & Co", "hops@example.com"), "u").await.unwrap();
        let mut suspended = input("Old Mill", "mill@example.com");
        suspended.status = VendorStatus::Suspended;
        db.vendors().create(&suspended, "u").await.unwrap();

        let search = VendorFilter {
            search: Some("HOPS".to_string()),
            ..VendorFilter::default()
        };
        let page = db.vendors().list(&search, PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "Hops & Co");

        let status = VendorFilter {
            status: Some(VendorStatus::Active),
            ..VendorFilter::default()
        };
        assert_eq!(db.vendors().list(&status, PageRequest::default()).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_delete_unreferenced_vendor() {
        let db = fixtures::db().await;
        let vendor = db.vendors().create(&input("Gone", "gone@example.com"), "u").await.unwrap();

        db.vendors().delete(&vendor.id).await.unwrap();
        assert!(matches!(db.vendors().get(&vendor.id).await, Err(DbError::NotFound { .. })));
        assert!(matches!(db.vendors().delete(&vendor.id).await, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_analytics_distributions() {
        let db = fixtures::db().await;
        db.vendors().create(&input("One", "one@example.com"), "u").await.unwrap();
        let mut inactive = input("Two", "two@example.com");
        inactive.status = VendorStatus::Inactive;
        inactive.payment_terms = PaymentTerms::Net30;
        db.vendors().create(&inactive, "u").await.unwrap();

        let analytics = db.vendors().analytics(None).await.unwrap();
        assert!(analytics.top_vendors.is_empty());
        assert_eq!(analytics.status_distribution.len(), 2);
        assert_eq!(analytics.payment_terms_distribution.len(), 2);
    }
}
