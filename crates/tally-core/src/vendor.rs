//! # Vendors
//!
//! Suppliers that purchases are raised against.
//!
//! Vendor statistics are a pure function of the vendor's purchases
//! ([`VendorStats::from_purchases`]). The database layer recomputes and stores
//! them after every purchase write instead of bumping counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::purchase::{PaymentTerms, PurchaseCategory, PurchaseStatus};
use crate::validation::{
    validate_email, validate_optional_text, validate_rating, validate_required_text,
    ValidationResult,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum VendorStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
}

/// Postal address. Everything is optional except the country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "USA".to_string()
}

impl Default for Address {
    fn default() -> Self {
        Address {
            street: None,
            city: None,
            state: None,
            zip_code: None,
            country: default_country(),
        }
    }
}

impl Address {
    fn normalized(&self) -> ValidationResult<Address> {
        let country = validate_optional_text("country", Some(&self.country), 60)?
            .unwrap_or_else(default_country);
        Ok(Address {
            street: validate_optional_text("street", self.street.as_deref(), 200)?,
            city: validate_optional_text("city", self.city.as_deref(), 100)?,
            state: validate_optional_text("state", self.state.as_deref(), 100)?,
            zip_code: validate_optional_text("zipCode", self.zip_code.as_deref(), 20)?,
            country,
        })
    }
}

/// Rolled-up purchase figures for one vendor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct VendorStats {
    pub total_purchases: i64,
    pub total_spent_cents: i64,
    #[ts(as = "Option<String>")]
    pub last_purchase_date: Option<DateTime<Utc>>,
}

/// The subset of a purchase that statistics are computed from.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PurchaseFigures {
    pub status: PurchaseStatus,
    pub total_amount_cents: i64,
    pub purchase_date: DateTime<Utc>,
}

impl VendorStats {
    /// Aggregates over every purchase that is not cancelled.
    ///
    /// The same purchases always give the same figures.
    pub fn from_purchases<'a>(purchases: impl IntoIterator<Item = &'a PurchaseFigures>) -> Self {
        purchases
            .into_iter()
            .filter(|p| p.status != PurchaseStatus::Cancelled)
            .fold(VendorStats::default(), |mut stats, p| {
                stats.total_purchases += 1;
                stats.total_spent_cents += p.total_amount_cents;
                stats.last_purchase_date = stats.last_purchase_date.max(Some(p.purchase_date));
                stats
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Vendor {
    pub id: String,
    pub name: String,
    pub company_name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub address: Address,
    pub tax_id: Option<String>,
    pub payment_terms: PaymentTerms,
    pub categories: Vec<PurchaseCategory>,
    pub status: VendorStatus,
    pub rating: Option<i64>,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub stats: VendorStats,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Input for a new vendor, and the full-replacement body for updates.
#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct VendorInput {
    pub name: String,
    pub company_name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Address,
    pub tax_id: Option<String>,
    #[serde(default)]
    pub payment_terms: PaymentTerms,
    #[serde(default)]
    pub categories: Vec<PurchaseCategory>,
    #[serde(default)]
    pub status: VendorStatus,
    pub rating: Option<i64>,
    pub notes: Option<String>,
}

impl Vendor {
    /// Builds a vendor with empty statistics.
    pub fn create(input: &VendorInput, actor_id: &str, now: DateTime<Utc>) -> ValidationResult<Vendor> {
        let mut vendor = Vendor {
            id: Uuid::new_v4().to_string(),
            name: String::new(),
            company_name: None,
            email: String::new(),
            phone: None,
            address: Address::default(),
            tax_id: None,
            payment_terms: PaymentTerms::default(),
            categories: Vec::new(),
            status: VendorStatus::default(),
            rating: None,
            notes: None,
            stats: VendorStats::default(),
            created_by: actor_id.to_string(),
            created_at: now,
            updated_at: now,
        };
        vendor.apply(input, now)?;
        Ok(vendor)
    }

    /// Replaces the descriptive fields. Statistics and audit fields are kept.
    pub fn apply(&mut self, input: &VendorInput, now: DateTime<Utc>) -> ValidationResult<()> {
        if let Some(rating) = input.rating {
            validate_rating(rating)?;
        }

        let mut categories = input.categories.clone();
        categories.sort();
        categories.dedup();

        let name = validate_required_text("name", &input.name, 100)?;
        let company_name = validate_optional_text("companyName", input.company_name.as_deref(), 100)?;
        let email = validate_email(&input.email)?;
        let phone = validate_optional_text("phone", input.phone.as_deref(), 30)?;
        let address = input.address.normalized()?;
        let tax_id = validate_optional_text("taxId", input.tax_id.as_deref(), 50)?;
        let notes = validate_optional_text("notes", input.notes.as_deref(), 1000)?;

        self.name = name;
        self.company_name = company_name;
        self.email = email;
        self.phone = phone;
        self.address = address;
        self.tax_id = tax_id;
        self.payment_terms = input.payment_terms;
        self.categories = categories;
        self.status = input.status;
        self.rating = input.rating;
        self.notes = notes;
        self.updated_at = now;
        Ok(())
    }
}
