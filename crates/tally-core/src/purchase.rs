//! # Purchase Orders
//!
//! Procurement records raised against a vendor, with an approval lifecycle.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  pending ──► approved ──► ordered ──► received ──► paid (terminal)      │
//! │     │           │            │           │                              │
//! │     └───────────┴────────────┴───────────┴──► cancelled (terminal)      │
//! │                                                                         │
//! │  • forward moves may skip stages, backward moves are rejected          │
//! │  • leaving `pending` for anything but `cancelled` implies approval     │
//! │    and needs approve_purchases                                          │
//! │  • re-submitting the current status is a no-op                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Stamping
//! Each stage crossed by a transition fills its fields, but only if they are
//! still empty:
//!
//! | Stage    | Fields                                        |
//! |----------|-----------------------------------------------|
//! | approved | `approved_by`, `approval_date`                |
//! | received | `actual_delivery_date`                        |
//! | paid     | `payment_date`, and `payment_status = paid`   |

use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::permission::{authorize, AccessPolicy, Permission, PermissionTable};
use crate::user::User;
use crate::validation::{
    amount_too_large, validate_cents, validate_optional_text, validate_quantity,
    validate_required_text, ValidationResult,
};

/// Policy checked whenever a transition implies approval.
pub const APPROVE_PURCHASES: AccessPolicy =
    AccessPolicy::new("approve purchases").permissions(&[Permission::ApprovePurchases]);

// =============================================================================
// Enums
// =============================================================================

/// Expense bucket. The first three are cost of goods sold, the rest are
/// operating expenses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PurchaseCategory {
    Materials,
    Labor,
    Manufacturing,
    Salaries,
    Rent,
    Utilities,
    Marketing,
    Insurance,
    Depreciation,
    Other,
}

impl PurchaseCategory {
    pub const ALL: [PurchaseCategory; 10] = [
        PurchaseCategory::Materials,
        PurchaseCategory::Labor,
        PurchaseCategory::Manufacturing,
        PurchaseCategory::Salaries,
        PurchaseCategory::Rent,
        PurchaseCategory::Utilities,
        PurchaseCategory::Marketing,
        PurchaseCategory::Insurance,
        PurchaseCategory::Depreciation,
        PurchaseCategory::Other,
    ];

    /// Cost of goods sold.
    pub fn is_cogs(&self) -> bool {
        matches!(
            self,
            PurchaseCategory::Materials | PurchaseCategory::Labor | PurchaseCategory::Manufacturing
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PurchaseStatus {
    #[default]
    Pending,
    Approved,
    Ordered,
    Received,
    Paid,
    Cancelled,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Approved => "approved",
            PurchaseStatus::Ordered => "ordered",
            PurchaseStatus::Received => "received",
            PurchaseStatus::Paid => "paid",
            PurchaseStatus::Cancelled => "cancelled",
        }
    }

    /// Position on the main line. `cancelled` is off the line.
    fn stage(&self) -> Option<u8> {
        match self {
            PurchaseStatus::Pending => Some(0),
            PurchaseStatus::Approved => Some(1),
            PurchaseStatus::Ordered => Some(2),
            PurchaseStatus::Received => Some(3),
            PurchaseStatus::Paid => Some(4),
            PurchaseStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PurchaseStatus::Paid | PurchaseStatus::Cancelled)
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Partial,
    Paid,
    Overdue,
}

/// Vendor payment terms. Stored and sent with their display names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum PaymentTerms {
    #[serde(rename = "Net 15")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "Net 15"))]
    Net15,
    #[default]
    #[serde(rename = "Net 30")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "Net 30"))]
    Net30,
    #[serde(rename = "Net 60")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "Net 60"))]
    Net60,
    #[serde(rename = "Due on Receipt")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "Due on Receipt"))]
    DueOnReceipt,
    #[serde(rename = "COD")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "COD"))]
    Cod,
}

impl PaymentTerms {
    /// Days after the purchase date before an unpaid purchase is overdue.
    /// COD has no credit window on paper and is treated like Net 30.
    pub fn days(&self) -> i64 {
        match self {
            PaymentTerms::Net15 => 15,
            PaymentTerms::Net30 | PaymentTerms::Cod => 30,
            PaymentTerms::Net60 => 60,
            PaymentTerms::DueOnReceipt => 0,
        }
    }
}

// =============================================================================
// Purchase
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PurchaseItem {
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// Always `quantity × unit_price_cents`.
    pub total_price_cents: i64,
}

/// Line input, before totals are computed.
#[derive(Debug, Clone, PartialEq, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewPurchaseItem {
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl NewPurchaseItem {
    fn build(&self) -> ValidationResult<PurchaseItem> {
        validate_quantity(self.quantity)?;
        validate_cents("unitPrice", self.unit_price_cents)?;
        Ok(PurchaseItem {
            description: validate_required_text("item description", &self.description, 200)?,
            quantity: self.quantity,
            unit_price_cents: self.unit_price_cents,
            total_price_cents: Money::from_cents(self.unit_price_cents)
                .checked_multiply_quantity(self.quantity)
                .ok_or_else(|| amount_too_large("totalPrice"))?
                .cents(),
        })
    }
}

fn build_items(items: &[NewPurchaseItem]) -> ValidationResult<Vec<PurchaseItem>> {
    if items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }
    items.iter().map(NewPurchaseItem::build).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Purchase {
    pub id: String,
    pub purchase_order_number: String,
    pub vendor_id: String,
    pub description: String,
    pub category: PurchaseCategory,
    pub items: Vec<PurchaseItem>,
    pub total_amount_cents: i64,
    pub status: PurchaseStatus,
    pub payment_status: PaymentStatus,
    pub payment_terms: PaymentTerms,
    pub invoice_number: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub purchase_date: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub expected_delivery_date: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub actual_delivery_date: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub approval_date: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub payment_date: Option<DateTime<Utc>>,
    pub created_by: String,
    pub approved_by: Option<String>,
    pub updated_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Input for a new purchase.
#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewPurchase {
    /// Leave empty to have one generated.
    pub purchase_order_number: Option<String>,
    pub vendor_id: String,
    pub description: String,
    pub category: PurchaseCategory,
    pub items: Vec<NewPurchaseItem>,
    #[serde(default)]
    pub payment_terms: PaymentTerms,
    pub invoice_number: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "Option<String>")]
    pub purchase_date: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub expected_delivery_date: Option<DateTime<Utc>>,
}

/// Partial update. Every field is optional, and the same patch may be sent to
/// many purchases at once.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PurchasePatch {
    pub status: Option<PurchaseStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub description: Option<String>,
    pub category: Option<PurchaseCategory>,
    pub payment_terms: Option<PaymentTerms>,
    pub invoice_number: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "Option<String>")]
    pub expected_delivery_date: Option<DateTime<Utc>>,
    /// Replaces all lines. Only while pending.
    pub items: Option<Vec<NewPurchaseItem>>,
}

impl Purchase {
    /// Builds a pending purchase.
    ///
    /// `purchase_order_number` is the final number: the caller either passes
    /// the client's value through or generates one with [`next_po_number`].
    pub fn create(
        input: &NewPurchase,
        purchase_order_number: String,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Purchase> {
        let purchase_order_number =
            validate_required_text("purchaseOrderNumber", &purchase_order_number, 50)?;
        check_po_sequence(&purchase_order_number)?;
        let items = build_items(&input.items)?;

        let mut purchase = Purchase {
            id: Uuid::new_v4().to_string(),
            purchase_order_number,
            vendor_id: input.vendor_id.clone(),
            description: validate_required_text("description", &input.description, 500)?,
            category: input.category,
            items,
            total_amount_cents: 0,
            status: PurchaseStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            payment_terms: input.payment_terms,
            invoice_number: validate_optional_text(
                "invoiceNumber",
                input.invoice_number.as_deref(),
                50,
            )?,
            notes: validate_optional_text("notes", input.notes.as_deref(), 1000)?,
            purchase_date: input.purchase_date.unwrap_or(now),
            expected_delivery_date: input.expected_delivery_date,
            actual_delivery_date: None,
            approval_date: None,
            payment_date: None,
            created_by: actor_id.to_string(),
            approved_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        };
        purchase.recompute_total()?;
        Ok(purchase)
    }

    /// `total_amount_cents = Σ total_price_cents`.
    pub fn recompute_total(&mut self) -> ValidationResult<()> {
        let total =
            Money::checked_sum(self.items.iter().map(|i| Money::from_cents(i.total_price_cents)))
                .ok_or_else(|| amount_too_large("totalAmount"))?;
        self.total_amount_cents = total.cents();
        Ok(())
    }

    /// Moves the purchase to `next`, stamping every stage crossed.
    ///
    /// Returns whether anything changed. Authorization is the caller's job,
    /// see [`Purchase::apply_patch`].
    ///
    /// ## Errors
    /// `InvalidTransition` for backward moves and for leaving a terminal state.
    pub fn transition(
        &mut self,
        next: PurchaseStatus,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let current = self.status;
        let before = self.clone();

        if next == current {
            // Re-entry only fills stamps that are still empty.
            self.stamp(next, actor_id, now);
            return Ok(*self != before);
        }

        let invalid = || CoreError::InvalidTransition {
            entity: "purchase",
            from: current.to_string(),
            to: next.to_string(),
        };

        if current.is_terminal() {
            return Err(invalid());
        }

        match (current.stage(), next.stage()) {
            (_, None) => {}
            (Some(from), Some(to)) if to > from => {
                for stage in PurchaseStatus::FORWARD
                    .iter()
                    .filter(|s| s.stage().is_some_and(|n| n > from && n <= to))
                {
                    self.stamp(*stage, actor_id, now);
                }
            }
            _ => return Err(invalid()),
        }

        self.status = next;
        Ok(true)
    }

    fn stamp(&mut self, stage: PurchaseStatus, actor_id: &str, now: DateTime<Utc>) {
        match stage {
            PurchaseStatus::Approved => {
                if self.approved_by.is_none() {
                    self.approved_by = Some(actor_id.to_string());
                }
                if self.approval_date.is_none() {
                    self.approval_date = Some(now);
                }
            }
            PurchaseStatus::Received => {
                if self.actual_delivery_date.is_none() {
                    self.actual_delivery_date = Some(now);
                }
            }
            PurchaseStatus::Paid => {
                if self.payment_date.is_none() {
                    self.payment_date = Some(now);
                }
                self.payment_status = PaymentStatus::Paid;
            }
            PurchaseStatus::Pending | PurchaseStatus::Ordered | PurchaseStatus::Cancelled => {}
        }
    }

    /// Applies a patch on behalf of `actor`. All-or-nothing: on error the
    /// purchase is unchanged.
    ///
    /// Returns whether anything changed. `updated_by`/`updated_at` are only
    /// touched when something did.
    ///
    /// ## Errors
    /// - `Forbidden` if the status change implies approval and the actor
    ///   lacks approve_purchases
    /// - `InvalidState` when replacing items of a non-pending purchase
    /// - `InvalidTransition` / `Validation` from the individual fields
    pub fn apply_patch(
        &mut self,
        patch: &PurchasePatch,
        actor: &User,
        permissions: &PermissionTable,
        now: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let mut next = self.clone();

        if let Some(items) = &patch.items {
            if self.status != PurchaseStatus::Pending {
                return Err(CoreError::invalid_state(
                    "purchase",
                    format!("items cannot change once {}", self.status),
                ));
            }
            next.items = build_items(items)?;
            next.recompute_total()?;
        }
        if let Some(description) = &patch.description {
            next.description = validate_required_text("description", description, 500)?;
        }
        if let Some(invoice_number) = &patch.invoice_number {
            next.invoice_number =
                validate_optional_text("invoiceNumber", Some(invoice_number), 50)?;
        }
        if let Some(notes) = &patch.notes {
            next.notes = validate_optional_text("notes", Some(notes), 1000)?;
        }
        if let Some(category) = patch.category {
            next.category = category;
        }
        if let Some(terms) = patch.payment_terms {
            next.payment_terms = terms;
        }
        if let Some(date) = patch.expected_delivery_date {
            next.expected_delivery_date = Some(date);
        }
        if let Some(payment_status) = patch.payment_status {
            next.payment_status = payment_status;
        }

        if let Some(status) = patch.status {
            if implies_approval(self.status, status) {
                authorize(permissions, actor, &APPROVE_PURCHASES)?;
            }
            next.transition(status, &actor.id, now)?;
        }

        if next == *self {
            return Ok(false);
        }

        next.updated_by = Some(actor.id.clone());
        next.updated_at = now;
        *self = next;
        Ok(true)
    }

    /// ## Errors
    /// `InvalidState` unless the purchase is still pending.
    pub fn ensure_deletable(&self) -> CoreResult<()> {
        if self.status != PurchaseStatus::Pending {
            return Err(CoreError::invalid_state(
                "purchase",
                format!("cannot be deleted once {}", self.status),
            ));
        }
        Ok(())
    }

    /// Approved or received, unpaid, and past its payment terms.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.status,
            PurchaseStatus::Approved | PurchaseStatus::Received
        ) && (now - self.purchase_date).num_days() > self.payment_terms.days()
    }
}

impl PurchaseStatus {
    const FORWARD: [PurchaseStatus; 5] = [
        PurchaseStatus::Pending,
        PurchaseStatus::Approved,
        PurchaseStatus::Ordered,
        PurchaseStatus::Received,
        PurchaseStatus::Paid,
    ];
}

/// Leaving `pending` toward the main line means someone approved it.
pub fn implies_approval(from: PurchaseStatus, to: PurchaseStatus) -> bool {
    from == PurchaseStatus::Pending
        && !matches!(to, PurchaseStatus::Pending | PurchaseStatus::Cancelled)
}

// =============================================================================
// PO Numbers
// =============================================================================

/// Highest sequence a PO number in the `PO-<year>-<seq>` form may carry,
/// whether generated or supplied by the client.
pub const MAX_PO_SEQUENCE: u32 = 999_999;

/// `PO-<year>-<seq>` with the sequence zero-padded to three digits.
pub fn format_po_number(year: i32, seq: u32) -> String {
    format!("PO-{year}-{seq:03}")
}

/// Sequence part of a PO number for `year`, if it follows the pattern.
pub fn parse_po_sequence(number: &str, year: i32) -> Option<u32> {
    number
        .strip_prefix(&format!("PO-{year}-"))
        .and_then(|seq| seq.parse().ok())
}

/// Rejects numbers in the generated form whose sequence is past
/// [`MAX_PO_SEQUENCE`], for any year.
fn check_po_sequence(number: &str) -> ValidationResult<()> {
    let sequence = number
        .strip_prefix("PO-")
        .and_then(|rest| rest.split_once('-'))
        .filter(|(year, _)| year.parse::<i32>().is_ok())
        .and_then(|(_, seq)| seq.parse::<u64>().ok());

    match sequence {
        Some(seq) if seq > u64::from(MAX_PO_SEQUENCE) => Err(ValidationError::OutOfRange {
            field: "purchaseOrderNumber".to_string(),
            min: 1,
            max: i64::from(MAX_PO_SEQUENCE),
        }),
        _ => Ok(()),
    }
}

/// Next PO number for the year of `now`, one past the highest existing
/// sequence. Numbers that do not follow the pattern are ignored.
///
/// ## Errors
/// `InvalidState` once the year's sequence has reached [`MAX_PO_SEQUENCE`].
/// Purchases can still be created with an explicit number.
///
/// ## Example
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use tally_core::purchase::next_po_number;
///
/// let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
/// let existing = ["PO-2026-001", "PO-2026-007", "PO-2025-120", "CUSTOM-1"];
/// assert_eq!(next_po_number(existing, now).unwrap(), "PO-2026-008");
/// ```
pub fn next_po_number<'a>(
    existing: impl IntoIterator<Item = &'a str>,
    now: DateTime<Utc>,
) -> CoreResult<String> {
    let year = now.year();
    let max = existing
        .into_iter()
        .filter_map(|n| parse_po_sequence(n, year))
        .max()
        .unwrap_or(0);

    let next = max
        .checked_add(1)
        .filter(|seq| *seq <= MAX_PO_SEQUENCE)
        .ok_or_else(|| {
            CoreError::invalid_state(
                "purchase",
                format!("PO-{year}- numbers are used up, supply purchaseOrderNumber"),
            )
        })?;
    Ok(format_po_number(year, next))
}

// =============================================================================
// Unit Tests
// =============================================================================
