//! # Products
//!
//! Catalogue records. `stock` is only ever changed through
//! [`apply_stock_delta`](crate::stock::apply_stock_delta), so every product's
//! stock equals the `new_stock` of its most recent ledger entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::validation::{
    validate_barcode, validate_cents, validate_optional_text, validate_required_text,
    validate_restock_quantity, ValidationResult,
};

/// Closed set of shelf categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ProductCategory {
    Spirits,
    Wine,
    Beer,
    Mixers,
    Bitters,
    EnergyDrink,
    Milk,
    Soda,
    Juice,
    Other,
}

/// A product in the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub barcode: String,
    pub category: ProductCategory,
    pub stock: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Input for a new product.
#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub barcode: String,
    pub category: ProductCategory,
    #[serde(default)]
    pub stock: i64,
}

impl NewProduct {
    /// Checks field rules and returns a normalized copy (trimmed text, blank
    /// description dropped).
    pub fn validate(&self) -> ValidationResult<NewProduct> {
        validate_cents("price", self.price_cents)?;
        validate_restock_quantity(self.stock)?;

        Ok(NewProduct {
            name: validate_required_text("name", &self.name, 100)?,
            description: validate_optional_text("description", self.description.as_deref(), 500)?,
            price_cents: self.price_cents,
            barcode: validate_barcode(&self.barcode)?,
            category: self.category,
            stock: self.stock,
        })
    }
}

/// Partial update of descriptive fields. Stock is absent: it only
/// moves through the ledger.
#[derive(Debug, Clone, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub barcode: Option<String>,
    pub category: Option<ProductCategory>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price_cents.is_none()
            && self.barcode.is_none()
            && self.category.is_none()
    }

    /// Applies the patch in place. Nothing is written if any field fails.
    pub fn apply(&self, product: &mut Product, now: DateTime<Utc>) -> ValidationResult<()> {
        let name = self
            .name
            .as_deref()
            .map(|n| validate_required_text("name", n, 100))
            .transpose()?;
        let description = self
            .description
            .as_deref()
            .map(|d| validate_optional_text("description", Some(d), 500))
            .transpose()?;
        let barcode = self.barcode.as_deref().map(validate_barcode).transpose()?;
        if let Some(price) = self.price_cents {
            validate_cents("price", price)?;
        }

        if let Some(name) = name {
            product.name = name;
        }
        if let Some(description) = description {
            product.description = description;
        }
        if let Some(barcode) = barcode {
            product.barcode = barcode;
        }
        if let Some(price) = self.price_cents {
            product.price_cents = price;
        }
        if let Some(category) = self.category {
            product.category = category;
        }
        product.updated_at = now;
        Ok(())
    }
}
