//! Request model for document generation.
//!
//! Deserialization is deliberately lenient: individual product fields that are
//! missing or carry a non-string scalar are coerced rather than rejected. The
//! validator only enforces the two hard requirements (address, products) plus
//! the server-side product cap.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

/// Server-side cap on the number of products in one request.
pub const MAX_PRODUCTS: usize = 50;

/// Validation failures reported with HTTP 400.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Address is required")]
    MissingAddress,
    #[error("At least one product is required")]
    NoProducts,
    #[error("A maximum of {MAX_PRODUCTS} products is supported")]
    TooManyProducts,
}

/// The fixed category enumeration, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductCategory {
    Kitchen,
    Bathroom,
    Bedroom,
    LivingRoom,
    Laundry,
    Balcony,
    Other,
}

impl ProductCategory {
    pub const ORDERED: [ProductCategory; 7] = [
        ProductCategory::Kitchen,
        ProductCategory::Bathroom,
        ProductCategory::Bedroom,
        ProductCategory::LivingRoom,
        ProductCategory::Laundry,
        ProductCategory::Balcony,
        ProductCategory::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProductCategory::Kitchen => "Kitchen",
            ProductCategory::Bathroom => "Bathroom",
            ProductCategory::Bedroom => "Bedroom",
            ProductCategory::LivingRoom => "Living Room",
            ProductCategory::Laundry => "Laundry",
            ProductCategory::Balcony => "Balcony",
            ProductCategory::Other => "Other",
        }
    }

    /// Resolve a raw category string. Anything outside the fixed enumeration
    /// (including absent values) buckets under `Other`.
    pub fn from_label(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("Kitchen") => ProductCategory::Kitchen,
            Some("Bathroom") => ProductCategory::Bathroom,
            Some("Bedroom") => ProductCategory::Bedroom,
            Some("Living Room") => ProductCategory::LivingRoom,
            Some("Laundry") => ProductCategory::Laundry,
            Some("Balcony") => ProductCategory::Balcony,
            _ => ProductCategory::Other,
        }
    }
}

/// One product row from the form. All fields are opaque display strings.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductInput {
    #[serde(deserialize_with = "opt_display_string")]
    #[schema(example = "Kitchen")]
    pub category: Option<String>,
    #[serde(deserialize_with = "opt_display_string")]
    #[schema(example = "K1")]
    pub code: Option<String>,
    #[serde(deserialize_with = "opt_display_string")]
    #[schema(example = "Sink")]
    pub description: Option<String>,
    #[serde(deserialize_with = "opt_display_string")]
    pub manufacturer_description: Option<String>,
    #[serde(deserialize_with = "opt_display_string")]
    pub product_details: Option<String>,
    #[serde(deserialize_with = "opt_display_string")]
    pub area_description: Option<String>,
    #[serde(deserialize_with = "opt_display_string")]
    pub quantity: Option<String>,
    #[serde(deserialize_with = "opt_display_string")]
    pub price: Option<String>,
    #[serde(deserialize_with = "opt_display_string")]
    pub notes: Option<String>,
    /// Base64-encoded image payload, optionally with a `data:` URL prefix.
    pub image: Option<String>,
}

/// The parsed request body for `POST /api/generate-document`.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationRequest {
    #[serde(deserialize_with = "display_string")]
    #[schema(example = "12 Smith St")]
    pub address: String,
    /// ISO date for the document header; defaults to today when absent.
    #[serde(deserialize_with = "opt_display_string")]
    #[schema(example = "2025-03-04")]
    pub date: Option<String>,
    #[serde(deserialize_with = "opt_display_string")]
    pub contact_name: Option<String>,
    #[serde(deserialize_with = "opt_display_string")]
    pub company: Option<String>,
    #[serde(deserialize_with = "opt_display_string")]
    pub phone_number: Option<String>,
    #[serde(deserialize_with = "opt_display_string")]
    pub email: Option<String>,
    #[serde(deserialize_with = "products_lenient")]
    pub products: Vec<ProductInput>,
}

impl GenerationRequest {
    /// Check the hard requirements. Malformed individual product fields are
    /// tolerated and defaulted downstream.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.address.trim().is_empty() {
            return Err(ValidationError::MissingAddress);
        }
        if self.products.is_empty() {
            return Err(ValidationError::NoProducts);
        }
        if self.products.len() > MAX_PRODUCTS {
            return Err(ValidationError::TooManyProducts);
        }
        Ok(())
    }
}

fn coerce_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn display_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_display(&value))
}

fn opt_display_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(None),
        other => Ok(Some(coerce_display(&other))),
    }
}

/// A `products` value that is not a JSON array deserializes to an empty list,
/// so the validator owns the error message instead of the JSON layer.
fn products_lenient<'de, D>(deserializer: D) -> Result<Vec<ProductInput>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .map(|item| serde_json::from_value(item).unwrap_or_default())
            .collect()),
        _ => Ok(Vec::new()),
    }
}
