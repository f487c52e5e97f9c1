//! Pure transformation from a validated request into the typed merge record.
//!
//! `MergeData` is the single boundary between the strict internal types and
//! the hyphen-keyed mapping the merge engine consumes; serde renames produce
//! the exact placeholder names the template declares.

use chrono::{DateTime, Datelike, Local, NaiveDate};
use log::warn;
use serde::Serialize;

use super::models::{GenerationRequest, ProductCategory, ProductInput};

/// The complete placeholder data set, one field per template placeholder.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MergeData {
    pub address: String,
    pub date: String,
    pub contact_name: String,
    pub company: String,
    pub phone_number: String,
    pub email: String,
    pub categories: Vec<CategoryGroup>,
}

/// One repeating `categories` section entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CategoryGroup {
    pub category_name: String,
    pub products: Vec<ProductRecord>,
}

/// One repeating `products` section entry. `image` is omitted entirely when
/// absent so the engine can distinguish "no image" from an empty string.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProductRecord {
    pub code: String,
    pub description: String,
    pub manufacturer_description: String,
    pub product_details: String,
    pub area_description: String,
    pub quantity: String,
    pub price: String,
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Group products into the fixed category order and fill every header field.
pub fn build_merge_data(request: &GenerationRequest) -> MergeData {
    let mut buckets: Vec<Vec<ProductRecord>> = (0..ProductCategory::ORDERED.len())
        .map(|_| Vec::new())
        .collect();

    for product in &request.products {
        let category = ProductCategory::from_label(product.category.as_deref());
        buckets[category as usize].push(product_record(product));
    }

    let categories = ProductCategory::ORDERED
        .iter()
        .zip(buckets)
        .filter(|(_, products)| !products.is_empty())
        .map(|(category, products)| CategoryGroup {
            category_name: category.label().to_uppercase(),
            products,
        })
        .collect();

    MergeData {
        address: request.address.clone(),
        date: format_long_date(request.date.as_deref()),
        contact_name: field(&request.contact_name),
        company: field(&request.company),
        phone_number: field(&request.phone_number),
        email: field(&request.email),
        categories,
    }
}

/// True when at least one product carries a non-empty image payload. The
/// image module is only attached to the engine in that case.
pub fn request_has_images(request: &GenerationRequest) -> bool {
    request
        .products
        .iter()
        .any(|p| p.image.as_deref().is_some_and(|s| !s.trim().is_empty()))
}

/// Attachment filename derived from the address: spaces become underscores,
/// nothing else is rewritten.
pub fn attachment_filename(address: &str) -> String {
    format!("Product_Selection_{}.docx", address.replace(' ', "_"))
}

/// Render a date in long en-AU form, e.g. "4 March 2025". An absent or
/// unparseable input falls back to the current date; garbage text is never
/// emitted into the document.
pub fn format_long_date(raw: Option<&str>) -> String {
    let date = match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => parse_iso_date(value).unwrap_or_else(|| {
            warn!("unparseable date '{}', using current date", value);
            Local::now().date_naive()
        }),
        None => Local::now().date_naive(),
    };

    let months = [
        "January",
        "February",
        "March",
        "April",
        "May",
        "June",
        "July",
        "August",
        "September",
        "October",
        "November",
        "December",
    ];

    let day = date.day();
    let month = months[(date.month0() as usize).min(months.len() - 1)];
    let year = date.year();

    format!("{day} {month} {year}")
}

fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

fn field(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn product_record(product: &ProductInput) -> ProductRecord {
    ProductRecord {
        code: field(&product.code),
        description: field(&product.description),
        manufacturer_description: field(&product.manufacturer_description),
        product_details: field(&product.product_details),
        area_description: field(&product.area_description),
        quantity: field(&product.quantity),
        price: field(&product.price),
        notes: field(&product.notes),
        image: product
            .image
            .clone()
            .filter(|payload| !payload.trim().is_empty()),
    }
}
