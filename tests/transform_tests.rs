use product_selection_server::selection::models::GenerationRequest;
use product_selection_server::selection::transform::{
    attachment_filename, build_merge_data, format_long_date, request_has_images,
};
use serde_json::json;

fn request_from(value: serde_json::Value) -> GenerationRequest {
    serde_json::from_value(value).unwrap()
}

#[test]
fn test_categories_emit_in_fixed_order() {
    let request = request_from(json!({
        "address": "12 Smith St",
        "products": [
            {"category": "Bathroom", "code": "B1"},
            {"category": "Kitchen", "code": "K1"},
            {"category": "Bathroom", "code": "B2"},
        ]
    }));

    let data = build_merge_data(&request);
    let names: Vec<&str> = data
        .categories
        .iter()
        .map(|group| group.category_name.as_str())
        .collect();
    assert_eq!(names, vec!["KITCHEN", "BATHROOM"]);

    // Input order is preserved within a category.
    let bathroom = &data.categories[1];
    assert_eq!(bathroom.products.len(), 2);
    assert_eq!(bathroom.products[0].code, "B1");
    assert_eq!(bathroom.products[1].code, "B2");
}

#[test]
fn test_unknown_category_buckets_under_other() {
    let request = request_from(json!({
        "address": "12 Smith St",
        "products": [{"category": "Unknown", "code": "X1"}]
    }));

    let data = build_merge_data(&request);
    assert_eq!(data.categories.len(), 1);
    assert_eq!(data.categories[0].category_name, "OTHER");
    assert_eq!(data.categories[0].products[0].code, "X1");
}

#[test]
fn test_empty_categories_are_omitted() {
    let request = request_from(json!({
        "address": "12 Smith St",
        "products": [{"category": "Laundry"}]
    }));

    let data = build_merge_data(&request);
    let names: Vec<&str> = data
        .categories
        .iter()
        .map(|group| group.category_name.as_str())
        .collect();
    assert_eq!(names, vec!["LAUNDRY"]);
}

#[test]
fn test_optional_fields_default_to_empty_strings() {
    let request = request_from(json!({
        "address": "12 Smith St",
        "products": [{"category": "Kitchen", "code": "K1", "description": "Sink"}]
    }));

    let data = build_merge_data(&request);
    assert_eq!(data.contact_name, "");
    assert_eq!(data.company, "");
    assert_eq!(data.phone_number, "");
    assert_eq!(data.email, "");

    let product = &data.categories[0].products[0];
    assert_eq!(product.code, "K1");
    assert_eq!(product.description, "Sink");
    assert_eq!(product.manufacturer_description, "");
    assert_eq!(product.quantity, "");
    assert_eq!(product.price, "");
    assert_eq!(product.notes, "");
    assert!(product.image.is_none());
}

#[test]
fn test_image_is_omitted_from_serialized_record_when_absent() {
    let request = request_from(json!({
        "address": "12 Smith St",
        "products": [
            {"category": "Kitchen", "image": "aGVsbG8="},
            {"category": "Kitchen", "image": "   "},
            {"category": "Kitchen"},
        ]
    }));

    let value = serde_json::to_value(build_merge_data(&request)).unwrap();
    let products = &value["categories"][0]["products"];
    assert_eq!(products[0]["image"], "aGVsbG8=");
    assert!(products[1].get("image").is_none());
    assert!(products[2].get("image").is_none());
}

#[test]
fn test_serialized_keys_are_hyphenated() {
    let request = request_from(json!({
        "address": "12 Smith St",
        "contactName": "Jane",
        "phoneNumber": "0400 000 000",
        "products": [{"category": "Kitchen", "manufacturerDescription": "Acme"}]
    }));

    let value = serde_json::to_value(build_merge_data(&request)).unwrap();
    assert_eq!(value["contact-name"], "Jane");
    assert_eq!(value["phone-number"], "0400 000 000");
    let product = &value["categories"][0]["products"][0];
    assert_eq!(product["manufacturer-description"], "Acme");
    assert_eq!(value["categories"][0]["category-name"], "KITCHEN");
}

#[test]
fn test_explicit_date_renders_long_form() {
    assert_eq!(format_long_date(Some("2025-03-04")), "4 March 2025");
    assert_eq!(format_long_date(Some("2024-12-25")), "25 December 2024");
    assert_eq!(
        format_long_date(Some("2025-03-04T10:30:00+10:00")),
        "4 March 2025"
    );
}

#[test]
fn test_invalid_date_falls_back_to_current_date() {
    let today = format_long_date(None);
    assert_eq!(format_long_date(Some("not-a-date")), today);
    assert_eq!(format_long_date(Some("")), today);
}

#[test]
fn test_attachment_filename_replaces_spaces_only() {
    assert_eq!(
        attachment_filename("12 Smith St"),
        "Product_Selection_12_Smith_St.docx"
    );
    // Only whitespace is substituted; other characters pass through.
    assert_eq!(
        attachment_filename("5/7 O'Brien Rd"),
        "Product_Selection_5/7_O'Brien_Rd.docx"
    );
}

#[test]
fn test_request_has_images() {
    let without = request_from(json!({
        "address": "12 Smith St",
        "products": [{"category": "Kitchen"}, {"image": ""}]
    }));
    assert!(!request_has_images(&without));

    let with = request_from(json!({
        "address": "12 Smith St",
        "products": [{"category": "Kitchen"}, {"image": "aGVsbG8="}]
    }));
    assert!(request_has_images(&with));
}
