mod common;

use product_selection_server::docx::template::{TemplateArchive, TemplateStore};
use product_selection_server::docx::TemplateError;
use std::fs;

#[test]
fn test_missing_template_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = TemplateStore::with_paths(vec![
        dir.path().join("missing_primary.docx"),
        dir.path().join("missing_fallback.docx"),
    ]);

    match store.load() {
        Err(err @ TemplateError::NotFound) => {
            assert_eq!(err.to_string(), "Template file not found");
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn test_fallback_path_is_used_when_primary_missing() {
    let dir = tempfile::tempdir().unwrap();
    let fallback = dir.path().join("template.docx");
    fs::write(&fallback, common::docx_with_paragraphs(&["{{address}}"])).unwrap();

    let store = TemplateStore::with_paths(vec![dir.path().join("missing.docx"), fallback]);
    let bytes = store.load().unwrap();
    assert!(TemplateArchive::parse(&bytes).is_ok());
}

#[test]
fn test_bytes_are_cached_for_the_process_lifetime() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("template.docx");
    fs::write(&path, common::docx_with_paragraphs(&["{{address}}"])).unwrap();

    let store = TemplateStore::with_paths(vec![path.clone()]);
    let first = store.load().unwrap();
    let second = store.load().unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
}

#[test]
fn test_corrupted_template_surfaces_parser_message() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("template.docx");
    fs::write(&path, b"definitely not a zip").unwrap();

    let store = TemplateStore::with_paths(vec![path]);
    let bytes = store.load().unwrap();
    match TemplateArchive::parse(&bytes) {
        Err(TemplateError::Corrupted(source)) => {
            assert!(!source.to_string().is_empty());
        }
        Err(other) => panic!("expected Corrupted, got {other:?}"),
        Ok(_) => panic!("expected parsing to fail"),
    }
}

#[test]
fn test_packaged_template_parses_and_declares_the_contract() {
    // The repo-packaged template is resolved through the manifest-dir default.
    let store = TemplateStore::new();
    let bytes = store.load().unwrap();
    let archive = TemplateArchive::parse(&bytes).unwrap();

    let document = archive.part("word/document.xml").unwrap();
    let xml = std::str::from_utf8(document).unwrap();
    for placeholder in [
        "{{address}}",
        "{{date}}",
        "{{contact-name}}",
        "{{company}}",
        "{{phone-number}}",
        "{{email}}",
        "{{#categories}}",
        "{{category-name}}",
        "{{#products}}",
        "{{code}}",
        "{{description}}",
        "{{manufacturer-description}}",
        "{{product-details}}",
        "{{area-description}}",
        "{{quantity}}",
        "{{price}}",
        "{{notes}}",
        "{{%image}}",
        "{{/products}}",
        "{{/categories}}",
    ] {
        assert!(xml.contains(placeholder), "template missing {placeholder}");
    }
}
