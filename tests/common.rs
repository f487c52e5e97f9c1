//! Shared fixtures: in-memory docx builders and archive inspection helpers.

#![allow(dead_code)]

use std::io::{Cursor, Read, Write};
use zip::read::ZipArchive;
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::CompressionMethod;

/// A 1×1 PNG, base64 encoded.
pub const TINY_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8BQDwAEhQGAhKmMIQAAAABJRU5ErkJggg==";

const CONTENT_TYPES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    r#"</Types>"#,
);

const ROOT_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    r#"</Relationships>"#,
);

const DOC_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"</Relationships>"#,
);

/// Wrap a `w:body` fragment into a complete docx archive.
pub fn docx_with_body(body: &str) -> Vec<u8> {
    let document = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<w:document"#,
            r#" xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#,
            r#" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#,
            r#" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing">"#,
            r#"<w:body>{}</w:body></w:document>"#,
        ),
        body
    );

    let mut out = Vec::new();
    {
        let mut writer = ZipWriter::new(Cursor::new(&mut out));
        let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, data) in [
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", ROOT_RELS),
            ("word/document.xml", document.as_str()),
            ("word/_rels/document.xml.rels", DOC_RELS),
        ] {
            writer.start_file(name, opts).unwrap();
            writer.write_all(data.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    out
}

/// One paragraph with a single run of text.
pub fn paragraph(text: &str) -> String {
    format!(r#"<w:p><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#)
}

/// Build a docx whose body is the given paragraph texts.
pub fn docx_with_paragraphs(texts: &[&str]) -> Vec<u8> {
    let body: String = texts.iter().map(|text| paragraph(text)).collect();
    docx_with_body(&body)
}

/// Read one named part out of a zip archive.
pub fn read_part(bytes: &[u8], name: &str) -> Option<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).ok()?;
    let mut entry = archive.by_name(name).ok()?;
    let mut data = Vec::new();
    entry.read_to_end(&mut data).ok()?;
    Some(data)
}

/// List the entry names of a zip archive.
pub fn part_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

/// Concatenated visible text of the main document part.
pub fn docx_text(bytes: &[u8]) -> String {
    let document = read_part(bytes, "word/document.xml").expect("document part");
    let xml = String::from_utf8(document).expect("utf-8 document");
    visible_text(&xml)
}

/// Concatenated `<w:t>` contents of an XML fragment.
pub fn visible_text(xml: &str) -> String {
    let re = regex::Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>").unwrap();
    re.captures_iter(xml).map(|caps| caps[1].to_string()).collect()
}

/// Number of `<w:p` paragraph openings in the main document part.
pub fn paragraph_count(bytes: &[u8]) -> usize {
    let document = read_part(bytes, "word/document.xml").expect("document part");
    let xml = String::from_utf8(document).expect("utf-8 document");
    regex::Regex::new(r"<w:p[ >]").unwrap().find_iter(&xml).count()
}
