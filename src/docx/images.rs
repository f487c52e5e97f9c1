//! Optional image embedding for the merge engine.
//!
//! Every embedded image is displayed at a fixed 132×132 device pixels
//! (1.375 in at 96 DPI) regardless of the source dimensions. Payloads are not
//! format-sniffed; the bytes are written as-is under a `.png` media name.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::warn;

/// 132 px at 96 DPI expressed in EMU.
pub const IMAGE_EXTENT_EMU: u64 = 1_257_300;

#[derive(Debug, Default)]
pub struct ImageModule;

impl ImageModule {
    pub fn new() -> Self {
        Self
    }

    /// Decode a base64 payload, tolerating a `data:<mime>;base64,` prefix.
    /// Empty or undecodable payloads yield a zero-length buffer so the render
    /// never fails on a bad image.
    pub fn decode_payload(&self, payload: &str) -> Vec<u8> {
        let trimmed = payload.trim();
        let trimmed = match trimmed.find(";base64,") {
            Some(i) if trimmed.starts_with("data:") => &trimmed[i + ";base64,".len()..],
            _ => trimmed,
        };
        if trimmed.is_empty() {
            return Vec::new();
        }
        match BASE64.decode(trimmed.as_bytes()) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("discarding undecodable image payload: {err}");
                Vec::new()
            }
        }
    }

    /// The `wp:inline` drawing element referencing an image relationship.
    pub fn drawing_xml(&self, rel_id: &str, docpr_id: u32, media_name: &str) -> String {
        format!(
            concat!(
                r#"<w:drawing>"#,
                r#"<wp:inline distT="0" distB="0" distL="0" distR="0">"#,
                r#"<wp:extent cx="{emu}" cy="{emu}"/>"#,
                r#"<wp:effectExtent l="0" t="0" r="0" b="0"/>"#,
                r#"<wp:docPr id="{id}" name="Picture {id}"/>"#,
                r#"<wp:cNvGraphicFramePr>"#,
                r#"<a:graphicFrameLocks xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" noChangeAspect="1"/>"#,
                r#"</wp:cNvGraphicFramePr>"#,
                r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
                r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
                r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
                r#"<pic:nvPicPr><pic:cNvPr id="{id}" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
                r#"<pic:blipFill>"#,
                r#"<a:blip r:embed="{rel}" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"/>"#,
                r#"<a:stretch><a:fillRect/></a:stretch>"#,
                r#"</pic:blipFill>"#,
                r#"<pic:spPr>"#,
                r#"<a:xfrm><a:off x="0" y="0"/><a:ext cx="{emu}" cy="{emu}"/></a:xfrm>"#,
                r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom>"#,
                r#"</pic:spPr>"#,
                r#"</pic:pic>"#,
                r#"</a:graphicData>"#,
                r#"</a:graphic>"#,
                r#"</wp:inline>"#,
                r#"</w:drawing>"#,
            ),
            emu = IMAGE_EXTENT_EMU,
            id = docpr_id,
            rel = rel_id,
            name = media_name,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_base64() {
        let module = ImageModule::new();
        assert_eq!(module.decode_payload("aGVsbG8="), b"hello");
    }

    #[test]
    fn test_decode_strips_data_url_prefix() {
        let module = ImageModule::new();
        assert_eq!(
            module.decode_payload("data:image/png;base64,aGVsbG8="),
            b"hello"
        );
    }

    #[test]
    fn test_undecodable_payload_yields_empty_buffer() {
        let module = ImageModule::new();
        assert!(module.decode_payload("not base64 !!").is_empty());
        assert!(module.decode_payload("").is_empty());
    }

    #[test]
    fn test_drawing_uses_fixed_extent() {
        let module = ImageModule::new();
        let xml = module.drawing_xml("rId7", 9001, "image_generated_1.png");
        assert!(xml.contains(r#"cx="1257300" cy="1257300""#));
        assert!(xml.contains(r#"r:embed="rId7""#));
    }
}
