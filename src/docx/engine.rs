//! Placeholder merge engine over `word/document.xml`.
//!
//! Delimiters are fixed to `{{`/`}}`. `{{#name}}`/`{{/name}}` delimit loop
//! sections, `{{%name}}` marks an image substitution point, anything else is
//! a scalar substitution. A loop tag alone in its paragraph consumes that
//! paragraph and repeats the paragraphs between open and close once per
//! element; inline tags repeat the span between them. Placeholders resolve
//! innermost-first through the scope chain, so header fields stay addressable
//! inside loops. Linebreaks in substituted values become new paragraphs
//! carrying the source paragraph and run properties.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::io::{Cursor, Write};
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::CompressionMethod;

use super::images::ImageModule;
use super::template::TemplateArchive;
use super::{RenderError, RenderIssue, TemplateError};

lazy_static! {
    static ref TEXT_NODE_RE: Regex = Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>").unwrap();
    static ref REL_ID_RE: Regex = Regex::new(r#"Id="rId(\d+)""#).unwrap();
}

const IMAGE_RELATIONSHIP_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// A configured engine over one parsed template archive.
pub struct MergeEngine {
    parts: Vec<(String, Vec<u8>)>,
    document_xml: String,
    image_module: Option<ImageModule>,
    next_rel_seq: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Scalar,
    Open,
    Close,
    Image,
}

#[derive(Debug, Clone)]
struct Tag {
    start: usize,
    end: usize,
    name: String,
    kind: TagKind,
}

struct EmbeddedImage {
    media_name: String,
    rel_id: String,
    bytes: Vec<u8>,
}

impl MergeEngine {
    /// Parse the template's placeholder structure. Malformed tags (unclosed
    /// delimiters, a tag crossing a paragraph boundary, overlapping tags, a
    /// missing or undecodable `word/document.xml`) fail construction.
    pub fn new(archive: TemplateArchive) -> Result<Self, TemplateError> {
        let document = archive.part("word/document.xml").ok_or_else(|| {
            TemplateError::StructureInvalid("template has no word/document.xml part".to_string())
        })?;
        let raw = String::from_utf8(document.to_vec()).map_err(|_| {
            TemplateError::StructureInvalid("word/document.xml is not valid UTF-8".to_string())
        })?;
        let document_xml = normalize_tags(&raw)?;

        let next_rel_seq = archive
            .part("word/_rels/document.xml.rels")
            .and_then(|data| std::str::from_utf8(data).ok())
            .map(next_relationship_seq)
            .unwrap_or(1);

        Ok(Self {
            parts: archive.into_parts(),
            document_xml,
            image_module: None,
            next_rel_seq,
        })
    }

    /// Enable image embedding for `{{%name}}` tags.
    pub fn attach_image_module(&mut self, module: ImageModule) {
        self.image_module = Some(module);
    }

    /// Merge the data into the template and assemble the output archive.
    pub fn render(&self, data: &Value) -> Result<Vec<u8>, RenderError> {
        let mut issues = Vec::new();
        let mut images = Vec::new();
        let scopes = vec![data];
        let body = self.render_fragment(&self.document_xml, &scopes, &mut issues, &mut images);

        if !issues.is_empty() {
            return Err(RenderError::Failed(issues));
        }

        self.assemble(&body, &images)
    }

    fn render_fragment(
        &self,
        frag: &str,
        scopes: &[&Value],
        issues: &mut Vec<RenderIssue>,
        images: &mut Vec<EmbeddedImage>,
    ) -> String {
        let mut out = String::new();
        let mut cursor = 0;

        while let Some(tag) = next_tag(frag, cursor) {
            match tag.kind {
                TagKind::Scalar => {
                    out.push_str(&frag[cursor..tag.start]);
                    if let Some(value) = resolve(scopes, &tag.name) {
                        match scalar_display(value) {
                            Some(text) => out.push_str(&substituted_text(frag, &tag, &text)),
                            None => issues.push(RenderIssue::new(
                                "invalid_value",
                                format!("value for '{}' is not renderable text", tag.name),
                            )),
                        }
                    }
                    cursor = tag.end;
                }
                TagKind::Image => {
                    out.push_str(&frag[cursor..tag.start]);
                    if let Some(module) = &self.image_module {
                        self.substitute_image(frag, &tag, module, scopes, images, &mut out);
                    }
                    cursor = tag.end;
                }
                TagKind::Close => {
                    issues.push(RenderIssue::new(
                        "unopened_loop",
                        format!("closing tag for '{}' has no opening tag", tag.name),
                    ));
                    out.push_str(&frag[cursor..tag.start]);
                    cursor = tag.end;
                }
                TagKind::Open => match find_matching_close(frag, &tag) {
                    None => {
                        issues.push(RenderIssue::new(
                            "unclosed_loop",
                            format!("loop '{}' has no closing tag", tag.name),
                        ));
                        out.push_str(&frag[cursor..tag.start]);
                        cursor = tag.end;
                    }
                    Some(close) => {
                        let open_para =
                            tag_alone_in_paragraph(frag, &tag).filter(|&(ps, _)| ps >= cursor);
                        let close_para =
                            tag_alone_in_paragraph(frag, &close).filter(|&(ps, _)| ps >= tag.end);

                        // Both ends must agree on consuming their paragraphs,
                        // otherwise repeating the block unbalances the XML.
                        if open_para.is_some() != close_para.is_some() {
                            issues.push(RenderIssue::new(
                                "mismatched_loop",
                                format!(
                                    "loop '{}' mixes a paragraph tag with an inline tag",
                                    tag.name
                                ),
                            ));
                            out.push_str(&frag[cursor..tag.start]);
                            cursor = close.end;
                            continue;
                        }

                        let (lead_end, block_start) = open_para.unwrap_or((tag.start, tag.end));
                        let (block_end, resume) = close_para.unwrap_or((close.start, close.end));

                        out.push_str(&frag[cursor..lead_end]);
                        let block = &frag[block_start..block_end];

                        match resolve(scopes, &tag.name) {
                            Some(Value::Array(items)) => {
                                for item in items {
                                    let mut inner: Vec<&Value> = scopes.to_vec();
                                    inner.push(item);
                                    out.push_str(
                                        &self.render_fragment(block, &inner, issues, images),
                                    );
                                }
                            }
                            Some(_) => issues.push(RenderIssue::new(
                                "loop_not_array",
                                format!("value for loop '{}' is not a sequence", tag.name),
                            )),
                            None => issues.push(RenderIssue::new(
                                "unresolved_loop",
                                format!("no value supplied for loop '{}'", tag.name),
                            )),
                        }

                        cursor = resume;
                    }
                },
            }
        }

        out.push_str(&frag[cursor..]);
        out
    }

    fn substitute_image(
        &self,
        frag: &str,
        tag: &Tag,
        module: &ImageModule,
        scopes: &[&Value],
        images: &mut Vec<EmbeddedImage>,
        out: &mut String,
    ) {
        let bytes = resolve(scopes, &tag.name)
            .and_then(scalar_display)
            .map(|payload| module.decode_payload(&payload))
            .unwrap_or_default();
        if bytes.is_empty() {
            return;
        }

        let seq = images.len() + 1;
        let rel_id = format!("rId{}", self.next_rel_seq + images.len());
        let media_name = format!("image_generated_{seq}.png");
        let run_props = enclosing_run_props(frag, tag.start);

        // The drawing must live in a run, not a text node; split the run
        // around the tag and keep the run formatting on both sides.
        out.push_str("</w:t></w:r><w:r>");
        out.push_str(&run_props);
        out.push_str(&module.drawing_xml(&rel_id, (9000 + seq) as u32, &media_name));
        out.push_str("</w:r><w:r>");
        out.push_str(&run_props);
        out.push_str("<w:t xml:space=\"preserve\">");

        images.push(EmbeddedImage {
            media_name,
            rel_id,
            bytes,
        });
    }

    fn assemble(&self, document_xml: &str, images: &[EmbeddedImage]) -> Result<Vec<u8>, RenderError> {
        let mut out = Vec::new();
        let mut writer = ZipWriter::new(Cursor::new(&mut out));
        let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut wrote_rels = false;

        for (name, data) in &self.parts {
            match name.as_str() {
                "word/document.xml" => {
                    writer.start_file(name.as_str(), opts)?;
                    writer.write_all(document_xml.as_bytes())?;
                }
                "word/_rels/document.xml.rels" if !images.is_empty() => {
                    let rels = String::from_utf8_lossy(data);
                    let patched = append_image_relationships(&rels, images);
                    writer.start_file(name.as_str(), opts)?;
                    writer.write_all(patched.as_bytes())?;
                    wrote_rels = true;
                }
                "[Content_Types].xml" if !images.is_empty() => {
                    let types = String::from_utf8_lossy(data);
                    let patched = ensure_png_default(&types);
                    writer.start_file(name.as_str(), opts)?;
                    writer.write_all(patched.as_bytes())?;
                }
                _ => {
                    writer.start_file(name.as_str(), opts)?;
                    writer.write_all(data)?;
                }
            }
        }

        if !images.is_empty() {
            if !wrote_rels {
                writer.start_file("word/_rels/document.xml.rels", opts)?;
                writer.write_all(fresh_relationships(images).as_bytes())?;
            }
            for image in images {
                writer.start_file(format!("word/media/{}", image.media_name), opts)?;
                writer.write_all(&image.bytes)?;
            }
        }

        writer.finish()?;
        Ok(out)
    }
}

fn resolve<'a>(scopes: &[&'a Value], name: &str) -> Option<&'a Value> {
    scopes.iter().rev().find_map(|scope| scope.get(name))
}

fn scalar_display(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn next_tag(frag: &str, from: usize) -> Option<Tag> {
    let start = from + frag[from..].find("{{")?;
    let close = frag[start + 2..].find("}}")?;
    let end = start + 2 + close + 2;
    let inner = frag[start + 2..start + 2 + close].trim();

    let (kind, name) = match inner.as_bytes().first() {
        Some(b'#') => (TagKind::Open, inner[1..].trim()),
        Some(b'/') => (TagKind::Close, inner[1..].trim()),
        Some(b'%') => (TagKind::Image, inner[1..].trim()),
        _ => (TagKind::Scalar, inner),
    };

    Some(Tag {
        start,
        end,
        name: name.to_string(),
        kind,
    })
}

/// Find the close for a loop open, counting same-name nesting.
fn find_matching_close(frag: &str, open: &Tag) -> Option<Tag> {
    let mut depth = 0usize;
    let mut cursor = open.end;
    while let Some(tag) = next_tag(frag, cursor) {
        cursor = tag.end;
        if tag.name != open.name {
            continue;
        }
        match tag.kind {
            TagKind::Open => depth += 1,
            TagKind::Close => {
                if depth == 0 {
                    return Some(tag);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

/// Paragraph bounds (including `</w:p>`) around a position, if it sits inside
/// a complete paragraph within this fragment.
fn paragraph_bounds(frag: &str, pos: usize) -> Option<(usize, usize)> {
    let start = paragraph_open_before(frag, pos)?;
    let close = frag[pos..].find("</w:p>")? + pos;
    Some((start, close + "</w:p>".len()))
}

fn paragraph_open_before(frag: &str, pos: usize) -> Option<usize> {
    let bytes = frag.as_bytes();
    let mut search_end = pos;
    while let Some(i) = frag[..search_end].rfind("<w:p") {
        match bytes.get(i + 4) {
            Some(b'>') | Some(b' ') => {
                if frag[i..pos].contains("</w:p>") {
                    return None;
                }
                return Some(i);
            }
            _ => search_end = i,
        }
    }
    None
}

fn visible_text(xml: &str) -> String {
    TEXT_NODE_RE
        .captures_iter(xml)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// If the tag is the only visible text of its paragraph, return the
/// paragraph's bounds so the whole paragraph can be consumed.
fn tag_alone_in_paragraph(frag: &str, tag: &Tag) -> Option<(usize, usize)> {
    let (start, end) = paragraph_bounds(frag, tag.start)?;
    let text = visible_text(&frag[start..end]);
    (text.trim() == frag[tag.start..tag.end].trim()).then_some((start, end))
}

/// Paragraph properties of the paragraph enclosing `pos`, or empty.
fn enclosing_paragraph_props(frag: &str, pos: usize) -> String {
    let Some(start) = paragraph_open_before(frag, pos) else {
        return String::new();
    };
    let Some(open_end) = frag[start..pos].find('>') else {
        return String::new();
    };
    let after_open = start + open_end + 1;
    if frag[after_open..pos].starts_with("<w:pPr>") {
        if let Some(end) = frag[after_open..pos].find("</w:pPr>") {
            return frag[after_open..after_open + end + "</w:pPr>".len()].to_string();
        }
    }
    String::new()
}

/// Run properties of the run enclosing `pos`, or empty.
fn enclosing_run_props(frag: &str, pos: usize) -> String {
    let bytes = frag.as_bytes();
    let mut search_end = pos;
    while let Some(i) = frag[..search_end].rfind("<w:r") {
        match bytes.get(i + 4) {
            Some(b'>') | Some(b' ') => {
                let Some(open_end) = frag[i..pos].find('>') else {
                    return String::new();
                };
                let after_open = i + open_end + 1;
                if frag[after_open..pos].starts_with("<w:rPr>") {
                    if let Some(end) = frag[after_open..pos].find("</w:rPr>") {
                        return frag[after_open..after_open + end + "</w:rPr>".len()].to_string();
                    }
                }
                return String::new();
            }
            _ => search_end = i,
        }
    }
    String::new()
}

/// Escape a value for the text node, converting linebreaks into new
/// paragraphs that carry the source paragraph and run properties.
fn substituted_text(frag: &str, tag: &Tag, value: &str) -> String {
    let value = value.replace("\r\n", "\n").replace('\r', "\n");
    if !value.contains('\n') {
        return escape_xml(&value);
    }

    let paragraph_props = enclosing_paragraph_props(frag, tag.start);
    let run_props = enclosing_run_props(frag, tag.start);

    let mut parts = value.split('\n');
    let mut out = String::new();
    out.push_str(&escape_xml(parts.next().unwrap_or("")));
    for part in parts {
        out.push_str("</w:t></w:r></w:p><w:p>");
        out.push_str(&paragraph_props);
        out.push_str("<w:r>");
        out.push_str(&run_props);
        out.push_str("<w:t xml:space=\"preserve\">");
        out.push_str(&escape_xml(part));
    }
    out
}

fn next_relationship_seq(rels: &str) -> usize {
    REL_ID_RE
        .captures_iter(rels)
        .filter_map(|caps| caps[1].parse::<usize>().ok())
        .max()
        .map(|max| max + 1)
        .unwrap_or(1)
}

fn append_image_relationships(rels: &str, images: &[EmbeddedImage]) -> String {
    let mut additions = String::new();
    for image in images {
        additions.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}" Target="media/{}"/>"#,
            image.rel_id, IMAGE_RELATIONSHIP_TYPE, image.media_name
        ));
    }
    match rels.rfind("</Relationships>") {
        Some(pos) => {
            let mut out = rels.to_string();
            out.insert_str(pos, &additions);
            out
        }
        None => fresh_relationships(images),
    }
}

fn fresh_relationships(images: &[EmbeddedImage]) -> String {
    let mut out = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for image in images {
        out.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}" Target="media/{}"/>"#,
            image.rel_id, IMAGE_RELATIONSHIP_TYPE, image.media_name
        ));
    }
    out.push_str("</Relationships>");
    out
}

fn ensure_png_default(types: &str) -> String {
    if types.contains(r#"Extension="png""#) {
        return types.to_string();
    }
    match types.rfind("</Types>") {
        Some(pos) => {
            let mut out = types.to_string();
            out.insert_str(pos, r#"<Default Extension="png" ContentType="image/png"/>"#);
            out
        }
        None => types.to_string(),
    }
}

/// Re-merge tags that Word split across runs so every `{{...}}` lies wholly
/// inside one text node, validating delimiter pairing along the way.
fn normalize_tags(xml: &str) -> Result<String, TemplateError> {
    let paragraph_closes: Vec<usize> = xml.match_indices("</w:p>").map(|(i, _)| i).collect();

    struct Node {
        span: (usize, usize),
        text_span: (usize, usize),
        paragraph: usize,
    }

    let mut nodes = Vec::new();
    for caps in TEXT_NODE_RE.captures_iter(xml) {
        let full = caps.get(0).expect("full match");
        let inner = caps.get(1).expect("inner capture");
        let paragraph = paragraph_closes.partition_point(|&i| i < full.start());
        nodes.push(Node {
            span: (full.start(), full.end()),
            text_span: (inner.start(), inner.end()),
            paragraph,
        });
    }

    let mut replacements: Vec<(usize, usize, String)> = Vec::new();
    let mut i = 0;
    while i < nodes.len() {
        let mut j = i;
        while j < nodes.len() && nodes[j].paragraph == nodes[i].paragraph {
            j += 1;
        }
        let group = &nodes[i..j];
        let texts: Vec<&str> = group
            .iter()
            .map(|node| &xml[node.text_span.0..node.text_span.1])
            .collect();
        let combined = texts.concat();
        let tags = tag_spans(&combined).map_err(TemplateError::StructureInvalid)?;

        if group.len() > 1 && !tags.is_empty() {
            let new_texts = redistribute(&texts, &tags);
            for (node, new_text) in group.iter().zip(new_texts) {
                if new_text != xml[node.text_span.0..node.text_span.1] {
                    replacements.push((
                        node.span.0,
                        node.span.1,
                        format!("<w:t xml:space=\"preserve\">{new_text}</w:t>"),
                    ));
                }
            }
        }
        i = j;
    }

    let mut out = xml.to_string();
    replacements.sort_by_key(|replacement| replacement.0);
    for (start, end, replacement) in replacements.into_iter().rev() {
        out.replace_range(start..end, &replacement);
    }
    Ok(out)
}

/// Byte spans of complete `{{...}}` tags within one paragraph's visible text.
fn tag_spans(text: &str) -> Result<Vec<(usize, usize)>, String> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;
    let mut k = 0;
    while k + 1 < bytes.len() {
        if bytes[k] == b'{' && bytes[k + 1] == b'{' {
            if open.is_some() {
                return Err(format!(
                    "overlapping placeholder delimiters near '{}'",
                    excerpt(text, k)
                ));
            }
            open = Some(k);
            k += 2;
            continue;
        }
        if bytes[k] == b'}' && bytes[k + 1] == b'}' {
            match open.take() {
                Some(start) => {
                    if text[start + 2..k].trim().is_empty() {
                        return Err("empty placeholder name".to_string());
                    }
                    spans.push((start, k + 2));
                }
                None => {
                    return Err(format!(
                        "closing delimiter without an opening one near '{}'",
                        excerpt(text, k)
                    ));
                }
            }
            k += 2;
            continue;
        }
        k += 1;
    }
    if let Some(start) = open {
        return Err(format!(
            "placeholder opened but never closed within its paragraph near '{}'",
            excerpt(text, start)
        ));
    }
    Ok(spans)
}

fn excerpt(text: &str, from: usize) -> String {
    text[from..].chars().take(24).collect()
}

/// Reassign each paragraph's text so every tag lands wholly in the first node
/// it spans; literal characters stay with their original nodes.
fn redistribute(texts: &[&str], tags: &[(usize, usize)]) -> Vec<String> {
    let mut bounds = Vec::with_capacity(texts.len());
    let mut acc = 0;
    for text in texts {
        bounds.push((acc, acc + text.len()));
        acc += text.len();
    }
    let combined = texts.concat();
    let mut out = vec![String::new(); texts.len()];
    let node_at = |pos: usize| {
        bounds
            .partition_point(|&(_, end)| end <= pos)
            .min(texts.len() - 1)
    };

    let mut cursor = 0;
    for &(tag_start, tag_end) in tags {
        for (idx, &(start, end)) in bounds.iter().enumerate() {
            let from = start.max(cursor);
            let to = end.min(tag_start);
            if from < to {
                out[idx].push_str(&combined[from..to]);
            }
        }
        out[node_at(tag_start)].push_str(&combined[tag_start..tag_end]);
        cursor = tag_end;
    }
    for (idx, &(start, end)) in bounds.iter().enumerate() {
        let from = start.max(cursor);
        if from < end {
            out[idx].push_str(&combined[from..end]);
        }
    }
    out
}
