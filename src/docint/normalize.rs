//! Normalization of raw document-understanding output.
//!
//! The backend returns a loosely structured payload, sometimes nested under
//! a `markdown` envelope: a full content string plus pages, paragraphs,
//! tables, and sections. Normalization produces a stable internal
//! representation the segmenter can rely on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedLine {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedParagraph {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPage {
    pub page_number: u32,
    #[serde(default)]
    pub lines: Vec<NormalizedLine>,
    /// Raw table payloads attributed to this page.
    #[serde(default)]
    pub tables: Vec<Value>,
    #[serde(default)]
    pub paragraphs: Vec<NormalizedParagraph>,
}

/// Stable internal representation of the analyzed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedDocument {
    /// Full markdown content when the backend provides one.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub pages: Vec<NormalizedPage>,
    /// All paragraphs in reading order, regardless of page.
    #[serde(default)]
    pub paragraphs: Vec<NormalizedParagraph>,
    #[serde(default)]
    pub tables: Vec<Value>,
    #[serde(default)]
    pub sections: Vec<Value>,
}

/// Normalize the raw backend payload.
///
/// Headers and footers are kept: they often carry the section titles that
/// anchor the breakdown structure.
pub fn normalize(raw: &Value) -> NormalizedDocument {
    // Some backend versions nest the result under a `markdown` envelope.
    let body = raw.get("markdown").unwrap_or(raw);

    let raw_pages = as_array(body.get("pages"));
    let raw_paragraphs = as_array(body.get("paragraphs"));
    let raw_tables = as_array(body.get("tables"));
    let raw_sections = as_array(body.get("sections"));

    let paragraphs: Vec<NormalizedParagraph> = raw_paragraphs
        .iter()
        .map(|p| NormalizedParagraph {
            content: str_field(p, "content"),
            role: p.get("role").and_then(|v| v.as_str()).map(String::from),
            page_number: paragraph_page(p),
        })
        .collect();

    let mut pages: Vec<NormalizedPage> = raw_pages
        .iter()
        .enumerate()
        .map(|(idx, page)| {
            let page_number = page
                .get("pageNumber")
                .and_then(|v| v.as_u64())
                .map(|n| n as u32)
                .unwrap_or(idx as u32 + 1);

            NormalizedPage {
                page_number,
                lines: as_array(page.get("lines"))
                    .iter()
                    .map(|line| NormalizedLine {
                        content: str_field(line, "content"),
                    })
                    .collect(),
                tables: as_array(page.get("tables")).to_vec(),
                paragraphs: paragraphs
                    .iter()
                    .filter(|p| p.page_number == Some(page_number))
                    .cloned()
                    .collect(),
            }
        })
        .collect();

    // No page structure at all: synthesize page 1 from the paragraphs so
    // downstream segmentation still has something to walk.
    if pages.is_empty() && !paragraphs.is_empty() {
        pages.push(NormalizedPage {
            page_number: 1,
            lines: Vec::new(),
            tables: Vec::new(),
            paragraphs: paragraphs.clone(),
        });
    }

    // Tables carry their own page attribution; attach them.
    for table in &raw_tables {
        let page_number = table
            .get("boundingRegions")
            .and_then(|r| r.get(0))
            .and_then(|r| r.get("pageNumber"))
            .and_then(|v| v.as_u64())
            .map(|n| n as u32)
            .unwrap_or(1);
        if let Some(page) = pages.iter_mut().find(|p| p.page_number == page_number) {
            page.tables.push(table.clone());
        }
    }

    NormalizedDocument {
        content: body
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        pages,
        paragraphs,
        tables: raw_tables,
        sections: raw_sections,
    }
}

fn as_array(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

fn str_field(value: &Value, field: &str) -> String {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn paragraph_page(paragraph: &Value) -> Option<u32> {
    paragraph
        .get("boundingRegions")
        .and_then(|r| r.get(0))
        .and_then(|r| r.get("pageNumber"))
        .and_then(|v| v.as_u64())
        .map(|n| n as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_markdown_envelope() {
        let raw = json!({
            "link": "https://example/doc",
            "markdown": {
                "content": "# Plan",
                "pages": [{ "pageNumber": 1, "lines": [{ "content": "Plan" }] }],
                "paragraphs": [],
            }
        });
        let doc = normalize(&raw);
        assert_eq!(doc.content, "# Plan");
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].lines[0].content, "Plan");
    }

    #[test]
    fn groups_paragraphs_by_bounding_region_page() {
        let raw = json!({
            "pages": [{ "pageNumber": 1 }, { "pageNumber": 2 }],
            "paragraphs": [
                { "content": "first", "boundingRegions": [{ "pageNumber": 1 }] },
                { "content": "second", "boundingRegions": [{ "pageNumber": 2 }] },
                { "content": "also second", "boundingRegions": [{ "pageNumber": 2 }] },
            ]
        });
        let doc = normalize(&raw);
        assert_eq!(doc.pages[0].paragraphs.len(), 1);
        assert_eq!(doc.pages[1].paragraphs.len(), 2);
        assert_eq!(doc.paragraphs.len(), 3);
    }

    #[test]
    fn synthesizes_page_when_only_paragraphs_exist() {
        let raw = json!({
            "paragraphs": [{ "content": "orphan text" }]
        });
        let doc = normalize(&raw);
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].page_number, 1);
        assert_eq!(doc.pages[0].paragraphs[0].content, "orphan text");
    }

    #[test]
    fn attaches_tables_to_their_pages() {
        let raw = json!({
            "pages": [{ "pageNumber": 1 }, { "pageNumber": 2 }],
            "tables": [
                { "cells": [], "boundingRegions": [{ "pageNumber": 2 }] },
            ]
        });
        let doc = normalize(&raw);
        assert!(doc.pages[0].tables.is_empty());
        assert_eq!(doc.pages[1].tables.len(), 1);
    }

    #[test]
    fn empty_payload_yields_empty_document() {
        let doc = normalize(&json!({}));
        assert!(doc.pages.is_empty());
        assert!(doc.content.is_empty());
    }

    #[test]
    fn page_numbers_default_to_position() {
        let raw = json!({ "pages": [{}, {}] });
        let doc = normalize(&raw);
        assert_eq!(doc.pages[0].page_number, 1);
        assert_eq!(doc.pages[1].page_number, 2);
    }
}
