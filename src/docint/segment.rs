//! Segmentation: normalized document to extractable regions.
//!
//! One table region per table plus one paragraph-block region per
//! content-bearing page. Tables render to a deterministic markdown grid so
//! downstream text-based extraction treats all evidence uniformly.

use serde_json::{json, Value};
use uuid::Uuid;

use super::normalize::{NormalizedDocument, NormalizedPage};
use crate::models::{Region, RegionType};

/// How much of the raw payload the zero-region fallback keeps.
const FALLBACK_DUMP_LIMIT: usize = 4_000;

/// Crude approximation: 1 token per 4 characters.
pub fn estimate_tokens(text: &str) -> u32 {
    text.len().div_ceil(4) as u32
}

/// Segment a normalized document into regions.
///
/// Never returns an empty list: a document with no usable pages or
/// paragraphs produces a single fallback region holding a truncated raw
/// dump, so the pipeline always has at least one region to extract from.
pub fn segment(doc: &NormalizedDocument) -> Vec<Region> {
    let mut regions = Vec::new();

    for page in &doc.pages {
        let page_label = format!("page:{}", page.page_number);

        for table in &page.tables {
            let text = table_to_markdown(table);
            if text.is_empty() {
                continue;
            }
            regions.push(Region {
                region_id: Uuid::new_v4().to_string(),
                region_type: RegionType::Table,
                page_or_sheet: page_label.clone(),
                token_estimate: estimate_tokens(&text),
                evidence_refs: json!({ "page": page.page_number, "kind": "table" }),
                text,
            });
        }

        let text = paragraph_block_text(page);
        if !text.is_empty() {
            regions.push(Region {
                region_id: Uuid::new_v4().to_string(),
                region_type: RegionType::ParagraphBlock,
                page_or_sheet: page_label,
                token_estimate: estimate_tokens(&text),
                evidence_refs: json!({ "page": page.page_number, "kind": "paragraphs" }),
                text,
            });
        }
    }

    if regions.is_empty() {
        let dump = serde_json::to_string(doc).unwrap_or_default();
        let text: String = dump.chars().take(FALLBACK_DUMP_LIMIT).collect();
        regions.push(Region {
            region_id: Uuid::new_v4().to_string(),
            region_type: RegionType::Unknown,
            page_or_sheet: "page:1".to_string(),
            token_estimate: estimate_tokens(&text),
            evidence_refs: json!({ "kind": "fallback_dump" }),
            text,
        });
    }

    regions
}

/// All paragraph content on a page, falling back to raw lines when the
/// backend produced no paragraph structure.
fn paragraph_block_text(page: &NormalizedPage) -> String {
    let mut parts: Vec<&str> = page
        .paragraphs
        .iter()
        .map(|p| p.content.trim())
        .filter(|t| !t.is_empty())
        .collect();

    if parts.is_empty() {
        parts = page
            .lines
            .iter()
            .map(|l| l.content.trim())
            .filter(|t| !t.is_empty())
            .collect();
    }

    parts.join("\n\n")
}

/// Render a backend table payload as a markdown table.
///
/// Cells are placed into a grid by row/column index (spans reserve space),
/// `|` and newlines inside cell content are escaped, and the first row gets
/// a separator so the output parses as markdown.
pub fn table_to_markdown(table: &Value) -> String {
    let Some(cells) = table.get("cells").and_then(|c| c.as_array()) else {
        return serde_json::to_string_pretty(table).unwrap_or_default();
    };
    if cells.is_empty() {
        return String::new();
    }

    let mut max_row = 0usize;
    let mut max_col = 0usize;
    for cell in cells {
        let row_end = usize_field(cell, "rowIndex") + usize_field_or(cell, "rowSpan", 1);
        let col_end = usize_field(cell, "columnIndex") + usize_field_or(cell, "columnSpan", 1);
        max_row = max_row.max(row_end);
        max_col = max_col.max(col_end);
    }

    let mut grid = vec![vec![String::new(); max_col]; max_row];
    for cell in cells {
        let row = usize_field(cell, "rowIndex");
        let col = usize_field(cell, "columnIndex");
        let content = cell
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .replace('|', "\\|")
            .replace('\n', " ");
        grid[row][col] = content;
    }

    let mut lines = Vec::with_capacity(max_row + 1);
    for (r, row) in grid.iter().enumerate() {
        lines.push(format!("| {} |", row.join(" | ")));
        if r == 0 {
            let separator: Vec<&str> = row.iter().map(|_| "---").collect();
            lines.push(format!("| {} |", separator.join(" | ")));
        }
    }

    lines.join("\n")
}

fn usize_field(value: &Value, field: &str) -> usize {
    value
        .get(field)
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as usize
}

fn usize_field_or(value: &Value, field: &str, default: usize) -> usize {
    value
        .get(field)
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(default)
}
