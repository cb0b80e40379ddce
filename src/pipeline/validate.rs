//! Validation: a pure, deterministic QC snapshot over a node set.
//!
//! The report is advisory input to the verifier and escalator; it never
//! blocks the pipeline. Re-running on identical input yields an identical
//! report.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::qc::{
    Coverage, DuplicateGroup, NodeIssue, RegionRisk, UnsupportedNode, ValidationReport,
};
use crate::models::{Node, Region};

/// Dotted alphanumeric level labels: "1", "2.2.1", "A.1.a".
fn level_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9]+(\.[A-Za-z0-9]+)*$").expect("valid level pattern")
    })
}

/// Compute the QC report for a node set and the regions it came from.
pub fn validate_nodes(nodes: &[Node], regions: &[Region]) -> ValidationReport {
    let mut unsupported_nodes = Vec::new();
    let mut numbering_issues = Vec::new();
    let mut hierarchy_issues = Vec::new();

    // BTreeMap keeps duplicate groups in a deterministic order.
    let mut seen: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for node in nodes {
        if node.title.trim().is_empty() {
            unsupported_nodes.push(UnsupportedNode {
                node_id: node.id.clone(),
                reason: "missing_title".to_string(),
            });
        }
        if node.provenance.quote.trim().is_empty() {
            unsupported_nodes.push(UnsupportedNode {
                node_id: node.id.clone(),
                reason: "missing_provenance_quote".to_string(),
            });
        }

        let key = format!(
            "{}|{}|{}",
            node.title.trim().to_lowercase(),
            node.level.as_deref().unwrap_or(""),
            node.provenance.quote
        );
        seen.entry(key).or_default().push(node.id.clone());

        if node.parent_id.as_deref() == Some(node.id.as_str()) {
            hierarchy_issues.push(NodeIssue {
                node_id: node.id.clone(),
                issue: "parent_id_self".to_string(),
            });
        }
        if let Some(level) = &node.level {
            if !level_pattern().is_match(level) {
                numbering_issues.push(NodeIssue {
                    node_id: node.id.clone(),
                    issue: "level_format_suspicious".to_string(),
                });
            }
        }
    }

    let duplicates: Vec<DuplicateGroup> = seen
        .into_values()
        .filter(|ids| ids.len() > 1)
        .map(|node_ids| DuplicateGroup {
            node_ids,
            reason: "same_title_level_quote".to_string(),
        })
        .collect();

    let total_evidence_count: usize = regions.iter().map(Region::evidence_units).sum();
    let consumed_evidence_count = nodes.len();
    let coverage_ratio =
        (consumed_evidence_count as f64 / total_evidence_count.max(1) as f64).min(1.0);

    ValidationReport {
        schema_valid: unsupported_nodes.is_empty(),
        unsupported_nodes,
        duplicates,
        numbering_issues,
        hierarchy_issues,
        coverage: Coverage {
            consumed_evidence_count,
            total_evidence_count,
            coverage_ratio,
        },
        region_risk_scores: regions
            .iter()
            .map(|r| RegionRisk {
                region_id: r.region_id.clone(),
                risk: 0.0,
                reasons: Vec::new(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RegionType;

    fn region(id: &str, text: &str) -> Region {
        Region {
            region_id: id.into(),
            region_type: RegionType::ParagraphBlock,
            page_or_sheet: "page:1".into(),
            text: text.into(),
            evidence_refs: serde_json::Value::Null,
            token_estimate: 1,
        }
    }

    fn supported(id: &str, title: &str) -> Node {
        Node::new(id, title).with_region("r1").with_quote(title)
    }

    #[test]
    fn flags_missing_title_and_quote() {
        let nodes = vec![Node::new("n1", "  "), Node::new("n2", "Titled")];
        let report = validate_nodes(&nodes, &[region("r1", "x")]);

        assert!(!report.schema_valid);
        let reasons: Vec<&str> = report
            .unsupported_nodes
            .iter()
            .map(|u| u.reason.as_str())
            .collect();
        // n1 is missing both; n2 is missing only the quote.
        assert_eq!(
            reasons,
            vec![
                "missing_title",
                "missing_provenance_quote",
                "missing_provenance_quote"
            ]
        );
    }

    #[test]
    fn flags_self_parent() {
        let mut node = supported("n1", "Loop");
        node.parent_id = Some("n1".into());
        let report = validate_nodes(&[node], &[region("r1", "x")]);
        assert_eq!(report.hierarchy_issues.len(), 1);
        assert_eq!(report.hierarchy_issues[0].issue, "parent_id_self");
    }

    #[test]
    fn flags_suspicious_numbering() {
        let good = supported("n1", "Fine").with_level("2.2.1");
        let bad = supported("n2", "Odd").with_level("2..1");
        let worse = supported("n3", "Spaced").with_level("2 1");

        let report = validate_nodes(&[good, bad, worse], &[region("r1", "x")]);
        let flagged: Vec<&str> = report
            .numbering_issues
            .iter()
            .map(|i| i.node_id.as_str())
            .collect();
        assert_eq!(flagged, vec!["n2", "n3"]);
    }

    #[test]
    fn alphanumeric_levels_pass() {
        let node = supported("n1", "Annex").with_level("A.1.a");
        let report = validate_nodes(&[node], &[region("r1", "x")]);
        assert!(report.numbering_issues.is_empty());
    }

    #[test]
    fn duplicates_group_together_never_split() {
        // Three nodes sharing (title, level, quote) land in exactly one group.
        let nodes = vec![
            supported("n1", "Foundation").with_level("1"),
            supported("n2", "Foundation").with_level("1"),
            supported("n3", "Foundation").with_level("1"),
            supported("n4", "Foundation").with_level("2"),
        ];
        let report = validate_nodes(&nodes, &[region("r1", "x")]);

        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].node_ids, vec!["n1", "n2", "n3"]);
    }

    #[test]
    fn duplicate_titles_match_case_insensitively() {
        let nodes = vec![
            supported("n1", "foundation").with_quote("q"),
            supported("n2", "Foundation ").with_quote("q"),
        ];
        let report = validate_nodes(&nodes, &[region("r1", "x")]);
        assert_eq!(report.duplicates.len(), 1);
    }

    #[test]
    fn coverage_ratio_is_clamped_to_one() {
        let nodes: Vec<Node> = (0..10)
            .map(|i| supported(&format!("n{i}"), &format!("Node {i}")))
            .collect();
        let report = validate_nodes(&nodes, &[region("r1", "one line")]);
        assert_eq!(report.coverage.coverage_ratio, 1.0);
        assert_eq!(report.coverage.consumed_evidence_count, 10);
        assert_eq!(report.coverage.total_evidence_count, 1);
    }

    #[test]
    fn coverage_uses_region_line_counts() {
        let regions = vec![region("r1", "a\nb\nc"), region("r2", "d\ne")];
        let nodes = vec![supported("n1", "One")];
        let report = validate_nodes(&nodes, &regions);
        assert_eq!(report.coverage.total_evidence_count, 5);
        assert_eq!(report.coverage.coverage_ratio, 0.2);
    }

    #[test]
    fn empty_input_keeps_ratio_in_range() {
        let report = validate_nodes(&[], &[]);
        assert_eq!(report.coverage.coverage_ratio, 0.0);
        assert!(report.schema_valid);
    }

    #[test]
    fn validation_is_idempotent() {
        let nodes = vec![
            supported("n1", "Foundation").with_level("1"),
            supported("n2", "Foundation").with_level("1"),
            Node::new("n3", ""),
        ];
        let regions = vec![region("r1", "a\nb")];

        let first = serde_json::to_vec(&validate_nodes(&nodes, &regions)).unwrap();
        let second = serde_json::to_vec(&validate_nodes(&nodes, &regions)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn risk_scores_cover_every_region() {
        let regions = vec![region("r1", "x"), region("r2", "y")];
        let report = validate_nodes(&[], &regions);
        assert_eq!(report.region_risk_scores.len(), 2);
        assert!(report.region_risk_scores.iter().all(|r| r.risk == 0.0));
    }
}
