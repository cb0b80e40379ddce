//! Quality-control report types.
//!
//! A `ValidationReport` is a point-in-time snapshot derived from a node set
//! and the regions it came from. It is advisory input to the verifier and
//! escalator, never a gate that blocks the pipeline.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsupportedNode {
    pub node_id: String,
    pub reason: String,
}

/// Node ids sharing the same normalized title, level, and quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub node_ids: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeIssue {
    pub node_id: String,
    pub issue: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coverage {
    pub consumed_evidence_count: usize,
    pub total_evidence_count: usize,
    /// Always within [0, 1].
    pub coverage_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionRisk {
    pub region_id: String,
    pub risk: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub schema_valid: bool,
    pub unsupported_nodes: Vec<UnsupportedNode>,
    pub duplicates: Vec<DuplicateGroup>,
    pub numbering_issues: Vec<NodeIssue>,
    pub hierarchy_issues: Vec<NodeIssue>,
    pub coverage: Coverage,
    pub region_risk_scores: Vec<RegionRisk>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serde_roundtrip() {
        let report = ValidationReport {
            schema_valid: false,
            unsupported_nodes: vec![UnsupportedNode {
                node_id: "n1".into(),
                reason: "missing_title".into(),
            }],
            duplicates: vec![],
            numbering_issues: vec![],
            hierarchy_issues: vec![NodeIssue {
                node_id: "n2".into(),
                issue: "parent_id_self".into(),
            }],
            coverage: Coverage {
                consumed_evidence_count: 3,
                total_evidence_count: 10,
                coverage_ratio: 0.3,
            },
            region_risk_scores: vec![],
        };

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"schemaValid\":false"));
        assert!(json.contains("\"coverageRatio\":0.3"));

        let parsed: ValidationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }
}
