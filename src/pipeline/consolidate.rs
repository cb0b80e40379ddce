//! Consolidation: derive parent links from explicit numbering.
//!
//! Per-region extraction only ever sees one region's evidence, so this is
//! the sole mechanism that builds cross-region hierarchy. Pure and
//! deterministic. Only exact truncated-label lookup is attempted; mixed or
//! non-numeric level schemes beyond dotted labels are a known limitation.

use std::collections::HashMap;

use crate::models::Node;

/// Warning attached when a parent was derived from numbering rather than
/// reported by the extraction pass itself.
pub const PARENT_FROM_LEVEL_WARNING: &str = "parent_assigned_from_level";

/// Assign parents by truncated dotted-level lookup.
///
/// For every node lacking a parent but carrying a dotted level label,
/// drop the label's last segment and look for a node with exactly that
/// level; on a hit, link it as the parent. The link is flagged with a
/// warning but not marked inferred: explicit numbering is document
/// evidence, not a judgment call.
pub fn consolidate(nodes: &[Node]) -> Vec<Node> {
    let mut by_level: HashMap<&str, &Node> = HashMap::new();
    for node in nodes {
        if let Some(level) = node.level.as_deref() {
            by_level.insert(level, node);
        }
    }

    let mut out: Vec<Node> = nodes.to_vec();
    for node in &mut out {
        if node.parent_id.is_some() {
            continue;
        }
        let Some(level) = node.level.as_deref() else {
            continue;
        };
        let Some((parent_level, _)) = level.rsplit_once('.') else {
            continue;
        };
        if let Some(parent) = by_level.get(parent_level) {
            node.parent_id = Some(parent.id.clone());
            node.warnings.push(PARENT_FROM_LEVEL_WARNING.to_string());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, level: &str) -> Node {
        Node::new(id, format!("Item {level}")).with_level(level)
    }

    #[test]
    fn assigns_parent_from_truncated_level() {
        let nodes = vec![node("a", "2.2"), node("b", "2.2.1")];
        let out = consolidate(&nodes);

        let child = out.iter().find(|n| n.id == "b").unwrap();
        assert_eq!(child.parent_id.as_deref(), Some("a"));
        assert!(child
            .warnings
            .contains(&PARENT_FROM_LEVEL_WARNING.to_string()));
    }

    #[test]
    fn builds_full_outline_chain() {
        let nodes = vec![node("a", "1"), node("b", "1.1"), node("c", "1.1.1")];
        let out = consolidate(&nodes);

        assert_eq!(out[0].parent_id, None);
        assert_eq!(out[1].parent_id.as_deref(), Some("a"));
        assert_eq!(out[2].parent_id.as_deref(), Some("b"));
    }

    #[test]
    fn single_segment_levels_stay_roots() {
        let out = consolidate(&[node("a", "3")]);
        assert_eq!(out[0].parent_id, None);
        assert!(out[0].warnings.is_empty());
    }

    #[test]
    fn missing_parent_level_is_left_dangling() {
        // "2.5.1" exists but "2.5" does not; nothing to link to.
        let out = consolidate(&[node("a", "2.5.1")]);
        assert_eq!(out[0].parent_id, None);
        assert!(out[0].warnings.is_empty());
    }

    #[test]
    fn existing_parents_are_preserved() {
        let mut child = node("b", "2.2.1");
        child.parent_id = Some("explicit".into());
        let out = consolidate(&[node("a", "2.2"), child]);

        let kept = out.iter().find(|n| n.id == "b").unwrap();
        assert_eq!(kept.parent_id.as_deref(), Some("explicit"));
        assert!(kept.warnings.is_empty());
    }

    #[test]
    fn nodes_without_levels_are_untouched() {
        let out = consolidate(&[Node::new("x", "Unnumbered")]);
        assert_eq!(out[0].parent_id, None);
    }

    #[test]
    fn does_not_mark_inferred() {
        let out = consolidate(&[node("a", "2.2"), node("b", "2.2.1")]);
        assert!(out.iter().all(|n| !n.inferred));
    }

    #[test]
    fn consolidation_is_idempotent_on_output() {
        let nodes = vec![node("a", "1"), node("b", "1.1"), node("c", "1.1.1")];
        let once = consolidate(&nodes);
        let twice = consolidate(&once);
        assert_eq!(
            serde_json::to_vec(&once).unwrap(),
            serde_json::to_vec(&twice).unwrap()
        );
    }

    #[test]
    fn repeated_runs_on_same_input_are_byte_identical() {
        let nodes = vec![node("a", "2.2"), node("b", "2.2.1"), node("c", "2.2.2")];
        assert_eq!(
            serde_json::to_vec(&consolidate(&nodes)).unwrap(),
            serde_json::to_vec(&consolidate(&nodes)).unwrap()
        );
    }
}
