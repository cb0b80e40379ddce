//! Best-effort JSON extraction from raw model text.

use serde_json::Value;

use crate::error::PipelineError;

/// Extract the first `{ ... }` object embedded in raw model text.
///
/// Models frequently wrap their JSON in prose or code fences; slicing from
/// the first `{` to the last `}` recovers the object in practice. A failed
/// parse is retryable: a fresh generation usually comes back well-formed.
pub fn extract_json_object(text: &str) -> Result<Value, PipelineError> {
    let start = text
        .find('{')
        .ok_or_else(|| PipelineError::MalformedModelOutput("no JSON object found".into()))?;
    let end = text
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| PipelineError::MalformedModelOutput("no JSON object found".into()))?;

    serde_json::from_str(&text[start..=end])
        .map_err(|e| PipelineError::MalformedModelOutput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bare_object() {
        let value = extract_json_object(r#"{"a": 1}"#).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn extracts_object_wrapped_in_prose() {
        let value =
            extract_json_object("Here is the result:\n```json\n{\"nodes\": []}\n```\nDone.")
                .unwrap();
        assert!(value["nodes"].as_array().unwrap().is_empty());
    }

    #[test]
    fn extracts_nested_objects() {
        let value = extract_json_object(r#"prefix {"a": {"b": 2}} suffix"#).unwrap();
        assert_eq!(value["a"]["b"], 2);
    }

    #[test]
    fn rejects_text_without_object() {
        let err = extract_json_object("I could not produce JSON, sorry.").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedModelOutput(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn rejects_unbalanced_braces() {
        assert!(extract_json_object("} {").is_err());
        assert!(extract_json_object("{\"a\": 1").is_err());
    }
}
