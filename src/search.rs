//! JSONPath extraction over parsed response bodies.

use jsonpath_lib::Compiled;
use serde_json::Value as JsonValue;

use crate::error::CaseError;

/// Checks path expression syntax without evaluating it. Used by the loader
/// so malformed expressions fail before any request is issued.
pub fn validate_path(path: &str) -> Result<(), CaseError> {
    Compiled::compile(path)
        .map(|_| ())
        .map_err(|e| CaseError::Spec(format!("invalid search path '{path}': {e}")))
}

/// Evaluates a path expression, returning every match in document order.
///
/// Zero matches is an `Ok(vec![])`; the caller decides what an empty match
/// set means for its expectation shape. Engine failure maps to
/// `PathEvaluation`.
pub fn extract(body: &JsonValue, path: &str) -> Result<Vec<JsonValue>, CaseError> {
    let matches = jsonpath_lib::select(body, path)
        .map_err(|e| CaseError::PathEvaluation(format!("'{path}': {e}")))?;
    log::debug!("path '{}' matched {} node(s)", path, matches.len());
    Ok(matches.into_iter().cloned().collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn extract_returns_all_matches_in_order() {
        let body = json!({"items": [{"id": 1}, {"id": 2}, {"id": 3}]});
        let found = extract(&body, "$.items[*].id").unwrap();
        assert_eq!(found, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn missing_path_yields_empty_match_set() {
        let body = json!({"a": 1});
        assert!(extract(&body, "$.b").unwrap().is_empty());
    }

    #[test]
    fn invalid_syntax_is_rejected_at_validation() {
        assert!(validate_path("$.items[*].id").is_ok());
        assert!(validate_path("$[").is_err());
    }

    #[test]
    fn bad_path_reported_as_path_evaluation() {
        let body = json!({});
        let err = extract(&body, "$[").unwrap_err();
        assert!(matches!(err, CaseError::PathEvaluation(_)));
    }
}
