//! JSON Schema validation of response bodies.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value as JsonValue;

use crate::error::CaseError;

/// Collaborator that turns a schema reference from a document into a schema
/// value. The engine never fetches anything itself.
pub trait SchemaSource {
    fn load(&self, reference: &str) -> Result<JsonValue, CaseError>;
}

/// Loads schema documents from a base directory; `.yaml`/`.yml` references
/// are parsed as YAML, everything else as JSON.
#[derive(Debug, Clone)]
pub struct FileSchemaSource {
    base_dir: PathBuf,
}

impl FileSchemaSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl SchemaSource for FileSchemaSource {
    fn load(&self, reference: &str) -> Result<JsonValue, CaseError> {
        let path = self.base_dir.join(reference);
        let text = std::fs::read_to_string(&path).map_err(|e| {
            CaseError::SchemaValidation(format!("cannot read schema '{reference}': {e}"))
        })?;
        let yaml = matches!(
            Path::new(reference).extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if yaml {
            serde_yaml::from_str(&text).map_err(|e| {
                CaseError::SchemaValidation(format!("schema '{reference}' is not valid YAML: {e}"))
            })
        } else {
            serde_json::from_str(&text).map_err(|e| {
                CaseError::SchemaValidation(format!("schema '{reference}' is not valid JSON: {e}"))
            })
        }
    }
}

/// In-memory schema source keyed by reference name.
#[derive(Debug, Clone, Default)]
pub struct MapSchemaSource {
    schemas: HashMap<String, JsonValue>,
}

impl MapSchemaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: impl Into<String>, schema: JsonValue) {
        self.schemas.insert(reference.into(), schema);
    }
}

impl SchemaSource for MapSchemaSource {
    fn load(&self, reference: &str) -> Result<JsonValue, CaseError> {
        self.schemas.get(reference).cloned().ok_or_else(|| {
            CaseError::SchemaValidation(format!("unknown schema reference '{reference}'"))
        })
    }
}

/// Validates `instance` against a draft 2020-12 schema, returning every
/// violation rather than stopping at the first. An empty vector means the
/// instance conforms. Compile failure is a `SchemaValidation` error.
pub fn validate(instance: &JsonValue, schema: &JsonValue) -> Result<Vec<String>, CaseError> {
    let validator = jsonschema::draft202012::new(schema)
        .map_err(|e| CaseError::SchemaValidation(format!("schema does not compile: {e}")))?;
    Ok(validator
        .iter_errors(instance)
        .map(|e| format!("{}: {}", e.instance_path, e))
        .collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn user_schema() -> JsonValue {
        json!({
            "type": "object",
            "required": ["id", "name"],
            "properties": {
                "id": {"type": "integer"},
                "name": {"type": "string", "minLength": 1}
            }
        })
    }

    #[test]
    fn conforming_instance_has_no_violations() {
        let violations = validate(&json!({"id": 1, "name": "amy"}), &user_schema()).unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn every_violation_is_collected() {
        let violations = validate(&json!({"id": "x", "name": ""}), &user_schema()).unwrap();
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn uncompilable_schema_is_an_error() {
        let err = validate(&json!({}), &json!({"type": "flavor"})).unwrap_err();
        assert!(matches!(err, CaseError::SchemaValidation(_)));
    }

    #[test]
    fn map_source_resolves_known_references_only() {
        let mut source = MapSchemaSource::new();
        source.insert("user.json", user_schema());
        assert!(source.load("user.json").is_ok());
        assert!(source.load("missing.json").is_err());
    }
}
