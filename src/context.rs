//! Variable context layering and `${...}` template resolution.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::CaseError;

const MAX_INTERPOLATIONS_PER_STRING: usize = 64;

/// Immutable per-evaluation variable mapping.
///
/// Two layers: the global layer comes from the document's `define` block and
/// lives for the whole document; the local layer holds one parametrize
/// binding-set and lives for one expansion. Local lookup shadows global.
#[derive(Debug, Clone, Default)]
pub struct VarContext {
    global: JsonMap<String, JsonValue>,
    local: JsonMap<String, JsonValue>,
}

impl VarContext {
    /// Creates a context holding only global `define` values.
    pub fn global(define: JsonMap<String, JsonValue>) -> Self {
        Self {
            global: define,
            local: JsonMap::new(),
        }
    }

    /// Derives a context layering `local` bindings over this context's globals.
    pub fn with_local(&self, local: JsonMap<String, JsonValue>) -> Self {
        Self {
            global: self.global.clone(),
            local,
        }
    }

    /// Looks up a dotted identifier (`params.testplan_id`), local layer first.
    ///
    /// The first segment selects the binding; remaining segments traverse
    /// nested mappings by key and sequences by numeric index.
    pub fn lookup(&self, name: &str) -> Option<&JsonValue> {
        let mut segments = name.split('.');
        let head = segments.next()?;
        let mut current = self.local.get(head).or_else(|| self.global.get(head))?;
        for segment in segments {
            current = match current {
                JsonValue::Object(map) => map.get(segment)?,
                JsonValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Returns true when a local binding-set is layered in.
    pub fn has_local(&self) -> bool {
        !self.local.is_empty()
    }
}

/// Resolves every `${...}` placeholder in a string.
///
/// A string consisting of exactly one placeholder resolves to the bound
/// value itself, so structured values survive whole-object interpolation.
/// Embedded placeholders render scalars directly and structured values as
/// compact JSON. An unknown name is an error, never literal text.
pub fn resolve_string(raw: &str, ctx: &VarContext) -> Result<JsonValue, CaseError> {
    let re = placeholder_regex();
    let mut matches: Vec<(usize, usize, &str)> = Vec::new();
    for caps in re.captures_iter(raw) {
        if matches.len() >= MAX_INTERPOLATIONS_PER_STRING {
            return Err(CaseError::Spec(format!(
                "too many interpolation segments in one string (max {MAX_INTERPOLATIONS_PER_STRING})"
            )));
        }
        let whole = caps.get(0).expect("capture group 0 always present");
        let name = caps.get(1).expect("placeholder name group").as_str();
        matches.push((whole.start(), whole.end(), name));
    }

    if matches.is_empty() {
        return Ok(JsonValue::String(raw.to_string()));
    }

    if matches.len() == 1 && matches[0].0 == 0 && matches[0].1 == raw.len() {
        return Ok(lookup_required(ctx, matches[0].2)?.clone());
    }

    let mut out = String::with_capacity(raw.len());
    let mut last = 0usize;
    for (start, end, name) in matches {
        out.push_str(&raw[last..start]);
        out.push_str(&render_scalar(lookup_required(ctx, name)?));
        last = end;
    }
    out.push_str(&raw[last..]);
    Ok(JsonValue::String(out))
}

/// Resolves placeholders throughout a value tree, preserving shape.
///
/// Mapping keys are intentionally not resolved; only values are. Scalars
/// other than strings pass through unchanged. Pure function of node and
/// context; idempotent on trees without remaining placeholders.
pub fn resolve_node(node: &JsonValue, ctx: &VarContext) -> Result<JsonValue, CaseError> {
    match node {
        JsonValue::String(s) => resolve_string(s, ctx),
        JsonValue::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_node(item, ctx)?);
            }
            Ok(JsonValue::Array(out))
        }
        JsonValue::Object(map) => {
            let mut out = JsonMap::new();
            for (key, value) in map {
                out.insert(key.clone(), resolve_node(value, ctx)?);
            }
            Ok(JsonValue::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Resolves a name template into a plain string (used for case names).
pub fn resolve_to_string(raw: &str, ctx: &VarContext) -> Result<String, CaseError> {
    Ok(render_scalar(&resolve_string(raw, ctx)?))
}

fn lookup_required<'a>(ctx: &'a VarContext, name: &str) -> Result<&'a JsonValue, CaseError> {
    ctx.lookup(name)
        .ok_or_else(|| CaseError::UnboundVariable(format!("'{name}' is not defined")))
}

fn render_scalar(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)\}").expect("valid regex")
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ctx(global: JsonValue, local: JsonValue) -> VarContext {
        let global = global.as_object().cloned().unwrap_or_default();
        let local = local.as_object().cloned().unwrap_or_default();
        VarContext::global(global).with_local(local)
    }

    #[test]
    fn local_shadows_global() {
        let c = ctx(json!({"a": 1, "b": 2}), json!({"a": 10}));
        assert_eq!(c.lookup("a"), Some(&json!(10)));
        assert_eq!(c.lookup("b"), Some(&json!(2)));
    }

    #[test]
    fn dotted_lookup_traverses_objects_and_arrays() {
        let c = ctx(json!({"params": {"ids": [7, 8]}}), json!({}));
        assert_eq!(c.lookup("params.ids.1"), Some(&json!(8)));
        assert_eq!(c.lookup("params.missing"), None);
    }

    #[test]
    fn full_placeholder_preserves_structure() {
        let c = ctx(json!({"params": {"id": 3}}), json!({}));
        let out = resolve_string("${params}", &c).unwrap();
        assert_eq!(out, json!({"id": 3}));
    }

    #[test]
    fn embedded_placeholders_stringify() {
        let c = ctx(json!({"name": "plan", "id": 4}), json!({}));
        let out = resolve_string("case ${name}-${id}", &c).unwrap();
        assert_eq!(out, json!("case plan-4"));
    }

    #[test]
    fn embedded_mapping_renders_compact_json() {
        let c = ctx(json!({"params": {"id": 3}}), json!({}));
        let out = resolve_string("got ${params}", &c).unwrap();
        assert_eq!(out, json!(r#"got {"id":3}"#));
    }

    #[test]
    fn unbound_variable_errors() {
        let c = ctx(json!({}), json!({}));
        let err = resolve_string("${nope}", &c).unwrap_err();
        assert!(matches!(err, CaseError::UnboundVariable(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn resolved_output_has_no_placeholders_and_is_idempotent() {
        let c = ctx(json!({"a": "x", "b": {"c": 1}}), json!({}));
        let tree = json!({"k": "${a}", "list": ["${b.c}", "lit ${a}"], "n": 5});
        let once = resolve_node(&tree, &c).unwrap();
        assert!(!once.to_string().contains("${"));
        let twice = resolve_node(&once, &c).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn mapping_keys_are_not_resolved() {
        let c = ctx(json!({"a": "x"}), json!({}));
        let tree = json!({"${a}": "${a}"});
        let out = resolve_node(&tree, &c).unwrap();
        assert_eq!(out, json!({"${a}": "x"}));
    }

    #[test]
    fn non_string_scalars_pass_through() {
        let c = ctx(json!({}), json!({}));
        assert_eq!(resolve_node(&json!(true), &c).unwrap(), json!(true));
        assert_eq!(resolve_node(&json!(3.5), &c).unwrap(), json!(3.5));
        assert_eq!(resolve_node(&json!(null), &c).unwrap(), json!(null));
    }
}
