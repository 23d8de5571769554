//! Declarative HTTP API test cases.
//!
//! Test authors write YAML documents describing requests and expected
//! responses. This crate loads those documents, resolves `${...}` variables,
//! expands parametrizations into concrete cases, and evaluates response
//! assertions into verdicted checkpoints. Issuing the HTTP request, running
//! deferred queries, and loading schemas are left to collaborators plugged
//! in through traits.

pub mod checkpoint;
pub mod checks;
pub mod context;
pub mod directive;
pub mod document;
pub mod error;
pub mod loader;
pub mod matcher;
pub mod parametrize;
pub mod request;
pub mod schema;
pub mod search;

pub use checkpoint::{CaseReport, CaseVerdict, CheckStatus, CheckpointResult, Evidence};
pub use checks::{evaluate_case, Collaborators};
pub use context::VarContext;
pub use directive::{CallbackRegistry, CallbackResolver, CaseCallback, QueryExecutor};
pub use document::{ApiDocument, HttpResponse, RequestBody, RequestSpec, Rule, TestCaseSpec};
pub use error::{CaseError, Result};
pub use loader::load_document;
pub use matcher::{MatchVerdict, MatcherSpec, Predicate};
pub use parametrize::{expand_all, expand_case, Expansion, ResolvedCase};
pub use request::PreparedRequest;
pub use schema::{FileSchemaSource, MapSchemaSource, SchemaSource};

/// Expands every case of a loaded document against its `define` block.
pub fn expand_document(document: &ApiDocument) -> Result<Vec<ResolvedCase>> {
    let globals = VarContext::global(document.define.clone());
    expand_all(&document.cases, &globals)
}

/// Loads a YAML document and expands it in one step.
pub fn load_and_expand(input: &str) -> Result<Vec<ResolvedCase>> {
    expand_document(&load_document(input)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_and_expand_round_trip() {
        let doc = r#"
api:
  type: http
  define:
    base: https://api.example.com
  tests:
    plan ${params.id}:
      parametrize:
        params:
          - id: 1
          - id: 2
      request:
        path: /plans/${params.id}
      assertions:
        status_code: 200
"#;
        let cases = load_and_expand(doc).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].name, "plan 1");
        assert_eq!(cases[1].request.path.as_deref(), Some("/plans/2"));

        let prepared = cases[0].request.prepare(Some("https://api.example.com")).unwrap();
        assert_eq!(prepared.url, "https://api.example.com/plans/1");
    }
}
