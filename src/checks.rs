//! Assertion orchestration: one resolved case plus one live response into
//! an ordered list of verdicted checkpoints.
//!
//! Checkpoint failures and errors never abort siblings; every case runs to
//! completion. Directive collaborators are optional; a directive met while
//! its collaborator is absent errors only its own checkpoint.

use serde_json::{json, Map as JsonMap, Value as JsonValue};

use crate::checkpoint::{CaseReport, CheckpointResult, Evidence};
use crate::context::VarContext;
use crate::directive::{CallbackResolver, QueryExecutor};
use crate::document::{HttpResponse, Rule};
use crate::error::CaseError;
use crate::matcher::{self, MatchVerdict, MatcherSpec, Predicate};
use crate::parametrize::ResolvedCase;
use crate::schema::{self, SchemaSource};
use crate::search;

/// External collaborators the orchestrator may call into.
#[derive(Default, Clone, Copy)]
pub struct Collaborators<'a> {
    pub query_executor: Option<&'a dyn QueryExecutor>,
    pub callbacks: Option<&'a dyn CallbackResolver>,
    pub schemas: Option<&'a dyn SchemaSource>,
}

/// Evaluates every declared check against the response.
///
/// A skipping case short-circuits: each would-be checkpoint is recorded as
/// skipped with the reason and no directive is evaluated.
pub fn evaluate_case(
    case: &ResolvedCase,
    response: &HttpResponse,
    collaborators: &Collaborators<'_>,
) -> CaseReport {
    if let Some(reason) = &case.skip {
        log::debug!("case '{}' skipped", case.name);
        let checkpoints = checkpoint_names(case)
            .into_iter()
            .map(|name| CheckpointResult::skipped(name, reason))
            .collect();
        return CaseReport::new(case.name.clone(), checkpoints);
    }

    log::debug!("evaluating case '{}'", case.name);
    let assertions = &case.assertions;
    let mut checkpoints = Vec::new();

    if let Some(rule) = &assertions.status_code {
        let actual = json!(response.status_code);
        checkpoints.push(check_rule("status_code", &actual, rule, case, collaborators));
    }
    if let Some(rule) = &assertions.reason {
        let actual = JsonValue::String(response.reason.clone());
        checkpoints.push(check_rule("reason", &actual, rule, case, collaborators));
    }
    if let Some(rule) = &assertions.headers {
        let actual = response.headers_json();
        let rule = lowercase_header_rule(rule);
        checkpoints.push(check_rule("headers", &actual, &rule, case, collaborators));
    }
    if let Some(rule) = &assertions.text {
        let actual = JsonValue::String(response.text.clone());
        checkpoints.push(check_rule("text", &actual, rule, case, collaborators));
    }

    if let Some(json_checks) = &assertions.json {
        if let Some(reference) = &json_checks.schema {
            checkpoints.push(match &response.json {
                Some(body) => schema_checkpoint(reference, body, collaborators),
                None => not_json("json schema"),
            });
        }
        if let Some(rule) = &json_checks.whole {
            checkpoints.push(match &response.json {
                Some(body) => check_rule("json body", body, rule, case, collaborators),
                None => not_json("json body"),
            });
        }
        if let Some(spec) = &json_checks.search {
            for (path, name, rule) in spec.rows() {
                checkpoints.push(match &response.json {
                    Some(body) => search_checkpoint(&name, path, body, rule, case, collaborators),
                    None => not_json(name),
                });
            }
        }
    }

    CaseReport::new(case.name.clone(), checkpoints)
}

/// Names of the checkpoints the case would produce, in evaluation order.
fn checkpoint_names(case: &ResolvedCase) -> Vec<String> {
    let assertions = &case.assertions;
    let mut names = Vec::new();
    if assertions.status_code.is_some() {
        names.push("status_code".to_string());
    }
    if assertions.reason.is_some() {
        names.push("reason".to_string());
    }
    if assertions.headers.is_some() {
        names.push("headers".to_string());
    }
    if assertions.text.is_some() {
        names.push("text".to_string());
    }
    if let Some(json_checks) = &assertions.json {
        if json_checks.schema.is_some() {
            names.push("json schema".to_string());
        }
        if json_checks.whole.is_some() {
            names.push("json body".to_string());
        }
        if let Some(spec) = &json_checks.search {
            names.extend(spec.rows().into_iter().map(|(_, name, _)| name));
        }
    }
    names
}

fn not_json(name: impl Into<String>) -> CheckpointResult {
    CheckpointResult::errored(name, "response body is not JSON")
}

/// Evaluates one rule against one actual value, folding every error class
/// into this checkpoint's outcome.
fn check_rule(
    name: &str,
    actual: &JsonValue,
    rule: &Rule,
    case: &ResolvedCase,
    collaborators: &Collaborators<'_>,
) -> CheckpointResult {
    match rule {
        Rule::Literal(expected) => equality_checkpoint(name, actual, expected),
        Rule::Matcher(spec) => match matcher::match_value(actual, spec) {
            Ok(MatchVerdict::Pass) => CheckpointResult::passed(name),
            Ok(MatchVerdict::Fail { message, .. }) => CheckpointResult::failed(
                name,
                message,
                Evidence {
                    actual: actual.clone(),
                    expected: spec.describe(),
                },
            ),
            Err(error) => CheckpointResult::errored(name, error.to_string()),
        },
        Rule::Query(query) => {
            let Some(executor) = collaborators.query_executor else {
                return CheckpointResult::errored(
                    name,
                    CaseError::QueryExecution("no query executor is configured".to_string())
                        .to_string(),
                );
            };
            match executor.execute(&query.query, &query.params) {
                Ok(expected) => equality_checkpoint(name, actual, &expected),
                Err(message) => CheckpointResult::errored(
                    name,
                    CaseError::QueryExecution(message).to_string(),
                ),
            }
        }
        Rule::Callback(callback) => {
            let resolved = collaborators
                .callbacks
                .and_then(|resolver| resolver.resolve(&callback.path));
            let Some(function) = resolved else {
                return CheckpointResult::errored(
                    name,
                    CaseError::CallbackInvocation(format!(
                        "callback '{}' is not registered",
                        callback.path
                    ))
                    .to_string(),
                );
            };
            let verdict = function.invoke(&case.context, actual, &callback.args, &callback.kwds);
            match verdict {
                Ok(true) => CheckpointResult::passed(name),
                Ok(false) => CheckpointResult::failed(
                    name,
                    format!("callback '{}' rejected the value", callback.path),
                    Evidence {
                        actual: actual.clone(),
                        expected: rule.describe(),
                    },
                ),
                Err(message) => CheckpointResult::failed(
                    name,
                    message,
                    Evidence {
                        actual: actual.clone(),
                        expected: rule.describe(),
                    },
                ),
            }
        }
    }
}

fn equality_checkpoint(name: &str, actual: &JsonValue, expected: &JsonValue) -> CheckpointResult {
    if values_equal(actual, expected) {
        CheckpointResult::passed(name)
    } else {
        CheckpointResult::failed(
            name,
            format!("expected <{expected}> but got <{actual}>"),
            Evidence {
                actual: actual.clone(),
                expected: expected.clone(),
            },
        )
    }
}

/// Equality with numeric widening, so an authored `200` matches a `200.0`
/// and a u16 status alike.
fn values_equal(actual: &JsonValue, expected: &JsonValue) -> bool {
    if let (Some(a), Some(e)) = (actual.as_f64(), expected.as_f64()) {
        return a == e;
    }
    actual == expected
}

fn schema_checkpoint(
    reference: &str,
    body: &JsonValue,
    collaborators: &Collaborators<'_>,
) -> CheckpointResult {
    let name = "json schema";
    let Some(source) = collaborators.schemas else {
        return CheckpointResult::errored(
            name,
            CaseError::SchemaValidation("no schema source is configured".to_string()).to_string(),
        );
    };
    let schema = match source.load(reference) {
        Ok(schema) => schema,
        Err(error) => return CheckpointResult::errored(name, error.to_string()),
    };
    match schema::validate(body, &schema) {
        Ok(violations) if violations.is_empty() => CheckpointResult::passed(name),
        Ok(violations) => CheckpointResult::failed(
            name,
            violations.join("; "),
            Evidence {
                actual: body.clone(),
                expected: JsonValue::String(reference.to_string()),
            },
        ),
        Err(error) => CheckpointResult::errored(name, error.to_string()),
    }
}

/// Evaluates one path expectation. Zero matches errors the checkpoint;
/// an expected array literal compares against the full matched sequence;
/// any other expectation takes exactly one match.
fn search_checkpoint(
    name: &str,
    path: &str,
    body: &JsonValue,
    rule: &Rule,
    case: &ResolvedCase,
    collaborators: &Collaborators<'_>,
) -> CheckpointResult {
    let matches = match search::extract(body, path) {
        Ok(matches) => matches,
        Err(error) => return CheckpointResult::errored(name, error.to_string()),
    };
    if matches.is_empty() {
        return CheckpointResult::errored(
            name,
            CaseError::PathEvaluation(format!("'{path}' matched nothing")).to_string(),
        );
    }
    if let Rule::Literal(expected @ JsonValue::Array(_)) = rule {
        return equality_checkpoint(name, &JsonValue::Array(matches), expected);
    }
    if matches.len() > 1 {
        return CheckpointResult::failed(
            name,
            format!(
                "'{path}' matched {} nodes but the expectation takes exactly one",
                matches.len()
            ),
            Evidence {
                actual: JsonValue::Array(matches),
                expected: rule.describe(),
            },
        );
    }
    check_rule(name, &matches[0], rule, case, collaborators)
}

/// Header rules compare against lowercased header names, so the expectation
/// side lowercases its key-shaped arguments too.
fn lowercase_header_rule(rule: &Rule) -> Rule {
    match rule {
        Rule::Literal(value) => Rule::Literal(lowercase_keys(value)),
        Rule::Matcher(spec) => Rule::Matcher(MatcherSpec {
            predicates: spec
                .predicates
                .iter()
                .map(|(predicate, arg)| {
                    let arg = if key_shaped(*predicate) {
                        lowercase_keys(arg)
                    } else {
                        arg.clone()
                    };
                    (*predicate, arg)
                })
                .collect(),
            includes: spec.includes.iter().map(|k| k.to_ascii_lowercase()).collect(),
            excludes: spec.excludes.iter().map(|k| k.to_ascii_lowercase()).collect(),
        }),
        other => other.clone(),
    }
}

fn key_shaped(predicate: Predicate) -> bool {
    matches!(
        predicate,
        Predicate::Contains
            | Predicate::DoesNotContain
            | Predicate::ContainsKey
            | Predicate::DoesNotContainKey
            | Predicate::ContainsEntry
            | Predicate::ContainsOnly
            | Predicate::IsSubsetOf
            | Predicate::IsEqualTo
            | Predicate::IsNotEqualTo
    )
}

fn lowercase_keys(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(s.to_ascii_lowercase()),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(lowercase_keys).collect()),
        JsonValue::Object(map) => {
            let mut out = JsonMap::new();
            for (key, entry) in map {
                out.insert(key.to_ascii_lowercase(), entry.clone());
            }
            JsonValue::Object(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::checkpoint::{CaseVerdict, CheckStatus};
    use crate::document::{AssertionsSpec, JsonAssertions, QuerySpec, RequestSpec, SearchSpec};

    fn resolved(assertions: AssertionsSpec, skip: Option<String>) -> ResolvedCase {
        ResolvedCase {
            name: "case".to_string(),
            skip,
            fixture: None,
            request: RequestSpec::default(),
            assertions,
            context: VarContext::default(),
        }
    }

    fn response(status: u16, body: JsonValue) -> HttpResponse {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        HttpResponse {
            status_code: status,
            reason: "OK".to_string(),
            headers,
            text: body.to_string(),
            json: Some(body),
        }
    }

    #[test]
    fn literal_status_check_passes_and_fails() {
        let assertions = AssertionsSpec {
            status_code: Some(Rule::Literal(json!(200))),
            ..AssertionsSpec::default()
        };
        let case = resolved(assertions, None);

        let report = evaluate_case(&case, &response(200, json!({})), &Collaborators::default());
        assert_eq!(report.verdict, CaseVerdict::Passed);

        let report = evaluate_case(&case, &response(404, json!({})), &Collaborators::default());
        assert_eq!(report.verdict, CaseVerdict::Failed);
        let checkpoint = &report.checkpoints[0];
        assert_eq!(checkpoint.status, CheckStatus::Failed);
        let evidence = checkpoint.evidence.as_ref().unwrap();
        assert_eq!(evidence.actual, json!(404));
        assert_eq!(evidence.expected, json!(200));
    }

    #[test]
    fn header_names_match_case_insensitively() {
        let matcher = MatcherSpec::parse(vec![(
            "contains_entry".to_string(),
            json!({"Content-Type": "application/json"}),
        )])
        .unwrap();
        let assertions = AssertionsSpec {
            headers: Some(Rule::Matcher(matcher)),
            ..AssertionsSpec::default()
        };
        let case = resolved(assertions, None);
        let report = evaluate_case(&case, &response(200, json!({})), &Collaborators::default());
        assert_eq!(report.verdict, CaseVerdict::Passed);
    }

    #[test]
    fn failures_never_abort_sibling_checkpoints() {
        let assertions = AssertionsSpec {
            status_code: Some(Rule::Literal(json!(500))),
            reason: Some(Rule::Literal(json!("OK"))),
            ..AssertionsSpec::default()
        };
        let case = resolved(assertions, None);
        let report = evaluate_case(&case, &response(200, json!({})), &Collaborators::default());
        assert_eq!(report.checkpoints.len(), 2);
        assert_eq!(report.checkpoints[0].status, CheckStatus::Failed);
        assert_eq!(report.checkpoints[1].status, CheckStatus::Passed);
    }

    #[test]
    fn skip_records_every_checkpoint_and_runs_no_directive() {
        let calls = Cell::new(0usize);
        let executor = |_: &str, _: &JsonMap<String, JsonValue>| -> Result<JsonValue, String> {
            calls.set(calls.get() + 1);
            Ok(json!(1))
        };
        let assertions = AssertionsSpec {
            status_code: Some(Rule::Literal(json!(200))),
            json: Some(JsonAssertions {
                search: Some(SearchSpec::Table(vec![(
                    "$.id".to_string(),
                    Rule::Query(QuerySpec {
                        query: "select id".to_string(),
                        params: JsonMap::new(),
                    }),
                )])),
                ..JsonAssertions::default()
            }),
            ..AssertionsSpec::default()
        };
        let case = resolved(assertions, Some("maintenance window".to_string()));
        let collaborators = Collaborators {
            query_executor: Some(&executor),
            ..Collaborators::default()
        };
        let report = evaluate_case(&case, &response(200, json!({"id": 1})), &collaborators);
        assert_eq!(calls.get(), 0);
        assert_eq!(report.verdict, CaseVerdict::Skipped);
        assert_eq!(report.checkpoints.len(), 2);
        assert!(report
            .checkpoints
            .iter()
            .all(|c| c.status == CheckStatus::Skipped
                && c.message.as_deref() == Some("maintenance window")));
    }

    #[test]
    fn query_rule_compares_against_executor_result() {
        let executor = |_: &str, params: &JsonMap<String, JsonValue>| -> Result<JsonValue, String> {
            Ok(params["id"].clone())
        };
        let assertions = AssertionsSpec {
            json: Some(JsonAssertions {
                search: Some(SearchSpec::Table(vec![(
                    "$.id".to_string(),
                    Rule::Query(QuerySpec {
                        query: "select id from things where id = :id".to_string(),
                        params: json!({"id": 7}).as_object().cloned().unwrap(),
                    }),
                )])),
                ..JsonAssertions::default()
            }),
            ..AssertionsSpec::default()
        };
        let case = resolved(assertions, None);
        let collaborators = Collaborators {
            query_executor: Some(&executor),
            ..Collaborators::default()
        };
        let report = evaluate_case(&case, &response(200, json!({"id": 7})), &collaborators);
        assert_eq!(report.verdict, CaseVerdict::Passed);
    }

    #[test]
    fn failing_executor_errors_only_its_checkpoint() {
        let executor = |_: &str, _: &JsonMap<String, JsonValue>| -> Result<JsonValue, String> {
            Err("connection refused".to_string())
        };
        let assertions = AssertionsSpec {
            status_code: Some(Rule::Literal(json!(200))),
            json: Some(JsonAssertions {
                search: Some(SearchSpec::Table(vec![(
                    "$.id".to_string(),
                    Rule::Query(QuerySpec {
                        query: "select id".to_string(),
                        params: JsonMap::new(),
                    }),
                )])),
                ..JsonAssertions::default()
            }),
            ..AssertionsSpec::default()
        };
        let case = resolved(assertions, None);
        let collaborators = Collaborators {
            query_executor: Some(&executor),
            ..Collaborators::default()
        };
        let report = evaluate_case(&case, &response(200, json!({"id": 7})), &collaborators);
        assert_eq!(report.checkpoints[0].status, CheckStatus::Passed);
        assert_eq!(report.checkpoints[1].status, CheckStatus::Errored);
        assert!(report.checkpoints[1]
            .message
            .as_deref()
            .unwrap()
            .contains("connection refused"));
        assert_eq!(report.verdict, CaseVerdict::Errored);
    }

    #[test]
    fn missing_directive_collaborator_errors_the_checkpoint() {
        let assertions = AssertionsSpec {
            status_code: Some(Rule::Query(QuerySpec {
                query: "select status".to_string(),
                params: JsonMap::new(),
            })),
            ..AssertionsSpec::default()
        };
        let case = resolved(assertions, None);
        let report = evaluate_case(&case, &response(200, json!({})), &Collaborators::default());
        assert_eq!(report.checkpoints[0].status, CheckStatus::Errored);
    }

    #[test]
    fn unmatched_path_errors_and_mismatch_fails() {
        let assertions = AssertionsSpec {
            json: Some(JsonAssertions {
                search: Some(SearchSpec::Table(vec![
                    ("$.missing".to_string(), Rule::Literal(json!(1))),
                    ("$.id".to_string(), Rule::Literal(json!(99))),
                ])),
                ..JsonAssertions::default()
            }),
            ..AssertionsSpec::default()
        };
        let case = resolved(assertions, None);
        let report = evaluate_case(&case, &response(200, json!({"id": 7})), &Collaborators::default());
        assert_eq!(report.checkpoints[0].status, CheckStatus::Errored);
        assert!(report.checkpoints[0]
            .message
            .as_deref()
            .unwrap()
            .contains("matched nothing"));
        assert_eq!(report.checkpoints[1].status, CheckStatus::Failed);
    }

    #[test]
    fn multi_match_paths_compare_against_array_literals() {
        let body = json!({"items": [{"id": 1}, {"id": 2}]});
        let assertions = AssertionsSpec {
            json: Some(JsonAssertions {
                search: Some(SearchSpec::Table(vec![
                    ("$.items[*].id".to_string(), Rule::Literal(json!([1, 2]))),
                ])),
                ..JsonAssertions::default()
            }),
            ..AssertionsSpec::default()
        };
        let case = resolved(assertions, None);
        let report = evaluate_case(&case, &response(200, body.clone()), &Collaborators::default());
        assert_eq!(report.verdict, CaseVerdict::Passed);

        let assertions = AssertionsSpec {
            json: Some(JsonAssertions {
                search: Some(SearchSpec::Table(vec![
                    ("$.items[*].id".to_string(), Rule::Literal(json!(1))),
                ])),
                ..JsonAssertions::default()
            }),
            ..AssertionsSpec::default()
        };
        let case = resolved(assertions, None);
        let report = evaluate_case(&case, &response(200, body), &Collaborators::default());
        assert_eq!(report.checkpoints[0].status, CheckStatus::Failed);
        assert!(report.checkpoints[0]
            .message
            .as_deref()
            .unwrap()
            .contains("exactly one"));
    }

    #[test]
    fn missing_json_body_errors_json_checkpoints() {
        let assertions = AssertionsSpec {
            json: Some(JsonAssertions {
                whole: Some(Rule::Literal(json!({"a": 1}))),
                ..JsonAssertions::default()
            }),
            ..AssertionsSpec::default()
        };
        let case = resolved(assertions, None);
        let mut no_body = response(200, json!({}));
        no_body.json = None;
        no_body.text = "<html></html>".to_string();
        let report = evaluate_case(&case, &no_body, &Collaborators::default());
        assert_eq!(report.checkpoints[0].status, CheckStatus::Errored);
    }

    #[test]
    fn schema_checkpoint_collects_all_violations() {
        let mut schemas = crate::schema::MapSchemaSource::new();
        schemas.insert(
            "thing.json",
            json!({
                "type": "object",
                "required": ["id", "name"],
                "properties": {
                    "id": {"type": "integer"},
                    "name": {"type": "string"}
                }
            }),
        );
        let assertions = AssertionsSpec {
            json: Some(JsonAssertions {
                schema: Some("thing.json".to_string()),
                ..JsonAssertions::default()
            }),
            ..AssertionsSpec::default()
        };
        let case = resolved(assertions, None);
        let collaborators = Collaborators {
            schemas: Some(&schemas),
            ..Collaborators::default()
        };

        let report = evaluate_case(
            &case,
            &response(200, json!({"id": 1, "name": "amy"})),
            &collaborators,
        );
        assert_eq!(report.verdict, CaseVerdict::Passed);

        let report = evaluate_case(&case, &response(200, json!({"id": "x"})), &collaborators);
        assert_eq!(report.checkpoints[0].status, CheckStatus::Failed);
        let message = report.checkpoints[0].message.as_deref().unwrap();
        assert!(message.contains(';'), "both violations expected: {message}");
    }

    #[test]
    fn callback_outcomes_map_to_statuses() {
        let mut registry = crate::directive::CallbackRegistry::new();
        registry.register(
            "checks.positive",
            |_: &VarContext,
             actual: &JsonValue,
             _: &[JsonValue],
             _: &JsonMap<String, JsonValue>|
             -> Result<bool, String> {
                actual
                    .as_i64()
                    .map(|n| n > 0)
                    .ok_or_else(|| "not an integer".to_string())
            },
        );
        let collaborators = Collaborators {
            callbacks: Some(&registry),
            ..Collaborators::default()
        };
        let callback_rule = |path: &str| {
            Rule::Callback(crate::document::CallbackSpec {
                path: path.to_string(),
                args: Vec::new(),
                kwds: JsonMap::new(),
            })
        };

        let assertions = AssertionsSpec {
            status_code: Some(callback_rule("checks.positive")),
            ..AssertionsSpec::default()
        };
        let case = resolved(assertions, None);
        let report = evaluate_case(&case, &response(200, json!({})), &collaborators);
        assert_eq!(report.verdict, CaseVerdict::Passed);

        let assertions = AssertionsSpec {
            text: Some(callback_rule("checks.positive")),
            ..AssertionsSpec::default()
        };
        let case = resolved(assertions, None);
        let report = evaluate_case(&case, &response(200, json!({})), &collaborators);
        assert_eq!(report.checkpoints[0].status, CheckStatus::Failed);
        assert!(report.checkpoints[0]
            .message
            .as_deref()
            .unwrap()
            .contains("not an integer"));

        let assertions = AssertionsSpec {
            status_code: Some(callback_rule("checks.unregistered")),
            ..AssertionsSpec::default()
        };
        let case = resolved(assertions, None);
        let report = evaluate_case(&case, &response(200, json!({})), &collaborators);
        assert_eq!(report.checkpoints[0].status, CheckStatus::Errored);
    }
}
