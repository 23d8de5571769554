//! Test-document data model.
//!
//! These types are the loaded form of a YAML test document, still carrying
//! `${...}` templates. The parametrize expander resolves them per binding
//! into the immutable values the orchestrator consumes.

use std::collections::HashMap;

use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::context::{self, VarContext};
use crate::error::CaseError;
use crate::matcher::MatcherSpec;

/// One loaded document: the global `define` block plus its test cases,
/// in declaration order.
#[derive(Debug, Clone)]
pub struct ApiDocument {
    pub define: JsonMap<String, JsonValue>,
    pub cases: Vec<TestCaseSpec>,
}

/// One test case as authored, before parametrize expansion.
#[derive(Debug, Clone)]
pub struct TestCaseSpec {
    /// Name template; may reference parametrize bindings.
    pub name: String,
    pub skip: Option<SkipRule>,
    /// Opaque fixture reference handed through to the harness.
    pub fixture: Option<JsonValue>,
    /// Param name to candidate values, in declaration order.
    pub parametrize: Vec<(String, Vec<JsonValue>)>,
    pub request: RequestSpec,
    pub assertions: AssertionsSpec,
}

/// Skip condition: a plain flag or a reason template.
///
/// A resolved reason equal to `""`, `"false"`, `"no"`, or `"0"`
/// (case-insensitive) does not skip; anything else skips and becomes the
/// recorded reason.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipRule {
    Flag(bool),
    Reason(String),
}

impl SkipRule {
    /// Resolves to `Some(reason)` when the case should skip.
    pub fn resolve(&self, ctx: &VarContext) -> Result<Option<String>, CaseError> {
        match self {
            Self::Flag(true) => Ok(Some(String::new())),
            Self::Flag(false) => Ok(None),
            Self::Reason(template) => {
                let reason = context::resolve_to_string(template, ctx)?;
                let falsy = matches!(
                    reason.to_ascii_lowercase().as_str(),
                    "" | "false" | "no" | "0"
                );
                if falsy {
                    Ok(None)
                } else if reason.eq_ignore_ascii_case("true") {
                    Ok(Some(String::new()))
                } else {
                    Ok(Some(reason))
                }
            }
        }
    }
}

/// Request description. The transport itself is an external collaborator;
/// this only carries what it needs.
#[derive(Debug, Clone, Default)]
pub struct RequestSpec {
    /// HTTP method, normalized to uppercase by the loader. Defaults to GET.
    pub method: String,
    /// Absolute URL; wins over `path` when both are present.
    pub url: Option<String>,
    /// Path joined against an externally supplied base URL.
    pub path: Option<String>,
    pub params: JsonMap<String, JsonValue>,
    pub headers: JsonMap<String, JsonValue>,
    pub body: Option<RequestBody>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Raw(String),
    Json(JsonValue),
}

impl RequestSpec {
    /// Resolves every template in the request against `ctx`.
    pub fn resolve(&self, ctx: &VarContext) -> Result<Self, CaseError> {
        let url = match &self.url {
            Some(u) => Some(context::resolve_to_string(u, ctx)?),
            None => None,
        };
        let path = match &self.path {
            Some(p) => Some(context::resolve_to_string(p, ctx)?),
            None => None,
        };
        let body = match &self.body {
            Some(RequestBody::Raw(s)) => {
                Some(RequestBody::Raw(context::resolve_to_string(s, ctx)?))
            }
            Some(RequestBody::Json(v)) => {
                Some(RequestBody::Json(context::resolve_node(v, ctx)?))
            }
            None => None,
        };
        Ok(Self {
            method: self.method.clone(),
            url,
            path,
            params: resolve_map(&self.params, ctx)?,
            headers: resolve_map(&self.headers, ctx)?,
            body,
        })
    }
}

impl RequestSpec {
    /// JSON rendering for the `expand` command.
    pub fn describe(&self) -> JsonValue {
        let mut out = JsonMap::new();
        out.insert("method".to_string(), JsonValue::String(self.method.clone()));
        if let Some(url) = &self.url {
            out.insert("url".to_string(), JsonValue::String(url.clone()));
        }
        if let Some(path) = &self.path {
            out.insert("path".to_string(), JsonValue::String(path.clone()));
        }
        if !self.params.is_empty() {
            out.insert("params".to_string(), JsonValue::Object(self.params.clone()));
        }
        if !self.headers.is_empty() {
            out.insert("headers".to_string(), JsonValue::Object(self.headers.clone()));
        }
        match &self.body {
            Some(RequestBody::Raw(raw)) => {
                out.insert("body".to_string(), JsonValue::String(raw.clone()));
            }
            Some(RequestBody::Json(value)) => {
                out.insert("body".to_string(), value.clone());
            }
            None => {}
        }
        JsonValue::Object(out)
    }
}

fn resolve_map(
    map: &JsonMap<String, JsonValue>,
    ctx: &VarContext,
) -> Result<JsonMap<String, JsonValue>, CaseError> {
    let mut out = JsonMap::new();
    for (key, value) in map {
        out.insert(key.clone(), context::resolve_node(value, ctx)?);
    }
    Ok(out)
}

/// Expected-response block. Every slot holds a rule; absent slots produce
/// no checkpoint.
#[derive(Debug, Clone, Default)]
pub struct AssertionsSpec {
    pub status_code: Option<Rule>,
    pub reason: Option<Rule>,
    pub headers: Option<Rule>,
    pub text: Option<Rule>,
    pub json: Option<JsonAssertions>,
}

impl AssertionsSpec {
    pub fn resolve(&self, ctx: &VarContext) -> Result<Self, CaseError> {
        Ok(Self {
            status_code: resolve_opt_rule(&self.status_code, ctx)?,
            reason: resolve_opt_rule(&self.reason, ctx)?,
            headers: resolve_opt_rule(&self.headers, ctx)?,
            text: resolve_opt_rule(&self.text, ctx)?,
            json: match &self.json {
                Some(j) => Some(j.resolve(ctx)?),
                None => None,
            },
        })
    }

    /// JSON rendering for the `expand` command.
    pub fn describe(&self) -> JsonValue {
        let mut out = JsonMap::new();
        if let Some(rule) = &self.status_code {
            out.insert("status_code".to_string(), rule.describe());
        }
        if let Some(rule) = &self.reason {
            out.insert("reason".to_string(), rule.describe());
        }
        if let Some(rule) = &self.headers {
            out.insert("headers".to_string(), rule.describe());
        }
        if let Some(rule) = &self.text {
            out.insert("text".to_string(), rule.describe());
        }
        if let Some(json) = &self.json {
            let mut inner = JsonMap::new();
            if let Some(schema) = &json.schema {
                inner.insert("schema".to_string(), JsonValue::String(schema.clone()));
            }
            if let Some(search) = &json.search {
                let mut rows = JsonMap::new();
                for (path, name, rule) in search.rows() {
                    let mut row = JsonMap::new();
                    row.insert("name".to_string(), JsonValue::String(name));
                    row.insert("expect".to_string(), rule.describe());
                    rows.insert(path.to_string(), JsonValue::Object(row));
                }
                inner.insert("search".to_string(), JsonValue::Object(rows));
            }
            if let Some(whole) = &json.whole {
                inner.insert("body".to_string(), whole.describe());
            }
            out.insert("json".to_string(), JsonValue::Object(inner));
        }
        JsonValue::Object(out)
    }

    /// True when no check slot is populated.
    pub fn is_empty(&self) -> bool {
        self.status_code.is_none()
            && self.reason.is_none()
            && self.headers.is_none()
            && self.text.is_none()
            && self.json.is_none()
    }
}

fn resolve_opt_rule(rule: &Option<Rule>, ctx: &VarContext) -> Result<Option<Rule>, CaseError> {
    match rule {
        Some(r) => Ok(Some(r.resolve(ctx)?)),
        None => Ok(None),
    }
}

/// Checks against the parsed JSON body: a schema reference, path searches,
/// or a whole-body rule (an `assertions.json` value with no `schema` or
/// `search` key compares against the entire parsed body).
#[derive(Debug, Clone, Default)]
pub struct JsonAssertions {
    pub schema: Option<String>,
    pub search: Option<SearchSpec>,
    pub whole: Option<Rule>,
}

impl JsonAssertions {
    pub fn resolve(&self, ctx: &VarContext) -> Result<Self, CaseError> {
        let schema = match &self.schema {
            Some(s) => Some(context::resolve_to_string(s, ctx)?),
            None => None,
        };
        let search = match &self.search {
            Some(s) => Some(s.resolve(ctx)?),
            None => None,
        };
        Ok(Self {
            schema,
            search,
            whole: resolve_opt_rule(&self.whole, ctx)?,
        })
    }
}

/// Path searches in either document shape: a table keyed by the path
/// expression, or an item list with explicit `search`/`message`/`expect`.
#[derive(Debug, Clone)]
pub enum SearchSpec {
    Table(Vec<(String, Rule)>),
    Items(Vec<SearchItem>),
}

impl SearchSpec {
    pub fn resolve(&self, ctx: &VarContext) -> Result<Self, CaseError> {
        match self {
            Self::Table(rows) => {
                let mut out = Vec::with_capacity(rows.len());
                for (path, rule) in rows {
                    out.push((path.clone(), rule.resolve(ctx)?));
                }
                Ok(Self::Table(out))
            }
            Self::Items(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(SearchItem {
                        search: item.search.clone(),
                        message: item.message.clone(),
                        expect: item.expect.resolve(ctx)?,
                    });
                }
                Ok(Self::Items(out))
            }
        }
    }

    /// Flattens both shapes into `(path, checkpoint name, rule)` rows,
    /// preserving declaration order.
    pub fn rows(&self) -> Vec<(&str, String, &Rule)> {
        match self {
            Self::Table(rows) => rows
                .iter()
                .map(|(path, rule)| (path.as_str(), format!("json {path}"), rule))
                .collect(),
            Self::Items(items) => items
                .iter()
                .map(|item| {
                    let name = item
                        .message
                        .clone()
                        .unwrap_or_else(|| format!("json {}", item.search));
                    (item.search.as_str(), name, &item.expect)
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchItem {
    pub search: String,
    pub message: Option<String>,
    pub expect: Rule,
}

/// One expectation: a literal (equality shorthand), a matcher mapping,
/// a deferred query producing the expected value, or a callback.
#[derive(Debug, Clone)]
pub enum Rule {
    Literal(JsonValue),
    Matcher(MatcherSpec),
    Query(QuerySpec),
    Callback(CallbackSpec),
}

impl Rule {
    /// Resolves templates on the expectation side of the rule.
    pub fn resolve(&self, ctx: &VarContext) -> Result<Self, CaseError> {
        Ok(match self {
            Self::Literal(value) => Self::Literal(context::resolve_node(value, ctx)?),
            Self::Matcher(spec) => {
                let mut predicates = Vec::with_capacity(spec.predicates.len());
                for (predicate, arg) in &spec.predicates {
                    predicates.push((*predicate, context::resolve_node(arg, ctx)?));
                }
                Self::Matcher(MatcherSpec {
                    predicates,
                    includes: spec.includes.clone(),
                    excludes: spec.excludes.clone(),
                })
            }
            Self::Query(q) => Self::Query(QuerySpec {
                query: context::resolve_to_string(&q.query, ctx)?,
                params: resolve_map(&q.params, ctx)?,
            }),
            Self::Callback(c) => {
                let mut args = Vec::with_capacity(c.args.len());
                for arg in &c.args {
                    args.push(context::resolve_node(arg, ctx)?);
                }
                Self::Callback(CallbackSpec {
                    path: c.path.clone(),
                    args,
                    kwds: resolve_map(&c.kwds, ctx)?,
                })
            }
        })
    }

    /// JSON rendering for the `expand` command and for evidence output.
    pub fn describe(&self) -> JsonValue {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Matcher(spec) => {
                let mut out = JsonMap::new();
                out.insert("assert".to_string(), spec.describe());
                JsonValue::Object(out)
            }
            Self::Query(q) => {
                let mut inner = JsonMap::new();
                inner.insert("query".to_string(), JsonValue::String(q.query.clone()));
                inner.insert("params".to_string(), JsonValue::Object(q.params.clone()));
                let mut out = JsonMap::new();
                out.insert("exec:sql".to_string(), JsonValue::Object(inner));
                JsonValue::Object(out)
            }
            Self::Callback(c) => {
                let mut inner = JsonMap::new();
                inner.insert("path".to_string(), JsonValue::String(c.path.clone()));
                inner.insert("args".to_string(), JsonValue::Array(c.args.clone()));
                inner.insert("kwds".to_string(), JsonValue::Object(c.kwds.clone()));
                let mut out = JsonMap::new();
                out.insert("assert:callback".to_string(), JsonValue::Object(inner));
                JsonValue::Object(out)
            }
        }
    }
}

/// Deferred query rule (`!exec:sql`). Executed per checkpoint, strictly
/// after the response arrives; the result is the expected value.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub query: String,
    pub params: JsonMap<String, JsonValue>,
}

/// Callback rule (`!assert:callback`). The referenced function receives the
/// variable context and the actual value ahead of the authored args.
#[derive(Debug, Clone)]
pub struct CallbackSpec {
    pub path: String,
    pub args: Vec<JsonValue>,
    pub kwds: JsonMap<String, JsonValue>,
}

/// The transport collaborator's view of a completed HTTP exchange.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status_code: u16,
    pub reason: String,
    pub headers: HashMap<String, String>,
    pub text: String,
    /// Parsed body, when the transport could parse one.
    pub json: Option<JsonValue>,
}

impl HttpResponse {
    /// Headers as a JSON mapping with lowercased names, the shape header
    /// rules evaluate against.
    pub fn headers_json(&self) -> JsonValue {
        let mut out = JsonMap::new();
        for (name, value) in &self.headers {
            out.insert(name.to_ascii_lowercase(), JsonValue::String(value.clone()));
        }
        JsonValue::Object(out)
    }
}
