//! YAML document loading and load-time structural validation.
//!
//! Documents are parsed with `serde_yaml`; the `!assert`, `!assert:callback`
//! and `!exec:sql` tags become `Rule` variants, everything else becomes
//! plain JSON values. Authoring mistakes (unknown tags, unknown predicates,
//! bad path syntax, unrecognized methods) are rejected here, before any
//! request is issued.

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping as YamlMapping, Value as YamlValue};

use crate::document::{
    ApiDocument, AssertionsSpec, CallbackSpec, JsonAssertions, QuerySpec, RequestBody,
    RequestSpec, Rule, SearchItem, SearchSpec, SkipRule, TestCaseSpec,
};
use crate::error::{CaseError, Result};
use crate::matcher::MatcherSpec;
use crate::request::KNOWN_METHODS;
use crate::search;

const TAG_ASSERT: &str = "assert";
const TAG_CALLBACK: &str = "assert:callback";
const TAG_EXEC_SQL: &str = "exec:sql";

/// Parses and validates one YAML test document.
pub fn load_document(input: &str) -> Result<ApiDocument> {
    let root: YamlValue = serde_yaml::from_str(input)?;
    let root = expect_mapping(&root, "document root")?;
    let api = expect_mapping(
        root.get("api")
            .ok_or_else(|| spec_err("document has no 'api' section"))?,
        "api",
    )?;

    let api_type = api
        .get("type")
        .and_then(YamlValue::as_str)
        .ok_or_else(|| spec_err("'api.type' must be a string"))?;
    if api_type != "http" {
        return Err(spec_err(format!("unsupported api type '{api_type}'")));
    }

    let define = match api.get("define") {
        Some(value) => json_object(value, "api.define")?,
        None => JsonMap::new(),
    };

    let tests = api
        .get("tests")
        .ok_or_else(|| spec_err("'api' section has no 'tests'"))?;
    let cases = parse_tests(tests)?;
    log::debug!("loaded document with {} case(s)", cases.len());

    Ok(ApiDocument { define, cases })
}

/// Both `tests` shapes normalize to the same ordered case list: a mapping
/// of name to spec, or a list of specs carrying an inline `name`.
fn parse_tests(tests: &YamlValue) -> Result<Vec<TestCaseSpec>> {
    match tests {
        YamlValue::Mapping(map) => {
            let mut cases = Vec::with_capacity(map.len());
            for (key, value) in map {
                let name = key
                    .as_str()
                    .ok_or_else(|| spec_err("test names must be strings"))?;
                cases.push(parse_case(name.to_string(), value)?);
            }
            Ok(cases)
        }
        YamlValue::Sequence(items) => {
            let mut cases = Vec::with_capacity(items.len());
            for item in items {
                let spec = expect_mapping(item, "test entry")?;
                let name = spec
                    .get("name")
                    .and_then(YamlValue::as_str)
                    .ok_or_else(|| spec_err("list-form test entries need a string 'name'"))?;
                cases.push(parse_case(name.to_string(), item)?);
            }
            Ok(cases)
        }
        _ => Err(spec_err("'api.tests' must be a mapping or a list")),
    }
}

fn parse_case(name: String, value: &YamlValue) -> Result<TestCaseSpec> {
    let map = expect_mapping(value, &format!("test '{name}'"))?;
    let mut request = None;
    let mut assertions = AssertionsSpec::default();
    let mut skip = None;
    let mut fixture = None;
    let mut parametrize = Vec::new();

    for (key, entry) in map {
        let key = key
            .as_str()
            .ok_or_else(|| spec_err(format!("test '{name}' has a non-string key")))?;
        match key {
            "name" => {}
            "skip" => skip = Some(parse_skip(entry, &name)?),
            "fixture" => fixture = Some(yaml_to_json(entry)?),
            "parametrize" => parametrize = parse_parametrize(entry, &name)?,
            "request" => request = Some(parse_request(entry, &name)?),
            "assertions" => assertions = parse_assertions(entry, &name)?,
            other => {
                return Err(spec_err(format!("test '{name}' has unknown key '{other}'")))
            }
        }
    }

    Ok(TestCaseSpec {
        request: request
            .ok_or_else(|| spec_err(format!("test '{name}' has no 'request'")))?,
        name,
        skip,
        fixture,
        parametrize,
        assertions,
    })
}

fn parse_skip(value: &YamlValue, case: &str) -> Result<SkipRule> {
    match value {
        YamlValue::Bool(flag) => Ok(SkipRule::Flag(*flag)),
        YamlValue::String(reason) => Ok(SkipRule::Reason(reason.clone())),
        _ => Err(spec_err(format!(
            "test '{case}': 'skip' must be a bool or a string"
        ))),
    }
}

fn parse_parametrize(value: &YamlValue, case: &str) -> Result<Vec<(String, Vec<JsonValue>)>> {
    let map = expect_mapping(value, &format!("test '{case}' parametrize"))?;
    let mut out = Vec::with_capacity(map.len());
    for (key, entry) in map {
        let name = key
            .as_str()
            .ok_or_else(|| spec_err(format!("test '{case}': parametrize names must be strings")))?;
        let values = entry.as_sequence().ok_or_else(|| {
            spec_err(format!(
                "test '{case}': parametrize '{name}' must be a list of values"
            ))
        })?;
        let mut converted = Vec::with_capacity(values.len());
        for item in values {
            converted.push(yaml_to_json(item)?);
        }
        out.push((name.to_string(), converted));
    }
    Ok(out)
}

fn parse_request(value: &YamlValue, case: &str) -> Result<RequestSpec> {
    let map = expect_mapping(value, &format!("test '{case}' request"))?;
    let mut request = RequestSpec {
        method: "GET".to_string(),
        ..RequestSpec::default()
    };

    for (key, entry) in map {
        let key = key
            .as_str()
            .ok_or_else(|| spec_err(format!("test '{case}': request has a non-string key")))?;
        match key {
            "method" => {
                let method = entry
                    .as_str()
                    .ok_or_else(|| spec_err(format!("test '{case}': method must be a string")))?
                    .to_ascii_uppercase();
                if !KNOWN_METHODS.contains(&method.as_str()) {
                    return Err(spec_err(format!(
                        "test '{case}': unknown request method '{method}'"
                    )));
                }
                request.method = method;
            }
            "url" => request.url = Some(expect_string(entry, case, "url")?),
            "path" => request.path = Some(expect_string(entry, case, "path")?),
            "params" => request.params = json_object(entry, "request.params")?,
            "headers" => request.headers = json_object(entry, "request.headers")?,
            "body" => {
                request.body = Some(match entry {
                    YamlValue::String(raw) => RequestBody::Raw(raw.clone()),
                    other => RequestBody::Json(yaml_to_json(other)?),
                })
            }
            other => {
                return Err(spec_err(format!(
                    "test '{case}': request has unknown key '{other}'"
                )))
            }
        }
    }

    if request.url.is_none() && request.path.is_none() {
        return Err(spec_err(format!(
            "test '{case}': request needs a 'url' or a 'path'"
        )));
    }
    Ok(request)
}

fn expect_string(value: &YamlValue, case: &str, field: &str) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| spec_err(format!("test '{case}': '{field}' must be a string")))
}

fn parse_assertions(value: &YamlValue, case: &str) -> Result<AssertionsSpec> {
    let map = expect_mapping(value, &format!("test '{case}' assertions"))?;
    let mut out = AssertionsSpec::default();
    for (key, entry) in map {
        let key = key
            .as_str()
            .ok_or_else(|| spec_err(format!("test '{case}': assertions has a non-string key")))?;
        match key {
            "status_code" => out.status_code = Some(parse_rule(entry)?),
            "reason" => out.reason = Some(parse_rule(entry)?),
            "headers" => out.headers = Some(parse_rule(entry)?),
            "text" => out.text = Some(parse_rule(entry)?),
            "json" => out.json = Some(parse_json_assertions(entry, case)?),
            other => {
                return Err(spec_err(format!(
                    "test '{case}': assertions has unknown key '{other}'"
                )))
            }
        }
    }
    Ok(out)
}

/// `assertions.json` carrying `schema`/`search` keys is the structured
/// form; any other value is a whole-body rule.
fn parse_json_assertions(value: &YamlValue, case: &str) -> Result<JsonAssertions> {
    let structured = match value {
        YamlValue::Mapping(map) => map
            .iter()
            .any(|(k, _)| matches!(k.as_str(), Some("schema") | Some("search"))),
        _ => false,
    };
    if !structured {
        return Ok(JsonAssertions {
            whole: Some(parse_rule(value)?),
            ..JsonAssertions::default()
        });
    }

    let map = expect_mapping(value, &format!("test '{case}' json assertions"))?;
    let mut out = JsonAssertions::default();
    for (key, entry) in map {
        match key.as_str() {
            Some("schema") => {
                out.schema = Some(expect_string(entry, case, "json.schema")?);
            }
            Some("search") => out.search = Some(parse_search(entry, case)?),
            Some(other) => {
                return Err(spec_err(format!(
                    "test '{case}': json assertions has unknown key '{other}'"
                )))
            }
            None => {
                return Err(spec_err(format!(
                    "test '{case}': json assertions has a non-string key"
                )))
            }
        }
    }
    Ok(out)
}

fn parse_search(value: &YamlValue, case: &str) -> Result<SearchSpec> {
    match value {
        YamlValue::Mapping(map) => {
            let mut rows = Vec::with_capacity(map.len());
            for (key, entry) in map {
                let path = key.as_str().ok_or_else(|| {
                    spec_err(format!("test '{case}': search paths must be strings"))
                })?;
                search::validate_path(path)?;
                rows.push((path.to_string(), parse_rule(entry)?));
            }
            Ok(SearchSpec::Table(rows))
        }
        YamlValue::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let map = expect_mapping(item, &format!("test '{case}' search item"))?;
                let path = map.get("search").and_then(YamlValue::as_str).ok_or_else(|| {
                    spec_err(format!(
                        "test '{case}': search items need a string 'search'"
                    ))
                })?;
                search::validate_path(path)?;
                let message = match map.get("message") {
                    Some(m) => Some(expect_string(m, case, "search message")?),
                    None => None,
                };
                let expect = map.get("expect").ok_or_else(|| {
                    spec_err(format!("test '{case}': search items need an 'expect'"))
                })?;
                for (key, _) in map {
                    if !matches!(key.as_str(), Some("search") | Some("message") | Some("expect")) {
                        return Err(spec_err(format!(
                            "test '{case}': search item has unknown key {key:?}"
                        )));
                    }
                }
                out.push(SearchItem {
                    search: path.to_string(),
                    message,
                    expect: parse_rule(expect)?,
                });
            }
            Ok(SearchSpec::Items(out))
        }
        _ => Err(spec_err(format!(
            "test '{case}': 'search' must be a mapping or a list"
        ))),
    }
}

/// Converts a rule-position node. Tagged nodes select the rule kind; plain
/// values are equality literals.
fn parse_rule(value: &YamlValue) -> Result<Rule> {
    let YamlValue::Tagged(tagged) = value else {
        return Ok(Rule::Literal(yaml_to_json(value)?));
    };
    let tag = tag_name(tagged);
    match tag.as_str() {
        TAG_ASSERT => Ok(Rule::Matcher(parse_matcher(&tagged.value)?)),
        TAG_CALLBACK => Ok(Rule::Callback(parse_callback(&tagged.value)?)),
        TAG_EXEC_SQL => Ok(Rule::Query(parse_query(&tagged.value)?)),
        other => Err(spec_err(format!("unknown directive tag '!{other}'"))),
    }
}

fn parse_matcher(value: &YamlValue) -> Result<MatcherSpec> {
    let map = expect_mapping(value, "!assert payload")?;
    let mut entries = Vec::with_capacity(map.len());
    for (key, entry) in map {
        let name = key
            .as_str()
            .ok_or_else(|| spec_err("!assert predicate names must be strings"))?;
        entries.push((name.to_string(), yaml_to_json(entry)?));
    }
    MatcherSpec::parse(entries)
}

fn parse_callback(value: &YamlValue) -> Result<CallbackSpec> {
    let map = expect_mapping(value, "!assert:callback payload")?;
    let path = map
        .get("path")
        .and_then(YamlValue::as_str)
        .ok_or_else(|| spec_err("!assert:callback needs a string 'path'"))?;
    let args = match map.get("args") {
        Some(YamlValue::Sequence(items)) => items
            .iter()
            .map(yaml_to_json)
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(spec_err("!assert:callback 'args' must be a list")),
        None => Vec::new(),
    };
    let kwds = match map.get("kwds") {
        Some(value) => json_object(value, "!assert:callback kwds")?,
        None => JsonMap::new(),
    };
    for (key, _) in map {
        if !matches!(key.as_str(), Some("path") | Some("args") | Some("kwds")) {
            return Err(spec_err(format!(
                "!assert:callback has unknown key {key:?}"
            )));
        }
    }
    Ok(CallbackSpec {
        path: path.to_string(),
        args,
        kwds,
    })
}

/// `!exec:sql` takes a bare query string or a `{query, params}` mapping.
fn parse_query(value: &YamlValue) -> Result<QuerySpec> {
    match value {
        YamlValue::String(query) => Ok(QuerySpec {
            query: query.clone(),
            params: JsonMap::new(),
        }),
        YamlValue::Mapping(map) => {
            let query = map
                .get("query")
                .and_then(YamlValue::as_str)
                .ok_or_else(|| spec_err("!exec:sql needs a string 'query'"))?;
            let params = match map.get("params") {
                Some(value) => json_object(value, "!exec:sql params")?,
                None => JsonMap::new(),
            };
            for (key, _) in map {
                if !matches!(key.as_str(), Some("query") | Some("params")) {
                    return Err(spec_err(format!("!exec:sql has unknown key {key:?}")));
                }
            }
            Ok(QuerySpec {
                query: query.to_string(),
                params,
            })
        }
        _ => Err(spec_err("!exec:sql needs a query string or mapping")),
    }
}

fn tag_name(tagged: &TaggedValue) -> String {
    tagged.tag.to_string().trim_start_matches('!').to_string()
}

fn spec_err(message: impl Into<String>) -> CaseError {
    CaseError::Spec(message.into())
}

fn expect_mapping<'a>(value: &'a YamlValue, what: &str) -> Result<&'a YamlMapping> {
    value
        .as_mapping()
        .ok_or_else(|| spec_err(format!("{what} must be a mapping")))
}

fn json_object(value: &YamlValue, what: &str) -> Result<JsonMap<String, JsonValue>> {
    match yaml_to_json(value)? {
        JsonValue::Object(map) => Ok(map),
        _ => Err(spec_err(format!("{what} must be a mapping"))),
    }
}

/// Plain-value conversion. Directive tags are only legal at rule positions;
/// meeting one here is an authoring error.
fn yaml_to_json(value: &YamlValue) -> Result<JsonValue> {
    Ok(match value {
        YamlValue::Null => JsonValue::Null,
        YamlValue::Bool(b) => JsonValue::Bool(*b),
        YamlValue::Number(n) => JsonValue::Number(yaml_number(n)?),
        YamlValue::String(s) => JsonValue::String(s.clone()),
        YamlValue::Sequence(items) => {
            JsonValue::Array(items.iter().map(yaml_to_json).collect::<Result<Vec<_>>>()?)
        }
        YamlValue::Mapping(map) => {
            let mut out = JsonMap::new();
            for (key, entry) in map {
                let key = key
                    .as_str()
                    .ok_or_else(|| spec_err("mapping keys must be strings"))?;
                out.insert(key.to_string(), yaml_to_json(entry)?);
            }
            JsonValue::Object(out)
        }
        YamlValue::Tagged(tagged) => {
            return Err(spec_err(format!(
                "directive '!{}' is not allowed in this position",
                tag_name(tagged)
            )))
        }
    })
}

fn yaml_number(n: &serde_yaml::Number) -> Result<JsonNumber> {
    if let Some(i) = n.as_i64() {
        Ok(JsonNumber::from(i))
    } else if let Some(u) = n.as_u64() {
        Ok(JsonNumber::from(u))
    } else if let Some(f) = n.as_f64() {
        JsonNumber::from_f64(f)
            .ok_or_else(|| spec_err(format!("non-finite number '{n}' is not representable")))
    } else {
        Err(spec_err(format!("unsupported number '{n}'")))
    }
}
