//! Matcher engine: a closed predicate registry evaluated against actual values.
//!
//! A matcher spec is an ordered list of `predicate: argument` pairs. All
//! predicates must pass (logical AND); evaluation follows declaration order
//! and stops at the first failure, whose message becomes the diagnostic.
//! Unknown predicate names are rejected when the matcher is parsed, before
//! any request is issued.

use std::collections::BTreeSet;

use regex::Regex;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::CaseError;

/// Closed registry of predicate names.
///
/// The common subset applies to every value family; the rest are
/// family-specific (string, integer, dict). Applying a predicate to a value
/// outside its family is a match failure, not a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    // common
    IsNone,
    IsNotNone,
    IsTrue,
    IsFalse,
    IsTypeOf,
    IsInstanceOf,
    IsEqualTo,
    IsNotEqualTo,
    IsIn,
    IsNotIn,
    IsLength,
    // string
    Contains,
    DoesNotContain,
    StartsWith,
    EndsWith,
    Matches,
    DoesNotMatch,
    IsAlpha,
    IsDigit,
    IsLower,
    IsUpper,
    IsEmpty,
    IsNotEmpty,
    // integer
    IsGreaterThan,
    IsGreaterThanOrEqualTo,
    IsLessThan,
    IsLessThanOrEqualTo,
    IsBetween,
    IsCloseTo,
    IsPositive,
    IsNegative,
    IsZero,
    // dict
    ContainsKey,
    DoesNotContainKey,
    ContainsValue,
    ContainsEntry,
    ContainsOnly,
    IsSubsetOf,
}

impl Predicate {
    /// Maps a spec name to a predicate, or `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "is_none" => Self::IsNone,
            "is_not_none" => Self::IsNotNone,
            "is_true" => Self::IsTrue,
            "is_false" => Self::IsFalse,
            "is_type_of" => Self::IsTypeOf,
            "is_instance_of" => Self::IsInstanceOf,
            "is_equal_to" => Self::IsEqualTo,
            "is_not_equal_to" => Self::IsNotEqualTo,
            "is_in" => Self::IsIn,
            "is_not_in" => Self::IsNotIn,
            "is_length" => Self::IsLength,
            "contains" => Self::Contains,
            "does_not_contain" => Self::DoesNotContain,
            "starts_with" => Self::StartsWith,
            "ends_with" => Self::EndsWith,
            "matches" => Self::Matches,
            "does_not_match" => Self::DoesNotMatch,
            "is_alpha" => Self::IsAlpha,
            "is_digit" => Self::IsDigit,
            "is_lower" => Self::IsLower,
            "is_upper" => Self::IsUpper,
            "is_empty" => Self::IsEmpty,
            "is_not_empty" => Self::IsNotEmpty,
            "is_greater_than" => Self::IsGreaterThan,
            "is_greater_than_or_equal_to" => Self::IsGreaterThanOrEqualTo,
            "is_less_than" => Self::IsLessThan,
            "is_less_than_or_equal_to" => Self::IsLessThanOrEqualTo,
            "is_between" => Self::IsBetween,
            "is_close_to" => Self::IsCloseTo,
            "is_positive" => Self::IsPositive,
            "is_negative" => Self::IsNegative,
            "is_zero" => Self::IsZero,
            "contains_key" => Self::ContainsKey,
            "does_not_contain_key" => Self::DoesNotContainKey,
            "contains_value" => Self::ContainsValue,
            "contains_entry" => Self::ContainsEntry,
            "contains_only" => Self::ContainsOnly,
            "is_subset_of" => Self::IsSubsetOf,
            _ => return None,
        })
    }

    /// Spec-facing name of this predicate.
    pub fn name(&self) -> &'static str {
        match self {
            Self::IsNone => "is_none",
            Self::IsNotNone => "is_not_none",
            Self::IsTrue => "is_true",
            Self::IsFalse => "is_false",
            Self::IsTypeOf => "is_type_of",
            Self::IsInstanceOf => "is_instance_of",
            Self::IsEqualTo => "is_equal_to",
            Self::IsNotEqualTo => "is_not_equal_to",
            Self::IsIn => "is_in",
            Self::IsNotIn => "is_not_in",
            Self::IsLength => "is_length",
            Self::Contains => "contains",
            Self::DoesNotContain => "does_not_contain",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Matches => "matches",
            Self::DoesNotMatch => "does_not_match",
            Self::IsAlpha => "is_alpha",
            Self::IsDigit => "is_digit",
            Self::IsLower => "is_lower",
            Self::IsUpper => "is_upper",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
            Self::IsGreaterThan => "is_greater_than",
            Self::IsGreaterThanOrEqualTo => "is_greater_than_or_equal_to",
            Self::IsLessThan => "is_less_than",
            Self::IsLessThanOrEqualTo => "is_less_than_or_equal_to",
            Self::IsBetween => "is_between",
            Self::IsCloseTo => "is_close_to",
            Self::IsPositive => "is_positive",
            Self::IsNegative => "is_negative",
            Self::IsZero => "is_zero",
            Self::ContainsKey => "contains_key",
            Self::DoesNotContainKey => "does_not_contain_key",
            Self::ContainsValue => "contains_value",
            Self::ContainsEntry => "contains_entry",
            Self::ContainsOnly => "contains_only",
            Self::IsSubsetOf => "is_subset_of",
        }
    }
}

/// Parsed matcher specification: ordered predicates plus optional
/// `includes`/`excludes` key projection applied to mapping actuals before
/// the predicates run.
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherSpec {
    pub predicates: Vec<(Predicate, JsonValue)>,
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
}

impl MatcherSpec {
    /// Builds a matcher spec from ordered `name -> argument` pairs.
    ///
    /// Unknown predicate names and malformed arguments are configuration
    /// errors raised here, at load time.
    pub fn parse(entries: Vec<(String, JsonValue)>) -> Result<Self, CaseError> {
        let mut predicates = Vec::new();
        let mut includes = Vec::new();
        let mut excludes = Vec::new();

        for (name, arg) in entries {
            match name.as_str() {
                "includes" => includes = parse_key_list("includes", &arg)?,
                "excludes" => excludes = parse_key_list("excludes", &arg)?,
                _ => {
                    let predicate = Predicate::from_name(&name).ok_or_else(|| {
                        CaseError::Spec(format!("unknown matcher predicate '{name}'"))
                    })?;
                    validate_argument(predicate, &arg)?;
                    predicates.push((predicate, arg));
                }
            }
        }

        if predicates.is_empty() {
            return Err(CaseError::Spec(
                "matcher spec lists no predicates".to_string(),
            ));
        }

        Ok(Self {
            predicates,
            includes,
            excludes,
        })
    }

    /// Renders the matcher as a JSON object, used as expected-side evidence.
    pub fn describe(&self) -> JsonValue {
        let mut out = JsonMap::new();
        for (predicate, arg) in &self.predicates {
            out.insert(predicate.name().to_string(), arg.clone());
        }
        JsonValue::Object(out)
    }
}

fn parse_key_list(option: &str, arg: &JsonValue) -> Result<Vec<String>, CaseError> {
    match arg {
        JsonValue::String(s) => Ok(vec![s.clone()]),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    CaseError::Spec(format!("matcher '{option}' entries must be strings"))
                })
            })
            .collect(),
        _ => Err(CaseError::Spec(format!(
            "matcher '{option}' must be a string or list of strings"
        ))),
    }
}

fn validate_argument(predicate: Predicate, arg: &JsonValue) -> Result<(), CaseError> {
    let ok = match predicate {
        Predicate::IsBetween | Predicate::IsCloseTo => {
            arg.as_array().map(|a| a.len() == 2).unwrap_or(false)
        }
        Predicate::IsIn | Predicate::IsNotIn | Predicate::ContainsOnly => arg.is_array(),
        Predicate::IsTypeOf | Predicate::IsInstanceOf => {
            arg.as_str().map(|s| type_matches(s, &JsonValue::Null).is_ok()).unwrap_or(false)
        }
        Predicate::Matches | Predicate::DoesNotMatch => arg.is_string(),
        Predicate::IsLength => arg.as_u64().is_some(),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(CaseError::Spec(format!(
            "invalid argument for matcher predicate '{}': {arg}",
            predicate.name()
        )))
    }
}

/// Outcome of one matcher evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchVerdict {
    Pass,
    /// First failing predicate's name and message, in declaration order.
    Fail { predicate: &'static str, message: String },
}

impl MatchVerdict {
    fn fail(predicate: Predicate, message: String) -> Self {
        Self::Fail {
            predicate: predicate.name(),
            message,
        }
    }
}

/// Evaluates a matcher spec against an actual value.
///
/// Returns `Err` only for configuration problems that escaped load-time
/// validation (for example an invalid regex after template substitution);
/// the orchestrator records those as errored, not failed.
pub fn match_value(actual: &JsonValue, spec: &MatcherSpec) -> Result<MatchVerdict, CaseError> {
    let projected = project(actual, spec);
    for (predicate, arg) in &spec.predicates {
        match eval_predicate(*predicate, &projected, arg)? {
            Ok(()) => {}
            Err(message) => return Ok(MatchVerdict::fail(*predicate, message)),
        }
    }
    Ok(MatchVerdict::Pass)
}

fn project(actual: &JsonValue, spec: &MatcherSpec) -> JsonValue {
    let JsonValue::Object(map) = actual else {
        return actual.clone();
    };
    if spec.includes.is_empty() && spec.excludes.is_empty() {
        return actual.clone();
    }
    let mut out = JsonMap::new();
    for (key, value) in map {
        let kept = (spec.includes.is_empty() || spec.includes.iter().any(|k| k == key))
            && !spec.excludes.iter().any(|k| k == key);
        if kept {
            out.insert(key.clone(), value.clone());
        }
    }
    JsonValue::Object(out)
}

type PredicateOutcome = std::result::Result<(), String>;

fn eval_predicate(
    predicate: Predicate,
    actual: &JsonValue,
    arg: &JsonValue,
) -> Result<PredicateOutcome, CaseError> {
    use Predicate::*;
    let outcome = match predicate {
        IsNone => check(actual.is_null(), || format!("<{actual}> should be none")),
        IsNotNone => check(!actual.is_null(), || "value should not be none".to_string()),
        IsTrue => check(actual == &JsonValue::Bool(true), || {
            format!("<{actual}> should be true")
        }),
        IsFalse => check(actual == &JsonValue::Bool(false), || {
            format!("<{actual}> should be false")
        }),
        IsTypeOf => type_check(actual, arg, true),
        IsInstanceOf => type_check(actual, arg, false),
        IsEqualTo => check(actual == arg, || {
            format!("<{actual}> should be equal to <{arg}>")
        }),
        IsNotEqualTo => check(actual != arg, || {
            format!("<{actual}> should not be equal to <{arg}>")
        }),
        IsIn => {
            let candidates = expect_array(predicate, arg)?;
            check(candidates.contains(actual), || {
                format!("<{actual}> should be in <{arg}>")
            })
        }
        IsNotIn => {
            let candidates = expect_array(predicate, arg)?;
            check(!candidates.contains(actual), || {
                format!("<{actual}> should not be in <{arg}>")
            })
        }
        IsLength => {
            let expected = arg.as_u64().ok_or_else(|| bad_argument(predicate, arg))? as usize;
            match value_length(actual) {
                Some(len) => check(len == expected, || {
                    format!("<{actual}> should have length {expected} but has {len}")
                }),
                None => family_mismatch(predicate, actual),
            }
        }
        Contains => eval_contains(actual, arg, false),
        DoesNotContain => eval_contains(actual, arg, true),
        StartsWith => with_strings(predicate, actual, arg, |a, e| {
            check(a.starts_with(e), || {
                format!("<{a}> should start with <{e}>")
            })
        })?,
        EndsWith => with_strings(predicate, actual, arg, |a, e| {
            check(a.ends_with(e), || format!("<{a}> should end with <{e}>"))
        })?,
        Matches => regex_check(predicate, actual, arg, false)?,
        DoesNotMatch => regex_check(predicate, actual, arg, true)?,
        IsAlpha => string_class(predicate, actual, |s| {
            !s.is_empty() && s.chars().all(char::is_alphabetic)
        }),
        IsDigit => string_class(predicate, actual, |s| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
        }),
        IsLower => string_class(predicate, actual, |s| {
            !s.is_empty() && s == s.to_lowercase()
        }),
        IsUpper => string_class(predicate, actual, |s| {
            !s.is_empty() && s == s.to_uppercase()
        }),
        IsEmpty => match value_length(actual) {
            Some(len) => check(len == 0, || format!("<{actual}> should be empty")),
            None => family_mismatch(predicate, actual),
        },
        IsNotEmpty => match value_length(actual) {
            Some(len) => check(len > 0, || "value should not be empty".to_string()),
            None => family_mismatch(predicate, actual),
        },
        IsGreaterThan => numeric_compare(predicate, actual, arg, |a, e| a > e)?,
        IsGreaterThanOrEqualTo => numeric_compare(predicate, actual, arg, |a, e| a >= e)?,
        IsLessThan => numeric_compare(predicate, actual, arg, |a, e| a < e)?,
        IsLessThanOrEqualTo => numeric_compare(predicate, actual, arg, |a, e| a <= e)?,
        IsBetween => {
            let bounds = expect_array(predicate, arg)?;
            let (low, high) = match (bounds.first().and_then(JsonValue::as_f64), bounds.get(1).and_then(JsonValue::as_f64)) {
                (Some(low), Some(high)) => (low, high),
                _ => return Err(bad_argument(predicate, arg)),
            };
            match actual.as_f64() {
                Some(a) => check(a >= low && a <= high, || {
                    format!("<{actual}> should be between <{low}> and <{high}>")
                }),
                None => family_mismatch(predicate, actual),
            }
        }
        IsCloseTo => {
            let parts = expect_array(predicate, arg)?;
            let (target, tolerance) = match (parts.first().and_then(JsonValue::as_f64), parts.get(1).and_then(JsonValue::as_f64)) {
                (Some(target), Some(tolerance)) => (target, tolerance),
                _ => return Err(bad_argument(predicate, arg)),
            };
            match actual.as_f64() {
                Some(a) => check((a - target).abs() <= tolerance, || {
                    format!("<{actual}> should be close to <{target}> within <{tolerance}>")
                }),
                None => family_mismatch(predicate, actual),
            }
        }
        IsPositive => numeric_class(predicate, actual, |a| a > 0.0),
        IsNegative => numeric_class(predicate, actual, |a| a < 0.0),
        IsZero => numeric_class(predicate, actual, |a| a == 0.0),
        ContainsKey => dict_keys_check(predicate, actual, arg, false),
        DoesNotContainKey => dict_keys_check(predicate, actual, arg, true),
        ContainsValue => match actual.as_object() {
            Some(map) => check(map.values().any(|v| v == arg), || {
                format!("mapping should contain value <{arg}>")
            }),
            None => family_mismatch(predicate, actual),
        },
        ContainsEntry => eval_contains_entry(actual, arg),
        ContainsOnly => {
            let keys = expect_array(predicate, arg)?;
            match actual.as_object() {
                Some(map) => {
                    let expected: BTreeSet<&str> =
                        keys.iter().filter_map(JsonValue::as_str).collect();
                    let actual_keys: BTreeSet<&str> = map.keys().map(String::as_str).collect();
                    check(expected == actual_keys, || {
                        format!(
                            "mapping keys <{:?}> should be exactly <{:?}>",
                            actual_keys, expected
                        )
                    })
                }
                None => family_mismatch(predicate, actual),
            }
        }
        IsSubsetOf => match (actual.as_object(), arg.as_object()) {
            (Some(map), Some(superset)) => check(
                map.iter().all(|(k, v)| superset.get(k) == Some(v)),
                || format!("<{actual}> should be a subset of <{arg}>"),
            ),
            (None, _) => family_mismatch(predicate, actual),
            (_, None) => return Err(bad_argument(predicate, arg)),
        },
    };
    Ok(outcome)
}

fn check(passed: bool, message: impl FnOnce() -> String) -> PredicateOutcome {
    if passed {
        Ok(())
    } else {
        Err(message())
    }
}

fn family_mismatch(predicate: Predicate, actual: &JsonValue) -> PredicateOutcome {
    Err(format!(
        "predicate '{}' does not apply to {} value <{actual}>",
        predicate.name(),
        json_type_name(actual)
    ))
}

fn bad_argument(predicate: Predicate, arg: &JsonValue) -> CaseError {
    CaseError::Spec(format!(
        "invalid argument for matcher predicate '{}': {arg}",
        predicate.name()
    ))
}

fn expect_array<'a>(
    predicate: Predicate,
    arg: &'a JsonValue,
) -> Result<&'a Vec<JsonValue>, CaseError> {
    arg.as_array().ok_or_else(|| bad_argument(predicate, arg))
}

fn with_strings(
    predicate: Predicate,
    actual: &JsonValue,
    arg: &JsonValue,
    f: impl FnOnce(&str, &str) -> PredicateOutcome,
) -> Result<PredicateOutcome, CaseError> {
    let expected = arg.as_str().ok_or_else(|| bad_argument(predicate, arg))?;
    match actual.as_str() {
        Some(a) => Ok(f(a, expected)),
        None => Ok(family_mismatch(predicate, actual)),
    }
}

fn regex_check(
    predicate: Predicate,
    actual: &JsonValue,
    arg: &JsonValue,
    negate: bool,
) -> Result<PredicateOutcome, CaseError> {
    let pattern = arg.as_str().ok_or_else(|| bad_argument(predicate, arg))?;
    let re = Regex::new(pattern)
        .map_err(|e| CaseError::Spec(format!("invalid regex '{pattern}': {e}")))?;
    Ok(match actual.as_str() {
        Some(a) => {
            let hit = re.is_match(a);
            check(hit != negate, || {
                if negate {
                    format!("<{a}> should not match /{pattern}/")
                } else {
                    format!("<{a}> should match /{pattern}/")
                }
            })
        }
        None => family_mismatch(predicate, actual),
    })
}

fn string_class(
    predicate: Predicate,
    actual: &JsonValue,
    class: impl FnOnce(&str) -> bool,
) -> PredicateOutcome {
    match actual.as_str() {
        Some(s) => check(class(s), || {
            format!("<{s}> should satisfy '{}'", predicate.name())
        }),
        None => family_mismatch(predicate, actual),
    }
}

fn numeric_compare(
    predicate: Predicate,
    actual: &JsonValue,
    arg: &JsonValue,
    cmp: impl FnOnce(f64, f64) -> bool,
) -> Result<PredicateOutcome, CaseError> {
    let expected = arg.as_f64().ok_or_else(|| bad_argument(predicate, arg))?;
    Ok(match actual.as_f64() {
        Some(a) => check(cmp(a, expected), || {
            format!("<{actual}> should satisfy '{}' <{arg}>", predicate.name())
        }),
        None => family_mismatch(predicate, actual),
    })
}

fn numeric_class(
    predicate: Predicate,
    actual: &JsonValue,
    class: impl FnOnce(f64) -> bool,
) -> PredicateOutcome {
    match actual.as_f64() {
        Some(a) => check(class(a), || {
            format!("<{actual}> should satisfy '{}'", predicate.name())
        }),
        None => family_mismatch(predicate, actual),
    }
}

fn eval_contains(actual: &JsonValue, arg: &JsonValue, negate: bool) -> PredicateOutcome {
    let hit = match actual {
        JsonValue::String(s) => match arg.as_str() {
            Some(needle) => s.contains(needle),
            None => return Err(format!("'contains' on a string needs a string argument, got <{arg}>")),
        },
        JsonValue::Array(items) => items.contains(arg),
        JsonValue::Object(map) => match arg.as_str() {
            Some(key) => map.contains_key(key),
            None => return Err(format!("'contains' on a mapping needs a string key, got <{arg}>")),
        },
        other => {
            return Err(format!(
                "predicate 'contains' does not apply to {} value <{other}>",
                json_type_name(other)
            ))
        }
    };
    check(hit != negate, || {
        if negate {
            format!("<{actual}> should not contain <{arg}>")
        } else {
            format!("<{actual}> should contain <{arg}>")
        }
    })
}

fn dict_keys_check(
    predicate: Predicate,
    actual: &JsonValue,
    arg: &JsonValue,
    negate: bool,
) -> PredicateOutcome {
    let Some(map) = actual.as_object() else {
        return family_mismatch(predicate, actual);
    };
    let keys: Vec<&str> = match arg {
        JsonValue::String(s) => vec![s.as_str()],
        JsonValue::Array(items) => items.iter().filter_map(JsonValue::as_str).collect(),
        _ => return Err(format!("'{}' needs a key or list of keys", predicate.name())),
    };
    for key in keys {
        let present = map.contains_key(key);
        if present == negate {
            return Err(if negate {
                format!("mapping should not contain key <{key}>")
            } else {
                format!("mapping should contain key <{key}>")
            });
        }
    }
    Ok(())
}

/// `contains_entry` accepts a mapping of entries or a list of single-entry
/// mappings (the document sample uses the list form).
fn eval_contains_entry(actual: &JsonValue, arg: &JsonValue) -> PredicateOutcome {
    let Some(map) = actual.as_object() else {
        return family_mismatch(Predicate::ContainsEntry, actual);
    };
    let mut expected: Vec<(&String, &JsonValue)> = Vec::new();
    match arg {
        JsonValue::Object(entries) => expected.extend(entries.iter()),
        JsonValue::Array(items) => {
            for item in items {
                match item.as_object() {
                    Some(entries) => expected.extend(entries.iter()),
                    None => return Err(format!("'contains_entry' list items must be mappings, got <{item}>")),
                }
            }
        }
        _ => return Err("'contains_entry' needs a mapping or list of mappings".to_string()),
    }
    for (key, value) in expected {
        match map.get(key) {
            Some(found) if found == value => {}
            Some(found) => {
                return Err(format!(
                    "entry <{key}> should be <{value}> but was <{found}>"
                ))
            }
            None => return Err(format!("mapping should contain entry <{key}>: <{value}>")),
        }
    }
    Ok(())
}

fn value_length(value: &JsonValue) -> Option<usize> {
    match value {
        JsonValue::String(s) => Some(s.chars().count()),
        JsonValue::Array(items) => Some(items.len()),
        JsonValue::Object(map) => Some(map.len()),
        _ => None,
    }
}

fn type_check(actual: &JsonValue, arg: &JsonValue, strict: bool) -> PredicateOutcome {
    let Some(name) = arg.as_str() else {
        return Err(format!("type predicate needs a type name, got <{arg}>"));
    };
    match type_matches(name, actual) {
        Ok(hit) => {
            let hit = if strict { hit && strict_type_hit(name, actual) } else { hit };
            check(hit, || {
                format!(
                    "<{actual}> of type {} should be of type <{name}>",
                    json_type_name(actual)
                )
            })
        }
        Err(()) => Err(format!("unknown type name <{name}>")),
    }
}

/// `Ok(bool)` for a recognized type name, `Err(())` for an unknown one.
/// The lenient interpretation: integers are instances of the float family.
fn type_matches(name: &str, value: &JsonValue) -> std::result::Result<bool, ()> {
    Ok(match name {
        "str" | "string" => value.is_string(),
        "int" | "integer" => value.is_i64() || value.is_u64(),
        "float" | "number" => value.is_number(),
        "bool" | "boolean" => value.is_boolean(),
        "list" | "array" => value.is_array(),
        "dict" | "object" => value.is_object(),
        "none" | "null" => value.is_null(),
        _ => return Err(()),
    })
}

fn strict_type_hit(name: &str, value: &JsonValue) -> bool {
    match name {
        // strict float excludes integral numbers
        "float" => value.is_f64(),
        _ => true,
    }
}

pub(crate) fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
