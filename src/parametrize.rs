//! Parametrize expansion: one authored case into N resolved cases.

use serde_json::Map as JsonMap;

use crate::context::{self, VarContext};
use crate::document::{AssertionsSpec, RequestSpec, TestCaseSpec};
use crate::error::CaseError;

const MAX_EXPANSIONS_PER_CASE: usize = 4096;

/// One fully resolved case: every `${...}` template substituted against the
/// binding's context, skip condition decided, ready for the transport and
/// the orchestrator. Immutable by construction.
#[derive(Debug, Clone)]
pub struct ResolvedCase {
    pub name: String,
    /// `Some(reason)` when the case should skip; the reason may be empty.
    pub skip: Option<String>,
    pub fixture: Option<serde_json::Value>,
    pub request: RequestSpec,
    pub assertions: AssertionsSpec,
    /// Context the case was resolved under, handed to callbacks later.
    pub context: VarContext,
}

impl ResolvedCase {
    /// JSON rendering for the `expand` command.
    pub fn describe(&self) -> serde_json::Value {
        let mut out = JsonMap::new();
        out.insert("name".to_string(), serde_json::Value::String(self.name.clone()));
        if let Some(reason) = &self.skip {
            out.insert("skip".to_string(), serde_json::Value::String(reason.clone()));
        }
        if let Some(fixture) = &self.fixture {
            out.insert("fixture".to_string(), fixture.clone());
        }
        out.insert("request".to_string(), self.request.describe());
        if !self.assertions.is_empty() {
            out.insert("assertions".to_string(), self.assertions.describe());
        }
        serde_json::Value::Object(out)
    }
}

/// Expansion outcome. An empty parametrize list is diagnosably distinct
/// from an unparametrized case: it yields zero cases.
#[derive(Debug, Clone)]
pub enum Expansion {
    Single(ResolvedCase),
    Empty,
    Many(Vec<ResolvedCase>),
}

impl Expansion {
    pub fn into_cases(self) -> Vec<ResolvedCase> {
        match self {
            Self::Single(case) => vec![case],
            Self::Empty => Vec::new(),
            Self::Many(cases) => cases,
        }
    }
}

/// Expands one authored case against the document's global context.
///
/// Expansion is the cartesian product over the parametrize entries in
/// declaration order, rightmost entry varying fastest. Each binding gets
/// its own local layer; bindings never leak across expansions.
pub fn expand_case(spec: &TestCaseSpec, globals: &VarContext) -> Result<Expansion, CaseError> {
    if spec.parametrize.is_empty() {
        return Ok(Expansion::Single(resolve_case(spec, globals.clone())?));
    }

    if spec.parametrize.iter().any(|(_, values)| values.is_empty()) {
        log::debug!("case '{}' has an empty parametrize list", spec.name);
        return Ok(Expansion::Empty);
    }

    let total: usize = spec
        .parametrize
        .iter()
        .map(|(_, values)| values.len())
        .try_fold(1usize, |acc, n| acc.checked_mul(n))
        .filter(|&n| n <= MAX_EXPANSIONS_PER_CASE)
        .ok_or_else(|| {
            CaseError::Spec(format!(
                "case '{}' expands beyond the {MAX_EXPANSIONS_PER_CASE} case limit",
                spec.name
            ))
        })?;

    let mut cases = Vec::with_capacity(total);
    let mut odometer = vec![0usize; spec.parametrize.len()];
    loop {
        let mut local = JsonMap::new();
        for (slot, (name, values)) in odometer.iter().zip(&spec.parametrize) {
            local.insert(name.clone(), values[*slot].clone());
        }
        cases.push(resolve_case(spec, globals.with_local(local))?);

        // advance rightmost-first
        let mut position = odometer.len();
        loop {
            if position == 0 {
                log::debug!("case '{}' expanded into {} cases", spec.name, cases.len());
                return Ok(Expansion::Many(cases));
            }
            position -= 1;
            odometer[position] += 1;
            if odometer[position] < spec.parametrize[position].1.len() {
                break;
            }
            odometer[position] = 0;
        }
    }
}

/// Expands every case in declaration order.
pub fn expand_all(
    cases: &[TestCaseSpec],
    globals: &VarContext,
) -> Result<Vec<ResolvedCase>, CaseError> {
    let mut out = Vec::new();
    for spec in cases {
        out.extend(expand_case(spec, globals)?.into_cases());
    }
    Ok(out)
}

fn resolve_case(spec: &TestCaseSpec, ctx: VarContext) -> Result<ResolvedCase, CaseError> {
    let skip = match &spec.skip {
        Some(rule) => rule.resolve(&ctx)?,
        None => None,
    };
    let fixture = match &spec.fixture {
        Some(value) => Some(context::resolve_node(value, &ctx)?),
        None => None,
    };
    Ok(ResolvedCase {
        name: context::resolve_to_string(&spec.name, &ctx)?,
        skip,
        fixture,
        request: spec.request.resolve(&ctx)?,
        assertions: spec.assertions.resolve(&ctx)?,
        context: ctx,
    })
}
