//! Collaborator traits for deferred directives.
//!
//! `!exec:sql` and `!assert:callback` rules reach outside the engine. The
//! engine only defines the seams; harnesses plug in real executors and a
//! callback registry. Directive failures are reported as strings so the
//! orchestrator can fold them into per-checkpoint outcomes.

use std::collections::HashMap;

use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::context::VarContext;

/// Runs a deferred query and returns the expected value it produced.
///
/// Called per checkpoint, strictly after the response arrives; results are
/// never memoized across checkpoints.
pub trait QueryExecutor {
    fn execute(
        &self,
        query: &str,
        params: &JsonMap<String, JsonValue>,
    ) -> Result<JsonValue, String>;
}

impl<F> QueryExecutor for F
where
    F: Fn(&str, &JsonMap<String, JsonValue>) -> Result<JsonValue, String>,
{
    fn execute(
        &self,
        query: &str,
        params: &JsonMap<String, JsonValue>,
    ) -> Result<JsonValue, String> {
        self(query, params)
    }
}

/// A callback invoked with the variable context and the actual value ahead
/// of the authored args. `Ok(false)` and `Err(message)` both fail the
/// checkpoint; `Err` carries the diagnostic.
pub trait CaseCallback {
    fn invoke(
        &self,
        ctx: &VarContext,
        actual: &JsonValue,
        args: &[JsonValue],
        kwds: &JsonMap<String, JsonValue>,
    ) -> Result<bool, String>;
}

impl<F> CaseCallback for F
where
    F: Fn(&VarContext, &JsonValue, &[JsonValue], &JsonMap<String, JsonValue>) -> Result<bool, String>,
{
    fn invoke(
        &self,
        ctx: &VarContext,
        actual: &JsonValue,
        args: &[JsonValue],
        kwds: &JsonMap<String, JsonValue>,
    ) -> Result<bool, String> {
        self(ctx, actual, args, kwds)
    }
}

/// Locates a callback by its dotted reference path.
pub trait CallbackResolver {
    fn resolve(&self, path: &str) -> Option<&dyn CaseCallback>;
}

/// Map-backed resolver for harnesses that register callbacks up front.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, Box<dyn CaseCallback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: impl Into<String>, callback: impl CaseCallback + 'static) {
        self.callbacks.insert(path.into(), Box::new(callback));
    }
}

impl CallbackResolver for CallbackRegistry {
    fn resolve(&self, path: &str) -> Option<&dyn CaseCallback> {
        self.callbacks.get(path).map(Box::as_ref)
    }
}
