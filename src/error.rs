//! Error definitions for document loading, expansion, and checkpoint evaluation.

use thiserror::Error;

#[derive(Debug, Error)]
/// Top-level error type returned by public APIs.
///
/// `Spec` and `UnboundVariable` are fatal to loading or to the owning case.
/// The per-checkpoint variants (`PathEvaluation`, `QueryExecution`,
/// `CallbackInvocation`, `SchemaValidation`) are recovered locally by the
/// orchestrator and surface as that checkpoint's errored state; they never
/// abort sibling checkpoints.
pub enum CaseError {
    /// Malformed document: unknown predicate, bad path syntax, invalid shape.
    /// Raised at load time, before any request is issued.
    #[error("spec error: {0}")]
    Spec(String),
    /// A `${...}` template references a name absent from both context layers.
    #[error("unbound variable: {0}")]
    UnboundVariable(String),
    /// JSONPath expression could not be evaluated against the response body.
    #[error("path evaluation error: {0}")]
    PathEvaluation(String),
    /// Deferred query execution failed in the external executor.
    #[error("query execution error: {0}")]
    QueryExecution(String),
    /// Callback reference could not be located or invoked.
    #[error("callback invocation error: {0}")]
    CallbackInvocation(String),
    /// Schema reference could not be loaded or compiled.
    #[error("schema validation error: {0}")]
    SchemaValidation(String),
    /// YAML parsing failure in the input document.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// JSON serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Filesystem I/O error from the CLI or schema loading.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CaseError>;
