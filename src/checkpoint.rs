//! Checkpoint results and case verdicts.

use serde::Serialize;
use serde_json::Value as JsonValue;

/// Terminal status of one checkpoint. A result is immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed,
    Errored,
    Skipped,
}

/// Expected-vs-actual pair attached to failed checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    pub actual: JsonValue,
    pub expected: JsonValue,
}

/// One named check outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointResult {
    pub name: String,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
}

impl CheckpointResult {
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Passed,
            message: None,
            evidence: None,
        }
    }

    pub fn failed(name: impl Into<String>, message: impl Into<String>, evidence: Evidence) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Failed,
            message: Some(message.into()),
            evidence: Some(evidence),
        }
    }

    pub fn errored(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Errored,
            message: Some(message.into()),
            evidence: None,
        }
    }

    pub fn skipped(name: impl Into<String>, reason: &str) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Skipped,
            message: if reason.is_empty() {
                None
            } else {
                Some(reason.to_string())
            },
            evidence: None,
        }
    }
}

/// Whole-case verdict, the worst status across checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseVerdict {
    Passed,
    Failed,
    Errored,
    Skipped,
}

/// All checkpoint outcomes for one resolved case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub case_name: String,
    pub checkpoints: Vec<CheckpointResult>,
    pub verdict: CaseVerdict,
}

impl CaseReport {
    /// Builds the report, deriving the verdict with precedence
    /// errored > failed > skipped > passed. An all-skipped case (or one
    /// with no checkpoints at all) reports skipped.
    pub fn new(case_name: impl Into<String>, checkpoints: Vec<CheckpointResult>) -> Self {
        let verdict = overall_verdict(&checkpoints);
        Self {
            case_name: case_name.into(),
            checkpoints,
            verdict,
        }
    }
}

fn overall_verdict(checkpoints: &[CheckpointResult]) -> CaseVerdict {
    let mut any_failed = false;
    let mut any_passed = false;
    for checkpoint in checkpoints {
        match checkpoint.status {
            CheckStatus::Errored => return CaseVerdict::Errored,
            CheckStatus::Failed => any_failed = true,
            CheckStatus::Passed => any_passed = true,
            CheckStatus::Skipped => {}
        }
    }
    if any_failed {
        CaseVerdict::Failed
    } else if any_passed {
        CaseVerdict::Passed
    } else {
        CaseVerdict::Skipped
    }
}
