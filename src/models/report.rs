use serde::Serialize;
use time::OffsetDateTime;

use crate::error::{HarnessError, SchemaViolation};
use crate::models::{CapturedResponse, LifecycleState};

/// Result of one request/assert step inside a scenario
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: String,
    pub pass: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<CapturedResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub schema_errors: Vec<SchemaViolation>,
    pub duration_ms: u64,
}

impl StepOutcome {
    pub fn passed(step: impl Into<String>, expected_status: Option<u16>) -> Self {
        Self {
            step: step.into(),
            pass: true,
            expected_status,
            actual_status: None,
            response: None,
            error_kind: None,
            error_message: None,
            schema_errors: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn failed(step: impl Into<String>, expected_status: Option<u16>, error: &HarnessError) -> Self {
        let schema_errors = match error {
            HarnessError::SchemaValidation(errors) => errors.clone(),
            _ => Vec::new(),
        };

        Self {
            step: step.into(),
            pass: false,
            expected_status,
            actual_status: None,
            response: None,
            error_kind: Some(error.kind()),
            error_message: Some(error.to_string()),
            schema_errors,
            duration_ms: 0,
        }
    }

    pub fn with_response(mut self, response: CapturedResponse) -> Self {
        self.actual_status = Some(response.status);
        self.duration_ms = response.duration_ms;
        self.response = Some(response);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioOutcome {
    Passed,
    Failed,
    /// Stopped by a shutdown request before finishing
    Cancelled,
}

impl ScenarioOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Everything a scenario run produced
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub name: String,
    pub outcome: ScenarioOutcome,
    pub steps: Vec<StepOutcome>,
    /// Lifecycle states in the order they were entered (lifecycle scenarios only)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<LifecycleState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration_ms: u64,
}

impl ScenarioResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: ScenarioOutcome::Passed,
            steps: Vec::new(),
            states: Vec::new(),
            error_message: None,
            duration_ms: 0,
        }
    }

    /// Result for a scenario that never ran its steps
    pub fn aborted(name: impl Into<String>, outcome: ScenarioOutcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            error_message: Some(message.into()),
            ..Self::new(name)
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == ScenarioOutcome::Passed
    }

    /// First failing step, if any
    pub fn first_failure(&self) -> Option<&StepOutcome> {
        self.steps.iter().find(|step| !step.pass)
    }
}

/// Summary of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub pass_rate: f64,
    pub total_duration_ms: u64,
    pub scenarios: Vec<ScenarioResult>,
}

impl RunReport {
    pub fn new(
        started_at: OffsetDateTime,
        finished_at: OffsetDateTime,
        scenarios: Vec<ScenarioResult>,
    ) -> Self {
        let total = scenarios.len();
        let passed = scenarios.iter().filter(|s| s.passed()).count();
        let cancelled = scenarios
            .iter()
            .filter(|s| s.outcome == ScenarioOutcome::Cancelled)
            .count();
        let failed = total - passed - cancelled;
        let pass_rate = if total > 0 {
            (passed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let total_duration_ms = (finished_at - started_at).whole_milliseconds().max(0) as u64;

        Self {
            started_at,
            finished_at,
            total,
            passed,
            failed,
            cancelled,
            pass_rate,
            total_duration_ms,
            scenarios,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}
