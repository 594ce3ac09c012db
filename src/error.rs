use serde::Serialize;

use crate::models::LifecycleStep;

/// One schema violation reported by the validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaViolation {
    /// JSON pointer into the validated instance ("" for the root)
    pub instance_path: String,
    pub message: String,
}

/// Harness error type shared by every component
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    // Transport errors
    #[error("Network error: {0}")]
    Network(String),

    // Credential errors
    #[error("Auth error: {0}")]
    Auth(String),

    // Lifecycle errors
    #[error("Lifecycle step '{step}' failed: {detail}")]
    Lifecycle { step: LifecycleStep, detail: String },

    // Assertion errors
    #[error("Schema validation failed with {} error(s)", .0.len())]
    SchemaValidation(Vec<SchemaViolation>),

    #[error("Assertion failed on {subject}: expected {expected}, got {actual}")]
    Assertion {
        subject: String,
        expected: String,
        actual: String,
    },

    // Input errors
    #[error("Response body is not valid JSON: {0}")]
    InvalidBody(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid JSONPath '{path}': {reason}")]
    JsonPath { path: String, reason: String },

    #[error("Invalid schema '{name}': {reason}")]
    Schema { name: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    pub fn assertion(
        subject: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::Assertion {
            subject: subject.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn lifecycle(step: LifecycleStep, detail: impl Into<String>) -> Self {
        Self::Lifecycle {
            step,
            detail: detail.into(),
        }
    }

    /// Short machine-friendly category, used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Auth(_) => "auth",
            Self::Lifecycle { .. } => "lifecycle",
            Self::SchemaValidation(_) => "schema_validation",
            Self::Assertion { .. } => "assertion",
            Self::InvalidBody(_) => "invalid_body",
            Self::InvalidRequest(_) => "invalid_request",
            Self::JsonPath { .. } => "json_path",
            Self::Schema { .. } => "schema",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }

    /// Whether retrying the same call could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

// Convenient conversions from common error types

impl From<reqwest::Error> for HarnessError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HarnessError::Network(format!("request timed out: {}", err))
        } else if err.is_builder() {
            HarnessError::InvalidRequest(err.to_string())
        } else {
            HarnessError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        HarnessError::InvalidBody(err.to_string())
    }
}

/// Result type alias for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;
