use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{HarnessError, HarnessResult};
use crate::models::{
    CheckStep, ResponseRecord, RequestSpec, ScenarioOutcome, ScenarioResult, StepOutcome,
};
use crate::services::assertions::{
    assert_body_contains, assert_json_subset, assert_schema, assert_status, check_json_path,
    SchemaStore,
};
use crate::services::{ApiContext, CancelSignal, Scenario, TemplateVars};

/// An ordered sequence of single requests, each with its own expectations.
///
/// A transport, credential or status failure stops the sequence. Content
/// failures (schema, JSONPath, body) fail the step but later steps still run.
pub struct ChecksScenario {
    name: String,
    tags: Vec<String>,
    api: Arc<ApiContext>,
    steps: Vec<CheckStep>,
    schemas: Arc<SchemaStore>,
}

impl ChecksScenario {
    pub fn new(
        name: impl Into<String>,
        api: Arc<ApiContext>,
        steps: Vec<CheckStep>,
        schemas: Arc<SchemaStore>,
    ) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            api,
            steps,
            schemas,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    fn build_request(&self, step: &CheckStep, vars: &TemplateVars) -> RequestSpec {
        let mut spec = RequestSpec::new(step.method, vars.substitute(&step.path))
            .with_headers(&step.headers);

        if let Some(body) = &step.body {
            spec = spec.with_json(vars.render(body));
        } else if let Some(form) = &step.form {
            spec = spec.with_form(
                form.iter()
                    .map(|(key, value)| (key.clone(), vars.substitute(value))),
            );
        }

        spec
    }

    /// Content assertions; every failure is collected
    fn check_content(&self, step: &CheckStep, response: &ResponseRecord) -> Vec<HarnessError> {
        let mut errors = Vec::new();

        if let Some(schema_name) = &step.schema {
            match self.schemas.get(schema_name) {
                Some(validator) => {
                    if let Err(e) = assert_schema(response, &validator).into_result() {
                        errors.push(e);
                    }
                }
                None => errors.push(HarnessError::Schema {
                    name: schema_name.clone(),
                    reason: "schema was not loaded".to_string(),
                }),
            }
        }

        for expectation in &step.json_path {
            match check_json_path(response, expectation) {
                Ok(matched) => {
                    tracing::debug!(path = %expectation.path, matched, "JSONPath expectation met")
                }
                Err(e) => errors.push(e),
            }
        }

        for needle in &step.body_contains {
            if let Err(e) = assert_body_contains(response, needle) {
                errors.push(e);
            }
        }

        if let Some(subset) = &step.body_subset {
            let result: HarnessResult<()> =
                response.json().and_then(|body| assert_json_subset(body, subset));
            if let Err(e) = result {
                errors.push(e);
            }
        }

        errors
    }
}

#[async_trait]
impl Scenario for ChecksScenario {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    async fn run(&self, cancel: &CancelSignal) -> ScenarioResult {
        let started = Instant::now();
        let vars = TemplateVars::new();
        let mut result = ScenarioResult::new(self.name.clone());

        for step in &self.steps {
            if cancel.is_cancelled() {
                result.outcome = ScenarioOutcome::Cancelled;
                result.error_message = Some(format!("cancelled before step {}", step.label()));
                break;
            }

            let label = step.label();
            let spec = self.build_request(step, &vars);
            let sent = if step.authorize {
                self.api.send(spec).await
            } else {
                self.api.send_anonymous(spec).await
            };

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(scenario = %self.name, step = %label, error = %e, "Request failed");
                    result.steps.push(StepOutcome::failed(&label, Some(step.expect_status), &e));
                    result.outcome = ScenarioOutcome::Failed;
                    result.error_message = Some(format!("{}: {}", label, e));
                    break;
                }
            };

            tracing::debug!(
                scenario = %self.name,
                step = %label,
                status = response.status(),
                body = %response.text(),
                "Check response"
            );

            if let Err(e) = assert_status(&response, step.expect_status) {
                result.steps.push(
                    StepOutcome::failed(&label, Some(step.expect_status), &e)
                        .with_response(response.capture()),
                );
                result.outcome = ScenarioOutcome::Failed;
                result.error_message = Some(format!("{}: {}", label, e));
                break;
            }

            let errors = self.check_content(step, &response);
            let outcome = match errors.first() {
                None => StepOutcome::passed(&label, Some(step.expect_status)),
                Some(first) => {
                    let mut outcome = StepOutcome::failed(&label, Some(step.expect_status), first);
                    outcome.error_message = Some(
                        errors
                            .iter()
                            .map(|e| e.to_string())
                            .collect::<Vec<_>>()
                            .join("; "),
                    );
                    for e in &errors[1..] {
                        if let HarnessError::SchemaValidation(violations) = e {
                            outcome.schema_errors.extend(violations.iter().cloned());
                        }
                    }
                    outcome
                }
            };

            if !outcome.pass {
                tracing::warn!(
                    scenario = %self.name,
                    step = %label,
                    failures = errors.len(),
                    "Check step failed"
                );
                result.outcome = ScenarioOutcome::Failed;
                if result.error_message.is_none() {
                    result.error_message =
                        Some(format!("{}: {}", label, outcome.error_message.clone().unwrap_or_default()));
                }
            } else {
                tracing::info!(scenario = %self.name, step = %label, "Check step passed");
            }

            result.steps.push(outcome.with_response(response.capture()));
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        result
    }
}
