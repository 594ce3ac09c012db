use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::error::HarnessError;
use crate::models::{
    CapturedResponse, LifecycleState, LifecycleStep, RequestSpec, ResourceDescriptor,
    ResponseRecord, ScenarioOutcome, ScenarioResult, StepOutcome,
};
use crate::services::assertions::{assert_json_subset, query_json_path};
use crate::services::{ApiContext, CancelSignal, Scenario, TemplateVars};

/// A transition that did not happen. The run's state is left unchanged, so
/// a caller may retry the same transition before recording the failure.
#[derive(Debug)]
pub struct StepFailure {
    /// `None` when the run had already finished and no transition remained
    pub step: Option<LifecycleStep>,
    pub expected_status: Option<u16>,
    pub error: HarnessError,
    pub response: Option<CapturedResponse>,
}

/// Mutable progress of one resource through its lifecycle
#[derive(Debug)]
pub struct LifecycleRun {
    state: LifecycleState,
    visited: Vec<LifecycleState>,
    create_payload: serde_json::Value,
    update_payload: serde_json::Value,
    resource_id: Option<serde_json::Value>,
    steps: Vec<StepOutcome>,
}

impl LifecycleRun {
    /// Render the descriptor's payload templates once for this run
    pub fn new(descriptor: &ResourceDescriptor, vars: &TemplateVars) -> Self {
        Self {
            state: LifecycleState::Unstarted,
            visited: vec![LifecycleState::Unstarted],
            create_payload: vars.render(&descriptor.create_payload),
            update_payload: vars.render(&descriptor.update_payload),
            resource_id: None,
            steps: Vec::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// States entered so far, in order, starting with `Unstarted`
    pub fn visited(&self) -> &[LifecycleState] {
        &self.visited
    }

    pub fn steps(&self) -> &[StepOutcome] {
        &self.steps
    }

    pub fn create_payload(&self) -> &serde_json::Value {
        &self.create_payload
    }

    pub fn update_payload(&self) -> &serde_json::Value {
        &self.update_payload
    }

    /// Identifier extracted from the create response
    pub fn resource_id(&self) -> Option<&serde_json::Value> {
        self.resource_id.as_ref()
    }

    /// Identifier as used in item URLs
    pub fn resource_id_segment(&self) -> Option<String> {
        self.resource_id.as_ref().and_then(scalar_segment)
    }

    fn enter(&mut self, state: LifecycleState) {
        self.state = state;
        self.visited.push(state);
    }

    /// Move to `Failed(step)` and keep the failure in the step log.
    /// Returns `false` and changes nothing once the run is finished.
    pub fn record_failure(&mut self, failure: StepFailure) -> bool {
        let step = match failure.step {
            Some(step) if !self.is_finished() => step,
            _ => {
                tracing::warn!(state = %self.state, error = %failure.error, "Ignoring failure on a finished lifecycle");
                return false;
            }
        };

        let mut outcome = StepOutcome::failed(step.as_str(), failure.expected_status, &failure.error);
        if let Some(response) = failure.response {
            outcome = outcome.with_response(response);
        }
        self.steps.push(outcome);
        self.enter(LifecycleState::Failed(step));
        true
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}

/// URL path segment for a scalar identifier; `None` for objects, arrays and null
fn scalar_segment(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// How `LifecycleRunner::run` ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStop {
    /// Reached `VerifiedGone`
    Completed,
    /// The cancel signal fired between steps
    Cancelled,
    /// The named step failed; its outcome is the last entry in the step log
    Failed(LifecycleStep),
}

/// Drives create -> read -> update -> delete -> verify-gone against one API
pub struct LifecycleRunner {
    api: Arc<ApiContext>,
}

impl LifecycleRunner {
    pub fn new(api: Arc<ApiContext>) -> Self {
        Self { api }
    }

    /// Run every remaining transition in order, stopping at the first failure
    /// or when `cancel` fires between steps.
    pub async fn run(
        &self,
        descriptor: &ResourceDescriptor,
        run: &mut LifecycleRun,
        cancel: &CancelSignal,
    ) -> RunStop {
        while !run.is_finished() {
            if cancel.is_cancelled() {
                tracing::info!(api = %self.api.name, state = %run.state(), "Lifecycle cancelled");
                return RunStop::Cancelled;
            }

            if let Err(failure) = self.advance(descriptor, run).await {
                let Some(step) = failure.step else {
                    break;
                };
                run.record_failure(failure);
                return RunStop::Failed(step);
            }
        }
        RunStop::Completed
    }

    /// Perform exactly one transition. On failure the state is unchanged.
    pub async fn advance(
        &self,
        descriptor: &ResourceDescriptor,
        run: &mut LifecycleRun,
    ) -> Result<LifecycleState, StepFailure> {
        let step = run.state().next_step().ok_or_else(|| StepFailure {
            step: None,
            expected_status: None,
            error: HarnessError::InvalidRequest(format!(
                "lifecycle already finished in state {}",
                run.state()
            )),
            response: None,
        })?;

        let expected = descriptor.expected.for_step(step);
        let spec = self.request_for(step, descriptor, run).map_err(|error| StepFailure {
            step: Some(step),
            expected_status: Some(expected),
            error,
            response: None,
        })?;

        let started = Instant::now();
        let response = self.api.send(spec).await.map_err(|error| StepFailure {
            step: Some(step),
            expected_status: Some(expected),
            error,
            response: None,
        })?;

        tracing::debug!(
            api = %self.api.name,
            step = %step,
            status = response.status(),
            body = %response.text(),
            "Lifecycle response"
        );

        let captured = response.capture();
        if let Err(detail) = self.check(step, expected, descriptor, run, &response) {
            tracing::warn!(api = %self.api.name, step = %step, detail = %detail, "Lifecycle step failed");
            return Err(StepFailure {
                step: Some(step),
                expected_status: Some(expected),
                error: HarnessError::lifecycle(step, detail),
                response: Some(captured),
            });
        }

        let mut outcome = StepOutcome::passed(step.as_str(), Some(expected)).with_response(captured);
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        run.steps.push(outcome);

        let next = step.target_state();
        run.enter(next);

        tracing::info!(
            api = %self.api.name,
            step = %step,
            status = response.status(),
            state = %next,
            "Lifecycle step passed"
        );

        Ok(next)
    }

    /// Delete the resource if it was created and not yet deleted.
    /// Never attempted implicitly; the lifecycle state is left as is.
    pub async fn cleanup(
        &self,
        descriptor: &ResourceDescriptor,
        run: &mut LifecycleRun,
    ) -> Option<StepOutcome> {
        let already_deleted = run
            .visited()
            .iter()
            .any(|state| matches!(state, LifecycleState::Deleted));
        if already_deleted {
            return None;
        }

        let id = run.resource_id_segment()?;
        let spec = RequestSpec::delete(descriptor.item_url(&id));
        let expected = descriptor.expected.delete;

        let outcome = match self.api.send(spec).await {
            Ok(response) if response.status() == expected || response.status() == 404 => {
                StepOutcome::passed("cleanup", Some(expected)).with_response(response.capture())
            }
            Ok(response) => {
                let error = HarnessError::assertion("cleanup status", expected, response.status());
                StepOutcome::failed("cleanup", Some(expected), &error).with_response(response.capture())
            }
            Err(error) => StepOutcome::failed("cleanup", Some(expected), &error),
        };

        tracing::info!(api = %self.api.name, resource_id = %id, pass = outcome.pass, "Cleanup finished");
        run.steps.push(outcome.clone());
        Some(outcome)
    }

    fn request_for(
        &self,
        step: LifecycleStep,
        descriptor: &ResourceDescriptor,
        run: &LifecycleRun,
    ) -> Result<RequestSpec, HarnessError> {
        let item_url = || {
            run.resource_id_segment()
                .map(|id| descriptor.item_url(&id))
                .ok_or_else(|| {
                    HarnessError::lifecycle(step, "no resource identifier from the create step")
                })
        };

        Ok(match step {
            LifecycleStep::Create => {
                RequestSpec::post(descriptor.collection_url()).with_json(run.create_payload.clone())
            }
            LifecycleStep::Read | LifecycleStep::VerifyGone => RequestSpec::get(item_url()?),
            LifecycleStep::Update => RequestSpec::new(descriptor.update_method, item_url()?)
                .with_json(run.update_payload.clone()),
            LifecycleStep::Delete => RequestSpec::delete(item_url()?),
        })
    }

    /// Step expectations; `Err` carries the failure detail
    fn check(
        &self,
        step: LifecycleStep,
        expected: u16,
        descriptor: &ResourceDescriptor,
        run: &mut LifecycleRun,
        response: &ResponseRecord,
    ) -> Result<(), String> {
        if response.status() != expected {
            let mut detail = format!("expected status {}, got {}", expected, response.status());
            if step == LifecycleStep::VerifyGone && response.is_success() {
                detail.push_str(" (resource still present after delete)");
            }
            return Err(detail);
        }

        match step {
            LifecycleStep::Create => {
                let id = extract_identifier(response, &descriptor.id_path)?;
                run.resource_id = Some(id);
            }
            LifecycleStep::Read => {
                let expected_id = run
                    .resource_id
                    .clone()
                    .ok_or_else(|| "no resource identifier from the create step".to_string())?;
                let actual_id = extract_identifier(response, &descriptor.id_path)?;
                if actual_id != expected_id {
                    return Err(format!(
                        "identifier mismatch: created {}, read back {}",
                        expected_id, actual_id
                    ));
                }

                if descriptor.echo_check {
                    let body = response.json().map_err(|e| e.to_string())?;
                    assert_json_subset(body, &run.create_payload).map_err(|e| e.to_string())?;
                }
            }
            LifecycleStep::Update | LifecycleStep::Delete | LifecycleStep::VerifyGone => {}
        }

        Ok(())
    }
}

/// Apply the descriptor's identifier rule; it must match exactly one scalar
fn extract_identifier(
    response: &ResponseRecord,
    id_path: &str,
) -> Result<serde_json::Value, String> {
    let body = response.json().map_err(|e| e.to_string())?;
    let matches = query_json_path(body, id_path).map_err(|e| e.to_string())?;

    let count = matches.len();
    if count > 1 {
        return Err(format!(
            "identifier path '{}' matched {} values, expected one",
            id_path, count
        ));
    }

    match matches.first() {
        Some(value) if scalar_segment(&value).is_some() => Ok(value),
        Some(value) => Err(format!(
            "identifier path '{}' resolved to non-scalar {}",
            id_path, value
        )),
        None => Err(format!("identifier path '{}' matched nothing", id_path)),
    }
}

/// Lifecycle run bound to a name, as registered with the scenario registry
pub struct LifecycleScenario {
    name: String,
    tags: Vec<String>,
    api: Arc<ApiContext>,
    descriptor: ResourceDescriptor,
    cleanup_on_failure: bool,
}

impl LifecycleScenario {
    pub fn new(name: impl Into<String>, api: Arc<ApiContext>, descriptor: ResourceDescriptor) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            api,
            descriptor,
            cleanup_on_failure: false,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_cleanup_on_failure(mut self, enabled: bool) -> Self {
        self.cleanup_on_failure = enabled;
        self
    }
}

#[async_trait]
impl Scenario for LifecycleScenario {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    async fn run(&self, cancel: &CancelSignal) -> ScenarioResult {
        let started = Instant::now();
        let runner = LifecycleRunner::new(self.api.clone());
        let mut run = LifecycleRun::new(&self.descriptor, &TemplateVars::new());

        let stop = runner.run(&self.descriptor, &mut run, cancel).await;

        let mut scenario = ScenarioResult::new(self.name.clone());
        match stop {
            RunStop::Completed => {}
            RunStop::Cancelled => {
                scenario.outcome = ScenarioOutcome::Cancelled;
                scenario.error_message = Some(format!("cancelled in state {}", run.state()));
            }
            RunStop::Failed(step) => {
                scenario.outcome = ScenarioOutcome::Failed;
                scenario.error_message = run
                    .steps()
                    .last()
                    .and_then(|outcome| outcome.error_message.clone())
                    .or_else(|| Some(format!("step {} failed", step)));
            }
        }

        if scenario.outcome != ScenarioOutcome::Passed && self.cleanup_on_failure {
            runner.cleanup(&self.descriptor, &mut run).await;
        }

        scenario.states = run.visited().to_vec();
        scenario.steps = run.steps().to_vec();
        scenario.duration_ms = started.elapsed().as_millis() as u64;
        scenario
    }
}
