use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;

use crate::config::{Config, ConfigError};
use crate::error::{HarnessError, HarnessResult};
use crate::models::{
    RunReport, ScenarioOutcome, ScenarioPlan, ScenarioResult, SuiteDefinition,
};
use crate::services::{
    ApiContext, ChecksScenario, ClientConfig, Credential, HttpClient, LifecycleScenario,
    SchemaStore,
};

/// A named unit of work the registry can run.
///
/// Implementations must turn every failure into a `ScenarioResult`; nothing
/// is returned as an error so one scenario cannot stop the others.
#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> &str;

    fn tags(&self) -> &[String];

    /// Run to completion, checking `cancel` between steps
    async fn run(&self, cancel: &CancelSignal) -> ScenarioResult;
}

/// Read side of a shutdown request; checked between steps, never mid-request
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Named scenarios, run independently of each other
#[derive(Default)]
pub struct ScenarioRegistry {
    scenarios: Vec<Arc<dyn Scenario>>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every scenario of a suite.
    ///
    /// One credential is created per API and shared by all scenarios that
    /// target it, so an OAuth2 token is exchanged once per lifetime.
    pub fn from_suite<F>(
        suite: &SuiteDefinition,
        config: &Config,
        schemas: Arc<SchemaStore>,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, ConfigError>,
    {
        let mut apis: HashMap<&str, Arc<ApiContext>> = HashMap::new();

        for (name, target) in &suite.apis {
            let timeout = target
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.timeout());

            let client_config = ClientConfig::new(timeout)
                .with_base_url(target.base_url.clone())
                .with_default_headers(target.headers.clone());
            let client = HttpClient::new(client_config).map_err(|e| ConfigError::InvalidApi {
                api: name.clone(),
                reason: e.to_string(),
            })?;

            // Token exchanges go to an absolute endpoint, without the API's default headers
            let token_client = HttpClient::new(ClientConfig::new(timeout)).map_err(|e| {
                ConfigError::InvalidApi {
                    api: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            let credential = Credential::from_spec(
                &target.credential,
                &lookup,
                &token_client,
                config.token_skew(),
            )?;

            tracing::debug!(api = %name, credential = credential.kind(), "Configured API target");
            apis.insert(
                name.as_str(),
                Arc::new(ApiContext::new(name.clone(), client, Arc::new(credential))),
            );
        }

        let mut registry = Self::new();
        for definition in &suite.scenarios {
            let api = apis
                .get(definition.api.as_str())
                .cloned()
                .ok_or_else(|| ConfigError::UnknownApi {
                    scenario: definition.name.clone(),
                    api: definition.api.clone(),
                })?;

            match &definition.plan {
                ScenarioPlan::Lifecycle {
                    resource,
                    cleanup_on_failure,
                } => registry.register(
                    LifecycleScenario::new(definition.name.clone(), api, resource.clone())
                        .with_tags(definition.tags.clone())
                        .with_cleanup_on_failure(*cleanup_on_failure),
                ),
                ScenarioPlan::Checks { steps } => registry.register(
                    ChecksScenario::new(
                        definition.name.clone(),
                        api,
                        steps.clone(),
                        schemas.clone(),
                    )
                    .with_tags(definition.tags.clone()),
                ),
            }
        }

        Ok(registry)
    }

    pub fn register<S: Scenario + 'static>(&mut self, scenario: S) {
        self.scenarios.push(Arc::new(scenario));
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.scenarios.iter().map(|s| s.name()).collect()
    }

    /// Keep scenarios whose name contains `pattern`
    pub fn filter_name(mut self, pattern: &str) -> Self {
        self.scenarios.retain(|s| s.name().contains(pattern));
        self
    }

    /// Keep scenarios carrying `tag`
    pub fn filter_tag(mut self, tag: &str) -> Self {
        self.scenarios
            .retain(|s| s.tags().iter().any(|t| t == tag));
        self
    }

    /// Run every scenario, at most `workers` at a time.
    ///
    /// Results keep registration order. A panicking scenario is reported as
    /// failed; scenarios not started before cancellation are reported as
    /// cancelled.
    pub async fn run(&self, workers: usize, cancel: CancelSignal) -> HarnessResult<RunReport> {
        if workers == 0 {
            return Err(HarnessError::Config("workers must be at least 1".to_string()));
        }

        let started_at = OffsetDateTime::now_utc();
        tracing::info!(scenarios = self.scenarios.len(), workers, "Starting run");

        let mut results: Vec<(usize, ScenarioResult)> = stream::iter(
            self.scenarios.iter().cloned().enumerate(),
        )
        .map(|(index, scenario)| {
            let cancel = cancel.clone();
            async move {
                let name = scenario.name().to_string();
                if cancel.is_cancelled() {
                    return (
                        index,
                        ScenarioResult::aborted(name, ScenarioOutcome::Cancelled, "cancelled before start"),
                    );
                }

                tracing::info!(scenario = %name, "Scenario started");
                let handle = tokio::spawn(async move { scenario.run(&cancel).await });
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(scenario = %name, error = %e, "Scenario task failed");
                        ScenarioResult::aborted(
                            name.clone(),
                            ScenarioOutcome::Failed,
                            format!("scenario task failed: {}", e),
                        )
                    }
                };

                tracing::info!(
                    scenario = %name,
                    outcome = result.outcome.as_str(),
                    duration_ms = result.duration_ms,
                    "Scenario finished"
                );
                (index, result)
            }
        })
        .buffer_unordered(workers)
        .collect()
        .await;

        results.sort_by_key(|(index, _)| *index);
        let scenarios = results.into_iter().map(|(_, result)| result).collect();

        let report = RunReport::new(started_at, OffsetDateTime::now_utc(), scenarios);
        tracing::info!(
            total = report.total,
            passed = report.passed,
            failed = report.failed,
            cancelled = report.cancelled,
            "Run complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: String,
        tags: Vec<String>,
        outcome: ScenarioOutcome,
    }

    impl Fixed {
        fn new(name: &str, tags: &[&str], outcome: ScenarioOutcome) -> Self {
            Self {
                name: name.to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                outcome,
            }
        }
    }

    #[async_trait]
    impl Scenario for Fixed {
        fn name(&self) -> &str {
            &self.name
        }

        fn tags(&self) -> &[String] {
            &self.tags
        }

        async fn run(&self, _cancel: &CancelSignal) -> ScenarioResult {
            let mut result = ScenarioResult::new(self.name.clone());
            result.outcome = self.outcome;
            result
        }
    }

    struct Panics;

    #[async_trait]
    impl Scenario for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        fn tags(&self) -> &[String] {
            &[]
        }

        async fn run(&self, _cancel: &CancelSignal) -> ScenarioResult {
            panic!("scenario blew up")
        }
    }

    #[tokio::test]
    async fn test_results_keep_registration_order() {
        let mut registry = ScenarioRegistry::new();
        for i in 0..8 {
            registry.register(Fixed::new(&format!("s{}", i), &[], ScenarioOutcome::Passed));
        }

        let report = registry.run(3, CancelSignal::never()).await.unwrap();
        let names: Vec<_> = report.scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7"]);
        assert!(report.all_passed());
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let mut registry = ScenarioRegistry::new();
        registry.register(Fixed::new("before", &[], ScenarioOutcome::Passed));
        registry.register(Panics);
        registry.register(Fixed::new("after", &[], ScenarioOutcome::Passed));

        let report = registry.run(2, CancelSignal::never()).await.unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.passed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.scenarios[1].outcome, ScenarioOutcome::Failed);
        assert!(!report.all_passed());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let mut registry = ScenarioRegistry::new();
        registry.register(Fixed::new("a", &[], ScenarioOutcome::Passed));
        registry.register(Fixed::new("b", &[], ScenarioOutcome::Passed));

        let report = registry.run(1, CancelSignal::new(rx)).await.unwrap();
        assert_eq!(report.cancelled, 2);
        assert_eq!(report.passed, 0);
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let registry = ScenarioRegistry::new();
        let err = registry.run(0, CancelSignal::never()).await.unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_filters() {
        let mut registry = ScenarioRegistry::new();
        registry.register(Fixed::new("gorest crud", &["gorest", "crud"], ScenarioOutcome::Passed));
        registry.register(Fixed::new("gorest list", &["gorest"], ScenarioOutcome::Passed));
        registry.register(Fixed::new("fakestore products", &["jsonpath"], ScenarioOutcome::Passed));

        let by_tag = registry.filter_tag("crud");
        assert_eq!(by_tag.names(), vec!["gorest crud"]);

        let mut registry = ScenarioRegistry::new();
        registry.register(Fixed::new("gorest crud", &[], ScenarioOutcome::Passed));
        registry.register(Fixed::new("fakestore products", &[], ScenarioOutcome::Passed));
        assert_eq!(registry.filter_name("fakestore").names(), vec!["fakestore products"]);
    }
}
