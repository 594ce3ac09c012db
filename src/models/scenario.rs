use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::error::{HarnessError, HarnessResult};
use crate::models::{Headers, HttpMethod, ResourceDescriptor};

fn default_true() -> bool {
    true
}

fn default_method() -> HttpMethod {
    HttpMethod::Get
}

fn default_expect_status() -> u16 {
    200
}

/// A suite file: named API targets plus the scenarios that run against them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteDefinition {
    #[serde(default)]
    pub apis: BTreeMap<String, ApiTarget>,
    pub scenarios: Vec<ScenarioDefinition>,
}

impl SuiteDefinition {
    pub fn from_json_str(json: &str) -> HarnessResult<Self> {
        let suite: SuiteDefinition = serde_json::from_str(json)
            .map_err(|e| HarnessError::Config(format!("Invalid suite definition: {}", e)))?;
        suite.validate()?;
        Ok(suite)
    }

    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Config(format!("Cannot read suite {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Structural checks that serde cannot express
    pub fn validate(&self) -> HarnessResult<()> {
        let mut names = HashSet::new();

        for scenario in &self.scenarios {
            if !names.insert(scenario.name.as_str()) {
                return Err(HarnessError::Config(format!(
                    "Duplicate scenario name: {}",
                    scenario.name
                )));
            }

            if !self.apis.contains_key(&scenario.api) {
                return Err(HarnessError::Config(format!(
                    "Scenario '{}' references unknown API '{}'",
                    scenario.name, scenario.api
                )));
            }

            if let ScenarioPlan::Checks { steps } = &scenario.plan {
                if steps.is_empty() {
                    return Err(HarnessError::Config(format!(
                        "Scenario '{}' has no steps",
                        scenario.name
                    )));
                }
                for step in steps {
                    if step.body.is_some() && step.form.is_some() {
                        return Err(HarnessError::Config(format!(
                            "Step '{}' of scenario '{}' sets both body and form",
                            step.label(),
                            scenario.name
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Schema names referenced by any check step, deduplicated
    pub fn referenced_schemas(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.scenarios
            .iter()
            .filter_map(|scenario| match &scenario.plan {
                ScenarioPlan::Checks { steps } => Some(steps),
                ScenarioPlan::Lifecycle { .. } => None,
            })
            .flatten()
            .filter_map(|step| step.schema.clone())
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }
}

/// An API the suite talks to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTarget {
    pub base_url: String,
    /// Default headers sent with every request to this API
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub credential: CredentialSpec,
    /// Overrides the run-wide request timeout
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Credential reference; secrets are named by environment variable, never inlined
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialSpec {
    #[default]
    None,
    Bearer {
        token_env: String,
    },
    Basic {
        username_env: String,
        password_env: String,
    },
    #[serde(rename = "oauth2_client_credentials")]
    OAuth2ClientCredentials {
        client_id_env: String,
        client_secret_env: String,
        token_endpoint: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub name: String,
    /// Key into `SuiteDefinition::apis`
    pub api: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub plan: ScenarioPlan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioPlan {
    /// Full create/read/update/delete/verify-gone run
    Lifecycle {
        resource: ResourceDescriptor,
        /// Delete the created resource when a later step fails
        #[serde(default)]
        cleanup_on_failure: bool,
    },
    /// Ordered single requests, each with its own expectations
    Checks { steps: Vec<CheckStep> },
}

/// One request plus the assertions to run on its response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckStep {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_method")]
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    #[serde(default)]
    pub form: Option<BTreeMap<String, String>>,
    /// Attach the API credential; false sends the request anonymously
    #[serde(default = "default_true")]
    pub authorize: bool,
    #[serde(default = "default_expect_status")]
    pub expect_status: u16,
    /// Schema file name under the schema directory
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub json_path: Vec<JsonPathExpectation>,
    #[serde(default)]
    pub body_contains: Vec<String>,
    /// Every field here must appear in the response body with an equal value
    #[serde(default)]
    pub body_subset: Option<serde_json::Value>,
}

impl CheckStep {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            name: None,
            method,
            path: path.into(),
            headers: Headers::new(),
            body: None,
            form: None,
            authorize: true,
            expect_status: default_expect_status(),
            schema: None,
            json_path: Vec::new(),
            body_contains: Vec::new(),
            body_subset: None,
        }
    }

    /// Name used in reports: explicit name, else "METHOD path"
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.method, self.path))
    }
}

/// Expectation on the matches of one JSONPath query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonPathExpectation {
    pub path: String,
    /// Exact number of matches
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub min_count: Option<usize>,
    /// The whole match sequence, in order
    #[serde(default)]
    pub equals: Option<Vec<serde_json::Value>>,
    /// Every match must equal this value
    #[serde(default)]
    pub each: Option<serde_json::Value>,
}
