pub mod api_context;
pub mod assertions;
pub mod check_runner;
pub mod credential;
pub mod http_client;
pub mod lifecycle;
pub mod registry;
pub mod reporter;
pub mod template;

pub use api_context::ApiContext;
pub use assertions::{
    assert_body_contains, assert_json_path, assert_json_subset, assert_schema, assert_status,
    check_json_path, json_contains, query_json_path, JsonPathMatches, SchemaReport, SchemaStore,
    SchemaValidator,
};
pub use check_runner::ChecksScenario;
pub use credential::{basic_auth_header, Credential, OAuth2ClientCredentials};
pub use http_client::{ClientConfig, HttpClient};
pub use lifecycle::{LifecycleRun, LifecycleRunner, LifecycleScenario, RunStop, StepFailure};
pub use registry::{CancelSignal, Scenario, ScenarioRegistry};
pub use reporter::{render_summary, write_json_report};
pub use template::TemplateVars;
