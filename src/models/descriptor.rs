use serde::{Deserialize, Serialize};

use crate::models::{HttpMethod, LifecycleStep};

fn default_id_path() -> String {
    "$.id".to_string()
}

fn default_update_method() -> HttpMethod {
    HttpMethod::Put
}

/// Status codes expected at each lifecycle step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpectedStatuses {
    pub create: u16,
    pub read: u16,
    pub update: u16,
    pub delete: u16,
    pub read_after_delete: u16,
}

impl Default for ExpectedStatuses {
    fn default() -> Self {
        Self {
            create: 201,
            read: 200,
            update: 200,
            delete: 204,
            read_after_delete: 404,
        }
    }
}

impl ExpectedStatuses {
    pub fn for_step(&self, step: LifecycleStep) -> u16 {
        match step {
            LifecycleStep::Create => self.create,
            LifecycleStep::Read => self.read,
            LifecycleStep::Update => self.update,
            LifecycleStep::Delete => self.delete,
            LifecycleStep::VerifyGone => self.read_after_delete,
        }
    }
}

/// What to create, how to change it, and how to find it again
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Collection path relative to the API base URL, e.g. `/users`
    pub collection_path: String,
    /// Create payload; string values may carry `{{placeholders}}`
    pub create_payload: serde_json::Value,
    pub update_payload: serde_json::Value,
    #[serde(default = "default_update_method")]
    pub update_method: HttpMethod,
    /// JSONPath locating the new resource's identifier in the create response.
    /// Must match exactly one scalar.
    #[serde(default = "default_id_path")]
    pub id_path: String,
    #[serde(default)]
    pub expected: ExpectedStatuses,
    /// Require the read-back body to echo every create-payload field
    #[serde(default)]
    pub echo_check: bool,
}

impl ResourceDescriptor {
    pub fn new(
        collection_path: impl Into<String>,
        create_payload: serde_json::Value,
        update_payload: serde_json::Value,
    ) -> Self {
        Self {
            collection_path: collection_path.into(),
            create_payload,
            update_payload,
            update_method: default_update_method(),
            id_path: default_id_path(),
            expected: ExpectedStatuses::default(),
            echo_check: false,
        }
    }

    pub fn with_update_method(mut self, method: HttpMethod) -> Self {
        self.update_method = method;
        self
    }

    pub fn with_id_path(mut self, id_path: impl Into<String>) -> Self {
        self.id_path = id_path.into();
        self
    }

    pub fn with_expected(mut self, expected: ExpectedStatuses) -> Self {
        self.expected = expected;
        self
    }

    pub fn with_echo_check(mut self, enabled: bool) -> Self {
        self.echo_check = enabled;
        self
    }

    pub fn collection_url(&self) -> String {
        let path = self.collection_path.trim_end_matches('/');
        if path.is_empty() {
            "/".to_string()
        } else {
            path.to_string()
        }
    }

    /// Item path with `id` percent-encoded as a single segment
    pub fn item_url(&self, id: &str) -> String {
        format!(
            "{}/{}",
            self.collection_path.trim_end_matches('/'),
            encode_segment(id)
        )
    }
}

// byte_serialize writes spaces as `+`, which a path keeps literally
fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
