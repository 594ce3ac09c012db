use std::collections::BTreeMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// Values for `{{name}}` placeholders in payload templates.
///
/// Built-ins, fixed for the lifetime of one instance so a create payload and
/// the checks made against it agree:
/// - `timestamp`: milliseconds since the Unix epoch
/// - `uuid`: a random v4 UUID
#[derive(Debug, Clone)]
pub struct TemplateVars {
    values: BTreeMap<String, String>,
}

impl TemplateVars {
    pub fn new() -> Self {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;

        let mut values = BTreeMap::new();
        values.insert("timestamp".to_string(), millis.to_string());
        values.insert("uuid".to_string(), Uuid::new_v4().to_string());

        Self { values }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|value| value.as_str())
    }

    /// Substitute `{{key}}` occurrences; unknown placeholders are left alone
    pub fn substitute(&self, text: &str) -> String {
        let mut result = text.to_string();

        for (key, value) in &self.values {
            let placeholder = format!("{{{{{}}}}}", key);
            result = result.replace(&placeholder, value);
        }

        result
    }

    /// Render every string in a JSON template, recursively
    pub fn render(&self, template: &serde_json::Value) -> serde_json::Value {
        match template {
            serde_json::Value::String(s) => serde_json::Value::String(self.substitute(s)),
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(|item| self.render(item)).collect())
            }
            serde_json::Value::Object(obj) => serde_json::Value::Object(
                obj.iter()
                    .map(|(key, value)| (key.clone(), self.render(value)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl Default for TemplateVars {
    fn default() -> Self {
        Self::new()
    }
}
