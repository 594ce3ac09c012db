use jsonpath_rust::{JsonPath, JsonPathValue};
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{HarnessError, HarnessResult, SchemaViolation};
use crate::models::{JsonPathExpectation, ResponseRecord};

// ============ Status ============

pub fn assert_status(record: &ResponseRecord, expected: u16) -> HarnessResult<()> {
    if record.status() == expected {
        Ok(())
    } else {
        Err(HarnessError::assertion("status", expected, record.status()))
    }
}

// ============ Body ============

pub fn assert_body_contains(record: &ResponseRecord, needle: &str) -> HarnessResult<()> {
    let body = record.text();
    if body.contains(needle) {
        Ok(())
    } else {
        Err(HarnessError::assertion(
            "body",
            format!("to contain {:?}", needle),
            excerpt(&body),
        ))
    }
}

/// Every field of `expected` must be present in `actual` with an equal value.
/// Arrays match when each expected item matches some actual item.
pub fn json_contains(actual: &serde_json::Value, expected: &serde_json::Value) -> bool {
    first_mismatch(actual, expected, String::new()).is_none()
}

pub fn assert_json_subset(
    actual: &serde_json::Value,
    expected: &serde_json::Value,
) -> HarnessResult<()> {
    match first_mismatch(actual, expected, String::new()) {
        None => Ok(()),
        Some(mismatch) => Err(HarnessError::assertion(
            format!("body at '{}'", mismatch.pointer),
            mismatch.expected,
            mismatch.actual,
        )),
    }
}

struct Mismatch {
    pointer: String,
    expected: String,
    actual: String,
}

fn first_mismatch(
    actual: &serde_json::Value,
    expected: &serde_json::Value,
    pointer: String,
) -> Option<Mismatch> {
    match (actual, expected) {
        (serde_json::Value::Object(actual_obj), serde_json::Value::Object(expected_obj)) => {
            expected_obj.iter().find_map(|(key, expected_value)| {
                let child = format!("{}/{}", pointer, key);
                match actual_obj.get(key) {
                    Some(actual_value) => first_mismatch(actual_value, expected_value, child),
                    None => Some(Mismatch {
                        pointer: child,
                        expected: expected_value.to_string(),
                        actual: "<missing>".to_string(),
                    }),
                }
            })
        }
        (serde_json::Value::Array(actual_arr), serde_json::Value::Array(expected_arr)) => {
            expected_arr.iter().find_map(|expected_item| {
                let found = actual_arr
                    .iter()
                    .any(|actual_item| json_contains(actual_item, expected_item));
                (!found).then(|| Mismatch {
                    pointer: pointer.clone(),
                    expected: format!("an element matching {}", expected_item),
                    actual: excerpt(&actual.to_string()),
                })
            })
        }
        _ if actual == expected => None,
        _ => Some(Mismatch {
            pointer,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }),
    }
}

fn excerpt(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.len() <= LIMIT {
        return text.to_string();
    }
    let mut cut = LIMIT;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}

// ============ JSON Schema ============

/// Outcome of validating a body against a schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub valid: bool,
    /// Every violation, not just the first
    pub errors: Vec<SchemaViolation>,
}

impl SchemaReport {
    pub fn into_result(self) -> HarnessResult<()> {
        if self.valid {
            Ok(())
        } else {
            Err(HarnessError::SchemaValidation(self.errors))
        }
    }
}

/// A compiled JSON Schema document
pub struct SchemaValidator {
    name: String,
    validator: jsonschema::Validator,
}

impl SchemaValidator {
    pub fn compile(name: impl Into<String>, schema: &serde_json::Value) -> HarnessResult<Self> {
        let name = name.into();
        let validator = jsonschema::validator_for(schema).map_err(|e| HarnessError::Schema {
            name: name.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self { name, validator })
    }

    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let raw = std::fs::read_to_string(path)?;
        let schema: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| HarnessError::Schema {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        Self::compile(name, &schema)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn validate(&self, instance: &serde_json::Value) -> SchemaReport {
        let errors: Vec<SchemaViolation> = self
            .validator
            .iter_errors(instance)
            .map(|error| SchemaViolation {
                instance_path: error.instance_path.to_string(),
                message: error.to_string(),
            })
            .collect();

        SchemaReport {
            valid: errors.is_empty(),
            errors,
        }
    }
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Validate a response body. A body that is not JSON is reported as a violation.
pub fn assert_schema(record: &ResponseRecord, schema: &SchemaValidator) -> SchemaReport {
    match record.json() {
        Ok(body) => schema.validate(body),
        Err(e) => SchemaReport {
            valid: false,
            errors: vec![SchemaViolation {
                instance_path: String::new(),
                message: e.to_string(),
            }],
        },
    }
}

/// Schemas loaded from disk once at start, shared by every scenario
#[derive(Debug, Default, Clone)]
pub struct SchemaStore {
    schemas: HashMap<String, Arc<SchemaValidator>>,
}

impl SchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile each named file under `dir`
    pub fn load(dir: &Path, names: &[String]) -> HarnessResult<Self> {
        let mut store = Self::new();
        for name in names {
            let validator = SchemaValidator::from_file(&dir.join(name)).map_err(|e| match e {
                HarnessError::Io(io) => HarnessError::Schema {
                    name: name.clone(),
                    reason: io.to_string(),
                },
                other => other,
            })?;
            tracing::debug!(schema = %name, "Loaded JSON schema");
            store.insert(name.clone(), validator);
        }
        Ok(store)
    }

    pub fn insert(&mut self, name: impl Into<String>, validator: SchemaValidator) {
        self.schemas.insert(name.into(), Arc::new(validator));
    }

    pub fn get(&self, name: &str) -> Option<Arc<SchemaValidator>> {
        self.schemas.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

// ============ JSONPath ============

/// Matches of a JSONPath query over a response body.
///
/// Evaluation happens on iteration; every call to `iter` restarts from the
/// first match and yields the same sequence.
pub struct JsonPathMatches<'a> {
    expression: String,
    path: JsonPath,
    document: &'a serde_json::Value,
}

impl<'a> JsonPathMatches<'a> {
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn iter(&self) -> impl Iterator<Item = Cow<'_, serde_json::Value>> + '_ {
        self.path
            .find_slice(self.document)
            .into_iter()
            .filter_map(|found| match found {
                JsonPathValue::Slice(value, _) => Some(Cow::Borrowed(value)),
                JsonPathValue::NewValue(value) => Some(Cow::Owned(value)),
                JsonPathValue::NoValue => None,
            })
    }

    /// Owned copy of every match, in document order
    pub fn values(&self) -> Vec<serde_json::Value> {
        self.iter().map(Cow::into_owned).collect()
    }

    pub fn first(&self) -> Option<serde_json::Value> {
        self.iter().next().map(Cow::into_owned)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl fmt::Debug for JsonPathMatches<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonPathMatches")
            .field("expression", &self.expression)
            .field("values", &self.values())
            .finish()
    }
}

/// Query a JSON document. No match is an empty sequence, not an error.
pub fn query_json_path<'a>(
    document: &'a serde_json::Value,
    expression: &str,
) -> HarnessResult<JsonPathMatches<'a>> {
    let path: JsonPath = expression.parse().map_err(|e| HarnessError::JsonPath {
        path: expression.to_string(),
        reason: format!("{}", e),
    })?;

    Ok(JsonPathMatches {
        expression: expression.to_string(),
        path,
        document,
    })
}

/// Query the structured body of a response
pub fn assert_json_path<'a>(
    record: &'a ResponseRecord,
    expression: &str,
) -> HarnessResult<JsonPathMatches<'a>> {
    query_json_path(record.json()?, expression)
}

/// Check a declarative expectation; returns the number of matches
pub fn check_json_path(
    record: &ResponseRecord,
    expectation: &JsonPathExpectation,
) -> HarnessResult<usize> {
    let matches = assert_json_path(record, &expectation.path)?;
    let values = matches.values();
    let subject = format!("matches of {}", expectation.path);

    if let Some(count) = expectation.count {
        if values.len() != count {
            return Err(HarnessError::assertion(
                subject,
                format!("{} match(es)", count),
                format!("{} match(es)", values.len()),
            ));
        }
    }

    if let Some(min_count) = expectation.min_count {
        if values.len() < min_count {
            return Err(HarnessError::assertion(
                subject,
                format!("at least {} match(es)", min_count),
                format!("{} match(es)", values.len()),
            ));
        }
    }

    if let Some(expected) = &expectation.equals {
        if &values != expected {
            return Err(HarnessError::assertion(
                subject,
                serde_json::Value::Array(expected.clone()),
                serde_json::Value::Array(values),
            ));
        }
    }

    if let Some(each) = &expectation.each {
        if let Some(different) = values.iter().find(|value| *value != each) {
            return Err(HarnessError::assertion(
                subject,
                format!("every match to equal {}", each),
                different,
            ));
        }
    }

    Ok(values.len())
}
