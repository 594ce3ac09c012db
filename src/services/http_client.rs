use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use url::Url;

use crate::error::{HarnessError, HarnessResult};
use crate::models::{Headers, RequestBody, RequestSpec, ResponseRecord};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Configuration for an HTTP client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Prefix for relative request URLs
    pub base_url: Option<String>,
    pub timeout: Duration,
    /// Sent with every request unless the request sets the same header
    pub default_headers: Headers,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            default_headers: Headers::new(),
        }
    }
}

impl ClientConfig {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_default_headers(mut self, headers: Headers) -> Self {
        self.default_headers = headers;
        self
    }
}

/// Uniform request/response adapter over reqwest. Never retries.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: ClientConfig,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> HarnessResult<Self> {
        if config.timeout.is_zero() {
            return Err(HarnessError::Config(
                "HTTP client timeout must be greater than zero".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| HarnessError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Absolute URLs pass through; paths are appended to the base URL
    pub fn resolve_url(&self, url: &str) -> HarnessResult<Url> {
        if let Ok(absolute) = Url::parse(url) {
            return Ok(absolute);
        }

        let base = self.config.base_url.as_deref().ok_or_else(|| {
            HarnessError::InvalidRequest(format!("Relative URL '{}' without a base URL", url))
        })?;

        let joined = format!(
            "{}/{}",
            base.trim_end_matches('/'),
            url.trim_start_matches('/')
        );
        Url::parse(&joined)
            .map_err(|e| HarnessError::InvalidRequest(format!("Invalid URL '{}': {}", joined, e)))
    }

    /// Execute a request. Fails only on transport problems, never on status.
    pub async fn send(&self, spec: &RequestSpec) -> HarnessResult<ResponseRecord> {
        let url = self.resolve_url(spec.url())?;
        let mut headers = build_headers(&self.config.default_headers.merged_with(spec.headers()))?;

        let mut request = self.client.request(spec.method().into(), url.clone());

        match spec.body() {
            Some(RequestBody::Json(body)) => {
                request = request.json(body);
            }
            Some(RequestBody::Form(fields)) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
                }
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields.iter())
                    .finish();
                request = request.body(encoded);
            }
            None => {}
        }

        // Explicit headers go last so they win over anything the body helpers set
        request = request.headers(headers);

        tracing::debug!(method = %spec.method(), url = %url, "Sending request");

        let request_time = OffsetDateTime::now_utc();
        let start = Instant::now();

        let response = request.send().await.map_err(|e| {
            tracing::warn!(method = %spec.method(), url = %url, error = %e, "Request failed");
            HarnessError::from(e)
        })?;

        let status = response.status().as_u16();
        let response_headers: Headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        let body = response.bytes().await.map_err(HarnessError::from)?.to_vec();
        let elapsed = start.elapsed();

        tracing::debug!(
            method = %spec.method(),
            url = %url,
            status = status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Received response"
        );

        Ok(ResponseRecord::new(status, response_headers, body).with_timing(request_time, elapsed))
    }
}

/// Convert harness headers into a reqwest header map
pub fn build_headers(input: &Headers) -> HarnessResult<HeaderMap> {
    let mut headers = HeaderMap::new();

    for (key, value) in input.iter() {
        if key.is_empty() {
            continue;
        }

        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|err| {
            HarnessError::InvalidRequest(format!("Invalid header name `{key}`: {err}"))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|err| {
            HarnessError::InvalidRequest(format!("Invalid header value for `{key}`: {err}"))
        })?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}
