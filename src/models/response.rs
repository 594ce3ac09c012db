use serde::Serialize;
use std::sync::OnceLock;
use std::time::Duration;
use time::OffsetDateTime;

use crate::error::{HarnessError, HarnessResult};
use crate::models::Headers;

/// Longest body excerpt kept in reports
const EXCERPT_LIMIT: usize = 2048;

/// Response to one request. Status is data: non-2xx responses are records too.
#[derive(Debug)]
pub struct ResponseRecord {
    status: u16,
    headers: Headers,
    body: Vec<u8>,
    parsed: OnceLock<Result<serde_json::Value, String>>,
    elapsed: Duration,
    request_time: OffsetDateTime,
}

impl ResponseRecord {
    pub fn new(status: u16, headers: Headers, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
            parsed: OnceLock::new(),
            elapsed: Duration::ZERO,
            request_time: OffsetDateTime::now_utc(),
        }
    }

    pub fn with_timing(mut self, request_time: OffsetDateTime, elapsed: Duration) -> Self {
        self.request_time = request_time;
        self.elapsed = elapsed;
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn request_time(&self) -> OffsetDateTime {
        self.request_time
    }

    /// Structured body, parsed on first access and cached. An empty body is `null`.
    pub fn json(&self) -> HarnessResult<&serde_json::Value> {
        let parsed = self.parsed.get_or_init(|| {
            if self.body.iter().all(|b| b.is_ascii_whitespace()) {
                return Ok(serde_json::Value::Null);
            }
            serde_json::from_slice(&self.body).map_err(|e| e.to_string())
        });

        parsed
            .as_ref()
            .map_err(|reason| HarnessError::InvalidBody(reason.clone()))
    }

    /// Snapshot kept in step outcomes and reports
    pub fn capture(&self) -> CapturedResponse {
        let body = match self.json() {
            Ok(value) => CapturedBody::Json(value.clone()),
            Err(_) => {
                let mut text = self.text();
                if text.len() > EXCERPT_LIMIT {
                    let mut cut = EXCERPT_LIMIT;
                    while !text.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    text.truncate(cut);
                    text.push_str("...");
                }
                CapturedBody::Text(text)
            }
        };

        CapturedResponse {
            status: self.status,
            body,
            duration_ms: self.elapsed.as_millis() as u64,
            request_time: self.request_time,
        }
    }
}

/// Serializable copy of the parts of a response worth reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedResponse {
    pub status: u16,
    pub body: CapturedBody,
    pub duration_ms: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub request_time: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CapturedBody {
    Json(serde_json::Value),
    Text(String),
}
