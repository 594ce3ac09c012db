use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::ConfigError;
use crate::error::{HarnessError, HarnessResult};
use crate::models::{CredentialSpec, RequestSpec};
use crate::services::HttpClient;

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Longest lifetime honoured from `expires_in`; larger values are clamped
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(365 * 24 * 3600);

/// Build a `Basic` authorization header value
pub fn basic_auth_header(username: &str, password: &str) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", username, password))
    )
}

/// How requests to an API are authorized. Shared across scenarios via `Arc`.
pub enum Credential {
    None,
    /// Sent as `Bearer <token>`, fixed for the process lifetime
    StaticToken(String),
    Basic { username: String, password: String },
    OAuth2ClientCredentials(OAuth2ClientCredentials),
}

impl Credential {
    /// Resolve a suite credential reference, reading secrets through `lookup`
    pub fn from_spec<F>(
        spec: &CredentialSpec,
        lookup: F,
        token_client: &HttpClient,
        expiry_skew: Duration,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, ConfigError>,
    {
        let credential = match spec {
            CredentialSpec::None => Credential::None,
            CredentialSpec::Bearer { token_env } => Credential::StaticToken(lookup(token_env)?),
            CredentialSpec::Basic {
                username_env,
                password_env,
            } => Credential::Basic {
                username: lookup(username_env)?,
                password: lookup(password_env)?,
            },
            CredentialSpec::OAuth2ClientCredentials {
                client_id_env,
                client_secret_env,
                token_endpoint,
            } => Credential::OAuth2ClientCredentials(
                OAuth2ClientCredentials::new(
                    lookup(client_id_env)?,
                    lookup(client_secret_env)?,
                    token_endpoint.clone(),
                    token_client.clone(),
                )
                .with_expiry_skew(expiry_skew),
            ),
        };

        Ok(credential)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::StaticToken(_) => "bearer",
            Self::Basic { .. } => "basic",
            Self::OAuth2ClientCredentials(_) => "oauth2_client_credentials",
        }
    }

    /// Return a copy of `spec` carrying an `Authorization` header.
    /// The OAuth2 variant may perform a token exchange first.
    pub async fn authorize(&self, spec: RequestSpec) -> HarnessResult<RequestSpec> {
        match self {
            Self::None => Ok(spec),
            Self::StaticToken(token) => {
                Ok(spec.with_header("authorization", format!("Bearer {}", token)))
            }
            Self::Basic { username, password } => {
                Ok(spec.with_header("authorization", basic_auth_header(username, password)))
            }
            Self::OAuth2ClientCredentials(oauth) => {
                let token = oauth.access_token().await?;
                Ok(spec.with_header("authorization", format!("Bearer {}", token)))
            }
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("Credential::None"),
            Self::StaticToken(_) => f.write_str("Credential::StaticToken(<redacted>)"),
            Self::Basic { username, .. } => f
                .debug_struct("Credential::Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::OAuth2ClientCredentials(oauth) => fmt::Debug::fmt(oauth, f),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_usable(&self, skew: Duration) -> bool {
        Instant::now()
            .checked_add(skew)
            .is_some_and(|deadline| deadline < self.expires_at)
    }
}

/// OAuth2 client-credentials grant with a cached access token
pub struct OAuth2ClientCredentials {
    client_id: String,
    client_secret: String,
    token_endpoint: String,
    client: HttpClient,
    expiry_skew: Duration,
    /// Held for the whole exchange, so concurrent callers share one refresh
    cache: Mutex<Option<CachedToken>>,
    exchanges: AtomicU64,
}

impl OAuth2ClientCredentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_endpoint: impl Into<String>,
        client: HttpClient,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_endpoint: token_endpoint.into(),
            client,
            expiry_skew: Duration::ZERO,
            cache: Mutex::new(None),
            exchanges: AtomicU64::new(0),
        }
    }

    /// Treat tokens as expired this long before their reported expiry
    pub fn with_expiry_skew(mut self, skew: Duration) -> Self {
        self.expiry_skew = skew;
        self
    }

    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    /// Number of token exchanges performed so far
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::SeqCst)
    }

    /// Cached token if still valid, otherwise a freshly exchanged one
    pub async fn access_token(&self) -> HarnessResult<String> {
        let mut cache = self.cache.lock().await;

        if let Some(token) = cache.as_ref() {
            if token.is_usable(self.expiry_skew) {
                return Ok(token.access_token.clone());
            }
            tracing::debug!(endpoint = %self.token_endpoint, "Cached access token expired");
        }

        let fresh = self.exchange().await?;
        let access_token = fresh.access_token.clone();
        *cache = Some(fresh);
        Ok(access_token)
    }

    /// Force a token exchange regardless of the cached token
    pub async fn refresh(&self) -> HarnessResult<String> {
        let mut cache = self.cache.lock().await;
        let fresh = self.exchange().await?;
        let access_token = fresh.access_token.clone();
        *cache = Some(fresh);
        Ok(access_token)
    }

    async fn exchange(&self) -> HarnessResult<CachedToken> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);

        let spec = RequestSpec::post(self.token_endpoint.clone())
            .with_header(
                "authorization",
                basic_auth_header(&self.client_id, &self.client_secret),
            )
            .with_header("content-type", "application/x-www-form-urlencoded")
            .with_form([
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ]);

        let response = self.client.send(&spec).await?;

        if response.status() != 200 {
            return Err(HarnessError::Auth(format!(
                "token endpoint {} returned status {}",
                self.token_endpoint,
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .and_then(|value| Ok(serde_json::from_value(value.clone())?))
            .map_err(|e| HarnessError::Auth(format!("unreadable token response: {}", e)))?;

        let access_token = body
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| HarnessError::Auth("token response has no access_token".to_string()))?;

        let lifetime = body
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME)
            .min(MAX_TOKEN_LIFETIME);

        tracing::info!(
            endpoint = %self.token_endpoint,
            expires_in_secs = lifetime.as_secs(),
            "Obtained OAuth2 access token"
        );

        let expires_at = Instant::now()
            .checked_add(lifetime)
            .ok_or_else(|| HarnessError::Auth("expires_in out of range".to_string()))?;

        Ok(CachedToken {
            access_token,
            expires_at,
        })
    }
}

impl fmt::Debug for OAuth2ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2ClientCredentials")
            .field("client_id", &self.client_id)
            .field("token_endpoint", &self.token_endpoint)
            .field("expiry_skew", &self.expiry_skew)
            .finish_non_exhaustive()
    }
}
