use std::sync::Arc;

use crate::error::HarnessResult;
use crate::models::{RequestSpec, ResponseRecord};
use crate::services::{Credential, HttpClient};

/// One target API: its client plus the credential shared by every scenario using it
#[derive(Debug, Clone)]
pub struct ApiContext {
    pub name: String,
    pub client: HttpClient,
    pub credential: Arc<Credential>,
}

impl ApiContext {
    pub fn new(name: impl Into<String>, client: HttpClient, credential: Arc<Credential>) -> Self {
        Self {
            name: name.into(),
            client,
            credential,
        }
    }

    /// Context without credentials
    pub fn anonymous(name: impl Into<String>, client: HttpClient) -> Self {
        Self::new(name, client, Arc::new(Credential::None))
    }

    /// Send `spec`, attaching the credential first
    pub async fn send(&self, spec: RequestSpec) -> HarnessResult<ResponseRecord> {
        let spec = self.credential.authorize(spec).await?;
        self.client.send(&spec).await
    }

    /// Send `spec` as is, without the credential
    pub async fn send_anonymous(&self, spec: RequestSpec) -> HarnessResult<ResponseRecord> {
        self.client.send(&spec).await
    }
}
