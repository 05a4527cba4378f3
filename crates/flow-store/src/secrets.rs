use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use thiserror::Error;

use crate::ambient::{AmbientCredentials, AmbientError};
use crate::http::{build_retry_client, RetryClient};

pub const SECRET_MANAGER_URL: &str = "https://secretmanager.googleapis.com/v1";

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("secret '{0}' not found")]
    NotFound(String),

    #[error("secret store unreachable: {0}")]
    Unreachable(String),

    #[error("secret store returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid secret payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Ambient(#[from] AmbientError),
}

/// Resource path of the newest version of a secret.
pub fn latest_version_path(project: &str, secret_name: &str) -> String {
    format!("projects/{project}/secrets/{secret_name}/versions/latest")
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the payload at a full version path, `None` if it does not exist.
    async fn access(&self, version_path: &str) -> Result<Option<String>, SecretStoreError>;
}

/// Google Secret Manager over REST.
pub struct SecretManagerClient {
    client: RetryClient,
    base_url: String,
    auth: Arc<dyn AmbientCredentials>,
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    data: String,
}

impl SecretManagerClient {
    pub fn new(auth: Arc<dyn AmbientCredentials>) -> Self {
        Self {
            client: build_retry_client(),
            base_url: SECRET_MANAGER_URL.to_string(),
            auth,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client(mut self, client: RetryClient) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl SecretStore for SecretManagerClient {
    async fn access(&self, version_path: &str) -> Result<Option<String>, SecretStoreError> {
        let token = self.auth.access_token().await?;
        let url = format!("{}/{}:access", self.base_url, version_path);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| SecretStoreError::Unreachable(err.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SecretStoreError::Status {
                status: status.as_u16(),
                message: message.trim().to_string(),
            });
        }

        let body: AccessResponse = response
            .json()
            .await
            .map_err(|err| SecretStoreError::InvalidPayload(err.to_string()))?;
        let bytes = STANDARD
            .decode(body.payload.data.as_bytes())
            .map_err(|err| SecretStoreError::InvalidPayload(err.to_string()))?;
        let value = String::from_utf8(bytes)
            .map_err(|err| SecretStoreError::InvalidPayload(err.to_string()))?;

        Ok(Some(value))
    }
}

/// Secrets keyed by full version path.
#[derive(Debug, Default, Clone)]
pub struct InMemorySecretStore {
    secrets: HashMap<String, String>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(
        mut self,
        project: &str,
        secret_name: &str,
        value: impl Into<String>,
    ) -> Self {
        self.secrets
            .insert(latest_version_path(project, secret_name), value.into());
        self
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn access(&self, version_path: &str) -> Result<Option<String>, SecretStoreError> {
        Ok(self.secrets.get(version_path).cloned())
    }
}
