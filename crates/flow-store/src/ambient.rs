//! Credentials supplied by the hosting platform itself.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::http::{build_retry_client, RetryClient};

pub const DEFAULT_METADATA_URL: &str = "http://metadata.google.internal";

const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const PROJECT_PATH: &str = "/computeMetadata/v1/project/project-id";

#[derive(Debug, Error)]
pub enum AmbientError {
    #[error("ambient credentials unavailable: {0}")]
    Unavailable(String),

    #[error("metadata server returned HTTP {status}")]
    Status { status: u16 },

    #[error("invalid metadata response: {0}")]
    InvalidResponse(String),
}

/// Platform identity available without any configured secret.
#[async_trait]
pub trait AmbientCredentials: Send + Sync {
    /// OAuth access token for Google APIs.
    async fn access_token(&self) -> Result<String, AmbientError>;

    async fn project_id(&self) -> Result<String, AmbientError>;
}

/// Reads the default service account from the GCE / Cloud Run metadata server.
pub struct MetadataServerCredentials {
    client: RetryClient,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl MetadataServerCredentials {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_METADATA_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: build_retry_client(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn with_client(mut self, client: RetryClient) -> Self {
        self.client = client;
        self
    }

    async fn get(&self, path: &str) -> Result<String, AmbientError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|err| AmbientError::Unavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AmbientError::Status {
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|err| AmbientError::InvalidResponse(err.to_string()))
    }
}

impl Default for MetadataServerCredentials {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AmbientCredentials for MetadataServerCredentials {
    async fn access_token(&self) -> Result<String, AmbientError> {
        let body = self.get(TOKEN_PATH).await?;
        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|err| AmbientError::InvalidResponse(err.to_string()))?;
        Ok(token.access_token)
    }

    async fn project_id(&self) -> Result<String, AmbientError> {
        let project = self.get(PROJECT_PATH).await?.trim().to_string();
        if project.is_empty() {
            return Err(AmbientError::InvalidResponse("empty project id".to_string()));
        }
        Ok(project)
    }
}

/// Fixed token and project, for local development and tests.
#[derive(Clone)]
pub struct StaticToken {
    token: String,
    project: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            project: project.into(),
        }
    }
}

#[async_trait]
impl AmbientCredentials for StaticToken {
    async fn access_token(&self) -> Result<String, AmbientError> {
        Ok(self.token.clone())
    }

    async fn project_id(&self) -> Result<String, AmbientError> {
        Ok(self.project.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::plain_client;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reads_token_and_project_from_metadata_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.abc",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(PROJECT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("my-project\n"))
            .mount(&server)
            .await;

        let credentials =
            MetadataServerCredentials::with_base_url(server.uri()).with_client(plain_client());

        assert_eq!(credentials.access_token().await.unwrap(), "ya29.abc");
        assert_eq!(credentials.project_id().await.unwrap(), "my-project");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let credentials =
            MetadataServerCredentials::with_base_url(server.uri()).with_client(plain_client());
        let err = credentials.access_token().await.unwrap_err();
        assert!(matches!(err, AmbientError::Status { status: 403 }));
    }
}
