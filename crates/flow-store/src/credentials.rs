//! API key resolution: environment, then secret store, then ambient identity.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::ambient::AmbientCredentials;
use crate::secrets::{latest_version_path, SecretStore};

/// Where a credential may come from and whether startup depends on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSpec {
    pub name: String,
    pub env_var: String,
    pub secret_name: Option<String>,
    pub allow_ambient: bool,
    pub required: bool,
}

impl CredentialSpec {
    pub fn new(name: impl Into<String>, env_var: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env_var: env_var.into(),
            secret_name: None,
            allow_ambient: false,
            required: false,
        }
    }

    pub fn with_secret(mut self, secret_name: impl Into<String>) -> Self {
        self.secret_name = Some(secret_name.into());
        self
    }

    pub fn allow_ambient(mut self, allow: bool) -> Self {
        self.allow_ambient = allow;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    SecretStore,
    Ambient,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CredentialSource::Environment => "environment",
            CredentialSource::SecretStore => "secret store",
            CredentialSource::Ambient => "ambient credentials",
        };
        f.write_str(label)
    }
}

#[derive(Clone)]
pub struct Credential {
    pub name: String,
    pub value: String,
    pub source: CredentialSource,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("required credential '{name}' could not be resolved (set {env_var} or provide a secret)")]
    Missing { name: String, env_var: String },
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct CredentialResolver {
    env: EnvLookup,
    project_id: Option<String>,
    secrets: Option<Arc<dyn SecretStore>>,
    ambient: Option<Arc<dyn AmbientCredentials>>,
}

impl CredentialResolver {
    pub fn new() -> Self {
        Self {
            env: Arc::new(|key| std::env::var(key).ok()),
            project_id: None,
            secrets: None,
            ambient: None,
        }
    }

    /// Replace the process environment, mostly for tests.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    pub fn with_secret_store(
        mut self,
        project_id: impl Into<String>,
        store: Arc<dyn SecretStore>,
    ) -> Self {
        self.project_id = Some(project_id.into());
        self.secrets = Some(store);
        self
    }

    pub fn with_ambient(mut self, ambient: Arc<dyn AmbientCredentials>) -> Self {
        self.ambient = Some(ambient);
        self
    }

    pub async fn resolve(&self, spec: &CredentialSpec) -> Result<Option<Credential>, CredentialError> {
        let found = match self.from_env(spec) {
            Some(value) => Some((value, CredentialSource::Environment)),
            None => match self.from_secret_store(spec).await {
                Some(value) => Some((value, CredentialSource::SecretStore)),
                None => self
                    .from_ambient(spec)
                    .await
                    .map(|value| (value, CredentialSource::Ambient)),
            },
        };

        match found {
            Some((value, source)) => {
                log::info!("Credential '{}' resolved from {}", spec.name, source);
                Ok(Some(Credential {
                    name: spec.name.clone(),
                    value,
                    source,
                }))
            }
            None if spec.required => {
                log::error!("Required credential '{}' could not be resolved", spec.name);
                Err(CredentialError::Missing {
                    name: spec.name.clone(),
                    env_var: spec.env_var.clone(),
                })
            }
            None => {
                log::warn!(
                    "Optional credential '{}' not found; dependent features are disabled",
                    spec.name
                );
                Ok(None)
            }
        }
    }

    fn from_env(&self, spec: &CredentialSpec) -> Option<String> {
        (self.env)(&spec.env_var)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    async fn from_secret_store(&self, spec: &CredentialSpec) -> Option<String> {
        let secret_name = spec.secret_name.as_deref()?;
        let (Some(project), Some(store)) = (self.project_id.as_deref(), self.secrets.as_ref()) else {
            log::debug!("No secret store configured; skipping lookup for '{}'", spec.name);
            return None;
        };

        let path = latest_version_path(project, secret_name);
        match store.access(&path).await {
            Ok(Some(value)) if !value.trim().is_empty() => Some(value.trim().to_string()),
            Ok(_) => {
                log::warn!("Secret '{}' for credential '{}' is missing or empty", path, spec.name);
                None
            }
            Err(err) => {
                log::warn!("Secret lookup for credential '{}' failed: {}", spec.name, err);
                None
            }
        }
    }

    async fn from_ambient(&self, spec: &CredentialSpec) -> Option<String> {
        if !spec.allow_ambient {
            return None;
        }
        let ambient = self.ambient.as_ref()?;

        match ambient.access_token().await {
            Ok(token) if !token.trim().is_empty() => Some(token),
            Ok(_) => {
                log::warn!("Ambient credentials returned an empty token for '{}'", spec.name);
                None
            }
            Err(err) => {
                log::warn!("Ambient credentials unavailable for '{}': {}", spec.name, err);
                None
            }
        }
    }
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::new()
    }
}
