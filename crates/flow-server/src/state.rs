use std::sync::Arc;

use flow_core::{FlowRegistry, RegistryError};
use flow_llm::{GeminiProvider, GenerationInvoker, OpenAIProvider, ProviderRouter};
use flow_store::{
    AmbientCredentials, CredentialError, CredentialResolver, CredentialSource,
    DirectoryPromptStore, FirestorePromptStore, MetadataServerCredentials, PromptResolver,
    SecretManagerClient,
};
use thiserror::Error;

use crate::config::{PromptStoreConfig, ServerMode, ServiceConfig};
use crate::flows::{builtin_registry, FlowContext};

/// Startup failures. Any of these ends the process with a non-zero status.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("flow registration failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("{0}")]
    Config(String),
}

pub struct AppState {
    pub registry: Arc<FlowRegistry>,
    pub mode: ServerMode,
}

impl AppState {
    pub fn new(registry: FlowRegistry, mode: ServerMode) -> Self {
        Self {
            registry: Arc::new(registry),
            mode,
        }
    }

    /// Build the state from explicit collaborators.
    pub fn from_context(context: &FlowContext, mode: ServerMode) -> Result<Self, BootstrapError> {
        let registry = builtin_registry(context)?;
        log::info!("Registered {} flow(s): {}", registry.len(), registry.names().join(", "));
        Ok(Self::new(registry, mode))
    }

    /// Resolve credentials against the real environment, secret store and
    /// metadata server, then build every flow.
    pub async fn bootstrap(config: &ServiceConfig) -> Result<Self, BootstrapError> {
        let ambient: Arc<dyn AmbientCredentials> =
            Arc::new(MetadataServerCredentials::with_base_url(&config.metadata_url));

        let project_id = match &config.project_id {
            Some(project) => Some(project.clone()),
            None => match ambient.project_id().await {
                Ok(project) => {
                    log::info!("Using project '{}' from the metadata server", project);
                    Some(project)
                }
                Err(err) => {
                    log::warn!("No project configured and metadata lookup failed: {}", err);
                    None
                }
            },
        };

        let mut resolver = CredentialResolver::new().with_ambient(Arc::clone(&ambient));
        if let Some(project) = &project_id {
            resolver = resolver.with_secret_store(
                project.clone(),
                Arc::new(SecretManagerClient::new(Arc::clone(&ambient))),
            );
        }

        Self::bootstrap_with(config, project_id, &resolver, ambient).await
    }

    pub async fn bootstrap_with(
        config: &ServiceConfig,
        project_id: Option<String>,
        resolver: &CredentialResolver,
        ambient: Arc<dyn AmbientCredentials>,
    ) -> Result<Self, BootstrapError> {
        let router = build_router(config, project_id.as_deref(), resolver).await?;
        let invoker = GenerationInvoker::new(router).with_timeout(config.generation_timeout());
        let prompts = build_prompt_resolver(config, project_id.as_deref(), ambient);

        let context = FlowContext {
            invoker,
            prompts,
            default_model: config.default_model.clone(),
            secondary_model: config.secondary_model.clone(),
        };
        Self::from_context(&context, config.mode)
    }
}

async fn build_router(
    config: &ServiceConfig,
    project_id: Option<&str>,
    resolver: &CredentialResolver,
) -> Result<ProviderRouter, BootstrapError> {
    let mut router = ProviderRouter::new();

    if let Some(credential) = resolver
        .resolve(&config.credentials.gemini.to_spec("gemini"))
        .await?
    {
        let provider = match credential.source {
            CredentialSource::Ambient => {
                let project = project_id.ok_or_else(|| {
                    BootstrapError::Config(
                        "ambient Gemini credentials need a project id (set GOOGLE_CLOUD_PROJECT)"
                            .to_string(),
                    )
                })?;
                log::info!("Gemini via Vertex AI in {} ({})", project, config.location);
                GeminiProvider::with_vertex(credential.value, project, &config.location)
            }
            _ => GeminiProvider::with_api_key(credential.value),
        };
        let provider = match &config.gemini_base_url {
            Some(url) => provider.with_base_url(url),
            None => provider,
        };
        router.register(Arc::new(provider));
    }

    if let Some(credential) = resolver
        .resolve(&config.credentials.openai.to_spec("openai"))
        .await?
    {
        let provider = OpenAIProvider::new(credential.value);
        let provider = match &config.openai_base_url {
            Some(url) => provider.with_base_url(url),
            None => provider,
        };
        router.register(Arc::new(provider));
    }

    Ok(router)
}

fn build_prompt_resolver(
    config: &ServiceConfig,
    project_id: Option<&str>,
    ambient: Arc<dyn AmbientCredentials>,
) -> PromptResolver {
    let resolver = match (&config.prompt_store, project_id) {
        (PromptStoreConfig::Firestore { collection, text_field }, Some(project)) => {
            log::info!("Prompts from Firestore collection '{}'", collection);
            PromptResolver::new(Arc::new(FirestorePromptStore::new(
                project,
                collection.as_str(),
                text_field.as_str(),
                ambient,
            )))
        }
        (PromptStoreConfig::Firestore { .. }, None) => {
            log::warn!("Firestore prompts need a project id; using the default system prompt");
            PromptResolver::fallback_only()
        }
        (PromptStoreConfig::Directory { path }, _) => {
            log::info!("Prompts from directory {}", path.display());
            PromptResolver::new(Arc::new(DirectoryPromptStore::new(path.clone())))
        }
        (PromptStoreConfig::None, _) => PromptResolver::fallback_only(),
    };
    resolver.with_cache_ttl(config.prompt_cache_ttl())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_store::{InMemorySecretStore, StaticToken};

    fn local_config() -> ServiceConfig {
        ServiceConfig {
            project_id: Some("proj".to_string()),
            prompt_store: PromptStoreConfig::None,
            ..ServiceConfig::default()
        }
    }

    fn ambient() -> Arc<dyn AmbientCredentials> {
        Arc::new(StaticToken::new("ya29.ambient", "proj"))
    }

    #[tokio::test]
    async fn missing_mandatory_credential_fails_startup() {
        let resolver = CredentialResolver::new()
            .with_env(|_| None)
            .with_secret_store("proj", Arc::new(InMemorySecretStore::new()));

        let err = match AppState::bootstrap_with(&local_config(), Some("proj".into()), &resolver, ambient()).await {
            Err(err) => err,
            Ok(_) => panic!("bootstrap should fail without a Gemini key"),
        };
        assert!(matches!(
            err,
            BootstrapError::Credential(CredentialError::Missing { name, .. }) if name == "gemini"
        ));
    }

    #[tokio::test]
    async fn optional_credential_missing_still_starts() {
        let resolver = CredentialResolver::new()
            .with_env(|key| (key == "GEMINI_API_KEY").then(|| "AIza-test".to_string()));

        let state = AppState::bootstrap_with(&local_config(), Some("proj".into()), &resolver, ambient())
            .await
            .unwrap();
        assert_eq!(state.registry.len(), 5);
        assert_eq!(state.mode, ServerMode::Flows);
    }

    #[tokio::test]
    async fn secret_store_key_is_used_when_env_is_empty() {
        let resolver = CredentialResolver::new().with_env(|_| None).with_secret_store(
            "proj",
            Arc::new(
                InMemorySecretStore::new()
                    .with_secret("proj", "gemini-api-key", "AIza-secret")
                    .with_secret("proj", "openai-api-key", "sk-secret"),
            ),
        );

        let router = build_router(&local_config(), Some("proj"), &resolver).await.unwrap();
        assert_eq!(router.provider_names(), vec!["gemini", "openai"]);
    }

    #[tokio::test]
    async fn ambient_gemini_credential_needs_project() {
        let resolver = CredentialResolver::new().with_env(|_| None).with_ambient(ambient());

        let router = build_router(&local_config(), Some("proj"), &resolver).await.unwrap();
        assert!(router.has_provider("gemini"));

        let result = build_router(&local_config(), None, &resolver).await;
        assert!(matches!(result, Err(BootstrapError::Config(_))));
    }
}
