use std::collections::HashMap;
use std::sync::Arc;

use flow_core::FlowError;

use crate::provider::GenerationProvider;

/// Maps model identifiers onto the providers that were configured at startup.
///
/// A model is either namespaced (`googleai/gemini-2.5-flash`,
/// `openai/gpt-4o-mini`) or bare, in which case the provider is inferred
/// from its prefix.
#[derive(Default, Clone)]
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn GenerationProvider>>,
}

/// Provider name for a model namespace.
fn provider_for_namespace(namespace: &str) -> Option<&'static str> {
    match namespace {
        "googleai" | "vertexai" | "gemini" | "google" => Some("gemini"),
        "openai" => Some("openai"),
        _ => None,
    }
}

fn provider_for_bare_model(model: &str) -> Option<&'static str> {
    const OPENAI_PREFIXES: &[&str] = &["gpt-", "chatgpt-", "o1", "o3", "o4"];

    if model.starts_with("gemini-") {
        Some("gemini")
    } else if OPENAI_PREFIXES.iter().any(|prefix| model.starts_with(prefix)) {
        Some("openai")
    } else {
        None
    }
}

/// Split `namespace/model` into the provider name and the bare model id.
pub fn parse_model(model: &str) -> Option<(&'static str, &str)> {
    match model.split_once('/') {
        Some((namespace, bare)) if !bare.is_empty() => {
            provider_for_namespace(namespace).map(|provider| (provider, bare))
        }
        Some(_) => None,
        None => provider_for_bare_model(model).map(|provider| (provider, model)),
    }
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn GenerationProvider>) -> &mut Self {
        log::info!("Registered generation provider '{}'", provider.name());
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve a model to its provider and the id that provider expects.
    ///
    /// Unknown namespaces and providers that were never configured (for
    /// example a missing optional API key) are both reported as
    /// `ProviderNotConfigured`.
    pub fn route(&self, model: &str) -> Result<(Arc<dyn GenerationProvider>, String), FlowError> {
        let not_configured = || FlowError::ProviderNotConfigured {
            model: model.to_string(),
        };

        let (provider_name, bare) = parse_model(model).ok_or_else(not_configured)?;
        let provider = self.providers.get(provider_name).ok_or_else(not_configured)?;

        Ok((Arc::clone(provider), bare.to_string()))
    }
}
