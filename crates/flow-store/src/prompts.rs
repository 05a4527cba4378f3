//! System prompt lookup with a fixed fallback.
//!
//! Prompt documents live in a document store (Firestore in production, a
//! directory of YAML/JSON/Markdown files locally). Resolution never fails:
//! anything short of a non-empty stored text yields [`DEFAULT_SYSTEM_PROMPT`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use flow_core::template;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::ambient::{AmbientCredentials, AmbientError};
use crate::http::{build_retry_client, RetryClient};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

pub const FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";

#[derive(Debug, Error)]
pub enum PromptStoreError {
    #[error("prompt store unreachable: {0}")]
    Unreachable(String),

    #[error("prompt store returned HTTP {0}")]
    Status(u16),

    #[error("malformed prompt document '{id}': {reason}")]
    Malformed { id: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Ambient(#[from] AmbientError),
}

/// A stored prompt. `text` is absent when the document lacks the field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptDocument {
    pub id: String,
    pub text: Option<String>,
}

#[async_trait]
pub trait PromptStore: Send + Sync {
    async fn fetch(&self, id: &str) -> Result<Option<PromptDocument>, PromptStoreError>;
}

// ========== Firestore ==========

/// Reads `<collection>/<id>` through the Firestore REST API.
pub struct FirestorePromptStore {
    client: RetryClient,
    base_url: String,
    project_id: String,
    collection: String,
    text_field: String,
    auth: Arc<dyn AmbientCredentials>,
}

impl FirestorePromptStore {
    pub fn new(
        project_id: impl Into<String>,
        collection: impl Into<String>,
        text_field: impl Into<String>,
        auth: Arc<dyn AmbientCredentials>,
    ) -> Self {
        Self {
            client: build_retry_client(),
            base_url: FIRESTORE_URL.to_string(),
            project_id: project_id.into(),
            collection: collection.into(),
            text_field: text_field.into(),
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

    fn document_url(&self, id: &str) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/{}/{}",
            self.base_url, self.project_id, self.collection, id
        )
    }
}

#[async_trait]
impl PromptStore for FirestorePromptStore {
    async fn fetch(&self, id: &str) -> Result<Option<PromptDocument>, PromptStoreError> {
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .get(self.document_url(id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| PromptStoreError::Unreachable(err.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(PromptStoreError::Status(status.as_u16()));
        }

        let document: Value = response.json().await.map_err(|err| PromptStoreError::Malformed {
            id: id.to_string(),
            reason: err.to_string(),
        })?;

        let text = document
            .get("fields")
            .and_then(|fields| fields.get(&self.text_field))
            .and_then(|field| field.get("stringValue"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Some(PromptDocument {
            id: id.to_string(),
            text,
        }))
    }
}

// ========== Directory ==========

/// Prompts as files: `<dir>/<id>.yaml|.yml|.json` with a `text` key, or
/// `<dir>/<id>.md|.txt` holding the prompt verbatim.
pub struct DirectoryPromptStore {
    root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct PromptFile {
    #[serde(default)]
    text: Option<String>,
}

const STRUCTURED_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];
const PLAIN_EXTENSIONS: &[&str] = &["md", "txt"];

impl DirectoryPromptStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn is_safe_id(id: &str) -> bool {
        !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

#[async_trait]
impl PromptStore for DirectoryPromptStore {
    async fn fetch(&self, id: &str) -> Result<Option<PromptDocument>, PromptStoreError> {
        if !Self::is_safe_id(id) {
            return Ok(None);
        }

        for ext in STRUCTURED_EXTENSIONS {
            let path = self.root.join(format!("{id}.{ext}"));
            if !tokio::fs::try_exists(&path).await? {
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            let parsed: Result<PromptFile, String> = if *ext == "json" {
                serde_json::from_str(&content).map_err(|err| err.to_string())
            } else {
                serde_yaml::from_str(&content).map_err(|err| err.to_string())
            };
            let file = parsed.map_err(|reason| PromptStoreError::Malformed {
                id: id.to_string(),
                reason,
            })?;
            return Ok(Some(PromptDocument {
                id: id.to_string(),
                text: file.text,
            }));
        }

        for ext in PLAIN_EXTENSIONS {
            let path = self.root.join(format!("{id}.{ext}"));
            if tokio::fs::try_exists(&path).await? {
                let content = tokio::fs::read_to_string(&path).await?;
                return Ok(Some(PromptDocument {
                    id: id.to_string(),
                    text: Some(content),
                }));
            }
        }

        Ok(None)
    }
}

// ========== In-memory ==========

#[derive(Debug, Default, Clone)]
pub struct InMemoryPromptStore {
    documents: HashMap<String, Option<String>>,
}

impl InMemoryPromptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prompt(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.documents.insert(id.into(), Some(text.into()));
        self
    }

    /// A document that exists but has no text field.
    pub fn with_empty_document(mut self, id: impl Into<String>) -> Self {
        self.documents.insert(id.into(), None);
        self
    }
}

#[async_trait]
impl PromptStore for InMemoryPromptStore {
    async fn fetch(&self, id: &str) -> Result<Option<PromptDocument>, PromptStoreError> {
        Ok(self.documents.get(id).map(|text| PromptDocument {
            id: id.to_string(),
            text: text.clone(),
        }))
    }
}

// ========== Resolver ==========

#[derive(Clone)]
pub struct PromptResolver {
    store: Option<Arc<dyn PromptStore>>,
    cache_ttl: Duration,
    cache: Arc<DashMap<String, (Instant, String)>>,
}

impl PromptResolver {
    pub fn new(store: Arc<dyn PromptStore>) -> Self {
        Self {
            store: Some(store),
            cache_ttl: Duration::ZERO,
            cache: Arc::new(DashMap::new()),
        }
    }

    /// A resolver without a store always answers with the fallback prompt.
    pub fn fallback_only() -> Self {
        Self {
            store: None,
            cache_ttl: Duration::ZERO,
            cache: Arc::new(DashMap::new()),
        }
    }

    /// Cache successful lookups for `ttl`; zero disables caching.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub async fn resolve(&self, id: &str) -> String {
        if let Some(text) = self.cached(id) {
            return text;
        }

        let Some(store) = self.store.as_ref() else {
            return DEFAULT_SYSTEM_PROMPT.to_string();
        };

        match store.fetch(id).await {
            Ok(Some(PromptDocument {
                text: Some(text), ..
            })) if !text.trim().is_empty() => {
                if !self.cache_ttl.is_zero() {
                    self.cache.insert(id.to_string(), (Instant::now(), text.clone()));
                }
                text
            }
            Ok(Some(_)) => {
                log::warn!("Prompt '{}' has no text; using default system prompt", id);
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
            Ok(None) => {
                log::warn!("Prompt '{}' not found; using default system prompt", id);
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
            Err(err) => {
                log::warn!("Failed to fetch prompt '{}': {}; using default system prompt", id, err);
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
        }
    }

    /// Resolve and substitute `{key}` placeholders.
    pub async fn resolve_with(&self, id: &str, bindings: &HashMap<String, String>) -> String {
        let text = self.resolve(id).await;
        template::render(&text, bindings)
    }

    fn cached(&self, id: &str) -> Option<String> {
        if self.cache_ttl.is_zero() {
            return None;
        }
        let entry = self.cache.get(id)?;
        let (stored_at, text) = entry.value();
        if stored_at.elapsed() < self.cache_ttl {
            Some(text.clone())
        } else {
            drop(entry);
            self.cache.remove(id);
            None
        }
    }
}
