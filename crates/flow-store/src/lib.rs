//! flow-store - everything a flow reads from outside the process
//!
//! - `credentials` - env → secret store → ambient resolution of API keys
//! - `secrets` - Secret Manager and in-memory secret stores
//! - `ambient` - platform identity (metadata server)
//! - `prompts` - prompt documents and the fallback-safe resolver
//! - `http` - retrying client for these idempotent reads

pub mod ambient;
pub mod credentials;
pub mod http;
pub mod prompts;
pub mod secrets;

pub use ambient::{AmbientCredentials, AmbientError, MetadataServerCredentials, StaticToken};
pub use credentials::{
    Credential, CredentialError, CredentialResolver, CredentialSource, CredentialSpec,
};
pub use prompts::{
    DirectoryPromptStore, FirestorePromptStore, InMemoryPromptStore, PromptDocument,
    PromptResolver, PromptStore, PromptStoreError, DEFAULT_SYSTEM_PROMPT,
};
pub use secrets::{
    latest_version_path, InMemorySecretStore, SecretManagerClient, SecretStore, SecretStoreError,
};
