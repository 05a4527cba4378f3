//! Service configuration.
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML
//! file, environment variables, command-line flags (applied by the binary).
//!
//! Environment variables:
//! - `PORT`: listen port (default: 8080)
//! - `HOST`: bind address (default: 0.0.0.0)
//! - `GOOGLE_CLOUD_PROJECT` / `GCLOUD_PROJECT`: project for secrets and prompts
//! - `VERTEX_LOCATION`: Vertex AI region (default: australia-southeast1)
//! - `FLOWDECK_SERVER_MODE`: `flows` (POST /flows/<name>) or `bare` (POST /<name>)
//! - `FLOWDECK_DEFAULT_MODEL`, `FLOWDECK_SECONDARY_MODEL`
//! - `FLOWDECK_GENERATION_TIMEOUT_SECS` (default: 60)
//! - `FLOWDECK_PROMPT_DIR`: read prompts from a directory instead of Firestore
//! - `OPENAI_BASE_URL`, `GEMINI_BASE_URL`

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use flow_store::CredentialSpec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOCATION: &str = "australia-southeast1";
pub const DEFAULT_MODEL: &str = "googleai/gemini-2.5-flash";
pub const SECONDARY_MODEL: &str = "openai/gpt-4o-mini";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which URL layout exposes the flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    /// `POST /flows/<name>`
    #[default]
    Flows,
    /// `POST /<name>`
    Bare,
}

impl FromStr for ServerMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "flows" => Ok(ServerMode::Flows),
            "bare" => Ok(ServerMode::Bare),
            other => Err(format!("unknown server mode '{other}' (expected 'flows' or 'bare')")),
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMode::Flows => f.write_str("flows"),
            ServerMode::Bare => f.write_str("bare"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PromptStoreConfig {
    Firestore {
        #[serde(default = "default_collection")]
        collection: String,
        #[serde(default = "default_text_field")]
        text_field: String,
    },
    Directory {
        path: PathBuf,
    },
    None,
}

fn default_collection() -> String {
    "prompts".to_string()
}

fn default_text_field() -> String {
    "text".to_string()
}

impl Default for PromptStoreConfig {
    fn default() -> Self {
        PromptStoreConfig::Firestore {
            collection: default_collection(),
            text_field: default_text_field(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialConfig {
    pub env_var: String,
    pub secret_name: Option<String>,
    pub required: bool,
    pub allow_ambient: bool,
}

impl CredentialConfig {
    pub fn to_spec(&self, name: &str) -> CredentialSpec {
        let spec = CredentialSpec::new(name, &self.env_var)
            .allow_ambient(self.allow_ambient)
            .required(self.required);
        match &self.secret_name {
            Some(secret) => spec.with_secret(secret),
            None => spec,
        }
    }
}

/// Per-provider credential settings. A `[credentials.<provider>]` section in
/// the file only replaces the keys it sets; everything else keeps the
/// provider's built-in value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CredentialsFile")]
pub struct CredentialsConfig {
    pub gemini: CredentialConfig,
    pub openai: CredentialConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CredentialsFile {
    gemini: CredentialOverride,
    openai: CredentialOverride,
}

#[derive(Debug, Default, Deserialize)]
struct CredentialOverride {
    env_var: Option<String>,
    /// An empty name turns the secret-store lookup off.
    secret_name: Option<String>,
    required: Option<bool>,
    allow_ambient: Option<bool>,
}

impl CredentialOverride {
    fn apply(self, mut base: CredentialConfig) -> CredentialConfig {
        if let Some(env_var) = self.env_var {
            base.env_var = env_var;
        }
        if let Some(secret) = self.secret_name {
            base.secret_name = (!secret.trim().is_empty()).then_some(secret);
        }
        if let Some(required) = self.required {
            base.required = required;
        }
        if let Some(allow_ambient) = self.allow_ambient {
            base.allow_ambient = allow_ambient;
        }
        base
    }
}

impl From<CredentialsFile> for CredentialsConfig {
    fn from(file: CredentialsFile) -> Self {
        let defaults = CredentialsConfig::default();
        Self {
            gemini: file.gemini.apply(defaults.gemini),
            openai: file.openai.apply(defaults.openai),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            gemini: CredentialConfig {
                env_var: "GEMINI_API_KEY".to_string(),
                secret_name: Some("gemini-api-key".to_string()),
                required: true,
                allow_ambient: true,
            },
            openai: CredentialConfig {
                env_var: "OPENAI_API_KEY".to_string(),
                secret_name: Some("openai-api-key".to_string()),
                required: false,
                allow_ambient: false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub mode: ServerMode,
    pub project_id: Option<String>,
    pub location: String,
    pub default_model: String,
    pub secondary_model: String,
    pub generation_timeout_secs: u64,
    pub prompt_store: PromptStoreConfig,
    pub prompt_cache_ttl_secs: u64,
    pub credentials: CredentialsConfig,
    pub openai_base_url: Option<String>,
    pub gemini_base_url: Option<String>,
    pub metadata_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            mode: ServerMode::default(),
            project_id: None,
            location: DEFAULT_LOCATION.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            secondary_model: SECONDARY_MODEL.to_string(),
            generation_timeout_secs: 60,
            prompt_store: PromptStoreConfig::default(),
            prompt_cache_ttl_secs: 0,
            credentials: CredentialsConfig::default(),
            openai_base_url: None,
            gemini_base_url: None,
            metadata_url: flow_store::ambient::DEFAULT_METADATA_URL.to_string(),
        }
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: err.to_string(),
        })
}

impl ServiceConfig {
    /// Defaults, then the file at `path` if one is given, then the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.port = parse_env("PORT", &port)?;
        }
        if let Some(host) = get("HOST") {
            self.host = host.trim().to_string();
        }
        if let Some(project) = get("GOOGLE_CLOUD_PROJECT").or_else(|| get("GCLOUD_PROJECT")) {
            self.project_id = Some(project.trim().to_string());
        }
        if let Some(location) = get("VERTEX_LOCATION") {
            self.location = location.trim().to_string();
        }
        if let Some(mode) = get("FLOWDECK_SERVER_MODE") {
            self.mode = parse_env("FLOWDECK_SERVER_MODE", &mode)?;
        }
        if let Some(model) = get("FLOWDECK_DEFAULT_MODEL") {
            self.default_model = model.trim().to_string();
        }
        if let Some(model) = get("FLOWDECK_SECONDARY_MODEL") {
            self.secondary_model = model.trim().to_string();
        }
        if let Some(secs) = get("FLOWDECK_GENERATION_TIMEOUT_SECS") {
            self.generation_timeout_secs = parse_env("FLOWDECK_GENERATION_TIMEOUT_SECS", &secs)?;
        }
        if let Some(dir) = get("FLOWDECK_PROMPT_DIR") {
            self.prompt_store = PromptStoreConfig::Directory {
                path: PathBuf::from(dir.trim()),
            };
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.openai_base_url = Some(url.trim().to_string());
        }
        if let Some(url) = get("GEMINI_BASE_URL") {
            self.gemini_base_url = Some(url.trim().to_string());
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".to_string()));
        }
        if self.generation_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "generation_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.default_model.trim().is_empty() || self.secondary_model.trim().is_empty() {
            return Err(ConfigError::Invalid("model ids cannot be empty".to_string()));
        }
        if self.credentials.gemini.env_var.trim().is_empty()
            || self.credentials.openai.env_var.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "credential env_var cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn prompt_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.prompt_cache_ttl_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_hosting_conventions() {
        let config = ServiceConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.mode, ServerMode::Flows);
        assert_eq!(config.location, "australia-southeast1");
        assert!(config.credentials.gemini.required);
        assert!(!config.credentials.openai.required);
        assert!(!config.credentials.openai.allow_ambient);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn port_comes_from_env() {
        let config = ServiceConfig::default()
            .with_env(env(&[("PORT", "9090")]))
            .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.bind_address(), "0.0.0.0:9090");
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = ServiceConfig::default()
            .with_env(env(&[("PORT", "http")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "PORT"));
    }

    #[test]
    fn env_overrides_project_mode_and_prompt_dir() {
        let config = ServiceConfig::default()
            .with_env(env(&[
                ("GCLOUD_PROJECT", "legacy-project"),
                ("FLOWDECK_SERVER_MODE", "BARE"),
                ("FLOWDECK_PROMPT_DIR", "/srv/prompts"),
            ]))
            .unwrap();
        assert_eq!(config.project_id.as_deref(), Some("legacy-project"));
        assert_eq!(config.mode, ServerMode::Bare);
        assert_eq!(
            config.prompt_store,
            PromptStoreConfig::Directory {
                path: PathBuf::from("/srv/prompts")
            }
        );
    }

    #[test]
    fn toml_file_with_partial_sections() {
        let config = ServiceConfig::from_toml(
            r#"
            port = 3000
            mode = "bare"
            default_model = "vertexai/gemini-2.5-pro"

            [prompt_store]
            kind = "firestore"
            collection = "systemPrompts"

            [credentials.openai]
            env_var = "MY_OPENAI_KEY"
            required = true
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.mode, ServerMode::Bare);
        assert_eq!(config.default_model, "vertexai/gemini-2.5-pro");
        assert_eq!(
            config.prompt_store,
            PromptStoreConfig::Firestore {
                collection: "systemPrompts".to_string(),
                text_field: "text".to_string()
            }
        );
        assert!(config.credentials.openai.required);
        assert_eq!(config.credentials.openai.env_var, "MY_OPENAI_KEY");
        assert_eq!(config.credentials.openai.secret_name.as_deref(), Some("openai-api-key"));
        assert_eq!(config.credentials.gemini, CredentialsConfig::default().gemini);
    }

    #[test]
    fn renaming_gemini_key_keeps_it_mandatory() {
        let config = ServiceConfig::from_toml("[credentials.gemini]\nenv_var = \"MY_GEMINI_KEY\"\n").unwrap();

        let gemini = &config.credentials.gemini;
        assert_eq!(gemini.env_var, "MY_GEMINI_KEY");
        assert!(gemini.required);
        assert!(gemini.allow_ambient);
        assert_eq!(gemini.secret_name.as_deref(), Some("gemini-api-key"));
        assert_eq!(config.credentials.openai, CredentialsConfig::default().openai);
    }

    #[test]
    fn credential_section_can_switch_off_lookups() {
        let config = ServiceConfig::from_toml(
            r#"
            [credentials.gemini]
            secret_name = ""
            allow_ambient = false
            required = false
            "#,
        )
        .unwrap();

        let gemini = &config.credentials.gemini;
        assert_eq!(gemini.env_var, "GEMINI_API_KEY");
        assert_eq!(gemini.secret_name, None);
        assert!(!gemini.required);
        assert!(!gemini.allow_ambient);
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowdeck.toml");
        std::fs::write(&path, "generation_timeout_secs = 15\n[prompt_store]\nkind = \"none\"\n").unwrap();

        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.generation_timeout(), Duration::from_secs(15));
        assert_eq!(config.prompt_store, PromptStoreConfig::None);

        let missing = ServiceConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }

    #[test]
    fn validate_rejects_zero_timeout_and_empty_models() {
        let mut config = ServiceConfig {
            generation_timeout_secs: 0,
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_err());

        config.generation_timeout_secs = 5;
        config.secondary_model = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn credential_config_maps_to_spec() {
        let spec = CredentialsConfig::default().gemini.to_spec("gemini");
        assert_eq!(spec.env_var, "GEMINI_API_KEY");
        assert_eq!(spec.secret_name.as_deref(), Some("gemini-api-key"));
        assert!(spec.required);
        assert!(spec.allow_ambient);
    }
}
