//! Provider-agnostic generation request and result types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::message::Message;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    Text,
    Json,
}

/// Generation options recognized by every provider.
///
/// Unset fields fall back to the provider's own defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Ground the answer against a web index (provider must support it).
    #[serde(default)]
    pub search_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl GenerationOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    pub fn with_search(mut self, enabled: bool) -> Self {
        self.search_enabled = enabled;
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn wants_json(&self) -> bool {
        self.response_format == Some(ResponseFormat::Json)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    /// Model identifier, optionally namespaced (`googleai/gemini-2.5-flash`).
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            options: GenerationOptions::default(),
        }
    }

    /// A single flattened prompt, sent as one `user` message.
    pub fn from_prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::new(model, vec![Message::user(prompt)])
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResult {
    pub text: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl GenerationResult {
    pub fn text(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
            finish_reason: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    Timeout,
    RateLimited,
    InvalidRequest,
    Authentication,
    Provider,
    Transport,
    InvalidResponse,
}

impl GenerationErrorKind {
    /// Classify a non-success HTTP status returned by a provider.
    pub fn from_status(status: u16) -> Self {
        match status {
            408 | 504 => GenerationErrorKind::Timeout,
            429 => GenerationErrorKind::RateLimited,
            400 | 404 | 422 => GenerationErrorKind::InvalidRequest,
            401 | 403 => GenerationErrorKind::Authentication,
            _ => GenerationErrorKind::Provider,
        }
    }
}

/// Failure reported by (or on the way to) a generation provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationError {
    pub provider: String,
    pub kind: GenerationErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl GenerationError {
    pub fn new(
        provider: impl Into<String>,
        kind: GenerationErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn from_status(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind: GenerationErrorKind::from_status(status),
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn timeout(provider: impl Into<String>, after: Duration) -> Self {
        Self::new(
            provider,
            GenerationErrorKind::Timeout,
            format!("no response within {after:?}"),
        )
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} generation failed ({:?}", self.provider, self.kind)?;
        if let Some(status) = self.status {
            write!(f, ", HTTP {status}")?;
        }
        write!(f, "): {}", self.message)
    }
}

impl std::error::Error for GenerationError {}
