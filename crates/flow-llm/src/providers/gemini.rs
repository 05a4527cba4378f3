//! Google Gemini provider (Generative Language API or Vertex AI).
//!
//! Gemini has its own request shape:
//! - messages are "contents", and the assistant role is called "model"
//! - system instructions travel separately from the conversation
//! - web grounding is requested through a `googleSearch` tool
//!
//! ```json
//! {
//!   "contents": [{ "role": "user", "parts": [{ "text": "Hello" }] }],
//!   "systemInstruction": { "parts": [{ "text": "You are helpful" }] },
//!   "generationConfig": { "temperature": 0.2, "responseMimeType": "application/json" },
//!   "tools": [{ "googleSearch": {} }]
//! }
//! ```

use async_trait::async_trait;
use flow_core::{
    GenerationError, GenerationErrorKind, GenerationRequest, GenerationResult, Message, Role,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::common::{read_json, transport_error};
use crate::provider::{GenerationProvider, Result};

pub const PROVIDER_NAME: &str = "gemini";

const GENERATIVE_LANGUAGE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// How requests are authorized, which also selects the endpoint family.
#[derive(Clone)]
pub enum GeminiAuth {
    /// Developer API key (`x-goog-api-key`).
    ApiKey(String),
    /// OAuth access token for Vertex AI.
    Bearer {
        token: String,
        project: String,
        location: String,
    },
}

impl std::fmt::Debug for GeminiAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeminiAuth::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            GeminiAuth::Bearer {
                project, location, ..
            } => write!(f, "Bearer {{ project: {project}, location: {location} }}"),
        }
    }
}

pub struct GeminiProvider {
    client: Client,
    auth: GeminiAuth,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(auth: GeminiAuth) -> Self {
        let base_url = match &auth {
            GeminiAuth::ApiKey(_) => GENERATIVE_LANGUAGE_URL.to_string(),
            GeminiAuth::Bearer { location, .. } => {
                format!("https://{location}-aiplatform.googleapis.com/v1")
            }
        };
        Self {
            client: Client::new(),
            auth,
            base_url,
        }
    }

    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self::new(GeminiAuth::ApiKey(api_key.into()))
    }

    pub fn with_vertex(
        token: impl Into<String>,
        project: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self::new(GeminiAuth::Bearer {
            token: token.into(),
            project: project.into(),
            location: location.into(),
        })
    }

    /// Set a custom base URL (proxies, regional endpoints, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn endpoint(&self, model: &str) -> String {
        match &self.auth {
            GeminiAuth::ApiKey(_) => {
                format!("{}/models/{}:generateContent", self.base_url, model)
            }
            GeminiAuth::Bearer {
                project, location, ..
            } => format!(
                "{}/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
                self.base_url, project, location, model
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GeminiGenerationConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Set on "thinking" parts, which are not part of the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

impl GeminiPart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            thought: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

/// Convert a provider-agnostic request into Gemini's wire shape.
pub fn build_gemini_request(request: &GenerationRequest) -> GeminiRequest {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for Message { role, content } in &request.messages {
        match role {
            Role::System => system_parts.push(GeminiPart::text(content.clone())),
            Role::User => contents.push(GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart::text(content.clone())],
            }),
            Role::Assistant => contents.push(GeminiContent {
                role: Some("model".to_string()),
                parts: vec![GeminiPart::text(content.clone())],
            }),
        }
    }

    let options = &request.options;
    // Gemini rejects a JSON mime type combined with search grounding.
    let response_mime_type = (options.wants_json() && !options.search_enabled)
        .then(|| "application/json".to_string());

    let generation_config = if options.temperature.is_some()
        || options.max_output_tokens.is_some()
        || response_mime_type.is_some()
    {
        Some(GeminiGenerationConfig {
            temperature: options.temperature,
            max_output_tokens: options.max_output_tokens,
            response_mime_type,
        })
    } else {
        None
    };

    let tools = if options.search_enabled {
        vec![json!({ "googleSearch": {} })]
    } else {
        Vec::new()
    };

    GeminiRequest {
        contents,
        system_instruction: (!system_parts.is_empty()).then(|| GeminiContent {
            role: None,
            parts: system_parts,
        }),
        generation_config,
        tools,
    }
}

fn into_result(model: &str, response: GeminiResponse) -> Result<GenerationResult> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
            .unwrap_or("no candidates returned");
        return Err(GenerationError::new(
            PROVIDER_NAME,
            GenerationErrorKind::InvalidResponse,
            format!("empty response: {reason}"),
        ));
    };

    let text: String = candidate
        .content
        .map(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter(|part| part.thought != Some(true))
        .filter_map(|part| part.text)
        .collect();

    Ok(GenerationResult {
        text,
        model: response.model_version.unwrap_or_else(|| model.to_string()),
        finish_reason: candidate.finish_reason,
    })
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports_search(&self) -> bool {
        true
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let body = build_gemini_request(request);
        log::debug!(
            "Gemini request for model '{}': {} content(s), search={}",
            request.model,
            body.contents.len(),
            request.options.search_enabled
        );

        let builder = self.client.post(self.endpoint(&request.model)).json(&body);
        let builder = match &self.auth {
            GeminiAuth::ApiKey(key) => builder.header("x-goog-api-key", key),
            GeminiAuth::Bearer { token, .. } => builder.bearer_auth(token),
        };

        let response = builder
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER_NAME, err))?;

        let parsed: GeminiResponse = read_json(PROVIDER_NAME, response).await?;
        into_result(&request.model, parsed)
    }
}
