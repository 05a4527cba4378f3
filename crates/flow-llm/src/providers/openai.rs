//! OpenAI-compatible Chat Completions provider.

use async_trait::async_trait;
use flow_core::{GenerationError, GenerationErrorKind, GenerationRequest, GenerationResult};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::common::{read_json, transport_error};
use crate::provider::{GenerationProvider, Result};

pub const PROVIDER_NAME: &str = "openai";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

/// Build the non-streaming `/chat/completions` body.
pub fn build_openai_body(request: &GenerationRequest) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|message| {
            json!({
                "role": message.role.as_str(),
                "content": message.content,
            })
        })
        .collect();

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "stream": false,
    });

    let options = &request.options;
    if let Some(temperature) = options.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = options.max_output_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if options.wants_json() {
        body["response_format"] = json!({ "type": "json_object" });
    }

    body
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl GenerationProvider for OpenAIProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        if request.options.search_enabled {
            return Err(GenerationError::new(
                PROVIDER_NAME,
                GenerationErrorKind::InvalidRequest,
                "web search grounding is not supported by this provider",
            ));
        }

        let url = format!("{}/chat/completions", self.base_url);
        log::debug!(
            "OpenAI request for model '{}': {} message(s)",
            request.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&build_openai_body(request))
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER_NAME, err))?;

        let completion: ChatCompletion = read_json(PROVIDER_NAME, response).await?;
        let choice = completion.choices.into_iter().next().ok_or_else(|| {
            GenerationError::new(
                PROVIDER_NAME,
                GenerationErrorKind::InvalidResponse,
                "response contained no choices",
            )
        })?;

        Ok(GenerationResult {
            text: choice.message.content.unwrap_or_default(),
            model: completion.model.unwrap_or_else(|| request.model.clone()),
            finish_reason: choice.finish_reason,
        })
    }
}
