//! HTTP helpers shared by the provider implementations.

use flow_core::{GenerationError, GenerationErrorKind};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::provider::Result;

const MAX_ERROR_BODY_CHARS: usize = 500;

pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> GenerationError {
    let kind = if err.is_timeout() {
        GenerationErrorKind::Timeout
    } else {
        GenerationErrorKind::Transport
    };
    GenerationError::new(provider, kind, err.to_string())
}

/// Pull `error.message` out of a provider error body, falling back to the
/// (truncated) raw body.
pub(crate) fn extract_error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let Some(message) = json
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
        {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.chars().count() > MAX_ERROR_BODY_CHARS {
        let truncated: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{truncated}...")
    } else {
        trimmed.to_string()
    }
}

/// Map a non-success status to a typed error, otherwise decode the body.
pub(crate) async fn read_json<T: DeserializeOwned>(provider: &str, response: Response) -> Result<T> {
    let status = response.status();

    if !status.is_success() {
        let body = response
            .text()
            .await
            .map_err(|err| transport_error(provider, err))?;
        return Err(GenerationError::from_status(
            provider,
            status.as_u16(),
            extract_error_message(&body),
        ));
    }

    let body = response
        .text()
        .await
        .map_err(|err| transport_error(provider, err))?;

    serde_json::from_str(&body).map_err(|err| {
        GenerationError::new(
            provider,
            GenerationErrorKind::InvalidResponse,
            format!("could not decode response: {err}"),
        )
    })
}
