use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use flow_core::{FlowError, GenerationErrorKind};
use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),
}

#[derive(Serialize)]
struct JsonError {
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw: Option<String>,
}

#[derive(Serialize)]
struct JsonErrorWrapper {
    error: JsonError,
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::Flow(err) => err.code(),
            ApiError::InvalidBody(_) => "INVALID_ARGUMENT",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Flow(err) => match err {
                FlowError::Validation { .. } => StatusCode::BAD_REQUEST,
                FlowError::FlowNotFound(_) | FlowError::ProviderNotConfigured { .. } => {
                    StatusCode::NOT_FOUND
                }
                FlowError::Generation(generation) => match generation.kind {
                    GenerationErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    GenerationErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                    _ => StatusCode::BAD_GATEWAY,
                },
                FlowError::InvalidModelOutput { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let raw = match self {
            ApiError::Flow(FlowError::InvalidModelOutput { raw, .. }) => Some(raw.clone()),
            _ => None,
        };
        let body = JsonErrorWrapper {
            error: JsonError {
                status: self.code(),
                message: self.to_string(),
                raw,
            },
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
