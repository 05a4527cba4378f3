use actix_web::{web, HttpResponse};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::logging::Timer;
use crate::state::AppState;

/// Pull the flow input out of a `{"data": ...}` envelope.
///
/// An empty body or an envelope without `data` means `null` input.
fn extract_input(body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    let envelope: Value =
        serde_json::from_slice(body).map_err(|err| ApiError::InvalidBody(err.to_string()))?;
    match envelope {
        Value::Object(mut object) => Ok(object.remove("data").unwrap_or(Value::Null)),
        _ => Err(ApiError::InvalidBody(
            "expected a JSON object of the form {\"data\": ...}".to_string(),
        )),
    }
}

pub async fn handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let name = path.into_inner();
    let request_id = Uuid::new_v4().to_string();
    let timer = Timer::new(format!("flow '{name}'"));

    let input = extract_input(&body)?;
    log::info!("[{}] Invoking flow '{}'", request_id, name);

    match state.registry.dispatch(&name, input).await {
        Ok(result) => {
            timer.debug(&request_id);
            Ok(HttpResponse::Ok().json(json!({ "result": result })))
        }
        Err(err) => {
            log::warn!("[{}] Flow '{}' failed: {}", request_id, name, err);
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_null_input() {
        assert_eq!(extract_input(b"").unwrap(), Value::Null);
        assert_eq!(extract_input(b" \n").unwrap(), Value::Null);
    }

    #[test]
    fn envelope_without_data_is_null_input() {
        assert_eq!(extract_input(br#"{"other":1}"#).unwrap(), Value::Null);
        assert_eq!(extract_input(br#"{"data":"hi"}"#).unwrap(), json!("hi"));
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert!(matches!(extract_input(b"[1,2]"), Err(ApiError::InvalidBody(_))));
        assert!(matches!(extract_input(b"{oops"), Err(ApiError::InvalidBody(_))));
    }
}
