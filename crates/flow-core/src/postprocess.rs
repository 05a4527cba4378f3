//! Post-processing of raw provider text into a flow's output value.

use serde_json::Value;

use crate::error::{FlowError, Result};
use crate::shape::Shape;

const FENCE: &str = "```";

/// What a flow expects back from the model.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputPolicy {
    /// Raw text, returned unchanged.
    Text,
    Json(JsonPolicy),
}

/// Behavior when the model's text is not the JSON the flow declared.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonPolicy {
    /// Fail with [`FlowError::InvalidModelOutput`].
    Strict,
    /// Return a well-shaped default record carrying the raw text, both when
    /// parsing fails and when the parsed value does not fit the output shape.
    Lenient(FallbackRecord),
}

/// Default record substituted by lenient flows; the raw text lands in
/// `raw_field`.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackRecord {
    pub template: Value,
    pub raw_field: String,
}

impl FallbackRecord {
    pub fn new(template: Value, raw_field: impl Into<String>) -> Self {
        Self {
            template,
            raw_field: raw_field.into(),
        }
    }

    pub fn render(&self, raw: &str) -> Value {
        let mut record = self.template.clone();
        match record.as_object_mut() {
            Some(object) => {
                object.insert(self.raw_field.clone(), Value::String(raw.to_string()));
                record
            }
            None => Value::String(raw.to_string()),
        }
    }
}

impl OutputPolicy {
    pub fn strict_json() -> Self {
        OutputPolicy::Json(JsonPolicy::Strict)
    }

    pub fn lenient_json(fallback: FallbackRecord) -> Self {
        OutputPolicy::Json(JsonPolicy::Lenient(fallback))
    }

    pub fn expects_json(&self) -> bool {
        matches!(self, OutputPolicy::Json(_))
    }
}

/// Remove a surrounding markdown code fence, if the text starts with one.
///
/// The opening fence line (including any info string such as `json`) and the
/// closing fence are dropped, then surrounding whitespace is trimmed. On a
/// single line an info string only counts when whitespace follows it, so
/// "```true```" keeps its body.
pub fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix(FENCE) else {
        return trimmed;
    };

    let body = match after_open.find('\n') {
        Some(newline) => &after_open[newline + 1..],
        None => skip_inline_info_string(after_open),
    };

    body.strip_suffix(FENCE).unwrap_or(body).trim()
}

fn skip_inline_info_string(after_open: &str) -> &str {
    let info_len = after_open
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(after_open.len());
    let rest = &after_open[info_len..];
    if info_len > 0 && rest.starts_with(char::is_whitespace) {
        rest
    } else {
        after_open
    }
}

/// Wrap text the way models commonly fence JSON output.
pub fn wrap_in_fence(text: &str) -> String {
    format!("{FENCE}json\n{text}\n{FENCE}")
}

/// Turn raw model text into the flow's output value according to `policy`.
///
/// Lenient policies also check the parsed value against `output_shape` and
/// substitute the fallback record on a mismatch. Strict policies leave shape
/// checks to the dispatcher.
pub fn post_process(raw: &str, policy: &OutputPolicy, output_shape: &Shape) -> Result<Value> {
    let json_policy = match policy {
        OutputPolicy::Text => return Ok(Value::String(raw.to_string())),
        OutputPolicy::Json(json_policy) => json_policy,
    };

    let parsed = serde_json::from_str::<Value>(strip_fence(raw));
    match (json_policy, parsed) {
        (JsonPolicy::Strict, Ok(value)) => Ok(value),
        (JsonPolicy::Strict, Err(err)) => Err(FlowError::InvalidModelOutput {
            raw: raw.to_string(),
            reason: err.to_string(),
        }),
        (JsonPolicy::Lenient(fallback), Ok(value)) => match output_shape.validate(&value, "output") {
            Ok(()) => Ok(value),
            Err(err) => {
                log::warn!("Model output does not match the output shape ({}); using fallback record", err);
                Ok(fallback.render(raw))
            }
        },
        (JsonPolicy::Lenient(fallback), Err(err)) => {
            log::warn!("Model output is not valid JSON ({}); using fallback record", err);
            Ok(fallback.render(raw))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn character_fallback() -> FallbackRecord {
        FallbackRecord::new(
            json!({ "name": "Unknown", "strength": 10, "intelligence": 10 }),
            "description",
        )
    }

    fn character_shape() -> Shape {
        Shape::object([
            ("name", Shape::String),
            ("strength", Shape::Number),
            ("intelligence", Shape::Number),
            ("description", Shape::String),
        ])
    }

    #[test]
    fn text_policy_returns_raw_unchanged() {
        let raw = "  ```json\n{}\n```  ";
        assert_eq!(post_process(raw, &OutputPolicy::Text, &Shape::String).unwrap(), json!(raw));
    }

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"title\":\"x\",\"steps\":[]}\n```";
        assert_eq!(strip_fence(raw), "{\"title\":\"x\",\"steps\":[]}");
    }

    #[test]
    fn strips_bare_fence_and_whitespace() {
        assert_eq!(strip_fence("\n```\n [1, 2] \n```\n"), "[1, 2]");
    }

    #[test]
    fn strips_single_line_fence() {
        assert_eq!(strip_fence("```json {\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn single_line_fence_keeps_body_without_info_string() {
        assert_eq!(strip_fence("```true```"), "true");
        assert_eq!(strip_fence("```42```"), "42");
        assert_eq!(strip_fence("```{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn strict_parses_single_line_fenced_literal() {
        let value = post_process("```true```", &OutputPolicy::strict_json(), &Shape::Any).unwrap();
        assert_eq!(value, json!(true));
    }

    #[test]
    fn unfenced_text_is_only_trimmed() {
        assert_eq!(strip_fence("  {\"a\":1}\n"), "{\"a\":1}");
    }

    #[test]
    fn fence_round_trip_preserves_payload() {
        let payloads = [
            json!({ "title": "x", "steps": [] }),
            json!([1, "two", { "three": 3.5 }]),
            json!("a string with ``` inside"),
            json!(null),
            serde_json::from_str::<Value>("{\n  \"pretty\": true\n}").unwrap(),
        ];
        for payload in payloads {
            for text in [payload.to_string(), serde_json::to_string_pretty(&payload).unwrap()] {
                assert_eq!(strip_fence(&wrap_in_fence(&text)), text);
            }
        }
    }

    #[test]
    fn strict_parses_fenced_json() {
        let raw = wrap_in_fence("{\"title\":\"x\",\"steps\":[]}");
        let value = post_process(&raw, &OutputPolicy::strict_json(), &Shape::Any).unwrap();
        assert_eq!(value, json!({ "title": "x", "steps": [] }));
    }

    #[test]
    fn strict_rejects_malformed_json_with_raw_attached() {
        let raw = "```json\n{\"title\": \"x\",\n```";
        match post_process(raw, &OutputPolicy::strict_json(), &Shape::Any) {
            Err(FlowError::InvalidModelOutput { raw: attached, .. }) => assert_eq!(attached, raw),
            other => panic!("expected InvalidModelOutput, got {other:?}"),
        }
    }

    #[test]
    fn lenient_substitutes_fallback_record() {
        let policy = OutputPolicy::lenient_json(character_fallback());
        let value = post_process("not json at all", &policy, &character_shape()).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "Unknown",
                "strength": 10,
                "intelligence": 10,
                "description": "not json at all"
            })
        );
    }

    #[test]
    fn lenient_passes_valid_json_through() {
        let raw = "{\"name\":\"Grim\",\"strength\":15,\"intelligence\":8,\"description\":\"grumpy\"}";
        let value = post_process(raw, &OutputPolicy::lenient_json(character_fallback()), &character_shape())
            .unwrap();
        assert_eq!(value["name"], "Grim");
    }

    #[test]
    fn lenient_falls_back_when_json_has_the_wrong_shape() {
        let policy = OutputPolicy::lenient_json(character_fallback());
        for raw in ["\"Grim, a grumpy dwarf\"", "42", "{\"name\":\"Grim\"}", "[1, 2]"] {
            let value = post_process(raw, &policy, &character_shape()).unwrap();
            assert_eq!(value["name"], "Unknown", "reply {raw}");
            assert_eq!(value["description"], raw);
            assert!(character_shape().validate(&value, "output").is_ok());
        }
    }

    #[test]
    fn strict_leaves_shape_mismatch_to_the_caller() {
        let value = post_process("42", &OutputPolicy::strict_json(), &character_shape()).unwrap();
        assert_eq!(value, json!(42));
    }
}
