//! Declared input/output shapes of a flow and their validation.

use serde_json::{json, Map, Value};

use crate::error::{FlowError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Any,
    String,
    Number,
    Integer,
    Boolean,
    Array(Box<Shape>),
    Object(Vec<Field>),
    /// Accepts `null` (or a missing object field) in addition to the inner shape.
    Optional(Box<Shape>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub shape: Shape,
}

impl Shape {
    pub fn object<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Shape)>,
        S: Into<String>,
    {
        Shape::Object(
            fields
                .into_iter()
                .map(|(name, shape)| Field {
                    name: name.into(),
                    shape,
                })
                .collect(),
        )
    }

    pub fn array(items: Shape) -> Self {
        Shape::Array(Box::new(items))
    }

    pub fn optional(inner: Shape) -> Self {
        Shape::Optional(Box::new(inner))
    }

    fn type_name(&self) -> &'static str {
        match self {
            Shape::Any => "any",
            Shape::String => "string",
            Shape::Number => "number",
            Shape::Integer => "integer",
            Shape::Boolean => "boolean",
            Shape::Array(_) => "array",
            Shape::Object(_) => "object",
            Shape::Optional(inner) => inner.type_name(),
        }
    }

    /// Validate `value`, reporting the first mismatch under `path`
    /// (`input.steps[1].title`).
    pub fn validate(&self, value: &Value, path: &str) -> Result<()> {
        match self {
            Shape::Any => Ok(()),
            Shape::Optional(inner) => {
                if value.is_null() {
                    Ok(())
                } else {
                    inner.validate(value, path)
                }
            }
            Shape::String if value.is_string() => Ok(()),
            Shape::Number if value.is_number() => Ok(()),
            Shape::Integer if value.is_i64() || value.is_u64() => Ok(()),
            Shape::Boolean if value.is_boolean() => Ok(()),
            Shape::Array(items) => {
                let Some(elements) = value.as_array() else {
                    return Err(mismatch(self, value, path));
                };
                for (index, element) in elements.iter().enumerate() {
                    items.validate(element, &format!("{path}[{index}]"))?;
                }
                Ok(())
            }
            Shape::Object(fields) => {
                let Some(object) = value.as_object() else {
                    return Err(mismatch(self, value, path));
                };
                for field in fields {
                    let field_path = format!("{path}.{}", field.name);
                    match object.get(&field.name) {
                        Some(field_value) => field.shape.validate(field_value, &field_path)?,
                        None if matches!(field.shape, Shape::Optional(_) | Shape::Any) => {}
                        None => {
                            return Err(FlowError::validation(field_path, "required field is missing"))
                        }
                    }
                }
                Ok(())
            }
            _ => Err(mismatch(self, value, path)),
        }
    }

    /// JSON-schema flavoured description used when listing flows.
    pub fn describe(&self) -> Value {
        match self {
            Shape::Any => json!({}),
            Shape::Optional(inner) => {
                let mut schema = inner.describe();
                if let Some(object) = schema.as_object_mut() {
                    object.insert("nullable".to_string(), Value::Bool(true));
                }
                schema
            }
            Shape::Array(items) => json!({ "type": "array", "items": items.describe() }),
            Shape::Object(fields) => {
                let mut properties = Map::new();
                let mut required = Vec::new();
                for field in fields {
                    properties.insert(field.name.clone(), field.shape.describe());
                    if !matches!(field.shape, Shape::Optional(_) | Shape::Any) {
                        required.push(Value::String(field.name.clone()));
                    }
                }
                json!({ "type": "object", "properties": properties, "required": required })
            }
            scalar => json!({ "type": scalar.type_name() }),
        }
    }
}

fn mismatch(expected: &Shape, value: &Value, path: &str) -> FlowError {
    let actual = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    FlowError::validation(
        path,
        format!("expected {}, got {}", expected.type_name(), actual),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_shape() -> Shape {
        Shape::object([
            ("title", Shape::String),
            ("steps", Shape::array(Shape::object([("title", Shape::String)]))),
            ("notes", Shape::optional(Shape::String)),
        ])
    }

    fn field_of(err: FlowError) -> String {
        match err {
            FlowError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_conforming_value() {
        let value = json!({ "title": "shed", "steps": [{ "title": "dig" }] });
        assert!(plan_shape().validate(&value, "output").is_ok());
    }

    #[test]
    fn extra_fields_are_allowed() {
        let value = json!({ "title": "shed", "steps": [], "budget": 300 });
        assert!(plan_shape().validate(&value, "output").is_ok());
    }

    #[test]
    fn missing_required_field_is_named() {
        let err = plan_shape().validate(&json!({ "steps": [] }), "output").unwrap_err();
        assert_eq!(field_of(err), "output.title");
    }

    #[test]
    fn nested_mismatch_reports_index_path() {
        let value = json!({ "title": "shed", "steps": [{ "title": "dig" }, { "title": 4 }] });
        let err = plan_shape().validate(&value, "output").unwrap_err();
        assert_eq!(field_of(err), "output.steps[1].title");
    }

    #[test]
    fn optional_accepts_null_and_absence() {
        let shape = Shape::optional(Shape::String);
        assert!(shape.validate(&Value::Null, "input").is_ok());
        assert!(shape.validate(&json!("x"), "input").is_ok());
        assert!(shape.validate(&json!(1), "input").is_err());
    }

    #[test]
    fn integer_rejects_fractions() {
        assert!(Shape::Integer.validate(&json!(10), "v").is_ok());
        assert!(Shape::Integer.validate(&json!(10.5), "v").is_err());
        assert!(Shape::Number.validate(&json!(10.5), "v").is_ok());
    }

    #[test]
    fn describe_marks_required_fields() {
        let schema = plan_shape().describe();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["title", "steps"]));
        assert_eq!(schema["properties"]["steps"]["type"], "array");
        assert_eq!(schema["properties"]["notes"]["nullable"], true);
    }
}
