//! Tagged values carried across the link.
//!
//! Configuration and event properties travel as `(key, declaredType, rawValue)`
//! triples and are converted on the agent side. Extension payloads use a small
//! closed set of value kinds with an explicit per-extension shape.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<TypedValue>),
    Map(BTreeMap<String, TypedValue>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ValueKind {
    String,
    Integer,
    Float,
    Boolean,
    List,
    Map,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::String => "string",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Boolean => "boolean",
            ValueKind::List => "list",
            ValueKind::Map => "map",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConversionError {
    #[error("null is not a valid value for '{key}'")]
    Null { key: String },
    #[error("'{key}' expected {expected} but got {found}")]
    KindMismatch {
        key: String,
        expected: String,
        found: String,
    },
    #[error("'{key}' cannot be parsed as {expected}: {raw}")]
    Unparseable {
        key: String,
        expected: String,
        raw: String,
    },
    #[error("required field '{key}' is missing")]
    MissingField { key: String },
    #[error("'{key}' is out of range for {expected}")]
    OutOfRange { key: String, expected: String },
}

impl TypedValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            TypedValue::String(_) => ValueKind::String,
            TypedValue::Integer(_) => ValueKind::Integer,
            TypedValue::Float(_) => ValueKind::Float,
            TypedValue::Boolean(_) => ValueKind::Boolean,
            TypedValue::List(_) => ValueKind::List,
            TypedValue::Map(_) => ValueKind::Map,
        }
    }

    pub fn from_json(key: &str, value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Err(ConversionError::Null {
                key: key.to_string(),
            }),
            Value::Bool(flag) => Ok(TypedValue::Boolean(*flag)),
            Value::Number(number) => {
                if let Some(integer) = number.as_i64() {
                    Ok(TypedValue::Integer(integer))
                } else if let Some(float) = number.as_f64() {
                    Ok(TypedValue::Float(float))
                } else {
                    Err(ConversionError::OutOfRange {
                        key: key.to_string(),
                        expected: ValueKind::Integer.to_string(),
                    })
                }
            }
            Value::String(text) => Ok(TypedValue::String(text.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| TypedValue::from_json(key, item))
                .collect::<Result<Vec<_>, _>>()
                .map(TypedValue::List),
            Value::Object(entries) => entries
                .iter()
                .map(|(name, item)| {
                    TypedValue::from_json(&format!("{key}.{name}"), item)
                        .map(|value| (name.clone(), value))
                })
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(TypedValue::Map),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            TypedValue::String(text) => Value::String(text.clone()),
            TypedValue::Integer(integer) => Value::Number((*integer).into()),
            TypedValue::Float(float) => Number::from_f64(*float)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            TypedValue::Boolean(flag) => Value::Bool(*flag),
            TypedValue::List(items) => Value::Array(items.iter().map(TypedValue::to_json).collect()),
            TypedValue::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

pub type Payload = BTreeMap<String, TypedValue>;

pub fn payload_to_json(payload: &Payload) -> Map<String, Value> {
    payload
        .iter()
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub kind: ValueKind,
    pub required: bool,
}

/// Declared input shape of an extension.
#[derive(Debug, Clone, Default)]
pub struct PayloadShape {
    fields: BTreeMap<String, FieldSpec>,
}

impl PayloadShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, key: impl Into<String>, kind: ValueKind) -> Self {
        self.fields.insert(
            key.into(),
            FieldSpec {
                kind,
                required: true,
            },
        );
        self
    }

    pub fn optional(mut self, key: impl Into<String>, kind: ValueKind) -> Self {
        self.fields.insert(
            key.into(),
            FieldSpec {
                kind,
                required: false,
            },
        );
        self
    }

    /// Converts a generic context map into this shape. Integers widen to
    /// floats where a float is declared; every other mismatch is rejected.
    pub fn conform(&self, input: &Map<String, Value>) -> Result<Payload, ConversionError> {
        for key in input.keys() {
            if !self.fields.contains_key(key) {
                tracing::debug!(key = %key, "dropping undeclared extension input field");
            }
        }

        let mut payload = Payload::new();
        for (key, spec) in &self.fields {
            let Some(raw) = input.get(key) else {
                if spec.required {
                    return Err(ConversionError::MissingField { key: key.clone() });
                }
                continue;
            };
            let value = TypedValue::from_json(key, raw)?;
            let value = match (spec.kind, value) {
                (ValueKind::Float, TypedValue::Integer(integer)) => TypedValue::Float(integer as f64),
                (expected, value) if value.kind() == expected => value,
                (expected, value) => {
                    return Err(ConversionError::KindMismatch {
                        key: key.clone(),
                        expected: expected.to_string(),
                        found: value.kind().to_string(),
                    })
                }
            };
            payload.insert(key.clone(), value);
        }
        Ok(payload)
    }
}

/// Declared type of a configuration or event property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    String,
    Password,
    Char,
    Boolean,
    Integer,
    Long,
    Float,
    Double,
    StringArray,
    IntegerArray,
    LongArray,
    DoubleArray,
    BooleanArray,
}

impl ValueType {
    fn element(self) -> Option<ValueType> {
        match self {
            ValueType::StringArray => Some(ValueType::String),
            ValueType::IntegerArray => Some(ValueType::Integer),
            ValueType::LongArray => Some(ValueType::Long),
            ValueType::DoubleArray => Some(ValueType::Double),
            ValueType::BooleanArray => Some(ValueType::Boolean),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Password => "password",
            ValueType::Char => "char",
            ValueType::Boolean => "boolean",
            ValueType::Integer => "integer",
            ValueType::Long => "long",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::StringArray => "string array",
            ValueType::IntegerArray => "integer array",
            ValueType::LongArray => "long array",
            ValueType::DoubleArray => "double array",
            ValueType::BooleanArray => "boolean array",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigValue {
    pub key: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[schema(value_type = Object)]
    pub value: Value,
}

impl ConfigValue {
    pub fn new(key: impl Into<String>, value_type: ValueType, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value_type,
            value: value.into(),
        }
    }

    pub fn convert(&self) -> Result<TypedValue, ConversionError> {
        match self.value_type.element() {
            Some(element) => {
                let items: Vec<Value> = match &self.value {
                    Value::Array(items) => items.clone(),
                    Value::String(text) if text.trim().is_empty() => Vec::new(),
                    Value::String(text) => text
                        .split(',')
                        .map(|part| Value::String(part.trim().to_string()))
                        .collect(),
                    Value::Null => {
                        return Err(ConversionError::Null {
                            key: self.key.clone(),
                        })
                    }
                    other => vec![other.clone()],
                };
                items
                    .iter()
                    .map(|item| convert_scalar(&self.key, element, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(TypedValue::List)
            }
            None => convert_scalar(&self.key, self.value_type, &self.value),
        }
    }
}

fn convert_scalar(key: &str, value_type: ValueType, raw: &Value) -> Result<TypedValue, ConversionError> {
    let unparseable = || ConversionError::Unparseable {
        key: key.to_string(),
        expected: value_type.label().to_string(),
        raw: raw.to_string(),
    };
    match (value_type, raw) {
        (_, Value::Null) => Err(ConversionError::Null {
            key: key.to_string(),
        }),
        (ValueType::String | ValueType::Password, Value::String(text)) => {
            Ok(TypedValue::String(text.clone()))
        }
        (ValueType::String | ValueType::Password, Value::Number(_) | Value::Bool(_)) => {
            Ok(TypedValue::String(raw.to_string()))
        }
        (ValueType::Char, Value::String(text)) => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => Ok(TypedValue::String(ch.to_string())),
                _ => Err(unparseable()),
            }
        }
        (ValueType::Boolean, Value::Bool(flag)) => Ok(TypedValue::Boolean(*flag)),
        (ValueType::Boolean, Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(TypedValue::Boolean(true)),
            "false" => Ok(TypedValue::Boolean(false)),
            _ => Err(unparseable()),
        },
        (ValueType::Integer | ValueType::Long, _) => {
            let parsed = match raw {
                Value::Number(number) => number.as_i64(),
                Value::String(text) => text.trim().parse::<i64>().ok(),
                _ => None,
            }
            .ok_or_else(unparseable)?;
            if value_type == ValueType::Integer && i32::try_from(parsed).is_err() {
                return Err(ConversionError::OutOfRange {
                    key: key.to_string(),
                    expected: value_type.label().to_string(),
                });
            }
            Ok(TypedValue::Integer(parsed))
        }
        (ValueType::Float | ValueType::Double, _) => {
            let parsed = match raw {
                Value::Number(number) => number.as_f64(),
                Value::String(text) => text.trim().parse::<f64>().ok(),
                _ => None,
            }
            .ok_or_else(unparseable)?;
            Ok(TypedValue::Float(parsed))
        }
        _ => Err(unparseable()),
    }
}

/// Converts a property list, stopping at the first value that does not fit
/// its declared type.
pub fn convert_properties(values: &[ConfigValue]) -> Result<BTreeMap<String, TypedValue>, ConversionError> {
    values
        .iter()
        .map(|value| value.convert().map(|typed| (value.key.clone(), typed)))
        .collect()
}

/// Converts an untyped property map (used by the configuration batch call).
pub fn convert_untyped(values: &Map<String, Value>) -> Result<BTreeMap<String, TypedValue>, ConversionError> {
    values
        .iter()
        .map(|(key, value)| TypedValue::from_json(key, value).map(|typed| (key.clone(), typed)))
        .collect()
}
