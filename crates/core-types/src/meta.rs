use crate::error::CoreError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Free-form annotations attached to every leg of a trade (quoted rate, provider, notes).
///
/// The payload is always a JSON object and is bounded in size; it is checked once
/// when it enters the system and stored verbatim afterwards.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct EntryMeta(Map<String, Value>);

impl EntryMeta {
    /// Largest accepted payload, measured on its compact JSON encoding.
    pub const MAX_ENCODED_BYTES: usize = 4096;

    pub fn empty() -> Self {
        Self::default()
    }

    /// Accepts `null` (treated as empty) or a JSON object within the size bound.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let map = match value {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(CoreError::invalid(
                    "meta",
                    format!("expected a JSON object, got {}", json_kind(&other)),
                ));
            }
        };

        let encoded_len = serde_json::to_vec(&map)
            .map_err(|e| CoreError::invalid("meta", e.to_string()))?
            .len();
        if encoded_len > Self::MAX_ENCODED_BYTES {
            return Err(CoreError::invalid(
                "meta",
                format!(
                    "payload is {} bytes, limit is {}",
                    encoded_len,
                    Self::MAX_ENCODED_BYTES
                ),
            ));
        }

        Ok(Self(map))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl TryFrom<Value> for EntryMeta {
    type Error = CoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl<'de> Deserialize<'de> for EntryMeta {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        EntryMeta::from_value(value).map_err(serde::de::Error::custom)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
