use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ServiceError;

const MISSING_PROMPT: &str = "Invalid request, 'prompt' is required";
const BLANK_PROMPT: &str = "Prompt must be a non-empty string";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
}

impl GenerationRequest {
    /// Validates a raw `/generate` body.
    pub fn from_body(body: &[u8]) -> Result<Self, ServiceError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|_| ServiceError::InvalidRequest(MISSING_PROMPT.into()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ServiceError> {
        let Value::Object(mut fields) = value else {
            return Err(ServiceError::InvalidRequest(MISSING_PROMPT.into()));
        };
        match fields.remove("prompt") {
            None => Err(ServiceError::InvalidRequest(MISSING_PROMPT.into())),
            Some(Value::String(prompt)) if !prompt.trim().is_empty() => Ok(Self { prompt }),
            Some(_) => Err(ServiceError::InvalidRequest(BLANK_PROMPT.into())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationResponse {
    pub generated_text: String,
}

/// Per-call options bound into every pipeline invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationOptions {
    pub max_new_tokens: usize,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
        }
    }
}

/// Field updates in the order the caller sent them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigPatch(Map<String, Value>);

impl ConfigPatch {
    pub fn from_body(body: &[u8]) -> Result<Self, ServiceError> {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(fields)) => Ok(Self(fields)),
            _ => Err(ServiceError::InvalidRequest(
                "Configuration patch must be a JSON object".into(),
            )),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

impl From<Map<String, Value>> for ConfigPatch {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigApplied {
    pub message: String,
}

impl Default for ConfigApplied {
    fn default() -> Self {
        Self {
            message: "Applied Configuration".into(),
        }
    }
}

/// Body of `GET /config`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigSnapshot {
    pub version: u64,
    pub model_id: String,
    pub config: Map<String, Value>,
}
