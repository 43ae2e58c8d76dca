use serde::{Deserialize, Serialize};
use serde_json::Value;
use suggest_core::Suggestion;

/// Body of a lookup request. `input` is optional; its absence is an empty
/// lookup rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyError {
    InvalidJson(String),
    InputNotString,
}

impl SuggestRequest {
    /// Any valid JSON document without an `input` member reads as an empty
    /// request; an `input` that is present must be a string.
    pub fn parse(body: &[u8]) -> Result<Self, BodyError> {
        let document: Value = serde_json::from_slice(body)
            .map_err(|error| BodyError::InvalidJson(error.to_string()))?;
        match document.get("input") {
            None => Ok(Self::default()),
            Some(Value::String(input)) => Ok(Self {
                input: Some(input.clone()),
            }),
            Some(_) => Err(BodyError::InputNotString),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub suggestions: Vec<Suggestion>,
}
