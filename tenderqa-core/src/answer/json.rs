//! Recovering the structured answer from free-form model output.

use super::LlmResponse;
use serde_json::{Map, Value};
use thiserror::Error;

/// Why model output could not be turned into an [`LlmResponse`].
#[derive(Debug, Error, PartialEq)]
pub enum ContractError {
    #[error("Model returned an empty response")]
    Empty,

    #[error("No JSON object found in response")]
    NoJsonObject,

    #[error("Response is missing required key `{0}`")]
    MissingKey(&'static str),

    #[error("Key `{key}` has an unusable value: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Extracts the JSON object spanning the first `{` to the last `}` of `text`.
///
/// Returns `None` if there is no such span, it does not parse, or it parses
/// to something other than an object.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    match serde_json::from_str(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Validates an extracted object against the answer contract.
///
/// `answer` must be a string. `confidence` may be a number or a numeric
/// string and is clamped into `[0, 1]`. `sources` may be an array (non-string
/// items are stringified), a single string, or absent.
pub fn parse_llm_response(object: &Map<String, Value>) -> Result<LlmResponse, ContractError> {
    let answer = match object.get("answer") {
        None | Some(Value::Null) => return Err(ContractError::MissingKey("answer")),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(ContractError::InvalidValue {
                key: "answer",
                value: other.to_string(),
            })
        }
    };

    let confidence = match object.get("confidence") {
        None | Some(Value::Null) => return Err(ContractError::MissingKey("confidence")),
        Some(value) => parse_confidence(value).ok_or_else(|| ContractError::InvalidValue {
            key: "confidence",
            value: value.to_string(),
        })?,
    };

    let sources = match object.get("sources") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    };

    Ok(LlmResponse {
        answer,
        confidence: confidence.clamp(0.0, 1.0),
        sources,
    })
}

fn parse_confidence(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Runs extraction and validation over raw model text.
pub fn response_from_text(text: &str) -> Result<LlmResponse, ContractError> {
    if text.trim().is_empty() {
        return Err(ContractError::Empty);
    }
    let object = extract_json_object(text).ok_or(ContractError::NoJsonObject)?;
    parse_llm_response(&object)
}
