//! Defensive parsing of annotator responses.
//!
//! The annotator is a remote service: its JSON may be partial or wrong in
//! any field. A malformed *entry* is dropped on its own with a logged
//! [`DropReason`]; only a malformed *envelope* fails the whole response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::EngineError;

/// One schema-valid annotation as reported against the request snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAnnotation {
    pub id: String,
    pub kind: String,
    pub start: usize,
    pub end: usize,
    pub original: String,
    pub suggestions: Vec<String>,
    pub explanation: String,
    pub confidence: f32,
}

/// Parsed result of one annotator call; this is what the cache stores
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckResponse {
    pub annotations: Vec<RawAnnotation>,
    /// Entries dropped by schema validation
    pub dropped: usize,
}

/// Why a single returned annotation was discarded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DropReason {
    #[error("entry is not an object")]
    NotAnObject,
    #[error("missing or non-numeric `{0}`")]
    BadPosition(&'static str),
    #[error("empty range {start}..{end}")]
    EmptyRange { start: usize, end: usize },
    #[error("range {start}..{end} outside text of length {len}")]
    OutOfBounds { start: usize, end: usize, len: usize },
    #[error("missing or empty `original`")]
    MissingOriginal,
    #[error("missing or empty `suggestions`")]
    NoSuggestions,
    #[error("drifted: {0:?} not found near its reported position")]
    Unrepairable(String),
    #[error("overlaps annotation {0}")]
    Overlaps(String),
}

/// Parse an annotator response for a snapshot of `snapshot_len` characters.
///
/// Expected envelope: `{"errors": [{id, kind, start, end, original,
/// suggestions, explanation, confidence}, ...]}`.
pub fn parse_check_response(
    body: &Value,
    snapshot_len: usize,
) -> Result<CheckResponse, EngineError> {
    let errors = body
        .get("errors")
        .ok_or_else(|| EngineError::MalformedResponse("missing `errors` field".to_string()))?
        .as_array()
        .ok_or_else(|| EngineError::MalformedResponse("`errors` is not an array".to_string()))?;

    let mut response = CheckResponse::default();
    for (index, entry) in errors.iter().enumerate() {
        match parse_entry(entry, snapshot_len) {
            Ok(annotation) => response.annotations.push(annotation),
            Err(reason) => {
                log::warn!("Dropping annotation #{index}: {reason}");
                response.dropped += 1;
            }
        }
    }
    Ok(response)
}

fn parse_entry(entry: &Value, snapshot_len: usize) -> Result<RawAnnotation, DropReason> {
    let object = entry.as_object().ok_or(DropReason::NotAnObject)?;

    let start = position(object.get("start")).ok_or(DropReason::BadPosition("start"))?;
    let end = position(object.get("end")).ok_or(DropReason::BadPosition("end"))?;
    if start >= end {
        return Err(DropReason::EmptyRange { start, end });
    }
    if end > snapshot_len {
        return Err(DropReason::OutOfBounds {
            start,
            end,
            len: snapshot_len,
        });
    }

    let original = object
        .get("original")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(DropReason::MissingOriginal)?
        .to_string();

    let suggestions: Vec<String> = object
        .get("suggestions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if suggestions.is_empty() {
        return Err(DropReason::NoSuggestions);
    }

    let id = object
        .get("id")
        .and_then(id_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let kind = object
        .get("kind")
        .or_else(|| object.get("type"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("other")
        .to_string();

    let explanation = object
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0) as f32)
        .unwrap_or(1.0);

    Ok(RawAnnotation {
        id,
        kind,
        start,
        end,
        original,
        suggestions,
        explanation,
        confidence,
    })
}

/// Non-negative integral JSON number
fn position(value: Option<&Value>) -> Option<usize> {
    let value = value?;
    if let Some(n) = value.as_u64() {
        return usize::try_from(n).ok();
    }
    let f = value.as_f64()?;
    (f.is_finite() && f >= 0.0 && f.fract() == 0.0).then_some(f as usize)
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
