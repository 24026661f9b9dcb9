//! Bus events and their conversion into chat messages.
//!
//! This module provides the pieces between a raw bus frame and display text:
//! - Decoding a `(topic, payload)` frame into an [`Event`]
//! - Resolving the tag variant used to pick a template
//! - The template registry and the message renderer

pub mod render;
pub mod template;

use serde_json::{Map, Value};
use thiserror::Error;

// Constants.

/// Ordered tag variant rules: `(data flag, tag suffix)`.
///
/// Only the first rule whose flag is truthy applies, so `forced` wins over
/// `job_failed` when an event sets both.
pub const VARIANT_RULES: &[(&str, &str)] = &[("forced", ":forced"), ("job_failed", ":failed")];

// Errors.

/// Reasons a bus frame could not be turned into an [`Event`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Expected a two-part message (topic, payload), got {0} parts")]
    PartCount(usize),

    #[error("Payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Payload has no string `tag` field")]
    MissingTag,

    #[error("Payload has no object `data` field")]
    MissingData,
}

// Structs.

/// A decoded bus event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Dotted, namespaced event tag, e.g. `_lk.job.package-build-success`.
    pub tag: String,
    /// Event fields, passed through untouched.
    pub data: Map<String, Value>,
}

impl Event {
    pub fn new(tag: impl Into<String>, data: Map<String, Value>) -> Self {
        Self { tag: tag.into(), data }
    }

    /// Decode a multipart bus message, which must be exactly `[topic, payload]`.
    pub fn from_parts(parts: &[Vec<u8>]) -> Result<Self, DecodeError> {
        match parts {
            [topic, payload] => Self::decode(topic, payload),
            _ => Err(DecodeError::PartCount(parts.len())),
        }
    }

    /// Decode a `(topic, payload)` frame.
    ///
    /// The topic is not used for decoding; the tag always comes from the payload.
    pub fn decode(_topic: &[u8], payload: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(payload)?;

        let Value::Object(mut object) = serde_json::from_str::<Value>(text)? else {
            return Err(DecodeError::NotAnObject);
        };

        let tag = match object.remove("tag") {
            Some(Value::String(tag)) => tag,
            _ => return Err(DecodeError::MissingTag),
        };

        let data = match object.remove("data") {
            Some(Value::Object(data)) => data,
            _ => return Err(DecodeError::MissingData),
        };

        Ok(Self { tag, data })
    }

    /// The tag augmented with at most one variant suffix.
    pub fn tag_variant(&self) -> String {
        let suffix = VARIANT_RULES.iter().find(|(flag, _)| self.data.get(*flag).is_some_and(is_truthy)).map(|(_, suffix)| *suffix);

        match suffix {
            Some(suffix) => format!("{}{}", self.tag, suffix),
            None => self.tag.clone(),
        }
    }
}

// Helpers.

/// Truthiness of a data flag: `false`, `null`, zero, and empty values are false.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

// Tests.
