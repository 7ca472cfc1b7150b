//! Content accepted by writes, and the reader returned by reads.

use std::path::Path;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

use crate::config::JsonSpacer;
use crate::error::{StoreError, StoreResult};
use crate::record::RecordHandle;

/// Line separator used when appending text.
#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

/// Something that can be written to a record.
///
/// Only JSON objects and strings are writable `Json` values; other JSON
/// kinds are rejected with `InvalidContentType`.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Bytes(Vec<u8>),
    Text(String),
    Json(Value),
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Content::Bytes(bytes)
    }
}

impl From<&[u8]> for Content {
    fn from(bytes: &[u8]) -> Self {
        Content::Bytes(bytes.to_vec())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Content::Json(value)
    }
}

impl From<Map<String, Value>> for Content {
    fn from(map: Map<String, Value>) -> Self {
        Content::Json(Value::Object(map))
    }
}

/// Name of a JSON value's kind, for error messages.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Content {
    /// Serialize to the bytes that get staged. `path` names the target in
    /// errors.
    pub fn into_bytes(self, path: &Path, spacer: &JsonSpacer) -> StoreResult<Vec<u8>> {
        match self {
            Content::Bytes(bytes) => Ok(bytes),
            Content::Text(text) => Ok(text.into_bytes()),
            Content::Json(Value::String(text)) => Ok(text.into_bytes()),
            Content::Json(value @ Value::Object(_)) => to_json_bytes(&value, spacer),
            Content::Json(other) => Err(StoreError::InvalidContentType {
                path: path.to_path_buf(),
                actual: json_kind(&other),
            }),
        }
    }

    /// The value a reader would return for this content.
    pub fn to_value(&self) -> Value {
        match self {
            Content::Bytes(bytes) => decode(bytes),
            Content::Text(text) => Value::String(text.clone()),
            Content::Json(value) => value.clone(),
        }
    }
}

/// Serialize a document with the configured indentation.
pub(crate) fn to_json_bytes(value: &Value, spacer: &JsonSpacer) -> StoreResult<Vec<u8>> {
    let Some(indent) = spacer.indent() else {
        return Ok(serde_json::to_vec(value)?);
    };
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(indent.as_bytes());
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// Decode stored bytes: JSON if it parses, otherwise the text itself.
pub fn decode(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// View over a record returned by `read`.
///
/// Falls back to the default for empty or deleted records, when one was
/// given.
#[derive(Debug, Clone)]
pub struct Reader {
    record: RecordHandle,
    default: Option<Content>,
    spacer: JsonSpacer,
}

impl Reader {
    pub(crate) fn new(record: RecordHandle, default: Option<Content>, spacer: JsonSpacer) -> Self {
        Self {
            record,
            default,
            spacer,
        }
    }

    fn live_contents(&self) -> Option<Vec<u8>> {
        let record = self.record.read();
        if record.is_deleted() {
            None
        } else {
            record.file.contents.clone()
        }
    }

    /// Raw bytes, or the serialized default.
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        if let Some(bytes) = self.live_contents() {
            return Ok(bytes);
        }
        match &self.default {
            Some(default) => default.clone().into_bytes(self.record.path(), &self.spacer),
            None => Ok(Vec::new()),
        }
    }

    /// Contents as text, lossily decoded.
    pub fn to_text(&self) -> StoreResult<String> {
        Ok(String::from_utf8_lossy(&self.to_bytes()?).into_owned())
    }

    /// Contents parsed as JSON, or the plain string when they don't parse.
    /// A default is returned as given.
    pub fn to_value(&self) -> Value {
        match (self.live_contents(), &self.default) {
            (Some(bytes), _) => decode(&bytes),
            (None, Some(default)) => default.to_value(),
            (None, None) => Value::String(String::new()),
        }
    }

    /// The underlying record.
    pub fn to_record(&self) -> RecordHandle {
        self.record.clone()
    }
}
