//! External record identifier extraction.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

/// Default identifier field of Crossref works.
pub const DEFAULT_KEY_FIELD: &str = "URL";

/// Where a record's external identifier lives.
///
/// A name starting with `/` is an RFC 6901 JSON pointer (`/message/DOI`);
/// anything else is a single top-level member whose name is taken literally,
/// dots included (`finc.record_id`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyField {
    /// Top-level member name.
    Field(String),
    /// JSON pointer.
    Pointer(String),
}

impl KeyField {
    /// Parses a field specification. Empty input yields the default field.
    #[must_use]
    pub fn new(spec: &str) -> Self {
        let spec = spec.trim();
        if spec.is_empty() {
            Self::default()
        } else if spec.starts_with('/') {
            Self::Pointer(spec.to_string())
        } else {
            Self::Field(spec.to_string())
        }
    }

    /// Extracts the identifier from `record`.
    ///
    /// Non-empty strings are returned as-is and numbers are rendered in their
    /// JSON form. Missing members, `null`, empty strings, booleans, arrays and
    /// objects all count as "no identifier".
    ///
    /// The key is untyped: the number `1` and the string `"1"` yield the same
    /// identifier, so records carrying them are treated as one record when
    /// deduplicating and merging. The indicator file stores identifiers as
    /// plain text and could not tell them apart either.
    ///
    /// ```
    /// use harvester_core::key::KeyField;
    /// use serde_json::json;
    ///
    /// let field = KeyField::new("finc.record_id");
    /// assert_eq!(field.extract(&json!({"finc.record_id": "ai-49-x"})), Some("ai-49-x".into()));
    /// assert_eq!(KeyField::new("/id").extract(&json!({"id": 7})), Some("7".into()));
    /// assert_eq!(KeyField::new("id").extract(&json!({"id": null})), None);
    /// ```
    #[must_use]
    pub fn extract(&self, record: &Value) -> Option<String> {
        let value = match self {
            Self::Field(name) => record.get(name.as_str()),
            Self::Pointer(pointer) => record.pointer(pointer),
        }?;
        match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn spec(&self) -> &str {
        match self {
            Self::Field(s) | Self::Pointer(s) => s,
        }
    }
}

impl Default for KeyField {
    fn default() -> Self {
        Self::Field(DEFAULT_KEY_FIELD.to_string())
    }
}

impl FromStr for KeyField {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl fmt::Display for KeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spec())
    }
}
