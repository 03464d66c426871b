//! Request decoding for the tunnel protocol.
//!
//! A request body is UTF-8 JSON in one of two shapes:
//! - a two-element array: `[securities, fields]`, or
//! - an object with keys `"securities"` and `"fields"`.
//!
//! Both securities and fields must be non-empty arrays of non-empty
//! strings. A request that violates any rule is rejected as a whole; the
//! exchange sends no reply.

use serde_json::{Map, Value};
use thiserror::Error;

/// A decoded, validated lookup request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Security identifiers to look up, e.g. `"ED1 Comdty"`
    pub securities: Vec<String>,
    /// Field names to resolve for each security, e.g. `"PX_MID"`
    pub fields: Vec<String>,
}

/// Why a request body was rejected.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Body is not UTF-8 or not valid JSON
    #[error("malformed request syntax: {0}")]
    MalformedSyntax(String),
    /// Top level is neither an object nor a two-element array
    #[error("unsupported request shape: expected [securities, fields] or an object with keys 'securities' and 'fields'")]
    UnsupportedShape,
    /// Object shape lacks a required key
    #[error("request object is missing key '{0}'")]
    MissingKey(&'static str),
    /// Securities or fields is not a non-empty array of non-empty strings
    #[error("securities and fields must be non-empty arrays of non-empty strings")]
    InvalidFieldType,
}

/// Top-level classification of a decoded request value. Classification
/// happens before any extraction; each variant has its own extraction rule.
#[derive(Debug)]
enum RequestShape {
    /// `[securities, fields]`, positional
    SequenceForm(Vec<Value>),
    /// `{"securities": ..., "fields": ...}`, keyed
    MappingForm(Map<String, Value>),
    /// Anything else; always rejected
    Other,
}

fn classify(value: Value) -> RequestShape {
    match value {
        Value::Array(items) => RequestShape::SequenceForm(items),
        Value::Object(map) => RequestShape::MappingForm(map),
        _ => RequestShape::Other,
    }
}

/// Decode and validate one request body.
pub fn decode(body: &[u8]) -> Result<Query, RequestError> {
    let text = std::str::from_utf8(body)
        .map_err(|e| RequestError::MalformedSyntax(e.to_string()))?;
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| RequestError::MalformedSyntax(e.to_string()))?;

    let (securities, fields) = match classify(value) {
        RequestShape::SequenceForm(mut items) => {
            if items.len() != 2 {
                return Err(RequestError::UnsupportedShape);
            }
            let fields = items.remove(1);
            let securities = items.remove(0);
            (securities, fields)
        }
        RequestShape::MappingForm(mut map) => {
            let securities = map
                .remove("securities")
                .ok_or(RequestError::MissingKey("securities"))?;
            let fields = map
                .remove("fields")
                .ok_or(RequestError::MissingKey("fields"))?;
            (securities, fields)
        }
        RequestShape::Other => return Err(RequestError::UnsupportedShape),
    };

    Ok(Query {
        securities: string_list(securities)?,
        fields: string_list(fields)?,
    })
}

/// Extract a non-empty list of non-empty strings, rejecting anything else.
fn string_list(value: Value) -> Result<Vec<String>, RequestError> {
    let items = match value {
        Value::Array(items) => items,
        _ => return Err(RequestError::InvalidFieldType),
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) if !s.is_empty() => out.push(s),
            _ => return Err(RequestError::InvalidFieldType),
        }
    }

    if out.is_empty() {
        return Err(RequestError::InvalidFieldType);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_form() {
        let query = decode(br#"[["E1", "E2"], ["F1"]]"#).unwrap();
        assert_eq!(query.securities, vec!["E1", "E2"]);
        assert_eq!(query.fields, vec!["F1"]);
    }

    #[test]
    fn test_mapping_form() {
        let query =
            decode(br#"{"securities": ["E1", "E2"], "fields": ["F1"]}"#).unwrap();
        assert_eq!(query.securities, vec!["E1", "E2"]);
        assert_eq!(query.fields, vec!["F1"]);
    }

    #[test]
    fn test_shape_equivalence() {
        let from_seq = decode(br#"[["E1"], ["F1", "F2"]]"#).unwrap();
        let from_map =
            decode(br#"{"securities": ["E1"], "fields": ["F1", "F2"]}"#).unwrap();
        assert_eq!(from_seq, from_map);
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let query = decode(b"  [[\"E1\"], [\"F1\"]]\n").unwrap();
        assert_eq!(query.securities, vec!["E1"]);
    }

    #[test]
    fn test_rejects_malformed_syntax() {
        assert!(matches!(
            decode(b"not json"),
            Err(RequestError::MalformedSyntax(_))
        ));
        assert!(matches!(
            decode(&[0xff, 0xfe]),
            Err(RequestError::MalformedSyntax(_))
        ));
    }

    #[test]
    fn test_rejects_unsupported_shapes() {
        assert!(matches!(
            decode(br#""just a string""#),
            Err(RequestError::UnsupportedShape)
        ));
        assert!(matches!(decode(b"42"), Err(RequestError::UnsupportedShape)));
        // Three-element sequence
        assert!(matches!(
            decode(br#"[["E1"], ["F1"], ["X"]]"#),
            Err(RequestError::UnsupportedShape)
        ));
        // One-element sequence
        assert!(matches!(
            decode(br#"[["E1"]]"#),
            Err(RequestError::UnsupportedShape)
        ));
    }

    #[test]
    fn test_rejects_missing_keys() {
        assert!(matches!(
            decode(br#"{"securities": ["E1"]}"#),
            Err(RequestError::MissingKey("fields"))
        ));
        assert!(matches!(
            decode(br#"{"fields": ["F1"]}"#),
            Err(RequestError::MissingKey("securities"))
        ));
    }

    #[test]
    fn test_rejects_invalid_element_types() {
        // Non-string elements
        assert!(matches!(
            decode(br#"[["E1", 2], ["F1"]]"#),
            Err(RequestError::InvalidFieldType)
        ));
        // Non-array securities
        assert!(matches!(
            decode(br#"{"securities": "E1", "fields": ["F1"]}"#),
            Err(RequestError::InvalidFieldType)
        ));
        // Empty string element
        assert!(matches!(
            decode(br#"[["E1"], [""]]"#),
            Err(RequestError::InvalidFieldType)
        ));
    }

    #[test]
    fn test_rejects_empty_lists() {
        assert!(matches!(
            decode(br#"[[], ["F1"]]"#),
            Err(RequestError::InvalidFieldType)
        ));
        assert!(matches!(
            decode(br#"[["E1"], []]"#),
            Err(RequestError::InvalidFieldType)
        ));
    }
}
