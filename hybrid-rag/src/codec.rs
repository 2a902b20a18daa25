//! Normalisation of stored chunk payloads.
//!
//! Embedding, entity, token and POS columns have been written in two physical
//! shapes over time: a native JSON array, or a string holding JSON-encoded
//! text of that array. Store adapters call the `decode_*` functions here so
//! that everything downstream sees exactly one canonical type per field.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::document::{ChunkField, ChunkId, Decoded, Embedding, Entity, PosTag};
use crate::error::RetrievalError;

/// A stored payload that could not be decoded.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct PayloadError {
    /// The field that failed to decode.
    pub field: ChunkField,
    /// A description of the failure.
    pub message: String,
}

impl PayloadError {
    fn new(field: ChunkField, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }

    /// Attach the chunk id, producing the crate-level error.
    pub fn into_retrieval_error(self, chunk_id: ChunkId) -> RetrievalError {
        RetrievalError::DeserializationError { chunk_id, field: self.field, message: self.message }
    }
}

/// Unwrap a JSON-encoded string into the value it encodes.
///
/// Only one level of encoding is accepted.
fn unwrap_encoded(field: ChunkField, value: &Value) -> Decoded<Option<Value>> {
    match value {
        Value::Null => Ok(None),
        Value::String(raw) => {
            let inner: Value = serde_json::from_str(raw)
                .map_err(|e| PayloadError::new(field, format!("invalid JSON text: {e}")))?;
            match inner {
                Value::Null => Ok(None),
                Value::String(_) => {
                    Err(PayloadError::new(field, "payload is JSON-encoded more than once"))
                }
                other => Ok(Some(other)),
            }
        }
        other => Ok(Some(other.clone())),
    }
}

/// Decode a stored embedding into a vector of finite floats.
///
/// A missing embedding is an error: a chunk without one cannot be ranked.
pub fn decode_embedding(value: &Value) -> Decoded<Embedding> {
    let field = ChunkField::Embedding;
    let Some(value) = unwrap_encoded(field, value)? else {
        return Err(PayloadError::new(field, "embedding is missing"));
    };
    let Value::Array(items) = value else {
        return Err(PayloadError::new(field, format!("expected an array, found {}", kind(&value))));
    };
    if items.is_empty() {
        return Err(PayloadError::new(field, "embedding is empty"));
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item.as_f64() {
            Some(x) if x.is_finite() => Ok(x),
            _ => Err(PayloadError::new(field, format!("component {i} is not a finite number"))),
        })
        .collect()
}

/// Decode stored entities. A missing payload decodes to no entities.
pub fn decode_entities(value: &Value) -> Decoded<Vec<Entity>> {
    decode_list(ChunkField::Entities, value)
}

/// Decode stored preprocessed tokens. A missing payload decodes to no tokens.
pub fn decode_tokens(value: &Value) -> Decoded<Vec<String>> {
    decode_list(ChunkField::Tokens, value)
}

/// Decode stored POS annotations. A missing payload decodes to none.
pub fn decode_pos(value: &Value) -> Decoded<Vec<PosTag>> {
    decode_list(ChunkField::Pos, value)
}

fn decode_list<T: DeserializeOwned>(field: ChunkField, value: &Value) -> Decoded<Vec<T>> {
    let Some(value) = unwrap_encoded(field, value)? else {
        return Ok(Vec::new());
    };
    if !value.is_array() {
        return Err(PayloadError::new(field, format!("expected an array, found {}", kind(&value))));
    }
    serde_json::from_value(value).map_err(|e| PayloadError::new(field, e.to_string()))
}

/// Encode an embedding in the persisted representation (a JSON array of doubles).
pub fn encode_embedding(embedding: &[f64]) -> Value {
    Value::Array(embedding.iter().map(|x| Value::from(*x)).collect())
}

/// Encode entities in the persisted representation (arrays of `[text, label, start, end]`).
pub fn encode_entities(entities: &[Entity]) -> Value {
    Value::Array(
        entities
            .iter()
            .map(|e| {
                Value::Array(vec![
                    Value::from(e.text.as_str()),
                    Value::from(e.label.as_str()),
                    Value::from(e.start),
                    Value::from(e.end),
                ])
            })
            .collect(),
    )
}

/// Encode tokens as a JSON array of strings.
pub fn encode_tokens(tokens: &[String]) -> Value {
    Value::Array(tokens.iter().map(|t| Value::from(t.as_str())).collect())
}

/// Encode POS annotations as arrays of `[text, pos, tag]`.
pub fn encode_pos(pos: &[PosTag]) -> Value {
    Value::Array(
        pos.iter()
            .map(|p| {
                Value::Array(vec![
                    Value::from(p.text.as_str()),
                    Value::from(p.pos.as_str()),
                    Value::from(p.tag.as_str()),
                ])
            })
            .collect(),
    )
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn native_and_encoded_embeddings_decode_identically() {
        let native = json!([0.25, -1.0, 3]);
        let encoded = Value::String("[0.25, -1.0, 3]".to_string());
        assert_eq!(decode_embedding(&native).unwrap(), vec![0.25, -1.0, 3.0]);
        assert_eq!(decode_embedding(&encoded).unwrap(), vec![0.25, -1.0, 3.0]);
    }

    #[test]
    fn garbage_embedding_is_rejected() {
        let err = decode_embedding(&Value::String("not-json".to_string())).unwrap_err();
        assert_eq!(err.field, ChunkField::Embedding);
        assert!(err.message.starts_with("invalid JSON text"));
    }

    #[test]
    fn embedding_shape_errors() {
        assert!(decode_embedding(&Value::Null).is_err());
        assert!(decode_embedding(&json!([])).is_err());
        assert!(decode_embedding(&json!({"a": 1})).is_err());
        let err = decode_embedding(&json!([1.0, "x"])).unwrap_err();
        assert_eq!(err.message, "component 1 is not a finite number");
    }

    #[test]
    fn doubly_encoded_payload_is_rejected() {
        let twice = Value::String(serde_json::to_string("[1.0]").unwrap());
        assert!(decode_embedding(&twice).is_err());
    }

    #[test]
    fn missing_entities_default_to_empty() {
        assert!(decode_entities(&Value::Null).unwrap().is_empty());
        assert!(decode_entities(&Value::String("null".into())).unwrap().is_empty());
    }

    #[test]
    fn entities_decode_from_both_shapes() {
        let native = json!([["Computer Science", "MISC", 30, 46]]);
        let encoded = Value::String(native.to_string());
        let expected = vec![Entity::new("Computer Science", "MISC", 30, 46)];
        assert_eq!(decode_entities(&native).unwrap(), expected);
        assert_eq!(decode_entities(&encoded).unwrap(), expected);
    }

    #[test]
    fn malformed_entities_are_rejected() {
        let err = decode_entities(&json!([[1, 2, 3, 4]])).unwrap_err();
        assert_eq!(err.field, ChunkField::Entities);
        assert!(decode_entities(&json!("{broken")).is_err());
        assert!(decode_entities(&json!(5)).is_err());
    }

    #[test]
    fn encoders_write_the_persisted_shape() {
        let entities = vec![Entity::new("Manila", "GPE", 0, 6)];
        assert_eq!(encode_entities(&entities), json!([["Manila", "GPE", 0, 6]]));
        assert_eq!(encode_embedding(&[0.5, 1.0]), json!([0.5, 1.0]));
        assert_eq!(
            encode_pos(&[PosTag::new("Manila", "PROPN", "NNP")]),
            json!([["Manila", "PROPN", "NNP"]])
        );
        assert_eq!(decode_tokens(&encode_tokens(&["a".to_string()])).unwrap(), vec!["a"]);
    }

    #[test]
    fn payload_error_converts_with_chunk_id() {
        let err = decode_embedding(&Value::Null).unwrap_err().into_retrieval_error(ChunkId(3));
        assert_eq!(err.chunk_id(), Some(ChunkId(3)));
    }
}
