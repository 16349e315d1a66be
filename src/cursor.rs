// ABOUTME: DynamoDB JSON encoding for scan cursors
// ABOUTME: Lets a failed copy print where it stopped and a new run resume from there

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{Map, Value};

use crate::store::Cursor;

/// Parse a key such as `{"pk": {"S": "a"}, "sk": {"N": "3"}}`.
///
/// Only scalar key types (S, N, B) are accepted; B is base64.
pub fn decode(value: &Value) -> Result<Cursor, String> {
    let Value::Object(attributes) = value else {
        return Err("cursor must be an object of attribute names".to_string());
    };
    if attributes.is_empty() {
        return Err("cursor must name at least one key attribute".to_string());
    }

    attributes
        .iter()
        .map(|(name, typed)| {
            decode_attribute(typed)
                .map(|value| (name.clone(), value))
                .map_err(|e| format!("attribute '{}': {}", name, e))
        })
        .collect()
}

fn decode_attribute(typed: &Value) -> Result<AttributeValue, String> {
    let Some((kind, raw)) = typed
        .as_object()
        .filter(|o| o.len() == 1)
        .and_then(|o| o.iter().next())
    else {
        return Err("expected exactly one type descriptor such as {\"S\": ...}".to_string());
    };
    let text = raw
        .as_str()
        .ok_or_else(|| format!("{} value must be a string", kind))?;

    match kind.as_str() {
        "S" => Ok(AttributeValue::S(text.to_string())),
        "N" => {
            text.parse::<f64>()
                .map_err(|_| format!("'{}' is not a number", text))?;
            Ok(AttributeValue::N(text.to_string()))
        }
        "B" => STANDARD
            .decode(text)
            .map(|bytes| AttributeValue::B(Blob::new(bytes)))
            .map_err(|e| format!("invalid base64: {}", e)),
        other => Err(format!("unsupported key type '{}'", other)),
    }
}

/// Render a cursor as DynamoDB JSON, the inverse of [`decode`] for key types.
pub fn encode(cursor: &Cursor) -> Value {
    let mut attributes = Map::new();
    for (name, value) in cursor {
        let typed = match value {
            AttributeValue::S(s) => single("S", s.clone()),
            AttributeValue::N(n) => single("N", n.clone()),
            AttributeValue::B(b) => single("B", STANDARD.encode(b.as_ref())),
            other => single("UNSUPPORTED", format!("{:?}", other)),
        };
        attributes.insert(name.clone(), typed);
    }
    Value::Object(attributes)
}

fn single(kind: &str, value: String) -> Value {
    let mut map = Map::new();
    map.insert(kind.to_string(), Value::String(value));
    Value::Object(map)
}
