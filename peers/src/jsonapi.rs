//! JSON:API document encoding and decoding.
//!
//! Peers answer with `{"data": {"type", "id", "attributes"}}` or a list of
//! such resources. Domain types carry their id as a field, so the resource id
//! is folded into the attributes before deserializing.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Debug, Deserialize)]
struct Resource {
    id: Value,
    #[serde(default)]
    attributes: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct One {
    data: Resource,
}

#[derive(Debug, Deserialize)]
struct Many {
    #[serde(default)]
    data: Vec<Resource>,
}

/// Decode a single-resource document.
///
/// # Errors
///
/// Returns the serde error when the body is not a JSON:API document of `T`.
pub fn decode_one<T: DeserializeOwned>(body: &[u8]) -> Result<T, serde_json::Error> {
    let document: One = serde_json::from_slice(body)?;
    into_domain(document.data)
}

/// Decode a collection document. A missing `data` member is an empty list.
///
/// # Errors
///
/// Returns the serde error when any resource does not decode as `T`.
pub fn decode_many<T: DeserializeOwned>(body: &[u8]) -> Result<Vec<T>, serde_json::Error> {
    let document: Many = serde_json::from_slice(body)?;
    document.data.into_iter().map(into_domain).collect()
}

/// Wrap `attributes` as a new resource of `kind` for a request body.
///
/// # Errors
///
/// Returns the serde error when the attributes do not serialize to an object.
pub fn encode<T: Serialize>(kind: &str, attributes: &T) -> Result<Value, serde_json::Error> {
    let attributes = serde_json::to_value(attributes)?;
    if !attributes.is_object() {
        return Err(serde::ser::Error::custom("attributes must be an object"));
    }
    Ok(json!({ "data": { "type": kind, "attributes": attributes } }))
}

fn into_domain<T: DeserializeOwned>(resource: Resource) -> Result<T, serde_json::Error> {
    let mut attributes = resource.attributes;
    // Numeric ids travel as strings in JSON:API.
    let id = match resource.id {
        Value::String(text) => text
            .parse::<u64>()
            .map_or(Value::String(text), |n| Value::Number(n.into())),
        other => other,
    };
    attributes.entry("id").or_insert(id);
    serde_json::from_value(Value::Object(attributes))
}
