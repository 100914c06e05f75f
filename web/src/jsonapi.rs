//! JSON:API documents.
//!
//! Reads answer `{"data": {"type", "id", "attributes"}}` for one resource and
//! `{"data": [...]}` for collections (an empty collection is `[]`, never 404).
//! Writes accept the same shape; the `id` member is optional on create.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Media type of every realm document.
pub const CONTENT_TYPE: &str = "application/vnd.api+json";

/// A domain value that renders as a JSON:API resource.
pub trait ToResource {
    /// Resource type (`reactors`, `rates`, `routes`, ...).
    const TYPE: &'static str;

    /// Serialized attributes.
    type Attributes: Serialize;

    /// Resource id rendered as text.
    fn resource_id(&self) -> String;

    /// Attributes of this resource.
    fn attributes(&self) -> Self::Attributes;

    /// The full resource object.
    fn to_resource(&self) -> Resource<Self::Attributes> {
        Resource {
            kind: Self::TYPE.to_string(),
            id: self.resource_id(),
            attributes: self.attributes(),
        }
    }
}

/// One resource object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource<A> {
    /// Resource type
    #[serde(rename = "type")]
    pub kind: String,
    /// Resource id (empty on create requests)
    #[serde(default)]
    pub id: String,
    /// Attributes
    pub attributes: A,
}

/// Top-level document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document<D> {
    /// Primary data
    pub data: D,
}

/// A document response with the JSON:API media type and a status code.
#[derive(Debug)]
pub struct JsonApi<D> {
    status: StatusCode,
    document: Document<D>,
}

impl<A: Serialize> JsonApi<Resource<A>> {
    /// 200 with one resource.
    pub fn one<T: ToResource<Attributes = A>>(value: &T) -> Self {
        Self {
            status: StatusCode::OK,
            document: Document {
                data: value.to_resource(),
            },
        }
    }
}

impl<A: Serialize> JsonApi<Vec<Resource<A>>> {
    /// 200 with a collection, in iteration order.
    pub fn many<'a, T>(values: impl IntoIterator<Item = &'a T>) -> Self
    where
        T: ToResource<Attributes = A> + 'a,
    {
        Self {
            status: StatusCode::OK,
            document: Document {
                data: values.into_iter().map(ToResource::to_resource).collect(),
            },
        }
    }
}

impl<D> JsonApi<D> {
    /// Replace the status code (e.g. 201 on create).
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// The document that will be sent.
    #[must_use]
    pub const fn document(&self) -> &Document<D> {
        &self.document
    }
}

impl<D: Serialize> IntoResponse for JsonApi<D> {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, CONTENT_TYPE)],
            Json(self.document),
        )
            .into_response()
    }
}

/// Request body carrying one resource.
pub type Input<A> = Json<Document<Resource<A>>>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct RateAttributes {
        exp_rate: f64,
    }

    struct Rates {
        character_id: u32,
        exp: f64,
    }

    impl ToResource for Rates {
        const TYPE: &'static str = "rates";
        type Attributes = RateAttributes;

        fn resource_id(&self) -> String {
            self.character_id.to_string()
        }

        fn attributes(&self) -> RateAttributes {
            RateAttributes { exp_rate: self.exp }
        }
    }

    #[test]
    fn single_resource_shape() {
        let doc = JsonApi::one(&Rates {
            character_id: 12345,
            exp: 2.0,
        });
        assert_eq!(
            serde_json::to_value(doc.document()).ok(),
            Some(json!({
                "data": { "type": "rates", "id": "12345", "attributes": { "expRate": 2.0 } }
            }))
        );
    }

    #[test]
    fn empty_collection_is_empty_array() {
        let doc = JsonApi::many::<Rates>(&[]);
        assert_eq!(
            serde_json::to_value(doc.document()).ok(),
            Some(json!({ "data": [] }))
        );
    }

    #[test]
    fn create_request_may_omit_id() {
        let body = json!({ "data": { "type": "reactors", "attributes": { "classification": 2001 } } });
        let doc: Result<Document<Resource<serde_json::Value>>, _> = serde_json::from_value(body);
        assert_eq!(doc.map(|d| d.data.id).ok(), Some(String::new()));
    }
}
