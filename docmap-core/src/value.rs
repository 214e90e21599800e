//! Runtime document values.
//!
//! Fields hold either plain BSON scalars or live schema instances. A separate
//! [`Value`] enum is needed because embedded documents carry validation state
//! and parent back-references that plain [`Bson`] cannot represent.

use bson::Bson;
use std::collections::BTreeMap;

use crate::{document::Document, error::DocmapResult};

/// A single stored field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A plain BSON scalar, array, or sub-document without schema semantics.
    Bson(Bson),
    /// A validated instance of a registered schema.
    Document(Document),
    /// A list whose items may themselves be schema instances.
    List(Vec<Value>),
    /// A keyed map whose values may themselves be schema instances.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the plain BSON payload, if this value is one.
    pub fn as_bson(&self) -> Option<&Bson> {
        match self {
            Value::Bson(bson) => Some(bson),
            _ => None,
        }
    }

    /// Returns the schema instance, if this value is one.
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    /// Returns the list items, if this value is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// A value is empty when it is BSON null. Empty containers are valid
    /// values, even for required fields.
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Bson(Bson::Null))
    }

    /// `true` when persisting the value on first read would let callers share
    /// mutable state: containers and documents, as opposed to plain scalars.
    pub(crate) fn is_container(&self) -> bool {
        match self {
            Value::Bson(Bson::Array(_)) | Value::Bson(Bson::Document(_)) => true,
            Value::Bson(_) => false,
            _ => true,
        }
    }

    /// Serializes this value into plain BSON, recursing into schema instances.
    pub fn to_bson(&self, exclude_unset: bool) -> DocmapResult<Bson> {
        Ok(match self {
            Value::Bson(bson) => bson.clone(),
            Value::Document(doc) => {
                Bson::Document(doc.clone().to_document_with(exclude_unset)?)
            }
            Value::List(items) => Bson::Array(
                items
                    .iter()
                    .map(|item| item.to_bson(exclude_unset))
                    .collect::<DocmapResult<Vec<Bson>>>()?,
            ),
            Value::Map(entries) => Bson::Document(
                entries
                    .iter()
                    .map(|(key, item)| Ok((key.clone(), item.to_bson(exclude_unset)?)))
                    .collect::<DocmapResult<bson::Document>>()?,
            ),
        })
    }
}

impl From<Bson> for Value {
    fn from(bson: Bson) -> Self {
        Value::Bson(bson)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Document(doc)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Bson(Bson::String(value.to_string()))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Bson(Bson::String(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Bson(Bson::Int32(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Bson(Bson::Int64(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Bson(Bson::Double(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bson(Bson::Boolean(value))
    }
}

impl From<bson::Document> for Value {
    fn from(doc: bson::Document) -> Self {
        Value::Bson(Bson::Document(doc))
    }
}
