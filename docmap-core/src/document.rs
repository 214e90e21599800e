//! Validated runtime instances of a schema.
//!
//! A [`Document`] is a mutable bag of field values bound to one immutable
//! [`Schema`](crate::schema::Schema). Every assignment goes through field
//! validation; reads apply defaults and timestamp auto-modes lazily. A
//! document embedded inside another carries a non-owning [`ParentRef`] back
//! to its container.

use bson::Bson;
use chrono::Utc;
use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    error::{DocmapError, DocmapResult},
    field::FieldKind,
    schema::SchemaRef,
    value::Value,
};

/// A non-owning reference from an embedded document to its container.
///
/// Holds the container's schema name and identity instead of a handle to the
/// container itself, so embedding never creates ownership cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentRef {
    /// Schema name of the containing document.
    pub schema: String,
    /// Identity of the containing document, when it has one.
    pub id: Option<Bson>,
}

/// A validated instance of a registered schema.
#[derive(Clone)]
pub struct Document {
    schema: SchemaRef,
    data: HashMap<String, Value>,
    parent: Option<ParentRef>,
}

impl Document {
    pub(crate) fn new(schema: SchemaRef) -> Self {
        Self { schema, data: HashMap::new(), parent: None }
    }

    /// The schema this document is an instance of.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// The name of this document's schema.
    pub fn schema_name(&self) -> &str {
        self.schema.name()
    }

    /// Reads a field value.
    ///
    /// An `auto_now` timestamp always reads as the current time and is never
    /// persisted. An unset field falls back to its default; container
    /// defaults are stored on first read so later reads share one instance.
    /// An unset `auto_created` timestamp is stamped once and stored.
    /// `Ok(None)` means unset with nothing to fall back to.
    pub fn get(&mut self, name: &str) -> DocmapResult<Option<Value>> {
        let schema = Arc::clone(&self.schema);
        let field = schema.field(name).ok_or_else(|| {
            DocmapError::UnknownField(schema.name().to_string(), name.to_string())
        })?;

        if let FieldKind::Timestamp { auto_now: true, .. } = field.kind() {
            return Ok(Some(Value::Bson(Bson::DateTime(bson::DateTime::from_chrono(
                Utc::now(),
            )))));
        }

        if let Some(value) = self.data.get(name) {
            return Ok(Some(value.clone()));
        }

        if let Some(default) = field.default_value_instance() {
            if default.is_container() {
                self.data.insert(name.to_string(), default.clone());
            }
            return Ok(Some(default));
        }

        if let FieldKind::Timestamp { auto_created: true, .. } = field.kind() {
            let stamp = Value::Bson(Bson::DateTime(bson::DateTime::from_chrono(Utc::now())));
            self.data.insert(name.to_string(), stamp.clone());
            return Ok(Some(stamp));
        }

        Ok(None)
    }

    /// Assigns a field value, validating and coercing it first.
    ///
    /// Fails with [`DocmapError::UnknownField`] for names the schema does not
    /// declare; on any error the stored value is left unchanged.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> DocmapResult<()> {
        let schema = Arc::clone(&self.schema);
        let field = schema.field(name).ok_or_else(|| {
            DocmapError::UnknownField(schema.name().to_string(), name.to_string())
        })?;
        let owner = ParentRef {
            schema: schema.name().to_string(),
            id: self.identity(),
        };
        let validated = field.validate(value.into(), &schema.registry()?, Some(&owner))?;
        self.data.insert(name.to_string(), validated);
        Ok(())
    }

    /// Field removal is not part of the data model: assign null instead, so
    /// the unset-versus-null distinction stays observable.
    pub fn remove(&mut self, name: &str) -> DocmapResult<Value> {
        Err(DocmapError::Unsupported(format!(
            "cannot remove field \"{name}\"; set it to null instead"
        )))
    }

    /// Whether the named field currently holds a stored value.
    pub fn is_set(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    /// The declared field names, in name order.
    pub fn keys(&self) -> Vec<String> {
        self.schema.fields().map(|(name, _)| name.to_string()).collect()
    }

    /// The stored identity of this document, if any.
    pub fn identity(&self) -> Option<Bson> {
        match self.data.get("_id") {
            Some(value) if !value.is_empty() => value.as_bson().cloned(),
            _ => None,
        }
    }

    /// The back-reference to the containing document, if embedded.
    pub fn parent(&self) -> Option<&ParentRef> {
        self.parent.as_ref()
    }

    /// Drops the parent back-reference.
    pub fn detach(&mut self) {
        self.parent = None;
    }

    /// Attaches `parent`, replacing a reference to a different owner and
    /// leaving a matching one untouched.
    pub(crate) fn adopt(&mut self, parent: ParentRef) {
        if self.parent.as_ref() != Some(&parent) {
            self.parent = Some(parent);
        }
    }

    /// Checks that every required field holds a non-empty value, collecting
    /// all offenders into one [`DocmapError::MissingFields`] instead of
    /// failing on the first. With `recurse`, embedded documents are
    /// validated too, including those inside lists and maps.
    pub fn validate(&mut self, recurse: bool) -> DocmapResult<()> {
        let schema = Arc::clone(&self.schema);
        let mut missing = Vec::new();
        for (name, field) in schema.fields() {
            if !field.is_required() {
                continue;
            }
            match self.get(name)? {
                Some(value) if !value.is_empty() => {}
                _ => missing.push(name.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(DocmapError::MissingFields(missing));
        }

        if recurse {
            for value in self.data.values_mut() {
                validate_nested(value)?;
            }
        }
        Ok(())
    }

    /// Serializes into a plain BSON document. Unset fields become null,
    /// except a null or missing `_id`, which is omitted so the store can
    /// assign one.
    pub fn to_document(&mut self) -> DocmapResult<bson::Document> {
        self.to_document_with(false)
    }

    /// Serializes into a plain BSON document, skipping unset non-required
    /// fields when `exclude_unset` is on.
    pub fn to_document_with(&mut self, exclude_unset: bool) -> DocmapResult<bson::Document> {
        let schema = Arc::clone(&self.schema);
        let mut out = bson::Document::new();
        for (name, field) in schema.fields() {
            match self.get(name)? {
                Some(value) => {
                    out.insert(name, value.to_bson(exclude_unset)?);
                }
                None if exclude_unset && !field.is_required() => {}
                None => {
                    out.insert(name, Bson::Null);
                }
            }
        }
        if matches!(out.get("_id"), Some(Bson::Null) | None) {
            out.remove("_id");
        }
        Ok(out)
    }

    /// Serializes into a JSON value via the BSON representation.
    pub fn to_json(&mut self) -> DocmapResult<serde_json::Value> {
        Ok(serde_json::to_value(self.to_document()?)?)
    }
}

fn validate_nested(value: &mut Value) -> DocmapResult<()> {
    match value {
        Value::Document(doc) => doc.validate(true),
        Value::List(items) => {
            for item in items {
                validate_nested(item)?;
            }
            Ok(())
        }
        Value::Map(entries) => {
            for item in entries.values_mut() {
                validate_nested(item)?;
            }
            Ok(())
        }
        Value::Bson(_) => Ok(()),
    }
}

/// Two documents are equal when they share a schema name and both carry the
/// same non-empty identity. Two never-stored documents are never equal, not
/// even to themselves.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        if self.schema.name() != other.schema.name() {
            return false;
        }
        match (self.identity(), other.identity()) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => false,
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("schema", &self.schema.name())
            .field("data", &self.data)
            .field("parent", &self.parent)
            .finish()
    }
}
