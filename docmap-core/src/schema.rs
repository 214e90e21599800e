//! Schema definition and the registry that resolves schemas by name.
//!
//! A [`Schema`] is the immutable description of a document type: its name,
//! its backing collection, its field table, and the factory that builds its
//! [`Manager`]. Schemas are assembled through [`SchemaBuilder`] and
//! registered into an explicit [`SchemaRegistry`]; the registry is the only
//! name-resolution scope, there is no ambient global table.

use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    sync::{Arc, Weak},
};

use crate::{
    document::Document,
    error::{DocmapError, DocmapResult},
    field::Field,
    manager::{Manager, ManagerFactory},
};

/// A shared, immutable schema handle.
pub type SchemaRef = Arc<Schema>;

#[derive(Default)]
pub(crate) struct RegistryInner {
    schemas: RwLock<HashMap<String, SchemaRef>>,
}

/// An explicit mapping of schema names to registered schemas.
///
/// The registry is cheaply cloneable; clones share the same underlying
/// table. Embedded-document fields resolve their target schema through the
/// registry their owner was registered in, so forward references only need
/// to be registered before the first value is validated.
#[derive(Clone, Default)]
pub struct SchemaRegistry {
    inner: Arc<RegistryInner>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `builder` and registers the resulting schema.
    ///
    /// Fails on duplicate field names, collisions with inherited fields,
    /// unknown base schemas, invalid field configuration, and a missing
    /// manager factory. Re-registering a name replaces the previous schema;
    /// documents created from the old schema keep it.
    pub fn define(&self, builder: SchemaBuilder) -> DocmapResult<SchemaRef> {
        let SchemaBuilder { name, collection, fields: direct, bases, manager } = builder;

        let mut seen = HashSet::new();
        for (attr, _) in &direct {
            if !seen.insert(attr.clone()) {
                return Err(DocmapError::Definition(format!(
                    "schema \"{name}\" declares field \"{attr}\" more than once"
                )));
            }
        }

        let mut fields: BTreeMap<String, Field> = BTreeMap::new();
        let mut inherited_manager: Option<ManagerFactory> = None;
        for base_name in &bases {
            let base = self.get(base_name).ok_or_else(|| {
                DocmapError::Definition(format!(
                    "schema \"{name}\" inherits from unregistered schema \"{base_name}\""
                ))
            })?;
            for (attr, field) in &base.fields {
                if fields.contains_key(attr) {
                    return Err(DocmapError::Definition(format!(
                        "schema \"{name}\" inherits conflicting field \"{attr}\" from base \"{base_name}\""
                    )));
                }
                fields.insert(attr.clone(), field.clone());
            }
            if inherited_manager.is_none() {
                inherited_manager = Some(Arc::clone(&base.manager_factory));
            }
        }

        for (attr, mut field) in direct {
            if fields.contains_key(&attr) {
                return Err(DocmapError::Definition(format!(
                    "schema \"{name}\" redeclares inherited field \"{attr}\""
                )));
            }
            field.set_name(&attr);
            field.check_config()?;
            fields.insert(attr, field);
        }

        // Every stored document carries an identifier, declared or not.
        if !fields.contains_key("_id") {
            let mut id = Field::id();
            id.set_name("_id");
            fields.insert("_id".to_string(), id);
        }

        let manager_factory = manager.or(inherited_manager).ok_or_else(|| {
            DocmapError::Definition(format!("Manager not found for schema \"{name}\""))
        })?;

        let schema = Arc::new(Schema {
            collection: collection.unwrap_or_else(|| name.to_lowercase()),
            name,
            fields,
            manager_factory,
            registry: Arc::downgrade(&self.inner),
        });
        self.inner
            .schemas
            .write()
            .insert(schema.name.clone(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Looks up a registered schema by name.
    pub fn get(&self, name: &str) -> Option<SchemaRef> {
        self.inner.schemas.read().get(name).cloned()
    }

    /// Creates a validated document of the named schema from raw data.
    pub fn create(&self, name: &str, raw: bson::Document) -> DocmapResult<Document> {
        let schema = self.get(name).ok_or_else(|| {
            DocmapError::Definition(format!("schema \"{name}\" is not registered"))
        })?;
        schema.create(raw)
    }

    /// The names of all registered schemas, unordered.
    pub fn names(&self) -> Vec<String> {
        self.inner.schemas.read().keys().cloned().collect()
    }

    /// Drops every registered schema. Mainly useful between tests.
    pub fn reset(&self) {
        self.inner.schemas.write().clear();
    }

    pub(crate) fn from_inner(inner: Arc<RegistryInner>) -> Self {
        Self { inner }
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("schemas", &self.names())
            .finish()
    }
}

/// The immutable description of one document type.
pub struct Schema {
    name: String,
    collection: String,
    fields: BTreeMap<String, Field>,
    manager_factory: ManagerFactory,
    registry: Weak<RegistryInner>,
}

impl Schema {
    /// The registered name of this schema.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The backing collection name. Defaults to the lowercased schema name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Looks up a field descriptor by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Whether this schema declares the named field.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterates the field table in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    /// The registry this schema was registered in.
    ///
    /// Schemas hold the registry weakly so dropping the registry does not
    /// leak its schemas through cycles.
    pub fn registry(&self) -> DocmapResult<SchemaRegistry> {
        self.registry
            .upgrade()
            .map(SchemaRegistry::from_inner)
            .ok_or_else(|| {
                DocmapError::Definition(format!(
                    "registry of schema \"{}\" has been dropped",
                    self.name
                ))
            })
    }

    /// An empty, unvalidated instance of this schema.
    pub fn instance(self: &Arc<Self>) -> Document {
        Document::new(Arc::clone(self))
    }

    /// Builds a validated instance from raw data.
    ///
    /// Every key is assigned through field validation. Unknown keys and
    /// invalid values are errors; use [`create_lenient`](Self::create_lenient)
    /// to skip them instead.
    pub fn create(self: &Arc<Self>, raw: bson::Document) -> DocmapResult<Document> {
        self.create_with(raw, true)
    }

    /// Builds an instance from raw data, silently dropping unknown keys and
    /// values that fail validation.
    pub fn create_lenient(self: &Arc<Self>, raw: bson::Document) -> DocmapResult<Document> {
        self.create_with(raw, false)
    }

    fn create_with(self: &Arc<Self>, raw: bson::Document, strict: bool) -> DocmapResult<Document> {
        let mut instance = self.instance();
        for (key, value) in raw {
            match instance.set(&key, value) {
                Ok(()) => {}
                Err(err) if strict => return Err(err),
                Err(_) => {}
            }
        }
        Ok(instance)
    }

    /// Builds a manager bound to this schema from the registered factory.
    pub fn manager(self: &Arc<Self>) -> Manager {
        (self.manager_factory)(Arc::clone(self))
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// A fluent schema declaration, consumed by [`SchemaRegistry::define`].
pub struct SchemaBuilder {
    name: String,
    collection: Option<String>,
    fields: Vec<(String, Field)>,
    bases: Vec<String>,
    manager: Option<ManagerFactory>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: None,
            fields: Vec::new(),
            bases: Vec::new(),
            manager: None,
        }
    }

    /// Overrides the backing collection name.
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Declares a field under `name`. A field with no explicit name takes
    /// `name` as its public name.
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    /// Inherits the field table (and, absent an explicit one, the manager
    /// factory) of an already registered schema. Bases apply in declaration
    /// order.
    pub fn inherit(mut self, base: impl Into<String>) -> Self {
        self.bases.push(base.into());
        self
    }

    /// Sets the factory that builds this schema's [`Manager`].
    pub fn manager(mut self, factory: ManagerFactory) -> Self {
        self.manager = Some(factory);
        self
    }

    /// Uses the stock [`Manager`] with the standard verb table.
    pub fn with_default_manager(self) -> Self {
        self.manager(Manager::factory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use bson::doc;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new()
    }

    #[test]
    fn define_assigns_names_and_default_collection() {
        let registry = registry();
        let schema = registry
            .define(
                SchemaBuilder::new("Article")
                    .field("title", Field::string().required())
                    .field("views", Field::integer())
                    .with_default_manager(),
            )
            .unwrap();
        assert_eq!(schema.name(), "Article");
        assert_eq!(schema.collection(), "article");
        assert_eq!(schema.field("title").unwrap().field_name(), "title");
        assert!(registry.get("Article").is_some());
    }

    #[test]
    fn duplicate_direct_fields_are_rejected() {
        let result = registry().define(
            SchemaBuilder::new("Broken")
                .field("x", Field::string())
                .field("x", Field::integer())
                .with_default_manager(),
        );
        assert!(matches!(result, Err(DocmapError::Definition(_))));
    }

    #[test]
    fn inherited_collision_names_the_base() {
        let registry = registry();
        registry
            .define(
                SchemaBuilder::new("Base")
                    .field("x", Field::string())
                    .with_default_manager(),
            )
            .unwrap();
        let err = registry
            .define(
                SchemaBuilder::new("Child")
                    .inherit("Base")
                    .field("x", Field::integer()),
            )
            .unwrap_err();
        assert!(err.to_string().contains("Base") || err.to_string().contains("inherited"));
    }

    #[test]
    fn inheritance_copies_fields_and_manager() {
        let registry = registry();
        registry
            .define(
                SchemaBuilder::new("Base")
                    .field("x", Field::string())
                    .with_default_manager(),
            )
            .unwrap();
        let child = registry
            .define(
                SchemaBuilder::new("Child")
                    .inherit("Base")
                    .field("y", Field::integer()),
            )
            .unwrap();
        assert!(child.has_field("x"));
        assert!(child.has_field("y"));
        assert_eq!(child.manager().collection_name(), "child");
    }

    #[test]
    fn missing_manager_is_a_definition_error() {
        let result = registry().define(SchemaBuilder::new("NoManager").field("x", Field::string()));
        assert!(matches!(result, Err(DocmapError::Definition(_))));
    }

    #[test]
    fn unknown_base_is_a_definition_error() {
        let result = registry().define(
            SchemaBuilder::new("Child")
                .inherit("Ghost")
                .with_default_manager(),
        );
        assert!(matches!(result, Err(DocmapError::Definition(_))));
    }

    #[test]
    fn redefining_a_name_replaces_the_schema() {
        let registry = registry();
        registry
            .define(
                SchemaBuilder::new("Thing")
                    .field("a", Field::string())
                    .with_default_manager(),
            )
            .unwrap();
        registry
            .define(
                SchemaBuilder::new("Thing")
                    .field("b", Field::string())
                    .with_default_manager(),
            )
            .unwrap();
        let current = registry.get("Thing").unwrap();
        assert!(current.has_field("b"));
        assert!(!current.has_field("a"));
    }

    #[test]
    fn create_is_strict_and_create_lenient_skips() {
        let registry = registry();
        let schema = registry
            .define(
                SchemaBuilder::new("Article")
                    .field("title", Field::string())
                    .with_default_manager(),
            )
            .unwrap();
        assert!(schema.create(doc! { "bogus": 1 }).is_err());
        let mut lenient = schema
            .create_lenient(doc! { "title": "ok", "bogus": 1 })
            .unwrap();
        assert_eq!(lenient.get("title").unwrap(), Some("ok".into()));
        assert!(lenient.get("bogus").is_err());
    }
}
