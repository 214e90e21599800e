//! Managers: the per-schema gateway to the store.
//!
//! A [`Manager`] binds a schema to a table of operation descriptors, one per
//! verb, and exposes typed methods over them. Schemas build managers through
//! a [`ManagerFactory`] registered at definition time, so applications can
//! swap in a manager with a customized verb table per schema.

use bson::Bson;
use std::{fmt, sync::Arc};

use crate::{
    document::Document,
    driver::{Qualifier, Verb},
    error::{DocmapError, DocmapResult},
    ops::{OpCall, OpResult, Operation},
    schema::SchemaRef,
};

/// Builds a [`Manager`] bound to a schema.
pub type ManagerFactory = Arc<dyn Fn(SchemaRef) -> Manager + Send + Sync>;

struct VerbTable {
    insert: Operation,
    save: Operation,
    update: Operation,
    remove: Operation,
    find: Operation,
    find_one: Operation,
    count: Operation,
    group: Operation,
    create_index: Operation,
    ensure_index: Operation,
    aggregate: Operation,
    find_and_modify: Operation,
}

impl Default for VerbTable {
    fn default() -> Self {
        Self {
            insert: Operation::bind(Verb::Insert),
            save: Operation::bind(Verb::Save),
            update: Operation::bind(Verb::Update),
            remove: Operation::bind(Verb::Remove),
            find: Operation::bind(Verb::Find).qualifier(Qualifier::ToList).as_model(),
            find_one: Operation::bind(Verb::FindOne).as_model(),
            count: Operation::bind(Verb::Find).qualifier(Qualifier::Count),
            group: Operation::bind(Verb::Group),
            create_index: Operation::bind(Verb::CreateIndex),
            ensure_index: Operation::bind(Verb::EnsureIndex),
            aggregate: Operation::bind(Verb::Aggregate),
            find_and_modify: Operation::bind(Verb::FindAndModify).as_model(),
        }
    }
}

/// The per-schema gateway to the store.
pub struct Manager {
    schema: SchemaRef,
    ops: VerbTable,
}

impl Manager {
    /// A manager with the standard verb table.
    pub fn new(schema: SchemaRef) -> Self {
        Self { schema, ops: VerbTable::default() }
    }

    /// The factory used by
    /// [`SchemaBuilder::with_default_manager`](crate::schema::SchemaBuilder::with_default_manager).
    pub fn factory() -> ManagerFactory {
        Arc::new(Manager::new)
    }

    /// The schema this manager serves.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// The backing collection name.
    pub fn collection_name(&self) -> &str {
        self.schema.collection()
    }

    /// The descriptor behind a verb, for callers that need per-call
    /// overrides the typed methods do not expose.
    ///
    /// The count descriptor shares [`Verb::Find`] with `find`, so this
    /// lookup returns the find descriptor for that verb; use
    /// [`count_op`](Self::count_op) to reach count.
    pub fn op(&self, verb: Verb) -> &Operation {
        match verb {
            Verb::Insert => &self.ops.insert,
            Verb::Save => &self.ops.save,
            Verb::Update => &self.ops.update,
            Verb::Remove => &self.ops.remove,
            Verb::Find => &self.ops.find,
            Verb::FindOne => &self.ops.find_one,
            Verb::Group => &self.ops.group,
            Verb::CreateIndex => &self.ops.create_index,
            Verb::EnsureIndex => &self.ops.ensure_index,
            Verb::Aggregate => &self.ops.aggregate,
            Verb::FindAndModify => &self.ops.find_and_modify,
        }
    }

    /// The count descriptor, not addressable through [`op`](Self::op)
    /// because it runs under [`Verb::Find`] with a count qualifier.
    pub fn count_op(&self) -> &Operation {
        &self.ops.count
    }

    /// Maps one raw driver result into a document.
    ///
    /// Null maps to `None`, or to an empty instance when `hard` is set, so
    /// callers can chain field access on a guaranteed instance.
    pub fn create_one(&self, raw: Bson, hard: bool) -> DocmapResult<Option<Document>> {
        match raw {
            Bson::Document(doc) => Ok(Some(self.schema.create(doc)?)),
            Bson::Null if hard => Ok(Some(self.schema.instance())),
            Bson::Null => Ok(None),
            other => Err(DocmapError::Operation(format!(
                "cannot map {:?} into a \"{}\" document",
                other,
                self.schema.name()
            ))),
        }
    }

    /// Maps a raw result array into documents.
    pub fn create_many(&self, items: Vec<Bson>) -> DocmapResult<Vec<Document>> {
        items
            .into_iter()
            .map(|item| match item {
                Bson::Document(doc) => self.schema.create(doc),
                other => Err(DocmapError::Operation(format!(
                    "cannot map {:?} into a \"{}\" document",
                    other,
                    self.schema.name()
                ))),
            })
            .collect()
    }

    pub async fn insert(&self, call: OpCall) -> DocmapResult<OpResult> {
        self.ops.insert.execute(self, call).await
    }

    pub async fn save(&self, call: OpCall) -> DocmapResult<OpResult> {
        self.ops.save.execute(self, call).await
    }

    pub async fn update(&self, call: OpCall) -> DocmapResult<OpResult> {
        self.ops.update.execute(self, call).await
    }

    pub async fn remove(&self, call: OpCall) -> DocmapResult<OpResult> {
        self.ops.remove.execute(self, call).await
    }

    /// Finds matching records as documents.
    pub async fn find(&self, call: OpCall) -> DocmapResult<Vec<Document>> {
        self.ops.find.execute(self, call).await?.into_many()
    }

    /// Alias of [`find`](Self::find).
    pub async fn all(&self, call: OpCall) -> DocmapResult<Vec<Document>> {
        self.find(call).await
    }

    /// Finds a single record as a document.
    pub async fn find_one(&self, call: OpCall) -> DocmapResult<Option<Document>> {
        self.ops.find_one.execute(self, call).await?.into_one()
    }

    /// Finds at most one matching record; more than one match is an error
    /// naming the collection.
    pub async fn one(&self, call: OpCall) -> DocmapResult<Option<Document>> {
        let mut matches = self.find(call).await?;
        if matches.len() > 1 {
            return Err(DocmapError::MultipleResults(
                self.collection_name().to_string(),
            ));
        }
        Ok(matches.pop())
    }

    /// Counts matching records. Skip and limit modifiers do not affect the
    /// count.
    pub async fn count(&self, call: OpCall) -> DocmapResult<i64> {
        match self.ops.count.execute(self, call).await?.into_raw()? {
            Bson::Int32(n) => Ok(n as i64),
            Bson::Int64(n) => Ok(n),
            other => Err(DocmapError::Operation(format!(
                "count returned a non-integer result: {other:?}"
            ))),
        }
    }

    pub async fn group(&self, call: OpCall) -> DocmapResult<OpResult> {
        self.ops.group.execute(self, call).await
    }

    pub async fn create_index(&self, call: OpCall) -> DocmapResult<OpResult> {
        self.ops.create_index.execute(self, call).await
    }

    pub async fn ensure_index(&self, call: OpCall) -> DocmapResult<OpResult> {
        self.ops.ensure_index.execute(self, call).await
    }

    pub async fn aggregate(&self, call: OpCall) -> DocmapResult<OpResult> {
        self.ops.aggregate.execute(self, call).await
    }

    pub async fn find_and_modify(&self, call: OpCall) -> DocmapResult<Option<Document>> {
        self.ops.find_and_modify.execute(self, call).await?.into_one()
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("schema", &self.schema.name())
            .field("collection", &self.collection_name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field::Field,
        schema::{SchemaBuilder, SchemaRegistry},
    };
    use bson::doc;

    fn manager() -> Manager {
        let registry = SchemaRegistry::new();
        registry
            .define(
                SchemaBuilder::new("Note")
                    .collection("notes")
                    .field("text", Field::string())
                    .with_default_manager(),
            )
            .unwrap();
        let manager = registry.get("Note").unwrap().manager();
        // Schemas hold the registry weakly; leak the handle so it outlives
        // the manager for the duration of the test.
        std::mem::forget(registry);
        manager
    }

    #[test]
    fn manager_binds_to_the_schema_collection() {
        assert_eq!(manager().collection_name(), "notes");
    }

    #[test]
    fn create_one_maps_documents_and_nulls() {
        let manager = manager();
        let mut doc = manager
            .create_one(Bson::Document(doc! { "text": "hi" }), false)
            .unwrap()
            .unwrap();
        assert_eq!(doc.get("text").unwrap(), Some("hi".into()));

        assert!(manager.create_one(Bson::Null, false).unwrap().is_none());
        assert!(manager.create_one(Bson::Null, true).unwrap().is_some());
        assert!(manager.create_one(Bson::Int64(1), false).is_err());
    }

    #[test]
    fn create_many_rejects_non_documents() {
        let manager = manager();
        let docs = manager
            .create_many(vec![
                Bson::Document(doc! { "text": "a" }),
                Bson::Document(doc! { "text": "b" }),
            ])
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert!(manager.create_many(vec![Bson::Int64(1)]).is_err());
    }
}
