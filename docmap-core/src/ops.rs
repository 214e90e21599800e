//! Operation descriptors and the generic asynchronous executor.
//!
//! An [`Operation`] is a declarative description of one store interaction:
//! the verb, an optional cursor qualifier, an optional baked-in cursor
//! modifier, and flags controlling how raw results map back into documents.
//! [`Operation::execute`] runs the description against a driver and returns
//! an [`OpResult`]; failures come back as the error half of the result,
//! never through any other channel, and are logged exactly once at this
//! boundary.

use bson::Bson;
use std::{fmt, sync::Arc};

use crate::{
    connection::current_database,
    document::Document,
    driver::{Database, DriverCursor, OpArgs, Qualifier, Verb},
    error::{DocmapError, DocmapResult},
    manager::Manager,
};

/// Reshapes a deferred cursor before it is materialized.
///
/// Implementations call the cursor's skip/limit/sort/filter methods and hand
/// it back; they never materialize it themselves.
pub trait CursorModifier: Send + Sync {
    fn reshape(&self, cursor: Box<dyn DriverCursor>) -> Box<dyn DriverCursor>;
}

/// A declarative description of one store interaction.
#[derive(Clone)]
pub struct Operation {
    verb: Verb,
    qualifier: Option<Qualifier>,
    modifier: Option<Arc<dyn CursorModifier>>,
    as_model: bool,
    hard: bool,
}

impl Operation {
    /// Starts a descriptor for `verb` with no qualifier, no modifier, raw
    /// results.
    pub fn bind(verb: Verb) -> Self {
        Self { verb, qualifier: None, modifier: None, as_model: false, hard: false }
    }

    /// Routes the verb through a cursor, materialized per `qualifier`.
    pub fn qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifier = Some(qualifier);
        self
    }

    /// Bakes a cursor modifier into the descriptor. A per-call modifier
    /// list applies after this one.
    pub fn modifier(mut self, modifier: impl CursorModifier + 'static) -> Self {
        self.modifier = Some(Arc::new(modifier));
        self
    }

    /// Maps raw results into schema documents.
    pub fn as_model(mut self) -> Self {
        self.as_model = true;
        self
    }

    /// With model mapping on, a missing single result yields an empty
    /// instance instead of `None`.
    pub fn hard(mut self) -> Self {
        self.hard = true;
        self
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// Runs this descriptor for `manager`'s collection.
    ///
    /// The database comes from the call override or the process-wide
    /// default. Any failure, from dispatch through model mapping, is logged
    /// here and returned as an error.
    pub async fn execute(&self, manager: &Manager, call: OpCall) -> DocmapResult<OpResult> {
        match self.run(manager, call).await {
            Ok(result) => Ok(result),
            Err(err) => {
                tracing::error!(
                    verb = %self.verb,
                    collection = manager.collection_name(),
                    error = %err,
                    "operation failed"
                );
                Err(err)
            }
        }
    }

    async fn run(&self, manager: &Manager, call: OpCall) -> DocmapResult<OpResult> {
        let OpCall { db, args, modifiers, as_model, hard } = call;
        let db = match db {
            Some(db) => db,
            None => current_database()?,
        };
        let collection = db.collection(manager.collection_name());

        let raw = match self.qualifier {
            None => collection.run(self.verb, args).await?,
            Some(qualifier) => {
                let mut cursor = collection.open_cursor(self.verb, args)?;
                if let Some(modifier) = &self.modifier {
                    cursor = modifier.reshape(cursor);
                }
                for modifier in &modifiers {
                    cursor = modifier.reshape(cursor);
                }
                match qualifier {
                    Qualifier::ToList => cursor.to_list().await?,
                    Qualifier::Count => cursor.count().await?,
                }
            }
        };

        if !as_model.unwrap_or(self.as_model) {
            return Ok(OpResult::Raw(raw));
        }
        match raw {
            Bson::Array(items) => Ok(OpResult::Many(manager.create_many(items)?)),
            single => Ok(OpResult::One(
                manager.create_one(single, hard.unwrap_or(self.hard))?,
            )),
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("verb", &self.verb)
            .field("qualifier", &self.qualifier)
            .field("as_model", &self.as_model)
            .field("hard", &self.hard)
            .finish_non_exhaustive()
    }
}

/// Per-call arguments and overrides for one [`Operation::execute`].
#[derive(Default)]
pub struct OpCall {
    db: Option<Arc<dyn Database>>,
    args: OpArgs,
    modifiers: Vec<Arc<dyn CursorModifier>>,
    as_model: Option<bool>,
    hard: Option<bool>,
}

impl OpCall {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs against `db` instead of the process-wide default.
    pub fn db(mut self, db: Arc<dyn Database>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn filter(mut self, filter: bson::Document) -> Self {
        self.args.filter = Some(filter);
        self
    }

    pub fn body(mut self, body: impl Into<Bson>) -> Self {
        self.args.body = Some(body.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.args.options.insert(key.into(), value.into());
        self
    }

    /// Appends a cursor modifier; modifiers apply in the order given, after
    /// the descriptor's own.
    pub fn modifier(mut self, modifier: impl CursorModifier + 'static) -> Self {
        self.modifiers.push(Arc::new(modifier));
        self
    }

    /// Overrides the descriptor's model-mapping flag.
    pub fn as_model(mut self, as_model: bool) -> Self {
        self.as_model = Some(as_model);
        self
    }

    /// Overrides the descriptor's hard flag.
    pub fn hard(mut self, hard: bool) -> Self {
        self.hard = Some(hard);
        self
    }
}

impl fmt::Debug for OpCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpCall")
            .field("args", &self.args)
            .field("as_model", &self.as_model)
            .field("hard", &self.hard)
            .finish_non_exhaustive()
    }
}

/// The shaped outcome of one executed operation.
#[derive(Debug)]
pub enum OpResult {
    /// The driver's raw result, untouched.
    Raw(Bson),
    /// A single mapped document; `None` when nothing matched and the
    /// operation was not hard.
    One(Option<Document>),
    /// A list of mapped documents.
    Many(Vec<Document>),
}

impl OpResult {
    /// Unwraps the raw variant.
    pub fn into_raw(self) -> DocmapResult<Bson> {
        match self {
            OpResult::Raw(raw) => Ok(raw),
            other => Err(DocmapError::Operation(format!(
                "expected a raw result, got {other:?}"
            ))),
        }
    }

    /// Unwraps the single-document variant.
    pub fn into_one(self) -> DocmapResult<Option<Document>> {
        match self {
            OpResult::One(doc) => Ok(doc),
            other => Err(DocmapError::Operation(format!(
                "expected a single document, got {other:?}"
            ))),
        }
    }

    /// Unwraps the document-list variant.
    pub fn into_many(self) -> DocmapResult<Vec<Document>> {
        match self {
            OpResult::Many(docs) => Ok(docs),
            other => Err(DocmapError::Operation(format!(
                "expected a document list, got {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        driver::{DriverCollection, SortDirection},
        field::Field,
        schema::{SchemaBuilder, SchemaRegistry},
    };
    use async_trait::async_trait;
    use bson::doc;
    use futures::executor::block_on;

    #[derive(Debug)]
    struct CannedDb {
        records: Vec<bson::Document>,
    }

    struct CannedCollection {
        records: Vec<bson::Document>,
    }

    struct CannedCursor {
        records: Vec<bson::Document>,
        skip: u64,
        limit: Option<u64>,
    }

    impl Database for CannedDb {
        fn collection(&self, _name: &str) -> Box<dyn DriverCollection> {
            Box::new(CannedCollection { records: self.records.clone() })
        }
    }

    #[async_trait]
    impl DriverCollection for CannedCollection {
        async fn run(&self, verb: Verb, _args: OpArgs) -> DocmapResult<Bson> {
            match verb {
                Verb::FindOne => Ok(self
                    .records
                    .first()
                    .cloned()
                    .map(Bson::Document)
                    .unwrap_or(Bson::Null)),
                Verb::Remove => Ok(Bson::Int64(self.records.len() as i64)),
                other => Err(DocmapError::Unsupported(other.to_string())),
            }
        }

        fn open_cursor(&self, _verb: Verb, _args: OpArgs) -> DocmapResult<Box<dyn DriverCursor>> {
            Ok(Box::new(CannedCursor {
                records: self.records.clone(),
                skip: 0,
                limit: None,
            }))
        }
    }

    #[async_trait]
    impl DriverCursor for CannedCursor {
        fn skip(&mut self, n: u64) {
            self.skip = n;
        }

        fn limit(&mut self, n: u64) {
            self.limit = Some(n);
        }

        fn sort(&mut self, _params: Vec<(String, SortDirection)>) {}

        fn filter(&mut self, _criteria: bson::Document) {}

        async fn to_list(self: Box<Self>) -> DocmapResult<Bson> {
            let mut records: Vec<Bson> = self
                .records
                .into_iter()
                .skip(self.skip as usize)
                .map(Bson::Document)
                .collect();
            if let Some(limit) = self.limit {
                records.truncate(limit as usize);
            }
            Ok(Bson::Array(records))
        }

        async fn count(self: Box<Self>) -> DocmapResult<Bson> {
            Ok(Bson::Int64(self.records.len() as i64))
        }
    }

    struct SkipOne;

    impl CursorModifier for SkipOne {
        fn reshape(&self, mut cursor: Box<dyn DriverCursor>) -> Box<dyn DriverCursor> {
            cursor.skip(1);
            cursor
        }
    }

    fn manager() -> Manager {
        let registry = SchemaRegistry::new();
        registry
            .define(
                SchemaBuilder::new("Note")
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

    fn canned(records: Vec<bson::Document>) -> Arc<dyn Database> {
        Arc::new(CannedDb { records })
    }

    #[test]
    fn raw_results_pass_through_untouched() {
        let manager = manager();
        let op = Operation::bind(Verb::Remove);
        let db = canned(vec![doc! { "text": "a" }]);
        let result = block_on(op.execute(&manager, OpCall::new().db(db))).unwrap();
        assert_eq!(result.into_raw().unwrap(), Bson::Int64(1));
    }

    #[test]
    fn model_mapping_produces_documents() {
        let manager = manager();
        let op = Operation::bind(Verb::Find).qualifier(Qualifier::ToList).as_model();
        let db = canned(vec![doc! { "text": "a" }, doc! { "text": "b" }]);
        let docs = block_on(op.execute(&manager, OpCall::new().db(db)))
            .unwrap()
            .into_many()
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].schema_name(), "Note");
    }

    #[test]
    fn missing_single_result_maps_to_none_or_empty_instance() {
        let manager = manager();
        let op = Operation::bind(Verb::FindOne).as_model();
        let db = canned(Vec::new());
        let none = block_on(op.execute(&manager, OpCall::new().db(Arc::clone(&db))))
            .unwrap()
            .into_one()
            .unwrap();
        assert!(none.is_none());

        let hard = block_on(op.execute(&manager, OpCall::new().db(db).hard(true)))
            .unwrap()
            .into_one()
            .unwrap();
        assert!(hard.is_some());
    }

    #[test]
    fn call_modifiers_reshape_the_cursor() {
        let manager = manager();
        let op = Operation::bind(Verb::Find).qualifier(Qualifier::ToList).as_model();
        let db = canned(vec![doc! { "text": "a" }, doc! { "text": "b" }]);
        let docs = block_on(op.execute(&manager, OpCall::new().db(db).modifier(SkipOne)))
            .unwrap()
            .into_many()
            .unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn count_ignores_reshaping_limits() {
        let manager = manager();
        let op = Operation::bind(Verb::Find).qualifier(Qualifier::Count);
        let db = canned(vec![doc! { "text": "a" }, doc! { "text": "b" }]);
        let count = block_on(op.execute(&manager, OpCall::new().db(db).modifier(SkipOne)))
            .unwrap()
            .into_raw()
            .unwrap();
        assert_eq!(count, Bson::Int64(2));
    }

    #[test]
    fn unsupported_verbs_surface_as_errors() {
        let manager = manager();
        let op = Operation::bind(Verb::Group);
        let db = canned(Vec::new());
        let result = block_on(op.execute(&manager, OpCall::new().db(db)));
        assert!(matches!(result, Err(DocmapError::Unsupported(_))));
    }
}
