//! The in-memory driver implementation.

use async_trait::async_trait;
use bson::{Bson, oid::ObjectId};
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};

use docmap_core::{
    connection::ConnectOptions,
    driver::{
        Database, DriverBuilder, DriverClient, DriverCollection, DriverCursor, OpArgs,
        SortDirection, Verb,
    },
    error::{DocmapError, DocmapResult},
};

use crate::matcher;

type RecordList = Vec<bson::Document>;
type CollectionMap = HashMap<String, RecordList>;
type DatabaseMap = HashMap<String, CollectionMap>;

/// A thread-safe in-memory driver client.
///
/// Cloneable; clones share the same underlying data. Records are stored as
/// plain BSON documents per database and collection, and every query is a
/// linear scan.
#[derive(Default, Clone, Debug)]
pub struct MemoryClient {
    store: Arc<RwLock<DatabaseMap>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DriverClient for MemoryClient {
    fn database(&self, name: &str) -> Arc<dyn Database> {
        Arc::new(MemoryDatabase {
            name: name.to_string(),
            store: Arc::clone(&self.store),
        })
    }
}

/// Builds a [`MemoryClient`] for the process-wide connection helpers.
#[derive(Default)]
pub struct MemoryBuilder {
    client: MemoryClient,
}

impl MemoryBuilder {
    /// A builder producing a fresh, empty client.
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder handing out an existing client, so a test can keep a handle
    /// to the data while the connection helpers own another.
    pub fn with_client(client: MemoryClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DriverBuilder for MemoryBuilder {
    type Client = MemoryClient;

    async fn build(self, _options: &ConnectOptions) -> DocmapResult<MemoryClient> {
        Ok(self.client)
    }
}

#[derive(Debug)]
struct MemoryDatabase {
    name: String,
    store: Arc<RwLock<DatabaseMap>>,
}

impl Database for MemoryDatabase {
    fn collection(&self, name: &str) -> Box<dyn DriverCollection> {
        Box::new(MemoryCollection {
            db: self.name.clone(),
            name: name.to_string(),
            store: Arc::clone(&self.store),
        })
    }
}

struct MemoryCollection {
    db: String,
    name: String,
    store: Arc<RwLock<DatabaseMap>>,
}

impl MemoryCollection {
    fn body_document(args: &mut OpArgs, verb: Verb) -> DocmapResult<bson::Document> {
        match args.body.take() {
            Some(Bson::Document(doc)) => Ok(doc),
            other => Err(DocmapError::Operation(format!(
                "{verb} requires a document body, got {other:?}"
            ))),
        }
    }

    fn insert_record(records: &mut RecordList, mut doc: bson::Document) -> Bson {
        let id = match doc.get("_id") {
            Some(id) if *id != Bson::Null => id.clone(),
            _ => {
                let id = Bson::ObjectId(ObjectId::new());
                doc.insert("_id", id.clone());
                id
            }
        };
        records.push(doc);
        id
    }
}

#[async_trait]
impl DriverCollection for MemoryCollection {
    async fn run(&self, verb: Verb, mut args: OpArgs) -> DocmapResult<Bson> {
        let mut guard = self.store.write().await;
        let records = guard
            .entry(self.db.clone())
            .or_default()
            .entry(self.name.clone())
            .or_default();
        let filter = args.filter.take().unwrap_or_default();

        match verb {
            Verb::Insert => match args.body.take() {
                Some(Bson::Document(doc)) => Ok(Self::insert_record(records, doc)),
                Some(Bson::Array(docs)) => {
                    let ids = docs
                        .into_iter()
                        .map(|item| match item {
                            Bson::Document(doc) => Ok(Self::insert_record(records, doc)),
                            other => Err(DocmapError::Operation(format!(
                                "insert requires documents, got {other:?}"
                            ))),
                        })
                        .collect::<DocmapResult<Vec<Bson>>>()?;
                    Ok(Bson::Array(ids))
                }
                other => Err(DocmapError::Operation(format!(
                    "insert requires a body, got {other:?}"
                ))),
            },

            Verb::Save => {
                let doc = Self::body_document(&mut args, verb)?;
                match doc.get("_id").filter(|id| **id != Bson::Null).cloned() {
                    Some(id) => {
                        let slot = records.iter_mut().find(|record| {
                            record.get("_id").is_some_and(|existing| *existing == id)
                        });
                        match slot {
                            Some(slot) => *slot = doc,
                            None => records.push(doc),
                        }
                        Ok(id)
                    }
                    None => Ok(Self::insert_record(records, doc)),
                }
            }

            Verb::Update => {
                let update = Self::body_document(&mut args, verb)?;
                let mut modified = 0i64;
                for record in records.iter_mut() {
                    if matcher::matches(record, &filter) {
                        apply_update(record, &update)?;
                        modified += 1;
                    }
                }
                Ok(Bson::Int64(modified))
            }

            Verb::Remove => {
                let before = records.len();
                records.retain(|record| !matcher::matches(record, &filter));
                Ok(Bson::Int64((before - records.len()) as i64))
            }

            Verb::FindOne => Ok(records
                .iter()
                .find(|record| matcher::matches(record, &filter))
                .cloned()
                .map(Bson::Document)
                .unwrap_or(Bson::Null)),

            Verb::FindAndModify => {
                let update = Self::body_document(&mut args, verb)?;
                let slot = records
                    .iter_mut()
                    .find(|record| matcher::matches(record, &filter));
                match slot {
                    Some(record) => {
                        let previous = record.clone();
                        apply_update(record, &update)?;
                        Ok(Bson::Document(previous))
                    }
                    None => Ok(Bson::Null),
                }
            }

            // Indexes have no effect on a linear scan.
            Verb::CreateIndex | Verb::EnsureIndex => Ok(Bson::Null),

            Verb::Find => Err(DocmapError::Operation(
                "find produces a cursor; open one instead".to_string(),
            )),

            Verb::Aggregate | Verb::Group => Err(DocmapError::Unsupported(format!(
                "{verb} is not available on the in-memory driver"
            ))),
        }
    }

    fn open_cursor(&self, verb: Verb, mut args: OpArgs) -> DocmapResult<Box<dyn DriverCursor>> {
        if verb != Verb::Find {
            return Err(DocmapError::Unsupported(format!(
                "{verb} does not produce a cursor"
            )));
        }
        Ok(Box::new(MemoryCursor {
            db: self.db.clone(),
            name: self.name.clone(),
            store: Arc::clone(&self.store),
            filter: args.filter.take().unwrap_or_default(),
            skip: 0,
            limit: None,
            sort: Vec::new(),
        }))
    }
}

/// A deferred scan; no records are touched until materialization.
struct MemoryCursor {
    db: String,
    name: String,
    store: Arc<RwLock<DatabaseMap>>,
    filter: bson::Document,
    skip: u64,
    limit: Option<u64>,
    sort: Vec<(String, SortDirection)>,
}

impl MemoryCursor {
    async fn snapshot(&self) -> RecordList {
        let guard = self.store.read().await;
        guard
            .get(&self.db)
            .and_then(|collections| collections.get(&self.name))
            .map(|records| {
                records
                    .iter()
                    .filter(|record| matcher::matches(record, &self.filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl DriverCursor for MemoryCursor {
    fn skip(&mut self, n: u64) {
        self.skip = n;
    }

    fn limit(&mut self, n: u64) {
        self.limit = Some(n);
    }

    fn sort(&mut self, params: Vec<(String, SortDirection)>) {
        self.sort = params;
    }

    fn filter(&mut self, criteria: bson::Document) {
        for (key, value) in criteria {
            self.filter.insert(key, value);
        }
    }

    async fn to_list(self: Box<Self>) -> DocmapResult<Bson> {
        let mut records = self.snapshot().await;
        if !self.sort.is_empty() {
            records.sort_by(|a, b| {
                for (field, direction) in &self.sort {
                    let ord = matcher::compare(
                        a.get(field).unwrap_or(&Bson::Null),
                        b.get(field).unwrap_or(&Bson::Null),
                    );
                    if ord != std::cmp::Ordering::Equal {
                        return match direction {
                            SortDirection::Asc => ord,
                            SortDirection::Desc => ord.reverse(),
                        };
                    }
                }
                std::cmp::Ordering::Equal
            });
        }
        let mut records: Vec<Bson> = records
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
        // Counts the whole selection; skip and limit do not apply.
        let records = self.snapshot().await;
        Ok(Bson::Int64(records.len() as i64))
    }
}

fn apply_update(record: &mut bson::Document, update: &bson::Document) -> DocmapResult<()> {
    let is_operator_update = update.keys().any(|key| key.starts_with('$'));
    if !is_operator_update {
        let id = record.get("_id").cloned();
        *record = update.clone();
        if let Some(id) = id {
            record.insert("_id", id);
        }
        return Ok(());
    }

    for (op, spec) in update {
        let Bson::Document(spec) = spec else {
            return Err(DocmapError::Operation(format!(
                "{op} requires a document operand"
            )));
        };
        match op.as_str() {
            "$set" => {
                for (key, value) in spec {
                    record.insert(key, value.clone());
                }
            }
            "$unset" => {
                for key in spec.keys() {
                    record.remove(key);
                }
            }
            "$inc" => {
                for (key, delta) in spec {
                    let current = record.get(key).unwrap_or(&Bson::Null);
                    let next = match (current, delta) {
                        (Bson::Null, delta) => delta.clone(),
                        (Bson::Int32(a), Bson::Int32(b)) => Bson::Int32(a + b),
                        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a + b),
                        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(*a as i64 + b),
                        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a + *b as i64),
                        (Bson::Double(a), Bson::Double(b)) => Bson::Double(a + b),
                        (current, delta) => {
                            return Err(DocmapError::Operation(format!(
                                "cannot $inc {current:?} by {delta:?}"
                            )));
                        }
                    };
                    record.insert(key, next);
                }
            }
            other => {
                return Err(DocmapError::Unsupported(format!(
                    "update operator {other} is not available on the in-memory driver"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn replacement_updates_preserve_identity() {
        let mut record = doc! { "_id": 7i64, "title": "old", "views": 3i64 };
        apply_update(&mut record, &doc! { "title": "new" }).unwrap();
        assert_eq!(record, doc! { "title": "new", "_id": 7i64 });
    }

    #[test]
    fn operator_updates_compose() {
        let mut record = doc! { "_id": 7i64, "title": "old", "views": 3i64 };
        apply_update(
            &mut record,
            &doc! { "$set": { "title": "new" }, "$inc": { "views": 2i64 }, "$unset": { "junk": 1 } },
        )
        .unwrap();
        assert_eq!(record.get_str("title").unwrap(), "new");
        assert_eq!(record.get_i64("views").unwrap(), 5);
    }

    #[test]
    fn inc_from_unset_starts_at_the_delta() {
        let mut record = doc! { "_id": 1i64 };
        apply_update(&mut record, &doc! { "$inc": { "views": 4i64 } }).unwrap();
        assert_eq!(record.get_i64("views").unwrap(), 4);
    }

    #[test]
    fn unknown_operators_are_unsupported() {
        let mut record = doc! { "_id": 1i64 };
        let result = apply_update(&mut record, &doc! { "$push": { "tags": "x" } });
        assert!(matches!(result, Err(DocmapError::Unsupported(_))));
    }
}
