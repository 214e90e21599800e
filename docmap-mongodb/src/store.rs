//! The MongoDB driver implementation.

use async_trait::async_trait;
use bson::{Bson, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection, IndexModel,
    options::{ClientOptions, FindOptions},
};
use std::{fmt, sync::Arc};

use docmap_core::{
    connection::ConnectOptions,
    driver::{
        Database, DriverBuilder, DriverClient, DriverCollection, DriverCursor, OpArgs,
        SortDirection, Verb,
    },
    error::{DocmapError, DocmapResult},
};

fn backend_error(err: impl fmt::Display) -> DocmapError {
    DocmapError::Operation(err.to_string())
}

/// Builds a [`MongoClient`] from connection options.
///
/// A configured URI wins; otherwise the DSN is assembled from host and port.
#[derive(Debug, Default)]
pub struct MongoBuilder;

impl MongoBuilder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DriverBuilder for MongoBuilder {
    type Client = MongoClient;

    async fn build(self, options: &ConnectOptions) -> DocmapResult<MongoClient> {
        let dsn = options
            .uri
            .clone()
            .unwrap_or_else(|| format!("mongodb://{}:{}", options.host, options.port));
        let mut client_options = ClientOptions::parse(&dsn)
            .await
            .map_err(|err| DocmapError::Connection(err.to_string()))?;
        if let Some(replica_set) = &options.replica_set {
            client_options.repl_set_name = Some(replica_set.clone());
        }
        let client = Client::with_options(client_options)
            .map_err(|err| DocmapError::Connection(err.to_string()))?;
        tracing::debug!(dsn = %dsn, "mongodb client configured");
        Ok(MongoClient { client })
    }
}

/// A connected MongoDB driver client.
#[derive(Debug, Clone)]
pub struct MongoClient {
    client: Client,
}

impl MongoClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DriverClient for MongoClient {
    fn database(&self, name: &str) -> Arc<dyn Database> {
        Arc::new(MongoDatabase {
            db: self.client.database(name),
        })
    }

    async fn disconnect(&self) -> DocmapResult<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}

struct MongoDatabase {
    db: mongodb::Database,
}

impl fmt::Debug for MongoDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoDatabase")
            .field("name", &self.db.name())
            .finish()
    }
}

impl Database for MongoDatabase {
    fn collection(&self, name: &str) -> Box<dyn DriverCollection> {
        Box::new(MongoCollection {
            coll: self.db.collection(name),
        })
    }
}

struct MongoCollection {
    coll: Collection<bson::Document>,
}

fn body_document(args: &mut OpArgs, verb: Verb) -> DocmapResult<bson::Document> {
    match args.body.take() {
        Some(Bson::Document(doc)) => Ok(doc),
        other => Err(DocmapError::Operation(format!(
            "{verb} requires a document body, got {other:?}"
        ))),
    }
}

fn pipeline(args: &mut OpArgs) -> DocmapResult<Vec<bson::Document>> {
    match args.body.take() {
        Some(Bson::Array(stages)) => stages
            .into_iter()
            .map(|stage| match stage {
                Bson::Document(doc) => Ok(doc),
                other => Err(DocmapError::Operation(format!(
                    "pipeline stages must be documents, got {other:?}"
                ))),
            })
            .collect(),
        other => Err(DocmapError::Operation(format!(
            "aggregate requires a pipeline array, got {other:?}"
        ))),
    }
}

#[async_trait]
impl DriverCollection for MongoCollection {
    async fn run(&self, verb: Verb, mut args: OpArgs) -> DocmapResult<Bson> {
        let filter = args.filter.take().unwrap_or_default();

        match verb {
            Verb::Insert => match args.body.take() {
                Some(Bson::Document(doc)) => {
                    let result = self.coll.insert_one(doc).await.map_err(backend_error)?;
                    Ok(result.inserted_id)
                }
                Some(Bson::Array(items)) => {
                    let docs = items
                        .into_iter()
                        .map(|item| match item {
                            Bson::Document(doc) => Ok(doc),
                            other => Err(DocmapError::Operation(format!(
                                "insert requires documents, got {other:?}"
                            ))),
                        })
                        .collect::<DocmapResult<Vec<bson::Document>>>()?;
                    let count = docs.len();
                    let result = self.coll.insert_many(docs).await.map_err(backend_error)?;
                    let ids = (0..count)
                        .map(|index| {
                            result.inserted_ids.get(&index).cloned().unwrap_or(Bson::Null)
                        })
                        .collect();
                    Ok(Bson::Array(ids))
                }
                other => Err(DocmapError::Operation(format!(
                    "insert requires a body, got {other:?}"
                ))),
            },

            Verb::Save => {
                let body = body_document(&mut args, verb)?;
                match body.get("_id").filter(|id| **id != Bson::Null).cloned() {
                    Some(id) => {
                        self.coll
                            .replace_one(doc! { "_id": id.clone() }, body)
                            .upsert(true)
                            .await
                            .map_err(backend_error)?;
                        Ok(id)
                    }
                    None => {
                        let result =
                            self.coll.insert_one(body).await.map_err(backend_error)?;
                        Ok(result.inserted_id)
                    }
                }
            }

            Verb::Update => {
                let update = body_document(&mut args, verb)?;
                if update.keys().any(|key| key.starts_with('$')) {
                    let result = self
                        .coll
                        .update_many(filter, update)
                        .await
                        .map_err(backend_error)?;
                    Ok(Bson::Int64(result.modified_count as i64))
                } else {
                    let result = self
                        .coll
                        .replace_one(filter, update)
                        .await
                        .map_err(backend_error)?;
                    Ok(Bson::Int64(result.modified_count as i64))
                }
            }

            Verb::Remove => {
                let result = self.coll.delete_many(filter).await.map_err(backend_error)?;
                Ok(Bson::Int64(result.deleted_count as i64))
            }

            Verb::FindOne => Ok(self
                .coll
                .find_one(filter)
                .await
                .map_err(backend_error)?
                .map(Bson::Document)
                .unwrap_or(Bson::Null)),

            Verb::FindAndModify => {
                let update = body_document(&mut args, verb)?;
                // Returns the pre-image, matching the executor contract.
                Ok(self
                    .coll
                    .find_one_and_update(filter, update)
                    .await
                    .map_err(backend_error)?
                    .map(Bson::Document)
                    .unwrap_or(Bson::Null))
            }

            Verb::CreateIndex | Verb::EnsureIndex => {
                let keys = body_document(&mut args, verb)?;
                let model = IndexModel::builder().keys(keys).build();
                let result = self.coll.create_index(model).await.map_err(backend_error)?;
                Ok(Bson::String(result.index_name))
            }

            Verb::Aggregate => {
                let stages = pipeline(&mut args)?;
                let results: Vec<bson::Document> = self
                    .coll
                    .aggregate(stages)
                    .await
                    .map_err(backend_error)?
                    .try_collect()
                    .await
                    .map_err(backend_error)?;
                Ok(Bson::Array(results.into_iter().map(Bson::Document).collect()))
            }

            Verb::Group => Err(DocmapError::Unsupported(
                "group was retired by the server; use aggregate".to_string(),
            )),

            Verb::Find => Err(DocmapError::Operation(
                "find produces a cursor; open one instead".to_string(),
            )),
        }
    }

    fn open_cursor(&self, verb: Verb, mut args: OpArgs) -> DocmapResult<Box<dyn DriverCursor>> {
        if verb != Verb::Find {
            return Err(DocmapError::Unsupported(format!(
                "{verb} does not produce a cursor"
            )));
        }
        Ok(Box::new(MongoCursor {
            coll: self.coll.clone(),
            filter: args.filter.take().unwrap_or_default(),
            skip: None,
            limit: None,
            sort: None,
        }))
    }
}

/// A deferred find; reshaping accumulates options until materialization.
struct MongoCursor {
    coll: Collection<bson::Document>,
    filter: bson::Document,
    skip: Option<u64>,
    limit: Option<i64>,
    sort: Option<bson::Document>,
}

#[async_trait]
impl DriverCursor for MongoCursor {
    fn skip(&mut self, n: u64) {
        self.skip = Some(n);
    }

    fn limit(&mut self, n: u64) {
        self.limit = Some(n as i64);
    }

    fn sort(&mut self, params: Vec<(String, SortDirection)>) {
        let mut sort = bson::Document::new();
        for (field, direction) in params {
            sort.insert(field, direction.as_int());
        }
        self.sort = Some(sort);
    }

    fn filter(&mut self, criteria: bson::Document) {
        for (key, value) in criteria {
            self.filter.insert(key, value);
        }
    }

    async fn to_list(self: Box<Self>) -> DocmapResult<Bson> {
        let mut options = FindOptions::default();
        options.skip = self.skip;
        options.limit = self.limit;
        options.sort = self.sort;
        let records: Vec<bson::Document> = self
            .coll
            .find(self.filter)
            .with_options(options)
            .await
            .map_err(backend_error)?
            .try_collect()
            .await
            .map_err(backend_error)?;
        Ok(Bson::Array(records.into_iter().map(Bson::Document).collect()))
    }

    async fn count(self: Box<Self>) -> DocmapResult<Bson> {
        // Counts the whole selection; skip and limit do not apply.
        let count = self
            .coll
            .count_documents(self.filter)
            .await
            .map_err(backend_error)?;
        Ok(Bson::Int64(count as i64))
    }
}
