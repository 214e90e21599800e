//! Driver traits: the seam between the execution layer and a backend.
//!
//! A backend exposes a [`DriverClient`], which hands out [`Database`] handles,
//! which hand out [`DriverCollection`] handles. One-shot verbs run through
//! [`DriverCollection::run`]; streaming verbs open a [`DriverCursor`] that is
//! reshaped (skip, limit, sort, filter) before it is materialized exactly
//! once.

use async_trait::async_trait;
use bson::Bson;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

use crate::error::DocmapResult;

/// The closed set of operation verbs a driver can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Insert,
    Save,
    Update,
    Remove,
    Find,
    FindOne,
    Group,
    CreateIndex,
    EnsureIndex,
    Aggregate,
    FindAndModify,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Insert => "insert",
            Verb::Save => "save",
            Verb::Update => "update",
            Verb::Remove => "remove",
            Verb::Find => "find",
            Verb::FindOne => "find_one",
            Verb::Group => "group",
            Verb::CreateIndex => "create_index",
            Verb::EnsureIndex => "ensure_index",
            Verb::Aggregate => "aggregate",
            Verb::FindAndModify => "find_and_modify",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a cursor-producing verb is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    /// Drain the cursor into an array.
    ToList,
    /// Count the matching records. Skip and limit do not apply.
    Count,
}

/// A sort direction, serialized as the conventional signed integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_int(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// The positional payload of one driver call.
#[derive(Debug, Clone, Default)]
pub struct OpArgs {
    /// Selection criteria, for verbs that filter.
    pub filter: Option<bson::Document>,
    /// Verb-specific body: the document(s) to insert, the update spec, the
    /// aggregation pipeline, the index keys.
    pub body: Option<Bson>,
    /// Free-form driver options.
    pub options: bson::Document,
}

impl OpArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: bson::Document) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn body(mut self, body: impl Into<Bson>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// A deferred, reshapeable stream of records.
///
/// Reshaping calls are synchronous and cheap; no work happens until
/// [`to_list`](Self::to_list) or [`count`](Self::count) consumes the cursor.
#[async_trait]
pub trait DriverCursor: Send {
    /// Skips the first `n` records.
    fn skip(&mut self, n: u64);

    /// Caps the stream at `n` records.
    fn limit(&mut self, n: u64);

    /// Orders the stream by the given fields.
    fn sort(&mut self, params: Vec<(String, SortDirection)>);

    /// Narrows the selection with additional criteria.
    fn filter(&mut self, criteria: bson::Document);

    /// Drains the cursor into a BSON array.
    async fn to_list(self: Box<Self>) -> DocmapResult<Bson>;

    /// Counts matching records, ignoring skip and limit.
    async fn count(self: Box<Self>) -> DocmapResult<Bson>;
}

/// One backend collection.
#[async_trait]
pub trait DriverCollection: Send + Sync {
    /// Executes a one-shot verb and returns its raw result.
    async fn run(&self, verb: Verb, args: OpArgs) -> DocmapResult<Bson>;

    /// Opens a deferred cursor for a streaming verb.
    fn open_cursor(&self, verb: Verb, args: OpArgs) -> DocmapResult<Box<dyn DriverCursor>>;
}

/// One backend database.
pub trait Database: Send + Sync + fmt::Debug {
    fn collection(&self, name: &str) -> Box<dyn DriverCollection>;
}

/// A connected backend client.
#[async_trait]
pub trait DriverClient: Send + Sync + fmt::Debug {
    fn database(&self, name: &str) -> Arc<dyn Database>;

    /// Releases backend resources. The default is a no-op for drivers whose
    /// handles need no explicit teardown.
    async fn disconnect(&self) -> DocmapResult<()> {
        Ok(())
    }
}

/// Builds a [`DriverClient`] from connection options.
#[async_trait]
pub trait DriverBuilder {
    type Client: DriverClient + 'static;

    async fn build(self, options: &crate::connection::ConnectOptions) -> DocmapResult<Self::Client>;
}
