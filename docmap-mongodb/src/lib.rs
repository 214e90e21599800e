//! MongoDB driver for the docmap schema mapping layer.
//!
//! Maps the verb set onto the official `mongodb` crate: inserts, upserting
//! saves, operator updates, deferred find cursors, aggregation pipelines,
//! and index creation. The retired `group` verb is not supported; use an
//! aggregation pipeline instead.

mod store;

pub use store::{MongoBuilder, MongoClient};
