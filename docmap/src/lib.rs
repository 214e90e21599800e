//! Main docmap crate providing a unified interface for schema-mapped
//! document storage.
//!
//! This crate is the primary entry point for users of the docmap layer. It
//! re-exports the core modules and provides convenient access to the
//! available drivers.
//!
//! # Features
//!
//! - **Declarative schemas** - Typed, validating, defaultable fields with
//!   inheritance, registered into an explicit registry
//! - **Validated documents** - Every assignment is coerced and checked;
//!   embedded documents carry back-references to their container
//! - **Declarative operations** - A per-schema manager drives a verb table
//!   of operation descriptors through a generic asynchronous executor
//! - **Multiple drivers** - In-memory and MongoDB backends behind one trait
//!   seam
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::prelude::*;
//! use docmap::memory::MemoryBuilder;
//! use bson::doc;
//!
//! async fn run() -> DocmapResult<()> {
//!     let registry = SchemaRegistry::new();
//!     let schema = registry.define(
//!         SchemaBuilder::new("Article")
//!             .field("title", Field::string().required().max_length(120))
//!             .field("status", Field::string().choices(["draft", "published"]))
//!             .field("created", Field::timestamp().auto_created())
//!             .with_default_manager(),
//!     )?;
//!
//!     connect("app", MemoryBuilder::new(), &ConnectOptions::new()).await?;
//!
//!     let manager = schema.manager();
//!     manager
//!         .insert(OpCall::new().body(doc! { "title": "hello", "status": "draft" }))
//!         .await?;
//!
//!     let drafts = manager
//!         .find(OpCall::new().filter(doc! { "status": "draft" }))
//!         .await?;
//!     assert_eq!(drafts.len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! # Drivers
//!
//! - [`memory`] - Fast in-memory driver for development and testing
//! - [`mongodb`] - Persistent MongoDB driver (requires the `mongodb`
//!   feature)

pub mod prelude;

pub use docmap_core::{
    connection, document, driver, error, field, manager, ops, query, retry, schema, shaping,
    value,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory driver implementations.
pub mod memory {
    pub use docmap_memory::{MemoryBuilder, MemoryClient};
}

/// MongoDB driver implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmap_mongodb::{MongoBuilder, MongoClient};
}
