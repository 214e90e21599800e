//! Core abstractions for the docmap document-schema mapping layer.
//!
//! This crate defines the backend-independent pieces:
//!
//! - [`field`]: typed, validating, defaultable field descriptors
//! - [`schema`]: schema definition and the explicit name registry
//! - [`document`]: validated runtime instances with parent back-references
//! - [`driver`]: the traits a storage backend implements
//! - [`connection`]: process-wide client and default-database state
//! - [`ops`]: operation descriptors and the generic asynchronous executor
//! - [`manager`]: the per-schema verb table over the executor
//! - [`retry`]: the optimistic-concurrency retry loop
//! - [`shaping`]: pagination, sorting, and filter cursor modifiers
//! - [`query`]: helpers for building selection criteria from request input
//!
//! Backends such as `docmap-memory` and `docmap-mongodb` implement the
//! [`driver`] traits; applications usually depend on the `docmap` facade
//! instead of this crate directly.

pub mod connection;
pub mod document;
pub mod driver;
pub mod error;
pub mod field;
pub mod manager;
pub mod ops;
pub mod query;
pub mod retry;
pub mod schema;
pub mod shaping;
pub mod value;
