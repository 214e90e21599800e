//! In-memory driver for the docmap schema mapping layer.
//!
//! Records live in plain vectors behind async-aware read-write locks, with
//! linear scans instead of indexes. The backend implements the full verb set
//! except aggregation and grouping, which have no in-memory counterpart.
//! Intended for tests and prototypes, not production data.

mod matcher;
mod store;

pub use store::{MemoryBuilder, MemoryClient};
