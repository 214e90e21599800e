//! Convenient re-exports of commonly used types from docmap.
//!
//! Import this prelude module to quickly access the most frequently used
//! types without importing from multiple sub-modules:
//!
//! ```ignore
//! use docmap::prelude::*;
//! ```

pub use docmap_core::{
    connection::{ConnectOptions, connect, current_connection, current_database, disconnect, get_connection},
    document::{Document, ParentRef},
    driver::{Database, DriverBuilder, DriverClient, DriverCollection, DriverCursor, OpArgs, Qualifier, SortDirection, Verb},
    error::{DocmapError, DocmapResult},
    field::{Field, FieldDefault, FieldKind},
    manager::{Manager, ManagerFactory},
    ops::{CursorModifier, OpCall, OpResult, Operation},
    query::{match_exact, maybe_multi, model_fields, split_fields},
    retry::optimistic,
    schema::{Schema, SchemaBuilder, SchemaRef, SchemaRegistry},
    shaping::{Filter, Paginator, Sorter},
    value::Value,
};
