//! Chunked sample cache with cursor-transparent export.
//!
//! Samples are buffered in memory, flushed into rotating chunk files, and
//! consumed through a shared cursor by a background reader. The export
//! engine walks the whole log as CSV (optionally joining samples that share a
//! timestamp) or lists the cache as JSON, and leaves the shared cursor
//! exactly where it found it.

pub mod core;
pub mod endpoint;
pub mod export;
pub mod schema;

pub use crate::core::{CacheStore, Cursor, Error, LogRecord, LogSource, Result, StoreConfig};
pub use crate::export::{ExportConfig, ExportFormat, ExportSummary, Separator};
pub use crate::schema::{SchemaRegistry, TaskSchema};
