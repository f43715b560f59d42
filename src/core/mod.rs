//! Storage side of the sample cache: record codec, chunk files, cursors and
//! the store that ties them together.

pub mod chunk;
pub mod chunk_writer;
pub mod cursor;
pub mod error;
pub mod mmap;
pub mod peek;
pub mod record;
pub mod store;

pub use cursor::{ChunkReader, Cursor};
pub use error::{Error, Result};
pub use peek::PeekGuard;
pub use record::{LogRecord, RECORD_SIZE, VARS_PER_TASK};
pub use store::{CacheStore, LogSource, StoreConfig};
