//! The cache store: chunk files, a volatile sample buffer, and the shared
//! consumption cursor.
//!
//! # Layout
//!
//! ```text
//! append_sample() ──► pending buffer ──flush_pending_samples()──► cache_N.bin
//!                                                                    │
//!                       consumption cursor ◄── get_next_record() ────┘
//! ```
//!
//! A background consumer (e.g. an uploader) walks the log through the shared
//! cursor and persists it with [`CacheStore::commit_cursor`]. Exports borrow
//! the store mutably for their whole pass and hand the cursor back unchanged,
//! see [`PeekGuard`](crate::core::PeekGuard).

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::chunk::{chunk_filename, chunk_path, discover_chunks, validate_chunk_size, DEFAULT_CHUNK_SIZE};
use crate::core::chunk_writer::ChunkWriter;
use crate::core::cursor::{load_cursor, read_at, store_cursor, ChunkReader, Cursor};
use crate::core::record::LogRecord;
use crate::core::Result;

const CURSOR_META: &str = "peek.meta";

/// Default number of samples held in memory before they hit a chunk file.
pub const DEFAULT_PENDING_CAPACITY: usize = 16;

/// Configuration for a cache store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the chunk files.
    pub dir: PathBuf,

    /// Chunk size in bytes.
    /// Default: 24 KB
    pub chunk_size: usize,

    /// Samples buffered before an automatic flush.
    /// Default: 16
    pub pending_capacity: usize,
}

impl StoreConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// Read a JSON config document; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./cache"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            pending_capacity: DEFAULT_PENDING_CAPACITY,
        }
    }
}

/// Read access to a chunked log as seen by the export engine.
pub trait LogSource {
    /// Current value of the shared consumption cursor.
    fn save_cursor(&self) -> Cursor;

    /// Reposition the shared consumption cursor.
    fn set_cursor(&mut self, cursor: Cursor);

    /// Persist every buffered sample so sequential reads can see it.
    ///
    /// Returns the number of samples written; zero when nothing was pending.
    fn flush_pending_samples(&mut self) -> Result<usize>;

    /// Read the record under the consumption cursor and advance it.
    ///
    /// `Ok(None)` signals end-of-log.
    fn get_next_record(&mut self) -> Result<Option<LogRecord>>;

    /// Name of the `index`-th chunk file counting from the oldest, and
    /// whether it is the newest. Missing chunks yield an empty name.
    fn chunk_file_name(&self, index: usize) -> Result<(String, bool)>;
}

pub struct CacheStore {
    dir: PathBuf,
    writer: ChunkWriter,
    pending: Vec<LogRecord>,
    pending_capacity: usize,
    cursor: Cursor,
    reader: Option<ChunkReader>,
    meta_path: PathBuf,
}

impl CacheStore {
    /// Open (or create) a store, restoring the last committed cursor.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let chunk_size = validate_chunk_size(config.chunk_size as u64)?;
        let writer = ChunkWriter::open(&config.dir, chunk_size)?;
        let meta_path = config.dir.join(CURSOR_META);
        let cursor = load_cursor(&meta_path)?;
        debug!(
            "opened cache store {} at chunk {} (cursor {:?})",
            config.dir.display(),
            writer.chunk_id(),
            cursor
        );
        Ok(Self {
            dir: config.dir.clone(),
            writer,
            pending: Vec::with_capacity(config.pending_capacity),
            pending_capacity: config.pending_capacity.max(1),
            cursor,
            reader: None,
            meta_path,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Buffer one sample; the buffer is flushed once it reaches capacity.
    pub fn append_sample(&mut self, record: LogRecord) -> Result<()> {
        self.pending.push(record);
        if self.pending.len() >= self.pending_capacity {
            self.flush_pending_samples()?;
        }
        Ok(())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Read one record at `position` without moving the shared cursor.
    pub fn read_at(&self, position: Cursor) -> Result<Option<(LogRecord, Cursor)>> {
        read_at(&self.dir, position)
    }

    /// Independent reader starting at `position`.
    pub fn reader_at(&self, position: Cursor) -> ChunkReader {
        ChunkReader::open(&self.dir, position)
    }

    /// Persist the consumption cursor so it survives a restart.
    pub fn commit_cursor(&self) -> Result<()> {
        store_cursor(&self.meta_path, &self.save_cursor())
    }

    /// Chunk IDs currently on disk, oldest first.
    pub fn chunk_ids(&self) -> Result<Vec<u32>> {
        discover_chunks(&self.dir)
    }
}

impl LogSource for CacheStore {
    fn save_cursor(&self) -> Cursor {
        self.reader
            .as_ref()
            .map_or(self.cursor, ChunkReader::position)
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
        self.reader = None;
    }

    fn flush_pending_samples(&mut self) -> Result<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let mut written = 0;
        let appended = self.pending.iter().try_for_each(|record| {
            self.writer.append(record)?;
            written += 1;
            Ok::<(), crate::core::Error>(())
        });
        // Samples that reached disk must not be written twice on retry.
        self.pending.drain(..written);
        appended?;
        self.writer.sync()?;
        debug!("flushed {written} pending samples");
        Ok(written)
    }

    fn get_next_record(&mut self) -> Result<Option<LogRecord>> {
        let cursor = self.cursor;
        let dir = &self.dir;
        let reader = self
            .reader
            .get_or_insert_with(|| ChunkReader::open(dir, cursor));
        let record = reader.next_record()?;
        self.cursor = reader.position();
        Ok(record)
    }

    fn chunk_file_name(&self, index: usize) -> Result<(String, bool)> {
        let chunks = discover_chunks(&self.dir)?;
        let (Some(&first), Some(&last)) = (chunks.first(), chunks.last()) else {
            return Ok((String::new(), true));
        };
        let id = u64::from(first) + index as u64;
        let is_last = id >= u64::from(last);
        if id > u64::from(last) {
            return Ok((String::new(), true));
        }
        let id = id as u32;
        let name = if chunk_path(&self.dir, id).exists() {
            chunk_filename(id)
        } else {
            String::new()
        };
        Ok((name, is_last))
    }
}
