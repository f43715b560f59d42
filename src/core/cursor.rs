//! Read positions and sequential chunk reading.
//!
//! A [`Cursor`] is a plain value: chunk ID plus byte offset of the next
//! record. [`ChunkReader`] walks records from a cursor across chunk
//! boundaries, opening chunks lazily.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::core::chunk::{discover_chunks, next_chunk_after, open_chunk, CHUNK_HEADER_SIZE};
use crate::core::mmap::MmapFile;
use crate::core::record::{LogRecord, RECORD_SIZE};
use crate::core::{Error, Result};

/// Position of the next record to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Cursor {
    pub file_index: u32,
    pub byte_offset: u32,
}

impl Cursor {
    /// Start of the log; resolves to the first record of the oldest chunk.
    pub const START: Cursor = Cursor {
        file_index: 0,
        byte_offset: 0,
    };

    pub fn new(file_index: u32, byte_offset: u32) -> Self {
        Self {
            file_index,
            byte_offset,
        }
    }
}

/// Sequential reader over the chunk files of one directory.
///
/// Each caller owns its reader, so independent readers never disturb each
/// other's position.
pub struct ChunkReader {
    dir: PathBuf,
    position: Cursor,
    current: Option<MmapFile>,
}

impl ChunkReader {
    pub fn open(dir: impl Into<PathBuf>, position: Cursor) -> Self {
        Self {
            dir: dir.into(),
            position,
            current: None,
        }
    }

    /// Position of the next record this reader will return.
    pub fn position(&self) -> Cursor {
        self.position
    }

    /// Read the next record.
    ///
    /// Returns `None` at the end of the newest chunk. The reader keeps its
    /// position, so a later call picks up records appended since.
    pub fn next_record(&mut self) -> Result<Option<LogRecord>> {
        loop {
            if self.current.is_none() && !self.load_chunk()? {
                return Ok(None);
            }
            let mmap = self
                .current
                .as_ref()
                .ok_or(Error::Corrupt("no chunk loaded"))?;

            let start = self.position.byte_offset as usize;
            if start + RECORD_SIZE > mmap.len() {
                match next_chunk_after(&self.dir, self.position.file_index)? {
                    Some(next) => {
                        self.position = Cursor::new(next, CHUNK_HEADER_SIZE as u32);
                        self.current = None;
                        continue;
                    }
                    None => {
                        // Drop the mapping so growth is seen on the next call.
                        self.current = None;
                        return Ok(None);
                    }
                }
            }

            let mut buf = [0u8; RECORD_SIZE];
            buf.copy_from_slice(&mmap.as_slice()[start..start + RECORD_SIZE]);
            let record = LogRecord::from_bytes(&buf)?;
            self.position.byte_offset += RECORD_SIZE as u32;
            return Ok(Some(record));
        }
    }

    /// Map the chunk the position points into, skipping forward past
    /// chunks that no longer exist.
    fn load_chunk(&mut self) -> Result<bool> {
        let chunks = discover_chunks(&self.dir)?;
        let Some(&id) = chunks.iter().find(|&&id| id >= self.position.file_index) else {
            return Ok(false);
        };
        if id != self.position.file_index {
            self.position = Cursor::new(id, CHUNK_HEADER_SIZE as u32);
        }
        if (self.position.byte_offset as usize) < CHUNK_HEADER_SIZE {
            self.position.byte_offset = CHUNK_HEADER_SIZE as u32;
        }
        self.current = Some(open_chunk(&self.dir, id)?);
        Ok(true)
    }
}

/// Read one record at `position` without touching any shared state.
///
/// Returns the record together with the position of the record after it.
pub fn read_at(dir: &Path, position: Cursor) -> Result<Option<(LogRecord, Cursor)>> {
    let mut reader = ChunkReader::open(dir, position);
    Ok(reader
        .next_record()?
        .map(|record| (record, reader.position())))
}

pub fn load_cursor(path: &Path) -> Result<Cursor> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Cursor::START),
        Err(err) => return Err(err.into()),
    };
    if file.metadata()?.len() != 8 {
        return Err(Error::Corrupt("cursor metadata has unexpected size"));
    }
    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)?;
    let file_index = u32::from_le_bytes(buf[0..4].try_into().expect("slice length"));
    let byte_offset = u32::from_le_bytes(buf[4..8].try_into().expect("slice length"));
    Ok(Cursor::new(file_index, byte_offset))
}

pub fn store_cursor(path: &Path, cursor: &Cursor) -> Result<()> {
    let tmp_path = path.with_extension("meta.tmp");
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)?;
    let mut buf = [0u8; 8];
    buf[0..4].copy_from_slice(&cursor.file_index.to_le_bytes());
    buf[4..8].copy_from_slice(&cursor.byte_offset.to_le_bytes());
    file.write_all(&buf)?;
    file.sync_all()?;
    std::fs::rename(tmp_path, path)?;
    Ok(())
}
