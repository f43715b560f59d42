//! Appends records to the newest chunk, rolling to a new chunk when full.
//!
//! The writer never rewrites existing bytes. A torn trailing record left by
//! an interrupted append is cut off when the chunk is reopened.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use log::{debug, warn};

use crate::core::chunk::{
    chunk_path, create_chunk, discover_chunks, ChunkHeader, CHUNK_HEADER_SIZE,
};
use crate::core::record::{LogRecord, RECORD_SIZE};
use crate::core::{Error, Result};

pub struct ChunkWriter {
    /// Directory containing chunks
    dir: PathBuf,
    /// Current chunk ID
    chunk_id: u32,
    /// Chunk size in bytes
    chunk_size: usize,
    /// Current write offset within chunk
    write_offset: usize,
    /// Open handle on the current chunk (None until first append)
    file: Option<File>,
}

impl ChunkWriter {
    /// Open a writer positioned after the last record of the newest chunk.
    pub fn open(dir: impl Into<PathBuf>, chunk_size: usize) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let Some(&last) = discover_chunks(&dir)?.last() else {
            return Ok(Self {
                dir,
                chunk_id: 0,
                chunk_size,
                write_offset: CHUNK_HEADER_SIZE,
                file: None,
            });
        };

        let path = chunk_path(&dir, last);
        let mut header_buf = [0u8; CHUNK_HEADER_SIZE];
        {
            use std::io::Read;
            File::open(&path)?.read_exact(&mut header_buf)?;
        }
        let header = ChunkHeader::from_bytes(&header_buf)?;
        if header.chunk_id != last {
            return Err(Error::Corrupt("chunk id mismatch"));
        }

        let file = OpenOptions::new().append(true).open(&path)?;
        let len = file.metadata()?.len() as usize;
        let records = (len - CHUNK_HEADER_SIZE) / RECORD_SIZE;
        let aligned = CHUNK_HEADER_SIZE + records * RECORD_SIZE;
        if aligned != len {
            warn!(
                "truncating torn record in {} ({} trailing bytes)",
                path.display(),
                len - aligned
            );
            file.set_len(aligned as u64)?;
        }

        Ok(Self {
            dir,
            chunk_id: last,
            chunk_size,
            write_offset: aligned,
            file: Some(file),
        })
    }

    pub fn chunk_id(&self) -> u32 {
        self.chunk_id
    }

    pub fn write_offset(&self) -> usize {
        self.write_offset
    }

    /// Check if one more record would overflow the current chunk.
    pub fn needs_roll(&self) -> bool {
        self.write_offset + RECORD_SIZE > self.chunk_size
    }

    /// Append a record, rolling first if the current chunk is full.
    pub fn append(&mut self, record: &LogRecord) -> Result<()> {
        if self.needs_roll() {
            self.roll()?;
        }
        if self.file.is_none() {
            self.file = Some(create_chunk(&self.dir, self.chunk_id)?);
        }
        let file = self
            .file
            .as_mut()
            .ok_or(Error::Corrupt("chunk not open"))?;
        file.write_all(&record.to_bytes())?;
        self.write_offset += RECORD_SIZE;
        Ok(())
    }

    /// Close the current chunk and start the next one.
    pub fn roll(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_data()?;
        }
        self.chunk_id = self
            .chunk_id
            .checked_add(1)
            .ok_or(Error::Unsupported("chunk id overflow"))?;
        self.file = Some(create_chunk(&self.dir, self.chunk_id)?);
        self.write_offset = CHUNK_HEADER_SIZE;
        debug!("rolled to chunk {}", self.chunk_id);
        Ok(())
    }

    /// Make appended records durable.
    pub fn sync(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_ref() {
            file.sync_data()?;
        }
        Ok(())
    }
}
