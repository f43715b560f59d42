//! Chunk file naming, discovery and headers.
//!
//! The cache log is a directory of numbered chunk files:
//! ```text
//! {cache_dir}/
//!   cache_0.bin      ← oldest chunk
//!   cache_1.bin
//!   cache_2.bin      ← chunk currently being appended to
//!   peek.meta        ← persisted consumption cursor
//! ```
//!
//! Every chunk starts with a [`ChunkHeader`] followed by fixed-size records.
//! All functions here are stateless; the writer and readers build on them.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::mmap::MmapFile;
use crate::core::record::RECORD_SIZE;
use crate::core::{Error, Result};

/// Default chunk size (24 KB), small enough for flash-backed devices.
pub const DEFAULT_CHUNK_SIZE: usize = 24 * 1024;

/// Size of the chunk header; the first record starts here.
pub const CHUNK_HEADER_SIZE: usize = 16;

/// Chunk magic number ('CCH0').
pub const CHUNK_MAGIC: u32 = 0x4343_4830;

pub const CHUNK_VERSION: u32 = 1;

const CHUNK_PREFIX: &str = "cache_";
const CHUNK_SUFFIX: &str = ".bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub magic: u32,
    pub version: u32,
    pub chunk_id: u32,
    pub flags: u32,
}

impl ChunkHeader {
    pub fn new(chunk_id: u32) -> Self {
        Self {
            magic: CHUNK_MAGIC,
            version: CHUNK_VERSION,
            chunk_id,
            flags: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; CHUNK_HEADER_SIZE] {
        let mut buf = [0u8; CHUNK_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.chunk_id.to_le_bytes());
        buf[12..16].copy_from_slice(&self.flags.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CHUNK_HEADER_SIZE {
            return Err(Error::Corrupt("chunk header truncated"));
        }
        let word = |at: usize| u32::from_le_bytes(bytes[at..at + 4].try_into().expect("slice length"));
        let header = Self {
            magic: word(0),
            version: word(4),
            chunk_id: word(8),
            flags: word(12),
        };
        if header.magic != CHUNK_MAGIC {
            return Err(Error::Corrupt("bad chunk magic"));
        }
        if header.version != CHUNK_VERSION {
            return Err(Error::UnsupportedVersion(header.version));
        }
        Ok(header)
    }
}

/// Generate chunk filename from ID (e.g., "cache_42.bin").
pub fn chunk_filename(id: u32) -> String {
    format!("{CHUNK_PREFIX}{id}{CHUNK_SUFFIX}")
}

pub fn chunk_path(root: &Path, id: u32) -> PathBuf {
    root.join(chunk_filename(id))
}

/// Returns the chunk ID if `name` is a chunk filename.
pub fn parse_chunk_filename(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(CHUNK_PREFIX)?.strip_suffix(CHUNK_SUFFIX)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok()
}

/// Discover all chunk IDs in a directory, sorted ascending.
pub fn discover_chunks(dir: &Path) -> Result<Vec<u32>> {
    let mut chunks = Vec::new();

    if !dir.exists() {
        return Ok(chunks);
    }

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if let Some(id) = parse_chunk_filename(&name) {
            chunks.push(id);
        }
    }

    chunks.sort_unstable();
    Ok(chunks)
}

/// First chunk with an ID strictly greater than `id`, if any.
pub fn next_chunk_after(dir: &Path, id: u32) -> Result<Option<u32>> {
    Ok(discover_chunks(dir)?.into_iter().find(|&other| other > id))
}

/// Validate chunk size is within acceptable bounds.
pub fn validate_chunk_size(chunk_size: u64) -> Result<usize> {
    let size = usize::try_from(chunk_size)
        .map_err(|_| Error::Unsupported("chunk size exceeds addressable range"))?;
    if size < CHUNK_HEADER_SIZE + RECORD_SIZE {
        return Err(Error::Unsupported("chunk size too small"));
    }
    if size > u32::MAX as usize {
        return Err(Error::Unsupported("chunk size exceeds offset range"));
    }
    Ok(size)
}

/// Create a new, empty chunk file with its header written.
pub fn create_chunk(root: &Path, id: u32) -> Result<File> {
    let path = chunk_path(root, id);
    let mut file = OpenOptions::new()
        .create_new(true)
        .append(true)
        .open(&path)?;
    file.write_all(&ChunkHeader::new(id).to_bytes())?;
    Ok(file)
}

/// Map an existing chunk for reading, validating its header.
pub fn open_chunk(root: &Path, id: u32) -> Result<MmapFile> {
    let mmap = MmapFile::open(&chunk_path(root, id))?;
    let header = ChunkHeader::from_bytes(mmap.as_slice())?;
    if header.chunk_id != id {
        return Err(Error::Corrupt("chunk id mismatch"));
    }
    Ok(mmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn filename_round_trip() {
        assert_eq!(chunk_filename(0), "cache_0.bin");
        assert_eq!(chunk_filename(42), "cache_42.bin");
        assert_eq!(parse_chunk_filename("cache_42.bin"), Some(42));
        assert_eq!(parse_chunk_filename("cache_.bin"), None);
        assert_eq!(parse_chunk_filename("cache_4a.bin"), None);
        assert_eq!(parse_chunk_filename("cache_1.bin.tmp"), None);
        assert_eq!(parse_chunk_filename("peek.meta"), None);
    }

    #[test]
    fn discover_sorts_numerically() {
        let dir = TempDir::new().unwrap();
        for id in [10, 2, 1] {
            create_chunk(dir.path(), id).unwrap();
        }
        std::fs::write(dir.path().join("peek.meta"), [0u8; 16]).unwrap();
        assert_eq!(discover_chunks(dir.path()).unwrap(), vec![1, 2, 10]);
        assert_eq!(next_chunk_after(dir.path(), 2).unwrap(), Some(10));
        assert_eq!(next_chunk_after(dir.path(), 10).unwrap(), None);
    }

    #[test]
    fn open_rejects_foreign_header() {
        let dir = TempDir::new().unwrap();
        std::fs::write(chunk_path(dir.path(), 0), [0xffu8; 48]).unwrap();
        assert!(matches!(
            open_chunk(dir.path(), 0),
            Err(Error::Corrupt("bad chunk magic"))
        ));
    }

    #[test]
    fn size_validation() {
        assert!(validate_chunk_size(16).is_err());
        assert_eq!(validate_chunk_size(48).unwrap(), 48);
    }
}
