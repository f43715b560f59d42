use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::core::Result;

/// Read-only mapping of a chunk file.
///
/// The mapping length is fixed when the file is opened; records appended
/// afterwards are only visible to a fresh mapping.
pub struct MmapFile {
    _file: File,
    map: Mmap,
}

impl MmapFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: chunks are only appended to while mapped. The one
        // truncation, cutting a torn tail, happens in `ChunkWriter::open`
        // before any reader maps the chunk.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { _file: file, map })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
