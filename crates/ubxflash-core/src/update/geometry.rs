//! Mapping of image chunks onto flash sectors

use core::ops::Range;

use crate::fis::FisRecord;

/// Uniform-sector flash geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashGeometry {
    /// Erase sector size in bytes
    pub sector_size: u32,
    /// Number of sectors
    pub sector_count: u32,
}

impl FlashGeometry {
    /// Create a geometry
    pub fn new(sector_size: u32, sector_count: u32) -> Self {
        Self {
            sector_size,
            sector_count,
        }
    }

    /// Geometry described by a FIS record
    pub fn from_record(fis: &FisRecord) -> Self {
        Self::new(fis.sector_size(), fis.sector_count())
    }

    /// Flash size in bytes
    pub fn capacity(&self) -> u64 {
        self.sector_size as u64 * self.sector_count as u64
    }
}

/// Chunk/sector layout of one image
///
/// The chunk size divides the sector size, so every chunk lies within a
/// single sector.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkMap {
    image_len: usize,
    chunk_size: usize,
    sector_size: usize,
}

impl ChunkMap {
    pub(crate) fn new(image_len: usize, chunk_size: usize, sector_size: usize) -> Self {
        Self {
            image_len,
            chunk_size,
            sector_size,
        }
    }

    /// Number of write commands
    pub(crate) fn chunks(&self) -> usize {
        self.image_len.div_ceil(self.chunk_size)
    }

    /// Number of sectors touched by the image
    pub(crate) fn sectors(&self) -> usize {
        self.image_len.div_ceil(self.sector_size)
    }

    pub(crate) fn chunks_per_sector(&self) -> usize {
        self.sector_size / self.chunk_size
    }

    /// Image byte range of chunk `k`; the last one may be short
    pub(crate) fn chunk_range(&self, k: usize) -> Range<usize> {
        let start = k * self.chunk_size;
        start..(start + self.chunk_size).min(self.image_len)
    }

    pub(crate) fn sector_of(&self, chunk: usize) -> usize {
        chunk / self.chunks_per_sector()
    }

    /// Chunks of sector `s` present in the image
    pub(crate) fn chunks_of(&self, sector: usize) -> Range<usize> {
        let per = self.chunks_per_sector();
        let start = (sector * per).min(self.chunks());
        start..((sector + 1) * per).min(self.chunks())
    }

    /// Image offset of sector `s`
    pub(crate) fn sector_offset(&self, sector: usize) -> usize {
        sector * self.sector_size
    }

    pub(crate) fn is_last_in_sector(&self, chunk: usize) -> bool {
        chunk + 1 == self.chunks_of(self.sector_of(chunk)).end
    }
}
