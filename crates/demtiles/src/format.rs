//! Binary layout of a DTAR archive: header, metadata, and directories.
//!
//! A DTAR ("DEM tile archive") file is a single byte stream consumed purely
//! via ranged reads:
//!
//! | Region          | Contents                                          |
//! |-----------------|---------------------------------------------------|
//! | header          | 64 bytes at offset 0, magic + version + offsets   |
//! | metadata        | UTF-8 JSON, [`ArchiveMetadata`]                   |
//! | root directory  | sorted fixed-size [`DirectoryEntry`] records      |
//! | leaf directories| optional second-level directories                 |
//! | tile data       | compressed tile images, addressed by directories  |
//!
//! All integers are little-endian. Directory entries are sorted strictly
//! ascending by tile id, so resolution is a binary search plus at most one
//! hop into a leaf directory regardless of archive size.

use crate::coord::MAX_ZOOM;
use crate::encoding::TerrainRgb;
use crate::tile::TileFormat;
use crate::{DemError, Result};
use serde::{Deserialize, Serialize};

/// Archive magic signature.
pub const MAGIC: [u8; 4] = *b"DTAR";

/// Format version this reader supports.
pub const FORMAT_VERSION: u16 = 1;

/// Fixed header length in bytes.
pub const HEADER_LEN: u64 = 64;

/// Serialized size of one directory entry.
pub const DIRECTORY_ENTRY_LEN: usize = 24;

/// Parsed fixed-size archive header.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveHeader {
    /// Byte offset of the root directory.
    pub root_offset: u64,
    /// Root directory length in bytes.
    pub root_len: u64,
    /// Byte offset of the leaf directory region.
    pub leaf_offset: u64,
    /// Leaf directory region length in bytes.
    pub leaf_len: u64,
    /// Byte offset of the JSON metadata block.
    pub meta_offset: u64,
    /// Metadata block length in bytes.
    pub meta_len: u64,
    /// Byte offset of the tile data region.
    pub data_offset: u64,
}

impl ArchiveHeader {
    /// Parse and validate the fixed header.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN as usize {
            return Err(DemError::InvalidArchive(format!(
                "header too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0..4] != MAGIC {
            return Err(DemError::InvalidArchive(
                "missing DTAR magic signature".into(),
            ));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(DemError::InvalidArchive(format!(
                "unsupported format version {}",
                version
            )));
        }
        Ok(Self {
            root_offset: read_u64(bytes, 8),
            root_len: read_u64(bytes, 16),
            leaf_offset: read_u64(bytes, 24),
            leaf_len: read_u64(bytes, 32),
            meta_offset: read_u64(bytes, 40),
            meta_len: read_u64(bytes, 48),
            data_offset: read_u64(bytes, 56),
        })
    }
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

/// One directory record.
///
/// A `run_length >= 1` entry addresses tile bytes shared by every tile id in
/// `[tile_id, tile_id + run_length)` — uniform no-data tiles collapse into a
/// single entry this way. A `run_length == 0` entry instead points at a leaf
/// directory covering ids from `tile_id` onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// First pyramid-linearized tile id this entry covers.
    pub tile_id: u64,
    /// Byte offset, relative to the tile data region (or the leaf region
    /// for leaf pointers).
    pub offset: u64,
    /// Byte length of the tile data (or the leaf directory).
    pub length: u32,
    /// Number of consecutive tile ids sharing this entry; 0 marks a leaf
    /// directory pointer.
    pub run_length: u32,
}

impl DirectoryEntry {
    /// Whether this entry points at a leaf directory.
    pub fn is_leaf(&self) -> bool {
        self.run_length == 0
    }

    /// Whether a tile id falls inside this entry's run.
    pub fn covers(&self, id: u64) -> bool {
        // Subtract rather than add the run length, so entries near
        // u64::MAX cannot overflow.
        self.run_length >= 1 && id >= self.tile_id && id - self.tile_id < u64::from(self.run_length)
    }
}

/// Parse a directory region into entries, validating size and ordering.
pub(crate) fn parse_directory(bytes: &[u8]) -> Result<Vec<DirectoryEntry>> {
    if bytes.len() % DIRECTORY_ENTRY_LEN != 0 {
        return Err(DemError::InvalidArchive(format!(
            "directory length {} is not a multiple of {}",
            bytes.len(),
            DIRECTORY_ENTRY_LEN
        )));
    }
    let mut entries = Vec::with_capacity(bytes.len() / DIRECTORY_ENTRY_LEN);
    for record in bytes.chunks_exact(DIRECTORY_ENTRY_LEN) {
        entries.push(DirectoryEntry {
            tile_id: read_u64(record, 0),
            offset: read_u64(record, 8),
            length: read_u32(record, 16),
            run_length: read_u32(record, 20),
        });
    }
    if entries.windows(2).any(|pair| pair[0].tile_id >= pair[1].tile_id) {
        return Err(DemError::InvalidArchive(
            "directory entries are not sorted by tile id".into(),
        ));
    }
    Ok(entries)
}

/// Locate the entry responsible for `id`, if any.
///
/// Binary-searches for the last entry whose `tile_id` is at most `id`. A
/// tile entry matches only when `id` falls inside its run; a leaf pointer is
/// always returned for the caller to descend into.
pub(crate) fn find_entry(entries: &[DirectoryEntry], id: u64) -> Option<&DirectoryEntry> {
    let idx = entries.partition_point(|entry| entry.tile_id <= id);
    if idx == 0 {
        return None;
    }
    let entry = &entries[idx - 1];
    if entry.is_leaf() || entry.covers(id) {
        Some(entry)
    } else {
        None
    }
}

/// Archive-level metadata, parsed once from the embedded JSON block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    /// Lowest zoom level present.
    pub min_zoom: u8,
    /// Highest zoom level present; the native data zoom for lookups.
    pub max_zoom: u8,
    /// Coverage as `[west, south, east, north]` degrees.
    pub bounds: [f64; 4],
    /// Tile edge length in pixels.
    pub tile_size: u32,
    /// Image codec used for all tiles in the archive.
    pub tile_format: TileFormat,
    /// Terrain-RGB encoding parameters.
    pub encoding: TerrainRgb,
}

impl ArchiveMetadata {
    /// Validate invariants the reader depends on.
    pub fn validate(&self) -> Result<()> {
        if self.min_zoom > self.max_zoom || self.max_zoom > MAX_ZOOM {
            return Err(DemError::InvalidArchive(format!(
                "bad zoom range {}-{}",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.tile_size == 0 {
            return Err(DemError::InvalidArchive("tile size is zero".into()));
        }
        Ok(())
    }

    /// Whether a coordinate falls inside the archive's coverage.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        let [west, south, east, north] = self.bounds;
        lon >= west && lon <= east && lat >= south && lat <= north
    }
}
