//! Archive client: translates tile addresses into tile bytes.
//!
//! The client lazily loads the archive's fixed header, JSON metadata, and
//! root directory on first use, then resolves each [`TileCoord`] to a byte
//! range with a binary search over the directory (descending into at most
//! one leaf directory), and finally issues a single ranged read for the
//! tile's bytes.
//!
//! An absent tile is an ordinary outcome (`Ok(None)`) — archives routinely
//! cover less than the whole world. Transport failures are surfaced to the
//! caller and never retried internally.

use crate::coord::TileCoord;
use crate::format::{self, ArchiveHeader, ArchiveMetadata, DirectoryEntry, HEADER_LEN};
use crate::source::ByteSource;
use crate::{DemError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Everything loaded on first use: header, metadata, and root directory.
struct ArchiveIndex {
    header: ArchiveHeader,
    metadata: Arc<ArchiveMetadata>,
    root: Vec<DirectoryEntry>,
}

/// Client for one tiled DEM archive.
pub struct ArchiveClient {
    source: Box<dyn ByteSource>,
    /// Loaded lazily; the lock is held across the load so concurrent first
    /// uses perform it once.
    index: Mutex<Option<Arc<ArchiveIndex>>>,
    /// Parsed leaf directories, keyed by their offset in the leaf region.
    leaves: Mutex<HashMap<u64, Arc<Vec<DirectoryEntry>>>>,
}

impl ArchiveClient {
    /// Create a client over a byte source.
    pub fn new(source: Box<dyn ByteSource>) -> Self {
        Self {
            source,
            index: Mutex::new(None),
            leaves: Mutex::new(HashMap::new()),
        }
    }

    /// The archive's metadata, loading the index on first use.
    pub fn metadata(&self) -> Result<Arc<ArchiveMetadata>> {
        Ok(self.index()?.metadata.clone())
    }

    fn index(&self) -> Result<Arc<ArchiveIndex>> {
        let mut slot = self.index.lock().map_err(|_| DemError::LockPoisoned)?;
        if let Some(index) = slot.as_ref() {
            return Ok(index.clone());
        }
        let index = Arc::new(self.load_index()?);
        *slot = Some(index.clone());
        Ok(index)
    }

    fn load_index(&self) -> Result<ArchiveIndex> {
        let header_bytes = self.source.read_range(0, HEADER_LEN)?;
        let header = ArchiveHeader::parse(&header_bytes)?;

        let meta_bytes = self.source.read_range(header.meta_offset, header.meta_len)?;
        let metadata: ArchiveMetadata = serde_json::from_slice(&meta_bytes)?;
        metadata.validate()?;

        let root_bytes = self.source.read_range(header.root_offset, header.root_len)?;
        let root = format::parse_directory(&root_bytes)?;

        debug!(
            "loaded archive index: {} root entries, zoom {}-{}, {}px {:?} tiles",
            root.len(),
            metadata.min_zoom,
            metadata.max_zoom,
            metadata.tile_size,
            metadata.tile_format
        );
        Ok(ArchiveIndex {
            header,
            metadata: Arc::new(metadata),
            root,
        })
    }

    /// Resolve a tile address to an absolute `(offset, length)` byte range.
    ///
    /// `Ok(None)` means the archive has no tile at this address. A run-length
    /// entry resolves every id inside its run to the same shared range.
    pub fn resolve_tile(&self, coord: TileCoord) -> Result<Option<(u64, u32)>> {
        let index = self.index()?;
        let id = coord.tile_id();

        let Some(entry) = format::find_entry(&index.root, id) else {
            return Ok(None);
        };
        let entry = if entry.is_leaf() {
            let leaf = self.leaf_entries(&index, entry)?;
            match format::find_entry(&leaf, id) {
                Some(inner) if inner.is_leaf() => {
                    return Err(DemError::InvalidArchive(
                        "leaf directory points to another leaf".into(),
                    ));
                }
                Some(inner) => *inner,
                None => return Ok(None),
            }
        } else {
            *entry
        };
        Ok(Some((index.header.data_offset + entry.offset, entry.length)))
    }

    fn leaf_entries(
        &self,
        index: &ArchiveIndex,
        entry: &DirectoryEntry,
    ) -> Result<Arc<Vec<DirectoryEntry>>> {
        let mut leaves = self.leaves.lock().map_err(|_| DemError::LockPoisoned)?;
        if let Some(parsed) = leaves.get(&entry.offset) {
            return Ok(parsed.clone());
        }
        let bytes = self.source.read_range(
            index.header.leaf_offset + entry.offset,
            u64::from(entry.length),
        )?;
        let parsed = Arc::new(format::parse_directory(&bytes)?);
        debug!(
            "loaded leaf directory at offset {}: {} entries",
            entry.offset,
            parsed.len()
        );
        leaves.insert(entry.offset, parsed.clone());
        Ok(parsed)
    }

    /// Fetch the compressed bytes for a tile with a single ranged read.
    pub fn fetch_tile(&self, coord: TileCoord) -> Result<Option<Vec<u8>>> {
        let Some((offset, length)) = self.resolve_tile(coord)? else {
            debug!("no tile at z={} x={} y={}", coord.z, coord.x, coord.y);
            return Ok(None);
        };
        let bytes = self.source.read_range(offset, u64::from(length))?;
        debug!(
            "fetched tile z={} x={} y={} ({} bytes at offset {})",
            coord.z, coord.x, coord.y, length, offset
        );
        Ok(Some(bytes))
    }
}
