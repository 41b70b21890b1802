//! Shared test support: build DTAR archives in memory.
//!
//! The library is a read-only consumer, so authoring lives here with the
//! tests. The builder assembles a complete archive byte stream (header,
//! JSON metadata, root and optional leaf directory, tile data) that the
//! reader consumes through a [`ByteSource`].

use demtiles::{
    ArchiveMetadata, ByteSource, DemError, TerrainRgb, TileCoord, TileFormat,
    DIRECTORY_ENTRY_LEN, FORMAT_VERSION, HEADER_LEN, MAGIC,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Small tiles keep test PNGs cheap to encode.
pub const TILE_SIZE: u32 = 8;

/// Metadata for a single-zoom test archive.
pub fn metadata(zoom: u8, bounds: [f64; 4]) -> ArchiveMetadata {
    ArchiveMetadata {
        min_zoom: zoom,
        max_zoom: zoom,
        bounds,
        tile_size: TILE_SIZE,
        tile_format: TileFormat::Png,
        encoding: TerrainRgb::default(),
    }
}

/// Bounds used by most tests: the whole Mercator-projectable world.
pub fn world_bounds() -> [f64; 4] {
    [-180.0, -85.0, 180.0, 85.0]
}

struct TileRecord {
    tile_id: u64,
    bytes: Vec<u8>,
    run_length: u32,
}

/// Builds a DTAR archive byte stream.
pub struct ArchiveBuilder {
    metadata: ArchiveMetadata,
    tiles: Vec<TileRecord>,
    use_leaf: bool,
}

impl ArchiveBuilder {
    pub fn new(metadata: ArchiveMetadata) -> Self {
        Self {
            metadata,
            tiles: Vec::new(),
            use_leaf: false,
        }
    }

    /// Route all tile entries through a single leaf directory.
    pub fn with_leaf_directory(mut self) -> Self {
        self.use_leaf = true;
        self
    }

    pub fn tile(self, coord: TileCoord, bytes: Vec<u8>) -> Self {
        self.tile_run(coord, bytes, 1)
    }

    /// Add one entry covering `run_length` consecutive tile ids starting at
    /// `coord`'s id, all sharing the same bytes.
    pub fn tile_run(mut self, coord: TileCoord, bytes: Vec<u8>, run_length: u32) -> Self {
        self.tiles.push(TileRecord {
            tile_id: coord.tile_id(),
            bytes,
            run_length,
        });
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        self.tiles.sort_by_key(|record| record.tile_id);

        let mut data = Vec::new();
        let mut entries = Vec::new();
        for record in &self.tiles {
            entries.push((
                record.tile_id,
                data.len() as u64,
                record.bytes.len() as u32,
                record.run_length,
            ));
            data.extend_from_slice(&record.bytes);
        }

        let (root, leaf) = if self.use_leaf {
            let leaf = encode_entries(&entries);
            let first_id = entries.first().map(|entry| entry.0).unwrap_or(0);
            (
                encode_entries(&[(first_id, 0, leaf.len() as u32, 0)]),
                leaf,
            )
        } else {
            (encode_entries(&entries), Vec::new())
        };

        assemble(&self.metadata, &root, &leaf, &data)
    }
}

/// Pack the regions into a complete archive byte stream with a valid
/// header.
fn assemble(metadata: &ArchiveMetadata, root: &[u8], leaf: &[u8], data: &[u8]) -> Vec<u8> {
    let meta = serde_json::to_vec(metadata).unwrap();
    let meta_offset = HEADER_LEN;
    let root_offset = meta_offset + meta.len() as u64;
    let leaf_offset = root_offset + root.len() as u64;
    let data_offset = leaf_offset + leaf.len() as u64;

    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&[0, 0]);
    for value in [
        root_offset,
        root.len() as u64,
        leaf_offset,
        leaf.len() as u64,
        meta_offset,
        meta.len() as u64,
        data_offset,
    ] {
        out.extend_from_slice(&value.to_le_bytes());
    }
    assert_eq!(out.len(), HEADER_LEN as usize);

    out.extend_from_slice(&meta);
    out.extend_from_slice(&root);
    out.extend_from_slice(&leaf);
    out.extend_from_slice(&data);
    out
}

/// A structurally well-formed archive whose leaf directory itself holds a
/// leaf pointer, which the format forbids (at most two lookup hops).
pub fn nested_leaf_archive(metadata: &ArchiveMetadata) -> Vec<u8> {
    let entry_len = DIRECTORY_ENTRY_LEN as u32;
    // The leaf region holds two single-entry directories: the outer one
    // (pointed at by the root) is a leaf pointer into the inner one.
    let outer = encode_entries(&[(1, u64::from(entry_len), entry_len, 0)]);
    let inner = encode_entries(&[(1, 0, entry_len, 0)]);
    let root = encode_entries(&[(1, 0, entry_len, 0)]);
    let mut leaf = outer;
    leaf.extend_from_slice(&inner);
    assemble(metadata, &root, &leaf, &[])
}

fn encode_entries(entries: &[(u64, u64, u32, u32)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (tile_id, offset, length, run_length) in entries {
        out.extend_from_slice(&tile_id.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&length.to_le_bytes());
        out.extend_from_slice(&run_length.to_le_bytes());
    }
    out
}

/// Encode a terrain-RGB PNG tile with a per-pixel sample function.
pub fn png_tile(sample: impl Fn(u32, u32) -> [u8; 3]) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((TILE_SIZE * TILE_SIZE * 3) as usize);
    for py in 0..TILE_SIZE {
        for px in 0..TILE_SIZE {
            pixels.extend_from_slice(&sample(px, py));
        }
    }
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, TILE_SIZE, TILE_SIZE);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&pixels).unwrap();
    }
    out
}

/// Encode a uniform tile (e.g. a shared no-data tile).
pub fn solid_tile(rgb: [u8; 3]) -> Vec<u8> {
    png_tile(|_, _| rgb)
}

/// A tile that encodes its own pixel address, so lookups are verifiable:
/// rgb = (0, px, py), elevation = -10000 + (px * 256 + py) * 0.1.
pub fn addressed_tile() -> Vec<u8> {
    png_tile(|px, py| [0, px as u8, py as u8])
}

/// Byte source that counts reads, split at the tile-data boundary.
pub struct CountingSource {
    data: Vec<u8>,
    data_offset: u64,
    index_reads: Arc<AtomicUsize>,
    tile_reads: Arc<AtomicUsize>,
}

impl CountingSource {
    pub fn new(data: Vec<u8>) -> Self {
        let data_offset = data_offset_of(&data);
        Self {
            data,
            data_offset,
            index_reads: Arc::new(AtomicUsize::new(0)),
            tile_reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Handles to the (index, tile) read counters.
    pub fn counters(&self) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        (self.index_reads.clone(), self.tile_reads.clone())
    }
}

impl ByteSource for CountingSource {
    fn read_range(&self, offset: u64, length: u64) -> demtiles::Result<Vec<u8>> {
        if offset >= self.data_offset {
            self.tile_reads.fetch_add(1, Ordering::SeqCst);
        } else {
            self.index_reads.fetch_add(1, Ordering::SeqCst);
        }
        slice_range(&self.data, offset, length)
    }
}

/// Byte source that fails every read into the tile-data region, simulating
/// a transport fault after the index loaded fine.
pub struct FailingTileSource {
    data: Vec<u8>,
    data_offset: u64,
}

impl FailingTileSource {
    pub fn new(data: Vec<u8>) -> Self {
        let data_offset = data_offset_of(&data);
        Self { data, data_offset }
    }
}

impl ByteSource for FailingTileSource {
    fn read_range(&self, offset: u64, length: u64) -> demtiles::Result<Vec<u8>> {
        if offset >= self.data_offset {
            return Err(DemError::RangeRead {
                offset,
                length,
                reason: "injected transport failure".into(),
            });
        }
        slice_range(&self.data, offset, length)
    }
}

fn data_offset_of(archive: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&archive[56..64]);
    u64::from_le_bytes(buf)
}

fn slice_range(data: &[u8], offset: u64, length: u64) -> demtiles::Result<Vec<u8>> {
    let start = offset as usize;
    let end = start + length as usize;
    if end <= data.len() {
        Ok(data[start..end].to_vec())
    } else {
        Err(DemError::RangeRead {
            offset,
            length,
            reason: "read past end of archive".into(),
        })
    }
}
