//! # demtiles
//!
//! Terrain elevation lookup from single-file tiled DEM archives.
//!
//! A DTAR archive packs a pyramid of terrain-RGB tiles (elevation encoded
//! as a 24-bit integer across the three color channels) behind a compact
//! binary directory, and is consumed purely through byte-range reads — from
//! a web server with HTTP `Range` requests, a local file, or an in-memory
//! buffer. There is no server-side component: this crate fetches, decodes,
//! and caches everything in the consuming client.
//!
//! ## Overview
//!
//! [`DemReader`] is the entry point. It maps a latitude/longitude to a tile
//! and pixel with the spherical Web-Mercator projection, resolves the tile
//! to a byte range by binary-searching the archive directory, decodes the
//! tile image, and recovers the elevation from the sampled RGB triple. A
//! bounded LRU cache holds decoded tiles, coalescing concurrent fetches of
//! the same tile, and a bounding-box precache scheduler warms the cache
//! with a fixed number of simultaneous fetches.
//!
//! ## Examples
//!
//! ```no_run
//! use demtiles::DemReader;
//!
//! let reader = DemReader::from_url("https://example.com/terrain.dtar")?;
//!
//! let info = reader.metadata()?;
//! println!(
//!     "archive: zoom {}-{}, {}px tiles",
//!     info.min_zoom, info.max_zoom, info.tile_size
//! );
//!
//! match reader.get_elevation(47.6062, -122.3321)? {
//!     Some(sample) => println!("elevation: {:.1} m", sample.elevation),
//!     None => println!("no data here"),
//! }
//! # Ok::<(), demtiles::DemError>(())
//! ```
//!
//! Precaching an area with progress reporting:
//!
//! ```no_run
//! use demtiles::{BoundingBox, DemReader, ProgressCallback};
//!
//! let reader = DemReader::from_path("terrain.dtar")?;
//! let progress: ProgressCallback =
//!     Box::new(|done, total| println!("{done}/{total} tiles"));
//! let summary =
//!     reader.pre_cache_with(BoundingBox::new(47.7, 47.5, -122.2, -122.4), Some(&progress), None)?;
//! println!("{} of {} tiles resident", summary.cached, summary.total);
//! # Ok::<(), demtiles::DemError>(())
//! ```

mod archive;
mod cache;
mod coord;
mod encoding;
mod engine;
mod error;
mod format;
mod precache;
mod source;
mod tile;

pub use archive::ArchiveClient;
pub use cache::{TileStore, DEFAULT_CACHE_CAPACITY};
pub use coord::{meters_per_pixel, TileCoord, MAX_MERCATOR_LATITUDE, MAX_ZOOM};
pub use encoding::{TerrainRgb, DEFAULT_BASE, DEFAULT_INTERVAL};
pub use engine::{DemReader, ElevationSample};
pub use error::DemError;
pub use format::{
    ArchiveHeader, ArchiveMetadata, DirectoryEntry, DIRECTORY_ENTRY_LEN, FORMAT_VERSION,
    HEADER_LEN, MAGIC,
};
pub use precache::{
    BoundingBox, CancelToken, PrecacheSummary, ProgressCallback, DEFAULT_PRECACHE_CONCURRENCY,
};
pub use source::{ByteSource, FileByteSource, HttpByteSource, MemoryByteSource};
pub use tile::{TerrainTile, TileFormat};

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, DemError>;
