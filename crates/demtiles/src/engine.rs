//! Lookup facade composing the mapper, archive client, cache, and codec.

use crate::archive::ArchiveClient;
use crate::cache::{TileStore, DEFAULT_CACHE_CAPACITY};
use crate::coord::{self, TileCoord, MAX_MERCATOR_LATITUDE};
use crate::format::ArchiveMetadata;
use crate::precache::{
    self, BoundingBox, CancelToken, PrecacheSummary, ProgressCallback,
    DEFAULT_PRECACHE_CONCURRENCY,
};
use crate::source::{ByteSource, FileByteSource, HttpByteSource};
use crate::Result;
use std::path::Path;
use std::sync::Arc;

/// One elevation lookup result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationSample {
    /// Elevation in meters.
    pub elevation: f64,
    /// Raw terrain-RGB sample the elevation was decoded from.
    pub rgb: [u8; 3],
    /// Tile the sample came from.
    pub tile: TileCoord,
}

/// Elevation reader over a single tiled DEM archive.
///
/// Each reader owns its own archive client and tile cache — there is no
/// process-wide shared state, so independent archives can be read
/// side by side. The reader is thread-safe: concurrent lookups for the
/// same tile coordinate share a single underlying fetch.
///
/// # Example
///
/// ```no_run
/// use demtiles::{BoundingBox, DemReader};
///
/// let reader = DemReader::from_url("https://example.com/terrain.dtar")?;
///
/// if let Some(sample) = reader.get_elevation(47.6062, -122.3321)? {
///     println!("Seattle elevation: {:.1} meters", sample.elevation);
/// } else {
///     println!("no data here");
/// }
///
/// // Warm the cache for an area of interest.
/// let summary = reader.pre_cache(BoundingBox::new(47.7, 47.5, -122.2, -122.4))?;
/// println!("{}/{} tiles resident", summary.cached, summary.total);
/// # Ok::<(), demtiles::DemError>(())
/// ```
pub struct DemReader {
    client: Arc<ArchiveClient>,
    store: TileStore,
    precache_concurrency: usize,
}

impl DemReader {
    /// Create a reader with the default cache capacity.
    pub fn new(source: Box<dyn ByteSource>) -> Self {
        Self::with_capacity(source, DEFAULT_CACHE_CAPACITY)
    }

    /// Create a reader with an explicit tile cache capacity.
    ///
    /// Capacity is fixed for the reader's lifetime; construct a new reader
    /// for a different capacity.
    pub fn with_capacity(source: Box<dyn ByteSource>, capacity: usize) -> Self {
        let client = Arc::new(ArchiveClient::new(source));
        let store = TileStore::new(client.clone(), capacity);
        Self {
            client,
            store,
            precache_concurrency: DEFAULT_PRECACHE_CONCURRENCY,
        }
    }

    /// Create a reader over a remote archive fetched with HTTP range
    /// requests.
    pub fn from_url(url: &str) -> Result<Self> {
        Ok(Self::new(Box::new(HttpByteSource::new(url)?)))
    }

    /// Create a reader over a local archive file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Box::new(FileByteSource::open(path)?)))
    }

    /// Set the number of simultaneous fetches used by [`Self::pre_cache`].
    pub fn set_precache_concurrency(&mut self, workers: usize) {
        self.precache_concurrency = workers.max(1);
    }

    /// The archive's metadata, loading header and directory on first use.
    ///
    /// Subsequent calls return the already-loaded metadata without touching
    /// the byte source again.
    pub fn metadata(&self) -> Result<Arc<ArchiveMetadata>> {
        self.client.metadata()
    }

    /// The archive's native data zoom, where lookups resolve.
    ///
    /// Single-zoom archives (the common case) have `min_zoom == max_zoom`.
    pub fn lookup_zoom(&self) -> Result<u8> {
        Ok(self.metadata()?.max_zoom)
    }

    /// Look up the elevation at a coordinate.
    ///
    /// Returns `Ok(None)` when there is definitively no data: the latitude
    /// is outside the projectable range, the point falls outside the
    /// archive's coverage, or the archive holds no tile there. Transport and
    /// decode faults are errors, so callers can distinguish "no data" from
    /// "could not determine".
    pub fn get_elevation(&self, lat: f64, lon: f64) -> Result<Option<ElevationSample>> {
        let metadata = self.metadata()?;
        if lat.abs() >= MAX_MERCATOR_LATITUDE || !metadata.contains(lat, lon) {
            return Ok(None);
        }

        let zoom = metadata.max_zoom;
        let (coord, px, py) =
            TileCoord::from_lat_lon_with_pixel(lat, lon, zoom, metadata.tile_size)?;
        let Some(tile) = self.store.get_or_fetch(coord)? else {
            return Ok(None);
        };
        let [r, g, b] = tile.rgb_at(px, py);
        Ok(Some(ElevationSample {
            elevation: metadata.encoding.decode(r, g, b),
            rgb: [r, g, b],
            tile: coord,
        }))
    }

    /// Fetch every tile covering `bbox` into the cache.
    pub fn pre_cache(&self, bbox: BoundingBox) -> Result<PrecacheSummary> {
        self.pre_cache_with(bbox, None, None)
    }

    /// Precache with optional progress reporting and cancellation.
    ///
    /// `progress` is invoked with `(completed, total)` after each tile
    /// finishes, whether it loaded, was absent, or failed; a single tile's
    /// failure does not abort the batch. A cancelled token stops workers
    /// before their next tile.
    pub fn pre_cache_with(
        &self,
        bbox: BoundingBox,
        progress: Option<&ProgressCallback>,
        cancel: Option<&CancelToken>,
    ) -> Result<PrecacheSummary> {
        let zoom = self.lookup_zoom()?;
        let tiles = precache::covering_tiles(&bbox, zoom)?;
        Ok(precache::run(
            &self.store,
            &tiles,
            self.precache_concurrency,
            progress,
            cancel,
        ))
    }

    /// Drop all cached tiles.
    pub fn clear_cache(&self) {
        self.store.clear();
    }

    /// Number of decoded tiles currently cached.
    pub fn cache_size(&self) -> usize {
        self.store.len()
    }

    /// Approximate ground size of one tile edge in kilometers, measured at
    /// the center latitude of the archive's coverage. Display only.
    pub fn tile_size_km(&self) -> Result<f64> {
        let metadata = self.metadata()?;
        let [_, south, _, north] = metadata.bounds;
        let center_lat = (south + north) / 2.0;
        let resolution = coord::meters_per_pixel(center_lat, metadata.max_zoom, metadata.tile_size);
        Ok(resolution * f64::from(metadata.tile_size) / 1000.0)
    }
}
