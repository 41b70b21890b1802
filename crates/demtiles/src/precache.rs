//! Bounding-box precache scheduling.
//!
//! Given a bounding box, enumerates the covering tile rectangle at the
//! archive's native zoom and drives fetches through the shared tile cache
//! with a bounded worker pool. Tiles already resident resolve immediately;
//! a tile's own failure never aborts the batch.

use crate::cache::TileStore;
use crate::coord::{TileCoord, MAX_MERCATOR_LATITUDE};
use crate::{DemError, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Default number of simultaneous tile fetches during a precache run.
pub const DEFAULT_PRECACHE_CONCURRENCY: usize = 6;

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Northern edge.
    pub north: f64,
    /// Southern edge.
    pub south: f64,
    /// Eastern edge.
    pub east: f64,
    /// Western edge.
    pub west: f64,
}

impl BoundingBox {
    /// Create a bounding box from its edges.
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Check the box's invariants.
    ///
    /// Boxes crossing the antimeridian (`west >= east`) are rejected rather
    /// than silently wrapped; callers wanting both sides of 180° issue two
    /// precache runs.
    pub fn validate(&self) -> Result<()> {
        let edges = [self.north, self.south, self.east, self.west];
        if edges.iter().any(|edge| !edge.is_finite()) {
            return Err(DemError::InvalidBoundingBox(
                "edges must be finite".into(),
            ));
        }
        if self.south >= self.north {
            return Err(DemError::InvalidBoundingBox(format!(
                "south ({}) must be below north ({})",
                self.south, self.north
            )));
        }
        if self.west >= self.east {
            return Err(DemError::InvalidBoundingBox(format!(
                "west ({}) must be left of east ({}); antimeridian-crossing boxes are not supported",
                self.west, self.east
            )));
        }
        Ok(())
    }
}

/// Outcome of a precache run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecacheSummary {
    /// Tiles resident in the cache after the run (pre-existing plus newly
    /// fetched).
    pub cached: usize,
    /// Tiles covered by the bounding box.
    pub total: usize,
}

/// Invoked after each tile completes (success, absent, or failed) with
/// `(completed, total)`.
pub type ProgressCallback = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Cooperative cancellation flag for a precache run.
///
/// Cloning shares the flag; cancelling stops workers before their next
/// tile. Tiles already in flight run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Enumerate the tile rectangle covering `bbox` at `zoom`, row-major.
pub(crate) fn covering_tiles(bbox: &BoundingBox, zoom: u8) -> Result<Vec<TileCoord>> {
    bbox.validate()?;

    // A box may legitimately extend past the Mercator singularity; clamp
    // corner latitudes into the projectable range before mapping them.
    let limit = MAX_MERCATOR_LATITUDE - 1e-9;
    let north = bbox.north.clamp(-limit, limit);
    let south = bbox.south.clamp(-limit, limit);

    let nw = TileCoord::from_lat_lon(north, bbox.west, zoom)?;
    let se = TileCoord::from_lat_lon(south, bbox.east, zoom)?;
    if nw.x > se.x || nw.y > se.y {
        return Err(DemError::InvalidBoundingBox(format!(
            "corner tiles out of order: ({},{}) to ({},{})",
            nw.x, nw.y, se.x, se.y
        )));
    }

    let columns = (se.x - nw.x + 1) as usize;
    let rows = (se.y - nw.y + 1) as usize;
    let mut tiles = Vec::with_capacity(columns * rows);
    for y in nw.y..=se.y {
        for x in nw.x..=se.x {
            tiles.push(TileCoord::new(zoom, x, y));
        }
    }
    Ok(tiles)
}

/// Fetch `tiles` through the store with at most `concurrency` in flight.
pub(crate) fn run(
    store: &TileStore,
    tiles: &[TileCoord],
    concurrency: usize,
    progress: Option<&ProgressCallback>,
    cancel: Option<&CancelToken>,
) -> PrecacheSummary {
    let total = tiles.len();
    if total == 0 {
        return PrecacheSummary { cached: 0, total };
    }

    let next = AtomicUsize::new(0);
    let completed = AtomicUsize::new(0);
    let cached = AtomicUsize::new(0);
    let workers = concurrency.clamp(1, total);

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                if cancel.is_some_and(|token| token.is_cancelled()) {
                    break;
                }
                let i = next.fetch_add(1, Ordering::SeqCst);
                if i >= total {
                    break;
                }
                let coord = tiles[i];
                match store.get_or_fetch(coord) {
                    Ok(Some(_)) => {
                        cached.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(
                            "precache fetch failed for z={} x={} y={}: {}",
                            coord.z, coord.x, coord.y, err
                        );
                    }
                }
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(callback) = progress {
                    callback(done, total);
                }
            });
        }
    });

    let summary = PrecacheSummary {
        cached: cached.load(Ordering::SeqCst),
        total,
    };
    debug!(
        "precache finished: {}/{} tiles resident",
        summary.cached, summary.total
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_inverted_edges() {
        assert!(BoundingBox::new(47.0, 48.0, -122.0, -123.0)
            .validate()
            .is_err());
        assert!(BoundingBox::new(48.0, 47.0, -123.0, -122.0)
            .validate()
            .is_err());
        assert!(BoundingBox::new(48.0, 47.0, f64::NAN, -123.0)
            .validate()
            .is_err());
        assert!(BoundingBox::new(48.0, 47.0, -122.0, -123.0)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_antimeridian_crossing() {
        assert!(matches!(
            BoundingBox::new(10.0, -10.0, -170.0, 170.0).validate(),
            Err(DemError::InvalidBoundingBox(_))
        ));
    }

    #[test]
    fn test_covering_tiles_world_at_zoom_1() {
        let bbox = BoundingBox::new(89.0, -89.0, 179.0, -179.0);
        let tiles = covering_tiles(&bbox, 1).unwrap();
        // Row-major over the full 2x2 pyramid level; polar edges clamp into
        // the Mercator range instead of failing.
        assert_eq!(
            tiles,
            vec![
                TileCoord::new(1, 0, 0),
                TileCoord::new(1, 1, 0),
                TileCoord::new(1, 0, 1),
                TileCoord::new(1, 1, 1),
            ]
        );
    }

    #[test]
    fn test_covering_tiles_single_tile() {
        // A small box well inside one zoom-12 tile.
        let center = TileCoord::from_lat_lon(47.6062, -122.3321, 12).unwrap();
        let (min_lat, max_lat, min_lon, max_lon) = center.bounds();
        let pad_lat = (max_lat - min_lat) / 8.0;
        let pad_lon = (max_lon - min_lon) / 8.0;
        let bbox = BoundingBox::new(
            max_lat - pad_lat,
            min_lat + pad_lat,
            max_lon - pad_lon,
            min_lon + pad_lon,
        );
        assert_eq!(covering_tiles(&bbox, 12).unwrap(), vec![center]);
    }
}
