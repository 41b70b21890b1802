//! Tile addressing and Web-Mercator coordinate math.
//!
//! Uses the OpenStreetMap Slippy Map tile naming convention on a spherical
//! Web-Mercator projection (EPSG:3857):
//! - `z` is the zoom level; the world is `2^z x 2^z` tiles
//! - `x` is the column (0 at 180°W, increases eastward)
//! - `y` is the row (0 at ~85.05°N, increases southward)
//!
//! Tiles are additionally identified by a single `u64` pyramid id: all tiles
//! of coarser zooms precede a zoom's block, and within a zoom tiles are
//! ordered along a Hilbert curve. The id is what archive directories are
//! sorted by, enabling binary search and run-length sharing of identical
//! adjacent tiles.

use crate::{DemError, Result};
use std::f64::consts::PI;

/// Mercator singularity: latitudes at or beyond this cannot be projected.
///
/// The exact limit is `arctan(sinh(pi))` = 85.0511287798066°.
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_779_806_6;

/// Largest zoom level the tile id scheme supports.
pub const MAX_ZOOM: u8 = 30;

/// WGS84 equatorial circumference in meters.
const EARTH_CIRCUMFERENCE_M: f64 = 40_075_016.686;

/// Slippy-map tile address within the pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Zoom level.
    pub z: u8,
    /// X coordinate (column, 0 at 180°W, increases eastward).
    pub x: u32,
    /// Y coordinate (row, 0 at ~85.05°N, increases southward).
    pub y: u32,
}

impl TileCoord {
    /// Create a new tile coordinate.
    ///
    /// # Panics
    /// Panics if coordinates are out of range for the zoom level.
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        assert!(z <= MAX_ZOOM, "zoom {} out of range", z);
        let max_coord = 1u32 << z;
        assert!(x < max_coord, "x={} out of range for zoom {}", x, z);
        assert!(y < max_coord, "y={} out of range for zoom {}", y, z);
        Self { z, x, y }
    }

    /// Convert latitude/longitude to the containing tile.
    ///
    /// Uses the Slippy Map tiling formula on the spherical projection:
    /// - x = floor((lon + 180) / 360 * 2^z)
    /// - y = floor((1 - ln(tan(lat) + sec(lat)) / pi) / 2 * 2^z)
    ///
    /// Tile indices are clamped to `[0, 2^z - 1]`, which handles points at
    /// exactly 180°E. Fails with [`DemError::OutOfRange`] when `|lat|` is at
    /// or beyond the Mercator singularity.
    pub fn from_lat_lon(lat: f64, lon: f64, zoom: u8) -> Result<Self> {
        let (coord, _, _) = Self::from_lat_lon_with_pixel(lat, lon, zoom, 1)?;
        Ok(coord)
    }

    /// Convert latitude/longitude to a tile plus the pixel offset inside it.
    ///
    /// The fractional remainder within the tile, scaled by `tile_size`, is
    /// truncated to an integer pixel; there is no interpolation between
    /// pixels.
    pub fn from_lat_lon_with_pixel(
        lat: f64,
        lon: f64,
        zoom: u8,
        tile_size: u32,
    ) -> Result<(Self, u32, u32)> {
        if zoom > MAX_ZOOM {
            return Err(DemError::InvalidZoomLevel(zoom));
        }
        if !lat.is_finite() || !lon.is_finite() || lat.abs() >= MAX_MERCATOR_LATITUDE {
            return Err(DemError::OutOfRange { lat, lon });
        }

        let n = (1u64 << zoom) as f64;
        let x_norm = (lon + 180.0) / 360.0;
        let lat_rad = lat.to_radians();
        let y_norm = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0;

        let max_index = i64::from((1u32 << zoom) - 1);
        let fx = x_norm * n;
        let fy = y_norm * n;
        let x = (fx.floor() as i64).clamp(0, max_index) as u32;
        let y = (fy.floor() as i64).clamp(0, max_index) as u32;

        let max_pixel = i64::from(tile_size) - 1;
        let px = (((fx - f64::from(x)) * f64::from(tile_size)).floor() as i64).clamp(0, max_pixel);
        let py = (((fy - f64::from(y)) * f64::from(tile_size)).floor() as i64).clamp(0, max_pixel);

        Ok((Self { z: zoom, x, y }, px as u32, py as u32))
    }

    /// Pyramid-linearized tile id.
    ///
    /// Coarser zooms occupy ids `[0, (4^z - 1)/3)`; within a zoom, tiles are
    /// ordered by their Hilbert-curve index. Known anchors: `(0,0,0)` is 0,
    /// zoom 1 occupies ids 1-4, and `(2,0,0)` is 5.
    pub fn tile_id(&self) -> u64 {
        let base = ((1u64 << (2 * u64::from(self.z))) - 1) / 3;
        let n = 1u64 << self.z;
        let mut x = u64::from(self.x);
        let mut y = u64::from(self.y);
        let mut d = 0u64;
        let mut s = n >> 1;
        while s > 0 {
            let rx = u64::from(x & s != 0);
            let ry = u64::from(y & s != 0);
            d += s * s * ((3 * rx) ^ ry);
            // Rotate the quadrant so the curve continues contiguously.
            if ry == 0 {
                if rx == 1 {
                    x = n - 1 - x;
                    y = n - 1 - y;
                }
                std::mem::swap(&mut x, &mut y);
            }
            s >>= 1;
        }
        base + d
    }

    /// Get the geographic bounding box for this tile.
    ///
    /// Returns (min_lat, max_lat, min_lon, max_lon).
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let n = (1u64 << self.z) as f64;

        let min_lon = f64::from(self.x) / n * 360.0 - 180.0;
        let max_lon = (f64::from(self.x) + 1.0) / n * 360.0 - 180.0;

        // Inverse of the Slippy Map formula
        let max_lat = (PI * (1.0 - 2.0 * f64::from(self.y) / n))
            .sinh()
            .atan()
            .to_degrees();
        let min_lat = (PI * (1.0 - 2.0 * (f64::from(self.y) + 1.0) / n))
            .sinh()
            .atan()
            .to_degrees();

        (min_lat, max_lat, min_lon, max_lon)
    }
}

/// Ground resolution of one pixel at a given latitude, in meters.
///
/// Display and telemetry only; lookups never depend on this.
pub fn meters_per_pixel(lat: f64, zoom: u8, tile_size: u32) -> f64 {
    let pixels = f64::from(tile_size) * (1u64 << zoom) as f64;
    EARTH_CIRCUMFERENCE_M * lat.to_radians().cos() / pixels
}
