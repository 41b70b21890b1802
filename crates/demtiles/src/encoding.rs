//! Terrain-RGB elevation encoding parameters.

use serde::{Deserialize, Serialize};

/// Conversion-time default base elevation in meters.
pub const DEFAULT_BASE: f64 = -10_000.0;

/// Conversion-time default quantization interval in meters.
pub const DEFAULT_INTERVAL: f64 = 0.1;

/// Terrain-RGB encoding parameters, read from the archive metadata.
///
/// Elevation is stored as a 24-bit integer split across the three color
/// channels and recovered as `base + value * interval`. Both parameters are
/// archive-level constants so archives produced with different encodings
/// decode correctly; the engine never assumes the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainRgb {
    /// Elevation of the all-zero sample, in meters.
    pub base: f64,
    /// Meters per quantization step.
    pub interval: f64,
}

impl Default for TerrainRgb {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl TerrainRgb {
    /// Decode one RGB sample into an elevation in meters.
    pub fn decode(&self, r: u8, g: u8, b: u8) -> f64 {
        let value = u32::from(r) * 65_536 + u32::from(g) * 256 + u32::from(b);
        self.base + f64::from(value) * self.interval
    }
}
