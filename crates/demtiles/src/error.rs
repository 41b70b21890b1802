//! Error types for the archive reader.

use thiserror::Error;

/// Errors that can occur when reading a tiled DEM archive.
#[derive(Debug, Error)]
pub enum DemError {
    /// I/O error reading a local archive file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request error when fetching byte ranges.
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// The archive's embedded JSON metadata could not be parsed.
    #[error("Invalid archive metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    /// PNG decoding error for a tile.
    #[error("PNG decode error: {0}")]
    Png(#[from] png::DecodingError),

    /// Malformed archive: bad header, directory, or declared layout.
    /// Fatal for the reader instance.
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    /// A ranged read could not return the requested bytes.
    #[error("Range read failed at offset {offset} (length {length}): {reason}")]
    RangeRead {
        /// Byte offset of the failed read.
        offset: u64,
        /// Number of bytes requested.
        length: u64,
        /// Reason for failure.
        reason: String,
    },

    /// Tile bytes were fetched but did not decode into a valid tile.
    #[error("Failed to decode tile z={z} x={x} y={y}: {reason}")]
    TileDecode {
        /// Zoom level.
        z: u8,
        /// X tile coordinate.
        x: u32,
        /// Y tile coordinate.
        y: u32,
        /// Reason for failure.
        reason: String,
    },

    /// A coalesced fetch failed; waiters observe the leader's failure.
    #[error("Fetch failed for tile z={z} x={x} y={y}: {reason}")]
    TileFetchFailed {
        /// Zoom level.
        z: u8,
        /// X tile coordinate.
        x: u32,
        /// Y tile coordinate.
        y: u32,
        /// Reason for failure.
        reason: String,
    },

    /// Coordinate cannot be projected (at or beyond the Mercator singularity).
    #[error("Coordinate ({lat}, {lon}) is outside the projectable range")]
    OutOfRange {
        /// Requested latitude.
        lat: f64,
        /// Requested longitude.
        lon: f64,
    },

    /// Invalid zoom level.
    #[error("Invalid zoom level {0} (must be 0-30)")]
    InvalidZoomLevel(u8),

    /// Bounding box fails its invariants (south < north, west < east).
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    /// An internal lock was poisoned (a thread panicked while holding it).
    #[error("Internal lock was poisoned")]
    LockPoisoned,
}
