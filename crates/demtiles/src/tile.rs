//! Decoded terrain-RGB tiles.

use crate::coord::TileCoord;
use crate::{DemError, Result};
use serde::{Deserialize, Serialize};

/// Image codec used for the tiles inside an archive.
///
/// A closed set: each archive declares exactly one format in its metadata,
/// and the decoder dispatches on it. Only lossless codecs are meaningful
/// here, since terrain-RGB values are exact quantized integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    /// 8-bit RGB (or RGBA, alpha ignored) PNG.
    Png,
}

/// An owned, immutable `size x size` grid of RGB samples plus its address.
///
/// Created on a cache miss, shared behind an `Arc` by the tile cache, and
/// dropped on eviction. Callers never mutate a decoded tile.
#[derive(Debug)]
pub struct TerrainTile {
    coord: TileCoord,
    size: u32,
    /// Interleaved RGB samples, row-major from the tile's north-west corner.
    pixels: Vec<u8>,
}

impl TerrainTile {
    /// Decode fetched tile bytes in the archive's declared format.
    ///
    /// Fails with [`DemError::TileDecode`] or [`DemError::Png`] on malformed
    /// bytes; that is a corrupt-archive condition and is never retried.
    pub fn decode(
        coord: TileCoord,
        format: TileFormat,
        bytes: &[u8],
        tile_size: u32,
    ) -> Result<Self> {
        let pixels = match format {
            TileFormat::Png => decode_png(coord, bytes, tile_size)?,
        };
        Ok(Self {
            coord,
            size: tile_size,
            pixels,
        })
    }

    /// The tile's address in the pyramid.
    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    /// Tile edge length in pixels.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The RGB sample at a pixel offset within the tile.
    ///
    /// # Panics
    /// Panics if `px` or `py` is outside the tile.
    pub fn rgb_at(&self, px: u32, py: u32) -> [u8; 3] {
        assert!(px < self.size && py < self.size, "pixel out of tile");
        let i = ((py * self.size + px) * 3) as usize;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }
}

fn decode_png(coord: TileCoord, bytes: &[u8], tile_size: u32) -> Result<Vec<u8>> {
    let decoder = png::Decoder::new(bytes);
    let mut reader = decoder.read_info()?;
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;

    if info.width != tile_size || info.height != tile_size {
        return Err(decode_error(
            coord,
            format!(
                "expected {tile_size}x{tile_size} pixels, got {}x{}",
                info.width, info.height
            ),
        ));
    }
    if info.bit_depth != png::BitDepth::Eight {
        return Err(decode_error(
            coord,
            format!("unsupported bit depth {:?}", info.bit_depth),
        ));
    }

    buf.truncate(info.buffer_size());
    match info.color_type {
        png::ColorType::Rgb => Ok(buf),
        png::ColorType::Rgba => Ok(buf
            .chunks_exact(4)
            .flat_map(|pixel| [pixel[0], pixel[1], pixel[2]])
            .collect()),
        other => Err(decode_error(
            coord,
            format!("unsupported color type {other:?}"),
        )),
    }
}

fn decode_error(coord: TileCoord, reason: String) -> DemError {
    DemError::TileDecode {
        z: coord.z,
        x: coord.x,
        y: coord.y,
        reason,
    }
}
