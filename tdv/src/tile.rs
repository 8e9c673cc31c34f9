//! Cutting a sample grid into 8×8 tiles and packing each tile at the stream's bit depth.
//!
//! Tiles are numbered in raster order: `index = ty * tiles_x + tx`. Inside a tile, pixels are
//! visited row by row.

use crate::{
    consts::{TILE_PIXELS, TILE_SIZE},
    pixel::PixelFormat,
};
use byteorder::{ByteOrder, LittleEndian};

/// Tile layout of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub tiles_x: usize,
    pub tiles_y: usize,
}

impl TileGrid {
    /// Returns `None` unless both dimensions are non-zero multiples of [`TILE_SIZE`].
    pub const fn new(width: usize, height: usize) -> Option<Self> {
        if width == 0 || height == 0 || width % TILE_SIZE != 0 || height % TILE_SIZE != 0 {
            return None;
        }

        Some(Self {
            tiles_x: width / TILE_SIZE,
            tiles_y: height / TILE_SIZE,
        })
    }

    #[inline]
    pub const fn tile_count(&self) -> usize {
        self.tiles_x * self.tiles_y
    }

    #[inline]
    pub const fn width(&self) -> usize {
        self.tiles_x * TILE_SIZE
    }

    /// Top-left pixel of the tile with the given index.
    #[inline]
    pub const fn tile_origin(&self, index: usize) -> (usize, usize) {
        (
            (index % self.tiles_x) * TILE_SIZE,
            (index / self.tiles_x) * TILE_SIZE,
        )
    }

    /// Iterates the samples of one tile out of a full-frame sample buffer.
    pub fn tile_samples<'a>(
        &self,
        samples: &'a [u16],
        index: usize,
    ) -> impl Iterator<Item = u16> + 'a {
        let (x, y) = self.tile_origin(index);
        let stride = self.width();

        samples[y * stride..]
            .chunks(stride)
            .take(TILE_SIZE)
            .flat_map(move |row| row[x..x + TILE_SIZE].iter().copied())
    }
}

/// Packs the 64 samples of a tile into `out`, which must be exactly `format.tile_bytes()` long.
///
/// Indexed samples contribute their `bpp` least significant bits to an MSB-first bitstream. Since
/// every indexed depth divides 8, a sample never straddles a byte boundary.
pub fn pack_tile(samples: impl IntoIterator<Item = u16>, format: PixelFormat, out: &mut [u8]) {
    debug_assert_eq!(out.len(), format.tile_bytes());

    let mask = format.sample_mask();

    match format {
        PixelFormat::Rgb332 => {
            for (o, s) in out.iter_mut().zip(samples) {
                *o = (s & mask) as u8;
            }
        }
        PixelFormat::Rgb333 => {
            for (o, s) in out.chunks_exact_mut(2).zip(samples) {
                LittleEndian::write_u16(o, s & mask);
            }
        }
        _ => {
            let bpp = usize::from(format.bits_per_pixel());
            out.fill(0);

            for (i, s) in samples.into_iter().take(TILE_PIXELS).enumerate() {
                let bit = i * bpp;
                let shift = 8 - bpp - bit % 8;
                out[bit / 8] |= ((s & mask) as u8) << shift;
            }
        }
    }
}

/// Inverse of [`pack_tile`].
pub fn unpack_tile(packed: &[u8], format: PixelFormat, out: &mut [u16; TILE_PIXELS]) {
    debug_assert_eq!(packed.len(), format.tile_bytes());

    match format {
        PixelFormat::Rgb332 => {
            for (o, &b) in out.iter_mut().zip(packed) {
                *o = u16::from(b);
            }
        }
        PixelFormat::Rgb333 => {
            for (o, b) in out.iter_mut().zip(packed.chunks_exact(2)) {
                *o = LittleEndian::read_u16(b);
            }
        }
        _ => {
            let bpp = usize::from(format.bits_per_pixel());
            let mask = format.sample_mask() as u8;

            for (i, o) in out.iter_mut().enumerate() {
                let bit = i * bpp;
                let shift = 8 - bpp - bit % 8;
                *o = u16::from((packed[bit / 8] >> shift) & mask);
            }
        }
    }
}

/// Unpacks a tile and writes its samples into a full-frame sample buffer.
pub fn scatter_tile(
    packed: &[u8],
    format: PixelFormat,
    grid: &TileGrid,
    index: usize,
    samples: &mut [u16],
) {
    let mut tile = [0; TILE_PIXELS];
    unpack_tile(packed, format, &mut tile);

    let (x, y) = grid.tile_origin(index);
    let stride = grid.width();

    for (row, tile_row) in samples[y * stride..]
        .chunks_mut(stride)
        .zip(tile.chunks_exact(TILE_SIZE))
    {
        row[x..x + TILE_SIZE].copy_from_slice(tile_row);
    }
}

/// The packed tiles of one frame, concatenated in raster order.
#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileSet {
    tile_len: usize,
    bytes: alloc::vec::Vec<u8>,
}

#[cfg(feature = "alloc")]
impl TileSet {
    /// Packs every tile of a full-frame sample buffer.
    pub fn extract(samples: &[u16], grid: &TileGrid, format: PixelFormat) -> Self {
        debug_assert_eq!(samples.len(), grid.tile_count() * TILE_PIXELS);

        let tile_len = format.tile_bytes();
        let mut bytes = alloc::vec![0; grid.tile_count() * tile_len];

        for (index, out) in bytes.chunks_exact_mut(tile_len).enumerate() {
            pack_tile(grid.tile_samples(samples, index), format, out);
        }

        Self { tile_len, bytes }
    }

    #[inline]
    pub fn tile_len(&self) -> usize {
        self.tile_len
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len() / self.tile_len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn tile(&self, index: usize) -> &[u8] {
        &self.bytes[index * self.tile_len..(index + 1) * self.tile_len]
    }

    #[inline]
    pub fn tiles(&self) -> core::slice::ChunksExact<'_, u8> {
        self.bytes.chunks_exact(self.tile_len)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
