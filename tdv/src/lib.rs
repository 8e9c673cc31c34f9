//! Reference implementation of the TDV tile-delta video format.
//!
//! TDV targets small embedded displays that redraw in 8×8 tiles. Each frame is cut into tiles,
//! every tile is packed at the stream's bit depth, and only the tiles whose packed bytes changed
//! since the previous frame are stored. The player keeps one frame's worth of tiles and patches
//! them in place.
//!
//! # Container
//!
//! ```plain
//! .- header ----------------------------------------------------.
//! | magic "TDVC" | version | flags | width | height | tw | th    |
//! | bpp | fps | frame count | palette size | keyframe interval   |
//! | [video offset | audio offset | sample rate | sample count]   |
//! `-------------------------------------------------------------`
//! .- palette (indexed only) -.   .- records --------.   .- audio --.
//! | palette size × RGB888    |   | one per frame    |   | i16le    |
//! `--------------------------`   `------------------`   `----------`
//! ```
//!
//! See [`header`] for the exact field layout and [`consts`] for the record encodings.
//!
//! # Pixel formats
//!
//! - 1/2/4/8 bpp indexed: palette indices, packed MSB-first into a continuous bitstream per tile.
//! - 8 bpp direct: RGB332, one byte per pixel.
//! - 9 bpp direct: RGB333, one little-endian u16 per pixel.
//!
//! # Records
//!
//! Version 2 streams store each frame as a flags byte, a u16 update count and a list of
//! [skip-encoded](skip) tile updates. Version 1 ("flat") streams store the update count followed by
//! explicit `(u16 index, tile)` pairs.
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
pub mod accumulator;
#[cfg(feature = "alloc")]
pub mod canvas;
pub mod decode;
#[cfg(feature = "alloc")]
pub mod diff;
#[cfg(feature = "alloc")]
pub mod encode;
pub mod header;
pub mod pixel;
pub mod skip;
pub mod tile;

pub use decode::TdvDecodeContext;
#[cfg(feature = "alloc")]
pub use encode::{EncodingSession, StreamConfig};
pub use header::{FormatVersion, Header};
pub use pixel::PixelFormat;

pub mod consts {
    /// The four magic bytes at the start of every stream.
    pub const MAGIC: [u8; 4] = *b"TDVC";

    /// Tiles are always square with this edge length, in pixels.
    pub const TILE_SIZE: usize = 8;

    /// Pixels in one tile.
    pub const TILE_PIXELS: usize = TILE_SIZE * TILE_SIZE;

    /// Header flag: pixels are direct RGB332/RGB333 instead of palette indices.
    pub const FLAG_DIRECT_COLOR: u8 = 0b0000_0001;

    /// Header flag: the header carries the audio extension and an audio region follows the video.
    pub const FLAG_AUDIO: u8 = 0b0000_0010;

    /// Record flag (version 2): the record updates every tile and does not depend on earlier
    /// frames.
    ///
    /// ```plain
    /// .- record (version 2) --------------------------------------.
    /// | flags u8 | update count u16le | skip-encoded updates ...   |
    /// `-----------------------------------------------------------`
    /// ```
    pub const RECORD_KEYFRAME: u8 = 0b0000_0001;

    /// A skip byte with this value adds 255 to the running gap and is followed by another skip
    /// byte instead of tile data.
    ///
    /// ```plain
    /// .- update -------------------------------------------.
    /// | [0xFF ...] | gap 0..=254 | tile data (tile bytes)   |
    /// `----------------------------------------------------`
    /// ```
    pub const SKIP_CONTINUE: u8 = 0xFF;
}
