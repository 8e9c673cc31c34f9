use crate::{
    canvas::{Canvas, CompositeError, Frame},
    diff::{FrameDifferencer, FrameRecord, KeyframePolicy},
    header::{FormatVersion, Header},
    pixel::PixelFormat,
    skip::encode_updates,
    tile::{TileGrid, TileSet},
};
use alloc::vec::Vec;
use byteorder::{ByteOrder, LittleEndian};
use snafu::{ensure, Snafu};

#[cfg(feature = "std")]
mod std_api;
#[cfg(feature = "std")]
pub use std_api::*;

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("{bits} bpp is not supported (indexed: 1, 2, 4, 8; direct: 8, 9)"))]
    InvalidBitDepth { bits: u8, direct: bool },
    #[snafu(display("{width}x{height} is not a non-zero multiple of the 8x8 tile size"))]
    InvalidDimensions { width: u16, height: u16 },
    #[snafu(display("{tile_count} tiles don't fit the 16-bit update count"))]
    TooManyTiles { tile_count: usize },
    #[snafu(display("Palette has {len} colors, but {format:?} needs {needed}"))]
    PaletteTooSmall {
        len: usize,
        needed: usize,
        format: PixelFormat,
    },
    #[snafu(display("Direct color format {format:?} doesn't take a palette"))]
    UnexpectedPalette { format: PixelFormat },
    #[snafu(display("Frame rate must be at least 1 fps"))]
    InvalidFps,
}

/// Picks the pixel format for a requested bit depth.
pub fn pixel_format(bits: u8, direct: bool) -> Result<PixelFormat, ConfigError> {
    PixelFormat::from_bits(bits, direct).ok_or(ConfigError::InvalidBitDepth { bits, direct })
}

/// Everything that stays fixed for the lifetime of a stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub width: u16,
    pub height: u16,
    pub format: PixelFormat,
    pub fps: u16,
    pub keyframes: KeyframePolicy,
    pub version: FormatVersion,
    /// The source's color table. Indexed formats keep the first `2^bpp` entries.
    pub palette: Vec<[u8; 3]>,
    /// Sample the canvas starts with, and that background disposal restores.
    pub background: u16,
}

impl StreamConfig {
    pub fn new(width: u16, height: u16, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            fps: 30,
            keyframes: KeyframePolicy::FIRST_ONLY,
            version: FormatVersion::LATEST,
            palette: Vec::new(),
            background: 0,
        }
    }

    /// Checks the configuration and returns the tile grid it implies.
    ///
    /// An indexed palette longer than the format allows is cut down to size.
    pub fn validate(&mut self) -> Result<TileGrid, ConfigError> {
        let (width, height) = (self.width, self.height);
        let grid = TileGrid::new(usize::from(width), usize::from(height))
            .ok_or(ConfigError::InvalidDimensions { width, height })?;

        ensure!(
            grid.tile_count() <= usize::from(u16::MAX),
            TooManyTilesSnafu {
                tile_count: grid.tile_count()
            }
        );
        ensure!(self.fps > 0, InvalidFpsSnafu);

        let format = self.format;
        let needed = format.palette_len();
        if format.is_indexed() {
            ensure!(
                self.palette.len() >= needed,
                PaletteTooSmallSnafu {
                    len: self.palette.len(),
                    needed,
                    format,
                }
            );
            if self.palette.len() > needed {
                log::warn!(
                    "palette has {} colors, keeping the first {needed}; higher indices lose their upper bits",
                    self.palette.len()
                );
                self.palette.truncate(needed);
            }
        } else {
            ensure!(self.palette.is_empty(), UnexpectedPaletteSnafu { format });
        }

        self.background &= format.sample_mask();

        Ok(grid)
    }

    /// The stream header for the given number of frames, without audio.
    pub fn header(&self, frame_count: u32) -> Header {
        Header {
            version: self.version,
            format: self.format,
            width: self.width,
            height: self.height,
            fps: self.fps,
            frame_count,
            keyframe_interval: self.keyframes.interval,
            audio: None,
        }
    }
}

/// State of one encoding run: the canvas frames are drawn onto, and the tiles of the last
/// encoded frame.
#[derive(Debug)]
pub struct EncodingSession {
    config: StreamConfig,
    grid: TileGrid,
    canvas: Canvas,
    differencer: FrameDifferencer,
}

impl EncodingSession {
    pub fn new(mut config: StreamConfig) -> Result<Self, ConfigError> {
        let grid = config.validate()?;

        log::info!(
            "encoding {}x{} ({} tiles) as {:?}, {} fps, keyframe interval {}",
            config.width,
            config.height,
            grid.tile_count(),
            config.format,
            config.fps,
            config.keyframes.interval
        );

        Ok(Self {
            canvas: Canvas::new(usize::from(config.width), usize::from(config.height), config.background),
            differencer: FrameDifferencer::new(config.keyframes),
            grid,
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    #[inline]
    pub fn grid(&self) -> TileGrid {
        self.grid
    }

    /// The palette as stored in the stream: exactly `2^bpp` entries for indexed formats.
    #[inline]
    pub fn palette(&self) -> &[[u8; 3]] {
        &self.config.palette
    }

    #[inline]
    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    #[inline]
    pub fn frames_encoded(&self) -> u32 {
        self.differencer.frames()
    }

    /// Draws a frame onto the canvas and returns the tiles that have to be stored for it.
    pub fn encode_frame(&mut self, frame: &Frame<'_>) -> Result<FrameRecord<'_>, CompositeError> {
        self.canvas.composite(frame, self.config.format)?;

        let frame_index = self.differencer.frames();
        let tiles = TileSet::extract(self.canvas.samples(), &self.grid, self.config.format);
        let record = self.differencer.push(tiles);

        log::debug!(
            "frame {frame_index}: {}{} of {} tiles",
            if record.keyframe { "keyframe, " } else { "" },
            record.update_count(),
            self.grid.tile_count()
        );

        Ok(record)
    }
}

/// Serializes one record in the layout of the given stream version.
pub fn encode_record(record: &FrameRecord<'_>, version: FormatVersion, out: &mut Vec<u8>) {
    let mut count = [0; 2];
    LittleEndian::write_u16(&mut count, record.update_count());

    match version {
        FormatVersion::Skip => {
            out.push(if record.keyframe {
                crate::consts::RECORD_KEYFRAME
            } else {
                0
            });
            out.extend_from_slice(&count);
            encode_updates(record.updates(), out);
        }
        FormatVersion::Flat => {
            out.extend_from_slice(&count);
            for update in record.updates() {
                let mut index = [0; 2];
                LittleEndian::write_u16(&mut index, update.index);
                out.extend_from_slice(&index);
                out.extend_from_slice(update.data);
            }
        }
    }
}
