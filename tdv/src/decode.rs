use crate::{
    header::Header,
    skip::SkipDecoder,
    tile::TileGrid,
    FormatVersion,
};
use byteorder::{ByteOrder, LittleEndian};
use snafu::{ensure, Snafu};

#[cfg(feature = "alloc")]
mod alloc_api;
#[cfg(feature = "alloc")]
pub use alloc_api::*;

#[derive(Debug, Snafu)]
#[snafu(module, visibility(pub(crate)))]
pub enum DecodeError {
    UnexpectedEof,
    InvalidMagic,
    #[snafu(display("Unsupported format version {version}"))]
    UnsupportedVersion {
        version: u8,
    },
    #[snafu(display("Unsupported {tile_width}x{tile_height} tiles"))]
    UnsupportedTileSize {
        tile_width: u8,
        tile_height: u8,
    },
    #[snafu(display("Invalid pixel format: {bits} bpp, direct color: {direct}"))]
    InvalidPixelFormat {
        bits: u8,
        direct: bool,
    },
    #[snafu(display("Palette has {palette_size} entries, expected {expected}"))]
    InvalidPaletteSize {
        palette_size: usize,
        expected: usize,
    },
    #[snafu(display("{width}x{height} is not a multiple of the tile size"))]
    InvalidDimensions {
        width: u16,
        height: u16,
    },
    #[snafu(display("Tile index {index} out of range, frame has {tile_count} tiles"))]
    TileIndexOutOfRange {
        index: usize,
        tile_count: usize,
    },
    #[snafu(display("Stream ends after {decoded} of {frame_count} frames"))]
    Truncated {
        decoded: u32,
        frame_count: u32,
    },
    OutputTooSmall,
}

/// What one record did to the tile buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordInfo {
    /// For flat (version 1) streams, a record counts as keyframe if it updates every tile.
    pub keyframe: bool,
    pub updates: u16,
}

/// Plays back a stream record by record.
///
/// The context does not own any frame memory: [`decode_next`](Self::decode_next) patches a
/// caller-provided buffer holding every packed tile of the frame, which is what a display driver
/// would keep around anyway.
#[derive(Debug, Clone)]
pub struct TdvDecodeContext<'a> {
    header: Header,
    grid: TileGrid,
    palette: &'a [u8],
    data: &'a [u8],
    video_end: usize,
    pos: usize,
    decoded: u32,
}

impl<'a> TdvDecodeContext<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, DecodeError> {
        let header = Header::parse(data)?;
        let grid = header.grid().ok_or(DecodeError::InvalidDimensions {
            width: header.width,
            height: header.height,
        })?;

        let palette_start = header.encoded_len();
        let palette = data
            .get(palette_start..palette_start + header.palette_size() * 3)
            .ok_or(DecodeError::UnexpectedEof)?;

        let (pos, video_end) = match header.audio {
            Some(audio) => (audio.video_offset as usize, audio.audio_offset as usize),
            None => (header.video_offset(), data.len()),
        };
        ensure!(
            pos <= video_end && video_end <= data.len(),
            decode_error::UnexpectedEofSnafu
        );

        Ok(Self {
            header,
            grid,
            palette,
            data,
            video_end,
            pos,
            decoded: 0,
        })
    }

    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    pub fn grid(&self) -> TileGrid {
        self.grid
    }

    /// Raw palette bytes, three per entry. Empty for direct color streams.
    #[inline]
    pub fn palette(&self) -> &'a [u8] {
        self.palette
    }

    /// Size of the tile buffer [`decode_next`](Self::decode_next) expects.
    #[inline]
    pub fn tiles_len(&self) -> usize {
        self.grid.tile_count() * self.header.format.tile_bytes()
    }

    #[inline]
    pub fn frames_decoded(&self) -> u32 {
        self.decoded
    }

    /// Applies the next record to `tiles`.
    ///
    /// Returns `None` once every frame the header declares has been decoded, and
    /// [`DecodeError::Truncated`] if the video region ends before that.
    pub fn decode_next(&mut self, tiles: &mut [u8]) -> Result<Option<RecordInfo>, DecodeError> {
        if self.decoded == self.header.frame_count {
            return Ok(None);
        }

        ensure!(tiles.len() >= self.tiles_len(), decode_error::OutputTooSmallSnafu);
        ensure!(
            self.pos < self.video_end,
            decode_error::TruncatedSnafu {
                decoded: self.decoded,
                frame_count: self.header.frame_count
            }
        );

        let data = self.data;
        let record = &data[self.pos..self.video_end];
        let tile_len = self.header.format.tile_bytes();
        let tile_count = self.grid.tile_count();

        let (info, consumed) = match self.header.version {
            FormatVersion::Skip => {
                ensure!(record.len() >= 3, decode_error::UnexpectedEofSnafu);
                let keyframe = record[0] & crate::consts::RECORD_KEYFRAME != 0;
                let updates = LittleEndian::read_u16(&record[1..3]);

                let mut decoder = SkipDecoder::new(&record[3..], updates, tile_len, tile_count);
                for update in decoder.by_ref() {
                    let (index, tile) = update?;
                    tiles[index * tile_len..(index + 1) * tile_len].copy_from_slice(tile);
                }

                (RecordInfo { keyframe, updates }, 3 + decoder.position())
            }
            FormatVersion::Flat => {
                ensure!(record.len() >= 2, decode_error::UnexpectedEofSnafu);
                let updates = LittleEndian::read_u16(&record[0..2]);

                let mut pos = 2;
                for _ in 0..updates {
                    let entry = record
                        .get(pos..pos + 2 + tile_len)
                        .ok_or(DecodeError::UnexpectedEof)?;
                    let index = usize::from(LittleEndian::read_u16(entry));
                    ensure!(
                        index < tile_count,
                        decode_error::TileIndexOutOfRangeSnafu { index, tile_count }
                    );

                    tiles[index * tile_len..(index + 1) * tile_len].copy_from_slice(&entry[2..]);
                    pos += entry.len();
                }

                let keyframe = usize::from(updates) == tile_count;
                (RecordInfo { keyframe, updates }, pos)
            }
        };

        self.pos += consumed;
        self.decoded += 1;

        Ok(Some(info))
    }

    /// The audio region as 16-bit mono samples, if the stream has one.
    pub fn audio_samples(&self) -> Result<Option<impl Iterator<Item = i16> + 'a>, DecodeError> {
        let Some(audio) = self.header.audio else {
            return Ok(None);
        };

        let start = audio.audio_offset as usize;
        let len = audio.sample_count as usize * 2;
        let region = self
            .data
            .get(start..start + len)
            .ok_or(DecodeError::UnexpectedEof)?;

        Ok(Some(region.chunks_exact(2).map(LittleEndian::read_i16)))
    }
}
