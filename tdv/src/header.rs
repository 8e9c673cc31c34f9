//! Stream header.
//!
//! ```plain
//! offset  size  field
//!      0     4  magic "TDVC"
//!      4     1  version (1 = flat records, 2 = skip records)
//!      5     1  flags (bit 0: direct color, bit 1: audio)
//!      6     2  width
//!      8     2  height
//!     10     1  tile width (8)
//!     11     1  tile height (8)
//!     12     1  bits per pixel
//!     13     2  fps
//!     15     4  frame count
//!     19     2  palette size (0 for direct color)
//!     21     2  keyframe interval (0: first frame only)
//! -- audio extension, only if flag bit 1 is set --
//!     23     4  video region offset
//!     27     4  audio region offset (even)
//!     31     4  audio sample rate
//!     35     4  audio sample count
//! ```
//!
//! All fields are little-endian.

use crate::{
    consts::{FLAG_AUDIO, FLAG_DIRECT_COLOR, MAGIC, TILE_SIZE},
    decode::{decode_error, DecodeError},
    pixel::PixelFormat,
    tile::TileGrid,
};
use byteorder::{ByteOrder, LittleEndian};
use snafu::ensure;

/// Length of the header without the audio extension.
pub const BASE_HEADER_LEN: usize = 23;

/// Length of the audio extension.
pub const AUDIO_HEADER_LEN: usize = 16;

/// Largest possible header.
pub const MAX_HEADER_LEN: usize = BASE_HEADER_LEN + AUDIO_HEADER_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    /// Records list `(u16 index, tile)` pairs.
    Flat = 1,
    /// Records carry a flags byte and skip-encoded updates.
    Skip = 2,
}

impl FormatVersion {
    pub const LATEST: Self = Self::Skip;

    pub const fn from_u8(version: u8) -> Option<Self> {
        match version {
            1 => Some(Self::Flat),
            2 => Some(Self::Skip),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    pub video_offset: u32,
    pub audio_offset: u32,
    pub sample_rate: u32,
    pub sample_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: FormatVersion,
    pub format: PixelFormat,
    pub width: u16,
    pub height: u16,
    pub fps: u16,
    pub frame_count: u32,
    pub keyframe_interval: u16,
    pub audio: Option<AudioInfo>,
}

impl Header {
    /// Length of this header on the wire.
    #[inline]
    pub const fn encoded_len(&self) -> usize {
        if self.audio.is_some() {
            MAX_HEADER_LEN
        } else {
            BASE_HEADER_LEN
        }
    }

    #[inline]
    pub const fn palette_size(&self) -> usize {
        self.format.palette_len()
    }

    /// Offset of the first frame record.
    #[inline]
    pub const fn video_offset(&self) -> usize {
        self.encoded_len() + self.palette_size() * 3
    }

    #[inline]
    pub const fn grid(&self) -> Option<TileGrid> {
        TileGrid::new(self.width as usize, self.height as usize)
    }

    /// Serializes the header into the front of `out` and returns the number of bytes written.
    ///
    /// # Panics
    ///
    /// If `out` is shorter than [`Header::encoded_len`].
    pub fn write_to(&self, out: &mut [u8]) -> usize {
        let out = &mut out[..self.encoded_len()];

        let mut flags = 0;
        if !self.format.is_indexed() {
            flags |= FLAG_DIRECT_COLOR;
        }
        if self.audio.is_some() {
            flags |= FLAG_AUDIO;
        }

        out[0..4].copy_from_slice(&MAGIC);
        out[4] = self.version as u8;
        out[5] = flags;
        LittleEndian::write_u16(&mut out[6..8], self.width);
        LittleEndian::write_u16(&mut out[8..10], self.height);
        out[10] = TILE_SIZE as u8;
        out[11] = TILE_SIZE as u8;
        out[12] = self.format.bits_per_pixel();
        LittleEndian::write_u16(&mut out[13..15], self.fps);
        LittleEndian::write_u32(&mut out[15..19], self.frame_count);
        LittleEndian::write_u16(&mut out[19..21], self.palette_size() as u16);
        LittleEndian::write_u16(&mut out[21..23], self.keyframe_interval);

        if let Some(audio) = self.audio {
            LittleEndian::write_u32(&mut out[23..27], audio.video_offset);
            LittleEndian::write_u32(&mut out[27..31], audio.audio_offset);
            LittleEndian::write_u32(&mut out[31..35], audio.sample_rate);
            LittleEndian::write_u32(&mut out[35..39], audio.sample_count);
        }

        out.len()
    }

    /// Parses and validates a header from the start of a stream.
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        ensure!(data.len() >= BASE_HEADER_LEN, decode_error::UnexpectedEofSnafu);
        ensure!(data[0..4] == MAGIC, decode_error::InvalidMagicSnafu);

        let version = FormatVersion::from_u8(data[4])
            .ok_or(DecodeError::UnsupportedVersion { version: data[4] })?;
        let flags = data[5];
        let width = LittleEndian::read_u16(&data[6..8]);
        let height = LittleEndian::read_u16(&data[8..10]);
        let (tile_width, tile_height) = (data[10], data[11]);
        let bits = data[12];

        ensure!(
            usize::from(tile_width) == TILE_SIZE && usize::from(tile_height) == TILE_SIZE,
            decode_error::UnsupportedTileSizeSnafu {
                tile_width,
                tile_height
            }
        );

        let direct = flags & FLAG_DIRECT_COLOR != 0;
        let format = PixelFormat::from_bits(bits, direct)
            .ok_or(DecodeError::InvalidPixelFormat { bits, direct })?;

        let palette_size = usize::from(LittleEndian::read_u16(&data[19..21]));
        ensure!(
            palette_size == format.palette_len(),
            decode_error::InvalidPaletteSizeSnafu {
                palette_size,
                expected: format.palette_len()
            }
        );
        ensure!(
            TileGrid::new(usize::from(width), usize::from(height)).is_some(),
            decode_error::InvalidDimensionsSnafu { width, height }
        );

        let audio = if flags & FLAG_AUDIO != 0 {
            ensure!(data.len() >= MAX_HEADER_LEN, decode_error::UnexpectedEofSnafu);
            Some(AudioInfo {
                video_offset: LittleEndian::read_u32(&data[23..27]),
                audio_offset: LittleEndian::read_u32(&data[27..31]),
                sample_rate: LittleEndian::read_u32(&data[31..35]),
                sample_count: LittleEndian::read_u32(&data[35..39]),
            })
        } else {
            None
        };

        Ok(Self {
            version,
            format,
            width,
            height,
            fps: LittleEndian::read_u16(&data[13..15]),
            frame_count: LittleEndian::read_u32(&data[15..19]),
            keyframe_interval: LittleEndian::read_u16(&data[21..23]),
            audio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header {
            version: FormatVersion::Skip,
            format: PixelFormat::Indexed1,
            width: 16,
            height: 16,
            fps: 10,
            frame_count: 8,
            keyframe_interval: 0,
            audio: None,
        }
    }

    #[test]
    fn layout() {
        let mut buf = [0; MAX_HEADER_LEN];
        let len = header().write_to(&mut buf);
        assert_eq!(len, BASE_HEADER_LEN);
        assert_eq!(
            &buf[..len],
            &[
                b'T', b'D', b'V', b'C', 2, 0, 16, 0, 16, 0, 8, 8, 1, 10, 0, 8, 0, 0, 0, 2, 0, 0, 0
            ]
        );
        assert_eq!(Header::parse(&buf[..len]).unwrap(), header());
        assert_eq!(header().video_offset(), BASE_HEADER_LEN + 6);
    }

    #[test]
    fn audio_extension() {
        let mut h = header();
        h.format = PixelFormat::Rgb333;
        h.audio = Some(AudioInfo {
            video_offset: 39,
            audio_offset: 1000,
            sample_rate: 16000,
            sample_count: 123,
        });

        let mut buf = [0; MAX_HEADER_LEN];
        assert_eq!(h.write_to(&mut buf), MAX_HEADER_LEN);
        assert_eq!(buf[5], FLAG_DIRECT_COLOR | FLAG_AUDIO);
        assert_eq!(buf[12], 9);
        assert_eq!(Header::parse(&buf).unwrap(), h);
        assert!(matches!(
            Header::parse(&buf[..BASE_HEADER_LEN]),
            Err(DecodeError::UnexpectedEof)
        ));
    }

    #[test]
    fn rejects_invalid_headers() {
        let mut buf = [0; MAX_HEADER_LEN];
        assert!(matches!(Header::parse(&buf), Err(DecodeError::InvalidMagic)));

        header().write_to(&mut buf);
        let mut bad = buf;
        bad[4] = 7;
        assert!(matches!(
            Header::parse(&bad),
            Err(DecodeError::UnsupportedVersion { version: 7 })
        ));

        let mut bad = buf;
        bad[10] = 16;
        assert!(matches!(
            Header::parse(&bad),
            Err(DecodeError::UnsupportedTileSize { .. })
        ));

        let mut bad = buf;
        bad[12] = 3;
        assert!(matches!(
            Header::parse(&bad),
            Err(DecodeError::InvalidPixelFormat { bits: 3, .. })
        ));

        let mut bad = buf;
        bad[19] = 4;
        assert!(matches!(
            Header::parse(&bad),
            Err(DecodeError::InvalidPaletteSize { .. })
        ));

        let mut bad = buf;
        bad[6] = 12;
        assert!(matches!(
            Header::parse(&bad),
            Err(DecodeError::InvalidDimensions { .. })
        ));
    }
}
