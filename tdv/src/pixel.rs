use crate::consts::TILE_PIXELS;

/// Output sample format of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Indexed1,
    Indexed2,
    Indexed4,
    Indexed8,
    /// 3 bits red (low), 3 bits green, 2 bits blue (high).
    Rgb332,
    /// 3 bits red (low), 3 bits green, 3 bits blue, stored as u16le.
    Rgb333,
}

impl PixelFormat {
    /// Picks the format for a bit depth. `direct` selects RGB332 for 8 bits; 9 bits is always
    /// direct and 1/2/4 bits are always indexed.
    pub const fn from_bits(bits: u8, direct: bool) -> Option<Self> {
        Some(match (bits, direct) {
            (1, false) => Self::Indexed1,
            (2, false) => Self::Indexed2,
            (4, false) => Self::Indexed4,
            (8, false) => Self::Indexed8,
            (8, true) => Self::Rgb332,
            (9, true) => Self::Rgb333,
            _ => return None,
        })
    }

    pub const fn bits_per_pixel(self) -> u8 {
        match self {
            Self::Indexed1 => 1,
            Self::Indexed2 => 2,
            Self::Indexed4 => 4,
            Self::Indexed8 | Self::Rgb332 => 8,
            Self::Rgb333 => 9,
        }
    }

    pub const fn is_indexed(self) -> bool {
        !matches!(self, Self::Rgb332 | Self::Rgb333)
    }

    /// Number of palette entries stored in the container. Zero for direct color.
    pub const fn palette_len(self) -> usize {
        if self.is_indexed() {
            1 << self.bits_per_pixel()
        } else {
            0
        }
    }

    /// Size of one packed tile in bytes.
    pub const fn tile_bytes(self) -> usize {
        match self {
            Self::Rgb333 => TILE_PIXELS * 2,
            _ => TILE_PIXELS * self.bits_per_pixel() as usize / 8,
        }
    }

    /// Mask of the bits of a sample that are significant in this format.
    #[inline]
    pub const fn sample_mask(self) -> u16 {
        (1 << self.bits_per_pixel()) - 1
    }
}

// A tile's bit count has to land on a byte boundary for every supported depth.
const _: () = {
    let depths = [1, 2, 4, 8];
    let mut i = 0;
    while i < depths.len() {
        assert!(TILE_PIXELS * depths[i] % 8 == 0);
        i += 1;
    }
};

/// Converts an RGB888 pixel into an RGB332 sample. Channels are truncated, not rounded.
#[inline]
pub const fn rgb332([r, g, b]: [u8; 3]) -> u8 {
    (r >> 5) | ((g >> 5) << 3) | (b & 0b1100_0000)
}

/// Converts an RGB888 pixel into an RGB333 sample. Channels are truncated, not rounded.
#[inline]
pub const fn rgb333([r, g, b]: [u8; 3]) -> u16 {
    (((b >> 5) as u16) << 6) | (((g >> 5) as u16) << 3) | ((r >> 5) as u16)
}

/// Quantizes an RGB888 pixel for a direct color format. Indexed formats have no RGB mapping and
/// return `None`.
#[inline]
pub const fn quantize_rgb(format: PixelFormat, rgb: [u8; 3]) -> Option<u16> {
    match format {
        PixelFormat::Rgb332 => Some(rgb332(rgb) as u16),
        PixelFormat::Rgb333 => Some(rgb333(rgb)),
        _ => None,
    }
}

#[inline]
const fn widen3(c: u8) -> u8 {
    (c << 5) | (c << 2) | (c >> 1)
}

#[inline]
const fn widen2(c: u8) -> u8 {
    (c << 6) | (c << 4) | (c << 2) | c
}

/// Expands an RGB332 sample back to RGB888 by bit replication.
#[inline]
pub const fn rgb332_to_rgb888(sample: u8) -> [u8; 3] {
    let r = sample & 0b111;
    let g = (sample >> 3) & 0b111;
    let b = sample >> 6;

    [widen3(r), widen3(g), widen2(b)]
}

/// Expands an RGB333 sample back to RGB888 by bit replication.
#[inline]
pub const fn rgb333_to_rgb888(sample: u16) -> [u8; 3] {
    let r = (sample & 0b111) as u8;
    let g = ((sample >> 3) & 0b111) as u8;
    let b = ((sample >> 6) & 0b111) as u8;

    [widen3(r), widen3(g), widen3(b)]
}
