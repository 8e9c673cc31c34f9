use crate::{
    decode::{DecodeError, RecordInfo, TdvDecodeContext},
    header::Header,
    pixel::{rgb332_to_rgb888, rgb333_to_rgb888, PixelFormat},
    tile::{scatter_tile, TileGrid},
};
use alloc::vec::Vec;

/// One fully reconstructed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub info: RecordInfo,
    /// Every packed tile of the frame, in raster order.
    pub tiles: Vec<u8>,
}

/// Decodes every frame of a stream, keeping a copy of the full tile buffer after each record.
pub fn decode_to_vec(data: &[u8]) -> Result<(Header, Vec<DecodedFrame>), DecodeError> {
    let mut ctx = TdvDecodeContext::new(data)?;
    let mut tiles = alloc::vec![0; ctx.tiles_len()];
    let mut frames = Vec::with_capacity(ctx.header().frame_count as usize);

    while let Some(info) = ctx.decode_next(&mut tiles)? {
        frames.push(DecodedFrame {
            info,
            tiles: tiles.clone(),
        });
    }

    Ok((*ctx.header(), frames))
}

/// Unpacks a frame's tiles into one sample per pixel, row by row.
pub fn tiles_to_samples(tiles: &[u8], grid: &TileGrid, format: PixelFormat) -> Vec<u16> {
    let tile_len = format.tile_bytes();
    let mut samples = alloc::vec![0; grid.tile_count() * crate::consts::TILE_PIXELS];

    for (index, tile) in tiles.chunks_exact(tile_len).take(grid.tile_count()).enumerate() {
        scatter_tile(tile, format, grid, index, &mut samples);
    }

    samples
}

/// Maps samples to RGB888 using the stream palette (indexed) or bit expansion (direct color).
pub fn samples_to_rgb(samples: &[u16], format: PixelFormat, palette: &[u8]) -> Vec<[u8; 3]> {
    samples
        .iter()
        .map(|&s| match format {
            PixelFormat::Rgb332 => rgb332_to_rgb888(s as u8),
            PixelFormat::Rgb333 => rgb333_to_rgb888(s),
            _ => {
                let i = usize::from(s) * 3;
                palette
                    .get(i..i + 3)
                    .map(|c| [c[0], c[1], c[2]])
                    .unwrap_or_default()
            }
        })
        .collect()
}
