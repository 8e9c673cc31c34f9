//! Reads GIFs as an input for encoding as TDV

use crate::error::{GifSnafu, SourceResult, UnsupportedSnafu};
use crate::source::Source;
use snafu::{OptionExt, ResultExt};
use tdv::{
    canvas::{Disposal, Frame, FramePixels},
    PixelFormat, StreamConfig,
};

/// Fallback when the GIF doesn't specify a frame delay.
const DEFAULT_FPS: u16 = 10;

pub struct GifSource {
    data: Vec<u8>,
    width: u16,
    height: u16,
    format: PixelFormat,
    palette: Vec<[u8; 3]>,
    background: u16,
    frames: u32,
    fps: u16,
}

fn decoder(data: &[u8]) -> SourceResult<gif::Decoder<&[u8]>> {
    let mut gif_opts = gif::DecodeOptions::new();
    // the canvas works on palette indices
    gif_opts.set_color_output(gif::ColorOutput::Indexed);
    gif_opts.read_info(data).context(GifSnafu)
}

/// Smallest supported depth whose palette holds `colors` entries.
fn depth_for(colors: usize) -> u8 {
    [1, 2, 4].into_iter().find(|&bits| colors <= 1 << bits).unwrap_or(8)
}

impl GifSource {
    /// Inspects the whole GIF once, to learn the frame count before encoding.
    ///
    /// `bits` overrides the bit depth, which otherwise follows the size of the global color table.
    pub fn new(data: Vec<u8>, bits: Option<u8>) -> SourceResult<Self> {
        let mut decoder = decoder(&data)?;
        let (width, height) = (decoder.width(), decoder.height());

        let global: Vec<[u8; 3]> = decoder
            .global_palette()
            .context(UnsupportedSnafu {
                reason: "GIFs without a global color table are not supported",
            })?
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        let background = decoder.bg_color().unwrap_or(0) as u16;

        let bits = bits.unwrap_or_else(|| depth_for(global.len()));
        let format = PixelFormat::from_bits(bits, false).context(UnsupportedSnafu {
            reason: format!("GIF input is always indexed, {bits} bpp is not (use 1, 2, 4 or 8)"),
        })?;

        let mut palette = global;
        if palette.len() < format.palette_len() {
            palette.resize(format.palette_len(), [0; 3]);
        }

        let mut frames = 0u32;
        let mut first_delay = 0;
        while let Some(frame) = decoder.read_next_frame().context(GifSnafu)? {
            if frames == 0 {
                first_delay = frame.delay;
            }
            frames += 1;
        }
        drop(decoder);

        let fps = match first_delay {
            0 => DEFAULT_FPS,
            delay => (100 / delay).max(1),
        };

        log::info!("GIF: {width}x{height}, {frames} frames, {fps} fps, {bits} bpp");

        Ok(Self {
            data,
            width,
            height,
            format,
            palette,
            background,
            frames,
            fps,
        })
    }
}

impl Source for GifSource {
    fn stream_config(&self) -> StreamConfig {
        let mut config = StreamConfig::new(self.width, self.height, self.format);
        config.palette = self.palette.clone();
        config.background = self.background;
        config.fps = self.fps;
        config
    }

    fn total_frames(&self) -> Option<u32> {
        Some(self.frames)
    }

    fn collect(&mut self, add_frame: &mut dyn FnMut(&Frame<'_>) -> SourceResult<()>) -> SourceResult<()> {
        let mut decoder = decoder(&self.data)?;
        let mut warned = false;

        while let Some(frame) = decoder.read_next_frame().context(GifSnafu)? {
            if frame.palette.is_some() && !warned {
                log::warn!("local color tables are ignored, colors will follow the global table");
                warned = true;
            }

            add_frame(&Frame {
                left: frame.left,
                top: frame.top,
                width: frame.width,
                height: frame.height,
                pixels: FramePixels::Indexed(&frame.buffer),
                transparent: frame.transparent,
                disposal: match frame.dispose {
                    gif::DisposalMethod::Any | gif::DisposalMethod::Keep => Disposal::Keep,
                    gif::DisposalMethod::Background => Disposal::Background,
                    gif::DisposalMethod::Previous => Disposal::Previous,
                },
            })?;
        }

        Ok(())
    }
}
