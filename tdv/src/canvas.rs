//! The persistent frame buffer that source frames are composited onto.

use crate::pixel::{quantize_rgb, PixelFormat};
use alloc::vec::Vec;
use snafu::{ensure, Snafu};

/// What happens to a frame's rectangle before the next frame is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposal {
    /// Leave the pixels in place.
    #[default]
    Keep,
    /// Fill the rectangle with the background sample.
    Background,
    /// Restore the rectangle to what it held before the frame was drawn.
    Previous,
}

#[derive(Debug, Clone, Copy)]
pub enum FramePixels<'a> {
    /// Palette indices, for indexed streams.
    Indexed(&'a [u8]),
    /// RGB888 pixels, for direct color streams.
    Rgb(&'a [[u8; 3]]),
}

impl FramePixels<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Indexed(p) => p.len(),
            Self::Rgb(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One decoded source frame: a sub-image placed onto the canvas.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub pixels: FramePixels<'a>,
    /// Indexed pixels equal to this value are not copied.
    pub transparent: Option<u8>,
    pub disposal: Disposal,
}

impl<'a> Frame<'a> {
    /// A frame covering the whole canvas, without transparency or disposal.
    pub fn full(width: u16, height: u16, pixels: FramePixels<'a>) -> Self {
        Self {
            left: 0,
            top: 0,
            width,
            height,
            pixels,
            transparent: None,
            disposal: Disposal::Keep,
        }
    }
}

#[derive(Debug, Snafu)]
pub enum CompositeError {
    #[snafu(display(
        "Frame rectangle {width}x{height}+{left}+{top} does not fit the {canvas_width}x{canvas_height} canvas"
    ))]
    FrameOutOfBounds {
        left: u16,
        top: u16,
        width: u16,
        height: u16,
        canvas_width: usize,
        canvas_height: usize,
    },
    #[snafu(display(
        "Frame is {width}x{height} == {} pixels, but {pixel_count} pixels were given",
        usize::from(*width) * usize::from(*height)
    ))]
    PixelCountMismatch {
        width: u16,
        height: u16,
        pixel_count: usize,
    },
    #[snafu(display("{kind} pixels can't be encoded as {format:?}"))]
    SampleKindMismatch {
        kind: &'static str,
        format: PixelFormat,
    },
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
}

#[derive(Debug)]
struct PendingDisposal {
    rect: Rect,
    /// Saved samples for [`Disposal::Previous`]; `None` means fill with the background.
    saved: Option<Vec<u16>>,
}

/// Width × height samples that live for the whole stream.
#[derive(Debug)]
pub struct Canvas {
    width: usize,
    height: usize,
    background: u16,
    samples: Vec<u16>,
    pending: Option<PendingDisposal>,
}

impl Canvas {
    pub fn new(width: usize, height: usize, background: u16) -> Self {
        Self {
            width,
            height,
            background,
            samples: alloc::vec![background; width * height],
            pending: None,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    fn rows_mut(&mut self, rect: Rect) -> impl Iterator<Item = &mut [u16]> {
        self.samples[rect.y * self.width..]
            .chunks_mut(self.width)
            .take(rect.height)
            .map(move |row| &mut row[rect.x..rect.x + rect.width])
    }

    fn apply_pending_disposal(&mut self) {
        let Some(PendingDisposal { rect, saved }) = self.pending.take() else {
            return;
        };

        match saved {
            Some(saved) => {
                for (row, saved) in self.rows_mut(rect).zip(saved.chunks_exact(rect.width)) {
                    row.copy_from_slice(saved);
                }
            }
            None => {
                let background = self.background;
                for row in self.rows_mut(rect) {
                    row.fill(background);
                }
            }
        }
    }

    /// Draws a frame, after undoing the previous frame according to its disposal.
    pub fn composite(&mut self, frame: &Frame<'_>, format: PixelFormat) -> Result<(), CompositeError> {
        let Frame {
            left,
            top,
            width,
            height,
            pixels,
            transparent,
            disposal,
        } = *frame;

        let rect = Rect {
            x: usize::from(left),
            y: usize::from(top),
            width: usize::from(width),
            height: usize::from(height),
        };

        ensure!(
            rect.x + rect.width <= self.width && rect.y + rect.height <= self.height,
            FrameOutOfBoundsSnafu {
                left,
                top,
                width,
                height,
                canvas_width: self.width,
                canvas_height: self.height,
            }
        );
        ensure!(
            pixels.len() == rect.width * rect.height,
            PixelCountMismatchSnafu {
                width,
                height,
                pixel_count: pixels.len(),
            }
        );
        match pixels {
            FramePixels::Indexed(_) => ensure!(
                format.is_indexed(),
                SampleKindMismatchSnafu {
                    kind: "Indexed",
                    format
                }
            ),
            FramePixels::Rgb(_) => ensure!(
                !format.is_indexed(),
                SampleKindMismatchSnafu { kind: "RGB", format }
            ),
        }

        self.apply_pending_disposal();

        self.pending = match disposal {
            _ if rect.width == 0 || rect.height == 0 => None,
            Disposal::Keep => None,
            Disposal::Background => Some(PendingDisposal { rect, saved: None }),
            Disposal::Previous => {
                let mut saved = Vec::with_capacity(rect.width * rect.height);
                for row in self.rows_mut(rect) {
                    saved.extend_from_slice(row);
                }
                Some(PendingDisposal {
                    rect,
                    saved: Some(saved),
                })
            }
        };

        if rect.width == 0 {
            return Ok(());
        }

        match pixels {
            FramePixels::Indexed(src) => {
                let mask = format.sample_mask();
                for (row, src) in self.rows_mut(rect).zip(src.chunks_exact(rect.width)) {
                    for (dst, &index) in row.iter_mut().zip(src) {
                        if Some(index) != transparent {
                            *dst = u16::from(index) & mask;
                        }
                    }
                }
            }
            FramePixels::Rgb(src) => {
                for (row, src) in self.rows_mut(rect).zip(src.chunks_exact(rect.width)) {
                    for (dst, &rgb) in row.iter_mut().zip(src) {
                        // format was checked to be direct color above
                        *dst = quantize_rgb(format, rgb).unwrap_or(0);
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(left: u16, top: u16, w: u16, h: u16, pixels: &[u8]) -> Frame<'_> {
        Frame {
            left,
            top,
            width: w,
            height: h,
            pixels: FramePixels::Indexed(pixels),
            transparent: None,
            disposal: Disposal::Keep,
        }
    }

    #[test]
    fn composites_sub_rectangle() {
        let mut canvas = Canvas::new(8, 8, 0);
        canvas
            .composite(&sub(2, 3, 2, 1, &[5, 6]), PixelFormat::Indexed8)
            .unwrap();

        assert_eq!(canvas.samples()[3 * 8 + 2], 5);
        assert_eq!(canvas.samples()[3 * 8 + 3], 6);
        assert_eq!(canvas.samples().iter().filter(|&&s| s != 0).count(), 2);
    }

    #[test]
    fn transparent_pixels_are_skipped() {
        let mut canvas = Canvas::new(8, 8, 0);
        canvas
            .composite(&sub(0, 0, 8, 8, &[1; 64]), PixelFormat::Indexed2)
            .unwrap();

        let mut frame = sub(0, 0, 2, 1, &[3, 2]);
        frame.transparent = Some(3);
        canvas.composite(&frame, PixelFormat::Indexed2).unwrap();

        assert_eq!(&canvas.samples()[..3], &[1, 2, 1]);
    }

    #[test]
    fn background_disposal_applies_before_next_frame() {
        let mut canvas = Canvas::new(8, 8, 7);
        let mut frame = sub(0, 0, 2, 2, &[1; 4]);
        frame.disposal = Disposal::Background;
        canvas.composite(&frame, PixelFormat::Indexed4).unwrap();
        assert_eq!(canvas.samples()[0], 1);

        canvas
            .composite(&sub(4, 4, 1, 1, &[2]), PixelFormat::Indexed4)
            .unwrap();
        assert_eq!(canvas.samples()[0], 7);
        assert_eq!(canvas.samples()[9], 7);
        assert_eq!(canvas.samples()[4 * 8 + 4], 2);
    }

    #[test]
    fn previous_disposal_restores_rectangle() {
        let mut canvas = Canvas::new(8, 8, 0);
        canvas
            .composite(&sub(0, 0, 8, 8, &[4; 64]), PixelFormat::Indexed4)
            .unwrap();

        let mut overlay = sub(1, 1, 2, 2, &[9; 4]);
        overlay.disposal = Disposal::Previous;
        canvas.composite(&overlay, PixelFormat::Indexed4).unwrap();
        assert_eq!(canvas.samples()[9], 9);

        canvas
            .composite(&sub(7, 7, 1, 1, &[1]), PixelFormat::Indexed4)
            .unwrap();
        assert_eq!(canvas.samples()[9], 4);
        assert_eq!(canvas.samples()[63], 1);
    }

    #[test]
    fn empty_frame_leaves_nothing_to_dispose() {
        let mut canvas = Canvas::new(8, 8, 0);
        let mut empty = sub(3, 0, 0, 4, &[]);
        empty.disposal = Disposal::Previous;
        canvas.composite(&empty, PixelFormat::Indexed1).unwrap();

        let mut empty = sub(0, 5, 2, 0, &[]);
        empty.disposal = Disposal::Background;
        canvas.composite(&empty, PixelFormat::Indexed1).unwrap();

        canvas
            .composite(&sub(0, 0, 8, 8, &[1; 64]), PixelFormat::Indexed1)
            .unwrap();
        assert!(canvas.samples().iter().all(|&s| s == 1));
    }

    #[test]
    fn rejects_bad_frames() {
        let mut canvas = Canvas::new(8, 8, 0);
        assert!(matches!(
            canvas.composite(&sub(4, 0, 8, 1, &[0; 8]), PixelFormat::Indexed1),
            Err(CompositeError::FrameOutOfBounds { .. })
        ));
        assert!(matches!(
            canvas.composite(&sub(0, 0, 2, 2, &[0; 3]), PixelFormat::Indexed1),
            Err(CompositeError::PixelCountMismatch { .. })
        ));
        assert!(matches!(
            canvas.composite(&sub(0, 0, 1, 1, &[0]), PixelFormat::Rgb332),
            Err(CompositeError::SampleKindMismatch { .. })
        ));
    }

    #[test]
    fn rgb_frames_are_quantized() {
        let mut canvas = Canvas::new(8, 8, 0);
        let pixels = [[255, 255, 255]; 64];
        canvas
            .composite(
                &Frame::full(8, 8, FramePixels::Rgb(&pixels)),
                PixelFormat::Rgb333,
            )
            .unwrap();
        assert!(canvas.samples().iter().all(|&s| s == 0x1FF));
    }
}
