use crate::error::SourceResult;
use tdv::{canvas::Frame, StreamConfig};

pub trait Source {
    /// Geometry, pixel format and palette of the stream this source produces.
    fn stream_config(&self) -> StreamConfig;

    /// Number of frames, if it is known before decoding.
    fn total_frames(&self) -> Option<u32>;

    /// Decodes every frame, in order.
    fn collect(&mut self, add_frame: &mut dyn FnMut(&Frame<'_>) -> SourceResult<()>) -> SourceResult<()>;
}
