//! Reassembles fixed-size raw frames from a byte stream that arrives in arbitrary chunks, such as
//! the stdout of a decoder process.

use snafu::{ensure, ResultExt, Snafu};
use std::io::{self, Read};

#[derive(Debug, Snafu)]
pub enum AccumulatorError {
    #[snafu(display(
        "Appending {incoming} bytes to {buffered} buffered bytes exceeds the {capacity} byte limit"
    ))]
    BufferFull {
        buffered: usize,
        incoming: usize,
        capacity: usize,
    },
    #[snafu(display("Stream ended with {residue} bytes of an incomplete frame"))]
    PartialFrame { residue: usize },
    #[snafu(display("Failed to read frame data"))]
    ReadIo { source: io::Error },
}

#[derive(Debug)]
pub struct FrameAccumulator {
    frame_len: usize,
    capacity: usize,
    buf: Vec<u8>,
}

impl FrameAccumulator {
    /// Buffers at most `max_buffered_frames` frames of `frame_len` bytes each.
    ///
    /// # Panics
    ///
    /// If either argument is zero.
    pub fn new(frame_len: usize, max_buffered_frames: usize) -> Self {
        assert!(frame_len > 0 && max_buffered_frames > 0);

        let capacity = frame_len * max_buffered_frames;
        Self {
            frame_len,
            capacity,
            buf: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    #[inline]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn extend(&mut self, chunk: &[u8]) -> Result<(), AccumulatorError> {
        ensure!(
            self.buf.len() + chunk.len() <= self.capacity,
            BufferFullSnafu {
                buffered: self.buf.len(),
                incoming: chunk.len(),
                capacity: self.capacity,
            }
        );

        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    /// Takes one complete frame off the front of the buffer.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.buf.len() < self.frame_len {
            return None;
        }

        let rest = self.buf.split_off(self.frame_len);
        Some(std::mem::replace(&mut self.buf, rest))
    }

    /// Returns the next frame, reading from `reader` only while no complete frame is buffered.
    ///
    /// `Ok(None)` means the reader is exhausted; call [`finish`](Self::finish) to check for
    /// leftover bytes.
    pub fn read_frame<R: Read>(&mut self, mut reader: R) -> Result<Option<Vec<u8>>, AccumulatorError> {
        let mut chunk = vec![0; self.frame_len];

        loop {
            if let Some(frame) = self.next_frame() {
                return Ok(Some(frame));
            }

            let want = self.frame_len - self.buf.len();
            let read = match reader.read(&mut chunk[..want]) {
                Ok(0) => return Ok(None),
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context(ReadIoSnafu),
            };
            self.extend(&chunk[..read])?;
        }
    }

    /// Checks that the stream ended on a frame boundary.
    pub fn finish(self) -> Result<(), AccumulatorError> {
        ensure!(
            self.buf.is_empty(),
            PartialFrameSnafu {
                residue: self.buf.len()
            }
        );
        Ok(())
    }
}
