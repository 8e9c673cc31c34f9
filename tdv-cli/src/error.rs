use snafu::Snafu;
use std::{io, process::ExitStatus};
use tdv::{accumulator::AccumulatorError, canvas::CompositeError, encode::EncodeError};

pub type SourceResult<T, E = SourceError> = Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SourceError {
    #[snafu(display("Failed to read `{path}`"))]
    Open { path: String, source: io::Error },
    #[snafu(display("Failed to decode GIF"))]
    Gif { source: gif::DecodingError },
    #[snafu(display("Failed to run `{program}`, is it installed?"))]
    Spawn {
        program: &'static str,
        source: io::Error,
    },
    #[snafu(display("Could not probe `{path}`: {reason}"))]
    Probe { path: String, reason: String },
    #[snafu(display("`{program}` exited with {status}"))]
    ProcessFailed {
        program: &'static str,
        status: ExitStatus,
    },
    #[snafu(display("Input ended after {frames} complete frames"))]
    Truncated {
        frames: u32,
        source: AccumulatorError,
    },
    #[snafu(display("{reason}"))]
    Unsupported { reason: String },
    #[snafu(display("Frame {frame} can't be drawn"))]
    Composite {
        frame: u32,
        source: CompositeError,
    },
    Encode { source: EncodeError },
}

impl From<EncodeError> for SourceError {
    fn from(source: EncodeError) -> Self {
        Self::Encode { source }
    }
}
