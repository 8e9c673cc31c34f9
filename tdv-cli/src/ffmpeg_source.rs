//! Reads any video ffmpeg understands, through `ffprobe` and `ffmpeg` child processes

use crate::error::{
    ProbeSnafu, ProcessFailedSnafu, SourceError, SourceResult, SpawnSnafu, TruncatedSnafu,
    UnsupportedSnafu,
};
use crate::source::Source;
use snafu::{ensure, ResultExt};
use std::{
    io::{self, Read},
    path::Path,
    process::{Child, ChildStdout, Command, ExitStatus, Stdio},
};
use tdv::{
    accumulator::FrameAccumulator,
    canvas::{Frame, FramePixels},
    PixelFormat, StreamConfig,
};

/// Raw frames allowed to queue up between the ffmpeg pipe and the encoder.
const MAX_BUFFERED_FRAMES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probe {
    pub width: u16,
    pub height: u16,
    pub fps: f64,
    /// Not every container stores this.
    pub frames: Option<u32>,
}

/// Parses `ffprobe -of default=noprint_wrappers=1` output.
pub fn parse_probe(output: &str) -> Result<Probe, String> {
    let mut width = None;
    let mut height = None;
    let mut fps = None;
    let mut frames = None;

    for line in output.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "width" => width = value.parse::<u16>().ok(),
            "height" => height = value.parse::<u16>().ok(),
            "r_frame_rate" => {
                fps = match value.split_once('/') {
                    Some((num, den)) => num
                        .parse::<f64>()
                        .ok()
                        .zip(den.parse::<f64>().ok())
                        .filter(|&(_, den)| den > 0.0)
                        .map(|(num, den)| num / den),
                    None => value.parse().ok(),
                }
            }
            "nb_frames" => frames = value.parse().ok(),
            _ => {}
        }
    }

    Ok(Probe {
        width: width.ok_or("no video width")?,
        height: height.ok_or("no video height")?,
        fps: fps.filter(|&f| f > 0.0).ok_or("no frame rate")?,
        frames,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct VideoOptions {
    /// 8 (RGB332) or 9 (RGB333).
    pub bits: u8,
    /// Output size, scaled by ffmpeg.
    pub resolution: Option<(u16, u16)>,
    pub fps: Option<u16>,
}

pub struct FfmpegSource {
    path: String,
    format: PixelFormat,
    width: u16,
    height: u16,
    fps: u16,
    scale: bool,
    expected_frames: Option<u32>,
}

impl FfmpegSource {
    pub fn new(path: &Path, options: VideoOptions) -> SourceResult<Self> {
        let path = path.display().to_string();

        let format = PixelFormat::from_bits(options.bits, true).ok_or_else(|| {
            SourceError::Unsupported {
                reason: format!(
                    "video input is encoded as direct color, {} bpp is not (use 8 or 9)",
                    options.bits
                ),
            }
        })?;

        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate,nb_frames",
                "-of",
                "default=noprint_wrappers=1",
            ])
            .arg(&path)
            .stderr(Stdio::inherit())
            .output()
            .context(SpawnSnafu { program: "ffprobe" })?;
        ensure!(
            output.status.success(),
            ProcessFailedSnafu {
                program: "ffprobe",
                status: output.status
            }
        );

        let probe = parse_probe(&String::from_utf8_lossy(&output.stdout))
            .map_err(|reason| ProbeSnafu { path: &path, reason }.build())?;

        let (width, height) = options.resolution.unwrap_or((probe.width, probe.height));
        let fps = options
            .fps
            .unwrap_or_else(|| probe.fps.round().clamp(1.0, f64::from(u16::MAX)) as u16);

        log::info!(
            "video: {}x{} at {:.2} fps, {} frames; encoding {width}x{height} at {fps} fps",
            probe.width,
            probe.height,
            probe.fps,
            probe.frames.map_or("unknown".to_owned(), |f| f.to_string())
        );

        Ok(Self {
            path,
            format,
            width,
            height,
            fps,
            scale: options.resolution.is_some(),
            // a forced rate changes the number of frames ffmpeg produces
            expected_frames: probe.frames.filter(|_| options.fps.is_none()),
        })
    }

    fn spawn_decoder(&self) -> SourceResult<Child> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-v", "error", "-nostdin", "-i"]).arg(&self.path);
        if self.scale {
            cmd.arg("-vf")
                .arg(format!("scale={}:{}", self.width, self.height));
        }
        cmd.arg("-r")
            .arg(self.fps.to_string())
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        log::debug!("running {cmd:?}");
        cmd.spawn().context(SpawnSnafu { program: "ffmpeg" })
    }

    /// Starts ffmpeg decoding the audio track as 16-bit little-endian mono PCM.
    pub fn spawn_audio(&self, sample_rate: u32) -> SourceResult<AudioPipe> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-v", "error", "-nostdin", "-i"])
            .arg(&self.path)
            .args(["-vn", "-f", "s16le", "-acodec", "pcm_s16le", "-ac", "1", "-ar"])
            .arg(sample_rate.to_string())
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        log::debug!("running {cmd:?}");
        let mut child = cmd.spawn().context(SpawnSnafu { program: "ffmpeg" })?;
        let stdout = child.stdout.take().ok_or_else(|| SourceError::Unsupported {
            reason: "ffmpeg stdout is not available".to_owned(),
        })?;

        Ok(AudioPipe { child, stdout })
    }
}

/// A running audio decode.
pub struct AudioPipe {
    child: Child,
    pub stdout: ChildStdout,
}

impl AudioPipe {
    /// Stops ffmpeg early and reaps it.
    pub fn abort(mut self) -> io::Result<ExitStatus> {
        drop(self.stdout);
        kill_and_wait(&mut self.child)
    }

    /// Waits for ffmpeg and fails if it didn't exit cleanly.
    pub fn finish(mut self) -> SourceResult<()> {
        drop(self.stdout);
        let status = self
            .child
            .wait()
            .context(SpawnSnafu { program: "ffmpeg" })?;
        ensure!(
            status.success(),
            ProcessFailedSnafu {
                program: "ffmpeg",
                status
            }
        );
        Ok(())
    }
}

fn kill_and_wait(child: &mut Child) -> io::Result<ExitStatus> {
    // the child may have exited already
    let _ = child.kill();
    child.wait()
}

/// Feeds every complete `width`×`height` RGB24 frame from `reader` to `add_frame`.
fn read_frames<R: Read>(
    reader: &mut R,
    width: u16,
    height: u16,
    add_frame: &mut dyn FnMut(&Frame<'_>) -> SourceResult<()>,
) -> SourceResult<u32> {
    let frame_len = usize::from(width) * usize::from(height) * 3;
    let mut accumulator = FrameAccumulator::new(frame_len, MAX_BUFFERED_FRAMES);
    let mut frames = 0u32;

    while let Some(raw) = accumulator
        .read_frame(&mut *reader)
        .context(TruncatedSnafu { frames })?
    {
        let pixels = to_rgb(&raw);
        add_frame(&Frame::full(width, height, FramePixels::Rgb(&pixels)))?;
        frames += 1;
    }
    accumulator.finish().context(TruncatedSnafu { frames })?;

    Ok(frames)
}

/// A failed process explains a short read better than the short read itself.
fn settle(
    program: &'static str,
    status: ExitStatus,
    decoded: SourceResult<u32>,
) -> SourceResult<u32> {
    ensure!(status.success(), ProcessFailedSnafu { program, status });
    decoded
}

fn to_rgb(raw: &[u8]) -> Vec<[u8; 3]> {
    raw.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect()
}

impl Source for FfmpegSource {
    fn stream_config(&self) -> StreamConfig {
        let mut config = StreamConfig::new(self.width, self.height, self.format);
        config.fps = self.fps;
        config
    }

    fn total_frames(&self) -> Option<u32> {
        // only an estimate; the two-phase writer counts what actually arrives
        None
    }

    fn collect(&mut self, add_frame: &mut dyn FnMut(&Frame<'_>) -> SourceResult<()>) -> SourceResult<()> {
        ensure!(
            self.width > 0 && self.height > 0,
            UnsupportedSnafu {
                reason: "video has no pixels"
            }
        );

        let mut child = self.spawn_decoder()?;
        let mut stdout = child.stdout.take().ok_or_else(|| SourceError::Unsupported {
            reason: "ffmpeg stdout is not available".to_owned(),
        })?;

        let (width, height) = (self.width, self.height);
        let decoded = read_frames(&mut stdout, width, height, add_frame);
        drop(stdout);

        let decoded = match decoded {
            Err(e) if !matches!(e, SourceError::Truncated { .. }) => {
                // nothing will drain the pipe anymore
                let _ = kill_and_wait(&mut child);
                return Err(e);
            }
            decoded => decoded,
        };
        let status = if decoded.is_ok() {
            child.wait()
        } else {
            kill_and_wait(&mut child)
        }
        .context(SpawnSnafu { program: "ffmpeg" })?;
        let frames = settle("ffmpeg", status, decoded)?;

        if let Some(expected) = self.expected_frames {
            if expected != frames {
                log::warn!("container announced {expected} frames, ffmpeg produced {frames}");
            }
        }
        log::info!("decoded {frames} video frames");

        Ok(())
    }
}
