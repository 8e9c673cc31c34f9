use argh::FromArgs;
use error::{CompositeSnafu, SourceResult};
use ffmpeg_source::{FfmpegSource, VideoOptions};
use gif_source::GifSource;
use image::{ImageFormat, RgbImage};
use snafu::ResultExt;
use source::Source;
use std::{
    fs::File,
    io::{BufWriter, Read, Seek, Write},
    path::Path,
    str::FromStr,
};
use tdv::{
    decode::{decode_to_vec, samples_to_rgb, tiles_to_samples},
    diff::{FrameRecord, KeyframePolicy},
    encode::{EncodeError, SinglePassWriter, TwoPhaseWriter},
    EncodingSession, FormatVersion, TdvDecodeContext,
};

mod error;
mod ffmpeg_source;
mod gif_source;
mod source;

/// TDV tile-delta video encoder and inspector.
#[derive(FromArgs)]
struct Cli {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Encode(Encode),
    Inspect(Inspect),
    Decode(Decode),
}

/// Encodes a GIF or a video file as TDV.
#[derive(FromArgs)]
#[argh(subcommand, name = "encode")]
struct Encode {
    /// bits per pixel: 1, 2, 4 or 8 for GIFs (default: fits the color table), 8 or 9 for video
    #[argh(option)]
    bpp: Option<u8>,

    /// frame rate stored in the stream (default: taken from the input)
    #[argh(option)]
    fps: Option<u16>,

    /// keyframe interval in frames, 0 for only the first frame
    #[argh(option, default = "0")]
    kf: u16,

    /// scale video input to this size, as `W:H`
    #[argh(option)]
    res: Option<Resolution>,

    /// include the audio track (video input only)
    #[argh(switch)]
    audio: bool,

    /// audio sample rate in Hz
    #[argh(option, default = "16000")]
    sample_rate: u32,

    /// audio volume in percent
    #[argh(option, default = "100")]
    volume: u16,

    /// write version 1 records, without skip compression
    #[argh(switch)]
    flat: bool,

    /// the output file
    #[argh(option, short = 'o')]
    output: String,

    /// the input file, a GIF or anything ffmpeg can read
    #[argh(positional)]
    input: String,
}

/// Prints the header and per-frame statistics of a TDV file.
#[derive(FromArgs)]
#[argh(subcommand, name = "inspect")]
struct Inspect {
    /// the input file
    #[argh(positional)]
    input: String,
}

/// Renders one frame of a TDV file as PNG.
#[derive(FromArgs)]
#[argh(subcommand, name = "decode")]
struct Decode {
    /// index of the frame to render
    #[argh(option, default = "0")]
    frame: usize,

    /// the output PNG file
    #[argh(option, short = 'o')]
    output: String,

    /// the input file
    #[argh(positional)]
    input: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Resolution(u16, u16);

impl FromStr for Resolution {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((w, h)) = s.split_once([':', 'x']) else {
            return Err("expected W:H");
        };
        let w = w.trim().parse().map_err(|_| "invalid width")?;
        let h = h.trim().parse().map_err(|_| "invalid height")?;

        Ok(Self(w, h))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = argh::from_env();

    match command {
        Command::Encode(options) => encode(options),
        Command::Inspect(options) => inspect(options),
        Command::Decode(options) => decode(options),
    }
}

enum Input {
    /// Frame count known up front, written in a single pass.
    Gif(GifSource),
    /// Written in two phases, optionally with audio.
    Video(FfmpegSource),
}

impl Input {
    fn as_source(&self) -> &dyn Source {
        match self {
            Self::Gif(gif) => gif,
            Self::Video(video) => video,
        }
    }
}

fn is_gif(path: &str) -> std::io::Result<bool> {
    let mut magic = [0; 4];
    match File::open(path)?.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == b"GIF8"),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Feeds every frame of `source` through the session and hands the records to `write`.
fn collect_records(
    source: &mut dyn Source,
    session: &mut EncodingSession,
    mut write: impl FnMut(&FrameRecord<'_>) -> Result<(), EncodeError>,
) -> SourceResult<u32> {
    source.collect(&mut |frame| {
        let index = session.frames_encoded();
        let record = session
            .encode_frame(frame)
            .context(CompositeSnafu { frame: index })?;
        write(&record)?;
        Ok(())
    })?;

    Ok(session.frames_encoded())
}

/// Encodes a source whose frame count is known up front.
fn encode_single_pass<W: Write>(
    source: &mut dyn Source,
    session: &mut EncodingSession,
    frames: u32,
    w: W,
) -> SourceResult<W> {
    let mut writer = SinglePassWriter::new(w, session, frames)?;
    collect_records(source, session, |record| writer.write_record(record))?;
    Ok(writer.finish()?)
}

/// Encodes video frames, then the audio track if `audio` is set.
fn encode_two_phase<W: Write + Seek>(
    source: &mut FfmpegSource,
    session: &mut EncodingSession,
    audio: Option<(u32, u16)>,
    w: W,
) -> SourceResult<W> {
    let mut writer = TwoPhaseWriter::new(w, session, audio.map(|(rate, _)| rate))?;
    collect_records(source, session, |record| writer.write_record(record))?;

    // the video decoder has exited successfully at this point
    if let Some((sample_rate, volume)) = audio {
        let mut pipe = source.spawn_audio(sample_rate)?;
        let samples = match writer.write_audio(&mut pipe.stdout, volume) {
            Ok(samples) => samples,
            Err(e) => {
                if let Err(wait) = pipe.abort() {
                    log::warn!("could not reap the audio decoder: {wait}");
                }
                return Err(e.into());
            }
        };
        pipe.finish()?;
        log::info!("wrote {samples} audio samples at {sample_rate} Hz");
    }

    Ok(writer.finish()?)
}

fn encode(options: Encode) -> Result<(), Box<dyn std::error::Error>> {
    let Encode {
        bpp,
        fps,
        kf,
        res,
        audio,
        sample_rate,
        volume,
        flat,
        output,
        input,
    } = options;

    let gif = is_gif(&input).with_context(|_| error::OpenSnafu { path: input.clone() })?;

    let (mut source, audio) = if gif {
        if audio || res.is_some() {
            return Err("--audio and --res only apply to video input".into());
        }
        let data = std::fs::read(&input).with_context(|_| error::OpenSnafu { path: input.clone() })?;
        (Input::Gif(GifSource::new(data, bpp)?), None)
    } else {
        let options = VideoOptions {
            bits: bpp.unwrap_or(8),
            resolution: res.map(|Resolution(w, h)| (w, h)),
            fps,
        };
        let source = FfmpegSource::new(Path::new(&input), options)?;
        (Input::Video(source), audio.then_some((sample_rate, volume)))
    };

    let mut config = source.as_source().stream_config();
    if let Some(fps) = fps {
        config.fps = fps;
    }
    config.keyframes = KeyframePolicy::every(kf);
    if flat {
        config.version = FormatVersion::Flat;
    }

    let mut session = EncodingSession::new(config)?;
    println!(
        "Encoding `{input}` as {}x{} {:?}",
        session.config().width,
        session.config().height,
        session.config().format
    );

    let file = BufWriter::new(File::create(&output)?);
    let result = match &mut source {
        Input::Gif(gif) => {
            let frames = gif.total_frames().unwrap_or_default();
            encode_single_pass(gif, &mut session, frames, file).map(drop)
        }
        Input::Video(video) => encode_two_phase(video, &mut session, audio, file).map(drop),
    };

    if let Err(e) = result {
        // an incomplete file would only fail to decode later
        if let Err(remove) = std::fs::remove_file(&output) {
            log::warn!("failed to remove partial output `{output}`: {remove}");
        }
        return Err(e.into());
    }

    let size = std::fs::metadata(&output)?.len();
    println!(
        "Written {} frames ({size} bytes) to `{output}`",
        session.frames_encoded()
    );

    Ok(())
}

fn inspect(options: Inspect) -> Result<(), Box<dyn std::error::Error>> {
    let Inspect { input } = options;
    let data = std::fs::read(&input)?;

    let mut ctx = TdvDecodeContext::new(&data)?;
    let header = *ctx.header();

    println!("`{input}`: TDV version {}", header.version as u8);
    println!("  {}x{}, {} tiles", header.width, header.height, ctx.grid().tile_count());
    println!(
        "  {:?} ({} bpp, {} tile bytes), palette: {} colors",
        header.format,
        header.format.bits_per_pixel(),
        header.format.tile_bytes(),
        header.palette_size()
    );
    println!(
        "  {} frames at {} fps, keyframe interval {}",
        header.frame_count, header.fps, header.keyframe_interval
    );
    if let Some(audio) = header.audio {
        println!(
            "  audio: {} samples at {} Hz, video at {}, audio at {}",
            audio.sample_count, audio.sample_rate, audio.video_offset, audio.audio_offset
        );
    }

    let mut tiles = vec![0; ctx.tiles_len()];
    let mut total_updates = 0u64;
    while let Some(info) = ctx.decode_next(&mut tiles)? {
        let index = ctx.frames_decoded() - 1;
        total_updates += u64::from(info.updates);
        println!(
            "frame {index:>5}: {:>5} updates{}",
            info.updates,
            if info.keyframe { " (keyframe)" } else { "" }
        );
    }
    println!("{total_updates} tile updates in total");

    Ok(())
}

fn decode(options: Decode) -> Result<(), Box<dyn std::error::Error>> {
    let Decode {
        frame,
        output,
        input,
    } = options;

    let data = std::fs::read(&input)?;
    println!("Decoding `{input}`");

    let ctx = TdvDecodeContext::new(&data)?;
    let palette = ctx.palette();
    let (header, frames) = decode_to_vec(&data)?;
    let decoded = frames
        .get(frame)
        .ok_or_else(|| format!("`{input}` has only {} frames", frames.len()))?;

    let grid = ctx.grid();
    let samples = tiles_to_samples(&decoded.tiles, &grid, header.format);
    let rgb888_raw = samples_to_rgb(&samples, header.format, palette)
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

    RgbImage::from_vec(u32::from(header.width), u32::from(header.height), rgb888_raw)
        .ok_or("failed to create image")?
        .save_with_format(&output, ImageFormat::Png)?;

    println!(
        "Written frame {frame} ({}x{}) to `{output}`",
        header.width, header.height
    );

    Ok(())
}
