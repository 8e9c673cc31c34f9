use crate::{
    diff::FrameRecord,
    encode::{encode_record, ConfigError, EncodingSession},
    header::{AudioInfo, Header, MAX_HEADER_LEN},
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use snafu::{ensure, ResultExt, Snafu};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};

#[derive(Debug, Snafu)]
pub enum EncodeError {
    #[snafu(display("Invalid stream configuration"))]
    Config { source: ConfigError },
    WriteIo { source: io::Error },
    #[snafu(display("Failed to read audio samples"))]
    ReadAudio { source: io::Error },
    #[snafu(display("Header declares {declared} frames, but {written} were written"))]
    FrameCountMismatch { declared: u32, written: u32 },
    #[snafu(display("Stream offset {offset} doesn't fit the 32-bit header field"))]
    OffsetOverflow { offset: u64 },
    #[snafu(display("Video records can't follow the audio region"))]
    VideoAfterAudio,
    #[snafu(display("The stream was not configured with an audio track"))]
    NoAudioTrack,
}

impl From<ConfigError> for EncodeError {
    fn from(source: ConfigError) -> Self {
        Self::Config { source }
    }
}

fn palette_bytes(palette: &[[u8; 3]]) -> Vec<u8> {
    palette.iter().flatten().copied().collect()
}

fn offset_u32(offset: u64) -> Result<u32, EncodeError> {
    u32::try_from(offset).map_err(|_| EncodeError::OffsetOverflow { offset })
}

/// Serializes records and keeps track of how far into the stream they reach.
#[derive(Debug)]
struct RecordWriter<W> {
    w: W,
    header: Header,
    /// Bytes written since the start of the stream.
    position: u64,
    frames: u32,
    scratch: Vec<u8>,
}

impl<W: Write> RecordWriter<W> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        self.w.write_all(bytes).context(WriteIoSnafu)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn write_record(&mut self, record: &FrameRecord<'_>) -> Result<(), EncodeError> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        encode_record(record, self.header.version, &mut scratch);

        let result = self.write_all(&scratch);
        self.scratch = scratch;
        result?;

        self.frames += 1;
        Ok(())
    }
}

/// Writes a stream front to back. The frame count has to be known before the first record.
///
/// Works with any [`Write`]r, including pipes.
#[derive(Debug)]
pub struct SinglePassWriter<W: Write> {
    inner: RecordWriter<W>,
}

impl<W: Write> SinglePassWriter<W> {
    /// Writes the header for `frame_count` frames and the session's palette.
    pub fn new(w: W, session: &EncodingSession, frame_count: u32) -> Result<Self, EncodeError> {
        let header = session.config().header(frame_count);

        let mut inner = RecordWriter {
            w,
            header,
            position: 0,
            frames: 0,
            scratch: Vec::new(),
        };

        let mut buf = [0; MAX_HEADER_LEN];
        let len = header.write_to(&mut buf);
        inner.write_all(&buf[..len])?;
        inner.write_all(&palette_bytes(session.palette()))?;

        Ok(Self { inner })
    }

    #[inline]
    pub fn header(&self) -> &Header {
        &self.inner.header
    }

    #[inline]
    pub fn frames_written(&self) -> u32 {
        self.inner.frames
    }

    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.inner.position
    }

    pub fn write_record(&mut self, record: &FrameRecord<'_>) -> Result<(), EncodeError> {
        let declared = self.inner.header.frame_count;
        ensure!(
            self.inner.frames < declared,
            FrameCountMismatchSnafu {
                declared,
                written: self.inner.frames + 1
            }
        );

        self.inner.write_record(record)
    }

    /// Flushes and returns the writer. Fails if fewer frames were written than declared.
    pub fn finish(mut self) -> Result<W, EncodeError> {
        let declared = self.inner.header.frame_count;
        let written = self.inner.frames;
        ensure!(
            written == declared,
            FrameCountMismatchSnafu { declared, written }
        );

        self.inner.w.flush().context(WriteIoSnafu)?;
        Ok(self.inner.w)
    }
}

#[derive(Debug, Clone, Copy)]
struct AudioRegion {
    offset: u64,
    samples: u32,
}

/// Writes a stream whose frame count and audio layout are only known at the end.
///
/// The header area is reserved up front and filled with zeros, so an unfinished stream never
/// carries a valid magic. [`finish`](Self::finish) seeks back and writes the real header.
#[derive(Debug)]
pub struct TwoPhaseWriter<W: Write + Seek> {
    inner: RecordWriter<W>,
    /// Absolute position of the stream start in `W`.
    start: u64,
    sample_rate: Option<u32>,
    audio: Option<AudioRegion>,
}

impl<W: Write + Seek> TwoPhaseWriter<W> {
    /// Reserves the header and writes the session's palette. With `sample_rate` set, the stream
    /// gets the audio extension and an audio region after the records.
    pub fn new(
        mut w: W,
        session: &EncodingSession,
        sample_rate: Option<u32>,
    ) -> Result<Self, EncodeError> {
        let start = w.stream_position().context(WriteIoSnafu)?;

        let mut header = session.config().header(0);
        header.audio = sample_rate.map(|sample_rate| AudioInfo {
            video_offset: 0,
            audio_offset: 0,
            sample_rate,
            sample_count: 0,
        });

        let mut inner = RecordWriter {
            w,
            header,
            position: 0,
            frames: 0,
            scratch: Vec::new(),
        };

        inner.write_all(&[0; MAX_HEADER_LEN][..header.encoded_len()])?;
        inner.write_all(&palette_bytes(session.palette()))?;

        log::debug!(
            "reserved {} header bytes at offset {start}",
            header.encoded_len()
        );

        Ok(Self {
            inner,
            start,
            sample_rate,
            audio: None,
        })
    }

    #[inline]
    pub fn frames_written(&self) -> u32 {
        self.inner.frames
    }

    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.inner.position
    }

    pub fn write_record(&mut self, record: &FrameRecord<'_>) -> Result<(), EncodeError> {
        ensure!(self.audio.is_none(), VideoAfterAudioSnafu);
        self.inner.write_record(record)
    }

    /// Ends the video region. Pads it to an even length so the audio samples stay aligned.
    pub fn begin_audio(&mut self) -> Result<(), EncodeError> {
        ensure!(self.sample_rate.is_some(), NoAudioTrackSnafu);
        if self.audio.is_some() {
            return Ok(());
        }

        if self.inner.position % 2 != 0 {
            self.inner.write_all(&[0])?;
        }
        let offset = self.inner.position;
        offset_u32(offset)?;

        log::debug!(
            "video region ends after {} frames, audio starts at {offset}",
            self.inner.frames
        );

        self.audio = Some(AudioRegion { offset, samples: 0 });
        Ok(())
    }

    /// Appends 16-bit little-endian mono samples from `reader`, scaled by `volume` percent.
    ///
    /// A trailing odd byte is dropped. Returns the number of samples written by this call.
    pub fn write_audio<R: Read>(&mut self, reader: R, volume: u16) -> Result<u32, EncodeError> {
        self.begin_audio()?;

        let mut reader = BufReader::new(reader);
        let mut written = 0u32;
        loop {
            let sample = match reader.read_i16::<LittleEndian>() {
                Ok(sample) => sample,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e).context(ReadAudioSnafu),
            };

            self.inner
                .w
                .write_i16::<LittleEndian>(scale_sample(sample, volume))
                .context(WriteIoSnafu)?;
            self.inner.position += 2;
            written += 1;
        }

        if let Some(audio) = &mut self.audio {
            audio.samples += written;
        }
        Ok(written)
    }

    /// Writes the final header and returns the writer, positioned at the end of the stream.
    pub fn finish(mut self) -> Result<W, EncodeError> {
        if self.sample_rate.is_some() {
            self.begin_audio()?;
        }

        let end = self.inner.position;
        let mut header = self.inner.header;
        header.frame_count = self.inner.frames;
        let video_offset = offset_u32(header.video_offset() as u64)?;
        if let (Some(info), Some(region)) = (&mut header.audio, self.audio) {
            info.video_offset = video_offset;
            info.audio_offset = offset_u32(region.offset)?;
            info.sample_count = region.samples;
        }

        let mut buf = [0; MAX_HEADER_LEN];
        let len = header.write_to(&mut buf);

        let w = &mut self.inner.w;
        w.seek(SeekFrom::Start(self.start)).context(WriteIoSnafu)?;
        w.write_all(&buf[..len]).context(WriteIoSnafu)?;
        w.seek(SeekFrom::Start(self.start + end))
            .context(WriteIoSnafu)?;
        w.flush().context(WriteIoSnafu)?;

        log::info!(
            "finished stream: {} frames, {} audio samples, {end} bytes",
            header.frame_count,
            header.audio.map_or(0, |a| a.sample_count)
        );

        Ok(self.inner.w)
    }
}

/// Applies a volume gain in percent, saturating at the i16 range.
#[inline]
pub fn scale_sample(sample: i16, volume: u16) -> i16 {
    let scaled = i32::from(sample) * i32::from(volume) / 100;
    scaled.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}
