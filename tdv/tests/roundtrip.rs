use proptest::prelude::*;
use std::io::Cursor;
use tdv::{
    canvas::{Disposal, Frame, FramePixels},
    decode::{decode_to_vec, samples_to_rgb, tiles_to_samples, DecodeError},
    diff::KeyframePolicy,
    encode::{SinglePassWriter, TwoPhaseWriter},
    EncodingSession, FormatVersion, PixelFormat, StreamConfig, TdvDecodeContext,
};

fn indexed_config(width: u16, height: u16, format: PixelFormat) -> StreamConfig {
    let mut config = StreamConfig::new(width, height, format);
    config.palette = (0..format.palette_len())
        .map(|i| [i as u8, 255 - i as u8, 0])
        .collect();
    config.fps = 10;
    config
}

/// Encodes every frame and returns the stream plus the canvas content after each frame.
fn encode(config: StreamConfig, frames: &[Frame<'_>]) -> (Vec<u8>, Vec<Vec<u16>>) {
    let mut session = EncodingSession::new(config).unwrap();
    let mut writer = SinglePassWriter::new(Vec::new(), &session, frames.len() as u32).unwrap();

    let mut canvases = vec![];
    for frame in frames {
        let record = session.encode_frame(frame).unwrap();
        writer.write_record(&record).unwrap();
        canvases.push(session.canvas().samples().to_vec());
    }

    (writer.finish().unwrap(), canvases)
}

fn assert_roundtrip(data: &[u8], canvases: &[Vec<u16>]) {
    let (header, frames) = decode_to_vec(data).unwrap();
    let grid = header.grid().unwrap();
    assert_eq!(frames.len(), canvases.len());

    for (i, (frame, canvas)) in frames.iter().zip(canvases).enumerate() {
        let samples = tiles_to_samples(&frame.tiles, &grid, header.format);
        assert_eq!(&samples, canvas, "frame {i} differs");
    }
}

#[test]
fn two_color_sequence() {
    // a 4x4 block moving diagonally across a 16x16 canvas
    let frames: Vec<Vec<u8>> = (0..8)
        .map(|i| {
            let mut pixels = vec![0u8; 256];
            for y in i..i + 4 {
                for x in i..i + 4 {
                    pixels[y * 16 + x] = 1;
                }
            }
            pixels
        })
        .collect();
    let input: Vec<_> = frames
        .iter()
        .map(|p| Frame::full(16, 16, FramePixels::Indexed(p)))
        .collect();

    let (data, canvases) = encode(indexed_config(16, 16, PixelFormat::Indexed1), &input);

    let mut ctx = TdvDecodeContext::new(&data).unwrap();
    let header = *ctx.header();
    assert_eq!((header.width, header.height), (16, 16));
    assert_eq!(header.frame_count, 8);
    assert_eq!(header.palette_size(), 2);
    assert_eq!(header.fps, 10);
    assert_eq!(header.keyframe_interval, 0);
    assert_eq!(ctx.palette(), &[0, 255, 0, 1, 254, 0]);

    let tile_of = |x: usize, y: usize| (y / 8) * 2 + x / 8;
    let touched = |i: usize| {
        let mut tiles: Vec<usize> = (i..i + 4)
            .flat_map(|y| (i..i + 4).map(move |x| tile_of(x, y)))
            .collect();
        tiles.sort_unstable();
        tiles.dedup();
        tiles
    };

    let mut tiles = vec![0; ctx.tiles_len()];
    let first = ctx.decode_next(&mut tiles).unwrap().unwrap();
    assert!(first.keyframe);
    assert_eq!(first.updates, 4);

    for i in 1..8 {
        let info = ctx.decode_next(&mut tiles).unwrap().unwrap();
        assert!(!info.keyframe);

        let mut changed = touched(i - 1);
        changed.extend(touched(i));
        changed.sort_unstable();
        changed.dedup();
        assert_eq!(usize::from(info.updates), changed.len(), "frame {i}");
    }
    assert_eq!(ctx.decode_next(&mut tiles).unwrap(), None);

    assert_roundtrip(&data, &canvases);
}

#[test]
fn keyframes_are_complete() {
    let frames: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i % 3; 32 * 16]).collect();
    let input: Vec<_> = frames
        .iter()
        .map(|p| Frame::full(32, 16, FramePixels::Indexed(p)))
        .collect();

    let mut config = indexed_config(32, 16, PixelFormat::Indexed2);
    config.keyframes = KeyframePolicy::every(4);
    let (data, canvases) = encode(config, &input);

    let (_, decoded) = decode_to_vec(&data).unwrap();
    for (i, frame) in decoded.iter().enumerate() {
        assert_eq!(frame.info.keyframe, i % 4 == 0, "frame {i}");
        if frame.info.keyframe {
            assert_eq!(frame.info.updates, 8);
        }
    }

    // a keyframe alone reproduces its frame, whatever came before
    let mut ctx = TdvDecodeContext::new(&data).unwrap();
    let mut tiles = vec![0; ctx.tiles_len()];
    for _ in 0..4 {
        ctx.decode_next(&mut tiles).unwrap();
    }
    let mut fresh = vec![0xAA; ctx.tiles_len()];
    ctx.decode_next(&mut fresh).unwrap();
    assert_eq!(fresh, decoded[4].tiles);

    assert_roundtrip(&data, &canvases);
}

#[test]
fn flat_records() {
    let a = vec![0u8; 256];
    let mut b = a.clone();
    b[200] = 7;
    let input = [
        Frame::full(16, 16, FramePixels::Indexed(&a)),
        Frame::full(16, 16, FramePixels::Indexed(&b)),
        Frame::full(16, 16, FramePixels::Indexed(&b)),
    ];

    let mut config = indexed_config(16, 16, PixelFormat::Indexed4);
    config.version = FormatVersion::Flat;
    let (data, canvases) = encode(config, &input);

    let (header, decoded) = decode_to_vec(&data).unwrap();
    assert_eq!(header.version, FormatVersion::Flat);
    assert_eq!(
        decoded
            .iter()
            .map(|f| (f.info.keyframe, f.info.updates))
            .collect::<Vec<_>>(),
        [(true, 4), (false, 1), (false, 0)]
    );

    assert_roundtrip(&data, &canvases);
}

#[test]
fn direct_color_with_partial_frames() {
    let red = vec![[255, 0, 0]; 16 * 16];
    let blue = vec![[0, 0, 255]; 4 * 4];
    let mut patch = Frame {
        left: 10,
        top: 2,
        width: 4,
        height: 4,
        pixels: FramePixels::Rgb(&blue),
        transparent: None,
        disposal: Disposal::Background,
    };
    let first = Frame::full(16, 16, FramePixels::Rgb(&red));
    let mut input = vec![first, patch];
    patch.left = 0;
    patch.disposal = Disposal::Keep;
    input.push(patch);

    let config = StreamConfig::new(16, 16, PixelFormat::Rgb333);
    let (data, canvases) = encode(config, &input);
    assert_roundtrip(&data, &canvases);

    let (header, decoded) = decode_to_vec(&data).unwrap();
    let grid = header.grid().unwrap();
    let samples = tiles_to_samples(&decoded[2].tiles, &grid, header.format);
    let rgb = samples_to_rgb(&samples, header.format, &[]);
    assert_eq!(rgb[2 * 16], [0, 0, 255]);
    // background disposal of the previous patch
    assert_eq!(rgb[2 * 16 + 10], [0, 0, 0]);
    assert_eq!(rgb[15 * 16 + 15], [255, 0, 0]);
}

#[test]
fn audio_container() {
    let frames: Vec<Vec<[u8; 3]>> = (0..5u8).map(|i| vec![[i * 40, 0, 0]; 8 * 8]).collect();

    let mut session = EncodingSession::new(StreamConfig::new(8, 8, PixelFormat::Rgb332)).unwrap();
    let mut writer = TwoPhaseWriter::new(Cursor::new(Vec::new()), &session, Some(16000)).unwrap();
    for pixels in &frames {
        let record = session
            .encode_frame(&Frame::full(8, 8, FramePixels::Rgb(pixels)))
            .unwrap();
        writer.write_record(&record).unwrap();
    }

    let pcm: Vec<u8> = (0..100i16).flat_map(|s| (s * 10).to_le_bytes()).collect();
    writer.write_audio(&pcm[..], 100).unwrap();
    let data = writer.finish().unwrap().into_inner();

    let ctx = TdvDecodeContext::new(&data).unwrap();
    let audio = ctx.header().audio.unwrap();
    assert_eq!(ctx.header().frame_count, 5);
    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.sample_count, 100);
    assert_eq!(audio.audio_offset % 2, 0);

    let samples: Vec<i16> = ctx.audio_samples().unwrap().unwrap().collect();
    assert_eq!(samples, (0..100i16).map(|s| s * 10).collect::<Vec<_>>());

    let (_, decoded) = decode_to_vec(&data).unwrap();
    assert_eq!(decoded.len(), 5);
}

#[test]
fn missing_records_are_reported() {
    let pixels = vec![1u8; 64];
    let (data, _) = encode(
        indexed_config(8, 8, PixelFormat::Indexed8),
        &[Frame::full(8, 8, FramePixels::Indexed(&pixels)); 3],
    );

    // the last record is an empty delta
    let truncated = &data[..data.len() - 3];
    assert!(matches!(
        decode_to_vec(truncated),
        Err(DecodeError::Truncated {
            decoded: 2,
            frame_count: 3
        })
    ));
}

proptest! {
    #[test]
    fn arbitrary_frames_roundtrip(
        bits in prop::sample::select(vec![1u8, 2, 4, 8]),
        kf in 0u16..4,
        frames in prop::collection::vec(prop::collection::vec(any::<u8>(), 16 * 24), 1..6),
    ) {
        let format = PixelFormat::from_bits(bits, false).unwrap();
        let mut config = indexed_config(16, 24, format);
        config.keyframes = KeyframePolicy::every(kf);

        let input: Vec<_> = frames
            .iter()
            .map(|p| Frame::full(16, 24, FramePixels::Indexed(p)))
            .collect();
        let (data, canvases) = encode(config, &input);
        assert_roundtrip(&data, &canvases);
    }
}
