/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Encode/decode round trips over the codec, including interlaced and
//! packed sub-byte images.

use std::io::Cursor;

use nanorand::Rng;
use opng_core::ancillary::Transparency;
use opng_core::chunk::ChunkName;
use opng_core::depth::row_bytes;
use opng_core::{BitDepth, InterlaceMethod, PngColor};
use opng_png::{
    EncodeParams, EncoderImage, PngDecoder, PngEncoder, Sink, ZlibOptions, ZlibStrategy
};

fn params() -> EncodeParams {
    EncodeParams {
        filter: 5,
        zlib:   ZlibOptions::default()
    }
}

struct TestImage {
    width:     usize,
    height:    usize,
    depth:     BitDepth,
    color:     PngColor,
    interlace: InterlaceMethod,
    rows:      Vec<Vec<u8>>,
    palette:   Vec<[u8; 3]>,
    trans:     Option<Transparency>
}

impl TestImage {
    fn random(
        width: usize, height: usize, depth: BitDepth, color: PngColor,
        interlace: InterlaceMethod
    ) -> TestImage {
        let mut rng = nanorand::WyRand::new_seed(0x5eed + width as u64);
        let bits = color.num_components() * depth.to_int() as usize;
        let stride = row_bytes(width, bits);
        let rows = (0..height)
            .map(|_| (0..stride).map(|_| rng.generate::<u8>()).collect())
            .collect();
        let palette = if color.is_palette() {
            // keep indices in range by masking rows afterwards is overkill;
            // use a full palette instead
            (0..256).map(|i| [i as u8, (i * 7) as u8, (i * 13) as u8]).collect()
        } else {
            Vec::new()
        };
        TestImage {
            width,
            height,
            depth,
            color,
            interlace,
            rows,
            palette,
            trans: None
        }
    }

    fn as_encoder_image(&self) -> EncoderImage<'_> {
        EncoderImage {
            width:      self.width,
            height:     self.height,
            depth:      self.depth,
            color:      self.color,
            interlace:  self.interlace,
            rows:       &self.rows,
            palette:    &self.palette,
            trans:      self.trans.as_ref(),
            background: None,
            hist:       None,
            sig_bits:   None,
            unknown:    &[]
        }
    }
}

fn encode(image: &TestImage) -> Vec<u8> {
    let encoder = PngEncoder::new(image.as_encoder_image(), params());
    let mut buffer = Cursor::new(Vec::new());
    encoder.encode(Sink::Seekable(&mut buffer)).unwrap();
    buffer.into_inner()
}

fn assert_round_trip(image: &TestImage) {
    let bytes = encode(image);
    let decoded = PngDecoder::new(&bytes).decode().unwrap();
    assert_eq!(decoded.width, image.width);
    assert_eq!(decoded.height, image.height);
    assert_eq!(decoded.depth, image.depth);
    assert_eq!(decoded.color, image.color);
    assert_eq!(decoded.interlace, image.interlace);
    assert_eq!(decoded.rows, image.rows);
    assert!(!decoded.events.has_errors);
    assert!(!decoded.events.split_idats);
}

fn count_idats(bytes: &[u8]) -> usize {
    let mut count = 0;
    let mut pos = 8;
    while pos + 8 <= bytes.len() {
        let length = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        let name = ChunkName(bytes[pos + 4..pos + 8].try_into().unwrap());
        if name == opng_core::chunk::IDAT {
            count += 1;
        }
        pos += 12 + length;
    }
    count
}

#[test]
fn gray_eight_round_trips() {
    let image = TestImage::random(31, 17, BitDepth::Eight, PngColor::Luma, InterlaceMethod::Standard);
    assert_round_trip(&image);
}

#[test]
fn rgb_sixteen_round_trips() {
    let image =
        TestImage::random(9, 23, BitDepth::Sixteen, PngColor::RGB, InterlaceMethod::Standard);
    assert_round_trip(&image);
}

#[test]
fn rgba_round_trips_interlaced() {
    let image = TestImage::random(13, 9, BitDepth::Eight, PngColor::RGBA, InterlaceMethod::Adam7);
    assert_round_trip(&image);
}

#[test]
fn packed_one_bit_round_trips_interlaced() {
    // the width fills whole bytes so the interlaced rebuild is
    // byte-identical, padding included
    let image = TestImage::random(16, 11, BitDepth::One, PngColor::Luma, InterlaceMethod::Adam7);
    assert_round_trip(&image);
}

#[test]
fn palette_with_trns_round_trips() {
    let mut image =
        TestImage::random(16, 16, BitDepth::Eight, PngColor::Palette, InterlaceMethod::Standard);
    image.trans = Some(Transparency::Alpha(vec![0, 128, 255]));
    let bytes = encode(&image);
    let decoded = PngDecoder::new(&bytes).decode().unwrap();
    assert_eq!(decoded.rows, image.rows);
    assert_eq!(decoded.palette, image.palette);
    assert_eq!(decoded.trans, image.trans);
}

#[test]
fn output_has_exactly_one_idat() {
    // large enough that the compressed stream spans several sink buffers
    let image =
        TestImage::random(512, 256, BitDepth::Eight, PngColor::RGB, InterlaceMethod::Standard);
    let bytes = encode(&image);
    assert_eq!(count_idats(&bytes), 1);
}

#[test]
fn every_fixed_filter_round_trips() {
    let image = TestImage::random(40, 12, BitDepth::Eight, PngColor::RGB, InterlaceMethod::Standard);
    for filter in 0..=4u8 {
        let encode_params = EncodeParams {
            filter,
            zlib: ZlibOptions::default()
        };
        let encoder = PngEncoder::new(image.as_encoder_image(), encode_params);
        let mut buffer = Cursor::new(Vec::new());
        encoder.encode(Sink::Seekable(&mut buffer)).unwrap();
        let decoded = PngDecoder::new(&buffer.into_inner()).decode().unwrap();
        assert_eq!(decoded.rows, image.rows, "filter {filter}");
    }
}

#[test]
fn trial_mode_reports_the_streamed_size() {
    let image = TestImage::random(64, 64, BitDepth::Eight, PngColor::RGB, InterlaceMethod::Standard);
    let encoder = PngEncoder::new(image.as_encoder_image(), params());
    let trial = encoder.encode(Sink::Discard).unwrap();
    assert!(!trial.abandoned);
    assert!(trial.idat_size > 0);

    // a real encoding of the same image writes exactly that many IDAT bytes
    let mut buffer = Cursor::new(Vec::new());
    let mut encoder = PngEncoder::new(image.as_encoder_image(), params());
    encoder.set_expected_idat_size(trial.idat_size);
    let outcome = encoder.encode(Sink::Seekable(&mut buffer)).unwrap();
    assert_eq!(outcome.idat_size, trial.idat_size);

    let bytes = buffer.into_inner();
    let decoded = PngDecoder::new(&bytes).decode().unwrap();
    assert_eq!(decoded.events.idat_size, trial.idat_size);
    assert_eq!(decoded.rows, image.rows);
}

#[test]
fn trials_abandon_past_the_limit() {
    let image = TestImage::random(128, 128, BitDepth::Eight, PngColor::RGB, InterlaceMethod::Standard);
    let mut encoder = PngEncoder::new(image.as_encoder_image(), params());
    encoder.set_max_idat_size(64);
    let outcome = encoder.encode(Sink::Discard).unwrap();
    assert!(outcome.abandoned);
}

#[test]
fn non_seekable_sink_needs_the_exact_size() {
    let image = TestImage::random(24, 24, BitDepth::Eight, PngColor::Luma, InterlaceMethod::Standard);

    // pass one: trial to learn the size
    let trial = PngEncoder::new(image.as_encoder_image(), params())
        .encode(Sink::Discard)
        .unwrap();

    // pass two: stream with the known size succeeds
    let mut out = Vec::new();
    let mut encoder = PngEncoder::new(image.as_encoder_image(), params());
    encoder.set_expected_idat_size(trial.idat_size);
    encoder.encode(Sink::Stream(&mut out)).unwrap();
    assert_eq!(PngDecoder::new(&out).decode().unwrap().rows, image.rows);

    // streaming blind fails instead of emitting a corrupt length
    let mut out = Vec::new();
    let result = PngEncoder::new(image.as_encoder_image(), params())
        .encode(Sink::Stream(&mut out));
    assert!(result.is_err());
}

#[test]
fn strip_predicate_drops_metadata_chunks() {
    use opng_core::ancillary::{ChunkLocation, UnknownChunk};

    let image = TestImage::random(8, 8, BitDepth::Eight, PngColor::Luma, InterlaceMethod::Standard);
    let unknown = [UnknownChunk {
        name:     ChunkName(*b"tEXt"),
        location: ChunkLocation::BeforeIdat,
        data:     b"comment\0hello".to_vec()
    }];
    let mut view = image.as_encoder_image();
    view.unknown = &unknown;

    let strip = |name: ChunkName| name == ChunkName(*b"tEXt");
    let mut encoder = PngEncoder::new(view, params());
    encoder.set_strip_predicate(&strip);
    let mut buffer = Cursor::new(Vec::new());
    encoder.encode(Sink::Seekable(&mut buffer)).unwrap();

    let decoded = PngDecoder::new(&buffer.into_inner()).decode().unwrap();
    assert!(decoded.unknown.is_empty());
}

#[test]
fn strategies_and_windows_round_trip() {
    let image = TestImage::random(33, 21, BitDepth::Eight, PngColor::RGB, InterlaceMethod::Standard);
    for (strategy, level) in [
        (ZlibStrategy::Default, 9),
        (ZlibStrategy::Filtered, 9),
        (ZlibStrategy::HuffmanOnly, 1),
        (ZlibStrategy::Rle, 9)
    ] {
        for window_bits in [8, 11, 15] {
            let encode_params = EncodeParams {
                filter: 5,
                zlib:   ZlibOptions {
                    level,
                    strategy,
                    mem_level: 8,
                    window_bits
                }
            };
            let encoder = PngEncoder::new(image.as_encoder_image(), encode_params);
            let mut buffer = Cursor::new(Vec::new());
            encoder.encode(Sink::Seekable(&mut buffer)).unwrap();
            let decoded = PngDecoder::new(&buffer.into_inner()).decode().unwrap();
            assert_eq!(decoded.rows, image.rows, "{strategy:?} w{window_bits}");
        }
    }
}
