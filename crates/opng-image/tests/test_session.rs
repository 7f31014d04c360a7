/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! End-to-end sessions: decode, transform, reduce, search, write.

use std::io::Cursor;

use opng_image::{OpngOptions, Session, Sink, Transformer};
use opng_core::ancillary::Transparency;
use opng_core::chunk::ChunkName;
use opng_core::{BitDepth, InterlaceMethod, PngColor};
use opng_png::crc::calc_crc;
use opng_png::{
    EncodeParams, EncoderImage, PngDecoder, PngEncoder, ZlibOptions, ZlibStrategy
};

fn encode_input(
    width: usize, height: usize, depth: BitDepth, color: PngColor, rows: Vec<Vec<u8>>,
    palette: Vec<[u8; 3]>, trans: Option<Transparency>, level: i32
) -> Vec<u8> {
    let image = EncoderImage {
        width,
        height,
        depth,
        color,
        interlace: InterlaceMethod::Standard,
        rows: &rows,
        palette: &palette,
        trans: trans.as_ref(),
        background: None,
        hist: None,
        sig_bits: None,
        unknown: &[]
    };
    let params = EncodeParams {
        filter: 0,
        zlib:   ZlibOptions {
            level,
            strategy: ZlibStrategy::Default,
            mem_level: 8,
            window_bits: 15
        }
    };
    let mut buffer = Cursor::new(Vec::new());
    PngEncoder::new(image, params)
        .encode(Sink::Seekable(&mut buffer))
        .unwrap();
    buffer.into_inner()
}

struct Chunk {
    name: ChunkName,
    data: Vec<u8>
}

fn parse_chunks(bytes: &[u8]) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut pos = 8;
    while pos + 8 <= bytes.len() {
        let length = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        let name = ChunkName(bytes[pos + 4..pos + 8].try_into().unwrap());
        let data = bytes[pos + 8..pos + 8 + length].to_vec();
        chunks.push(Chunk { name, data });
        pos += 12 + length;
    }
    chunks
}

fn build_png(chunks: &[Chunk]) -> Vec<u8> {
    let mut out = opng_png::PNG_SIGNATURE.to_vec();
    for chunk in chunks {
        out.extend_from_slice(&(chunk.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&chunk.name.0);
        out.extend_from_slice(&chunk.data);
        let mut crc_input = chunk.name.0.to_vec();
        crc_input.extend_from_slice(&chunk.data);
        out.extend_from_slice(&calc_crc(&crc_input).to_be_bytes());
    }
    out
}

fn count_idats(bytes: &[u8]) -> usize {
    parse_chunks(bytes)
        .iter()
        .filter(|chunk| chunk.name == opng_core::chunk::IDAT)
        .count()
}

fn run_to_vec(options: &OpngOptions, transformer: &Transformer, input: &[u8]) -> Vec<u8> {
    let session = Session::new(options, transformer);
    let analysis = session.analyze(input).unwrap();
    let mut buffer = Cursor::new(Vec::new());
    if analysis.flags.needs_new_idat {
        analysis.write(Sink::Seekable(&mut buffer)).unwrap();
    } else {
        let mut inner = buffer.into_inner();
        analysis.copy(input, &mut inner).unwrap();
        return inner;
    }
    buffer.into_inner()
}

#[test]
fn uniform_gray_rgba_becomes_tiny_gray_png() {
    // spec scenario: 4x4 RGBA, every pixel (17, 17, 17, 255)
    let rows = vec![vec![17u8, 17, 17, 255].repeat(4); 4];
    let input = encode_input(4, 4, BitDepth::Eight, PngColor::RGBA, rows, vec![], None, 6);

    let mut options = OpngOptions {
        optim_level: Some(2),
        ..OpngOptions::default()
    };
    options.normalize();
    let transformer = Transformer::new();
    let output = run_to_vec(&options, &transformer, &input);

    let decoded = PngDecoder::new(&output).decode().unwrap();
    assert_eq!(decoded.color, PngColor::Luma);
    assert_eq!(decoded.depth, BitDepth::Eight);
    assert_eq!(decoded.width, 4);
    assert_eq!(decoded.height, 4);
    for row in &decoded.rows {
        assert!(row.iter().all(|&v| v == 17));
    }
    assert_eq!(count_idats(&output), 1);
    assert!(output.len() < input.len());
}

#[test]
fn oversized_palette_is_rejected_without_output() {
    // a fuzzer-style PLTE with 300 entries
    let ihdr = {
        let mut data = Vec::new();
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(&[8, 3, 0, 0, 0]);
        data
    };
    let input = build_png(&[
        Chunk {
            name: opng_core::chunk::IHDR,
            data: ihdr
        },
        Chunk {
            name: opng_core::chunk::PLTE,
            data: vec![0u8; 300 * 3]
        },
        Chunk {
            name: opng_core::chunk::IDAT,
            data: vec![0u8; 10]
        },
        Chunk {
            name: opng_core::chunk::IEND,
            data: vec![]
        }
    ]);
    let options = OpngOptions::default();
    let transformer = Transformer::new();
    let session = Session::new(&options, &transformer);
    assert!(session.analyze(&input).is_err());
}

#[test]
fn alpha_reset_enables_the_alpha_strip() {
    // spec scenario: -reset image.alpha over non-uniform alpha
    let rows = vec![
        vec![1u8, 2, 3, 10, 4, 5, 6, 200],
        vec![7u8, 8, 9, 255, 10, 11, 12, 0],
    ];
    let input = encode_input(2, 2, BitDepth::Eight, PngColor::RGBA, rows, vec![], None, 6);

    let options = OpngOptions::default();
    let mut transformer = Transformer::new();
    transformer.reset("image.alpha").unwrap();
    let output = run_to_vec(&options, &transformer, &input);

    let decoded = PngDecoder::new(&output).decode().unwrap();
    assert_eq!(decoded.color, PngColor::RGB);
    assert!(decoded.trans.is_none());
    assert_eq!(decoded.rows[0], vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn strip_all_respects_the_protect_set() {
    // spec scenario: -strip all -protect sRGB,iCCP
    let rows = vec![vec![1u8, 2, 3, 4, 5, 6, 7, 8]; 4];
    let base = encode_input(8, 4, BitDepth::Eight, PngColor::Luma, rows, vec![], None, 6);

    // graft the four ancillaries in front of IDAT
    let mut chunks = parse_chunks(&base);
    let idat_at = chunks
        .iter()
        .position(|chunk| chunk.name == opng_core::chunk::IDAT)
        .unwrap();
    for (i, (name, data)) in [
        (*b"sRGB", vec![0u8]),
        (*b"iCCP", b"x\0\0y".to_vec()),
        (*b"tEXt", b"k\0v".to_vec()),
        (*b"gAMA", 45455u32.to_be_bytes().to_vec())
    ]
    .into_iter()
    .enumerate()
    {
        chunks.insert(
            idat_at + i,
            Chunk {
                name: ChunkName(name),
                data
            }
        );
    }
    let input = build_png(&chunks);

    let options = OpngOptions::default();
    let mut transformer = Transformer::new();
    transformer.strip("all").unwrap();
    transformer.protect("sRGB,iCCP").unwrap();
    let output = run_to_vec(&options, &transformer, &input);

    let names: Vec<ChunkName> = parse_chunks(&output).iter().map(|c| c.name).collect();
    assert!(names.contains(&ChunkName(*b"sRGB")));
    assert!(names.contains(&ChunkName(*b"iCCP")));
    assert!(!names.contains(&ChunkName(*b"tEXt")));
    assert!(!names.contains(&ChunkName(*b"gAMA")));
}

#[test]
fn split_idats_join_through_the_copy_path() {
    let rows: Vec<Vec<u8>> = (0..8)
        .map(|y| (0..24).map(|x| ((x * 7 + y * 13) % 251) as u8).collect())
        .collect();
    let well_compressed =
        encode_input(8, 8, BitDepth::Eight, PngColor::RGB, rows, vec![], None, 9);

    // split the single IDAT into two chunks: pure junk, no pixel change
    let mut chunks = Vec::new();
    for chunk in parse_chunks(&well_compressed) {
        if chunk.name == opng_core::chunk::IDAT && chunk.data.len() > 2 {
            let (a, b) = chunk.data.split_at(chunk.data.len() / 2);
            chunks.push(Chunk {
                name: opng_core::chunk::IDAT,
                data: a.to_vec()
            });
            chunks.push(Chunk {
                name: opng_core::chunk::IDAT,
                data: b.to_vec()
            });
        } else {
            chunks.push(chunk);
        }
    }
    let input = build_png(&chunks);

    // under -nz no trial may force a rewrite; the junk alone decides
    let options = OpngOptions {
        no_idat_recoding: true,
        ..OpngOptions::default()
    };
    let transformer = Transformer::new();
    let session = Session::new(&options, &transformer);
    let analysis = session.analyze(&input).unwrap();
    // joining split IDATs needs a new file but not a new IDAT stream
    assert!(analysis.flags.has_junk);
    assert!(analysis.flags.needs_new_file);
    assert!(!analysis.flags.needs_new_idat);

    let output = run_to_vec(&options, &transformer, &input);
    assert_eq!(count_idats(&output), 1);
    // one chunk header and CRC less than the split input
    assert_eq!(output.len() + 12, input.len());

    let a = PngDecoder::new(&input).decode().unwrap();
    let b = PngDecoder::new(&output).decode().unwrap();
    assert_eq!(a.rows, b.rows);
}

#[test]
fn second_run_is_a_fixed_point() {
    let rows: Vec<Vec<u8>> = (0..16)
        .map(|y| (0..48).map(|x| ((x * x + y * 31) % 253) as u8).collect())
        .collect();
    let input = encode_input(16, 16, BitDepth::Eight, PngColor::RGB, rows, vec![], None, 1);

    let options = OpngOptions::default();
    let transformer = Transformer::new();
    let first = run_to_vec(&options, &transformer, &input);

    let session = Session::new(&options, &transformer);
    let analysis = session.analyze(&first).unwrap();
    assert!(analysis.is_already_optimized());
}

#[test]
fn bmp_bgr_pixels_arrive_as_rgb() {
    // spec scenario: 24-bit BMP, 2x1, pixels BGR (10,20,30) (40,50,60)
    let mut bmp = Vec::new();
    bmp.extend_from_slice(b"BM");
    bmp.extend_from_slice(&0u32.to_le_bytes());
    bmp.extend_from_slice(&0u32.to_le_bytes());
    bmp.extend_from_slice(&54u32.to_le_bytes());
    bmp.extend_from_slice(&40u32.to_le_bytes());
    bmp.extend_from_slice(&2u32.to_le_bytes());
    bmp.extend_from_slice(&1u32.to_le_bytes());
    bmp.extend_from_slice(&1u16.to_le_bytes());
    bmp.extend_from_slice(&24u16.to_le_bytes());
    bmp.extend_from_slice(&0u32.to_le_bytes());
    bmp.extend_from_slice(&[0u8; 20]);
    bmp.extend_from_slice(&[10, 20, 30, 40, 50, 60, 0, 0]);

    let options = OpngOptions::default();
    let transformer = Transformer::new();
    let output = run_to_vec(&options, &transformer, &bmp);
    let decoded = PngDecoder::new(&output).decode().unwrap();
    assert_eq!(decoded.color, PngColor::RGB);
    assert_eq!(decoded.rows[0], vec![30, 20, 10, 60, 50, 40]);
}

/// A GIF writer that prefixes every literal with a clear code, keeping
/// all codes at the minimum width.
fn literal_gif(width: u16, height: u16, palette: &[[u8; 3]; 4], pixels: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"GIF89a");
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.push(0x80 | 0x01); // global table with four entries
    out.push(0);
    out.push(0);
    for entry in palette {
        out.extend_from_slice(entry);
    }
    // graphic control: transparency on index 2
    out.extend_from_slice(&[0x21, 0xf9, 4, 0x01, 0, 0, 2, 0]);
    // image descriptor
    out.push(0x2c);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.push(0);
    out.push(2); // minimum code size

    let mut bits: Vec<u8> = Vec::new();
    let mut bit_buf = 0u32;
    let mut bit_count = 0usize;
    let mut push_code = |code: u32, bits: &mut Vec<u8>| {
        bit_buf |= code << bit_count;
        bit_count += 3;
        while bit_count >= 8 {
            bits.push((bit_buf & 0xff) as u8);
            bit_buf >>= 8;
            bit_count -= 8;
        }
    };
    for &pixel in pixels {
        push_code(4, &mut bits); // clear
        push_code(u32::from(pixel), &mut bits);
    }
    push_code(5, &mut bits); // end
    if bit_count > 0 {
        bits.push((bit_buf & 0xff) as u8);
    }

    for block in bits.chunks(255) {
        out.push(block.len() as u8);
        out.extend_from_slice(block);
    }
    out.push(0);
    out.push(0x3b);
    out
}

#[test]
fn gif_with_transparency_becomes_a_packed_palette_png() {
    // spec scenario: 8x8 GIF, four colors, transparent index 2
    let palette = [[0, 0, 0], [255, 0, 0], [0, 255, 0], [0, 0, 255]];
    let pixels: Vec<u8> = (0..64).map(|i| (i % 4) as u8).collect();
    let gif = literal_gif(8, 8, &palette, &pixels);

    let options = OpngOptions::default();
    let transformer = Transformer::new();
    let output = run_to_vec(&options, &transformer, &gif);

    let decoded = PngDecoder::new(&output).decode().unwrap();
    assert_eq!(decoded.color, PngColor::Palette);
    assert!(matches!(decoded.depth, BitDepth::Two | BitDepth::Four));
    assert_eq!(decoded.palette.len(), 4);
    match decoded.trans {
        Some(Transparency::Alpha(alphas)) => {
            assert_eq!(alphas.len(), 3);
            assert_eq!(alphas[2], 0);
            assert_eq!(&alphas[..2], &[255, 255]);
        }
        other => panic!("expected an alpha prefix, got {other:?}")
    }
    // all four palette indices stay exactly what the GIF held
    for (y, row) in decoded.rows.iter().enumerate() {
        for x in 0..8 {
            let bits = decoded.depth.to_int() as usize;
            let index = opng_png::adam7::read_packed(row, x, bits);
            assert_eq!(usize::from(index), (y * 8 + x) % 4);
        }
    }
}

#[test]
fn nx_disables_all_reductions() {
    let rows = vec![vec![9u8, 9, 9, 255].repeat(4); 4];
    let input = encode_input(4, 4, BitDepth::Eight, PngColor::RGBA, rows, vec![], None, 6);
    let options = OpngOptions {
        no_reductions: true,
        force: true,
        ..OpngOptions::default()
    };
    let transformer = Transformer::new();
    let output = run_to_vec(&options, &transformer, &input);
    let decoded = PngDecoder::new(&output).decode().unwrap();
    assert_eq!(decoded.color, PngColor::RGBA);
}

#[test]
fn interlace_change_forces_recoding() {
    let rows: Vec<Vec<u8>> = (0..9)
        .map(|y| (0..9).map(|x| (x * y) as u8).collect())
        .collect();
    let input = encode_input(9, 9, BitDepth::Eight, PngColor::Luma, rows.clone(), vec![], None, 9);

    let options = OpngOptions {
        interlace: Some(InterlaceMethod::Adam7),
        ..OpngOptions::default()
    };
    let transformer = Transformer::new();
    let output = run_to_vec(&options, &transformer, &input);
    let decoded = PngDecoder::new(&output).decode().unwrap();
    assert_eq!(decoded.interlace, InterlaceMethod::Adam7);
    assert_eq!(decoded.rows, rows);
}
