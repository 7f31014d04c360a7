/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! GIF import.
//!
//! The first image of the stream becomes the PNG; later images are
//! skipped and counted so the session layer can enforce `-snip`. Rows
//! are prefilled with the screen background index, the image rectangle
//! is composited at its offset, and interlaced data is de-interleaved
//! into linear rows (the interlaced nature is kept as Adam7 on the PNG
//! side). A graphic-control transparent index becomes a single
//! transparent palette entry.
//!
//! Bogus LZW data is a recoverable condition: decoding stops at the
//! damage, the remaining rows keep the background index, and a warning
//! is counted.

use log::warn;
use opng_core::bytestream::ByteReader;
use opng_core::{BitDepth, InterlaceMethod, PngColor};

use crate::{ForeignImage, XternErrors};

const BLOCK_IMAGE: u8 = 0x2c;
const BLOCK_EXTENSION: u8 = 0x21;
const BLOCK_TRAILER: u8 = 0x3b;
const LABEL_GRAPHIC_CONTROL: u8 = 0xf9;

/// The interlace passes: (first row, row step).
const INTERLACE_PASSES: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];

/// Probe some bytes to see if they begin a GIF file.
pub fn probe_gif(bytes: &[u8]) -> bool {
    bytes.len() >= 6 && (&bytes[..6] == b"GIF87a" || &bytes[..6] == b"GIF89a")
}

/// A GIF importer over an in-memory file.
pub struct GifDecoder<'a> {
    stream: ByteReader<'a>,
    warnings: usize
}

struct ScreenInfo {
    width:      usize,
    height:     usize,
    background: u8,
    global_palette: Vec<[u8; 3]>
}

impl<'a> GifDecoder<'a> {
    pub fn new(data: &'a [u8]) -> GifDecoder<'a> {
        GifDecoder {
            stream: ByteReader::new(data),
            warnings: 0
        }
    }

    pub fn decode(mut self) -> Result<ForeignImage, XternErrors> {
        let err = |reason: &str| XternErrors::Format("GIF", reason.into());

        let signature = self.stream.get_bytes(6)?;
        if signature != b"GIF87a" && signature != b"GIF89a" {
            return Err(err("missing GIF signature"));
        }
        let screen = self.read_screen()?;
        if screen.width == 0 || screen.height == 0 {
            return Err(err("zero screen dimensions"));
        }

        let mut rows = vec![vec![screen.background; screen.width]; screen.height];
        let mut first_image: Option<(Vec<[u8; 3]>, bool)> = None;
        let mut transparent: Option<usize> = None;
        let mut extra_images = 0usize;

        loop {
            if self.stream.eof() {
                warn!("GIF ended without a trailer");
                self.warnings += 1;
                break;
            }
            match self.stream.get_u8()? {
                BLOCK_IMAGE => {
                    if first_image.is_none() {
                        let (palette, interlaced) = self.read_image(&screen, &mut rows)?;
                        first_image = Some((palette, interlaced));
                    } else {
                        self.skip_image()?;
                        extra_images += 1;
                    }
                }
                BLOCK_EXTENSION => {
                    let label = self.stream.get_u8()?;
                    if label == LABEL_GRAPHIC_CONTROL && first_image.is_none() {
                        if let Some(index) = self.read_graphic_control()? {
                            transparent.get_or_insert(index);
                        }
                    } else {
                        self.skip_sub_blocks()?;
                    }
                }
                BLOCK_TRAILER => break,
                other => return Err(err(&format!("unknown block introducer 0x{other:02x}")))
            }
        }

        let (palette, interlaced) =
            first_image.ok_or_else(|| err("no image in GIF file"))?;

        Ok(ForeignImage {
            width:     screen.width,
            height:    screen.height,
            depth:     BitDepth::Eight,
            color:     PngColor::Palette,
            interlace: if interlaced {
                InterlaceMethod::Adam7
            } else {
                InterlaceMethod::Standard
            },
            rows,
            transparent_index: transparent.filter(|&index| index < palette.len()),
            palette,
            sig_bits: None,
            format_name: "GIF",
            extra_images,
            warnings: self.warnings
        })
    }

    fn read_screen(&mut self) -> Result<ScreenInfo, XternErrors> {
        let width = usize::from(self.stream.get_u16_le()?);
        let height = usize::from(self.stream.get_u16_le()?);
        let flags = self.stream.get_u8()?;
        let background = self.stream.get_u8()?;
        let _aspect_ratio = self.stream.get_u8()?;

        let global_palette = if flags & 0x80 != 0 {
            self.read_color_table(2 << (flags & 0x07))?
        } else {
            Vec::new()
        };
        Ok(ScreenInfo {
            width,
            height,
            background,
            global_palette
        })
    }

    fn read_color_table(&mut self, entries: usize) -> Result<Vec<[u8; 3]>, XternErrors> {
        let raw = self.stream.get_bytes(entries * 3)?;
        Ok(raw.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
    }

    /// Graphic control extension: returns the transparent index if the
    /// transparency flag is set.
    fn read_graphic_control(&mut self) -> Result<Option<usize>, XternErrors> {
        let size = self.stream.get_u8()?;
        if size != 4 {
            warn!("graphic control extension of size {size}");
            self.warnings += 1;
            self.stream.skip(usize::from(size));
            self.skip_sub_blocks()?;
            return Ok(None);
        }
        let flags = self.stream.get_u8()?;
        let _delay = self.stream.get_u16_le()?;
        let transparent = self.stream.get_u8()?;
        self.skip_sub_blocks()?;
        Ok((flags & 0x01 != 0).then_some(usize::from(transparent)))
    }

    fn skip_sub_blocks(&mut self) -> Result<(), XternErrors> {
        loop {
            let size = self.stream.get_u8()?;
            if size == 0 {
                return Ok(());
            }
            self.stream.skip(usize::from(size));
        }
    }

    fn skip_image(&mut self) -> Result<(), XternErrors> {
        self.stream.skip(8); // left, top, width, height
        let flags = self.stream.get_u8()?;
        if flags & 0x80 != 0 {
            self.stream.skip((2 << (flags & 0x07)) * 3);
        }
        let _min_code_size = self.stream.get_u8()?;
        self.skip_sub_blocks()
    }

    /// Decode the image descriptor under the cursor into `rows`,
    /// returning its palette and interlace flag.
    fn read_image(
        &mut self, screen: &ScreenInfo, rows: &mut [Vec<u8>]
    ) -> Result<(Vec<[u8; 3]>, bool), XternErrors> {
        let err = |reason: &str| XternErrors::Format("GIF", reason.into());

        let left = usize::from(self.stream.get_u16_le()?);
        let top = usize::from(self.stream.get_u16_le()?);
        let width = usize::from(self.stream.get_u16_le()?);
        let height = usize::from(self.stream.get_u16_le()?);
        let flags = self.stream.get_u8()?;

        let palette = if flags & 0x80 != 0 {
            self.read_color_table(2 << (flags & 0x07))?
        } else if !screen.global_palette.is_empty() {
            screen.global_palette.clone()
        } else {
            return Err(err("image without a color table"));
        };
        let interlaced = flags & 0x40 != 0;

        // decode into a linear index buffer, then composite
        let mut indices = vec![0u8; width * height];
        let truncated = self.decode_lzw(&mut indices)?;
        if truncated {
            warn!("bogus GIF data, the remaining rows keep the background color");
            self.warnings += 1;
        }

        let mut src_row = 0usize;
        let mut place_row = |y: usize, src_row: usize| {
            if top + y >= screen.height {
                return;
            }
            let dest = &mut rows[top + y];
            for x in 0..width {
                if left + x < screen.width {
                    dest[left + x] = indices[src_row * width + x];
                }
            }
        };
        if interlaced {
            for (start, step) in INTERLACE_PASSES {
                let mut y = start;
                while y < height {
                    place_row(y, src_row);
                    src_row += 1;
                    y += step;
                }
            }
        } else {
            for y in 0..height {
                place_row(y, y);
            }
        }
        Ok((palette, interlaced))
    }

    /// GIF-flavored LZW over the data sub-blocks. Returns `true` if the
    /// data ran out or went bad before the buffer was filled.
    fn decode_lzw(&mut self, output: &mut [u8]) -> Result<bool, XternErrors> {
        const MAX_CODES: usize = 4096;

        let min_code_size = usize::from(self.stream.get_u8()?);
        if !(2..=8).contains(&min_code_size) {
            return Err(XternErrors::Format(
                "GIF",
                format!("invalid LZW minimum code size {min_code_size}")
            ));
        }
        let clear_code = 1usize << min_code_size;
        let end_code = clear_code + 1;

        let mut prefix = vec![0u16; MAX_CODES];
        let mut suffix = vec![0u8; MAX_CODES];
        let mut stack = Vec::with_capacity(MAX_CODES);

        let mut code_size = min_code_size + 1;
        let mut next_code = end_code + 1;
        let mut prev_code: Option<usize> = None;
        let mut first_byte = 0u8;

        // bit reader over the sub-block stream, LSB first
        let mut bit_buf = 0u32;
        let mut bit_count = 0usize;
        let mut block_left = 0usize;

        let mut produced = 0usize;
        let mut saw_terminator = false;

        'outer: while produced < output.len() {
            while bit_count < code_size {
                if block_left == 0 {
                    match self.stream.get_u8() {
                        Ok(0) => {
                            saw_terminator = true;
                            break 'outer;
                        }
                        Err(_) => break 'outer,
                        Ok(size) => block_left = usize::from(size)
                    }
                }
                match self.stream.get_u8() {
                    Ok(byte) => {
                        bit_buf |= u32::from(byte) << bit_count;
                        bit_count += 8;
                        block_left -= 1;
                    }
                    Err(_) => break 'outer
                }
            }
            let code = (bit_buf & ((1 << code_size) - 1)) as usize;
            bit_buf >>= code_size;
            bit_count -= code_size;

            if code == clear_code {
                code_size = min_code_size + 1;
                next_code = end_code + 1;
                prev_code = None;
                continue;
            }
            if code == end_code {
                break;
            }

            let mut current = code;
            if prev_code.is_none() {
                // the first code after a clear must be a literal
                if current >= clear_code {
                    break 'outer;
                }
                first_byte = current as u8;
                output[produced] = first_byte;
                produced += 1;
                prev_code = Some(current);
                continue;
            }

            let prev = prev_code.unwrap();
            if current > next_code || (current == next_code && next_code >= MAX_CODES) {
                break 'outer; // corrupt stream
            }
            if current == next_code {
                // the K-omega-K case
                stack.push(first_byte);
                current = prev;
            }
            while current >= clear_code + 2 {
                if current >= MAX_CODES {
                    break 'outer;
                }
                stack.push(suffix[current]);
                current = usize::from(prefix[current]);
            }
            if current >= clear_code {
                break 'outer;
            }
            first_byte = current as u8;
            stack.push(first_byte);

            while let Some(byte) = stack.pop() {
                if produced == output.len() {
                    break;
                }
                output[produced] = byte;
                produced += 1;
            }

            if next_code < MAX_CODES {
                prefix[next_code] = prev as u16;
                suffix[next_code] = first_byte;
                next_code += 1;
                if next_code.is_power_of_two() && code_size < 12 {
                    code_size += 1;
                }
            }
            prev_code = Some(code);
        }

        // leave the cursor after this image's data
        if !saw_terminator {
            if block_left > 0 {
                self.stream.skip(block_left);
            }
            self.skip_sub_blocks().ok();
        }
        Ok(produced < output.len())
    }
}
