/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! BMP import.
//!
//! Only uncompressed (`BI_RGB`) bitmaps are accepted, at the classic
//! pixel depths 1, 2, 4, 8, 16, 24 and 32. Sixteen-bit pixels are the
//! 555 layout and expand to eight bits per channel with rounding;
//! 24- and 32-bit pixels swap from BGR(x) to RGB; the palette depths
//! stay packed exactly as stored, since the BMP bit packing matches the
//! PNG one. A negative height marks a top-down bitmap; bottom-up rows
//! are reversed while reading.

use log::warn;
use opng_core::ancillary::SignificantBits;
use opng_core::bytestream::ByteReader;
use opng_core::depth::row_bytes;
use opng_core::{BitDepth, InterlaceMethod, PngColor};

use crate::{ForeignImage, XternErrors};

const FILE_HEADER_SIZE: usize = 14;

/// Probe some bytes to see if they look like a BMP file.
pub fn probe_bmp(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && &bytes[..2] == b"BM"
}

/// A BMP importer over an in-memory file.
pub struct BmpDecoder<'a> {
    stream: ByteReader<'a>
}

impl<'a> BmpDecoder<'a> {
    pub fn new(data: &'a [u8]) -> BmpDecoder<'a> {
        BmpDecoder {
            stream: ByteReader::new(data)
        }
    }

    pub fn decode(mut self) -> Result<ForeignImage, XternErrors> {
        let err = |reason: String| XternErrors::Format("BMP", reason);

        if self.stream.get_bytes(2)? != b"BM" {
            return Err(err("missing BM signature".into()));
        }
        let _file_size = self.stream.get_u32_le()?;
        self.stream.skip(4); // reserved
        let data_offset = self.stream.get_u32_le()? as usize;

        let header_size = self.stream.get_u32_le()? as usize;
        let (width, height, pix_depth, top_down, compression, palette_entry_size);
        match header_size {
            12 | 16 => {
                // OS/2 core header: unsigned 16-bit dimensions, BGR
                // triples in the color table
                width = usize::from(self.stream.get_u16_le()?);
                height = usize::from(self.stream.get_u16_le()?);
                let _planes = self.stream.get_u16_le()?;
                pix_depth = usize::from(self.stream.get_u16_le()?);
                top_down = false;
                compression = 0;
                palette_entry_size = 3;
            }
            40 | 52 | 56 | 64 | 108 | 124 => {
                let raw_width = self.stream.get_u32_le()? as i32;
                let raw_height = self.stream.get_u32_le()? as i32;
                let _planes = self.stream.get_u16_le()?;
                pix_depth = usize::from(self.stream.get_u16_le()?);
                compression = self.stream.get_u32_le()?;
                if raw_width <= 0 {
                    return Err(err(format!("non-positive width {raw_width}")));
                }
                width = raw_width as usize;
                if raw_height < 0 {
                    top_down = true;
                    height = raw_height.unsigned_abs() as usize;
                } else if raw_height > 0 {
                    top_down = false;
                    height = raw_height as usize;
                } else {
                    return Err(err("zero height".into()));
                }
                palette_entry_size = 4;
            }
            other => return Err(err(format!("unsupported header size {other}")))
        }

        if width == 0 || height == 0 {
            return Err(err("zero dimensions".into()));
        }
        if compression != 0 {
            return Err(err(format!(
                "unsupported compression type {compression}, only BI_RGB can be converted"
            )));
        }
        if !matches!(pix_depth, 1 | 2 | 4 | 8 | 16 | 24 | 32) {
            return Err(err(format!("unsupported pixel depth {pix_depth}")));
        }

        // remaining info-header fields up to the color table
        let mut num_colors = 0usize;
        if header_size >= 40 {
            self.stream.skip(12); // size image, resolutions
            num_colors = self.stream.get_u32_le()? as usize;
            self.stream.skip(header_size - 36);
        } else {
            self.stream.skip(header_size - 12);
        }

        let mut palette = Vec::new();
        if pix_depth <= 8 {
            let max_colors = 1usize << pix_depth;
            if num_colors == 0 || num_colors > max_colors {
                num_colors = max_colors;
            }
            for _ in 0..num_colors {
                let entry = self.stream.get_bytes(palette_entry_size)?;
                // stored blue, green, red (and a pad byte in newer headers)
                palette.push([entry[2], entry[1], entry[0]]);
            }
        }

        if data_offset < FILE_HEADER_SIZE + header_size {
            return Err(err(format!("pixel data offset {data_offset} inside headers")));
        }
        self.stream.set_position(data_offset);

        // rows are dword aligned in the file
        let file_stride = (width * pix_depth + 31) / 32 * 4;
        let (color, depth, out_stride) = match pix_depth {
            1 | 2 | 4 | 8 => (
                PngColor::Palette,
                BitDepth::from_int(pix_depth as u8).unwrap(),
                row_bytes(width, pix_depth)
            ),
            _ => (PngColor::RGB, BitDepth::Eight, width * 3)
        };

        let mut rows = vec![vec![0u8; out_stride]; height];
        let mut warnings = 0usize;
        for i in 0..height {
            let y = if top_down { i } else { height - 1 - i };
            if !self.stream.has(file_stride) {
                warn!("BMP pixel data is truncated, remaining rows stay blank");
                warnings += 1;
                break;
            }
            let src = self.stream.get_bytes(file_stride)?;
            let dest = &mut rows[y];
            match pix_depth {
                1 | 2 | 4 | 8 => {
                    // the BMP bit packing is MSB first, exactly like PNG
                    dest.copy_from_slice(&src[..out_stride]);
                }
                16 => {
                    for x in 0..width {
                        let pixel = u16::from(src[2 * x]) | (u16::from(src[2 * x + 1]) << 8);
                        let r = u32::from((pixel >> 10) & 0x1f);
                        let g = u32::from((pixel >> 5) & 0x1f);
                        let b = u32::from(pixel & 0x1f);
                        dest[3 * x] = ((r * 255 + 15) / 31) as u8;
                        dest[3 * x + 1] = ((g * 255 + 15) / 31) as u8;
                        dest[3 * x + 2] = ((b * 255 + 15) / 31) as u8;
                    }
                }
                24 => {
                    for x in 0..width {
                        dest[3 * x] = src[3 * x + 2];
                        dest[3 * x + 1] = src[3 * x + 1];
                        dest[3 * x + 2] = src[3 * x];
                    }
                }
                32 => {
                    for x in 0..width {
                        dest[3 * x] = src[4 * x + 2];
                        dest[3 * x + 1] = src[4 * x + 1];
                        dest[3 * x + 2] = src[4 * x];
                    }
                }
                _ => unreachable!()
            }
        }

        if color.is_palette() && palette.is_empty() {
            return Err(err("palette image without a color table".into()));
        }

        // 555 pixels carry five significant bits per channel
        let sig_bits = (pix_depth == 16).then_some(SignificantBits {
            red: 5,
            green: 5,
            blue: 5,
            ..SignificantBits::default()
        });

        Ok(ForeignImage {
            width,
            height,
            depth,
            color,
            interlace: InterlaceMethod::Standard,
            rows,
            palette,
            transparent_index: None,
            sig_bits,
            format_name: "BMP",
            extra_images: 0,
            warnings
        })
    }
}
