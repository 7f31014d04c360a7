/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Minimal TIFF import.
//!
//! Uncompressed, chunky, non-paletted TIFFs only: one to four samples
//! per pixel at up to sixteen bits per sample, laid out in strips.
//! Min-is-white grayscale inverts at eight bits per sample. A second
//! IFD counts as an extra image so the session layer can demand
//! `-snip`.

use log::warn;
use opng_core::bytestream::ByteReader;
use opng_core::{BitDepth, InterlaceMethod, PngColor};

use crate::{ForeignImage, XternErrors};

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_ORIENTATION: u16 = 274;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_ROWS_PER_STRIP: u16 = 278;
const TAG_PLANAR_CONFIGURATION: u16 = 284;

/// Probe some bytes to see if they begin a TIFF file.
pub fn probe_tiff(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && (&bytes[..4] == b"II*\0" || &bytes[..4] == b"MM\0*")
}

/// A TIFF importer over an in-memory file.
pub struct TiffDecoder<'a> {
    data:          &'a [u8],
    little_endian: bool
}

#[derive(Default)]
struct TiffInfo {
    width:             usize,
    height:            usize,
    bits_per_sample:   u32,
    samples_per_pixel: u32,
    photometric:       u32,
    rows_per_strip:    usize,
    strip_offsets:     Vec<u64>
}

impl<'a> TiffDecoder<'a> {
    pub fn new(data: &'a [u8]) -> TiffDecoder<'a> {
        TiffDecoder {
            data,
            little_endian: data.starts_with(b"II")
        }
    }

    fn get_u16(&self, reader: &mut ByteReader) -> Result<u16, XternErrors> {
        Ok(if self.little_endian {
            reader.get_u16_le()?
        } else {
            reader.get_u16_be()?
        })
    }

    fn get_u32(&self, reader: &mut ByteReader) -> Result<u32, XternErrors> {
        Ok(if self.little_endian {
            reader.get_u32_le()?
        } else {
            reader.get_u32_be()?
        })
    }

    /// Read one value of an IFD entry's `field_type` at the cursor.
    fn get_value(
        &self, reader: &mut ByteReader, field_type: u16
    ) -> Result<u32, XternErrors> {
        match field_type {
            1 => Ok(u32::from(reader.get_u8()?)),          // BYTE
            3 => Ok(u32::from(self.get_u16(reader)?)),     // SHORT
            4 => self.get_u32(reader),                     // LONG
            other => Err(XternErrors::Format(
                "TIFF",
                format!("unsupported field type {other}")
            ))
        }
    }

    pub fn decode(self) -> Result<ForeignImage, XternErrors> {
        let err = |reason: String| XternErrors::Format("TIFF", reason);

        let mut reader = ByteReader::new(self.data);
        let magic = reader.get_bytes(4)?;
        if magic != b"II*\0" && magic != b"MM\0*" {
            return Err(err("missing TIFF magic".into()));
        }
        let ifd_offset = self.get_u32(&mut reader)? as usize;
        if ifd_offset < 8 {
            return Err(err(format!("invalid IFD offset {ifd_offset}")));
        }
        reader.set_position(ifd_offset);

        let mut info = TiffInfo {
            bits_per_sample: 1,
            samples_per_pixel: 1,
            rows_per_strip: usize::MAX,
            ..TiffInfo::default()
        };
        let mut warnings = 0usize;

        let entry_count = self.get_u16(&mut reader)?;
        for _ in 0..entry_count {
            let tag = self.get_u16(&mut reader)?;
            let field_type = self.get_u16(&mut reader)?;
            let count = self.get_u32(&mut reader)? as usize;
            // the value field is four bytes: either the value itself or
            // an offset to the out-of-line array
            let value_pos = reader.position();
            match tag {
                TAG_IMAGE_WIDTH => info.width = self.get_value(&mut reader, field_type)? as usize,
                TAG_IMAGE_LENGTH => {
                    info.height = self.get_value(&mut reader, field_type)? as usize
                }
                TAG_BITS_PER_SAMPLE => {
                    let values = self.read_values(field_type, count, value_pos)?;
                    if values.windows(2).any(|pair| pair[0] != pair[1]) {
                        return Err(err("unequal bits per sample across channels".into()));
                    }
                    info.bits_per_sample = values[0];
                }
                TAG_COMPRESSION => {
                    let compression = self.get_value(&mut reader, field_type)?;
                    if compression != 1 {
                        return Err(err(format!(
                            "unsupported compression {compression}, only uncompressed \
                             TIFF can be converted"
                        )));
                    }
                }
                TAG_PHOTOMETRIC => {
                    info.photometric = self.get_value(&mut reader, field_type)?
                }
                TAG_STRIP_OFFSETS => {
                    info.strip_offsets = self
                        .read_values(field_type, count, value_pos)?
                        .into_iter()
                        .map(u64::from)
                        .collect();
                }
                TAG_ORIENTATION => {
                    let orientation = self.get_value(&mut reader, field_type)?;
                    if orientation != 1 {
                        return Err(err(format!("unsupported orientation {orientation}")));
                    }
                }
                TAG_SAMPLES_PER_PIXEL => {
                    info.samples_per_pixel = self.get_value(&mut reader, field_type)?
                }
                TAG_ROWS_PER_STRIP => {
                    info.rows_per_strip = self.get_value(&mut reader, field_type)? as usize
                }
                TAG_PLANAR_CONFIGURATION => {
                    let planar = self.get_value(&mut reader, field_type)?;
                    if planar != 1 {
                        return Err(err("planar sample layout is not supported".into()));
                    }
                }
                _ => {} // StripByteCounts and metadata tags are ignored
            }
            reader.set_position(value_pos + 4);
        }
        let next_ifd = self.get_u32(&mut reader)?;
        let extra_images = usize::from(next_ifd != 0);
        if extra_images > 0 {
            warn!("multi-page TIFF, only the first page is converted");
            warnings += 1;
        }

        self.read_pixels(info, extra_images, warnings)
    }

    /// Read a `count`-element value array, possibly out of line.
    fn read_values(
        &self, field_type: u16, count: usize, value_pos: usize
    ) -> Result<Vec<u32>, XternErrors> {
        let type_size = match field_type {
            1 => 1,
            3 => 2,
            4 => 4,
            other => {
                return Err(XternErrors::Format(
                    "TIFF",
                    format!("unsupported field type {other}")
                ))
            }
        };
        let mut reader = ByteReader::new(self.data);
        if count * type_size <= 4 {
            reader.set_position(value_pos);
        } else {
            let mut offset_reader = ByteReader::new(self.data);
            offset_reader.set_position(value_pos);
            reader.set_position(self.get_u32(&mut offset_reader)? as usize);
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.get_value(&mut reader, field_type)?);
        }
        if values.is_empty() {
            return Err(XternErrors::Format("TIFF", "empty value array".into()));
        }
        Ok(values)
    }

    fn read_pixels(
        &self, info: TiffInfo, extra_images: usize, mut warnings: usize
    ) -> Result<ForeignImage, XternErrors> {
        let err = |reason: String| XternErrors::Format("TIFF", reason);

        if info.width == 0 || info.height == 0 {
            return Err(err("zero dimensions".into()));
        }
        if info.strip_offsets.is_empty() {
            return Err(err("missing strip offsets".into()));
        }
        let color = match info.samples_per_pixel {
            1 => PngColor::Luma,
            2 => PngColor::LumaA,
            3 => PngColor::RGB,
            4 => PngColor::RGBA,
            other => return Err(err(format!("unsupported color space ({other} samples)")))
        };
        if info.photometric > 2 {
            return Err(err(format!(
                "unsupported photometric interpretation {}",
                info.photometric
            )));
        }
        let bits = info.bits_per_sample;
        if bits == 0 || bits > 16 {
            return Err(err(format!("unsupported sample depth {bits}")));
        }
        if bits < 8 && info.samples_per_pixel != 1 {
            return Err(err("packed sub-byte samples with multiple channels".into()));
        }

        let depth = if bits > 8 { BitDepth::Sixteen } else { BitDepth::Eight };
        let spp = info.samples_per_pixel as usize;
        let row_samples = spp * info.width;
        let sample_max = (1u32 << bits) - 1;
        let invert = info.photometric == 0 && bits <= 8;

        // bytes one source row occupies inside a strip
        let src_stride = (row_samples * bits as usize + 7) / 8;
        let rows_per_strip = info.rows_per_strip.max(1);

        let mut rows = Vec::with_capacity(info.height);
        let mut overflow = false;

        for y in 0..info.height {
            let strip = y / rows_per_strip;
            let row_in_strip = y % rows_per_strip;
            let offset = *info
                .strip_offsets
                .get(strip)
                .ok_or_else(|| err(format!("missing strip {strip}")))?
                as usize;
            let start = offset + row_in_strip * src_stride;
            if start + src_stride > self.data.len() {
                return Err(XternErrors::Truncated(opng_core::bytestream::NotEnoughBytes {
                    requested: start + src_stride,
                    available: self.data.len()
                }));
            }
            let src = &self.data[start..start + src_stride];

            let mut row = vec![0u8; row_samples * depth.to_int() as usize / 8];
            if bits == 8 {
                row.copy_from_slice(src);
                if invert {
                    for byte in row.iter_mut() {
                        *byte = 255 - *byte;
                    }
                }
            } else if bits < 8 {
                for i in 0..row_samples {
                    let bit_pos = i * bits as usize;
                    let shift = 8 - bits as usize - (bit_pos & 7);
                    let mut v = u32::from((src[bit_pos >> 3] >> shift) & sample_max as u8);
                    if v > sample_max {
                        v = sample_max;
                        overflow = true;
                    }
                    let mut scaled = ((v * 255 + sample_max / 2) / sample_max) as u8;
                    if invert {
                        scaled = 255 - scaled;
                    }
                    row[i] = scaled;
                }
            } else {
                // sixteen bits, byte order per the header, normalized to
                // the PNG big-endian layout
                for i in 0..row_samples {
                    let raw = [src[2 * i], src[2 * i + 1]];
                    let mut v = u32::from(if self.little_endian {
                        u16::from_le_bytes(raw)
                    } else {
                        u16::from_be_bytes(raw)
                    });
                    if bits < 16 {
                        if v > sample_max {
                            v = sample_max;
                            overflow = true;
                        }
                        v = (v * 65535 + sample_max / 2) / sample_max;
                    }
                    row[2 * i..2 * i + 2].copy_from_slice(&(v as u16).to_be_bytes());
                }
            }
            rows.push(row);
        }

        if overflow {
            warn!("overflow in TIFF samples");
            warnings += 1;
        }

        Ok(ForeignImage {
            width: info.width,
            height: info.height,
            depth,
            color,
            interlace: InterlaceMethod::Standard,
            rows,
            palette: Vec::new(),
            transparent_index: None,
            sig_bits: None,
            format_name: "TIFF",
            extra_images,
            warnings
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a little-endian TIFF with one uncompressed strip.
    fn make_tiff(width: u32, height: u32, spp: u16, bits: u16, pixels: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"II*\0");
        out.extend_from_slice(&8u32.to_le_bytes()); // IFD at 8

        let entries: &[(u16, u16, u32, u32)] = &[
            (TAG_IMAGE_WIDTH, 4, 1, width),
            (TAG_IMAGE_LENGTH, 4, 1, height),
            (TAG_BITS_PER_SAMPLE, 3, 1, u32::from(bits)),
            (TAG_COMPRESSION, 3, 1, 1),
            (TAG_PHOTOMETRIC, 3, 1, if spp >= 3 { 2 } else { 1 }),
            (TAG_STRIP_OFFSETS, 4, 1, 0), // patched below
            (TAG_SAMPLES_PER_PIXEL, 3, 1, u32::from(spp)),
            (TAG_ROWS_PER_STRIP, 4, 1, height)
        ];
        let ifd_size = 2 + entries.len() * 12 + 4;
        let data_offset = (8 + ifd_size) as u32;

        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for &(tag, field_type, count, value) in entries {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&field_type.to_le_bytes());
            out.extend_from_slice(&count.to_le_bytes());
            let value = if tag == TAG_STRIP_OFFSETS { data_offset } else { value };
            if field_type == 3 {
                out.extend_from_slice(&(value as u16).to_le_bytes());
                out.extend_from_slice(&0u16.to_le_bytes());
            } else {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        out.extend_from_slice(&0u32.to_le_bytes()); // no next IFD
        out.extend_from_slice(pixels);
        out
    }

    #[test]
    fn rgb_eight_bit_decodes() {
        let tiff = make_tiff(2, 1, 3, 8, &[1, 2, 3, 4, 5, 6]);
        let image = TiffDecoder::new(&tiff).decode().unwrap();
        assert_eq!(image.color, PngColor::RGB);
        assert_eq!(image.rows[0], vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(image.extra_images, 0);
    }

    #[test]
    fn min_is_white_inverts_gray() {
        let mut tiff = make_tiff(2, 1, 1, 8, &[0, 255]);
        // patch photometric to zero (min is white)
        // entry 5 (0-based 4) value at 8 + 2 + 4*12 + 8
        let pos = 8 + 2 + 4 * 12 + 8;
        tiff[pos] = 0;
        let image = TiffDecoder::new(&tiff).decode().unwrap();
        assert_eq!(image.rows[0], vec![255, 0]);
    }

    #[test]
    fn sixteen_bit_swaps_to_big_endian() {
        let tiff = make_tiff(1, 1, 1, 16, &[0x34, 0x12]);
        let image = TiffDecoder::new(&tiff).decode().unwrap();
        assert_eq!(image.depth, BitDepth::Sixteen);
        assert_eq!(image.rows[0], vec![0x12, 0x34]);
    }

    #[test]
    fn gray_alpha_maps_to_luma_alpha() {
        let tiff = make_tiff(1, 1, 2, 8, &[100, 200]);
        let image = TiffDecoder::new(&tiff).decode().unwrap();
        assert_eq!(image.color, PngColor::LumaA);
    }

    #[test]
    fn compressed_tiffs_are_rejected() {
        let mut tiff = make_tiff(1, 1, 1, 8, &[0]);
        // compression entry value: entry index 3, value at 8 + 2 + 3*12 + 8
        let pos = 8 + 2 + 3 * 12 + 8;
        tiff[pos] = 5; // LZW
        assert!(TiffDecoder::new(&tiff).decode().is_err());
    }
}
