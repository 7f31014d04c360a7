/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! PNG decoding into packed rows.
//!
//! The decoder deliberately does *not* expand anything: rows come out at
//! the stored bit depth, palette indices stay indices, and tRNS stays a
//! separate record. The optimizer needs the exact representation the
//! file uses, because the reductions reason about it byte for byte.
//!
//! Recoverable problems (bad chunk CRCs, a missing IEND, a truncated
//! final chunk) are recorded in [`DecodeEvents::has_errors`] and decoding
//! continues; the session layer decides whether `-fix` permits using the
//! result. A broken zlib stream or missing critical chunk is fatal.

use log::warn;
use opng_core::ancillary::{
    Background, ChunkLocation, SignificantBits, Transparency, UnknownChunk
};
use opng_core::bytestream::ByteReader;
use opng_core::chunk::{self, ChunkName};
use opng_core::depth::row_bytes;
use opng_core::{BitDepth, InterlaceMethod, PngColor};

use crate::adam7;
use crate::crc::calc_crc;
use crate::error::PngDecodeErrors;
use crate::filters::unfilter_row;
use crate::{filter_bpp, pixel_bits, probe_png, probe_png_datastream, PNG_CHUNK_MAX};

/// Facts the decoder observed about the datastream, beyond the image
/// itself. The session layer folds these into its status flags.
#[derive(Clone, Copy, Debug, Default)]
pub struct DecodeEvents {
    /// The stream began with the eight-byte PNG signature.
    pub has_signature: bool,
    /// Total payload bytes across all IDAT chunks.
    pub idat_size: u64,
    /// PLTE and tRNS sizes including the twelve bytes of per-chunk
    /// overhead, as found in the input.
    pub plte_trns_size: u64,
    /// More than one IDAT chunk was present.
    pub split_idats: bool,
    pub has_digital_signature: bool,
    /// Any of acTL / fcTL / fdAT was present.
    pub has_apng: bool,
    /// fdAT frames make the stream a multi-image file.
    pub has_multiple_images: bool,
    /// Recoverable errors were found and worked around.
    pub has_errors: bool
}

/// A decoded PNG: the §3 data model in its raw, codec-level form.
pub struct RawPng {
    pub width:     usize,
    pub height:    usize,
    pub depth:     BitDepth,
    pub color:     PngColor,
    pub interlace: InterlaceMethod,
    /// Packed rows at the native bit depth, deinterlaced.
    pub rows:      Vec<Vec<u8>>,
    pub palette:   Vec<[u8; 3]>,
    pub trans:      Option<Transparency>,
    pub background: Option<Background>,
    pub hist:       Option<Vec<u16>>,
    pub sig_bits:   Option<SignificantBits>,
    pub unknown:    Vec<UnknownChunk>,
    pub events:     DecodeEvents
}

/// A PNG decoder over an in-memory datastream.
pub struct PngDecoder<'a> {
    stream:    ByteReader<'a>,
    events:    DecodeEvents,
    seen_ihdr: bool,
    seen_plte: bool,
    seen_idat: bool,
    seen_iend: bool,
    width:     usize,
    height:    usize,
    depth:     BitDepth,
    color:     PngColor,
    interlace: InterlaceMethod,
    palette:   Vec<[u8; 3]>,
    trans:      Option<Transparency>,
    background: Option<Background>,
    hist:       Option<Vec<u16>>,
    sig_bits:   Option<SignificantBits>,
    unknown:    Vec<UnknownChunk>,
    idat:       Vec<u8>
}

impl<'a> PngDecoder<'a> {
    pub fn new(data: &'a [u8]) -> PngDecoder<'a> {
        PngDecoder {
            stream:    ByteReader::new(data),
            events:    DecodeEvents::default(),
            seen_ihdr: false,
            seen_plte: false,
            seen_idat: false,
            seen_iend: false,
            width:     0,
            height:    0,
            depth:     BitDepth::Eight,
            color:     PngColor::Luma,
            interlace: InterlaceMethod::Standard,
            palette:   Vec::new(),
            trans:      None,
            background: None,
            hist:       None,
            sig_bits:   None,
            unknown:    Vec::new(),
            idat:       Vec::new()
        }
    }

    /// Decode the whole datastream.
    pub fn decode(mut self) -> Result<RawPng, PngDecodeErrors> {
        if probe_png(self.stream.peek_at(0, 8).unwrap_or(&[])) {
            self.stream.skip(8);
            self.events.has_signature = true;
        } else if !probe_png_datastream(self.stream.peek_at(0, 8).unwrap_or(&[])) {
            return Err(PngDecodeErrors::BadSignature);
        }

        self.read_chunks()?;

        if !self.seen_ihdr {
            return Err(PngDecodeErrors::MissingChunk("IHDR"));
        }
        if self.color.is_palette() && self.palette.is_empty() {
            return Err(PngDecodeErrors::MissingChunk("PLTE"));
        }
        if !self.seen_idat || self.idat.is_empty() {
            return Err(PngDecodeErrors::MissingChunk("IDAT"));
        }
        if !self.seen_iend {
            warn!("missing IEND, the input is truncated");
            self.events.has_errors = true;
        }

        let rows = self.decompress_rows()?;

        Ok(RawPng {
            width:      self.width,
            height:     self.height,
            depth:      self.depth,
            color:      self.color,
            interlace:  self.interlace,
            rows,
            palette:    self.palette,
            trans:      self.trans,
            background: self.background,
            hist:       self.hist,
            sig_bits:   self.sig_bits,
            unknown:    self.unknown,
            events:     self.events
        })
    }

    fn read_chunks(&mut self) -> Result<(), PngDecodeErrors> {
        while !self.seen_iend && !self.stream.eof() {
            if !self.stream.has(8) {
                warn!("trailing bytes where a chunk header was expected");
                self.events.has_errors = true;
                break;
            }
            let length = self.stream.get_u32_be()? as usize;
            let name = ChunkName(self.stream.get_bytes(4)?.try_into().unwrap());
            if length as u32 > PNG_CHUNK_MAX {
                return Err(PngDecodeErrors::BadChunkLength(name, length as u32));
            }
            if !name.is_well_formed() {
                return Err(PngDecodeErrors::Generic(format!(
                    "ill-formed chunk name {name:?}"
                )));
            }

            if !self.stream.has(length + 4) {
                // premature EOF inside a chunk; salvage what is there
                warn!("chunk {name:?} is truncated");
                self.events.has_errors = true;
                if name == chunk::IDAT {
                    let avail = self.stream.remaining();
                    let data = self.stream.get_bytes(avail)?;
                    self.events.idat_size += data.len() as u64;
                    self.idat.extend_from_slice(data);
                }
                break;
            }

            let data = self.stream.get_bytes(length)?;
            let stored_crc = self.stream.get_u32_be()?;

            let mut crc_input = Vec::with_capacity(4 + data.len());
            crc_input.extend_from_slice(&name.0);
            crc_input.extend_from_slice(data);
            if calc_crc(&crc_input) != stored_crc {
                warn!("bad CRC on chunk {name:?}");
                self.events.has_errors = true;
            }

            self.handle_chunk(name, data)?;
        }
        Ok(())
    }

    fn handle_chunk(&mut self, name: ChunkName, data: &[u8]) -> Result<(), PngDecodeErrors> {
        if !self.seen_ihdr && name != chunk::IHDR {
            return Err(PngDecodeErrors::MissingChunk("IHDR"));
        }
        match name {
            chunk::IHDR => self.parse_ihdr(data)?,
            chunk::PLTE => self.parse_plte(data)?,
            chunk::IDAT => {
                if self.seen_idat {
                    self.events.split_idats = true;
                }
                self.seen_idat = true;
                self.events.idat_size += data.len() as u64;
                self.idat.extend_from_slice(data);
            }
            chunk::IEND => self.seen_iend = true,
            chunk::TRNS => self.parse_trns(data)?,
            chunk::BKGD => self.parse_bkgd(data)?,
            chunk::HIST => self.parse_hist(data)?,
            chunk::SBIT => self.parse_sbit(data)?,
            other => {
                if other.is_critical() {
                    return Err(PngDecodeErrors::Generic(format!(
                        "unknown critical chunk {other:?}"
                    )));
                }
                if other.is_digital_signature() {
                    self.events.has_digital_signature = true;
                }
                if other.is_apng() {
                    self.events.has_apng = true;
                    if other == chunk::FDAT {
                        self.events.has_multiple_images = true;
                    }
                }
                let location = if self.seen_idat {
                    ChunkLocation::AfterIdat
                } else if self.seen_plte {
                    ChunkLocation::BeforeIdat
                } else {
                    ChunkLocation::BeforePlte
                };
                self.unknown.push(UnknownChunk {
                    name: other,
                    location,
                    data: data.to_vec()
                });
            }
        }
        Ok(())
    }

    fn parse_ihdr(&mut self, data: &[u8]) -> Result<(), PngDecodeErrors> {
        if self.seen_ihdr {
            return Err(PngDecodeErrors::BadIhdr("duplicate IHDR".into()));
        }
        if data.len() != 13 {
            return Err(PngDecodeErrors::BadIhdr(format!(
                "length {} instead of 13",
                data.len()
            )));
        }
        let mut reader = ByteReader::new(data);
        let width = reader.get_u32_be()?;
        let height = reader.get_u32_be()?;
        if width == 0 || height == 0 || width > PNG_CHUNK_MAX || height > PNG_CHUNK_MAX {
            return Err(PngDecodeErrors::BadIhdr(format!(
                "impossible dimensions {width}x{height}"
            )));
        }
        let depth_int = reader.get_u8()?;
        let color_int = reader.get_u8()?;
        let depth = BitDepth::from_int(depth_int)
            .ok_or_else(|| PngDecodeErrors::BadIhdr(format!("bad bit depth {depth_int}")))?;
        let color = PngColor::from_int(color_int)
            .ok_or_else(|| PngDecodeErrors::BadIhdr(format!("bad color type {color_int}")))?;
        if !color.allows_depth(depth) {
            return Err(PngDecodeErrors::BadIhdr(format!(
                "depth {depth_int} is not allowed for color type {color_int}"
            )));
        }
        if reader.get_u8()? != 0 {
            return Err(PngDecodeErrors::BadIhdr("unknown compression method".into()));
        }
        if reader.get_u8()? != 0 {
            return Err(PngDecodeErrors::BadIhdr("unknown filter method".into()));
        }
        let interlace_int = reader.get_u8()?;
        let interlace = InterlaceMethod::from_int(interlace_int).ok_or_else(|| {
            PngDecodeErrors::BadIhdr(format!("unknown interlace method {interlace_int}"))
        })?;

        self.width = width as usize;
        self.height = height as usize;
        self.depth = depth;
        self.color = color;
        self.interlace = interlace;
        self.seen_ihdr = true;
        Ok(())
    }

    fn parse_plte(&mut self, data: &[u8]) -> Result<(), PngDecodeErrors> {
        if self.seen_idat {
            warn!("PLTE after IDAT, ignoring");
            self.events.has_errors = true;
            return Ok(());
        }
        if data.is_empty() || data.len() % 3 != 0 || data.len() > 256 * 3 {
            return Err(PngDecodeErrors::Generic(format!(
                "invalid PLTE length {}",
                data.len()
            )));
        }
        self.palette = data.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
        self.seen_plte = true;
        self.events.plte_trns_size += data.len() as u64 + 12;
        Ok(())
    }

    fn parse_trns(&mut self, data: &[u8]) -> Result<(), PngDecodeErrors> {
        self.events.plte_trns_size += data.len() as u64 + 12;
        let mut reader = ByteReader::new(data);
        self.trans = Some(match self.color {
            PngColor::Palette => {
                let mut alphas = data.to_vec();
                if alphas.len() > self.palette.len() {
                    warn!("too many alpha values in tRNS, truncating");
                    self.events.has_errors = true;
                    alphas.truncate(self.palette.len());
                }
                if alphas.is_empty() {
                    warn!("empty tRNS, dropping");
                    self.events.has_errors = true;
                    return Ok(());
                }
                Transparency::Alpha(alphas)
            }
            PngColor::Luma => Transparency::GrayKey(reader.get_u16_be()?),
            PngColor::RGB => Transparency::RgbKey(
                reader.get_u16_be()?,
                reader.get_u16_be()?,
                reader.get_u16_be()?
            ),
            PngColor::LumaA | PngColor::RGBA => {
                return Err(PngDecodeErrors::GenericStatic(
                    "tRNS is not allowed for images with an alpha channel"
                ))
            }
        });
        Ok(())
    }

    fn parse_bkgd(&mut self, data: &[u8]) -> Result<(), PngDecodeErrors> {
        let mut reader = ByteReader::new(data);
        self.background = Some(match self.color {
            PngColor::Palette => Background::PaletteIndex(reader.get_u8()?),
            PngColor::Luma | PngColor::LumaA => Background::Gray(reader.get_u16_be()?),
            PngColor::RGB | PngColor::RGBA => Background::Rgb(
                reader.get_u16_be()?,
                reader.get_u16_be()?,
                reader.get_u16_be()?
            )
        });
        Ok(())
    }

    fn parse_hist(&mut self, data: &[u8]) -> Result<(), PngDecodeErrors> {
        if !self.seen_plte || data.len() != self.palette.len() * 2 {
            warn!("hIST length does not match the palette, dropping");
            self.events.has_errors = true;
            return Ok(());
        }
        self.hist = Some(
            data.chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect()
        );
        Ok(())
    }

    fn parse_sbit(&mut self, data: &[u8]) -> Result<(), PngDecodeErrors> {
        let mut bits = SignificantBits::default();
        let mut reader = ByteReader::new(data);
        match self.color {
            PngColor::Luma => bits.gray = reader.get_u8()?,
            PngColor::LumaA => {
                bits.gray = reader.get_u8()?;
                bits.alpha = reader.get_u8()?;
            }
            PngColor::RGB | PngColor::Palette => {
                bits.red = reader.get_u8()?;
                bits.green = reader.get_u8()?;
                bits.blue = reader.get_u8()?;
            }
            PngColor::RGBA => {
                bits.red = reader.get_u8()?;
                bits.green = reader.get_u8()?;
                bits.blue = reader.get_u8()?;
                bits.alpha = reader.get_u8()?;
            }
        }
        self.sig_bits = Some(bits);
        Ok(())
    }

    /// Inflate the joined IDAT payload and reconstruct the rows.
    fn decompress_rows(&mut self) -> Result<Vec<Vec<u8>>, PngDecodeErrors> {
        let mut inflated = zune_inflate::DeflateDecoder::new(&self.idat)
            .decode_zlib()
            .map_err(|e| PngDecodeErrors::Inflate(format!("{e:?}")))?;

        let bits = pixel_bits(self.color, self.depth);
        let expected = self.filtered_size(bits);
        if inflated.len() < expected {
            warn!(
                "IDAT inflates to {} bytes where {} were expected; missing rows stay blank",
                inflated.len(),
                expected
            );
            self.events.has_errors = true;
            inflated.resize(expected, 0);
        } else if inflated.len() > expected {
            warn!("IDAT holds {} extra bytes", inflated.len() - expected);
            self.events.has_errors = true;
            inflated.truncate(expected);
        }

        let stride = row_bytes(self.width, bits);
        let mut rows = vec![vec![0u8; stride]; self.height];
        let bpp = filter_bpp(self.color, self.depth);

        match self.interlace {
            InterlaceMethod::Standard => {
                let mut offset = 0;
                let mut prev_row: Vec<u8> = Vec::new();
                for (y, row) in rows.iter_mut().enumerate() {
                    let filter = inflated[offset];
                    row.copy_from_slice(&inflated[offset + 1..offset + 1 + stride]);
                    let prev = (y > 0).then_some(prev_row.as_slice());
                    unfilter_row(filter, bpp, prev, row).map_err(PngDecodeErrors::from)?;
                    prev_row.clear();
                    prev_row.extend_from_slice(row);
                    offset += 1 + stride;
                }
            }
            InterlaceMethod::Adam7 => {
                let mut offset = 0;
                for pass in 0..7 {
                    let (pw, ph) = adam7::pass_dimensions(pass, self.width, self.height);
                    if pw == 0 || ph == 0 {
                        continue;
                    }
                    let pass_stride = row_bytes(pw, bits);
                    let (x0, dx, y0, dy) = adam7::PASSES[pass];
                    let mut prev_buf: Option<Vec<u8>> = None;
                    for r in 0..ph {
                        let filter = inflated[offset];
                        let mut pass_row =
                            inflated[offset + 1..offset + 1 + pass_stride].to_vec();
                        unfilter_row(filter, bpp, prev_buf.as_deref(), &mut pass_row)
                            .map_err(PngDecodeErrors::from)?;
                        offset += 1 + pass_stride;

                        let y = y0 + r * dy;
                        for i in 0..pw {
                            adam7::copy_pixel(&pass_row, i, &mut rows[y], x0 + i * dx, bits);
                        }
                        prev_buf = Some(pass_row);
                    }
                }
            }
        }

        Ok(rows)
    }

    /// Size of the filtered (pre-compression) image data for the current
    /// header, including the per-row filter bytes.
    fn filtered_size(&self, bits: usize) -> usize {
        match self.interlace {
            InterlaceMethod::Standard => (1 + row_bytes(self.width, bits)) * self.height,
            InterlaceMethod::Adam7 => (0..7)
                .map(|pass| {
                    let (pw, ph) = adam7::pass_dimensions(pass, self.width, self.height);
                    if pw == 0 || ph == 0 {
                        0
                    } else {
                        (1 + row_bytes(pw, bits)) * ph
                    }
                })
                .sum()
        }
    }
}
