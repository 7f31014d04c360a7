/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! PNG encoding with exactly one IDAT chunk.
//!
//! The awkward part of writing a joined IDAT is that its length field
//! comes first in the stream but its value is only known once all the
//! compression is done. The encoder therefore writes the length from a
//! caller-provided expected size (the trial engine knows it from the
//! winning trial), and if the actual size turns out different it seeks
//! back and corrects the field. A sink that cannot seek and had no
//! correct expected size is an error: callers must run a trial first.
//!
//! In trial mode ([`Sink::Discard`]) no bytes are produced at all; the
//! encoder filters and compresses the image, reports the exact IDAT
//! size, and gives up early once the running size exceeds the caller's
//! limit.

use std::io::{Seek, SeekFrom, Write};

use opng_core::ancillary::{
    Background, ChunkLocation, SignificantBits, Transparency, UnknownChunk
};
use opng_core::chunk::{self, ChunkName};
use opng_core::depth::row_bytes;
use opng_core::{BitDepth, InterlaceMethod, PngColor};

use crate::adam7;
use crate::crc::{calc_crc, Crc32};
use crate::deflate::{Deflater, Flow, ZlibOptions};
use crate::error::PngEncodeErrors;
use crate::filters::{choose_filter, filter_row, FILTER_ADAPTIVE};
use crate::{filter_bpp, pixel_bits, PNG_CHUNK_MAX, PNG_SIGNATURE};

/// A writable and seekable output.
pub trait WriteSeek: Write + Seek {}
impl<T: Write + Seek> WriteSeek for T {}

/// Where encoded bytes go.
pub enum Sink<'a> {
    /// Produce nothing; measure the IDAT (a trial).
    Discard,
    /// A seekable output; the IDAT length can be corrected in place.
    Seekable(&'a mut dyn WriteSeek),
    /// A write-only output such as stdout; the IDAT length must be known
    /// in advance.
    Stream(&'a mut dyn Write)
}

/// A borrowed view of the image to encode.
#[derive(Copy, Clone)]
pub struct EncoderImage<'a> {
    pub width:      usize,
    pub height:     usize,
    pub depth:      BitDepth,
    pub color:      PngColor,
    pub interlace:  InterlaceMethod,
    pub rows:       &'a [Vec<u8>],
    pub palette:    &'a [[u8; 3]],
    pub trans:      Option<&'a Transparency>,
    pub background: Option<Background>,
    pub hist:       Option<&'a [u16]>,
    pub sig_bits:   Option<SignificantBits>,
    pub unknown:    &'a [UnknownChunk]
}

/// One point of the trial grid: a row filter plus zlib parameters.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EncodeParams {
    /// `0..=4` force that filter on every row; `5` chooses per row.
    pub filter: u8,
    pub zlib:   ZlibOptions
}

/// What one encoding produced.
#[derive(Copy, Clone, Debug, Default)]
pub struct EncodeOutcome {
    /// Exact joined-IDAT payload size. Meaningless when `abandoned`.
    pub idat_size:      u64,
    /// PLTE + tRNS sizes including per-chunk overhead, as they would be
    /// written under the current strip predicate.
    pub plte_trns_size: u64,
    /// Bytes actually written to the sink (zero for trials).
    pub bytes_written:  u64,
    /// The trial ran past the size limit and was cut short.
    pub abandoned:      bool
}

/// The single-IDAT PNG encoder.
pub struct PngEncoder<'a> {
    image:         EncoderImage<'a>,
    params:        EncodeParams,
    strip:         Option<&'a dyn Fn(ChunkName) -> bool>,
    expected_idat: Option<u64>,
    max_idat:      u64
}

impl<'a> PngEncoder<'a> {
    pub fn new(image: EncoderImage<'a>, params: EncodeParams) -> PngEncoder<'a> {
        PngEncoder {
            image,
            params,
            strip: None,
            expected_idat: None,
            max_idat: u64::MAX
        }
    }

    /// Install the chunk strip predicate. A chunk for which the
    /// predicate returns `true` is not written.
    pub fn set_strip_predicate(&mut self, strip: &'a dyn Fn(ChunkName) -> bool) {
        self.strip = Some(strip);
    }

    /// Pre-declare the joined IDAT size, avoiding the length back-patch.
    pub fn set_expected_idat_size(&mut self, size: u64) {
        self.expected_idat = Some(size);
    }

    /// Abandon a trial once the running IDAT size exceeds `limit`.
    pub fn set_max_idat_size(&mut self, limit: u64) {
        self.max_idat = limit;
    }

    fn stripped(&self, name: ChunkName) -> bool {
        match self.strip {
            Some(predicate) => predicate(name),
            None => false
        }
    }

    fn trns_payload(trans: &Transparency) -> Vec<u8> {
        match trans {
            Transparency::Alpha(alphas) => alphas.clone(),
            Transparency::GrayKey(gray) => gray.to_be_bytes().to_vec(),
            Transparency::RgbKey(r, g, b) => {
                let mut out = Vec::with_capacity(6);
                out.extend_from_slice(&r.to_be_bytes());
                out.extend_from_slice(&g.to_be_bytes());
                out.extend_from_slice(&b.to_be_bytes());
                out
            }
        }
    }

    /// PLTE is only legal for the colored types; a leftover suggested
    /// palette on a grayscale image is not written.
    fn writes_plte(&self) -> bool {
        !self.image.palette.is_empty() && self.image.color.has_color()
    }

    fn plte_trns_size(&self) -> u64 {
        let mut size = 0u64;
        if self.writes_plte() {
            size += self.image.palette.len() as u64 * 3 + 12;
        }
        if let Some(trans) = self.image.trans {
            size += Self::trns_payload(trans).len() as u64 + 12;
        }
        size
    }

    /// Run the encoding against `sink`.
    pub fn encode(&self, sink: Sink) -> Result<EncodeOutcome, PngEncodeErrors> {
        match sink {
            Sink::Discard => self.encode_trial(),
            Sink::Seekable(out) => self.encode_stream(Out::seekable(out)),
            Sink::Stream(out) => self.encode_stream(Out::plain(out))
        }
    }

    fn encode_trial(&self) -> Result<EncodeOutcome, PngEncodeErrors> {
        let mut idat_size = 0u64;
        let max = self.max_idat;
        let mut sink = |bytes: &[u8]| {
            idat_size += bytes.len() as u64;
            Ok(if idat_size > max { Flow::Abandon } else { Flow::Continue })
        };
        let flow = self.compress_idat(&mut sink)?;
        Ok(EncodeOutcome {
            idat_size,
            plte_trns_size: self.plte_trns_size(),
            bytes_written: 0,
            abandoned: flow == Flow::Abandon
        })
    }

    fn encode_stream(&self, mut out: Out) -> Result<EncodeOutcome, PngEncodeErrors> {
        let image = &self.image;

        out.write_all(&PNG_SIGNATURE)?;
        out.write_chunk(chunk::IHDR, &self.ihdr_payload())?;

        self.write_unknown(&mut out, ChunkLocation::BeforePlte)?;

        if let Some(bits) = image.sig_bits {
            if !self.stripped(chunk::SBIT) {
                out.write_chunk(chunk::SBIT, &self.sbit_payload(&bits))?;
            }
        }
        if self.writes_plte() {
            let mut payload = Vec::with_capacity(image.palette.len() * 3);
            for entry in image.palette {
                payload.extend_from_slice(entry);
            }
            out.write_chunk(chunk::PLTE, &payload)?;
        }
        if let Some(trans) = image.trans {
            out.write_chunk(chunk::TRNS, &Self::trns_payload(trans))?;
        }
        if let Some(background) = image.background {
            if !self.stripped(chunk::BKGD) {
                out.write_chunk(chunk::BKGD, &self.bkgd_payload(&background))?;
            }
        }
        if let Some(hist) = image.hist {
            if !self.stripped(chunk::HIST) {
                let mut payload = Vec::with_capacity(hist.len() * 2);
                for &freq in hist {
                    payload.extend_from_slice(&freq.to_be_bytes());
                }
                out.write_chunk(chunk::HIST, &payload)?;
            }
        }
        self.write_unknown(&mut out, ChunkLocation::BeforeIdat)?;

        let idat_size = self.write_idat(&mut out)?;

        self.write_unknown(&mut out, ChunkLocation::AfterIdat)?;
        out.write_chunk(chunk::IEND, &[])?;

        Ok(EncodeOutcome {
            idat_size,
            plte_trns_size: self.plte_trns_size(),
            bytes_written: out.written(),
            abandoned: false
        })
    }

    fn write_unknown(&self, out: &mut Out, location: ChunkLocation) -> Result<(), PngEncodeErrors> {
        for chunk in self.image.unknown {
            if chunk.location == location && !self.stripped(chunk.name) {
                out.write_chunk(chunk.name, &chunk.data)?;
            }
        }
        Ok(())
    }

    fn ihdr_payload(&self) -> [u8; 13] {
        let image = &self.image;
        let mut payload = [0u8; 13];
        payload[0..4].copy_from_slice(&(image.width as u32).to_be_bytes());
        payload[4..8].copy_from_slice(&(image.height as u32).to_be_bytes());
        payload[8] = image.depth.to_int();
        payload[9] = image.color.to_int();
        payload[10] = 0; // compression: deflate
        payload[11] = 0; // filter method: adaptive
        payload[12] = image.interlace.to_int();
        payload
    }

    fn sbit_payload(&self, bits: &SignificantBits) -> Vec<u8> {
        match self.image.color {
            PngColor::Luma => vec![bits.gray],
            PngColor::LumaA => vec![bits.gray, bits.alpha],
            PngColor::RGB | PngColor::Palette => vec![bits.red, bits.green, bits.blue],
            PngColor::RGBA => vec![bits.red, bits.green, bits.blue, bits.alpha]
        }
    }

    fn bkgd_payload(&self, background: &Background) -> Vec<u8> {
        // sample fields are masked to the bit depth; a 16-bit background
        // survives a 16->8 reduction as its low byte, which is what
        // decoders see anyway
        let mask = self.image.depth.max_value();
        match *background {
            Background::PaletteIndex(index) => vec![index],
            Background::Gray(gray) => (gray & mask).to_be_bytes().to_vec(),
            Background::Rgb(r, g, b) => {
                let mut out = Vec::with_capacity(6);
                out.extend_from_slice(&(r & mask).to_be_bytes());
                out.extend_from_slice(&(g & mask).to_be_bytes());
                out.extend_from_slice(&(b & mask).to_be_bytes());
                out
            }
        }
    }

    /// Stream the joined IDAT chunk: length (expected or patched later),
    /// name, compressed data, CRC.
    fn write_idat(&self, out: &mut Out) -> Result<u64, PngEncodeErrors> {
        let expected = self.expected_idat.unwrap_or(0);
        if expected > u64::from(PNG_CHUNK_MAX) {
            return Err(PngEncodeErrors::OversizedIdat(expected));
        }

        let length_offset = out.position()?;
        out.write_all(&(expected as u32).to_be_bytes())?;
        out.write_all(&chunk::IDAT.0)?;

        let mut crc = Crc32::new();
        crc.update(&chunk::IDAT.0);

        let mut idat_size = 0u64;
        {
            let out = &mut *out;
            let crc = &mut crc;
            let idat_size = &mut idat_size;
            let mut sink = move |bytes: &[u8]| {
                crc.update(bytes);
                *idat_size += bytes.len() as u64;
                out.write_all(bytes)?;
                Ok(Flow::Continue)
            };
            self.compress_idat(&mut sink)?;
        }

        out.write_all(&crc.finalize().to_be_bytes())?;

        if idat_size > u64::from(PNG_CHUNK_MAX) {
            return Err(PngEncodeErrors::OversizedIdat(idat_size));
        }
        if idat_size != expected {
            out.patch_u32(length_offset, idat_size as u32)?;
        }
        Ok(idat_size)
    }

    /// Filter and compress the pixel stream, feeding the zlib output to
    /// `sink`. Returns [`Flow::Abandon`] if the sink cut the stream.
    fn compress_idat<F>(&self, sink: &mut F) -> Result<Flow, PngEncodeErrors>
    where
        F: FnMut(&[u8]) -> Result<Flow, PngEncodeErrors>
    {
        let image = &self.image;
        let bits = pixel_bits(image.color, image.depth);
        let bpp = filter_bpp(image.color, image.depth);
        let mut deflater = Deflater::new(&self.params.zlib)?;

        let mut line = Vec::new();
        let mut scratch = Vec::new();

        let mut push_row = |deflater: &mut Deflater,
                            prev: Option<&[u8]>,
                            row: &[u8],
                            sink: &mut F|
         -> Result<Flow, PngEncodeErrors> {
            line.resize(1 + row.len(), 0);
            scratch.resize(row.len(), 0);
            let filter = if self.params.filter == FILTER_ADAPTIVE {
                choose_filter(bpp, prev, row, &mut scratch)
            } else {
                self.params.filter
            };
            line[0] = filter;
            filter_row(filter, bpp, prev, row, &mut line[1..]);
            deflater.push(&line, sink)
        };

        match image.interlace {
            InterlaceMethod::Standard => {
                for y in 0..image.height {
                    let prev = (y > 0).then(|| image.rows[y - 1].as_slice());
                    if push_row(&mut deflater, prev, &image.rows[y], sink)? == Flow::Abandon {
                        return Ok(Flow::Abandon);
                    }
                }
            }
            InterlaceMethod::Adam7 => {
                for pass in 0..7 {
                    let (pw, ph) = adam7::pass_dimensions(pass, image.width, image.height);
                    if pw == 0 || ph == 0 {
                        continue;
                    }
                    let (x0, dx, y0, dy) = adam7::PASSES[pass];
                    let pass_stride = row_bytes(pw, bits);
                    let mut prev_pass_row: Option<Vec<u8>> = None;
                    for r in 0..ph {
                        let mut pass_row = vec![0u8; pass_stride];
                        let y = y0 + r * dy;
                        for i in 0..pw {
                            adam7::copy_pixel(&image.rows[y], x0 + i * dx, &mut pass_row, i, bits);
                        }
                        let flow = push_row(
                            &mut deflater,
                            prev_pass_row.as_deref(),
                            &pass_row,
                            sink
                        )?;
                        if flow == Flow::Abandon {
                            return Ok(Flow::Abandon);
                        }
                        prev_pass_row = Some(pass_row);
                    }
                }
            }
        }

        deflater.finish(sink)
    }
}

/// Size of the filtered pixel stream an image will produce, filter bytes
/// included. The trial engine sizes the deflate window from this.
pub fn filtered_data_size(
    width: usize, height: usize, color: PngColor, depth: BitDepth, interlace: InterlaceMethod
) -> u64 {
    let bits = pixel_bits(color, depth);
    match interlace {
        InterlaceMethod::Standard => ((1 + row_bytes(width, bits)) * height) as u64,
        InterlaceMethod::Adam7 => (0..7)
            .map(|pass| {
                let (pw, ph) = adam7::pass_dimensions(pass, width, height);
                if pw == 0 || ph == 0 {
                    0
                } else {
                    ((1 + row_bytes(pw, bits)) * ph) as u64
                }
            })
            .sum()
    }
}

/// The output half of the encoder: a possibly-seekable byte sink with a
/// running byte count and chunk framing.
struct Out<'x> {
    sink:    OutSink<'x>,
    written: u64
}

enum OutSink<'x> {
    Seek(&'x mut dyn WriteSeek),
    Plain(&'x mut dyn Write)
}

impl<'x> Out<'x> {
    fn seekable(sink: &'x mut dyn WriteSeek) -> Out<'x> {
        Out {
            sink:    OutSink::Seek(sink),
            written: 0
        }
    }

    fn plain(sink: &'x mut dyn Write) -> Out<'x> {
        Out {
            sink:    OutSink::Plain(sink),
            written: 0
        }
    }

    fn written(&self) -> u64 {
        self.written
    }

    fn position(&mut self) -> Result<u64, PngEncodeErrors> {
        match &mut self.sink {
            OutSink::Seek(w) => Ok(w.stream_position()?),
            OutSink::Plain(_) => Ok(self.written)
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), PngEncodeErrors> {
        match &mut self.sink {
            OutSink::Seek(w) => w.write_all(bytes)?,
            OutSink::Plain(w) => w.write_all(bytes)?
        }
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn patch_u32(&mut self, offset: u64, value: u32) -> Result<(), PngEncodeErrors> {
        match &mut self.sink {
            OutSink::Seek(w) => {
                let end = w.stream_position()?;
                w.seek(SeekFrom::Start(offset))?;
                w.write_all(&value.to_be_bytes())?;
                w.seek(SeekFrom::Start(end))?;
                Ok(())
            }
            OutSink::Plain(_) => Err(PngEncodeErrors::UnseekableSink)
        }
    }

    fn write_chunk(&mut self, name: ChunkName, data: &[u8]) -> Result<(), PngEncodeErrors> {
        self.write_all(&(data.len() as u32).to_be_bytes())?;
        self.write_all(&name.0)?;
        self.write_all(data)?;
        let mut crc_input = Vec::with_capacity(4 + data.len());
        crc_input.extend_from_slice(&name.0);
        crc_input.extend_from_slice(data);
        self.write_all(&calc_crc(&crc_input).to_be_bytes())?;
        Ok(())
    }
}
