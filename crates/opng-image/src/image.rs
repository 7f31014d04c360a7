/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! The in-memory image model.
//!
//! An [`Image`] owns the decoded pixels as packed rows at the native bit
//! depth, the palette, transparency, the interpreted ancillaries and the
//! uninterpreted chunks. Mutation goes through methods that keep the
//! model invariants; the destructive operations (the reductions and the
//! data transforms) live in sibling modules of this crate and re-tag the
//! image atomically once the rows are rewritten.

use opng_core::ancillary::{Background, SignificantBits, Transparency, UnknownChunk};
use opng_core::depth::row_bytes;
use opng_core::{BitDepth, InterlaceMethod, PngColor};
use opng_png::adam7::read_packed;
use opng_png::{pixel_bits, EncoderImage, RawPng};
use opng_xtern::ForeignImage;

pub struct Image {
    width:      usize,
    height:     usize,
    depth:      BitDepth,
    color:      PngColor,
    interlace:  InterlaceMethod,
    rows:       Vec<Vec<u8>>,
    palette:    Vec<[u8; 3]>,
    trans:      Option<Transparency>,
    background: Option<Background>,
    hist:       Option<Vec<u16>>,
    sig_bits:   Option<SignificantBits>,
    unknown:    Vec<UnknownChunk>
}

impl Image {
    /// Build an image from already-validated parts, checking the model
    /// invariants once more.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        width: usize, height: usize, depth: BitDepth, color: PngColor,
        interlace: InterlaceMethod, rows: Vec<Vec<u8>>, palette: Vec<[u8; 3]>,
        trans: Option<Transparency>
    ) -> Result<Image, String> {
        let image = Image {
            width,
            height,
            depth,
            color,
            interlace,
            rows,
            palette,
            trans,
            background: None,
            hist: None,
            sig_bits: None,
            unknown: Vec::new()
        };
        image.validate()?;
        Ok(image)
    }

    pub fn from_raw(raw: RawPng) -> Result<Image, String> {
        let image = Image {
            width:      raw.width,
            height:     raw.height,
            depth:      raw.depth,
            color:      raw.color,
            interlace:  raw.interlace,
            rows:       raw.rows,
            palette:    raw.palette,
            trans:      raw.trans,
            background: raw.background,
            hist:       raw.hist,
            sig_bits:   raw.sig_bits,
            unknown:    raw.unknown
        };
        image.validate()?;
        Ok(image)
    }

    pub fn from_foreign(foreign: ForeignImage) -> Result<Image, String> {
        let trans = foreign.transparent_index.map(|index| {
            let mut alphas = vec![255u8; index + 1];
            alphas[index] = 0;
            Transparency::Alpha(alphas)
        });
        let image = Image {
            width:      foreign.width,
            height:     foreign.height,
            depth:      foreign.depth,
            color:      foreign.color,
            interlace:  foreign.interlace,
            rows:       foreign.rows,
            palette:    foreign.palette,
            trans,
            background: None,
            hist:       None,
            sig_bits:   foreign.sig_bits,
            unknown:    Vec::new()
        };
        image.validate()?;
        Ok(image)
    }

    /// Check the structural invariants of the model.
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("zero image dimensions".into());
        }
        if !self.color.allows_depth(self.depth) {
            return Err(format!(
                "depth {:?} is not allowed for color type {:?}",
                self.depth, self.color
            ));
        }
        if self.color.is_palette() && self.palette.is_empty() {
            return Err("palette image without palette entries".into());
        }
        if self.palette.len() > 256 {
            return Err("palette with more than 256 entries".into());
        }
        if self.rows.len() != self.height {
            return Err(format!(
                "{} rows for a height of {}",
                self.rows.len(),
                self.height
            ));
        }
        let stride = self.row_stride();
        if self.rows.iter().any(|row| row.len() != stride) {
            return Err("row length does not match the image layout".into());
        }
        match &self.trans {
            Some(Transparency::Alpha(alphas)) => {
                if !self.color.is_palette() {
                    return Err("alpha-list transparency on a non-palette image".into());
                }
                if alphas.len() > self.palette.len() {
                    return Err("more transparency entries than palette entries".into());
                }
            }
            Some(Transparency::GrayKey(_)) => {
                if self.color != PngColor::Luma {
                    return Err("gray transparency key on a non-gray image".into());
                }
            }
            Some(Transparency::RgbKey(..)) => {
                if self.color != PngColor::RGB {
                    return Err("RGB transparency key on a non-RGB image".into());
                }
            }
            None => {}
        }
        if let Some(hist) = &self.hist {
            if hist.len() != self.palette.len() {
                return Err("hIST length does not match the palette".into());
            }
        }
        if let Some(Background::PaletteIndex(index)) = self.background {
            if usize::from(index) >= self.palette.len() {
                return Err("background index outside the palette".into());
            }
        }
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn depth(&self) -> BitDepth {
        self.depth
    }

    pub fn color(&self) -> PngColor {
        self.color
    }

    pub fn interlace(&self) -> InterlaceMethod {
        self.interlace
    }

    pub fn set_interlace(&mut self, interlace: InterlaceMethod) {
        self.interlace = interlace;
    }

    pub fn rows(&self) -> &[Vec<u8>] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Vec<u8>] {
        &mut self.rows
    }

    pub fn palette(&self) -> &[[u8; 3]] {
        &self.palette
    }

    pub(crate) fn palette_mut(&mut self) -> &mut Vec<[u8; 3]> {
        &mut self.palette
    }

    pub fn trans(&self) -> Option<&Transparency> {
        self.trans.as_ref()
    }

    pub(crate) fn set_trans(&mut self, trans: Option<Transparency>) {
        self.trans = trans;
    }

    pub fn background(&self) -> Option<&Background> {
        self.background.as_ref()
    }

    pub(crate) fn set_background(&mut self, background: Option<Background>) {
        self.background = background;
    }

    pub fn hist(&self) -> Option<&Vec<u16>> {
        self.hist.as_ref()
    }

    pub(crate) fn set_hist(&mut self, hist: Option<Vec<u16>>) {
        self.hist = hist;
    }

    pub fn sig_bits(&self) -> Option<&SignificantBits> {
        self.sig_bits.as_ref()
    }

    pub(crate) fn set_sig_bits(&mut self, sig_bits: Option<SignificantBits>) {
        self.sig_bits = sig_bits;
    }

    pub fn unknown_chunks(&self) -> &[UnknownChunk] {
        &self.unknown
    }

    pub(crate) fn retain_unknown(&mut self, keep: impl Fn(&UnknownChunk) -> bool) {
        self.unknown.retain(keep);
    }

    pub fn channels(&self) -> usize {
        self.color.num_components()
    }

    /// Bytes per sample: one below sixteen-bit depth, two at it.
    pub fn byte_depth(&self) -> usize {
        if self.depth == BitDepth::Sixteen {
            2
        } else {
            1
        }
    }

    /// Bytes in one packed row.
    pub fn row_stride(&self) -> usize {
        row_bytes(self.width, pixel_bits(self.color, self.depth))
    }

    /// Change the pixel layout in one step. The rows must already hold
    /// data in the new layout (the callers rewrite in place, left to
    /// right, then the rows are cut down here).
    pub(crate) fn retag(&mut self, depth: BitDepth, color: PngColor) {
        self.depth = depth;
        self.color = color;
        let stride = self.row_stride();
        for row in &mut self.rows {
            row.truncate(stride);
        }
        debug_assert!(self.validate().is_ok());
    }

    /// Replace the rows wholesale together with their layout tags.
    pub(crate) fn replace_rows(
        &mut self, rows: Vec<Vec<u8>>, depth: BitDepth, color: PngColor
    ) {
        self.rows = rows;
        self.depth = depth;
        self.color = color;
        debug_assert!(self.validate().is_ok());
    }

    /// Visit every palette index used by the pixels (depths 1..=8).
    pub(crate) fn for_each_index(&self, mut visit: impl FnMut(usize)) {
        let bits = self.depth.to_int() as usize;
        debug_assert!(bits <= 8);
        for row in &self.rows {
            if bits == 8 {
                for &index in row.iter().take(self.width) {
                    visit(usize::from(index));
                }
            } else {
                for x in 0..self.width {
                    visit(usize::from(read_packed(row, x, bits)));
                }
            }
        }
    }

    pub fn as_encoder_image(&self) -> EncoderImage<'_> {
        EncoderImage {
            width:      self.width,
            height:     self.height,
            depth:      self.depth,
            color:      self.color,
            interlace:  self.interlace,
            rows:       &self.rows,
            palette:    &self.palette,
            trans:      self.trans.as_ref(),
            background: self.background,
            hist:       self.hist.as_deref(),
            sig_bits:   self.sig_bits,
            unknown:    &self.unknown
        }
    }
}
