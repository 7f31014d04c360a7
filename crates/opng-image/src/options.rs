/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! The optimization options, resolved from the command line.

use opng_core::rangeset::Bits;
use opng_core::InterlaceMethod;

/// Everything the engine needs to know about a run. The CLI fills this
/// in; empty rangesets mean "not specified", which lets the presets and
/// per-image defaults take over.
#[derive(Clone, Debug, Default)]
pub struct OpngOptions {
    /// `-o N`: the preset level. `None` when not given, in which case
    /// the default presets still apply to otherwise-empty sets.
    pub optim_level: Option<u8>,

    /// `-f`: PNG filter set over 0..=5.
    pub filter_set: Bits,
    /// `-zc`: deflate compression levels over 1..=9.
    pub zcompr_level_set: Bits,
    /// `-zm`: deflate memory levels over 1..=9.
    pub zmem_level_set: Bits,
    /// `-zs`: deflate strategies over 0..=3.
    pub zstrategy_set: Bits,
    /// `-zw`: deflate window bits, 8..=15.
    pub zwindow_bits: Option<i32>,

    /// `-i`: target interlace method, `None` preserves the input's.
    pub interlace: Option<InterlaceMethod>,

    /// `-nb`: no bit depth reductions.
    pub no_bit_depth_reduction: bool,
    /// `-nc`: no color type reductions.
    pub no_color_reduction: bool,
    /// `-np`: no palette reductions.
    pub no_palette_reduction: bool,
    /// `-nx`: no reductions at all.
    pub no_reductions: bool,
    /// `-nz`: never recode IDAT.
    pub no_idat_recoding: bool,

    /// `-fix`: salvage recoverable errors.
    pub fix: bool,
    /// `-force`: always rewrite, and allow erasing digital signatures.
    pub force: bool,
    /// `-paranoid`: run every trial to completion.
    pub paranoid: bool,
    /// `-snip`: keep only the first image of a multi-image input.
    pub snip: bool
}

impl OpngOptions {
    /// Fold option implications in, the way the engine has always done:
    /// the fastest level turns reductions and IDAT recoding off.
    pub fn normalize(&mut self) {
        if self.optim_level == Some(0) {
            self.no_bit_depth_reduction = true;
            self.no_color_reduction = true;
            self.no_palette_reduction = true;
            self.no_idat_recoding = true;
        }
    }
}
