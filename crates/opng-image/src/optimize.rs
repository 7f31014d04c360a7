/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! The per-file session: read, transform, reduce, search, and produce
//! the output plan.
//!
//! The session is split in two phases so the caller stays in charge of
//! the file system: [`Session::analyze`] runs everything up to and
//! including the trials and returns an [`Analysis`]; the caller then
//! decides where the output goes (or that none is needed) and calls
//! [`Analysis::write`] or [`Analysis::copy`].

use log::{info, warn};
use opng_core::chunk::ChunkName;
use opng_png::{EncodeParams, PngEncoder, Sink};

use crate::copy::copy_png;
use crate::errors::OpngErrors;
use crate::image::Image;
use crate::import::decode_input;
use crate::options::OpngOptions;
use crate::reduce::{allowed_reductions, reduce_image, ReduceOutcome, Reductions};
use crate::stats::{EncodingStats, StatusFlags};
use crate::trans::Transformer;
use crate::trial::{init_iterations, iterate, TrialBest};

/// One optimization run over many files shares the options and the
/// sealed transformer.
pub struct Session<'a> {
    pub options:     &'a OpngOptions,
    pub transformer: &'a Transformer
}

/// Everything the session learned about one input.
pub struct Analysis<'a> {
    options:         &'a OpngOptions,
    transformer:     &'a Transformer,
    pub image:       Image,
    pub flags:       StatusFlags,
    pub in_stats:    EncodingStats,
    pub best:        Option<TrialBest>,
    pub reductions:  Reductions,
    pub format_name: &'static str
}

/// The write-time chunk filter: the user's strip/protect resolution,
/// plus the rules that always hold (digital signatures never survive a
/// rewrite, APNG control chunks die under `-snip`).
fn strip_predicate<'p>(
    options: &'p OpngOptions, transformer: &'p Transformer
) -> impl Fn(ChunkName) -> bool + 'p {
    let snip = options.snip;
    move |name| {
        if name.is_digital_signature() {
            return true;
        }
        if snip && name.is_apng() {
            return true;
        }
        transformer.strip_chunk(name)
    }
}

impl<'a> Session<'a> {
    pub fn new(options: &'a OpngOptions, transformer: &'a Transformer) -> Session<'a> {
        Session {
            options,
            transformer
        }
    }

    /// Whether the strip resolution would drop anything this image has.
    fn would_strip_metadata(&self, image: &Image) -> bool {
        if !self.transformer.may_strip_chunks() {
            return false;
        }
        let strip = |name: ChunkName| self.transformer.strip_chunk(name);
        image
            .unknown_chunks()
            .iter()
            .any(|chunk| strip(chunk.name))
            || (image.background().is_some() && strip(opng_core::chunk::BKGD))
            || (image.hist().is_some() && strip(opng_core::chunk::HIST))
            || (image.sig_bits().is_some() && strip(opng_core::chunk::SBIT))
    }

    /// Steps 1..=9 of the per-file pipeline.
    pub fn analyze(&self, data: &[u8]) -> Result<Analysis<'a>, OpngErrors> {
        let decoded = decode_input(data)?;
        let mut image = decoded.image;
        let mut flags = decoded.flags;
        let in_stats = decoded.in_stats;

        info!(
            "{}x{} pixels, {} bits/pixel, {:?}, {} format",
            image.width(),
            image.height(),
            image.depth().to_int() as usize * image.channels(),
            image.color(),
            decoded.format_name
        );
        if flags.has_png_datastream {
            info!("input IDAT size = {} bytes", in_stats.idat_size);
        }

        if self.options.force {
            flags.needs_new_idat = true;
        }

        // data transforms come before the reductions so that, say, an
        // alpha reset can enable the alpha strip
        let applied = self.transformer.apply(&mut image);
        if applied.any() {
            flags.needs_new_file = true;
            flags.needs_new_idat = true;
        }

        if self.would_strip_metadata(&image) {
            flags.has_stripped_metadata = true;
            flags.has_junk = true;
        }
        if decoded.has_apng && self.options.snip {
            flags.has_junk = true;
        }

        // resolve and run the reductions
        let mut mask = allowed_reductions(self.options);
        if self.options.no_idat_recoding && flags.has_png_datastream {
            // under -nz a PNG keeps its exact representation
            mask = Reductions::NONE;
        }
        if flags.has_digital_signature {
            mask = Reductions::NONE;
        }
        if flags.is_png_file
            && flags.has_multiple_images
            && !mask.is_none()
            && !self.options.snip
        {
            warn!("can't reliably reduce an APNG file; disabling reductions");
            info!("(did you want to -snip and optimize the first frame?)");
            mask = Reductions::NONE;
        }
        let ReduceOutcome {
            applied: reductions,
            warnings
        } = reduce_image(&mut image, mask);
        if warnings > 0 {
            flags.has_errors = true;
        }
        if !reductions.is_none() {
            info!("reducing image: {reductions:?}");
            flags.needs_new_idat = true;
        }

        // an interlace change forces recoding too
        if let Some(target) = self.options.interlace {
            if image.interlace() != target {
                image.set_interlace(target);
                flags.needs_new_idat = true;
            }
        }

        // recoverable errors must be sanctioned by -fix
        if flags.has_errors {
            if self.options.fix {
                info!("recoverable errors found in input, fixing");
                flags.needs_new_file = true;
                flags.needs_new_idat = true;
            } else {
                return Err(OpngErrors::ErrorsNotFixed);
            }
        }

        if flags.has_junk {
            flags.needs_new_file = true;
        }
        if !flags.has_png_signature {
            flags.needs_new_file = true;
        }
        if flags.has_png_datastream {
            if self.options.no_idat_recoding && flags.needs_new_idat {
                return Err(OpngErrors::RecodingDisallowed);
            }
        } else {
            flags.needs_new_idat = true;
        }

        if flags.has_digital_signature {
            if self.options.force {
                flags.needs_new_file = true;
            } else {
                return Err(OpngErrors::SignedFile);
            }
        }

        if flags.has_multiple_images && !flags.is_png_file && !self.options.snip {
            return Err(OpngErrors::SnipRequired);
        }

        // the parameter search
        let mut best = None;
        if !self.options.no_idat_recoding || flags.needs_new_idat {
            let plan = init_iterations(&image, self.options, &flags, &in_stats)?;
            let winner = iterate(&image, &plan, &flags, self.options.paranoid)?;

            // would the new encoding actually be smaller?
            let out_plte_trns = plte_trns_size(&image);
            if winner.idat_size + out_plte_trns < in_stats.idat_size + in_stats.plte_trns_size
            {
                flags.needs_new_idat = true;
            }
            if flags.needs_new_idat {
                info!(
                    "selecting zc = {}  zm = {}  zs = {:?}  f = {}",
                    winner.params.zlib.level,
                    winner.params.zlib.mem_level,
                    winner.params.zlib.strategy,
                    winner.params.filter
                );
                if winner.idat_size > 0 {
                    info!("IDAT size = {} bytes", winner.idat_size);
                }
            }
            best = Some(winner);
        }
        if flags.needs_new_idat {
            flags.needs_new_file = true;
        }

        Ok(Analysis {
            options: self.options,
            transformer: self.transformer,
            image,
            flags,
            in_stats,
            best,
            reductions,
            format_name: decoded.format_name
        })
    }
}

/// Output-side PLTE + tRNS size, chunk overhead included. PLTE only
/// counts when the encoder would actually write it.
fn plte_trns_size(image: &Image) -> u64 {
    let mut size = 0u64;
    if !image.palette().is_empty() && image.color().has_color() {
        size += image.palette().len() as u64 * 3 + 12;
    }
    if let Some(trans) = image.trans() {
        use opng_core::ancillary::Transparency;
        size += match trans {
            Transparency::Alpha(alphas) => alphas.len() as u64,
            Transparency::GrayKey(_) => 2,
            Transparency::RgbKey(..) => 6
        } + 12;
    }
    size
}

impl Analysis<'_> {
    /// Whether any output needs to be produced at all when the target
    /// would overwrite the input.
    pub fn is_already_optimized(&self) -> bool {
        !self.flags.needs_new_file
    }

    /// Write a brand new PNG datastream.
    ///
    /// A non-seekable sink needs the exact IDAT size up front; when the
    /// trial engine short-circuited, one extra measuring pass runs
    /// here.
    pub fn write(&self, sink: Sink) -> Result<EncodingStats, OpngErrors> {
        let best = self
            .best
            .as_ref()
            .ok_or(OpngErrors::GenericStatic("No encoding parameters selected"))?;
        let params: EncodeParams = best.params;
        let strip = strip_predicate(self.options, self.transformer);

        let mut expected = best.idat_size;
        if expected == 0 {
            if let Sink::Seekable(_) = sink {
                // the length field gets patched in place
            } else {
                let measuring = PngEncoder::new(self.image.as_encoder_image(), params);
                let outcome = measuring.encode(Sink::Discard)?;
                expected = outcome.idat_size;
            }
        }

        let mut encoder = PngEncoder::new(self.image.as_encoder_image(), params);
        encoder.set_strip_predicate(&strip);
        if expected > 0 {
            encoder.set_expected_idat_size(expected);
        }
        let outcome = encoder.encode(sink)?;
        Ok(EncodingStats {
            file_size: outcome.bytes_written,
            idat_size: outcome.idat_size,
            plte_trns_size: outcome.plte_trns_size,
            datastream_offset: 0
        })
    }

    /// Copy the input datastream, joining IDATs and applying the strip
    /// predicate. Only valid when the pixels were left untouched.
    pub fn copy(&self, input: &[u8], out: &mut dyn std::io::Write) -> Result<EncodingStats, OpngErrors> {
        debug_assert!(!self.flags.needs_new_idat);
        let strip = strip_predicate(self.options, self.transformer);
        copy_png(
            input,
            self.in_stats.datastream_offset as usize,
            self.in_stats.idat_size,
            &strip,
            out
        )
    }
}
