/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! The trial engine: iterate the (filter, strategy, level, memLevel)
//! hyper-rectangle, measure each candidate IDAT against a shrinking
//! size limit, and keep the best.

use log::{debug, info};
use opng_core::rangeset::{self, Bits};
use opng_png::{
    filtered_data_size, EncodeParams, PngEncoder, Sink, ZlibOptions, ZlibStrategy,
    PNG_CHUNK_MAX
};

use crate::errors::OpngErrors;
use crate::image::Image;
use crate::options::OpngOptions;
use crate::stats::{EncodingStats, StatusFlags};

const FILTER_MASK: Bits = 0x3f; // 0..=5
const STRATEGY_MASK: Bits = 0x0f; // 0..=3
const LEVEL_MASK: Bits = 0x3fe; // 1..=9
const MEM_MASK: Bits = 0x3fe; // 1..=9

// the preset table, indexed by optimization level (clamped to 6)
const FILTER_PRESETS: [Bits; 7] = [0x21, 0x21, 0x21, 0x21, 0x3f, 0x3f, 0x3f];
const STRATEGY_PRESETS: [Bits; 7] = [0x01, 0x01, 0x0f, 0x0f, 0x0f, 0x0f, 0x0f];
const LEVEL_PRESETS: [Bits; 7] =
    [1 << 3, 1 << 9, 1 << 9, 1 << 9, 1 << 9, 0x3f8, 0x3fe];
const MEM_PRESETS: [Bits; 7] =
    [1 << 8, 1 << 8, 1 << 8, 0x300, 0x300, 0x300, 0x380];

const DEGENERATE_STRATEGIES: Bits = (1 << 2) | (1 << 3);

/// The resolved iteration space for one image.
pub struct TrialPlan {
    pub filter_set:    Bits,
    pub zstrategy_set: Bits,
    pub zcompr_set:    Bits,
    pub zmem_set:      Bits,
    /// Explicit `-zw` value, if any.
    user_window_bits:  Option<i32>,
    /// Filtered data size, for the default window choice.
    data_size:         u64,
    pub max_idat_size: u64,
    pub num_iterations: u32
}

/// The winning combination.
#[derive(Copy, Clone, Debug)]
pub struct TrialBest {
    pub params:    EncodeParams,
    /// Exact size of the winning IDAT; zero when the single mandatory
    /// combination was selected without running it.
    pub idat_size: u64
}

fn merge_set(
    user: Bits, mask: Bits, preset: Bits, level_given: bool
) -> Result<Bits, OpngErrors> {
    let mut out = user & mask;
    if user != 0 && out == 0 {
        return Err(OpngErrors::Usage(
            "Iteration parameters (-zc, -zm, -zs, -f) are out of range".into()
        ));
    }
    if out == 0 || level_given {
        out |= preset & mask;
    }
    Ok(out)
}

/// The smallest deflate window covering `data_size` bytes.
fn covering_window_bits(data_size: u64) -> i32 {
    for bits in 8..=15 {
        if 1u64 << bits >= data_size {
            return bits;
        }
    }
    15
}

fn window_bits_for(plan: &TrialPlan, strategy: ZlibStrategy) -> i32 {
    if strategy.is_degenerate() {
        // matching is trivial under these strategies; drop one notch
        (covering_window_bits(plan.data_size) - 1).max(8)
    } else {
        plan.user_window_bits
            .unwrap_or_else(|| covering_window_bits(plan.data_size))
    }
}

/// Resolve presets, user sets and per-image defaults into the iteration
/// plan, and fix the starting IDAT size limit.
pub fn init_iterations(
    image: &Image, options: &OpngOptions, flags: &StatusFlags, in_stats: &EncodingStats
) -> Result<TrialPlan, OpngErrors> {
    // trials past this size carry no information; they are abandoned
    let max_idat_size = if flags.needs_new_idat || options.paranoid {
        u64::from(PNG_CHUNK_MAX)
    } else {
        // the input PLTE and tRNS sizes are included to absorb changes
        // the reductions made; the precise check happens at the end
        in_stats.idat_size + in_stats.plte_trns_size
    };

    let preset_index = usize::from(options.optim_level.unwrap_or(2).min(6));
    let level_given = options.optim_level.is_some();

    let mut filter_set = merge_set(
        options.filter_set,
        FILTER_MASK,
        FILTER_PRESETS[preset_index],
        level_given
    )?;
    let mut zstrategy_set = merge_set(
        options.zstrategy_set,
        STRATEGY_MASK,
        STRATEGY_PRESETS[preset_index],
        level_given
    )?;
    let mut zcompr_set = merge_set(
        options.zcompr_level_set,
        LEVEL_MASK,
        LEVEL_PRESETS[preset_index],
        level_given
    )?;
    let mut zmem_set = merge_set(
        options.zmem_level_set,
        MEM_MASK,
        MEM_PRESETS[preset_index],
        level_given
    )?;

    // per-image defaults for whatever is still empty
    let mut filtering_recommended =
        image.depth().to_int() >= 8 && !image.color().is_palette();
    if filter_set == 0 {
        filter_set = if filtering_recommended { 1 << 5 } else { 1 << 0 };
    }
    if filtering_recommended && (filter_set & !1) == 0 {
        // an unfiltered-only user setting; the user probably knows better
        filtering_recommended = false;
    }
    if zcompr_set == 0 {
        zcompr_set = 1 << 9;
    }
    if zmem_set == 0 {
        zmem_set = if filtering_recommended { 1 << 9 } else { 1 << 8 };
    }
    if zstrategy_set == 0 {
        zstrategy_set = if filtering_recommended { 1 << 1 } else { 1 << 0 };
    }

    // the level set collapses under the degenerate strategies
    let t1 = rangeset::count(zcompr_set)
        * rangeset::count(zstrategy_set & !DEGENERATE_STRATEGIES);
    let t2 = rangeset::count(zstrategy_set & DEGENERATE_STRATEGIES);
    let num_iterations =
        (t1 + t2) * rangeset::count(zmem_set) * rangeset::count(filter_set);
    debug_assert!(num_iterations > 0);

    Ok(TrialPlan {
        filter_set,
        zstrategy_set,
        zcompr_set,
        zmem_set,
        user_window_bits: options.zwindow_bits,
        data_size: filtered_data_size(
            image.width(),
            image.height(),
            image.color(),
            image.depth(),
            image.interlace()
        ),
        max_idat_size,
        num_iterations
    })
}

/// Run the trials and pick the smallest IDAT, honoring the tie-breaks
/// and the shrinking size limit.
pub fn iterate(
    image: &Image, plan: &TrialPlan, flags: &StatusFlags, paranoid: bool
) -> Result<TrialBest, OpngErrors> {
    let first_params = || {
        let strategy = ZlibStrategy::from_int(
            rangeset::find_first(plan.zstrategy_set).unwrap_or(0) as u8
        )
        .unwrap_or_default();
        EncodeParams {
            filter: rangeset::find_first(plan.filter_set).unwrap_or(0) as u8,
            zlib:   ZlibOptions {
                level:       rangeset::find_first(plan.zcompr_set).unwrap_or(9) as i32,
                strategy,
                mem_level:   rangeset::find_first(plan.zmem_set).unwrap_or(8) as i32,
                window_bits: window_bits_for(plan, strategy)
            }
        }
    };

    if plan.num_iterations == 1 && flags.needs_new_idat {
        // the single combination will be selected anyway; skip the trial
        return Ok(TrialBest {
            params:    first_params(),
            idat_size: 0
        });
    }

    info!("trying {} combination(s)", plan.num_iterations);

    let mut max_idat_size = plan.max_idat_size;
    let mut best: Option<TrialBest> = None;
    let mut counter = 0u32;

    for filter in 0..=5u32 {
        if !rangeset::test(plan.filter_set, filter) {
            continue;
        }
        for strategy_int in 0..=3u32 {
            if !rangeset::test(plan.zstrategy_set, strategy_int) {
                continue;
            }
            let Some(strategy) = ZlibStrategy::from_int(strategy_int as u8) else {
                continue;
            };
            // the compression level has no significance under
            // Huffman-only or RLE
            let level_set = match strategy {
                ZlibStrategy::HuffmanOnly => 1 << 1, // deflate_fast
                ZlibStrategy::Rle => 1 << 9,         // deflate_slow
                _ => plan.zcompr_set
            };
            for level in (1..=9u32).rev() {
                if !rangeset::test(level_set, level) {
                    continue;
                }
                for mem_level in (1..=9u32).rev() {
                    if !rangeset::test(plan.zmem_set, mem_level) {
                        continue;
                    }
                    counter += 1;
                    let params = EncodeParams {
                        filter: filter as u8,
                        zlib:   ZlibOptions {
                            level: level as i32,
                            strategy,
                            mem_level: mem_level as i32,
                            window_bits: window_bits_for(plan, strategy)
                        }
                    };

                    let mut encoder = PngEncoder::new(image.as_encoder_image(), params);
                    encoder.set_max_idat_size(max_idat_size);
                    let outcome = encoder.encode(Sink::Discard)?;

                    if outcome.abandoned {
                        debug!(
                            "zc = {level}  zm = {mem_level}  zs = {strategy_int}  \
                             f = {filter}\t\tIDAT too big"
                        );
                        continue;
                    }
                    if outcome.idat_size > u64::from(PNG_CHUNK_MAX) {
                        // an over-limit IDAT is useless however it was
                        // produced; skip it quietly
                        continue;
                    }
                    info!(
                        "zc = {level}  zm = {mem_level}  zs = {strategy_int}  \
                         f = {filter}\t\tIDAT size = {}",
                        outcome.idat_size
                    );

                    if let Some(current) = &best {
                        if current.idat_size < outcome.idat_size {
                            continue; // bigger
                        }
                        if current.idat_size == outcome.idat_size
                            && current.params.zlib.strategy >= ZlibStrategy::HuffmanOnly
                        {
                            continue; // neither smaller nor faster
                        }
                    }
                    best = Some(TrialBest {
                        params,
                        idat_size: outcome.idat_size
                    });
                    if !paranoid {
                        max_idat_size = outcome.idat_size;
                    }
                }
            }
        }
    }

    debug_assert_eq!(counter, plan.num_iterations);

    best.ok_or_else(|| {
        OpngErrors::GenericStatic("No trial produced a usable IDAT; the image is too large")
    })
}
