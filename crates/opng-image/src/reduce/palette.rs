/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Palette reductions: pruning, bit packing, palette-to-gray, and the
//! inverse RGB(A)-to-palette conversion.

use log::warn;
use opng_core::ancillary::{Background, Transparency};
use opng_core::{BitDepth, PngColor};
use opng_png::adam7::read_packed;

use super::Reductions;
use crate::image::Image;

pub(super) struct PaletteOutcome {
    pub applied:  Reductions,
    pub warnings: usize
}

const NO_PALETTE_OUTCOME: PaletteOutcome = PaletteOutcome {
    applied:  Reductions::NONE,
    warnings: 0
};

/// Which palette entries the pixels (and bKGD) actually reference.
fn analyze_sample_usage(image: &Image) -> [bool; 256] {
    let mut is_used = [false; 256];
    image.for_each_index(|index| is_used[index] = true);
    if let Some(Background::PaletteIndex(index)) = image.background() {
        is_used[usize::from(*index)] = true;
    }
    is_used
}

/// Pack palette rows to the smallest depth that can index the palette.
fn pack_palette_bits(image: &mut Image, mask: Reductions) -> Reductions {
    if !mask.contains(Reductions::R8_PACK)
        || !image.color().is_palette()
        || image.palette().len() > 16
    {
        return Reductions::NONE;
    }
    let src_bits = usize::from(image.depth().to_int());
    let dest_depth = BitDepth::fitting_palette(image.palette().len());
    let dest_bits = usize::from(dest_depth.to_int());
    if dest_bits >= src_bits {
        return Reductions::NONE;
    }

    let width = image.width();
    for row in image.rows_mut() {
        let mut dest_index = 0usize;
        let mut dest_shift = 8usize;
        let mut dest_buf = 0u32;
        for x in 0..width {
            let sample = if src_bits == 8 {
                u32::from(row[x])
            } else {
                // reads stay ahead of the writes, so reading the row
                // being rewritten is fine
                u32::from(read_packed(row, x, src_bits))
            };
            dest_shift -= dest_bits;
            if dest_shift > 0 {
                dest_buf |= sample << dest_shift;
            } else {
                row[dest_index] = (dest_buf | sample) as u8;
                dest_index += 1;
                dest_shift = 8;
                dest_buf = 0;
            }
        }
        if dest_shift != 8 {
            row[dest_index] = dest_buf as u8;
        }
    }

    image.retag(dest_depth, PngColor::Palette);
    Reductions::R8_PACK
}

/// Prune, pack and gray-convert a palette image, mirroring the fast
/// palette reduction of the original engine.
pub(super) fn reduce_palette(image: &mut Image, mask: Reductions) -> PaletteOutcome {
    if !mask.intersects(
        Reductions::PALETTE_TO_GRAY | Reductions::PALETTE_PRUNE | Reductions::R8_PACK
    ) || !image.color().is_palette()
    {
        return NO_PALETTE_OUTCOME;
    }

    let mut warnings = 0usize;
    let is_used = analyze_sample_usage(image);
    let trans_alphas: Vec<u8> = match image.trans() {
        Some(Transparency::Alpha(alphas)) => alphas.clone(),
        _ => Vec::new()
    };

    let mut is_gray =
        mask.contains(Reductions::PALETTE_TO_GRAY) && image.depth() == BitDepth::Eight;
    let mut last_color_index: isize = -1;
    let mut last_trans_index: isize = -1;
    for (k, _) in is_used.iter().enumerate().filter(|(_, &used)| used) {
        last_color_index = k as isize;
        if k < trans_alphas.len() && trans_alphas[k] < 255 {
            last_trans_index = k as isize;
        }
        if is_gray {
            // entries past the stored palette read as black
            let entry = image.palette().get(k).copied().unwrap_or([0, 0, 0]);
            if entry[0] != entry[1] || entry[0] != entry[2] {
                is_gray = false;
            }
        }
    }
    debug_assert!(last_color_index >= 0);
    let last_color_index = last_color_index as usize;

    if last_color_index >= image.palette().len() {
        warn!("too few colors in palette, extending it");
        warnings += 1;
        image
            .palette_mut()
            .resize(last_color_index + 1, [0, 0, 0]);
        if let Some(hist) = image.hist().cloned() {
            let mut hist = hist;
            hist.resize(last_color_index + 1, 0);
            image.set_hist(Some(hist));
        }
    }
    let num_trans = (last_trans_index + 1) as usize;

    // tRNS can turn into a gray key only if transparency is carried by a
    // single gray level
    let mut gray_trans: u16 = 0;
    if is_gray && num_trans > 0 {
        let gray = image.palette()[last_trans_index as usize][0];
        let last_trans_value = trans_alphas[last_trans_index as usize];
        gray_trans = u16::from(gray);
        for (k, _) in is_used
            .iter()
            .enumerate()
            .take(last_color_index + 1)
            .filter(|(_, &used)| used)
        {
            let current = if k as isize <= last_trans_index {
                trans_alphas[k]
            } else {
                255
            };
            // different colors with transparency, or one color with two
            // transparency levels, both block the conversion
            if current < 255 && image.palette()[k][0] != gray {
                is_gray = false;
                break;
            }
            if image.palette()[k][0] == gray && current != last_trans_value {
                is_gray = false;
                break;
            }
        }
    }

    let mut applied = Reductions::NONE;

    // an all-opaque tRNS is dead weight whatever the options say
    if image.trans().is_some() && num_trans == 0 {
        image.set_trans(None);
        applied |= Reductions::PALETTE_PRUNE;
    }

    if mask.contains(Reductions::PALETTE_PRUNE) {
        if image.palette().len() != last_color_index + 1 {
            image.palette_mut().truncate(last_color_index + 1);
            if let Some(hist) = image.hist().cloned() {
                let mut hist = hist;
                hist.truncate(last_color_index + 1);
                image.set_hist(Some(hist));
            }
            applied |= Reductions::PALETTE_PRUNE;
        }
        if let Some(Transparency::Alpha(alphas)) = image.trans() {
            if alphas.len() != num_trans {
                let mut alphas = alphas.clone();
                alphas.truncate(num_trans);
                image.set_trans(Some(Transparency::Alpha(alphas)));
                applied |= Reductions::PALETTE_PRUNE;
            }
        }
    }

    applied |= pack_palette_bits(image, mask);
    if image.depth() != BitDepth::Eight || !is_gray {
        return PaletteOutcome { applied, warnings };
    }

    // palette -> grayscale: indices become the gray levels themselves
    let palette: Vec<[u8; 3]> = image.palette().to_vec();
    for row in image.rows_mut() {
        for sample in row.iter_mut() {
            *sample = palette[usize::from(*sample)][0];
        }
    }
    if let Some(Background::PaletteIndex(index)) = image.background() {
        let gray = u16::from(palette[usize::from(*index)][0]);
        image.set_background(Some(Background::Gray(gray)));
    }
    image.set_hist(None);
    if let Some(bits) = image.sig_bits() {
        let mut bits = *bits;
        bits.gray = bits.red.max(bits.green).max(bits.blue);
        image.set_sig_bits(Some(bits));
    }
    image.set_trans(if num_trans > 0 {
        Some(Transparency::GrayKey(gray_trans))
    } else {
        None
    });
    image.palette_mut().clear();
    image.retag(BitDepth::Eight, PngColor::Luma);

    PaletteOutcome {
        applied: applied | Reductions::PALETTE_TO_GRAY,
        warnings
    }
}

enum Insert {
    Found(usize),
    Inserted(usize),
    Overflow
}

/// Keep the candidate palette sorted by (alpha, red, green, blue) with
/// the translucent entries first, and find-or-insert one RGBA tuple.
fn insert_palette_entry(
    palette: &mut Vec<[u8; 3]>, trans: &mut Vec<u8>, r: u8, g: u8, b: u8, a: u8
) -> Insert {
    let (mut low, mut high) = if a < 255 {
        (0usize, trans.len())
    } else {
        (trans.len(), palette.len())
    };
    while low < high {
        let mid = (low + high) / 2;
        let mid_key = if a < 255 {
            (trans[mid], palette[mid][0], palette[mid][1], palette[mid][2])
        } else {
            (255, palette[mid][0], palette[mid][1], palette[mid][2])
        };
        match (a, r, g, b).cmp(&mid_key) {
            core::cmp::Ordering::Equal => return Insert::Found(mid),
            core::cmp::Ordering::Less => high = mid,
            core::cmp::Ordering::Greater => low = mid + 1
        }
    }
    if palette.len() == 256 {
        return Insert::Overflow;
    }
    palette.insert(low, [r, g, b]);
    if a < 255 {
        trans.insert(low, a);
    }
    Insert::Inserted(low)
}

/// The alpha value of one pixel of a truecolor row, honoring a
/// transparency key if the image carries one.
fn alpha_of(sample: &[u8], channels: usize, key: Option<(u8, u8, u8)>) -> u8 {
    if channels == 4 {
        return sample[3];
    }
    match key {
        Some((kr, kg, kb)) if sample[0] == kr && sample[1] == kg && sample[2] == kb => 0,
        _ => 255
    }
}

/// Turn an 8-bit RGB(A) image into a palette image when the unique
/// colors fit and the palette form is actually smaller.
pub(super) fn reduce_rgb_to_palette(image: &mut Image, mask: Reductions) -> Reductions {
    if !mask.contains(Reductions::RGB_TO_PALETTE)
        || image.depth() != BitDepth::Eight
        || !matches!(image.color(), PngColor::RGB | PngColor::RGBA)
    {
        return Reductions::NONE;
    }

    let channels = image.channels();
    let key = match image.trans() {
        Some(Transparency::RgbKey(r, g, b)) => {
            if *r <= 255 && *g <= 255 && *b <= 255 {
                Some((*r as u8, *g as u8, *b as u8))
            } else {
                // a key above the sample range matches nothing
                None
            }
        }
        _ => None
    };

    let mut palette: Vec<[u8; 3]> = Vec::with_capacity(256);
    let mut trans: Vec<u8> = Vec::new();

    // analysis pass, with a cache of the previous pixel
    let mut previous: Option<(u8, u8, u8, u8)> = None;
    for row in image.rows() {
        for sample in row.chunks_exact(channels).take(image.width()) {
            let (r, g, b) = (sample[0], sample[1], sample[2]);
            let a = alpha_of(sample, channels, key);
            if previous == Some((r, g, b, a)) {
                continue;
            }
            previous = Some((r, g, b, a));
            if let Insert::Overflow = insert_palette_entry(&mut palette, &mut trans, r, g, b, a)
            {
                return Reductions::NONE;
            }
        }
    }

    // a background color must land in the palette too
    let background_color = match image.background() {
        Some(Background::Rgb(r, g, b)) => {
            let (r, g, b) = (*r as u8, *g as u8, *b as u8);
            if let Insert::Overflow = insert_palette_entry(&mut palette, &mut trans, r, g, b, 255)
            {
                return Reductions::NONE;
            }
            Some((r, g, b))
        }
        _ => None
    };

    // compare the uncompressed footprints: pixels * channels versus
    // pixels + palette + trans, with the common term dropped
    let pixels = image.width() as u64 * image.height() as u64;
    if pixels * (channels as u64 - 1) <= 3 * palette.len() as u64 + trans.len() as u64 {
        return Reductions::NONE;
    }

    // rewrite pass
    let width = image.width();
    let mut rows = Vec::with_capacity(image.height());
    let mut previous: Option<(u8, u8, u8, u8)> = None;
    let mut previous_index = 0usize;
    for row in image.rows() {
        let mut out = vec![0u8; width];
        for (x, sample) in row.chunks_exact(channels).take(width).enumerate() {
            let (r, g, b) = (sample[0], sample[1], sample[2]);
            let a = alpha_of(sample, channels, key);
            if previous != Some((r, g, b, a)) {
                previous = Some((r, g, b, a));
                previous_index =
                    match insert_palette_entry(&mut palette, &mut trans, r, g, b, a) {
                        Insert::Found(index) => index,
                        // the analysis pass saw every tuple already
                        Insert::Inserted(_) | Insert::Overflow => unreachable!()
                    };
            }
            out[x] = previous_index as u8;
        }
        rows.push(out);
    }

    let background_index = background_color.map(|(r, g, b)| {
        match insert_palette_entry(&mut palette, &mut trans, r, g, b, 255) {
            Insert::Found(index) => index as u8,
            // inserted during analysis, so lookup can only hit
            Insert::Inserted(_) | Insert::Overflow => unreachable!()
        }
    });

    image.set_trans(None);
    *image.palette_mut() = palette;
    image.replace_rows(rows, BitDepth::Eight, PngColor::Palette);
    if let Some(index) = background_index {
        image.set_background(Some(Background::PaletteIndex(index)));
    }
    if !trans.is_empty() {
        image.set_trans(Some(Transparency::Alpha(trans)));
    }

    Reductions::RGB_TO_PALETTE | pack_palette_bits(image, mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opng_core::InterlaceMethod;

    fn palette_image(
        width: usize, height: usize, palette_len: usize, index_of: impl Fn(usize, usize) -> u8
    ) -> Image {
        let rows = (0..height)
            .map(|y| (0..width).map(|x| index_of(x, y)).collect())
            .collect();
        let palette = (0..palette_len)
            .map(|i| [i as u8, (i as u8).wrapping_mul(3), (i as u8).wrapping_mul(5)])
            .collect();
        Image::from_parts(
            width,
            height,
            BitDepth::Eight,
            PngColor::Palette,
            InterlaceMethod::Standard,
            rows,
            palette,
            None
        )
        .unwrap()
    }

    #[test]
    fn full_palette_with_three_used_entries_prunes_and_packs() {
        // 256 entries, only indices 0..=2 used: prune to 3, pack to 2 bits
        let mut image = palette_image(8, 4, 256, |x, _| (x % 3) as u8);
        let outcome = reduce_palette(&mut image, Reductions::ALL);
        assert!(outcome.applied.contains(Reductions::PALETTE_PRUNE));
        assert!(outcome.applied.contains(Reductions::R8_PACK));
        assert_eq!(image.palette().len(), 3);
        assert_eq!(image.depth(), BitDepth::Two);
        // 8 two-bit samples pack into 2 bytes; indices 0,1,2,0,1,2,0,1
        assert_eq!(image.rows()[0], vec![0b00_01_10_00, 0b01_10_00_01]);
        assert_eq!(outcome.warnings, 0);
    }

    #[test]
    fn all_gray_palette_becomes_grayscale() {
        let rows = vec![vec![0u8, 1, 2, 1]; 2];
        let palette = vec![[0, 0, 0], [100, 100, 100], [200, 200, 200]];
        // 17 pixels would pack; keep the palette > 16 entries so the
        // gray conversion stays reachable
        let mut palette = palette;
        for i in 3..20 {
            palette.push([i as u8, i as u8, i as u8]);
        }
        let mut rows = rows;
        rows[1] = vec![19, 1, 2, 0];
        let mut image = Image::from_parts(
            4,
            2,
            BitDepth::Eight,
            PngColor::Palette,
            InterlaceMethod::Standard,
            rows,
            palette,
            None
        )
        .unwrap();
        let outcome = reduce_palette(&mut image, Reductions::ALL);
        assert!(outcome.applied.contains(Reductions::PALETTE_TO_GRAY));
        assert_eq!(image.color(), PngColor::Luma);
        assert_eq!(image.rows()[0], vec![0, 100, 200, 100]);
        assert!(image.palette().is_empty());
    }

    #[test]
    fn small_gray_palette_packs_instead_of_graying() {
        // all-gray but tiny: packing wins, the gray conversion is skipped
        // because the depth is below eight afterwards
        let mut image = Image::from_parts(
            4,
            1,
            BitDepth::Eight,
            PngColor::Palette,
            InterlaceMethod::Standard,
            vec![vec![0, 1, 1, 0]],
            vec![[0, 0, 0], [255, 255, 255]],
            None
        )
        .unwrap();
        let outcome = reduce_palette(&mut image, Reductions::ALL);
        assert!(outcome.applied.contains(Reductions::R8_PACK));
        assert!(!outcome.applied.contains(Reductions::PALETTE_TO_GRAY));
        assert_eq!(image.depth(), BitDepth::One);
        assert_eq!(image.color(), PngColor::Palette);
    }

    #[test]
    fn opaque_trns_is_dropped_and_trns_is_trimmed() {
        let mut image = palette_image(4, 1, 4, |x, _| x as u8);
        image.set_trans(Some(Transparency::Alpha(vec![255, 255, 255, 255])));
        let outcome = reduce_palette(&mut image, Reductions::ALL);
        assert!(outcome.applied.contains(Reductions::PALETTE_PRUNE));
        assert_eq!(image.trans(), None);

        let mut image = palette_image(4, 1, 4, |x, _| x as u8);
        image.set_trans(Some(Transparency::Alpha(vec![10, 255, 255, 255])));
        reduce_palette(&mut image, Reductions::ALL);
        assert_eq!(image.trans(), Some(&Transparency::Alpha(vec![10])));
    }

    #[test]
    fn out_of_range_indices_extend_the_palette_with_a_warning() {
        let mut image = palette_image(4, 1, 2, |x, _| x as u8); // uses 0..=3
        let outcome = reduce_palette(&mut image, Reductions::ALL);
        assert!(outcome.warnings > 0);
        // pixel indices stay valid against the (extended, then pruned)
        // palette
        assert!(image.palette().len() >= 4);
    }

    #[test]
    fn few_colored_rgb_image_turns_into_a_palette() {
        // 16x16 image with four colors: palette form is far smaller
        let rows: Vec<Vec<u8>> = (0..16)
            .map(|y| {
                let mut row = Vec::new();
                for x in 0..16 {
                    let c = [(10u8, 20u8, 30u8), (0, 0, 0), (255, 0, 0), (1, 2, 3)]
                        [(x + y) % 4];
                    row.extend_from_slice(&[c.0, c.1, c.2]);
                }
                row
            })
            .collect();
        let mut image = Image::from_parts(
            16,
            16,
            BitDepth::Eight,
            PngColor::RGB,
            InterlaceMethod::Standard,
            rows.clone(),
            Vec::new(),
            None
        )
        .unwrap();
        let applied = reduce_rgb_to_palette(&mut image, Reductions::ALL);
        assert!(applied.contains(Reductions::RGB_TO_PALETTE));
        assert!(applied.contains(Reductions::R8_PACK));
        assert_eq!(image.color(), PngColor::Palette);
        assert_eq!(image.palette().len(), 4);
        assert_eq!(image.depth(), BitDepth::Two);
        // decode back: every pixel keeps its color
        for (y, row) in rows.iter().enumerate() {
            for x in 0..16 {
                let index = usize::from(read_packed(&image.rows()[y], x, 2));
                assert_eq!(image.palette()[index], [row[3 * x], row[3 * x + 1], row[3 * x + 2]]);
            }
        }
    }

    #[test]
    fn translucent_entries_sort_first() {
        // RGBA with two translucent colors and one opaque color
        let mut row = Vec::new();
        for _ in 0..8 {
            row.extend_from_slice(&[5, 5, 5, 255, 9, 9, 9, 100, 1, 1, 1, 0]);
        }
        let mut image = Image::from_parts(
            24,
            4,
            BitDepth::Eight,
            PngColor::RGBA,
            InterlaceMethod::Standard,
            vec![row.clone(); 4],
            Vec::new(),
            None
        )
        .unwrap();
        let applied = reduce_rgb_to_palette(&mut image, Reductions::ALL);
        assert!(applied.contains(Reductions::RGB_TO_PALETTE));
        match image.trans() {
            Some(Transparency::Alpha(alphas)) => {
                assert_eq!(alphas.len(), 2);
                // sorted by ascending alpha
                assert_eq!(alphas, &vec![0, 100]);
            }
            other => panic!("expected an alpha prefix, got {other:?}")
        }
        assert_eq!(image.palette().len(), 3);
    }

    #[test]
    fn tiny_images_stay_rgb() {
        // 2x2: the palette + tRNS overhead outweighs the pixels
        let rows = vec![vec![1, 2, 3, 4, 5, 6], vec![7, 8, 9, 10, 11, 12]];
        let mut image = Image::from_parts(
            2,
            2,
            BitDepth::Eight,
            PngColor::RGB,
            InterlaceMethod::Standard,
            rows,
            Vec::new(),
            None
        )
        .unwrap();
        let applied = reduce_rgb_to_palette(&mut image, Reductions::ALL);
        assert!(applied.is_none());
        assert_eq!(image.color(), PngColor::RGB);
    }
}
