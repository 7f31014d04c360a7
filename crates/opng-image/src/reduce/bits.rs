/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Bit-level reductions: 16->8, RGB->gray and strip-alpha.
//!
//! One scan over the rows establishes which of the three hold; one more
//! rewrites the rows in place through a per-byte translation table that
//! maps the destination sample layout onto the source one. All
//! applicable reductions happen in the same rewrite.

use opng_core::ancillary::{Background, Transparency};
use opng_core::{BitDepth, PngColor};

use super::Reductions;
use crate::image::Image;

fn analyze_bits(image: &Image, mask: Reductions) -> Reductions {
    if image.depth().to_int() < 8 || image.color().is_palette() {
        // packed depths and palettes belong to the palette reducer
        return Reductions::NONE;
    }

    let mut candidates =
        mask & (Reductions::R16_TO_8 | Reductions::RGB_TO_GRAY | Reductions::STRIP_ALPHA);
    if image.depth() != BitDepth::Sixteen {
        candidates = candidates.without(Reductions::R16_TO_8);
    }
    if !image.color().has_color() {
        candidates = candidates.without(Reductions::RGB_TO_GRAY);
    }
    if !image.color().has_alpha() {
        candidates = candidates.without(Reductions::STRIP_ALPHA);
    }

    // a colored background pins the RGB representation
    if candidates.contains(Reductions::RGB_TO_GRAY) {
        if let Some(Background::Rgb(r, g, b)) = image.background() {
            if !(r == g && r == b) {
                candidates = candidates.without(Reductions::RGB_TO_GRAY);
            }
        }
    }

    let byte_depth = image.byte_depth();
    let channels = image.channels();
    let sample_size = channels * byte_depth;
    let offset_alpha = (channels - 1) * byte_depth;
    let width = image.width();

    for row in image.rows() {
        if candidates.is_none() {
            return Reductions::NONE;
        }

        if candidates.contains(Reductions::R16_TO_8) {
            for pair in row.chunks_exact(2).take(channels * width) {
                if pair[0] != pair[1] {
                    candidates = candidates.without(Reductions::R16_TO_8);
                    break;
                }
            }
        }

        if candidates.contains(Reductions::RGB_TO_GRAY) {
            if byte_depth == 1 {
                for sample in row.chunks_exact(sample_size).take(width) {
                    if sample[0] != sample[1] || sample[0] != sample[2] {
                        candidates = candidates.without(Reductions::RGB_TO_GRAY);
                        break;
                    }
                }
            } else {
                for sample in row.chunks_exact(sample_size).take(width) {
                    if sample[0] != sample[2]
                        || sample[0] != sample[4]
                        || sample[1] != sample[3]
                        || sample[1] != sample[5]
                    {
                        candidates = candidates.without(Reductions::RGB_TO_GRAY);
                        break;
                    }
                }
            }
        }

        if candidates.contains(Reductions::STRIP_ALPHA) {
            for sample in row.chunks_exact(sample_size).take(width) {
                let alpha = &sample[offset_alpha..offset_alpha + byte_depth];
                if alpha.iter().any(|&b| b != 255) {
                    candidates = candidates.without(Reductions::STRIP_ALPHA);
                    break;
                }
            }
        }
    }

    candidates
}

/// Halve a 16-bit transparency key sample, or report that it can no
/// longer match anything.
fn halve_key(value: u16) -> Option<u16> {
    if value >> 8 == value & 0xff {
        Some(value & 0xff)
    } else {
        // the pixels all have equal bytes, so this key matched nothing
        None
    }
}

pub(super) fn reduce_bits(image: &mut Image, mask: Reductions) -> Reductions {
    let reductions = analyze_bits(image, mask);
    if reductions.is_none() {
        return Reductions::NONE;
    }

    let src_depth = image.depth();
    let dest_depth = if reductions.contains(Reductions::R16_TO_8) {
        BitDepth::Eight
    } else {
        src_depth
    };

    let mut dest_color = image.color();
    if reductions.contains(Reductions::RGB_TO_GRAY) {
        dest_color = match dest_color {
            PngColor::RGB => PngColor::Luma,
            PngColor::RGBA => PngColor::LumaA,
            other => other
        };
    }
    if reductions.contains(Reductions::STRIP_ALPHA) {
        dest_color = match dest_color {
            PngColor::LumaA => PngColor::Luma,
            PngColor::RGBA => PngColor::RGB,
            other => other
        };
    }

    let src_byte_depth = image.byte_depth();
    let dest_byte_depth = if dest_depth == BitDepth::Sixteen { 2 } else { 1 };
    let src_sample_size = image.channels() * src_byte_depth;
    let dest_sample_size = dest_color.num_components() * dest_byte_depth;
    debug_assert!(dest_sample_size < src_sample_size);

    // the translation table maps each destination byte of a sample to a
    // source byte of the same sample
    let src_bits = usize::from(src_depth.to_int());
    let dest_bits = usize::from(dest_depth.to_int());
    let mut tran = [0usize; 8];
    for (k, slot) in tran.iter_mut().enumerate().take(4 * dest_byte_depth) {
        *slot = k * src_bits / dest_bits;
    }
    // with the chroma channels going away, the alpha channel slides over
    // from the fourth position to the second
    if reductions.contains(Reductions::RGB_TO_GRAY) && dest_color.has_alpha() {
        tran[dest_byte_depth] = tran[3 * dest_byte_depth];
        if dest_byte_depth == 2 {
            tran[dest_byte_depth + 1] = tran[3 * dest_byte_depth + 1];
        }
    }

    let width = image.width();
    for row in image.rows_mut() {
        let mut src_offset = 0;
        let mut dest_offset = 0;
        for _ in 0..width {
            for k in 0..dest_sample_size {
                row[dest_offset + k] = row[src_offset + tran[k]];
            }
            src_offset += src_sample_size;
            dest_offset += dest_sample_size;
        }
    }

    // ancillaries follow the representation change
    if reductions.contains(Reductions::RGB_TO_GRAY) {
        if let Some(&Background::Rgb(r, _, _)) = image.background() {
            image.set_background(Some(Background::Gray(r)));
        }
        if let Some(&bits) = image.sig_bits() {
            let mut bits = bits;
            bits.gray = bits.red.max(bits.green).max(bits.blue);
            image.set_sig_bits(Some(bits));
        }
        if let Some(Transparency::RgbKey(r, g, b)) = image.trans().cloned() {
            // only an actually gray key stays meaningful
            if r == g && g == b {
                image.set_trans(Some(Transparency::GrayKey(r)));
            } else {
                image.set_trans(None);
            }
        }
    }
    if reductions.contains(Reductions::R16_TO_8) {
        match image.trans().cloned() {
            Some(Transparency::GrayKey(gray)) => {
                image.set_trans(halve_key(gray).map(Transparency::GrayKey));
            }
            Some(Transparency::RgbKey(r, g, b)) => {
                image.set_trans(
                    match (halve_key(r), halve_key(g), halve_key(b)) {
                        (Some(r), Some(g), Some(b)) => Some(Transparency::RgbKey(r, g, b)),
                        _ => None
                    }
                );
            }
            _ => {}
        }
        if let Some(&bits) = image.sig_bits() {
            let mut bits = bits;
            bits.red = bits.red.min(8);
            bits.green = bits.green.min(8);
            bits.blue = bits.blue.min(8);
            bits.gray = bits.gray.min(8);
            bits.alpha = bits.alpha.min(8);
            image.set_sig_bits(Some(bits));
        }
    }

    image.retag(dest_depth, dest_color);
    reductions
}

#[cfg(test)]
mod tests {
    use super::*;
    use opng_core::InterlaceMethod;

    fn gray_like_rgba(width: usize, height: usize) -> Image {
        let rows = (0..height)
            .map(|y| {
                let mut row = Vec::new();
                for x in 0..width {
                    let v = (x * 17 + y) as u8;
                    row.extend_from_slice(&[v, v, v, 255]);
                }
                row
            })
            .collect();
        Image::from_parts(
            width,
            height,
            BitDepth::Eight,
            PngColor::RGBA,
            InterlaceMethod::Standard,
            rows,
            Vec::new(),
            None
        )
        .unwrap()
    }

    #[test]
    fn gray_rgba_collapses_to_gray() {
        let mut image = gray_like_rgba(4, 4);
        let applied = reduce_bits(&mut image, Reductions::ALL);
        assert!(applied.contains(Reductions::RGB_TO_GRAY));
        assert!(applied.contains(Reductions::STRIP_ALPHA));
        assert_eq!(image.color(), PngColor::Luma);
        assert_eq!(image.depth(), BitDepth::Eight);
        for (y, row) in image.rows().iter().enumerate() {
            for (x, &v) in row.iter().enumerate() {
                assert_eq!(v, (x * 17 + y) as u8);
            }
        }
    }

    #[test]
    fn non_gray_pixel_blocks_the_color_reduction() {
        let mut image = gray_like_rgba(4, 4);
        image.rows_mut()[2][4] ^= 1; // make one red sample differ
        let applied = reduce_bits(&mut image, Reductions::ALL);
        assert!(!applied.contains(Reductions::RGB_TO_GRAY));
        assert!(applied.contains(Reductions::STRIP_ALPHA));
        assert_eq!(image.color(), PngColor::RGB);
    }

    #[test]
    fn translucent_pixel_blocks_the_alpha_strip() {
        let mut image = gray_like_rgba(4, 4);
        image.rows_mut()[0][3] = 254;
        let applied = reduce_bits(&mut image, Reductions::ALL);
        assert!(!applied.contains(Reductions::STRIP_ALPHA));
        assert_eq!(image.color(), PngColor::LumaA);
        // alpha slid over from the fourth channel to the second
        assert_eq!(image.rows()[0][1], 254);
    }

    #[test]
    fn sixteen_bit_echoes_drop_to_eight() {
        let rows = vec![vec![0x12, 0x12, 0x34, 0x34, 0x56, 0x56]; 2];
        let mut image = Image::from_parts(
            1,
            2,
            BitDepth::Sixteen,
            PngColor::RGB,
            InterlaceMethod::Standard,
            rows,
            Vec::new(),
            Some(Transparency::RgbKey(0x1212, 0x3434, 0x5656))
        )
        .unwrap();
        let applied = reduce_bits(&mut image, Reductions::ALL);
        assert!(applied.contains(Reductions::R16_TO_8));
        assert_eq!(image.depth(), BitDepth::Eight);
        assert_eq!(image.rows()[0], vec![0x12, 0x34, 0x56]);
        assert_eq!(
            image.trans(),
            Some(&Transparency::RgbKey(0x12, 0x34, 0x56))
        );
    }

    #[test]
    fn colored_background_pins_rgb() {
        let mut image = gray_like_rgba(2, 2);
        image.set_background(Some(Background::Rgb(1, 2, 3)));
        let applied = reduce_bits(&mut image, Reductions::ALL);
        assert!(!applied.contains(Reductions::RGB_TO_GRAY));
    }

    #[test]
    fn non_gray_key_is_dropped_on_gray_conversion() {
        let rows = vec![vec![9, 9, 9]; 1];
        let mut image = Image::from_parts(
            1,
            1,
            BitDepth::Eight,
            PngColor::RGB,
            InterlaceMethod::Standard,
            rows,
            Vec::new(),
            Some(Transparency::RgbKey(7, 7, 250))
        )
        .unwrap();
        let applied = reduce_bits(&mut image, Reductions::ALL);
        assert!(applied.contains(Reductions::RGB_TO_GRAY));
        assert_eq!(image.trans(), None);
    }

    #[test]
    fn mask_disables_reductions() {
        let mut image = gray_like_rgba(4, 4);
        let applied = reduce_bits(&mut image, Reductions::NONE);
        assert!(applied.is_none());
        assert_eq!(image.color(), PngColor::RGBA);
    }
}
