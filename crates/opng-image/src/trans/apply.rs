/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Applying the image-data transformations: alpha reset, precision
//! quantization, and the chroma resets.

use opng_core::ancillary::Transparency;
use opng_core::BitDepth;

use super::{ChromaSpec, Transformer};
use crate::image::Image;

/// BT.601: Y = 0.299 R + 0.587 G + 0.114 B in 16-bit fixed point.
const KR_BT601: u32 = 19595;
const KG_BT601: u32 = 38470;
const KB_BT601: u32 = 7471;

/// BT.709: Y = 0.2126 R + 0.7152 G + 0.0722 B in 16-bit fixed point.
const KR_BT709: u32 = 13933;
const KG_BT709: u32 = 46871;
const KB_BT709: u32 = 4731;

/// Which image-data objects an [`Transformer::apply`] call altered.
#[derive(Copy, Clone, Debug, Default)]
pub struct AppliedTransforms {
    pub alpha:  bool,
    pub chroma: bool,
    pub rgb:    bool
}

impl AppliedTransforms {
    pub fn any(&self) -> bool {
        self.alpha || self.chroma || self.rgb
    }
}

/// Quantize an 8-bit sample to `precision` bits, rescaled back to the
/// full range. Idempotent for a fixed precision.
fn quantize8(value: u8, precision: u8) -> u8 {
    let chopped = u32::from(value) >> (8 - precision);
    let chop_max = (1u32 << precision) - 1;
    ((chopped * 255 + chop_max / 2) / chop_max) as u8
}

fn quantize16(value: u16, precision: u8) -> u16 {
    let chopped = u32::from(value) >> (16 - precision);
    let chop_max = (1u32 << precision) - 1;
    ((chopped * 65535 + chop_max / 2) / chop_max) as u16
}

fn gray8(r: u8, g: u8, b: u8, spec: ChromaSpec) -> u8 {
    let (kr, kg, kb) = match spec {
        ChromaSpec::Bt601 => (KR_BT601, KG_BT601, KB_BT601),
        ChromaSpec::Bt709 => (KR_BT709, KG_BT709, KB_BT709)
    };
    let y = u32::from(r) * kr + u32::from(g) * kg + u32::from(b) * kb;
    ((y + 32767) / 65535) as u8
}

fn gray16(r: u16, g: u16, b: u16, spec: ChromaSpec) -> u16 {
    let (kr, kg, kb) = match spec {
        ChromaSpec::Bt601 => (KR_BT601, KG_BT601, KB_BT601),
        ChromaSpec::Bt709 => (KR_BT709, KG_BT709, KB_BT709)
    };
    let y = u64::from(r) * u64::from(kr) + u64::from(g) * u64::from(kg)
        + u64::from(b) * u64::from(kb);
    ((y + 32767) / 65535) as u16
}

/// Set the alpha plane to `precision` bits, or fully opaque when the
/// precision is zero. Returns whether anything was touched.
fn set_alpha_precision(image: &mut Image, precision: u8) -> bool {
    let sixteen = image.depth() == BitDepth::Sixteen;
    if !sixteen && precision >= 8 {
        return false;
    }
    let mut applied = false;

    // tRNS first: quantize the alpha prefix, or drop the chunk on reset
    match image.trans().cloned() {
        Some(Transparency::Alpha(mut alphas)) if precision > 0 => {
            for alpha in alphas.iter_mut() {
                *alpha = quantize8(*alpha, precision);
            }
            image.set_trans(Some(Transparency::Alpha(alphas)));
            applied = true;
        }
        Some(_) if precision == 0 => {
            image.set_trans(None);
            applied = true;
        }
        _ => {}
    }

    if image.color().has_alpha() {
        let channels = image.channels();
        let byte_depth = image.byte_depth();
        let sample_size = channels * byte_depth;
        let alpha_offset = (channels - 1) * byte_depth;
        let width = image.width();
        for row in image.rows_mut() {
            for sample in row.chunks_exact_mut(sample_size).take(width) {
                let alpha = &mut sample[alpha_offset..alpha_offset + byte_depth];
                if precision == 0 {
                    alpha.fill(255);
                } else if sixteen {
                    let value = u16::from_be_bytes([alpha[0], alpha[1]]);
                    alpha.copy_from_slice(&quantize16(value, precision).to_be_bytes());
                } else {
                    alpha[0] = quantize8(alpha[0], precision);
                }
            }
        }
        applied = true;
    }
    applied
}

/// Quantize the color channels to the requested per-channel precisions.
fn set_rgb_precision(image: &mut Image, red: u8, green: u8, blue: u8) -> bool {
    let sixteen = image.depth() == BitDepth::Sixteen;
    let clip = |precision: u8| {
        if !sixteen && precision >= 8 {
            0
        } else {
            precision
        }
    };
    let (red, green, blue) = (clip(red), clip(green), clip(blue));
    if red == 0 && green == 0 && blue == 0 {
        return false;
    }

    if image.color().is_palette() {
        for entry in image.palette_mut() {
            if red > 0 {
                entry[0] = quantize8(entry[0], red);
            }
            if green > 0 {
                entry[1] = quantize8(entry[1], green);
            }
            if blue > 0 {
                entry[2] = quantize8(entry[2], blue);
            }
        }
        return true;
    }

    // grayscale samples follow the strongest of the three requests
    let gray = red.max(green).max(blue);
    let channels = image.channels();
    let byte_depth = image.byte_depth();
    let sample_size = channels * byte_depth;
    let width = image.width();
    let rgb_precisions = [red, green, blue];
    let gray_precision = [gray];
    let precisions: &[u8] = if image.color().has_color() {
        &rgb_precisions
    } else {
        &gray_precision
    };

    for row in image.rows_mut() {
        for sample in row.chunks_exact_mut(sample_size).take(width) {
            for (channel, &precision) in precisions.iter().enumerate() {
                if precision == 0 {
                    continue;
                }
                let offset = channel * byte_depth;
                if sixteen {
                    let value = u16::from_be_bytes([sample[offset], sample[offset + 1]]);
                    sample[offset..offset + 2]
                        .copy_from_slice(&quantize16(value, precision).to_be_bytes());
                } else {
                    sample[offset] = quantize8(sample[offset], precision);
                }
            }
        }
    }
    true
}

/// Convert the image to grayscale levels in place, per the requested
/// chroma coefficients. Colorspace-dependent ancillaries die with it.
fn reset_chroma(image: &mut Image, spec: ChromaSpec) -> bool {
    if image.color().is_palette() {
        for entry in image.palette_mut() {
            let y = gray8(entry[0], entry[1], entry[2], spec);
            *entry = [y, y, y];
        }
    } else if image.color().has_color() {
        let sixteen = image.depth() == BitDepth::Sixteen;
        let channels = image.channels();
        let byte_depth = image.byte_depth();
        let sample_size = channels * byte_depth;
        let width = image.width();
        for row in image.rows_mut() {
            for sample in row.chunks_exact_mut(sample_size).take(width) {
                if sixteen {
                    let r = u16::from_be_bytes([sample[0], sample[1]]);
                    let g = u16::from_be_bytes([sample[2], sample[3]]);
                    let b = u16::from_be_bytes([sample[4], sample[5]]);
                    let y = gray16(r, g, b, spec).to_be_bytes();
                    sample[0..2].copy_from_slice(&y);
                    sample[2..4].copy_from_slice(&y);
                    sample[4..6].copy_from_slice(&y);
                } else {
                    let y = gray8(sample[0], sample[1], sample[2], spec);
                    sample[0] = y;
                    sample[1] = y;
                    sample[2] = y;
                }
            }
        }
        // a suggested palette no longer matches the new colorspace
        image.palette_mut().clear();
    } else {
        // already grayscale
        return false;
    }

    // the unsafe-to-copy, colorspace-dependent ancillaries go away
    image.retain_unknown(|chunk| chunk.name != opng_core::chunk::ChunkName(*b"sPLT"));
    image.set_hist(None);
    image.set_sig_bits(None);
    true
}

impl Transformer {
    /// Apply the set/reset data transformations, before any reduction.
    pub fn apply(&self, image: &mut Image) -> AppliedTransforms {
        let mut applied = AppliedTransforms::default();

        let (red, green, blue, alpha_precision) = self.channel_precisions();

        if self.alpha_reset() {
            applied.alpha = set_alpha_precision(image, 0);
        } else if alpha_precision > 0 {
            applied.alpha = set_alpha_precision(image, alpha_precision);
        }

        if red > 0 || green > 0 || blue > 0 {
            applied.rgb = set_rgb_precision(image, red, green, blue);
        }

        if let Some(spec) = self.chroma() {
            applied.chroma = reset_chroma(image, spec);
        }

        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opng_core::{InterlaceMethod, PngColor};

    fn rgba_image(pixels: &[[u8; 4]]) -> Image {
        let row: Vec<u8> = pixels.iter().flatten().copied().collect();
        Image::from_parts(
            pixels.len(),
            1,
            BitDepth::Eight,
            PngColor::RGBA,
            InterlaceMethod::Standard,
            vec![row],
            Vec::new(),
            None
        )
        .unwrap()
    }

    #[test]
    fn alpha_reset_makes_everything_opaque() {
        let mut image = rgba_image(&[[10, 20, 30, 0], [40, 50, 60, 128]]);
        let mut transformer = Transformer::new();
        transformer.reset("image.alpha").unwrap();
        let applied = transformer.apply(&mut image);
        assert!(applied.alpha);
        assert_eq!(image.rows()[0], vec![10, 20, 30, 255, 40, 50, 60, 255]);
    }

    #[test]
    fn alpha_reset_drops_a_transparency_key() {
        let mut image = Image::from_parts(
            1,
            1,
            BitDepth::Eight,
            PngColor::Luma,
            InterlaceMethod::Standard,
            vec![vec![7]],
            Vec::new(),
            Some(Transparency::GrayKey(7))
        )
        .unwrap();
        let mut transformer = Transformer::new();
        transformer.reset("image.alpha").unwrap();
        let applied = transformer.apply(&mut image);
        assert!(applied.alpha);
        assert_eq!(image.trans(), None);
    }

    #[test]
    fn alpha_precision_is_idempotent() {
        let mut image = rgba_image(&[[1, 2, 3, 77], [4, 5, 6, 200]]);
        let mut transformer = Transformer::new();
        transformer.set("image.alpha.precision=3").unwrap();
        transformer.apply(&mut image);
        let once = image.rows()[0].clone();
        transformer.apply(&mut image);
        assert_eq!(image.rows()[0], once);
        // quantized alpha takes one of 2^3 levels, stretched over 0..=255
        let alpha = once[3];
        assert_eq!(alpha, quantize8(77, 3));
    }

    #[test]
    fn bt601_and_bt709_differ_and_gray_out_pixels() {
        let pixels = [[200, 30, 90, 255]];
        let mut a = rgba_image(&pixels);
        let mut b = rgba_image(&pixels);

        let mut t601 = Transformer::new();
        t601.reset("image.chroma.bt601").unwrap();
        assert!(t601.apply(&mut a).chroma);

        let mut t709 = Transformer::new();
        t709.reset("image.chroma.bt709").unwrap();
        assert!(t709.apply(&mut b).chroma);

        let ya = a.rows()[0][0];
        let yb = b.rows()[0][0];
        assert_eq!(&a.rows()[0][..3], &[ya, ya, ya]);
        assert_eq!(&b.rows()[0][..3], &[yb, yb, yb]);
        assert_ne!(ya, yb);
        // the fixed-point BT.601 luma of (200, 30, 90)
        let expected =
            ((200 * KR_BT601 + 30 * KG_BT601 + 90 * KB_BT601 + 32767) / 65535) as u8;
        assert_eq!(ya, expected);
    }

    #[test]
    fn chroma_reset_converts_palette_entries_in_place() {
        let mut image = Image::from_parts(
            2,
            1,
            BitDepth::Eight,
            PngColor::Palette,
            InterlaceMethod::Standard,
            vec![vec![0, 1]],
            vec![[255, 0, 0], [0, 0, 255]],
            None
        )
        .unwrap();
        image.set_hist(Some(vec![1, 1]));
        let mut transformer = Transformer::new();
        transformer.reset("image.chroma.bt601").unwrap();
        assert!(transformer.apply(&mut image).chroma);
        let red_y = gray8(255, 0, 0, ChromaSpec::Bt601);
        assert_eq!(image.palette()[0], [red_y, red_y, red_y]);
        assert_eq!(image.hist(), None);
    }

    #[test]
    fn chroma_reset_on_grayscale_is_a_no_op() {
        let mut image = Image::from_parts(
            1,
            1,
            BitDepth::Eight,
            PngColor::Luma,
            InterlaceMethod::Standard,
            vec![vec![9]],
            Vec::new(),
            None
        )
        .unwrap();
        let mut transformer = Transformer::new();
        transformer.reset("image.chroma.bt709").unwrap();
        assert!(!transformer.apply(&mut image).chroma);
    }

    #[test]
    fn sixteen_bit_alpha_quantizes_both_bytes() {
        let mut image = Image::from_parts(
            1,
            1,
            BitDepth::Sixteen,
            PngColor::LumaA,
            InterlaceMethod::Standard,
            vec![vec![0x12, 0x34, 0xab, 0xcd]],
            Vec::new(),
            None
        )
        .unwrap();
        let mut transformer = Transformer::new();
        transformer.set("image.alpha.precision=5").unwrap();
        assert!(transformer.apply(&mut image).alpha);
        let expected = quantize16(0xabcd, 5).to_be_bytes();
        assert_eq!(&image.rows()[0][2..4], &expected);
    }
}
