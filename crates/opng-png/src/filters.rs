/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! The five PNG row filters, in both directions, and the adaptive
//! per-row chooser used when the trial filter is 5.
//!
//! Filtering works on bytes: `bpp` is the distance between corresponding
//! bytes of horizontally adjacent pixels, never less than one, so packed
//! sub-byte rows filter with `bpp = 1`.

/// Filter type bytes as stored in the datastream.
pub const FILTER_NONE: u8 = 0;
pub const FILTER_SUB: u8 = 1;
pub const FILTER_UP: u8 = 2;
pub const FILTER_AVG: u8 = 3;
pub const FILTER_PAETH: u8 = 4;

/// The sixth pseudo-filter: choose per row.
pub const FILTER_ADAPTIVE: u8 = 5;

#[inline(always)]
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let a = i16::from(a);
    let b = i16::from(b);
    let c = i16::from(c);
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        return a as u8;
    }
    if pb <= pc {
        return b as u8;
    }
    c as u8
}

/// Reconstruct a row in place from its filtered form.
///
/// `prev` is the reconstructed row above, or `None` for the first row of
/// an image or interlace pass.
pub fn unfilter_row(
    filter: u8, bpp: usize, prev: Option<&[u8]>, row: &mut [u8]
) -> Result<(), &'static str> {
    let len = row.len();
    match filter {
        FILTER_NONE => {}
        FILTER_SUB => {
            for i in bpp..len {
                row[i] = row[i].wrapping_add(row[i - bpp]);
            }
        }
        FILTER_UP => {
            if let Some(prev) = prev {
                for i in 0..len {
                    row[i] = row[i].wrapping_add(prev[i]);
                }
            }
        }
        FILTER_AVG => match prev {
            Some(prev) => {
                for i in 0..bpp.min(len) {
                    row[i] = row[i].wrapping_add(prev[i] >> 1);
                }
                for i in bpp..len {
                    let a = row[i - bpp];
                    let b = prev[i];
                    // overflow-free average, keeps the math in eight bits
                    let avg = (a & b) + ((a ^ b) >> 1);
                    row[i] = row[i].wrapping_add(avg);
                }
            }
            None => {
                for i in bpp..len {
                    row[i] = row[i].wrapping_add(row[i - bpp] >> 1);
                }
            }
        },
        FILTER_PAETH => match prev {
            Some(prev) => {
                for i in 0..bpp.min(len) {
                    row[i] = row[i].wrapping_add(paeth(0, prev[i], 0));
                }
                for i in bpp..len {
                    let p = paeth(row[i - bpp], prev[i], prev[i - bpp]);
                    row[i] = row[i].wrapping_add(p);
                }
            }
            None => {
                // with the row above all zero, paeth degenerates to sub
                for i in bpp..len {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            }
        },
        _ => return Err("unknown filter type in scanline")
    }
    Ok(())
}

/// Filter `row` into `out` under a fixed filter. `out` must be the same
/// length as `row`; the filter type byte is not included.
pub fn filter_row(filter: u8, bpp: usize, prev: Option<&[u8]>, row: &[u8], out: &mut [u8]) {
    let len = row.len();
    debug_assert_eq!(out.len(), len);
    match filter {
        FILTER_NONE => out.copy_from_slice(row),
        FILTER_SUB => {
            out[..bpp.min(len)].copy_from_slice(&row[..bpp.min(len)]);
            for i in bpp..len {
                out[i] = row[i].wrapping_sub(row[i - bpp]);
            }
        }
        FILTER_UP => match prev {
            Some(prev) => {
                for i in 0..len {
                    out[i] = row[i].wrapping_sub(prev[i]);
                }
            }
            None => out.copy_from_slice(row)
        },
        FILTER_AVG => {
            for i in 0..bpp.min(len) {
                let b = prev.map_or(0, |p| p[i]);
                out[i] = row[i].wrapping_sub(b >> 1);
            }
            for i in bpp..len {
                let a = u16::from(row[i - bpp]);
                let b = u16::from(prev.map_or(0, |p| p[i]));
                out[i] = row[i].wrapping_sub(((a + b) >> 1) as u8);
            }
        }
        FILTER_PAETH => {
            for i in 0..bpp.min(len) {
                let b = prev.map_or(0, |p| p[i]);
                out[i] = row[i].wrapping_sub(paeth(0, b, 0));
            }
            for i in bpp..len {
                let a = row[i - bpp];
                let b = prev.map_or(0, |p| p[i]);
                let c = prev.map_or(0, |p| p[i - bpp]);
                out[i] = row[i].wrapping_sub(paeth(a, b, c));
            }
        }
        _ => unreachable!("fixed filter expected")
    }
}

/// Pick the filter for one row by the minimum-sum-of-absolute-differences
/// heuristic: each candidate's filtered bytes are summed as signed
/// magnitudes and the smallest sum wins.
pub fn choose_filter(bpp: usize, prev: Option<&[u8]>, row: &[u8], scratch: &mut [u8]) -> u8 {
    let mut best_filter = FILTER_NONE;
    let mut best_sum = u64::MAX;

    for filter in FILTER_NONE..=FILTER_PAETH {
        filter_row(filter, bpp, prev, row, scratch);
        let sum: u64 = scratch
            .iter()
            .map(|&b| u64::from((b as i8).unsigned_abs()))
            .sum();
        if sum < best_sum {
            best_sum = sum;
            best_filter = filter;
        }
    }
    best_filter
}
