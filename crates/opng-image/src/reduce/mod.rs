/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Lossless image reductions.
//!
//! A reduction narrows the stored representation without changing any
//! decoded pixel: dropping redundant high bytes, collapsing equal RGB
//! channels, stripping an all-opaque alpha channel, pruning and packing
//! palettes, or turning a small RGB(A) image into a palette image. Each
//! sub-reduction proves its own applicability by scanning the pixels,
//! then rewrites rows in place and updates every affected ancillary.
//!
//! The application order is fixed: the bit-level reductions first, then
//! the palette ones, then RGB(A)-to-palette (which may enable another
//! round of palette packing internally).

use core::fmt::{Debug, Formatter};
use core::ops::{BitAnd, BitOr, BitOrAssign};

use crate::image::Image;
use crate::options::OpngOptions;

mod bits;
mod palette;

/// A set of reduction kinds.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Reductions(u32);

impl Reductions {
    pub const NONE: Reductions = Reductions(0);
    /// 16-bit samples whose bytes agree become 8-bit.
    pub const R16_TO_8: Reductions = Reductions(0x0001);
    /// Palette rows pack down to 4, 2 or 1 bits.
    pub const R8_PACK: Reductions = Reductions(0x0002);
    /// RGB pixels that are all gray lose their chroma channels.
    pub const RGB_TO_GRAY: Reductions = Reductions(0x0010);
    /// A constant-opaque alpha channel is dropped.
    pub const STRIP_ALPHA: Reductions = Reductions(0x0020);
    /// All-gray palettes become grayscale pixels.
    pub const PALETTE_TO_GRAY: Reductions = Reductions(0x0040);
    /// Few-colored RGB(A) images become palette images.
    pub const RGB_TO_PALETTE: Reductions = Reductions(0x0080);
    /// Unused trailing palette and tRNS entries are cut.
    pub const PALETTE_PRUNE: Reductions = Reductions(0x0100);

    pub const BIT_DEPTH: Reductions = Reductions(0x0001 | 0x0002);
    pub const COLOR_TYPE: Reductions = Reductions(0x0010 | 0x0020 | 0x0040 | 0x0080);
    pub const PALETTE: Reductions = Reductions(0x0100);
    pub const ALL: Reductions = Reductions(0x0001 | 0x0002 | 0x0010 | 0x0020 | 0x0040 | 0x0080 | 0x0100);

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Reductions) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Reductions) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn without(self, other: Reductions) -> Reductions {
        Reductions(self.0 & !other.0)
    }
}

impl BitOr for Reductions {
    type Output = Reductions;
    fn bitor(self, rhs: Reductions) -> Reductions {
        Reductions(self.0 | rhs.0)
    }
}

impl BitOrAssign for Reductions {
    fn bitor_assign(&mut self, rhs: Reductions) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Reductions {
    type Output = Reductions;
    fn bitand(self, rhs: Reductions) -> Reductions {
        Reductions(self.0 & rhs.0)
    }
}

impl Debug for Reductions {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let mut names = Vec::new();
        for (flag, name) in [
            (Reductions::R16_TO_8, "16->8"),
            (Reductions::R8_PACK, "8->4,2,1"),
            (Reductions::RGB_TO_GRAY, "rgb->gray"),
            (Reductions::STRIP_ALPHA, "strip-alpha"),
            (Reductions::PALETTE_TO_GRAY, "palette->gray"),
            (Reductions::RGB_TO_PALETTE, "rgb->palette"),
            (Reductions::PALETTE_PRUNE, "palette-prune")
        ] {
            if self.contains(flag) {
                names.push(name);
            }
        }
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("+"))
        }
    }
}

/// What a reduction pass did.
#[derive(Copy, Clone, Debug)]
pub struct ReduceOutcome {
    pub applied:  Reductions,
    /// Inconsistencies repaired along the way (they imply `-fix`).
    pub warnings: usize
}

/// Resolve the reduction mask the user's options allow.
pub fn allowed_reductions(options: &OpngOptions) -> Reductions {
    let mut mask = Reductions::ALL;
    if options.no_bit_depth_reduction {
        mask = mask.without(Reductions::BIT_DEPTH);
    }
    if options.no_color_reduction {
        mask = mask.without(Reductions::COLOR_TYPE);
    }
    if options.no_palette_reduction {
        mask = mask.without(Reductions::PALETTE);
    }
    if options.no_reductions {
        mask = Reductions::NONE;
    }
    mask
}

/// Apply every reduction in `mask` that provably loses nothing,
/// in the canonical order.
pub fn reduce_image(image: &mut Image, mask: Reductions) -> ReduceOutcome {
    let mut applied = bits::reduce_bits(image, mask);
    let palette_outcome = palette::reduce_palette(image, mask);
    applied |= palette_outcome.applied;
    applied |= palette::reduce_rgb_to_palette(image, mask);
    ReduceOutcome {
        applied,
        warnings: palette_outcome.warnings
    }
}
