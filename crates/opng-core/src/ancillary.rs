/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Ancillary image data carried alongside the pixels: transparency,
//! background, histogram, significant bits, and unclassified chunks.

use crate::chunk::ChunkName;

/// Transparency information, the in-memory form of tRNS.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Transparency {
    /// Per-palette-entry alpha values. May be shorter than the palette;
    /// entries past the end are opaque.
    Alpha(Vec<u8>),
    /// A fully transparent gray sample value.
    GrayKey(u16),
    /// A fully transparent RGB sample value.
    RgbKey(u16, u16, u16)
}

/// Background color, the in-memory form of bKGD.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Background {
    Gray(u16),
    Rgb(u16, u16, u16),
    PaletteIndex(u8)
}

/// Significant bits per channel, the in-memory form of sBIT.
///
/// Only the fields meaningful for the current color type are consulted.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct SignificantBits {
    pub red:   u8,
    pub green: u8,
    pub blue:  u8,
    pub gray:  u8,
    pub alpha: u8
}

/// Where an unclassified chunk sat relative to PLTE and IDAT.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChunkLocation {
    BeforePlte,
    BeforeIdat,
    AfterIdat
}

/// A chunk the optimizer carries through without interpreting.
#[derive(Clone, Debug)]
pub struct UnknownChunk {
    pub name:     ChunkName,
    pub location: ChunkLocation,
    pub data:     Vec<u8>
}
