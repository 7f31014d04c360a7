/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! The PNG codec behind the opng optimizer.
//!
//! Two halves live here:
//!
//! - [`PngDecoder`] parses a PNG datastream into packed rows at the
//!   image's native bit depth, together with the palette, transparency
//!   and every ancillary chunk. Nothing is expanded or normalized: the
//!   reducer upstream needs the exact stored representation.
//! - [`PngEncoder`] serializes an image back out, always as a single
//!   IDAT chunk, under a caller-chosen set of deflate parameters. The
//!   encoder can run against a discarding sink ("trial mode") in which
//!   it still performs all compression work, reports the exact IDAT
//!   size, and abandons early once a size limit is exceeded.
//!
//! Inflation is done by the `zune-inflate` crate; deflation goes through
//! zlib (`libz-sys`) because the optimizer's search space is zlib's own
//! level × strategy × memLevel × windowBits grid.
pub use decoder::{DecodeEvents, PngDecoder, RawPng};
pub use deflate::{Deflater, Flow, ZlibOptions, ZlibStrategy};
pub use encoder::{
    filtered_data_size, EncodeOutcome, EncodeParams, EncoderImage, PngEncoder, Sink, WriteSeek
};

pub mod adam7;
pub mod crc;
mod decoder;
mod deflate;
mod encoder;
pub mod error;
pub mod filters;

/// The eight-byte PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// The largest length a PNG chunk may declare.
pub const PNG_CHUNK_MAX: u32 = 0x7fff_ffff;

/// Probe some bytes to see if they begin a PNG file.
pub fn probe_png(bytes: &[u8]) -> bool {
    bytes.len() >= 8 && bytes[..8] == PNG_SIGNATURE
}

/// Probe for a bare PNG datastream: no signature, but an IHDR chunk
/// header right at the start.
pub fn probe_png_datastream(bytes: &[u8]) -> bool {
    bytes.len() >= 8 && &bytes[4..8] == b"IHDR"
}

/// Bits per pixel for a color type and depth pair.
pub fn pixel_bits(color: opng_core::PngColor, depth: opng_core::BitDepth) -> usize {
    color.num_components() * depth.to_int() as usize
}

/// The byte distance between corresponding bytes of horizontally
/// adjacent pixels, as used by the row filters. Never less than one.
pub fn filter_bpp(color: opng_core::PngColor, depth: opng_core::BitDepth) -> usize {
    (pixel_bits(color, depth) / 8).max(1)
}
