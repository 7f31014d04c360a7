/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Per-file status flags and encoding statistics.

/// Facts established about the input, and decisions about the output.
#[derive(Copy, Clone, Debug, Default)]
pub struct StatusFlags {
    /// The input decoded through the native PNG path (with or without
    /// the eight-byte signature), as opposed to a foreign import.
    pub is_png_file: bool,
    pub has_png_datastream: bool,
    pub has_png_signature: bool,
    pub has_digital_signature: bool,
    pub has_multiple_images: bool,
    /// Images beyond the first were discarded while importing.
    pub has_snipped_images: bool,
    /// The strip/protect resolution removes at least one chunk.
    pub has_stripped_metadata: bool,
    /// Removable overhead: split IDATs, snipped or stripped content.
    pub has_junk: bool,
    /// Recoverable errors were found in the input.
    pub has_errors: bool,
    /// The output file must be written even if IDAT is kept.
    pub needs_new_file: bool,
    /// The IDAT datastream must be recompressed.
    pub needs_new_idat: bool
}

/// Sizes measured on one side of the session (input or output).
#[derive(Copy, Clone, Debug, Default)]
pub struct EncodingStats {
    pub file_size: u64,
    pub idat_size: u64,
    /// PLTE + tRNS including the twelve bytes of per-chunk overhead.
    pub plte_trns_size: u64,
    /// Where the PNG datastream begins in the file.
    pub datastream_offset: u64
}
