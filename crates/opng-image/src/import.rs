/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Input dispatch: native PNG decoding or foreign-format import, both
//! landing in the common image model with session flags attached.

use opng_png::{probe_png, probe_png_datastream, PngDecoder};
use opng_xtern::ForeignFormat;

use crate::errors::OpngErrors;
use crate::image::Image;
use crate::stats::{EncodingStats, StatusFlags};

/// The result of reading one input file into the model.
pub struct DecodedInput {
    pub image:       Image,
    pub flags:       StatusFlags,
    pub in_stats:    EncodingStats,
    pub format_name: &'static str,
    /// APNG control chunks were present (they ride along as unknown
    /// chunks until stripping decides their fate).
    pub has_apng:    bool
}

pub fn decode_input(data: &[u8]) -> Result<DecodedInput, OpngErrors> {
    if probe_png(data) || probe_png_datastream(data) {
        let raw = PngDecoder::new(data).decode()?;
        let events = raw.events;
        let image = Image::from_raw(raw).map_err(OpngErrors::Generic)?;
        let flags = StatusFlags {
            // the native decode path was taken; signature presence is
            // tracked separately
            is_png_file: true,
            has_png_datastream: true,
            has_png_signature: events.has_signature,
            has_digital_signature: events.has_digital_signature,
            has_multiple_images: events.has_multiple_images,
            has_junk: events.split_idats,
            has_errors: events.has_errors,
            ..StatusFlags::default()
        };
        let in_stats = EncodingStats {
            file_size: data.len() as u64,
            idat_size: events.idat_size,
            plte_trns_size: events.plte_trns_size,
            datastream_offset: 0
        };
        let format_name = if events.has_apng { "APNG" } else { "PNG" };
        return Ok(DecodedInput {
            image,
            flags,
            in_stats,
            format_name,
            has_apng: events.has_apng
        });
    }

    let format = ForeignFormat::detect(data)?;
    let foreign = format.import(data)?;
    let format_name = foreign.format_name;
    let extra_images = foreign.extra_images;
    let warnings = foreign.warnings;
    let image = Image::from_foreign(foreign).map_err(OpngErrors::Generic)?;
    let flags = StatusFlags {
        has_multiple_images: extra_images > 0,
        has_snipped_images: extra_images > 0,
        has_errors: warnings > 0,
        ..StatusFlags::default()
    };
    let in_stats = EncodingStats {
        file_size: data.len() as u64,
        ..EncodingStats::default()
    };
    Ok(DecodedInput {
        image,
        flags,
        in_stats,
        format_name,
        has_apng: false
    })
}
