/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Foreign raster importers.
//!
//! Each importer converts one external format into [`ForeignImage`], the
//! common shape the optimizer builds its PNG image model from. Importers
//! never lose pixel information: samples are rescaled only when the
//! source depth has no PNG equivalent, and the rescaling is recorded in
//! `sig_bits` so the precision stays documented.
//!
//! Formats are recognized by signature via [`ForeignFormat::detect`].
//! JPEG and MNG/JNG signatures are recognized just far enough to explain
//! why they are not importable.

use core::fmt::{Debug, Formatter};

use opng_core::ancillary::SignificantBits;
use opng_core::bytestream::NotEnoughBytes;
use opng_core::{BitDepth, InterlaceMethod, PngColor};

pub mod bmp;
pub mod gif;
pub mod pnm;
pub mod tiff;

/// An imported raster, ready to become a PNG image model.
pub struct ForeignImage {
    pub width:     usize,
    pub height:    usize,
    pub depth:     BitDepth,
    pub color:     PngColor,
    /// GIF keeps its interlaced nature as Adam7 on the PNG side.
    pub interlace: InterlaceMethod,
    /// Packed rows in PNG layout at `depth`.
    pub rows:      Vec<Vec<u8>>,
    pub palette:   Vec<[u8; 3]>,
    /// A single fully-transparent palette index (GIF).
    pub transparent_index: Option<usize>,
    pub sig_bits:  Option<SignificantBits>,
    /// The sub-format name for reporting ("BMP", "GIF", "PBM", ...).
    pub format_name: &'static str,
    /// Images beyond the first that were skipped over.
    pub extra_images: usize,
    /// Count of recoverable oddities found while importing.
    pub warnings: usize
}

/// Errors common to all importers.
pub enum XternErrors {
    /// The signature matches no importable format.
    UnrecognizedFormat,
    /// JPEG is recognized but cannot be converted losslessly.
    JpegNotSupported,
    /// MNG and JNG datastreams are recognized but not importable.
    MngJngNotSupported,
    /// The input ended early.
    Truncated(NotEnoughBytes),
    /// A structural problem in the named format.
    Format(&'static str, String)
}

impl From<NotEnoughBytes> for XternErrors {
    fn from(value: NotEnoughBytes) -> Self {
        XternErrors::Truncated(value)
    }
}

impl Debug for XternErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnrecognizedFormat => writeln!(f, "Unrecognized image file format"),
            Self::JpegNotSupported => {
                writeln!(f, "JPEG is a lossy format and can't be converted to PNG losslessly")
            }
            Self::MngJngNotSupported => writeln!(f, "MNG and JNG datastreams are not supported"),
            Self::Truncated(err) => writeln!(f, "Truncated input: {err:?}"),
            Self::Format(format, reason) => writeln!(f, "Invalid {format} file: {reason}")
        }
    }
}

/// The importable foreign formats.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ForeignFormat {
    Bmp,
    Gif,
    Pnm,
    Tiff
}

impl ForeignFormat {
    /// Dispatch on the first few bytes of the file.
    ///
    /// PNG-family signatures are not handled here; the caller tries the
    /// native path first.
    pub fn detect(bytes: &[u8]) -> Result<ForeignFormat, XternErrors> {
        if bytes.len() >= 2 && &bytes[..2] == b"BM" {
            return Ok(ForeignFormat::Bmp);
        }
        if bytes.len() >= 6 && (&bytes[..6] == b"GIF87a" || &bytes[..6] == b"GIF89a") {
            return Ok(ForeignFormat::Gif);
        }
        if bytes.len() >= 3
            && bytes[0] == b'P'
            && (b'1'..=b'6').contains(&bytes[1])
            && (bytes[2].is_ascii_whitespace() || bytes[2] == b'#')
        {
            return Ok(ForeignFormat::Pnm);
        }
        if bytes.len() >= 4
            && (&bytes[..4] == b"II*\0" || &bytes[..4] == b"MM\0*")
        {
            return Ok(ForeignFormat::Tiff);
        }
        if bytes.len() >= 2 && bytes[0] == 0xff && bytes[1] == 0xd8 {
            return Err(XternErrors::JpegNotSupported);
        }
        if bytes.len() >= 4
            && (&bytes[..4] == b"\x8aMNG" || &bytes[..4] == b"\x8bJNG")
        {
            return Err(XternErrors::MngJngNotSupported);
        }
        Err(XternErrors::UnrecognizedFormat)
    }

    /// Import the file into the common image shape.
    pub fn import(self, data: &[u8]) -> Result<ForeignImage, XternErrors> {
        match self {
            ForeignFormat::Bmp => bmp::BmpDecoder::new(data).decode(),
            ForeignFormat::Gif => gif::GifDecoder::new(data).decode(),
            ForeignFormat::Pnm => pnm::PnmDecoder::new(data).decode(),
            ForeignFormat::Tiff => tiff::TiffDecoder::new(data).decode()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_dispatch() {
        assert_eq!(ForeignFormat::detect(b"BM\x00\x00").unwrap(), ForeignFormat::Bmp);
        assert_eq!(ForeignFormat::detect(b"GIF89a").unwrap(), ForeignFormat::Gif);
        assert_eq!(ForeignFormat::detect(b"P6\n1 1 255 ").unwrap(), ForeignFormat::Pnm);
        assert_eq!(ForeignFormat::detect(b"II*\0....").unwrap(), ForeignFormat::Tiff);
        assert_eq!(ForeignFormat::detect(b"MM\0*....").unwrap(), ForeignFormat::Tiff);
        assert!(matches!(
            ForeignFormat::detect(&[0xff, 0xd8, 0xff, 0xe0]),
            Err(XternErrors::JpegNotSupported)
        ));
        assert!(matches!(
            ForeignFormat::detect(b"\x8aMNG\r\n\x1a\n"),
            Err(XternErrors::MngJngNotSupported)
        ));
        assert!(matches!(
            ForeignFormat::detect(b"garbage!"),
            Err(XternErrors::UnrecognizedFormat)
        ));
    }
}
