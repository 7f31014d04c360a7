/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Errors possible while optimizing.

use core::fmt::{Debug, Formatter};

use opng_png::error::{PngDecodeErrors, PngEncodeErrors};
use opng_xtern::XternErrors;

/// Everything that can go wrong for one input file.
pub enum OpngErrors {
    Decode(PngDecodeErrors),
    Encode(PngEncodeErrors),
    Import(XternErrors),
    Io(std::io::Error),
    /// Recoverable errors were found but `-fix` was not given.
    ErrorsNotFixed,
    /// The file is digitally signed and `-force` was not given.
    SignedFile,
    /// A multi-image file needs `-snip` to become a single PNG.
    SnipRequired,
    /// IDAT recoding is required but `-nz` forbids it.
    RecodingDisallowed,
    /// Contradictory or out-of-range options.
    Usage(String),
    Generic(String),
    GenericStatic(&'static str)
}

impl From<PngDecodeErrors> for OpngErrors {
    fn from(value: PngDecodeErrors) -> Self {
        OpngErrors::Decode(value)
    }
}

impl From<PngEncodeErrors> for OpngErrors {
    fn from(value: PngEncodeErrors) -> Self {
        OpngErrors::Encode(value)
    }
}

impl From<XternErrors> for OpngErrors {
    fn from(value: XternErrors) -> Self {
        OpngErrors::Import(value)
    }
}

impl From<std::io::Error> for OpngErrors {
    fn from(value: std::io::Error) -> Self {
        OpngErrors::Io(value)
    }
}

impl From<String> for OpngErrors {
    fn from(value: String) -> Self {
        OpngErrors::Generic(value)
    }
}

impl From<&'static str> for OpngErrors {
    fn from(value: &'static str) -> Self {
        OpngErrors::GenericStatic(value)
    }
}

impl Debug for OpngErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Decode(err) => write!(f, "{err:?}"),
            Self::Encode(err) => write!(f, "{err:?}"),
            Self::Import(err) => write!(f, "{err:?}"),
            Self::Io(err) => writeln!(f, "I/O error: {err}"),
            Self::ErrorsNotFixed => {
                writeln!(
                    f,
                    "Recoverable errors found in input; rerun with -fix to repair them"
                )
            }
            Self::SignedFile => {
                writeln!(
                    f,
                    "The file is digitally signed and can't be processed; rerun with -force"
                )
            }
            Self::SnipRequired => {
                writeln!(
                    f,
                    "The multi-image file can't be converted to PNG losslessly; \
                     rerun with -snip to keep the first image only"
                )
            }
            Self::RecodingDisallowed => {
                writeln!(
                    f,
                    "IDAT recoding is necessary, but an option that disallows it is enabled"
                )
            }
            Self::Usage(msg) => writeln!(f, "{msg}"),
            Self::Generic(msg) => writeln!(f, "{msg}"),
            Self::GenericStatic(msg) => writeln!(f, "{msg}")
        }
    }
}
