/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Decode and encode error types.

use core::fmt::{Debug, Formatter};

use opng_core::bytestream::NotEnoughBytes;
use opng_core::chunk::ChunkName;

/// Errors from PNG decoding.
pub enum PngDecodeErrors {
    /// The first eight bytes are not a PNG signature nor an IHDR header.
    BadSignature,
    /// A chunk declared a length above the PNG limit.
    BadChunkLength(ChunkName, u32),
    /// The IHDR fields do not describe a decodable image.
    BadIhdr(String),
    /// A required chunk is missing or misplaced.
    MissingChunk(&'static str),
    /// The zlib stream inside IDAT could not be inflated.
    Inflate(String),
    /// The input ended early and not enough critical data had been seen
    /// to recover.
    Truncated(NotEnoughBytes),
    Generic(String),
    GenericStatic(&'static str)
}

impl From<NotEnoughBytes> for PngDecodeErrors {
    fn from(value: NotEnoughBytes) -> Self {
        PngDecodeErrors::Truncated(value)
    }
}

impl From<String> for PngDecodeErrors {
    fn from(value: String) -> Self {
        PngDecodeErrors::Generic(value)
    }
}

impl From<&'static str> for PngDecodeErrors {
    fn from(value: &'static str) -> Self {
        PngDecodeErrors::GenericStatic(value)
    }
}

impl Debug for PngDecodeErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BadSignature => writeln!(f, "Bad PNG signature, not a PNG"),
            Self::BadChunkLength(name, length) => {
                writeln!(f, "Chunk {name:?} declares an impossible length {length}")
            }
            Self::BadIhdr(reason) => writeln!(f, "Invalid IHDR: {reason}"),
            Self::MissingChunk(name) => writeln!(f, "Missing or misplaced {name} chunk"),
            Self::Inflate(reason) => writeln!(f, "Corrupted IDAT stream: {reason}"),
            Self::Truncated(err) => writeln!(f, "Truncated input: {err:?}"),
            Self::Generic(val) => writeln!(f, "{val}"),
            Self::GenericStatic(val) => writeln!(f, "{val}")
        }
    }
}

/// Errors from PNG encoding.
pub enum PngEncodeErrors {
    /// zlib rejected the deflate parameters or failed mid-stream.
    Zlib(&'static str, i32),
    /// The actual IDAT size differed from the pre-written length and the
    /// sink cannot seek back to correct it.
    UnseekableSink,
    /// The joined IDAT would exceed the PNG chunk length limit.
    OversizedIdat(u64),
    Io(std::io::Error),
    Generic(String),
    GenericStatic(&'static str)
}

impl From<std::io::Error> for PngEncodeErrors {
    fn from(value: std::io::Error) -> Self {
        PngEncodeErrors::Io(value)
    }
}

impl From<String> for PngEncodeErrors {
    fn from(value: String) -> Self {
        PngEncodeErrors::Generic(value)
    }
}

impl From<&'static str> for PngEncodeErrors {
    fn from(value: &'static str) -> Self {
        PngEncodeErrors::GenericStatic(value)
    }
}

impl Debug for PngEncodeErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Zlib(stage, code) => writeln!(f, "zlib {stage} failed with code {code}"),
            Self::UnseekableSink => {
                writeln!(
                    f,
                    "Can't finalize IDAT: the output is not seekable and the IDAT size was not known in advance"
                )
            }
            Self::OversizedIdat(size) => {
                writeln!(f, "IDAT size {size} exceeds the PNG chunk limit")
            }
            Self::Io(err) => writeln!(f, "I/O error: {err}"),
            Self::Generic(val) => writeln!(f, "{val}"),
            Self::GenericStatic(val) => writeln!(f, "{val}")
        }
    }
}
