/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! A thin streaming wrapper around zlib's deflate.
//!
//! The optimizer's search space is zlib's native parameter grid — level,
//! strategy, memLevel and windowBits — so this module talks to zlib
//! (`libz-sys`) directly instead of going through a higher level crate
//! that hides those knobs. All unsafety lives here; the rest of the
//! workspace sees a safe push/finish interface with a caller-supplied
//! sink that can stop the stream early.

use std::mem::MaybeUninit;

use libz_sys::{
    deflate, deflateEnd, deflateInit2_, z_stream, zlibVersion, Z_BUF_ERROR, Z_DEFLATED, Z_FINISH,
    Z_NO_FLUSH, Z_OK, Z_STREAM_END
};

use crate::error::PngEncodeErrors;

/// The four zlib strategies the trial engine iterates over.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Default)]
pub enum ZlibStrategy {
    #[default]
    Default,
    Filtered,
    HuffmanOnly,
    Rle
}

impl ZlibStrategy {
    pub fn from_int(int: u8) -> Option<ZlibStrategy> {
        match int {
            0 => Some(Self::Default),
            1 => Some(Self::Filtered),
            2 => Some(Self::HuffmanOnly),
            3 => Some(Self::Rle),
            _ => None
        }
    }

    pub const fn to_int(self) -> i32 {
        match self {
            Self::Default => 0,
            Self::Filtered => 1,
            Self::HuffmanOnly => 2,
            Self::Rle => 3
        }
    }

    /// Huffman-only and RLE ignore the compression level; the trial
    /// engine degenerates their level sets.
    pub const fn is_degenerate(self) -> bool {
        matches!(self, Self::HuffmanOnly | Self::Rle)
    }
}

/// Deflate parameters for one encoding.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ZlibOptions {
    /// Compression level, 1..=9.
    pub level:       i32,
    pub strategy:    ZlibStrategy,
    /// zlib memLevel, 1..=9.
    pub mem_level:   i32,
    /// LZ77 window size as log2, 8..=15.
    pub window_bits: i32
}

impl Default for ZlibOptions {
    fn default() -> Self {
        ZlibOptions {
            level:       9,
            strategy:    ZlibStrategy::Default,
            mem_level:   8,
            window_bits: 15
        }
    }
}

/// Whether the consumer wants the stream to keep going.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Flow {
    Continue,
    /// Stop compressing; the output so far is already useless to the
    /// caller (a trial ran past its size limit).
    Abandon
}

/// An open zlib deflate stream.
pub struct Deflater {
    stream: Box<z_stream>
}

// the sink sees output in chunks of this size
const OUT_BUF_SIZE: usize = 32 * 1024;

impl Deflater {
    pub fn new(options: &ZlibOptions) -> Result<Deflater, PngEncodeErrors> {
        // A zeroed z_stream is the documented zlib initialization state:
        // null zalloc/zfree select the default allocator.
        let mut stream: Box<z_stream> = Box::new(unsafe { MaybeUninit::zeroed().assume_init() });
        let ret = unsafe {
            deflateInit2_(
                &mut *stream,
                options.level,
                Z_DEFLATED,
                options.window_bits,
                options.mem_level,
                options.strategy.to_int(),
                zlibVersion(),
                core::mem::size_of::<z_stream>() as i32
            )
        };
        if ret != Z_OK {
            return Err(PngEncodeErrors::Zlib("deflateInit2", ret));
        }
        Ok(Deflater { stream })
    }

    fn drive<F>(&mut self, input: &[u8], flush: i32, sink: &mut F) -> Result<Flow, PngEncodeErrors>
    where
        F: FnMut(&[u8]) -> Result<Flow, PngEncodeErrors>
    {
        let mut out_buf = [0u8; OUT_BUF_SIZE];

        self.stream.next_in = input.as_ptr() as *mut u8;
        self.stream.avail_in = input.len() as u32;

        loop {
            self.stream.next_out = out_buf.as_mut_ptr();
            self.stream.avail_out = OUT_BUF_SIZE as u32;

            let ret = unsafe { deflate(&mut *self.stream, flush) };
            if ret != Z_OK && ret != Z_STREAM_END && ret != Z_BUF_ERROR {
                return Err(PngEncodeErrors::Zlib("deflate", ret));
            }

            let produced = OUT_BUF_SIZE - self.stream.avail_out as usize;
            if produced > 0 {
                if let Flow::Abandon = sink(&out_buf[..produced])? {
                    return Ok(Flow::Abandon);
                }
            }

            if ret == Z_STREAM_END {
                return Ok(Flow::Continue);
            }
            if flush == Z_NO_FLUSH && self.stream.avail_in == 0 && produced < OUT_BUF_SIZE {
                return Ok(Flow::Continue);
            }
            if ret == Z_BUF_ERROR && produced == 0 {
                if flush == Z_NO_FLUSH && self.stream.avail_in == 0 {
                    return Ok(Flow::Continue);
                }
                // no forward progress is possible; a second finish()
                // on a closed stream ends up here
                return Err(PngEncodeErrors::Zlib("deflate", ret));
            }
        }
    }

    /// Feed more raw bytes into the stream, handing compressed output to
    /// `sink` as it appears.
    pub fn push<F>(&mut self, input: &[u8], sink: &mut F) -> Result<Flow, PngEncodeErrors>
    where
        F: FnMut(&[u8]) -> Result<Flow, PngEncodeErrors>
    {
        self.drive(input, Z_NO_FLUSH, sink)
    }

    /// Flush the remaining output and close the zlib stream.
    pub fn finish<F>(&mut self, sink: &mut F) -> Result<Flow, PngEncodeErrors>
    where
        F: FnMut(&[u8]) -> Result<Flow, PngEncodeErrors>
    {
        self.drive(&[], Z_FINISH, sink)
    }
}

impl Drop for Deflater {
    fn drop(&mut self) {
        unsafe {
            deflateEnd(&mut *self.stream);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compress_all(options: &ZlibOptions, input: &[u8]) -> Vec<u8> {
        let mut deflater = Deflater::new(options).unwrap();
        let mut out = Vec::new();
        let mut sink = |chunk: &[u8]| {
            out.extend_from_slice(chunk);
            Ok(Flow::Continue)
        };
        assert_eq!(deflater.push(input, &mut sink).unwrap(), Flow::Continue);
        assert_eq!(deflater.finish(&mut sink).unwrap(), Flow::Continue);
        out
    }

    #[test]
    fn zlib_stream_round_trips_through_inflate() {
        let input: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        for strategy in [
            ZlibStrategy::Default,
            ZlibStrategy::Filtered,
            ZlibStrategy::HuffmanOnly,
            ZlibStrategy::Rle
        ] {
            let options = ZlibOptions {
                level: if strategy == ZlibStrategy::HuffmanOnly { 1 } else { 9 },
                strategy,
                mem_level: 8,
                window_bits: 15
            };
            let compressed = compress_all(&options, &input);
            let decoded = zune_inflate::DeflateDecoder::new(&compressed)
                .decode_zlib()
                .unwrap();
            assert_eq!(decoded, input, "{strategy:?}");
        }
    }

    #[test]
    fn small_windows_are_accepted() {
        let input = vec![7u8; 4096];
        for window_bits in 8..=15 {
            let options = ZlibOptions {
                level: 9,
                strategy: ZlibStrategy::Default,
                mem_level: 8,
                window_bits
            };
            let compressed = compress_all(&options, &input);
            let decoded = zune_inflate::DeflateDecoder::new(&compressed)
                .decode_zlib()
                .unwrap();
            assert_eq!(decoded, input);
        }
    }

    #[test]
    fn abandon_stops_the_stream() {
        let input = vec![0u8; 1 << 20];
        let mut deflater = Deflater::new(&ZlibOptions::default()).unwrap();
        let mut seen = 0usize;
        let mut sink = |chunk: &[u8]| {
            seen += chunk.len();
            Ok(if seen > 16 { Flow::Abandon } else { Flow::Continue })
        };
        let mut flow = deflater.push(&input, &mut sink).unwrap();
        if flow == Flow::Continue {
            flow = deflater.finish(&mut sink).unwrap();
        }
        assert_eq!(flow, Flow::Abandon);
    }

    #[test]
    fn bad_parameters_are_rejected() {
        let options = ZlibOptions {
            level: 99,
            strategy: ZlibStrategy::Default,
            mem_level: 8,
            window_bits: 15
        };
        assert!(Deflater::new(&options).is_err());
    }
}
