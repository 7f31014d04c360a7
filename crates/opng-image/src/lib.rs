/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! The opng optimization engine.
//!
//! Pipeline for one file: decode (native PNG or an imported foreign
//! raster) into the [`image::Image`] model, apply the chunk/data
//! transformations, run the lossless reductions, search the deflate
//! parameter grid for the smallest IDAT, and emit either a fresh
//! datastream or a filtered byte-copy of the original.
//!
//! The crate is file-system agnostic: inputs are byte slices and
//! outputs are `Write` sinks. The command line layer owns paths,
//! backups and exit codes.
pub mod copy;
pub mod errors;
pub mod image;
pub mod import;
pub mod optimize;
pub mod options;
pub mod reduce;
pub mod stats;
pub mod trans;
pub mod trial;

pub use errors::OpngErrors;
pub use image::Image;
pub use optimize::{Analysis, Session};
pub use options::OpngOptions;
pub use reduce::{allowed_reductions, reduce_image, ReduceOutcome, Reductions};
pub use stats::{EncodingStats, StatusFlags};
pub use trans::{TransformErrors, Transformer};

// the codec types callers need when driving the engine directly
pub use opng_png::{EncodeParams, Sink, ZlibOptions, ZlibStrategy};
