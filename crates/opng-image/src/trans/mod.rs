/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Chunk- and image-data transformations: `-strip`, `-protect`,
//! `-reset` and `-set`.
//!
//! Object names form a small vocabulary (`all`, `image.alpha`,
//! `image.chroma.bt601`, precision objects, `animation`) extended by
//! literal chunk names. Strip and protect collect two sets which the
//! per-chunk predicate resolves at write time; reset and set describe
//! pixel-data edits applied before the reductions run.

use core::fmt::{Debug, Formatter};
use std::collections::BTreeSet;

use opng_core::chunk::ChunkName;

mod apply;

pub use apply::AppliedTransforms;

/// Which grayscale conversion a `-reset image.chroma.*` asked for.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChromaSpec {
    Bt601,
    Bt709
}

/// Errors from resolving the transformation options.
pub enum TransformErrors {
    /// `-set` of a text chunk parses but is reserved.
    SetMetadataNotImplemented,
    /// Critical chunks never strip.
    CannotStripCritical(String),
    /// tRNS is image data; `-reset image.alpha` is the way.
    CannotStripTrns,
    /// The object exists but does not support this action.
    CannotApply(&'static str, String),
    /// bt601 and bt709 at the same time.
    ChromaConflict,
    /// A precision value outside 1..=15, or conflicting values.
    BadPrecision(String),
    /// Not an object at all.
    UnknownObject(String)
}

impl Debug for TransformErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::SetMetadataNotImplemented => {
                writeln!(f, "Setting metadata is not implemented")
            }
            Self::CannotStripCritical(name) => {
                writeln!(f, "Can't strip the critical chunk {name}")
            }
            Self::CannotStripTrns => {
                writeln!(f, "Can't strip tRNS; use -reset image.alpha instead")
            }
            Self::CannotApply(action, name) => {
                writeln!(f, "Can't {action} the object {name}")
            }
            Self::ChromaConflict => {
                writeln!(
                    f,
                    "image.chroma.bt601 and image.chroma.bt709 are mutually exclusive"
                )
            }
            Self::BadPrecision(reason) => writeln!(f, "Incorrect precision: {reason}"),
            Self::UnknownObject(name) => writeln!(f, "Unrecognized object {name}")
        }
    }
}

/// The built-in object names.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum ObjectId {
    All,
    Image,
    ImageAlpha,
    ImageChromaBt601,
    ImageChromaBt709,
    ImageGrayPrecision,
    ImageRedPrecision,
    ImageGreenPrecision,
    ImageBluePrecision,
    ImageRgbPrecision,
    ImageAlphaPrecision,
    ImagePrecision,
    Animation,
    Chunk(ChunkName)
}

fn parse_object(name: &str) -> Result<ObjectId, TransformErrors> {
    match name {
        "all" => Ok(ObjectId::All),
        "image" => Ok(ObjectId::Image),
        "image.alpha" => Ok(ObjectId::ImageAlpha),
        "image.chroma.bt601" => Ok(ObjectId::ImageChromaBt601),
        "image.chroma.bt709" => Ok(ObjectId::ImageChromaBt709),
        "image.gray.precision" => Ok(ObjectId::ImageGrayPrecision),
        "image.red.precision" => Ok(ObjectId::ImageRedPrecision),
        "image.green.precision" => Ok(ObjectId::ImageGreenPrecision),
        "image.blue.precision" => Ok(ObjectId::ImageBluePrecision),
        "image.rgb.precision" => Ok(ObjectId::ImageRgbPrecision),
        "image.alpha.precision" => Ok(ObjectId::ImageAlphaPrecision),
        "image.precision" => Ok(ObjectId::ImagePrecision),
        "animation" => Ok(ObjectId::Animation),
        other => {
            let bytes = other.as_bytes();
            if bytes.len() == 4 {
                let name = ChunkName([bytes[0], bytes[1], bytes[2], bytes[3]]);
                if name.is_well_formed() {
                    return Ok(ObjectId::Chunk(name));
                }
            }
            Err(TransformErrors::UnknownObject(other.into()))
        }
    }
}

/// Holds the resolved transformation requests for a whole run.
#[derive(Default)]
pub struct Transformer {
    strip_all:    bool,
    strip_sigs:   BTreeSet<ChunkName>,
    protect_all:  bool,
    protect_sigs: BTreeSet<ChunkName>,

    reset_alpha:     bool,
    reset_chroma:    Option<ChromaSpec>,
    reset_animation: bool,

    precision:       u8,
    red_precision:   u8,
    green_precision: u8,
    blue_precision:  u8,
    alpha_precision: u8
}

impl Transformer {
    pub fn new() -> Transformer {
        Transformer::default()
    }

    fn for_each_object(
        names: &str, mut handle: impl FnMut(ObjectId, &str) -> Result<(), TransformErrors>
    ) -> Result<(), TransformErrors> {
        for name in names.split(',') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            handle(parse_object(name)?, name)?;
        }
        Ok(())
    }

    /// Resolve one `-strip` argument.
    pub fn strip(&mut self, names: &str) -> Result<(), TransformErrors> {
        Self::for_each_object(names, |id, name| match id {
            ObjectId::All => {
                self.strip_all = true;
                Ok(())
            }
            ObjectId::Chunk(sig) => {
                if sig == opng_core::chunk::TRNS {
                    return Err(TransformErrors::CannotStripTrns);
                }
                if sig.is_critical() {
                    return Err(TransformErrors::CannotStripCritical(name.into()));
                }
                self.strip_sigs.insert(sig);
                Ok(())
            }
            _ => Err(TransformErrors::CannotApply("strip", name.into()))
        })
    }

    /// Resolve one `-protect` argument.
    pub fn protect(&mut self, names: &str) -> Result<(), TransformErrors> {
        Self::for_each_object(names, |id, name| match id {
            ObjectId::All => {
                self.protect_all = true;
                Ok(())
            }
            ObjectId::Chunk(sig) => {
                self.protect_sigs.insert(sig);
                Ok(())
            }
            _ => Err(TransformErrors::CannotApply("protect", name.into()))
        })
    }

    /// Resolve one `-reset` argument.
    pub fn reset(&mut self, names: &str) -> Result<(), TransformErrors> {
        Self::for_each_object(names, |id, name| match id {
            ObjectId::ImageAlpha => {
                self.reset_alpha = true;
                Ok(())
            }
            ObjectId::ImageChromaBt601 => {
                if self.reset_chroma == Some(ChromaSpec::Bt709) {
                    return Err(TransformErrors::ChromaConflict);
                }
                self.reset_chroma = Some(ChromaSpec::Bt601);
                Ok(())
            }
            ObjectId::ImageChromaBt709 => {
                if self.reset_chroma == Some(ChromaSpec::Bt601) {
                    return Err(TransformErrors::ChromaConflict);
                }
                self.reset_chroma = Some(ChromaSpec::Bt709);
                Ok(())
            }
            ObjectId::Animation => {
                self.reset_animation = true;
                Ok(())
            }
            _ => Err(TransformErrors::CannotApply("reset", name.into()))
        })
    }

    fn set_precision(slot: &mut u8, value: u8) -> Result<(), TransformErrors> {
        if *slot != 0 && *slot != value {
            return Err(TransformErrors::BadPrecision(format!(
                "inconsistent values {} and {value}",
                *slot
            )));
        }
        *slot = value;
        Ok(())
    }

    /// Resolve one `-set object=value` argument.
    pub fn set(&mut self, name_eq_value: &str) -> Result<(), TransformErrors> {
        let (name, value) = name_eq_value
            .split_once('=')
            .map(|(n, v)| (n.trim(), v.trim()))
            .ok_or_else(|| TransformErrors::UnknownObject(name_eq_value.into()))?;

        let id = parse_object(name)?;
        if let ObjectId::Chunk(_) = id {
            // `-set tEXt=...` and friends parse but are reserved
            return Err(TransformErrors::SetMetadataNotImplemented);
        }

        let precision: u8 = value
            .parse()
            .map_err(|_| TransformErrors::BadPrecision(format!("\"{value}\"")))?;
        if precision == 0 || precision >= 16 {
            return Err(TransformErrors::BadPrecision(format!(
                "{precision} is outside 1..=15"
            )));
        }

        match id {
            ObjectId::ImageGrayPrecision => Err(TransformErrors::CannotApply(
                "set",
                "image.gray.precision; set image.rgb.precision to control \
                 grayscale samples"
                    .into()
            )),
            ObjectId::ImagePrecision => Self::set_precision(&mut self.precision, precision),
            ObjectId::ImageRedPrecision => {
                Self::set_precision(&mut self.red_precision, precision)
            }
            ObjectId::ImageGreenPrecision => {
                Self::set_precision(&mut self.green_precision, precision)
            }
            ObjectId::ImageBluePrecision => {
                Self::set_precision(&mut self.blue_precision, precision)
            }
            ObjectId::ImageRgbPrecision => {
                Self::set_precision(&mut self.red_precision, precision)?;
                Self::set_precision(&mut self.green_precision, precision)?;
                Self::set_precision(&mut self.blue_precision, precision)
            }
            ObjectId::ImageAlphaPrecision => {
                Self::set_precision(&mut self.alpha_precision, precision)
            }
            _ => Err(TransformErrors::CannotApply("set", name.into()))
        }
    }

    /// `-snip` resets the animation implicitly.
    pub fn reset_animation(&mut self) {
        self.reset_animation = true;
    }

    pub(crate) fn alpha_reset(&self) -> bool {
        self.reset_alpha
    }

    pub(crate) fn chroma(&self) -> Option<ChromaSpec> {
        self.reset_chroma
    }

    /// The effective precision for each channel; the unscoped
    /// `image.precision` is the fallback.
    pub(crate) fn channel_precisions(&self) -> (u8, u8, u8, u8) {
        let or_default = |value: u8| if value > 0 { value } else { self.precision };
        (
            or_default(self.red_precision),
            or_default(self.green_precision),
            or_default(self.blue_precision),
            or_default(self.alpha_precision)
        )
    }

    /// Whether this transformer can drop chunks at all.
    pub fn may_strip_chunks(&self) -> bool {
        self.strip_all || !self.strip_sigs.is_empty() || self.reset_animation
    }

    /// The per-chunk strip predicate: metadata only, strip set minus
    /// protect set, with APNG stripping riding on the animation reset.
    pub fn strip_chunk(&self, name: ChunkName) -> bool {
        if self.reset_animation && name.is_apng() {
            return true;
        }
        if !self.strip_all && self.strip_sigs.is_empty() {
            return false;
        }
        if self.protect_all {
            return false;
        }
        if name.is_image() {
            return false;
        }
        if !self.strip_all && !self.strip_sigs.contains(&name) {
            return false;
        }
        if self.protect_sigs.contains(&name) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(name: &[u8; 4]) -> ChunkName {
        ChunkName(*name)
    }

    #[test]
    fn strip_all_except_protected() {
        let mut transformer = Transformer::new();
        transformer.strip("all").unwrap();
        transformer.protect("sRGB,iCCP").unwrap();
        assert!(transformer.strip_chunk(chunk(b"tEXt")));
        assert!(transformer.strip_chunk(chunk(b"gAMA")));
        assert!(!transformer.strip_chunk(chunk(b"sRGB")));
        assert!(!transformer.strip_chunk(chunk(b"iCCP")));
        // image chunks never strip
        assert!(!transformer.strip_chunk(chunk(b"tRNS")));
        assert!(!transformer.strip_chunk(chunk(b"PLTE")));
    }

    #[test]
    fn strip_by_name_only() {
        let mut transformer = Transformer::new();
        transformer.strip("tEXt,zTXt").unwrap();
        assert!(transformer.strip_chunk(chunk(b"tEXt")));
        assert!(!transformer.strip_chunk(chunk(b"gAMA")));
    }

    #[test]
    fn protect_all_wins() {
        let mut transformer = Transformer::new();
        transformer.strip("all").unwrap();
        transformer.protect("all").unwrap();
        assert!(!transformer.strip_chunk(chunk(b"tEXt")));
    }

    #[test]
    fn trns_and_critical_chunks_refuse_to_strip() {
        let mut transformer = Transformer::new();
        assert!(matches!(
            transformer.strip("tRNS"),
            Err(TransformErrors::CannotStripTrns)
        ));
        assert!(matches!(
            transformer.strip("PLTE"),
            Err(TransformErrors::CannotStripCritical(_))
        ));
    }

    #[test]
    fn animation_reset_strips_apng_chunks() {
        let mut transformer = Transformer::new();
        transformer.reset("animation").unwrap();
        assert!(transformer.strip_chunk(chunk(b"acTL")));
        assert!(transformer.strip_chunk(chunk(b"fdAT")));
        assert!(!transformer.strip_chunk(chunk(b"tEXt")));
    }

    #[test]
    fn chroma_specs_are_mutually_exclusive() {
        let mut transformer = Transformer::new();
        transformer.reset("image.chroma.bt601").unwrap();
        assert!(matches!(
            transformer.reset("image.chroma.bt709"),
            Err(TransformErrors::ChromaConflict)
        ));
    }

    #[test]
    fn set_text_is_reserved() {
        let mut transformer = Transformer::new();
        assert!(matches!(
            transformer.set("tEXt=hello"),
            Err(TransformErrors::SetMetadataNotImplemented)
        ));
    }

    #[test]
    fn precision_values_validate_and_agree() {
        let mut transformer = Transformer::new();
        transformer.set("image.alpha.precision=4").unwrap();
        transformer.set("image.alpha.precision=4").unwrap();
        assert!(transformer.set("image.alpha.precision=5").is_err());
        assert!(transformer.set("image.rgb.precision=0").is_err());
        assert!(transformer.set("image.rgb.precision=16").is_err());
        assert!(transformer.set("image.gray.precision=4").is_err());
    }

    #[test]
    fn unknown_objects_are_rejected() {
        let mut transformer = Transformer::new();
        assert!(matches!(
            transformer.strip("image.bogus"),
            Err(TransformErrors::UnknownObject(_))
        ));
        assert!(transformer.reset("tEXt").is_err());
    }
}
