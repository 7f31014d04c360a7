/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Output file handling: path resolution, the backup dance, unrolling
//! half-written files, and attribute preservation.

use std::fs;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// Where the output goes, and whether that is the input itself.
pub struct OutputSpec {
    pub path:          PathBuf,
    pub same_as_input: bool
}

/// The knobs the output dance honors.
#[derive(Clone, Default)]
pub struct OutputOptions {
    pub backup:     bool,
    pub no_clobber: bool,
    pub preserve:   bool
}

/// Sibling path with a `.bak` suffix appended.
fn bak_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    path.with_file_name(name)
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false
    }
}

/// Resolve the output path: `-out` wins, then `-dir` relocates, and a
/// non-PNG input changes its extension to `.png`.
pub fn resolve_output(
    input: &Path, out: Option<&Path>, dir: Option<&Path>, input_is_png: bool
) -> OutputSpec {
    let mut path = match out {
        Some(out) => out.to_path_buf(),
        None => {
            if input_is_png {
                input.to_path_buf()
            } else {
                input.with_extension("png")
            }
        }
    };
    if let Some(dir) = dir {
        let name = path.file_name().map(PathBuf::from).unwrap_or_default();
        path = dir.join(name);
    }
    let same_as_input = is_same_file(input, &path);
    OutputSpec {
        path,
        same_as_input
    }
}

/// Produce the output file through `writer`, safely:
///
/// - overwriting the input goes through a `.bak` rename first;
/// - an existing separate output is refused under `-no-clobber`,
///   otherwise backed up the same way;
/// - a failed write removes the partial output and restores the backup;
/// - on success the backup is dropped unless `-backup`, and attributes
///   are copied under `-preserve`.
pub fn commit_output<T, E>(
    spec: &OutputSpec, input: &Path, options: &OutputOptions,
    writer: impl FnOnce(&mut File) -> Result<T, E>
) -> io::Result<Result<T, E>> {
    let bak = bak_path(&spec.path);
    let target_exists = spec.path.exists();

    if target_exists {
        if !spec.same_as_input && options.no_clobber {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists; not overwritten", spec.path.display())
            ));
        }
        if bak.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("can't back up over {}", bak.display())
            ));
        }
        fs::rename(&spec.path, &bak)?;
    }
    if let Some(parent) = spec.path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let attr_source = if spec.same_as_input { &bak } else { input };
    let result = File::create(&spec.path).and_then(|mut file| {
        match writer(&mut file) {
            Ok(value) => file.sync_all().map(|_| Ok(value)),
            Err(err) => Ok(Err(err))
        }
    });

    match result {
        Ok(Ok(value)) => {
            if options.preserve {
                copy_attributes(attr_source, &spec.path);
            }
            if target_exists && !options.backup {
                fs::remove_file(&bak)?;
            }
            Ok(Ok(value))
        }
        Ok(Err(write_err)) => {
            // the writer failed mid-stream; unroll
            let _ = fs::remove_file(&spec.path);
            if target_exists {
                let _ = fs::rename(&bak, &spec.path);
            }
            Ok(Err(write_err))
        }
        Err(io_err) => {
            let _ = fs::remove_file(&spec.path);
            if target_exists {
                let _ = fs::rename(&bak, &spec.path);
            }
            Err(io_err)
        }
    }
}

/// Copy permissions and modification time, quietly skipping whatever
/// the platform refuses.
fn copy_attributes(from: &Path, to: &Path) {
    if let Ok(metadata) = fs::metadata(from) {
        let _ = fs::set_permissions(to, metadata.permissions());
        if let (Ok(modified), Ok(file)) = (metadata.modified(), File::options().write(true).open(to))
        {
            let _ = file.set_modified(modified);
        }
    }
}
