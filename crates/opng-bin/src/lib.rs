/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! The opng command line driver: options resolution, the per-file loop,
//! reporting and exit codes.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::ArgMatches;
use log::{error, info, LevelFilter};
use opng_image::{OpngErrors, OpngOptions, Session, Sink, Transformer};
use opng_core::rangeset::{parse_rangeset, Bits};
use opng_core::InterlaceMethod;

mod cmd_args;
mod file_io;

use file_io::{commit_output, resolve_output, OutputOptions};

// sysexits-style codes, matching the original tool
const EXIT_OK: i32 = 0;
const EXIT_ERRORS_NOT_FIXED: i32 = 2;
const EXIT_USAGE: i32 = 64;
const EXIT_NO_INPUT: i32 = 66;
const EXIT_SOFTWARE: i32 = 70;
const EXIT_CANT_CREATE: i32 = 73;
const EXIT_IO_ERROR: i32 = 74;

#[derive(Default)]
struct Summary {
    file_count: u32,
    err_count:  u32,
    fix_count:  u32,
    snip_count: u32
}

fn usage_error(message: String) -> (OpngErrors, i32) {
    (OpngErrors::Usage(message), EXIT_USAGE)
}

fn parse_set(
    matches: &ArgMatches, id: &str, flag: &str, mask: Bits
) -> Result<Bits, (OpngErrors, i32)> {
    match matches.get_one::<String>(id) {
        None => Ok(0),
        Some(text) => parse_rangeset(text, mask)
            .map_err(|err| usage_error(format!("invalid {flag} value \"{text}\": {err:?}")))
    }
}

/// `-zw` accepts a power of two between 256 and 32k, or the exponent
/// itself (8..=15).
fn parse_window_bits(text: &str) -> Option<i32> {
    let text = text.trim().to_ascii_lowercase();
    let (digits, shift) = match text.strip_suffix('k') {
        Some(digits) => (digits, 10),
        None => (text.as_str(), 0)
    };
    let value: u64 = digits.parse().ok()?;
    let value = value << shift;
    if (8..=15).contains(&value) {
        return Some(value as i32);
    }
    if value.is_power_of_two() && (256..=32768).contains(&value) {
        return Some(value.trailing_zeros() as i32);
    }
    None
}

fn build_options(matches: &ArgMatches) -> Result<OpngOptions, (OpngErrors, i32)> {
    let mut options = OpngOptions {
        optim_level: matches.get_one::<u8>("optim-level").copied(),
        filter_set: parse_set(matches, "filters", "-f", 0x3f)?,
        zcompr_level_set: parse_set(matches, "zc", "--zc", 0x3fe)?,
        zmem_level_set: parse_set(matches, "zm", "--zm", 0x3fe)?,
        zstrategy_set: parse_set(matches, "zs", "--zs", 0x0f)?,
        zwindow_bits: None,
        interlace: None,
        no_bit_depth_reduction: matches.get_flag("nb"),
        no_color_reduction: matches.get_flag("nc"),
        no_palette_reduction: matches.get_flag("np"),
        no_reductions: matches.get_flag("nx"),
        no_idat_recoding: matches.get_flag("nz"),
        fix: matches.get_flag("fix"),
        force: matches.get_flag("force"),
        paranoid: matches.get_flag("paranoid"),
        snip: matches.get_flag("snip")
    };

    if let Some(text) = matches.get_one::<String>("zw") {
        options.zwindow_bits = Some(
            parse_window_bits(text)
                .ok_or_else(|| usage_error(format!("invalid -zw value \"{text}\"")))?
        );
    }
    if let Some(interlace) = matches.get_one::<u8>("interlace") {
        options.interlace = Some(InterlaceMethod::from_int(*interlace).ok_or_else(|| {
            usage_error(format!("invalid -i value {interlace}, expected 0 or 1"))
        })?);
    }

    options.normalize();
    Ok(options)
}

fn build_transformer(
    matches: &ArgMatches, snip: bool
) -> Result<Transformer, (OpngErrors, i32)> {
    let mut transformer = Transformer::new();
    let apply = |f: &mut dyn FnMut(&str) -> Result<(), opng_image::TransformErrors>,
                 values: Option<clap::parser::ValuesRef<String>>|
     -> Result<(), (OpngErrors, i32)> {
        for value in values.into_iter().flatten() {
            f(value).map_err(|err| usage_error(format!("{err:?}").trim_end().into()))?;
        }
        Ok(())
    };
    apply(
        &mut |v| transformer.strip(v),
        matches.get_many::<String>("strip")
    )?;
    apply(
        &mut |v| transformer.protect(v),
        matches.get_many::<String>("protect")
    )?;
    apply(
        &mut |v| transformer.reset(v),
        matches.get_many::<String>("reset")
    )?;
    apply(&mut |v| transformer.set(v), matches.get_many::<String>("set"))?;
    if snip {
        transformer.reset_animation();
    }
    Ok(transformer)
}

fn exit_code_for(err: &OpngErrors) -> i32 {
    match err {
        OpngErrors::Usage(_) => EXIT_USAGE,
        OpngErrors::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => EXIT_NO_INPUT,
        OpngErrors::Io(_) => EXIT_IO_ERROR,
        OpngErrors::Encode(_) => EXIT_SOFTWARE,
        // bad or unfixed input data
        _ => EXIT_ERRORS_NOT_FIXED
    }
}

fn format_difference(initial: u64, final_size: u64) -> String {
    if initial == final_size {
        return "no change".into();
    }
    let (difference, direction) = if final_size > initial {
        (final_size - initial, "increase")
    } else {
        (initial - final_size, "decrease")
    };
    if initial == 0 {
        return format!("{difference} bytes {direction}");
    }
    let ratio = difference as f64 * 100.0 / initial as f64;
    format!("{difference} bytes = {ratio:.2}% {direction}")
}

struct FileOutcome {
    fixed:   bool,
    snipped: bool
}

fn process_file(
    input_path: &Path, options: &OpngOptions, transformer: &Transformer,
    matches: &ArgMatches
) -> Result<FileOutcome, (OpngErrors, i32)> {
    info!("processing: {}", input_path.display());
    let data = std::fs::read(input_path).map_err(|err| {
        let code = if err.kind() == std::io::ErrorKind::NotFound {
            EXIT_NO_INPUT
        } else {
            EXIT_IO_ERROR
        };
        (OpngErrors::Io(err), code)
    })?;

    let session = Session::new(options, transformer);
    let analysis = session
        .analyze(&data)
        .map_err(|err| {
            let code = exit_code_for(&err);
            (err, code)
        })?;

    let outcome = FileOutcome {
        fixed:   analysis.flags.has_errors && options.fix,
        snipped: analysis.flags.has_multiple_images && options.snip
    };

    let use_stdout = matches.get_flag("stdout");
    let no_create = matches.get_flag("no-create");
    let spec = resolve_output(
        input_path,
        matches.get_one::<OsString>("out").map(Path::new),
        matches.get_one::<OsString>("dir").map(Path::new),
        analysis.flags.is_png_file
    );

    if analysis.is_already_optimized() && spec.same_as_input && !use_stdout {
        info!("{} is already optimized", input_path.display());
        return Ok(outcome);
    }
    if no_create {
        info!("no output: simulation mode");
        return Ok(outcome);
    }

    let out_stats = if use_stdout {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let stats = if analysis.flags.needs_new_idat {
            analysis.write(Sink::Stream(&mut lock))
        } else {
            analysis.copy(&data, &mut lock)
        }
        .map_err(|err| {
            let code = exit_code_for(&err);
            (err, code)
        })?;
        lock.flush()
            .map_err(|err| (OpngErrors::Io(err), EXIT_IO_ERROR))?;
        stats
    } else {
        info!("output: {}", spec.path.display());
        let io_options = OutputOptions {
            backup:     matches.get_flag("backup"),
            no_clobber: matches.get_flag("no-clobber"),
            preserve:   matches.get_flag("preserve")
        };
        let result = commit_output(&spec, input_path, &io_options, |file| {
            if analysis.flags.needs_new_idat {
                analysis.write(Sink::Seekable(file))
            } else {
                analysis.copy(&data, file)
            }
        })
        .map_err(|err| (OpngErrors::Io(err), EXIT_CANT_CREATE))?;
        result.map_err(|err| {
            let code = exit_code_for(&err);
            (err, code)
        })?
    };

    if analysis.flags.has_png_datastream {
        info!(
            "IDAT size = {} bytes ({})",
            out_stats.idat_size,
            format_difference(analysis.in_stats.idat_size, out_stats.idat_size)
        );
    }
    if out_stats.file_size > 0 {
        info!(
            "file size = {} bytes ({})",
            out_stats.file_size,
            format_difference(analysis.in_stats.file_size, out_stats.file_size)
        );
    }

    Ok(outcome)
}

/// Run the command line and return the process exit code.
pub fn run() -> i32 {
    let matches = cmd_args::create_cmd_args().get_matches();

    let level = if matches.get_flag("quiet") {
        LevelFilter::Error
    } else if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if simple_logger::SimpleLogger::new()
        .with_level(level)
        .init()
        .is_err()
    {
        // a second init can only happen in tests; logging just stays off
    }

    let options = match build_options(&matches) {
        Ok(options) => options,
        Err((err, code)) => {
            error!("{err:?}");
            return code;
        }
    };
    let transformer = match build_transformer(&matches, options.snip) {
        Ok(transformer) => transformer,
        Err((err, code)) => {
            error!("{err:?}");
            return code;
        }
    };

    let files: Vec<PathBuf> = matches
        .get_many::<OsString>("files")
        .map(|values| values.map(PathBuf::from).collect())
        .unwrap_or_default();
    if files.len() > 1 && matches.get_one::<OsString>("out").is_some() {
        error!("-out requires a single input file");
        return EXIT_USAGE;
    }
    if files.len() > 1 && matches.get_flag("stdout") {
        error!("-stdout requires a single input file");
        return EXIT_USAGE;
    }

    let mut summary = Summary::default();
    let mut worst_exit = EXIT_OK;

    for file in &files {
        summary.file_count += 1;
        match process_file(file, &options, &transformer, &matches) {
            Ok(outcome) => {
                if outcome.fixed {
                    summary.err_count += 1;
                    summary.fix_count += 1;
                }
                if outcome.snipped {
                    summary.snip_count += 1;
                }
            }
            Err((err, code)) => {
                summary.err_count += 1;
                error!("{}: {err:?}", file.display());
                worst_exit = worst_exit.max(code);
            }
        }
    }

    print_summary(&matches, &summary);
    worst_exit
}

fn print_summary(matches: &ArgMatches, summary: &Summary) {
    if matches.get_flag("verbose") || summary.err_count > 0 || summary.snip_count > 0 {
        info!("{} file(s) have been processed", summary.file_count);
        if summary.snip_count > 0 {
            info!("{} multi-image file(s) have been snipped", summary.snip_count);
        }
        if summary.err_count > 0 {
            info!("{} error(s) have been encountered", summary.err_count);
            if summary.fix_count > 0 {
                info!("{} erroneous file(s) have been fixed", summary.fix_count);
            }
        }
    }
}
