/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Command line definition.

use std::ffi::OsString;

use clap::{value_parser, Arg, ArgAction, Command};

#[rustfmt::skip]
pub fn create_cmd_args() -> Command {
    Command::new("opng")
        .about("A lossless PNG optimizer")
        .version(env!("CARGO_PKG_VERSION"))
        .next_line_help(false)
        .arg(Arg::new("files")
            .help("Input files: PNG, BMP, GIF, PNM or TIFF")
            .value_parser(value_parser!(OsString))
            .num_args(1..)
            .required(true))
        .arg(Arg::new("optim-level")
            .short('o')
            .help("Optimization level (0-6)")
            .value_parser(value_parser!(u8)))
        .arg(Arg::new("fix")
            .long("fix")
            .help("Enable error recovery")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("force")
            .long("force")
            .help("Enforce writing of a new output file")
            .action(ArgAction::SetTrue))
        .args(add_output_options())
        .args(add_iteration_options())
        .args(add_reduction_options())
        .args(add_transform_options())
        .args(add_logging_options())
}

fn add_output_options() -> Vec<Arg> {
    const HELP_HEADING: &str = "Output";
    vec![
        Arg::new("out")
            .long("out")
            .help_heading(HELP_HEADING)
            .help("Write output to this file (a single input only)")
            .value_parser(value_parser!(OsString)),
        Arg::new("dir")
            .long("dir")
            .help_heading(HELP_HEADING)
            .help("Write output file(s) into this directory")
            .value_parser(value_parser!(OsString)),
        Arg::new("stdout")
            .long("stdout")
            .help_heading(HELP_HEADING)
            .help("Write output to the standard output")
            .action(ArgAction::SetTrue),
        Arg::new("backup")
            .long("backup")
            .help_heading(HELP_HEADING)
            .help("Keep a backup of the modified files")
            .action(ArgAction::SetTrue),
        Arg::new("no-clobber")
            .long("no-clobber")
            .help_heading(HELP_HEADING)
            .help("Do not overwrite existing output files")
            .action(ArgAction::SetTrue),
        Arg::new("no-create")
            .long("no-create")
            .help_heading(HELP_HEADING)
            .help("Do not create any output file (simulation mode)")
            .action(ArgAction::SetTrue),
        Arg::new("preserve")
            .long("preserve")
            .help_heading(HELP_HEADING)
            .help("Preserve file attributes (mode, modification time) if possible")
            .action(ArgAction::SetTrue),
    ]
}

fn add_iteration_options() -> Vec<Arg> {
    const HELP_HEADING: &str = "Search space";
    vec![
        Arg::new("filters")
            .short('f')
            .help_heading(HELP_HEADING)
            .help("PNG delta filters (rangeset over 0-5, e.g. 0,5)")
            .value_parser(value_parser!(String)),
        Arg::new("interlace")
            .short('i')
            .help_heading(HELP_HEADING)
            .help("PNG interlace method (0 or 1)")
            .value_parser(value_parser!(u8)),
        Arg::new("zc")
            .long("zc")
            .help_heading(HELP_HEADING)
            .help("zlib compression levels (rangeset over 1-9)")
            .value_parser(value_parser!(String)),
        Arg::new("zm")
            .long("zm")
            .help_heading(HELP_HEADING)
            .help("zlib memory levels (rangeset over 1-9)")
            .value_parser(value_parser!(String)),
        Arg::new("zs")
            .long("zs")
            .help_heading(HELP_HEADING)
            .help("zlib strategies (rangeset over 0-3)")
            .value_parser(value_parser!(String)),
        Arg::new("zw")
            .long("zw")
            .help_heading(HELP_HEADING)
            .help("zlib window size (256, 512, ..., 32k, or 8-15 as bits)")
            .value_parser(value_parser!(String)),
        Arg::new("paranoid")
            .long("paranoid")
            .help_heading(HELP_HEADING)
            .help("Encode IDAT fully and show its size in report")
            .action(ArgAction::SetTrue),
    ]
}

fn add_reduction_options() -> Vec<Arg> {
    const HELP_HEADING: &str = "Reductions";
    vec![
        Arg::new("nb")
            .long("nb")
            .help_heading(HELP_HEADING)
            .help("No bit depth reduction")
            .action(ArgAction::SetTrue),
        Arg::new("nc")
            .long("nc")
            .help_heading(HELP_HEADING)
            .help("No color type reduction")
            .action(ArgAction::SetTrue),
        Arg::new("np")
            .long("np")
            .help_heading(HELP_HEADING)
            .help("No palette reduction")
            .action(ArgAction::SetTrue),
        Arg::new("nx")
            .long("nx")
            .help_heading(HELP_HEADING)
            .help("No reductions at all")
            .action(ArgAction::SetTrue),
        Arg::new("nz")
            .long("nz")
            .help_heading(HELP_HEADING)
            .help("Do not recode IDAT datastreams")
            .action(ArgAction::SetTrue),
        Arg::new("snip")
            .long("snip")
            .help_heading(HELP_HEADING)
            .help("Cut one image out of multi-image, or animation files")
            .action(ArgAction::SetTrue),
    ]
}

fn add_transform_options() -> Vec<Arg> {
    const HELP_HEADING: &str = "Editing";
    vec![
        Arg::new("strip")
            .long("strip")
            .help_heading(HELP_HEADING)
            .help("Strip metadata objects (e.g. \"all\", or chunk names)")
            .action(ArgAction::Append)
            .value_parser(value_parser!(String)),
        Arg::new("protect")
            .long("protect")
            .help_heading(HELP_HEADING)
            .help("Protect metadata objects against stripping")
            .action(ArgAction::Append)
            .value_parser(value_parser!(String)),
        Arg::new("reset")
            .long("reset")
            .help_heading(HELP_HEADING)
            .help("Reset image data objects (e.g. image.alpha, animation)")
            .action(ArgAction::Append)
            .value_parser(value_parser!(String)),
        Arg::new("set")
            .long("set")
            .help_heading(HELP_HEADING)
            .help("Set an image data object (e.g. image.alpha.precision=N)")
            .action(ArgAction::Append)
            .value_parser(value_parser!(String)),
    ]
}

fn add_logging_options() -> Vec<Arg> {
    const HELP_HEADING: &str = "Logging";
    vec![
        Arg::new("verbose")
            .short('v')
            .long("verbose")
            .help_heading(HELP_HEADING)
            .help("Run in verbose mode")
            .action(ArgAction::SetTrue),
        Arg::new("quiet")
            .short('q')
            .long("quiet")
            .help_heading(HELP_HEADING)
            .help("Run in quiet mode, errors only")
            .action(ArgAction::SetTrue),
    ]
}
