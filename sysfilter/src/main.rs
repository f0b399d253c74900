// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![deny(unsafe_code)]

#[cfg(not(any(target_os = "linux", target_os = "android")))]
std::compile_error!("sysfilter does not support non-Linux platforms.");

mod command;
mod logging;
mod policy;
mod probe;

use crate::{
    command::{
        basic::run_basic,
        dump::run_dump,
        eval::{parse_arg, run_eval},
        random::run_random,
        RunMode,
    },
    logging::init_logger,
    policy::Demo,
};
use anyhow::{self as ah, format_err as err, Context as _};
use clap::{CommandFactory as _, Parser, Subcommand};
use std::path::PathBuf;
use sysfilter_bpf::Arch;
use sysfilter_conf::Config;

/// Parse a decimal or `0x` hexadecimal mask.
fn parse_mask(s: &str) -> ah::Result<u16> {
    let s = s.trim();
    Ok(if let Some(hex) = s.strip_prefix("0x") {
        u16::from_str_radix(hex, 16)?
    } else {
        s.parse()?
    })
}

#[derive(Parser, Debug)]
struct Opts {
    /// Override the default path to the configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show detailed information about what happens internally.
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// Show version information and exit.
    #[arg(long, short = 'v')]
    version: bool,
}

impl Opts {
    /// Get the configuration path from command line or default.
    pub fn get_config(&self) -> PathBuf {
        if let Some(config) = &self.config {
            config.clone()
        } else {
            Config::get_default_path()
        }
    }
}

#[derive(Parser, Debug)]
struct RunOpts {
    /// Do not install the filter. Evaluate it for every call instead.
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Skip the local check of the filter and let the kernel decide.
    #[arg(long)]
    no_verify: bool,
}

impl From<&RunOpts> for RunMode {
    fn from(opts: &RunOpts) -> Self {
        Self {
            dry_run: opts.dry_run,
            no_verify: opts.no_verify,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install a filter that fails syscalls with a fixed error number.
    ///
    /// getpid and the syscalls from `[RUNTIME] allow` are allowed.
    /// Then getpid and getppid are called and their results are printed.
    Basic {
        /// The error number. Overrides `[BASIC] errno`.
        #[arg(long, value_parser = clap::value_parser!(u16).range(0..=4095))]
        errno: Option<u16>,

        /// Number of calls. Overrides `[BASIC] calls`.
        #[arg(long)]
        calls: Option<u32>,

        #[command(flatten)]
        run: RunOpts,
    },

    /// Install a filter that fails syscalls with a random error number.
    ///
    /// The error number is `random & MASK`.
    /// The kernel does not accept the random load in seccomp filters.
    /// Use --dry-run to see the filter's effect.
    Random {
        /// The random mask. Overrides `[RANDOM] mask`.
        #[arg(long, value_parser = parse_mask)]
        mask: Option<u16>,

        /// Number of calls. Overrides `[RANDOM] calls`.
        #[arg(long)]
        calls: Option<u32>,

        #[command(flatten)]
        run: RunOpts,
    },

    /// Print the BPF program of a demonstration filter.
    Dump {
        #[arg(value_enum)]
        demo: Demo,

        /// Print the raw instruction bytes.
        #[arg(long)]
        raw: bool,
    },

    /// Evaluate a demonstration filter for one syscall.
    Eval {
        #[arg(value_enum)]
        demo: Demo,

        /// Syscall name or number.
        #[arg(long, short)]
        syscall: String,

        /// Syscall argument as INDEX=VALUE. Can be given multiple times.
        #[arg(long = "arg", short, value_parser = parse_arg)]
        args: Vec<(usize, u64)>,

        /// Syscall architecture. Defaults to the native one.
        #[arg(long)]
        arch: Option<Arch>,
    },
}

#[rustfmt::skip]
fn run(opts: Opts) -> ah::Result<()> {
    // Read the sysfilter.conf configuration file.
    let mut conf = Config::new();
    conf.load(&opts.get_config())
        .context("Configuration file")?;

    init_logger(opts.verbose || conf.debug());
    if let Some(path) = conf.get_path() {
        log::debug!("Configuration: {path:?}");
    }
    for option in conf.unknown_options() {
        log::warn!("Unknown configuration option {option}");
    }

    // Run the user specified command.
    if let Some(command) = opts.command {
        match command {
            Command::Basic { errno, calls, run } => {
                run_basic(&conf, (&run).into(), errno, calls)
            }
            Command::Random { mask, calls, run } => {
                run_random(&conf, (&run).into(), mask, calls)
            }
            Command::Dump { demo, raw } => {
                run_dump(&conf, demo, raw)
            }
            Command::Eval { demo, syscall, args, arch } => {
                run_eval(&conf, demo, &syscall, &args, arch)
            }
        }
    } else {
        Opts::command()
            .print_help()
            .context("Failed to print help")?;
        println!();
        Err(err!(
            "'sysfilter' requires a subcommand but one was not provided. \
            Please run 'sysfilter --help' for more information."
        ))
    }
}

fn main() -> ah::Result<()> {
    let opts = Opts::parse();

    if opts.version {
        println!("sysfilter version {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    run(opts)
}


// vim: ts=4 sw=4 expandtab
