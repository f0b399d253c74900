// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::policy::{Demo, Policy};
use anyhow::{self as ah, format_err as err, Context as _};
use sysfilter_bpf::{
    evaluate,
    syscalls::{parse_syscall, syscall_name},
    Arch, Record, NR_ARGS,
};
use sysfilter_conf::Config;

/// Parse a syscall argument `INDEX=VALUE` from the command line.
pub fn parse_arg(s: &str) -> ah::Result<(usize, u64)> {
    let Some((index, value)) = s.split_once('=') else {
        return Err(err!("Argument '{s}' is not INDEX=VALUE"));
    };
    let index: usize = index.trim().parse().context("Argument index")?;
    if index >= NR_ARGS {
        return Err(err!("Argument index {index} is bigger than {}", NR_ARGS - 1));
    }
    let value = value.trim();
    let value = if let Some(hex) = value.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    } else {
        value.parse()
    }
    .context("Argument value")?;
    Ok((index, value))
}

/// Evaluate a demonstration filter for one syscall.
pub fn run_eval(
    conf: &Config,
    demo: Demo,
    syscall: &str,
    args: &[(usize, u64)],
    arch: Option<Arch>,
) -> ah::Result<()> {
    let nr = parse_syscall(syscall)?;
    let mut record = Record::syscall(nr);
    if let Some(arch) = arch {
        record = record.with_arch(arch);
    }
    for &(index, value) in args {
        record = record.with_arg(index, value);
    }

    let program = Policy::new(demo, conf).compile()?;
    let action = evaluate(&program, &record).context("Evaluate seccomp filter")?;

    let name = syscall_name(nr).unwrap_or("?");
    let arch = Arch::from_token(record.arch)
        .map(|a| a.to_string())
        .unwrap_or_else(|| format!("{:#x}", record.arch));
    println!("{name} ({nr}) on {arch} => {action}");
    Ok(())
}


// vim: ts=4 sw=4 expandtab
