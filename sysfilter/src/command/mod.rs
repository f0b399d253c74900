// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

pub mod basic;
pub mod dump;
pub mod eval;
pub mod random;

use crate::probe::{Probe, ProbeResult};
use anyhow::{self as ah, Context as _};
use sysfilter_bpf::{seccomp_supported, Installer, Program};
use sysfilter_conf::Config;

/// How the demonstrations run their filter.
#[derive(Clone, Copy, Debug)]
pub struct RunMode {
    /// Only evaluate the filter. Do not install it.
    pub dry_run: bool,
    /// Skip the local verification before installation.
    pub no_verify: bool,
}

/// Install `program` (or not, on dry runs) and call all `probes` `calls` times.
///
/// Returns one row of results per call.
pub fn run_probes(
    conf: &Config,
    mode: RunMode,
    program: &Program,
    probes: &[Probe],
    calls: u32,
) -> ah::Result<Vec<Vec<ProbeResult>>> {
    if mode.dry_run {
        log::info!("Dry run. The seccomp filter is not installed.");
        return (0..calls)
            .map(|_| {
                probes
                    .iter()
                    .map(|probe| probe.simulate(program))
                    .collect::<ah::Result<Vec<_>>>()
            })
            .collect();
    }

    if !seccomp_supported() {
        eprintln!(
            "WARNING: seccompiler does not support this architecture. \
            The kernel may still accept the filter."
        );
    }
    Installer::new()
        .scope(conf.scope())
        .verify(conf.verify() && !mode.no_verify)
        .install(program)
        .context("Install seccomp filter")?;

    // Nothing but the allowed syscalls from here on.
    Ok((0..calls)
        .map(|_| probes.iter().map(Probe::call).collect())
        .collect())
}

// vim: ts=4 sw=4 expandtab
