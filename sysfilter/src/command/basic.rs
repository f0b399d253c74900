// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::{
    command::{run_probes, RunMode},
    policy::Policy,
    probe::{format_result, Probe},
};
use anyhow as ah;
use sysfilter_bpf::Action;
use sysfilter_conf::Config;

const PROBES: [Probe; 2] = [Probe::Getpid, Probe::Getppid];

/// Allow `getpid`. Fail all other syscalls that the runtime does not need with `errno`.
pub fn run_basic(
    conf: &Config,
    mode: RunMode,
    errno: Option<u16>,
    calls: Option<u32>,
) -> ah::Result<()> {
    let errno = errno.unwrap_or_else(|| conf.basic_errno());
    let calls = calls.unwrap_or_else(|| conf.basic_calls());

    let program = Policy::with_default_action(Action::ErrorNumber(errno), conf).compile()?;
    let rows = run_probes(conf, mode, &program, &PROBES, calls)?;

    for row in rows {
        let line: Vec<String> = PROBES
            .iter()
            .zip(row)
            .map(|(probe, result)| format!("{probe}() = {:<8}", format_result(result)))
            .collect();
        println!("{}", line.join(" ").trim_end());
    }
    Ok(())
}

// vim: ts=4 sw=4 expandtab
