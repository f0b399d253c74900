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
    probe::{format_result, Probe, ProbeResult},
};
use anyhow as ah;
use sysfilter_bpf::Action;
use sysfilter_conf::Config;

const PER_ROW: usize = 4;

fn format_rows(results: &[ProbeResult]) -> Vec<String> {
    results
        .chunks(PER_ROW)
        .map(|row| {
            row.iter()
                .map(|&result| format!("{:>6}", format_result(result)))
                .collect::<String>()
        })
        .collect()
}

/// Allow `getpid`. Fail all other syscalls that the runtime does not need
/// with a random error number `random & mask`.
///
/// The kernel refuses the random load. Without a dry run this fails.
pub fn run_random(
    conf: &Config,
    mode: RunMode,
    mask: Option<u16>,
    calls: Option<u32>,
) -> ah::Result<()> {
    let mask = mask.unwrap_or_else(|| conf.random_mask());
    let calls = calls.unwrap_or_else(|| conf.random_calls());

    let program =
        Policy::with_default_action(Action::RandomizedErrorNumber(mask), conf).compile()?;
    let results: Vec<ProbeResult> = run_probes(conf, mode, &program, &[Probe::Getppid], calls)?
        .into_iter()
        .flatten()
        .collect();

    println!("{}() with random error numbers (mask {mask:#x}):", Probe::Getppid);
    for line in format_rows(&results) {
        println!("{line}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows() {
        let results = [Err(1), Err(22), Err(333), Ok(4444), Err(5)];
        assert_eq!(
            format_rows(&results),
            vec!["    -1   -22  -333  4444", "    -5"]
        );
        assert!(format_rows(&[]).is_empty());
    }
}

// vim: ts=4 sw=4 expandtab
