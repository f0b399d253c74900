// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::policy::{Demo, Policy};
use anyhow as ah;
use sysfilter_bpf::Program;
use sysfilter_conf::Config;

/// One line of hex bytes per instruction.
fn hex_lines(program: &Program) -> Vec<String> {
    program
        .to_bytes()
        .chunks(8)
        .map(|insn| {
            let bytes: Vec<String> = insn.iter().map(|b| format!("{b:02x}")).collect();
            bytes.join(" ")
        })
        .collect()
}

/// Print the compiled program of a demonstration.
pub fn run_dump(conf: &Config, demo: Demo, raw: bool) -> ah::Result<()> {
    let policy = Policy::new(demo, conf);
    let program = policy.compile()?;

    if raw {
        for line in hex_lines(&program) {
            println!("{line}");
        }
        return Ok(());
    }

    for rule in policy.rules() {
        println!("; {rule}");
    }
    println!("; otherwise => {}", policy.default_action());
    print!("{program}");
    match program.verify() {
        Ok(()) => println!("; {} instructions, accepted by the seccomp checks", program.len()),
        Err(e) => println!("; {} instructions, rejected: {e}", program.len()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysfilter_bpf::{compile, Action, Rule};

    #[test]
    fn test_hex() {
        let program = compile(&[Rule::syscall(39, Action::Allow)], Action::Kill).unwrap();
        let lines = hex_lines(&program);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "20 00 00 00 00 00 00 00");
        assert_eq!(lines[1], "15 00 00 01 27 00 00 00");
        assert_eq!(lines[3], "06 00 00 00 00 00 00 80");
    }
}

// vim: ts=4 sw=4 expandtab
