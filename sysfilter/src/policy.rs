// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::probe::Probe;
use anyhow::{self as ah, Context as _};
use sysfilter_bpf::{Action, Arch, FilterBuilder, Program, Rule};
use sysfilter_conf::Config;

/// The demonstration filters.
#[derive(Clone, Copy, PartialEq, Eq, Debug, clap::ValueEnum)]
pub enum Demo {
    /// Fixed error number for everything not allowed.
    Basic,
    /// Random error number for everything not allowed.
    Random,
}

/// Filter policy of one demonstration.
#[derive(Clone, Debug)]
pub struct Policy {
    default_action: Action,
    arch_check: Option<(Arch, Action)>,
    runtime_allow: Vec<i64>,
}

impl Policy {
    pub fn new(demo: Demo, conf: &Config) -> Self {
        let default_action = match demo {
            Demo::Basic => Action::ErrorNumber(conf.basic_errno()),
            Demo::Random => Action::RandomizedErrorNumber(conf.random_mask()),
        };
        Self::with_default_action(default_action, conf)
    }

    pub fn with_default_action(default_action: Action, conf: &Config) -> Self {
        let arch_check = if conf.arch_check() {
            Arch::native().map(|arch| (arch, conf.arch_mismatch()))
        } else {
            None
        };
        Self {
            default_action,
            arch_check,
            runtime_allow: conf.runtime_allow().to_vec(),
        }
    }

    pub fn default_action(&self) -> Action {
        self.default_action
    }

    /// `getpid` first, then the runtime allow list.
    pub fn rules(&self) -> Vec<Rule> {
        std::iter::once(Probe::Getpid.nr())
            .chain(self.runtime_allow.iter().copied())
            .map(|nr| Rule::syscall(nr, Action::Allow))
            .collect()
    }

    pub fn compile(&self) -> ah::Result<Program> {
        let mut builder = FilterBuilder::new(self.default_action).rules(self.rules());
        if let Some((arch, mismatch)) = self.arch_check {
            builder = builder.arch_check(arch, mismatch);
        }
        let program = builder.compile().context("Compile seccomp filter")?;
        log::debug!("Seccomp filter:\n{program}");
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysfilter_bpf::{evaluate, syscalls::syscall_number, Evaluator, Record, SequenceRandom};

    #[test]
    fn test_basic() {
        let conf = Config::new();
        let policy = Policy::new(Demo::Basic, &conf);
        assert_eq!(policy.default_action(), Action::ErrorNumber(42));
        assert_eq!(policy.rules()[0], Rule::syscall(Probe::Getpid.nr(), Action::Allow));

        let program = policy.compile().unwrap();
        program.verify().unwrap();
        let eval = |nr: i64| evaluate(&program, &Record::syscall(nr)).unwrap();
        assert_eq!(eval(Probe::Getpid.nr()), Action::Allow);
        assert_eq!(eval(Probe::Getppid.nr()), Action::ErrorNumber(42));
        assert_eq!(eval(syscall_number("exit_group").unwrap()), Action::Allow);
        assert_eq!(eval(syscall_number("execve").unwrap()), Action::ErrorNumber(42));

        if let Some(native) = Arch::native() {
            let foreign = Arch::ALL.into_iter().find(|&a| a != native).unwrap();
            let record = Record::syscall(Probe::Getpid.nr()).with_arch(foreign);
            assert_eq!(evaluate(&program, &record).unwrap(), Action::Kill);
        }
    }

    #[test]
    fn test_random() {
        let mut conf = Config::new();
        conf.load_str("[RANDOM]\nmask = 0xf\n[FILTER]\narch-check = false\n")
            .unwrap();
        let program = Policy::new(Demo::Random, &conf).compile().unwrap();
        assert!(program.verify().is_err());

        let eval = Evaluator::new(&program);
        let mut rng = SequenceRandom::new(0);
        let record = Record::syscall(Probe::Getppid.nr()).with_arch_token(0);
        for i in 0..32 {
            assert_eq!(
                eval.action_with(&record, &mut rng).unwrap(),
                Action::ErrorNumber(i % 16)
            );
        }
    }
}

// vim: ts=4 sw=4 expandtab
