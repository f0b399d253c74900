// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![allow(unsafe_code)]

use anyhow::{self as ah, format_err as err, Context as _};
use nix::errno::Errno;
use sysfilter_bpf::{evaluate, Action, Program, Record, MAX_ERRNO};

/// Result of a probe: the return value or the positive error number.
pub type ProbeResult = Result<i64, i32>;

/// Argument-less syscalls that the demonstrations call.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Probe {
    Getpid,
    Getppid,
}

impl Probe {
    pub fn nr(&self) -> i64 {
        i64::from(self.raw_nr())
    }

    fn raw_nr(&self) -> libc::c_long {
        match self {
            Self::Getpid => libc::SYS_getpid,
            Self::Getppid => libc::SYS_getppid,
        }
    }

    /// Execute the syscall directly, without any libc wrapper in between.
    pub fn call(&self) -> ProbeResult {
        // SAFETY:
        // getpid and getppid take no arguments and do not access memory.
        let ret = unsafe { libc::syscall(self.raw_nr()) };
        if ret == -1 {
            Err(Errno::last_raw())
        } else {
            Ok(i64::from(ret))
        }
    }

    /// Predict the result of [Probe::call] under `program` without installing it.
    ///
    /// Permitted calls are really executed.
    pub fn simulate(&self, program: &Program) -> ah::Result<ProbeResult> {
        let action = evaluate(program, &Record::syscall(self.nr()))
            .with_context(|| format!("Evaluate seccomp filter for {self}"))?;
        log::debug!("{self}: {action}");
        match action {
            Action::Allow | Action::Log => Ok(self.call()),
            // The kernel returns 0 for errno 0 and clamps to MAX_ERRNO.
            Action::ErrorNumber(0) => Ok(Ok(0)),
            Action::ErrorNumber(errno) => Ok(Err(errno.min(MAX_ERRNO).into())),
            action => Err(err!("{self} would be stopped with '{action}'")),
        }
    }
}

impl std::fmt::Display for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Self::Getpid => write!(f, "getpid"),
            Self::Getppid => write!(f, "getppid"),
        }
    }
}

/// Format like the raw syscall return: the value or `-errno`.
pub fn format_result(result: ProbeResult) -> String {
    match result {
        Ok(value) => format!("{value}"),
        Err(errno) => format!("-{errno}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysfilter_bpf::{compile, Rule};

    #[test]
    fn test_call() {
        assert_eq!(Probe::Getpid.call(), Ok(i64::from(std::process::id())));
        assert!(Probe::Getppid.call().is_ok());
    }

    #[test]
    fn test_simulate() {
        let program = compile(
            &[Rule::syscall(Probe::Getpid.nr(), Action::Allow)],
            Action::ErrorNumber(42),
        )
        .unwrap();
        assert_eq!(
            Probe::Getpid.simulate(&program).unwrap(),
            Ok(i64::from(std::process::id()))
        );
        assert_eq!(Probe::Getppid.simulate(&program).unwrap(), Err(42));

        let program = compile(&[], Action::Trap).unwrap();
        assert!(Probe::Getpid.simulate(&program).is_err());
    }

    #[test]
    fn test_simulate_errno_range() {
        let program = compile(&[], Action::ErrorNumber(0)).unwrap();
        assert_eq!(Probe::Getppid.simulate(&program).unwrap(), Ok(0));

        let program = compile(&[], Action::ErrorNumber(4095)).unwrap();
        assert_eq!(Probe::Getppid.simulate(&program).unwrap(), Err(4095));

        let program = compile(&[], Action::ErrorNumber(0xffff)).unwrap();
        assert_eq!(Probe::Getppid.simulate(&program).unwrap(), Err(4095));
    }

    #[test]
    fn test_format() {
        assert_eq!(format_result(Ok(1234)), "1234");
        assert_eq!(format_result(Err(42)), "-42");
    }
}

// vim: ts=4 sw=4 expandtab
