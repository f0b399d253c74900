// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Kernel installation of filter programs.
//!
//! An installed filter can not be removed or relaxed again.

use crate::{error::InstallError, program::Program};
use nix::sys::prctl::set_no_new_privs;
use seccompiler::{apply_filter, apply_filter_all_threads, sock_filter, BpfProgram};

/// Threads that receive the filter.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub enum Scope {
    /// Only the calling thread.
    #[default]
    Thread,
    /// All threads of the process (`SECCOMP_FILTER_FLAG_TSYNC`).
    Process,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Self::Thread => write!(f, "thread"),
            Self::Process => write!(f, "process"),
        }
    }
}

#[derive(thiserror::Error, Clone, PartialEq, Eq, Debug)]
#[error("Invalid scope '{0}'. Valid are: thread, process.")]
pub struct ParseScopeError(String);

impl std::str::FromStr for Scope {
    type Err = ParseScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "thread" => Ok(Self::Thread),
            "process" => Ok(Self::Process),
            _ => Err(ParseScopeError(s.trim().to_string())),
        }
    }
}

/// Installs programs into the kernel.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Installer {
    pub scope: Scope,
    /// Check the program with [Program::verify] before handing it to the kernel.
    pub verify: bool,
}

impl Default for Installer {
    fn default() -> Self {
        Self {
            scope: Scope::Thread,
            verify: true,
        }
    }
}

fn rejected(what: &str, e: impl std::fmt::Display) -> InstallError {
    InstallError::InstallationRejected(format!("{what}: {e}"))
}

impl Installer {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Set `PR_SET_NO_NEW_PRIVS` and install `program`.
    ///
    /// Errors are final. The caller must not continue as if the filter was active.
    pub fn install(&self, program: &Program) -> Result<(), InstallError> {
        if self.verify {
            program.verify().map_err(|e| rejected("Verify filter", e))?;
        }

        set_no_new_privs().map_err(|e| rejected("Set no-new-privileges", e))?;

        let bpf = to_bpf(program);
        log::info!(
            "Installing seccomp filter with {} instructions (scope: {}).",
            bpf.len(),
            self.scope
        );
        let result = match self.scope {
            Scope::Thread => apply_filter(&bpf),
            Scope::Process => apply_filter_all_threads(&bpf),
        };
        result.map_err(|e| {
            log::warn!("Seccomp filter rejected by the kernel: {e}");
            rejected("Apply seccomp filter", e)
        })
    }
}

fn to_bpf(program: &Program) -> BpfProgram {
    program
        .insns()
        .iter()
        .map(|insn| sock_filter {
            code: insn.code,
            jt: insn.jt,
            jf: insn.jf,
            k: insn.k,
        })
        .collect()
}


// vim: ts=4 sw=4 expandtab
