// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Seccomp syscall filter policies as classic BPF programs.
//!
//! - [compile()] turns an ordered rule list into a [Program].
//! - [evaluate()] runs a [Program] against a [Record] without the kernel.
//! - [Installer] hands a [Program] to the kernel (feature `install`).

#![forbid(unsafe_code)]

#[cfg(not(any(target_os = "linux", target_os = "android")))]
std::compile_error!("sysfilter-bpf does not support non-Linux platforms.");

mod action;
mod compile;
mod error;
mod eval;
mod insn;
#[cfg(feature = "install")]
mod install;
mod program;
mod record;
mod rule;
pub mod syscalls;


pub use crate::{
    action::*,
    compile::{compile, FilterBuilder},
    error::{CompileError, DecodeError, EvalError, InstallError, VerifyError},
    eval::{evaluate, Evaluator, OsRandom, RandomSource, SequenceRandom},
    insn::{Insn, BPF_MAXINSNS},
    program::Program,
    record::{Arch, Field, FieldOffsets, ParseArchError, Record, NR_ARGS},
    rule::{first_match, Cmp, Condition, Rule},
};

#[cfg(feature = "install")]
pub use crate::install::{Installer, ParseScopeError, Scope};

/// The raw instruction set: opcodes, fields and helpers.
pub mod bpf {
    pub use crate::insn::*;
}

/// Returns `true` if filters can be installed on this platform.
pub fn seccomp_supported() -> bool {
    // This is what `seccompiler` currently supports:
    cfg!(all(
        feature = "install",
        any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "riscv64")
    ))
}

// vim: ts=4 sw=4 expandtab
