// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use thiserror::Error;

/// Rule list to program compilation failed.
///
/// No partial program exists, if this is returned.
#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum CompileError {
    #[error("Program needs {count} instructions, but the maximum is {max}")]
    TooManyInstructions { count: usize, max: usize },

    #[error("Unsupported predicate in rule {rule}: {reason}")]
    UnsupportedPredicate { rule: usize, reason: String },

    #[error("Field at offset {offset} in rule {rule} is out of range")]
    FieldOutOfRange { rule: usize, offset: u32 },
}

/// Program evaluation failed.
///
/// Compiled programs never fail. These are defects.
#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum EvalError {
    #[error("Program did not reach a return instruction after {steps} steps")]
    ProgramDidNotTerminate { steps: usize },

    #[error("Invalid instruction {code:#06x} at pc {pc}")]
    InvalidInstruction { pc: usize, code: u16 },

    #[error("Load from offset {offset} at pc {pc} is out of bounds")]
    LoadOutOfBounds { pc: usize, offset: u32 },

    #[error("Jump at pc {pc} leaves the program")]
    JumpOutOfRange { pc: usize },

    #[error("Random source failed: {0}")]
    RandomUnavailable(String),
}

/// The platform did not accept the program.
#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum InstallError {
    #[error("Seccomp filter installation rejected: {0}")]
    InstallationRejected(String),
}

/// The program would be rejected by the kernel's seccomp filter checker.
#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum VerifyError {
    #[error("Program is empty")]
    Empty,

    #[error("Program has {len} instructions, the maximum is {max}")]
    TooLong { len: usize, max: usize },

    #[error("Instruction {code:#06x} at pc {pc} is not allowed in seccomp filters")]
    InvalidOpcode { pc: usize, code: u16 },

    #[error("Ancillary load at pc {pc} is not allowed in seccomp filters")]
    AncillaryLoad { pc: usize },

    #[error("Load from offset {offset} at pc {pc} is unaligned or beyond seccomp_data")]
    LoadOutOfBounds { pc: usize, offset: u32 },

    #[error("Scratch memory index {index} at pc {pc} is out of range")]
    MemoryOutOfRange { pc: usize, index: u32 },

    #[error("Scratch memory M[{index}] is read before it is written at pc {pc}")]
    UninitializedMemory { pc: usize, index: u32 },

    #[error("Division by constant zero at pc {pc}")]
    DivisionByZero { pc: usize },

    #[error("Shift by {shift} at pc {pc} is out of range")]
    ShiftOutOfRange { pc: usize, shift: u32 },

    #[error("Jump target of pc {pc} is out of range")]
    JumpOutOfRange { pc: usize },

    #[error("Last instruction is not a return")]
    NoFinalReturn,
}

/// Malformed serialized program.
#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum DecodeError {
    #[error("Serialized program length {0} is not a multiple of 8")]
    BadLength(usize),

    #[error("Serialized program is empty")]
    Empty,

    #[error("Serialized program has {len} instructions, the maximum is {max}")]
    TooLong { len: usize, max: usize },
}

// vim: ts=4 sw=4 expandtab
