// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reference interpreter of classic BPF seccomp programs.

use crate::{
    action::Action,
    error::EvalError,
    insn::*,
    program::Program,
    record::{Record, SECCOMP_DATA_SIZE},
};

/// Source of the `ld rand` ancillary load.
pub trait RandomSource {
    fn next_u32(&mut self) -> Result<u32, EvalError>;
}

/// Random numbers from the operating system.
#[derive(Clone, Copy, Default, Debug)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn next_u32(&mut self) -> Result<u32, EvalError> {
        getrandom::u32().map_err(|e| EvalError::RandomUnavailable(e.to_string()))
    }
}

/// Counter that returns `start`, `start + 1`, ... and wraps around.
#[derive(Clone, Copy, Default, Debug)]
pub struct SequenceRandom {
    next: u32,
}

impl SequenceRandom {
    pub fn new(start: u32) -> Self {
        Self { next: start }
    }
}

impl RandomSource for SequenceRandom {
    fn next_u32(&mut self) -> Result<u32, EvalError> {
        let value = self.next;
        self.next = self.next.wrapping_add(1);
        Ok(value)
    }
}

/// Accumulator machine state.
struct Machine {
    a: u32,
    x: u32,
    mem: [u32; BPF_MEMWORDS as usize],
}

/// Interpreter of one [Program].
#[derive(Clone, Copy, Debug)]
pub struct Evaluator<'a> {
    program: &'a Program,
}

impl<'a> Evaluator<'a> {
    pub fn new(program: &'a Program) -> Self {
        Self { program }
    }

    /// Run the program and return the raw 32-bit filter result.
    pub fn run(&self, record: &Record) -> Result<u32, EvalError> {
        self.run_with(record, &mut OsRandom)
    }

    /// Run the program with `rng` feeding `ld rand`.
    pub fn run_with(
        &self,
        record: &Record,
        rng: &mut impl RandomSource,
    ) -> Result<u32, EvalError> {
        let insns = self.program.insns();
        let mut m = Machine {
            a: 0,
            x: 0,
            mem: [0; BPF_MEMWORDS as usize],
        };
        let mut pc = 0_usize;
        let mut steps = 0_usize;

        loop {
            let Some(insn) = insns.get(pc) else {
                // Ran off the end without a return.
                return Err(EvalError::ProgramDidNotTerminate { steps });
            };
            steps += 1;
            // Forward-only jumps run off the end above first. This only bounds the loop.
            if steps > insns.len() {
                return Err(EvalError::ProgramDidNotTerminate { steps });
            }

            let at = pc;
            let code = insn.code;
            let k = insn.k;
            let invalid = || EvalError::InvalidInstruction { pc: at, code };
            pc += 1;

            match bpf_class(code) {
                BPF_LD | BPF_LDX => {
                    let is_ld = bpf_class(code) == BPF_LD;
                    let value = match (bpf_mode(code), bpf_size(code)) {
                        (BPF_ABS, BPF_W) if is_ld && k == SKF_AD_OFF + SKF_AD_RANDOM => {
                            rng.next_u32()?
                        }
                        (BPF_ABS, BPF_W) if is_ld => record
                            .load_word(k)
                            .ok_or(EvalError::LoadOutOfBounds { pc: at, offset: k })?,
                        (BPF_IMM, BPF_W) => k,
                        (BPF_LEN, BPF_W) => SECCOMP_DATA_SIZE,
                        (BPF_MEM, BPF_W) => *m.mem.get(k as usize).ok_or_else(invalid)?,
                        _ => return Err(invalid()),
                    };
                    if is_ld {
                        m.a = value;
                    } else {
                        m.x = value;
                    }
                }
                BPF_ST | BPF_STX => {
                    if code != BPF_ST && code != BPF_STX {
                        return Err(invalid());
                    }
                    let value = if code == BPF_ST { m.a } else { m.x };
                    *m.mem.get_mut(k as usize).ok_or_else(invalid)? = value;
                }
                BPF_ALU => {
                    let operand = match bpf_src(code) {
                        BPF_X => m.x,
                        _ => k,
                    };
                    m.a = match bpf_op(code) {
                        BPF_ADD => m.a.wrapping_add(operand),
                        BPF_SUB => m.a.wrapping_sub(operand),
                        BPF_MUL => m.a.wrapping_mul(operand),
                        BPF_DIV => match m.a.checked_div(operand) {
                            Some(q) => q,
                            // The classic interpreter returns 0 on X == 0.
                            None => return Ok(0),
                        },
                        BPF_OR => m.a | operand,
                        BPF_AND => m.a & operand,
                        BPF_XOR => m.a ^ operand,
                        BPF_LSH => m.a.checked_shl(operand).unwrap_or(0),
                        BPF_RSH => m.a.checked_shr(operand).unwrap_or(0),
                        BPF_NEG => m.a.wrapping_neg(),
                        _ => return Err(invalid()),
                    };
                }
                BPF_JMP => {
                    let operand = match bpf_src(code) {
                        BPF_X => m.x,
                        _ => k,
                    };
                    let taken = match bpf_op(code) {
                        BPF_JA => {
                            pc = pc
                                .checked_add(k as usize)
                                .ok_or(EvalError::JumpOutOfRange { pc: at })?;
                            None
                        }
                        BPF_JEQ => Some(m.a == operand),
                        BPF_JGT => Some(m.a > operand),
                        BPF_JGE => Some(m.a >= operand),
                        BPF_JSET => Some(m.a & operand != 0),
                        _ => return Err(invalid()),
                    };
                    match taken {
                        Some(true) => pc += usize::from(insn.jt),
                        Some(false) => pc += usize::from(insn.jf),
                        None => (),
                    }
                    if pc >= insns.len() {
                        return Err(EvalError::JumpOutOfRange { pc: at });
                    }
                }
                BPF_RET => {
                    return match bpf_rval(code) {
                        BPF_K => Ok(k),
                        BPF_A => Ok(m.a),
                        _ => Err(invalid()),
                    };
                }
                _ => match bpf_miscop(code) {
                    BPF_TAX => m.x = m.a,
                    BPF_TXA => m.a = m.x,
                    _ => return Err(invalid()),
                },
            }
        }
    }

    /// Run the program and decode the result.
    pub fn action(&self, record: &Record) -> Result<Action, EvalError> {
        self.run(record).map(Action::decode)
    }

    /// Run the program with `rng` and decode the result.
    pub fn action_with(
        &self,
        record: &Record,
        rng: &mut impl RandomSource,
    ) -> Result<Action, EvalError> {
        self.run_with(record, rng).map(Action::decode)
    }
}

/// Evaluate `program` against `record`.
///
/// `ld rand` draws from the operating system.
pub fn evaluate(program: &Program, record: &Record) -> Result<Action, EvalError> {
    let action = Evaluator::new(program).action(record)?;
    log::trace!("nr {} => {action}", record.nr);
    Ok(action)
}


// vim: ts=4 sw=4 expandtab
