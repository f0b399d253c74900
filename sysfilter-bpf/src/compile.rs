// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rule list to classic BPF compiler.
//!
//! Every rule compiles to one block:
//!
//! ```text
//! <condition 0>   ; fail: jump to the next block
//! <condition 1>   ; fail: jump to the next block
//! ...
//! ret <action>
//! ```
//!
//! All jumps go forward and stay inside their block.
//! The block is built backwards from the action, so the distance to the next block
//! is always known. Conditional jumps only reach 255 instructions.
//! Where a failing jump would go further, a pair of unconditional jumps
//! with 32-bit offsets is put between two conditions:
//!
//! ```text
//! <condition n>
//! ja 1            ; condition n holds: continue with condition n+1
//! ja <next block> ; a later condition does not hold
//! <condition n+1> ; fail: jump to the ja above
//! ```
//!
//! The program ends with the return of the default action.

use crate::{
    action::{Action, SECCOMP_RET_ERRNO},
    error::CompileError,
    insn::*,
    program::Program,
    record::{Arch, FieldOffsets, SECCOMP_DATA_ARCH_OFFSET},
    rule::{Cmp, Condition, Rule},
};

/// Branch target that is not resolved yet.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Target {
    /// Relative to the next instruction.
    Rel(u8),
    /// The condition holds. Continue after the condition.
    Pass,
    /// The condition does not hold. Continue with the next rule.
    Fail,
}

impl Target {
    fn swap_outcome(self) -> Self {
        match self {
            Self::Pass => Self::Fail,
            Self::Fail => Self::Pass,
            rel => rel,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Pending {
    code: u16,
    k: u32,
    jt: Target,
    jf: Target,
}

impl Pending {
    fn stmt(insn: Insn) -> Self {
        Self {
            code: insn.code,
            k: insn.k,
            jt: Target::Rel(0),
            jf: Target::Rel(0),
        }
    }

    fn jump(op: u16, k: u32, jt: Target, jf: Target) -> Self {
        Self {
            code: BPF_JMP | op | BPF_K,
            k,
            jt,
            jf,
        }
    }

    fn resolve(&mut self, target: Target, rel: u8) {
        if self.jt == target {
            self.jt = Target::Rel(rel);
        }
        if self.jf == target {
            self.jf = Target::Rel(rel);
        }
    }

    fn finish(self) -> Insn {
        let rel = |t: Target| match t {
            Target::Rel(rel) => rel,
            // Resolved by the block emitter.
            Target::Pass | Target::Fail => unreachable!("Unresolved jump target"),
        };
        Insn {
            code: self.code,
            jt: rel(self.jt),
            jf: rel(self.jf),
            k: self.k,
        }
    }
}

/// Split a 64-bit constant into (high, low) words.
fn split(v: u64) -> (u32, u32) {
    ((v >> 32) as u32, v as u32)
}

/// The instructions returning `action`.
fn action_insns(action: Action) -> Vec<Insn> {
    match action {
        Action::RandomizedErrorNumber(mask) => vec![
            Insn::load_random(),
            Insn::alu_k(BPF_AND, mask.into()),
            Insn::alu_k(BPF_OR, SECCOMP_RET_ERRNO),
            Insn::ret_a(),
        ],
        action => match action.encode() {
            Some(ret) => vec![Insn::ret_k(ret)],
            None => unreachable!("Action without constant encoding"),
        },
    }
}

/// Emit one condition with unresolved [Target::Pass]/[Target::Fail] targets.
fn condition_insns(rule: usize, cond: &Condition) -> Result<Vec<Pending>, CompileError> {
    use Target::{Fail, Pass, Rel};

    if !cond.cmp.is_direct() {
        return Err(CompileError::UnsupportedPredicate {
            rule,
            reason: format!(
                "'{}' has no BPF jump instruction. Negate the opposite comparison instead.",
                cond.cmp
            ),
        });
    }
    let Some(offsets) = cond.field.offsets() else {
        return Err(CompileError::FieldOutOfRange {
            rule,
            offset: cond.field.nominal_offset(),
        });
    };

    let mut out = Vec::with_capacity(8);
    match offsets {
        FieldOffsets::Word(offset) => {
            let too_wide = |what: &str, v: u64| CompileError::UnsupportedPredicate {
                rule,
                reason: format!(
                    "{what} {v:#x} does not fit the 32-bit field '{}'",
                    cond.field
                ),
            };
            let value = u32::try_from(cond.value).map_err(|_| too_wide("Value", cond.value))?;
            out.push(Pending::stmt(Insn::load_abs(offset)));
            match cond.cmp {
                Cmp::Eq => out.push(Pending::jump(BPF_JEQ, value, Pass, Fail)),
                Cmp::Gt => out.push(Pending::jump(BPF_JGT, value, Pass, Fail)),
                Cmp::Ge => out.push(Pending::jump(BPF_JGE, value, Pass, Fail)),
                Cmp::BitsSet => out.push(Pending::jump(BPF_JSET, value, Pass, Fail)),
                Cmp::MaskedEq(mask) => {
                    let mask = u32::try_from(mask).map_err(|_| too_wide("Mask", mask))?;
                    out.push(Pending::stmt(Insn::alu_k(BPF_AND, mask)));
                    out.push(Pending::jump(BPF_JEQ, value, Pass, Fail));
                }
                Cmp::Ne | Cmp::Lt | Cmp::Le => unreachable!(),
            }
        }
        FieldOffsets::Dword { low, high } => {
            let (value_hi, value_lo) = split(cond.value);
            match cond.cmp {
                Cmp::Eq => {
                    out.push(Pending::stmt(Insn::load_abs(high)));
                    out.push(Pending::jump(BPF_JEQ, value_hi, Rel(0), Fail));
                    out.push(Pending::stmt(Insn::load_abs(low)));
                    out.push(Pending::jump(BPF_JEQ, value_lo, Pass, Fail));
                }
                Cmp::MaskedEq(mask) => {
                    let (mask_hi, mask_lo) = split(mask);
                    out.push(Pending::stmt(Insn::load_abs(high)));
                    out.push(Pending::stmt(Insn::alu_k(BPF_AND, mask_hi)));
                    out.push(Pending::jump(BPF_JEQ, value_hi, Rel(0), Fail));
                    out.push(Pending::stmt(Insn::load_abs(low)));
                    out.push(Pending::stmt(Insn::alu_k(BPF_AND, mask_lo)));
                    out.push(Pending::jump(BPF_JEQ, value_lo, Pass, Fail));
                }
                Cmp::Gt | Cmp::Ge => {
                    let op_lo = if cond.cmp == Cmp::Gt { BPF_JGT } else { BPF_JGE };
                    out.push(Pending::stmt(Insn::load_abs(high)));
                    out.push(Pending::jump(BPF_JGT, value_hi, Pass, Rel(0)));
                    out.push(Pending::jump(BPF_JEQ, value_hi, Rel(0), Fail));
                    out.push(Pending::stmt(Insn::load_abs(low)));
                    out.push(Pending::jump(op_lo, value_lo, Pass, Fail));
                }
                Cmp::BitsSet => {
                    out.push(Pending::stmt(Insn::load_abs(high)));
                    out.push(Pending::jump(BPF_JSET, value_hi, Pass, Rel(0)));
                    out.push(Pending::stmt(Insn::load_abs(low)));
                    out.push(Pending::jump(BPF_JSET, value_lo, Pass, Fail));
                }
                Cmp::Ne | Cmp::Lt | Cmp::Le => unreachable!(),
            }
        }
    }

    if cond.negated {
        for p in &mut out {
            p.jt = p.jt.swap_outcome();
            p.jf = p.jf.swap_outcome();
        }
    }

    // Pass continues right after the condition.
    let len = out.len();
    for (i, p) in out.iter_mut().enumerate() {
        p.resolve(Pass, (len - i - 1) as u8);
    }
    Ok(out)
}

/// Emit the block of one rule.
fn rule_insns(index: usize, rule: &Rule) -> Result<Vec<Insn>, CompileError> {
    // Segments of the block in reverse order.
    let mut segments = vec![action_insns(rule.action())];
    // Instructions between the current position and the next block.
    let mut len = segments[0].len();
    // Distance from the current position to the nearest fail landing.
    let mut to_fail = len;

    for cond in rule.conditions().iter().rev() {
        let mut cond = condition_insns(index, cond)?;
        if cond.len() + to_fail > u8::MAX.into() {
            let skip = u32::try_from(len).map_err(|_| CompileError::TooManyInstructions {
                count: len,
                max: BPF_MAXINSNS,
            })?;
            segments.push(vec![Insn::ja(1), Insn::ja(skip)]);
            len += 2;
            to_fail = 1;
        }

        // Fail continues at the nearest fail landing.
        let n = cond.len();
        for (i, p) in cond.iter_mut().enumerate() {
            p.resolve(Target::Fail, (n - i - 1 + to_fail) as u8);
        }
        segments.push(cond.into_iter().map(Pending::finish).collect());
        len += n;
        to_fail += n;
    }

    Ok(segments.into_iter().rev().flatten().collect())
}

/// Builder of filter programs.
///
/// ```
/// use sysfilter_bpf::{Action, FilterBuilder, Rule};
///
/// let program = FilterBuilder::new(Action::ErrorNumber(42))
///     .rule(Rule::syscall(39, Action::Allow))
///     .compile()
///     .unwrap();
/// assert_eq!(program.len(), 4);
/// ```
#[derive(Clone, Debug)]
pub struct FilterBuilder {
    rules: Vec<Rule>,
    default_action: Action,
    arch_check: Option<(Arch, Action)>,
    max_len: usize,
}

impl FilterBuilder {
    pub fn new(default_action: Action) -> Self {
        Self {
            rules: vec![],
            default_action,
            arch_check: None,
            max_len: BPF_MAXINSNS,
        }
    }

    /// Append a rule. Rules are checked in the order they are added.
    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Return `mismatch` for every record that is not from `arch`, before any rule is checked.
    #[must_use]
    pub fn arch_check(mut self, arch: Arch, mismatch: Action) -> Self {
        self.arch_check = Some((arch, mismatch));
        self
    }

    /// Lower the instruction limit. It can not be raised above [BPF_MAXINSNS].
    #[must_use]
    pub fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len.min(BPF_MAXINSNS);
        self
    }

    pub fn compile(&self) -> Result<Program, CompileError> {
        let mut insns = Vec::new();

        if let Some((arch, mismatch)) = self.arch_check {
            let mismatch = action_insns(mismatch);
            insns.push(Insn::load_abs(SECCOMP_DATA_ARCH_OFFSET));
            insns.push(Insn::jump(
                BPF_JMP | BPF_JEQ | BPF_K,
                arch.token(),
                mismatch.len() as u8,
                0,
            ));
            insns.extend(mismatch);
        }

        for (index, rule) in self.rules.iter().enumerate() {
            insns.extend(rule_insns(index, rule)?);
            if insns.len() > self.max_len {
                // Count the rest, so that the error tells the full size.
                let mut count = insns.len();
                for (index, rule) in self.rules.iter().enumerate().skip(index + 1) {
                    count += rule_insns(index, rule)?.len();
                }
                count += action_insns(self.default_action).len();
                return Err(CompileError::TooManyInstructions {
                    count,
                    max: self.max_len,
                });
            }
        }

        insns.extend(action_insns(self.default_action));
        if insns.len() > self.max_len {
            return Err(CompileError::TooManyInstructions {
                count: insns.len(),
                max: self.max_len,
            });
        }

        log::debug!(
            "Compiled {} seccomp rules into {} BPF instructions",
            self.rules.len(),
            insns.len()
        );
        Ok(Program::new(insns))
    }
}

/// Compile `rules` (first match wins) with `default_action` for records no rule matches.
pub fn compile(rules: &[Rule], default_action: Action) -> Result<Program, CompileError> {
    FilterBuilder::new(default_action)
        .rules(rules.iter().cloned())
        .compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        action::SECCOMP_RET_ALLOW,
        eval::evaluate,
        record::{Field, Record, SECCOMP_DATA_NR_OFFSET},
        rule::first_match,
    };

    const GETPID: i64 = 39;

    #[test]
    fn test_basic_layout() {
        // Allow getpid, errno 42 for everything else.
        let prog = compile(
            &[Rule::syscall(GETPID, Action::Allow)],
            Action::ErrorNumber(42),
        )
        .unwrap();
        assert_eq!(
            prog.insns(),
            &[
                Insn::load_abs(SECCOMP_DATA_NR_OFFSET),
                Insn::jump(BPF_JMP | BPF_JEQ | BPF_K, 39, 0, 1),
                Insn::ret_k(SECCOMP_RET_ALLOW),
                Insn::ret_k(SECCOMP_RET_ERRNO | 42),
            ]
        );
    }

    #[test]
    fn test_random_layout() {
        let prog = compile(
            &[Rule::syscall(GETPID, Action::Allow)],
            Action::RandomizedErrorNumber(0x1ff),
        )
        .unwrap();
        assert_eq!(
            &prog.insns()[3..],
            &[
                Insn::load_random(),
                Insn::alu_k(BPF_AND, 0x1ff),
                Insn::alu_k(BPF_OR, SECCOMP_RET_ERRNO),
                Insn::ret_a(),
            ]
        );
    }

    #[test]
    fn test_random_rule_action() {
        // A randomized rule action spans four instructions.
        // The failing jump has to skip all of them.
        let prog = compile(
            &[Rule::syscall(1, Action::RandomizedErrorNumber(0xff))],
            Action::Allow,
        )
        .unwrap();
        assert_eq!(prog.len(), 7);
        assert_eq!(prog.insns()[1], Insn::jump(BPF_JMP | BPF_JEQ | BPF_K, 1, 0, 4));
    }

    #[test]
    fn test_negated() {
        let prog = compile(
            &[Rule::new(Action::Trap).when(Condition::ne(Field::Nr, 7))],
            Action::Allow,
        )
        .unwrap();
        assert_eq!(prog.insns()[1], Insn::jump(BPF_JMP | BPF_JEQ | BPF_K, 7, 1, 0));
    }

    #[test]
    fn test_unconditional_rule() {
        let prog = compile(&[Rule::new(Action::Log)], Action::Kill).unwrap();
        assert_eq!(
            prog.insns(),
            &[
                Insn::ret_k(Action::Log.encode().unwrap()),
                Insn::ret_k(Action::Kill.encode().unwrap()),
            ]
        );
    }

    #[test]
    fn test_arch_check() {
        let prog = FilterBuilder::new(Action::Allow)
            .arch_check(Arch::X86_64, Action::Kill)
            .compile()
            .unwrap();
        assert_eq!(
            prog.insns(),
            &[
                Insn::load_abs(4),
                Insn::jump(BPF_JMP | BPF_JEQ | BPF_K, 0xc000_003e, 1, 0),
                Insn::ret_k(0x8000_0000),
                Insn::ret_k(SECCOMP_RET_ALLOW),
            ]
        );
    }

    #[test]
    fn test_unsupported() {
        for cond in [
            Condition::new(Field::Nr, Cmp::Ne, 1),
            Condition::new(Field::Nr, Cmp::Lt, 1),
            Condition::new(Field::Arg(0), Cmp::Le, 1),
            Condition::eq(Field::Nr, 0x1_0000_0000),
            Condition::masked_eq(Field::ArgLow(0), 0x1_0000_0000, 0),
        ] {
            let rules = [
                Rule::syscall(1, Action::Allow),
                Rule::new(Action::Trap).when(cond),
            ];
            match compile(&rules, Action::Kill) {
                Err(CompileError::UnsupportedPredicate { rule, .. }) => assert_eq!(rule, 1),
                other => panic!("Unexpected result {other:?}"),
            }
        }
    }

    #[test]
    fn test_field_out_of_range() {
        for (field, offset) in [
            (Field::Arg(6), 64),
            (Field::ArgLow(9), 88),
            (Field::Offset(3), 3),
            (Field::Offset(64), 64),
        ] {
            assert_eq!(
                compile(&[Rule::new(Action::Trap).when(Condition::eq(field, 0))], Action::Kill),
                Err(CompileError::FieldOutOfRange { rule: 0, offset })
            );
        }
    }

    #[test]
    fn test_too_many_instructions() {
        // 3 instructions per rule, plus the default return.
        let rules: Vec<Rule> = (0..2000).map(|nr| Rule::syscall(nr, Action::Allow)).collect();
        assert_eq!(
            compile(&rules, Action::Kill),
            Err(CompileError::TooManyInstructions {
                count: 6001,
                max: BPF_MAXINSNS
            })
        );
        assert_eq!(compile(&rules[..1365], Action::Kill).unwrap().len(), 4096);
        assert!(matches!(
            compile(&rules[..1366], Action::Kill),
            Err(CompileError::TooManyInstructions { count: 4099, .. })
        ));
        assert_eq!(
            FilterBuilder::new(Action::Kill)
                .rules(rules[..2].iter().cloned())
                .max_len(6)
                .compile(),
            Err(CompileError::TooManyInstructions { count: 7, max: 6 })
        );
    }

    #[test]
    fn test_long_rule() {
        // 5 instructions per 64-bit `>` condition. Rule 0 spans more than 255 instructions.
        let rule = (0..60).fold(Rule::new(Action::Allow), |rule, i| {
            rule.when(Condition::gt(Field::Arg(1), i))
        });
        let rules = [rule, Rule::syscall(GETPID, Action::Log)];
        let prog = compile(&rules, Action::Kill).unwrap();
        prog.verify().unwrap();
        assert!(prog.insns().iter().any(Insn::is_ja));
        assert!(prog.len() < 400);

        for nr in [GETPID as u32, 1] {
            for arg in [0, 1, 30, 58, 59, 60, 0x1_0000_0000, u64::MAX] {
                let rec = Record::new(nr).with_arg(1, arg);
                assert_eq!(
                    evaluate(&prog, &rec).unwrap(),
                    first_match(&rules, Action::Kill, &rec),
                    "nr {nr} arg {arg:#x}"
                );
            }
        }
        assert_eq!(
            evaluate(&prog, &Record::new(GETPID as u32).with_arg(1, 30)).unwrap(),
            Action::Log
        );
        assert_eq!(
            evaluate(&prog, &Record::new(1).with_arg(1, 60)).unwrap(),
            Action::Allow
        );
    }

    #[test]
    fn test_long_negated_rule() {
        let rule = (0..120).fold(Rule::new(Action::Trap), |rule, i| {
            rule.when(Condition::masked_eq(Field::Arg(0), 1 << (i % 64), 0).negate())
        });
        let rules = [rule];
        let prog = compile(&rules, Action::Allow).unwrap();
        prog.verify().unwrap();
        for arg in [0, 1, 1 << 63, u64::MAX, 0x5555_5555_5555_5555] {
            let rec = Record::new(0).with_arg(0, arg);
            assert_eq!(
                evaluate(&prog, &rec).unwrap(),
                first_match(&rules, Action::Allow, &rec),
                "arg {arg:#x}"
            );
        }
    }

    #[test]
    fn test_deterministic() {
        let rules = [
            Rule::syscall(1, Action::Allow).when(Condition::masked_eq(Field::Arg(2), 0xff00, 0x100)),
            Rule::syscall(2, Action::ErrorNumber(1)).when(Condition::ge(Field::Arg(0), 1 << 40)),
            Rule::new(Action::Log).when(Condition::bits_set(Field::InstructionPointer, 3)),
        ];
        let a = compile(&rules, Action::Kill).unwrap();
        let b = compile(&rules, Action::Kill).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_bytes(), b.to_bytes());
        a.verify().unwrap();
    }
}

// vim: ts=4 sw=4 expandtab
