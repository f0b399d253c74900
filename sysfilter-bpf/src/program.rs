// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::{
    error::{DecodeError, VerifyError},
    insn::*,
    record::SECCOMP_DATA_SIZE,
};

/// A compiled filter program.
#[derive(Clone, PartialEq, Eq, Hash, Default, Debug)]
pub struct Program(Vec<Insn>);

impl Program {
    /// Wrap raw instructions. Nothing is checked. See [Program::verify].
    pub fn new(insns: Vec<Insn>) -> Self {
        Self(insns)
    }

    pub fn insns(&self) -> &[Insn] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Simple serialization, without serde.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(self.0.len() * 8);
        for insn in &self.0 {
            raw.extend_from_slice(&insn.to_bytes());
        }
        debug_assert_eq!(raw.len(), self.0.len() * 8);
        raw
    }

    /// Simple de-serialization, without serde.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, DecodeError> {
        if raw.len() % 8 != 0 {
            return Err(DecodeError::BadLength(raw.len()));
        }
        let len = raw.len() / 8;
        if len == 0 {
            return Err(DecodeError::Empty);
        }
        if len > BPF_MAXINSNS {
            return Err(DecodeError::TooLong {
                len,
                max: BPF_MAXINSNS,
            });
        }
        let bpf = raw
            .chunks_exact(8)
            .map(|chunk| {
                let mut buf = [0; 8];
                buf.copy_from_slice(chunk);
                Insn::from_bytes(&buf)
            })
            .collect();
        Ok(Self(bpf))
    }

    /// Check the program the way the kernel checks seccomp filters on installation.
    pub fn verify(&self) -> Result<(), VerifyError> {
        let insns = &self.0;
        let len = insns.len();
        if len == 0 {
            return Err(VerifyError::Empty);
        }
        if len > BPF_MAXINSNS {
            return Err(VerifyError::TooLong {
                len,
                max: BPF_MAXINSNS,
            });
        }

        let in_range = |pc: usize, off: u32| pc as u64 + 1 + u64::from(off) < len as u64;

        for (pc, insn) in insns.iter().enumerate() {
            let k = insn.k;
            match insn.code {
                c if c == BPF_LD | BPF_W | BPF_ABS => {
                    if k >= SKF_AD_OFF {
                        return Err(VerifyError::AncillaryLoad { pc });
                    }
                    if k >= SECCOMP_DATA_SIZE || k % 4 != 0 {
                        return Err(VerifyError::LoadOutOfBounds { pc, offset: k });
                    }
                }
                c if c == BPF_LD | BPF_W | BPF_LEN || c == BPF_LDX | BPF_W | BPF_LEN => (),
                c if c == BPF_RET | BPF_K || c == BPF_RET | BPF_A => (),
                c if c == BPF_ALU | BPF_DIV | BPF_K => {
                    if k == 0 {
                        return Err(VerifyError::DivisionByZero { pc });
                    }
                }
                c if c == BPF_ALU | BPF_LSH | BPF_K || c == BPF_ALU | BPF_RSH | BPF_K => {
                    if k >= 32 {
                        return Err(VerifyError::ShiftOutOfRange { pc, shift: k });
                    }
                }
                c if bpf_class(c) == BPF_ALU
                    && (bpf_src(c) == BPF_K || bpf_src(c) == BPF_X)
                    && c & !(0xf0 | 0x08 | 0x07) == 0
                    && matches!(
                        bpf_op(c),
                        BPF_ADD | BPF_SUB | BPF_MUL | BPF_DIV | BPF_AND | BPF_OR | BPF_XOR
                            | BPF_LSH | BPF_RSH
                    ) => {}
                c if c == BPF_ALU | BPF_NEG => (),
                c if c == BPF_LD | BPF_IMM || c == BPF_LDX | BPF_IMM => (),
                c if c == BPF_MISC | BPF_TAX || c == BPF_MISC | BPF_TXA => (),
                c if c == BPF_LD | BPF_MEM
                    || c == BPF_LDX | BPF_MEM
                    || c == BPF_ST
                    || c == BPF_STX =>
                {
                    if k >= BPF_MEMWORDS {
                        return Err(VerifyError::MemoryOutOfRange { pc, index: k });
                    }
                }
                c if c == BPF_JMP | BPF_JA => {
                    if !in_range(pc, k) {
                        return Err(VerifyError::JumpOutOfRange { pc });
                    }
                }
                c if bpf_class(c) == BPF_JMP
                    && c & !(0xf0 | 0x08 | 0x07) == 0
                    && matches!(bpf_op(c), BPF_JEQ | BPF_JGT | BPF_JGE | BPF_JSET) =>
                {
                    if !in_range(pc, insn.jt.into()) || !in_range(pc, insn.jf.into()) {
                        return Err(VerifyError::JumpOutOfRange { pc });
                    }
                }
                code => return Err(VerifyError::InvalidOpcode { pc, code }),
            }
        }

        if !insns[len - 1].is_ret() {
            return Err(VerifyError::NoFinalReturn);
        }

        self.check_memory_loads()
    }

    /// Scratch memory must be written on every path before it is read.
    fn check_memory_loads(&self) -> Result<(), VerifyError> {
        let insns = &self.0;
        let mut masks = vec![u16::MAX; insns.len()];
        let mut memvalid: u16 = 0;
        for (pc, insn) in insns.iter().enumerate() {
            memvalid &= masks[pc];
            let code = insn.code;
            if code == BPF_ST || code == BPF_STX {
                memvalid |= 1 << insn.k;
            } else if code == BPF_LD | BPF_MEM || code == BPF_LDX | BPF_MEM {
                if memvalid & (1 << insn.k) == 0 {
                    return Err(VerifyError::UninitializedMemory { pc, index: insn.k });
                }
            } else if insn.is_ret() {
                memvalid = u16::MAX;
            } else if insn.is_ja() {
                masks[pc + 1 + insn.k as usize] &= memvalid;
                memvalid = u16::MAX;
            } else if insn.is_cond_jump() {
                masks[pc + 1 + usize::from(insn.jt)] &= memvalid;
                masks[pc + 1 + usize::from(insn.jf)] &= memvalid;
                memvalid = u16::MAX;
            }
        }
        Ok(())
    }

    /// Install this program into the current thread with the default [crate::Installer].
    #[cfg(feature = "install")]
    pub fn install(&self) -> Result<(), crate::error::InstallError> {
        crate::install::Installer::default().install(self)
    }
}

impl From<Vec<Insn>> for Program {
    fn from(insns: Vec<Insn>) -> Self {
        Self::new(insns)
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (pc, insn) in self.0.iter().enumerate() {
            write!(f, "{pc:4}: ")?;
            insn.fmt_at(f, Some(pc))?;
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{SECCOMP_RET_ALLOW, SECCOMP_RET_ERRNO};

    /// Allow getpid, errno 42 for everything else.
    fn basic() -> Program {
        Program::new(vec![
            Insn::load_abs(0),
            Insn::jump(BPF_JMP | BPF_JEQ | BPF_K, 39, 0, 1),
            Insn::ret_k(SECCOMP_RET_ALLOW),
            Insn::ret_k(SECCOMP_RET_ERRNO | 42),
        ])
    }

    /// Allow getpid, random errno for everything else.
    fn rnd() -> Program {
        Program::new(vec![
            Insn::load_abs(0),
            Insn::jump(BPF_JMP | BPF_JEQ | BPF_K, 39, 0, 1),
            Insn::ret_k(SECCOMP_RET_ALLOW),
            Insn::load_random(),
            Insn::alu_k(BPF_AND, 0x1ff),
            Insn::alu_k(BPF_OR, SECCOMP_RET_ERRNO),
            Insn::ret_a(),
        ])
    }

    #[test]
    fn test_serialize() {
        let prog = rnd();
        let raw = prog.to_bytes();
        assert_eq!(raw.len(), 7 * 8);
        assert_eq!(&raw[0..8], &[0x20, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&raw[8..16], &[0x15, 0, 0, 1, 39, 0, 0, 0]);
        assert_eq!(Program::from_bytes(&raw).unwrap(), prog);

        assert_eq!(Program::from_bytes(&raw[..7]), Err(DecodeError::BadLength(7)));
        assert_eq!(Program::from_bytes(&[]), Err(DecodeError::Empty));
        assert!(matches!(
            Program::from_bytes(&vec![0; 8 * (BPF_MAXINSNS + 1)]),
            Err(DecodeError::TooLong { .. })
        ));
    }

    #[test]
    fn test_verify() {
        assert_eq!(basic().verify(), Ok(()));
        assert_eq!(rnd().verify(), Err(VerifyError::AncillaryLoad { pc: 3 }));
        assert_eq!(Program::default().verify(), Err(VerifyError::Empty));

        let bad = |insns: Vec<Insn>| Program::new(insns).verify().unwrap_err();
        assert_eq!(
            bad(vec![Insn::load_abs(2), Insn::ret_a()]),
            VerifyError::LoadOutOfBounds { pc: 0, offset: 2 }
        );
        assert_eq!(
            bad(vec![Insn::load_abs(64), Insn::ret_a()]),
            VerifyError::LoadOutOfBounds { pc: 0, offset: 64 }
        );
        assert_eq!(
            bad(vec![Insn::stmt(BPF_LD | BPF_H | BPF_ABS, 0), Insn::ret_a()]),
            VerifyError::InvalidOpcode {
                pc: 0,
                code: BPF_LD | BPF_H | BPF_ABS
            }
        );
        assert_eq!(
            bad(vec![Insn::alu_k(BPF_MOD, 3), Insn::ret_a()]),
            VerifyError::InvalidOpcode {
                pc: 0,
                code: BPF_ALU | BPF_MOD
            }
        );
        assert_eq!(
            bad(vec![Insn::alu_k(BPF_DIV, 0), Insn::ret_a()]),
            VerifyError::DivisionByZero { pc: 0 }
        );
        assert_eq!(
            bad(vec![Insn::alu_k(BPF_LSH, 32), Insn::ret_a()]),
            VerifyError::ShiftOutOfRange { pc: 0, shift: 32 }
        );
        assert_eq!(
            bad(vec![
                Insn::jump(BPF_JMP | BPF_JEQ | BPF_K, 0, 0, 1),
                Insn::ret_a()
            ]),
            VerifyError::JumpOutOfRange { pc: 0 }
        );
        assert_eq!(
            bad(vec![Insn::stmt(BPF_JMP | BPF_JA, 1), Insn::ret_a()]),
            VerifyError::JumpOutOfRange { pc: 0 }
        );
        assert_eq!(bad(vec![Insn::load_abs(0)]), VerifyError::NoFinalReturn);
        assert_eq!(
            bad(vec![Insn::stmt(BPF_ST, 16), Insn::ret_a()]),
            VerifyError::MemoryOutOfRange { pc: 0, index: 16 }
        );
        assert_eq!(
            bad(vec![Insn::stmt(BPF_LD | BPF_MEM, 3), Insn::ret_a()]),
            VerifyError::UninitializedMemory { pc: 0, index: 3 }
        );
        // M[3] is only written on one path.
        assert_eq!(
            bad(vec![
                Insn::jump(BPF_JMP | BPF_JEQ | BPF_K, 0, 0, 1),
                Insn::stmt(BPF_ST, 3),
                Insn::stmt(BPF_LD | BPF_MEM, 3),
                Insn::ret_a(),
            ]),
            VerifyError::UninitializedMemory { pc: 2, index: 3 }
        );
        assert_eq!(
            Program::new(vec![
                Insn::stmt(BPF_ST, 3),
                Insn::jump(BPF_JMP | BPF_JEQ | BPF_K, 0, 0, 1),
                Insn::stmt(BPF_LDX | BPF_MEM, 3),
                Insn::ret_a(),
            ])
            .verify(),
            Ok(())
        );
    }

    #[test]
    fn test_disasm() {
        let text = rnd().to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "   0: ld [0]");
        assert_eq!(lines[1], "   1: jeq #0x27, 2, 3");
        assert_eq!(lines[3], "   3: ld rand");
        assert_eq!(lines[6], "   6: ret a");
    }
}

// vim: ts=4 sw=4 expandtab
