// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Classic BPF instruction encoding.
//!
//! See `/usr/include/linux/bpf_common.h` and `/usr/include/linux/filter.h`.

use crate::action::Action;

// Instruction classes.
pub const BPF_LD: u16 = 0x00;
pub const BPF_LDX: u16 = 0x01;
pub const BPF_ST: u16 = 0x02;
pub const BPF_STX: u16 = 0x03;
pub const BPF_ALU: u16 = 0x04;
pub const BPF_JMP: u16 = 0x05;
pub const BPF_RET: u16 = 0x06;
pub const BPF_MISC: u16 = 0x07;

// ld/ldx fields.
pub const BPF_W: u16 = 0x00;
pub const BPF_H: u16 = 0x08;
pub const BPF_B: u16 = 0x10;
pub const BPF_IMM: u16 = 0x00;
pub const BPF_ABS: u16 = 0x20;
pub const BPF_IND: u16 = 0x40;
pub const BPF_MEM: u16 = 0x60;
pub const BPF_LEN: u16 = 0x80;
pub const BPF_MSH: u16 = 0xa0;

// alu/jmp fields.
pub const BPF_ADD: u16 = 0x00;
pub const BPF_SUB: u16 = 0x10;
pub const BPF_MUL: u16 = 0x20;
pub const BPF_DIV: u16 = 0x30;
pub const BPF_OR: u16 = 0x40;
pub const BPF_AND: u16 = 0x50;
pub const BPF_LSH: u16 = 0x60;
pub const BPF_RSH: u16 = 0x70;
pub const BPF_NEG: u16 = 0x80;
pub const BPF_MOD: u16 = 0x90;
pub const BPF_XOR: u16 = 0xa0;

pub const BPF_JA: u16 = 0x00;
pub const BPF_JEQ: u16 = 0x10;
pub const BPF_JGT: u16 = 0x20;
pub const BPF_JGE: u16 = 0x30;
pub const BPF_JSET: u16 = 0x40;

pub const BPF_K: u16 = 0x00;
pub const BPF_X: u16 = 0x08;
pub const BPF_A: u16 = 0x10;

// misc fields.
pub const BPF_TAX: u16 = 0x00;
pub const BPF_TXA: u16 = 0x80;

/// Maximum number of instructions in one program.
pub const BPF_MAXINSNS: usize = 4096;

/// Number of scratch memory words.
pub const BPF_MEMWORDS: u32 = 16;

/// Base offset of the ancillary data loads.
pub const SKF_AD_OFF: u32 = (-0x1000_i32) as u32;

/// Ancillary load of a random 32-bit value.
pub const SKF_AD_RANDOM: u32 = 56;

#[inline]
pub const fn bpf_class(code: u16) -> u16 {
    code & 0x07
}

#[inline]
pub const fn bpf_size(code: u16) -> u16 {
    code & 0x18
}

#[inline]
pub const fn bpf_mode(code: u16) -> u16 {
    code & 0xe0
}

#[inline]
pub const fn bpf_op(code: u16) -> u16 {
    code & 0xf0
}

#[inline]
pub const fn bpf_src(code: u16) -> u16 {
    code & 0x08
}

#[inline]
pub const fn bpf_rval(code: u16) -> u16 {
    code & 0x18
}

#[inline]
pub const fn bpf_miscop(code: u16) -> u16 {
    code & 0xf8
}

/// One classic BPF instruction. Same layout as `struct sock_filter`.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub struct Insn {
    pub code: u16,
    pub jt: u8,
    pub jf: u8,
    pub k: u32,
}

impl Insn {
    /// `BPF_STMT()`
    pub const fn stmt(code: u16, k: u32) -> Self {
        Self {
            code,
            jt: 0,
            jf: 0,
            k,
        }
    }

    /// `BPF_JUMP()`
    pub const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> Self {
        Self { code, jt, jf, k }
    }

    /// `ja k`: Unconditional jump with a 32-bit offset.
    pub const fn ja(k: u32) -> Self {
        Self::stmt(BPF_JMP | BPF_JA, k)
    }

    /// `ld [k]`: Load a 32-bit word from the input record.
    pub const fn load_abs(offset: u32) -> Self {
        Self::stmt(BPF_LD | BPF_W | BPF_ABS, offset)
    }

    /// `ld rand`: Load a random 32-bit value.
    pub const fn load_random() -> Self {
        Self::load_abs(SKF_AD_OFF + SKF_AD_RANDOM)
    }

    pub const fn alu_k(op: u16, k: u32) -> Self {
        Self::stmt(BPF_ALU | op | BPF_K, k)
    }

    pub const fn ret_k(k: u32) -> Self {
        Self::stmt(BPF_RET | BPF_K, k)
    }

    pub const fn ret_a() -> Self {
        Self::stmt(BPF_RET | BPF_A, 0)
    }

    /// Returns `true`, if this is a `ret` instruction.
    pub fn is_ret(&self) -> bool {
        bpf_class(self.code) == BPF_RET
    }

    /// Returns `true`, if this is a conditional jump.
    pub fn is_cond_jump(&self) -> bool {
        bpf_class(self.code) == BPF_JMP && bpf_op(self.code) != BPF_JA
    }

    /// Returns `true`, if this is an unconditional `ja`.
    pub fn is_ja(&self) -> bool {
        self.code == BPF_JMP | BPF_JA
    }

    /// Encode to the 8 byte transfer representation.
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut buf = [0; 8];
        buf[0..2].copy_from_slice(&self.code.to_le_bytes());
        buf[2] = self.jt;
        buf[3] = self.jf;
        buf[4..8].copy_from_slice(&self.k.to_le_bytes());
        buf
    }

    /// Decode from the 8 byte transfer representation.
    pub fn from_bytes(raw: &[u8; 8]) -> Self {
        Self {
            code: u16::from_le_bytes([raw[0], raw[1]]),
            jt: raw[2],
            jf: raw[3],
            k: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
        }
    }

    fn fmt_operand(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if bpf_src(self.code) == BPF_X {
            write!(f, "x")
        } else {
            write!(f, "#{:#x}", self.k)
        }
    }

    /// Disassemble. `pc` is used to print absolute jump targets.
    pub(crate) fn fmt_at(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        pc: Option<usize>,
    ) -> std::fmt::Result {
        let code = self.code;
        let target = |off: u32| -> String {
            match pc {
                Some(pc) => format!("{}", pc as u64 + 1 + u64::from(off)),
                None => format!("+{off}"),
            }
        };
        match bpf_class(code) {
            BPF_LD | BPF_LDX => {
                let name = if bpf_class(code) == BPF_LD { "ld" } else { "ldx" };
                let suffix = match bpf_size(code) {
                    BPF_H => "h",
                    BPF_B => "b",
                    _ => "",
                };
                match bpf_mode(code) {
                    BPF_IMM => write!(f, "{name}{suffix} #{:#x}", self.k),
                    BPF_ABS if self.k == SKF_AD_OFF + SKF_AD_RANDOM => write!(f, "{name} rand"),
                    BPF_ABS => write!(f, "{name}{suffix} [{}]", self.k),
                    BPF_IND => write!(f, "{name}{suffix} [x + {}]", self.k),
                    BPF_MEM => write!(f, "{name} M[{}]", self.k),
                    BPF_LEN => write!(f, "{name} #len"),
                    BPF_MSH => write!(f, "{name}b 4*([{}]&0xf)", self.k),
                    _ => write!(f, ".word {code:#06x}, {:#x}", self.k),
                }
            }
            BPF_ST => write!(f, "st M[{}]", self.k),
            BPF_STX => write!(f, "stx M[{}]", self.k),
            BPF_ALU => {
                let name = match bpf_op(code) {
                    BPF_ADD => "add",
                    BPF_SUB => "sub",
                    BPF_MUL => "mul",
                    BPF_DIV => "div",
                    BPF_OR => "or",
                    BPF_AND => "and",
                    BPF_LSH => "lsh",
                    BPF_RSH => "rsh",
                    BPF_MOD => "mod",
                    BPF_XOR => "xor",
                    BPF_NEG => return write!(f, "neg"),
                    _ => return write!(f, ".word {code:#06x}, {:#x}", self.k),
                };
                write!(f, "{name} ")?;
                self.fmt_operand(f)
            }
            BPF_JMP => {
                let name = match bpf_op(code) {
                    BPF_JA => return write!(f, "ja {}", target(self.k)),
                    BPF_JEQ => "jeq",
                    BPF_JGT => "jgt",
                    BPF_JGE => "jge",
                    BPF_JSET => "jset",
                    _ => return write!(f, ".word {code:#06x}, {:#x}", self.k),
                };
                write!(f, "{name} ")?;
                self.fmt_operand(f)?;
                write!(
                    f,
                    ", {}, {}",
                    target(self.jt.into()),
                    target(self.jf.into())
                )
            }
            BPF_RET => match bpf_rval(code) {
                BPF_A => write!(f, "ret a"),
                _ => write!(f, "ret #{:#010x}  ; {}", self.k, Action::decode(self.k)),
            },
            _ => match bpf_miscop(code) {
                BPF_TAX => write!(f, "tax"),
                BPF_TXA => write!(f, "txa"),
                _ => write!(f, ".word {code:#06x}, {:#x}", self.k),
            },
        }
    }
}

impl std::fmt::Display for Insn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.fmt_at(f, None)
    }
}


// vim: ts=4 sw=4 expandtab
