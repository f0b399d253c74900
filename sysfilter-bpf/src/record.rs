// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

// `struct seccomp_data` layout:
//
// ```c
// struct seccomp_data {
//     int nr;
//     __u32 arch;
//     __u64 instruction_pointer;
//     __u64 args[6];
// };
// ```
pub const SECCOMP_DATA_NR_OFFSET: u32 = 0;
pub const SECCOMP_DATA_ARCH_OFFSET: u32 = 4;
pub const SECCOMP_DATA_IP_OFFSET: u32 = 8;
pub const SECCOMP_DATA_ARGS_OFFSET: u32 = 16;
pub const SECCOMP_DATA_ARG_SIZE: u32 = 8;
pub const SECCOMP_DATA_SIZE: u32 = 64;

/// Number of syscall arguments.
pub const NR_ARGS: usize = 6;

// Architecture identifiers. See /usr/include/linux/audit.h .
const AUDIT_ARCH_64BIT: u32 = 0x8000_0000;
const AUDIT_ARCH_LE: u32 = 0x4000_0000;
const EM_386: u32 = 3;
const EM_ARM: u32 = 40;
const EM_X86_64: u32 = 62;
const EM_AARCH64: u32 = 183;
const EM_RISCV: u32 = 243;

/// Syscall ABI, as seen in the `arch` field.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u32)]
pub enum Arch {
    X86 = EM_386 | AUDIT_ARCH_LE,
    X86_64 = EM_X86_64 | AUDIT_ARCH_64BIT | AUDIT_ARCH_LE,
    Arm = EM_ARM | AUDIT_ARCH_LE,
    Aarch64 = EM_AARCH64 | AUDIT_ARCH_64BIT | AUDIT_ARCH_LE,
    Riscv64 = EM_RISCV | AUDIT_ARCH_64BIT | AUDIT_ARCH_LE,
}

impl Arch {
    pub const ALL: [Arch; 5] = [
        Self::X86,
        Self::X86_64,
        Self::Arm,
        Self::Aarch64,
        Self::Riscv64,
    ];

    /// The ABI of the build target, if known.
    pub fn native() -> Option<Self> {
        if cfg!(target_arch = "x86_64") {
            Some(Self::X86_64)
        } else if cfg!(target_arch = "x86") {
            Some(Self::X86)
        } else if cfg!(target_arch = "aarch64") {
            Some(Self::Aarch64)
        } else if cfg!(target_arch = "arm") {
            Some(Self::Arm)
        } else if cfg!(target_arch = "riscv64") {
            Some(Self::Riscv64)
        } else {
            None
        }
    }

    /// The `AUDIT_ARCH_*` token.
    pub fn token(&self) -> u32 {
        *self as u32
    }

    pub fn from_token(token: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.token() == token)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X86_64 => "x86_64",
            Self::Arm => "arm",
            Self::Aarch64 => "aarch64",
            Self::Riscv64 => "riscv64",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", self.name())
    }
}

/// Error of [Arch] parsing.
#[derive(thiserror::Error, Clone, PartialEq, Eq, Debug)]
#[error("Unknown architecture '{0}'. Known are: x86, x86_64, arm, aarch64, riscv64.")]
pub struct ParseArchError(String);

impl std::str::FromStr for Arch {
    type Err = ParseArchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "x86" | "i386" | "i686" => Ok(Self::X86),
            "x86_64" | "amd64" => Ok(Self::X86_64),
            "arm" => Ok(Self::Arm),
            "aarch64" | "arm64" => Ok(Self::Aarch64),
            "riscv64" => Ok(Self::Riscv64),
            _ => Err(ParseArchError(s.trim().to_string())),
        }
    }
}

/// Offset of the lower 32 bits of a 64-bit field at `base`.
const fn low_word(base: u32) -> u32 {
    if cfg!(target_endian = "big") {
        base + 4
    } else {
        base
    }
}

/// Offset of the upper 32 bits of a 64-bit field at `base`.
const fn high_word(base: u32) -> u32 {
    if cfg!(target_endian = "big") {
        base
    } else {
        base + 4
    }
}

/// The input of a filter evaluation: the image of `struct seccomp_data`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Record {
    pub nr: u32,
    pub arch: u32,
    pub instruction_pointer: u64,
    pub args: [u64; NR_ARGS],
}

impl Record {
    /// A record for syscall `nr` on the native ABI.
    pub fn new(nr: u32) -> Self {
        Self {
            nr,
            arch: Arch::native().map(|a| a.token()).unwrap_or_default(),
            instruction_pointer: 0,
            args: [0; NR_ARGS],
        }
    }

    /// A record for the syscall number from `libc::SYS_*`.
    pub fn syscall(nr: i64) -> Self {
        Self::new(nr as u32)
    }

    #[must_use]
    pub fn with_arch(mut self, arch: Arch) -> Self {
        self.arch = arch.token();
        self
    }

    #[must_use]
    pub fn with_arch_token(mut self, token: u32) -> Self {
        self.arch = token;
        self
    }

    #[must_use]
    pub fn with_instruction_pointer(mut self, ip: u64) -> Self {
        self.instruction_pointer = ip;
        self
    }

    /// Set argument `index`. An index greater than 5 is ignored.
    #[must_use]
    pub fn with_arg(mut self, index: usize, value: u64) -> Self {
        if let Some(arg) = self.args.get_mut(index) {
            *arg = value;
        } else {
            log::warn!("Ignoring syscall argument {index}. There are only {NR_ARGS} arguments.");
        }
        self
    }

    /// The in-memory image the kernel hands to the filter (native byte order).
    pub fn to_bytes(&self) -> [u8; SECCOMP_DATA_SIZE as usize] {
        let mut buf = [0; SECCOMP_DATA_SIZE as usize];
        buf[0..4].copy_from_slice(&self.nr.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.arch.to_ne_bytes());
        buf[8..16].copy_from_slice(&self.instruction_pointer.to_ne_bytes());
        for (i, arg) in self.args.iter().enumerate() {
            let off = (SECCOMP_DATA_ARGS_OFFSET + SECCOMP_DATA_ARG_SIZE * i as u32) as usize;
            buf[off..off + 8].copy_from_slice(&arg.to_ne_bytes());
        }
        buf
    }

    /// Load an aligned 32-bit word, like `ld [offset]` does.
    pub fn load_word(&self, offset: u32) -> Option<u32> {
        if offset >= SECCOMP_DATA_SIZE || offset % 4 != 0 {
            return None;
        }
        let off = offset as usize;
        let raw = self.to_bytes();
        Some(u32::from_ne_bytes([
            raw[off],
            raw[off + 1],
            raw[off + 2],
            raw[off + 3],
        ]))
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new(0)
    }
}

/// A field of the [Record] that rules can compare.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Field {
    /// Syscall number.
    Nr,
    /// Architecture token.
    Arch,
    /// Full 64-bit instruction pointer.
    InstructionPointer,
    InstructionPointerLow,
    InstructionPointerHigh,
    /// Full 64-bit argument 0..=5.
    Arg(u8),
    /// Lower 32 bits of argument 0..=5.
    ArgLow(u8),
    /// Upper 32 bits of argument 0..=5.
    ArgHigh(u8),
    /// Raw 32-bit word at this byte offset.
    Offset(u32),
}

/// Load offsets of a field.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FieldOffsets {
    Word(u32),
    Dword { low: u32, high: u32 },
}

impl Field {
    /// Resolve the load offsets of this field.
    ///
    /// Returns `None` for undefined argument indices
    /// and for raw offsets that are unaligned or beyond the record.
    pub fn offsets(&self) -> Option<FieldOffsets> {
        let arg_base = |index: u8| -> Option<u32> {
            if usize::from(index) < NR_ARGS {
                Some(SECCOMP_DATA_ARGS_OFFSET + SECCOMP_DATA_ARG_SIZE * u32::from(index))
            } else {
                None
            }
        };
        Some(match *self {
            Self::Nr => FieldOffsets::Word(SECCOMP_DATA_NR_OFFSET),
            Self::Arch => FieldOffsets::Word(SECCOMP_DATA_ARCH_OFFSET),
            Self::InstructionPointer => FieldOffsets::Dword {
                low: low_word(SECCOMP_DATA_IP_OFFSET),
                high: high_word(SECCOMP_DATA_IP_OFFSET),
            },
            Self::InstructionPointerLow => FieldOffsets::Word(low_word(SECCOMP_DATA_IP_OFFSET)),
            Self::InstructionPointerHigh => FieldOffsets::Word(high_word(SECCOMP_DATA_IP_OFFSET)),
            Self::Arg(index) => {
                let base = arg_base(index)?;
                FieldOffsets::Dword {
                    low: low_word(base),
                    high: high_word(base),
                }
            }
            Self::ArgLow(index) => FieldOffsets::Word(low_word(arg_base(index)?)),
            Self::ArgHigh(index) => FieldOffsets::Word(high_word(arg_base(index)?)),
            Self::Offset(offset) => {
                if offset >= SECCOMP_DATA_SIZE || offset % 4 != 0 {
                    return None;
                }
                FieldOffsets::Word(offset)
            }
        })
    }

    /// The byte offset reported in errors.
    pub(crate) fn nominal_offset(&self) -> u32 {
        match *self {
            Self::Nr => SECCOMP_DATA_NR_OFFSET,
            Self::Arch => SECCOMP_DATA_ARCH_OFFSET,
            Self::InstructionPointer
            | Self::InstructionPointerLow
            | Self::InstructionPointerHigh => SECCOMP_DATA_IP_OFFSET,
            Self::Arg(index) | Self::ArgLow(index) | Self::ArgHigh(index) => {
                SECCOMP_DATA_ARGS_OFFSET + SECCOMP_DATA_ARG_SIZE * u32::from(index)
            }
            Self::Offset(offset) => offset,
        }
    }

    /// Read the value of this field from a record.
    pub fn read(&self, record: &Record) -> Option<u64> {
        match self.offsets()? {
            FieldOffsets::Word(off) => record.load_word(off).map(u64::from),
            FieldOffsets::Dword { low, high } => {
                let low = u64::from(record.load_word(low)?);
                let high = u64::from(record.load_word(high)?);
                Some((high << 32) | low)
            }
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Self::Nr => write!(f, "nr"),
            Self::Arch => write!(f, "arch"),
            Self::InstructionPointer => write!(f, "ip"),
            Self::InstructionPointerLow => write!(f, "ip.lo"),
            Self::InstructionPointerHigh => write!(f, "ip.hi"),
            Self::Arg(i) => write!(f, "arg{i}"),
            Self::ArgLow(i) => write!(f, "arg{i}.lo"),
            Self::ArgHigh(i) => write!(f, "arg{i}.hi"),
            Self::Offset(off) => write!(f, "[{off}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_tokens() {
        assert_eq!(Arch::X86_64.token(), 0xc000_003e);
        assert_eq!(Arch::X86.token(), 0x4000_0003);
        assert_eq!(Arch::Aarch64.token(), 0xc000_00b7);
        assert_eq!(Arch::Arm.token(), 0x4000_0028);
        assert_eq!(Arch::Riscv64.token(), 0xc000_00f3);
        for arch in Arch::ALL {
            assert_eq!(Arch::from_token(arch.token()), Some(arch));
            assert_eq!(arch.name().parse::<Arch>().unwrap(), arch);
        }
        assert!("sparc".parse::<Arch>().is_err());
        if cfg!(target_arch = "x86_64") {
            assert_eq!(Arch::native(), Some(Arch::X86_64));
        }
    }

    #[test]
    fn test_layout() {
        let rec = Record::new(39)
            .with_arch(Arch::X86_64)
            .with_instruction_pointer(0x1122_3344_5566_7788)
            .with_arg(0, 0xAAAA_BBBB_CCCC_DDDD)
            .with_arg(5, 5);
        assert_eq!(rec.load_word(0), Some(39));
        assert_eq!(rec.load_word(4), Some(0xc000_003e));
        assert_eq!(Field::Nr.read(&rec), Some(39));
        assert_eq!(Field::Arch.read(&rec), Some(0xc000_003e));
        assert_eq!(
            Field::InstructionPointer.read(&rec),
            Some(0x1122_3344_5566_7788)
        );
        assert_eq!(Field::InstructionPointerLow.read(&rec), Some(0x5566_7788));
        assert_eq!(Field::InstructionPointerHigh.read(&rec), Some(0x1122_3344));
        assert_eq!(Field::Arg(0).read(&rec), Some(0xAAAA_BBBB_CCCC_DDDD));
        assert_eq!(Field::ArgLow(0).read(&rec), Some(0xCCCC_DDDD));
        assert_eq!(Field::ArgHigh(0).read(&rec), Some(0xAAAA_BBBB));
        assert_eq!(Field::ArgLow(5).read(&rec), Some(5));
        assert_eq!(rec.load_word(56).unwrap(), if cfg!(target_endian = "little") { 5 } else { 0 });
    }

    #[test]
    fn test_arg_index() {
        let rec = Record::new(1).with_arg(5, 7);
        assert_eq!(rec.with_arg(6, 8), rec);
        assert_eq!(rec.with_arg(usize::MAX, 8), rec);
        assert_eq!(rec.args, [0, 0, 0, 0, 0, 7]);
    }

    #[test]
    fn test_offsets() {
        assert_eq!(Field::Nr.offsets(), Some(FieldOffsets::Word(0)));
        assert_eq!(Field::Arch.offsets(), Some(FieldOffsets::Word(4)));
        if cfg!(target_endian = "little") {
            assert_eq!(Field::ArgLow(1).offsets(), Some(FieldOffsets::Word(24)));
            assert_eq!(Field::ArgHigh(1).offsets(), Some(FieldOffsets::Word(28)));
            assert_eq!(
                Field::Arg(5).offsets(),
                Some(FieldOffsets::Dword { low: 56, high: 60 })
            );
        }
        assert_eq!(Field::Arg(6).offsets(), None);
        assert_eq!(Field::ArgLow(200).offsets(), None);
        assert_eq!(Field::Offset(60).offsets(), Some(FieldOffsets::Word(60)));
        assert_eq!(Field::Offset(64).offsets(), None);
        assert_eq!(Field::Offset(2).offsets(), None);
        assert_eq!(Record::default().load_word(3), None);
        assert_eq!(Record::default().load_word(64), None);
    }
}

// vim: ts=4 sw=4 expandtab
