// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

// Return codes of seccomp filters.
// See /usr/include/linux/seccomp.h .
pub const SECCOMP_RET_KILL_PROCESS: u32 = 0x8000_0000;
pub const SECCOMP_RET_KILL_THREAD: u32 = 0x0000_0000;
pub const SECCOMP_RET_TRAP: u32 = 0x0003_0000;
pub const SECCOMP_RET_ERRNO: u32 = 0x0005_0000;
pub const SECCOMP_RET_TRACE: u32 = 0x7ff0_0000;
pub const SECCOMP_RET_LOG: u32 = 0x7ffc_0000;
pub const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;

pub const SECCOMP_RET_ACTION_FULL: u32 = 0xffff_0000;
pub const SECCOMP_RET_DATA: u32 = 0x0000_ffff;

/// Biggest error number the kernel delivers to user space.
pub const MAX_ERRNO: u16 = 4095;

/// Decision of a filter for one syscall.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Action {
    /// Let the syscall run.
    Allow,

    /// Fail the syscall with this error number.
    ///
    /// The kernel limits the error number delivered to user space to [MAX_ERRNO].
    ErrorNumber(u16),

    /// Send `SIGSYS` to the thread.
    Trap,

    /// Kill the whole process.
    Kill,

    /// Kill the calling thread.
    KillThread,

    /// Allow the syscall and log it. See the kernel logs.
    Log,

    /// Notify a `ptrace` tracer with this message value.
    Trace(u16),

    /// Fail the syscall with a random error number: `random & mask`.
    ///
    /// Only meaningful to demonstrate filter evaluation.
    /// The value is computed at evaluation time, so this action has no constant encoding.
    /// An evaluated filter yields [Action::ErrorNumber] for it.
    RandomizedErrorNumber(u16),
}

impl Action {
    /// The filter return value of this action.
    ///
    /// Returns `None` for [Action::RandomizedErrorNumber].
    pub fn encode(&self) -> Option<u32> {
        match *self {
            Self::Allow => Some(SECCOMP_RET_ALLOW),
            Self::ErrorNumber(errno) => Some(SECCOMP_RET_ERRNO | u32::from(errno)),
            Self::Trap => Some(SECCOMP_RET_TRAP),
            Self::Kill => Some(SECCOMP_RET_KILL_PROCESS),
            Self::KillThread => Some(SECCOMP_RET_KILL_THREAD),
            Self::Log => Some(SECCOMP_RET_LOG),
            Self::Trace(data) => Some(SECCOMP_RET_TRACE | u32::from(data)),
            Self::RandomizedErrorNumber(_) => None,
        }
    }

    /// Interpret a filter return value the way the kernel does.
    ///
    /// Unknown actions are handled as [Action::Kill].
    pub fn decode(ret: u32) -> Self {
        let data = (ret & SECCOMP_RET_DATA) as u16;
        match ret & SECCOMP_RET_ACTION_FULL {
            SECCOMP_RET_ALLOW => Self::Allow,
            SECCOMP_RET_ERRNO => Self::ErrorNumber(data),
            SECCOMP_RET_TRAP => Self::Trap,
            SECCOMP_RET_KILL_THREAD => Self::KillThread,
            SECCOMP_RET_LOG => Self::Log,
            SECCOMP_RET_TRACE => Self::Trace(data),
            _ => Self::Kill,
        }
    }

    /// Returns `true`, if the syscall is executed for this action.
    pub fn permits(&self) -> bool {
        matches!(self, Self::Allow | Self::Log)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::ErrorNumber(errno) => write!(f, "errno:{errno}"),
            Self::Trap => write!(f, "trap"),
            Self::Kill => write!(f, "kill"),
            Self::KillThread => write!(f, "kill-thread"),
            Self::Log => write!(f, "log"),
            Self::Trace(data) => write!(f, "trace:{data}"),
            Self::RandomizedErrorNumber(mask) => write!(f, "random:{mask:#x}"),
        }
    }
}

fn parse_u16(s: &str) -> Result<u16, std::num::ParseIntError> {
    let s = s.trim();
    if let Some(s) = s.strip_prefix("0x") {
        u16::from_str_radix(s, 16)
    } else {
        s.parse::<u16>()
    }
}

/// Error of [Action] parsing.
#[derive(thiserror::Error, Clone, PartialEq, Eq, Debug)]
#[error("Invalid action '{0}'. Valid actions are: allow, kill, kill-thread, trap, log, errno:N, trace:N, random:MASK.")]
pub struct ParseActionError(String);

impl std::str::FromStr for Action {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let invalid = || ParseActionError(s.trim().to_string());
        let (name, arg) = match lower.split_once(':') {
            Some((name, arg)) => (name.trim(), Some(arg)),
            None => (lower.as_str(), None),
        };
        let number = |arg: Option<&str>| -> Result<u16, ParseActionError> {
            parse_u16(arg.ok_or_else(invalid)?).map_err(|_| invalid())
        };
        match name {
            "allow" if arg.is_none() => Ok(Self::Allow),
            "kill" | "kill-process" if arg.is_none() => Ok(Self::Kill),
            "kill-thread" if arg.is_none() => Ok(Self::KillThread),
            "trap" if arg.is_none() => Ok(Self::Trap),
            "log" if arg.is_none() => Ok(Self::Log),
            "errno" => Ok(Self::ErrorNumber(number(arg)?)),
            "trace" => Ok(Self::Trace(number(arg)?)),
            "random" => Ok(Self::RandomizedErrorNumber(number(arg)?)),
            _ => Err(invalid()),
        }
    }
}


// vim: ts=4 sw=4 expandtab
