// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Syscall names of the build target.

use libc::c_long;

const COMMON: &[(&str, c_long)] = &[
    ("read", libc::SYS_read),
    ("write", libc::SYS_write),
    ("readv", libc::SYS_readv),
    ("writev", libc::SYS_writev),
    ("openat", libc::SYS_openat),
    ("close", libc::SYS_close),
    ("lseek", libc::SYS_lseek),
    ("ioctl", libc::SYS_ioctl),
    ("fcntl", libc::SYS_fcntl),
    ("dup", libc::SYS_dup),
    ("dup3", libc::SYS_dup3),
    ("pipe2", libc::SYS_pipe2),
    ("getcwd", libc::SYS_getcwd),
    ("chdir", libc::SYS_chdir),
    ("getpid", libc::SYS_getpid),
    ("getppid", libc::SYS_getppid),
    ("gettid", libc::SYS_gettid),
    ("getuid", libc::SYS_getuid),
    ("geteuid", libc::SYS_geteuid),
    ("getgid", libc::SYS_getgid),
    ("getegid", libc::SYS_getegid),
    ("uname", libc::SYS_uname),
    ("kill", libc::SYS_kill),
    ("tgkill", libc::SYS_tgkill),
    ("execve", libc::SYS_execve),
    ("clone", libc::SYS_clone),
    ("wait4", libc::SYS_wait4),
    ("exit", libc::SYS_exit),
    ("exit_group", libc::SYS_exit_group),
    ("brk", libc::SYS_brk),
    ("munmap", libc::SYS_munmap),
    ("mremap", libc::SYS_mremap),
    ("mprotect", libc::SYS_mprotect),
    ("madvise", libc::SYS_madvise),
    ("sigaltstack", libc::SYS_sigaltstack),
    ("rt_sigaction", libc::SYS_rt_sigaction),
    ("rt_sigprocmask", libc::SYS_rt_sigprocmask),
    ("rt_sigreturn", libc::SYS_rt_sigreturn),
    ("futex", libc::SYS_futex),
    ("nanosleep", libc::SYS_nanosleep),
    ("clock_gettime", libc::SYS_clock_gettime),
    ("clock_nanosleep", libc::SYS_clock_nanosleep),
    ("sched_yield", libc::SYS_sched_yield),
    ("getrandom", libc::SYS_getrandom),
    ("prctl", libc::SYS_prctl),
    ("seccomp", libc::SYS_seccomp),
];

#[cfg(any(target_arch = "x86_64", target_arch = "x86", target_arch = "arm"))]
const LEGACY: &[(&str, c_long)] = &[
    ("open", libc::SYS_open),
    ("access", libc::SYS_access),
    ("stat", libc::SYS_stat),
    ("lstat", libc::SYS_lstat),
    ("poll", libc::SYS_poll),
    ("pipe", libc::SYS_pipe),
    ("dup2", libc::SYS_dup2),
    ("fork", libc::SYS_fork),
];
#[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "arm")))]
const LEGACY: &[(&str, c_long)] = &[];

#[cfg(not(target_arch = "arm"))]
const MMAP: &[(&str, c_long)] = &[("mmap", libc::SYS_mmap)];
#[cfg(target_arch = "arm")]
const MMAP: &[(&str, c_long)] = &[("mmap2", libc::SYS_mmap2)];

#[cfg(target_arch = "x86_64")]
const ARCH: &[(&str, c_long)] = &[
    ("arch_prctl", libc::SYS_arch_prctl),
    ("socket", libc::SYS_socket),
    ("connect", libc::SYS_connect),
    ("sendto", libc::SYS_sendto),
    ("recvfrom", libc::SYS_recvfrom),
];
#[cfg(target_arch = "aarch64")]
const ARCH: &[(&str, c_long)] = &[
    ("socket", libc::SYS_socket),
    ("connect", libc::SYS_connect),
    ("sendto", libc::SYS_sendto),
    ("recvfrom", libc::SYS_recvfrom),
];
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
const ARCH: &[(&str, c_long)] = &[];

/// All known `(name, number)` pairs.
pub fn syscalls() -> impl Iterator<Item = (&'static str, i64)> {
    COMMON
        .iter()
        .chain(LEGACY)
        .chain(MMAP)
        .chain(ARCH)
        .map(|&(name, nr)| (name, i64::from(nr)))
}

pub fn syscall_number(name: &str) -> Option<i64> {
    syscalls().find(|&(n, _)| n == name).map(|(_, nr)| nr)
}

pub fn syscall_name(nr: i64) -> Option<&'static str> {
    syscalls().find(|&(_, n)| n == nr).map(|(name, _)| name)
}

#[derive(thiserror::Error, Clone, PartialEq, Eq, Debug)]
#[error("Unknown syscall '{0}'")]
pub struct ParseSyscallError(String);

/// Parse a syscall name or a decimal syscall number.
pub fn parse_syscall(s: &str) -> Result<i64, ParseSyscallError> {
    let s = s.trim();
    if let Ok(nr) = s.parse::<i64>() {
        if (0..=i64::from(u32::MAX)).contains(&nr) {
            return Ok(nr);
        }
    }
    syscall_number(s).ok_or_else(|| ParseSyscallError(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(syscall_number("getpid"), Some(i64::from(libc::SYS_getpid)));
        assert_eq!(syscall_name(i64::from(libc::SYS_getppid)), Some("getppid"));
        assert_eq!(syscall_number("no_such_call"), None);
        assert_eq!(syscall_name(-1), None);
        for (name, nr) in syscalls() {
            assert_eq!(syscall_number(name), Some(nr), "{name}");
            assert_eq!(syscall_name(nr), Some(name), "{name}");
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!(parse_syscall(" getpid "), Ok(i64::from(libc::SYS_getpid)));
        assert_eq!(parse_syscall("1234"), Ok(1234));
        assert_eq!(
            parse_syscall("-5"),
            Err(ParseSyscallError("-5".to_string()))
        );
        assert_eq!(
            parse_syscall("frobnicate"),
            Err(ParseSyscallError("frobnicate".to_string()))
        );
    }
}

// vim: ts=4 sw=4 expandtab
