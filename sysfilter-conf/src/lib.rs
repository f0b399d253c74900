// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! This crate implements the configuration file parsing of `sysfilter`.
//!
//! Defaults for missing configuration files
//! or missing individual configuration entries are implemented here.
//! Filter rules themselves are not configurable.

#![forbid(unsafe_code)]

mod ini;
mod parse;

use crate::{
    ini::Ini,
    parse::{parse_bool, parse_u16, parse_u32, split_commaitems},
};
use anyhow::{self as ah, format_err as err, Context as _};
use std::path::{Path, PathBuf};
use sysfilter_bpf::{syscalls, Action, Scope};

/// The default configuration path, relative to the install prefix.
const CONF_PATH: &str = "etc/sysfilter.conf";

const DEFAULT_BASIC_ERRNO: u16 = 42;
const DEFAULT_BASIC_CALLS: u32 = 1;
const DEFAULT_RANDOM_MASK: u16 = 0x1ff;
const DEFAULT_RANDOM_CALLS: u32 = 16;

/// Syscalls the Rust runtime needs to print results and exit
/// after a filter has been installed.
const DEFAULT_RUNTIME_ALLOW: &[&str] = &[
    "write",
    "writev",
    "exit",
    "exit_group",
    "brk",
    "mmap",
    "mmap2",
    "munmap",
    "mremap",
    "madvise",
    "sigaltstack",
    "rt_sigprocmask",
    "rt_sigreturn",
    "futex",
    "close",
];

fn default_runtime_allow() -> Vec<i64> {
    DEFAULT_RUNTIME_ALLOW
        .iter()
        .filter_map(|name| syscalls::syscall_number(name))
        .collect()
}

fn get_debug(ini: &Ini) -> ah::Result<bool> {
    if let Some(debug) = ini.get("GENERAL", "debug") {
        return parse_bool(debug).context("[GENERAL] debug");
    }
    Ok(false)
}

fn get_basic_errno(ini: &Ini) -> ah::Result<u16> {
    if let Some(errno) = ini.get("BASIC", "errno") {
        let errno = parse_u16(errno).context("[BASIC] errno")?;
        if errno > 4095 {
            return Err(err!("[BASIC] errno={errno} is bigger than 4095"));
        }
        return Ok(errno);
    }
    Ok(DEFAULT_BASIC_ERRNO)
}

fn get_basic_calls(ini: &Ini) -> ah::Result<u32> {
    if let Some(calls) = ini.get("BASIC", "calls") {
        return parse_u32(calls).context("[BASIC] calls");
    }
    Ok(DEFAULT_BASIC_CALLS)
}

fn get_random_mask(ini: &Ini) -> ah::Result<u16> {
    if let Some(mask) = ini.get("RANDOM", "mask") {
        return parse_u16(mask).context("[RANDOM] mask");
    }
    Ok(DEFAULT_RANDOM_MASK)
}

fn get_random_calls(ini: &Ini) -> ah::Result<u32> {
    if let Some(calls) = ini.get("RANDOM", "calls") {
        return parse_u32(calls).context("[RANDOM] calls");
    }
    Ok(DEFAULT_RANDOM_CALLS)
}

fn get_arch_check(ini: &Ini) -> ah::Result<bool> {
    if let Some(arch_check) = ini.get("FILTER", "arch-check") {
        return parse_bool(arch_check).context("[FILTER] arch-check");
    }
    Ok(true)
}

fn get_arch_mismatch(ini: &Ini) -> ah::Result<Action> {
    if let Some(action) = ini.get("FILTER", "arch-mismatch") {
        let action: Action = action.parse().context("[FILTER] arch-mismatch")?;
        if matches!(action, Action::RandomizedErrorNumber(_)) {
            return Err(err!("[FILTER] arch-mismatch={action} is not allowed"));
        }
        return Ok(action);
    }
    Ok(Action::Kill)
}

fn get_scope(ini: &Ini) -> ah::Result<Scope> {
    if let Some(scope) = ini.get("FILTER", "scope") {
        return scope.parse().context("[FILTER] scope");
    }
    Ok(Default::default())
}

fn get_verify(ini: &Ini) -> ah::Result<bool> {
    if let Some(verify) = ini.get("FILTER", "verify") {
        return parse_bool(verify).context("[FILTER] verify");
    }
    Ok(true)
}

fn get_runtime_allow(ini: &Ini) -> ah::Result<Vec<i64>> {
    if let Some(allow) = ini.get("RUNTIME", "allow") {
        return split_commaitems(allow, |name| Ok(syscalls::parse_syscall(name)?))
            .context("[RUNTIME] allow");
    }
    Ok(default_runtime_allow())
}

/// All sections and their options.
const KNOWN_OPTIONS: &[(&str, &[&str])] = &[
    ("GENERAL", &["debug"]),
    ("BASIC", &["errno", "calls"]),
    ("RANDOM", &["mask", "calls"]),
    ("FILTER", &["arch-check", "arch-mismatch", "scope", "verify"]),
    ("RUNTIME", &["allow"]),
];

fn get_unknown_options(ini: &Ini) -> Vec<String> {
    let mut unknown: Vec<String> = KNOWN_OPTIONS
        .iter()
        .filter_map(|(section, known)| {
            ini.options_iter(section)
                .map(|opts| (section, known, opts))
        })
        .flat_map(|(section, known, opts)| {
            opts.filter(move |(name, _)| !known.contains(&name.as_str()))
                .map(move |(name, _)| format!("[{section}] {name}"))
        })
        .collect();
    unknown.sort();
    unknown
}

/// Parsed sysfilter.conf.
#[derive(Clone, Debug)]
pub struct Config {
    path: Option<PathBuf>,
    debug: bool,
    basic_errno: u16,
    basic_calls: u32,
    random_mask: u16,
    random_calls: u32,
    arch_check: bool,
    arch_mismatch: Action,
    scope: Scope,
    verify: bool,
    runtime_allow: Vec<i64>,
    unknown_options: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Create a new configuration instance with all-default values.
    pub fn new() -> Self {
        Self {
            path: None,
            debug: false,
            basic_errno: DEFAULT_BASIC_ERRNO,
            basic_calls: DEFAULT_BASIC_CALLS,
            random_mask: DEFAULT_RANDOM_MASK,
            random_calls: DEFAULT_RANDOM_CALLS,
            arch_check: true,
            arch_mismatch: Action::Kill,
            scope: Scope::Thread,
            verify: true,
            runtime_allow: default_runtime_allow(),
            unknown_options: vec![],
        }
    }

    /// Get the default configuration file path.
    pub fn get_default_path() -> PathBuf {
        // The build-time environment variable SYSFILTER_CONF_PREFIX can be
        // used to give an additional prefix.
        let prefix = option_env!("SYSFILTER_CONF_PREFIX").unwrap_or("/");

        let mut path = PathBuf::new();
        path.push(prefix);
        path.push(CONF_PATH);
        path
    }

    /// Get the actual path the configuration was read from.
    pub fn get_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// (Re-)load a configuration from a file.
    ///
    /// A missing file leaves all values at their defaults.
    pub fn load(&mut self, path: &Path) -> ah::Result<()> {
        if path.exists() {
            let ini = Ini::new_from_file(path)
                .with_context(|| format!("Failed to load configuration {path:?}"))?;
            self.load_ini(&ini)
                .with_context(|| format!("Invalid configuration {path:?}"))?;
        }
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// (Re-)load a configuration from a string.
    pub fn load_str(&mut self, content: &str) -> ah::Result<()> {
        let mut ini = Ini::new();
        ini.parse_str(content)?;
        self.load_ini(&ini)
    }

    /// (Re-)load a configuration from a parsed [Ini] instance.
    fn load_ini(&mut self, ini: &Ini) -> ah::Result<()> {
        let debug = get_debug(ini)?;
        let basic_errno = get_basic_errno(ini)?;
        let basic_calls = get_basic_calls(ini)?;
        let random_mask = get_random_mask(ini)?;
        let random_calls = get_random_calls(ini)?;
        let arch_check = get_arch_check(ini)?;
        let arch_mismatch = get_arch_mismatch(ini)?;
        let scope = get_scope(ini)?;
        let verify = get_verify(ini)?;
        let runtime_allow = get_runtime_allow(ini)?;
        let unknown_options = get_unknown_options(ini);

        self.debug = debug;
        self.basic_errno = basic_errno;
        self.basic_calls = basic_calls;
        self.random_mask = random_mask;
        self.random_calls = random_calls;
        self.arch_check = arch_check;
        self.arch_mismatch = arch_mismatch;
        self.scope = scope;
        self.verify = verify;
        self.runtime_allow = runtime_allow;
        self.unknown_options = unknown_options;
        Ok(())
    }

    /// Get the `debug` option from `[GENERAL]` section.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Get the `errno` option from `[BASIC]` section.
    pub fn basic_errno(&self) -> u16 {
        self.basic_errno
    }

    /// Get the `calls` option from `[BASIC]` section.
    pub fn basic_calls(&self) -> u32 {
        self.basic_calls
    }

    /// Get the `mask` option from `[RANDOM]` section.
    pub fn random_mask(&self) -> u16 {
        self.random_mask
    }

    /// Get the `calls` option from `[RANDOM]` section.
    pub fn random_calls(&self) -> u32 {
        self.random_calls
    }

    /// Get the `arch-check` option from `[FILTER]` section.
    pub fn arch_check(&self) -> bool {
        self.arch_check
    }

    /// Get the `arch-mismatch` option from `[FILTER]` section.
    pub fn arch_mismatch(&self) -> Action {
        self.arch_mismatch
    }

    /// Get the `scope` option from `[FILTER]` section.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Get the `verify` option from `[FILTER]` section.
    pub fn verify(&self) -> bool {
        self.verify
    }

    /// Get the syscall numbers of the `allow` option from `[RUNTIME]` section.
    pub fn runtime_allow(&self) -> &[i64] {
        &self.runtime_allow
    }

    /// Options in known sections that are not understood. Formatted as `[SECTION] name`.
    pub fn unknown_options(&self) -> &[String] {
        &self.unknown_options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ini(content: &str) -> Ini {
        let mut ini = Ini::new();
        ini.parse_str(content).unwrap();
        ini
    }

    #[test]
    fn test_general() {
        assert!(get_debug(&ini("[GENERAL]\ndebug = true\n")).unwrap());
        assert!(!get_debug(&ini("")).unwrap());
        assert!(get_debug(&ini("[GENERAL]\ndebug = 2\n")).is_err());
    }

    #[test]
    fn test_basic() {
        let i = ini("[BASIC]\nerrno = 13\ncalls = 3\n");
        assert_eq!(get_basic_errno(&i).unwrap(), 13);
        assert_eq!(get_basic_calls(&i).unwrap(), 3);
        assert!(get_basic_errno(&ini("[BASIC]\nerrno = 4096\n")).is_err());
        assert_eq!(get_basic_errno(&ini("")).unwrap(), 42);
    }

    #[test]
    fn test_random() {
        let i = ini("[RANDOM]\nmask = 0xff\ncalls = 0x10\n");
        assert_eq!(get_random_mask(&i).unwrap(), 0xff);
        assert_eq!(get_random_calls(&i).unwrap(), 16);
        assert_eq!(get_random_mask(&ini("")).unwrap(), 0x1ff);
    }

    #[test]
    fn test_filter() {
        let i = ini(
            "[FILTER]\narch-check = no\narch-mismatch = errno:38\nscope = process\nverify = off\n",
        );
        assert!(!get_arch_check(&i).unwrap());
        assert_eq!(get_arch_mismatch(&i).unwrap(), Action::ErrorNumber(38));
        assert_eq!(get_scope(&i).unwrap(), Scope::Process);
        assert!(!get_verify(&i).unwrap());

        let i = ini("");
        assert!(get_arch_check(&i).unwrap());
        assert_eq!(get_arch_mismatch(&i).unwrap(), Action::Kill);
        assert_eq!(get_scope(&i).unwrap(), Scope::Thread);
        assert!(get_verify(&i).unwrap());

        assert!(get_arch_mismatch(&ini("[FILTER]\narch-mismatch = random:0xf\n")).is_err());
        assert!(get_scope(&ini("[FILTER]\nscope = all\n")).is_err());
    }

    #[test]
    fn test_runtime() {
        let i = ini("[RUNTIME]\nallow = write, exit_group, 1000\n");
        assert_eq!(
            get_runtime_allow(&i).unwrap(),
            vec![
                syscalls::syscall_number("write").unwrap(),
                syscalls::syscall_number("exit_group").unwrap(),
                1000
            ]
        );
        assert!(get_runtime_allow(&ini("[RUNTIME]\nallow =\n")).unwrap().is_empty());
        assert!(get_runtime_allow(&ini("[RUNTIME]\nallow = write, nope\n")).is_err());

        let defaults = get_runtime_allow(&ini("")).unwrap();
        assert!(defaults.contains(&syscalls::syscall_number("exit_group").unwrap()));
        assert!(!defaults.contains(&syscalls::syscall_number("getpid").unwrap()));
    }

    #[test]
    fn test_config() {
        let mut conf = Config::new();
        assert_eq!(conf.basic_errno(), 42);
        assert_eq!(conf.random_calls(), 16);
        conf.load_str("[BASIC]\nerrno = 7\n[FILTER]\nscope = process\n")
            .unwrap();
        assert_eq!(conf.basic_errno(), 7);
        assert_eq!(conf.basic_calls(), 1);
        assert_eq!(conf.scope(), Scope::Process);
        assert_eq!(conf.random_mask(), 0x1ff);
        assert!(conf.verify());

        let missing = Path::new("/nonexistent/sysfilter.conf");
        let mut conf = Config::new();
        conf.load(missing).unwrap();
        assert_eq!(conf.get_path(), Some(missing));
        assert_eq!(conf.basic_errno(), 42);

        assert!(Config::get_default_path().ends_with("etc/sysfilter.conf"));
    }

    #[test]
    fn test_unknown_options() {
        let mut conf = Config::new();
        conf.load_str(
            "[BASIC]\nerrno = 1\nerrnum = 2\n\
             [FILTER]\nscop = thread\n\
             [OTHER]\nx = 1\n",
        )
        .unwrap();
        assert_eq!(conf.basic_errno(), 1);
        assert_eq!(conf.unknown_options(), &["[BASIC] errnum", "[FILTER] scop"]);
    }

    #[test]
    fn test_example_file() {
        let mut conf = Config::new();
        conf.load_str(include_str!("../../sysfilter/sysfilter.conf"))
            .unwrap();
        assert!(!conf.debug());
        assert_eq!(conf.basic_errno(), 42);
        assert_eq!(conf.random_mask(), 0x1ff);
        assert_eq!(conf.random_calls(), 16);
        assert!(conf.arch_check());
        assert_eq!(conf.arch_mismatch(), Action::Kill);
        assert_eq!(conf.scope(), Scope::Thread);
        assert_eq!(conf.runtime_allow(), default_runtime_allow().as_slice());
        assert!(conf.unknown_options().is_empty());
    }
}

// vim: ts=4 sw=4 expandtab
