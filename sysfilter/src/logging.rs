// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use env_logger::{Builder, Env};
use log::Level;
use std::io::Write as _;

/// Initialize the logger. `RUST_LOG` overrides the level.
pub fn init_logger(verbose: bool) {
    let env = Env::default().filter_or("RUST_LOG", if verbose { "debug" } else { "warn" });

    Builder::from_env(env)
        .format(|buf, record| {
            let level = match record.level() {
                Level::Error => "ERROR",
                Level::Warn => "WARN ",
                Level::Info => "INFO ",
                Level::Debug => "DEBUG",
                Level::Trace => "TRACE",
            };
            writeln!(buf, "{level} {}", record.args())
        })
        .init();
}

// vim: ts=4 sw=4 expandtab
