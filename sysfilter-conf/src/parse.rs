// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use anyhow::{self as ah, format_err as err};

pub fn parse_bool(s: &str) -> ah::Result<bool> {
    let s = s.to_lowercase();
    let s = s.trim();
    match s {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(err!("Invalid boolean string '{s}'")),
    }
}

pub fn parse_u16(s: &str) -> ah::Result<u16> {
    let s = s.trim();
    if let Some(s) = s.strip_prefix("0x") {
        Ok(u16::from_str_radix(s, 16)?)
    } else {
        Ok(s.parse::<u16>()?)
    }
}

pub fn parse_u32(s: &str) -> ah::Result<u32> {
    let s = s.trim();
    if let Some(s) = s.strip_prefix("0x") {
        Ok(u32::from_str_radix(s, 16)?)
    } else {
        Ok(s.parse::<u32>()?)
    }
}

/// Split a comma separated string into a vec:
/// "a, b, c" -> vec!["a", " b", " c"]
/// A conversion function is applied before inserting into the vec.
pub fn split_commaitems<T, F>(value: &str, conv: F) -> ah::Result<Vec<T>>
where
    F: Fn(&str) -> ah::Result<T>,
{
    if value.trim().is_empty() {
        return Ok(vec![]);
    }
    let mut ret = Vec::with_capacity(16);
    for item in value.split(',') {
        ret.push(conv(item)?);
    }
    Ok(ret)
}


// vim: ts=4 sw=4 expandtab
