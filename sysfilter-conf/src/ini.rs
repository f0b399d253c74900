// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use anyhow::{self as ah, format_err as err, Context as _};
use std::{
    collections::{hash_map, HashMap},
    io::Read as _,
    path::Path,
};

pub type IniSectionIter<'a> = hash_map::Iter<'a, String, String>;

/// All options from a `.ini` file section.
struct IniSection {
    options: HashMap<String, String>,
}

impl IniSection {
    fn new() -> Self {
        Self {
            options: HashMap::new(),
        }
    }

    fn options(&self) -> &HashMap<String, String> {
        &self.options
    }

    fn options_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.options
    }

    fn iter(&self) -> IniSectionIter {
        self.options.iter()
    }
}

/// Join lines ending in a backslash with the following line.
fn logical_lines(content: &str) -> ah::Result<Vec<String>> {
    let mut lines = Vec::with_capacity(32);
    let mut continued: Option<String> = None;
    for line in content.lines() {
        let line = match continued.take() {
            Some(mut head) => {
                head.push_str(line.trim_start());
                head
            }
            None => {
                let line = line.trim_start();
                if line.starts_with('#') {
                    continue; // Comments are never continued.
                }
                line.to_string()
            }
        };
        if let Some(head) = line.trim_end().strip_suffix('\\') {
            if head.starts_with('[') {
                return Err(err!("Line continuation in section header: '{line}'"));
            }
            continued = Some(head.to_string());
        } else {
            lines.push(line);
        }
    }
    if let Some(head) = continued {
        return Err(err!("Line continuation at end of file: '{head}'"));
    }
    Ok(lines)
}

/// Simple `.ini` file parser.
#[derive(Default)]
pub struct Ini {
    sections: HashMap<String, IniSection>,
}

impl Ini {
    pub fn new() -> Self {
        Self {
            sections: HashMap::new(),
        }
    }

    pub fn new_from_file(path: &Path) -> ah::Result<Self> {
        let mut this = Self::new();
        this.read_file(path)?;
        Ok(this)
    }

    pub fn read_file(&mut self, path: &Path) -> ah::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .open(path)
            .context("Open configuration file")?;
        let mut buf = vec![];
        file.read_to_end(&mut buf)
            .context("Read configuration file")?;
        self.parse_bytes(buf)
    }

    pub fn parse_bytes(&mut self, content: Vec<u8>) -> ah::Result<()> {
        self.parse_str(
            &String::from_utf8(content)
                .context("Configuration content file to UTF-8 conversion")?,
        )
    }

    pub fn parse_str(&mut self, content: &str) -> ah::Result<()> {
        let mut sections: HashMap<String, IniSection> = HashMap::new();
        let mut in_section: Option<String> = None;
        for line in logical_lines(content)? {
            let line = line.trim_start();
            if line.is_empty() {
                continue; // This is an empty line.
            }
            // Section start?
            if line.starts_with('[') {
                let line = line.trim_end();
                if line.ends_with(']') {
                    let begin_chlen = '['.len_utf8();
                    let end_chlen = ']'.len_utf8();
                    let sname = &line[begin_chlen..line.len() - end_chlen];
                    if sname.is_empty() {
                        return Err(err!("Section name is empty: '{line}'"));
                    }
                    if sections.contains_key(sname) {
                        return Err(err!("Duplicate section name: '{line}'"));
                    }
                    sections.insert(sname.to_string(), IniSection::new());
                    in_section = Some(sname.to_string());
                    continue;
                } else {
                    return Err(err!("Invalid section name: '{line}'"));
                }
            }
            // Are we inside of a section?
            let Some(section) = in_section.as_ref().and_then(|s| sections.get_mut(s)) else {
                return Err(err!("Option is not inside of a section: '{line}'"));
            };
            let Some(idx) = line.find('=') else {
                return Err(err!("Option has no equal sign '=': '{line}'"));
            };
            let chlen = '='.len_utf8();
            let opt_name = line[..idx].trim_end().to_string();
            if opt_name.is_empty() {
                return Err(err!("Option name is empty: '{line}'"));
            }
            let opt_value = line[idx + chlen..].trim().to_string();
            section.options_mut().insert(opt_name, opt_value);
        }
        self.sections = sections;
        Ok(())
    }

    /// Get the value of an option from the given section.
    pub fn get(&self, section: &str, option: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|sect| sect.options().get(option))
            .map(|opt| opt.as_str())
    }

    /// Get an iterator over all options from a section.
    pub fn options_iter(&self, section: &str) -> Option<IniSectionIter> {
        self.sections.get(section).map(|s| s.iter())
    }
}

// vim: ts=4 sw=4 expandtab
