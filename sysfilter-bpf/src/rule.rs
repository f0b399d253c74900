// -*- coding: utf-8 -*-
//
// Copyright (C) 2024 - 2026 Michael Büsch <m@bues.ch>
//
// Licensed under the Apache License version 2.0
// or the MIT license, at your option.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::{
    action::Action,
    record::{Field, Record},
};

/// Comparison of a [Field] against a constant.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Cmp {
    /// `field == value`
    Eq,
    /// `field > value`
    Gt,
    /// `field >= value`
    Ge,
    /// `(field & value) != 0`
    BitsSet,
    /// `(field & mask) == value`
    MaskedEq(u64),
    /// `field != value`
    ///
    /// BPF has no such jump. The compiler rejects it.
    /// Use [Condition::ne] for the pre-negated form.
    Ne,
    /// `field < value`
    ///
    /// BPF has no such jump. The compiler rejects it.
    /// Use [Condition::lt] for the pre-negated form.
    Lt,
    /// `field <= value`
    ///
    /// BPF has no such jump. The compiler rejects it.
    /// Use [Condition::le] for the pre-negated form.
    Le,
}

impl Cmp {
    /// Returns `true`, if a BPF jump instruction implements this comparison.
    pub fn is_direct(&self) -> bool {
        !matches!(self, Self::Ne | Self::Lt | Self::Le)
    }

    fn eval(&self, field: u64, value: u64) -> bool {
        match *self {
            Self::Eq => field == value,
            Self::Gt => field > value,
            Self::Ge => field >= value,
            Self::BitsSet => field & value != 0,
            Self::MaskedEq(mask) => field & mask == value,
            Self::Ne => field != value,
            Self::Lt => field < value,
            Self::Le => field <= value,
        }
    }
}

impl std::fmt::Display for Cmp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Self::Eq => write!(f, "=="),
            Self::Gt => write!(f, ">"),
            Self::Ge => write!(f, ">="),
            Self::BitsSet => write!(f, "&"),
            Self::MaskedEq(mask) => write!(f, "& {mask:#x} =="),
            Self::Ne => write!(f, "!="),
            Self::Lt => write!(f, "<"),
            Self::Le => write!(f, "<="),
        }
    }
}

/// One predicate of a [Rule].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Condition {
    pub field: Field,
    pub cmp: Cmp,
    pub value: u64,
    /// Invert the outcome.
    pub negated: bool,
}

impl Condition {
    pub fn new(field: Field, cmp: Cmp, value: u64) -> Self {
        Self {
            field,
            cmp,
            value,
            negated: false,
        }
    }

    pub fn eq(field: Field, value: u64) -> Self {
        Self::new(field, Cmp::Eq, value)
    }

    pub fn gt(field: Field, value: u64) -> Self {
        Self::new(field, Cmp::Gt, value)
    }

    pub fn ge(field: Field, value: u64) -> Self {
        Self::new(field, Cmp::Ge, value)
    }

    pub fn bits_set(field: Field, mask: u64) -> Self {
        Self::new(field, Cmp::BitsSet, mask)
    }

    pub fn masked_eq(field: Field, mask: u64, value: u64) -> Self {
        Self::new(field, Cmp::MaskedEq(mask), value)
    }

    /// `field != value`, as negated `==`.
    pub fn ne(field: Field, value: u64) -> Self {
        Self::eq(field, value).negate()
    }

    /// `field < value`, as negated `>=`.
    pub fn lt(field: Field, value: u64) -> Self {
        Self::ge(field, value).negate()
    }

    /// `field <= value`, as negated `>`.
    pub fn le(field: Field, value: u64) -> Self {
        Self::gt(field, value).negate()
    }

    #[must_use]
    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    /// Reference semantics of this condition.
    ///
    /// Undefined fields never match.
    pub fn matches(&self, record: &Record) -> bool {
        match self.field.read(record) {
            Some(field) => self.cmp.eval(field, self.value) != self.negated,
            None => false,
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        if self.negated {
            write!(f, "!")?;
        }
        write!(f, "({} {} {:#x})", self.field, self.cmp, self.value)
    }
}

/// An action guarded by a conjunction of conditions.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Rule {
    conditions: Vec<Condition>,
    action: Action,
}

impl Rule {
    /// A rule without conditions. It matches every record.
    pub fn new(action: Action) -> Self {
        Self {
            conditions: vec![],
            action,
        }
    }

    /// Match the syscall number `nr` (as in `libc::SYS_*`).
    pub fn syscall(nr: i64, action: Action) -> Self {
        Self::new(action).when(Condition::eq(Field::Nr, u64::from(nr as u32)))
    }

    /// Add a condition. All conditions must hold.
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// Reference semantics of this rule.
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        if self.conditions.is_empty() {
            write!(f, "always")?;
        }
        for (i, cond) in self.conditions.iter().enumerate() {
            if i > 0 {
                write!(f, " && ")?;
            }
            write!(f, "{cond}")?;
        }
        write!(f, " => {}", self.action)
    }
}

/// First-match-wins reference semantics of a rule list.
pub fn first_match(rules: &[Rule], default_action: Action, record: &Record) -> Action {
    rules
        .iter()
        .find(|r| r.matches(record))
        .map(|r| r.action())
        .unwrap_or(default_action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition() {
        let rec = Record::new(1).with_arg(0, 0x1_0000_0005);
        assert!(Condition::eq(Field::Nr, 1).matches(&rec));
        assert!(Condition::ne(Field::Nr, 2).matches(&rec));
        assert!(!Condition::ne(Field::Nr, 1).matches(&rec));
        assert!(Condition::gt(Field::Arg(0), 5).matches(&rec));
        assert!(!Condition::gt(Field::ArgLow(0), 5).matches(&rec));
        assert!(Condition::ge(Field::ArgLow(0), 5).matches(&rec));
        assert!(Condition::lt(Field::ArgLow(0), 6).matches(&rec));
        assert!(Condition::le(Field::ArgLow(0), 5).matches(&rec));
        assert!(!Condition::le(Field::ArgLow(0), 4).matches(&rec));
        assert!(Condition::bits_set(Field::ArgHigh(0), 1).matches(&rec));
        assert!(Condition::masked_eq(Field::Arg(0), 0xF_0000_000F, 0x1_0000_0005).matches(&rec));
        assert!(!Condition::eq(Field::Arg(7), 0).matches(&rec));
        assert!(!Condition::eq(Field::Arg(7), 0).negate().matches(&rec));
    }

    #[test]
    fn test_first_match() {
        let rules = [
            Rule::syscall(1, Action::ErrorNumber(1)),
            Rule::syscall(1, Action::ErrorNumber(2)),
            Rule::new(Action::Trap).when(Condition::eq(Field::ArgLow(0), 9)),
        ];
        assert_eq!(
            first_match(&rules, Action::Kill, &Record::new(1)),
            Action::ErrorNumber(1)
        );
        assert_eq!(
            first_match(&rules, Action::Kill, &Record::new(2).with_arg(0, 9)),
            Action::Trap
        );
        assert_eq!(first_match(&rules, Action::Kill, &Record::new(2)), Action::Kill);
        assert_eq!(first_match(&[], Action::Log, &Record::new(2)), Action::Log);
    }

    #[test]
    fn test_display() {
        let rule = Rule::syscall(39, Action::Allow).when(Condition::ne(Field::ArgLow(1), 2));
        assert_eq!(rule.to_string(), "(nr == 0x27) && !(arg1.lo == 0x2) => allow");
        assert_eq!(Rule::new(Action::Kill).to_string(), "always => kill");
    }
}

// vim: ts=4 sw=4 expandtab
