//! Statements: assignments and the control flow around them.
//!
//! Statements are attached to a clock domain of a [`Module`](crate::Module).
//! Within a domain they execute in order; a later assignment to the same
//! bits wins.

use crate::error::ConstructionError;
use crate::signal::Signal;
use crate::value::Value;
use log::warn;
use serde::Serialize;

/// A case pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Pattern {
    /// Matches when the selector equals the integer.
    Int(u128),
    /// A string of `0`, `1` and `-` (don't care), one character per
    /// selector bit. The rightmost character is bit 0.
    Bits(String),
}

impl Pattern {
    /// An integer pattern.
    pub fn int(value: u128) -> Self {
        Pattern::Int(value)
    }

    /// A bit-string pattern such as `"1-0"`.
    pub fn bits(pattern: impl Into<String>) -> Self {
        Pattern::Bits(pattern.into())
    }

    /// Returns whether a selector holding `raw` (of `width` bits) matches.
    pub fn matches(&self, raw: u128, width: u32) -> bool {
        let raw = loom_common::truncate(raw, width);
        match self {
            Pattern::Int(v) => *v == raw,
            Pattern::Bits(s) => s.chars().rev().enumerate().all(|(bit, ch)| {
                let set = raw.checked_shr(bit as u32).unwrap_or(0) & 1 == 1;
                match ch {
                    '0' => !set,
                    '1' => set,
                    _ => true,
                }
            }),
        }
    }
}

/// One arm of a switch. An empty pattern list is the default arm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Case {
    /// Alternatives; the arm is taken when any matches.
    pub patterns: Vec<Pattern>,
    /// Statements executed when the arm is taken.
    pub body: Vec<Statement>,
}

impl Case {
    /// An arm taken when any of `patterns` matches.
    pub fn new(
        patterns: impl IntoIterator<Item = Pattern>,
        body: impl IntoIterator<Item = Statement>,
    ) -> Self {
        Self {
            patterns: patterns.into_iter().collect(),
            body: body.into_iter().collect(),
        }
    }

    /// The default arm, taken unconditionally when reached.
    pub fn wildcard(body: impl IntoIterator<Item = Statement>) -> Self {
        Self {
            patterns: Vec::new(),
            body: body.into_iter().collect(),
        }
    }

    /// Returns whether this is the default arm.
    pub fn is_wildcard(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns whether the arm is taken for a selector holding `raw`.
    pub fn matches(&self, raw: u128, width: u32) -> bool {
        self.is_wildcard() || self.patterns.iter().any(|p| p.matches(raw, width))
    }
}

/// A statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Statement {
    /// Drive `lhs` with `rhs`, truncated or extended to the target width.
    Assign {
        /// The driven lvalue.
        lhs: Value,
        /// The driving value.
        rhs: Value,
    },
    /// Conditional execution; the condition holds when non-zero.
    If {
        /// The condition.
        cond: Value,
        /// Taken when the condition holds.
        then: Vec<Statement>,
        /// Taken otherwise.
        otherwise: Option<Vec<Statement>>,
    },
    /// Executes the first arm whose pattern matches the selector.
    Switch {
        /// The value matched against the arms.
        selector: Value,
        /// The arms in priority order.
        cases: Vec<Case>,
    },
}

impl Statement {
    /// Builds an assignment after checking that `lhs` can be driven.
    pub fn assign(lhs: impl Into<Value>, rhs: impl Into<Value>) -> Result<Self, ConstructionError> {
        let lhs = lhs.into();
        let rhs = rhs.into();
        if !lhs.is_lvalue() {
            return Err(ConstructionError::NotAnLvalue {
                value: lhs.to_string(),
            });
        }
        lhs.check_complete()?;
        rhs.check_complete()?;
        Ok(Statement::Assign { lhs, rhs })
    }

    /// Builds a switch, validating its patterns.
    ///
    /// Bit patterns must be exactly as long as the selector is wide. Integer
    /// patterns too wide to ever match are dropped with a warning; an arm
    /// left without patterns that way is omitted, which is different from
    /// an arm that never had any.
    pub fn switch(
        selector: impl Into<Value>,
        cases: impl IntoIterator<Item = Case>,
    ) -> Result<Self, ConstructionError> {
        let selector = selector.into();
        selector.check_complete()?;
        let width = selector.shape().width;
        let mut kept = Vec::new();
        let mut seen_default = false;
        for case in cases {
            if case.is_wildcard() {
                if seen_default {
                    return Err(ConstructionError::DuplicateDefault {
                        selector: selector.to_string(),
                    });
                }
                seen_default = true;
                kept.push(case);
                continue;
            }
            let mut patterns = Vec::with_capacity(case.patterns.len());
            for pattern in case.patterns {
                match &pattern {
                    Pattern::Bits(s) => check_bit_pattern(s, width)?,
                    Pattern::Int(v) => {
                        let needed = (u128::BITS - v.leading_zeros()).max(1);
                        if needed > width {
                            warn!(
                                "case pattern {v} ({needed} bits) is wider than the {width}-bit selector {selector} and can never match; dropping it"
                            );
                            continue;
                        }
                    }
                }
                patterns.push(pattern);
            }
            if patterns.is_empty() {
                warn!("no pattern of a case on {selector} can match; omitting the case");
                continue;
            }
            kept.push(Case {
                patterns,
                body: case.body,
            });
        }
        Ok(Statement::Switch {
            selector,
            cases: kept,
        })
    }

    /// Collects the signals driven anywhere in this statement.
    pub fn lhs_signals(&self, out: &mut Vec<Signal>) {
        match self {
            Statement::Assign { lhs, .. } => lhs.lhs_signals(out),
            Statement::If {
                then, otherwise, ..
            } => {
                for s in then.iter().chain(otherwise.iter().flatten()) {
                    s.lhs_signals(out);
                }
            }
            Statement::Switch { cases, .. } => {
                for s in cases.iter().flat_map(|c| &c.body) {
                    s.lhs_signals(out);
                }
            }
        }
    }

    /// Collects the signals this statement reads: sources, conditions,
    /// selectors, and the indices of array targets.
    pub fn rhs_signals(&self, out: &mut Vec<Signal>) {
        self.visit_reads(&mut |s: &Signal| {
            if !out.contains(s) {
                out.push(s.clone());
            }
        });
    }

    fn visit_reads(&self, f: &mut impl FnMut(&Signal)) {
        match self {
            Statement::Assign { lhs, rhs } => {
                target_reads(lhs, f);
                rhs.visit_signals(f);
            }
            Statement::If {
                cond,
                then,
                otherwise,
            } => {
                cond.visit_signals(f);
                for s in then.iter().chain(otherwise.iter().flatten()) {
                    s.visit_reads(f);
                }
            }
            Statement::Switch { selector, cases } => {
                selector.visit_signals(f);
                for s in cases.iter().flat_map(|c| &c.body) {
                    s.visit_reads(f);
                }
            }
        }
    }

    /// Calls `f` on every value in source order: targets before sources,
    /// conditions and selectors before their bodies.
    pub fn visit_values(&self, f: &mut impl FnMut(&Value)) {
        match self {
            Statement::Assign { lhs, rhs } => {
                f(lhs);
                f(rhs);
            }
            Statement::If {
                cond,
                then,
                otherwise,
            } => {
                f(cond);
                for s in then.iter().chain(otherwise.iter().flatten()) {
                    s.visit_values(f);
                }
            }
            Statement::Switch { selector, cases } => {
                f(selector);
                for s in cases.iter().flat_map(|c| &c.body) {
                    s.visit_values(f);
                }
            }
        }
    }

    /// Returns a copy with every value replaced by `f(value)`.
    pub fn map_values(&self, f: &mut impl FnMut(&Value) -> Value) -> Statement {
        match self {
            Statement::Assign { lhs, rhs } => Statement::Assign {
                lhs: f(lhs),
                rhs: f(rhs),
            },
            Statement::If {
                cond,
                then,
                otherwise,
            } => Statement::If {
                cond: f(cond),
                then: then.iter().map(|s| s.map_values(f)).collect(),
                otherwise: otherwise
                    .as_ref()
                    .map(|body| body.iter().map(|s| s.map_values(f)).collect()),
            },
            Statement::Switch { selector, cases } => Statement::Switch {
                selector: f(selector),
                cases: cases
                    .iter()
                    .map(|c| Case {
                        patterns: c.patterns.clone(),
                        body: c.body.iter().map(|s| s.map_values(f)).collect(),
                    })
                    .collect(),
            },
        }
    }
}

fn target_reads(target: &Value, f: &mut impl FnMut(&Signal)) {
    match target {
        Value::ArrayRef { array, index } => {
            index.visit_signals(f);
            for leaf in array.leaves() {
                target_reads(leaf, f);
            }
        }
        Value::Slice { value, .. } => target_reads(value, f),
        Value::Concat(parts) => {
            for p in parts {
                target_reads(p, f);
            }
        }
        _ => {}
    }
}

fn check_bit_pattern(pattern: &str, width: u32) -> Result<(), ConstructionError> {
    let len = pattern.chars().count();
    if len != width as usize {
        return Err(ConstructionError::PatternWidth {
            pattern: pattern.to_string(),
            expected: width,
            found: len,
        });
    }
    if let Some(ch) = pattern.chars().find(|c| !matches!(c, '0' | '1' | '-')) {
        return Err(ConstructionError::PatternChar {
            pattern: pattern.to_string(),
            ch,
        });
    }
    Ok(())
}

/// Builder for `if / elif / else` chains.
///
/// The chain desugars into nested [`Statement::If`]s: each `elif` becomes
/// the sole statement of the previous branch's `otherwise` list.
#[derive(Debug, Clone)]
pub struct IfChain {
    first: (Value, Vec<Statement>),
    elifs: Vec<(Value, Vec<Statement>)>,
}

impl IfChain {
    /// Starts a chain with its first condition.
    pub fn new(cond: impl Into<Value>, then: impl IntoIterator<Item = Statement>) -> Self {
        Self {
            first: (cond.into(), then.into_iter().collect()),
            elifs: Vec::new(),
        }
    }

    /// Adds a branch tried when every earlier condition failed.
    pub fn elif(mut self, cond: impl Into<Value>, then: impl IntoIterator<Item = Statement>) -> Self {
        self.elifs.push((cond.into(), then.into_iter().collect()));
        self
    }

    /// Closes the chain with a final `else` body.
    pub fn otherwise(
        self,
        body: impl IntoIterator<Item = Statement>,
    ) -> Result<Statement, ConstructionError> {
        self.build(Some(body.into_iter().collect()))
    }

    /// Closes the chain without an `else` body.
    pub fn end(self) -> Result<Statement, ConstructionError> {
        self.build(None)
    }

    fn build(self, tail: Option<Vec<Statement>>) -> Result<Statement, ConstructionError> {
        let mut otherwise = tail;
        for (cond, then) in self.elifs.into_iter().rev() {
            cond.check_complete()?;
            otherwise = Some(vec![Statement::If {
                cond,
                then,
                otherwise,
            }]);
        }
        let (cond, then) = self.first;
        cond.check_complete()?;
        Ok(Statement::If {
            cond,
            then,
            otherwise,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Array;
    use crate::value::Shape;

    #[test]
    fn bit_pattern_rightmost_is_bit_zero() {
        let p = Pattern::bits("--1");
        assert!(p.matches(0b001, 3));
        assert!(p.matches(0b111, 3));
        assert!(p.matches(0b101, 3));
        assert!(!p.matches(0b110, 3));
        assert!(!p.matches(0b000, 3));
        let p = Pattern::bits("10-");
        assert!(p.matches(0b100, 3));
        assert!(p.matches(0b101, 3));
        assert!(!p.matches(0b001, 3));
    }

    #[test]
    fn int_pattern_compares_value() {
        assert!(Pattern::int(5).matches(5, 4));
        assert!(!Pattern::int(5).matches(4, 4));
    }

    #[test]
    fn assign_rejects_non_lvalue() {
        let a = Signal::new(4);
        let err = Statement::assign(a.value().add(Value::int(1)), Value::int(0)).unwrap_err();
        assert!(matches!(err, ConstructionError::NotAnLvalue { .. }));
        assert!(Statement::assign(Value::int(1), &a).is_err());
        assert!(Statement::assign(&a, Value::int(1)).is_ok());
    }

    #[test]
    fn assign_rejects_partially_indexed_grid() {
        let grid = Array::new([
            Array::new([Signal::new(2), Signal::new(2)]),
            Array::new([Signal::new(2), Signal::new(2)]),
        ]);
        let row = grid.index(Signal::new(1)).unwrap();
        let err = Statement::assign(Signal::new(2), row).unwrap_err();
        assert_eq!(err, ConstructionError::ArrayAsValue);
    }

    #[test]
    fn switch_pattern_length_must_match() {
        let sel = Signal::new(3);
        let err = Statement::switch(&sel, [Case::new([Pattern::bits("01")], [])]).unwrap_err();
        assert!(matches!(
            err,
            ConstructionError::PatternWidth {
                expected: 3,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn switch_rejects_bad_characters() {
        let sel = Signal::new(3);
        let err = Statement::switch(&sel, [Case::new([Pattern::bits("0x1")], [])]).unwrap_err();
        assert!(matches!(err, ConstructionError::PatternChar { ch: 'x', .. }));
    }

    #[test]
    fn switch_single_default() {
        let sel = Signal::new(2);
        let err = Statement::switch(&sel, [Case::wildcard([]), Case::wildcard([])]).unwrap_err();
        assert!(matches!(err, ConstructionError::DuplicateDefault { .. }));
    }

    #[test]
    fn wide_int_patterns_dropped() {
        let sel = Signal::new(2);
        let out = Signal::new(1);
        let stmt = Statement::switch(
            &sel,
            [
                Case::new([Pattern::int(7)], [out.value().assign(Value::int(1)).unwrap()]),
                Case::new([Pattern::int(7), Pattern::int(1)], []),
                Case::wildcard([]),
            ],
        )
        .unwrap();
        match stmt {
            Statement::Switch { cases, .. } => {
                assert_eq!(cases.len(), 2);
                assert_eq!(cases[0].patterns, vec![Pattern::int(1)]);
                assert!(cases[1].is_wildcard());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn if_chain_desugars_into_nested_ifs() {
        let a = Signal::new(1);
        let b = Signal::new(1);
        let x = Signal::new(2);
        let stmt = IfChain::new(&a, [x.value().assign(Value::int(1)).unwrap()])
            .elif(&b, [x.value().assign(Value::int(2)).unwrap()])
            .otherwise([x.value().assign(Value::int(3)).unwrap()])
            .unwrap();
        let Statement::If {
            cond, otherwise, ..
        } = stmt
        else {
            panic!("expected an if");
        };
        assert_eq!(cond, a.value());
        let nested = otherwise.unwrap();
        assert_eq!(nested.len(), 1);
        let Statement::If {
            cond, otherwise, ..
        } = &nested[0]
        else {
            panic!("expected a nested if");
        };
        assert_eq!(*cond, b.value());
        assert_eq!(otherwise.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn if_chain_without_else() {
        let a = Signal::new(1);
        let stmt = IfChain::new(&a, []).end().unwrap();
        assert!(matches!(stmt, Statement::If { otherwise: None, .. }));
    }

    #[test]
    fn lhs_signals_through_control_flow() {
        let c = Signal::new(1);
        let x = Signal::new(4);
        let y = Signal::new(4);
        let stmt = IfChain::new(&c, [x.value().assign(&y).unwrap()])
            .otherwise([Value::cat([&x, &y]).assign(Value::int(0)).unwrap()])
            .unwrap();
        let mut driven = Vec::new();
        stmt.lhs_signals(&mut driven);
        assert_eq!(driven, vec![x.clone(), y.clone()]);
        let mut values = 0;
        stmt.visit_values(&mut |_| values += 1);
        assert_eq!(values, 5);
    }

    #[test]
    fn rhs_signals_include_conditions_and_target_indices() {
        let (c, a, y, idx) = (Signal::new(1), Signal::new(2), Signal::new(2), Signal::new(1));
        let other = Signal::new(2);
        let target = Array::new([&y, &other]).index(&idx).unwrap();
        let stmt = IfChain::new(c.value(), [target.assign(a.value()).unwrap()])
            .end()
            .unwrap();
        let mut reads = Vec::new();
        stmt.rhs_signals(&mut reads);
        assert_eq!(reads, vec![c, idx, a]);
    }

    #[test]
    fn map_values_rewrites_everywhere() {
        let c = Signal::new(1);
        let x = Signal::new(1);
        let stmt = IfChain::new(&c, [x.value().assign(Value::clock("sync")).unwrap()])
            .end()
            .unwrap();
        let mapped = stmt.map_values(&mut |v| {
            v.map_bottom_up(&mut |n| match n {
                Value::ClockSignal(_) => Value::clock("pix"),
                other => other,
            })
        });
        let Statement::If { then, .. } = mapped else {
            panic!("expected an if");
        };
        assert_eq!(then[0], Statement::Assign {
            lhs: x.value(),
            rhs: Value::clock("pix"),
        });
        assert_eq!(Value::clock("pix").shape(), Shape::unsigned(1));
    }
}
