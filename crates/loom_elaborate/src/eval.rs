//! Reference evaluator.
//!
//! Gives statements and values the meaning a backend must reproduce. A
//! combinational block is evaluated by [`settle`]: every signal it drives
//! starts from its reset value and the statements apply on top, repeated
//! until the values stop changing. A synchronous block is evaluated by
//! [`tick`], which computes the next register state from the current one;
//! registers keep their value when not assigned.
//!
//! Array accesses are evaluated directly with saturating indices, so a
//! tree can be evaluated both before and after lowering.

use loom_common::{mask, sign_extend, truncate};
use loom_ir::{ArrayElem, Module, Shape, Signal, SignalId, Statement, Value, COMB_DOMAIN};
use std::collections::HashMap;
use thiserror::Error;

/// Widest value the evaluator handles. Every intermediate result must fit
/// a signed 128-bit integer even when unsigned.
pub const EVAL_MAX_WIDTH: u32 = 127;

/// Evaluation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// A value is wider than [`EVAL_MAX_WIDTH`].
    #[error("`{value}` is {width} bits wide; the evaluator handles at most {max}")]
    TooWide {
        /// Rendering of the value.
        value: String,
        /// Its width.
        width: u32,
        /// The limit.
        max: u32,
    },

    /// Clock and reset references have no value of their own.
    #[error("`{value}` refers to a clock domain and cannot be evaluated")]
    DomainSignal {
        /// Rendering of the value.
        value: String,
    },

    /// Modulo by zero.
    #[error("division by zero in `{value}`")]
    DivisionByZero {
        /// Rendering of the operation.
        value: String,
    },

    /// An array access with no element to select.
    #[error("`{value}` does not select a value")]
    MalformedArray {
        /// Rendering of the access.
        value: String,
    },

    /// An assignment target that cannot be driven.
    #[error("`{value}` cannot be assigned")]
    NotAnLvalue {
        /// Rendering of the target.
        value: String,
    },

    /// Combinational statements kept changing their outputs.
    #[error("combinational logic did not settle after {iterations} passes")]
    Unsettled {
        /// Passes run.
        iterations: usize,
    },
}

/// Signal values, stored as raw bits truncated to each signal's width.
/// Signals without an entry hold their reset value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    values: HashMap<SignalId, u128>,
}

impl State {
    /// An empty state: every signal at its reset value.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `signal` to `value`, wrapped to its width.
    pub fn set(&mut self, signal: &Signal, value: i128) {
        self.set_raw(signal, value as u128);
    }

    /// Sets `signal` from raw bits, truncated to its width.
    pub fn set_raw(&mut self, signal: &Signal, raw: u128) {
        self.values
            .insert(signal.id(), truncate(raw, signal.width()));
    }

    /// Returns the raw bits of `signal`.
    pub fn get(&self, signal: &Signal) -> u128 {
        self.values
            .get(&signal.id())
            .copied()
            .unwrap_or_else(|| signal.reset_bits())
    }

    /// Returns the numeric value of `signal`, sign-extended when signed.
    pub fn value(&self, signal: &Signal) -> i128 {
        numeric(self.get(signal), signal.shape())
    }
}

fn numeric(raw: u128, shape: Shape) -> i128 {
    if shape.signed {
        sign_extend(raw, shape.width)
    } else {
        raw as i128
    }
}

/// Evaluates `value`, returning raw bits truncated to its width.
pub fn eval(value: &Value, state: &State) -> Result<u128, EvalError> {
    let shape = value.shape();
    if shape.width > EVAL_MAX_WIDTH {
        return Err(EvalError::TooWide {
            value: value.to_string(),
            width: shape.width,
            max: EVAL_MAX_WIDTH,
        });
    }
    let raw = match value {
        Value::Const(c) => c.bits(),
        Value::Signal(s) => state.get(s),
        Value::ClockSignal(_) | Value::ResetSignal(_) => {
            return Err(EvalError::DomainSignal {
                value: value.to_string(),
            })
        }
        Value::Operator { op, operands } => {
            let args = operands
                .iter()
                .map(|v| eval_numeric(v, state))
                .collect::<Result<Vec<i128>, _>>()?;
            apply(*op, &args, value)? as u128
        }
        Value::Slice {
            value: inner,
            start,
            end,
        } => eval(inner, state)?.checked_shr(*start).unwrap_or(0) & mask(end - start),
        Value::Concat(parts) => {
            let mut acc = 0u128;
            let mut offset = 0u32;
            for part in parts {
                acc |= eval(part, state)?.checked_shl(offset).unwrap_or(0);
                offset += part.shape().width;
            }
            acc
        }
        Value::Repl {
            value: inner,
            count,
        } => {
            let part = eval(inner, state)?;
            let width = inner.shape().width;
            (0..*count).fold(0u128, |acc, i| {
                acc | part.checked_shl(i * width).unwrap_or(0)
            })
        }
        Value::ArrayRef { array, index } => {
            let position = eval_numeric(index, state)?;
            let element = select(array.elements(), position).ok_or_else(|| {
                EvalError::MalformedArray {
                    value: value.to_string(),
                }
            })?;
            eval_numeric(element, state)? as u128
        }
    };
    Ok(truncate(raw, shape.width))
}

/// Evaluates `value` as a number, sign-extended when its shape is signed.
pub fn eval_numeric(value: &Value, state: &State) -> Result<i128, EvalError> {
    Ok(numeric(eval(value, state)?, value.shape()))
}

fn select(elements: &[ArrayElem], position: i128) -> Option<&Value> {
    let last = elements.len().checked_sub(1)?;
    let position = usize::try_from(position)
        .ok()
        .filter(|p| *p < elements.len())
        .unwrap_or(last);
    match &elements[position] {
        ArrayElem::Value(v) => Some(v),
        ArrayElem::Array(_) => None,
    }
}

fn apply(op: loom_ir::OpKind, args: &[i128], site: &Value) -> Result<i128, EvalError> {
    use loom_ir::OpKind::*;
    let result = match (op, args) {
        (Not, [a]) => !a,
        (Neg, [a]) => a.wrapping_neg(),
        (Bool, [a]) => i128::from(*a != 0),
        (Add, [a, b]) => a.wrapping_add(*b),
        (Sub, [a, b]) => a.wrapping_sub(*b),
        (Mul, [a, b]) => a.wrapping_mul(*b),
        (Mod, [a, b]) => {
            if *b == 0 {
                return Err(EvalError::DivisionByZero {
                    value: site.to_string(),
                });
            }
            let r = a.wrapping_rem(*b);
            if r != 0 && (r < 0) != (*b < 0) {
                r + b
            } else {
                r
            }
        }
        (Shl, [a, n]) => shift_left(*a, *n),
        (Shr, [a, n]) => shift_right(*a, *n),
        (And, [a, b]) => a & b,
        (Or, [a, b]) => a | b,
        (Xor, [a, b]) => a ^ b,
        (Eq, [a, b]) => i128::from(a == b),
        (Ne, [a, b]) => i128::from(a != b),
        (Lt, [a, b]) => i128::from(a < b),
        (Le, [a, b]) => i128::from(a <= b),
        (Gt, [a, b]) => i128::from(a > b),
        (Ge, [a, b]) => i128::from(a >= b),
        (Mux, [sel, a, b]) => {
            if *sel != 0 {
                *a
            } else {
                *b
            }
        }
        _ => 0,
    };
    Ok(result)
}

fn shift_left(a: i128, amount: i128) -> i128 {
    if amount < 0 {
        return shift_right(a, amount.saturating_neg());
    }
    u32::try_from(amount)
        .ok()
        .and_then(|n| a.checked_shl(n))
        .unwrap_or(0)
}

fn shift_right(a: i128, amount: i128) -> i128 {
    if amount < 0 {
        return shift_left(a, amount.saturating_neg());
    }
    u32::try_from(amount)
        .ok()
        .and_then(|n| a.checked_shr(n))
        .unwrap_or(if a < 0 { -1 } else { 0 })
}

/// Runs `statements` once, reading from `read` and writing to `write`.
pub fn execute(statements: &[Statement], read: &State, write: &mut State) -> Result<(), EvalError> {
    for stmt in statements {
        match stmt {
            Statement::Assign { lhs, rhs } => {
                let value = eval_numeric(rhs, read)?;
                store(lhs, value as u128, read, write)?;
            }
            Statement::If {
                cond,
                then,
                otherwise,
            } => {
                if eval(cond, read)? != 0 {
                    execute(then, read, write)?;
                } else if let Some(body) = otherwise {
                    execute(body, read, write)?;
                }
            }
            Statement::Switch { selector, cases } => {
                let raw = eval(selector, read)?;
                let width = selector.shape().width;
                if let Some(case) = cases.iter().find(|c| c.matches(raw, width)) {
                    execute(&case.body, read, write)?;
                }
            }
        }
    }
    Ok(())
}

/// Writes `bits` into an assignment target. Partial targets merge with
/// what `write` already holds.
fn store(target: &Value, bits: u128, read: &State, write: &mut State) -> Result<(), EvalError> {
    match target {
        Value::Signal(s) => write.set_raw(s, bits),
        Value::Slice { value, start, end } => {
            let width = end - start;
            let field = mask(width).checked_shl(*start).unwrap_or(0);
            let current = eval(value, write)?;
            let merged =
                (current & !field) | (truncate(bits, width).checked_shl(*start).unwrap_or(0));
            store(value, merged, read, write)?;
        }
        Value::Concat(parts) => {
            let mut offset = 0u32;
            for part in parts {
                let width = part.shape().width;
                let piece = truncate(bits.checked_shr(offset).unwrap_or(0), width);
                store(part, piece, read, write)?;
                offset += width;
            }
        }
        Value::ArrayRef { array, index } => {
            let position = eval_numeric(index, read)?;
            let element = select(array.elements(), position).ok_or_else(|| {
                EvalError::MalformedArray {
                    value: target.to_string(),
                }
            })?;
            store(element, bits, read, write)?;
        }
        Value::ClockSignal(_) | Value::ResetSignal(_) => {
            return Err(EvalError::DomainSignal {
                value: target.to_string(),
            })
        }
        Value::Const(_) | Value::Operator { .. } | Value::Repl { .. } => {
            return Err(EvalError::NotAnLvalue {
                value: target.to_string(),
            })
        }
    }
    Ok(())
}

/// Evaluates combinational `statements` against `inputs`.
///
/// Every driven signal starts each pass at its reset value. Passes repeat
/// until no value changes, which takes at most one pass per driven signal
/// for loop-free logic.
///
/// # Errors
///
/// Returns [`EvalError::Unsettled`] for combinational loops that never
/// stabilize, and any error raised while evaluating a value.
pub fn settle(statements: &[Statement], inputs: &State) -> Result<State, EvalError> {
    let mut driven = Vec::new();
    for stmt in statements {
        stmt.lhs_signals(&mut driven);
    }
    let mut current = inputs.clone();
    for signal in &driven {
        current.set_raw(signal, signal.reset_bits());
    }
    let limit = driven.len() + 2;
    for _ in 0..limit {
        let mut next = current.clone();
        for signal in &driven {
            next.set_raw(signal, signal.reset_bits());
        }
        execute(statements, &current, &mut next)?;
        if next == current {
            return Ok(next);
        }
        current = next;
    }
    Err(EvalError::Unsettled { iterations: limit })
}

/// Settles the combinational block of `module` alone, ignoring its
/// submodules.
pub fn settle_module(module: &Module, inputs: &State) -> Result<State, EvalError> {
    settle(module.statements(COMB_DOMAIN), inputs)
}

/// Computes the register state after one clock edge of a synchronous
/// block. Registers the statements do not assign keep their value.
pub fn tick(statements: &[Statement], current: &State) -> Result<State, EvalError> {
    let mut next = current.clone();
    execute(statements, current, &mut next)?;
    Ok(next)
}
