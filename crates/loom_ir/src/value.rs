//! Typed expression trees.
//!
//! [`Value`] is the polymorphic expression node of LoomIR. Every value has a
//! [`Shape`] derived from its operands at construction time, following
//! two's-complement rules: arithmetic widens by the carry or sign bit it
//! needs, comparisons yield one unsigned bit, and mixing signed with
//! unsigned operands adds a sign bit to the unsigned side.

use crate::array::Array;
use crate::error::ConstructionError;
use crate::signal::Signal;
use crate::stmt::Statement;
use loom_common::{bits_for, sign_extend, truncate, MAX_WIDTH};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width and signedness of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    /// Width in bits.
    pub width: u32,
    /// Whether the value is interpreted as two's complement.
    pub signed: bool,
}

impl Shape {
    /// An unsigned shape of `width` bits.
    pub const fn unsigned(width: u32) -> Self {
        Self {
            width,
            signed: false,
        }
    }

    /// A signed shape of `width` bits.
    pub const fn signed(width: u32) -> Self {
        Self {
            width,
            signed: true,
        }
    }

    /// The smallest shape holding every integer in `min..=max`.
    pub fn for_range(min: i128, max: i128) -> Self {
        let signed = min < 0 || max < 0;
        let width = bits_for(min, signed).max(bits_for(max, signed));
        Self { width, signed }
    }

    fn with_sign_bit(self) -> u32 {
        self.width.saturating_add(u32::from(self.signed))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.signed {
            write!(f, "signed({})", self.width)
        } else {
            write!(f, "unsigned({})", self.width)
        }
    }
}

/// A constant, normalized to its width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Const {
    bits: u128,
    shape: Shape,
}

impl Const {
    /// Creates a constant of the given shape; `value` is wrapped to fit.
    pub fn new(value: i128, shape: Shape) -> Result<Self, ConstructionError> {
        if shape.width > MAX_WIDTH {
            return Err(ConstructionError::ConstWidth {
                width: shape.width,
                max: MAX_WIDTH,
            });
        }
        Ok(Self {
            bits: truncate(value as u128, shape.width),
            shape,
        })
    }

    /// Creates a minimum-width constant; negative values are signed.
    pub fn unsized_int(value: i128) -> Self {
        let shape = Shape {
            width: bits_for(value, false),
            signed: value < 0,
        };
        Self {
            bits: truncate(value as u128, shape.width),
            shape,
        }
    }

    /// Returns the raw bit pattern.
    pub fn bits(&self) -> u128 {
        self.bits
    }

    /// Returns the numeric value under the constant's signedness.
    pub fn value(&self) -> i128 {
        if self.shape.signed {
            sign_extend(self.bits, self.shape.width)
        } else {
            self.bits as i128
        }
    }

    /// Returns the shape.
    pub fn shape(&self) -> Shape {
        self.shape
    }
}

/// Operator kinds, with their arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// Bitwise NOT.
    Not,
    /// Arithmetic negation.
    Neg,
    /// Reduce-OR: 1 when any bit is set.
    Bool,
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Floored modulo.
    Mod,
    /// Left shift by a value.
    Shl,
    /// Right shift by a value; arithmetic for signed operands.
    Shr,
    /// Bitwise AND.
    And,
    /// Bitwise OR.
    Or,
    /// Bitwise XOR.
    Xor,
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// `Mux(sel, a, b)`: `a` when `sel` is non-zero, else `b`.
    Mux,
}

impl OpKind {
    /// Returns the number of operands the operator takes.
    pub fn arity(self) -> usize {
        match self {
            OpKind::Not | OpKind::Neg | OpKind::Bool => 1,
            OpKind::Mux => 3,
            _ => 2,
        }
    }

    /// Returns the operator's symbol as used in renderings.
    pub fn symbol(self) -> &'static str {
        match self {
            OpKind::Not => "~",
            OpKind::Neg => "-",
            OpKind::Bool => "b",
            OpKind::Add => "+",
            OpKind::Sub => "-",
            OpKind::Mul => "*",
            OpKind::Mod => "%",
            OpKind::Shl => "<<",
            OpKind::Shr => ">>",
            OpKind::And => "&",
            OpKind::Or => "|",
            OpKind::Xor => "^",
            OpKind::Eq => "==",
            OpKind::Ne => "!=",
            OpKind::Lt => "<",
            OpKind::Le => "<=",
            OpKind::Gt => ">",
            OpKind::Ge => ">=",
            OpKind::Mux => "m",
        }
    }

    /// Computes the result shape for operands of the given shapes.
    ///
    /// `operands` must hold exactly [`OpKind::arity`] shapes.
    pub fn result_shape(self, operands: &[Shape]) -> Shape {
        match (self, operands) {
            (OpKind::Not, [a]) => *a,
            (OpKind::Neg, [a]) => Shape::signed(a.width.saturating_add(1)),
            (OpKind::Bool, [_]) => Shape::unsigned(1),
            (OpKind::Add | OpKind::Sub, [a, b]) => {
                let shape = bitwise_binary_shape(*a, *b);
                Shape {
                    width: shape.width.saturating_add(1),
                    signed: shape.signed,
                }
            }
            (OpKind::Mul, [a, b]) => Shape {
                width: a.width.saturating_add(b.width),
                signed: a.signed || b.signed,
            },
            (OpKind::Mod, [a, _]) => *a,
            (OpKind::And | OpKind::Or | OpKind::Xor, [a, b]) => bitwise_binary_shape(*a, *b),
            (OpKind::Eq | OpKind::Ne | OpKind::Lt | OpKind::Le | OpKind::Gt | OpKind::Ge, _) => {
                Shape::unsigned(1)
            }
            (OpKind::Shl, [a, b]) => {
                let extra = if b.signed {
                    pow2_saturating(b.width.saturating_sub(1)).saturating_sub(1)
                } else {
                    pow2_saturating(b.width).saturating_sub(1)
                };
                Shape {
                    width: a.width.saturating_add(extra),
                    signed: a.signed,
                }
            }
            (OpKind::Shr, [a, b]) => {
                let extra = if b.signed && b.width > 0 {
                    pow2_saturating(b.width - 1)
                } else {
                    0
                };
                Shape {
                    width: a.width.saturating_add(extra),
                    signed: a.signed,
                }
            }
            (OpKind::Mux, [_, a, b]) => bitwise_binary_shape(*a, *b),
            _ => Shape::unsigned(0),
        }
    }
}

fn pow2_saturating(exp: u32) -> u32 {
    1u32.checked_shl(exp).unwrap_or(u32::MAX)
}

/// Unifies two shapes for a bitwise operation: an unsigned operand mixed
/// with a signed one needs an extra bit to stay non-negative.
fn bitwise_binary_shape(a: Shape, b: Shape) -> Shape {
    match (a.signed, b.signed) {
        (false, true) => Shape::signed(a.width.saturating_add(1).max(b.width)),
        (true, false) => Shape::signed(a.width.max(b.width.saturating_add(1))),
        (signed, _) => Shape {
            width: a.width.max(b.width),
            signed,
        },
    }
}

/// An expression node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    /// A literal.
    Const(Const),
    /// A signal reference.
    Signal(Signal),
    /// The clock of the named domain.
    ClockSignal(String),
    /// The reset of the named domain.
    ResetSignal(String),
    /// An operator applied to ordered operands.
    Operator {
        /// The operator.
        op: OpKind,
        /// Operands, in order.
        operands: Vec<Value>,
    },
    /// Bits `start..end` of a value.
    Slice {
        /// The sliced value.
        value: Box<Value>,
        /// First bit, inclusive.
        start: u32,
        /// Last bit, exclusive.
        end: u32,
    },
    /// Concatenation; the first part supplies the least significant bits.
    Concat(Vec<Value>),
    /// `count` copies of a value, concatenated.
    Repl {
        /// The repeated value.
        value: Box<Value>,
        /// Number of copies.
        count: u32,
    },
    /// An element of an array selected by a runtime index.
    ArrayRef {
        /// The indexed array.
        array: Array,
        /// The index.
        index: Box<Value>,
    },
}

impl Value {
    /// A minimum-width integer constant.
    pub fn int(value: i128) -> Self {
        Value::Const(Const::unsized_int(value))
    }

    /// A constant of the given shape.
    pub fn constant(value: i128, shape: Shape) -> Result<Self, ConstructionError> {
        Ok(Value::Const(Const::new(value, shape)?))
    }

    /// The clock of `domain`.
    pub fn clock(domain: impl Into<String>) -> Self {
        Value::ClockSignal(domain.into())
    }

    /// The reset of `domain`.
    pub fn reset(domain: impl Into<String>) -> Self {
        Value::ResetSignal(domain.into())
    }

    /// Applies `op` to `operands`, checking the arity.
    pub fn op(op: OpKind, operands: Vec<Value>) -> Result<Self, ConstructionError> {
        if operands.len() != op.arity() {
            return Err(ConstructionError::OperatorArity {
                op: op.symbol().to_string(),
                expected: op.arity(),
                found: operands.len(),
            });
        }
        Ok(Value::Operator { op, operands })
    }

    fn unary(&self, op: OpKind) -> Self {
        Value::Operator {
            op,
            operands: vec![self.clone()],
        }
    }

    fn binary(&self, op: OpKind, rhs: impl Into<Value>) -> Self {
        Value::Operator {
            op,
            operands: vec![self.clone(), rhs.into()],
        }
    }

    /// Bitwise NOT.
    pub fn not(&self) -> Self {
        self.unary(OpKind::Not)
    }

    /// Arithmetic negation.
    pub fn neg(&self) -> Self {
        self.unary(OpKind::Neg)
    }

    /// 1 when any bit is set.
    pub fn bool(&self) -> Self {
        self.unary(OpKind::Bool)
    }

    /// Sum.
    pub fn add(&self, rhs: impl Into<Value>) -> Self {
        self.binary(OpKind::Add, rhs)
    }

    /// Difference.
    pub fn sub(&self, rhs: impl Into<Value>) -> Self {
        self.binary(OpKind::Sub, rhs)
    }

    /// Product.
    pub fn mul(&self, rhs: impl Into<Value>) -> Self {
        self.binary(OpKind::Mul, rhs)
    }

    /// Floored modulo.
    pub fn modulo(&self, rhs: impl Into<Value>) -> Self {
        self.binary(OpKind::Mod, rhs)
    }

    /// Left shift by a value.
    pub fn shl(&self, amount: impl Into<Value>) -> Self {
        self.binary(OpKind::Shl, amount)
    }

    /// Right shift by a value.
    pub fn shr(&self, amount: impl Into<Value>) -> Self {
        self.binary(OpKind::Shr, amount)
    }

    /// Bitwise AND.
    pub fn and(&self, rhs: impl Into<Value>) -> Self {
        self.binary(OpKind::And, rhs)
    }

    /// Bitwise OR.
    pub fn or(&self, rhs: impl Into<Value>) -> Self {
        self.binary(OpKind::Or, rhs)
    }

    /// Bitwise XOR.
    pub fn xor(&self, rhs: impl Into<Value>) -> Self {
        self.binary(OpKind::Xor, rhs)
    }

    /// Equality comparison.
    pub fn equals(&self, rhs: impl Into<Value>) -> Self {
        self.binary(OpKind::Eq, rhs)
    }

    /// Inequality comparison.
    pub fn not_equals(&self, rhs: impl Into<Value>) -> Self {
        self.binary(OpKind::Ne, rhs)
    }

    /// Less-than comparison.
    pub fn lt(&self, rhs: impl Into<Value>) -> Self {
        self.binary(OpKind::Lt, rhs)
    }

    /// Less-or-equal comparison.
    pub fn le(&self, rhs: impl Into<Value>) -> Self {
        self.binary(OpKind::Le, rhs)
    }

    /// Greater-than comparison.
    pub fn gt(&self, rhs: impl Into<Value>) -> Self {
        self.binary(OpKind::Gt, rhs)
    }

    /// Greater-or-equal comparison.
    pub fn ge(&self, rhs: impl Into<Value>) -> Self {
        self.binary(OpKind::Ge, rhs)
    }

    /// `a` when `sel` is non-zero, else `b`.
    pub fn mux(sel: impl Into<Value>, a: impl Into<Value>, b: impl Into<Value>) -> Self {
        Value::Operator {
            op: OpKind::Mux,
            operands: vec![sel.into(), a.into(), b.into()],
        }
    }

    /// Concatenates `parts`, the first supplying the least significant bits.
    pub fn cat<I, V>(parts: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::Concat(parts.into_iter().map(Into::into).collect())
    }

    /// Bits `start..end`. Negative bounds count from the top, so
    /// `slice(-4, -1)` holds bits `w-4..w-1`.
    pub fn slice(&self, start: i64, end: i64) -> Result<Self, ConstructionError> {
        let width = i64::from(self.shape().width);
        let norm = |i: i64| if i < 0 { i + width } else { i };
        let (s, e) = (norm(start), norm(end));
        if s < 0 || s > e || e > width {
            return Err(ConstructionError::SliceBounds {
                start,
                end,
                width: self.shape().width,
            });
        }
        Ok(Value::Slice {
            value: Box::new(self.clone()),
            start: s as u32,
            end: e as u32,
        })
    }

    /// The single bit at `index`; negative indices count from the top.
    pub fn bit(&self, index: i64) -> Result<Self, ConstructionError> {
        let width = i64::from(self.shape().width);
        if index < -width || index >= width {
            return Err(ConstructionError::BitIndex {
                index,
                width: self.shape().width,
            });
        }
        let i = if index < 0 { index + width } else { index };
        self.slice(i, i + 1)
    }

    /// `count` copies of this value; `count` must be at least 1 and the
    /// result must fit a `u32` width.
    pub fn repl(&self, count: u32) -> Result<Self, ConstructionError> {
        if count == 0 {
            return Err(ConstructionError::ReplCount { count });
        }
        let width = u64::from(self.shape().width) * u64::from(count);
        if width > u64::from(u32::MAX) {
            return Err(ConstructionError::ValueWidth {
                width,
                max: u32::MAX,
            });
        }
        Ok(Value::Repl {
            value: Box::new(self.clone()),
            count,
        })
    }

    /// Subscripts an array proxy whose elements are arrays.
    ///
    /// `A[x][y]` becomes a proxy over `[row[y] for row in A]` indexed by
    /// `x`, so the outer index is resolved first.
    pub fn index(&self, index: impl Into<Value>) -> Result<Self, ConstructionError> {
        match self {
            Value::ArrayRef { array, index: outer } => {
                let index = index.into();
                let inner = array.subscript_elements(&index)?;
                Ok(Value::ArrayRef {
                    array: inner,
                    index: outer.clone(),
                })
            }
            other => Err(ConstructionError::NotAnArray {
                value: other.to_string(),
            }),
        }
    }

    /// Builds the statement assigning `rhs` to this value.
    pub fn assign(&self, rhs: impl Into<Value>) -> Result<Statement, ConstructionError> {
        Statement::assign(self.clone(), rhs)
    }

    /// Derives the shape of this value.
    pub fn shape(&self) -> Shape {
        match self {
            Value::Const(c) => c.shape(),
            Value::Signal(s) => s.shape(),
            Value::ClockSignal(_) | Value::ResetSignal(_) => Shape::unsigned(1),
            Value::Operator { op, operands } => {
                let shapes: Vec<Shape> = operands.iter().map(Value::shape).collect();
                op.result_shape(&shapes)
            }
            Value::Slice { start, end, .. } => Shape::unsigned(end - start),
            Value::Concat(parts) => Shape::unsigned(
                parts
                    .iter()
                    .fold(0u32, |sum, p| sum.saturating_add(p.shape().width)),
            ),
            Value::Repl { value, count } => {
                Shape::unsigned(value.shape().width.saturating_mul(*count))
            }
            Value::ArrayRef { array, .. } => array.element_shape(),
        }
    }

    /// Returns whether this value can be assigned to.
    pub fn is_lvalue(&self) -> bool {
        match self {
            Value::Signal(_) | Value::ClockSignal(_) | Value::ResetSignal(_) => true,
            Value::Slice { value, .. } => value.is_lvalue(),
            Value::Concat(parts) => parts.iter().all(Value::is_lvalue),
            Value::ArrayRef { array, .. } => array.leaves_are_lvalues(),
            Value::Const(_) | Value::Operator { .. } | Value::Repl { .. } => false,
        }
    }

    /// Rejects values that still contain a partially indexed array of
    /// arrays.
    pub fn check_complete(&self) -> Result<(), ConstructionError> {
        match self {
            Value::Const(_) | Value::Signal(_) | Value::ClockSignal(_) | Value::ResetSignal(_) => {
                Ok(())
            }
            Value::Operator { operands, .. } | Value::Concat(operands) => {
                operands.iter().try_for_each(Value::check_complete)
            }
            Value::Slice { value, .. } | Value::Repl { value, .. } => value.check_complete(),
            Value::ArrayRef { array, index } => {
                index.check_complete()?;
                array.check_leaves()
            }
        }
    }

    /// Calls `f` on every signal in the tree, left to right, depth first.
    /// A signal referenced several times is visited several times.
    pub fn visit_signals(&self, f: &mut impl FnMut(&Signal)) {
        match self {
            Value::Signal(s) => f(s),
            Value::Const(_) | Value::ClockSignal(_) | Value::ResetSignal(_) => {}
            Value::Operator { operands, .. } | Value::Concat(operands) => {
                for v in operands {
                    v.visit_signals(f);
                }
            }
            Value::Slice { value, .. } | Value::Repl { value, .. } => value.visit_signals(f),
            Value::ArrayRef { array, index } => {
                for v in array.leaves() {
                    v.visit_signals(f);
                }
                index.visit_signals(f);
            }
        }
    }

    /// Calls `f` with the domain of every clock or reset reference in the
    /// tree.
    pub fn visit_domains(&self, f: &mut impl FnMut(&str)) {
        match self {
            Value::ClockSignal(d) | Value::ResetSignal(d) => f(d),
            Value::Const(_) | Value::Signal(_) => {}
            Value::Operator { operands, .. } | Value::Concat(operands) => {
                for v in operands {
                    v.visit_domains(f);
                }
            }
            Value::Slice { value, .. } | Value::Repl { value, .. } => value.visit_domains(f),
            Value::ArrayRef { array, index } => {
                for v in array.leaves() {
                    v.visit_domains(f);
                }
                index.visit_domains(f);
            }
        }
    }

    /// Collects the signals this value drives when used as an lvalue.
    pub fn lhs_signals(&self, out: &mut Vec<Signal>) {
        match self {
            Value::Signal(s) => {
                if !out.contains(s) {
                    out.push(s.clone());
                }
            }
            Value::Slice { value, .. } => value.lhs_signals(out),
            Value::Concat(parts) => {
                for p in parts {
                    p.lhs_signals(out);
                }
            }
            Value::ArrayRef { array, .. } => {
                for v in array.leaves() {
                    v.lhs_signals(out);
                }
            }
            _ => {}
        }
    }

    /// Rebuilds the tree bottom-up, replacing every node with `f(node)`
    /// after its children have been rebuilt.
    pub fn map_bottom_up(&self, f: &mut impl FnMut(Value) -> Value) -> Value {
        let rebuilt = match self {
            Value::Const(_) | Value::Signal(_) | Value::ClockSignal(_) | Value::ResetSignal(_) => {
                self.clone()
            }
            Value::Operator { op, operands } => Value::Operator {
                op: *op,
                operands: operands.iter().map(|v| v.map_bottom_up(f)).collect(),
            },
            Value::Slice { value, start, end } => Value::Slice {
                value: Box::new(value.map_bottom_up(f)),
                start: *start,
                end: *end,
            },
            Value::Concat(parts) => {
                Value::Concat(parts.iter().map(|v| v.map_bottom_up(f)).collect())
            }
            Value::Repl { value, count } => Value::Repl {
                value: Box::new(value.map_bottom_up(f)),
                count: *count,
            },
            Value::ArrayRef { array, index } => Value::ArrayRef {
                array: array.map_leaves(&mut |v| v.map_bottom_up(f)),
                index: Box::new(index.map_bottom_up(f)),
            },
        };
        f(rebuilt)
    }

    /// Returns whether any node of the tree is an [`Value::ArrayRef`].
    pub fn contains_array_ref(&self) -> bool {
        match self {
            Value::ArrayRef { .. } => true,
            Value::Operator { operands, .. } | Value::Concat(operands) => {
                operands.iter().any(Value::contains_array_ref)
            }
            Value::Slice { value, .. } | Value::Repl { value, .. } => value.contains_array_ref(),
            _ => false,
        }
    }
}

impl From<Signal> for Value {
    fn from(s: Signal) -> Self {
        Value::Signal(s)
    }
}

impl From<&Signal> for Value {
    fn from(s: &Signal) -> Self {
        Value::Signal(s.clone())
    }
}

impl From<Const> for Value {
    fn from(c: Const) -> Self {
        Value::Const(c)
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Const(c) => {
                let sign = if c.shape.signed { "s" } else { "" };
                write!(f, "(const {}'{sign}d{})", c.shape.width, c.value())
            }
            Value::Signal(s) => write!(f, "{s}"),
            Value::ClockSignal(d) => write!(f, "(clk {d})"),
            Value::ResetSignal(d) => write!(f, "(rst {d})"),
            Value::Operator { op, operands } => {
                write!(f, "({}", op.symbol())?;
                for v in operands {
                    write!(f, " {v}")?;
                }
                f.write_str(")")
            }
            Value::Slice { value, start, end } => write!(f, "(slice {value} {start}:{end})"),
            Value::Concat(parts) => {
                f.write_str("(cat")?;
                for v in parts {
                    write!(f, " {v}")?;
                }
                f.write_str(")")
            }
            Value::Repl { value, count } => write!(f, "(repl {value} {count})"),
            Value::ArrayRef { array, index } => write!(f, "(proxy {array} {index})"),
        }
    }
}

/// The signed-bit count used when comparing array element shapes.
pub(crate) fn width_with_sign(shape: Shape) -> u32 {
    shape.with_sign_bit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::ArrayElem;

    fn sig(width: u32) -> Signal {
        Signal::new(width)
    }

    fn ssig(width: u32) -> Signal {
        Signal::builder().width(width).signed(true).build()
    }

    #[test]
    fn const_normalization() {
        let c = Const::new(-1, Shape::unsigned(4)).unwrap();
        assert_eq!(c.bits(), 0b1111);
        assert_eq!(c.value(), 15);
        let c = Const::new(-1, Shape::signed(4)).unwrap();
        assert_eq!(c.value(), -1);
        let c = Const::new(0x1ff, Shape::unsigned(8)).unwrap();
        assert_eq!(c.bits(), 0xff);
    }

    #[test]
    fn unsized_const_minimum_width() {
        assert_eq!(Const::unsized_int(5).shape(), Shape::unsigned(3));
        assert_eq!(Const::unsized_int(0).shape(), Shape::unsigned(1));
        assert_eq!(Const::unsized_int(-4).shape(), Shape::signed(3));
        assert_eq!(Const::unsized_int(-4).value(), -4);
    }

    #[test]
    fn const_width_limit() {
        assert!(Const::new(0, Shape::unsigned(128)).is_ok());
        let err = Const::new(0, Shape::unsigned(129)).unwrap_err();
        assert!(matches!(err, ConstructionError::ConstWidth { width: 129, .. }));
    }

    #[test]
    fn arithmetic_shapes() {
        let a = sig(8).value();
        let b = sig(4).value();
        assert_eq!(a.add(&b).shape(), Shape::unsigned(9));
        assert_eq!(a.sub(&b).shape(), Shape::unsigned(9));
        assert_eq!(a.mul(&b).shape(), Shape::unsigned(12));
        assert_eq!(a.modulo(&b).shape(), Shape::unsigned(8));
        assert_eq!(a.neg().shape(), Shape::signed(9));
        assert_eq!(a.not().shape(), Shape::unsigned(8));
    }

    #[test]
    fn mixed_sign_bitwise_adds_sign_bit() {
        let u = sig(8).value();
        let s = ssig(8).value();
        assert_eq!(u.and(&s).shape(), Shape::signed(9));
        assert_eq!(s.or(&u).shape(), Shape::signed(9));
        assert_eq!(u.add(&s).shape(), Shape::signed(10));
        let wide = ssig(12).value();
        assert_eq!(u.xor(&wide).shape(), Shape::signed(12));
    }

    #[test]
    fn comparisons_are_one_bit() {
        let a = ssig(8).value();
        let b = sig(16).value();
        for v in [a.equals(&b), a.not_equals(&b), a.lt(&b), a.le(&b), a.gt(&b), a.ge(&b), a.bool()] {
            assert_eq!(v.shape(), Shape::unsigned(1));
        }
    }

    #[test]
    fn shift_shapes() {
        let a = sig(8).value();
        let amount = sig(3).value();
        assert_eq!(a.shl(&amount).shape(), Shape::unsigned(15));
        assert_eq!(a.shr(&amount).shape(), Shape::unsigned(8));
        let signed_amount = ssig(3).value();
        assert_eq!(a.shl(&signed_amount).shape(), Shape::unsigned(11));
        assert_eq!(a.shr(&signed_amount).shape(), Shape::unsigned(12));
    }

    #[test]
    fn mux_shape_ignores_selector() {
        let v = Value::mux(sig(1), sig(4), ssig(4));
        assert_eq!(v.shape(), Shape::signed(5));
    }

    #[test]
    fn operator_arity_checked() {
        let err = Value::op(OpKind::Add, vec![Value::int(1)]).unwrap_err();
        assert!(matches!(
            err,
            ConstructionError::OperatorArity { expected: 2, found: 1, .. }
        ));
        assert!(Value::op(OpKind::Not, vec![Value::int(1)]).is_ok());
    }

    #[test]
    fn oversized_repl_is_rejected() {
        let v = sig(2).value();
        assert_eq!(
            v.repl(u32::MAX),
            Err(ConstructionError::ValueWidth {
                width: 2 * u64::from(u32::MAX),
                max: u32::MAX,
            })
        );
        let wide = sig(1).value().repl(u32::MAX).unwrap();
        assert_eq!(wide.shape(), Shape::unsigned(u32::MAX));
        let cat = Value::cat([wide.clone(), wide]);
        assert_eq!(cat.shape(), Shape::unsigned(u32::MAX));
        assert_eq!(cat.add(Value::int(1)).shape().width, u32::MAX);
    }

    #[test]
    fn concat_and_repl_widths() {
        let a = sig(3).value();
        let b = sig(5).value();
        assert_eq!(Value::cat([&a, &b]).shape(), Shape::unsigned(8));
        assert_eq!(a.repl(4).unwrap().shape(), Shape::unsigned(12));
        assert!(matches!(
            a.repl(0),
            Err(ConstructionError::ReplCount { count: 0 })
        ));
    }

    #[test]
    fn slice_bounds() {
        let a = sig(8).value();
        assert_eq!(a.slice(0, 8).unwrap().shape(), Shape::unsigned(8));
        assert_eq!(a.slice(2, 2).unwrap().shape(), Shape::unsigned(0));
        assert!(a.slice(4, 2).is_err());
        assert!(a.slice(0, 9).is_err());
        match a.slice(-4, -1).unwrap() {
            Value::Slice { start, end, .. } => assert_eq!((start, end), (4, 7)),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn bit_index_negative_from_top() {
        let a = sig(8).value();
        match a.bit(-1).unwrap() {
            Value::Slice { start, end, .. } => assert_eq!((start, end), (7, 8)),
            other => panic!("unexpected {other}"),
        }
        assert!(matches!(
            a.bit(8),
            Err(ConstructionError::BitIndex { index: 8, width: 8 })
        ));
        assert!(a.bit(-9).is_err());
    }

    #[test]
    fn lvalue_legality() {
        let a = sig(4).value();
        let b = sig(4).value();
        assert!(a.is_lvalue());
        assert!(a.slice(0, 2).unwrap().is_lvalue());
        assert!(Value::cat([&a, &b]).is_lvalue());
        assert!(!a.add(&b).is_lvalue());
        assert!(!Value::int(3).is_lvalue());
        assert!(!Value::cat([a.clone(), Value::int(1)]).is_lvalue());
        assert!(!a.repl(2).unwrap().is_lvalue());
    }

    #[test]
    fn index_requires_array_proxy() {
        let a = sig(4).value();
        let err = a.index(Value::int(0)).unwrap_err();
        assert!(matches!(err, ConstructionError::NotAnArray { .. }));
    }

    #[test]
    fn nested_index_maps_over_rows() {
        let rows: Vec<Array> = (0..2)
            .map(|_| Array::new((0..3).map(|_| sig(8))))
            .collect();
        let grid = Array::new(rows.into_iter().map(ArrayElem::Array));
        let x = sig(1);
        let y = sig(2);
        let v = grid.index(&x).unwrap().index(&y).unwrap();
        match &v {
            Value::ArrayRef { array, index } => {
                assert_eq!(**index, x.value());
                assert_eq!(array.len(), 2);
                for elem in array.elements() {
                    match elem {
                        ArrayElem::Value(Value::ArrayRef { index, array }) => {
                            assert_eq!(**index, y.value());
                            assert_eq!(array.len(), 3);
                        }
                        other => panic!("unexpected {other:?}"),
                    }
                }
            }
            other => panic!("unexpected {other}"),
        }
        assert_eq!(v.shape(), Shape::unsigned(8));
        assert!(v.check_complete().is_ok());
        assert!(grid.index(&x).unwrap().check_complete().is_err());
    }

    #[test]
    fn visit_signals_in_order() {
        let a = sig(1);
        let b = sig(1);
        let v = Value::cat([a.value(), b.value().add(&a)]);
        let mut seen = Vec::new();
        v.visit_signals(&mut |s| seen.push(s.id()));
        assert_eq!(seen, vec![a.id(), b.id(), a.id()]);
    }

    #[test]
    fn visit_domains_finds_clock_and_reset_refs() {
        let a = sig(1);
        let v = Value::mux(Value::reset("pix"), a.value(), Value::clock("sync").not());
        let mut seen = Vec::new();
        v.visit_domains(&mut |d| seen.push(d.to_string()));
        assert_eq!(seen, vec!["pix", "sync"]);
    }

    #[test]
    fn map_bottom_up_replaces_leaves() {
        let v = Value::cat([Value::clock("sync"), Value::reset("sync")]);
        let renamed = v.map_bottom_up(&mut |node| match node {
            Value::ClockSignal(d) if d == "sync" => Value::ClockSignal("cpu_sync".into()),
            other => other,
        });
        assert_eq!(
            renamed,
            Value::cat([Value::clock("cpu_sync"), Value::reset("sync")])
        );
    }

    #[test]
    fn display_rendering() {
        let a = Signal::named("a", 4);
        let v = a.value().add(Value::int(1));
        let text = v.to_string();
        assert!(text.starts_with("(+ (sig a #"));
        assert!(text.ends_with("(const 1'd1))"));
    }
}
