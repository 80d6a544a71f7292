//! Immutable arrays of values, indexable by runtime values.
//!
//! Indexing an [`Array`] with a [`Value`] yields a [`Value::ArrayRef`] proxy.
//! Proxies are lowered to multiplexer trees (rvalues) or switch statements
//! (lvalues) after finalization.

use crate::error::ConstructionError;
use crate::signal::Signal;
use crate::value::{width_with_sign, Shape, Value};
use serde::Serialize;
use std::fmt;

/// An array element: a value, or a nested array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ArrayElem {
    /// A leaf value.
    Value(Value),
    /// A nested array; must be indexed before use as a value.
    Array(Array),
}

impl From<Value> for ArrayElem {
    fn from(v: Value) -> Self {
        ArrayElem::Value(v)
    }
}

impl From<Signal> for ArrayElem {
    fn from(s: Signal) -> Self {
        ArrayElem::Value(Value::Signal(s))
    }
}

impl From<&Signal> for ArrayElem {
    fn from(s: &Signal) -> Self {
        ArrayElem::Value(Value::Signal(s.clone()))
    }
}

impl From<Array> for ArrayElem {
    fn from(a: Array) -> Self {
        ArrayElem::Array(a)
    }
}

/// An ordered, immutable collection of elements.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Array {
    elements: Vec<ArrayElem>,
}

impl Array {
    /// Creates an array from its elements.
    pub fn new<I, E>(elements: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<ArrayElem>,
    {
        Self {
            elements: elements.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns the elements in order.
    pub fn elements(&self) -> &[ArrayElem] {
        &self.elements
    }

    /// Returns the element at a constant position; no proxy is created.
    pub fn get(&self, index: usize) -> Result<&ArrayElem, ConstructionError> {
        self.elements
            .get(index)
            .ok_or(ConstructionError::ArrayIndex {
                index,
                len: self.elements.len(),
            })
    }

    /// Selects an element with a runtime index.
    ///
    /// Indices outside `0..len` select the last element.
    pub fn index(&self, index: impl Into<Value>) -> Result<Value, ConstructionError> {
        if self.elements.is_empty() {
            return Err(ConstructionError::EmptyArray);
        }
        Ok(Value::ArrayRef {
            array: self.clone(),
            index: Box::new(index.into()),
        })
    }

    /// Applies one more level of indexing to every element.
    pub(crate) fn subscript_elements(&self, index: &Value) -> Result<Array, ConstructionError> {
        let elements = self
            .elements
            .iter()
            .map(|elem| match elem {
                ArrayElem::Array(inner) => inner.index(index.clone()).map(ArrayElem::Value),
                ArrayElem::Value(v @ Value::ArrayRef { .. }) => {
                    v.index(index.clone()).map(ArrayElem::Value)
                }
                ArrayElem::Value(other) => Err(ConstructionError::NotAnArray {
                    value: other.to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Array { elements })
    }

    /// The shape of a proxy into this array: wide enough for every element,
    /// counting each signed element's sign bit, and signed if any element
    /// is signed.
    pub fn element_shape(&self) -> Shape {
        let mut shape = Shape::unsigned(0);
        for elem in &self.elements {
            let elem_shape = match elem {
                ArrayElem::Value(v) => v.shape(),
                ArrayElem::Array(a) => a.element_shape(),
            };
            shape.width = shape.width.max(width_with_sign(elem_shape));
            shape.signed |= elem_shape.signed;
        }
        shape
    }

    /// Returns every leaf value, descending into nested arrays.
    pub fn leaves(&self) -> Vec<&Value> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Value>) {
        for elem in &self.elements {
            match elem {
                ArrayElem::Value(v) => out.push(v),
                ArrayElem::Array(a) => a.collect_leaves(out),
            }
        }
    }

    /// Returns a copy with every leaf replaced by `f(leaf)`.
    pub fn map_leaves(&self, f: &mut impl FnMut(&Value) -> Value) -> Array {
        Array {
            elements: self
                .elements
                .iter()
                .map(|elem| match elem {
                    ArrayElem::Value(v) => ArrayElem::Value(f(v)),
                    ArrayElem::Array(a) => ArrayElem::Array(a.map_leaves(f)),
                })
                .collect(),
        }
    }

    pub(crate) fn leaves_are_lvalues(&self) -> bool {
        self.leaves().into_iter().all(Value::is_lvalue)
    }

    pub(crate) fn check_leaves(&self) -> Result<(), ConstructionError> {
        for elem in &self.elements {
            match elem {
                ArrayElem::Value(v) => v.check_complete()?,
                ArrayElem::Array(_) => return Err(ConstructionError::ArrayAsValue),
            }
        }
        Ok(())
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(array")?;
        for elem in &self.elements {
            match elem {
                ArrayElem::Value(v) => write!(f, " {v}")?,
                ArrayElem::Array(a) => write!(f, " {a}")?,
            }
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_index_returns_element() {
        let a = Signal::new(4);
        let b = Signal::new(4);
        let arr = Array::new([&a, &b]);
        assert_eq!(arr.get(1).unwrap(), &ArrayElem::Value(b.value()));
        assert!(matches!(
            arr.get(2),
            Err(ConstructionError::ArrayIndex { index: 2, len: 2 })
        ));
    }

    #[test]
    fn value_index_creates_proxy() {
        let arr = Array::new([Signal::new(4), Signal::new(4)]);
        let idx = Signal::new(1);
        let proxy = arr.index(&idx).unwrap();
        assert!(matches!(proxy, Value::ArrayRef { .. }));
        assert!(proxy.is_lvalue());
    }

    #[test]
    fn empty_array_cannot_be_indexed() {
        let arr = Array::new(Vec::<Value>::new());
        assert!(arr.is_empty());
        assert_eq!(
            arr.index(Value::int(0)).unwrap_err(),
            ConstructionError::EmptyArray
        );
    }

    #[test]
    fn proxy_shape_counts_sign_bits() {
        let arr = Array::new([
            Signal::new(4),
            Signal::builder().width(6).signed(true).build(),
        ]);
        assert_eq!(arr.element_shape(), Shape::signed(7));
        let arr = Array::new([Signal::new(3), Signal::new(5)]);
        assert_eq!(arr.element_shape(), Shape::unsigned(5));
    }

    #[test]
    fn constants_are_not_lvalues() {
        let arr = Array::new([Value::int(1), Value::int(2)]);
        let proxy = arr.index(Signal::new(1)).unwrap();
        assert!(!proxy.is_lvalue());
    }

    #[test]
    fn leaves_descend_into_rows() {
        let row0 = Array::new([Value::int(1), Value::int(2)]);
        let row1 = Array::new([Value::int(3)]);
        let grid = Array::new([row0, row1]);
        assert_eq!(grid.leaves().len(), 3);
        assert_eq!(grid.check_leaves(), Err(ConstructionError::ArrayAsValue));
    }
}
