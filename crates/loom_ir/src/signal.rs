//! Signals: named, shaped storage locations with identity.
//!
//! A [`Signal`] is a cheap handle; clones refer to the same signal. Two
//! signals are equal only when they are the same signal, regardless of
//! shape or hint.

use crate::value::{Shape, Value};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SIGNAL_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of a signal, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalId(u64);

impl SignalId {
    fn fresh() -> Self {
        Self(NEXT_SIGNAL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric identity.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct SignalData {
    id: SignalId,
    shape: Shape,
    reset: i128,
    reset_less: bool,
    hint: Option<String>,
    scope: Vec<String>,
}

/// A handle to a signal.
#[derive(Clone)]
pub struct Signal(Arc<SignalData>);

impl Signal {
    /// Creates an unsigned signal of `width` bits with no hint and reset 0.
    pub fn new(width: u32) -> Self {
        Self::builder().width(width).build()
    }

    /// Creates an unsigned signal of `width` bits named `hint`.
    pub fn named(hint: impl Into<String>, width: u32) -> Self {
        Self::builder().name(hint).width(width).build()
    }

    /// Starts building a signal with full control over its attributes.
    pub fn builder() -> SignalBuilder {
        SignalBuilder::default()
    }

    /// Creates a fresh signal with the shape of `other`.
    ///
    /// When `other` is itself a signal its reset value and reset-less flag
    /// are copied too.
    pub fn like(other: &Value, hint: impl Into<String>) -> Self {
        let mut builder = Self::builder().shape(other.shape()).name(hint);
        if let Value::Signal(sig) = other {
            builder = builder.reset(sig.reset());
            if sig.reset_less() {
                builder = builder.reset_less();
            }
        }
        builder.build()
    }

    /// Returns this signal's identity.
    pub fn id(&self) -> SignalId {
        self.0.id
    }

    /// Returns the shape.
    pub fn shape(&self) -> Shape {
        self.0.shape
    }

    /// Returns the width in bits.
    pub fn width(&self) -> u32 {
        self.0.shape.width
    }

    /// Returns whether the signal is signed.
    pub fn signed(&self) -> bool {
        self.0.shape.signed
    }

    /// Returns the reset value as written.
    pub fn reset(&self) -> i128 {
        self.0.reset
    }

    /// Returns the reset value truncated to the signal width.
    pub fn reset_bits(&self) -> u128 {
        loom_common::truncate(self.0.reset as u128, self.width())
    }

    /// Returns whether the signal ignores its domain's reset.
    pub fn reset_less(&self) -> bool {
        self.0.reset_less
    }

    /// Returns the name hint, if any.
    pub fn hint(&self) -> Option<&str> {
        self.0.hint.as_deref()
    }

    /// Returns a handle to the same signal carrying `hint` instead.
    ///
    /// The identity is unchanged, so the result compares equal to `self`.
    pub fn renamed(&self, hint: impl Into<String>) -> Signal {
        let data = &self.0;
        Signal(Arc::new(SignalData {
            id: data.id,
            shape: data.shape,
            reset: data.reset,
            reset_less: data.reset_less,
            hint: Some(hint.into()),
            scope: data.scope.clone(),
        }))
    }

    /// Returns the explicit lexical scope, outermost first. Empty when the
    /// signal takes its scope from the module it is first used in.
    pub fn scope(&self) -> &[String] {
        &self.0.scope
    }

    /// Wraps this signal in a [`Value`].
    pub fn value(&self) -> Value {
        Value::Signal(self.clone())
    }
}

impl PartialEq for Signal {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Signal {}

impl Hash for Signal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hint() {
            Some(hint) => write!(f, "(sig {hint} {})", self.id()),
            None => write!(f, "(sig {})", self.id()),
        }
    }
}

impl Serialize for Signal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Signal", 7)?;
        s.serialize_field("id", &self.0.id)?;
        s.serialize_field("width", &self.0.shape.width)?;
        s.serialize_field("signed", &self.0.shape.signed)?;
        s.serialize_field("reset", &self.0.reset)?;
        s.serialize_field("reset_less", &self.0.reset_less)?;
        s.serialize_field("hint", &self.0.hint)?;
        s.serialize_field("scope", &self.0.scope)?;
        s.end()
    }
}

/// Builder for [`Signal`]s.
#[derive(Debug, Clone)]
pub struct SignalBuilder {
    shape: Shape,
    reset: i128,
    reset_less: bool,
    hint: Option<String>,
    scope: Vec<String>,
}

impl Default for SignalBuilder {
    fn default() -> Self {
        Self {
            shape: Shape::unsigned(1),
            reset: 0,
            reset_less: false,
            hint: None,
            scope: Vec::new(),
        }
    }
}

impl SignalBuilder {
    /// Sets the width, keeping the signedness.
    pub fn width(mut self, width: u32) -> Self {
        self.shape.width = width;
        self
    }

    /// Sets the signedness, keeping the width.
    pub fn signed(mut self, signed: bool) -> Self {
        self.shape.signed = signed;
        self
    }

    /// Sets the whole shape.
    pub fn shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    /// Sizes the signal to hold every integer in `min..=max`.
    pub fn range(mut self, min: i128, max: i128) -> Self {
        self.shape = Shape::for_range(min, max);
        self
    }

    /// Sets the reset value.
    pub fn reset(mut self, reset: i128) -> Self {
        self.reset = reset;
        self
    }

    /// Marks the signal as ignoring its domain's reset.
    pub fn reset_less(mut self) -> Self {
        self.reset_less = true;
        self
    }

    /// Sets the name hint.
    pub fn name(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Sets an explicit lexical scope, outermost first.
    pub fn scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = scope.into_iter().map(Into::into).collect();
        self
    }

    /// Creates the signal with a fresh identity.
    pub fn build(self) -> Signal {
        Signal(Arc::new(SignalData {
            id: SignalId::fresh(),
            shape: self.shape,
            reset: self.reset,
            reset_less: self.reset_less,
            hint: self.hint,
            scope: self.scope,
        }))
    }
}
