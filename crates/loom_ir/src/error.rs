//! Error types raised while building and elaborating a design.
//!
//! Codes `E300`--`E322` cover construction failures, `E400`--`E404` naming
//! conflicts and `E500`--`E502` finalization failures. Every error is fatal
//! to the elaboration that raised it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The category of an [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// A hard error.
    Error,
    /// A construct that was accepted but dropped or ignored.
    Warning,
}

impl Category {
    /// Returns the single-character prefix used in formatted codes.
    pub fn prefix(self) -> char {
        match self {
            Category::Error => 'E',
            Category::Warning => 'W',
        }
    }
}

/// A stable identifier for a class of error, formatted like `E301`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode {
    /// The category of this code.
    pub category: Category,
    /// The numeric identifier within the category.
    pub number: u16,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: Category, number: u16) -> Self {
        Self { category, number }
    }

    const fn error(number: u16) -> Self {
        Self::new(Category::Error, number)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.category.prefix(), self.number)
    }
}

/// Invalid IR construction: the design described cannot exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstructionError {
    /// A slice whose normalized bounds fall outside the value.
    #[error("cannot slice bits [{start}:{end}] of a {width}-bit value")]
    SliceBounds {
        /// Requested start, as given.
        start: i64,
        /// Requested end (exclusive), as given.
        end: i64,
        /// Width of the sliced value.
        width: u32,
    },

    /// A bit index outside the value.
    #[error("bit index {index} is out of range for a {width}-bit value")]
    BitIndex {
        /// Requested index, as given.
        index: i64,
        /// Width of the indexed value.
        width: u32,
    },

    /// A replication count below one.
    #[error("replication count must be at least 1, got {count}")]
    ReplCount {
        /// The rejected count.
        count: u32,
    },

    /// A constant wider than the supported maximum.
    #[error("constant width {width} exceeds the {max}-bit limit")]
    ConstWidth {
        /// The requested width.
        width: u32,
        /// The supported maximum.
        max: u32,
    },

    /// A value wider than a width can describe.
    #[error("value width {width} exceeds the {max}-bit limit")]
    ValueWidth {
        /// The width the value would have.
        width: u64,
        /// The supported maximum.
        max: u32,
    },

    /// An operator given the wrong number of operands.
    #[error("operator `{op}` takes {expected} operand(s), got {found}")]
    OperatorArity {
        /// Operator name.
        op: String,
        /// Required operand count.
        expected: usize,
        /// Supplied operand count.
        found: usize,
    },

    /// A bit pattern whose length differs from the selector width.
    #[error("case pattern `{pattern}` has {found} bits but the selector is {expected} bits wide")]
    PatternWidth {
        /// The offending pattern.
        pattern: String,
        /// Selector width.
        expected: u32,
        /// Pattern length.
        found: usize,
    },

    /// A bit pattern containing something other than `0`, `1` or `-`.
    #[error("case pattern `{pattern}` contains `{ch}`; only `0`, `1` and `-` are allowed")]
    PatternChar {
        /// The offending pattern.
        pattern: String,
        /// The first invalid character.
        ch: char,
    },

    /// A switch with more than one default case.
    #[error("switch on {selector} has more than one default case")]
    DuplicateDefault {
        /// Rendering of the selector.
        selector: String,
    },

    /// Assignment to something that cannot be driven.
    #[error("{value} cannot be assigned to")]
    NotAnLvalue {
        /// Rendering of the rejected target.
        value: String,
    },

    /// Subscripting a value that is not an array proxy, or an array proxy
    /// whose elements are not arrays.
    #[error("{value} is not an array and cannot be indexed")]
    NotAnArray {
        /// Rendering of the indexed value.
        value: String,
    },

    /// A nested array used where a value is required.
    #[error("an array of arrays must be fully indexed before it is used as a value")]
    ArrayAsValue,

    /// Indexing an array with no elements.
    #[error("cannot index an empty array")]
    EmptyArray,

    /// A constant array index outside the array.
    #[error("array index {index} is out of range for an array of {len} elements")]
    ArrayIndex {
        /// The requested index.
        index: usize,
        /// Array length.
        len: usize,
    },

    /// Two submodules registered under the same name.
    #[error("module `{module}` already has a submodule named `{name}`")]
    DuplicateSubmodule {
        /// Kind of the parent module.
        module: String,
        /// The repeated name.
        name: String,
    },

    /// A clock domain declared twice in one module.
    #[error("module `{module}` already declares clock domain `{name}`")]
    DuplicateDomain {
        /// Kind of the declaring module.
        module: String,
        /// The repeated domain name.
        name: String,
    },

    /// A clock domain named after the combinational domain.
    #[error("`{name}` is reserved for combinational logic and cannot name a clock domain")]
    ReservedDomain {
        /// The rejected name.
        name: String,
    },

    /// A module mutated after finalization.
    #[error("module `{module}` is finalized and can no longer be modified")]
    Finalized {
        /// Kind of the finalized module.
        module: String,
    },

    /// A signal driven from two domains of the same module.
    #[error(
        "{signal} is driven from domain `{domain}` but already has drivers in `{previous}` (module `{module}`)"
    )]
    DriverConflict {
        /// Kind of the module.
        module: String,
        /// Rendering of the signal.
        signal: String,
        /// The domain of the new driver.
        domain: String,
        /// The domain of the existing drivers.
        previous: String,
    },

    /// An instance keyword argument without a recognised prefix.
    #[error("instance key `{key}` must start with `p_`, `i_`, `o_` or `io_`")]
    InstancePrefix {
        /// The rejected key.
        key: String,
    },

    /// An inout connection to an element selected at runtime.
    #[error("inout port `{port}` cannot connect to an array element selected at runtime")]
    InoutArrayRef {
        /// The port name.
        port: String,
    },

    /// An inconsistent memory or memory port description.
    #[error("memory `{memory}`: {reason}")]
    Memory {
        /// Name hint of the memory.
        memory: String,
        /// What is wrong.
        reason: String,
    },

    /// An inconsistent state machine description.
    #[error("state machine `{fsm}`: {reason}")]
    Fsm {
        /// Name of the machine.
        fsm: String,
        /// What is wrong.
        reason: String,
    },
}

impl ConstructionError {
    /// Returns the stable code of this error.
    pub fn code(&self) -> ErrorCode {
        let number = match self {
            ConstructionError::SliceBounds { .. } => 300,
            ConstructionError::BitIndex { .. } => 301,
            ConstructionError::ReplCount { .. } => 302,
            ConstructionError::ConstWidth { .. } => 303,
            ConstructionError::OperatorArity { .. } => 304,
            ConstructionError::PatternWidth { .. } => 305,
            ConstructionError::PatternChar { .. } => 306,
            ConstructionError::DuplicateDefault { .. } => 307,
            ConstructionError::NotAnLvalue { .. } => 308,
            ConstructionError::NotAnArray { .. } => 309,
            ConstructionError::ArrayAsValue => 310,
            ConstructionError::EmptyArray => 311,
            ConstructionError::ArrayIndex { .. } => 312,
            ConstructionError::DuplicateSubmodule { .. } => 313,
            ConstructionError::DuplicateDomain { .. } => 314,
            ConstructionError::ReservedDomain { .. } => 315,
            ConstructionError::Finalized { .. } => 316,
            ConstructionError::DriverConflict { .. } => 317,
            ConstructionError::InstancePrefix { .. } => 318,
            ConstructionError::Memory { .. } => 319,
            ConstructionError::InoutArrayRef { .. } => 320,
            ConstructionError::ValueWidth { .. } => 321,
            ConstructionError::Fsm { .. } => 322,
        };
        ErrorCode::error(number)
    }
}

/// Two entities compete for the same name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamingConflictError {
    /// A domain name defined by several children, at least one anonymous.
    #[error(
        "domain `{domain}` is defined by several submodules of `{module}` ({}), and anonymous submodules cannot be prefixed; name them or rename the domains explicitly",
        .contributors.join(", ")
    )]
    AnonymousDomain {
        /// Path of the parent module.
        module: String,
        /// The contested domain name.
        domain: String,
        /// Every contributor, named or `<anonymous #i>`.
        contributors: Vec<String>,
    },

    /// A domain name defined by several children sharing one name.
    #[error(
        "domain `{domain}` is defined by several submodules of `{module}` named `{name}`; prefixing cannot tell them apart"
    )]
    DuplicateContributors {
        /// Path of the parent module.
        module: String,
        /// The contested domain name.
        domain: String,
        /// The shared submodule name.
        name: String,
    },

    /// Two domains surfaced by children end up with the same name.
    #[error("submodules `{first}` and `{second}` of `{module}` both surface domain `{domain}`")]
    SurfacedDomain {
        /// Path of the parent module.
        module: String,
        /// The colliding name after prefixing.
        domain: String,
        /// First contributor.
        first: String,
        /// Second contributor.
        second: String,
    },

    /// A domain surfaced by a child collides with one the parent declares.
    #[error("domain `{domain}` surfaced by submodule `{submodule}` collides with a domain declared in `{module}`")]
    ShadowedDomain {
        /// Path of the parent module.
        module: String,
        /// Contributing submodule.
        submodule: String,
        /// The colliding name.
        domain: String,
    },

    /// No unique identifier could be found for a signal.
    #[error("no unique identifier for {signal}: `{candidate}` is already taken and numeric suffixes are disabled")]
    Identifier {
        /// Rendering of the signal.
        signal: String,
        /// The last candidate tried.
        candidate: String,
    },
}

impl NamingConflictError {
    /// Returns the stable code of this error.
    pub fn code(&self) -> ErrorCode {
        let number = match self {
            NamingConflictError::AnonymousDomain { .. } => 400,
            NamingConflictError::DuplicateContributors { .. } => 401,
            NamingConflictError::SurfacedDomain { .. } => 402,
            NamingConflictError::ShadowedDomain { .. } => 403,
            NamingConflictError::Identifier { .. } => 404,
        };
        ErrorCode::error(number)
    }
}

/// The finalization fixpoint failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FinalizationError {
    /// A hook kept adding submodules past the round cap.
    #[error("finalization of `{module}` did not reach a fixpoint: its hook was still adding submodules after {rounds} rounds")]
    RoundLimit {
        /// Path of the module whose hook did not settle.
        module: String,
        /// The configured cap.
        rounds: usize,
    },

    /// A pass that needs a closed tree was handed an open one.
    #[error("module `{module}` must be finalized first")]
    NotFinalized {
        /// Path of the offending module.
        module: String,
    },

    /// Statements, clock or reset references, or a memory port use a
    /// domain that no visible module declares.
    #[error("module `{module}` uses clock domain `{domain}`, which is not declared")]
    UndefinedDomain {
        /// Path of the module using the domain.
        module: String,
        /// The undeclared domain.
        domain: String,
    },
}

impl FinalizationError {
    /// Returns the stable code of this error.
    pub fn code(&self) -> ErrorCode {
        let number = match self {
            FinalizationError::RoundLimit { .. } => 500,
            FinalizationError::NotFinalized { .. } => 501,
            FinalizationError::UndefinedDomain { .. } => 502,
        };
        ErrorCode::error(number)
    }
}

/// Any failure of the elaboration pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ElabError {
    /// Invalid IR construction.
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    /// A name could not be made unique.
    #[error(transparent)]
    Naming(#[from] NamingConflictError),

    /// The finalization fixpoint failed.
    #[error(transparent)]
    Finalization(#[from] FinalizationError),
}

impl ElabError {
    /// Returns the stable code of the underlying error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ElabError::Construction(e) => e.code(),
            ElabError::Naming(e) => e.code(),
            ElabError::Finalization(e) => e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_display_format() {
        assert_eq!(ErrorCode::new(Category::Error, 301).to_string(), "E301");
        assert_eq!(ErrorCode::new(Category::Warning, 7).to_string(), "W007");
    }

    #[test]
    fn codes_are_grouped_by_kind() {
        let construction = ConstructionError::EmptyArray;
        let naming = NamingConflictError::Identifier {
            signal: "(sig x)".into(),
            candidate: "x".into(),
        };
        let finalization = FinalizationError::NotFinalized {
            module: "top".into(),
        };
        assert_eq!(construction.code().number / 100, 3);
        assert_eq!(naming.code().number / 100, 4);
        assert_eq!(finalization.code().number / 100, 5);
    }

    #[test]
    fn umbrella_converts_and_keeps_code() {
        let err: ElabError = ConstructionError::ReplCount { count: 0 }.into();
        assert_eq!(err.code().to_string(), "E302");
        assert_eq!(
            err.to_string(),
            "replication count must be at least 1, got 0"
        );
    }

    #[test]
    fn anonymous_domain_lists_contributors() {
        let err = NamingConflictError::AnonymousDomain {
            module: "top".into(),
            domain: "pix".into(),
            contributors: vec!["a".into(), "<anonymous #1>".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("`pix`"));
        assert!(msg.contains("a, <anonymous #1>"));
    }

    #[test]
    fn code_serde_roundtrip() {
        let code = ConstructionError::EmptyArray.code();
        let json = serde_json::to_string(&code).unwrap();
        let back: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(code, back);
    }
}
