//! LoomIR: the hardware description core shared by every loom pass.
//!
//! A design is built by constructing [`Signal`]s, combining them into
//! [`Value`] expression trees, wrapping assignments in [`Statement`]s and
//! attaching those to clock domains of a [`Module`]. Modules form a tree
//! through named or anonymous submodules and may carry [`Special`]
//! primitives (vendor [`Instance`]s and [`Memory`] arrays). State machines
//! are described with [`Fsm`] and lowered to switches; whole subtrees can
//! be rewritten with a [`Transform`].
//!
//! Nothing in this crate resolves clock domains or picks output names; that
//! work belongs to the elaboration passes, which operate on the finalized
//! tree.

#![warn(missing_docs)]

pub mod array;
pub mod domain;
pub mod error;
pub mod fsm;
pub mod module;
pub mod path;
pub mod signal;
pub mod special;
pub mod stmt;
pub mod transform;
pub mod value;

pub use array::{Array, ArrayElem};
pub use domain::ClockDomain;
pub use error::{
    Category, ConstructionError, ElabError, ErrorCode, FinalizationError, NamingConflictError,
};
pub use fsm::{Fsm, FsmBuilder};
pub use module::{FinalizeHook, Module, Submodule, COMB_DOMAIN};
pub use path::HierPath;
pub use signal::{Signal, SignalBuilder, SignalId};
pub use special::{
    Instance, InstancePort, Memory, MemoryPort, PortConfig, PortRole, Special, WriteMode,
};
pub use stmt::{Case, IfChain, Pattern, Statement};
pub use transform::Transform;
pub use value::{Const, OpKind, Shape, Value};
