//! Elaboration passes over LoomIR module trees.
//!
//! Takes a tree built with `loom_ir` and turns it into a [`Design`] ready
//! for a [`Backend`]:
//!
//! 1. [`finalize`] runs deferred-construction hooks to a fixpoint and
//!    resolves clock domain names bottom-up.
//! 2. [`lower_arrays`] rewrites runtime array accesses into multiplexers
//!    and switches.
//! 3. [`resolve_names`] gives every signal a unique identifier.
//!
//! [`lower`] runs all three. The [`eval`] module holds the reference
//! semantics backends are checked against.
//!
//! # Usage
//!
//! ```ignore
//! let design = loom_elaborate::lower(top, &ElabConfig::default())?;
//! let netlist = my_backend.emit(&design)?;
//! ```

#![warn(missing_docs)]

pub mod design;
mod domains;
pub mod eval;
pub mod finalize;
pub mod lower;
pub mod names;

pub use design::{Backend, Design};
pub use finalize::finalize;
pub use lower::{lower_arrays, LowerStats};
pub use names::{resolve_names, NameMap};

use log::debug;
use loom_config::ElabConfig;
use loom_ir::{ElabError, Module};

/// Finalizes, lowers and names `top`.
///
/// Any error aborts the whole run; no partially elaborated design is
/// returned.
pub fn lower(mut top: Module, config: &ElabConfig) -> Result<Design, ElabError> {
    debug!("elaborating `{}`", top.kind());
    finalize(&mut top, config)?;
    lower_arrays(&mut top)?;
    let names = resolve_names(&top, &config.naming)?;
    Ok(Design::new(top, names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_ir::{Array, ClockDomain, Signal};

    #[test]
    fn pipeline_produces_named_lowered_design() {
        let _ = env_logger::builder().is_test(true).try_init();
        let elems: Vec<Signal> = (0..4).map(|i| Signal::named(format!("e{i}"), 8)).collect();
        let idx = Signal::named("idx", 2);
        let out = Signal::named("out", 8);
        let mut top = Module::new("Top");
        top.add_domain(ClockDomain::new("sync")).unwrap();
        top.sync(
            "sync",
            [out.value().assign(Array::new(&elems).index(&idx).unwrap()).unwrap()],
        )
        .unwrap();

        let design = lower(top, &ElabConfig::default()).unwrap();
        assert!(design.top().is_finalized());
        assert!(design.top().blocks().all(|(_, stmts)| stmts
            .iter()
            .all(|s| {
                let mut clean = true;
                s.visit_values(&mut |v| clean &= !v.contains_array_ref());
                clean
            })));
        assert_eq!(design.names().get(&out), Some("out"));
        assert_eq!(design.names().get(&elems[3]), Some("e3"));
        assert_eq!(design.domains()[0].name(), "sync");
    }

    #[test]
    fn failures_yield_no_design() {
        let mut top = Module::new("Top");
        top.add_named_submodule("a", {
            let mut m = Module::new("A");
            m.add_domain(ClockDomain::new("pix")).unwrap();
            m
        })
        .unwrap();
        top.add_submodule({
            let mut m = Module::new("B");
            m.add_domain(ClockDomain::new("pix")).unwrap();
            m
        })
        .unwrap();
        let err = lower(top, &ElabConfig::default()).unwrap_err();
        assert_eq!(err.code().to_string(), "E400");
    }
}
