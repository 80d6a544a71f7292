//! The artifact handed to backends.

use crate::names::NameMap;
use loom_ir::{ClockDomain, HierPath, Module};

/// A finalized, lowered module tree with every signal named.
///
/// Only a fully successful pipeline run produces a `Design`; backends never
/// see partial results.
#[derive(Debug)]
pub struct Design {
    top: Module,
    names: NameMap,
}

impl Design {
    pub(crate) fn new(top: Module, names: NameMap) -> Self {
        Self { top, names }
    }

    /// Returns the root module.
    pub fn top(&self) -> &Module {
        &self.top
    }

    /// Returns the identifier of every signal.
    pub fn names(&self) -> &NameMap {
        &self.names
    }

    /// Returns the clock domains visible at the root, after renaming.
    pub fn domains(&self) -> &[ClockDomain] {
        self.top.domains()
    }

    /// Returns every module with its hierarchy path, parents before
    /// children.
    pub fn modules(&self) -> Vec<(HierPath, &Module)> {
        let mut out = Vec::new();
        collect_modules(&self.top, HierPath::root(self.top.kind()), &mut out);
        out
    }

    /// Consumes the design, returning the root module.
    pub fn into_top(self) -> Module {
        self.top
    }
}

fn collect_modules<'a>(module: &'a Module, path: HierPath, out: &mut Vec<(HierPath, &'a Module)>) {
    let children: Vec<(HierPath, &'a Module)> = module
        .submodules()
        .iter()
        .map(|sub| (path.child(sub.component()), &sub.module))
        .collect();
    out.push((path, module));
    for (child_path, child) in children {
        collect_modules(child, child_path, out);
    }
}

/// Turns a [`Design`] into some output: a netlist, a text rendering, a
/// simulation model.
///
/// An implementation must give every signal a default equal to its reset
/// value and apply the driving statements on top of it, so no signal ever
/// holds state it was not explicitly given. Memory ports must follow their
/// configured write mode.
pub trait Backend {
    /// What the backend produces.
    type Output;
    /// Why emission failed.
    type Error: std::error::Error;

    /// Emits `design`.
    fn emit(&mut self, design: &Design) -> Result<Self::Output, Self::Error>;
}
