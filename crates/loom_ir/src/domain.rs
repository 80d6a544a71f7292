//! Clock domains.

use crate::signal::Signal;
use serde::Serialize;

/// A named clock domain with its clock and optional reset signal.
///
/// Domains declared in a module are visible to its whole subtree and, unless
/// local, are surfaced to the enclosing modules after finalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClockDomain {
    name: String,
    clk: Signal,
    rst: Option<Signal>,
    async_reset: bool,
    local: bool,
}

impl ClockDomain {
    /// Creates a domain with fresh clock and reset signals.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let clk = Signal::named(signal_hint(&name, "clk"), 1);
        let rst = Signal::named(signal_hint(&name, "rst"), 1);
        Self {
            name,
            clk,
            rst: Some(rst),
            async_reset: false,
            local: false,
        }
    }

    /// Creates a domain without a reset signal.
    pub fn reset_less(name: impl Into<String>) -> Self {
        let name = name.into();
        let clk = Signal::named(signal_hint(&name, "clk"), 1);
        Self {
            name,
            clk,
            rst: None,
            async_reset: false,
            local: false,
        }
    }

    /// Creates a domain driven by existing signals.
    pub fn with_signals(name: impl Into<String>, clk: Signal, rst: Option<Signal>) -> Self {
        Self {
            name: name.into(),
            clk,
            rst,
            async_reset: false,
            local: false,
        }
    }

    /// Marks the reset as asynchronous.
    pub fn async_reset(mut self) -> Self {
        self.async_reset = true;
        self
    }

    /// Keeps the domain private to the declaring module's subtree.
    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    /// Returns the current name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the clock signal.
    pub fn clk(&self) -> &Signal {
        &self.clk
    }

    /// Returns the reset signal, if the domain has one.
    pub fn rst(&self) -> Option<&Signal> {
        self.rst.as_ref()
    }

    /// Returns whether the reset is asynchronous.
    pub fn is_async_reset(&self) -> bool {
        self.async_reset
    }

    /// Returns whether the domain stays inside its declaring subtree.
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Renames the domain. The clock and reset signals keep their identity
    /// and take hints derived from the new name.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.clk = self.clk.renamed(signal_hint(&self.name, "clk"));
        if let Some(rst) = &self.rst {
            self.rst = Some(rst.renamed(signal_hint(&self.name, "rst")));
        }
    }
}

fn signal_hint(domain: &str, suffix: &str) -> String {
    if domain == "sync" {
        suffix.to_string()
    } else {
        format!("{domain}_{suffix}")
    }
}
