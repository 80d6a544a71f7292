//! Conformance test helpers for the loom elaboration core.
//!
//! Provides the pipeline entry points integration tests share, a small
//! [`Backend`] that summarizes a design, and inspection helpers for
//! lowered expression trees.

#![warn(missing_docs)]

use loom_config::{load_config_from_str, ConfigError, ElabConfig};
use loom_elaborate::eval::{settle_module, EvalError, State};
use loom_elaborate::{lower, Backend, Design};
use loom_ir::{ElabError, Module, OpKind, Special, Value};

/// Parses an inline `loom.toml` document.
pub fn make_config(toml: &str) -> Result<ElabConfig, ConfigError> {
    load_config_from_str(toml)
}

/// Runs the whole pipeline with the default configuration.
pub fn full_pipeline(top: Module) -> Result<Design, ElabError> {
    lower(top, &ElabConfig::default())
}

/// Runs the whole pipeline and settles the root module's combinational
/// logic against `inputs`.
pub fn pipeline_and_settle(top: Module, inputs: &State) -> Result<State, PipelineError> {
    let design = full_pipeline(top)?;
    Ok(settle_module(design.top(), inputs)?)
}

/// A failure of [`pipeline_and_settle`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Elaboration failed.
    #[error(transparent)]
    Elab(#[from] ElabError),
    /// Evaluation failed.
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// What [`SummaryBackend`] reports about a design.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignSummary {
    /// Hierarchy path of every module, parents first.
    pub modules: Vec<String>,
    /// Visible clock domain names at the root.
    pub domains: Vec<String>,
    /// Identifier of every signal, in naming order.
    pub identifiers: Vec<String>,
    /// Statements across the tree, counted at the top level of each block.
    pub statements: usize,
    /// Instances and memories across the tree.
    pub specials: usize,
}

/// Raised when a design breaks the backend contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SummaryError {
    /// A lowered design still holds an array access.
    #[error("module `{module}` still contains an array access")]
    UnloweredArray {
        /// Path of the module.
        module: String,
    },
    /// A signal reached the backend without an identifier.
    #[error("signal {signal} in `{module}` has no identifier")]
    Unnamed {
        /// Rendering of the signal.
        signal: String,
        /// Path of the module.
        module: String,
    },
}

/// A backend that checks the contract and tallies what it was given.
#[derive(Debug, Default)]
pub struct SummaryBackend {
    emitted: usize,
}

impl SummaryBackend {
    /// Returns how many designs were emitted successfully.
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl Backend for SummaryBackend {
    type Output = DesignSummary;
    type Error = SummaryError;

    fn emit(&mut self, design: &Design) -> Result<DesignSummary, SummaryError> {
        let mut summary = DesignSummary {
            modules: Vec::new(),
            domains: design.domains().iter().map(|d| d.name().to_string()).collect(),
            identifiers: design.names().iter().map(|(_, n)| n.to_string()).collect(),
            statements: 0,
            specials: 0,
        };
        for (path, module) in design.modules() {
            let mut values = Vec::new();
            for (_, block) in module.blocks() {
                summary.statements += block.len();
                for stmt in block {
                    stmt.visit_values(&mut |v| values.push(v.clone()));
                }
            }
            for special in module.specials() {
                if let Special::Instance(inst) = special {
                    values.extend(inst.ports().iter().map(|p| p.value.clone()));
                }
            }
            summary.specials += module.specials().len();
            if values.iter().any(Value::contains_array_ref) {
                return Err(SummaryError::UnloweredArray {
                    module: path.to_string(),
                });
            }
            let mut unnamed = None;
            let mut check = |s: &loom_ir::Signal| {
                if unnamed.is_none() && design.names().get(s).is_none() {
                    unnamed = Some(s.to_string());
                }
            };
            for v in &values {
                v.visit_signals(&mut check);
            }
            for special in module.specials() {
                special.visit_signals(&mut check);
            }
            if let Some(signal) = unnamed {
                return Err(SummaryError::Unnamed {
                    signal,
                    module: path.to_string(),
                });
            }
            summary.modules.push(path.to_string());
        }
        self.emitted += 1;
        Ok(summary)
    }
}

/// Shape statistics of an expression tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Multiplexer nodes.
    pub muxes: usize,
    /// Equality comparisons.
    pub guards: usize,
    /// Data inputs of multiplexers that are not multiplexers themselves.
    pub leaves: usize,
    /// Remaining array accesses.
    pub array_refs: usize,
}

/// Measures `value`.
pub fn tree_stats(value: &Value) -> TreeStats {
    let mut stats = TreeStats::default();
    measure(value, &mut stats);
    if stats.muxes == 0 && stats.array_refs == 0 {
        stats.leaves = 1;
    }
    stats
}

fn measure(value: &Value, stats: &mut TreeStats) {
    match value {
        Value::Operator {
            op: OpKind::Mux,
            operands,
        } => {
            stats.muxes += 1;
            let Some((sel, data_inputs)) = operands.split_first() else {
                return;
            };
            measure(sel, stats);
            for data in data_inputs {
                if !is_mux(data) {
                    stats.leaves += 1;
                }
                measure(data, stats);
            }
        }
        Value::Operator { op, operands } => {
            if *op == OpKind::Eq {
                stats.guards += 1;
            }
            for v in operands {
                measure(v, stats);
            }
        }
        Value::Slice { value, .. } | Value::Repl { value, .. } => measure(value, stats),
        Value::Concat(parts) => {
            for v in parts {
                measure(v, stats);
            }
        }
        Value::ArrayRef { index, .. } => {
            stats.array_refs += 1;
            measure(index, stats);
        }
        Value::Const(_) | Value::Signal(_) | Value::ClockSignal(_) | Value::ResetSignal(_) => {}
    }
}

fn is_mux(value: &Value) -> bool {
    matches!(
        value,
        Value::Operator {
            op: OpKind::Mux,
            ..
        }
    )
}
