//! Rewrites applied to a whole module subtree.
//!
//! Transforms are recorded on a module with [`Module::transform`] and run
//! during finalization, after the module's deferred construction has
//! finished and before its clock domains are resolved, so they also cover
//! statements and submodules added by finalization hooks. Recorded
//! transforms run in the order they were added.

use crate::error::ConstructionError;
use crate::module::{Module, COMB_DOMAIN};
use crate::path::HierPath;
use crate::signal::{Signal, SignalId};
use crate::stmt::Statement;
use crate::value::Value;
use std::collections::HashSet;

/// A rewrite of a module and its descendants.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    /// Renames clock domains throughout the subtree, pair by pair in the
    /// given order: declarations, statement blocks, clock and reset
    /// references, and memory port clocking.
    RenameDomains(Vec<(String, String)>),
    /// Returns every signal driven in `domain` to its reset value while
    /// `control` is non-zero. Reset-less signals are left alone.
    InsertReset {
        /// The affected domain.
        domain: String,
        /// The synchronous reset condition.
        control: Value,
    },
    /// Holds every signal driven in `domain` while `control` is zero.
    InsertEnable {
        /// The affected domain.
        domain: String,
        /// The clock enable.
        control: Value,
    },
}

impl Transform {
    /// Renames domain `from` to `to`.
    pub fn rename_domain(from: impl Into<String>, to: impl Into<String>) -> Self {
        Transform::RenameDomains(vec![(from.into(), to.into())])
    }

    /// Renames several domains, one pair after another.
    pub fn rename_domains<I, F, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (F, T)>,
        F: Into<String>,
        T: Into<String>,
    {
        Transform::RenameDomains(
            pairs
                .into_iter()
                .map(|(f, t)| (f.into(), t.into()))
                .collect(),
        )
    }

    /// Adds a synchronous reset controlled by `control` to `domain`.
    pub fn reset(domain: impl Into<String>, control: impl Into<Value>) -> Self {
        Transform::InsertReset {
            domain: domain.into(),
            control: control.into(),
        }
    }

    /// Adds a clock enable controlled by `control` to `domain`.
    pub fn enable(domain: impl Into<String>, control: impl Into<Value>) -> Self {
        Transform::InsertEnable {
            domain: domain.into(),
            control: control.into(),
        }
    }

    /// Checks the parts of the transform that do not depend on the module.
    pub fn validate(&self) -> Result<(), ConstructionError> {
        match self {
            Transform::RenameDomains(pairs) => {
                for (from, to) in pairs {
                    if from == COMB_DOMAIN || to == COMB_DOMAIN {
                        return Err(ConstructionError::ReservedDomain {
                            name: COMB_DOMAIN.to_string(),
                        });
                    }
                }
                Ok(())
            }
            Transform::InsertReset { domain, control }
            | Transform::InsertEnable { domain, control } => {
                if domain == COMB_DOMAIN {
                    return Err(ConstructionError::ReservedDomain {
                        name: domain.clone(),
                    });
                }
                control.check_complete()
            }
        }
    }

    /// Applies the transform to `module` and its descendants.
    pub fn apply(&self, module: &mut Module) -> Result<(), ConstructionError> {
        self.validate()?;
        match self {
            Transform::RenameDomains(pairs) => {
                for (from, to) in pairs {
                    if from == to {
                        continue;
                    }
                    check_rename(module, from, to)?;
                    module.rename_domain(from, to);
                }
                Ok(())
            }
            Transform::InsertReset { domain, control } => {
                insert_control(module, domain, &|driven: &[Signal]| {
                    let mut resets = Vec::new();
                    for signal in driven.iter().filter(|s| !s.reset_less()) {
                        let reset = Value::constant(signal.reset(), signal.shape())?;
                        resets.push(Statement::assign(signal, reset)?);
                    }
                    if resets.is_empty() {
                        return Ok(None);
                    }
                    Ok(Some(Statement::If {
                        cond: control.clone(),
                        then: resets,
                        otherwise: None,
                    }))
                })
            }
            Transform::InsertEnable { domain, control } => {
                insert_control(module, domain, &|driven: &[Signal]| {
                    let holds = driven
                        .iter()
                        .map(|s| Statement::assign(s, s))
                        .collect::<Result<Vec<_>, _>>()?;
                    if holds.is_empty() {
                        return Ok(None);
                    }
                    Ok(Some(Statement::If {
                        cond: control.clone(),
                        then: Vec::new(),
                        otherwise: Some(holds),
                    }))
                })
            }
        }
    }
}

fn check_rename(module: &Module, from: &str, to: &str) -> Result<(), ConstructionError> {
    let mut clash = None;
    module.walk(&HierPath::root(module.kind()), &mut |_, m| {
        let declares = |name: &str| m.clock_domains().iter().any(|d| d.name() == name);
        if clash.is_none() && declares(from) && declares(to) {
            clash = Some(m.kind().to_string());
        }
    });
    match clash {
        Some(module) => Err(ConstructionError::DuplicateDomain {
            module,
            name: to.to_string(),
        }),
        None => Ok(()),
    }
}

/// Appends the statement built from the signals each module drives in
/// `domain` to that module's block, throughout the subtree. The appended
/// statement comes last, so it takes priority over earlier assignments.
fn insert_control(
    module: &mut Module,
    domain: &str,
    build: &impl Fn(&[Signal]) -> Result<Option<Statement>, ConstructionError>,
) -> Result<(), ConstructionError> {
    let mut driven = Vec::new();
    for stmt in module.statements(domain) {
        stmt.lhs_signals(&mut driven);
    }
    let mut seen: HashSet<SignalId> = HashSet::new();
    driven.retain(|s| seen.insert(s.id()));
    if let Some(stmt) = build(&driven)? {
        module.block_mut(domain).push(stmt);
    }
    for sub in module.submodules_mut() {
        insert_control(&mut sub.module, domain, build)?;
    }
    Ok(())
}
