//! The module tree.
//!
//! A [`Module`] accumulates statements per clock domain, owns its
//! submodules and special primitives, and declares clock domains. Modules
//! are open while being built and become finalized exactly once; a
//! finalized module rejects further changes.

use crate::domain::ClockDomain;
use crate::error::{ConstructionError, ElabError};
use crate::fsm::Fsm;
use crate::path::HierPath;
use crate::signal::{Signal, SignalId};
use crate::special::Special;
use crate::stmt::Statement;
use crate::transform::Transform;
use crate::value::Value;
use loom_common::{ContentHash, FingerprintError};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// The synthetic domain holding combinational statements.
pub const COMB_DOMAIN: &str = "comb";

/// Deferred construction run during finalization.
///
/// The hook is called once per finalization round and may add statements,
/// submodules, specials and domains to the module. Rounds repeat while the
/// previous round added submodules.
pub trait FinalizeHook {
    /// Runs one round of deferred construction on `module`.
    fn build(&mut self, module: &mut Module) -> Result<(), ElabError>;
}

impl<F> FinalizeHook for F
where
    F: FnMut(&mut Module) -> Result<(), ElabError>,
{
    fn build(&mut self, module: &mut Module) -> Result<(), ElabError> {
        self(module)
    }
}

/// A child module, optionally named.
#[derive(Debug, Serialize)]
pub struct Submodule {
    /// The name, unique among named siblings. Anonymous submodules are
    /// identified by position.
    pub name: Option<String>,
    /// The child module.
    pub module: Module,
}

impl Submodule {
    /// The hierarchy component this child contributes: its name, or its
    /// module kind when anonymous.
    pub fn component(&self) -> &str {
        self.name.as_deref().unwrap_or(self.module.kind())
    }
}

/// A node of the design hierarchy.
#[derive(Serialize)]
pub struct Module {
    kind: String,
    statements: Vec<(String, Vec<Statement>)>,
    submodules: Vec<Submodule>,
    specials: Vec<Special>,
    clock_domains: Vec<ClockDomain>,
    resolved_domains: Vec<ClockDomain>,
    finalized: bool,
    #[serde(skip)]
    drivers: HashMap<SignalId, String>,
    #[serde(skip)]
    hook: Option<Box<dyn FinalizeHook>>,
    #[serde(skip)]
    transforms: Vec<Transform>,
}

impl Module {
    /// Creates an empty, open module. `kind` names the module type and is
    /// used as the hierarchy component of anonymous instances.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            statements: Vec::new(),
            submodules: Vec::new(),
            specials: Vec::new(),
            clock_domains: Vec::new(),
            resolved_domains: Vec::new(),
            finalized: false,
            drivers: HashMap::new(),
            hook: None,
            transforms: Vec::new(),
        }
    }

    /// Returns the module kind.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns whether finalization has completed.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn ensure_open(&self) -> Result<(), ConstructionError> {
        if self.finalized {
            return Err(ConstructionError::Finalized {
                module: self.kind.clone(),
            });
        }
        Ok(())
    }

    /// Appends combinational statements.
    pub fn comb(
        &mut self,
        statements: impl IntoIterator<Item = Statement>,
    ) -> Result<(), ConstructionError> {
        self.add_statements(COMB_DOMAIN, statements)
    }

    /// Appends statements clocked by `domain`.
    pub fn sync(
        &mut self,
        domain: &str,
        statements: impl IntoIterator<Item = Statement>,
    ) -> Result<(), ConstructionError> {
        self.add_statements(domain, statements)
    }

    /// Appends statements to `domain`, checking that no signal they drive
    /// already has drivers in another domain of this module.
    pub fn add_statements(
        &mut self,
        domain: &str,
        statements: impl IntoIterator<Item = Statement>,
    ) -> Result<(), ConstructionError> {
        self.ensure_open()?;
        let statements: Vec<Statement> = statements.into_iter().collect();
        let mut driven: Vec<Signal> = Vec::new();
        for stmt in &statements {
            stmt.lhs_signals(&mut driven);
        }
        for signal in &driven {
            if let Some(previous) = self.drivers.get(&signal.id()) {
                if previous != domain {
                    return Err(ConstructionError::DriverConflict {
                        module: self.kind.clone(),
                        signal: signal.to_string(),
                        domain: domain.to_string(),
                        previous: previous.clone(),
                    });
                }
            }
        }
        for signal in &driven {
            self.drivers.insert(signal.id(), domain.to_string());
        }
        self.block_mut(domain).extend(statements);
        Ok(())
    }

    /// Adds the switches of a state machine to the domains it has bodies
    /// in.
    pub fn add_fsm(&mut self, fsm: Fsm) -> Result<(), ConstructionError> {
        self.ensure_open()?;
        for (domain, switch) in fsm.into_statements()? {
            self.add_statements(&domain, [switch])?;
        }
        Ok(())
    }

    /// Returns the statement list of `domain`, creating it at the end of
    /// the domain order if absent. Does not check the open state.
    pub fn block_mut(&mut self, domain: &str) -> &mut Vec<Statement> {
        let pos = match self.statements.iter().position(|(d, _)| d == domain) {
            Some(pos) => pos,
            None => {
                self.statements.push((domain.to_string(), Vec::new()));
                self.statements.len() - 1
            }
        };
        &mut self.statements[pos].1
    }

    /// Returns the statements of `domain`, empty if it has none.
    pub fn statements(&self, domain: &str) -> &[Statement] {
        self.statements
            .iter()
            .find(|(d, _)| d == domain)
            .map(|(_, s)| s.as_slice())
            .unwrap_or(&[])
    }

    /// Returns every domain's statements in domain insertion order.
    pub fn blocks(&self) -> impl Iterator<Item = (&str, &[Statement])> {
        self.statements
            .iter()
            .map(|(d, s)| (d.as_str(), s.as_slice()))
    }

    /// Returns every domain's statements for rewriting by elaboration
    /// passes.
    pub fn blocks_mut(&mut self) -> impl Iterator<Item = (&str, &mut Vec<Statement>)> {
        self.statements
            .iter_mut()
            .map(|(d, s)| (d.as_str(), s))
    }

    /// Adds an anonymous submodule.
    pub fn add_submodule(&mut self, module: Module) -> Result<(), ConstructionError> {
        self.ensure_open()?;
        self.submodules.push(Submodule { name: None, module });
        Ok(())
    }

    /// Adds a submodule under a name unique among its named siblings.
    pub fn add_named_submodule(
        &mut self,
        name: impl Into<String>,
        module: Module,
    ) -> Result<(), ConstructionError> {
        self.ensure_open()?;
        let name = name.into();
        if self.submodule(&name).is_some() {
            return Err(ConstructionError::DuplicateSubmodule {
                module: self.kind.clone(),
                name,
            });
        }
        self.submodules.push(Submodule {
            name: Some(name),
            module,
        });
        Ok(())
    }

    /// Looks up a named submodule.
    pub fn submodule(&self, name: &str) -> Option<&Module> {
        self.submodules
            .iter()
            .find(|s| s.name.as_deref() == Some(name))
            .map(|s| &s.module)
    }

    /// Looks up a named submodule for modification.
    pub fn submodule_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.submodules
            .iter_mut()
            .find(|s| s.name.as_deref() == Some(name))
            .map(|s| &mut s.module)
    }

    /// Returns the submodules in insertion order.
    pub fn submodules(&self) -> &[Submodule] {
        &self.submodules
    }

    /// Returns the submodules for rewriting by elaboration passes.
    pub fn submodules_mut(&mut self) -> &mut [Submodule] {
        &mut self.submodules
    }

    /// Adds a special primitive.
    pub fn add_special(&mut self, special: impl Into<Special>) -> Result<(), ConstructionError> {
        self.ensure_open()?;
        self.specials.push(special.into());
        Ok(())
    }

    /// Returns the specials in insertion order.
    pub fn specials(&self) -> &[Special] {
        &self.specials
    }

    /// Returns the specials for rewriting by elaboration passes.
    pub fn specials_mut(&mut self) -> &mut [Special] {
        &mut self.specials
    }

    /// Declares a clock domain. Names are unique within a module and may
    /// not be the combinational domain's.
    pub fn add_domain(&mut self, domain: ClockDomain) -> Result<(), ConstructionError> {
        self.ensure_open()?;
        if domain.name() == COMB_DOMAIN {
            return Err(ConstructionError::ReservedDomain {
                name: domain.name().to_string(),
            });
        }
        if self.clock_domains.iter().any(|d| d.name() == domain.name()) {
            return Err(ConstructionError::DuplicateDomain {
                module: self.kind.clone(),
                name: domain.name().to_string(),
            });
        }
        self.clock_domains.push(domain);
        Ok(())
    }

    /// Returns the domains declared directly in this module.
    pub fn clock_domains(&self) -> &[ClockDomain] {
        &self.clock_domains
    }

    /// Returns the domains visible from this module after finalization:
    /// its own followed by those surfaced by its submodules.
    pub fn domains(&self) -> &[ClockDomain] {
        &self.resolved_domains
    }

    /// Records the resolved domain list. Used by finalization.
    pub fn set_domains(&mut self, domains: Vec<ClockDomain>) {
        self.resolved_domains = domains;
    }

    /// Installs the deferred-construction hook run during finalization.
    pub fn set_hook(&mut self, hook: impl FinalizeHook + 'static) -> Result<(), ConstructionError> {
        self.ensure_open()?;
        self.hook = Some(Box::new(hook));
        Ok(())
    }

    /// Installs a closure as the deferred-construction hook.
    pub fn on_finalize<F>(&mut self, hook: F) -> Result<(), ConstructionError>
    where
        F: FnMut(&mut Module) -> Result<(), ElabError> + 'static,
    {
        self.set_hook(hook)
    }

    /// Records a transform of this subtree, applied during finalization
    /// once the hook has finished.
    pub fn transform(&mut self, transform: Transform) -> Result<(), ConstructionError> {
        self.ensure_open()?;
        transform.validate()?;
        self.transforms.push(transform);
        Ok(())
    }

    /// Removes the recorded transforms so they can be applied.
    pub fn take_transforms(&mut self) -> Vec<Transform> {
        std::mem::take(&mut self.transforms)
    }

    /// Removes the hook so it can be run against this module.
    pub fn take_hook(&mut self) -> Option<Box<dyn FinalizeHook>> {
        self.hook.take()
    }

    /// Puts back a hook removed by [`Module::take_hook`].
    pub fn restore_hook(&mut self, hook: Box<dyn FinalizeHook>) {
        self.hook = Some(hook);
    }

    /// Marks the module finalized. Used by finalization once the whole
    /// subtree is closed.
    pub fn mark_finalized(&mut self) {
        self.finalized = true;
    }

    /// Assigns `default` to every memory port of this module that names no
    /// clock domain.
    pub fn resolve_memory_domains(&mut self, default: &str) {
        for special in &mut self.specials {
            if let Special::Memory(mem) = special {
                for port in mem.ports_mut() {
                    if port.clock_domain().is_none() {
                        port.set_clock_domain(default);
                    }
                }
            }
        }
    }

    /// Renames clock domain `from` to `to` throughout this subtree:
    /// declarations, statement blocks, clock and reset references, and
    /// memory port clocking.
    pub fn rename_domain(&mut self, from: &str, to: &str) {
        for domain in self
            .clock_domains
            .iter_mut()
            .chain(self.resolved_domains.iter_mut())
        {
            if domain.name() == from {
                domain.rename(to);
            }
        }

        if let Some(pos) = self.statements.iter().position(|(d, _)| d == from) {
            if self.statements.iter().any(|(d, _)| d == to) {
                let (_, moved) = self.statements.remove(pos);
                self.block_mut(to).extend(moved);
            } else {
                self.statements[pos].0 = to.to_string();
            }
        }
        let mut rename = |value: &Value| {
            value.map_bottom_up(&mut |node| match node {
                Value::ClockSignal(d) if d == from => Value::ClockSignal(to.to_string()),
                Value::ResetSignal(d) if d == from => Value::ResetSignal(to.to_string()),
                other => other,
            })
        };
        for (_, block) in &mut self.statements {
            for stmt in block.iter_mut() {
                *stmt = stmt.map_values(&mut rename);
            }
        }

        for special in &mut self.specials {
            match special {
                Special::Instance(inst) => {
                    for port in inst.ports_mut() {
                        port.value = rename(&port.value);
                    }
                }
                Special::Memory(mem) => {
                    for port in mem.ports_mut() {
                        if port.clock_domain() == Some(from) {
                            port.set_clock_domain(to);
                        }
                    }
                }
            }
        }
        for domain in self.drivers.values_mut() {
            if domain == from {
                *domain = to.to_string();
            }
        }
        for sub in &mut self.submodules {
            sub.module.rename_domain(from, to);
        }
    }

    /// Visits this module and its descendants depth first, parents before
    /// children, with the hierarchy path of each.
    pub fn walk(&self, path: &HierPath, f: &mut impl FnMut(&HierPath, &Module)) {
        f(path, self);
        for sub in &self.submodules {
            sub.module.walk(&path.child(sub.component()), f);
        }
    }

    /// Computes a structural fingerprint of the subtree.
    pub fn fingerprint(&self) -> Result<ContentHash, FingerprintError> {
        ContentHash::of(self)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("kind", &self.kind)
            .field("statements", &self.statements)
            .field("submodules", &self.submodules)
            .field("specials", &self.specials)
            .field("clock_domains", &self.clock_domains)
            .field("finalized", &self.finalized)
            .field("has_hook", &self.hook.is_some())
            .field("transforms", &self.transforms)
            .finish_non_exhaustive()
    }
}
