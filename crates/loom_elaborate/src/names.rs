//! Output identifier assignment.
//!
//! Every distinct signal of a finalized tree receives one identifier. The
//! resolver tries, in order: the signal's hint alone; the hint prefixed by
//! the enclosing hierarchy, one component at a time from the innermost
//! outwards; and finally the most prefixed candidate with a numeric suffix.
//! Signals are named in the order they are first encountered, so the
//! result is deterministic for a given tree.

use log::{debug, trace};
use loom_config::NamingConfig;
use loom_ir::{
    ElabError, FinalizationError, HierPath, Module, NamingConflictError, Signal, SignalId,
};
use std::collections::{HashMap, HashSet};

/// The identifier assigned to each signal, with reverse lookup.
#[derive(Debug, Clone, Default)]
pub struct NameMap {
    names: HashMap<SignalId, String>,
    signals: HashMap<String, SignalId>,
    order: Vec<SignalId>,
}

impl NameMap {
    /// Returns the identifier of `signal`, if it appears in the design.
    pub fn get(&self, signal: &Signal) -> Option<&str> {
        self.get_id(signal.id())
    }

    /// Returns the identifier of the signal with identity `id`.
    pub fn get_id(&self, id: SignalId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// Returns the signal holding identifier `name`.
    pub fn lookup(&self, name: &str) -> Option<SignalId> {
        self.signals.get(name).copied()
    }

    /// Returns the number of named signals.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns whether no signal was named.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates over `(signal, identifier)` pairs in encounter order.
    pub fn iter(&self) -> impl Iterator<Item = (SignalId, &str)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.names.get(id).map(|name| (*id, name.as_str())))
    }

    fn insert(&mut self, id: SignalId, name: String) {
        self.signals.insert(name.clone(), id);
        self.names.insert(id, name);
        self.order.push(id);
    }
}

/// Assigns a unique identifier to every signal of a finalized tree.
///
/// # Errors
///
/// Returns [`FinalizationError::NotFinalized`] for an open tree, and
/// [`NamingConflictError::Identifier`] when numeric suffixes are disabled
/// and prefixing alone cannot make a name unique.
pub fn resolve_names(top: &Module, config: &NamingConfig) -> Result<NameMap, ElabError> {
    let root = HierPath::root(top.kind());
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    collect(top, &root, &mut seen, &mut found)?;

    // Statements may hold handles made before a domain rename; the
    // domain's own handles carry the current hints.
    let mut domain_handles: HashMap<SignalId, Signal> = HashMap::new();
    top.walk(&root, &mut |_, module| {
        for domain in module.clock_domains() {
            for signal in std::iter::once(domain.clk()).chain(domain.rst()) {
                domain_handles.insert(signal.id(), signal.clone());
            }
        }
    });

    let mut map = NameMap::default();
    for (signal, scope) in found {
        let signal = domain_handles.get(&signal.id()).unwrap_or(&signal);
        let name = pick(signal, &scope, config, &map)?;
        trace!("{signal} -> `{name}`");
        map.insert(signal.id(), name);
    }
    debug!("named {} signal(s)", map.len());
    Ok(map)
}

/// Gathers signals in first-encounter order with the scope each one is
/// named under.
fn collect(
    module: &Module,
    path: &HierPath,
    seen: &mut HashSet<SignalId>,
    found: &mut Vec<(Signal, Vec<String>)>,
) -> Result<(), FinalizationError> {
    if !module.is_finalized() {
        return Err(FinalizationError::NotFinalized {
            module: path.to_string(),
        });
    }
    let mut visit = |signal: &Signal| {
        if seen.insert(signal.id()) {
            let scope = if signal.scope().is_empty() {
                path.components().to_vec()
            } else {
                signal.scope().to_vec()
            };
            found.push((signal.clone(), scope));
        }
    };

    for domain in module.clock_domains() {
        visit(domain.clk());
        if let Some(rst) = domain.rst() {
            visit(rst);
        }
    }
    for (_, block) in module.blocks() {
        for stmt in block {
            stmt.visit_values(&mut |value| value.visit_signals(&mut visit));
        }
    }
    for special in module.specials() {
        special.visit_signals(&mut visit);
    }

    for sub in module.submodules() {
        collect(&sub.module, &path.child(sub.component()), seen, found)?;
    }
    Ok(())
}

fn pick(
    signal: &Signal,
    scope: &[String],
    config: &NamingConfig,
    taken: &NameMap,
) -> Result<String, NamingConflictError> {
    let sep = &config.separator;
    let base = signal.hint().unwrap_or(config.default_hint.as_str());
    let mut candidate = base.to_string();
    if taken.lookup(&candidate).is_none() {
        return Ok(candidate);
    }
    for component in scope.iter().rev() {
        candidate = format!("{component}{sep}{candidate}");
        if taken.lookup(&candidate).is_none() {
            return Ok(candidate);
        }
    }
    if !config.numeric_suffix {
        return Err(NamingConflictError::Identifier {
            signal: signal.to_string(),
            candidate,
        });
    }
    let mut n = 1u64;
    loop {
        let suffixed = format!("{candidate}{sep}{n}");
        if taken.lookup(&suffixed).is_none() {
            return Ok(suffixed);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finalize::finalize;
    use loom_config::ElabConfig;
    use loom_ir::{ClockDomain, Value};

    fn finalized(mut m: Module) -> Module {
        finalize(&mut m, &ElabConfig::default()).unwrap();
        m
    }

    fn drive(m: &mut Module, signal: &Signal) {
        m.comb([signal.value().assign(Value::int(0)).unwrap()])
            .unwrap();
    }

    #[test]
    fn unique_hints_are_kept() {
        let (a, b) = (Signal::named("a", 1), Signal::named("b", 1));
        let mut m = Module::new("Top");
        m.comb([a.value().assign(b.value()).unwrap()]).unwrap();
        let names = resolve_names(&finalized(m), &NamingConfig::default()).unwrap();
        assert_eq!(names.get(&a), Some("a"));
        assert_eq!(names.get(&b), Some("b"));
        assert_eq!(names.lookup("b"), Some(b.id()));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn collisions_take_hierarchy_prefixes() {
        let outer = Signal::named("count", 4);
        let inner = Signal::named("count", 4);
        let mut child = Module::new("Counter");
        drive(&mut child, &inner);
        let mut top = Module::new("Top");
        drive(&mut top, &outer);
        top.add_named_submodule("ctr", child).unwrap();
        let names = resolve_names(&finalized(top), &NamingConfig::default()).unwrap();
        assert_eq!(names.get(&outer), Some("count"));
        assert_eq!(names.get(&inner), Some("ctr_count"));
    }

    #[test]
    fn anonymous_children_contribute_their_kind() {
        let outer = Signal::named("q", 1);
        let inner = Signal::named("q", 1);
        let mut child = Module::new("Flop");
        drive(&mut child, &inner);
        let mut top = Module::new("Top");
        drive(&mut top, &outer);
        top.add_submodule(child).unwrap();
        let names = resolve_names(&finalized(top), &NamingConfig::default()).unwrap();
        assert_eq!(names.get(&inner), Some("Flop_q"));
    }

    #[test]
    fn exhausted_prefixes_fall_back_to_suffixes() {
        let sigs: Vec<Signal> = (0..3).map(|_| Signal::named("x", 1)).collect();
        let mut top = Module::new("Top");
        for s in &sigs {
            drive(&mut top, s);
        }
        let names = resolve_names(&finalized(top), &NamingConfig::default()).unwrap();
        let got: Vec<&str> = sigs.iter().filter_map(|s| names.get(s)).collect();
        assert_eq!(got, vec!["x", "Top_x", "Top_x_1"]);
    }

    #[test]
    fn explicit_scope_overrides_module_path() {
        let a = Signal::named("v", 1);
        let b = Signal::builder()
            .name("v")
            .width(1)
            .scope(["Soc", "uart"])
            .build();
        let mut top = Module::new("Top");
        drive(&mut top, &a);
        drive(&mut top, &b);
        let names = resolve_names(&finalized(top), &NamingConfig::default()).unwrap();
        assert_eq!(names.get(&b), Some("uart_v"));
    }

    #[test]
    fn unnamed_signals_use_default_hint() {
        let (a, b) = (Signal::new(1), Signal::new(1));
        let mut top = Module::new("Top");
        top.comb([a.value().assign(b.value()).unwrap()]).unwrap();
        let config = NamingConfig {
            default_hint: "n".into(),
            ..NamingConfig::default()
        };
        let names = resolve_names(&finalized(top), &config).unwrap();
        assert_eq!(names.get(&a), Some("n"));
        assert_eq!(names.get(&b), Some("Top_n"));
    }

    #[test]
    fn domain_signals_come_first() {
        let q = Signal::named("clk", 1);
        let mut top = Module::new("Top");
        top.add_domain(ClockDomain::new("sync")).unwrap();
        drive(&mut top, &q);
        let names = resolve_names(&finalized(top), &NamingConfig::default()).unwrap();
        let top_names: Vec<&str> = names.iter().map(|(_, n)| n).collect();
        assert_eq!(top_names, vec!["clk", "rst", "Top_clk"]);
    }

    #[test]
    fn renamed_domain_hint_wins_over_stale_handles() {
        let mut cd = ClockDomain::new("pix");
        let stale = cd.clk().clone();
        cd.rename("cam_pix");
        let q = Signal::named("q", 1);
        let mut top = Module::new("Top");
        top.comb([q.value().assign(stale.value()).unwrap()]).unwrap();
        let mut child = Module::new("Child");
        child.add_domain(cd).unwrap();
        top.add_named_submodule("cam", child).unwrap();
        let names = resolve_names(&finalized(top), &NamingConfig::default()).unwrap();
        assert_eq!(names.get(&stale), Some("cam_pix_clk"));
    }

    #[test]
    fn disabled_suffixes_report_conflict() {
        let sigs: Vec<Signal> = (0..3).map(|_| Signal::named("x", 1)).collect();
        let mut top = Module::new("Top");
        for s in &sigs {
            drive(&mut top, s);
        }
        let config = NamingConfig {
            numeric_suffix: false,
            ..NamingConfig::default()
        };
        let err = resolve_names(&finalized(top), &config).unwrap_err();
        assert!(matches!(
            err,
            ElabError::Naming(NamingConflictError::Identifier { ref candidate, .. })
                if candidate == "Top_x"
        ));
    }

    #[test]
    fn identifiers_are_unique() {
        let mut top = Module::new("Top");
        let sigs: Vec<Signal> = (0..20).map(|_| Signal::named("s", 1)).collect();
        for s in &sigs {
            drive(&mut top, s);
        }
        let names = resolve_names(&finalized(top), &NamingConfig::default()).unwrap();
        let unique: HashSet<&str> = names.iter().map(|(_, n)| n).collect();
        assert_eq!(unique.len(), 20);
    }

    #[test]
    fn open_tree_is_rejected() {
        let top = Module::new("Top");
        assert!(matches!(
            resolve_names(&top, &NamingConfig::default()),
            Err(ElabError::Finalization(FinalizationError::NotFinalized { .. }))
        ));
    }
}
