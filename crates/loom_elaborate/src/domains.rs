//! Clock domain resolution.
//!
//! When several submodules of one parent surface a domain with the same
//! name, each contributor's copy is renamed to `<submodule>_<domain>`
//! throughout its subtree. Anonymous contributors cannot be prefixed, so a
//! collision involving one is an error. Domains that do not collide keep
//! their names.
//!
//! Once the root is resolved, every domain a module uses must be visible to
//! it. A missing `sync` domain can be declared at the root instead.

use log::debug;
use loom_config::DomainConfig;
use loom_ir::{
    ClockDomain, ElabError, FinalizationError, HierPath, Module, NamingConflictError, Special,
    COMB_DOMAIN,
};

/// Resolves the domains `module` sees: its own declarations followed by
/// every non-local domain surfaced by its submodules, renamed where
/// siblings collide.
pub(crate) fn resolve(module: &mut Module, path: &HierPath) -> Result<(), NamingConflictError> {
    let mut contributors: Vec<(String, Vec<usize>)> = Vec::new();
    for (index, sub) in module.submodules().iter().enumerate() {
        for domain in sub.module.domains().iter().filter(|d| !d.is_local()) {
            match contributors.iter_mut().find(|(name, _)| name == domain.name()) {
                Some((_, subs)) => subs.push(index),
                None => contributors.push((domain.name().to_string(), vec![index])),
            }
        }
    }

    for (domain, subs) in contributors.iter().filter(|(_, subs)| subs.len() > 1) {
        let names: Vec<Option<String>> = subs
            .iter()
            .map(|&i| module.submodules()[i].name.clone())
            .collect();
        if names.iter().any(Option::is_none) {
            return Err(NamingConflictError::AnonymousDomain {
                module: path.to_string(),
                domain: domain.clone(),
                contributors: subs
                    .iter()
                    .zip(&names)
                    .map(|(&i, name)| label(i, name.as_deref()))
                    .collect(),
            });
        }
        let names: Vec<String> = names.into_iter().flatten().collect();
        if let Some(name) = first_duplicate(&names) {
            return Err(NamingConflictError::DuplicateContributors {
                module: path.to_string(),
                domain: domain.clone(),
                name: name.to_string(),
            });
        }
        for (&index, name) in subs.iter().zip(&names) {
            let renamed = format!("{name}_{domain}");
            debug!("`{path}`: renaming domain `{domain}` of submodule `{name}` to `{renamed}`");
            module.submodules_mut()[index]
                .module
                .rename_domain(domain, &renamed);
        }
    }

    let own = module.clock_domains().len();
    let mut resolved: Vec<ClockDomain> = module.clock_domains().to_vec();
    let mut owners: Vec<String> = Vec::new();
    for (index, sub) in module.submodules().iter().enumerate() {
        let owner = label(index, sub.name.as_deref());
        for domain in sub.module.domains().iter().filter(|d| !d.is_local()) {
            if let Some(pos) = resolved.iter().position(|d| d.name() == domain.name()) {
                return Err(if pos < own {
                    NamingConflictError::ShadowedDomain {
                        module: path.to_string(),
                        submodule: owner,
                        domain: domain.name().to_string(),
                    }
                } else {
                    NamingConflictError::SurfacedDomain {
                        module: path.to_string(),
                        domain: domain.name().to_string(),
                        first: owners[pos - own].clone(),
                        second: owner,
                    }
                });
            }
            resolved.push(domain.clone());
            owners.push(owner.clone());
        }
    }
    module.set_domains(resolved);
    Ok(())
}

/// Checks that every domain used in the tree rooted at `top` is visible
/// where it is used, declaring a root `sync` domain first when `config`
/// allows it and the tree needs one.
pub(crate) fn check_uses(
    top: &mut Module,
    path: &HierPath,
    config: &DomainConfig,
) -> Result<(), ElabError> {
    let mut missing = Vec::new();
    undeclared(top, path, &[], &mut missing);
    if config.create_sync && missing.iter().any(|(_, domain)| domain == "sync") {
        debug!("`{path}`: declaring the default `sync` domain");
        top.add_domain(ClockDomain::new("sync"))?;
        resolve(top, path)?;
        missing.clear();
        undeclared(top, path, &[], &mut missing);
    }
    match missing.into_iter().next() {
        Some((module, domain)) => Err(FinalizationError::UndefinedDomain { module, domain }.into()),
        None => Ok(()),
    }
}

fn undeclared(
    module: &Module,
    path: &HierPath,
    inherited: &[String],
    missing: &mut Vec<(String, String)>,
) {
    let mut visible = inherited.to_vec();
    visible.extend(module.domains().iter().map(|d| d.name().to_string()));
    for domain in used_domains(module) {
        if !visible.contains(&domain) && !missing.iter().any(|(_, d)| *d == domain) {
            missing.push((path.to_string(), domain));
        }
    }
    for sub in module.submodules() {
        undeclared(&sub.module, &path.child(sub.component()), &visible, missing);
    }
}

/// Domains named by this module's statement blocks, clock and reset
/// references, and clocked memory ports, in encounter order.
fn used_domains(module: &Module) -> Vec<String> {
    let mut used: Vec<String> = Vec::new();
    let mut note = |domain: &str| {
        if domain != COMB_DOMAIN && !used.iter().any(|u| u == domain) {
            used.push(domain.to_string());
        }
    };
    for (domain, block) in module.blocks() {
        if !block.is_empty() {
            note(domain);
        }
        for stmt in block {
            stmt.visit_values(&mut |v| v.visit_domains(&mut note));
        }
    }
    for special in module.specials() {
        match special {
            Special::Instance(inst) => {
                for port in inst.ports() {
                    port.value.visit_domains(&mut note);
                }
            }
            Special::Memory(mem) => {
                for port in mem.ports() {
                    let clocked = !port.async_read() || port.we().is_some();
                    if let Some(domain) = port.clock_domain().filter(|_| clocked) {
                        note(domain);
                    }
                }
            }
        }
    }
    used
}

fn label(index: usize, name: Option<&str>) -> String {
    match name {
        Some(name) => name.to_string(),
        None => format!("<anonymous #{index}>"),
    }
}

fn first_duplicate(names: &[String]) -> Option<&str> {
    names
        .iter()
        .enumerate()
        .find(|(i, name)| names[..*i].contains(name))
        .map(|(_, name)| name.as_str())
}
