//! Finalization: closes a module tree bottom-up.
//!
//! Each module first finalizes the submodules it already has, then runs its
//! deferred-construction hook round by round, finalizing whatever each
//! round adds, until a round adds no submodules. Recorded transforms are
//! then applied to the subtree. Only then are its clock domains resolved
//! and the module marked finalized. At the root, every domain in use must
//! then be visible where it is used.

use crate::domains;
use log::{debug, trace};
use loom_config::ElabConfig;
use loom_ir::{ElabError, FinalizationError, HierPath, Module};
use std::collections::VecDeque;

/// Finalizes `top` and its whole subtree. Finalizing an already finalized
/// tree is a no-op.
pub fn finalize(top: &mut Module, config: &ElabConfig) -> Result<(), ElabError> {
    let path = HierPath::root(top.kind());
    finalize_at(top, &path, config, true)
}

fn finalize_at(
    module: &mut Module,
    path: &HierPath,
    config: &ElabConfig,
    root: bool,
) -> Result<(), ElabError> {
    if module.is_finalized() {
        trace!("`{path}` is already finalized");
        return Ok(());
    }
    debug!("finalizing `{path}`");

    let mut pending: VecDeque<usize> = (0..module.submodules().len()).collect();
    drain(module, &mut pending, path, config)?;

    if let Some(mut hook) = module.take_hook() {
        let mut growing_rounds = 0;
        loop {
            let before = module.submodules().len();
            hook.build(module)?;
            let after = module.submodules().len();
            if after == before {
                break;
            }
            growing_rounds += 1;
            if growing_rounds > config.finalize.max_rounds {
                return Err(FinalizationError::RoundLimit {
                    module: path.to_string(),
                    rounds: config.finalize.max_rounds,
                }
                .into());
            }
            trace!(
                "hook of `{path}` added {} submodule(s) in round {growing_rounds}",
                after - before
            );
            pending.extend(before..after);
            drain(module, &mut pending, path, config)?;
        }
        module.restore_hook(hook);
    }

    for transform in module.take_transforms() {
        trace!("applying {transform:?} to `{path}`");
        transform.apply(module)?;
    }

    module.resolve_memory_domains(&config.domains.default_memory_domain);
    domains::resolve(module, path)?;
    if root {
        domains::check_uses(module, path, &config.domains)?;
    }
    module.mark_finalized();
    debug!(
        "finalized `{path}` ({} submodule(s), {} visible domain(s))",
        module.submodules().len(),
        module.domains().len()
    );
    Ok(())
}

fn drain(
    module: &mut Module,
    pending: &mut VecDeque<usize>,
    path: &HierPath,
    config: &ElabConfig,
) -> Result<(), ElabError> {
    while let Some(index) = pending.pop_front() {
        let sub = &mut module.submodules_mut()[index];
        let child_path = path.child(sub.component());
        finalize_at(&mut sub.module, &child_path, config, false)?;
    }
    Ok(())
}
