//! Array lowering.
//!
//! Replaces every [`Value::ArrayRef`] in a finalized tree with primitive
//! constructs. Read accesses become a chain of multiplexers guarded by
//! `index == position`; write accesses become a [`Statement::Switch`] on the
//! index with one arm per position. In both forms the last element is the
//! fallback, so an index outside `0..len` selects it. Positions the index
//! cannot represent are left out.

use log::{debug, trace};
use loom_ir::{
    Array, ArrayElem, Case, FinalizationError, HierPath, Module, Pattern, PortRole, Shape,
    Signal, Special, Statement, Value, COMB_DOMAIN,
};

/// Counts of rewritten array accesses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LowerStats {
    /// Accesses rewritten into multiplexer chains.
    pub rvalues: usize,
    /// Assignment targets rewritten into switches.
    pub lvalues: usize,
}

/// Lowers every array access of a finalized tree in place.
///
/// # Errors
///
/// Returns [`FinalizationError::NotFinalized`] when any module of the tree
/// is still open.
pub fn lower_arrays(top: &mut Module) -> Result<LowerStats, FinalizationError> {
    let mut stats = LowerStats::default();
    let path = HierPath::root(top.kind());
    lower_module(top, &path, &mut stats)?;
    debug!(
        "lowered {} array read(s) and {} array write(s)",
        stats.rvalues, stats.lvalues
    );
    Ok(stats)
}

fn lower_module(
    module: &mut Module,
    path: &HierPath,
    stats: &mut LowerStats,
) -> Result<(), FinalizationError> {
    if !module.is_finalized() {
        return Err(FinalizationError::NotFinalized {
            module: path.to_string(),
        });
    }
    let before = *stats;

    for (_, block) in module.blocks_mut() {
        let lowered: Vec<Statement> = block.iter().map(|s| lower_statement(s, stats)).collect();
        *block = lowered;
    }

    let mut glue = Vec::new();
    for special in module.specials_mut() {
        if let Special::Instance(inst) = special {
            let kind = inst.kind().to_string();
            for port in inst.ports_mut() {
                match port.role {
                    PortRole::Parameter | PortRole::Input | PortRole::Inout => {
                        port.value = lower_rvalue(&port.value, stats);
                    }
                    PortRole::Output if port.value.contains_array_ref() => {
                        let temp = Signal::like(&port.value, format!("{kind}_{}", port.name));
                        glue.push(lower_assign(&port.value, &temp.value(), stats));
                        port.value = temp.value();
                    }
                    PortRole::Output => {}
                }
            }
        }
    }
    if !glue.is_empty() {
        trace!("`{path}`: {} instance output(s) routed through glue logic", glue.len());
        module.block_mut(COMB_DOMAIN).extend(glue);
    }

    if *stats != before {
        trace!(
            "`{path}`: {} read(s), {} write(s) lowered",
            stats.rvalues - before.rvalues,
            stats.lvalues - before.lvalues
        );
    }

    for sub in module.submodules_mut() {
        let child = path.child(sub.component());
        lower_module(&mut sub.module, &child, stats)?;
    }
    Ok(())
}

fn lower_statement(stmt: &Statement, stats: &mut LowerStats) -> Statement {
    match stmt {
        Statement::Assign { lhs, rhs } => lower_assign(lhs, rhs, stats),
        Statement::If {
            cond,
            then,
            otherwise,
        } => Statement::If {
            cond: lower_rvalue(cond, stats),
            then: then.iter().map(|s| lower_statement(s, stats)).collect(),
            otherwise: otherwise
                .as_ref()
                .map(|body| body.iter().map(|s| lower_statement(s, stats)).collect()),
        },
        Statement::Switch { selector, cases } => Statement::Switch {
            selector: lower_rvalue(selector, stats),
            cases: cases
                .iter()
                .map(|case| Case {
                    patterns: case.patterns.clone(),
                    body: case.body.iter().map(|s| lower_statement(s, stats)).collect(),
                })
                .collect(),
        },
    }
}

/// Rewrites every array access in `value` into a multiplexer chain.
pub fn lower_rvalue(value: &Value, stats: &mut LowerStats) -> Value {
    if !value.contains_array_ref() {
        return value.clone();
    }
    value.map_bottom_up(&mut |node| match node {
        Value::ArrayRef { array, index } => {
            stats.rvalues += 1;
            mux_chain(&array, &index)
        }
        other => other,
    })
}

fn mux_chain(array: &Array, index: &Value) -> Value {
    let elements = leaf_elements(array);
    let Some(((_, last), rest)) = elements.split_last() else {
        return Value::int(0);
    };
    let max = max_index(index.shape());
    rest.iter()
        .rev()
        .filter(|(position, _)| *position as u128 <= max)
        .fold((*last).clone(), |acc, (position, element)| {
            Value::mux(
                index.equals(Value::int(*position as i128)),
                (*element).clone(),
                acc,
            )
        })
}

fn lower_assign(lhs: &Value, rhs: &Value, stats: &mut LowerStats) -> Statement {
    let rhs = lower_rvalue(rhs, stats);
    let lhs = lower_target_indices(lhs, stats);
    split_target(lhs, &rhs, stats)
}

/// Lowers array reads inside the index expressions of an assignment
/// target, leaving the target's own array accesses in place.
fn lower_target_indices(target: &Value, stats: &mut LowerStats) -> Value {
    match target {
        Value::ArrayRef { array, index } => Value::ArrayRef {
            array: array.map_leaves(&mut |leaf| lower_target_indices(leaf, stats)),
            index: Box::new(lower_rvalue(index, stats)),
        },
        Value::Slice { value, start, end } => Value::Slice {
            value: Box::new(lower_target_indices(value, stats)),
            start: *start,
            end: *end,
        },
        Value::Concat(parts) => Value::Concat(
            parts
                .iter()
                .map(|p| lower_target_indices(p, stats))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn split_target(lhs: Value, rhs: &Value, stats: &mut LowerStats) -> Statement {
    let Some((array, index)) = first_array_ref(&lhs) else {
        return Statement::Assign {
            lhs,
            rhs: rhs.clone(),
        };
    };
    stats.lvalues += 1;
    let elements = leaf_elements(array);
    let Some(((_, last), rest)) = elements.split_last() else {
        return Statement::Assign {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        };
    };
    let max = max_index(index.shape());
    let mut cases: Vec<Case> = rest
        .iter()
        .filter(|(position, _)| *position as u128 <= max)
        .map(|(position, element)| {
            let target = substitute_first(&lhs, element);
            Case::new(
                [Pattern::int(*position as u128)],
                [split_target(target, rhs, stats)],
            )
        })
        .collect();
    let target = substitute_first(&lhs, last);
    let fallback = split_target(target, rhs, stats);
    if cases.is_empty() {
        return fallback;
    }
    cases.push(Case::wildcard([fallback]));
    Statement::Switch {
        selector: index.clone(),
        cases,
    }
}

/// Finds the outermost, leftmost array access of an assignment target.
fn first_array_ref(target: &Value) -> Option<(&Array, &Value)> {
    match target {
        Value::ArrayRef { array, index } => Some((array, index)),
        Value::Slice { value, .. } => first_array_ref(value),
        Value::Concat(parts) => parts.iter().find_map(first_array_ref),
        _ => None,
    }
}

/// Replaces the access [`first_array_ref`] finds with `element`.
fn substitute_first(target: &Value, element: &Value) -> Value {
    fn go(target: &Value, element: &Value, done: &mut bool) -> Value {
        if *done {
            return target.clone();
        }
        match target {
            Value::ArrayRef { .. } => {
                *done = true;
                element.clone()
            }
            Value::Slice { value, start, end } => Value::Slice {
                value: Box::new(go(value, element, done)),
                start: *start,
                end: *end,
            },
            Value::Concat(parts) => {
                Value::Concat(parts.iter().map(|p| go(p, element, done)).collect())
            }
            other => other.clone(),
        }
    }
    go(target, element, &mut false)
}

fn leaf_elements(array: &Array) -> Vec<(usize, &Value)> {
    array
        .elements()
        .iter()
        .enumerate()
        .filter_map(|(position, elem)| match elem {
            ArrayElem::Value(v) => Some((position, v)),
            ArrayElem::Array(_) => None,
        })
        .collect()
}

/// The largest non-negative value an index of `shape` can hold.
fn max_index(shape: Shape) -> u128 {
    let bits = if shape.signed {
        shape.width.saturating_sub(1)
    } else {
        shape.width
    };
    if bits >= u128::BITS {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finalize::finalize;
    use loom_config::ElabConfig;
    use loom_ir::{Instance, OpKind};

    fn finalized(mut m: Module) -> Module {
        finalize(&mut m, &ElabConfig::default()).unwrap();
        m
    }

    fn count_ops(value: &Value, op: OpKind) -> usize {
        match value {
            Value::Operator { op: o, operands } => {
                usize::from(*o == op) + operands.iter().map(|v| count_ops(v, op)).sum::<usize>()
            }
            Value::Slice { value, .. } | Value::Repl { value, .. } => count_ops(value, op),
            Value::Concat(parts) => parts.iter().map(|v| count_ops(v, op)).sum(),
            _ => 0,
        }
    }

    #[test]
    fn max_index_by_shape() {
        assert_eq!(max_index(Shape::unsigned(2)), 3);
        assert_eq!(max_index(Shape::signed(3)), 3);
        assert_eq!(max_index(Shape::unsigned(0)), 0);
        assert_eq!(max_index(Shape::unsigned(128)), u128::MAX);
    }

    #[test]
    fn read_becomes_mux_chain() {
        let elems: Vec<Signal> = (0..4).map(|_| Signal::new(8)).collect();
        let idx = Signal::new(2);
        let out = Signal::new(8);
        let mut m = Module::new("Top");
        m.comb([out
            .value()
            .assign(Array::new(&elems).index(&idx).unwrap())
            .unwrap()])
            .unwrap();
        let mut m = finalized(m);
        let stats = lower_arrays(&mut m).unwrap();
        assert_eq!(stats, LowerStats { rvalues: 1, lvalues: 0 });
        let Statement::Assign { rhs, .. } = &m.statements("comb")[0] else {
            panic!("expected an assignment");
        };
        assert!(!rhs.contains_array_ref());
        assert_eq!(count_ops(rhs, OpKind::Mux), 3);
        assert_eq!(count_ops(rhs, OpKind::Eq), 3);
    }

    #[test]
    fn narrow_index_skips_unreachable_positions() {
        let elems: Vec<Signal> = (0..5).map(|_| Signal::new(1)).collect();
        let idx = Signal::new(1);
        let out = Signal::new(1);
        let mut m = Module::new("Top");
        m.comb([out
            .value()
            .assign(Array::new(&elems).index(&idx).unwrap())
            .unwrap()])
            .unwrap();
        let mut m = finalized(m);
        lower_arrays(&mut m).unwrap();
        let Statement::Assign { rhs, .. } = &m.statements("comb")[0] else {
            panic!("expected an assignment");
        };
        assert_eq!(count_ops(rhs, OpKind::Mux), 2);
    }

    #[test]
    fn write_becomes_switch_with_default_last() {
        let elems: Vec<Signal> = (0..3).map(|_| Signal::new(4)).collect();
        let idx = Signal::new(2);
        let mut m = Module::new("Top");
        m.comb([Array::new(&elems)
            .index(&idx)
            .unwrap()
            .assign(Value::int(5))
            .unwrap()])
            .unwrap();
        let mut m = finalized(m);
        let stats = lower_arrays(&mut m).unwrap();
        assert_eq!(stats.lvalues, 1);
        let Statement::Switch { selector, cases } = &m.statements("comb")[0] else {
            panic!("expected a switch");
        };
        assert_eq!(selector, &idx.value());
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].patterns, vec![Pattern::int(0)]);
        assert_eq!(cases[1].patterns, vec![Pattern::int(1)]);
        assert!(cases[2].is_wildcard());
        assert_eq!(
            cases[2].body,
            vec![Statement::Assign {
                lhs: elems[2].value(),
                rhs: Value::int(5),
            }]
        );
    }

    #[test]
    fn write_through_slice_keeps_slice() {
        let elems: Vec<Signal> = (0..2).map(|_| Signal::new(8)).collect();
        let idx = Signal::new(1);
        let target = Array::new(&elems).index(&idx).unwrap().slice(0, 4).unwrap();
        let mut m = Module::new("Top");
        m.comb([target.assign(Value::int(3)).unwrap()]).unwrap();
        let mut m = finalized(m);
        lower_arrays(&mut m).unwrap();
        let Statement::Switch { cases, .. } = &m.statements("comb")[0] else {
            panic!("expected a switch");
        };
        assert_eq!(
            cases[0].body[0],
            Statement::Assign {
                lhs: elems[0].value().slice(0, 4).unwrap(),
                rhs: Value::int(3),
            }
        );
    }

    #[test]
    fn nested_write_switches_outer_index_first() {
        let rows: Vec<Array> = (0..2)
            .map(|_| Array::new((0..2).map(|_| Signal::new(1))))
            .collect();
        let (x, y) = (Signal::new(1), Signal::new(1));
        let grid = Array::new(rows);
        let target = grid.index(&x).unwrap().index(&y).unwrap();
        let mut m = Module::new("Top");
        m.comb([target.assign(Value::int(1)).unwrap()]).unwrap();
        let mut m = finalized(m);
        let stats = lower_arrays(&mut m).unwrap();
        assert_eq!(stats.lvalues, 3);
        let Statement::Switch { selector, cases } = &m.statements("comb")[0] else {
            panic!("expected a switch");
        };
        assert_eq!(selector, &x.value());
        assert!(matches!(
            &cases[0].body[0],
            Statement::Switch { selector, .. } if selector == &y.value()
        ));
    }

    #[test]
    fn index_reads_inside_targets_are_lowered() {
        let elems: Vec<Signal> = (0..2).map(|_| Signal::new(1)).collect();
        let picks: Vec<Signal> = (0..2).map(|_| Signal::new(1)).collect();
        let sel = Signal::new(1);
        let index = Array::new(&picks).index(&sel).unwrap();
        let mut m = Module::new("Top");
        m.comb([Array::new(&elems)
            .index(index)
            .unwrap()
            .assign(Value::int(1))
            .unwrap()])
            .unwrap();
        let mut m = finalized(m);
        let stats = lower_arrays(&mut m).unwrap();
        assert_eq!(stats, LowerStats { rvalues: 1, lvalues: 1 });
        let Statement::Switch { selector, .. } = &m.statements("comb")[0] else {
            panic!("expected a switch");
        };
        assert!(!selector.contains_array_ref());
    }

    #[test]
    fn conditions_and_selectors_are_lowered() {
        let elems: Vec<Signal> = (0..2).map(|_| Signal::new(1)).collect();
        let idx = Signal::new(1);
        let out = Signal::new(1);
        let cond = Array::new(&elems).index(&idx).unwrap();
        let mut m = Module::new("Top");
        m.comb([Statement::If {
            cond,
            then: vec![out.value().assign(Value::int(1)).unwrap()],
            otherwise: None,
        }])
        .unwrap();
        let mut m = finalized(m);
        lower_arrays(&mut m).unwrap();
        let Statement::If { cond, .. } = &m.statements("comb")[0] else {
            panic!("expected an if");
        };
        assert!(!cond.contains_array_ref());
    }

    #[test]
    fn instance_output_goes_through_glue() {
        let elems: Vec<Signal> = (0..2).map(|_| Signal::new(4)).collect();
        let idx = Signal::new(1);
        let inst = Instance::new("BUF")
            .output("O", Array::new(&elems).index(&idx).unwrap())
            .unwrap();
        let mut m = Module::new("Top");
        m.add_special(inst).unwrap();
        let mut m = finalized(m);
        lower_arrays(&mut m).unwrap();
        let Special::Instance(inst) = &m.specials()[0] else {
            panic!("expected an instance");
        };
        let Value::Signal(temp) = &inst.ports()[0].value else {
            panic!("expected a temporary signal");
        };
        assert_eq!(temp.hint(), Some("BUF_O"));
        assert!(matches!(
            &m.statements(COMB_DOMAIN)[0],
            Statement::Switch { cases, .. } if cases.len() == 2
        ));
    }

    #[test]
    fn open_tree_is_rejected() {
        let mut top = Module::new("Top");
        assert_eq!(
            lower_arrays(&mut top),
            Err(FinalizationError::NotFinalized {
                module: "Top".into()
            })
        );
    }
}
