//! Loop trip-count reduction: collapses a counted loop with a constant
//! initial value, bound, and step, and a side-effect-free accumulator
//! body, into straight-line code computing the final values directly.

use super::loopshape::find_loops;
use crate::symbol::{SymbolId, SymbolKind};
use crate::tac::{ArithOp, CmpOp, NodeId, Op, Program};
use std::collections::{HashMap, HashSet};

const PASS_NAME: &str = "loop trip-count reduction";

pub(crate) fn int_value(prog: &Program, sym: SymbolId) -> Option<i64> {
    let s = prog.symtab.get(sym);
    if s.kind == SymbolKind::IntConst { s.value } else { None }
}

/// The constant value `iv` holds on entry to the loop at `header_idx`,
/// found by walking backward for its most recent plain-copy
/// definition. `None` if `iv` isn't last defined by a copy from a
/// known constant (a non-copy definition, or no definition at all,
/// means the entry value isn't known to this pass).
pub(crate) fn initial_value_before(prog: &Program, ids: &[NodeId], header_idx: usize, iv: SymbolId) -> Option<i64> {
    for idx in (0..header_idx).rev() {
        let op = &prog.get(ids[idx]).op;
        if matches!(op, Op::BeginFunc) {
            return None;
        }
        if let Op::Copy { dst, src } = *op
            && dst == iv
        {
            return int_value(prog, src);
        }
        if op.def() == Some(iv) {
            return None;
        }
    }
    None
}

/// Trip count for `iv cmp bound`, stepping by `step` each iteration,
/// i.e. the number of times the loop body runs before the test fails.
/// `None` if the direction and step sign don't agree (the loop would
/// never terminate, or never run, in a way this formula can't express).
pub(crate) fn trip_count(cmp: CmpOp, init: i64, bound: i64, step: i64) -> Option<i64> {
    match cmp {
        CmpOp::Lt if step > 0 => Some(((bound - init).max(0) + step - 1) / step),
        CmpOp::Le if step > 0 => Some(((bound - init + 1).max(0) + step - 1) / step),
        CmpOp::Gt if step < 0 => Some(((init - bound).max(0) + (-step) - 1) / (-step)),
        CmpOp::Ge if step < 0 => Some(((init - bound + 1).max(0) + (-step) - 1) / (-step)),
        _ => None,
    }
}

pub(crate) struct Induction {
    pub(crate) step: i64,
    pub(crate) incr_node: NodeId,
    /// The temp-computing `BinArith` feeding `incr_node`'s `Copy`, when
    /// the recurrence goes through a temporary (the builder's usual
    /// shape). `None` for a direct self-referencing `BinArith`.
    pub(crate) calc_node: Option<NodeId>,
}

fn step_of(prog: &Program, op: ArithOp, var: SymbolId, lhs: SymbolId, rhs: SymbolId) -> Option<i64> {
    match op {
        ArithOp::Add if lhs == var => int_value(prog, rhs),
        ArithOp::Add if rhs == var => int_value(prog, lhs),
        ArithOp::Sub if lhs == var => int_value(prog, rhs).map(|c| -c),
        _ => None,
    }
}

/// Induction variables advanced once per loop body. The builder never
/// emits a self-referencing `i = i + step` directly — `do_bin` always
/// computes into a fresh temporary, so the recurrence shows up as
/// `t = i + step` followed by `i = t` (a `Copy`). Both that shape and a
/// direct self-referencing `BinArith` are recognized here.
pub(crate) fn find_induction(prog: &Program, body: &[NodeId]) -> HashMap<SymbolId, Induction> {
    let mut def_count: HashMap<SymbolId, u32> = HashMap::new();
    for &id in body {
        if let Some(d) = prog.get(id).op.def() {
            *def_count.entry(d).or_insert(0) += 1;
        }
    }
    let mut out = HashMap::new();
    for &id in body {
        match prog.get(id).op {
            Op::BinArith { op, dst, lhs, rhs } => {
                if def_count.get(&dst).copied().unwrap_or(0) != 1 {
                    continue;
                }
                if let Some(step) = step_of(prog, op, dst, lhs, rhs) {
                    out.insert(
                        dst,
                        Induction {
                            step,
                            incr_node: id,
                            calc_node: None,
                        },
                    );
                }
            }
            Op::Copy { dst, src } => {
                if def_count.get(&dst).copied().unwrap_or(0) != 1 {
                    continue;
                }
                let Some(&def_id) = body.iter().find(|&&n| prog.get(n).op.def() == Some(src))
                else {
                    continue;
                };
                if let Op::BinArith { op, lhs, rhs, .. } = prog.get(def_id).op
                    && let Some(step) = step_of(prog, op, dst, lhs, rhs)
                {
                    out.insert(
                        dst,
                        Induction {
                            step,
                            incr_node: id,
                            calc_node: Some(def_id),
                        },
                    );
                }
            }
            _ => {}
        }
    }
    out
}

pub fn run(prog: &mut Program, log: &mut crate::optlog::OptLog, iteration: u32) -> usize {
    let mut lines = Vec::new();
    let loops = find_loops(prog);

    'loops: for nl in &loops {
        if !nl.clean {
            continue;
        }
        // The condition region must be a bare CMP producing nl.cond.
        let Some((cmp_op, lhs, rhs)) = nl.cond_cmp(prog) else {
            continue;
        };

        let inductions = find_induction(prog, &nl.body);
        let (iv, bound, flipped) = if inductions.contains_key(&lhs) {
            (lhs, rhs, false)
        } else if inductions.contains_key(&rhs) {
            (rhs, lhs, true)
        } else {
            continue;
        };
        let effective_cmp = if flipped { flip(cmp_op) } else { cmp_op };

        let ids = prog.linearize();
        let header_idx = ids.iter().position(|&id| id == nl.header).unwrap();
        let Some(init) = initial_value_before(prog, &ids, header_idx, iv) else {
            continue;
        };
        let Some(bound_v) = int_value(prog, bound) else { continue };
        let ind = &inductions[&iv];

        // No side effects and no other induction variables allowed;
        // every other def in body must be a pure accumulate of the
        // shape `acc = acc +/- invariant`.
        let mut defined: HashSet<SymbolId> = HashSet::new();
        for &id in &nl.body {
            if let Some(d) = prog.get(id).op.def() {
                defined.insert(d);
            }
        }
        // The induction's own recurrence (and, when it goes through a
        // temp, the BinArith feeding it) is accounted for separately
        // and must not also be judged here.
        let mut skip: HashSet<NodeId> = HashSet::new();
        skip.insert(ind.incr_node);
        if let Some(c) = ind.calc_node {
            skip.insert(c);
        }

        // Other accumulators go through the same temp-then-copy shape
        // as the induction variable: `t = acc +/- invariant; acc = t`.
        let mut accumulators: Vec<(SymbolId, ArithOp, SymbolId)> = Vec::new();
        for &id in &nl.body {
            if skip.contains(&id) {
                continue;
            }
            let Op::Copy { dst, src } = prog.get(id).op else {
                continue;
            };
            let Some(&def_id) = nl.body.iter().find(|&&n| prog.get(n).op.def() == Some(src))
            else {
                continue;
            };
            let Op::BinArith { op: bop, lhs: l, rhs: r, .. } = prog.get(def_id).op else {
                continue;
            };
            let invariant = if l == dst && !defined.contains(&r) {
                r
            } else if r == dst && bop == ArithOp::Add && !defined.contains(&l) {
                l
            } else {
                continue;
            };
            accumulators.push((dst, bop, invariant));
            skip.insert(id);
            skip.insert(def_id);
        }
        for &id in &nl.body {
            if skip.contains(&id) {
                continue;
            }
            let op = prog.get(id).op.clone();
            if op.is_opaque_barrier() || matches!(op, Op::Store { .. } | Op::Input { .. } | Op::Output { .. }) {
                continue 'loops;
            }
            if let Op::BinArith { op: bop, dst, lhs: l, rhs: r } = op {
                let (acc, invariant) = if l == dst && !defined.contains(&r) {
                    (dst, r)
                } else if r == dst && bop == ArithOp::Add && !defined.contains(&l) {
                    (dst, l)
                } else {
                    continue 'loops;
                };
                accumulators.push((acc, bop, invariant));
            } else if op.def().is_some() {
                continue 'loops;
            }
        }

        let Some(trips) = trip_count(effective_cmp, init, bound_v, ind.step) else {
            continue;
        };
        if trips < 0 {
            continue;
        }

        // Replace the whole loop region with straight-line finalization.
        let region_start = nl.header;
        let region_end = nl.exit_label_node(prog);
        let mut to_remove = vec![nl.header];
        to_remove.extend(nl.cond_region.iter().copied());
        to_remove.push(nl.guard_ifz);
        to_remove.extend(nl.body.iter().copied());
        to_remove.push(nl.goto);
        if let Some(exit) = region_end {
            to_remove.push(exit);
        }

        let iv_final = init.wrapping_add(ind.step.wrapping_mul(trips));
        let iv_final_sym = prog.symtab.mk_int_const(iv_final);
        let seed = prog.make(Op::Copy { dst: iv, src: iv_final_sym });
        prog.insert_before(region_start, seed);
        lines.push(format!(
            "collapsed {} iterations; {} = {}",
            trips,
            prog.symtab.get(iv).name,
            iv_final
        ));

        for (acc, bop, invariant) in accumulators {
            let total = match int_value(prog, invariant) {
                Some(v) => {
                    let scaled = v.wrapping_mul(trips);
                    let scaled_sym = prog.symtab.mk_int_const(scaled);
                    let apply = prog.make(Op::BinArith {
                        op: bop,
                        dst: acc,
                        lhs: acc,
                        rhs: scaled_sym,
                    });
                    prog.insert_before(region_start, apply);
                    continue;
                }
                None => invariant,
            };
            let trips_sym = prog.symtab.mk_int_const(trips);
            let (scaled_dst, decl) = crate::builder::Builder::mk_tmp_of(prog, crate::types::Type::Int);
            let mul = prog.make(Op::BinArith {
                op: ArithOp::Mul,
                dst: scaled_dst,
                lhs: total,
                rhs: trips_sym,
            });
            let apply = prog.make(Op::BinArith {
                op: bop,
                dst: acc,
                lhs: acc,
                rhs: scaled_dst,
            });
            let frag = prog.join3(decl, mul, apply);
            prog.insert_before(region_start, frag);
        }

        for id in to_remove {
            prog.detach(id);
        }
    }

    let count = lines.len();
    log.record(PASS_NAME, iteration, lines);
    count
}

fn flip(op: CmpOp) -> CmpOp {
    match op {
        CmpOp::Lt => CmpOp::Gt,
        CmpOp::Le => CmpOp::Ge,
        CmpOp::Gt => CmpOp::Lt,
        CmpOp::Ge => CmpOp::Le,
        other => other,
    }
}
