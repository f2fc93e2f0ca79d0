//! Strength reduction: turns `t = iv * k` inside a loop, where `iv` is
//! an induction variable advanced by a constant step, into a running
//! accumulator updated alongside the induction variable's own
//! increment instead of recomputed from scratch every iteration.
//!
//! Only applies when the increment of `iv` precedes the multiply in
//! program order within the loop body — that ordering is what lets the
//! accumulate-in-place rewrite reproduce the original value on every
//! pass, including the first. Loops where the multiply comes first are
//! left alone; they're still correct, just not reduced.

use super::loopshape::find_loops;
use crate::symbol::SymbolId;
use crate::tac::{ArithOp, NodeId, Op, Program};
use std::collections::{HashMap, HashSet};

const PASS_NAME: &str = "strength reduction";

struct Induction {
    step: i64,
    incr_node: NodeId,
}

fn int_value(prog: &Program, sym: SymbolId) -> Option<i64> {
    let s = prog.symtab.get(sym);
    if s.kind == crate::symbol::SymbolKind::IntConst {
        s.value
    } else {
        None
    }
}

/// Step of a `BinArith` that advances `var` by a constant: `var + c`,
/// `c + var`, or `var - c`.
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
/// direct self-referencing `BinArith` (as hand-built IR might use) are
/// recognized here; `incr_node` is the instruction where `var` last
/// takes its new value, used by callers to order the increment before
/// its uses.
fn find_inductions(prog: &Program, body: &[NodeId]) -> HashMap<SymbolId, Induction> {
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
                    out.insert(dst, Induction { step, incr_node: id });
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
                    out.insert(dst, Induction { step, incr_node: id });
                }
            }
            _ => {}
        }
    }
    out
}

/// After `p`'s own recurrence has been installed at `p_update_pos` (the
/// body position where `p`'s per-iteration increment now lives), find
/// any `q = p + const` or `q = p - const` elsewhere in the body — still
/// reading `p` after it has been updated for this iteration — and give
/// each `q` its own parallel accumulator seeded from `p`'s current
/// (pre-loop) value and stepped by the same per-iteration `delta`.
#[allow(clippy::too_many_arguments)]
fn reduce_derived_expressions(
    prog: &mut Program,
    header: NodeId,
    body: &[NodeId],
    pos: &HashMap<NodeId, usize>,
    p: SymbolId,
    delta: SymbolId,
    p_update_pos: usize,
    lines: &mut Vec<String>,
) {
    for &qid in body {
        if pos[&qid] < p_update_pos {
            continue;
        }
        let Op::BinArith { op, dst: q, lhs, rhs } = prog.get(qid).op else {
            continue;
        };
        if q == p || !matches!(op, ArithOp::Add | ArithOp::Sub) {
            continue;
        }
        let (const_sym, is_sub) = match op {
            ArithOp::Add if lhs == p && int_value(prog, rhs).is_some() => (rhs, false),
            ArithOp::Add if rhs == p && int_value(prog, lhs).is_some() => (lhs, false),
            ArithOp::Sub if lhs == p && int_value(prog, rhs).is_some() => (rhs, true),
            _ => continue,
        };

        let (q_acc, decl) = crate::builder::Builder::mk_tmp_of(prog, crate::types::Type::Int);
        let seed_op = if is_sub { ArithOp::Sub } else { ArithOp::Add };
        let seed = prog.make(Op::BinArith {
            op: seed_op,
            dst: q_acc,
            lhs: p,
            rhs: const_sym,
        });
        let seed_frag = prog.join(decl, seed);
        prog.insert_before(header, seed_frag);

        let incr = prog.make(Op::BinArith {
            op: ArithOp::Add,
            dst: q_acc,
            lhs: q_acc,
            rhs: delta,
        });
        let after_update = prog
            .get(body[p_update_pos])
            .next
            .expect("loop body is followed by the back-edge goto");
        prog.insert_before(after_update, incr);

        prog.get_mut(qid).op = Op::Copy { dst: q, src: q_acc };
        lines.push(format!(
            "derived {} = {} {} {} reduced to a parallel accumulator",
            prog.symtab.get(q).name,
            prog.symtab.get(p).name,
            if is_sub { "-" } else { "+" },
            prog.symtab.get(const_sym).name,
        ));
    }
}

pub fn run(prog: &mut Program, log: &mut crate::optlog::OptLog, iteration: u32) -> usize {
    let mut lines = Vec::new();
    let loops = find_loops(prog);

    for nl in &loops {
        if !nl.clean {
            continue;
        }
        let body = nl.body.clone();
        let inductions = find_inductions(prog, &body);
        if inductions.is_empty() {
            continue;
        }

        let mut defined_in_body: HashSet<SymbolId> = HashSet::new();
        for &id in &body {
            if let Some(d) = prog.get(id).op.def() {
                defined_in_body.insert(d);
            }
        }

        let pos: HashMap<NodeId, usize> = body.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        for &id in &body {
            let op = prog.get(id).op.clone();
            let Op::BinArith {
                op: ArithOp::Mul,
                dst,
                lhs,
                rhs,
            } = op
            else {
                continue;
            };
            let (iv, k) = if inductions.contains_key(&lhs) {
                (lhs, rhs)
            } else if inductions.contains_key(&rhs) {
                (rhs, lhs)
            } else {
                continue;
            };
            if defined_in_body.contains(&k) {
                continue; // k must be loop-invariant
            }
            let ind = &inductions[&iv];
            let incr_pos = pos[&ind.incr_node];
            let mul_pos = pos[&id];
            if incr_pos >= mul_pos {
                continue; // requires increment-before-use ordering
            }

            let delta = match int_value(prog, k) {
                Some(kv) => prog.symtab.mk_int_const(ind.step.wrapping_mul(kv)),
                None => {
                    let step_sym = prog.symtab.mk_int_const(ind.step);
                    let (delta_dst, decl) = crate::builder::Builder::mk_tmp_of(prog, crate::types::Type::Int);
                    let mul = prog.make(Op::BinArith {
                        op: ArithOp::Mul,
                        dst: delta_dst,
                        lhs: step_sym,
                        rhs: k,
                    });
                    let frag = prog.join(decl, mul);
                    prog.insert_before(nl.header, frag);
                    delta_dst
                }
            };

            let seed = prog.make(Op::BinArith {
                op: ArithOp::Mul,
                dst,
                lhs: iv,
                rhs: k,
            });
            prog.insert_before(nl.header, seed);

            prog.get_mut(id).op = Op::BinArith {
                op: ArithOp::Add,
                dst,
                lhs: dst,
                rhs: delta,
            };
            lines.push(format!(
                "reduced {} = {} * {} to a running accumulator",
                prog.symtab.get(dst).name,
                prog.symtab.get(iv).name,
                prog.symtab.get(k).name
            ));

            reduce_derived_expressions(prog, nl.header, &body, &pos, dst, delta, mul_pos, &mut lines);
        }
    }

    let count = lines.len();
    log.record(PASS_NAME, iteration, lines);
    count
}
