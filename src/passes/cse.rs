//! Common-subexpression elimination via global available-expressions
//! dataflow.

use super::flow::FlowGraph;
use crate::symbol::SymbolId;
use crate::tac::{ArithOp, CmpOp, Op, Program};

const PASS_NAME: &str = "common subexpression elimination";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ExprTag {
    Arith(ArithOp),
    Cmp(CmpOp),
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ExprKey(ExprTag, SymbolId, SymbolId);

struct ExprDef {
    key: ExprKey,
    result: SymbolId,
}

fn expr_key_of(op: &Op) -> Option<(ExprKey, SymbolId)> {
    match *op {
        Op::BinArith { op, dst, lhs, rhs } => {
            let (a, b) = if op.is_commutative() {
                order(lhs, rhs)
            } else {
                (lhs, rhs)
            };
            Some((ExprKey(ExprTag::Arith(op), a, b), dst))
        }
        Op::Cmp { op, dst, lhs, rhs } => {
            let (a, b) = if op.is_commutative() {
                order(lhs, rhs)
            } else {
                (lhs, rhs)
            };
            Some((ExprKey(ExprTag::Cmp(op), a, b), dst))
        }
        Op::Neg { dst, src } => Some((ExprKey(ExprTag::Neg, src, src), dst)),
        _ => None,
    }
}

fn order(a: SymbolId, b: SymbolId) -> (SymbolId, SymbolId) {
    if a <= b { (a, b) } else { (b, a) }
}

fn collect_defs(prog: &Program, fg: &FlowGraph) -> Vec<Option<ExprDef>> {
    fg.nodes
        .iter()
        .map(|&id| {
            let op = &prog.get(id).op;
            expr_key_of(op).and_then(|(key, dst)| {
                if prog.tracked(dst) {
                    Some(ExprDef { key, result: dst })
                } else {
                    None
                }
            })
        })
        .collect()
}

fn analyze(prog: &Program, fg: &FlowGraph, defs: &[Option<ExprDef>]) -> Vec<Vec<bool>> {
    let n = fg.nodes.len();
    let num_defs = defs.len();

    let mut kill: Vec<Vec<bool>> = vec![vec![false; num_defs]; n];
    #[allow(clippy::needless_range_loop)]
    for i in 0..n {
        let op = &prog.get(fg.nodes[i]).op;
        if op.is_opaque_barrier() {
            kill[i] = vec![true; num_defs];
            continue;
        }
        if let Some(def) = op.def() {
            for (did, d) in defs.iter().enumerate() {
                if let Some(d) = d
                    && (d.key.1 == def || d.key.2 == def || d.result == def)
                {
                    kill[i][did] = true;
                }
            }
        }
    }

    let mut out: Vec<Vec<bool>> = vec![vec![false; num_defs]; n];
    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..n {
            let in_set = meet(fg, &out, i, num_defs);
            let mut new_out = in_set;
            for b in 0..num_defs {
                if kill[i][b] {
                    new_out[b] = false;
                }
            }
            if defs[i].is_some() {
                new_out[i] = true;
            }
            if new_out != out[i] {
                out[i] = new_out;
                changed = true;
            }
        }
    }
    out
}

fn meet(fg: &FlowGraph, out: &[Vec<bool>], i: usize, num_defs: usize) -> Vec<bool> {
    if fg.pred[i].is_empty() {
        return vec![false; num_defs];
    }
    let mut acc = out[fg.pred[i][0]].clone();
    for &p in &fg.pred[i][1..] {
        for b in 0..num_defs {
            acc[b] = acc[b] && out[p][b];
        }
    }
    acc
}

pub fn run(prog: &mut Program, log: &mut crate::optlog::OptLog, iteration: u32) -> usize {
    let fg = FlowGraph::build(prog);
    let defs = collect_defs(prog, &fg);
    let out = analyze(prog, &fg, &defs);

    let mut lines = Vec::new();
    for i in 0..fg.nodes.len() {
        let Some(this_def) = &defs[i] else { continue };
        let in_set = meet(&fg, &out, i, defs.len());

        let mut found = None;
        let mut count = 0;
        for (did, d) in defs.iter().enumerate() {
            if did == i {
                continue;
            }
            if let Some(d) = d
                && d.key == this_def.key
                && in_set[did]
            {
                count += 1;
                found = Some(d.result);
            }
        }
        if count == 1 {
            let r = found.unwrap();
            if r != this_def.result {
                let id = fg.nodes[i];
                let op = prog.get(id).op.clone();
                lines.push(format!(
                    "{} = {}  (redundant with earlier computation)",
                    prog.symtab.get(this_def.result).name,
                    op.mnemonic()
                ));
                prog.get_mut(id).op = Op::Copy {
                    dst: this_def.result,
                    src: r,
                };
            }
        }
    }

    let count = lines.len();
    log.record(PASS_NAME, iteration, lines);
    count
}
