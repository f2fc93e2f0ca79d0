//! Recognizes the natural-loop shape the builder emits for `while`:
//! `LABEL header; cond-computation; IFZ exit, cond; body; GOTO header;
//! LABEL exit`. Shared by the loop-oriented passes so each one doesn't
//! re-derive the same back-edge scan.

use crate::symbol::SymbolId;
use crate::tac::{NodeId, Op, Program};
use std::collections::HashMap;

pub struct NaturalLoop {
    pub header: NodeId,
    pub cond_region: Vec<NodeId>,
    pub guard_ifz: NodeId,
    pub cond: SymbolId,
    pub exit_label: SymbolId,
    pub body: Vec<NodeId>,
    pub goto: NodeId,
    /// True when neither the condition region nor the body contains a
    /// nested label, jump, or branch — the shape the hoisting and
    /// reduction passes require to stay sound.
    pub clean: bool,
}

pub fn find_loops(prog: &Program) -> Vec<NaturalLoop> {
    let ids = prog.linearize();
    let mut label_pos: HashMap<SymbolId, usize> = HashMap::new();
    let mut loops = Vec::new();
    for (i, &id) in ids.iter().enumerate() {
        if let Op::Label { label } = prog.get(id).op {
            label_pos.insert(label, i);
        }
        if let Op::Goto { label } = prog.get(id).op
            && let Some(&header_idx) = label_pos.get(&label)
            && header_idx < i
            && let Some(nl) = classify(prog, &ids, header_idx, i)
        {
            loops.push(nl);
        }
    }
    // Smallest span first so nested loops are processed inside-out.
    loops.sort_by_key(|l| l.cond_region.len() + l.body.len());
    loops
}

fn classify(prog: &Program, ids: &[NodeId], header_idx: usize, goto_idx: usize) -> Option<NaturalLoop> {
    let mut i = header_idx + 1;
    let mut cond_region = Vec::new();
    while i < goto_idx {
        match prog.get(ids[i]).op {
            Op::IfZ { .. } => break,
            Op::Label { .. } | Op::Goto { .. } => return None,
            _ => {
                cond_region.push(ids[i]);
                i += 1;
            }
        }
    }
    if i >= goto_idx {
        return None;
    }
    let guard_ifz = ids[i];
    let (exit_label, cond) = match prog.get(guard_ifz).op {
        Op::IfZ { label, cond } => (label, cond),
        _ => return None,
    };
    if goto_idx + 1 >= ids.len() {
        return None;
    }
    let exit_node = ids[goto_idx + 1];
    match prog.get(exit_node).op {
        Op::Label { label } if label == exit_label => {}
        _ => return None,
    }

    let body: Vec<NodeId> = ids[(i + 1)..goto_idx].to_vec();
    let clean = cond_region
        .iter()
        .chain(body.iter())
        .all(|&id| !matches!(prog.get(id).op, Op::Label { .. } | Op::Goto { .. } | Op::IfZ { .. }));

    Some(NaturalLoop {
        header: ids[header_idx],
        cond_region,
        guard_ifz,
        cond,
        exit_label,
        body,
        goto: ids[goto_idx],
        clean,
    })
}

impl NaturalLoop {
    pub fn exit_label_node(&self, prog: &Program) -> Option<NodeId> {
        prog.label_positions().get(&self.exit_label).copied()
    }

    /// The `Cmp` computing `self.cond`, if the condition region is just
    /// that comparison plus (optionally) the `VAR` declaring its
    /// temporary result — the shape `do_cmp` always emits. Any other
    /// instruction in the region means the condition isn't a bare
    /// comparison and callers should leave the loop alone.
    pub fn cond_cmp(&self, prog: &Program) -> Option<(crate::tac::CmpOp, SymbolId, SymbolId)> {
        let mut found = None;
        for &id in &self.cond_region {
            match prog.get(id).op {
                Op::Var { .. } => {}
                Op::Cmp { op, dst, lhs, rhs } if dst == self.cond && found.is_none() => {
                    found = Some((op, lhs, rhs));
                }
                _ => return None,
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Builder, Exp};
    use crate::tac::CmpOp;
    use crate::types::Type;

    #[test]
    fn recognizes_clean_counted_loop() {
        let mut prog = Program::new();
        Builder::declare_var(&mut prog, Type::Int, "i").unwrap();
        let i = prog.symtab.lookup("i").unwrap();
        let ten = Exp::value(prog.symtab.mk_int_const(10));
        let cond = Builder::do_cmp(&mut prog, CmpOp::Lt, Exp::value(i), ten);
        let one = Exp::value(prog.symtab.mk_int_const(1));
        let step = Builder::do_bin(&mut prog, crate::tac::ArithOp::Add, Exp::value(i), one);
        let body = Builder::do_assign(&mut prog, i, step).unwrap();
        let whole = Builder::do_while(&mut prog, cond, body);
        prog.splice_program(whole);

        let loops = find_loops(&prog);
        assert_eq!(loops.len(), 1);
        assert!(loops[0].clean);
    }
}
