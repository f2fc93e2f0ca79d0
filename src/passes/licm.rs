//! Loop-invariant code motion: hoists pure computations whose operands
//! are all defined outside the loop body to a pre-header inserted just
//! before the loop's header label.

use super::loopshape::find_loops;
use crate::symbol::SymbolId;
use crate::tac::{Frag, NodeId, Program};
use std::collections::HashSet;

const PASS_NAME: &str = "loop-invariant code motion";

pub fn run(prog: &mut Program, log: &mut crate::optlog::OptLog, iteration: u32) -> usize {
    let mut lines = Vec::new();
    let loops = find_loops(prog);

    for nl in &loops {
        if !nl.clean {
            continue;
        }
        let region: Vec<NodeId> = nl.cond_region.iter().chain(nl.body.iter()).copied().collect();

        let mut defined_in_region: HashSet<SymbolId> = HashSet::new();
        let mut def_count: std::collections::HashMap<SymbolId, u32> = std::collections::HashMap::new();
        for &id in &region {
            if let Some(d) = prog.get(id).op.def() {
                defined_in_region.insert(d);
                *def_count.entry(d).or_insert(0) += 1;
            }
        }

        for &id in &region {
            let op = prog.get(id).op.clone();
            if !op.is_pure() {
                continue;
            }
            let Some(dst) = op.def() else { continue };
            if !prog.symtab.get(dst).name.starts_with('t') {
                continue;
            }
            if def_count.get(&dst).copied().unwrap_or(0) != 1 {
                continue;
            }
            let uses = op.uses();
            if uses.iter().any(|u| defined_in_region.contains(u)) {
                continue;
            }
            lines.push(format!(
                "hoisted {} = {} to loop pre-header",
                prog.symtab.get(dst).name,
                op.mnemonic()
            ));
            prog.detach(id);
            prog.insert_before(nl.header, Frag { first: id, last: id });
            defined_in_region.remove(&dst);
        }
    }

    let count = lines.len();
    log.record(PASS_NAME, iteration, lines);
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Builder, Exp};
    use crate::optlog::OptLog;
    use crate::tac::{ArithOp, CmpOp, Op};
    use crate::types::Type;

    #[test]
    fn hoists_loop_invariant_multiply() {
        // a, b declared outside; while (i<10) { t = a*b; x = x + t; i = i+1; }
        let mut prog = Program::new();
        let mut log = OptLog::new();
        Builder::declare_var(&mut prog, Type::Int, "a").unwrap();
        Builder::declare_var(&mut prog, Type::Int, "b").unwrap();
        Builder::declare_var(&mut prog, Type::Int, "x").unwrap();
        Builder::declare_var(&mut prog, Type::Int, "i").unwrap();
        let a = prog.symtab.lookup("a").unwrap();
        let b = prog.symtab.lookup("b").unwrap();
        let x = prog.symtab.lookup("x").unwrap();
        let i = prog.symtab.lookup("i").unwrap();

        let ten = Exp::value(prog.symtab.mk_int_const(10));
        let cond = Builder::do_cmp(&mut prog, CmpOp::Lt, Exp::value(i), ten);

        let mul = Builder::do_bin(&mut prog, ArithOp::Mul, Exp::value(a), Exp::value(b));
        let add_x = Builder::do_bin(&mut prog, ArithOp::Add, Exp::value(x), mul);
        let assign_x = Builder::do_assign(&mut prog, x, add_x).unwrap();
        let one = Exp::value(prog.symtab.mk_int_const(1));
        let inc = Builder::do_bin(&mut prog, ArithOp::Add, Exp::value(i), one);
        let assign_i = Builder::do_assign(&mut prog, i, inc).unwrap();
        let body = prog.join(assign_x, assign_i);

        let whole = Builder::do_while(&mut prog, cond, body);
        prog.splice_program(whole);

        run(&mut prog, &mut log, 1);

        let ids = prog.linearize();
        let mul_idx = ids
            .iter()
            .position(|&id| matches!(prog.get(id).op, Op::BinArith { op: ArithOp::Mul, .. }))
            .expect("multiply should still exist");
        let header_idx = ids
            .iter()
            .position(|&id| matches!(prog.get(id).op, Op::Label { .. }))
            .unwrap();
        assert!(mul_idx < header_idx, "multiply should be hoisted before the loop header");
    }

    #[test]
    fn does_not_hoist_a_copy_into_a_named_variable() {
        // while (i<n) { x = a + b; i = i + 1; }  -- `a+b`'s temporary is
        // loop-invariant and may hoist, but the COPY into the named `x`
        // must stay inside the loop: if the loop never runs, `x` must
        // never be touched.
        let mut prog = Program::new();
        let mut log = OptLog::new();
        Builder::declare_var(&mut prog, Type::Int, "a").unwrap();
        Builder::declare_var(&mut prog, Type::Int, "b").unwrap();
        Builder::declare_var(&mut prog, Type::Int, "x").unwrap();
        Builder::declare_var(&mut prog, Type::Int, "i").unwrap();
        Builder::declare_var(&mut prog, Type::Int, "n").unwrap();
        let a = prog.symtab.lookup("a").unwrap();
        let b = prog.symtab.lookup("b").unwrap();
        let x = prog.symtab.lookup("x").unwrap();
        let i = prog.symtab.lookup("i").unwrap();
        let n = prog.symtab.lookup("n").unwrap();

        let cond = Builder::do_cmp(&mut prog, CmpOp::Lt, Exp::value(i), Exp::value(n));

        let sum = Builder::do_bin(&mut prog, ArithOp::Add, Exp::value(a), Exp::value(b));
        let assign_x = Builder::do_assign(&mut prog, x, sum).unwrap();
        let one = Exp::value(prog.symtab.mk_int_const(1));
        let inc = Builder::do_bin(&mut prog, ArithOp::Add, Exp::value(i), one);
        let assign_i = Builder::do_assign(&mut prog, i, inc).unwrap();
        let body = prog.join(assign_x, assign_i);

        let whole = Builder::do_while(&mut prog, cond, body);
        prog.splice_program(whole);

        run(&mut prog, &mut log, 1);

        let ids = prog.linearize();
        let header_idx = ids
            .iter()
            .position(|&id| matches!(prog.get(id).op, Op::Label { .. }))
            .unwrap();
        let copy_into_x_idx = ids
            .iter()
            .position(|&id| matches!(prog.get(id).op, Op::Copy { dst, .. } if dst == x))
            .expect("assignment to x should still exist");
        assert!(
            copy_into_x_idx > header_idx,
            "copy into the named variable x must stay inside the loop"
        );
    }
}
