//! Loop unrolling: replaces a counted loop whose trip count is known
//! at compile time and falls within `trip_cap` with `trips` literal
//! copies of its body, dropping the runtime test entirely. Disabled by
//! default — see [`crate::config::PipelineConfig::enable_loopunroll`].

use super::loopreduce::{find_induction, initial_value_before, trip_count};
use super::loopshape::find_loops;
use crate::tac::{Frag, Program};

const PASS_NAME: &str = "loop unrolling";

pub fn run(prog: &mut Program, log: &mut crate::optlog::OptLog, iteration: u32, trip_cap: u32) -> usize {
    let mut lines = Vec::new();
    let loops = find_loops(prog);

    for nl in &loops {
        if !nl.clean {
            continue;
        }
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
        let Some(bound_v) = super::loopreduce::int_value(prog, bound) else {
            continue;
        };
        let ind = &inductions[&iv];
        let Some(trips) = trip_count(effective_cmp, init, bound_v, ind.step) else {
            continue;
        };
        if trips < 0 || trips as u32 > trip_cap {
            continue;
        }

        let mut replicated: Option<Frag> = None;
        for _ in 0..trips {
            let mut copy: Option<Frag> = None;
            for &id in &nl.body {
                let op = prog.get(id).op.clone();
                let clone = prog.make(op);
                copy = Some(match copy {
                    Some(c) => prog.join(c, clone),
                    None => clone,
                });
            }
            if let Some(copy) = copy {
                replicated = Some(match replicated {
                    Some(r) => prog.join(r, copy),
                    None => copy,
                });
            }
        }

        let mut to_remove = vec![nl.header];
        to_remove.extend(nl.cond_region.iter().copied());
        to_remove.push(nl.guard_ifz);
        to_remove.extend(nl.body.iter().copied());
        to_remove.push(nl.goto);
        if let Some(exit) = nl.exit_label_node(prog) {
            to_remove.push(exit);
        }

        if let Some(frag) = replicated {
            prog.insert_before(nl.header, frag);
        }
        lines.push(format!("unrolled {} iterations of the loop at the header", trips));
        for id in to_remove {
            prog.detach(id);
        }
    }

    let count = lines.len();
    log.record(PASS_NAME, iteration, lines);
    count
}

fn flip(op: crate::tac::CmpOp) -> crate::tac::CmpOp {
    use crate::tac::CmpOp::*;
    match op {
        Lt => Gt,
        Le => Ge,
        Gt => Lt,
        Ge => Le,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Builder, Exp};
    use crate::optlog::OptLog;
    use crate::tac::{ArithOp, CmpOp, Op};
    use crate::types::Type;

    #[test]
    fn unrolls_small_constant_trip_loop() {
        // i = 0; while (i<3) { output i; i = i+1; }
        let mut prog = Program::new();
        let mut log = OptLog::new();
        Builder::declare_var(&mut prog, Type::Int, "i").unwrap();
        let i = prog.symtab.lookup("i").unwrap();
        let zero = Exp::value(prog.symtab.mk_int_const(0));
        let init = Builder::do_assign(&mut prog, i, zero).unwrap();

        let three = Exp::value(prog.symtab.mk_int_const(3));
        let cond = Builder::do_cmp(&mut prog, CmpOp::Lt, Exp::value(i), three);
        let out = Builder::do_output(&mut prog, Exp::value(i));
        let one = Exp::value(prog.symtab.mk_int_const(1));
        let inc = Builder::do_bin(&mut prog, ArithOp::Add, Exp::value(i), one);
        let assign_i = Builder::do_assign(&mut prog, i, inc).unwrap();
        let body = prog.join(out, assign_i);
        let while_frag = Builder::do_while(&mut prog, cond, body);
        let whole = prog.join(init, while_frag);
        prog.splice_program(whole);

        run(&mut prog, &mut log, 1, 32);

        let output_count = prog
            .linearize()
            .into_iter()
            .filter(|&id| matches!(prog.get(id).op, Op::Output { .. }))
            .count();
        assert_eq!(output_count, 3);
        assert!(!prog.linearize().iter().any(|&id| matches!(prog.get(id).op, Op::Goto { .. })));
    }
}
