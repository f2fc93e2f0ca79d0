//! IR builder: syntax-directed helpers that turn parser events into
//! correctly-linked TAC.
//!
//! Every operation returns either a bare [`Frag`] (a statement has no
//! value) or an [`Exp`] (an expression has a result symbol plus the
//! fragment that computes it). Fragments compose via [`Program::join`]
//! — the "join convention" — so callers never touch
//! `prev`/`next` directly.

use crate::symbol::SymbolId;
use crate::tac::{ArithOp, CmpOp, Frag, Op, Program};
use crate::types::Type;

/// An expression value: the symbol holding the result, plus the
/// (possibly absent, for bare symbol references) fragment that
/// computes it.
#[derive(Debug, Clone, Copy)]
pub struct Exp {
    pub ret: SymbolId,
    pub tac: Option<Frag>,
}

impl Exp {
    pub fn value(ret: SymbolId) -> Exp {
        Exp { ret, tac: None }
    }

    pub fn computed(ret: SymbolId, tac: Frag) -> Exp {
        Exp {
            ret,
            tac: Some(tac),
        }
    }
}

/// Concatenate two optional fragments, treating `None` as "no
/// instructions" rather than an error.
pub fn join_opt(prog: &mut Program, a: Option<Frag>, b: Option<Frag>) -> Option<Frag> {
    match (a, b) {
        (Some(a), Some(b)) => Some(prog.join(a, b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn join3_opt(prog: &mut Program, a: Option<Frag>, b: Option<Frag>, c: Option<Frag>) -> Option<Frag> {
    let ab = join_opt(prog, a, b);
    join_opt(prog, ab, c)
}

pub struct Builder;

impl Builder {
    pub fn declare_var(prog: &mut Program, ty: Type, name: &str) -> Result<Frag, String> {
        let sym = prog.symtab.declare_var(name, ty)?;
        Ok(prog.make(Op::Var { sym }))
    }

    pub fn declare_ptr_var(prog: &mut Program, base: Type, name: &str) -> Result<Frag, String> {
        Builder::declare_var(prog, Type::ptr(base), name)
    }

    pub fn declare_array_var(
        prog: &mut Program,
        base: Type,
        dims: &[i64],
        name: &str,
    ) -> Result<Frag, String> {
        let ty = dims
            .iter()
            .rev()
            .fold(base, |elem, &d| Type::array(elem, d));
        Builder::declare_var(prog, ty, name)
    }

    /// Fresh `Int` temporary with no declaration attached — the
    /// caller emits `VAR` when the temp first enters the TAC (see
    /// [`Builder::mk_tmp_of`] for the common case where that happens
    /// immediately).
    pub fn mk_tmp(prog: &mut Program) -> SymbolId {
        prog.symtab.mk_tmp(Type::Int)
    }

    /// Fresh temporary of `ty`, with its `VAR` declaration already
    /// emitted as a one-instruction fragment.
    pub fn mk_tmp_of(prog: &mut Program, ty: Type) -> (SymbolId, Frag) {
        let sym = prog.symtab.mk_tmp(ty);
        let frag = prog.make(Op::Var { sym });
        (sym, frag)
    }

    pub fn do_assign(prog: &mut Program, var: SymbolId, exp: Exp) -> Result<Frag, String> {
        use crate::symbol::SymbolKind;
        if prog.symtab.get(var).kind != SymbolKind::Var {
            return Err("assignment target is not a variable".to_string());
        }
        let copy = prog.make(Op::Copy {
            dst: var,
            src: exp.ret,
        });
        Ok(join_opt(prog, exp.tac, Some(copy)).unwrap())
    }

    /// `{ADD,SUB,MUL,DIV}`. Constant folding is deliberately *not*
    /// done here — it is the constant-folding pass's job.
    pub fn do_bin(prog: &mut Program, op: ArithOp, e1: Exp, e2: Exp) -> Exp {
        let (dst, decl) = Builder::mk_tmp_of(prog, Type::Int);
        let compute = prog.make(Op::BinArith {
            op,
            dst,
            lhs: e1.ret,
            rhs: e2.ret,
        });
        let operands = join3_opt(prog, e1.tac, e2.tac, Some(decl));
        let whole = join_opt(prog, operands, Some(compute));
        Exp::computed(dst, whole.unwrap())
    }

    pub fn do_cmp(prog: &mut Program, op: CmpOp, e1: Exp, e2: Exp) -> Exp {
        let (dst, decl) = Builder::mk_tmp_of(prog, Type::Int);
        let compute = prog.make(Op::Cmp {
            op,
            dst,
            lhs: e1.ret,
            rhs: e2.ret,
        });
        let operands = join3_opt(prog, e1.tac, e2.tac, Some(decl));
        let whole = join_opt(prog, operands, Some(compute));
        Exp::computed(dst, whole.unwrap())
    }

    pub fn do_un(prog: &mut Program, e: Exp) -> Exp {
        let (dst, decl) = Builder::mk_tmp_of(prog, Type::Int);
        let compute = prog.make(Op::Neg { dst, src: e.ret });
        let whole = join3_opt(prog, e.tac, Some(decl), Some(compute));
        Exp::computed(dst, whole.unwrap())
    }

    pub fn do_addr(prog: &mut Program, var: SymbolId) -> Exp {
        let base_ty = prog
            .symtab
            .get(var)
            .ty
            .clone()
            .unwrap_or(Type::Int);
        let (dst, decl) = Builder::mk_tmp_of(prog, Type::ptr(base_ty));
        let compute = prog.make(Op::Addr { dst, src: var });
        let whole = prog.join(decl, compute);
        Exp::computed(dst, whole)
    }

    /// Dereference a pointer expression; result type is the pointer's
    /// base, defaulting to `Int` if the pointer's base is unknown.
    pub fn do_deref(prog: &mut Program, addr: Exp) -> Exp {
        let base_ty = match &prog.symtab.get(addr.ret).ty {
            Some(Type::Ptr(base)) => (**base).clone(),
            _ => Type::Int,
        };
        let (dst, decl) = Builder::mk_tmp_of(prog, base_ty);
        let compute = prog.make(Op::Load {
            dst,
            addr: addr.ret,
        });
        let whole = join3_opt(prog, addr.tac, Some(decl), Some(compute)).unwrap();
        Exp::computed(dst, whole)
    }

    pub fn do_store(prog: &mut Program, addr: Exp, rhs: Exp) -> Frag {
        let store = prog.make(Op::Store {
            addr: addr.ret,
            src: rhs.ret,
        });
        join3_opt(prog, addr.tac, rhs.tac, Some(store)).unwrap()
    }

    pub fn do_input(prog: &mut Program, var: SymbolId) -> Frag {
        prog.make(Op::Input { dst: var })
    }

    pub fn do_output(prog: &mut Program, exp: Exp) -> Frag {
        let out = prog.make(Op::Output { src: exp.ret });
        join_opt(prog, exp.tac, Some(out)).unwrap()
    }

    /// `if (cond) then_frag`: a fresh label, `IFZ L, cond`, the then
    /// branch, then `LABEL L`.
    pub fn do_if(prog: &mut Program, cond: Exp, then_frag: Frag) -> Frag {
        let label = prog.symtab.mk_label();
        let ifz = prog.make(Op::IfZ {
            label,
            cond: cond.ret,
        });
        let lbl = prog.make(Op::Label { label });
        let head = join_opt(prog, cond.tac, Some(ifz)).unwrap();
        let with_then = prog.join(head, then_frag);
        prog.join(with_then, lbl)
    }

    /// `if (cond) then_frag else else_frag`.
    pub fn do_test(prog: &mut Program, cond: Exp, then_frag: Frag, else_frag: Frag) -> Frag {
        let l1 = prog.symtab.mk_label();
        let l2 = prog.symtab.mk_label();
        let ifz = prog.make(Op::IfZ {
            label: l1,
            cond: cond.ret,
        });
        let goto_end = prog.make(Op::Goto { label: l2 });
        let lbl1 = prog.make(Op::Label { label: l1 });
        let lbl2 = prog.make(Op::Label { label: l2 });

        let head = join_opt(prog, cond.tac, Some(ifz)).unwrap();
        let with_then = prog.join(head, then_frag);
        let with_goto = prog.join(with_then, goto_end);
        let with_else_label = prog.join(with_goto, lbl1);
        let with_else = prog.join(with_else_label, else_frag);
        prog.join(with_else, lbl2)
    }

    /// `while (cond) body_frag`. The back-edge is a plain `GOTO` to
    /// the header label, not a structured loop construct — this is
    /// what makes loops recognizable as "a back-edge `GOTO` whose
    /// target lies earlier in the function" for CFG/LICM/LSR purposes.
    pub fn do_while(prog: &mut Program, cond: Exp, body_frag: Frag) -> Frag
    where
    {
        // `cond` is rebuilt at the header position by the caller: the
        // parser must evaluate the condition once to produce `cond`,
        // and the label for the header precedes it.
        let header = prog.symtab.mk_label();
        let header_lbl = prog.make(Op::Label { label: header });
        let back_edge = prog.make(Op::Goto { label: header });
        let body_then_back = prog.join(body_frag, back_edge);
        let if_part = Builder::do_if(prog, cond, body_then_back);
        prog.join(header_lbl, if_part)
    }

    /// Append one `ACTUAL` per argument (in order), then a `CALL`.
    fn emit_call(prog: &mut Program, name: &str, args: &[Exp], result_ty: Option<Type>) -> Exp {
        let func = prog
            .symtab
            .lookup(name)
            .unwrap_or_else(|| prog.symtab.declare_func(name, true).unwrap());
        let mut frag: Option<Frag> = None;
        for arg in args {
            frag = join_opt(prog, frag, arg.tac);
        }
        for arg in args {
            let actual = prog.make(Op::Actual { arg: arg.ret });
            frag = join_opt(prog, frag, Some(actual));
        }
        match result_ty {
            Some(ty) => {
                let (dst, decl) = Builder::mk_tmp_of(prog, ty);
                let call = prog.make(Op::Call {
                    dst: Some(dst),
                    func,
                });
                frag = join3_opt(prog, frag, Some(decl), Some(call));
                Exp::computed(dst, frag.unwrap())
            }
            None => {
                let call = prog.make(Op::Call { dst: None, func });
                frag = join_opt(prog, frag, Some(call));
                // Void calls have no meaningful `ret`; reuse `func`
                // purely so `Exp`'s shape stays uniform for callers
                // that discard it.
                Exp::computed(func, frag.unwrap())
            }
        }
    }

    pub fn do_call(prog: &mut Program, name: &str, args: &[Exp]) -> Frag {
        Builder::emit_call(prog, name, args, None).tac.unwrap()
    }

    pub fn do_call_ret(prog: &mut Program, name: &str, args: &[Exp], result_ty: Type) -> Exp {
        Builder::emit_call(prog, name, args, Some(result_ty))
    }

    /// `LABEL <name>; BEGINFUNC; formals; body; ENDFUNC`.
    pub fn do_func(
        prog: &mut Program,
        func_name: &str,
        formals_frag: Option<Frag>,
        body_frag: Frag,
    ) -> Frag {
        let label = prog.symtab.mk_func_label(func_name);
        let lbl = prog.make(Op::Label { label });
        let begin = prog.make(Op::BeginFunc);
        let end = prog.make(Op::EndFunc);
        let with_label = prog.join(lbl, begin);
        let with_formals = join_opt(prog, Some(with_label), formals_frag).unwrap();
        let with_body = prog.join(with_formals, body_frag);
        prog.join(with_body, end)
    }

    pub fn do_formal(prog: &mut Program, param: SymbolId) -> Frag {
        prog.make(Op::Formal { param })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolKind;

    fn var_exp(prog: &mut Program, name: &str, ty: Type) -> (Exp, Frag) {
        let decl = Builder::declare_var(prog, ty, name).unwrap();
        let sym = prog.symtab.lookup(name).unwrap();
        (Exp::value(sym), decl)
    }

    #[test]
    fn do_assign_requires_variable_target() {
        let mut prog = Program::new();
        let k = prog.symtab.mk_int_const(5);
        assert!(prog.symtab.get(k).kind == SymbolKind::IntConst);
        let exp = Exp::value(k);
        // assigning *into* a constant is an error
        assert!(Builder::do_assign(&mut prog, k, exp).is_err());
    }

    #[test]
    fn do_bin_joins_operand_fragments_and_appends_result() {
        let mut prog = Program::new();
        let (_, _) = var_exp(&mut prog, "x", Type::Int);
        let a = Exp::value(prog.symtab.mk_int_const(2));
        let b = Exp::value(prog.symtab.mk_int_const(3));
        let sum = Builder::do_bin(&mut prog, ArithOp::Add, a, b);
        prog.splice_program(sum.tac.unwrap());
        let ids = prog.linearize();
        // VAR t0; ADD t0, 2, 3
        assert_eq!(ids.len(), 2);
        match &prog.get(ids[1]).op {
            Op::BinArith { dst, lhs, rhs, .. } => {
                assert_eq!(*dst, sum.ret);
                assert_eq!(*lhs, a.ret);
                assert_eq!(*rhs, b.ret);
            }
            other => panic!("expected BinArith, got {:?}", other),
        }
    }

    #[test]
    fn do_while_back_edge_targets_header_label() {
        let mut prog = Program::new();
        let cond_sym = prog.symtab.mk_int_const(1);
        let cond = Exp::value(cond_sym);
        let body = prog.make(Op::Output { src: cond_sym });
        let whole = Builder::do_while(&mut prog, cond, body);
        prog.splice_program(whole);
        let ids = prog.linearize();
        let header_label = match &prog.get(ids[0]).op {
            Op::Label { label } => *label,
            other => panic!("expected header LABEL first, got {:?}", other),
        };
        let last = *ids.last().unwrap();
        match &prog.get(last).op {
            // do_if appends LABEL after the back-edge GOTO; the GOTO
            // itself is second to last.
            Op::Label { .. } => {}
            other => panic!("expected trailing LABEL, got {:?}", other),
        }
        let goto_idx = ids.len() - 2;
        match &prog.get(ids[goto_idx]).op {
            Op::Goto { label } => assert_eq!(*label, header_label),
            other => panic!("expected back-edge GOTO, got {:?}", other),
        }
    }

    #[test]
    fn call_emits_all_argument_tac_before_any_actual() {
        // f(a+1, b+2): both additions must be computed before the
        // first ACTUAL is emitted, not interleaved one-argument-at-a-time.
        let mut prog = Program::new();
        let (a, a_decl) = var_exp(&mut prog, "a", Type::Int);
        let (b, b_decl) = var_exp(&mut prog, "b", Type::Int);
        let decls = prog.join(a_decl, b_decl);
        prog.splice_program(decls);

        let one = Exp::value(prog.symtab.mk_int_const(1));
        let two = Exp::value(prog.symtab.mk_int_const(2));
        let arg1 = Builder::do_bin(&mut prog, ArithOp::Add, a, one);
        let arg2 = Builder::do_bin(&mut prog, ArithOp::Add, b, two);
        let call = Builder::do_call(&mut prog, "f", &[arg1, arg2]);
        prog.splice_program(call);

        let ids = prog.linearize();
        let actual_positions: Vec<usize> = ids
            .iter()
            .enumerate()
            .filter(|&(_, &id)| matches!(prog.get(id).op, Op::Actual { .. }))
            .map(|(i, _)| i)
            .collect();
        let last_arith_pos = ids
            .iter()
            .position(|&id| matches!(prog.get(id).op, Op::BinArith { dst, .. } if dst == arg2.ret))
            .unwrap();
        assert_eq!(actual_positions.len(), 2);
        assert!(
            actual_positions.iter().all(|&p| p > last_arith_pos),
            "both ACTUALs must follow both arguments' TAC, not interleave with them"
        );
    }
}
