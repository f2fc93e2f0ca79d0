//! Text renderers for the TAC instruction stream, the per-function
//! CFG, and registered struct layouts — the inspection surface the
//! `mccopt` CLI exposes through `dump-tac`/`--keep-ir`-style flags.

use crate::cfg;
use crate::symbol::{SymbolId, SymbolKind};
use crate::tac::{NodeId, Op, Program};

fn render_symbol(prog: &Program, id: SymbolId) -> String {
    let s = prog.symtab.get(id);
    match s.kind {
        SymbolKind::IntConst => s.value.unwrap_or(0).to_string(),
        SymbolKind::CharConst => s.name.clone(),
        SymbolKind::TextLiteral => format!("L{}", s.label_id.unwrap_or(0)),
        _ => s.name.clone(),
    }
}

fn render_instruction(prog: &Program, op: &Op) -> String {
    let sym = |id: SymbolId| render_symbol(prog, id);
    match *op {
        Op::Undef => "undef".to_string(),
        Op::BinArith { op, dst, lhs, rhs } => {
            format!("{} = {} {} {}", sym(dst), sym(lhs), op.symbol(), sym(rhs))
        }
        Op::Cmp { op, dst, lhs, rhs } => {
            format!("{} = ({} {} {})", sym(dst), sym(lhs), op.symbol(), sym(rhs))
        }
        Op::Neg { dst, src } => format!("{} = - {}", sym(dst), sym(src)),
        Op::Copy { dst, src } => format!("{} = {}", sym(dst), sym(src)),
        Op::Addr { dst, src } => format!("{} = &{}", sym(dst), sym(src)),
        Op::Load { dst, addr } => format!("{} = *{}", sym(dst), sym(addr)),
        Op::Store { addr, src } => format!("*{} = {}", sym(addr), sym(src)),
        Op::Goto { label } => format!("goto {}", sym(label)),
        Op::IfZ { label, cond } => format!("ifz {} goto {}", sym(cond), sym(label)),
        Op::Label { label } => format!("label {}", sym(label)),
        Op::Actual { arg } => format!("actual {}", sym(arg)),
        Op::Formal { param } => format!("formal {}", sym(param)),
        Op::Call { dst: Some(dst), func } => format!("{} = call {}", sym(dst), sym(func)),
        Op::Call { dst: None, func } => format!("call {}", sym(func)),
        Op::Return { value: Some(v) } => format!("return {}", sym(v)),
        Op::Return { value: None } => "return".to_string(),
        Op::BeginFunc => "begin".to_string(),
        Op::EndFunc => "end".to_string(),
        Op::Var { sym: s } => format!("var {}", sym(s)),
        Op::Input { dst } => format!("input {}", sym(dst)),
        Op::Output { src } => format!("output {}", sym(src)),
    }
}

/// Render the whole program as one TAC instruction per line, in
/// program order.
pub fn render_tac(prog: &Program) -> String {
    let mut out = String::new();
    for id in prog.linearize() {
        out.push_str(&render_instruction(prog, &prog.get(id).op));
        out.push('\n');
    }
    out
}

/// Render the per-function CFG: one `## Function <name>` section per
/// function, each block as `B<id>[ [label]]:` followed by its
/// instructions and a `succ:` line.
pub fn render_cfg(prog: &Program) -> String {
    let mut out = String::new();
    out.push_str("# cfg\n");
    for func in cfg::build_all(prog) {
        out.push_str(&format!("## Function {}\n", func.name));
        for block in &func.blocks {
            let label_part = match block.label {
                Some(l) => format!(" [{}]", render_symbol(prog, l)),
                None => String::new(),
            };
            out.push_str(&format!("B{}{}:\n", block.id.0, label_part));

            let mut cur: Option<NodeId> = Some(block.first);
            while let Some(id) = cur {
                out.push_str(&format!("    {}\n", render_instruction(prog, &prog.get(id).op)));
                if id == block.last {
                    break;
                }
                cur = prog.get(id).next;
            }

            let succs: Vec<String> = block.succ.iter().map(|b| format!("B{}", b.0)).collect();
            out.push_str(&format!("    succ: {}\n", succs.join(", ")));
        }
    }
    out
}

/// Render registered struct layouts: an `obj.c`-equivalent flat dump
/// of each struct's size, alignment, and per-field offsets.
pub fn render_layouts(prog: &Program) -> String {
    let mut out = String::new();
    out.push_str("# layouts\n");
    let mut names: Vec<&String> = prog.types.names().collect();
    names.sort();
    for name in names {
        let def = prog.types.get(name).expect("name came from the table itself");
        out.push_str(&format!(
            "struct {} (size={}, align={})\n",
            def.name,
            def.size(),
            def.align()
        ));
        for field in &def.fields {
            out.push_str(&format!("  {}: {} @{}\n", field.name, field.ty, field.offset));
        }
    }
    out
}
