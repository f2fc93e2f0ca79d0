//! Per-function control-flow graph builder.

use crate::symbol::SymbolId;
use crate::tac::{NodeId, Op, Program};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub first: NodeId,
    pub last: NodeId,
    pub label: Option<SymbolId>,
    pub succ: Vec<BlockId>,
    pub pred: Vec<BlockId>,
}

#[derive(Debug, Clone)]
pub struct FunctionCfg {
    pub name: String,
    pub blocks: Vec<Block>,
}

/// Build one CFG per function delimited by `BEGINFUNC`/`ENDFUNC` in
/// the program's TAC list.
pub fn build_all(prog: &Program) -> Vec<FunctionCfg> {
    let nodes = prog.linearize();
    let mut funcs = Vec::new();
    let mut i = 0;
    while i < nodes.len() {
        if matches!(prog.get(nodes[i]).op, Op::BeginFunc) {
            let name = function_name(prog, &nodes, i);
            let end = nodes[i..]
                .iter()
                .position(|&id| matches!(prog.get(id).op, Op::EndFunc))
                .map(|rel| i + rel)
                .unwrap_or(nodes.len() - 1);
            funcs.push(build_one(prog, &nodes[i..=end], name));
            i = end + 1;
        } else {
            i += 1;
        }
    }
    funcs
}

fn function_name(prog: &Program, nodes: &[NodeId], begin_idx: usize) -> String {
    if begin_idx > 0
        && let Op::Label { label } = prog.get(nodes[begin_idx - 1]).op
    {
        return prog.symtab.get(label).name.clone();
    }
    "<anon>".to_string()
}

fn is_leader(prog: &Program, nodes: &[NodeId], idx: usize) -> bool {
    if idx == 0 {
        return true; // first instruction after BEGINFUNC
    }
    if matches!(prog.get(nodes[idx]).op, Op::Label { .. }) {
        return true;
    }
    matches!(
        prog.get(nodes[idx - 1]).op,
        Op::Goto { .. } | Op::IfZ { .. } | Op::Return { .. } | Op::EndFunc
    )
}

fn build_one(prog: &Program, func_nodes: &[NodeId], name: String) -> FunctionCfg {
    // func_nodes[0] is BEGINFUNC itself; blocks start after it.
    let body = &func_nodes[1..];
    let mut leader_idxs = Vec::new();
    for idx in 0..body.len() {
        if is_leader(prog, body, idx) {
            leader_idxs.push(idx);
        }
    }

    let mut blocks = Vec::new();
    let mut label_to_block: HashMap<SymbolId, BlockId> = HashMap::new();
    for (bi, &start) in leader_idxs.iter().enumerate() {
        let end = leader_idxs
            .get(bi + 1)
            .copied()
            .unwrap_or(body.len());
        let first = body[start];
        let last = body[end - 1];
        let label = match prog.get(first).op {
            Op::Label { label } => Some(label),
            _ => None,
        };
        let id = BlockId(bi as u32);
        if let Some(l) = label {
            label_to_block.insert(l, id);
        }
        blocks.push(Block {
            id,
            first,
            last,
            label,
            succ: Vec::new(),
            pred: Vec::new(),
        });
    }

    for bi in 0..blocks.len() {
        let last_op = prog.get(blocks[bi].last).op.clone();
        let mut succs = Vec::new();
        match last_op {
            Op::Goto { label } => {
                if let Some(&target) = label_to_block.get(&label) {
                    succs.push(target);
                }
            }
            Op::IfZ { label, .. } => {
                if let Some(&target) = label_to_block.get(&label) {
                    succs.push(target);
                }
                if bi + 1 < blocks.len() {
                    succs.push(blocks[bi + 1].id);
                }
            }
            Op::Return { .. } | Op::EndFunc => {}
            _ => {
                if bi + 1 < blocks.len() {
                    succs.push(blocks[bi + 1].id);
                }
            }
        }
        blocks[bi].succ = succs;
    }

    let succs_snapshot: Vec<(BlockId, Vec<BlockId>)> =
        blocks.iter().map(|b| (b.id, b.succ.clone())).collect();
    for (from, succs) in succs_snapshot {
        for to in succs {
            blocks[to.0 as usize].pred.push(from);
        }
    }

    FunctionCfg { name, blocks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Builder, Exp};
    use crate::symbol::SymbolId;
    use crate::tac::ArithOp;
    use crate::types::Type;

    fn build_if_else_function(prog: &mut Program) {
        Builder::declare_var(prog, Type::Int, "a").unwrap();
        let a: SymbolId = prog.symtab.lookup("a").unwrap();
        let cond = Exp::value(prog.symtab.mk_int_const(1));
        let one = Exp::value(prog.symtab.mk_int_const(1));
        let two = Exp::value(prog.symtab.mk_int_const(2));
        let then_assign = Builder::do_assign(prog, a, one).unwrap();
        let else_assign = Builder::do_assign(prog, a, two).unwrap();
        let body = Builder::do_test(prog, cond, then_assign, else_assign);
        let func = Builder::do_func(prog, "main", None, body);
        prog.splice_program(func);
        let _ = ArithOp::Add;
    }

    #[test]
    fn leaders_partition_if_else_into_five_blocks() {
        let mut prog = Program::new();
        build_if_else_function(&mut prog);
        let cfgs = build_all(&prog);
        assert_eq!(cfgs.len(), 1);
        assert_eq!(cfgs[0].name, "main");
        // entry, then, (goto falls through? no) else-label, else, end-label
        assert!(cfgs[0].blocks.len() >= 4);
    }

    #[test]
    fn ifz_block_has_two_successors() {
        let mut prog = Program::new();
        build_if_else_function(&mut prog);
        let cfgs = build_all(&prog);
        let entry = &cfgs[0].blocks[0];
        assert_eq!(entry.succ.len(), 2);
    }

    #[test]
    fn predecessors_are_reverse_of_successors() {
        let mut prog = Program::new();
        build_if_else_function(&mut prog);
        let cfgs = build_all(&prog);
        for b in &cfgs[0].blocks {
            for &s in &b.succ {
                let target = &cfgs[0].blocks[s.0 as usize];
                assert!(target.pred.contains(&b.id));
            }
        }
    }
}
