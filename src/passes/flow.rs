//! Shared per-instruction successor/predecessor computation used by
//! the whole-program dataflow passes: built once by copy propagation,
//! reused verbatim by CSE and dead-code elimination.

use crate::symbol::SymbolId;
use crate::tac::{NodeId, Op, Program};
use std::collections::HashMap;

/// A linearized instruction stream with an index for fast label
/// lookup and successor/predecessor computation by instruction index
/// rather than `NodeId`, which is what the bitset dataflow passes
/// want to iterate over.
pub struct FlowGraph {
    pub nodes: Vec<NodeId>,
    label_index: HashMap<SymbolId, usize>,
    pub succ: Vec<Vec<usize>>,
    pub pred: Vec<Vec<usize>>,
}

impl FlowGraph {
    pub fn build(prog: &Program) -> FlowGraph {
        let nodes = prog.linearize();
        let mut label_index = HashMap::new();
        for (i, &id) in nodes.iter().enumerate() {
            if let Op::Label { label } = prog.get(id).op {
                label_index.insert(label, i);
            }
        }

        let mut succ = vec![Vec::new(); nodes.len()];
        for (i, &id) in nodes.iter().enumerate() {
            match prog.get(id).op {
                Op::Goto { label } => {
                    if let Some(&t) = label_index.get(&label) {
                        succ[i].push(t);
                    }
                }
                Op::IfZ { label, .. } => {
                    if let Some(&t) = label_index.get(&label) {
                        succ[i].push(t);
                    }
                    if i + 1 < nodes.len() {
                        succ[i].push(i + 1);
                    }
                }
                Op::Return { .. } | Op::EndFunc => {}
                _ => {
                    if i + 1 < nodes.len() {
                        succ[i].push(i + 1);
                    }
                }
            }
        }

        let mut pred = vec![Vec::new(); nodes.len()];
        for (i, ss) in succ.iter().enumerate() {
            for &s in ss {
                pred[s].push(i);
            }
        }

        FlowGraph {
            nodes,
            label_index,
            succ,
            pred,
        }
    }

    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.nodes.iter().position(|&n| n == id)
    }

    pub fn label_target(&self, label: SymbolId) -> Option<usize> {
        self.label_index.get(&label).copied()
    }
}
