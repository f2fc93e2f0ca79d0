//! Three-address code: the instruction model and the global,
//! arena-indexed doubly-linked instruction list.
//!
//! Instructions and symbols are not linked by raw
//! pointer: the list lives in one arena (`Program::nodes`) and
//! `prev`/`next` are `Option<NodeId>` indices. Detaching a node clears
//! both neighbor links and, if the node was the head or tail, updates
//! `Program::head`/`Program::tail` — there is no way to end up with a
//! dangling link into a detached node.
//!
//! Opcodes are a tagged variant over semantic groups (arithmetic,
//! comparison, move, memory, control, call, declaration, I/O) rather
//! than a flat opcode byte plus three generic operand slots; `def()`/
//! `uses()`/`is_pure()` are total functions over the variant instead
//! of opcode-switch duplication scattered across every pass.

use crate::symbol::{Scope, SymbolId, SymbolTable};
use std::collections::HashMap;

/// Index into [`Program::nodes`]. Stable once assigned; never reused
/// after a node is detached (the arena only grows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ArithOp {
    pub fn eval(self, a: i64, b: i64) -> Option<i64> {
        match self {
            ArithOp::Add => Some(a.wrapping_add(b)),
            ArithOp::Sub => Some(a.wrapping_sub(b)),
            ArithOp::Mul => Some(a.wrapping_mul(b)),
            // Division by zero is never folded.
            ArithOp::Div => {
                if b == 0 {
                    None
                } else {
                    Some(a.wrapping_div(b))
                }
            }
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }

    /// Arithmetic ops whose result is commutative, for canonical
    /// expression keys in CSE.
    pub fn is_commutative(self) -> bool {
        matches!(self, ArithOp::Add | ArithOp::Mul)
    }
}

impl CmpOp {
    pub fn eval(self, a: i64, b: i64) -> bool {
        match self {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    pub fn is_commutative(self) -> bool {
        matches!(self, CmpOp::Eq | CmpOp::Ne)
    }
}

/// A three-address instruction, tagged by semantic group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Undef,
    BinArith {
        op: ArithOp,
        dst: SymbolId,
        lhs: SymbolId,
        rhs: SymbolId,
    },
    Cmp {
        op: CmpOp,
        dst: SymbolId,
        lhs: SymbolId,
        rhs: SymbolId,
    },
    Neg {
        dst: SymbolId,
        src: SymbolId,
    },
    Copy {
        dst: SymbolId,
        src: SymbolId,
    },
    Addr {
        dst: SymbolId,
        src: SymbolId,
    },
    Load {
        dst: SymbolId,
        addr: SymbolId,
    },
    Store {
        addr: SymbolId,
        src: SymbolId,
    },
    Goto {
        label: SymbolId,
    },
    IfZ {
        label: SymbolId,
        cond: SymbolId,
    },
    Label {
        label: SymbolId,
    },
    Actual {
        arg: SymbolId,
    },
    Formal {
        param: SymbolId,
    },
    Call {
        dst: Option<SymbolId>,
        func: SymbolId,
    },
    Return {
        value: Option<SymbolId>,
    },
    BeginFunc,
    EndFunc,
    Var {
        sym: SymbolId,
    },
    Input {
        dst: SymbolId,
    },
    Output {
        src: SymbolId,
    },
}

impl Op {
    /// The symbol this instruction defines, if any.
    pub fn def(&self) -> Option<SymbolId> {
        match *self {
            Op::BinArith { dst, .. }
            | Op::Cmp { dst, .. }
            | Op::Neg { dst, .. }
            | Op::Copy { dst, .. }
            | Op::Addr { dst, .. }
            | Op::Load { dst, .. }
            | Op::Input { dst, .. } => Some(dst),
            Op::Call { dst, .. } => dst,
            _ => None,
        }
    }

    /// The symbols this instruction reads, excluding labels (those
    /// are control targets, not data uses).
    pub fn uses(&self) -> Vec<SymbolId> {
        match *self {
            Op::BinArith { lhs, rhs, .. } | Op::Cmp { lhs, rhs, .. } => vec![lhs, rhs],
            Op::Neg { src, .. } | Op::Copy { src, .. } | Op::Addr { src, .. } => vec![src],
            Op::Load { addr, .. } => vec![addr],
            Op::Store { addr, src } => vec![addr, src],
            Op::IfZ { cond, .. } => vec![cond],
            Op::Actual { arg } => vec![arg],
            Op::Return { value: Some(v) } => vec![v],
            Op::Output { src } => vec![src],
            _ => Vec::new(),
        }
    }

    /// Side-effect-free arithmetic/compare/copy ops: the set dead-code
    /// elimination may remove when their result is unused, and the set
    /// CSE/LICM consider as candidate expressions.
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            Op::BinArith { .. } | Op::Cmp { .. } | Op::Neg { .. } | Op::Copy { .. }
        )
    }

    /// Global side-effect instructions that kill every available
    /// expression outright.
    pub fn is_opaque_barrier(&self) -> bool {
        matches!(self, Op::Call { .. } | Op::Input { .. } | Op::BeginFunc)
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Op::Goto { .. } | Op::IfZ { .. } | Op::Return { .. } | Op::EndFunc
        )
    }

    /// Rebuild this instruction with every *use* slot passed through
    /// `f`. Definitions, labels, and control targets are untouched.
    /// Used by copy propagation and CSE to rewrite individual operand
    /// slots without a per-opcode match at every call site.
    pub fn map_uses(&self, f: impl Fn(SymbolId) -> SymbolId) -> Op {
        match *self {
            Op::BinArith { op, dst, lhs, rhs } => Op::BinArith {
                op,
                dst,
                lhs: f(lhs),
                rhs: f(rhs),
            },
            Op::Cmp { op, dst, lhs, rhs } => Op::Cmp {
                op,
                dst,
                lhs: f(lhs),
                rhs: f(rhs),
            },
            Op::Neg { dst, src } => Op::Neg { dst, src: f(src) },
            Op::Copy { dst, src } => Op::Copy { dst, src: f(src) },
            Op::Addr { dst, src } => Op::Addr { dst, src: f(src) },
            Op::Load { dst, addr } => Op::Load { dst, addr: f(addr) },
            Op::Store { addr, src } => Op::Store {
                addr: f(addr),
                src: f(src),
            },
            Op::IfZ { label, cond } => Op::IfZ {
                label,
                cond: f(cond),
            },
            Op::Actual { arg } => Op::Actual { arg: f(arg) },
            Op::Return { value } => Op::Return {
                value: value.map(&f),
            },
            Op::Output { src } => Op::Output { src: f(src) },
            _ => self.clone(),
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Undef => "UNDEF",
            Op::BinArith { op, .. } => match op {
                ArithOp::Add => "ADD",
                ArithOp::Sub => "SUB",
                ArithOp::Mul => "MUL",
                ArithOp::Div => "DIV",
            },
            Op::Cmp { op, .. } => match op {
                CmpOp::Eq => "EQ",
                CmpOp::Ne => "NE",
                CmpOp::Lt => "LT",
                CmpOp::Le => "LE",
                CmpOp::Gt => "GT",
                CmpOp::Ge => "GE",
            },
            Op::Neg { .. } => "NEG",
            Op::Copy { .. } => "COPY",
            Op::Addr { .. } => "ADDR",
            Op::Load { .. } => "LOAD",
            Op::Store { .. } => "STORE",
            Op::Goto { .. } => "GOTO",
            Op::IfZ { .. } => "IFZ",
            Op::Label { .. } => "LABEL",
            Op::Actual { .. } => "ACTUAL",
            Op::Formal { .. } => "FORMAL",
            Op::Call { .. } => "CALL",
            Op::Return { .. } => "RETURN",
            Op::BeginFunc => "BEGINFUNC",
            Op::EndFunc => "ENDFUNC",
            Op::Var { .. } => "VAR",
            Op::Input { .. } => "INPUT",
            Op::Output { .. } => "OUTPUT",
        }
    }
}

/// One node of the global instruction list.
#[derive(Debug, Clone)]
pub struct Node {
    pub op: Op,
    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,
    pub scratch: Option<i64>,
}

/// A contiguous run of instructions, identified by its first and last
/// node. Builder operations return fragments; [`Program::join`]
/// concatenates two fragments by linking `a.last.next = b.first`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frag {
    pub first: NodeId,
    pub last: NodeId,
}

/// The whole-program TAC list plus the symbol and type tables it
/// refers into. Mutated in place by the builder and every
/// optimization pass; nothing here is safe to share across threads
/// (single-threaded cooperative model, no concurrent
/// access).
pub struct Program {
    pub symtab: SymbolTable,
    pub types: crate::types::TypeTable,
    nodes: Vec<Node>,
    pub head: Option<NodeId>,
    pub tail: Option<NodeId>,
}

impl Program {
    pub fn new() -> Self {
        Program {
            symtab: SymbolTable::new(),
            types: crate::types::TypeTable::new(),
            nodes: Vec::new(),
            head: None,
            tail: None,
        }
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    /// Allocate a single-instruction fragment, unattached to anything.
    pub fn make(&mut self, op: Op) -> Frag {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            op,
            prev: None,
            next: None,
            scratch: None,
        });
        Frag { first: id, last: id }
    }

    /// Concatenate two fragments: `a`'s instructions followed by
    /// `b`'s. This is the join convention, expressed
    /// directly on forward-linked arena indices instead of the
    /// original's reverse-link-then-finalize scheme.
    pub fn join(&mut self, a: Frag, b: Frag) -> Frag {
        self.get_mut(a.last).next = Some(b.first);
        self.get_mut(b.first).prev = Some(a.last);
        Frag {
            first: a.first,
            last: b.last,
        }
    }

    pub fn join3(&mut self, a: Frag, b: Frag, c: Frag) -> Frag {
        let ab = self.join(a, b);
        self.join(ab, c)
    }

    /// Append `frag` to the end of the whole-program list.
    pub fn splice_program(&mut self, frag: Frag) {
        match self.tail {
            None => {
                self.head = Some(frag.first);
                self.tail = Some(frag.last);
            }
            Some(tail) => {
                self.get_mut(tail).next = Some(frag.first);
                self.get_mut(frag.first).prev = Some(tail);
                self.tail = Some(frag.last);
            }
        }
    }

    /// Detach `id` from the list, unlinking both neighbors and fixing
    /// up head/tail if `id` was either. The node itself stays in the
    /// arena (indices are never reused) but is no longer reachable by
    /// walking the list from `head`.
    pub fn detach(&mut self, id: NodeId) {
        let prev = self.get(id).prev;
        let next = self.get(id).next;
        match prev {
            Some(p) => self.get_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.get_mut(n).prev = prev,
            None => self.tail = prev,
        }
        let node = self.get_mut(id);
        node.prev = None;
        node.next = None;
    }

    /// Insert `frag` immediately before `before`, splicing it into the
    /// list in place (used by LICM to hoist instructions to a loop
    /// pre-header).
    pub fn insert_before(&mut self, before: NodeId, frag: Frag) {
        let prev = self.get(before).prev;
        match prev {
            Some(p) => {
                self.get_mut(p).next = Some(frag.first);
                self.get_mut(frag.first).prev = Some(p);
            }
            None => {
                self.head = Some(frag.first);
                self.get_mut(frag.first).prev = None;
            }
        }
        self.get_mut(frag.last).next = Some(before);
        self.get_mut(before).prev = Some(frag.last);
    }

    /// Linearize the list into a flat sequence of node ids in
    /// program order, walking `next` links from `head`.
    pub fn linearize(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.head;
        while let Some(id) = cur {
            out.push(id);
            cur = self.get(id).next;
        }
        out
    }

    /// Map every `LABEL` symbol to the node that defines it.
    pub fn label_positions(&self) -> HashMap<SymbolId, NodeId> {
        let mut map = HashMap::new();
        for id in self.linearize() {
            if let Op::Label { label } = self.get(id).op {
                map.insert(label, id);
            }
        }
        map
    }

    /// Verify the doubly-linked-list invariants:
    /// every node's `prev.next == self` and `next.prev == self`, and
    /// the chain has a unique head/tail.
    #[cfg(test)]
    pub fn check_invariants(&self) -> Result<(), String> {
        for id in self.linearize() {
            let node = self.get(id);
            if let Some(p) = node.prev
                && self.get(p).next != Some(id)
            {
                return Err(format!("{:?}.prev.next != {:?}", id, id));
            }
            if let Some(n) = node.next
                && self.get(n).prev != Some(id)
            {
                return Err(format!("{:?}.next.prev != {:?}", id, id));
            }
        }
        if let Some(h) = self.head
            && self.get(h).prev.is_some()
        {
            return Err("head has a prev".to_string());
        }
        if let Some(t) = self.tail
            && self.get(t).next.is_some()
        {
            return Err("tail has a next".to_string());
        }
        Ok(())
    }

    pub fn tracked(&self, id: SymbolId) -> bool {
        self.symtab.is_tracked(id)
    }

    pub fn is_local(&self, id: SymbolId) -> bool {
        self.symtab.get(id).scope == Scope::Local
    }
}

impl Default for Program {
    fn default() -> Self {
        Program::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn join_links_both_directions() {
        let mut p = Program::new();
        let a = p.symtab.declare_var("a", Type::Int).unwrap();
        let b = p.symtab.declare_var("b", Type::Int).unwrap();
        let f1 = p.make(Op::Copy { dst: a, src: b });
        let f2 = p.make(Op::Copy { dst: b, src: a });
        let joined = p.join(f1, f2);
        assert_eq!(joined.first, f1.first);
        assert_eq!(joined.last, f2.last);
        assert_eq!(p.get(f1.last).next, Some(f2.first));
        assert_eq!(p.get(f2.first).prev, Some(f1.last));
    }

    #[test]
    fn splice_program_and_linearize() {
        let mut p = Program::new();
        let a = p.symtab.declare_var("a", Type::Int).unwrap();
        let k = p.symtab.mk_int_const(1);
        let f1 = p.make(Op::Copy { dst: a, src: k });
        let f2 = p.make(Op::Copy { dst: a, src: k });
        p.splice_program(f1);
        p.splice_program(f2);
        assert_eq!(p.linearize(), vec![f1.first, f2.first]);
        p.check_invariants().unwrap();
    }

    #[test]
    fn detach_fixes_neighbors_and_endpoints() {
        let mut p = Program::new();
        let a = p.symtab.declare_var("a", Type::Int).unwrap();
        let k = p.symtab.mk_int_const(1);
        let f1 = p.make(Op::Copy { dst: a, src: k });
        let f2 = p.make(Op::Copy { dst: a, src: k });
        let f3 = p.make(Op::Copy { dst: a, src: k });
        let whole = p.join3(f1, f2, f3);
        p.splice_program(whole);
        p.detach(f2.first);
        assert_eq!(p.linearize(), vec![f1.first, f3.first]);
        p.check_invariants().unwrap();

        // detaching the tail updates Program::tail
        p.detach(f3.first);
        assert_eq!(p.tail, Some(f1.first));
        p.check_invariants().unwrap();
    }

    #[test]
    fn insert_before_hoists_into_place() {
        let mut p = Program::new();
        let a = p.symtab.declare_var("a", Type::Int).unwrap();
        let k = p.symtab.mk_int_const(1);
        let label = p.symtab.mk_label();
        let header = p.make(Op::Label { label });
        let body = p.make(Op::Copy { dst: a, src: k });
        let whole = p.join(header, body);
        p.splice_program(whole);

        let hoisted = p.make(Op::Copy { dst: a, src: k });
        p.insert_before(header.first, hoisted);
        assert_eq!(p.linearize(), vec![hoisted.first, header.first, body.first]);
        p.check_invariants().unwrap();
    }
}
