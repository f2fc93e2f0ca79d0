//! Symbol table: named entities (variables, temporaries, labels, text
//! literals, integer/char constants, functions) plus the two-chain
//! (global/local) scoping rule.
//!
//! Symbols live in a single arena and are referred to everywhere else
//! in the crate (TAC operands, access paths, CFG blocks) by
//! [`SymbolId`], never by name or raw reference. This sidesteps the
//! dangling-pointer hazards of the original's symbol-pointer-in-every-
//! instruction design.

use crate::types::Type;
use std::collections::HashMap;

/// Index into [`SymbolTable::symbols`]. Stable for the lifetime of a
/// compilation; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Var,
    IntConst,
    CharConst,
    TextLiteral,
    Func,
    Label,
    Undef,
}

/// A named entity. `ty` applies to `Var`/`IntConst`/`CharConst`;
/// `value` holds the literal value for constants; `offset` and
/// `scratch` are back-end-owned fields this crate never reads.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub id: SymbolId,
    pub kind: SymbolKind,
    pub name: String,
    pub ty: Option<Type>,
    pub value: Option<i64>,
    pub scope: Scope,
    /// Byte offset in frame or static storage; set by the back-end.
    pub offset: Option<i32>,
    /// Numeric suffix for text literals and generated labels.
    pub label_id: Option<u32>,
    /// Opaque back-end scratch slot.
    pub scratch: Option<i64>,
}

/// The program's symbol table: a global chain plus a local chain that
/// is non-empty only while building a function body.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    global: HashMap<String, SymbolId>,
    local: HashMap<String, SymbolId>,
    in_function: bool,
    next_temp: u32,
    next_label: u32,
    int_consts: HashMap<i64, SymbolId>,
    char_consts: HashMap<char, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    /// Enter a function body: a fresh local chain shadows the global
    /// one for subsequent variable declarations and lookups.
    pub fn enter_function(&mut self) {
        self.local.clear();
        self.in_function = true;
    }

    pub fn leave_function(&mut self) {
        self.local.clear();
        self.in_function = false;
    }

    fn active_scope(&self) -> Scope {
        if self.in_function {
            Scope::Local
        } else {
            Scope::Global
        }
    }

    fn insert_raw(&mut self, kind: SymbolKind, name: String, ty: Option<Type>) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        let scope = self.active_scope();
        self.symbols.push(Symbol {
            id,
            kind,
            name,
            ty,
            value: None,
            scope,
            offset: None,
            label_id: None,
            scratch: None,
        });
        id
    }

    /// Declare a named variable in the active scope. Fails if the name
    /// is already present in that scope (redeclaration).
    pub fn declare_var(&mut self, name: &str, ty: Type) -> Result<SymbolId, String> {
        let chain = if self.in_function {
            &self.local
        } else {
            &self.global
        };
        if chain.contains_key(name) {
            return Err(format!("redeclaration of '{}'", name));
        }
        let id = self.insert_raw(SymbolKind::Var, name.to_string(), Some(ty));
        if self.in_function {
            self.local.insert(name.to_string(), id);
        } else {
            self.global.insert(name.to_string(), id);
        }
        Ok(id)
    }

    /// Look up a variable or function by name: local chain first (if
    /// inside a function), then global.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        if self.in_function
            && let Some(id) = self.local.get(name)
        {
            return Some(*id);
        }
        self.global.get(name).copied()
    }

    /// Declare a function in the global chain. A name already declared
    /// as a function is an error unless it is a forward declaration
    /// being promoted to a definition (`allow_promote`).
    pub fn declare_func(&mut self, name: &str, allow_promote: bool) -> Result<SymbolId, String> {
        if let Some(id) = self.global.get(name) {
            let sym = self.get(*id);
            if sym.kind == SymbolKind::Func {
                if allow_promote {
                    return Ok(*id);
                }
                return Err(format!("redeclaration of function '{}'", name));
            }
            return Err(format!("'{}' already declared as a non-function", name));
        }
        let id = self.insert_raw(SymbolKind::Func, name.to_string(), None);
        self.global.insert(name.to_string(), id);
        Ok(id)
    }

    /// Canonicalize an integer constant: returns the unique symbol for
    /// `n`, creating it on first use.
    pub fn mk_int_const(&mut self, n: i64) -> SymbolId {
        if let Some(id) = self.int_consts.get(&n) {
            return *id;
        }
        let id = self.insert_raw(SymbolKind::IntConst, n.to_string(), Some(Type::Int));
        self.get_mut(id).value = Some(n);
        self.int_consts.insert(n, id);
        id
    }

    /// Canonicalize a character constant.
    pub fn mk_char_const(&mut self, c: char) -> SymbolId {
        if let Some(id) = self.char_consts.get(&c) {
            return *id;
        }
        let id = self.insert_raw(
            SymbolKind::CharConst,
            format!("'{}'", c),
            Some(Type::Char),
        );
        self.get_mut(id).value = Some(c as i64);
        self.char_consts.insert(c, id);
        id
    }

    pub fn mk_text_literal(&mut self, text: &str) -> SymbolId {
        let label_id = self.next_label;
        self.next_label += 1;
        let id = self.insert_raw(
            SymbolKind::TextLiteral,
            text.to_string(),
            Some(Type::ptr(Type::Char)),
        );
        self.get_mut(id).label_id = Some(label_id);
        id
    }

    /// Generate a fresh temporary `t<N>` of the given type. The caller
    /// is responsible for emitting its `VAR` declaration into the TAC.
    pub fn mk_tmp(&mut self, ty: Type) -> SymbolId {
        let n = self.next_temp;
        self.next_temp += 1;
        let name = format!("t{}", n);
        let id = self.insert_raw(SymbolKind::Var, name.clone(), Some(ty));
        // Temporaries participate in whichever scope is active, but
        // are not name-addressable (callers hold the SymbolId), so
        // they never go through the redeclaration check.
        if self.in_function {
            self.local.insert(name, id);
        } else {
            self.global.insert(name, id);
        }
        id
    }

    /// Generate a fresh label symbol `L<k>`.
    pub fn mk_label(&mut self) -> SymbolId {
        let k = self.next_label;
        self.next_label += 1;
        let name = format!("L{}", k);
        let id = self.insert_raw(SymbolKind::Label, name, None);
        self.get_mut(id).label_id = Some(k);
        id
    }

    /// Wrap a function's name as a `LABEL`-kind symbol for the
    /// prologue label preceding `BEGINFUNC`.
    pub fn mk_func_label(&mut self, name: &str) -> SymbolId {
        self.insert_raw(SymbolKind::Label, name.to_string(), None)
    }

    pub fn is_tracked(&self, id: SymbolId) -> bool {
        self.get(id).kind == SymbolKind::Var
    }
}
