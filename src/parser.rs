//! Recursive-descent front end: tokenizes mini-C source and drives the
//! [`Builder`]/[`AccessPath`] APIs directly while parsing, rather than
//! building an intermediate AST and lowering it in a second pass.
//!
//! Declarations and statements are syntax-directed: each grammar rule
//! either emits a [`Frag`] (statements, declarations) or produces an
//! [`Exp`] (expressions) by calling straight into the builder, so the
//! parser never constructs TAC itself.

use crate::access_path::AccessPath;
use crate::builder::{Builder, Exp};
use crate::error::CompileError;
use crate::tac::{ArithOp, CmpOp, Frag, Op, Program};
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Int,
    Char,
    Struct,
    If,
    Else,
    While,
    For,
    Return,
    Input,
    Output,
}

fn keyword_of(word: &str) -> Option<Keyword> {
    Some(match word {
        "int" => Keyword::Int,
        "char" => Keyword::Char,
        "struct" => Keyword::Struct,
        "if" => Keyword::If,
        "else" => Keyword::Else,
        "while" => Keyword::While,
        "for" => Keyword::For,
        "return" => Keyword::Return,
        "input" => Keyword::Input,
        "output" => Keyword::Output,
        _ => return None,
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int(i64),
    Char(char),
    Kw(Keyword),
    Sym(&'static str),
    Eof,
}

const OPERATORS: &[&str] = &[
    "==", "!=", "<=", ">=", "(", ")", "{", "}", "[", "]", ";", ",", "=", "+", "-", "*", "/", "<",
    ">", "&", ".",
];

fn lex(source: &str) -> Result<Vec<Tok>, CompileError> {
    let chars: Vec<char> = source.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                i += 1;
            }
            i += 2;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            toks.push(Tok::Int(text.parse().map_err(|_| {
                CompileError::Semantic(format!("malformed integer literal '{}'", text))
            })?));
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            toks.push(match keyword_of(&text) {
                Some(kw) => Tok::Kw(kw),
                None => Tok::Ident(text),
            });
            continue;
        }
        if c == '\'' {
            i += 1;
            let ch = match chars.get(i) {
                Some('\\') => {
                    i += 1;
                    let escaped = match chars.get(i) {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('0') => '\0',
                        Some('\\') => '\\',
                        Some('\'') => '\'',
                        Some(other) => *other,
                        None => return Err(CompileError::Semantic("unterminated char literal".into())),
                    };
                    i += 1;
                    escaped
                }
                Some(other) => {
                    let ch = *other;
                    i += 1;
                    ch
                }
                None => return Err(CompileError::Semantic("unterminated char literal".into())),
            };
            if chars.get(i) != Some(&'\'') {
                return Err(CompileError::Semantic("unterminated char literal".into()));
            }
            i += 1;
            toks.push(Tok::Char(ch));
            continue;
        }
        let rest: String = chars[i..].iter().take(2).collect();
        if let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(*op)) {
            toks.push(Tok::Sym(op));
            i += op.len();
            continue;
        }
        return Err(CompileError::Semantic(format!("unexpected character '{}'", c)));
    }
    toks.push(Tok::Eof);
    Ok(toks)
}

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.toks[self.pos]
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        self.toks.get(self.pos + offset).unwrap_or(&Tok::Eof)
    }

    fn at_end(&self) -> bool {
        matches!(self.peek(), Tok::Eof)
    }

    fn advance(&mut self) -> Tok {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn check_sym(&self, s: &str) -> bool {
        matches!(self.peek(), Tok::Sym(x) if *x == s)
    }

    fn check_kw(&self, k: Keyword) -> bool {
        matches!(self.peek(), Tok::Kw(x) if *x == k)
    }

    fn expect_sym(&mut self, s: &str) -> Result<(), CompileError> {
        if self.check_sym(s) {
            self.advance();
            Ok(())
        } else {
            Err(CompileError::Semantic(format!(
                "expected '{}', found {:?}",
                s,
                self.peek()
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String, CompileError> {
        match self.advance() {
            Tok::Ident(name) => Ok(name),
            other => Err(CompileError::Semantic(format!("expected identifier, found {:?}", other))),
        }
    }

    fn expect_int(&mut self) -> Result<i64, CompileError> {
        match self.advance() {
            Tok::Int(n) => Ok(n),
            other => Err(CompileError::Semantic(format!("expected integer literal, found {:?}", other))),
        }
    }
}

pub fn parse_program(source: &str) -> Result<Program, CompileError> {
    let toks = lex(source)?;
    let mut p = Parser { toks, pos: 0 };
    let mut prog = Program::new();
    while !p.at_end() {
        parse_top_level(&mut p, &mut prog)?;
    }
    Ok(prog)
}

fn parse_top_level(p: &mut Parser, prog: &mut Program) -> Result<(), CompileError> {
    if p.check_kw(Keyword::Struct) && matches!(p.peek_at(2), Tok::Sym("{")) {
        return parse_struct_decl(p, prog);
    }
    let ty = parse_type(p)?;
    if matches!(p.peek_at(1), Tok::Sym("(")) {
        let name = p.expect_ident()?;
        let frag = parse_function(p, prog, name)?;
        prog.splice_program(frag);
    } else {
        let frag = parse_declarator_list(p, prog, ty)?;
        prog.splice_program(frag);
    }
    Ok(())
}

fn parse_struct_decl(p: &mut Parser, prog: &mut Program) -> Result<(), CompileError> {
    p.advance(); // 'struct'
    let name = p.expect_ident()?;
    p.expect_sym("{")?;
    let def = prog.types.begin_struct(&name)?;
    while !p.check_sym("}") {
        let fty = parse_type(p)?;
        let fname = p.expect_ident()?;
        let mut dims = Vec::new();
        while p.check_sym("[") {
            p.advance();
            dims.push(p.expect_int()?);
            p.expect_sym("]")?;
        }
        let full_ty = dims.iter().rev().fold(fty, |elem, &d| Type::array(elem, d));
        def.push_field(fname, full_ty);
        p.expect_sym(";")?;
    }
    p.expect_sym("}")?;
    p.expect_sym(";")?;
    Ok(())
}

/// Base type plus any number of trailing `*` suffixes. Does not touch
/// `Program` — struct-field parsing needs a type while `prog.types` is
/// already mutably borrowed by the enclosing `begin_struct` call.
fn parse_type(p: &mut Parser) -> Result<Type, CompileError> {
    let mut ty = match p.advance() {
        Tok::Kw(Keyword::Int) => Type::Int,
        Tok::Kw(Keyword::Char) => Type::Char,
        Tok::Kw(Keyword::Struct) => Type::Struct(p.expect_ident()?),
        other => return Err(CompileError::Semantic(format!("expected a type, found {:?}", other))),
    };
    while p.check_sym("*") {
        p.advance();
        ty = Type::ptr(ty);
    }
    Ok(ty)
}

fn parse_declarator_list(p: &mut Parser, prog: &mut Program, base_ty: Type) -> Result<Frag, CompileError> {
    let mut frag: Option<Frag> = None;
    loop {
        let name = p.expect_ident()?;
        let mut dims = Vec::new();
        while p.check_sym("[") {
            p.advance();
            dims.push(p.expect_int()?);
            p.expect_sym("]")?;
        }
        let decl = if dims.is_empty() {
            Builder::declare_var(prog, base_ty.clone(), &name)?
        } else {
            Builder::declare_array_var(prog, base_ty.clone(), &dims, &name)?
        };
        frag = Some(match frag {
            Some(f) => prog.join(f, decl),
            None => decl,
        });
        if p.check_sym(",") {
            p.advance();
            continue;
        }
        break;
    }
    p.expect_sym(";")?;
    Ok(frag.unwrap())
}

fn parse_function(p: &mut Parser, prog: &mut Program, name: String) -> Result<Frag, CompileError> {
    prog.symtab.declare_func(&name, true)?;
    prog.symtab.enter_function();
    let result = parse_function_body(p, prog, &name);
    prog.symtab.leave_function();
    result
}

fn parse_function_body(p: &mut Parser, prog: &mut Program, name: &str) -> Result<Frag, CompileError> {
    p.expect_sym("(")?;
    let mut formals_frag: Option<Frag> = None;
    if !p.check_sym(")") {
        loop {
            let pty = parse_type(p)?;
            let pname = p.expect_ident()?;
            let psym = prog.symtab.declare_var(&pname, pty)?;
            let f = Builder::do_formal(prog, psym);
            formals_frag = Some(match formals_frag {
                Some(ff) => prog.join(ff, f),
                None => f,
            });
            if p.check_sym(",") {
                p.advance();
                continue;
            }
            break;
        }
    }
    p.expect_sym(")")?;
    let body = parse_block(p, prog)?;
    Ok(Builder::do_func(prog, name, formals_frag, body))
}

fn parse_block(p: &mut Parser, prog: &mut Program) -> Result<Frag, CompileError> {
    p.expect_sym("{")?;
    let mut frag: Option<Frag> = None;
    while !p.check_sym("}") {
        let s = parse_stmt(p, prog)?;
        frag = Some(match frag {
            Some(f) => prog.join(f, s),
            None => s,
        });
    }
    p.expect_sym("}")?;
    Ok(frag.unwrap_or_else(|| prog.make(Op::Undef)))
}

fn is_local_decl_start(p: &Parser) -> bool {
    if p.check_kw(Keyword::Int) || p.check_kw(Keyword::Char) {
        return true;
    }
    p.check_kw(Keyword::Struct) && !matches!(p.peek_at(2), Tok::Sym("{"))
}

fn parse_stmt(p: &mut Parser, prog: &mut Program) -> Result<Frag, CompileError> {
    if p.check_sym("{") {
        return parse_block(p, prog);
    }
    if is_local_decl_start(p) {
        let ty = parse_type(p)?;
        return parse_declarator_list(p, prog, ty);
    }
    if p.check_kw(Keyword::If) {
        return parse_if(p, prog);
    }
    if p.check_kw(Keyword::While) {
        return parse_while(p, prog);
    }
    if p.check_kw(Keyword::For) {
        return parse_for(p, prog);
    }
    if p.check_kw(Keyword::Return) {
        return parse_return(p, prog);
    }
    if p.check_kw(Keyword::Input) {
        return parse_input(p, prog);
    }
    if p.check_kw(Keyword::Output) {
        return parse_output(p, prog);
    }
    parse_simple_or_expr_stmt(p, prog)
}

fn parse_if(p: &mut Parser, prog: &mut Program) -> Result<Frag, CompileError> {
    p.advance(); // 'if'
    p.expect_sym("(")?;
    let cond = parse_expr(p, prog)?;
    p.expect_sym(")")?;
    let then_frag = parse_stmt(p, prog)?;
    if p.check_kw(Keyword::Else) {
        p.advance();
        let else_frag = parse_stmt(p, prog)?;
        Ok(Builder::do_test(prog, cond, then_frag, else_frag))
    } else {
        Ok(Builder::do_if(prog, cond, then_frag))
    }
}

fn parse_while(p: &mut Parser, prog: &mut Program) -> Result<Frag, CompileError> {
    p.advance(); // 'while'
    p.expect_sym("(")?;
    let cond = parse_expr(p, prog)?;
    p.expect_sym(")")?;
    let body = parse_stmt(p, prog)?;
    Ok(Builder::do_while(prog, cond, body))
}

fn parse_for(p: &mut Parser, prog: &mut Program) -> Result<Frag, CompileError> {
    p.advance(); // 'for'
    p.expect_sym("(")?;
    let init = parse_simple_assign(p, prog)?;
    p.expect_sym(";")?;
    let cond = parse_expr(p, prog)?;
    p.expect_sym(";")?;
    let step = parse_simple_assign(p, prog)?;
    p.expect_sym(")")?;
    let body = parse_stmt(p, prog)?;
    let body_then_step = prog.join(body, step);
    let loop_frag = Builder::do_while(prog, cond, body_then_step);
    Ok(prog.join(init, loop_frag))
}

fn parse_return(p: &mut Parser, prog: &mut Program) -> Result<Frag, CompileError> {
    p.advance(); // 'return'
    if p.check_sym(";") {
        p.advance();
        return Ok(prog.make(Op::Return { value: None }));
    }
    let e = parse_expr(p, prog)?;
    p.expect_sym(";")?;
    let ret = prog.make(Op::Return { value: Some(e.ret) });
    Ok(crate::builder::join_opt(prog, e.tac, Some(ret)).unwrap())
}

fn parse_input(p: &mut Parser, prog: &mut Program) -> Result<Frag, CompileError> {
    p.advance(); // 'input'
    p.expect_sym("(")?;
    let name = p.expect_ident()?;
    let sym = prog
        .symtab
        .lookup(&name)
        .ok_or_else(|| CompileError::Undeclared { name: name.clone() })?;
    p.expect_sym(")")?;
    p.expect_sym(";")?;
    Ok(Builder::do_input(prog, sym))
}

fn parse_output(p: &mut Parser, prog: &mut Program) -> Result<Frag, CompileError> {
    p.advance(); // 'output'
    p.expect_sym("(")?;
    let e = parse_expr(p, prog)?;
    p.expect_sym(")")?;
    p.expect_sym(";")?;
    Ok(Builder::do_output(prog, e))
}

/// `IDENT (.field | [expr])*` without consuming a trailing `=` or `;`,
/// for use both as a full lvalue chain and as the base of a postfix
/// read.
fn parse_access_chain(p: &mut Parser, prog: &mut Program, name: &str) -> Result<AccessPath, CompileError> {
    let base = prog
        .symtab
        .lookup(name)
        .ok_or_else(|| CompileError::Undeclared { name: name.to_string() })?;
    let mut path = AccessPath::new(base);
    loop {
        if p.check_sym(".") {
            p.advance();
            let field = p.expect_ident()?;
            path = path.field(field);
        } else if p.check_sym("[") {
            p.advance();
            let idx = parse_expr(p, prog)?;
            p.expect_sym("]")?;
            path = path.index(idx);
        } else {
            break;
        }
    }
    Ok(path)
}

fn parse_simple_assign(p: &mut Parser, prog: &mut Program) -> Result<Frag, CompileError> {
    if p.check_sym("*") {
        p.advance();
        let addr = parse_unary(p, prog)?;
        p.expect_sym("=")?;
        let rhs = parse_expr(p, prog)?;
        return Ok(Builder::do_store(prog, addr, rhs));
    }
    let name = p.expect_ident()?;
    let path = parse_access_chain(p, prog, &name)?;
    p.expect_sym("=")?;
    let rhs = parse_expr(p, prog)?;
    if path.steps.is_empty() {
        Builder::do_assign(prog, path.base, rhs).map_err(CompileError::from)
    } else {
        crate::access_path::store(prog, &path, rhs).map_err(CompileError::from)
    }
}

fn parse_simple_or_expr_stmt(p: &mut Parser, prog: &mut Program) -> Result<Frag, CompileError> {
    let save = p.pos;
    if let Ok(frag) = try_parse_assignment_stmt(p, prog) {
        return Ok(frag);
    }
    p.pos = save;
    let e = parse_expr(p, prog)?;
    p.expect_sym(";")?;
    Ok(e.tac.unwrap_or_else(|| prog.make(Op::Undef)))
}

fn try_parse_assignment_stmt(p: &mut Parser, prog: &mut Program) -> Result<Frag, CompileError> {
    let frag = parse_simple_assign(p, prog)?;
    p.expect_sym(";")?;
    Ok(frag)
}

fn parse_expr(p: &mut Parser, prog: &mut Program) -> Result<Exp, CompileError> {
    parse_rel(p, prog)
}

fn rel_op(p: &Parser) -> Option<CmpOp> {
    match p.peek() {
        Tok::Sym("==") => Some(CmpOp::Eq),
        Tok::Sym("!=") => Some(CmpOp::Ne),
        Tok::Sym("<=") => Some(CmpOp::Le),
        Tok::Sym(">=") => Some(CmpOp::Ge),
        Tok::Sym("<") => Some(CmpOp::Lt),
        Tok::Sym(">") => Some(CmpOp::Gt),
        _ => None,
    }
}

fn parse_rel(p: &mut Parser, prog: &mut Program) -> Result<Exp, CompileError> {
    let lhs = parse_add(p, prog)?;
    if let Some(op) = rel_op(p) {
        p.advance();
        let rhs = parse_add(p, prog)?;
        Ok(Builder::do_cmp(prog, op, lhs, rhs))
    } else {
        Ok(lhs)
    }
}

fn parse_add(p: &mut Parser, prog: &mut Program) -> Result<Exp, CompileError> {
    let mut lhs = parse_mul(p, prog)?;
    loop {
        let op = match p.peek() {
            Tok::Sym("+") => ArithOp::Add,
            Tok::Sym("-") => ArithOp::Sub,
            _ => break,
        };
        p.advance();
        let rhs = parse_mul(p, prog)?;
        lhs = Builder::do_bin(prog, op, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_mul(p: &mut Parser, prog: &mut Program) -> Result<Exp, CompileError> {
    let mut lhs = parse_unary(p, prog)?;
    loop {
        let op = match p.peek() {
            Tok::Sym("*") => ArithOp::Mul,
            Tok::Sym("/") => ArithOp::Div,
            _ => break,
        };
        p.advance();
        let rhs = parse_unary(p, prog)?;
        lhs = Builder::do_bin(prog, op, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_unary(p: &mut Parser, prog: &mut Program) -> Result<Exp, CompileError> {
    if p.check_sym("-") {
        p.advance();
        let e = parse_unary(p, prog)?;
        return Ok(Builder::do_un(prog, e));
    }
    if p.check_sym("*") {
        p.advance();
        let e = parse_unary(p, prog)?;
        return Ok(Builder::do_deref(prog, e));
    }
    if p.check_sym("&") {
        p.advance();
        let name = p.expect_ident()?;
        let path = parse_access_chain(p, prog, &name)?;
        return if path.steps.is_empty() {
            Ok(Builder::do_addr(prog, path.base))
        } else {
            crate::access_path::address(prog, &path).map_err(CompileError::from)
        };
    }
    parse_postfix(p, prog)
}

fn parse_postfix(p: &mut Parser, prog: &mut Program) -> Result<Exp, CompileError> {
    if let Tok::Ident(name) = p.peek().clone() {
        p.advance();
        if p.check_sym("(") {
            p.advance();
            let args = parse_arg_list(p, prog)?;
            p.expect_sym(")")?;
            return Ok(Builder::do_call_ret(prog, &name, &args, Type::Int));
        }
        let path = parse_access_chain(p, prog, &name)?;
        return if path.steps.is_empty() {
            Ok(Exp::value(path.base))
        } else {
            crate::access_path::load(prog, &path).map_err(CompileError::from)
        };
    }
    parse_primary(p, prog)
}

fn parse_arg_list(p: &mut Parser, prog: &mut Program) -> Result<Vec<Exp>, CompileError> {
    let mut args = Vec::new();
    if p.check_sym(")") {
        return Ok(args);
    }
    loop {
        args.push(parse_expr(p, prog)?);
        if p.check_sym(",") {
            p.advance();
            continue;
        }
        break;
    }
    Ok(args)
}

fn parse_primary(p: &mut Parser, prog: &mut Program) -> Result<Exp, CompileError> {
    match p.advance() {
        Tok::Int(n) => Ok(Exp::value(prog.symtab.mk_int_const(n))),
        Tok::Char(c) => Ok(Exp::value(prog.symtab.mk_char_const(c))),
        Tok::Sym("(") => {
            let e = parse_expr(p, prog)?;
            p.expect_sym(")")?;
            Ok(e)
        }
        other => Err(CompileError::Semantic(format!("unexpected token {:?}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_straight_line_arithmetic_and_output() {
        let prog = parse_program("int a; int b; int main() { a = 2 + 3; output(a); }");
        let prog = prog.unwrap();
        let names: Vec<_> = prog
            .linearize()
            .into_iter()
            .map(|id| prog.get(id).op.mnemonic())
            .collect();
        assert!(names.contains(&"ADD"));
        assert!(names.contains(&"OUTPUT"));
    }

    #[test]
    fn parses_if_else() {
        let prog = parse_program(
            "int x; int main() { if (x == 0) { x = 1; } else { x = 2; } }",
        )
        .unwrap();
        let mnems: Vec<_> = prog
            .linearize()
            .into_iter()
            .map(|id| prog.get(id).op.mnemonic())
            .collect();
        assert!(mnems.contains(&"IFZ"));
        assert!(mnems.contains(&"GOTO"));
    }

    #[test]
    fn parses_for_loop_as_natural_loop_shape() {
        let prog = parse_program(
            "int i; int s; int main() { for (i = 0; i < 10; i = i + 1) s = s + 3; }",
        )
        .unwrap();
        let mnems: Vec<_> = prog
            .linearize()
            .into_iter()
            .map(|id| prog.get(id).op.mnemonic())
            .collect();
        // back edge present
        assert!(mnems.contains(&"GOTO"));
        assert!(mnems.contains(&"LT"));
    }

    #[test]
    fn parses_struct_field_access() {
        let prog = parse_program(
            "struct P { int x; int y; }; struct P p; int main() { p.x = 5; output(p.x); }",
        )
        .unwrap();
        let mnems: Vec<_> = prog
            .linearize()
            .into_iter()
            .map(|id| prog.get(id).op.mnemonic())
            .collect();
        assert!(mnems.contains(&"STORE"));
        assert!(mnems.contains(&"LOAD"));
    }

    #[test]
    fn parses_array_indexing() {
        let prog = parse_program("int a[10]; int main() { a[2] = 7; output(a[2]); }").unwrap();
        let mnems: Vec<_> = prog
            .linearize()
            .into_iter()
            .map(|id| prog.get(id).op.mnemonic())
            .collect();
        assert!(mnems.contains(&"STORE"));
        assert!(mnems.contains(&"LOAD"));
    }

    #[test]
    fn undeclared_variable_is_an_error() {
        let err = parse_program("int main() { output(z); }");
        assert!(err.is_err());
    }

    #[test]
    fn parses_function_call_with_args() {
        let prog = parse_program(
            "int add(int a, int b) { return a + b; } int main() { int r; r = add(1, 2); }",
        )
        .unwrap();
        let mnems: Vec<_> = prog
            .linearize()
            .into_iter()
            .map(|id| prog.get(id).op.mnemonic())
            .collect();
        assert!(mnems.contains(&"CALL"));
        assert!(mnems.contains(&"ACTUAL"));
        assert!(mnems.contains(&"FORMAL"));
    }
}
