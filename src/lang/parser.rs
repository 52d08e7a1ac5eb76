// This file is part of dynabas, a BASIC interpreter.
// Copyright 2022 Jeffrey Sharp
//
// SPDX-License-Identifier: GPL-3.0-or-later
//
// dynabas is free software: you can redistribute it and/or modify it
// under the terms of the GNU General Public License as published
// by the Free Software Foundation, either version 3 of the License,
// or (at your option) any later version.
//
// dynabas is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See
// the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with dynabas.  If not, see <http://www.gnu.org/licenses/>.

//! Parser.
//!
//! Recursive descent throughout. The expression grammar is an
//! eleven-level left-associative binary cascade (weakest precedence at
//! the top); the one place it departs from pure LL is the `<>` Kludge
//! described on [`Parser::parse_inequality`].

use std::cell::Cell;
use std::rc::Rc;

use crate::diagnostic::Diagnostic;

use super::ast::*;
use super::lexer::Cursor;

/// The result of parsing one line of input.
pub enum ParsedLine {
    /// `[num] stmt (':' stmt)*` — a line to store. `body` is `None` when
    /// the line consisted only of a line number, which deletes the line.
    Numbered { num: i64, body: Option<Node> },

    /// A line with no leading number: a statement chain to execute now.
    Immediate(Node),
}

/// Parses one line of input. Returns `Ok(None)` for blank input.
pub fn parse_line(input: &str) -> Result<Option<ParsedLine>, Diagnostic> {
    let mut parser = Parser::new(input);
    parser.parse_line()
}

struct Parser<'a> {
    cursor: Cursor<'a>,
    line_num: Option<i64>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser { cursor: Cursor::new(input), line_num: None }
    }

    fn parse_line(&mut self) -> Result<Option<ParsedLine>, Diagnostic> {
        if self.cursor.at_end() {
            return Ok(None);
        }

        if let Some(num) = self.try_line_number()? {
            self.line_num = Some(num);
            if self.cursor.at_end() {
                return Ok(Some(ParsedLine::Numbered { num, body: None }));
            }
            let body = self.parse_statements()?;
            self.expect_end()?;
            return Ok(Some(ParsedLine::Numbered { num, body: Some(body) }));
        }

        let body = self.parse_statements()?;
        self.expect_end()?;
        Ok(Some(ParsedLine::Immediate(body)))
    }

    fn error_here(&self, message: impl Into<String>) -> Diagnostic {
        let d = Diagnostic::error(message);
        match self.line_num {
            Some(n) => d.at_line(n),
            None => d,
        }
    }

    fn expect_end(&mut self) -> Result<(), Diagnostic> {
        if self.cursor.at_end() {
            Ok(())
        } else {
            Err(self.error_here("unexpected trailing input"))
        }
    }

    fn expect_symbol(&mut self, sym: &str) -> Result<(), Diagnostic> {
        if self.cursor.try_symbol(sym) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{}'", sym)))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), Diagnostic> {
        if self.cursor.try_keyword(word) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected {}", word)))
        }
    }

    fn peek_symbol(&self, sym: &str) -> bool {
        let mut c = self.cursor;
        c.try_symbol(sym)
    }

    fn peek_keyword(&self, word: &str) -> bool {
        let mut c = self.cursor;
        c.try_keyword(word)
    }

    // ---- line numbers and ranges ----

    fn try_line_number(&mut self) -> Result<Option<i64>, Diagnostic> {
        let save = self.cursor.pos();
        if let Some(n) = self.cursor.try_num_lit() {
            if n.fract() != 0.0 || n < 0.0 {
                self.cursor.rewind(save);
                return Err(self.error_here("line number must be a non-negative integer"));
            }
            return Ok(Some(n as i64));
        }
        Ok(None)
    }

    fn try_uint(&mut self) -> Result<Option<i64>, Diagnostic> {
        let save = self.cursor.pos();
        if let Some(n) = self.cursor.try_num_lit() {
            if n.fract() != 0.0 || n < 0.0 {
                self.cursor.rewind(save);
                return Err(self.error_here("expected line number"));
            }
            return Ok(Some(n as i64));
        }
        Ok(None)
    }

    fn parse_line_range(&mut self) -> Result<LineRange, Diagnostic> {
        let a = self.try_uint()?;
        if self.cursor.try_symbol("-") {
            let b = self.try_uint()?;
            Ok(LineRange { head: a.unwrap_or(-1), tail: b.unwrap_or(-1) })
        } else if let Some(a) = a {
            Ok(LineRange::single(a))
        } else {
            Ok(LineRange::ALL)
        }
    }

    fn parse_line_ref(&mut self) -> Result<Node, Diagnostic> {
        match self.try_uint()? {
            Some(n) => Ok(Node::new(NodeKind::LineRef { num: n, link: Cell::new(None) })),
            None => Err(self.error_here("expected line number")),
        }
    }

    fn parse_optional_line_ref(&mut self) -> Result<Option<Node>, Diagnostic> {
        match self.try_uint()? {
            Some(n) => Ok(Some(Node::new(NodeKind::LineRef { num: n, link: Cell::new(None) }))),
            None => Ok(None),
        }
    }

    fn parse_line_list(&mut self) -> Result<Vec<Node>, Diagnostic> {
        let mut items = vec![self.parse_line_ref()?];
        while self.cursor.try_symbol(",") {
            items.push(self.parse_line_ref()?);
        }
        Ok(items)
    }

    // ---- variable names ----

    fn try_num_var_name(&mut self) -> Result<Option<String>, Diagnostic> {
        let save = self.cursor.pos();
        if let Some(name) = self.cursor.try_ident() {
            if name.ends_with('$') || is_reserved(&name) {
                self.cursor.rewind(save);
                return Ok(None);
            }
            return Ok(Some(name));
        }
        Ok(None)
    }

    fn try_str_var_name(&mut self) -> Result<Option<String>, Diagnostic> {
        let save = self.cursor.pos();
        if let Some(name) = self.cursor.try_ident() {
            if let Some(base) = name.strip_suffix('$') {
                if is_reserved(base) {
                    self.cursor.rewind(save);
                    return Ok(None);
                }
                return Ok(Some(base.to_string()));
            }
            self.cursor.rewind(save);
        }
        Ok(None)
    }

    fn parse_var_ref(&mut self) -> Result<VarRef, Diagnostic> {
        if let Some(name) = self.try_str_var_name()? {
            return Ok(VarRef::Str(name));
        }
        if let Some(name) = self.try_num_var_name()? {
            return Ok(VarRef::Num(name));
        }
        Err(self.error_here("expected variable"))
    }

    fn parse_var_list(&mut self) -> Result<Vec<VarRef>, Diagnostic> {
        let mut vars = vec![self.parse_var_ref()?];
        while self.cursor.try_symbol(",") {
            vars.push(self.parse_var_ref()?);
        }
        Ok(vars)
    }

    // ---- expressions: numeric cascade ----

    fn parse_num_expr(&mut self) -> Result<Node, Diagnostic> {
        self.parse_imp()
    }

    fn parse_imp(&mut self) -> Result<Node, Diagnostic> {
        let mut lhs = self.parse_eqv()?;
        while self.cursor.try_keyword("IMP") {
            let rhs = self.parse_eqv()?;
            lhs = binary(BinOp::Imp, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_eqv(&mut self) -> Result<Node, Diagnostic> {
        let mut lhs = self.parse_or()?;
        while self.cursor.try_keyword("EQV") {
            let rhs = self.parse_or()?;
            lhs = binary(BinOp::Eqv, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Node, Diagnostic> {
        let mut lhs = self.parse_xor()?;
        loop {
            if self.cursor.try_keyword("OR") {
                let rhs = self.parse_xor()?;
                lhs = binary(BinOp::Or, lhs, rhs);
            } else if self.cursor.try_keyword("NOR") {
                let rhs = self.parse_xor()?;
                lhs = binary(BinOp::Nor, lhs, rhs);
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_xor(&mut self) -> Result<Node, Diagnostic> {
        let mut lhs = self.parse_and()?;
        while self.cursor.try_keyword("XOR") {
            let rhs = self.parse_and()?;
            lhs = binary(BinOp::Xor, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Node, Diagnostic> {
        let mut lhs = self.parse_not()?;
        loop {
            if self.cursor.try_keyword("AND") {
                let rhs = self.parse_not()?;
                lhs = binary(BinOp::And, lhs, rhs);
            } else if self.cursor.try_keyword("NAND") {
                let rhs = self.parse_not()?;
                lhs = binary(BinOp::Nand, lhs, rhs);
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Node, Diagnostic> {
        if self.cursor.try_keyword("NOT") {
            let inner = self.parse_not()?;
            Ok(Node::new(NodeKind::Not(Box::new(inner))))
        } else {
            self.parse_equality()
        }
    }

    fn parse_equality(&mut self) -> Result<Node, Diagnostic> {
        let mut lhs = self.parse_inequality()?;
        loop {
            if self.cursor.try_symbol("=") {
                let rhs = self.parse_inequality()?;
                lhs = binary(BinOp::Eq, lhs, rhs);
            } else if self.cursor.try_symbol("<>") {
                let rhs = self.parse_inequality()?;
                lhs = binary(BinOp::Ne, lhs, rhs);
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    /// `inequality := sum ((>= | > | <> | <= | <) sum)*`
    ///
    /// `<>` is not actually an inequality operator; it belongs to
    /// [`Self::parse_equality`]. When encountered here it is a signal
    /// (the Kludge) to stop consuming and let the caller see it: the
    /// cursor is rewound to just before the operator.
    fn parse_inequality(&mut self) -> Result<Node, Diagnostic> {
        let mut lhs = self.parse_sum()?;
        loop {
            let save = self.cursor.pos();
            if self.cursor.try_symbol(">=") {
                let rhs = self.parse_sum()?;
                lhs = binary(BinOp::Ge, lhs, rhs);
            } else if self.cursor.try_symbol("<=") {
                let rhs = self.parse_sum()?;
                lhs = binary(BinOp::Le, lhs, rhs);
            } else if self.peek_symbol("<>") {
                self.cursor.rewind(save);
                break;
            } else if self.cursor.try_symbol(">") {
                let rhs = self.parse_sum()?;
                lhs = binary(BinOp::Gt, lhs, rhs);
            } else if self.cursor.try_symbol("<") {
                let rhs = self.parse_sum()?;
                lhs = binary(BinOp::Lt, lhs, rhs);
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_sum(&mut self) -> Result<Node, Diagnostic> {
        let mut lhs = self.parse_prod()?;
        loop {
            if self.cursor.try_symbol("+") {
                let rhs = self.parse_prod()?;
                lhs = binary(BinOp::Add, lhs, rhs);
            } else if self.cursor.try_symbol("-") {
                let rhs = self.parse_prod()?;
                lhs = binary(BinOp::Sub, lhs, rhs);
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_prod(&mut self) -> Result<Node, Diagnostic> {
        let mut lhs = self.parse_power()?;
        loop {
            if self.cursor.try_symbol("*") {
                let rhs = self.parse_power()?;
                lhs = binary(BinOp::Mul, lhs, rhs);
            } else if self.cursor.try_symbol("/") {
                let rhs = self.parse_power()?;
                lhs = binary(BinOp::Div, lhs, rhs);
            } else if self.cursor.try_keyword("MOD") {
                let rhs = self.parse_power()?;
                lhs = binary(BinOp::Mod, lhs, rhs);
            } else if self.cursor.try_symbol("\\") {
                let rhs = self.parse_power()?;
                lhs = binary(BinOp::IntDiv, lhs, rhs);
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_power(&mut self) -> Result<Node, Diagnostic> {
        let mut lhs = self.parse_unary()?;
        while self.cursor.try_symbol("^") {
            let rhs = self.parse_unary()?;
            lhs = binary(BinOp::Pow, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Node, Diagnostic> {
        if self.cursor.try_symbol("+") {
            let inner = self.parse_unary()?;
            Ok(Node::new(NodeKind::Pos(Box::new(inner))))
        } else if self.cursor.try_symbol("-") {
            let inner = self.parse_unary()?;
            Ok(Node::new(NodeKind::Neg(Box::new(inner))))
        } else {
            self.parse_num_term()
        }
    }

    fn parse_num_term(&mut self) -> Result<Node, Diagnostic> {
        if self.cursor.try_symbol("(") {
            let inner = self.parse_num_expr()?;
            self.expect_symbol(")")?;
            return Ok(inner.parenthesized());
        }
        if let Some(func) = self.try_func_name(false) {
            return self.parse_call(func);
        }
        if let Some(n) = self.cursor.try_num_lit() {
            return Ok(Node::new(NodeKind::NumLit(n)));
        }
        if let Some(name) = self.try_num_var_name()? {
            return Ok(Node::new(NodeKind::NumVar(name)));
        }
        Err(self.error_here("expected numeric expression"))
    }

    // ---- expressions: string cascade ----

    fn parse_str_expr(&mut self) -> Result<Node, Diagnostic> {
        let mut lhs = self.parse_str_term()?;
        while self.cursor.try_symbol("+") {
            let rhs = self.parse_str_term()?;
            lhs = Node::new(NodeKind::Concat { lhs: Box::new(lhs), rhs: Box::new(rhs) });
        }
        Ok(lhs)
    }

    fn parse_str_term(&mut self) -> Result<Node, Diagnostic> {
        if self.cursor.try_symbol("(") {
            let inner = self.parse_str_expr()?;
            self.expect_symbol(")")?;
            return Ok(inner.parenthesized());
        }
        if let Some(func) = self.try_func_name(true) {
            return self.parse_call(func);
        }
        if let Some((value, delim)) = self.cursor.try_str_lit() {
            return Ok(Node::new(NodeKind::StrLit { value, delim }));
        }
        if let Some(name) = self.try_str_var_name()? {
            return Ok(Node::new(NodeKind::StrVar(name)));
        }
        Err(self.error_here("expected string expression"))
    }

    /// Parses whichever of `parse_num_expr`/`parse_str_expr` matches —
    /// used for `DATA` items and `PRINT` items, whose static type isn't
    /// known until the value is consumed at runtime.
    fn parse_datum(&mut self) -> Result<Node, Diagnostic> {
        let save = self.cursor.pos();
        match self.parse_num_expr() {
            Ok(n) => Ok(n),
            Err(_) => {
                self.cursor.rewind(save);
                self.parse_str_expr()
            }
        }
    }

    fn try_func_name(&mut self, want_string: bool) -> Option<Func> {
        for &f in ALL_FUNCS {
            if f.returns_string() == want_string && self.cursor.try_keyword(f.name()) {
                return Some(f);
            }
        }
        None
    }

    fn parse_call(&mut self, func: Func) -> Result<Node, Diagnostic> {
        self.expect_symbol("(")?;
        let mut args = Vec::with_capacity(func.arity());
        for i in 0..func.arity() {
            if i > 0 {
                self.expect_symbol(",")?;
            }
            let arg = if func.arg_is_string(i) {
                self.parse_str_expr()?
            } else {
                self.parse_num_expr()?
            };
            args.push(arg);
        }
        self.expect_symbol(")")?;
        Ok(Node::new(NodeKind::Call { func, args }))
    }

    // ---- statements ----

    fn parse_statements(&mut self) -> Result<Node, Diagnostic> {
        let mut stmts = vec![self.parse_statement()?];
        loop {
            let save = self.cursor.pos();
            if self.cursor.try_symbol(":") {
                stmts.push(self.parse_statement()?);
            } else {
                self.cursor.rewind(save);
                break;
            }
        }
        Ok(chain(stmts))
    }

    /// Like [`Self::parse_statements`], but stops before a bare `ELSE`
    /// keyword so `IF`'s THEN-chain does not swallow its ELSE-chain.
    fn parse_statements_until_else(&mut self) -> Result<Node, Diagnostic> {
        let mut stmts = vec![self.parse_statement()?];
        loop {
            let save = self.cursor.pos();
            if self.peek_keyword("ELSE") {
                break;
            }
            if self.cursor.try_symbol(":") {
                if self.peek_keyword("ELSE") {
                    self.cursor.rewind(save);
                    break;
                }
                stmts.push(self.parse_statement()?);
            } else {
                break;
            }
        }
        Ok(chain(stmts))
    }

    fn rest_of_line(&mut self) -> String {
        self.cursor.eat_blanks();
        let rest = self.cursor.remainder().to_string();
        self.cursor.advance_to_end();
        rest
    }

    fn parse_statement(&mut self) -> Result<Node, Diagnostic> {
        if self.cursor.try_keyword("NEW") { return Ok(Node::new(NodeKind::New)); }
        if self.cursor.try_keyword("END") { return Ok(Node::new(NodeKind::End)); }
        if self.cursor.try_keyword("STOP") { return Ok(Node::new(NodeKind::Stop)); }
        if self.cursor.try_keyword("CONT") { return Ok(Node::new(NodeKind::Cont)); }
        if self.cursor.try_keyword("RETURN") { return Ok(Node::new(NodeKind::Return)); }
        if self.cursor.try_keyword("CLS") { return Ok(Node::new(NodeKind::Cls)); }

        if self.cursor.try_keyword("LIST") {
            let range = self.parse_line_range()?;
            return Ok(Node::new(NodeKind::List(range)));
        }
        if self.cursor.try_keyword("DEL") {
            let range = self.parse_line_range()?;
            return Ok(Node::new(NodeKind::Del(range)));
        }

        if self.cursor.try_keyword("GOSUB") {
            let target = self.parse_line_ref()?;
            return Ok(Node::new(NodeKind::Gosub(Box::new(target))));
        }
        if self.cursor.try_keyword("GOTO") {
            let target = self.parse_line_ref()?;
            return Ok(Node::new(NodeKind::Goto(Box::new(target))));
        }
        if self.cursor.try_keyword("RUN") {
            let target = self.parse_optional_line_ref()?;
            return Ok(Node::new(NodeKind::Run(target.map(Box::new))));
        }
        if self.cursor.try_keyword("RESTORE") {
            let target = self.parse_optional_line_ref()?;
            return Ok(Node::new(NodeKind::Restore(target.map(Box::new))));
        }

        if self.cursor.try_keyword("ON") {
            return self.parse_on();
        }

        if self.cursor.try_symbol("'") {
            let text = self.rest_of_line();
            return Ok(Node::new(NodeKind::Rem { text, abbrev: true }));
        }
        if self.cursor.try_keyword("REM") {
            let text = self.rest_of_line();
            return Ok(Node::new(NodeKind::Rem { text, abbrev: false }));
        }

        if self.cursor.try_keyword("FOR") {
            return self.parse_for();
        }
        if self.cursor.try_keyword("NEXT") {
            let var = self.try_num_var_name()?;
            return Ok(Node::new(NodeKind::Next { var }));
        }
        if self.cursor.try_keyword("IF") {
            return self.parse_if();
        }
        if self.cursor.try_keyword("READ") {
            let vars = self.parse_var_list()?;
            return Ok(Node::new(NodeKind::Read { vars }));
        }
        if self.cursor.try_keyword("DATA") {
            let mut items = vec![self.parse_datum()?];
            while self.cursor.try_symbol(",") {
                items.push(self.parse_datum()?);
            }
            return Ok(Node::new(NodeKind::Data { items }));
        }
        if self.cursor.try_symbol("?") {
            return self.parse_print(true);
        }
        if self.cursor.try_keyword("PRINT") {
            return self.parse_print(false);
        }
        if self.cursor.try_keyword("INPUT") {
            return self.parse_input();
        }
        if self.cursor.try_keyword("LINE") {
            self.expect_keyword("INPUT")?;
            let name = self
                .try_str_var_name()?
                .ok_or_else(|| self.error_here("expected string variable"))?;
            return Ok(Node::new(NodeKind::LineInput { var: name }));
        }
        if self.cursor.try_keyword("ALTER") {
            return self.parse_alter();
        }
        if self.cursor.try_keyword("LET") {
            return self.parse_let(false);
        }

        self.parse_let(true)
    }

    fn parse_on(&mut self) -> Result<Node, Diagnostic> {
        let selector = self.parse_num_expr()?;
        if self.cursor.try_keyword("GOTO") {
            let targets = self.parse_line_list()?;
            return Ok(Node::new(NodeKind::OnGoto { selector: Box::new(selector), targets }));
        }
        if self.cursor.try_keyword("GOSUB") {
            let targets = self.parse_line_list()?;
            return Ok(Node::new(NodeKind::OnGosub { selector: Box::new(selector), targets }));
        }
        if self.cursor.try_keyword("ALTER") {
            let from = self.parse_line_ref()?;
            self.expect_keyword("TO")?;
            let has_proceed = self.cursor.try_keyword("PROCEED");
            if has_proceed {
                self.expect_keyword("TO")?;
            }
            let targets = self.parse_line_list()?;
            return Ok(Node::new(NodeKind::OnAlter {
                selector: Box::new(selector),
                from: Box::new(from),
                targets,
                abbrev: !has_proceed,
            }));
        }
        Err(self.error_here("expected GOTO, GOSUB, or ALTER"))
    }

    fn parse_alter(&mut self) -> Result<Node, Diagnostic> {
        let from = self.parse_line_ref()?;
        self.expect_keyword("TO")?;
        let has_proceed = self.cursor.try_keyword("PROCEED");
        if has_proceed {
            self.expect_keyword("TO")?;
        }
        let to = self.parse_line_ref()?;
        Ok(Node::new(NodeKind::Alter { from: Box::new(from), to: Box::new(to), abbrev: !has_proceed }))
    }

    fn parse_for(&mut self) -> Result<Node, Diagnostic> {
        let var = self
            .try_num_var_name()?
            .ok_or_else(|| self.error_here("expected numeric variable"))?;
        self.expect_symbol("=")?;
        let from = self.parse_num_expr()?;
        self.expect_keyword("TO")?;
        let to = self.parse_num_expr()?;
        let step = if self.cursor.try_keyword("STEP") {
            Some(Box::new(self.parse_num_expr()?))
        } else {
            None
        };
        Ok(Node::new(NodeKind::For { var, from: Box::new(from), to: Box::new(to), step }))
    }

    fn parse_if(&mut self) -> Result<Node, Diagnostic> {
        let cond = self.parse_num_expr()?;
        self.expect_keyword("THEN")?;
        let then_branch = self.parse_statements_until_else()?;
        let else_branch = if self.cursor.try_keyword("ELSE") {
            Some(Rc::new(self.parse_statements_until_else()?))
        } else {
            None
        };
        Ok(Node::new(NodeKind::If {
            cond: Box::new(cond),
            then_branch: Rc::new(then_branch),
            else_branch,
        }))
    }

    fn parse_print(&mut self, abbrev: bool) -> Result<Node, Diagnostic> {
        let mut items = Vec::new();
        if self.cursor.at_end() || self.peek_symbol(":") {
            return Ok(Node::new(NodeKind::Print { items, abbrev }));
        }
        loop {
            let expr = self.parse_datum()?;
            if self.cursor.try_symbol(";") {
                items.push(PrintItem { expr, semicolon: true });
                if self.cursor.at_end() || self.peek_symbol(":") {
                    break;
                }
                continue;
            }
            if self.cursor.try_symbol(",") {
                items.push(PrintItem { expr, semicolon: false });
                continue;
            }
            items.push(PrintItem { expr, semicolon: false });
            break;
        }
        Ok(Node::new(NodeKind::Print { items, abbrev }))
    }

    fn parse_input(&mut self) -> Result<Node, Diagnostic> {
        let save = self.cursor.pos();
        let prompt = if let Some((value, _)) = self.cursor.try_str_lit() {
            if self.cursor.try_symbol(";") {
                Some(value)
            } else {
                self.cursor.rewind(save);
                None
            }
        } else {
            None
        };
        let vars = self.parse_var_list()?;
        Ok(Node::new(NodeKind::Input { prompt, vars }))
    }

    fn parse_let(&mut self, abbrev: bool) -> Result<Node, Diagnostic> {
        let var = self.parse_var_ref()?;
        self.expect_symbol("=")?;
        let expr = match &var {
            VarRef::Num(_) => self.parse_num_expr()?,
            VarRef::Str(_) => self.parse_str_expr()?,
        };
        Ok(Node::new(NodeKind::Let { var, expr: Box::new(expr), abbrev }))
    }
}

fn binary(op: BinOp, lhs: Node, rhs: Node) -> Node {
    Node::new(NodeKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
}

/// Folds a flat list of statements into a `next`-linked chain.
fn chain(stmts: Vec<Node>) -> Node {
    let mut iter = stmts.into_iter().rev();
    let mut node = iter.next().expect("statement list is never empty");
    for mut prev in iter {
        prev.next = Some(Rc::new(node));
        node = prev;
    }
    node
}

const ALL_FUNCS: &[Func] = &[
    Func::Abs, Func::Sgn, Func::Int, Func::Fix, Func::Sqr, Func::Sin, Func::Cos, Func::Tan,
    Func::Atn, Func::Log, Func::Exp, Func::Rnd, Func::Len, Func::Val, Func::Asc,
    Func::Chr, Func::Str, Func::Space, Func::Left, Func::Right, Func::StringRep,
    Func::Mid, Func::Instr,
];

const RESERVED: &[&str] = &[
    "TO", "STEP", "THEN", "ELSE", "GOTO", "GOSUB", "RETURN", "RUN", "RESTORE",
    "ON", "REM", "FOR", "NEXT", "IF", "READ", "DATA", "PRINT", "INPUT", "LINE",
    "LET", "ALTER", "PROCEED", "LIST", "DEL", "NEW", "END", "STOP", "CONT",
    "CLS", "AND", "OR", "XOR", "EQV", "IMP", "NAND", "NOR", "NOT", "MOD",
];

fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_expr(src: &str) -> Node {
        let mut p = Parser::new(src);
        p.parse_num_expr().expect("expected a valid expression")
    }

    #[test]
    fn kludge_lets_equality_see_ne() {
        let node = parse_expr("1 <> 2");
        match node.kind {
            NodeKind::Binary { op: BinOp::Ne, .. } => {}
            other => panic!("expected Ne, got {:?}", other),
        }
    }

    #[test]
    fn inequality_handles_ge() {
        let node = parse_expr("1 >= 2");
        assert!(matches!(node.kind, NodeKind::Binary { op: BinOp::Ge, .. }));
    }

    #[test]
    fn precedence_climbs_through_and_or() {
        // AND binds tighter than OR.
        let node = parse_expr("1 OR 2 AND 3");
        match node.kind {
            NodeKind::Binary { op: BinOp::Or, rhs, .. } => {
                assert!(matches!(rhs.kind, NodeKind::Binary { op: BinOp::And, .. }));
            }
            other => panic!("expected Or at top, got {:?}", other),
        }
    }

    #[test]
    fn parenthesized_sets_force_parens() {
        let node = parse_expr("(1 + 2)");
        assert!(node.force_parens);
    }

    #[test]
    fn for_statement_parses_step() {
        let mut p = Parser::new("FOR I = 1 TO 3 STEP 2");
        let node = p.parse_statement().unwrap();
        match node.kind {
            NodeKind::For { step: Some(_), .. } => {}
            other => panic!("expected FOR with STEP, got {:?}", other),
        }
    }

    #[test]
    fn print_semicolon_suppresses_trailing_newline_hint() {
        let mut p = Parser::new("PRINT I;");
        let node = p.parse_statement().unwrap();
        match node.kind {
            NodeKind::Print { items, .. } => {
                assert_eq!(items.len(), 1);
                assert!(items[0].semicolon);
            }
            other => panic!("expected Print, got {:?}", other),
        }
    }

    #[test]
    fn numbered_line_with_no_body_is_a_deletion() {
        let parsed = parse_line("10").unwrap().unwrap();
        match parsed {
            ParsedLine::Numbered { num: 10, body: None } => {}
            _ => panic!("expected a bodyless numbered line"),
        }
    }

    #[test]
    fn reserved_word_is_not_a_variable() {
        let mut p = Parser::new("TO");
        assert!(p.try_num_var_name().unwrap().is_none());
    }
}
