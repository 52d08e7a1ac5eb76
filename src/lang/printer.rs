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

//! Pretty-printer: renders a parsed tree back to canonical surface syntax.
//!
//! Used by `LIST` and by diagnostics that echo a statement. Parentheses
//! are emitted only where [`Node::force_parens`] is set (or the `PARENS`
//! debug flag forces every binary subexpression), since the grammar's
//! precedence levels already disambiguate everything else — this is
//! what makes the print/re-parse round-trip in spec.md's invariant 3
//! hold up to parenthesization hints only.

use std::fmt::Write;

use super::ast::*;

/// Renders one stored line's statement chain (no leading line number).
pub fn print_statements(node: &Node, parens_always: bool) -> String {
    let mut out = String::new();
    print_chain(&mut out, node, parens_always);
    out
}

/// Renders a full stored line, `num` followed by its statement chain.
pub fn print_line(num: i64, body: &Node, parens_always: bool) -> String {
    let mut out = String::new();
    write!(out, "{} ", num).unwrap();
    print_chain(&mut out, body, parens_always);
    out
}

fn print_chain(out: &mut String, node: &Node, parens_always: bool) {
    print_statement(out, node, parens_always);
    let mut cur = &node.next;
    while let Some(next) = cur {
        out.push_str(" : ");
        print_statement(out, next, parens_always);
        cur = &next.next;
    }
}

fn print_range(out: &mut String, range: LineRange) {
    match (range.head, range.tail) {
        (-1, -1) => {}
        (h, -1) if h >= 0 => { write!(out, " {}-", h).unwrap(); }
        (-1, t) if t >= 0 => { write!(out, " -{}", t).unwrap(); }
        (h, t) if h == t => { write!(out, " {}", h).unwrap(); }
        (h, t) => { write!(out, " {}-{}", h, t).unwrap(); }
    }
}

fn print_line_ref(out: &mut String, node: &Node) {
    if let NodeKind::LineRef { num, .. } = &node.kind {
        if *num >= 0 {
            write!(out, "{}", num).unwrap();
        }
    }
}

fn print_statement(out: &mut String, node: &Node, parens_always: bool) {
    match &node.kind {
        NodeKind::New => out.push_str("NEW"),
        NodeKind::End => out.push_str("END"),
        NodeKind::Stop => out.push_str("STOP"),
        NodeKind::Cont => out.push_str("CONT"),
        NodeKind::Return => out.push_str("RETURN"),
        NodeKind::Cls => out.push_str("CLS"),
        NodeKind::List(range) => { out.push_str("LIST"); print_range(out, *range); }
        NodeKind::Del(range) => { out.push_str("DEL"); print_range(out, *range); }
        NodeKind::Gosub(target) => { out.push_str("GOSUB "); print_line_ref(out, target); }
        NodeKind::Goto(target) => { out.push_str("GOTO "); print_line_ref(out, target); }
        NodeKind::Run(target) => {
            out.push_str("RUN");
            if let Some(t) = target { out.push(' '); print_line_ref(out, t); }
        }
        NodeKind::Restore(target) => {
            out.push_str("RESTORE");
            if let Some(t) = target { out.push(' '); print_line_ref(out, t); }
        }
        NodeKind::OnGoto { selector, targets } => {
            out.push_str("ON ");
            print_expr(out, selector, parens_always);
            out.push_str(" GOTO ");
            print_line_list(out, targets);
        }
        NodeKind::OnGosub { selector, targets } => {
            out.push_str("ON ");
            print_expr(out, selector, parens_always);
            out.push_str(" GOSUB ");
            print_line_list(out, targets);
        }
        NodeKind::Rem { text, abbrev } => {
            out.push_str(if *abbrev { "'" } else { "REM" });
            out.push_str(text);
        }
        NodeKind::For { var, from, to, step } => {
            write!(out, "FOR {} = ", var).unwrap();
            print_expr(out, from, parens_always);
            out.push_str(" TO ");
            print_expr(out, to, parens_always);
            if let Some(step) = step {
                out.push_str(" STEP ");
                print_expr(out, step, parens_always);
            }
        }
        NodeKind::Next { var } => {
            out.push_str("NEXT");
            if let Some(v) = var { write!(out, " {}", v).unwrap(); }
        }
        NodeKind::If { cond, then_branch, else_branch } => {
            out.push_str("IF ");
            print_expr(out, cond, parens_always);
            out.push_str(" THEN ");
            print_chain(out, then_branch, parens_always);
            if let Some(e) = else_branch {
                out.push_str(" ELSE ");
                print_chain(out, e, parens_always);
            }
        }
        NodeKind::Read { vars } => {
            out.push_str("READ ");
            print_var_list(out, vars);
        }
        NodeKind::Data { items } => {
            out.push_str("DATA ");
            for (i, item) in items.iter().enumerate() {
                if i > 0 { out.push_str(", "); }
                print_expr(out, item, parens_always);
            }
        }
        NodeKind::Print { items, abbrev } => {
            out.push_str(if *abbrev { "?" } else { "PRINT" });
            if !items.is_empty() {
                out.push(' ');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 { out.push(' '); }
                    print_expr(out, &item.expr, parens_always);
                    out.push(if item.semicolon { ';' } else { ',' });
                }
                // Drop the trailing separator after the final item
                // unless it was a semicolon, which is itself surface
                // syntax (suppresses the statement's newline).
                if !items.last().unwrap().semicolon {
                    out.pop();
                }
            }
        }
        NodeKind::Input { prompt, vars } => {
            out.push_str("INPUT ");
            if let Some(p) = prompt {
                write!(out, "[{}]; ", p).unwrap();
            }
            print_var_list(out, vars);
        }
        NodeKind::LineInput { var } => {
            write!(out, "LINE INPUT {}$", var).unwrap();
        }
        NodeKind::Let { var, expr, abbrev } => {
            if !abbrev { out.push_str("LET "); }
            print_var_ref(out, var);
            out.push_str(" = ");
            print_expr(out, expr, parens_always);
        }
        NodeKind::Alter { from, to, abbrev } => {
            out.push_str("ALTER ");
            print_line_ref(out, from);
            out.push_str(" TO ");
            if !abbrev { out.push_str("PROCEED TO "); }
            print_line_ref(out, to);
        }
        NodeKind::OnAlter { selector, from, targets, abbrev } => {
            out.push_str("ON ");
            print_expr(out, selector, parens_always);
            out.push_str(" ALTER ");
            print_line_ref(out, from);
            out.push_str(" TO ");
            if !abbrev { out.push_str("PROCEED TO "); }
            print_line_list(out, targets);
        }
        // Expression kinds never appear as top-level statements.
        _ => print_expr(out, node, parens_always),
    }
}

fn print_var_ref(out: &mut String, var: &VarRef) {
    match var {
        VarRef::Num(n) => out.push_str(n),
        VarRef::Str(n) => { out.push_str(n); out.push('$'); }
    }
}

fn print_var_list(out: &mut String, vars: &[VarRef]) {
    for (i, v) in vars.iter().enumerate() {
        if i > 0 { out.push_str(", "); }
        print_var_ref(out, v);
    }
}

fn print_line_list(out: &mut String, targets: &[Node]) {
    for (i, t) in targets.iter().enumerate() {
        if i > 0 { out.push_str(", "); }
        print_line_ref(out, t);
    }
}

fn print_expr(out: &mut String, node: &Node, parens_always: bool) {
    let wrap = node.force_parens || (parens_always && is_binary_like(node));
    if wrap { out.push('('); }
    match &node.kind {
        NodeKind::NumLit(n) => { write!(out, "{}", crate::interp::value::format_number(*n)).unwrap(); }
        NodeKind::StrLit { value, delim } => print_str_lit(out, value, *delim),
        NodeKind::NumVar(name) => out.push_str(name),
        NodeKind::StrVar(name) => { out.push_str(name); out.push('$'); }
        NodeKind::LineRef { .. } => print_line_ref(out, node),
        NodeKind::Not(inner) => { out.push_str("NOT "); print_expr(out, inner, parens_always); }
        NodeKind::Neg(inner) => { out.push('-'); print_expr(out, inner, parens_always); }
        NodeKind::Pos(inner) => { out.push('+'); print_expr(out, inner, parens_always); }
        NodeKind::Binary { op, lhs, rhs } => {
            print_expr(out, lhs, parens_always);
            write!(out, " {} ", op.spelling()).unwrap();
            print_expr(out, rhs, parens_always);
        }
        NodeKind::Concat { lhs, rhs } => {
            print_expr(out, lhs, parens_always);
            out.push_str(" + ");
            print_expr(out, rhs, parens_always);
        }
        NodeKind::Call { func, args } => {
            out.push_str(func.name());
            out.push('(');
            for (i, a) in args.iter().enumerate() {
                if i > 0 { out.push_str(", "); }
                print_expr(out, a, parens_always);
            }
            out.push(')');
        }
        // Statement-only kinds should never be reached via print_expr; if
        // they are, fall back to the statement printer for debuggability.
        _ => print_statement(out, node, parens_always),
    }
    if wrap { out.push(')'); }
}

fn is_binary_like(node: &Node) -> bool {
    matches!(node.kind, NodeKind::Binary { .. } | NodeKind::Concat { .. })
}

fn print_str_lit(out: &mut String, value: &str, delim: u8) {
    if delim == 0 {
        write!(out, "[{}]", value).unwrap();
    } else {
        let d = delim as char;
        write!(out, "]{}{}{}", d, value, d).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::parser::parse_line;

    fn render(src: &str) -> String {
        let parsed = parse_line(src).unwrap().unwrap();
        match parsed {
            crate::lang::parser::ParsedLine::Immediate(body) => print_statements(&body, false),
            crate::lang::parser::ParsedLine::Numbered { num, body: Some(body) } => {
                print_line(num, &body, false)
            }
            _ => panic!("unexpected parse result for {:?}", src),
        }
    }

    #[test]
    fn round_trips_simple_let() {
        assert_eq!(render("X = 1 + 2"), "X = 1 + 2");
    }

    #[test]
    fn preserves_explicit_parens() {
        assert_eq!(render("X = (1 + 2) * 3"), "X = (1 + 2) * 3");
    }

    #[test]
    fn print_with_semicolons() {
        assert_eq!(render("PRINT 1; 2;"), "PRINT 1; 2;");
    }

    #[test]
    fn numbered_line_renders_number_prefix() {
        assert_eq!(render("10 PRINT [hi]"), "10 PRINT [hi]");
    }
}
