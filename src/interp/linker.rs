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

//! Linker: resolves every [`NodeKind::LineRef`] in a subtree to a direct
//! [`LineHandle`] into the program store.
//!
//! Missing targets each produce one diagnostic; the caller aborts
//! execution if the returned count is nonzero (spec.md section 4.6).

use crate::diagnostic::Diagnostic;
use crate::lang::ast::{Node, NodeKind};

use super::program::Program;

/// Walks `root`'s statement chain (and every nested chain: `IF` branches)
/// resolving line references against `program`. `current_line` attributes
/// diagnostics to the enclosing stored line, when there is one.
pub fn link(root: &Node, program: &Program, current_line: Option<i64>) -> (usize, Vec<Diagnostic>) {
    let mut count = 0;
    let mut diags = Vec::new();
    link_chain(root, program, current_line, &mut count, &mut diags);
    (count, diags)
}

fn link_chain(
    node: &Node,
    program: &Program,
    current_line: Option<i64>,
    count: &mut usize,
    diags: &mut Vec<Diagnostic>,
) {
    let mut cur = Some(node);
    while let Some(n) = cur {
        link_one(n, program, current_line, count, diags);
        cur = n.next.as_deref();
    }
}

fn link_one(
    node: &Node,
    program: &Program,
    current_line: Option<i64>,
    count: &mut usize,
    diags: &mut Vec<Diagnostic>,
) {
    match &node.kind {
        NodeKind::LineRef { num, link } => {
            if *num < 0 {
                link.set(None);
            } else {
                match program.find_handle(*num) {
                    Some(h) => link.set(Some(h)),
                    None => {
                        *count += 1;
                        let mut d = Diagnostic::error(format!("no such line: {}", num));
                        if let Some(n) = current_line {
                            d = d.at_line(n);
                        }
                        diags.push(d);
                    }
                }
            }
        }
        NodeKind::Not(inner) | NodeKind::Neg(inner) | NodeKind::Pos(inner) => {
            link_one(inner, program, current_line, count, diags);
        }
        NodeKind::Binary { lhs, rhs, .. } | NodeKind::Concat { lhs, rhs } => {
            link_one(lhs, program, current_line, count, diags);
            link_one(rhs, program, current_line, count, diags);
        }
        NodeKind::Call { args, .. } => {
            for a in args {
                link_one(a, program, current_line, count, diags);
            }
        }
        NodeKind::Goto(t) | NodeKind::Gosub(t) => {
            link_one(t, program, current_line, count, diags);
        }
        NodeKind::Run(t) | NodeKind::Restore(t) => {
            if let Some(t) = t {
                link_one(t, program, current_line, count, diags);
            }
        }
        NodeKind::OnGoto { selector, targets } | NodeKind::OnGosub { selector, targets } => {
            link_one(selector, program, current_line, count, diags);
            for t in targets {
                link_one(t, program, current_line, count, diags);
            }
        }
        NodeKind::Alter { from, to, .. } => {
            link_one(from, program, current_line, count, diags);
            link_one(to, program, current_line, count, diags);
        }
        NodeKind::OnAlter { selector, from, targets, .. } => {
            link_one(selector, program, current_line, count, diags);
            link_one(from, program, current_line, count, diags);
            for t in targets {
                link_one(t, program, current_line, count, diags);
            }
        }
        NodeKind::For { from, to, step, .. } => {
            link_one(from, program, current_line, count, diags);
            link_one(to, program, current_line, count, diags);
            if let Some(s) = step {
                link_one(s, program, current_line, count, diags);
            }
        }
        NodeKind::If { cond, then_branch, else_branch } => {
            link_one(cond, program, current_line, count, diags);
            link_chain(then_branch, program, current_line, count, diags);
            if let Some(e) = else_branch {
                link_chain(e, program, current_line, count, diags);
            }
        }
        NodeKind::Data { items } => {
            for i in items {
                link_one(i, program, current_line, count, diags);
            }
        }
        NodeKind::Print { items, .. } => {
            for i in items {
                link_one(&i.expr, program, current_line, count, diags);
            }
        }
        NodeKind::Let { expr, .. } => {
            link_one(expr, program, current_line, count, diags);
        }
        // Trivial statements, READ/INPUT/LINE INPUT (variable lists only),
        // LIST/DEL (a LineRange, not a Node), and literals/variables carry
        // no nested LineRef to resolve.
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::parser::parse_line;

    fn parse_stmt(src: &str) -> Node {
        match parse_line(src).unwrap().unwrap() {
            crate::lang::parser::ParsedLine::Immediate(n) => n,
            crate::lang::parser::ParsedLine::Numbered { body: Some(n), .. } => n,
            _ => panic!("unexpected parse result"),
        }
    }

    #[test]
    fn missing_target_is_diagnosed() {
        let program = Program::new();
        let node = parse_stmt("GOTO 10");
        let (count, diags) = link(&node, &program, None);
        assert_eq!(count, 1);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn resolved_target_sets_link() {
        let mut program = Program::new();
        program.insert(10, parse_stmt("PRINT [hi]"));
        let node = parse_stmt("GOTO 10");
        let (count, _) = link(&node, &program, None);
        assert_eq!(count, 0);
        if let NodeKind::Goto(target) = &node.kind {
            if let NodeKind::LineRef { link, .. } = &target.kind {
                assert_eq!(link.get(), Some(0));
            } else {
                panic!("expected LineRef");
            }
        } else {
            panic!("expected Goto");
        }
    }

    #[test]
    fn unspecified_reference_links_to_none() {
        let program = Program::new();
        let node = parse_stmt("RUN");
        let (count, _) = link(&node, &program, None);
        assert_eq!(count, 0);
    }
}
