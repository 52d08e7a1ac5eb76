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

//! Execution state: the current position, and the two control-flow
//! stacks (`GOSUB` return addresses, `FOR` loop frames) that hang off it.
//!
//! A [`Position`] pairs the enclosing stored line (`None` in immediate
//! mode) with a direct handle on the statement to execute next. The
//! statement handle is an `Rc`, not a line/offset pair, because `IF`
//! branches are themselves statement chains nested inside a line's body
//! — a `FOR` or `GOSUB` deep inside an `IF...THEN` still needs a handle
//! its stack frame can resume at directly, not just "index N of this
//! line". `stmt: None` with `line: Some(_)` means the line is exhausted
//! and the advancement rule should cross to the next stored line;
//! `line: None` covers both "immediate chain ended" and "program ended".

use std::rc::Rc;

use crate::lang::ast::Node;

use super::program::{LineHandle, Program};

/// Where execution is right now, or will resume.
#[derive(Clone)]
pub struct Position {
    pub line: Option<LineHandle>,
    pub stmt: Option<Rc<Node>>,
}

impl Position {
    pub const HALTED: Position = Position { line: None, stmt: None };

    pub fn is_halted(&self) -> bool {
        self.stmt.is_none()
    }

    /// The position at the start of the stored program, or halted if
    /// the store is empty.
    pub fn program_start(program: &Program) -> Position {
        match program.first_handle() {
            Some(h) => Position { line: Some(h), stmt: Some(program.get(h).unwrap().body.clone()) },
            None => Position::HALTED,
        }
    }

    /// The position at the start of line `num`, if it exists.
    pub fn at_line(program: &Program, num: i64) -> Option<Position> {
        let h = program.find_handle(num)?;
        Some(Position { line: Some(h), stmt: Some(program.get(h).unwrap().body.clone()) })
    }

    /// The position at the start of a resolved [`LineHandle`].
    pub fn at_handle(program: &Program, handle: LineHandle) -> Position {
        Position { line: Some(handle), stmt: Some(program.get(handle).unwrap().body.clone()) }
    }

    /// An immediate-mode position: no enclosing line, so reaching the
    /// end of `chain` halts rather than crossing to a next line.
    pub fn immediate(chain: Rc<Node>) -> Position {
        Position { line: None, stmt: Some(chain) }
    }
}

/// The default "what comes after this statement" rule: follow
/// `stmt.next`; if that's empty, cross to the next stored line
/// (immediate mode has no next line, so it simply halts).
pub fn advance(program: &Program, pos: &Position) -> Position {
    if let Some(stmt) = &pos.stmt {
        if let Some(next) = &stmt.next {
            return Position { line: pos.line, stmt: Some(next.clone()) };
        }
    }
    match pos.line {
        Some(h) => match program.next_handle(h) {
            Some(nh) => Position::at_handle(program, nh),
            None => Position::HALTED,
        },
        None => Position::HALTED,
    }
}

/// A `GOSUB` return-stack frame: where to resume once `RETURN` pops it.
pub struct GosubFrame {
    pub resume: Position,
}

/// An active `FOR` loop frame. `resume` is the statement immediately
/// after the `FOR` header; `NEXT` jumps back there while the loop
/// variable remains within `[start, end]` by `step`'s sign.
pub struct ForFrame {
    pub var: String,
    pub end: f64,
    pub step: f64,
    pub resume: Position,
}

/// The data cursor driving `READ`: shared by both execution contexts,
/// since `DATA` lives in the stored program regardless of which context
/// issues the `READ`.
pub struct DataCursor {
    pub pos: Position,
    pub datum: usize,
}

impl DataCursor {
    pub fn at_program_start(program: &Program) -> Self {
        DataCursor { pos: Position::program_start(program), datum: 0 }
    }
}

/// One execution context: either the persistent program context or a
/// transient one created per immediate command. Holds the position and
/// the two control-flow stacks; the data cursor is not here because it
/// is shared across both contexts (see [`DataCursor`]).
#[derive(Default)]
pub struct ExecContext {
    pub pos: Option<Position>,
    pub ret_stack: Vec<GosubFrame>,
    pub for_stack: Vec<ForFrame>,
}

impl ExecContext {
    pub fn new() -> Self {
        ExecContext { pos: None, ret_stack: Vec::new(), for_stack: Vec::new() }
    }

    /// Drops the stacks and cursor, as required whenever the program
    /// store is mutated.
    pub fn reset(&mut self) {
        self.pos = None;
        self.ret_stack.clear();
        self.for_stack.clear();
    }

    pub fn is_running(&self) -> bool {
        self.pos.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::ast::{Node, NodeKind};

    fn stub() -> Node {
        Node::new(NodeKind::End)
    }

    #[test]
    fn advance_crosses_to_next_line_when_stmt_exhausted() {
        let mut program = Program::new();
        program.insert(10, stub());
        program.insert(20, stub());
        let pos = Position::program_start(&program);
        let next = advance(&program, &pos);
        assert_eq!(next.line, Some(1));
    }

    #[test]
    fn advance_halts_at_program_end() {
        let mut program = Program::new();
        program.insert(10, stub());
        let pos = Position::program_start(&program);
        let next = advance(&program, &pos);
        assert!(next.is_halted());
    }

    #[test]
    fn immediate_position_halts_without_crossing_lines() {
        let program = Program::new();
        let pos = Position::immediate(Rc::new(stub()));
        let next = advance(&program, &pos);
        assert!(next.is_halted());
    }
}
