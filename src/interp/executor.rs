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

//! The single-step executor: advances one [`ExecContext`] by exactly one
//! statement and reports back a [`Honeydo`] telling the driver about any
//! context switch it alone can perform (entering running mode, ending a
//! program, raising the break flag, and so on).
//!
//! `Interpreter` owns everything a statement might touch: the program
//! store, variable namespaces, the shared `DATA` cursor, the RND memory
//! cell, and a single-error latch that the driver consults and clears
//! between lines.

use crate::diagnostic::Diagnostic;
use crate::lang::ast::{LineRange, Node, NodeKind, VarRef};

use super::capability::{BreakFlag, Entropy, LineReader, OutputSink};
use super::context::{advance, DataCursor, ExecContext, ForFrame, GosubFrame, Position};
use super::linker;
use super::program::{LineHandle, Program};
use super::value::{format_number, Evaluator, Value};
use super::vars::Variables;

/// What `step` asks the driver to do next. Zero (`None`) means "nothing
/// special, keep single-stepping this context."
#[derive(Debug, PartialEq)]
pub enum Honeydo {
    None,
    /// `RUN [line]`: the driver erases variables, resets the stacks,
    /// relinks the program, and starts at the given line (or the first
    /// stored line, if `None`).
    Run(Option<LineHandle>),
    /// Immediate-mode `GOTO`: the driver must switch from the immediate
    /// context to the program context, starting at the given line.
    Goto(LineHandle),
    New,
    End,
    Stop,
    Cont,
    /// `RETURN` completed; `true` if the popped frame's caller was the
    /// program context (so the driver resumes running), `false` if it
    /// was immediate.
    Return(bool),
    /// `LIST [range]`: the driver renders each matching stored line
    /// (it alone knows the `PARENS` debug setting).
    List(LineRange),
    /// `DEL [range]`: the driver deletes the range and resets
    /// `program_ctx` (Invariant 3), which this context alone can't reach.
    Del(LineRange),
    /// `CLS`: the driver alone knows whether `NOANSI` forbids it.
    Cls,
    Error(Diagnostic),
}

/// Everything a running or immediate statement can observe or mutate.
pub struct Interpreter<'a> {
    pub program: Program,
    pub vars: Variables,
    pub data: DataCursor,
    pub rnd_last: f64,
    pub entropy: &'a dyn Entropy,
    pub break_flag: &'a BreakFlag,
    pub output: &'a mut dyn OutputSink,
    pub reader: &'a mut dyn LineReader,
    /// First diagnostic raised on the current line; cleared by the
    /// driver before each new line begins (design note "Single-error
    /// latch").
    pub latch: Option<Diagnostic>,
    /// Set whenever the store is mutated; cleared once [`Self::relink`]
    /// has walked every stored line with no diagnostics. `link()`
    /// resolves a `LineRef` from its literal line number every time it
    /// runs, so relinking unconditionally on every `RUN` would undo an
    /// `ALTER`'s Cell rewrite — relinking must happen only when the
    /// store itself changed, not on every entry into running mode.
    needs_link: bool,
    /// `true` once a `PRINT` statement has ended its item list with a
    /// semicolon: the separating space owed to whatever prints next is
    /// deferred rather than written eagerly, so that if nothing ever
    /// prints again the run ends on the value itself, not on trailing
    /// whitespace.
    pending_space: bool,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        entropy: &'a dyn Entropy,
        break_flag: &'a BreakFlag,
        output: &'a mut dyn OutputSink,
        reader: &'a mut dyn LineReader,
    ) -> Self {
        let program = Program::new();
        let data = DataCursor::at_program_start(&program);
        Interpreter {
            program,
            vars: Variables::new(),
            data,
            rnd_last: 0.0,
            entropy,
            break_flag,
            output,
            reader,
            latch: None,
            needs_link: true,
            pending_space: false,
        }
    }

    /// Relinks every stored line if the store has changed since the last
    /// relink, leaving `needs_link` set on failure so the next attempt
    /// retries rather than silently giving up.
    pub fn relink(&mut self) -> Vec<Diagnostic> {
        if !self.needs_link {
            return Vec::new();
        }
        let mut diags = Vec::new();
        for line in self.program.iter() {
            diags.extend(link_tree(&line.body, &self.program, Some(line.num)));
        }
        if diags.is_empty() {
            self.needs_link = false;
        }
        diags
    }

    /// Writes `s`, first flushing a space deferred by a trailing-semicolon
    /// `PRINT`.
    fn write_item(&mut self, s: &str) {
        if self.pending_space {
            self.output.write_str(" ");
            self.pending_space = false;
        }
        self.output.write_str(s);
    }

    /// Called whenever execution halts (falls off the end of the program,
    /// or hits `END`/`STOP`): drops any deferred separator space and
    /// terminates a dirty line, so a run ending in `PRINT X;` still ends
    /// on a newline rather than on `X` or on trailing whitespace.
    fn finish_output(&mut self) {
        self.pending_space = false;
        self.output.newline_if_dirty();
    }

    /// The contract backing the program store's Invariant 3: any call
    /// that mutates the store must reset whichever contexts might hold
    /// now-stale handles. Variables are untouched — only `NEW` clears
    /// those.
    pub fn reset_program_contexts(&mut self, program_ctx: &mut ExecContext) {
        program_ctx.reset();
        self.data = DataCursor::at_program_start(&self.program);
    }

    /// `RUN [line]`: erases variables, resets stacks, and retargets the
    /// program context. The driver calls [`Self::relink`] first and only
    /// reaches this on success.
    pub fn begin_run(&mut self, program_ctx: &mut ExecContext, target: Option<LineHandle>) {
        self.vars.clear();
        self.reset_program_contexts(program_ctx);
        program_ctx.pos = Some(match target {
            Some(h) => Position::at_handle(&self.program, h),
            None => Position::program_start(&self.program),
        });
    }

    /// Writes driver chrome (the `Ok` prompt, diagnostics, `LIST`/`CLS`
    /// output) through the same sink `PRINT` uses, so dirty-column
    /// tracking stays consistent across both sources.
    pub fn write_raw(&mut self, s: &str) {
        self.output.write_str(s);
    }

    pub fn ensure_newline(&mut self) {
        self.output.newline_if_dirty();
    }

    /// The top-level REPL read, sharing the same reader `INPUT`/`LINE
    /// INPUT` use.
    pub fn read_line(&mut self, prompt: &str) -> Option<String> {
        self.reader.read_line(prompt)
    }

    /// Inserts or deletes a stored line, resetting `program_ctx` first
    /// per Invariant 3.
    pub fn store_line(&mut self, program_ctx: &mut ExecContext, num: i64, body: Option<Node>) {
        self.reset_program_contexts(program_ctx);
        self.needs_link = true;
        match body {
            Some(body) => self.program.insert(num, body),
            None => {
                if !self.program.delete_line(num) {
                    self.latch_warning(format!("no such line: {}", num));
                }
            }
        }
    }

    /// `DEL [range]`: deletes every stored line in `range`, resetting
    /// `program_ctx` first per Invariant 3.
    pub fn delete_lines(&mut self, program_ctx: &mut ExecContext, range: LineRange) {
        self.reset_program_contexts(program_ctx);
        self.needs_link = true;
        let removed = self.program.delete_range(range);
        if removed == 0 && range.head == range.tail && range.head >= 0 {
            self.latch_warning(format!("no such line: {}", range.head));
        }
    }

    /// `NEW`: clears the store and every variable, resetting
    /// `program_ctx` first per Invariant 3.
    pub fn new_program(&mut self, program_ctx: &mut ExecContext) {
        self.reset_program_contexts(program_ctx);
        self.program.clear();
        self.vars.clear();
        self.needs_link = true;
    }

    fn latch_error(&mut self, message: impl Into<String>) {
        if self.latch.is_none() {
            self.latch = Some(Diagnostic::error(message));
        }
    }

    fn latch_warning(&mut self, message: impl Into<String>) {
        if self.latch.is_none() {
            self.latch = Some(Diagnostic::warning(message));
        }
    }

    fn current_line_num(&self, pos: &Position) -> Option<i64> {
        pos.line.and_then(|h| self.program.get(h)).map(|l| l.num)
    }

    fn evaluator(&mut self) -> Evaluator<'_> {
        Evaluator::new(&mut self.vars, &mut self.rnd_last, self.entropy)
    }

    fn evaluate(&mut self, node: &Node) -> Result<Value, Diagnostic> {
        self.evaluator().evaluate(node)
    }

    /// Executes exactly one statement in `ctx`, advancing `ctx.pos` to
    /// the next statement (or halting it) as a side effect, and returns
    /// the honey-do signal for the driver.
    pub fn step(&mut self, ctx: &mut ExecContext, in_program: bool) -> Honeydo {
        let pos = match &ctx.pos {
            Some(p) if !p.is_halted() => p.clone(),
            _ => {
                self.finish_output();
                return Honeydo::End;
            }
        };
        let stmt = pos.stmt.clone().unwrap();
        let line_num = self.current_line_num(&pos);

        // Default next-statement; most arms leave this as-is. Control
        // flow arms retarget ctx.pos themselves before returning.
        ctx.pos = Some(advance(&self.program, &pos));

        match &stmt.kind {
            NodeKind::Rem { .. } | NodeKind::Data { .. } => Honeydo::None,

            NodeKind::Print { items, .. } => {
                for (i, item) in items.iter().enumerate() {
                    let v = match self.evaluate(&item.expr) {
                        Ok(v) => v,
                        Err(d) => return self.fail(d, line_num),
                    };
                    self.write_item(&render(&v));
                    let last = i + 1 == items.len();
                    if last {
                        if item.semicolon {
                            // Deferred: a space if something prints after
                            // this, nothing if the run ends here instead.
                            self.pending_space = true;
                        } else {
                            self.output.write_str("\n");
                        }
                    } else {
                        self.output.write_str(" ");
                    }
                }
                if items.is_empty() {
                    self.write_item("");
                    self.output.write_str("\n");
                }
                Honeydo::None
            }

            NodeKind::Let { var, expr, .. } => {
                let v = match self.evaluate(expr) {
                    Ok(v) => v,
                    Err(d) => return self.fail(d, line_num),
                };
                match self.assign(var, v) {
                    Ok(()) => Honeydo::None,
                    Err(d) => self.fail(d, line_num),
                }
            }

            NodeKind::If { cond, then_branch, else_branch } => {
                let v = match self.evaluate(cond) {
                    Ok(v) => v,
                    Err(d) => return self.fail(d, line_num),
                };
                let branch = if v.is_truthy() {
                    Some(then_branch.clone())
                } else {
                    else_branch.clone()
                };
                ctx.pos = Some(match branch {
                    Some(b) => Position { line: pos.line, stmt: Some(b) },
                    None => advance(&self.program, &pos),
                });
                Honeydo::None
            }

            NodeKind::Goto(target) => {
                let handle = match line_ref_handle(target) {
                    Some(h) => h,
                    None => return self.fail(Diagnostic::error("no such line"), line_num),
                };
                if in_program {
                    ctx.pos = Some(Position::at_handle(&self.program, handle));
                    Honeydo::None
                } else {
                    Honeydo::Goto(handle)
                }
            }

            NodeKind::Gosub(target) => {
                if !in_program {
                    self.latch_error("immediate GOSUB not supported");
                    return self.fail_latched(line_num);
                }
                let handle = match line_ref_handle(target) {
                    Some(h) => h,
                    None => return self.fail(Diagnostic::error("no such line"), line_num),
                };
                ctx.ret_stack.push(GosubFrame { resume: ctx.pos.clone().unwrap() });
                ctx.pos = Some(Position::at_handle(&self.program, handle));
                Honeydo::None
            }

            NodeKind::Return => {
                match ctx.ret_stack.pop() {
                    Some(frame) => {
                        ctx.pos = Some(frame.resume);
                        Honeydo::Return(in_program)
                    }
                    None => self.fail(Diagnostic::error("RETURN without GOSUB"), line_num),
                }
            }

            NodeKind::OnGoto { selector, targets } => {
                match self.on_target(selector, targets, line_num) {
                    Ok(Some(handle)) => {
                        if in_program {
                            ctx.pos = Some(Position::at_handle(&self.program, handle));
                            Honeydo::None
                        } else {
                            Honeydo::Goto(handle)
                        }
                    }
                    Ok(None) => Honeydo::None,
                    Err(d) => self.fail(d, line_num),
                }
            }

            NodeKind::OnGosub { selector, targets } => {
                if !in_program {
                    self.latch_error("immediate GOSUB not supported");
                    return self.fail_latched(line_num);
                }
                match self.on_target(selector, targets, line_num) {
                    Ok(Some(handle)) => {
                        ctx.ret_stack.push(GosubFrame { resume: ctx.pos.clone().unwrap() });
                        ctx.pos = Some(Position::at_handle(&self.program, handle));
                        Honeydo::None
                    }
                    Ok(None) => Honeydo::None,
                    Err(d) => self.fail(d, line_num),
                }
            }

            NodeKind::For { var, from, to, step } => {
                let start = match self.evaluate(from).and_then(Value::expect_number) {
                    Ok(v) => v,
                    Err(d) => return self.fail(d, line_num),
                };
                let end = match self.evaluate(to).and_then(Value::expect_number) {
                    Ok(v) => v,
                    Err(d) => return self.fail(d, line_num),
                };
                let step_val = match step {
                    Some(s) => match self.evaluate(s).and_then(Value::expect_number) {
                        Ok(v) => v,
                        Err(d) => return self.fail(d, line_num),
                    },
                    None => 1.0,
                };
                if let Some(i) = ctx.for_stack.iter().position(|f| f.var == *var) {
                    ctx.for_stack.truncate(i);
                }
                let resume = ctx.pos.clone().unwrap();
                ctx.for_stack.push(ForFrame { var: var.clone(), end, step: step_val, resume });
                self.vars.set_num(var, start);
                Honeydo::None
            }

            NodeKind::Next { var } => {
                let idx = match var {
                    Some(name) => ctx.for_stack.iter().rposition(|f| f.var == *name),
                    None => ctx.for_stack.len().checked_sub(1),
                };
                let idx = match idx {
                    Some(i) => i,
                    None => return self.fail(Diagnostic::error("NEXT without FOR"), line_num),
                };
                ctx.for_stack.truncate(idx + 1);
                let (var_name, end, step, resume) = {
                    let frame = ctx.for_stack.last().unwrap();
                    (frame.var.clone(), frame.end, frame.step, frame.resume.clone())
                };
                let cur = match self.vars.get_num(&var_name) {
                    Some(Value::Number(n)) => n,
                    _ => 0.0,
                };
                let next_val = cur + step;
                let still_going = if step >= 0.0 { next_val <= end } else { next_val >= end };
                self.vars.set_num(&var_name, next_val);
                if still_going {
                    ctx.pos = Some(resume);
                } else {
                    ctx.for_stack.pop();
                }
                Honeydo::None
            }

            NodeKind::Read { vars } => {
                for v in vars {
                    match self.read_one() {
                        Ok(value) => match self.assign(v, value) {
                            Ok(()) => {}
                            Err(d) => return self.fail(d, line_num),
                        },
                        Err(d) => return self.fail(d, line_num),
                    }
                }
                Honeydo::None
            }

            NodeKind::Restore(target) => {
                self.data = match target {
                    Some(t) => match line_ref_handle(t) {
                        Some(h) => DataCursor { pos: Position::at_handle(&self.program, h), datum: 0 },
                        None => return self.fail(Diagnostic::error("no such line"), line_num),
                    },
                    None => DataCursor::at_program_start(&self.program),
                };
                Honeydo::None
            }

            NodeKind::Input { prompt, vars } => {
                match self.run_input(vars, prompt.as_deref()) {
                    Ok(()) => Honeydo::None,
                    Err(d) => self.fail(d, line_num),
                }
            }

            NodeKind::LineInput { var } => {
                match self.reader.read_line("") {
                    Some(line) => {
                        self.vars.set_str(var, line);
                        Honeydo::None
                    }
                    None => self.fail(Diagnostic::error("out of data"), line_num),
                }
            }

            NodeKind::Alter { from, to, .. } => {
                match self.alter(from, to) {
                    Ok(()) => Honeydo::None,
                    Err(d) => self.fail(d, line_num),
                }
            }

            NodeKind::OnAlter { selector, from, targets, .. } => {
                match self.on_target(selector, targets, line_num) {
                    Ok(Some(handle)) => match self.alter_to_handle(from, handle) {
                        Ok(()) => Honeydo::None,
                        Err(d) => self.fail(d, line_num),
                    },
                    Ok(None) => Honeydo::None,
                    Err(d) => self.fail(d, line_num),
                }
            }

            // LIST rendering needs the driver's Config (the PARENS debug
            // flag); DEL's store mutation needs the driver's hold on
            // `program_ctx` to reset it per Invariant 3 — neither is
            // available to a single `ExecContext`, so both honey-do to
            // the driver. DEL still gets its self-modification guard
            // here since that's a core invariant, not an ambient one.
            NodeKind::List(range) => Honeydo::List(*range),
            NodeKind::Del(range) => {
                if in_program {
                    self.fail(Diagnostic::error("attempt to modify running program"), line_num)
                } else {
                    Honeydo::Del(*range)
                }
            }

            NodeKind::New => Honeydo::New,
            NodeKind::End => Honeydo::End,
            NodeKind::Stop => {
                self.break_flag.set();
                Honeydo::Stop
            }
            NodeKind::Cont => Honeydo::Cont,
            NodeKind::Run(target) => {
                match target {
                    Some(t) => match line_ref_handle(t) {
                        Some(h) => Honeydo::Run(Some(h)),
                        None => self.fail(Diagnostic::error("no such line"), line_num),
                    },
                    None => Honeydo::Run(None),
                }
            }
            NodeKind::Cls => Honeydo::Cls,

            other => self.fail(Diagnostic::error(format!("{:?} is not a statement", other)), line_num),
        }
    }

    fn fail(&mut self, d: Diagnostic, line_num: Option<i64>) -> Honeydo {
        let d = match line_num {
            Some(n) => d.at_line(n),
            None => d,
        };
        if self.latch.is_none() {
            self.latch = Some(d.clone());
        }
        Honeydo::Error(d)
    }

    fn fail_latched(&mut self, line_num: Option<i64>) -> Honeydo {
        let d = self.latch.clone().unwrap_or_else(|| Diagnostic::error("error"));
        let d = match line_num {
            Some(n) if d.origin == crate::diagnostic::Origin::General => d.at_line(n),
            _ => d,
        };
        Honeydo::Error(d)
    }

    fn assign(&mut self, var: &VarRef, value: Value) -> Result<(), Diagnostic> {
        match var {
            VarRef::Num(name) => self.vars.set_num(name, value.expect_number()?),
            VarRef::Str(name) => self.vars.set_str(name, value.expect_str()?),
        }
        Ok(())
    }

    /// Evaluates `selector` to a 1-based index into `targets`; returns
    /// `None` (fall through) when out of range.
    fn on_target(
        &mut self,
        selector: &Node,
        targets: &[Node],
        line_num: Option<i64>,
    ) -> Result<Option<LineHandle>, Diagnostic> {
        let n = self.evaluate(selector)?.expect_number()?;
        let i = n as i64;
        if i < 1 || i as usize > targets.len() {
            let _ = line_num;
            return Ok(None);
        }
        Ok(line_ref_handle(&targets[i as usize - 1]))
    }

    /// Advances the shared `DATA` cursor to the next datum, skipping
    /// over non-`DATA` statements and crossing numbered lines as needed,
    /// evaluates it, and advances the cursor past it.
    fn read_one(&mut self) -> Result<Value, Diagnostic> {
        loop {
            let pos = self.data.pos.clone();
            if pos.is_halted() {
                return Err(Diagnostic::error("out of data"));
            }
            let stmt = pos.stmt.clone().unwrap();
            if let NodeKind::Data { items } = &stmt.kind {
                if self.data.datum < items.len() {
                    let item = &items[self.data.datum];
                    let value = self.evaluator().evaluate(item)?;
                    self.data.datum += 1;
                    return Ok(value);
                }
            }
            self.data.pos = advance(&self.program, &pos);
            self.data.datum = 0;
        }
    }

    /// `INPUT [prompt;] varList`: prompts, reads lines until enough
    /// comma-separated fields have accumulated to fill `vars`, parses
    /// each field by the target's namespace, and reprompts with `?` on
    /// a short line or "redo from start" on a parse error.
    fn run_input(&mut self, vars: &[VarRef], prompt: Option<&str>) -> Result<(), Diagnostic> {
        loop {
            let mut fields: Vec<String> = Vec::new();
            let mut first = true;
            while fields.len() < vars.len() {
                if self.break_flag.is_set() {
                    // Clear it here: the caller's own break-flag check
                    // would otherwise see it still set and print a
                    // second "break" diagnostic for the same interrupt.
                    self.break_flag.clear();
                    return Err(Diagnostic::error("break"));
                }
                let line_prompt = if first {
                    first = false;
                    match prompt {
                        Some(p) => format!("{}? ", p),
                        None => "? ".to_string(),
                    }
                } else {
                    "?? ".to_string()
                };
                match self.reader.read_line(&line_prompt) {
                    Some(line) => fields.extend(split_input_fields(&line)),
                    None => return Err(Diagnostic::error("out of data")),
                }
            }

            let mut values = Vec::with_capacity(vars.len());
            let mut redo = false;
            for (var, field) in vars.iter().zip(fields.iter()) {
                let field = field.trim();
                match var {
                    VarRef::Str(_) => values.push(Value::Str(parse_input_string(field))),
                    VarRef::Num(_) => match parse_input_number(field) {
                        Some(n) => values.push(Value::Number(n)),
                        None => {
                            redo = true;
                            break;
                        }
                    },
                }
            }
            if redo {
                self.output.write_str("redo from start\n");
                continue;
            }
            for (var, value) in vars.iter().zip(values) {
                self.assign(var, value)?;
            }
            return Ok(());
        }
    }

    /// `ALTER A TO B`: rewrites every direct `LineRef` child of a
    /// `GOTO`/`GOSUB`/`RESTORE`/`ALTER` statement in line `A`'s chain to
    /// resolve to `B`'s link. Line `A`'s displayed text is untouched —
    /// only the resolved `Cell<Option<LineHandle>>` changes.
    fn alter(&mut self, from: &Node, to: &Node) -> Result<(), Diagnostic> {
        let to_handle = line_ref_handle(to).ok_or_else(|| Diagnostic::error("no such line"))?;
        self.alter_to_handle(from, to_handle)
    }

    fn alter_to_handle(&mut self, from: &Node, to_handle: LineHandle) -> Result<(), Diagnostic> {
        let from_handle = line_ref_handle(from).ok_or_else(|| Diagnostic::error("no such line"))?;
        let body = self.program.get(from_handle).unwrap().body.clone();
        let mut rewrote = false;
        let mut cur = Some(body);
        while let Some(n) = cur {
            match &n.kind {
                NodeKind::Goto(t) | NodeKind::Gosub(t) => {
                    if set_line_ref(t, to_handle) {
                        rewrote = true;
                    }
                }
                NodeKind::Restore(Some(t)) => {
                    if set_line_ref(t, to_handle) {
                        rewrote = true;
                    }
                }
                NodeKind::Alter { from, to, .. } => {
                    if set_line_ref(from, to_handle) {
                        rewrote = true;
                    }
                    if set_line_ref(to, to_handle) {
                        rewrote = true;
                    }
                }
                _ => {}
            }
            cur = n.next.clone();
        }
        if !rewrote {
            return Err(Diagnostic::error("no alterations"));
        }
        Ok(())
    }
}

/// `PRINT`'s rendering of one evaluated item: numbers render with no
/// leading sign padding, strings verbatim.
fn render(v: &Value) -> String {
    match v {
        Value::Number(n) => format_number(*n),
        Value::Str(s) => s.clone(),
    }
}

/// Splits one `INPUT`-supplied line into comma-separated fields, treating
/// a `[...]` bracketed span as opaque so an embedded comma doesn't end
/// the field early.
fn split_input_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut cur = String::new();
    let mut in_brackets = false;
    for c in line.chars() {
        match c {
            '[' => { in_brackets = true; cur.push(c); }
            ']' => { in_brackets = false; cur.push(c); }
            ',' if !in_brackets => { fields.push(std::mem::take(&mut cur)); }
            _ => cur.push(c),
        }
    }
    fields.push(cur);
    fields
}

/// A string field: `[body]` is unwrapped, anything else is taken
/// verbatim (already trimmed by the caller).
fn parse_input_string(field: &str) -> String {
    if let Some(inner) = field.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        inner.to_string()
    } else {
        field.to_string()
    }
}

/// A numeric field: optional sign, digits, optional single `.`; the
/// entire field must match or the item is rejected (triggering "redo
/// from start"), unlike `VAL$`'s lenient longest-prefix parse.
fn parse_input_number(field: &str) -> Option<f64> {
    if field.is_empty() {
        return None;
    }
    field.parse::<f64>().ok()
}

fn line_ref_handle(node: &Node) -> Option<LineHandle> {
    match &node.kind {
        NodeKind::LineRef { link, .. } => link.get(),
        _ => None,
    }
}

/// Rewrites a resolved `LineRef`'s link in place; returns whether it was
/// actually a `LineRef` (as opposed to some other node kind).
fn set_line_ref(node: &Node, handle: LineHandle) -> bool {
    match &node.kind {
        NodeKind::LineRef { link, .. } => {
            link.set(Some(handle));
            true
        }
        _ => false,
    }
}

/// Links a freshly parsed or stored tree against `program`, returning
/// the diagnostics produced; the caller aborts if any were produced.
pub fn link_tree(root: &Node, program: &Program, current_line: Option<i64>) -> Vec<Diagnostic> {
    let (_count, diags) = linker::link(root, program, current_line);
    diags
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::interp::capability::{NullEntropy, VecLineReader};
    use crate::lang::parser::{parse_line, ParsedLine};

    /// A `Clone`-cheap output sink: tests keep one handle for assertions
    /// while a second, separately owned handle is lent to the
    /// interpreter, sidestepping the borrow conflict a single `&mut`
    /// sink would create across multiple `run_to_completion` calls.
    #[derive(Clone, Default)]
    struct SharedSink(Rc<RefCell<(String, bool)>>);

    impl SharedSink {
        fn new() -> Self {
            SharedSink(Rc::new(RefCell::new((String::new(), true))))
        }

        fn text(&self) -> String {
            self.0.borrow().0.clone()
        }
    }

    impl OutputSink for SharedSink {
        fn write_str(&mut self, s: &str) {
            let mut state = self.0.borrow_mut();
            if let Some(last) = s.chars().last() {
                state.1 = last == '\n';
            }
            state.0.push_str(s);
        }

        fn is_at_line_start(&self) -> bool {
            self.0.borrow().1
        }
    }

    fn harness() -> (Interpreter<'static>, ExecContext, SharedSink) {
        harness_with_input(&[])
    }

    /// Leaked so the borrow can be 'static inside this test module
    /// without fighting the executor's lifetime parameter; test-only,
    /// and bounded by the test count.
    fn harness_with_input(lines: &[&str]) -> (Interpreter<'static>, ExecContext, SharedSink) {
        let entropy: &'static NullEntropy = Box::leak(Box::new(NullEntropy));
        let break_flag: &'static BreakFlag = Box::leak(Box::new(BreakFlag::new()));
        let sink = SharedSink::new();
        let output: &'static mut SharedSink = Box::leak(Box::new(sink.clone()));
        let reader: &'static mut VecLineReader = Box::leak(Box::new(VecLineReader::new(lines)));
        (Interpreter::new(entropy, break_flag, output, reader), ExecContext::new(), sink)
    }

    fn load_and_run(src: &[&str]) -> String {
        let (mut interp, mut ctx, sink) = harness();
        for line in src {
            match parse_line(line).unwrap().unwrap() {
                ParsedLine::Numbered { num, body } => interp.store_line(&mut ctx, num, body),
                ParsedLine::Immediate(_) => panic!("expected numbered line: {}", line),
            }
        }
        let diags = link_tree_all(&interp.program);
        assert!(diags.is_empty(), "unexpected link diagnostics: {:?}", diags);
        ctx.pos = Some(Position::program_start(&interp.program));
        run_to_completion(&mut interp, &mut ctx);
        sink.text()
    }

    fn link_tree_all(program: &Program) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for line in program.iter() {
            diags.extend(link_tree(&line.body, program, Some(line.num)));
        }
        diags
    }

    fn run_to_completion(interp: &mut Interpreter, ctx: &mut ExecContext) {
        loop {
            match interp.step(ctx, true) {
                Honeydo::End | Honeydo::Stop => break,
                Honeydo::Error(d) => panic!("unexpected runtime error: {}", d),
                _ => {
                    if ctx.pos.as_ref().map_or(true, |p| p.is_halted()) {
                        break;
                    }
                }
            }
        }
    }

    #[test]
    fn for_next_prints_semicolon_joined_sequence() {
        let out = load_and_run(&["10 FOR I=1 TO 3 : PRINT I; : NEXT I"]);
        assert_eq!(out, "1 2 3\n");
    }

    #[test]
    fn read_data_assigns_across_namespaces() {
        let out = load_and_run(&[
            "10 DATA 1+1, [hi]",
            "20 READ A, B$",
            "30 PRINT A, B$",
        ]);
        assert_eq!(out, "2 hi\n");
    }

    #[test]
    fn gosub_return_resumes_after_call_site() {
        let out = load_and_run(&[
            "10 GOSUB 100",
            "20 PRINT [done]",
            "30 END",
            "100 PRINT [sub]",
            "110 RETURN",
        ]);
        assert_eq!(out, "sub\ndone\n");
    }

    #[test]
    fn nested_for_loops_reenter_inner_each_outer_pass() {
        let out = load_and_run(&[
            "10 FOR I=1 TO 2 : FOR J=1 TO 2 : PRINT I;J; : NEXT J : NEXT I",
        ]);
        assert_eq!(out, "1 1 1 2 2 1 2 2\n");
    }

    #[test]
    fn alter_with_no_line_refs_reports_no_alterations() {
        let (mut interp, mut ctx, _sink) = harness();
        for line in ["10 PRINT [a]", "20 ALTER 10 TO 40", "30 STOP", "40 PRINT [b]"] {
            match parse_line(line).unwrap().unwrap() {
                ParsedLine::Numbered { num, body } => interp.store_line(&mut ctx, num, body),
                _ => unreachable!(),
            }
        }
        let diags = link_tree_all(&interp.program);
        assert!(diags.is_empty());
        ctx.pos = Some(Position::program_start(&interp.program));
        loop {
            match interp.step(&mut ctx, true) {
                Honeydo::End | Honeydo::Stop => break,
                Honeydo::Error(_) => break,
                _ => {
                    if ctx.pos.as_ref().map_or(true, |p| p.is_halted()) {
                        break;
                    }
                }
            }
        }
        assert!(interp.latch.is_some());
        assert_eq!(interp.latch.unwrap().message, "no alterations");
    }

    #[test]
    fn alter_rewrites_goto_link_for_next_run() {
        let (mut interp, mut ctx, sink) = harness();
        for line in [
            "10 GOTO 30",
            "20 PRINT [skipped]",
            "30 ALTER 10 TO 20",
            "40 PRINT [done]",
        ] {
            match parse_line(line).unwrap().unwrap() {
                ParsedLine::Numbered { num, body } => interp.store_line(&mut ctx, num, body),
                _ => unreachable!(),
            }
        }
        let diags = link_tree_all(&interp.program);
        assert!(diags.is_empty());

        ctx.pos = Some(Position::program_start(&interp.program));
        run_to_completion(&mut interp, &mut ctx);
        assert_eq!(sink.text(), "done\n");

        ctx.pos = Some(Position::program_start(&interp.program));
        run_to_completion(&mut interp, &mut ctx);
        assert_eq!(sink.text(), "done\nskipped\ndone\n");
    }

    #[test]
    fn return_without_gosub_is_diagnosed() {
        let (mut interp, mut ctx, _sink) = harness();
        match parse_line("10 RETURN").unwrap().unwrap() {
            ParsedLine::Numbered { num, body } => interp.store_line(&mut ctx, num, body),
            _ => unreachable!(),
        }
        ctx.pos = Some(Position::program_start(&interp.program));
        match interp.step(&mut ctx, true) {
            Honeydo::Error(d) => assert_eq!(d.message, "RETURN without GOSUB"),
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[test]
    fn input_fills_namespaced_variables_from_one_line() {
        let (mut interp, mut ctx, sink) = harness_with_input(&["42, [hi]"]);
        match parse_line("10 INPUT A, B$").unwrap().unwrap() {
            ParsedLine::Numbered { num, body } => interp.store_line(&mut ctx, num, body),
            _ => unreachable!(),
        }
        match parse_line("20 PRINT A, B$").unwrap().unwrap() {
            ParsedLine::Numbered { num, body } => interp.store_line(&mut ctx, num, body),
            _ => unreachable!(),
        }
        ctx.pos = Some(Position::program_start(&interp.program));
        run_to_completion(&mut interp, &mut ctx);
        assert_eq!(sink.text(), "42 hi\n");
    }

    #[test]
    fn input_reprompts_when_line_runs_short() {
        let (mut interp, mut ctx, _sink) = harness_with_input(&["1", "2"]);
        match parse_line("10 INPUT A, B").unwrap().unwrap() {
            ParsedLine::Numbered { num, body } => interp.store_line(&mut ctx, num, body),
            _ => unreachable!(),
        }
        ctx.pos = Some(Position::program_start(&interp.program));
        match interp.step(&mut ctx, true) {
            Honeydo::None => {}
            other => panic!("expected the short line to be topped up, got {:?}", other),
        }
        assert_eq!(interp.vars.get_num("A"), Some(Value::Number(1.0)));
        assert_eq!(interp.vars.get_num("B"), Some(Value::Number(2.0)));
    }

    #[test]
    fn input_redoes_from_start_on_type_mismatch() {
        let (mut interp, mut ctx, sink) = harness_with_input(&["not a number", "7"]);
        match parse_line("10 INPUT A").unwrap().unwrap() {
            ParsedLine::Numbered { num, body } => interp.store_line(&mut ctx, num, body),
            _ => unreachable!(),
        }
        ctx.pos = Some(Position::program_start(&interp.program));
        match interp.step(&mut ctx, true) {
            Honeydo::None => {}
            other => panic!("expected redo to recover, got {:?}", other),
        }
        assert_eq!(interp.vars.get_num("A"), Some(Value::Number(7.0)));
        assert!(sink.text().contains("redo from start"));
    }

    #[test]
    fn list_and_del_honeydo_to_the_driver() {
        let (mut interp, mut ctx, _sink) = harness();
        for line in ["10 PRINT [a]", "20 PRINT [b]"] {
            match parse_line(line).unwrap().unwrap() {
                ParsedLine::Numbered { num, body } => interp.store_line(&mut ctx, num, body),
                _ => unreachable!(),
            }
        }
        match parse_line("LIST").unwrap().unwrap() {
            ParsedLine::Immediate(node) => {
                let mut imm = ExecContext::new();
                imm.pos = Some(Position::immediate(Rc::new(node)));
                match interp.step(&mut imm, false) {
                    Honeydo::List(range) => assert_eq!(range, crate::lang::ast::LineRange::ALL),
                    other => panic!("expected List honeydo, got {:?}", other),
                }
            }
            _ => unreachable!(),
        }

        match parse_line("DEL 10").unwrap().unwrap() {
            ParsedLine::Immediate(node) => {
                let mut imm = ExecContext::new();
                imm.pos = Some(Position::immediate(Rc::new(node)));
                match interp.step(&mut imm, false) {
                    Honeydo::Del(range) => {
                        interp.delete_lines(&mut ctx, range);
                    }
                    other => panic!("expected Del honeydo, got {:?}", other),
                }
            }
            _ => unreachable!(),
        }
        assert_eq!(interp.program.len(), 1);
    }

    #[test]
    fn line_input_reads_one_raw_line_verbatim() {
        let (mut interp, mut ctx, _sink) = harness_with_input(&["hello, world"]);
        match parse_line("10 LINE INPUT A$").unwrap().unwrap() {
            ParsedLine::Numbered { num, body } => interp.store_line(&mut ctx, num, body),
            _ => unreachable!(),
        }
        ctx.pos = Some(Position::program_start(&interp.program));
        interp.step(&mut ctx, true);
        assert_eq!(interp.vars.get_str("A"), Some("hello, world"));
    }
}
