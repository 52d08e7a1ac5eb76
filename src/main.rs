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

//! Driver: the interactive REPL, the ambient `Config` (the `PARENS`/
//! `NOANSI` toggles), and the capability adapters (`rustyline`, `ctrlc`,
//! `fastrand`) that satisfy the core's external-collaborator traits.
//!
//! The core never reads stdin, writes stdout, or touches an environment
//! variable directly — every such concern is wired up here and handed in
//! through `Interpreter::new` and the `LineReader`/`OutputSink` traits.

mod diagnostic;
mod interp;
mod lang;

use std::fs;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use diagnostic::{Diagnostic, Severity};
use interp::capability::{BreakFlag, FastrandEntropy, LineReader, StdoutSink};
use interp::context::{ExecContext, Position};
use interp::executor::{link_tree, Honeydo, Interpreter};
use lang::ast::{LineRange, Node};
use lang::parser::{parse_line, ParsedLine};
use lang::printer::print_line;

/// A line-numbered BASIC interpreter.
#[derive(Parser)]
#[command(name = "dynabas", about = "A line-numbered BASIC interpreter")]
struct Cli {
    /// Program file to load before entering the interactive prompt.
    path: Option<String>,

    /// Always parenthesize binary subexpressions in LIST output.
    #[arg(long, env = "PARENS")]
    parens: bool,

    /// Disable ANSI styling and the CLS escape sequence.
    #[arg(long, env = "NOANSI")]
    no_ansi: bool,
}

/// Resolved once at startup, threaded through the driver and the
/// pretty-printer instead of read ad hoc from the environment.
struct Config {
    parens: bool,
    ansi: bool,
}

/// Satisfies [`LineReader`] with `rustyline`'s editor, giving the prompt
/// and `INPUT`/`LINE INPUT` history and line-editing. A Ctrl-C while
/// blocked in `readline` sets `break_flag` and reports `None` — the same
/// shape true EOF reports — so the driver tells the two apart by
/// checking the flag afterward rather than `LineReader` growing a richer
/// return type.
struct RustylineReader {
    editor: DefaultEditor,
    break_flag: BreakFlag,
}

impl LineReader for RustylineReader {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Some(line)
            }
            Err(ReadlineError::Interrupted) => {
                self.break_flag.set();
                None
            }
            Err(_) => None,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config { parens: cli.parens, ansi: !cli.no_ansi };
    if !config.ansi {
        colored::control::set_override(false);
    }

    let break_flag = BreakFlag::new();
    {
        let break_flag = break_flag.clone();
        // Best-effort: if a handler is already installed (can't happen
        // in a standalone binary) we simply keep relying on rustyline's
        // own Ctrl-C interception while blocked at a prompt.
        let _ = ctrlc::set_handler(move || break_flag.set());
    }

    let entropy = FastrandEntropy;
    let mut output = StdoutSink::new();
    let editor = DefaultEditor::new().expect("failed to initialize line editor");
    let mut reader = RustylineReader { editor, break_flag: break_flag.clone() };

    let mut interp = Interpreter::new(&entropy, &break_flag, &mut output, &mut reader);
    let mut program_ctx = ExecContext::new();

    if let Some(path) = &cli.path {
        match fs::read_to_string(path) {
            Ok(text) => {
                for line in text.lines() {
                    process_line(&mut interp, &mut program_ctx, &config, line, false);
                }
            }
            Err(e) => {
                eprintln!("{}: {}", path, e);
                return ExitCode::FAILURE;
            }
        }
    }

    print_prompt(&mut interp, &config);
    loop {
        match interp.read_line("") {
            Some(line) => process_line(&mut interp, &mut program_ctx, &config, &line, true),
            None => {
                if break_flag.is_set() {
                    break_flag.clear();
                    interp.write_raw("\n");
                } else {
                    break;
                }
            }
        }
    }

    ExitCode::SUCCESS
}

/// Parses and dispatches one line of top-level input: a numbered line is
/// stored (or deleted), anything else runs as an immediate command.
/// `show_prompt` is false while loading a program file, so a hundred-line
/// load doesn't print a hundred `Ok`s — diagnostics still surface either
/// way.
fn process_line(
    interp: &mut Interpreter,
    program_ctx: &mut ExecContext,
    config: &Config,
    raw: &str,
    show_prompt: bool,
) {
    match parse_line(raw) {
        Err(d) => print_diag(interp, config, &d),
        Ok(None) => {
            if show_prompt {
                print_prompt(interp, config);
            }
        }
        Ok(Some(ParsedLine::Numbered { num, body })) => {
            interp.store_line(program_ctx, num, body);
            match interp.latch.take() {
                Some(d) => print_diag(interp, config, &d),
                None => {
                    if show_prompt {
                        print_prompt(interp, config);
                    }
                }
            }
        }
        Ok(Some(ParsedLine::Immediate(node))) => {
            let had_error = run_immediate(interp, program_ctx, config, node);
            if !had_error && show_prompt {
                print_prompt(interp, config);
            }
        }
    }
}

/// Drives one typed immediate statement chain to completion, switching
/// between the transient immediate context and the persistent program
/// context exactly as many times as the chain's honey-dos demand (a
/// bare `GOTO 100` switches once and never returns to the immediate
/// chain; `RUN` followed eventually by `END` or an error switches back).
/// Returns whether an error diagnostic was raised, so the caller knows
/// to withhold the `Ok` prompt.
fn run_immediate(
    interp: &mut Interpreter,
    program_ctx: &mut ExecContext,
    config: &Config,
    node: Node,
) -> bool {
    let diags = link_tree(&node, &interp.program, None);
    if !diags.is_empty() {
        for d in &diags {
            print_diag(interp, config, d);
        }
        return true;
    }

    let mut imm_ctx = ExecContext::new();
    imm_ctx.pos = Some(Position::immediate(Rc::new(node)));
    let mut running = false;
    let mut had_error = false;

    loop {
        let honeydo = if running { interp.step(program_ctx, true) } else { interp.step(&mut imm_ctx, false) };
        let was_running = running;
        let is_end = matches!(honeydo, Honeydo::End);

        match honeydo {
            Honeydo::Run(target) => {
                let link_diags = interp.relink();
                if link_diags.is_empty() {
                    interp.begin_run(program_ctx, target);
                    running = true;
                } else {
                    for d in &link_diags {
                        print_diag(interp, config, d);
                    }
                    had_error = true;
                }
            }
            Honeydo::Goto(handle) => {
                let link_diags = interp.relink();
                if link_diags.is_empty() {
                    program_ctx.pos = Some(Position::at_handle(&interp.program, handle));
                    running = true;
                } else {
                    for d in &link_diags {
                        print_diag(interp, config, d);
                    }
                    had_error = true;
                }
            }
            Honeydo::New => {
                interp.new_program(program_ctx);
                running = false;
            }
            Honeydo::End => {
                if was_running {
                    interp.reset_program_contexts(program_ctx);
                    running = false;
                }
            }
            Honeydo::Stop => {}
            Honeydo::Cont => {
                if program_ctx.pos.is_some() {
                    running = true;
                } else {
                    print_diag(interp, config, &Diagnostic::warning("can't continue"));
                }
            }
            Honeydo::Return(was_program) => running = was_program,
            Honeydo::List(range) => print_list(interp, config, range),
            Honeydo::Del(range) => interp.delete_lines(program_ctx, range),
            Honeydo::Cls => {
                if config.ansi {
                    interp.write_raw("\x1b[H\x1b[2J\x1b[3J");
                }
            }
            Honeydo::Error(_) | Honeydo::None => {}
        }

        if let Some(d) = interp.latch.take() {
            if d.severity == Severity::Error {
                had_error = true;
            }
            print_diag(interp, config, &d);
            if running {
                interp.reset_program_contexts(program_ctx);
                running = false;
            } else {
                imm_ctx.reset();
            }
        }

        if break_flag_tripped(interp) {
            had_error = true;
            let mut diag = Diagnostic::warning("break");
            if running {
                if let Some(n) = current_line_num(interp, program_ctx) {
                    diag = diag.at_line(n);
                }
            }
            print_diag(interp, config, &diag);
            if !running {
                imm_ctx.reset();
            }
            running = false;
        }

        if !was_running && is_end {
            break;
        }
    }

    had_error
}

/// The break flag behaves like `STOP`: clears it and reports whether it
/// had been set, leaving `program_ctx` untouched so a subsequent `CONT`
/// can resume at the interrupted statement.
/// Mirrors `Interpreter::current_line_num`: the line a running program
/// was stopped at, so a break reads `break in <N>` like any other
/// running-program diagnostic (spec.md section 7).
fn current_line_num(interp: &Interpreter, program_ctx: &ExecContext) -> Option<i64> {
    program_ctx.pos.as_ref()?.line.and_then(|h| interp.program.get(h)).map(|l| l.num)
}

fn break_flag_tripped(interp: &mut Interpreter) -> bool {
    if interp.break_flag.is_set() {
        interp.break_flag.clear();
        true
    } else {
        false
    }
}

fn print_list(interp: &mut Interpreter, config: &Config, range: LineRange) {
    let lines: Vec<(i64, Rc<Node>)> =
        interp.program.iter_range(range).map(|l| (l.num, l.body.clone())).collect();
    for (num, body) in lines {
        interp.write_raw(&print_line(num, &body, config.parens));
        interp.write_raw("\n");
    }
}

fn print_prompt(interp: &mut Interpreter, config: &Config) {
    interp.ensure_newline();
    if config.ansi {
        interp.write_raw(&format!("{}\n", "Ok".green()));
    } else {
        interp.write_raw("Ok\n");
    }
}

fn print_diag(interp: &mut Interpreter, config: &Config, d: &Diagnostic) {
    interp.ensure_newline();
    let text = d.to_string();
    if config.ansi {
        interp.write_raw(&format!("{}\n", text.red()));
    } else {
        interp.write_raw(&format!("{}\n", text));
    }
}
