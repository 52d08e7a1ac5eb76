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

//! External collaborators the core consumes but does not implement:
//! the entropy source behind `RND`, the break flag an interrupt raises,
//! and an output sink that tracks whether the cursor sits at column
//! zero. The driver wires concrete adapters (`fastrand`, `ctrlc`) in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// `random_u32() -> optional unsigned`, rendered as a uniform `[0, 1)`
/// float draw since that is what `RND` actually consumes.
pub trait Entropy {
    fn next_f64(&self) -> Option<f64>;
}

/// Always unavailable; `RND` then freezes at its last (or initial)
/// value — unavailability does not abort.
pub struct NullEntropy;

impl Entropy for NullEntropy {
    fn next_f64(&self) -> Option<f64> {
        None
    }
}

/// Draws from `fastrand`'s thread-local generator.
pub struct FastrandEntropy;

impl Entropy for FastrandEntropy {
    fn next_f64(&self) -> Option<f64> {
        Some(fastrand::f64())
    }
}

/// The break flag: observable, clearable, set asynchronously by a SIGINT
/// handler. Shared via `Arc` so the `ctrlc` callback and the executor's
/// between-step check see the same cell.
#[derive(Clone, Default)]
pub struct BreakFlag(Arc<AtomicBool>);

impl BreakFlag {
    pub fn new() -> Self {
        BreakFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The raw line-reading buffer, shared by the REPL's own prompt loop and
/// by `INPUT`/`LINE INPUT` reading mid-statement. `None` signals
/// end-of-input.
pub trait LineReader {
    fn read_line(&mut self, prompt: &str) -> Option<String>;
}

/// An output sink with a "dirty column" observer: diagnostics call
/// [`OutputSink::newline_if_dirty`] (the original's `byItself()`) so an
/// error never lands mid-line after a `PRINT ...;`.
pub trait OutputSink {
    fn write_str(&mut self, s: &str);
    fn is_at_line_start(&self) -> bool;

    fn newline_if_dirty(&mut self) {
        if !self.is_at_line_start() {
            self.write_str("\n");
        }
    }
}

/// Writes to process stdout, tracking dirty column from the last byte
/// written.
pub struct StdoutSink {
    at_line_start: bool,
}

impl StdoutSink {
    pub fn new() -> Self {
        StdoutSink { at_line_start: true }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for StdoutSink {
    fn write_str(&mut self, s: &str) {
        use std::io::Write;
        if let Some(last) = s.chars().last() {
            self.at_line_start = last == '\n';
        }
        print!("{}", s);
        let _ = std::io::stdout().flush();
    }

    fn is_at_line_start(&self) -> bool {
        self.at_line_start
    }
}

/// An in-memory sink, used by tests to assert on exact program output.
#[cfg(test)]
#[derive(Default)]
pub struct StringSink {
    pub buffer: String,
    at_line_start: bool,
}

#[cfg(test)]
impl StringSink {
    pub fn new() -> Self {
        StringSink { buffer: String::new(), at_line_start: true }
    }
}

#[cfg(test)]
impl OutputSink for StringSink {
    fn write_str(&mut self, s: &str) {
        if let Some(last) = s.chars().last() {
            self.at_line_start = last == '\n';
        }
        self.buffer.push_str(s);
    }

    fn is_at_line_start(&self) -> bool {
        self.at_line_start
    }
}

/// A canned-input reader for tests: yields each queued line in order,
/// then `None` (EOF) forever after.
#[cfg(test)]
pub struct VecLineReader {
    lines: std::collections::VecDeque<String>,
}

#[cfg(test)]
impl VecLineReader {
    pub fn new(lines: &[&str]) -> Self {
        VecLineReader { lines: lines.iter().map(|s| s.to_string()).collect() }
    }
}

#[cfg(test)]
impl LineReader for VecLineReader {
    fn read_line(&mut self, _prompt: &str) -> Option<String> {
        self.lines.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_sink_tracks_dirty_column() {
        let mut sink = StringSink::new();
        sink.write_str("hi");
        assert!(!sink.is_at_line_start());
        sink.newline_if_dirty();
        assert_eq!(sink.buffer, "hi\n");
        sink.newline_if_dirty();
        assert_eq!(sink.buffer, "hi\n");
    }

    #[test]
    fn break_flag_round_trips() {
        let flag = BreakFlag::new();
        assert!(!flag.is_set());
        flag.set();
        assert!(flag.is_set());
        flag.clear();
        assert!(!flag.is_set());
    }
}
