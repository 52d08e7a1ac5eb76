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

//! Lexer primitives.
//!
//! Each routine takes `&mut Cursor` and, on success, advances past the
//! matched text; on failure the cursor is left exactly where it started.
//! Whitespace is skipped before every match attempt. This mirrors the
//! source's `eatBlanks`-then-try shape rather than a separate tokenizing
//! pass, since the grammar below needs backtracking (the `<>` Kludge) that
//! a pre-tokenized stream would only complicate.

/// A cursor into source text, tracking only a byte offset.
#[derive(Clone, Copy, Debug)]
pub struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(input: &'a str) -> Self {
        Cursor { input, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn rewind(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// The unconsumed remainder of the input, whitespace included.
    pub fn remainder(&self) -> &'a str {
        self.rest()
    }

    /// Consumes everything left in the input (used by `REM`, which takes
    /// the rest of the line verbatim).
    pub fn advance_to_end(&mut self) {
        self.pos = self.input.len();
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    pub fn eat_blanks(&mut self) {
        while matches!(self.peek(), Some(c) if c == ' ' || c == '\t') {
            self.bump();
        }
    }

    /// `true` once only whitespace (or nothing) remains.
    pub fn at_end(&self) -> bool {
        let mut c = *self;
        c.eat_blanks();
        c.peek().is_none()
    }

    /// Matches a single ASCII symbol character (or a fixed multi-character
    /// symbol) after skipping whitespace. Does not require a following
    /// non-identifier character, unlike [`Self::try_keyword`].
    pub fn try_symbol(&mut self, sym: &str) -> bool {
        let start = self.pos;
        self.eat_blanks();
        if self.rest().starts_with(sym) {
            self.pos += sym.len();
            true
        } else {
            self.pos = start;
            false
        }
    }

    /// Matches a case-insensitive keyword, requiring that the character
    /// immediately following not continue an identifier (so `GOTOX` is not
    /// parsed as `GOTO` followed by `X`).
    pub fn try_keyword(&mut self, word: &str) -> bool {
        let start = self.pos;
        self.eat_blanks();
        let rest = self.rest();
        if rest.len() >= word.len() && rest[..word.len()].eq_ignore_ascii_case(word) {
            let tail = &rest[word.len()..];
            let continues = tail
                .chars()
                .next()
                .map(is_ident_cont)
                .unwrap_or(false);
            if !continues {
                self.pos += word.len();
                return true;
            }
        }
        self.pos = start;
        false
    }

    /// Matches an identifier: a letter followed by letters, digits, `.`,
    /// `'`, `"`, with an optional trailing `$` marking the string
    /// namespace. Returns the case-folded (uppercased) name, `$` included.
    pub fn try_ident(&mut self) -> Option<String> {
        let start = self.pos;
        self.eat_blanks();
        let begin = self.pos;
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() => { self.bump(); }
            _ => { self.pos = start; return None; }
        }
        while matches!(self.peek(), Some(c) if is_ident_cont(c)) {
            self.bump();
        }
        if self.peek() == Some('$') {
            self.bump();
        }
        Some(self.input[begin..self.pos].to_ascii_uppercase())
    }

    /// Matches a numeric literal: digits with an optional single `.`,
    /// `_` permitted as an ignored digit-group separator. No sign (the
    /// expression parser handles unary `+`/`-`) and no scientific
    /// notation (explicitly unsupported).
    pub fn try_num_lit(&mut self) -> Option<f64> {
        let start = self.pos;
        self.eat_blanks();
        let begin = self.pos;
        let mut text = String::new();
        let mut saw_digit = false;
        let mut saw_dot = false;
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_digit() => { text.push(c); saw_digit = true; self.bump(); }
                Some('_') => { self.bump(); }
                Some('.') if !saw_dot => { saw_dot = true; text.push('.'); self.bump(); }
                _ => break,
            }
        }
        if !saw_digit {
            self.pos = start;
            return None;
        }
        let _ = begin;
        text.parse::<f64>().ok()
    }

    /// Matches a string literal of either shape: `[ body ]` or
    /// `]X body X` where `X` is any printable, non-space delimiter
    /// character. Returns the body and the chosen delimiter (`0` for the
    /// default bracket form).
    pub fn try_str_lit(&mut self) -> Option<(String, u8)> {
        let start = self.pos;
        self.eat_blanks();
        if self.peek() == Some('[') {
            self.bump();
            let begin = self.pos;
            loop {
                match self.peek() {
                    Some(']') => {
                        let body = self.input[begin..self.pos].to_string();
                        self.bump();
                        return Some((body, 0));
                    }
                    Some('\0') | None => { self.pos = start; return None; }
                    _ => { self.bump(); }
                }
            }
        }
        if self.peek() == Some(']') {
            let save = self.pos;
            self.bump();
            let delim = match self.peek() {
                Some(c) if c.is_ascii_graphic() && c != ' ' => c,
                _ => { self.pos = save; return None; }
            };
            self.bump();
            let begin = self.pos;
            loop {
                match self.peek() {
                    Some(c) if c == delim => {
                        let body = self.input[begin..self.pos].to_string();
                        self.bump();
                        return Some((body, delim as u8));
                    }
                    Some('\0') | None => { self.pos = start; return None; }
                    _ => { self.bump(); }
                }
            }
        }
        None
    }
}

fn is_ident_cont(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '\'' || c == '"'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_requires_boundary() {
        let mut c = Cursor::new("GOTOX");
        assert!(!c.try_keyword("GOTO"));
        assert_eq!(c.pos(), 0);
    }

    #[test]
    fn keyword_case_insensitive() {
        let mut c = Cursor::new("goto 10");
        assert!(c.try_keyword("GOTO"));
    }

    #[test]
    fn ident_with_dollar() {
        let mut c = Cursor::new("name$ = 1");
        assert_eq!(c.try_ident().as_deref(), Some("NAME$"));
    }

    #[test]
    fn num_lit_with_separators() {
        let mut c = Cursor::new("1_000.5");
        assert_eq!(c.try_num_lit(), Some(1000.5));
    }

    #[test]
    fn str_lit_bracket_form() {
        let mut c = Cursor::new("[hello] x");
        assert_eq!(c.try_str_lit(), Some(("hello".to_string(), 0)));
    }

    #[test]
    fn str_lit_delimited_form() {
        let mut c = Cursor::new("]|it's fine| x");
        assert_eq!(c.try_str_lit(), Some(("it's fine".to_string(), b'|')));
    }

    #[test]
    fn symbol_rewinds_on_failure() {
        let mut c = Cursor::new("<=");
        assert!(!c.try_symbol(">="));
        assert_eq!(c.pos(), 0);
        assert!(c.try_symbol("<="));
    }
}
