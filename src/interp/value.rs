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

//! Evaluator: walks an expression tree down to a [`Value`].
//!
//! `evaluate` returns `Result<Value, Diagnostic>` rather than folding the
//! exception case into the value type — a deliberate simplification of
//! the original's unified tri-state payload, since `?` already gives us
//! "abort evaluation up the tree" for free.

use crate::diagnostic::Diagnostic;
use crate::lang::ast::{BinOp, Func, Node, NodeKind};

use super::capability::Entropy;
use super::vars::Variables;

/// A runtime value: either namespace, never both.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    Str(String),
}

impl Value {
    pub fn expect_number(self) -> Result<f64, Diagnostic> {
        match self {
            Value::Number(n) => Ok(n),
            Value::Str(_) => Err(Diagnostic::error("type mismatch")),
        }
    }

    pub fn expect_str(self) -> Result<String, Diagnostic> {
        match self {
            Value::Str(s) => Ok(s),
            Value::Number(_) => Err(Diagnostic::error("type mismatch")),
        }
    }

    /// Numeric truth: any nonzero number is true, exactly as comparison
    /// results (`-1.0`/`0.0`) and `IF` conditions expect.
    pub fn is_truthy(&self) -> bool {
        matches!(self, Value::Number(n) if *n != 0.0)
    }
}

/// `%.0f` when the value equals its own truncation, else `%f` (six
/// decimal places) — matching the original's `trunc(n) == n` test and
/// its `printf`/`snprintf` formats, not Rust's shortest-round-trip
/// `Display`.
pub fn format_number(n: f64) -> String {
    if n == n.trunc() && n.is_finite() {
        format!("{:.0}", n)
    } else {
        format!("{:.6}", n)
    }
}

const TRUE: f64 = -1.0;
const FALSE: f64 = 0.0;

fn bool_val(b: bool) -> f64 {
    if b { TRUE } else { FALSE }
}

/// Requires `n` to equal its truncation and to fit in a 32-bit signed
/// integer; used by `MOD`, `\`, and the bitwise operators.
fn require_i32(n: f64) -> Result<i32, Diagnostic> {
    if n.trunc() != n || !n.is_finite() {
        return Err(Diagnostic::error("need integer"));
    }
    if n < i32::MIN as f64 || n > i32::MAX as f64 {
        return Err(Diagnostic::error("need integer"));
    }
    Ok(n as i32)
}

/// Context threaded through evaluation for the handful of node kinds
/// that touch mutable interpreter state: variable lookup and `RND`'s
/// "remember the last draw" behavior.
pub struct Evaluator<'a> {
    pub vars: &'a mut Variables,
    pub rnd_last: &'a mut f64,
    pub entropy: &'a dyn Entropy,
}

impl<'a> Evaluator<'a> {
    pub fn new(vars: &'a mut Variables, rnd_last: &'a mut f64, entropy: &'a dyn Entropy) -> Self {
        Evaluator { vars, rnd_last, entropy }
    }

    pub fn evaluate(&mut self, node: &Node) -> Result<Value, Diagnostic> {
        match &node.kind {
            NodeKind::NumLit(n) => Ok(Value::Number(*n)),
            NodeKind::StrLit { value, .. } => Ok(Value::Str(value.clone())),
            NodeKind::NumVar(name) => self
                .vars
                .get_num(name)
                .ok_or_else(|| Diagnostic::error(format!("undefined variable {}", name))),
            NodeKind::StrVar(name) => self
                .vars
                .get_str(name)
                .map(|s| s.to_string())
                .ok_or_else(|| Diagnostic::error(format!("undefined variable {}$", name))),
            NodeKind::Not(inner) => {
                let v = self.evaluate(inner)?.expect_number()?;
                let i = require_i32(v)?;
                Ok(Value::Number((!i) as f64))
            }
            NodeKind::Neg(inner) => Ok(Value::Number(-self.evaluate(inner)?.expect_number()?)),
            NodeKind::Pos(inner) => Ok(Value::Number(self.evaluate(inner)?.expect_number()?)),
            NodeKind::Binary { op, lhs, rhs } => self.evaluate_binary(*op, lhs, rhs),
            NodeKind::Concat { lhs, rhs } => {
                let mut s = self.evaluate(lhs)?.expect_str()?;
                s.push_str(&self.evaluate(rhs)?.expect_str()?);
                Ok(Value::Str(s))
            }
            NodeKind::Call { func, args } => self.evaluate_call(*func, args),
            other => Err(Diagnostic::error(format!("{:?} is not an expression", other))),
        }
    }

    fn evaluate_binary(&mut self, op: BinOp, lhs: &Node, rhs: &Node) -> Result<Value, Diagnostic> {
        use BinOp::*;

        if matches!(op, And | Or | Xor | Eqv | Imp | Nand | Nor) {
            let a = require_i32(self.evaluate(lhs)?.expect_number()?)?;
            let b = require_i32(self.evaluate(rhs)?.expect_number()?)?;
            let r = match op {
                And => a & b,
                Or => a | b,
                Xor => a ^ b,
                Eqv => !(a ^ b),
                Imp => !a | b,
                Nand => !(a & b),
                Nor => !(a | b),
                _ => unreachable!(),
            };
            return Ok(Value::Number(r as f64));
        }

        if matches!(op, Mod | IntDiv) {
            let a = require_i32(self.evaluate(lhs)?.expect_number()?)?;
            let b = require_i32(self.evaluate(rhs)?.expect_number()?)?;
            let r = match op {
                Mod => {
                    if b == 0 {
                        return Err(Diagnostic::error("division by zero"));
                    }
                    a % b
                }
                IntDiv => {
                    if b == 0 {
                        return Err(Diagnostic::error("division by zero"));
                    }
                    a / b
                }
                _ => unreachable!(),
            };
            return Ok(Value::Number(r as f64));
        }

        let a = self.evaluate(lhs)?.expect_number()?;
        let b = self.evaluate(rhs)?.expect_number()?;
        let r = match op {
            Add => a + b,
            Sub => a - b,
            Mul => a * b,
            Div => a / b,
            Pow => a.powf(b),
            Eq => bool_val(a == b),
            Ne => bool_val(a != b),
            Ge => bool_val(a >= b),
            Gt => bool_val(a > b),
            Le => bool_val(a <= b),
            Lt => bool_val(a < b),
            Mod | IntDiv | And | Or | Xor | Eqv | Imp | Nand | Nor => unreachable!(),
        };
        Ok(Value::Number(r))
    }

    fn evaluate_call(&mut self, func: Func, args: &[Node]) -> Result<Value, Diagnostic> {
        use Func::*;

        macro_rules! num_arg {
            ($i:expr) => {
                self.evaluate(&args[$i])?.expect_number()?
            };
        }
        macro_rules! str_arg {
            ($i:expr) => {
                self.evaluate(&args[$i])?.expect_str()?
            };
        }

        Ok(match func {
            Abs => Value::Number(num_arg!(0).abs()),
            Sgn => {
                let n = num_arg!(0);
                Value::Number(if n > 0.0 { 1.0 } else if n < 0.0 { -1.0 } else { 0.0 })
            }
            Int => Value::Number(num_arg!(0).floor()),
            Fix => Value::Number(num_arg!(0).trunc()),
            Sqr => Value::Number(num_arg!(0).sqrt()),
            Sin => Value::Number(num_arg!(0).sin()),
            Cos => Value::Number(num_arg!(0).cos()),
            Tan => Value::Number(num_arg!(0).tan()),
            Atn => Value::Number(num_arg!(0).atan()),
            Log => Value::Number(num_arg!(0).ln()),
            Exp => Value::Number(num_arg!(0).exp()),
            Rnd => {
                let x = num_arg!(0);
                if x != 0.0 {
                    if let Some(draw) = self.entropy.next_f64() {
                        *self.rnd_last = draw;
                    }
                }
                Value::Number(*self.rnd_last)
            }
            Len => Value::Number(str_arg!(0).chars().count() as f64),
            Val => Value::Number(parse_val(&str_arg!(0))),
            Asc => {
                let s = str_arg!(0);
                let c = s.chars().next().ok_or_else(|| Diagnostic::error("empty string"))?;
                Value::Number(c as u32 as f64)
            }
            Chr => {
                let n = require_i32(num_arg!(0))?;
                if !(1..=255).contains(&n) {
                    return Err(Diagnostic::error("argument out of range"));
                }
                Value::Str((n as u8 as char).to_string())
            }
            Str => Value::Str(format_number(num_arg!(0))),
            Space => {
                let n = require_i32(num_arg!(0))?;
                if n < 0 {
                    return Err(Diagnostic::error("argument out of range"));
                }
                Value::Str(" ".repeat(n as usize))
            }
            Left => {
                let s = str_arg!(0);
                let n = require_i32(num_arg!(1))?;
                if n < 0 {
                    return Err(Diagnostic::error("argument out of range"));
                }
                Value::Str(s.chars().take(n as usize).collect())
            }
            Right => {
                let s = str_arg!(0);
                let n = require_i32(num_arg!(1))?;
                if n < 0 {
                    return Err(Diagnostic::error("argument out of range"));
                }
                let len = s.chars().count();
                let skip = len.saturating_sub(n as usize);
                Value::Str(s.chars().skip(skip).collect())
            }
            StringRep => {
                let n = require_i32(num_arg!(0))?;
                let c = str_arg!(1);
                if n < 0 {
                    return Err(Diagnostic::error("argument out of range"));
                }
                let ch = c.chars().next().ok_or_else(|| Diagnostic::error("empty string"))?;
                Value::Str(std::iter::repeat(ch).take(n as usize).collect())
            }
            Mid => {
                let s = str_arg!(0);
                let i = require_i32(num_arg!(1))?;
                let j = require_i32(num_arg!(2))?;
                if i < 1 || j < 0 {
                    return Err(Diagnostic::error("argument out of range"));
                }
                let chars: Vec<char> = s.chars().collect();
                let start = (i as usize - 1).min(chars.len());
                let end = start.saturating_add(j as usize).min(chars.len());
                Value::Str(chars[start..end].iter().collect())
            }
            Instr => {
                let i = require_i32(num_arg!(0))?;
                let hay = str_arg!(1);
                let needle = str_arg!(2);
                if i < 1 {
                    return Err(Diagnostic::error("argument out of range"));
                }
                let chars: Vec<char> = hay.chars().collect();
                let start = (i as usize - 1).min(chars.len());
                let rest: String = chars[start..].iter().collect();
                match rest.find(&needle) {
                    Some(byte_off) => {
                        let char_off = rest[..byte_off].chars().count();
                        Value::Number((start + char_off + 1) as f64)
                    }
                    None => Value::Number(0.0),
                }
            }
        })
    }
}

/// `VAL`: parses the longest valid numeric prefix, `0` if none.
fn parse_val(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let mut saw_digit = false;
    let mut saw_dot = false;
    while i < bytes.len() {
        match bytes[i] {
            b'0'..=b'9' => { saw_digit = true; i += 1; }
            b'.' if !saw_dot => { saw_dot = true; i += 1; }
            _ => break,
        }
    }
    if !saw_digit {
        return 0.0;
    }
    s[..i].parse::<f64>().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::capability::NullEntropy;
    use crate::lang::parser::parse_line;

    fn eval_expr(src: &str) -> Value {
        let mut vars = Variables::new();
        let mut rnd_last = 0.0;
        let entropy = NullEntropy;
        let parsed = parse_line(src).unwrap().unwrap();
        let node = match parsed {
            crate::lang::parser::ParsedLine::Immediate(n) => n,
            _ => panic!("expected immediate"),
        };
        let expr = match node.kind {
            crate::lang::ast::NodeKind::Let { expr, .. } => *expr,
            _ => panic!("expected LET"),
        };
        let mut ev = Evaluator::new(&mut vars, &mut rnd_last, &entropy);
        ev.evaluate(&expr).unwrap()
    }

    #[test]
    fn comparisons_yield_true_false_sentinels() {
        assert_eq!(eval_expr("X = 1 = 1"), Value::Number(-1.0));
        assert_eq!(eval_expr("X = 1 = 2"), Value::Number(0.0));
    }

    #[test]
    fn eqv_and_imp_match_their_identities() {
        assert_eq!(eval_expr("X = 5 EQV 3"), Value::Number(!(5i32 ^ 3) as f64));
        assert_eq!(eval_expr("X = 5 IMP 3"), Value::Number((!5i32 | 3) as f64));
    }

    #[test]
    fn nand_and_nor_are_independent() {
        assert_eq!(eval_expr("X = 5 NAND 3"), Value::Number(!(5i32 & 3) as f64));
        assert_eq!(eval_expr("X = 5 NOR 3"), Value::Number(!(5i32 | 3) as f64));
    }

    #[test]
    fn mod_requires_integer_operands() {
        let mut vars = Variables::new();
        let mut rnd_last = 0.0;
        let entropy = NullEntropy;
        let parsed = parse_line("X = 5.5 MOD 2").unwrap().unwrap();
        let node = match parsed {
            crate::lang::parser::ParsedLine::Immediate(n) => n,
            _ => panic!(),
        };
        let expr = match node.kind {
            crate::lang::ast::NodeKind::Let { expr, .. } => *expr,
            _ => panic!(),
        };
        let mut ev = Evaluator::new(&mut vars, &mut rnd_last, &entropy);
        assert!(ev.evaluate(&expr).is_err());
    }

    #[test]
    fn format_number_matches_trunc_rule() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(3.5), "3.500000");
    }
}
