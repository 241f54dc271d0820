//! Code emission scaffolding shared by output backends.
//!
//! The emitter writes through a [`CodeSink`] so tests can collect output in
//! memory; the CLI joins the lines and prints them. Backends get an
//! indentation-tracking [`LineWriter`], an emission-time constant folder, and
//! a condition lowering walk parameterized over the backend's name-reference
//! and operator renderers.

use std::collections::HashMap;

use crate::ast::*;
use crate::{CompileError, Result};

/// Line-appending output sink.
pub trait CodeSink {
    fn push_line(&mut self, line: &str);
}

impl CodeSink for Vec<String> {
    fn push_line(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// Output backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Go,
}

impl Mode {
    pub fn from_name(name: &str) -> Option<Mode> {
        match name {
            "go" => Some(Mode::Go),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    /// Source file name recorded in the generated header.
    pub source_name: String,
}

/// Emit `program` through the selected backend.
pub fn emit(
    program: &Program,
    mode: Mode,
    opts: &EmitOptions,
    sink: &mut dyn CodeSink,
) -> Result<()> {
    match mode {
        Mode::Go => crate::golang::emit_program(program, opts, sink),
    }
}

pub(crate) fn emit_error<T>(msg: impl Into<String>) -> Result<T> {
    Err(CompileError::Emit { msg: msg.into() })
}

/// Indented line writer: 4 spaces per scope level, consecutive blank lines
/// collapsed, blanks suppressed right after opening a scope.
pub(crate) struct LineWriter<'a> {
    sink: &'a mut dyn CodeSink,
    depth: usize,
    last_blank: bool,
}

impl<'a> LineWriter<'a> {
    pub fn new(sink: &'a mut dyn CodeSink) -> Self {
        LineWriter { sink, depth: 0, last_blank: false }
    }

    pub fn line(&mut self, text: &str) {
        if text.is_empty() {
            self.sink.push_line("");
            self.last_blank = true;
            return;
        }
        let mut out = String::with_capacity(self.depth * 4 + text.len());
        for _ in 0..self.depth {
            out.push_str("    ");
        }
        out.push_str(text);
        self.sink.push_line(&out);
        self.last_blank = false;
    }

    pub fn blank(&mut self) {
        if !self.last_blank {
            self.sink.push_line("");
            self.last_blank = true;
        }
    }

    pub fn indent(&mut self) {
        self.depth += 1;
        self.last_blank = true;
    }

    pub fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

/// A folded constant value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ConstValue {
    Int(i64),
    Str(String),
}

/// Emission-time environment: previously folded constants plus id item
/// values, by name.
#[derive(Default)]
pub(crate) struct ConstEnv {
    values: HashMap<String, ConstValue>,
}

impl ConstEnv {
    pub fn new() -> Self {
        ConstEnv::default()
    }

    pub fn set(&mut self, name: &str, value: ConstValue) {
        self.values.insert(name.to_string(), value);
    }

    /// Fold an expression to an integer or string.
    pub fn fold(&self, expr: &Expr) -> Result<ConstValue> {
        match expr {
            Expr::Int { value, .. } => Ok(ConstValue::Int(*value as i64)),
            Expr::Str { value, .. } => Ok(ConstValue::Str(value.clone())),
            Expr::Name(r) => match self.values.get(&r.name) {
                Some(v) => Ok(v.clone()),
                None => emit_error(format!(
                    "constant expression references non-constant value: {}, line: {}",
                    r.name, r.line
                )),
            },
            Expr::Unary { op, expr, line } => {
                let v = self.fold(expr)?;
                let n = match v {
                    ConstValue::Int(n) => n,
                    ConstValue::Str(_) => {
                        return emit_error(format!(
                            "unary operator on string constant, line: {}",
                            line
                        ));
                    }
                };
                Ok(ConstValue::Int(match op {
                    UnOp::Plus => n,
                    UnOp::Neg => n.wrapping_neg(),
                    UnOp::Not => i64::from(n == 0),
                }))
            }
            Expr::Binary { op, lhs, rhs, line } => {
                let l = self.fold(lhs)?;
                let r = self.fold(rhs)?;
                self.fold_binary(*op, l, r, *line)
            }
            Expr::Dot { line, .. } | Expr::Index { line, .. } => emit_error(format!(
                "not a constant expression, line: {}",
                line
            )),
        }
    }

    fn fold_binary(&self, op: BinOp, l: ConstValue, r: ConstValue, line: usize) -> Result<ConstValue> {
        if let (ConstValue::Str(a), ConstValue::Str(b)) = (&l, &r) {
            if op == BinOp::Add {
                return Ok(ConstValue::Str(format!("{}{}", a, b)));
            }
            return emit_error(format!("string constants only allow '+', line: {}", line));
        }
        let (a, b) = match (l, r) {
            (ConstValue::Int(a), ConstValue::Int(b)) => (a, b),
            _ => {
                return emit_error(format!(
                    "mixed string/integer constant expression, line: {}",
                    line
                ));
            }
        };
        let v = match op {
            BinOp::Add => a.wrapping_add(b),
            BinOp::Sub => a.wrapping_sub(b),
            BinOp::Mul => a.wrapping_mul(b),
            BinOp::Div => {
                if b == 0 {
                    return emit_error(format!("div by zero in constant, line: {}", line));
                }
                a / b
            }
            BinOp::Shl => a.wrapping_shl(b as u32),
            BinOp::Shr => a.wrapping_shr(b as u32),
            BinOp::BitAnd => a & b,
            BinOp::BitOr => a | b,
            BinOp::And => {
                if a == 0 {
                    a
                } else {
                    b
                }
            }
            BinOp::Or => {
                if a != 0 {
                    a
                } else {
                    b
                }
            }
            BinOp::Eq => i64::from(a == b),
            BinOp::Ne => i64::from(a != b),
            BinOp::Lt => i64::from(a < b),
            BinOp::Le => i64::from(a <= b),
            BinOp::Gt => i64::from(a > b),
            BinOp::Ge => i64::from(a >= b),
        };
        Ok(ConstValue::Int(v))
    }
}

/// Lower a boolean expression to target-language text. The backend supplies
/// how a name reference and a binary operator render; the outermost binary
/// node is left unparenthesized, inner nodes are parenthesized.
pub(crate) fn lower_cond(
    expr: &Expr,
    top: bool,
    name_ref: &dyn Fn(&NameRef) -> String,
    bin_op: &dyn Fn(BinOp) -> &'static str,
) -> String {
    match expr {
        Expr::Name(r) => name_ref(r),
        Expr::Int { value, .. } => value.to_string(),
        Expr::Binary { op, lhs, rhs, .. } => {
            let body = format!(
                "{} {} {}",
                lower_cond(lhs, false, name_ref, bin_op),
                bin_op(*op),
                lower_cond(rhs, false, name_ref, bin_op)
            );
            if top {
                body
            } else {
                format!("({})", body)
            }
        }
        Expr::Unary { op, expr, .. } => {
            let sym = match op {
                UnOp::Plus => "+",
                UnOp::Neg => "-",
                UnOp::Not => "!",
            };
            format!("{}{}", sym, lower_cond(expr, false, name_ref, bin_op))
        }
        _ => "??".to_string(),
    }
}
