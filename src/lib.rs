//! # protodsl — Binary Wire-Protocol DSL Compiler
//!
//! A compiler for a small DSL describing binary wire protocols. Given a
//! protocol source file it emits, in Go, record types for each message,
//! big-endian encode/decode functions with bit-level field packing, named
//! constant and id-group tables, and an encode/decode-by-id dispatch pair.
//!
//! ## DSL structure
//!
//! - **mspace**: the message-space name, declared exactly once
//! - **defmsg**: a message type with ordered, typed fields
//! - **defid / defmid**: monotonically numbered identifier groups; `defmid`
//!   items are message ids that `bind` associates with message types
//! - **const**: named integer or string constants
//! - **type / extern**: type aliases and externally supplied names
//!
//! ## Field types and modifiers
//!
//! - Integers `u1`..`u8`, `char`, `u16`, `u32`, `u64` (big-endian on the
//!   wire; `u1`..`u7` pack into shared octets), reserved `v32`/`v64`
//! - Arrays `[]T`, always `-> limit by` a sibling field or constant
//! - Modifiers: `max` (clamp on encode, reject on decode), `equal`
//!   (reject on decode), `xor` (mask on the wire), `exist if` (conditional
//!   presence), `exist follow above`
//!
//! ## Example
//!
//! ```text
//! mspace test;
//! const MAX 256
//! defmid Mid { LOGIN = 1, LOGOUT }
//! defmsg Login {
//!     ver u8 -> equal VER   //*protocol version
//!     len u8 -> max MAX
//!     data []u8 -> limit by len
//! }
//! const VER 2
//! bind LOGIN Login
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use protodsl::{compile, EmitOptions, Mode};
//!
//! let source = std::fs::read_to_string("chat.proto").unwrap();
//! let opts = EmitOptions { source_name: "chat.proto".to_string() };
//! match compile(&source, Mode::Go, &opts) {
//!     Ok(code) => print!("{}", code),
//!     Err(err) => eprintln!("{}", err),
//! }
//! ```
//!
//! The pipeline is lex -> parse -> analyze -> emit; any failure aborts the
//! whole compile and no output is produced.

pub mod ast;
pub mod emit;
mod golang;
pub mod lexer;
pub mod parser;
pub mod semantic;
pub mod signature;

pub use ast::Program;
pub use emit::{emit, CodeSink, EmitOptions, Mode};
pub use parser::parse;
pub use semantic::analyze;

/// Compilation failure, carrying the phase and the source position where
/// known.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("lex error: {msg}, line: {line}:{column}")]
    Lex { msg: String, line: usize, column: usize },
    #[error("parse error: {msg}, line: {line}")]
    Parse { msg: String, line: usize },
    #[error("semantic error: {msg}")]
    Semantic { msg: String },
    #[error("emit error: {msg}")]
    Emit { msg: String },
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// Run the full pipeline on `source` and return the generated code.
pub fn compile(source: &str, mode: Mode, opts: &EmitOptions) -> Result<String> {
    let mut program = parse(source)?;
    analyze(&mut program)?;
    let mut lines: Vec<String> = Vec::new();
    emit(&program, mode, opts, &mut lines)?;
    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out)
}
