//! Crate root: wires together the compilation pipeline.
//!
//! Source text flows through four stages, each failing fast with a
//! `CompileError`:
//! - `tokenizer` performs indentation-aware lexical analysis.
//! - `parser` builds the `ast` from the token stream (via `token_stream`).
//! - `semantic` validates scopes, declarations and call arity.
//! - `codegen` lowers the validated tree into MEPA stack-machine code.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod parser;
pub mod scope;
pub mod semantic;
pub mod token_stream;
pub mod tokenizer;

use log::trace;

pub use codegen::Instruction;
pub use error::{CompileError, CompileResult};

/// Compile source text into MEPA instructions.
pub fn compile(source: &str) -> CompileResult<Vec<Instruction>> {
  let tokens = tokenizer::tokenize(source)?;
  trace!("tokens: {tokens:?}");
  let program = parser::parse(tokens)?;
  trace!("program: {program:#?}");
  semantic::analyze(&program)?;
  codegen::generate(&program)
}

/// Compile source text into the MEPA listing, one instruction per line.
pub fn generate_mepa(source: &str) -> CompileResult<String> {
  let mut listing = String::new();
  for instruction in compile(source)? {
    listing.push_str(&instruction.to_string());
    listing.push('\n');
  }
  Ok(listing)
}
