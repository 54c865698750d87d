//! Shared error type used across the compilation pipeline.
//!
//! Every stage fails fast with exactly one `CompileError`. The variant names
//! the stage that gave up and carries the source line when one is known, so
//! the caller can print the message verbatim and abort.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  #[snafu(display("lexical error on line {line}: {message}"))]
  Lexical { line: usize, message: String },

  #[snafu(display("syntax error on line {line}: {message}"))]
  Syntax { line: usize, message: String },

  #[snafu(display("semantic error{}: {message}", on_line(*line)))]
  Semantic { line: Option<usize>, message: String },

  #[snafu(display("code generation error{}: {message}", on_line(*line)))]
  Codegen { line: Option<usize>, message: String },
}

fn on_line(line: Option<usize>) -> String {
  line.map(|line| format!(" on line {line}")).unwrap_or_default()
}

impl CompileError {
  pub fn lexical(line: usize, message: impl Into<String>) -> Self {
    Self::Lexical {
      line,
      message: message.into(),
    }
  }

  pub fn syntax(line: usize, message: impl Into<String>) -> Self {
    Self::Syntax {
      line,
      message: message.into(),
    }
  }

  pub fn semantic(line: Option<usize>, message: impl Into<String>) -> Self {
    Self::Semantic {
      line,
      message: message.into(),
    }
  }

  pub fn codegen(line: Option<usize>, message: impl Into<String>) -> Self {
    Self::Codegen {
      line,
      message: message.into(),
    }
  }

  /// Source line the error points at, if the failing stage knew it.
  pub fn line(&self) -> Option<usize> {
    match self {
      Self::Lexical { line, .. } | Self::Syntax { line, .. } => Some(*line),
      Self::Semantic { line, .. } | Self::Codegen { line, .. } => *line,
    }
  }
}
