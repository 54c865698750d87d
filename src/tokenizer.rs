//! Lexical analysis: turns the raw source into a flat vector of tokens.
//!
//! The source is processed line by line so indentation can be measured
//! precisely. Leading whitespace of every non-blank line is compared against
//! an indentation stack and synthesised into `Indent`/`Dedent` tokens; every
//! physical line ends with a `Newline` token, blank and comment-only lines
//! included. Within a line the patterns are tried in a fixed order, with
//! multi-character operators ahead of single-character ones.

use std::fmt;

use log::debug;

use crate::error::{CompileError, CompileResult};

/// Identifiers longer than this are rejected.
pub const MAX_IDENT_LEN: usize = 20;

/// Columns a tab counts for when measuring indentation.
pub const TAB_WIDTH: usize = 4;

/// Reserved words; identifiers matching one of these become `Keyword` tokens.
pub const KEYWORDS: &[&str] = &[
  "def", "class", "if", "else", "elif", "while", "for", "in", "return", "import", "from", "as",
  "try", "except", "finally", "with", "pass", "break", "continue", "and", "or", "not", "is",
  "lambda", "yield", "global", "nonlocal", "assert", "raise", "del", "True", "False", "None",
];

const MULTI_CHAR_OPERATORS: [&str; 5] = ["//", "==", "!=", ">=", "<="];

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Keyword,
  Identifier,
  Number,
  String,
  Operator,
  Assign,
  Delimiter,
  Newline,
  Indent,
  Dedent,
  Eof,
}

impl fmt::Display for TokenKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Keyword => "KEYWORD",
      Self::Identifier => "IDENTIFIER",
      Self::Number => "NUMBER",
      Self::String => "STRING",
      Self::Operator => "OPERATOR",
      Self::Assign => "ASSIGN",
      Self::Delimiter => "DELIMITER",
      Self::Newline => "NEWLINE",
      Self::Indent => "INDENT",
      Self::Dedent => "DEDENT",
      Self::Eof => "EOF",
    };
    f.pad(name)
  }
}

/// A lexeme together with its kind and the 1-based line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub lexeme: String,
  pub line: usize,
}

impl Token {
  pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: usize) -> Self {
    Self {
      kind,
      lexeme: lexeme.into(),
      line,
    }
  }

  /// Synthetic tokens (layout and end of input) carry no meaningful lexeme.
  pub fn is_synthetic(&self) -> bool {
    matches!(
      self.kind,
      TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::Eof
    )
  }
}

impl fmt::Display for Token {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_synthetic() {
      write!(f, "{:>4}  {}", self.line, self.kind)
    } else {
      write!(f, "{:>4}  {:<10} {}", self.line, self.kind, self.lexeme)
    }
  }
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: &Token) -> String {
  if token.is_synthetic() {
    token.kind.to_string()
  } else {
    format!("{} '{}'", token.kind, token.lexeme)
  }
}

/// Lex the source into a flat vector of tokens terminated by an `Eof` marker.
pub fn tokenize(source: &str) -> CompileResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let mut indent_stack = vec![0usize];
  // Closing delimiter of the triple-quoted block we are inside, if any.
  let mut block_comment: Option<&str> = None;
  let mut line_no = 1;

  for line in source.lines() {
    let stripped = line.trim_start_matches([' ', '\t']);
    let is_blank = stripped.is_empty() || stripped.starts_with('#');

    if let Some(delim) = block_comment {
      if stripped.contains(delim) {
        block_comment = None;
      }
    } else if !is_blank {
      let width = indentation_width(line);
      let top = indent_stack.last().copied().unwrap_or(0);
      if width > top {
        indent_stack.push(width);
        tokens.push(Token::new(TokenKind::Indent, "", line_no));
      } else {
        while indent_stack.last().is_some_and(|&level| width < level) {
          indent_stack.pop();
          tokens.push(Token::new(TokenKind::Dedent, "", line_no));
        }
        if indent_stack.last().copied().unwrap_or(0) != width {
          return Err(CompileError::lexical(line_no, "inconsistent indentation"));
        }
      }

      if let Some(delim) = ["\"\"\"", "'''"]
        .into_iter()
        .find(|delim| stripped.starts_with(delim))
      {
        // Docstring-style block comment; closed on this line if the
        // delimiter appears twice.
        if stripped.matches(delim).count() < 2 {
          block_comment = Some(delim);
        }
      } else {
        tokenize_segment(stripped, line_no, &mut tokens)?;
      }
    }

    tokens.push(Token::new(TokenKind::Newline, "", line_no));
    line_no += 1;
  }

  while indent_stack.len() > 1 {
    indent_stack.pop();
    tokens.push(Token::new(TokenKind::Dedent, "", line_no));
  }
  tokens.push(Token::new(TokenKind::Eof, "", line_no));

  debug!(
    "tokenized {} line(s) into {} token(s)",
    line_no - 1,
    tokens.len()
  );
  Ok(tokens)
}

fn indentation_width(line: &str) -> usize {
  line
    .chars()
    .map_while(|c| match c {
      ' ' => Some(1),
      '\t' => Some(TAB_WIDTH),
      _ => None,
    })
    .sum()
}

/// Tokenize the logical content of one line (indentation already removed).
fn tokenize_segment(segment: &str, line: usize, tokens: &mut Vec<Token>) -> CompileResult<()> {
  let mut pos = 0;

  while pos < segment.len() {
    let rest = &segment[pos..];
    let Some(c) = rest.chars().next() else {
      break;
    };

    if c == ' ' || c == '\t' {
      pos += 1;
      continue;
    }

    if c == '#' {
      break;
    }

    if c == '"' || c == '\'' {
      if let Some(close) = rest[1..].find(c) {
        let len = close + 2;
        tokens.push(Token::new(TokenKind::String, &rest[..len], line));
        pos += len;
        continue;
      }
      return Err(CompileError::lexical(
        line,
        format!("unexpected character '{c}'"),
      ));
    }

    if c.is_ascii_digit() {
      let len = number_len(rest);
      pos += len;
      if segment[pos..]
        .chars()
        .next()
        .is_some_and(|next| next.is_alphabetic() || next == '_')
      {
        return Err(CompileError::lexical(
          line,
          "identifier starting with a number",
        ));
      }
      let lexeme = &rest[..len];
      if !lexeme.contains('.') && lexeme.parse::<i64>().is_err() {
        return Err(CompileError::lexical(
          line,
          format!("integer literal '{lexeme}' is out of range"),
        ));
      }
      tokens.push(Token::new(TokenKind::Number, lexeme, line));
      continue;
    }

    if c.is_ascii_alphabetic() || c == '_' {
      let len = rest
        .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
        .unwrap_or(rest.len());
      let word = &rest[..len];
      if KEYWORDS.contains(&word) {
        tokens.push(Token::new(TokenKind::Keyword, word, line));
      } else if word.len() > MAX_IDENT_LEN {
        return Err(CompileError::lexical(
          line,
          format!("identifier '{word}' is longer than {MAX_IDENT_LEN} characters"),
        ));
      } else {
        tokens.push(Token::new(TokenKind::Identifier, word, line));
      }
      pos += len;
      continue;
    }

    if let Some(op) = MULTI_CHAR_OPERATORS
      .into_iter()
      .find(|op| rest.starts_with(op))
    {
      tokens.push(Token::new(TokenKind::Operator, op, line));
      pos += op.len();
      continue;
    }

    let kind = match c {
      '+' | '-' | '*' | '/' | '%' | '<' | '>' => Some(TokenKind::Operator),
      '=' => Some(TokenKind::Assign),
      '(' | ')' | '[' | ']' | '{' | '}' | ',' | '.' | ':' => Some(TokenKind::Delimiter),
      _ => None,
    };
    let Some(kind) = kind else {
      return Err(CompileError::lexical(
        line,
        format!("unexpected character '{c}'"),
      ));
    };
    tokens.push(Token::new(kind, c.to_string(), line));
    pos += c.len_utf8();
  }

  Ok(())
}

/// Length of the numeric literal at the start of `text`: digits with an
/// optional fractional part that must itself contain digits.
fn number_len(text: &str) -> usize {
  let bytes = text.as_bytes();
  let mut len = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
  if bytes.get(len) == Some(&b'.') && bytes.get(len + 1).is_some_and(u8::is_ascii_digit) {
    len += 1;
    len += bytes[len..].iter().take_while(|b| b.is_ascii_digit()).count();
  }
  len
}
