//! Read-only cursor over the token vector used by all parsing logic.

use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Token, TokenKind, describe_token};

/// Lightweight cursor over the token vector.
///
/// The vector always ends with an `Eof` token; looking past the end yields
/// that last token, so lookahead never has to deal with a missing token.
pub struct TokenStream {
  tokens: Vec<Token>,
  pos: usize,
}

impl TokenStream {
  /// Take ownership of the token stream; the parser advances `pos` as it consumes input.
  pub fn new(mut tokens: Vec<Token>) -> Self {
    if tokens.last().is_none_or(|token| token.kind != TokenKind::Eof) {
      let line = tokens.last().map_or(1, |token| token.line);
      tokens.push(Token::new(TokenKind::Eof, "", line));
    }
    Self { tokens, pos: 0 }
  }

  /// Token `offset` positions ahead of the cursor, without moving it.
  pub fn peek(&self, offset: usize) -> &Token {
    let last = self.tokens.len() - 1;
    &self.tokens[(self.pos + offset).min(last)]
  }

  pub fn current(&self) -> &Token {
    self.peek(0)
  }

  /// Move past the current token. The cursor never moves past `Eof`.
  pub fn advance(&mut self) {
    if self.pos < self.tokens.len() - 1 {
      self.pos += 1;
    }
  }

  /// Does the current token have this kind (and lexeme, when given)?
  pub fn check(&self, kind: TokenKind, lexeme: Option<&str>) -> bool {
    let token = self.current();
    token.kind == kind && lexeme.is_none_or(|lexeme| token.lexeme == lexeme)
  }

  pub fn check_kind(&self, kind: TokenKind) -> bool {
    self.check(kind, None)
  }

  pub fn check_keyword(&self, keyword: &str) -> bool {
    self.check(TokenKind::Keyword, Some(keyword))
  }

  pub fn check_delimiter(&self, delimiter: &str) -> bool {
    self.check(TokenKind::Delimiter, Some(delimiter))
  }

  /// Consume the current token if it matches.
  pub fn equal(&mut self, kind: TokenKind, lexeme: Option<&str>) -> bool {
    if self.check(kind, lexeme) {
      self.advance();
      return true;
    }
    false
  }

  /// Consume the current token, or fail with a syntax error describing what
  /// `context` expected and what was actually found.
  pub fn expect(
    &mut self,
    kind: TokenKind,
    lexeme: Option<&str>,
    context: &str,
  ) -> CompileResult<Token> {
    if !self.check(kind, lexeme) {
      let found = self.current();
      let expected = match lexeme {
        Some(lexeme) => format!("{kind} '{lexeme}'"),
        None => kind.to_string(),
      };
      return Err(CompileError::syntax(
        found.line,
        format!(
          "{context}: expected {expected}, found {}",
          describe_token(found)
        ),
      ));
    }
    let token = self.current().clone();
    self.advance();
    Ok(token)
  }

  pub fn skip_newlines(&mut self) {
    while self.check_kind(TokenKind::Newline) {
      self.advance();
    }
  }

  pub fn is_eof(&self) -> bool {
    self.check_kind(TokenKind::Eof)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tokenizer::tokenize;

  #[test]
  fn peek_saturates_at_eof() {
    let stream = TokenStream::new(tokenize("x\n").unwrap());
    assert_eq!(stream.peek(0).lexeme, "x");
    assert_eq!(stream.peek(1).kind, TokenKind::Newline);
    assert_eq!(stream.peek(2).kind, TokenKind::Eof);
    assert_eq!(stream.peek(40).kind, TokenKind::Eof);
  }

  #[test]
  fn advance_stops_at_eof() {
    let mut stream = TokenStream::new(Vec::new());
    assert!(stream.is_eof());
    stream.advance();
    assert!(stream.is_eof());
  }

  #[test]
  fn equal_only_consumes_on_match() {
    let mut stream = TokenStream::new(tokenize("(x)\n").unwrap());
    assert!(!stream.equal(TokenKind::Delimiter, Some(")")));
    assert!(stream.equal(TokenKind::Delimiter, Some("(")));
    assert_eq!(stream.current().lexeme, "x");
  }

  #[test]
  fn expect_reports_expected_and_found() {
    let mut stream = TokenStream::new(tokenize("\nif x\n").unwrap());
    stream.skip_newlines();
    stream.expect(TokenKind::Keyword, Some("if"), "if").unwrap();
    stream.advance();
    let err = stream
      .expect(TokenKind::Delimiter, Some(":"), "after if condition")
      .unwrap_err();
    assert_eq!(
      err.to_string(),
      "syntax error on line 2: after if condition: expected DELIMITER ':', found NEWLINE"
    );
  }
}
