//! Statement chain plus precedence-climbing expression parser.
//!
//! Statements are recognised by a fixed, priority-ordered chain: the first
//! recognizer whose `can_start` accepts the current token owns the whole
//! construct. Expressions use precedence climbing over the operator table in
//! `ast::BinaryOp`. Statement and expression parsing are mutually recursive
//! functions sharing one `TokenStream`; the only other state is the
//! `ParseContext` threaded through statement parsing.

use log::debug;

use crate::ast::{BinaryOp, Block, Expr, FunctionDeclaration, Literal, Program, Stmt};
use crate::error::{CompileError, CompileResult};
use crate::token_stream::TokenStream;
use crate::tokenizer::{Token, TokenKind, describe_token};

/// Binds tighter than any binary operator, so `-a * b` is `(-a) * b`.
const UNARY_PRECEDENCE: u8 = 25;

/// Where a statement sits: inside a loop body and/or a function body.
///
/// Contexts are values; entering a construct derives a new one and the
/// parent stays untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseContext {
  pub in_loop: bool,
  pub in_function: bool,
}

impl ParseContext {
  pub fn child(self, in_loop: Option<bool>, in_function: Option<bool>) -> Self {
    Self {
      in_loop: in_loop.unwrap_or(self.in_loop),
      in_function: in_function.unwrap_or(self.in_function),
    }
  }

  fn loop_body(self) -> Self {
    self.child(Some(true), None)
  }

  fn function_body(self) -> Self {
    self.child(Some(false), Some(true))
  }
}

/// Statement recognizers in the order they are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StmtKind {
  FunctionDeclaration,
  If,
  While,
  For,
  Return,
  Break,
  Continue,
  Assign,
  Expression,
}

const STATEMENT_CHAIN: [StmtKind; 9] = [
  StmtKind::FunctionDeclaration,
  StmtKind::If,
  StmtKind::While,
  StmtKind::For,
  StmtKind::Return,
  StmtKind::Break,
  StmtKind::Continue,
  StmtKind::Assign,
  StmtKind::Expression,
];

impl StmtKind {
  fn can_start(self, stream: &TokenStream) -> bool {
    match self {
      Self::FunctionDeclaration => stream.check_keyword("def"),
      Self::If => stream.check_keyword("if"),
      Self::While => stream.check_keyword("while"),
      Self::For => stream.check_keyword("for"),
      Self::Return => stream.check_keyword("return"),
      Self::Break => stream.check_keyword("break"),
      Self::Continue => stream.check_keyword("continue"),
      Self::Assign => {
        let next = stream.peek(1);
        stream.check_kind(TokenKind::Identifier) && next.kind == TokenKind::Assign && next.lexeme == "="
      }
      Self::Expression => can_start_expression(stream.current()),
    }
  }

  /// Block statements consume their own trailing `Dedent`; everything else
  /// has to end the line.
  fn is_simple(self) -> bool {
    !matches!(
      self,
      Self::FunctionDeclaration | Self::If | Self::While | Self::For
    )
  }
}

/// Parse the whole token stream into a `Program`.
pub fn parse(tokens: Vec<Token>) -> CompileResult<Program> {
  let mut stream = TokenStream::new(tokens);
  let ctx = ParseContext::default();
  let mut statements = Vec::new();

  stream.skip_newlines();
  while !stream.is_eof() {
    statements.push(parse_stmt(&mut stream, ctx)?);
    stream.skip_newlines();
  }

  debug!("parsed {} top-level statement(s)", statements.len());
  Ok(Program { statements })
}

fn parse_stmt(stream: &mut TokenStream, ctx: ParseContext) -> CompileResult<Stmt> {
  let Some(kind) = STATEMENT_CHAIN
    .into_iter()
    .find(|kind| kind.can_start(stream))
  else {
    let token = stream.current();
    return Err(CompileError::syntax(
      token.line,
      format!("unexpected statement starting with {}", describe_token(token)),
    ));
  };

  let stmt = match kind {
    StmtKind::FunctionDeclaration => parse_function(stream, ctx)?,
    StmtKind::If => parse_if(stream, ctx)?,
    StmtKind::While => parse_while(stream, ctx)?,
    StmtKind::For => parse_for(stream, ctx)?,
    StmtKind::Return => parse_return(stream, ctx)?,
    StmtKind::Break | StmtKind::Continue => parse_loop_jump(stream, ctx, kind)?,
    StmtKind::Assign => parse_assign(stream)?,
    StmtKind::Expression => Stmt::Expr(parse_expr(stream, 0)?),
  };

  if kind.is_simple()
    && !matches!(
      stream.current().kind,
      TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof
    )
  {
    let token = stream.current();
    return Err(CompileError::syntax(
      token.line,
      format!("expected end of statement, found {}", describe_token(token)),
    ));
  }

  Ok(stmt)
}

/// `: NEWLINE INDENT stmt+ DEDENT`, the tail shared by every compound statement.
fn parse_suite(stream: &mut TokenStream, ctx: ParseContext, construct: &str) -> CompileResult<Block> {
  stream.expect(TokenKind::Delimiter, Some(":"), construct)?;
  stream.expect(TokenKind::Newline, None, construct)?;
  parse_block(stream, ctx)
}

fn parse_block(stream: &mut TokenStream, ctx: ParseContext) -> CompileResult<Block> {
  stream.skip_newlines();
  stream.expect(TokenKind::Indent, None, "block start")?;
  stream.skip_newlines();

  let mut statements = Vec::new();
  while !stream.is_eof() && !stream.check_kind(TokenKind::Dedent) {
    statements.push(parse_stmt(stream, ctx)?);
    stream.skip_newlines();
  }

  stream.expect(TokenKind::Dedent, None, "block end")?;
  Ok(Block { statements })
}

fn parse_function(stream: &mut TokenStream, ctx: ParseContext) -> CompileResult<Stmt> {
  let def = stream.expect(TokenKind::Keyword, Some("def"), "function declaration")?;
  let name = stream
    .expect(TokenKind::Identifier, None, "function name")?
    .lexeme;
  stream.expect(TokenKind::Delimiter, Some("("), "function parameters")?;

  let mut params = Vec::new();
  if stream.check_kind(TokenKind::Identifier) {
    loop {
      params.push(
        stream
          .expect(TokenKind::Identifier, None, "parameter name")?
          .lexeme,
      );
      if !stream.equal(TokenKind::Delimiter, Some(",")) {
        break;
      }
    }
  }
  stream.expect(TokenKind::Delimiter, Some(")"), "function parameters")?;

  let body = parse_suite(stream, ctx.function_body(), "function declaration")?;
  Ok(Stmt::FunctionDeclaration(FunctionDeclaration {
    name,
    params,
    body,
    line: def.line,
  }))
}

fn parse_if(stream: &mut TokenStream, ctx: ParseContext) -> CompileResult<Stmt> {
  stream.expect(TokenKind::Keyword, Some("if"), "if statement")?;
  let cond = parse_expr(stream, 0)?;
  let then_block = parse_suite(stream, ctx, "if condition")?;

  stream.skip_newlines();
  let else_block = if stream.equal(TokenKind::Keyword, Some("else")) {
    Some(parse_suite(stream, ctx, "else")?)
  } else {
    None
  };

  Ok(Stmt::If {
    cond,
    then_block,
    else_block,
  })
}

fn parse_while(stream: &mut TokenStream, ctx: ParseContext) -> CompileResult<Stmt> {
  stream.expect(TokenKind::Keyword, Some("while"), "while statement")?;
  let cond = parse_expr(stream, 0)?;
  let body = parse_suite(stream, ctx.loop_body(), "while condition")?;
  Ok(Stmt::While { cond, body })
}

fn parse_for(stream: &mut TokenStream, ctx: ParseContext) -> CompileResult<Stmt> {
  stream.expect(TokenKind::Keyword, Some("for"), "for statement")?;
  let var = stream.expect(TokenKind::Identifier, None, "for loop variable")?;
  stream.expect(TokenKind::Keyword, Some("in"), "for statement")?;
  let iterable = parse_expr(stream, 0)?;
  let body = parse_suite(stream, ctx.loop_body(), "for iterable")?;
  Ok(Stmt::For {
    var: var.lexeme,
    iterable,
    body,
    line: var.line,
  })
}

fn parse_return(stream: &mut TokenStream, ctx: ParseContext) -> CompileResult<Stmt> {
  let token = stream.expect(TokenKind::Keyword, Some("return"), "return statement")?;
  if !ctx.in_function {
    return Err(CompileError::syntax(
      token.line,
      "'return' outside of a function",
    ));
  }

  let value = if can_start_expression(stream.current()) {
    Some(parse_expr(stream, 0)?)
  } else {
    None
  };
  Ok(Stmt::Return {
    value,
    line: token.line,
  })
}

fn parse_loop_jump(stream: &mut TokenStream, ctx: ParseContext, kind: StmtKind) -> CompileResult<Stmt> {
  let keyword = if kind == StmtKind::Break {
    "break"
  } else {
    "continue"
  };
  let line = stream.current().line;
  if !ctx.in_loop {
    return Err(CompileError::syntax(
      line,
      format!("'{keyword}' outside of a loop"),
    ));
  }
  stream.expect(TokenKind::Keyword, Some(keyword), "loop control")?;

  Ok(if kind == StmtKind::Break {
    Stmt::Break { line }
  } else {
    Stmt::Continue { line }
  })
}

fn parse_assign(stream: &mut TokenStream) -> CompileResult<Stmt> {
  let target = stream.expect(TokenKind::Identifier, None, "assignment target")?;
  stream.expect(TokenKind::Assign, Some("="), "assignment")?;
  let value = parse_expr(stream, 0)?;
  Ok(Stmt::VarAssign {
    name: target.lexeme,
    value,
    line: target.line,
  })
}

/// Precedence climbing: parse a primary, then fold in every binary operator
/// that binds at least as tightly as `min_prec`.
pub fn parse_expr(stream: &mut TokenStream, min_prec: u8) -> CompileResult<Expr> {
  let mut lhs = parse_primary(stream)?;

  while let Some(op) = peek_binary_op(stream) {
    let prec = op.precedence();
    if prec < min_prec {
      break;
    }
    stream.advance();
    let rhs = parse_expr(stream, prec + 1)?;
    lhs = Expr::binary(op, lhs, rhs);
  }

  Ok(lhs)
}

/// Comparisons may arrive tagged as `Assign` as well as `Operator`; both
/// are accepted as long as the lexeme is in the operator table.
fn peek_binary_op(stream: &TokenStream) -> Option<BinaryOp> {
  let token = stream.current();
  match token.kind {
    TokenKind::Operator | TokenKind::Assign => BinaryOp::from_lexeme(&token.lexeme),
    _ => None,
  }
}

fn parse_primary(stream: &mut TokenStream) -> CompileResult<Expr> {
  if stream.equal(TokenKind::Operator, Some("-")) {
    let operand = parse_expr(stream, UNARY_PRECEDENCE)?;
    return Ok(Expr::neg(operand));
  }

  if stream.equal(TokenKind::Delimiter, Some("(")) {
    let expr = parse_expr(stream, 0)?;
    stream.expect(TokenKind::Delimiter, Some(")"), "parenthesized expression")?;
    return Ok(expr);
  }

  let token = stream.current().clone();
  match token.kind {
    TokenKind::Keyword if token.lexeme == "True" || token.lexeme == "False" => {
      stream.advance();
      Ok(Expr::Literal(Literal::Bool(token.lexeme == "True")))
    }
    TokenKind::Number => {
      stream.advance();
      parse_number(&token).map(Expr::Literal)
    }
    TokenKind::String => {
      stream.advance();
      let inner = &token.lexeme[1..token.lexeme.len() - 1];
      Ok(Expr::Literal(Literal::Str(inner.to_string())))
    }
    TokenKind::Identifier => {
      stream.advance();
      let mut expr = Expr::ident(token.lexeme, token.line);
      // Chained argument lists: `f(x)(y)`.
      while stream.check_delimiter("(") {
        let line = stream.current().line;
        stream.advance();
        let args = parse_arguments(stream)?;
        expr = Expr::call(expr, args, line);
      }
      Ok(expr)
    }
    _ => Err(CompileError::syntax(
      token.line,
      format!("expected an expression, found {}", describe_token(&token)),
    )),
  }
}

/// Arguments after an opening `(`, through the closing `)`.
fn parse_arguments(stream: &mut TokenStream) -> CompileResult<Vec<Expr>> {
  let mut args = Vec::new();
  if !stream.check_delimiter(")") {
    loop {
      args.push(parse_expr(stream, 0)?);
      if !stream.equal(TokenKind::Delimiter, Some(",")) {
        break;
      }
    }
  }
  stream.expect(TokenKind::Delimiter, Some(")"), "call arguments")?;
  Ok(args)
}

fn parse_number(token: &Token) -> CompileResult<Literal> {
  let invalid = |err: &dyn std::fmt::Display| {
    CompileError::syntax(
      token.line,
      format!("invalid number '{}': {err}", token.lexeme),
    )
  };
  if token.lexeme.contains('.') {
    token
      .lexeme
      .parse::<f64>()
      .map(Literal::Float)
      .map_err(|err| invalid(&err))
  } else {
    token
      .lexeme
      .parse::<i64>()
      .map(Literal::Int)
      .map_err(|err| invalid(&err))
  }
}

fn can_start_expression(token: &Token) -> bool {
  match token.kind {
    TokenKind::Operator => token.lexeme == "-",
    TokenKind::Identifier | TokenKind::Number | TokenKind::String => true,
    TokenKind::Keyword => token.lexeme == "True" || token.lexeme == "False",
    TokenKind::Delimiter => token.lexeme == "(",
    _ => false,
  }
}
