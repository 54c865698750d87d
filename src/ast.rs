//! Abstract syntax tree shared by the parser, the semantic analyzer and the
//! code generator.
//!
//! Every node owns its children exclusively. The tree is built once by the
//! parser and only read afterwards.

/// Root of a parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
  pub statements: Vec<Stmt>,
}

/// Statements sharing one indentation level.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
  pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
  pub name: String,
  pub params: Vec<String>,
  pub body: Block,
  pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
  FunctionDeclaration(FunctionDeclaration),
  VarAssign {
    name: String,
    value: Expr,
    line: usize,
  },
  If {
    cond: Expr,
    then_block: Block,
    else_block: Option<Block>,
  },
  While {
    cond: Expr,
    body: Block,
  },
  For {
    var: String,
    iterable: Expr,
    body: Block,
    line: usize,
  },
  Return {
    value: Option<Expr>,
    line: usize,
  },
  Break {
    line: usize,
  },
  Continue {
    line: usize,
  },
  Expr(Expr),
}

/// Binary operators in the precedence table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Mul,
  Div,
  FloorDiv,
  Mod,
  Add,
  Sub,
  Eq,
  Ne,
  Gt,
  Lt,
  Ge,
  Le,
}

impl BinaryOp {
  pub fn from_lexeme(lexeme: &str) -> Option<Self> {
    let op = match lexeme {
      "*" => Self::Mul,
      "/" => Self::Div,
      "//" => Self::FloorDiv,
      "%" => Self::Mod,
      "+" => Self::Add,
      "-" => Self::Sub,
      "==" => Self::Eq,
      "!=" => Self::Ne,
      ">" => Self::Gt,
      "<" => Self::Lt,
      ">=" => Self::Ge,
      "<=" => Self::Le,
      _ => return None,
    };
    Some(op)
  }

  /// Binding power; higher binds tighter. All operators are left-associative.
  pub fn precedence(self) -> u8 {
    match self {
      Self::Mul | Self::Div | Self::FloorDiv | Self::Mod => 20,
      Self::Add | Self::Sub => 10,
      Self::Eq | Self::Ne | Self::Gt | Self::Lt | Self::Ge | Self::Le => 5,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
  Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
  Int(i64),
  Float(f64),
  Str(String),
  Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Binary {
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Unary {
    op: UnaryOp,
    operand: Box<Expr>,
  },
  Literal(Literal),
  Identifier {
    name: String,
    line: usize,
  },
  Call {
    callee: Box<Expr>,
    args: Vec<Expr>,
    line: usize,
  },
}

impl Expr {
  pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
    Self::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }

  pub fn neg(operand: Expr) -> Self {
    Self::Unary {
      op: UnaryOp::Neg,
      operand: Box::new(operand),
    }
  }

  pub fn ident(name: impl Into<String>, line: usize) -> Self {
    Self::Identifier {
      name: name.into(),
      line,
    }
  }

  pub fn call(callee: Expr, args: Vec<Expr>, line: usize) -> Self {
    Self::Call {
      callee: Box::new(callee),
      args,
      line,
    }
  }

  /// Name of the callee when this is a call to a plain identifier.
  pub fn callee_name(&self) -> Option<&str> {
    match self {
      Self::Call { callee, .. } => match callee.as_ref() {
        Self::Identifier { name, .. } => Some(name),
        _ => None,
      },
      _ => None,
    }
  }

  /// Best-known source line of the expression, if any part of it records one.
  pub fn line(&self) -> Option<usize> {
    match self {
      Self::Identifier { line, .. } | Self::Call { line, .. } => Some(*line),
      Self::Binary { lhs, rhs, .. } => lhs.line().or_else(|| rhs.line()),
      Self::Unary { operand, .. } => operand.line(),
      Self::Literal(_) => None,
    }
  }
}
