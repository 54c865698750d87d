//! Scoped semantic checks over the unmodified AST.
//!
//! The analyzer registers every top-level function first, so calls may refer
//! to functions declared later in the file (and to themselves). Function
//! bodies are then checked in a frame seeded with their parameters, and
//! finally the top-level statements run in the root frame. Block constructs
//! open child frames. The first violation aborts the pass.

use std::collections::HashMap;

use log::debug;

use crate::ast::{Block, Expr, FunctionDeclaration, Program, Stmt};
use crate::error::{CompileError, CompileResult};
use crate::scope::ScopeArena;

/// Names callable without a declaration.
pub const BUILTINS: [&str; 3] = ["print", "input", "range"];

/// Validate `program`, failing on the first semantic error.
pub fn analyze(program: &Program) -> CompileResult<()> {
  let mut analyzer = Analyzer::default();

  let functions: Vec<&FunctionDeclaration> = program
    .statements
    .iter()
    .filter_map(|stmt| match stmt {
      Stmt::FunctionDeclaration(func) => Some(func),
      _ => None,
    })
    .collect();

  for func in &functions {
    analyzer.register_function(func)?;
  }
  for func in &functions {
    analyzer.analyze_function(func)?;
  }
  for stmt in &program.statements {
    if !matches!(stmt, Stmt::FunctionDeclaration(_)) {
      analyzer.analyze_stmt(stmt)?;
    }
  }

  debug!(
    "semantic analysis passed ({} function(s), {} top-level statement(s))",
    functions.len(),
    program.statements.len() - functions.len()
  );
  Ok(())
}

#[derive(Default)]
struct Analyzer {
  /// Declared variables, mapped to the line that declared them.
  scopes: ScopeArena<usize>,
  /// Declared functions, mapped to their parameter count.
  functions: HashMap<String, usize>,
}

impl Analyzer {
  fn register_function(&mut self, func: &FunctionDeclaration) -> CompileResult<()> {
    if BUILTINS.contains(&func.name.as_str()) {
      return Err(CompileError::semantic(
        Some(func.line),
        format!("cannot redefine built-in '{}'", func.name),
      ));
    }
    if self
      .functions
      .insert(func.name.clone(), func.params.len())
      .is_some()
    {
      return Err(CompileError::semantic(
        Some(func.line),
        format!("function '{}' already declared", func.name),
      ));
    }
    Ok(())
  }

  fn is_function(&self, name: &str) -> bool {
    BUILTINS.contains(&name) || self.functions.contains_key(name)
  }

  fn analyze_function(&mut self, func: &FunctionDeclaration) -> CompileResult<()> {
    self.scopes.push();
    for param in &func.params {
      if self.is_function(param) {
        return Err(CompileError::semantic(
          Some(func.line),
          format!("parameter '{param}' has the name of a function"),
        ));
      }
      if !self.scopes.declare(param, func.line) {
        return Err(CompileError::semantic(
          Some(func.line),
          format!("parameter '{param}' already declared"),
        ));
      }
    }
    for stmt in &func.body.statements {
      self.analyze_stmt(stmt)?;
    }
    self.scopes.pop();
    Ok(())
  }

  fn analyze_block(&mut self, block: &Block) -> CompileResult<()> {
    self.scopes.push();
    for stmt in &block.statements {
      self.analyze_stmt(stmt)?;
    }
    self.scopes.pop();
    Ok(())
  }

  fn analyze_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
    match stmt {
      Stmt::FunctionDeclaration(func) => Err(CompileError::semantic(
        Some(func.line),
        format!("function '{}' must be declared at the top level", func.name),
      )),
      Stmt::VarAssign { name, value, line } => {
        self.analyze_expr(value)?;
        self.declare_on_first_assignment(name, *line)
      }
      Stmt::If {
        cond,
        then_block,
        else_block,
      } => {
        self.analyze_expr(cond)?;
        self.analyze_block(then_block)?;
        if let Some(else_block) = else_block {
          self.analyze_block(else_block)?;
        }
        Ok(())
      }
      Stmt::While { cond, body } => {
        self.analyze_expr(cond)?;
        self.analyze_block(body)
      }
      Stmt::For {
        var,
        iterable,
        body,
        line,
      } => {
        self.analyze_expr(iterable)?;
        if self.is_function(var) {
          return Err(CompileError::semantic(
            Some(*line),
            format!("cannot assign to function '{var}'"),
          ));
        }
        // The loop variable always lives in the loop's own frame.
        self.scopes.push();
        self.scopes.declare(var, *line);
        for stmt in &body.statements {
          self.analyze_stmt(stmt)?;
        }
        self.scopes.pop();
        Ok(())
      }
      Stmt::Return { value, .. } => match value {
        Some(value) => self.analyze_expr(value),
        None => Ok(()),
      },
      Stmt::Break { .. } | Stmt::Continue { .. } => Ok(()),
      Stmt::Expr(expr) => self.analyze_expr(expr),
    }
  }

  /// Assignment to a visible name re-uses it; otherwise the name is declared
  /// in the current frame.
  fn declare_on_first_assignment(&mut self, name: &str, line: usize) -> CompileResult<()> {
    if self.is_function(name) {
      return Err(CompileError::semantic(
        Some(line),
        format!("cannot assign to function '{name}'"),
      ));
    }
    if self.scopes.lookup(name).is_none() && !self.scopes.declare(name, line) {
      return Err(CompileError::semantic(
        Some(line),
        format!("variable '{name}' already declared in this scope"),
      ));
    }
    Ok(())
  }

  fn analyze_expr(&self, expr: &Expr) -> CompileResult<()> {
    match expr {
      Expr::Literal(_) => Ok(()),
      Expr::Identifier { name, line } => {
        if self.scopes.lookup(name).is_some() {
          Ok(())
        } else if self.is_function(name) {
          Err(CompileError::semantic(
            Some(*line),
            format!("function '{name}' cannot be used as a value"),
          ))
        } else {
          Err(CompileError::semantic(
            Some(*line),
            format!("variable '{name}' not declared"),
          ))
        }
      }
      Expr::Call { callee, args, line } => {
        match callee.as_ref() {
          Expr::Identifier { name, .. } => self.check_callee(name, args.len(), *line)?,
          other => self.analyze_expr(other)?,
        }
        args.iter().try_for_each(|arg| self.analyze_expr(arg))
      }
      Expr::Binary { lhs, rhs, .. } => {
        self.analyze_expr(lhs)?;
        self.analyze_expr(rhs)
      }
      Expr::Unary { operand, .. } => self.analyze_expr(operand),
    }
  }

  fn check_callee(&self, name: &str, arg_count: usize, line: usize) -> CompileResult<()> {
    if BUILTINS.contains(&name) {
      return Ok(());
    }
    if let Some(&arity) = self.functions.get(name) {
      if arity != arg_count {
        return Err(CompileError::semantic(
          Some(line),
          format!("function '{name}' expects {arity} argument(s), got {arg_count}"),
        ));
      }
      return Ok(());
    }
    let message = if self.scopes.lookup(name).is_some() {
      format!("'{name}' is not a function")
    } else {
      format!("function '{name}' not declared")
    };
    Err(CompileError::semantic(Some(line), message))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse;
  use crate::tokenizer::tokenize;

  fn check(source: &str) -> CompileResult<()> {
    let program = parse(tokenize(source)?)?;
    analyze(&program)
  }

  #[test]
  fn undeclared_variable_is_reported_with_line() {
    let err = check("x = 1\nprint(y)\n").unwrap_err();
    assert_eq!(
      err.to_string(),
      "semantic error on line 2: variable 'y' not declared"
    );
  }

  #[test]
  fn assignment_declares_then_reuses() {
    assert!(check("x = 1\nx = x + 1\nprint(x)\n").is_ok());
  }

  #[test]
  fn right_hand_side_is_checked_before_declaring() {
    let err = check("x = x + 1\n").unwrap_err();
    assert!(err.to_string().contains("variable 'x' not declared"));
  }

  #[test]
  fn block_locals_are_not_visible_after_the_block() {
    let err = check("c = 1\nif c:\n    y = 2\nprint(y)\n").unwrap_err();
    assert!(matches!(err, CompileError::Semantic { line: Some(4), .. }));
  }

  #[test]
  fn outer_variables_are_visible_in_blocks() {
    assert!(check("x = 0\nwhile x < 3:\n    x = x + 1\nprint(x)\n").is_ok());
  }

  #[test]
  fn for_variable_is_scoped_to_the_loop() {
    assert!(check("for i in range(3):\n    print(i)\n").is_ok());
    let err = check("for i in range(3):\n    print(i)\nprint(i)\n").unwrap_err();
    assert!(matches!(err, CompileError::Semantic { line: Some(3), .. }));
  }

  #[test]
  fn for_variable_shadows_an_outer_name() {
    assert!(check("i = 5\nfor i in range(2):\n    print(i)\nprint(i)\n").is_ok());
    let err = check("def f():\n    return 1\nfor f in range(2):\n    print(f)\n").unwrap_err();
    assert!(err.to_string().contains("cannot assign to function 'f'"));
  }

  #[test]
  fn forward_calls_and_recursion_are_allowed() {
    let source = "def a(n):\n    return b(n)\ndef b(n):\n    return a(n - 1)\nx = a(3)\n";
    assert!(check(source).is_ok());
  }

  #[test]
  fn arity_mismatch_is_reported() {
    let err = check("def f(a, b):\n    return a\nx = f(1)\n").unwrap_err();
    assert_eq!(
      err.to_string(),
      "semantic error on line 3: function 'f' expects 2 argument(s), got 1"
    );
  }

  #[test]
  fn unknown_function_is_reported() {
    let err = check("x = g(1)\n").unwrap_err();
    assert!(err.to_string().contains("function 'g' not declared"));
  }

  #[test]
  fn calling_a_variable_is_reported() {
    let err = check("g = 1\nx = g(1)\n").unwrap_err();
    assert!(err.to_string().contains("'g' is not a function"));
  }

  #[test]
  fn duplicate_parameter_is_reported() {
    let err = check("def f(a, a):\n    return a\n").unwrap_err();
    assert!(err.to_string().contains("already declared"));
  }

  #[test]
  fn duplicate_function_is_reported() {
    let err = check("def f():\n    return\ndef f():\n    return\n").unwrap_err();
    assert!(matches!(err, CompileError::Semantic { line: Some(3), .. }));
  }

  #[test]
  fn functions_do_not_see_top_level_variables() {
    let err = check("def f():\n    return x\nx = 1\ny = f()\n").unwrap_err();
    assert!(matches!(err, CompileError::Semantic { line: Some(2), .. }));
  }

  #[test]
  fn nested_function_is_rejected() {
    let err = check("def f():\n    def g():\n        return\n").unwrap_err();
    assert!(err.to_string().contains("top level"));
  }

  #[test]
  fn assigning_to_a_function_is_rejected() {
    let err = check("def f():\n    return\nf = 1\n").unwrap_err();
    assert!(err.to_string().contains("cannot assign to function 'f'"));
  }

  #[test]
  fn function_named_like_a_builtin_is_rejected() {
    let err = check("def print():\n    return 1\n").unwrap_err();
    assert!(matches!(err, CompileError::Semantic { line: Some(1), .. }));
    assert_eq!(
      err.to_string(),
      "semantic error on line 1: cannot redefine built-in 'print'"
    );
  }

  #[test]
  fn function_used_as_a_value_is_rejected() {
    let err = check("def f():\n    return 1\nx = f + 1\n").unwrap_err();
    assert!(matches!(err, CompileError::Semantic { line: Some(3), .. }));
    assert_eq!(
      err.to_string(),
      "semantic error on line 3: function 'f' cannot be used as a value"
    );
  }

  #[test]
  fn parameter_named_like_a_function_is_rejected() {
    let err = check("def g():\n    return 1\ndef f(g):\n    return g\n").unwrap_err();
    assert!(matches!(err, CompileError::Semantic { line: Some(3), .. }));
    assert_eq!(
      err.to_string(),
      "semantic error on line 3: parameter 'g' has the name of a function"
    );
  }

  #[test]
  fn builtins_need_no_declaration() {
    assert!(check("x = input()\nprint(x, 1)\n").is_ok());
  }
}
