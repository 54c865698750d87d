//! Code generation: lower the checked AST into MEPA stack-machine code.
//!
//! Every expression leaves exactly one value on the operand stack; stores pop
//! it into a memory slot. Slots come from one compilation-wide allocator and
//! each scope frame records the absolute address of the names it declares.
//! Function bodies are generated into their own segments, spliced after the
//! main program, so calls resolve by label regardless of declaration order.

use std::collections::HashMap;
use std::fmt;

use log::{debug, trace};

use crate::ast::{BinaryOp, Block, Expr, FunctionDeclaration, Literal, Program, Stmt, UnaryOp};
use crate::error::{CompileError, CompileResult};
use crate::scope::ScopeArena;

/// Generator-assigned jump target, unique within one compilation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(String);

impl Label {
  pub fn name(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Label {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Numeric operand of `CRCT`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
  Int(i64),
  Float(f64),
}

impl fmt::Display for Constant {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Int(value) => write!(f, "{value}"),
      // Debug keeps the decimal point on whole floats (`2.0`).
      Self::Float(value) => write!(f, "{value:?}"),
    }
  }
}

/// One line of MEPA output.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
  Inpp,
  Amem(usize),
  Crct(Constant),
  Crcs(String),
  Crvl { address: usize, name: String },
  Armz { address: usize, name: String },
  Soma,
  Subt,
  Mult,
  Divi,
  Mod,
  Cmig,
  Cmdg,
  Cmma,
  Cmme,
  Cmag,
  Cmeg,
  Nega,
  Dsvs(Label),
  Dsvf(Label),
  Chpr(Label),
  Rtpr,
  Impr,
  Leit,
  Nada(Label),
  Para,
}

impl Instruction {
  /// Label this instruction jumps to or calls.
  pub fn target(&self) -> Option<&Label> {
    match self {
      Self::Dsvs(label) | Self::Dsvf(label) | Self::Chpr(label) => Some(label),
      _ => None,
    }
  }

  /// Label this instruction defines.
  pub fn defines(&self) -> Option<&Label> {
    match self {
      Self::Nada(label) => Some(label),
      _ => None,
    }
  }

  /// Memory address read or written by this instruction.
  pub fn address(&self) -> Option<usize> {
    match self {
      Self::Crvl { address, .. } | Self::Armz { address, .. } => Some(*address),
      _ => None,
    }
  }
}

impl From<BinaryOp> for Instruction {
  fn from(op: BinaryOp) -> Self {
    match op {
      BinaryOp::Add => Self::Soma,
      BinaryOp::Sub => Self::Subt,
      BinaryOp::Mul => Self::Mult,
      BinaryOp::Div | BinaryOp::FloorDiv => Self::Divi,
      BinaryOp::Mod => Self::Mod,
      BinaryOp::Eq => Self::Cmig,
      BinaryOp::Ne => Self::Cmdg,
      BinaryOp::Gt => Self::Cmma,
      BinaryOp::Lt => Self::Cmme,
      BinaryOp::Ge => Self::Cmag,
      BinaryOp::Le => Self::Cmeg,
    }
  }
}

impl fmt::Display for Instruction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Inpp => f.write_str("INPP"),
      Self::Amem(size) => write!(f, "AMEM {size}"),
      Self::Crct(value) => write!(f, "CRCT {value}"),
      Self::Crcs(text) => {
        let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
        write!(f, "CRCS \"{escaped}\"")
      }
      Self::Crvl { address, name } => write!(f, "CRVL {address} # {name}"),
      Self::Armz { address, name } => write!(f, "ARMZ {address} # {name}"),
      Self::Soma => f.write_str("SOMA"),
      Self::Subt => f.write_str("SUBT"),
      Self::Mult => f.write_str("MULT"),
      Self::Divi => f.write_str("DIVI"),
      Self::Mod => f.write_str("MOD"),
      Self::Cmig => f.write_str("CMIG"),
      Self::Cmdg => f.write_str("CMDG"),
      Self::Cmma => f.write_str("CMMA"),
      Self::Cmme => f.write_str("CMME"),
      Self::Cmag => f.write_str("CMAG"),
      Self::Cmeg => f.write_str("CMEG"),
      Self::Nega => f.write_str("NEGA"),
      Self::Dsvs(label) => write!(f, "DSVS {label}"),
      Self::Dsvf(label) => write!(f, "DSVF {label}"),
      Self::Chpr(label) => write!(f, "CHPR {label}"),
      Self::Rtpr => f.write_str("RTPR"),
      Self::Impr => f.write_str("IMPR"),
      Self::Leit => f.write_str("LEIT"),
      Self::Nada(label) => write!(f, "{label}: NADA"),
      Self::Para => f.write_str("PARA"),
    }
  }
}

/// Function registry entry, built before any body is generated.
#[derive(Debug, Clone)]
struct FunctionInfo {
  entry: Label,
  end: Label,
  return_slot: usize,
  param_slots: Vec<usize>,
}

/// Jump targets for `break` and `continue` in the innermost loop.
#[derive(Debug)]
struct LoopLabels {
  break_label: Label,
  continue_label: Label,
}

/// Generate MEPA code for a semantically valid program.
pub fn generate(program: &Program) -> CompileResult<Vec<Instruction>> {
  let mut generator = Generator::default();
  generator.emit(Instruction::Inpp);
  // Operand patched once the highest used address is known.
  generator.emit(Instruction::Amem(0));

  let functions: Vec<&FunctionDeclaration> = program
    .statements
    .iter()
    .filter_map(|stmt| match stmt {
      Stmt::FunctionDeclaration(func) => Some(func),
      _ => None,
    })
    .collect();

  for func in &functions {
    generator.register_function(func)?;
  }
  let mut segments = Vec::with_capacity(functions.len());
  for func in &functions {
    segments.push(generator.function_segment(func)?);
  }

  for stmt in &program.statements {
    if !matches!(stmt, Stmt::FunctionDeclaration(_)) {
      generator.emit_stmt(stmt)?;
    }
  }

  let end = generator.new_label("LEND_");
  generator.emit(Instruction::Dsvs(end.clone()));
  let memory_size = generator.memory_size();

  let mut code = generator.code;
  for segment in segments {
    code.extend(segment);
  }
  code.push(Instruction::Nada(end));
  code.push(Instruction::Para);
  code[1] = Instruction::Amem(memory_size);

  debug!(
    "generated {} instruction(s), reserving {} memory slot(s)",
    code.len(),
    memory_size
  );
  Ok(code)
}

#[derive(Default)]
struct Generator {
  /// Buffer currently being emitted into.
  code: Vec<Instruction>,
  label_counter: usize,
  /// Variable name of every allocated slot, indexed by address.
  slot_names: Vec<String>,
  max_address: Option<usize>,
  scopes: ScopeArena<usize>,
  loops: Vec<LoopLabels>,
  current_function: Option<FunctionInfo>,
  functions: HashMap<String, FunctionInfo>,
}

impl Generator {
  fn emit(&mut self, instruction: Instruction) {
    self.code.push(instruction);
  }

  fn new_label(&mut self, prefix: &str) -> Label {
    self.label_counter += 1;
    let label = Label(format!("{prefix}{}", self.label_counter));
    trace!("allocated label {label}");
    label
  }

  fn allocate(&mut self, name: impl Into<String>) -> usize {
    let address = self.slot_names.len();
    let name = name.into();
    trace!("allocated slot {address} for '{name}'");
    self.slot_names.push(name);
    address
  }

  fn memory_size(&self) -> usize {
    self.max_address.map_or(0, |address| address + 1)
  }

  fn touch(&mut self, address: usize) -> String {
    self.max_address = self.max_address.max(Some(address));
    self.slot_names[address].clone()
  }

  fn load(&mut self, address: usize) {
    let name = self.touch(address);
    self.emit(Instruction::Crvl { address, name });
  }

  fn store(&mut self, address: usize) {
    let name = self.touch(address);
    self.emit(Instruction::Armz { address, name });
  }

  fn register_function(&mut self, func: &FunctionDeclaration) -> CompileResult<()> {
    if self.functions.contains_key(&func.name) {
      return Err(CompileError::codegen(
        Some(func.line),
        format!("function '{}' already declared", func.name),
      ));
    }
    let entry = self.new_label(&format!("F_{}_", func.name));
    let end = self.new_label(&format!("F_{}_END_", func.name));
    let param_slots = func
      .params
      .iter()
      .map(|param| self.allocate(param.as_str()))
      .collect();
    let return_slot = self.allocate(format!("{}_ret", func.name));
    self.functions.insert(
      func.name.clone(),
      FunctionInfo {
        entry,
        end,
        return_slot,
        param_slots,
      },
    );
    Ok(())
  }

  /// Generate a function body into its own buffer.
  fn function_segment(&mut self, func: &FunctionDeclaration) -> CompileResult<Vec<Instruction>> {
    let saved = std::mem::take(&mut self.code);
    let result = self.emit_function(func);
    let segment = std::mem::replace(&mut self.code, saved);
    result.map(|()| segment)
  }

  fn emit_function(&mut self, func: &FunctionDeclaration) -> CompileResult<()> {
    let info = self.functions.get(&func.name).cloned().ok_or_else(|| {
      CompileError::codegen(
        Some(func.line),
        format!("function '{}' was never registered", func.name),
      )
    })?;

    self.emit(Instruction::Nada(info.entry.clone()));
    self.scopes.push();
    for (param, &slot) in func.params.iter().zip(&info.param_slots) {
      if !self.scopes.declare(param, slot) {
        return Err(CompileError::codegen(
          Some(func.line),
          format!("parameter '{param}' already declared"),
        ));
      }
    }
    self.emit(Instruction::Crct(Constant::Int(0)));
    self.store(info.return_slot);

    self.current_function = Some(info.clone());
    for stmt in &func.body.statements {
      self.emit_stmt(stmt)?;
    }
    self.current_function = None;

    self.emit(Instruction::Nada(info.end));
    self.emit(Instruction::Rtpr);
    self.scopes.pop();
    Ok(())
  }

  fn emit_block(&mut self, block: &Block) -> CompileResult<()> {
    self.scopes.push();
    for stmt in &block.statements {
      self.emit_stmt(stmt)?;
    }
    self.scopes.pop();
    Ok(())
  }

  fn emit_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
    match stmt {
      Stmt::FunctionDeclaration(func) => Err(CompileError::codegen(
        Some(func.line),
        format!("function '{}' must be declared at the top level", func.name),
      )),
      Stmt::VarAssign { name, value, .. } => {
        self.emit_expr(value)?;
        let address = match self.scopes.lookup(name) {
          Some(&address) => address,
          None => {
            let address = self.allocate(name.as_str());
            self.scopes.declare(name, address);
            address
          }
        };
        self.store(address);
        Ok(())
      }
      Stmt::If {
        cond,
        then_block,
        else_block,
      } => {
        self.emit_expr(cond)?;
        let else_label = self.new_label("L");
        let end_label = self.new_label("L");
        self.emit(Instruction::Dsvf(else_label.clone()));
        self.emit_block(then_block)?;
        self.emit(Instruction::Dsvs(end_label.clone()));
        self.emit(Instruction::Nada(else_label));
        if let Some(else_block) = else_block {
          self.emit_block(else_block)?;
        }
        self.emit(Instruction::Nada(end_label));
        Ok(())
      }
      Stmt::While { cond, body } => {
        let start = self.new_label("L");
        let end = self.new_label("L");
        self.emit(Instruction::Nada(start.clone()));
        self.emit_expr(cond)?;
        self.emit(Instruction::Dsvf(end.clone()));
        self.loops.push(LoopLabels {
          break_label: end.clone(),
          continue_label: start.clone(),
        });
        self.emit_block(body)?;
        self.loops.pop();
        self.emit(Instruction::Dsvs(start));
        self.emit(Instruction::Nada(end));
        Ok(())
      }
      Stmt::For {
        var,
        iterable,
        body,
        line,
      } => self.emit_for(var, iterable, body, *line),
      Stmt::Break { line } => {
        let label = self
          .loops
          .last()
          .map(|labels| labels.break_label.clone())
          .ok_or_else(|| CompileError::codegen(Some(*line), "'break' outside of a loop"))?;
        self.emit(Instruction::Dsvs(label));
        Ok(())
      }
      Stmt::Continue { line } => {
        let label = self
          .loops
          .last()
          .map(|labels| labels.continue_label.clone())
          .ok_or_else(|| CompileError::codegen(Some(*line), "'continue' outside of a loop"))?;
        self.emit(Instruction::Dsvs(label));
        Ok(())
      }
      Stmt::Return { value, line } => {
        let Some(info) = self.current_function.clone() else {
          return Err(CompileError::codegen(
            Some(*line),
            "'return' outside of a function",
          ));
        };
        if let Some(value) = value {
          self.emit_expr(value)?;
          self.store(info.return_slot);
        }
        self.emit(Instruction::Dsvs(info.end));
        Ok(())
      }
      Stmt::Expr(expr) => self.emit_expr_stmt(expr),
    }
  }

  /// `for var in range(...)` as a counted loop over `var` and a hidden limit slot.
  fn emit_for(&mut self, var: &str, iterable: &Expr, body: &Block, line: usize) -> CompileResult<()> {
    let Expr::Call { args, .. } = iterable else {
      return Err(CompileError::codegen(
        Some(line),
        "only 'for ... in range(...)' loops are supported",
      ));
    };
    if iterable.callee_name() != Some("range") {
      return Err(CompileError::codegen(
        Some(line),
        "only 'for ... in range(...)' loops are supported",
      ));
    }
    let (start, limit) = match args.as_slice() {
      [limit] => (None, limit),
      [start, limit] => (Some(start), limit),
      [_, _, _] => {
        return Err(CompileError::codegen(
          Some(line),
          "range() with a step is not supported",
        ));
      }
      _ => {
        return Err(CompileError::codegen(
          Some(line),
          format!("range() expects 1 or 2 arguments, got {}", args.len()),
        ));
      }
    };

    self.scopes.push();
    let var_slot = self.allocate(var);
    let limit_slot = self.allocate(format!("{var}_limit"));

    // Bounds are evaluated before the loop variable becomes visible.
    match start {
      Some(start) => self.emit_expr(start)?,
      None => self.emit(Instruction::Crct(Constant::Int(0))),
    }
    self.store(var_slot);
    self.emit_expr(limit)?;
    self.store(limit_slot);
    self.scopes.declare(var, var_slot);

    let start_label = self.new_label("L");
    let end_label = self.new_label("L");
    let increment_label = self.new_label("L");

    self.emit(Instruction::Nada(start_label.clone()));
    self.load(var_slot);
    self.load(limit_slot);
    self.emit(Instruction::Cmme);
    self.emit(Instruction::Dsvf(end_label.clone()));

    self.loops.push(LoopLabels {
      break_label: end_label.clone(),
      continue_label: increment_label.clone(),
    });
    for stmt in &body.statements {
      self.emit_stmt(stmt)?;
    }
    self.loops.pop();

    self.emit(Instruction::Nada(increment_label));
    self.load(var_slot);
    self.emit(Instruction::Crct(Constant::Int(1)));
    self.emit(Instruction::Soma);
    self.store(var_slot);
    self.emit(Instruction::Dsvs(start_label));
    self.emit(Instruction::Nada(end_label));
    self.scopes.pop();
    Ok(())
  }

  /// Only `print(...)` and `input()` may stand alone as statements.
  fn emit_expr_stmt(&mut self, expr: &Expr) -> CompileResult<()> {
    if let Expr::Call { args, line, .. } = expr {
      match expr.callee_name() {
        Some("print") => {
          for arg in args {
            self.emit_expr(arg)?;
            self.emit(Instruction::Impr);
          }
          return Ok(());
        }
        Some("input") => return self.emit_input(args, *line),
        _ => {}
      }
    }
    Err(CompileError::codegen(
      expr.line(),
      "only print() and input() calls can be used as statements",
    ))
  }

  /// Emits `LEIT`. As a bare statement the value read is left on the
  /// stack, since the instruction set has no pop.
  fn emit_input(&mut self, args: &[Expr], line: usize) -> CompileResult<()> {
    if !args.is_empty() {
      return Err(CompileError::codegen(
        Some(line),
        "input() does not take arguments",
      ));
    }
    self.emit(Instruction::Leit);
    Ok(())
  }

  fn emit_expr(&mut self, expr: &Expr) -> CompileResult<()> {
    match expr {
      Expr::Literal(literal) => {
        let instruction = match literal {
          Literal::Int(value) => Instruction::Crct(Constant::Int(*value)),
          Literal::Float(value) => Instruction::Crct(Constant::Float(*value)),
          Literal::Bool(value) => Instruction::Crct(Constant::Int(i64::from(*value))),
          Literal::Str(text) => Instruction::Crcs(text.clone()),
        };
        self.emit(instruction);
        Ok(())
      }
      Expr::Identifier { name, line } => {
        let Some(&address) = self.scopes.lookup(name) else {
          return Err(CompileError::codegen(
            Some(*line),
            format!("variable '{name}' not declared"),
          ));
        };
        self.load(address);
        Ok(())
      }
      Expr::Unary { op, operand } => {
        self.emit_expr(operand)?;
        match op {
          UnaryOp::Neg => self.emit(Instruction::Nega),
        }
        Ok(())
      }
      Expr::Binary { op, lhs, rhs } => {
        self.emit_expr(lhs)?;
        self.emit_expr(rhs)?;
        self.emit(Instruction::from(*op));
        Ok(())
      }
      Expr::Call { args, line, .. } => self.emit_call(expr, args, *line),
    }
  }

  /// Lowers a call to a declared function. Every argument is evaluated
  /// left to right onto the stack first; the values are then stored into
  /// the parameter slots from last to first, so each slot receives its own
  /// argument. `CHPR` follows, then the return slot is loaded as the value.
  fn emit_call(&mut self, call: &Expr, args: &[Expr], line: usize) -> CompileResult<()> {
    let Some(name) = call.callee_name() else {
      return Err(CompileError::codegen(
        Some(line),
        "only named functions can be called",
      ));
    };

    match name {
      "input" => return self.emit_input(args, line),
      "print" => {
        return Err(CompileError::codegen(
          Some(line),
          "print() cannot be used as a value",
        ));
      }
      "range" => {
        return Err(CompileError::codegen(
          Some(line),
          "range() can only be used as a for loop iterable",
        ));
      }
      _ => {}
    }

    let Some(info) = self.functions.get(name).cloned() else {
      return Err(CompileError::codegen(
        Some(line),
        format!("function '{name}' not declared"),
      ));
    };
    if args.len() != info.param_slots.len() {
      return Err(CompileError::codegen(
        Some(line),
        format!(
          "function '{name}' expects {} argument(s), got {}",
          info.param_slots.len(),
          args.len()
        ),
      ));
    }

    // A call nested in a later argument would overwrite stored slots.
    for arg in args {
      self.emit_expr(arg)?;
    }
    for &slot in info.param_slots.iter().rev() {
      self.store(slot);
    }
    self.emit(Instruction::Chpr(info.entry));
    self.load(info.return_slot);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse;
  use crate::tokenizer::tokenize;

  fn listing(source: &str) -> Vec<String> {
    let program = parse(tokenize(source).unwrap()).unwrap();
    generate(&program)
      .unwrap()
      .iter()
      .map(ToString::to_string)
      .collect()
  }

  fn codegen_error(source: &str) -> CompileError {
    let program = parse(tokenize(source).unwrap()).unwrap();
    generate(&program).unwrap_err()
  }

  #[test]
  fn while_loop_listing() {
    let expected = [
      "INPP",
      "AMEM 2",
      "CRCT 1",
      "ARMZ 0 # x",
      "CRCT 2",
      "ARMZ 1 # y",
      "L1: NADA",
      "CRVL 0 # x",
      "CRVL 1 # y",
      "CMME",
      "DSVF L2",
      "CRVL 0 # x",
      "CRCT 1",
      "SOMA",
      "ARMZ 0 # x",
      "DSVS L1",
      "L2: NADA",
      "CRVL 0 # x",
      "IMPR",
      "DSVS LEND_3",
      "LEND_3: NADA",
      "PARA",
    ];
    assert_eq!(
      listing("x=1\ny=2\nwhile x<y:\n    x=x+1\nprint(x)\n"),
      expected
    );
  }

  #[test]
  fn function_call_listing() {
    let source = "def soma(a, b):\n    return a + b\nx = soma(1, 2)\nprint(x)\n";
    let expected = [
      "INPP",
      "AMEM 4",
      "CRCT 1",
      "CRCT 2",
      "ARMZ 1 # b",
      "ARMZ 0 # a",
      "CHPR F_soma_1",
      "CRVL 2 # soma_ret",
      "ARMZ 3 # x",
      "CRVL 3 # x",
      "IMPR",
      "DSVS LEND_3",
      "F_soma_1: NADA",
      "CRCT 0",
      "ARMZ 2 # soma_ret",
      "CRVL 0 # a",
      "CRVL 1 # b",
      "SOMA",
      "ARMZ 2 # soma_ret",
      "DSVS F_soma_END_2",
      "F_soma_END_2: NADA",
      "RTPR",
      "LEND_3: NADA",
      "PARA",
    ];
    assert_eq!(listing(source), expected);
  }

  #[test]
  fn if_else_listing() {
    let source = "x = 1\nif x == 1:\n    print(\"one\")\nelse:\n    print(-x)\n";
    let expected = [
      "INPP",
      "AMEM 1",
      "CRCT 1",
      "ARMZ 0 # x",
      "CRVL 0 # x",
      "CRCT 1",
      "CMIG",
      "DSVF L1",
      "CRCS \"one\"",
      "IMPR",
      "DSVS L2",
      "L1: NADA",
      "CRVL 0 # x",
      "NEGA",
      "IMPR",
      "L2: NADA",
      "DSVS LEND_3",
      "LEND_3: NADA",
      "PARA",
    ];
    assert_eq!(listing(source), expected);
  }

  #[test]
  fn for_range_listing() {
    let source = "for i in range(2, 5):\n    continue\n";
    let expected = [
      "INPP",
      "AMEM 2",
      "CRCT 2",
      "ARMZ 0 # i",
      "CRCT 5",
      "ARMZ 1 # i_limit",
      "L1: NADA",
      "CRVL 0 # i",
      "CRVL 1 # i_limit",
      "CMME",
      "DSVF L2",
      "DSVS L3",
      "L3: NADA",
      "CRVL 0 # i",
      "CRCT 1",
      "SOMA",
      "ARMZ 0 # i",
      "DSVS L1",
      "L2: NADA",
      "DSVS LEND_4",
      "LEND_4: NADA",
      "PARA",
    ];
    assert_eq!(listing(source), expected);
  }

  #[test]
  fn single_argument_range_starts_at_zero() {
    let lines = listing("for i in range(3):\n    print(i)\n");
    assert_eq!(lines[2], "CRCT 0");
    assert_eq!(lines[3], "ARMZ 0 # i");
  }

  #[test]
  fn break_jumps_to_loop_end() {
    let lines = listing("while True:\n    break\n");
    assert_eq!(
      lines[2..7],
      ["L1: NADA", "CRCT 1", "DSVF L2", "DSVS L2", "DSVS L1"]
    );
  }

  #[test]
  fn literals_lower_to_constants() {
    let lines = listing("a = False\nb = 2.0\nc = 'say \"hi\"'\nd = input()\n");
    assert_eq!(lines[2], "CRCT 0");
    assert_eq!(lines[4], "CRCT 2.0");
    assert_eq!(lines[6], "CRCS \"say \\\"hi\\\"\"");
    assert_eq!(lines[8], "LEIT");
  }

  #[test]
  fn operators_map_to_opcodes() {
    let lines = listing("a = 1\nb = a // 2 % 3 != a\n");
    assert_eq!(
      lines[4..11],
      [
        "CRVL 0 # a",
        "CRCT 2",
        "DIVI",
        "CRCT 3",
        "MOD",
        "CRVL 0 # a",
        "CMDG"
      ]
    );
  }

  #[test]
  fn nested_call_arguments_are_stored_after_evaluation() {
    let source = "def f(a, b):\n    return a\nx = f(1, f(2, 3))\n";
    let lines = listing(source);
    let call_start = lines.iter().position(|l| l == "CRCT 1").unwrap();
    assert_eq!(
      lines[call_start..call_start + 10],
      [
        "CRCT 1",
        "CRCT 2",
        "CRCT 3",
        "ARMZ 1 # b",
        "ARMZ 0 # a",
        "CHPR F_f_1",
        "CRVL 2 # f_ret",
        "ARMZ 1 # b",
        "ARMZ 0 # a",
        "CHPR F_f_1",
      ]
    );
  }

  #[test]
  fn sibling_blocks_do_not_share_names() {
    let lines = listing("c = 1\nif c:\n    t = 1\nelse:\n    t = 2\n");
    assert!(lines.contains(&"ARMZ 1 # t".to_string()));
    assert!(lines.contains(&"ARMZ 2 # t".to_string()));
  }

  #[test]
  fn range_with_step_is_not_supported() {
    let err = codegen_error("for i in range(0, 10, 2):\n    print(i)\n");
    assert_eq!(
      err.to_string(),
      "code generation error on line 1: range() with a step is not supported"
    );
  }

  #[test]
  fn non_range_iterable_is_not_supported() {
    let err = codegen_error("x = 1\nfor i in x:\n    print(i)\n");
    assert!(matches!(err, CompileError::Codegen { line: Some(2), .. }));
  }

  #[test]
  fn bare_expression_statement_is_rejected() {
    let err = codegen_error("x = 1\nprint(x)\nx\n");
    assert!(matches!(err, CompileError::Codegen { line: Some(3), .. }));
  }

  #[test]
  fn input_with_arguments_is_rejected() {
    let err = codegen_error("x = input(1)\n");
    assert!(err.to_string().contains("input() does not take arguments"));
  }

  #[test]
  fn print_cannot_be_used_as_a_value() {
    let err = codegen_error("x = print(1)\n");
    assert!(matches!(err, CompileError::Codegen { line: Some(1), .. }));
    assert_eq!(
      err.to_string(),
      "code generation error on line 1: print() cannot be used as a value"
    );
  }

  #[test]
  fn range_outside_for_is_rejected() {
    let err = codegen_error("y = 1\nx = range(3)\n");
    assert!(matches!(err, CompileError::Codegen { line: Some(2), .. }));
    assert_eq!(
      err.to_string(),
      "code generation error on line 2: range() can only be used as a for loop iterable"
    );
  }

  #[test]
  fn chained_call_is_rejected() {
    let err = codegen_error("def f():\n    return 1\nx = f()(1)\n");
    assert!(matches!(err, CompileError::Codegen { line: Some(3), .. }));
    assert_eq!(
      err.to_string(),
      "code generation error on line 3: only named functions can be called"
    );
  }

  #[test]
  fn range_without_arguments_is_rejected() {
    let err = codegen_error("for i in range():\n    print(i)\n");
    assert!(matches!(err, CompileError::Codegen { line: Some(1), .. }));
    assert_eq!(
      err.to_string(),
      "code generation error on line 1: range() expects 1 or 2 arguments, got 0"
    );
  }

  #[test]
  fn input_as_statement_reads_a_value() {
    let lines = listing("input()\n");
    assert_eq!(lines[..3], ["INPP", "AMEM 0", "LEIT"]);
    assert!(lines[3].starts_with("DSVS LEND_"));
  }

  #[test]
  fn backslash_in_string_is_escaped() {
    let lines = listing("print('a\\')\n");
    assert_eq!(lines[2], r#"CRCS "a\\""#);
    assert_eq!(lines[3], "IMPR");
  }

  #[test]
  fn break_outside_loop_is_rejected_without_parser_help() {
    let program = Program {
      statements: vec![Stmt::Break { line: 7 }],
    };
    let err = generate(&program).unwrap_err();
    assert!(matches!(err, CompileError::Codegen { line: Some(7), .. }));
  }

  #[test]
  fn return_outside_function_is_rejected_without_parser_help() {
    let program = Program {
      statements: vec![Stmt::Return {
        value: None,
        line: 2,
      }],
    };
    let err = generate(&program).unwrap_err();
    assert!(err.to_string().contains("'return' outside of a function"));
  }

  #[test]
  fn arity_mismatch_is_rejected_without_analyzer_help() {
    let err = codegen_error("def f(a):\n    return a\nx = f()\n");
    assert!(err.to_string().contains("expects 1 argument(s), got 0"));
  }
}
