//! Code generation: lower the typed AST into MIPS assembly for SPIM.
//!
//! The emitter uses a simple stack machine on `$sp`: every expression leaves
//! its value on the evaluation stack and statements pop what they consume,
//! so the stack is balanced at every statement boundary. Multi-word
//! structure values occupy a contiguous ascending run with the first field
//! at `$sp`. Locals live in the frame and are addressed relative to `$fp`.
//!
//! Frame shape, growing downward:
//!
//! ```text
//!   arg word 1           8($fp)
//!   arg word 0           0($fp)   <- $fp (the caller's $sp at the call)
//!   saved $ra           -4($fp)
//!   saved $fp           -8($fp)
//!   locals              -12($fp) and below
//!   evaluation stack     $sp and up
//! ```
//!
//! Calling convention: argument words are marshalled on the stack in
//! ascending layout order; the first four words also travel in `$a0`-`$a3`
//! and the callee stores them back to their home slots. One-word results
//! return in `$v0`; structure results are copied into a caller-reserved
//! area just above the arguments. Structures are passed and returned by
//! value, word by word.
//!
//! The input is assumed to have passed type checking; an unresolved name or
//! annotation here is a programming defect and panics.

use std::collections::HashMap;

use crate::parser::BinaryOp;
use crate::ty::{Type, WORD_SIZE};
use crate::typechecker::{TypedExp, TypedExpKind, TypedFunction, TypedProgram, TypedStmt};

/// Emit assembly for a whole program. `main` comes first so execution falls
/// into it; it terminates with the SPIM exit syscall instead of returning.
pub fn generate(program: &TypedProgram) -> String {
  let mut gen = CodeGenerator {
    program,
    asm: String::new(),
    labels: 0,
  };
  gen.run();
  gen.asm
}

struct CodeGenerator<'a> {
  program: &'a TypedProgram,
  asm: String,
  /// Per-compilation label counter; never a process-wide global, so label
  /// assignment is reproducible in isolation.
  labels: usize,
}

/// Per-function compilation context, discarded after each function.
struct FrameContext {
  /// Innermost scope last, mapping variable name to its `$fp` offset.
  scopes: Vec<HashMap<String, i32>>,
  /// Bytes of frame consumed below `$fp` so far (saved registers included).
  frame_used: i32,
  /// (head, end) label pairs, one per loop currently entered.
  loop_labels: Vec<(String, String)>,
  /// Total bytes of incoming arguments.
  arg_bytes: i32,
  return_type: Type,
  is_main: bool,
}

impl FrameContext {
  fn lookup(&self, name: &str) -> i32 {
    *self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.get(name))
      .unwrap_or_else(|| panic!("variable \"{name}\" not resolved by the type checker"))
  }
}

impl CodeGenerator<'_> {
  fn run(&mut self) {
    self.asm.push_str(".data\n");
    self.asm.push_str("newline: .asciiz \"\\n\"\n");
    self.asm.push_str(".text\n");
    self.asm.push_str(".globl main\n");

    let main = self
      .program
      .functions
      .iter()
      .find(|function| function.name == "main")
      .expect("entry point enforced by the type checker");
    self.emit_function(main);
    for function in &self.program.functions {
      if function.name != "main" {
        self.emit_function(function);
      }
    }
  }

  // ---- layout -----------------------------------------------------------

  /// Statically computed byte size of a type. Every scalar is one word; a
  /// structure is the sum of its fields in declared order.
  fn type_size(&self, ty: &Type) -> i32 {
    match ty {
      Type::Int | Type::Bool | Type::Pointer(_) | Type::Function(_, _) => WORD_SIZE,
      Type::Void => 0,
      Type::Structure(name) => self
        .fields_of(name)
        .iter()
        .map(|(_, field_ty)| self.type_size(field_ty))
        .sum(),
    }
  }

  /// Byte offset of a field: the running prefix sum of the sizes of the
  /// fields declared before it.
  fn field_offset(&self, owner: &str, field: &str) -> i32 {
    let mut offset = 0;
    for (name, ty) in self.fields_of(owner) {
      if name == field {
        return offset;
      }
      offset += self.type_size(ty);
    }
    panic!("field \"{owner}.{field}\" not resolved by the type checker");
  }

  fn fields_of(&self, name: &str) -> &[(String, Type)] {
    self
      .program
      .structs
      .get(name)
      .unwrap_or_else(|| panic!("structure \"{name}\" not resolved by the type checker"))
  }

  /// Frame bytes needed for every local declared anywhere in the body.
  /// Scopes never overlap in time within one activation, so the flat sum
  /// is conservative and correct.
  fn locals_size(&self, stmt: &TypedStmt) -> i32 {
    match stmt {
      TypedStmt::VariableDeclaration { ty, .. } => self.type_size(ty),
      TypedStmt::If {
        then_branch,
        else_branch,
        ..
      } => self.locals_size(then_branch) + self.locals_size(else_branch),
      TypedStmt::While { body, .. } => self.locals_size(body),
      TypedStmt::Block(stmts) => stmts.iter().map(|stmt| self.locals_size(stmt)).sum(),
      _ => 0,
    }
  }

  // ---- emission plumbing ------------------------------------------------

  fn emit(&mut self, instruction: &str) {
    self.asm.push_str("    ");
    self.asm.push_str(instruction);
    self.asm.push('\n');
  }

  fn emit_label(&mut self, label: &str) {
    self.asm.push_str(label);
    self.asm.push_str(":\n");
  }

  fn fresh_label(&mut self, stem: &str) -> String {
    let label = format!("{stem}_{}", self.labels);
    self.labels += 1;
    label
  }

  fn push_reg(&mut self, reg: &str) {
    self.emit("addiu $sp, $sp, -4");
    self.emit(&format!("sw {reg}, 0($sp)"));
  }

  fn pop_reg(&mut self, reg: &str) {
    self.emit(&format!("lw {reg}, 0($sp)"));
    self.emit("addiu $sp, $sp, 4");
  }

  fn function_label(name: &str) -> String {
    // User functions are prefixed so they can never collide with `main`,
    // generated control-flow labels, or instruction mnemonics.
    if name == "main" {
      "main".to_string()
    } else {
      format!("fn_{name}")
    }
  }

  // ---- functions --------------------------------------------------------

  fn emit_function(&mut self, function: &TypedFunction) {
    let arg_bytes: i32 = function
      .params
      .iter()
      .map(|(ty, _)| self.type_size(ty))
      .sum();
    let frame = 2 * WORD_SIZE + self.locals_size(&function.body);

    self.emit_label(&Self::function_label(&function.name));
    self.emit(&format!("addiu $sp, $sp, -{frame}"));
    self.emit(&format!("sw $ra, {}($sp)", frame - WORD_SIZE));
    self.emit(&format!("sw $fp, {}($sp)", frame - 2 * WORD_SIZE));
    self.emit(&format!("addiu $fp, $sp, {frame}"));

    // Re-home the register-passed argument words.
    let arg_words = arg_bytes / WORD_SIZE;
    for word in 0..arg_words.min(4) {
      self.emit(&format!("sw $a{word}, {}($fp)", word * WORD_SIZE));
    }

    let mut params = HashMap::new();
    let mut offset = 0;
    for (ty, name) in &function.params {
      params.insert(name.clone(), offset);
      offset += self.type_size(ty);
    }

    let mut ctx = FrameContext {
      scopes: vec![params],
      frame_used: 2 * WORD_SIZE,
      loop_labels: Vec::new(),
      arg_bytes,
      return_type: function.return_type.clone(),
      is_main: function.name == "main",
    };

    self.emit_stmt(&function.body, &mut ctx);

    // Implicit return at the end of a void body; a non-void body always
    // returns on every path (enforced by the type checker).
    if function.return_type == Type::Void {
      self.emit_epilogue(&ctx);
    }
  }

  fn emit_epilogue(&mut self, ctx: &FrameContext) {
    if ctx.is_main {
      self.emit("li $v0, 10");
      self.emit("syscall");
      return;
    }

    let ret_size = self.type_size(&ctx.return_type);
    if ret_size == WORD_SIZE {
      self.pop_reg("$v0");
    } else if ret_size > WORD_SIZE {
      // Copy the structure result into the caller-reserved area just
      // above the incoming arguments.
      for word in 0..ret_size / WORD_SIZE {
        self.emit(&format!("lw $t0, {}($sp)", word * WORD_SIZE));
        self.emit(&format!(
          "sw $t0, {}($fp)",
          ctx.arg_bytes + word * WORD_SIZE
        ));
      }
      self.emit(&format!("addiu $sp, $sp, {ret_size}"));
    }

    self.emit("lw $ra, -4($fp)");
    self.emit("lw $t0, -8($fp)");
    self.emit("move $sp, $fp");
    self.emit("move $fp, $t0");
    self.emit("jr $ra");
  }

  // ---- statements -------------------------------------------------------

  fn emit_stmt(&mut self, stmt: &TypedStmt, ctx: &mut FrameContext) {
    match stmt {
      TypedStmt::VariableDeclaration { ty, name, init } => {
        let size = self.type_size(ty);
        ctx.frame_used += size;
        let base = -ctx.frame_used;
        ctx
          .scopes
          .last_mut()
          .expect("no scope open")
          .insert(name.clone(), base);

        self.emit_exp(init, ctx);
        for word in 0..size / WORD_SIZE {
          self.emit(&format!("lw $t0, {}($sp)", word * WORD_SIZE));
          self.emit(&format!("sw $t0, {}($fp)", base + word * WORD_SIZE));
        }
        self.emit(&format!("addiu $sp, $sp, {size}"));
      }
      TypedStmt::Assignment { target, value } => {
        let size = self.type_size(&value.ty);
        self.emit_exp(value, ctx);
        self.emit_addr(target, ctx);
        self.pop_reg("$t1");
        for word in 0..size / WORD_SIZE {
          self.emit(&format!("lw $t0, {}($sp)", word * WORD_SIZE));
          self.emit(&format!("sw $t0, {}($t1)", word * WORD_SIZE));
        }
        self.emit(&format!("addiu $sp, $sp, {size}"));
      }
      TypedStmt::Print(value) => {
        self.emit_exp(value, ctx);
        self.pop_reg("$a0");
        self.emit("li $v0, 1");
        self.emit("syscall");
        self.emit("li $v0, 4");
        self.emit("la $a0, newline");
        self.emit("syscall");
      }
      TypedStmt::If {
        cond,
        then_branch,
        else_branch,
      } => {
        let else_label = self.fresh_label("else");
        let end_label = self.fresh_label("endif");
        self.emit_exp(cond, ctx);
        self.pop_reg("$t0");
        self.emit(&format!("beq $t0, $zero, {else_label}"));
        self.emit_stmt(then_branch, ctx);
        self.emit(&format!("j {end_label}"));
        self.emit_label(&else_label);
        self.emit_stmt(else_branch, ctx);
        self.emit_label(&end_label);
      }
      TypedStmt::While { cond, body } => {
        let head_label = self.fresh_label("while");
        let end_label = self.fresh_label("endwhile");
        self.emit_label(&head_label);
        self.emit_exp(cond, ctx);
        self.pop_reg("$t0");
        self.emit(&format!("beq $t0, $zero, {end_label}"));
        ctx.loop_labels.push((head_label.clone(), end_label.clone()));
        self.emit_stmt(body, ctx);
        ctx.loop_labels.pop();
        self.emit(&format!("j {head_label}"));
        self.emit_label(&end_label);
      }
      TypedStmt::Break => {
        // The evaluation stack is empty at statement boundaries, so a
        // plain jump is safe.
        let (_, end_label) = ctx
          .loop_labels
          .last()
          .expect("break outside a loop passed the type checker")
          .clone();
        self.emit(&format!("j {end_label}"));
      }
      TypedStmt::Continue => {
        let (head_label, _) = ctx
          .loop_labels
          .last()
          .expect("continue outside a loop passed the type checker")
          .clone();
        self.emit(&format!("j {head_label}"));
      }
      TypedStmt::Return(value) => {
        if let Some(value) = value {
          self.emit_exp(value, ctx);
        }
        self.emit_epilogue(ctx);
      }
      TypedStmt::ExpStmt(exp) => {
        self.emit_exp(exp, ctx);
        let size = self.type_size(&exp.ty);
        if size > 0 {
          self.emit(&format!("addiu $sp, $sp, {size}"));
        }
      }
      TypedStmt::Block(stmts) => {
        ctx.scopes.push(HashMap::new());
        for stmt in stmts {
          self.emit_stmt(stmt, ctx);
        }
        ctx.scopes.pop();
      }
    }
  }

  // ---- expressions ------------------------------------------------------

  /// Emit code leaving the expression's value on the evaluation stack.
  fn emit_exp(&mut self, exp: &TypedExp, ctx: &mut FrameContext) {
    match &exp.kind {
      TypedExpKind::IntLiteral(value) => {
        self.emit(&format!("li $t0, {value}"));
        self.push_reg("$t0");
      }
      TypedExpKind::BoolLiteral(value) => {
        self.emit(&format!("li $t0, {}", i32::from(*value)));
        self.push_reg("$t0");
      }
      TypedExpKind::Variable(name) => {
        let offset = ctx.lookup(name);
        let size = self.type_size(&exp.ty);
        self.emit(&format!("addiu $sp, $sp, -{size}"));
        for word in 0..size / WORD_SIZE {
          self.emit(&format!("lw $t0, {}($fp)", offset + word * WORD_SIZE));
          self.emit(&format!("sw $t0, {}($sp)", word * WORD_SIZE));
        }
      }
      TypedExpKind::Binary { op, lhs, rhs } => {
        self.emit_binary(*op, lhs, rhs, ctx);
      }
      TypedExpKind::FieldAccess { owner, base, field } => {
        // Evaluate the whole base value, then slide the selected field
        // down to the top of the stack.
        self.emit_exp(base, ctx);
        let base_size = self.type_size(&base.ty);
        let field_size = self.type_size(&exp.ty);
        let offset = self.field_offset(owner, field);
        let shift = base_size - field_size;
        if shift > 0 {
          // Descending copy: the destination sits above the source, so
          // overlapping runs stay intact.
          for word in (0..field_size / WORD_SIZE).rev() {
            self.emit(&format!("lw $t0, {}($sp)", offset + word * WORD_SIZE));
            self.emit(&format!("sw $t0, {}($sp)", shift + word * WORD_SIZE));
          }
          self.emit(&format!("addiu $sp, $sp, {shift}"));
        }
      }
      TypedExpKind::MakeStructure { args, .. } => {
        // Arguments are evaluated in reverse so the first field lands at
        // the lowest address, matching the ascending field layout.
        for arg in args.iter().rev() {
          self.emit_exp(arg, ctx);
        }
      }
      TypedExpKind::DirectCall { name, args } => {
        self.emit_call(Some(name), None, args, &exp.ty, ctx);
      }
      TypedExpKind::IndirectCall { callee, args } => {
        self.emit_call(None, Some(callee), args, &exp.ty, ctx);
      }
      TypedExpKind::AddressOf(operand) => {
        self.emit_addr(operand, ctx);
      }
      TypedExpKind::FunctionAddress(name) => {
        self.emit(&format!("la $t0, {}", Self::function_label(name)));
        self.push_reg("$t0");
      }
      TypedExpKind::Dereference(operand) => {
        self.emit_exp(operand, ctx);
        self.pop_reg("$t1");
        let size = self.type_size(&exp.ty);
        self.emit(&format!("addiu $sp, $sp, -{size}"));
        for word in 0..size / WORD_SIZE {
          self.emit(&format!("lw $t0, {}($t1)", word * WORD_SIZE));
          self.emit(&format!("sw $t0, {}($sp)", word * WORD_SIZE));
        }
      }
      TypedExpKind::Cast(operand) => {
        // Pointer reinterpretation: the word on the stack is unchanged.
        self.emit_exp(operand, ctx);
      }
      TypedExpKind::SizeOf(ty) => {
        let size = self.type_size(ty);
        self.emit(&format!("li $t0, {size}"));
        self.push_reg("$t0");
      }
      TypedExpKind::Malloc(size) => {
        self.emit_exp(size, ctx);
        self.pop_reg("$a0");
        self.emit("li $v0, 9");
        self.emit("syscall");
        self.push_reg("$v0");
      }
    }
  }

  fn emit_binary(&mut self, op: BinaryOp, lhs: &TypedExp, rhs: &TypedExp, ctx: &mut FrameContext) {
    let operand_size = self.type_size(&lhs.ty);
    self.emit_exp(lhs, ctx);
    self.emit_exp(rhs, ctx);

    if operand_size > WORD_SIZE {
      // Equality is the only operator typed for composite operands:
      // word-wise comparison folded with `and`.
      let words = operand_size / WORD_SIZE;
      self.emit("li $t0, 1");
      for word in 0..words {
        self.emit(&format!("lw $t1, {}($sp)", word * WORD_SIZE));
        self.emit(&format!("lw $t2, {}($sp)", operand_size + word * WORD_SIZE));
        self.emit("xor $t1, $t1, $t2");
        self.emit("sltiu $t1, $t1, 1");
        self.emit("and $t0, $t0, $t1");
      }
      self.emit(&format!("addiu $sp, $sp, {}", 2 * operand_size));
      self.push_reg("$t0");
      return;
    }

    self.pop_reg("$t1");
    self.pop_reg("$t0");
    match op {
      BinaryOp::Add => self.emit("addu $t0, $t0, $t1"),
      BinaryOp::Sub => self.emit("subu $t0, $t0, $t1"),
      BinaryOp::Mul => self.emit("mul $t0, $t0, $t1"),
      BinaryOp::Div => {
        self.emit("div $t0, $t1");
        self.emit("mflo $t0");
      }
      BinaryOp::Equals => {
        self.emit("xor $t0, $t0, $t1");
        self.emit("sltiu $t0, $t0, 1");
      }
      BinaryOp::LessThan => self.emit("slt $t0, $t0, $t1"),
    }
    self.push_reg("$t0");
  }

  /// Shared call sequence. The stack at the call instruction, top first:
  /// argument words in ascending layout order, then the caller-reserved
  /// structure-result area (if the return type is a structure).
  fn emit_call(
    &mut self,
    direct: Option<&str>,
    indirect: Option<&TypedExp>,
    args: &[TypedExp],
    return_type: &Type,
    ctx: &mut FrameContext,
  ) {
    let ret_size = self.type_size(return_type);
    let arg_bytes: i32 = args.iter().map(|arg| self.type_size(&arg.ty)).sum();

    if ret_size > WORD_SIZE {
      self.emit(&format!("addiu $sp, $sp, -{ret_size}"));
    }
    for arg in args.iter().rev() {
      self.emit_exp(arg, ctx);
    }
    if let Some(callee) = indirect {
      self.emit_exp(callee, ctx);
      self.pop_reg("$t9");
    }

    let arg_words = arg_bytes / WORD_SIZE;
    for word in 0..arg_words.min(4) {
      self.emit(&format!("lw $a{word}, {}($sp)", word * WORD_SIZE));
    }

    if let Some(name) = direct {
      self.emit(&format!("jal {}", Self::function_label(name)));
    } else {
      self.emit("jalr $t9");
    }

    if arg_bytes > 0 {
      self.emit(&format!("addiu $sp, $sp, {arg_bytes}"));
    }
    if ret_size == WORD_SIZE {
      self.push_reg("$v0");
    }
    // A structure result now sits on top of the stack; void leaves nothing.
  }

  // ---- lvalue addresses -------------------------------------------------

  /// Emit code leaving the address of an lvalue on the evaluation stack.
  fn emit_addr(&mut self, exp: &TypedExp, ctx: &mut FrameContext) {
    match &exp.kind {
      TypedExpKind::Variable(name) => {
        let offset = ctx.lookup(name);
        self.emit(&format!("addiu $t0, $fp, {offset}"));
        self.push_reg("$t0");
      }
      TypedExpKind::FieldAccess { owner, base, field } => {
        self.emit_addr(base, ctx);
        self.pop_reg("$t0");
        self.emit(&format!("addiu $t0, $t0, {}", self.field_offset(owner, field)));
        self.push_reg("$t0");
      }
      TypedExpKind::Dereference(operand) => {
        // The pointer's value is the address.
        self.emit_exp(operand, ctx);
      }
      other => panic!("address of non-lvalue {other:?} passed the type checker"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse;
  use crate::tokenizer::tokenize;
  use crate::typechecker::typecheck;

  fn compile(source: &str) -> String {
    generate(&typecheck(parse(tokenize(source).unwrap()).unwrap()).unwrap())
  }

  #[test]
  fn main_is_emitted_first_and_exits() {
    let asm = compile("int foo() { return 1; } void main() { print(foo()); }");
    let main_pos = asm.find("main:").unwrap();
    let foo_pos = asm.find("fn_foo:").unwrap();
    assert!(main_pos < foo_pos);
    assert!(asm.contains("li $v0, 10"));
  }

  #[test]
  fn print_uses_the_integer_syscall_and_newline() {
    let asm = compile("void main() { print(5); }");
    assert!(asm.contains("li $v0, 1"));
    assert!(asm.contains("la $a0, newline"));
    assert!(asm.contains("newline: .asciiz"));
  }

  #[test]
  fn sizeof_is_a_static_constant() {
    let asm = compile(
      "struct Bar { int x; int y; } ; struct Foo { Bar b; int z; }; \
       void main() { print(sizeof(Foo)); }",
    );
    assert!(asm.contains("li $t0, 12"));
  }

  #[test]
  fn direct_call_uses_jal_and_prefixed_label() {
    let asm = compile("int add(int x, int y) { return x + y; } void main() { print(add(1, 2)); }");
    assert!(asm.contains("jal fn_add"));
    assert!(asm.contains("fn_add:"));
  }

  #[test]
  fn indirect_call_uses_jalr() {
    let asm = compile(
      "int one() { return 1; } \
       void main() { () => int f = &one; print(f()); }",
    );
    assert!(asm.contains("la $t0, fn_one"));
    assert!(asm.contains("jalr $t9"));
  }

  #[test]
  fn control_flow_labels_are_unique() {
    let asm = compile(
      "void main() { \
         if (true) { print(1); } else { print(2); } \
         if (false) { print(3); } else { print(4); } \
       }",
    );
    assert_eq!(asm.matches("else_0:").count(), 1);
    assert_eq!(asm.matches("else_2:").count(), 1);
  }

  #[test]
  fn nested_loops_break_to_the_inner_end() {
    let asm = compile(
      "void main() { \
         while (true) { \
           while (true) { break; } \
           break; \
         } \
       }",
    );
    // Outer loop takes while_0/endwhile_1, inner takes while_2/endwhile_3.
    let inner_break = asm.find("j endwhile_3").unwrap();
    let outer_break = asm.rfind("j endwhile_1").unwrap();
    assert!(inner_break < outer_break);
  }

  #[test]
  fn malloc_uses_sbrk() {
    let asm = compile("void main() { int* p = (int*)malloc(4); print(*p); }");
    assert!(asm.contains("li $v0, 9"));
  }

  #[test]
  fn struct_return_reserves_caller_space() {
    let asm = compile(
      "struct TwoInts { int x; int y; }; \
       TwoInts pair() { return TwoInts(1, 2); } \
       void main() { print(pair().x); }",
    );
    // Caller reserves eight bytes for the structure result.
    assert!(asm.contains("addiu $sp, $sp, -8"));
  }

  #[test]
  fn register_arguments_are_rehomed_in_the_prologue() {
    let asm = compile("int add(int x, int y) { return x + y; } void main() { print(add(1, 2)); }");
    assert!(asm.contains("sw $a0, 0($fp)"));
    assert!(asm.contains("sw $a1, 4($fp)"));
  }
}
