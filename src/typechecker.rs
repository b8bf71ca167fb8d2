//! Static type checking: resolve every expression's type and produce an
//! annotated program for code generation.
//!
//! The checker never mutates the parse tree. It returns a distinct typed
//! AST in which every expression carries its resolved type, field accesses
//! carry the name of the structure that owns the field (the layout
//! resolution the code generator depends on), and the parser's ambiguous
//! `name(args)` form is split into structure construction, direct call, or
//! indirect call. The first violation aborts checking.

use std::collections::{HashMap, HashSet};

use crate::error::{CompileError, CompileResult};
use crate::parser::{BinaryOp, Exp, FunctionDefinition, Program, Stmt};
use crate::ty::Type;

/// Ordered field lists per structure; order is layout-significant.
pub type StructTable = HashMap<String, Vec<(String, Type)>>;

#[derive(Debug, Clone)]
pub struct TypedExp {
  pub ty: Type,
  pub kind: TypedExpKind,
}

#[derive(Debug, Clone)]
pub enum TypedExpKind {
  IntLiteral(i32),
  BoolLiteral(bool),
  Variable(String),
  Binary {
    op: BinaryOp,
    lhs: Box<TypedExp>,
    rhs: Box<TypedExp>,
  },
  FieldAccess {
    /// Name of the structure type that owns the accessed field.
    owner: String,
    base: Box<TypedExp>,
    field: String,
  },
  MakeStructure {
    name: String,
    args: Vec<TypedExp>,
  },
  DirectCall {
    name: String,
    args: Vec<TypedExp>,
  },
  IndirectCall {
    callee: Box<TypedExp>,
    args: Vec<TypedExp>,
  },
  AddressOf(Box<TypedExp>),
  /// A named function used as a value; its type is the function's own
  /// `Function` type and its runtime value is the label's address.
  FunctionAddress(String),
  Dereference(Box<TypedExp>),
  Cast(Box<TypedExp>),
  SizeOf(Type),
  Malloc(Box<TypedExp>),
}

#[derive(Debug, Clone)]
pub enum TypedStmt {
  VariableDeclaration {
    ty: Type,
    name: String,
    init: TypedExp,
  },
  Assignment {
    target: TypedExp,
    value: TypedExp,
  },
  Print(TypedExp),
  If {
    cond: TypedExp,
    then_branch: Box<TypedStmt>,
    else_branch: Box<TypedStmt>,
  },
  While {
    cond: TypedExp,
    body: Box<TypedStmt>,
  },
  Break,
  Continue,
  Return(Option<TypedExp>),
  ExpStmt(TypedExp),
  Block(Vec<TypedStmt>),
}

#[derive(Debug, Clone)]
pub struct TypedFunction {
  pub return_type: Type,
  pub name: String,
  pub params: Vec<(Type, String)>,
  pub body: TypedStmt,
}

#[derive(Debug, Clone)]
pub struct TypedProgram {
  pub structs: StructTable,
  pub functions: Vec<TypedFunction>,
}

/// Type check a whole program. The entry point must be `void main()` with
/// no parameters.
pub fn typecheck(program: Program) -> CompileResult<TypedProgram> {
  let mut checker = Typechecker::new(&program)?;
  checker.check_entry_point()?;

  let mut functions = Vec::with_capacity(program.functions.len());
  for function in &program.functions {
    functions.push(checker.check_function(function)?);
  }

  Ok(TypedProgram {
    structs: checker.structs,
    functions,
  })
}

struct Typechecker {
  structs: StructTable,
  functions: HashMap<String, (Vec<Type>, Type)>,
  /// Innermost scope last; declarations shadow outer ones.
  scopes: Vec<HashMap<String, Type>>,
  current_return: Type,
  loop_depth: usize,
}

impl Typechecker {
  /// Build the structure-layout and function-signature tables in one pass
  /// over the top level, rejecting duplicates, unknown type names, and
  /// structures containing themselves by value.
  fn new(program: &Program) -> CompileResult<Self> {
    let mut structs: StructTable = HashMap::new();
    for declaration in &program.structs {
      let mut seen = HashSet::new();
      for (field, _) in &declaration.fields {
        if !seen.insert(field.clone()) {
          return Err(CompileError::type_error(format!(
            "duplicate field \"{field}\" in structure \"{}\"",
            declaration.name
          )));
        }
      }
      if structs
        .insert(declaration.name.clone(), declaration.fields.clone())
        .is_some()
      {
        return Err(CompileError::type_error(format!(
          "duplicate structure \"{}\"",
          declaration.name
        )));
      }
    }

    let mut functions = HashMap::new();
    for function in &program.functions {
      let params: Vec<Type> = function.params.iter().map(|(ty, _)| ty.clone()).collect();
      if functions
        .insert(
          function.name.clone(),
          (params, function.return_type.clone()),
        )
        .is_some()
      {
        return Err(CompileError::type_error(format!(
          "duplicate function \"{}\"",
          function.name
        )));
      }
    }

    let checker = Self {
      structs,
      functions,
      scopes: Vec::new(),
      current_return: Type::Void,
      loop_depth: 0,
    };

    for declaration in &program.structs {
      for (field, ty) in &declaration.fields {
        checker.check_type_known(ty).map_err(|_| {
          CompileError::type_error(format!(
            "field \"{field}\" of structure \"{}\" has unknown type {ty}",
            declaration.name
          ))
        })?;
      }
      checker.check_no_value_cycle(&declaration.name, &mut HashSet::new())?;
    }
    for function in &program.functions {
      checker.check_type_known(&function.return_type)?;
      let mut seen = HashSet::new();
      for (ty, name) in &function.params {
        checker.check_type_known(ty)?;
        if !seen.insert(name.clone()) {
          return Err(CompileError::type_error(format!(
            "duplicate parameter \"{name}\" in function \"{}\"",
            function.name
          )));
        }
      }
    }

    Ok(checker)
  }

  fn check_entry_point(&self) -> CompileResult<()> {
    match self.functions.get("main") {
      Some((params, ret)) if params.is_empty() && *ret == Type::Void => Ok(()),
      Some(_) => Err(CompileError::type_error(
        "entry point \"main\" must be declared as void main()",
      )),
      None => Err(CompileError::type_error("missing entry point \"main\"")),
    }
  }

  /// Every structure name mentioned in a type must be declared.
  fn check_type_known(&self, ty: &Type) -> CompileResult<()> {
    match ty {
      Type::Int | Type::Bool | Type::Void => Ok(()),
      Type::Pointer(base) => self.check_type_known(base),
      Type::Structure(name) => {
        if self.structs.contains_key(name) {
          Ok(())
        } else {
          Err(CompileError::type_error(format!(
            "unknown structure \"{name}\""
          )))
        }
      }
      Type::Function(params, ret) => {
        for param in params {
          self.check_type_known(param)?;
        }
        self.check_type_known(ret)
      }
    }
  }

  /// A structure may not contain itself by value, directly or transitively;
  /// such a layout would have infinite size. Containment through a pointer
  /// is fine.
  fn check_no_value_cycle(&self, name: &str, visiting: &mut HashSet<String>) -> CompileResult<()> {
    if !visiting.insert(name.to_string()) {
      return Err(CompileError::type_error(format!(
        "structure \"{name}\" contains itself"
      )));
    }
    if let Some(fields) = self.structs.get(name) {
      for (_, ty) in fields {
        if let Type::Structure(inner) = ty {
          self.check_no_value_cycle(inner, visiting)?;
        }
      }
    }
    visiting.remove(name);
    Ok(())
  }

  fn check_function(&mut self, function: &FunctionDefinition) -> CompileResult<TypedFunction> {
    self.current_return = function.return_type.clone();
    self.loop_depth = 0;
    self.scopes.clear();

    let mut params = HashMap::new();
    for (ty, name) in &function.params {
      params.insert(name.clone(), ty.clone());
    }
    self.scopes.push(params);

    let body = self.check_stmt(&function.body)?;
    self.scopes.pop();

    if function.return_type != Type::Void && !always_returns(&body) {
      return Err(CompileError::type_error(format!(
        "function \"{}\" may finish without returning a value",
        function.name
      )));
    }

    Ok(TypedFunction {
      return_type: function.return_type.clone(),
      name: function.name.clone(),
      params: function.params.clone(),
      body,
    })
  }

  fn lookup_variable(&self, name: &str) -> Option<&Type> {
    self.scopes.iter().rev().find_map(|scope| scope.get(name))
  }

  fn check_stmt(&mut self, stmt: &Stmt) -> CompileResult<TypedStmt> {
    match stmt {
      Stmt::VariableDeclaration { ty, name, init } => {
        self.check_type_known(ty)?;
        if *ty == Type::Void {
          return Err(CompileError::type_error(format!(
            "cannot declare variable \"{name}\" of type void"
          )));
        }
        let init = self.check_exp(init)?;
        if init.ty != *ty {
          return Err(CompileError::type_error(format!(
            "variable \"{name}\" declared as {ty} but initialized with {}",
            init.ty
          )));
        }
        let scope = self
          .scopes
          .last_mut()
          .expect("declaration outside any scope");
        if scope.insert(name.clone(), ty.clone()).is_some() {
          return Err(CompileError::type_error(format!(
            "variable \"{name}\" already declared in this scope"
          )));
        }
        Ok(TypedStmt::VariableDeclaration {
          ty: ty.clone(),
          name: name.clone(),
          init,
        })
      }
      Stmt::Assignment { target, value } => {
        if !is_lvalue(target) {
          return Err(CompileError::type_error(
            "left side of assignment is not an lvalue",
          ));
        }
        let target = self.check_exp(target)?;
        let value = self.check_exp(value)?;
        if target.ty != value.ty {
          return Err(CompileError::type_error(format!(
            "cannot assign {} to a location of type {}",
            value.ty, target.ty
          )));
        }
        Ok(TypedStmt::Assignment { target, value })
      }
      Stmt::Print(value) => {
        let value = self.check_exp(value)?;
        if value.ty != Type::Int && value.ty != Type::Bool {
          return Err(CompileError::type_error(format!(
            "print takes int or bool, got {}",
            value.ty
          )));
        }
        Ok(TypedStmt::Print(value))
      }
      Stmt::If {
        cond,
        then_branch,
        else_branch,
      } => {
        let cond = self.check_condition(cond, "if")?;
        let then_branch = self.check_stmt(then_branch)?;
        let else_branch = self.check_stmt(else_branch)?;
        Ok(TypedStmt::If {
          cond,
          then_branch: Box::new(then_branch),
          else_branch: Box::new(else_branch),
        })
      }
      Stmt::While { cond, body } => {
        let cond = self.check_condition(cond, "while")?;
        self.loop_depth += 1;
        let body = self.check_stmt(body)?;
        self.loop_depth -= 1;
        Ok(TypedStmt::While {
          cond,
          body: Box::new(body),
        })
      }
      Stmt::Break => {
        if self.loop_depth == 0 {
          return Err(CompileError::type_error("break outside of a loop"));
        }
        Ok(TypedStmt::Break)
      }
      Stmt::Continue => {
        if self.loop_depth == 0 {
          return Err(CompileError::type_error("continue outside of a loop"));
        }
        Ok(TypedStmt::Continue)
      }
      Stmt::Return(None) => {
        if self.current_return != Type::Void {
          return Err(CompileError::type_error(format!(
            "return without a value in a function returning {}",
            self.current_return
          )));
        }
        Ok(TypedStmt::Return(None))
      }
      Stmt::Return(Some(value)) => {
        let value = self.check_exp(value)?;
        if value.ty != self.current_return {
          return Err(CompileError::type_error(format!(
            "returning {} from a function returning {}",
            value.ty, self.current_return
          )));
        }
        Ok(TypedStmt::Return(Some(value)))
      }
      Stmt::ExpStmt(exp) => {
        let exp = self.check_exp(exp)?;
        if !matches!(
          exp.kind,
          TypedExpKind::DirectCall { .. } | TypedExpKind::IndirectCall { .. }
        ) {
          return Err(CompileError::type_error(
            "only function calls may be used as statements",
          ));
        }
        Ok(TypedStmt::ExpStmt(exp))
      }
      Stmt::Block(stmts) => {
        self.scopes.push(HashMap::new());
        let mut typed = Vec::with_capacity(stmts.len());
        for stmt in stmts {
          typed.push(self.check_stmt(stmt)?);
        }
        self.scopes.pop();
        Ok(TypedStmt::Block(typed))
      }
    }
  }

  fn check_condition(&mut self, cond: &Exp, construct: &str) -> CompileResult<TypedExp> {
    let cond = self.check_exp(cond)?;
    if cond.ty != Type::Bool {
      return Err(CompileError::type_error(format!(
        "{construct} condition must be bool, got {}",
        cond.ty
      )));
    }
    Ok(cond)
  }

  fn check_exp(&mut self, exp: &Exp) -> CompileResult<TypedExp> {
    match exp {
      Exp::IntLiteral(value) => Ok(TypedExp {
        ty: Type::Int,
        kind: TypedExpKind::IntLiteral(*value),
      }),
      Exp::BoolLiteral(value) => Ok(TypedExp {
        ty: Type::Bool,
        kind: TypedExpKind::BoolLiteral(*value),
      }),
      Exp::Variable(name) => match self.lookup_variable(name) {
        Some(ty) => Ok(TypedExp {
          ty: ty.clone(),
          kind: TypedExpKind::Variable(name.clone()),
        }),
        None => Err(CompileError::type_error(format!(
          "undeclared variable \"{name}\""
        ))),
      },
      Exp::Binary { op, lhs, rhs } => self.check_binary(*op, lhs, rhs),
      Exp::FieldAccess { base, field } => {
        let base = self.check_exp(base)?;
        let Type::Structure(owner) = base.ty.clone() else {
          return Err(CompileError::type_error(format!(
            "field access on non-structure type {}",
            base.ty
          )));
        };
        let fields = self
          .structs
          .get(&owner)
          .expect("structure type not in table");
        let Some((_, field_ty)) = fields.iter().find(|(name, _)| name == field) else {
          return Err(CompileError::type_error(format!(
            "structure \"{owner}\" has no field \"{field}\""
          )));
        };
        Ok(TypedExp {
          ty: field_ty.clone(),
          kind: TypedExpKind::FieldAccess {
            owner,
            base: Box::new(base),
            field: field.clone(),
          },
        })
      }
      Exp::Call { name, args } => self.check_call(name, args),
      Exp::AddressOf(operand) => self.check_address_of(operand),
      Exp::Dereference(operand) => {
        let operand = self.check_exp(operand)?;
        match operand.ty.clone() {
          Type::Pointer(base) if *base != Type::Void => Ok(TypedExp {
            ty: *base,
            kind: TypedExpKind::Dereference(Box::new(operand)),
          }),
          Type::Pointer(_) => Err(CompileError::type_error(
            "cannot dereference a void pointer; cast it first",
          )),
          other => Err(CompileError::type_error(format!(
            "cannot dereference non-pointer type {other}"
          ))),
        }
      }
      Exp::Cast { to, exp } => {
        self.check_type_known(to)?;
        let exp = self.check_exp(exp)?;
        if !to.is_pointer() || !exp.ty.is_pointer() {
          return Err(CompileError::type_error(format!(
            "casts reinterpret pointers only; cannot cast {} to {to}",
            exp.ty
          )));
        }
        Ok(TypedExp {
          ty: to.clone(),
          kind: TypedExpKind::Cast(Box::new(exp)),
        })
      }
      Exp::SizeOf(ty) => {
        self.check_type_known(ty)?;
        Ok(TypedExp {
          ty: Type::Int,
          kind: TypedExpKind::SizeOf(ty.clone()),
        })
      }
      Exp::Malloc(size) => {
        let size = self.check_exp(size)?;
        if size.ty != Type::Int {
          return Err(CompileError::type_error(format!(
            "malloc takes an int size, got {}",
            size.ty
          )));
        }
        Ok(TypedExp {
          ty: Type::pointer_to(Type::Void),
          kind: TypedExpKind::Malloc(Box::new(size)),
        })
      }
    }
  }

  fn check_binary(&mut self, op: BinaryOp, lhs: &Exp, rhs: &Exp) -> CompileResult<TypedExp> {
    let lhs = self.check_exp(lhs)?;
    let rhs = self.check_exp(rhs)?;

    let ty = match op {
      BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
        if lhs.ty != Type::Int || rhs.ty != Type::Int {
          return Err(CompileError::type_error(format!(
            "arithmetic requires int operands, got {} and {}",
            lhs.ty, rhs.ty
          )));
        }
        Type::Int
      }
      BinaryOp::LessThan => {
        if lhs.ty != Type::Int || rhs.ty != Type::Int {
          return Err(CompileError::type_error(format!(
            "comparison requires int operands, got {} and {}",
            lhs.ty, rhs.ty
          )));
        }
        Type::Bool
      }
      BinaryOp::Equals => {
        if lhs.ty != rhs.ty {
          return Err(CompileError::type_error(format!(
            "equality requires operands of the same type, got {} and {}",
            lhs.ty, rhs.ty
          )));
        }
        // No values of type void exist, so there is nothing to compare.
        if lhs.ty == Type::Void {
          return Err(CompileError::type_error(
            "equality cannot compare void expressions",
          ));
        }
        Type::Bool
      }
    };

    Ok(TypedExp {
      ty,
      kind: TypedExpKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
      },
    })
  }

  /// `name(args)` resolves against the structure namespace first, then
  /// lexical variables (indirect call), then declared functions.
  fn check_call(&mut self, name: &str, args: &[Exp]) -> CompileResult<TypedExp> {
    let mut typed_args = Vec::with_capacity(args.len());
    for arg in args {
      typed_args.push(self.check_exp(arg)?);
    }

    if let Some(fields) = self.structs.get(name).cloned() {
      if typed_args.len() != fields.len() {
        return Err(CompileError::type_error(format!(
          "structure \"{name}\" has {} fields but was constructed with {} arguments",
          fields.len(),
          typed_args.len()
        )));
      }
      for ((field, field_ty), arg) in fields.iter().zip(&typed_args) {
        if arg.ty != *field_ty {
          return Err(CompileError::type_error(format!(
            "field \"{field}\" of structure \"{name}\" is {field_ty}, got {}",
            arg.ty
          )));
        }
      }
      return Ok(TypedExp {
        ty: Type::Structure(name.to_string()),
        kind: TypedExpKind::MakeStructure {
          name: name.to_string(),
          args: typed_args,
        },
      });
    }

    if let Some(var_ty) = self.lookup_variable(name).cloned() {
      return match var_ty {
        Type::Function(params, ret) => {
          self.check_arguments(name, &params, &typed_args)?;
          let callee = TypedExp {
            ty: Type::Function(params, ret.clone()),
            kind: TypedExpKind::Variable(name.to_string()),
          };
          Ok(TypedExp {
            ty: *ret,
            kind: TypedExpKind::IndirectCall {
              callee: Box::new(callee),
              args: typed_args,
            },
          })
        }
        other => Err(CompileError::type_error(format!(
          "variable \"{name}\" of type {other} is not callable"
        ))),
      };
    }

    if let Some((params, ret)) = self.functions.get(name).cloned() {
      self.check_arguments(name, &params, &typed_args)?;
      return Ok(TypedExp {
        ty: ret,
        kind: TypedExpKind::DirectCall {
          name: name.to_string(),
          args: typed_args,
        },
      });
    }

    Err(CompileError::type_error(format!(
      "undeclared function or structure \"{name}\""
    )))
  }

  fn check_arguments(
    &self,
    name: &str,
    params: &[Type],
    args: &[TypedExp],
  ) -> CompileResult<()> {
    if params.len() != args.len() {
      return Err(CompileError::type_error(format!(
        "\"{name}\" takes {} arguments but was given {}",
        params.len(),
        args.len()
      )));
    }
    for (index, (param, arg)) in params.iter().zip(args).enumerate() {
      if arg.ty != *param {
        return Err(CompileError::type_error(format!(
          "argument {} of \"{name}\" must be {param}, got {}",
          index + 1,
          arg.ty
        )));
      }
    }
    Ok(())
  }

  /// `&e` takes the address of an lvalue, or names a function: a function
  /// value is the address of its label, typed as the function's own type.
  fn check_address_of(&mut self, operand: &Exp) -> CompileResult<TypedExp> {
    if let Exp::Variable(name) = operand {
      if self.lookup_variable(name).is_none() {
        if let Some((params, ret)) = self.functions.get(name).cloned() {
          return Ok(TypedExp {
            ty: Type::Function(params, Box::new(ret)),
            kind: TypedExpKind::FunctionAddress(name.clone()),
          });
        }
      }
    }

    if !is_lvalue(operand) {
      return Err(CompileError::type_error(
        "address-of requires an lvalue (variable, field access, or dereference)",
      ));
    }
    let operand = self.check_exp(operand)?;
    Ok(TypedExp {
      ty: Type::pointer_to(operand.ty.clone()),
      kind: TypedExpKind::AddressOf(Box::new(operand)),
    })
  }
}

/// An lvalue denotes a storage location: a variable, a field access whose
/// base is itself an lvalue, or any dereference.
fn is_lvalue(exp: &Exp) -> bool {
  match exp {
    Exp::Variable(_) => true,
    Exp::FieldAccess { base, .. } => is_lvalue(base),
    Exp::Dereference(_) => true,
    _ => false,
  }
}

/// Conservative path coverage: a statement "always returns" if every path
/// through it ends in a return.
fn always_returns(stmt: &TypedStmt) -> bool {
  match stmt {
    TypedStmt::Return(_) => true,
    TypedStmt::If {
      then_branch,
      else_branch,
      ..
    } => always_returns(then_branch) && always_returns(else_branch),
    TypedStmt::Block(stmts) => stmts.iter().any(always_returns),
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse;
  use crate::tokenizer::tokenize;

  fn check(source: &str) -> CompileResult<TypedProgram> {
    typecheck(parse(tokenize(source).unwrap()).unwrap())
  }

  fn check_err(source: &str) -> String {
    check(source).unwrap_err().to_string()
  }

  #[test]
  fn accepts_a_minimal_program() {
    check("void main() { print(2 + 3); }").unwrap();
  }

  #[test]
  fn rejects_equality_across_types() {
    let err = check_err("void main() { print(1 == true); }");
    assert!(err.contains("same type"));
  }

  #[test]
  fn rejects_void_equality() {
    let err = check_err("void f() { } void main() { print(f() == f()); }");
    assert!(err.contains("void"));
  }

  #[test]
  fn rejects_bool_initializer_for_int() {
    let err = check_err("void main() { int x = true; }");
    assert!(err.contains("declared as int"));
  }

  #[test]
  fn rejects_unknown_field() {
    let err = check_err(
      "struct Foo { int x; }; void main() { print(Foo(1).y); }",
    );
    assert!(err.contains("no field \"y\""));
  }

  #[test]
  fn rejects_undeclared_variable() {
    let err = check_err("void main() { print(x); }");
    assert!(err.contains("undeclared variable"));
  }

  #[test]
  fn rejects_break_outside_loop() {
    let err = check_err("void main() { break; }");
    assert!(err.contains("break outside"));
  }

  #[test]
  fn rejects_self_containing_structure() {
    let err = check_err("struct Foo { Foo f; }; void main() { print(1); }");
    assert!(err.contains("contains itself"));
  }

  #[test]
  fn rejects_transitive_structure_cycle() {
    let err = check_err(
      "struct A { B b; }; struct B { A a; }; void main() { print(1); }",
    );
    assert!(err.contains("contains itself"));
  }

  #[test]
  fn pointer_to_own_structure_is_fine() {
    check("struct Node { int value; Node* next; }; void main() { print(1); }").unwrap();
  }

  #[test]
  fn rejects_missing_return_path() {
    let err = check_err("int foo() { if (true) { return 1; } } void main() { print(foo()); }");
    assert!(err.contains("without returning"));
  }

  #[test]
  fn accepts_return_in_both_branches() {
    check(
      "int foo(int x) { if (x == 0) { return 0; } else { return 1; } } \
       void main() { print(foo(3)); }",
    )
    .unwrap();
  }

  #[test]
  fn rejects_value_return_from_void() {
    let err = check_err("void main() { return 1; }");
    assert!(err.contains("returning int"));
  }

  #[test]
  fn rejects_non_pointer_cast() {
    let err = check_err("void main() { int x = (int)true; }");
    assert!(err.contains("pointers only"));
  }

  #[test]
  fn allows_pointer_reinterpretation() {
    check(
      "struct TwoInts { int x; int y; }; \
       void main() { TwoInts t = TwoInts(1, 2); TwoInts* p = &t; int* q = (int*)p; print(*q); }",
    )
    .unwrap();
  }

  #[test]
  fn annotates_field_access_with_owner() {
    let program = check(
      "struct Bar { int x; }; struct Foo { Bar b; }; \
       void main() { print(Foo(Bar(1)).b.x); }",
    )
    .unwrap();
    let main = &program.functions[0];
    let TypedStmt::Block(stmts) = &main.body else {
      panic!("expected block");
    };
    let TypedStmt::Print(exp) = &stmts[0] else {
      panic!("expected print");
    };
    let TypedExpKind::FieldAccess { owner, base, .. } = &exp.kind else {
      panic!("expected field access");
    };
    assert_eq!(owner, "Bar");
    let TypedExpKind::FieldAccess { owner, .. } = &base.kind else {
      panic!("expected nested field access");
    };
    assert_eq!(owner, "Foo");
  }

  #[test]
  fn call_disambiguation() {
    let program = check(
      "struct Pair { int a; int b; }; \
       int id(int x) { return x; } \
       void main() { (int) => int f = &id; Pair p = Pair(1, f(2)); print(id(p.a)); }",
    )
    .unwrap();
    let main = program
      .functions
      .iter()
      .find(|function| function.name == "main")
      .unwrap();
    let TypedStmt::Block(stmts) = &main.body else {
      panic!("expected block");
    };
    let TypedStmt::VariableDeclaration { init, .. } = &stmts[1] else {
      panic!("expected declaration");
    };
    let TypedExpKind::MakeStructure { args, .. } = &init.kind else {
      panic!("expected structure construction");
    };
    assert!(matches!(args[1].kind, TypedExpKind::IndirectCall { .. }));
    let TypedStmt::Print(exp) = &stmts[2] else {
      panic!("expected print");
    };
    assert!(matches!(exp.kind, TypedExpKind::DirectCall { .. }));
  }

  #[test]
  fn shadowing_in_inner_block() {
    check(
      "void main() { int x = 0; if (true) { bool x = true; print(x); } else { } print(x); }",
    )
    .unwrap();
  }

  #[test]
  fn inner_declaration_invisible_after_block() {
    let err = check_err("void main() { if (true) { int y = 1; } else { } print(y); }");
    assert!(err.contains("undeclared variable \"y\""));
  }

  #[test]
  fn rejects_duplicate_declaration_in_same_scope() {
    let err = check_err("void main() { int x = 0; int x = 1; }");
    assert!(err.contains("already declared"));
  }

  #[test]
  fn rejects_bare_expression_statement() {
    let err = check_err("struct Foo { int x; }; void main() { Foo(1); }");
    assert!(err.contains("only function calls"));
  }

  #[test]
  fn rejects_missing_main() {
    let err = check_err("int foo() { return 1; }");
    assert!(err.contains("missing entry point"));
  }

  #[test]
  fn rejects_main_with_parameters() {
    let err = check_err("void main(int x) { print(x); }");
    assert!(err.contains("void main()"));
  }

  #[test]
  fn address_of_function_yields_function_type() {
    check(
      "int add(int x, int y) { return x + y; } \
       void main() { (int, int) => int f = &add; print(f(1, 2)); }",
    )
    .unwrap();
  }

  #[test]
  fn address_of_literal_is_rejected() {
    let err = check_err("void main() { int* p = &1; }");
    assert!(err.contains("lvalue"));
  }

  #[test]
  fn malloc_requires_int_size() {
    let err = check_err("void main() { int* p = (int*)malloc(true); }");
    assert!(err.contains("malloc takes an int"));
  }

  #[test]
  fn sizeof_is_int_for_any_type() {
    check("struct Foo { int x; }; void main() { print(sizeof(Foo) + sizeof(int*)); }").unwrap();
  }
}
