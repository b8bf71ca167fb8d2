//! Recursive-descent parser producing a whole-program AST.
//!
//! The parser mirrors the classic chibicc structure: one function per
//! nonterminal, a precedence-climbing set of expression helpers, and a thin
//! cursor over the token vector. The first failure aborts parsing; there is
//! no recovery. Struct construction `Name(args)` and function calls share
//! one syntactic form and are split later by the type checker.

use crate::error::{CompileError, CompileResult};
use crate::tokenizer::Token;
use crate::ty::Type;

/// Binary operators recognised by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Equals,
  LessThan,
}

/// Expression tree produced by the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Exp {
  IntLiteral(i32),
  BoolLiteral(bool),
  Variable(String),
  Binary {
    op: BinaryOp,
    lhs: Box<Exp>,
    rhs: Box<Exp>,
  },
  FieldAccess {
    base: Box<Exp>,
    field: String,
  },
  /// Either a function call or a structure construction; the type checker
  /// decides based on which namespace `name` resolves in.
  Call {
    name: String,
    args: Vec<Exp>,
  },
  AddressOf(Box<Exp>),
  Dereference(Box<Exp>),
  Cast {
    to: Type,
    exp: Box<Exp>,
  },
  SizeOf(Type),
  Malloc(Box<Exp>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
  VariableDeclaration {
    ty: Type,
    name: String,
    init: Exp,
  },
  Assignment {
    target: Exp,
    value: Exp,
  },
  Print(Exp),
  If {
    cond: Exp,
    then_branch: Box<Stmt>,
    else_branch: Box<Stmt>,
  },
  While {
    cond: Exp,
    body: Box<Stmt>,
  },
  Break,
  Continue,
  Return(Option<Exp>),
  ExpStmt(Exp),
  Block(Vec<Stmt>),
}

/// A structure declaration's field order is layout-significant: it alone
/// determines byte offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureDeclaration {
  pub name: String,
  pub fields: Vec<(String, Type)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
  pub return_type: Type,
  pub name: String,
  pub params: Vec<(Type, String)>,
  pub body: Stmt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
  pub structs: Vec<StructureDeclaration>,
  pub functions: Vec<FunctionDefinition>,
}

/// Parse a token sequence into a program. Top-level declarations may appear
/// in any order and forward references are allowed; leftover tokens after
/// the last declaration are a parse error.
pub fn parse(tokens: Vec<Token>) -> CompileResult<Program> {
  let mut stream = TokenStream::new(tokens);
  let mut program = Program {
    structs: Vec::new(),
    functions: Vec::new(),
  };

  while !stream.is_eof() {
    if stream.equal(&Token::Struct) {
      program.structs.push(parse_struct(&mut stream)?);
    } else {
      program.functions.push(parse_function(&mut stream)?);
    }
  }

  Ok(program)
}

fn parse_struct(stream: &mut TokenStream) -> CompileResult<StructureDeclaration> {
  let name = stream.get_identifier("a structure name")?;
  stream.skip(&Token::LeftBrace)?;

  let mut fields = Vec::new();
  while !stream.equal(&Token::RightBrace) {
    let ty = parse_type(stream)?;
    let field = stream.get_identifier("a field name")?;
    stream.skip(&Token::Semicolon)?;
    fields.push((field, ty));
  }
  stream.skip(&Token::Semicolon)?;

  Ok(StructureDeclaration { name, fields })
}

fn parse_function(stream: &mut TokenStream) -> CompileResult<FunctionDefinition> {
  let return_type = parse_type(stream)?;
  let name = stream.get_identifier("a function name")?;
  stream.skip(&Token::LeftParen)?;

  let mut params = Vec::new();
  if !stream.equal(&Token::RightParen) {
    loop {
      let ty = parse_type(stream)?;
      let param = stream.get_identifier("a parameter name")?;
      params.push((ty, param));
      if !stream.equal(&Token::Comma) {
        break;
      }
    }
    stream.skip(&Token::RightParen)?;
  }

  let body = parse_block(stream)?;
  Ok(FunctionDefinition {
    return_type,
    name,
    params,
    body,
  })
}

/// Parse a type: a base type (`int`, `bool`, `void`, a structure name, or a
/// function type `(T, ...) => T`) followed by any number of `*` suffixes.
fn parse_type(stream: &mut TokenStream) -> CompileResult<Type> {
  let mut ty = match stream.next() {
    Some(Token::Int) => Type::Int,
    Some(Token::Bool) => Type::Bool,
    Some(Token::Void) => Type::Void,
    Some(Token::Identifier(name)) => Type::Structure(name),
    Some(Token::LeftParen) => {
      let mut params = Vec::new();
      if !stream.equal(&Token::RightParen) {
        loop {
          params.push(parse_type(stream)?);
          if !stream.equal(&Token::Comma) {
            break;
          }
        }
        stream.skip(&Token::RightParen)?;
      }
      stream.skip(&Token::Arrow)?;
      let ret = parse_type(stream)?;
      Type::function(params, ret)
    }
    other => {
      return Err(CompileError::parse("a type", describe(other.as_ref())));
    }
  };

  while stream.equal(&Token::Star) {
    ty = Type::pointer_to(ty);
  }
  Ok(ty)
}

fn parse_block(stream: &mut TokenStream) -> CompileResult<Stmt> {
  stream.skip(&Token::LeftBrace)?;
  let mut stmts = Vec::new();
  while !stream.equal(&Token::RightBrace) {
    stmts.push(parse_stmt(stream)?);
  }
  Ok(Stmt::Block(stmts))
}

fn parse_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  match stream.peek() {
    Some(Token::LeftBrace) => parse_block(stream),
    Some(Token::If) => parse_if(stream),
    Some(Token::While) => {
      stream.skip(&Token::While)?;
      stream.skip(&Token::LeftParen)?;
      let cond = parse_exp(stream)?;
      stream.skip(&Token::RightParen)?;
      let body = parse_block(stream)?;
      Ok(Stmt::While {
        cond,
        body: Box::new(body),
      })
    }
    Some(Token::Break) => {
      stream.skip(&Token::Break)?;
      stream.skip(&Token::Semicolon)?;
      Ok(Stmt::Break)
    }
    Some(Token::Continue) => {
      stream.skip(&Token::Continue)?;
      stream.skip(&Token::Semicolon)?;
      Ok(Stmt::Continue)
    }
    Some(Token::Return) => {
      stream.skip(&Token::Return)?;
      if stream.equal(&Token::Semicolon) {
        return Ok(Stmt::Return(None));
      }
      let value = parse_exp(stream)?;
      stream.skip(&Token::Semicolon)?;
      Ok(Stmt::Return(Some(value)))
    }
    Some(Token::Print) => {
      stream.skip(&Token::Print)?;
      stream.skip(&Token::LeftParen)?;
      let value = parse_exp(stream)?;
      stream.skip(&Token::RightParen)?;
      stream.skip(&Token::Semicolon)?;
      Ok(Stmt::Print(value))
    }
    // `int`/`bool`/`void` and `(` can only start a declaration in statement
    // position; an identifier starts one when followed by `*`* identifier.
    Some(Token::Int) | Some(Token::Bool) | Some(Token::Void) | Some(Token::LeftParen) => {
      parse_declaration(stream)
    }
    Some(Token::Identifier(_)) if starts_declaration(stream) => parse_declaration(stream),
    _ => {
      let exp = parse_exp(stream)?;
      if stream.equal(&Token::Assign) {
        let value = parse_exp(stream)?;
        stream.skip(&Token::Semicolon)?;
        Ok(Stmt::Assignment { target: exp, value })
      } else {
        stream.skip(&Token::Semicolon)?;
        Ok(Stmt::ExpStmt(exp))
      }
    }
  }
}

/// `else if` chains desugar into nested two-branch conditionals; a missing
/// `else` parses as an empty block.
fn parse_if(stream: &mut TokenStream) -> CompileResult<Stmt> {
  stream.skip(&Token::If)?;
  stream.skip(&Token::LeftParen)?;
  let cond = parse_exp(stream)?;
  stream.skip(&Token::RightParen)?;
  let then_branch = parse_block(stream)?;

  let else_branch = if stream.equal(&Token::Else) {
    if matches!(stream.peek(), Some(Token::If)) {
      parse_if(stream)?
    } else {
      parse_block(stream)?
    }
  } else {
    Stmt::Block(Vec::new())
  };

  Ok(Stmt::If {
    cond,
    then_branch: Box::new(then_branch),
    else_branch: Box::new(else_branch),
  })
}

/// Lookahead for `Name ('*')* name`, the shape of a declaration whose type
/// is a structure (or pointer-to-structure). `x * y` cannot begin a
/// statement any other way, so the lookahead is unambiguous.
fn starts_declaration(stream: &TokenStream) -> bool {
  let mut offset = 1;
  while matches!(stream.peek_at(offset), Some(Token::Star)) {
    offset += 1;
  }
  matches!(stream.peek_at(offset), Some(Token::Identifier(_)))
}

fn parse_declaration(stream: &mut TokenStream) -> CompileResult<Stmt> {
  let ty = parse_type(stream)?;
  let name = stream.get_identifier("a variable name")?;
  stream.skip(&Token::Assign)?;
  let init = parse_exp(stream)?;
  stream.skip(&Token::Semicolon)?;
  Ok(Stmt::VariableDeclaration { ty, name, init })
}

fn parse_exp(stream: &mut TokenStream) -> CompileResult<Exp> {
  parse_comparison(stream)
}

/// `==` and `<` sit at the lowest precedence level and are non-associative:
/// at most one comparison per expression, no chaining.
fn parse_comparison(stream: &mut TokenStream) -> CompileResult<Exp> {
  let lhs = parse_add(stream)?;

  let op = match stream.peek() {
    Some(Token::DoubleEquals) => BinaryOp::Equals,
    Some(Token::LessThan) => BinaryOp::LessThan,
    _ => return Ok(lhs),
  };
  stream.next();
  let rhs = parse_add(stream)?;
  Ok(Exp::Binary {
    op,
    lhs: Box::new(lhs),
    rhs: Box::new(rhs),
  })
}

fn parse_add(stream: &mut TokenStream) -> CompileResult<Exp> {
  let mut node = parse_mul(stream)?;

  loop {
    let op = match stream.peek() {
      Some(Token::Plus) => BinaryOp::Add,
      Some(Token::Minus) => BinaryOp::Sub,
      _ => break,
    };
    stream.next();
    let rhs = parse_mul(stream)?;
    node = Exp::Binary {
      op,
      lhs: Box::new(node),
      rhs: Box::new(rhs),
    };
  }

  Ok(node)
}

fn parse_mul(stream: &mut TokenStream) -> CompileResult<Exp> {
  let mut node = parse_unary(stream)?;

  loop {
    let op = match stream.peek() {
      Some(Token::Star) => BinaryOp::Mul,
      Some(Token::Slash) => BinaryOp::Div,
      _ => break,
    };
    stream.next();
    let rhs = parse_unary(stream)?;
    node = Exp::Binary {
      op,
      lhs: Box::new(node),
      rhs: Box::new(rhs),
    };
  }

  Ok(node)
}

/// Unary `*`, `&`, and casts bind tighter than all binary operators but
/// looser than postfix field access, so `&x.y` takes the field's address.
fn parse_unary(stream: &mut TokenStream) -> CompileResult<Exp> {
  if stream.equal(&Token::Star) {
    let operand = parse_unary(stream)?;
    return Ok(Exp::Dereference(Box::new(operand)));
  }

  if stream.equal(&Token::Ampersand) {
    let operand = parse_unary(stream)?;
    return Ok(Exp::AddressOf(Box::new(operand)));
  }

  if starts_cast(stream) {
    stream.skip(&Token::LeftParen)?;
    let to = parse_type(stream)?;
    stream.skip(&Token::RightParen)?;
    let exp = parse_unary(stream)?;
    return Ok(Exp::Cast {
      to,
      exp: Box::new(exp),
    });
  }

  parse_postfix(stream)
}

/// A `(` begins a cast when followed by a type keyword, or by an identifier
/// followed by `*`; everything else is a parenthesized expression.
fn starts_cast(stream: &TokenStream) -> bool {
  if !matches!(stream.peek(), Some(Token::LeftParen)) {
    return false;
  }
  match stream.peek_at(1) {
    Some(Token::Int) | Some(Token::Bool) | Some(Token::Void) => true,
    Some(Token::Identifier(_)) => matches!(stream.peek_at(2), Some(Token::Star)),
    _ => false,
  }
}

fn parse_postfix(stream: &mut TokenStream) -> CompileResult<Exp> {
  let mut node = parse_primary(stream)?;

  while stream.equal(&Token::Dot) {
    let field = stream.get_identifier("a field name")?;
    node = Exp::FieldAccess {
      base: Box::new(node),
      field,
    };
  }

  Ok(node)
}

fn parse_primary(stream: &mut TokenStream) -> CompileResult<Exp> {
  match stream.next() {
    Some(Token::IntLiteral(value)) => Ok(Exp::IntLiteral(value)),
    Some(Token::True) => Ok(Exp::BoolLiteral(true)),
    Some(Token::False) => Ok(Exp::BoolLiteral(false)),
    Some(Token::Malloc) => {
      stream.skip(&Token::LeftParen)?;
      let size = parse_exp(stream)?;
      stream.skip(&Token::RightParen)?;
      Ok(Exp::Malloc(Box::new(size)))
    }
    Some(Token::Sizeof) => {
      stream.skip(&Token::LeftParen)?;
      let ty = parse_type(stream)?;
      stream.skip(&Token::RightParen)?;
      Ok(Exp::SizeOf(ty))
    }
    Some(Token::Identifier(name)) => {
      if stream.equal(&Token::LeftParen) {
        let mut args = Vec::new();
        if !stream.equal(&Token::RightParen) {
          loop {
            args.push(parse_exp(stream)?);
            if !stream.equal(&Token::Comma) {
              break;
            }
          }
          stream.skip(&Token::RightParen)?;
        }
        Ok(Exp::Call { name, args })
      } else {
        Ok(Exp::Variable(name))
      }
    }
    Some(Token::LeftParen) => {
      let exp = parse_exp(stream)?;
      stream.skip(&Token::RightParen)?;
      Ok(exp)
    }
    other => Err(CompileError::parse(
      "an expression",
      describe(other.as_ref()),
    )),
  }
}

fn describe(token: Option<&Token>) -> String {
  match token {
    Some(token) => token.to_string(),
    None => "end of input".to_string(),
  }
}

/// Lightweight cursor over the token vector.
struct TokenStream {
  tokens: Vec<Token>,
  pos: usize,
}

impl TokenStream {
  fn new(tokens: Vec<Token>) -> Self {
    Self { tokens, pos: 0 }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn peek_at(&self, offset: usize) -> Option<&Token> {
    self.tokens.get(self.pos + offset)
  }

  fn next(&mut self) -> Option<Token> {
    let token = self.tokens.get(self.pos).cloned();
    if token.is_some() {
      self.pos += 1;
    }
    token
  }

  /// Consume the current token if it matches.
  fn equal(&mut self, expected: &Token) -> bool {
    if self.peek() == Some(expected) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn skip(&mut self, expected: &Token) -> CompileResult<()> {
    if self.equal(expected) {
      Ok(())
    } else {
      Err(CompileError::parse(
        expected.to_string(),
        describe(self.peek()),
      ))
    }
  }

  fn get_identifier(&mut self, expected: &str) -> CompileResult<String> {
    match self.peek() {
      Some(Token::Identifier(name)) => {
        let name = name.clone();
        self.pos += 1;
        Ok(name)
      }
      other => Err(CompileError::parse(expected, describe(other))),
    }
  }

  fn is_eof(&self) -> bool {
    self.pos >= self.tokens.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tokenizer::tokenize;

  fn parse_source(source: &str) -> CompileResult<Program> {
    parse(tokenize(source).unwrap())
  }

  fn main_body(source: &str) -> Vec<Stmt> {
    let program = parse_source(source).unwrap();
    match &program.functions[0].body {
      Stmt::Block(stmts) => stmts.clone(),
      other => panic!("expected block body, got {other:?}"),
    }
  }

  #[test]
  fn multiplication_binds_tighter_than_addition() {
    let stmts = main_body("void main() { print(2 + 3 * 4); }");
    let Stmt::Print(Exp::Binary { op, rhs, .. }) = &stmts[0] else {
      panic!("expected print of a binary expression");
    };
    assert_eq!(*op, BinaryOp::Add);
    assert!(matches!(
      rhs.as_ref(),
      Exp::Binary {
        op: BinaryOp::Mul,
        ..
      }
    ));
  }

  #[test]
  fn comparison_sits_below_addition() {
    let stmts = main_body("void main() { print(1 + 2 < 3 + 4); }");
    let Stmt::Print(Exp::Binary { op, lhs, rhs }) = &stmts[0] else {
      panic!("expected print of a comparison");
    };
    assert_eq!(*op, BinaryOp::LessThan);
    assert!(matches!(lhs.as_ref(), Exp::Binary { op: BinaryOp::Add, .. }));
    assert!(matches!(rhs.as_ref(), Exp::Binary { op: BinaryOp::Add, .. }));
  }

  #[test]
  fn else_if_desugars_to_nested_conditionals() {
    let stmts = main_body(
      "void main() { if (true) { print(1); } else if (false) { print(2); } else { print(3); } }",
    );
    let Stmt::If { else_branch, .. } = &stmts[0] else {
      panic!("expected if");
    };
    assert!(matches!(else_branch.as_ref(), Stmt::If { .. }));
  }

  #[test]
  fn if_without_else_gets_an_empty_block() {
    let stmts = main_body("void main() { if (true) { print(1); } }");
    let Stmt::If { else_branch, .. } = &stmts[0] else {
      panic!("expected if");
    };
    assert_eq!(else_branch.as_ref(), &Stmt::Block(Vec::new()));
  }

  #[test]
  fn address_of_binds_looser_than_field_access() {
    let stmts = main_body("void main() { int* p = &x.y; }");
    let Stmt::VariableDeclaration { init, .. } = &stmts[0] else {
      panic!("expected declaration");
    };
    let Exp::AddressOf(inner) = init else {
      panic!("expected address-of");
    };
    assert!(matches!(inner.as_ref(), Exp::FieldAccess { .. }));
  }

  #[test]
  fn cast_versus_parenthesized_expression() {
    let stmts = main_body("void main() { int* p = (int*)malloc(4); int y = (x); }");
    let Stmt::VariableDeclaration { init, .. } = &stmts[0] else {
      panic!("expected declaration");
    };
    assert!(matches!(init, Exp::Cast { .. }));
    let Stmt::VariableDeclaration { init, .. } = &stmts[1] else {
      panic!("expected declaration");
    };
    assert_eq!(init, &Exp::Variable("x".to_string()));
  }

  #[test]
  fn struct_pointer_cast_requires_the_star() {
    let stmts = main_body("void main() { TwoInts* p = (TwoInts*)q; }");
    let Stmt::VariableDeclaration { init, .. } = &stmts[0] else {
      panic!("expected declaration");
    };
    let Exp::Cast { to, .. } = init else {
      panic!("expected cast");
    };
    assert_eq!(to, &Type::pointer_to(Type::Structure("TwoInts".to_string())));
  }

  #[test]
  fn function_type_declaration() {
    let stmts = main_body("void main() { (int, int) => int f = &add; }");
    let Stmt::VariableDeclaration { ty, .. } = &stmts[0] else {
      panic!("expected declaration");
    };
    assert_eq!(ty, &Type::function(vec![Type::Int, Type::Int], Type::Int));
  }

  #[test]
  fn zero_parameter_function_type() {
    let stmts = main_body("void main() { () => void f = &printOne; }");
    let Stmt::VariableDeclaration { ty, .. } = &stmts[0] else {
      panic!("expected declaration");
    };
    assert_eq!(ty, &Type::function(vec![], Type::Void));
  }

  #[test]
  fn struct_declaration_preserves_field_order() {
    let program = parse_source("struct Foo { int x; bool y; Foo* next; };").unwrap();
    assert_eq!(program.structs.len(), 1);
    let fields = &program.structs[0].fields;
    assert_eq!(fields[0], ("x".to_string(), Type::Int));
    assert_eq!(fields[1], ("y".to_string(), Type::Bool));
    assert_eq!(
      fields[2],
      (
        "next".to_string(),
        Type::pointer_to(Type::Structure("Foo".to_string()))
      )
    );
  }

  #[test]
  fn dereference_assignment_statement() {
    let stmts = main_body("void main() { *p = 7; }");
    let Stmt::Assignment { target, .. } = &stmts[0] else {
      panic!("expected assignment");
    };
    assert!(matches!(target, Exp::Dereference(_)));
  }

  #[test]
  fn structure_declaration_shape() {
    let stmts = main_body("void main() { TwoInts x = TwoInts(1, 2); }");
    let Stmt::VariableDeclaration { ty, init, .. } = &stmts[0] else {
      panic!("expected declaration");
    };
    assert_eq!(ty, &Type::Structure("TwoInts".to_string()));
    assert!(matches!(init, Exp::Call { .. }));
  }

  #[test]
  fn leftover_tokens_are_a_parse_error() {
    let err = parse_source("void main() { } }").unwrap_err();
    assert!(err.to_string().contains("parse error"));
  }

  #[test]
  fn reports_expected_versus_found() {
    let err = parse_source("void main() { print(1) }").unwrap_err();
    let rendered = err.to_string();
    assert!(rendered.contains("\";\""));
    assert!(rendered.contains("\"}\""));
  }
}
