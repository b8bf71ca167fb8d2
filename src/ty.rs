//! Types of the source language.
//!
//! Types are immutable values with structural equality: two function types
//! are equal iff their parameter lists and return types match elementwise,
//! while a structure type only equals another naming the same declared
//! structure. They are built once by the parser and never mutated.

use std::fmt;

/// Every scalar value (int, bool, pointer, function value) occupies one
/// machine word on the target.
pub const WORD_SIZE: i32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
  Int,
  Bool,
  Void,
  Pointer(Box<Type>),
  Structure(String),
  Function(Vec<Type>, Box<Type>),
}

impl Type {
  pub fn pointer_to(base: Type) -> Self {
    Type::Pointer(Box::new(base))
  }

  pub fn function(params: Vec<Type>, ret: Type) -> Self {
    Type::Function(params, Box::new(ret))
  }

  pub fn is_pointer(&self) -> bool {
    matches!(self, Type::Pointer(_))
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Type::Int => write!(f, "int"),
      Type::Bool => write!(f, "bool"),
      Type::Void => write!(f, "void"),
      Type::Pointer(base) => write!(f, "{base}*"),
      Type::Structure(name) => write!(f, "{name}"),
      Type::Function(params, ret) => {
        write!(f, "(")?;
        for (index, param) in params.iter().enumerate() {
          if index > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{param}")?;
        }
        write!(f, ") => {ret}")
      }
    }
  }
}
