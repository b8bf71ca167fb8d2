//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The tokenizer is intentionally tiny – it knows nothing about semantics
//! beyond recognising keywords, literals, and punctuation. Multi-character
//! punctuators (`==`, `=>`) are matched before single-character ones so
//! maximal munch holds. Tokens compare and hash purely by kind and payload;
//! they carry no source positions.

use std::fmt;

use crate::error::{CompileError, CompileResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
  IntLiteral(i32),
  Identifier(String),
  // Keywords.
  Int,
  Bool,
  Void,
  Struct,
  If,
  Else,
  While,
  Break,
  Continue,
  Return,
  True,
  False,
  Print,
  Malloc,
  Sizeof,
  // Punctuation.
  LeftParen,
  RightParen,
  LeftBrace,
  RightBrace,
  Semicolon,
  Comma,
  Dot,
  Star,
  Ampersand,
  Assign,
  DoubleEquals,
  LessThan,
  Plus,
  Minus,
  Slash,
  Arrow,
}

impl fmt::Display for Token {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Token::IntLiteral(value) => write!(f, "integer literal {value}"),
      Token::Identifier(name) => write!(f, "identifier \"{name}\""),
      Token::Int => write!(f, "\"int\""),
      Token::Bool => write!(f, "\"bool\""),
      Token::Void => write!(f, "\"void\""),
      Token::Struct => write!(f, "\"struct\""),
      Token::If => write!(f, "\"if\""),
      Token::Else => write!(f, "\"else\""),
      Token::While => write!(f, "\"while\""),
      Token::Break => write!(f, "\"break\""),
      Token::Continue => write!(f, "\"continue\""),
      Token::Return => write!(f, "\"return\""),
      Token::True => write!(f, "\"true\""),
      Token::False => write!(f, "\"false\""),
      Token::Print => write!(f, "\"print\""),
      Token::Malloc => write!(f, "\"malloc\""),
      Token::Sizeof => write!(f, "\"sizeof\""),
      Token::LeftParen => write!(f, "\"(\""),
      Token::RightParen => write!(f, "\")\""),
      Token::LeftBrace => write!(f, "\"{{\""),
      Token::RightBrace => write!(f, "\"}}\""),
      Token::Semicolon => write!(f, "\";\""),
      Token::Comma => write!(f, "\",\""),
      Token::Dot => write!(f, "\".\""),
      Token::Star => write!(f, "\"*\""),
      Token::Ampersand => write!(f, "\"&\""),
      Token::Assign => write!(f, "\"=\""),
      Token::DoubleEquals => write!(f, "\"==\""),
      Token::LessThan => write!(f, "\"<\""),
      Token::Plus => write!(f, "\"+\""),
      Token::Minus => write!(f, "\"-\""),
      Token::Slash => write!(f, "\"/\""),
      Token::Arrow => write!(f, "\"=>\""),
    }
  }
}

fn keyword(word: &str) -> Option<Token> {
  let token = match word {
    "int" => Token::Int,
    "bool" => Token::Bool,
    "void" => Token::Void,
    "struct" => Token::Struct,
    "if" => Token::If,
    "else" => Token::Else,
    "while" => Token::While,
    "break" => Token::Break,
    "continue" => Token::Continue,
    "return" => Token::Return,
    "true" => Token::True,
    "false" => Token::False,
    "print" => Token::Print,
    "malloc" => Token::Malloc,
    "sizeof" => Token::Sizeof,
    _ => return None,
  };
  Some(token)
}

/// Lex the input into a flat vector of tokens. Whitespace and `//` line
/// comments are discarded, not tokenized.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let bytes = input.as_bytes();
  let mut i = 0;

  while i < bytes.len() {
    let c = bytes[i];
    if c.is_ascii_whitespace() {
      i += 1;
      continue;
    }

    if c == b'/' && bytes.get(i + 1) == Some(&b'/') {
      while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
      }
      continue;
    }

    if c.is_ascii_digit() {
      let start = i;
      i += 1;
      while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
      }
      let text = &input[start..i];
      let value = text
        .parse::<i32>()
        .map_err(|err| CompileError::lex_at(input, start, format!("invalid number: {err}")))?;
      tokens.push(Token::IntLiteral(value));
      continue;
    }

    if c.is_ascii_alphabetic() || c == b'_' {
      let start = i;
      i += 1;
      while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
      }
      let word = &input[start..i];
      match keyword(word) {
        Some(token) => tokens.push(token),
        None => tokens.push(Token::Identifier(word.to_string())),
      }
      continue;
    }

    if c == b'=' {
      // Maximal munch: `==` and `=>` are single tokens.
      match bytes.get(i + 1) {
        Some(b'=') => {
          tokens.push(Token::DoubleEquals);
          i += 2;
        }
        Some(b'>') => {
          tokens.push(Token::Arrow);
          i += 2;
        }
        _ => {
          tokens.push(Token::Assign);
          i += 1;
        }
      }
      continue;
    }

    let token = match c {
      b'(' => Token::LeftParen,
      b')' => Token::RightParen,
      b'{' => Token::LeftBrace,
      b'}' => Token::RightBrace,
      b';' => Token::Semicolon,
      b',' => Token::Comma,
      b'.' => Token::Dot,
      b'*' => Token::Star,
      b'&' => Token::Ampersand,
      b'<' => Token::LessThan,
      b'+' => Token::Plus,
      b'-' => Token::Minus,
      b'/' => Token::Slash,
      _ => {
        let invalid = input[i..].chars().next().unwrap_or('\0');
        return Err(CompileError::lex_at(
          input,
          i,
          format!("unrecognized character '{invalid}'"),
        ));
      }
    };
    tokens.push(token);
    i += 1;
  }

  Ok(tokens)
}
