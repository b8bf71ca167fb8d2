//! Shared error utilities used across the compilation pipeline.
//!
//! Each front-end stage has exactly one error variant and the first failure
//! aborts the whole compilation; nothing downstream ever consumes a partial
//! result. Lexical diagnostics point at the offending byte with a caret in
//! the style of chibicc.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  /// The source contained a character sequence matching no token rule.
  #[snafu(display("lexical error: {message}\n{source_line}\n{marker}"))]
  Lex {
    source_line: String,
    marker: String,
    message: String,
  },

  /// The token sequence does not match the grammar.
  #[snafu(display("parse error: expected {expected}, but got {found}"))]
  Parse { expected: String, found: String },

  /// A well-formed AST violates a typing rule.
  #[snafu(display("type error: {message}"))]
  Type { message: String },
}

impl CompileError {
  /// Construct a lexical error anchored at a byte offset in the source,
  /// with a caret marking the offending column on its line.
  pub fn lex_at(source: &str, loc: usize, message: impl Into<String>) -> Self {
    let safe_loc = loc.min(source.len());
    let line_start = source[..safe_loc].rfind('\n').map_or(0, |i| i + 1);
    let line_end = source[safe_loc..]
      .find('\n')
      .map_or(source.len(), |i| safe_loc + i);
    let column = source[line_start..safe_loc].chars().count();
    Self::Lex {
      source_line: source[line_start..line_end].to_string(),
      marker: format!("{}^", " ".repeat(column)),
      message: message.into(),
    }
  }

  pub fn parse(expected: impl Into<String>, found: impl Into<String>) -> Self {
    Self::Parse {
      expected: expected.into(),
      found: found.into(),
    }
  }

  pub fn type_error(message: impl Into<String>) -> Self {
    Self::Type {
      message: message.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lex_error_points_at_offending_column() {
    let err = CompileError::lex_at("int x @ 1;", 6, "unrecognized character '@'");
    let rendered = err.to_string();
    assert!(rendered.contains("int x @ 1;"));
    assert!(rendered.contains("      ^"));
    assert!(rendered.contains("unrecognized character '@'"));
  }

  #[test]
  fn lex_error_finds_the_right_line() {
    let err = CompileError::lex_at("int x;\nint $;\n", 11, "unrecognized character '$'");
    let rendered = err.to_string();
    assert!(rendered.contains("int $;"));
    assert!(!rendered.contains("int x;\nint $;"));
  }
}
