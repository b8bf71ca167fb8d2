//! Crate root: wires together the compilation pipeline.
//!
//! The stages are intentionally small and composable so they can be evolved
//! independently:
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns the program AST.
//! - `typechecker` validates the AST and annotates every expression with
//!   its resolved type.
//! - `codegen` lowers the typed program into MIPS assembly for SPIM.
//! - `runner` executes generated assembly under the `spim` simulator.
//! - `error` centralises the error type shared by the front-end stages.

pub mod codegen;
pub mod error;
pub mod parser;
pub mod runner;
pub mod tokenizer;
pub mod ty;
pub mod typechecker;

pub use error::{CompileError, CompileResult};

/// Compile a source string into MIPS assembly. The first error from any
/// stage aborts the pipeline.
pub fn compile(source: &str) -> CompileResult<String> {
  log::debug!("tokenizing {} bytes of source", source.len());
  let tokens = tokenizer::tokenize(source)?;
  log::debug!("parsing {} tokens", tokens.len());
  let program = parser::parse(tokens)?;
  log::debug!(
    "type checking {} structures and {} functions",
    program.structs.len(),
    program.functions.len()
  );
  let typed = typechecker::typecheck(program)?;
  log::debug!("generating code");
  Ok(codegen::generate(&typed))
}
