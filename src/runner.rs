//! Running generated assembly under the SPIM simulator.
//!
//! This is a thin wrapper around the `spim` executable: write the assembly
//! to a file, invoke `spim -file`, and return the program's output with the
//! simulator's startup banner stripped. Callers that merely want to know
//! whether execution is possible on this machine probe [`spim_available`]
//! first.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

use snafu::{ResultExt, Snafu};

use crate::error::CompileError;

pub type RunResult<T> = Result<T, RunError>;

#[derive(Debug, Snafu)]
pub enum RunError {
  #[snafu(display("{source}"))]
  #[snafu(context(false))]
  Compile { source: CompileError },

  #[snafu(display("cannot write assembly to {}: {source}", path.display()))]
  WriteAssembly { path: PathBuf, source: io::Error },

  #[snafu(display("failed to launch spim: {source}"))]
  Launch { source: io::Error },

  #[snafu(display("spim failed: {stderr}"))]
  Simulator { stderr: String },
}

/// Whether the `spim` executable can be launched at all.
pub fn spim_available() -> bool {
  Command::new("spim").arg("-version").output().is_ok()
}

/// Execute an assembly file under `spim -file` and return its output with
/// the banner removed.
pub fn run_assembly(path: &Path) -> RunResult<String> {
  let output = Command::new("spim")
    .arg("-file")
    .arg(path)
    .output()
    .context(LaunchSnafu)?;
  if !output.status.success() {
    return SimulatorSnafu {
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
    .fail();
  }
  Ok(strip_banner(&String::from_utf8_lossy(&output.stdout)))
}

/// Compile a source string, run it, and return the program's output.
/// The assembly goes through a uniquely named temporary file that is
/// removed afterwards.
pub fn compile_and_run(source: &str) -> RunResult<String> {
  let asm = crate::compile(source)?;
  let path = temp_assembly_path();
  fs::write(&path, asm).context(WriteAssemblySnafu { path: path.clone() })?;
  let result = run_assembly(&path);
  let _ = fs::remove_file(&path);
  result
}

static NEXT_TEMP_ID: AtomicUsize = AtomicUsize::new(0);

/// Unique per process and per call, so parallel test threads never share a
/// file.
fn temp_assembly_path() -> PathBuf {
  let id = NEXT_TEMP_ID.fetch_add(1, Ordering::Relaxed);
  env::temp_dir().join(format!("lowc-{}-{id}.s", std::process::id()))
}

/// SPIM prints a multi-line startup banner ending with one or more
/// `Loaded: ...` lines before any program output. Program output itself is
/// only integers and newlines, so the last `Loaded:` line is a safe cut.
fn strip_banner(stdout: &str) -> String {
  let mut body_start = 0;
  let mut offset = 0;
  for line in stdout.split_inclusive('\n') {
    offset += line.len();
    if line.starts_with("Loaded:") {
      body_start = offset;
    }
  }
  stdout[body_start..].to_string()
}
