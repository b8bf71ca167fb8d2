use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use lowc::runner;

#[derive(Parser)]
#[command(version, about = "Compile a source file to MIPS assembly for SPIM")]
struct Cli {
  /// Source file to compile.
  input: PathBuf,

  /// Where to write the generated assembly.
  #[arg(short, long, default_value = "out.s")]
  out: PathBuf,

  /// Run the generated assembly under spim and print the program's output.
  #[arg(long)]
  run: bool,
}

fn main() {
  env_logger::init();
  let cli = Cli::parse();

  let source = match fs::read_to_string(&cli.input) {
    Ok(source) => source,
    Err(err) => {
      eprintln!("error: cannot read {}: {err}", cli.input.display());
      process::exit(1);
    }
  };

  let asm = match lowc::compile(&source) {
    Ok(asm) => asm,
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  };

  if let Err(err) = fs::write(&cli.out, &asm) {
    eprintln!("error: cannot write {}: {err}", cli.out.display());
    process::exit(1);
  }

  if cli.run {
    match runner::run_assembly(&cli.out) {
      Ok(output) => print!("{output}"),
      Err(err) => {
        eprintln!("{err}");
        process::exit(1);
      }
    }
  }
}
