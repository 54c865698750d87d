use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, ValueEnum};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use snafu::{ResultExt, Snafu};

use pymepa::{CompileError, generate_mepa, parser, tokenizer};

/// Compile a Python subset into MEPA stack-machine code.
#[derive(Parser, Debug)]
#[command(name = "pymepa", version, about, long_about = None)]
struct Cli {
  /// Source file to compile; standard input is read when omitted
  #[arg(short, long)]
  file: Option<PathBuf>,

  /// Pipeline output to print
  #[arg(long, value_enum, default_value_t = Emit::Mepa)]
  emit: Emit,

  /// Increase log verbosity (-v debug, -vv trace)
  #[arg(short, long, action = ArgAction::Count)]
  verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
  /// Token stream, one token per line
  Tokens,
  /// Parsed syntax tree
  Ast,
  /// MEPA instructions
  Mepa,
}

#[derive(Debug, Snafu)]
enum CliError {
  #[snafu(display("error reading source file '{}': {source}", path.display()))]
  ReadFile { path: PathBuf, source: io::Error },
  #[snafu(display("error reading standard input: {source}"))]
  ReadStdin { source: io::Error },
  #[snafu(transparent)]
  Compile { source: CompileError },
}

fn read_source(file: Option<&PathBuf>) -> Result<String, CliError> {
  match file {
    Some(path) => fs::read_to_string(path).context(ReadFileSnafu { path }),
    None => {
      let mut source = String::new();
      io::stdin()
        .read_to_string(&mut source)
        .context(ReadStdinSnafu)?;
      Ok(source)
    }
  }
}

fn run(cli: &Cli) -> Result<String, CliError> {
  let source = read_source(cli.file.as_ref())?;
  let output: String = match cli.emit {
    Emit::Tokens => {
      let tokens = tokenizer::tokenize(&source)?;
      tokens.iter().map(|token| format!("{token}\n")).collect()
    }
    Emit::Ast => {
      let program = parser::parse(tokenizer::tokenize(&source)?)?;
      format!("{program:#?}\n")
    }
    Emit::Mepa => generate_mepa(&source)?,
  };
  Ok(output)
}

fn main() {
  let cli = Cli::parse();

  let level = match cli.verbose {
    0 => LevelFilter::Warn,
    1 => LevelFilter::Debug,
    _ => LevelFilter::Trace,
  };
  if let Err(err) = SimpleLogger::new().with_level(level).env().init() {
    eprintln!("failed to initialise logging: {err}");
  }

  match run(&cli) {
    Ok(output) => print!("{output}"),
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  }
}
