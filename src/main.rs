use std::process;

use armjit::codegen::Address;
use armjit::sim::{Machine, SimError};
use armjit::symbols::{Symbol, SymbolError, SymbolTable, parse_declaration};
use armjit::{CompileError, compile_at, disasm};
use clap::Parser;
use log::{LevelFilter, info};
use snafu::{OptionExt, Snafu};

/// Native functions every expression can call, bound at synthetic addresses.
const BUILTINS: [(&str, u32, fn([i32; 4]) -> i32); 4] = [
  // The simulator has no trap for division by zero; it yields 0.
  ("div", 0x0020_0000, |a: [i32; 4]| a[0].checked_div(a[1]).unwrap_or(0)),
  ("mod", 0x0020_0010, |a: [i32; 4]| a[0].checked_rem(a[1]).unwrap_or(0)),
  ("inc", 0x0020_0020, |a: [i32; 4]| a[0].wrapping_add(1)),
  ("dec", 0x0020_0030, |a: [i32; 4]| a[0].wrapping_sub(1)),
];
const DATA_BASE: Address = Address::new(0x0030_0000);

#[derive(Debug, Snafu)]
enum AppError {
  #[snafu(context(false), display("{source}"))]
  Compile { source: CompileError },

  #[snafu(context(false), display("{source}"))]
  Symbol { source: SymbolError },

  #[snafu(context(false), display("execution failed: {source}"))]
  Sim { source: SimError },

  #[snafu(display("{count} variables do not fit the data segment"))]
  TooManyVariables { count: usize },
}

#[derive(Parser, Debug)]
#[command(name = "armjit", version)]
#[command(about = "Compile an integer expression to ARM32 code and evaluate it")]
struct Cli {
  /// Expression to compile, e.g. "(1+a)*c + div(2+4,2)"
  #[arg(allow_hyphen_values = true)]
  expr: String,

  /// Variable declaration NAME=VALUE (repeatable)
  #[arg(long = "var", value_name = "NAME=VALUE")]
  vars: Vec<String>,

  /// Load address of the generated code
  #[arg(long, default_value = "0x10000", value_parser = parse_address)]
  base: Address,

  /// Output buffer capacity in instruction words
  #[arg(long, default_value_t = 1024)]
  capacity: usize,

  /// Print the disassembly of the generated code
  #[arg(long)]
  dump: bool,

  /// Print the generated code as raw little-endian words
  #[arg(long)]
  hex: bool,

  /// Raise log verbosity (-v info, -vv debug, -vvv trace)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

fn parse_address(text: &str) -> Result<Address, String> {
  let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
    Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
    None => text.replace('_', "").parse::<u32>(),
  };
  parsed
    .map(Address::new)
    .map_err(|err| format!("invalid address \"{text}\": {err}"))
}

fn run(cli: &Cli) -> Result<i32, AppError> {
  let mut symbols = SymbolTable::new();
  let mut machine = Machine::new();

  // Lookups take the first match, so declared variables shadow builtins.
  for (i, decl) in cli.vars.iter().enumerate() {
    let (name, value) = parse_declaration(decl)?;
    let cell = DATA_BASE.offset_words(i).context(TooManyVariablesSnafu {
      count: cli.vars.len(),
    })?;
    machine.store(cell, value);
    info!("{name} = {value} at {:#010x}", cell.raw());
    symbols.push(Symbol::new(name, cell));
  }

  for (name, raw, native) in BUILTINS {
    let entry = Address::new(raw);
    symbols.push(Symbol::new(name, entry));
    machine.bind(entry, native);
  }

  let mut code = vec![0u32; cli.capacity];
  let len = compile_at(&cli.expr, &symbols, &mut code, cli.base)?;
  code.truncate(len);
  info!("compiled {len} words at {:#010x}", cli.base.raw());

  if cli.dump {
    for line in disasm::disassemble(&code) {
      println!("{line}");
    }
  }
  if cli.hex {
    for word in &code {
      println!("{word:08x}");
    }
  }

  Ok(machine.run(&code, cli.base)?)
}

fn main() {
  let cli = Cli::parse();

  let level = match cli.verbose {
    0 => LevelFilter::Warn,
    1 => LevelFilter::Info,
    2 => LevelFilter::Debug,
    _ => LevelFilter::Trace,
  };
  env_logger::Builder::new()
    .filter_level(level)
    .parse_default_env()
    .init();

  match run(&cli) {
    Ok(value) => println!("{value}"),
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  }
}
