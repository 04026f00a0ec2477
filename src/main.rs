#[macro_use] extern crate prettytable;

use std::convert::TryFrom;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use prettytable::Table;
use tracing_subscriber::filter::EnvFilter;

use avm1_bytecode::analysis::{check_stack, required_version};
use avm1_bytecode::bytecode::{opcode, Descriptor};
use avm1_bytecode::{disassemble, encode, listing, Decoder, InstructionSequence};

#[derive(Parser)]
#[command(name = "avm1", version, about = "Inspect and round-trip AVM1 action blocks")]
struct Cli {
  /// Refuse input files larger than this many bytes.
  #[arg(long, global = true, default_value_t = 16 * 1024 * 1024)]
  max_bytes: u64,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Print one line per instruction.
  Disasm {
    file: PathBuf,
    /// The file holds hex digits rather than raw bytes.
    #[arg(long)]
    hex: bool,
    /// Print a table with offsets and stack effects.
    #[arg(long)]
    table: bool,
  },
  /// Decode then encode, and compare with the input.
  Roundtrip {
    file: PathBuf,
    #[arg(long)]
    hex: bool,
  },
  /// List the opcode table.
  Opcodes,
  /// Describe one opcode, by mnemonic or by code (`0x96` or `150`).
  Lookup {
    name: String,
  },
  /// Report stack depth problems and the movie version the block needs.
  Check {
    file: PathBuf,
    #[arg(long)]
    hex: bool,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_writer(std::io::stderr)
    .init();

  #[cfg(feature = "trace_codec")]
  eprintln!("Codec tracing ENABLED");

  let cli = Cli::parse();

  match cli.command {
    Commands::Disasm { file, hex, table } => {
      let sequence = load(&file, hex, cli.max_bytes)?;
      match table {
        true  => {
          listing(&sequence).printstd();
        }
        false => {
          for line in disassemble(&sequence) {
            println!("{}", line);
          }
        }
      }
    }

    Commands::Roundtrip { file, hex } => {
      let bytes = read_input(&file, hex, cli.max_bytes)?;
      let sequence = Decoder::new().decode(&bytes)?;
      let encoded = encode(&sequence)?;
      match bytes.iter().zip(encoded.iter()).position(|(a, b)| a != b) {
        Some(offset) => bail!("re-encoded block differs from the input at offset {}", offset),
        None if encoded.len() > bytes.len() => bail!("re-encoded block is longer than the input"),
        None => {
          println!("{} bytes reproduced", encoded.len());
          if bytes.len() > encoded.len() {
            println!("{} trailing bytes ignored", bytes.len() - encoded.len());
          }
        }
      }
    }

    Commands::Opcodes => {
      let mut table = Table::new();
      table.set_titles(row![ubr->"Code", ubl->"Mnemonic", ubc->"Stack", ubl->"Operands", ubr->"Since"]);
      for descriptor in opcode::table().iter() {
        table.add_row(row![
          r->format!("0x{:02X}", descriptor.code),
          descriptor.mnemonic,
          c->stack_text(descriptor),
          format!("{:?}", descriptor.layout),
          r->descriptor.since
        ]);
      }
      table.printstd();
    }

    Commands::Lookup { name } => {
      let descriptor = lookup(&name)?;
      println!("code:     0x{:02X}", descriptor.code);
      println!("mnemonic: {}", descriptor.mnemonic);
      println!("stack:    {}", stack_text(descriptor));
      println!("operands: {:?}", descriptor.layout);
      println!("since:    SWF {}", descriptor.since);
    }

    Commands::Check { file, hex } => {
      let sequence = load(&file, hex, cli.max_bytes)?;
      let issues = check_stack(&sequence);
      for issue in &issues {
        println!("{}", issue);
      }
      if issues.is_empty() {
        println!("no stack issues found");
      }
      match required_version(&sequence) {
        Some(version) => println!("requires SWF {}", version),
        None => println!("no known actions")
      }
    }
  }

  Ok(())
}

fn read_input(path: &Path, hex: bool, max_bytes: u64) -> Result<Vec<u8>> {
  let size = std::fs::metadata(path)
    .with_context(|| format!("cannot read {}", path.display()))?
    .len();
  if size > max_bytes {
    bail!("{} is {} bytes, over the limit of {}", path.display(), size, max_bytes);
  }
  let bytes = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
  match hex {
    true  => parse_hex(&String::from_utf8(bytes)?),
    false => Ok(bytes)
  }
}

fn load(path: &Path, hex: bool, max_bytes: u64) -> Result<InstructionSequence> {
  let bytes = read_input(path, hex, max_bytes)?;
  let mut decoder = Decoder::new();
  let sequence = decoder.decode(&bytes)?;
  let diagnostics = decoder.diagnostics().len();
  if diagnostics > 0 {
    eprintln!("{} instruction(s) kept as raw bytes", diagnostics);
  }
  Ok(sequence)
}

/// Hex digits, optionally separated by whitespace.
fn parse_hex(text: &str) -> Result<Vec<u8>> {
  let digits: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
  if digits.len() % 2 != 0 {
    bail!("odd number of hex digits");
  }
  digits.chunks(2)
        .map(|pair| {
          let byte: String = pair.iter().collect();
          u8::from_str_radix(&byte, 16).map_err(|_| anyhow!("`{}` is not a hex byte", byte))
        })
        .collect()
}

fn lookup(name: &str) -> Result<&'static Descriptor> {
  let code = match name.strip_prefix("0x").or_else(|| name.strip_prefix("0X")) {
    Some(digits) => Some(u8::from_str_radix(digits, 16)?),
    None => name.parse::<u32>().ok().map(u8::try_from).transpose()?
  };
  let descriptor = match code {
    Some(code) => opcode::lookup(code)?,
    None => opcode::lookup_by_mnemonic(name)?
  };
  Ok(descriptor)
}

fn stack_text(descriptor: &Descriptor) -> String {
  let count = |value: Option<u8>| value.map_or("?".to_string(), |value| value.to_string());
  format!("{}/{}", count(descriptor.pop_count), count(descriptor.push_count))
}
