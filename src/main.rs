use std::path::PathBuf;

use clap::Parser;
use regvm::asm::Dialect;
use regvm::machine::{Exit, JumpMode, Machine};

#[derive(Parser)]
#[command(name = "regvm", about = "Run a register-machine program")]
struct Cli {
    /// Program source file, one instruction per line.
    program: PathBuf,

    /// Mnemonic dialect (assembunny, duet, lock, handheld, canonical).
    #[arg(long, default_value = "canonical")]
    dialect: Dialect,

    /// Initial register value as NAME=VALUE. May be repeated.
    #[arg(long = "set", value_parser = parse_assignment)]
    assignments: Vec<(String, i64)>,

    /// Comma-separated values for the input queue.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    input: Vec<i64>,

    /// Stop after this many executed instructions.
    #[arg(long)]
    step_limit: Option<u64>,

    /// Treat jump operands as absolute addresses instead of offsets.
    #[arg(long)]
    absolute: bool,

    /// Mask applied to every register write (e.g. 0xffff).
    #[arg(long, value_parser = parse_mask)]
    mask: Option<i64>,

    /// Print the decoded program before running it.
    #[arg(long)]
    listing: bool,
}

/// Parse a "NAME=VALUE" register assignment.
fn parse_assignment(s: &str) -> Result<(String, i64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid assignment '{s}', expected NAME=VALUE (e.g. a=7)"))?;
    let value = value
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("Invalid value for register '{name}': {e}"))?;
    Ok((name.trim().to_string(), value))
}

/// Parse a decimal or 0x-prefixed hexadecimal mask.
fn parse_mask(s: &str) -> Result<i64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => s.parse::<i64>(),
    };
    parsed.map_err(|e| format!("Invalid mask '{s}': {e}"))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(&cli.program)
        .map_err(|e| format!("Cannot read {}: {e}", cli.program.display()))?;
    let program = cli.dialect.decode(&source)?;

    let mut config = cli.dialect.config();
    config.step_limit = cli.step_limit;
    config.word_mask = cli.mask;
    if cli.absolute {
        config.jump_mode = JumpMode::Absolute;
    }

    if cli.listing {
        eprint!("{}", program.listing(&config.registers));
    }

    let mut machine = Machine::new(program, config)?;
    for (name, value) in &cli.assignments {
        machine.write_register(name, *value)?;
    }
    machine.extend_input(cli.input.iter().copied());

    let start = std::time::Instant::now();
    let exit = machine.run_to_end()?;
    let elapsed = start.elapsed();

    for (name, value) in machine.registers() {
        println!("{name} = {value}");
    }
    let output = machine.drain_output();
    if !output.is_empty() {
        let joined: Vec<String> = output.iter().map(i64::to_string).collect();
        println!("output: {}", joined.join(","));
    }

    let state = match exit {
        Exit::Halted => "halted",
        Exit::AwaitingInput => "awaiting input",
        Exit::Cancelled => "step limit reached",
    };
    eprintln!("{state} at pc {} after {} steps ({elapsed:.2?})", machine.pc(), machine.steps());
    Ok(())
}
