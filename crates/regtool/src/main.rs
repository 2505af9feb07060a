//! CLI entry point for the regtool binary.

use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use regtool::address_table::AddressTable;
use regtool::commands::{self, parse_number, ReadOptions};
use regtool_core::{MarkupStyle, RegisterNameCase, StatusMode};
use serde as _;
#[cfg(test)]
use tempfile as _;
use toml as _;
use tracing as _;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter; overrides `-v`.
const LOG_ENV: &str = "REGTOOL_LOG";

#[derive(Debug, Parser)]
#[command(name = "regtool")]
#[command(version)]
#[command(about = "Register access, value conversion and status reports")]
struct Cli {
    /// Address table (TOML) describing the registers
    #[arg(short = 'a', long, value_name = "FILE")]
    address_table: PathBuf,

    /// Register name case folding (overrides the table setting)
    #[arg(long, value_enum)]
    case: Option<CaseArg>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CaseArg {
    Upper,
    Lower,
    CaseSensitive,
}

impl From<CaseArg> for RegisterNameCase {
    fn from(case: CaseArg) -> Self {
        match case {
            CaseArg::Upper => Self::Upper,
            CaseArg::Lower => Self::Lower,
            CaseArg::CaseSensitive => Self::CaseSensitive,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// List registers matching a glob pattern
    List {
        /// Register name pattern
        #[arg(default_value = "*")]
        pattern: String,
        /// Print each register's description
        #[arg(long)]
        describe: bool,
        /// Only registers whose parameter NAME equals VALUE
        #[arg(long, num_args = 2, value_names = ["NAME", "VALUE"])]
        param: Option<Vec<String>>,
    },
    /// Read registers by name pattern, or a range of words by address
    Read {
        /// Register pattern or word address
        target: String,
        /// Number of values to read
        #[arg(default_value_t = 1)]
        count: usize,
        /// Print 64-bit values built from word pairs
        #[arg(long)]
        wide: bool,
        /// Leave zero values blank
        #[arg(long)]
        skip_zero: bool,
        /// Word offset added to the target address
        #[arg(long, value_parser = parse_number, default_value = "0")]
        offset: u32,
    },
    /// Read words repeatedly from one FIFO address
    ReadFifo {
        /// Register name or word address
        target: String,
        /// Number of words to read
        count: usize,
    },
    /// Write a word repeatedly to one FIFO address
    WriteFifo {
        /// Register name or word address
        target: String,
        /// Word to write
        #[arg(value_parser = parse_number)]
        value: u32,
        /// Number of writes
        #[arg(default_value_t = 1)]
        count: usize,
    },
    /// Read registers and decode them with their Format parameter
    Convert {
        /// Register name pattern
        #[arg(default_value = "*")]
        pattern: String,
    },
    /// Write a register or address; without a value, perform an action write
    Write {
        /// Register name or word address
        target: String,
        /// Value to write
        #[arg(value_parser = parse_number)]
        value: Option<u32>,
        /// Number of consecutive words to write
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Word offset added to the target address
        #[arg(long, value_parser = parse_number, default_value = "0")]
        offset: u32,
    },
    /// Print the status report
    Status {
        /// Report level (99 shows every cell)
        level: Option<u32>,
        /// Output mode: text, html, bare-html, latex or graphite
        #[arg(long, value_parser = parse_mode)]
        mode: Option<StatusMode>,
        /// Only render the named table
        #[arg(long)]
        table: Option<String>,
        /// Use the legacy single-underscore markup
        #[arg(long)]
        legacy_markup: bool,
    },
}

fn parse_mode(text: &str) -> Result<StatusMode, String> {
    StatusMode::from_str(text).map_err(|err| err.to_string())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run<W: Write>(cli: Cli, out: &mut W) -> Result<()> {
    let table = AddressTable::load(&cli.address_table)?;
    let mut backend = table.backend(cli.case.map(RegisterNameCase::from))?;

    let result = match cli.command {
        Command::List {
            pattern,
            describe,
            param,
        } => {
            let parameter = match param.as_deref() {
                Some([key, value]) => Some((key.as_str(), value.as_str())),
                _ => None,
            };
            commands::list(&backend, out, &pattern, describe, parameter)
        }
        Command::Read {
            target,
            count,
            wide,
            skip_zero,
            offset,
        } => {
            let options = ReadOptions {
                count,
                wide,
                skip_zero,
                offset,
            };
            commands::read(&mut backend, out, &target, &options)
        }
        Command::ReadFifo { target, count } => {
            commands::read_fifo(&mut backend, out, &target, count)
        }
        Command::WriteFifo {
            target,
            value,
            count,
        } => commands::write_fifo(&mut backend, out, &target, value, count),
        Command::Convert { pattern } => commands::convert(&mut backend, out, &pattern),
        Command::Write {
            target,
            value,
            count,
            offset,
        } => commands::write(&mut backend, out, &target, value, count, offset),
        Command::Status {
            level,
            mode,
            table: single_table,
            legacy_markup,
        } => {
            let mut config = table.report_config(env!("CARGO_PKG_VERSION"));
            if let Some(mode) = mode {
                config.mode = mode;
            }
            if legacy_markup {
                config.markup = MarkupStyle::Legacy;
            }
            let level = level.unwrap_or_else(|| table.status_level());
            commands::status(&mut backend, out, config, level, single_table.as_deref())
        }
    };
    result.with_context(|| format!("using {}", cli.address_table.display()))
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let exit_code = match run(cli, &mut out).and_then(|()| out.flush().map_err(Into::into)) {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("error: {error:#}");
            1
        }
    };

    std::process::exit(exit_code);
}
