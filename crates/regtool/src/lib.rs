//! Command-line support for regtool: address tables and register commands.

/// TOML address tables and the in-memory backend they build.
pub mod address_table;
pub use address_table::{
    AddressTable, ParameterValue, RegisterEntry, Settings, DEFAULT_STATUS_LEVEL,
};

/// Register commands writing human-readable output.
pub mod commands;
pub use commands::{parse_number, ReadOptions, Target};

use clap as _;
use tracing_subscriber as _;
#[cfg(test)]
use tempfile as _;
