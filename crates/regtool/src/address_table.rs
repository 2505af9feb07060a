//! TOML address tables: register descriptors plus simulated initial values.
//!
//! ```toml
//! [settings]
//! name_case = "upper"
//! markup = "positional"
//! status_level = 1
//!
//! [[register]]
//! name = "TEMP_LO"
//! address = 0x10
//! mask = 0xFFFF
//! value = 0x1234
//! parameters = { Table = "BOARD1", Row = "__0", Column = "VALUE", Status = 1, Format = "u" }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regtool_core::{
    MarkupStyle, MemoryBackend, RegisterDescriptor, RegisterNameCase, ReportConfig, StatusMode,
};
use serde::Deserialize;

/// Report level used when neither the command line nor the table sets one.
pub const DEFAULT_STATUS_LEVEL: u32 = 1;

/// Table-wide defaults, all overridable from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Register name folding.
    pub name_case: RegisterNameCase,
    /// Row/column markup dialect.
    pub markup: MarkupStyle,
    /// Default report level for `status`.
    pub status_level: Option<u32>,
    /// Default report mode for `status`.
    pub mode: StatusMode,
    /// Report title.
    pub title: String,
    /// Report authors, most recent first.
    pub authors: Vec<String>,
}

/// A parameter value; TOML integers and booleans are accepted for
/// convenience and stored as text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// Text value.
    Text(String),
    /// Integer value.
    Integer(i64),
    /// Boolean value, stored as `1` or `0`.
    Flag(bool),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Flag(flag) => f.write_str(if *flag { "1" } else { "0" }),
        }
    }
}

const fn full_mask() -> u32 {
    u32::MAX
}

const fn single_word() -> u32 {
    1
}

fn read_write() -> String {
    "rw".to_string()
}

fn single_mode() -> String {
    "single".to_string()
}

/// One `[[register]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterEntry {
    /// Register name.
    pub name: String,
    /// Word address.
    pub address: u32,
    /// Field mask.
    #[serde(default = "full_mask")]
    pub mask: u32,
    /// Word count.
    #[serde(default = "single_word")]
    pub size: u32,
    /// Permission letters (`r`, `w`).
    #[serde(default = "read_write")]
    pub permissions: String,
    /// Access mode.
    #[serde(default = "single_mode")]
    pub mode: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Named parameters (`Table`, `Row`, `Column`, `Status`, `Format`, ...).
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterValue>,
    /// Raw word stored at `address` when the backend is built.
    #[serde(default)]
    pub value: Option<u32>,
}

impl RegisterEntry {
    fn descriptor(&self) -> RegisterDescriptor {
        self.parameters.iter().fold(
            RegisterDescriptor::new(&self.name, self.address)
                .with_mask(self.mask)
                .with_size(self.size)
                .with_permissions(&self.permissions)
                .with_mode(&self.mode)
                .with_description(&self.description),
            |descriptor, (key, value)| descriptor.with_parameter(key, value.to_string()),
        )
    }
}

/// A parsed address table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddressTable {
    /// Table-wide settings.
    #[serde(default)]
    pub settings: Settings,
    /// Registers in declaration order.
    #[serde(default, rename = "register")]
    pub registers: Vec<RegisterEntry>,
}

impl AddressTable {
    /// Parses an address table from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error when the text is not a valid address table.
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("failed to parse address table")
    }

    /// Reads and parses an address table file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read address table {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Builds an in-memory backend holding every register and initial value.
    ///
    /// `name_case` overrides the table setting.
    ///
    /// # Errors
    ///
    /// Returns an error when two registers fold to the same name.
    pub fn backend(&self, name_case: Option<RegisterNameCase>) -> Result<MemoryBackend> {
        let mut backend = MemoryBackend::new(name_case.unwrap_or(self.settings.name_case));
        for entry in &self.registers {
            backend
                .insert(entry.descriptor())
                .with_context(|| format!("register {} at 0x{:X}", entry.name, entry.address))?;
            if let Some(value) = entry.value {
                backend.poke(entry.address, value);
            }
        }
        tracing::debug!(registers = self.registers.len(), "address table loaded");
        Ok(backend)
    }

    /// Report settings derived from the table, stamped with `version`.
    #[must_use]
    pub fn report_config(&self, version: &str) -> ReportConfig {
        ReportConfig {
            mode: self.settings.mode,
            markup: self.settings.markup,
            title: self.settings.title.clone(),
            authors: self.settings.authors.clone(),
            version: version.to_string(),
        }
    }

    /// Report level from the settings, or [`DEFAULT_STATUS_LEVEL`].
    #[must_use]
    pub fn status_level(&self) -> u32 {
        self.settings.status_level.unwrap_or(DEFAULT_STATUS_LEVEL)
    }
}
