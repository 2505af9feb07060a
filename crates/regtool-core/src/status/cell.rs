//! One status-table entry: display metadata plus the raw words read for it.

use std::fmt;

use crate::backend::RegisterBackend;
use crate::codecs::parse_number;
use crate::convert::{
    contiguous_bit_count, ConvertType, ConvertedValue, PairHalf, ValueFormat,
    FORMAT_PARAMETER,
};
use crate::error::RegisterError;

/// Format used when a register has no `Format` parameter.
pub const DEFAULT_CELL_FORMAT: &str = "X";

/// Maximum number of words a cell accepts (one `_LO`/`_HI` pair).
pub const MAX_FILLS: usize = 2;

/// Per-cell display rule from the `Show` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum DisplayRule {
    /// No extra condition.
    #[default]
    Always,
    /// `NZ`: shown only when non-zero.
    NonZero,
    /// `Z`: shown only when zero.
    Zero,
    /// `NZR`: a zero value hides the whole row.
    NonZeroRow,
}

impl DisplayRule {
    /// Parses a `Show` parameter, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadValue`] for unknown rules.
    pub fn parse(rule: &str) -> Result<Self, RegisterError> {
        match rule.to_ascii_uppercase().as_str() {
            "" => Ok(Self::Always),
            "NZ" => Ok(Self::NonZero),
            "Z" => Ok(Self::Zero),
            "NZR" => Ok(Self::NonZeroRow),
            other => Err(RegisterError::bad_value(format!(
                "unknown display rule {other}"
            ))),
        }
    }

    /// Returns the canonical `Show` spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Always => "",
            Self::NonZero => "NZ",
            Self::Zero => "Z",
            Self::NonZeroRow => "NZR",
        }
    }
}

impl fmt::Display for DisplayRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display metadata gathered from one register's parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSettings {
    /// Register description.
    pub description: String,
    /// Raw `Format` text.
    pub format: String,
    /// Validated format, `None` when the format has no conversion.
    pub value_format: Option<ValueFormat>,
    /// `Show` rule.
    pub rule: DisplayRule,
    /// `Status` level; 0 never displays.
    pub status_level: u32,
    /// `Enabled` flag; false only for the literal `"0"`.
    pub enabled: bool,
    /// Register mask.
    pub mask: u32,
    /// Whether the register can be read.
    pub readable: bool,
}

impl CellSettings {
    /// Reads the display parameters of `register`.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadValue`] for a non-numeric `Status` or an
    /// unknown `Show` rule, propagates format parse failures and backend
    /// lookup failures.
    pub fn from_backend<B: RegisterBackend + ?Sized>(
        backend: &B,
        register: &str,
    ) -> Result<Self, RegisterError> {
        let format = backend
            .parameter(register, FORMAT_PARAMETER)?
            .unwrap_or_else(|| DEFAULT_CELL_FORMAT.to_string());
        let value_format = match ConvertType::from_format(&format) {
            ConvertType::None => None,
            _ => Some(ValueFormat::parse(&format)?),
        };
        let status_level = match backend.parameter(register, "Status")? {
            None => 0,
            Some(level) if level.trim().is_empty() => 0,
            Some(level) => parse_number(level.trim())
                .and_then(|level| u32::try_from(level).ok())
                .ok_or_else(|| {
                    RegisterError::bad_value(format!(
                        "register {register} has non-numeric Status {level}"
                    ))
                })?,
        };
        let rule = DisplayRule::parse(&backend.parameter(register, "Show")?.unwrap_or_default())?;
        let enabled = backend.parameter(register, "Enabled")?.as_deref() != Some("0");

        Ok(Self {
            description: backend.description(register)?,
            format,
            value_format,
            rule,
            status_level,
            enabled,
            mask: backend.mask(register)?,
            readable: backend.permissions(register)?.contains('r'),
        })
    }
}

/// A status-table cell.
///
/// A cell is configured once per register that maps onto it (twice for a
/// merged pair) and then filled with at most [`MAX_FILLS`] words.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusCell {
    address: String,
    row: String,
    col: String,
    description: String,
    format: String,
    value_format: Option<ValueFormat>,
    rule: DisplayRule,
    status_level: u32,
    enabled: bool,
    mask: u32,
    configured: bool,
    fills: Vec<(u32, u32)>,
}

impl StatusCell {
    /// Configures the cell for `address` at (`row`, `col`).
    ///
    /// The first call fixes address, row, column, format and rule; later
    /// calls for the other half of a pair must agree exactly. Descriptions of
    /// both halves are concatenated and the mask is taken from the low half.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadValue`] on any mismatch; the cell is left
    /// unchanged.
    pub fn setup(
        &mut self,
        address: &str,
        row: &str,
        col: &str,
        settings: CellSettings,
        half: Option<PairHalf>,
    ) -> Result<(), RegisterError> {
        if self.configured {
            let checks = [
                ("address", self.address.as_str(), address),
                ("row", self.row.as_str(), row),
                ("col", self.col.as_str(), col),
                ("format", self.format.as_str(), settings.format.as_str()),
                ("rule", self.rule.as_str(), settings.rule.as_str()),
            ];
            for (field, current, incoming) in checks {
                if current != incoming {
                    tracing::error!(
                        cell = %self.address,
                        field,
                        current,
                        incoming,
                        "conflicting cell configuration"
                    );
                    return Err(RegisterError::bad_value(format!(
                        "{} {field} mismatch: {current} != {incoming}",
                        self.address
                    )));
                }
            }
        } else {
            self.address = address.to_string();
            self.row = row.to_string();
            self.col = col.to_string();
            self.format = settings.format;
            self.value_format = settings.value_format;
            self.rule = settings.rule;
            self.configured = true;
        }

        self.description.push_str(&settings.description);
        self.status_level = settings.status_level;
        self.enabled = settings.enabled;
        if half != Some(PairHalf::Hi) || self.mask == 0 {
            self.mask = settings.mask;
        }
        Ok(())
    }

    /// Appends one word read for this cell, to be shifted left by `shift`.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadValue`] past [`MAX_FILLS`] words.
    pub fn fill(&mut self, word: u32, shift: u32) -> Result<(), RegisterError> {
        if self.fills.len() >= MAX_FILLS {
            return Err(RegisterError::bad_value(format!(
                "cell {} already holds {MAX_FILLS} words",
                self.address
            )));
        }
        self.fills.push((word, shift));
        Ok(())
    }

    /// Number of words filled so far.
    #[must_use]
    pub fn fill_count(&self) -> usize {
        self.fills.len()
    }

    /// Combined raw value: a single word is used unshifted, otherwise every
    /// word is shifted and summed.
    #[must_use]
    pub fn raw_value(&self) -> u64 {
        match self.fills.as_slice() {
            [(word, _)] => u64::from(*word),
            fills => fills
                .iter()
                .map(|(word, shift)| u64::from(*word).checked_shl(*shift).unwrap_or(0))
                .fold(0, u64::wrapping_add),
        }
    }

    fn sign_bits(&self) -> Option<u32> {
        (self.fills.len() == 1).then(|| contiguous_bit_count(self.mask))
    }

    /// Decoded value, `None` when the format has no conversion.
    #[must_use]
    pub fn value(&self) -> Option<ConvertedValue> {
        self.value_format
            .as_ref()
            .map(|format| format.decode(self.raw_value(), self.sign_bits()))
    }

    /// Decides whether the cell is shown at report `level`.
    #[must_use]
    pub fn display(&self, level: u32, force: bool) -> bool {
        let raw = self.raw_value();
        let mut shown = level >= self.status_level && self.status_level != 0;
        match self.rule {
            DisplayRule::NonZero => shown &= raw != 0,
            DisplayRule::Zero => shown &= raw == 0,
            DisplayRule::Always | DisplayRule::NonZeroRow => {}
        }
        (shown && self.enabled) || force
    }

    /// Returns `true` when this cell hides its whole row.
    #[must_use]
    pub fn suppress_row(&self, force: bool) -> bool {
        self.rule == DisplayRule::NonZeroRow && self.raw_value() == 0 && !force
    }

    /// Formats the value, padding numbers to `width` when given.
    #[must_use]
    pub fn print(&self, width: Option<usize>) -> String {
        let raw = self.raw_value();
        match &self.value_format {
            None => format_cell_hex(raw, width, false),
            Some(ValueFormat::Hex { .. }) => format_cell_hex(raw, width, true),
            Some(format) => match format.decode(raw, self.sign_bits()) {
                ConvertedValue::Text(text) => text,
                ConvertedValue::Float(value) => match format {
                    ValueFormat::Fp16 => {
                        let magnitude = value.abs();
                        if (magnitude > 10_000.0 || magnitude < 0.001) && value != 0.0 {
                            format_scientific(value, 2)
                        } else {
                            format!("{value:3.2}")
                        }
                    }
                    ValueFormat::Linear11 => format!("{value:3.3}"),
                    _ => format!("{value:3.2}"),
                },
                ConvertedValue::Signed(value) => match width {
                    Some(width) => format!("{value:>width$}"),
                    None => value.to_string(),
                },
                ConvertedValue::Unsigned(value) => match width {
                    Some(width) => format!("{value:>width$}"),
                    None => value.to_string(),
                },
            },
        }
    }

    /// Register name, or the base name of a merged pair.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Row name.
    #[must_use]
    pub fn row(&self) -> &str {
        &self.row
    }

    /// Column name.
    #[must_use]
    pub fn col(&self) -> &str {
        &self.col
    }

    /// Concatenated register descriptions.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Raw `Format` text.
    #[must_use]
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Display rule.
    #[must_use]
    pub const fn rule(&self) -> DisplayRule {
        self.rule
    }

    /// Status level.
    #[must_use]
    pub const fn status_level(&self) -> u32 {
        self.status_level
    }

    /// Enabled flag.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Mask of the (low) register.
    #[must_use]
    pub const fn mask(&self) -> u32 {
        self.mask
    }
}

/// Hex rendering used by status tables. Values of 10 and above get a `0x`
/// prefix that counts against `width`; `zero_pad` pads with zeros instead of
/// spaces.
fn format_cell_hex(value: u64, width: Option<usize>, zero_pad: bool) -> String {
    let prefix = if value >= 10 { "0x" } else { "" };
    let Some(width) = width else {
        return format!("{prefix}{value:X}");
    };
    let width = width.saturating_sub(prefix.len());
    if zero_pad {
        format!("{prefix}{value:0width$X}")
    } else {
        format!("{prefix}{value:>width$X}")
    }
}

/// Scientific notation with a signed two-digit exponent, e.g. `1.23e+04`.
fn format_scientific(value: f64, precision: usize) -> String {
    let rendered = format!("{value:.precision$e}");
    let Some((mantissa, exponent)) = rendered.split_once('e') else {
        return rendered;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return rendered;
    };
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
}
