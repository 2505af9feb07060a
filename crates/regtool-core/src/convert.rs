//! Typed decoding of register contents driven by the `Format` parameter.
//!
//! Registers named `<BASE>_LO`/`<BASE>_HI` are treated as the two halves of
//! one wider value. The width of the low half is taken from its mask on every
//! read.

use std::fmt;

use crate::backend::RegisterBackend;
use crate::codecs::{
    decode_fp16, decode_linear11, format_hex, format_ip, EnumTable, LinearTransform,
};
use crate::error::RegisterError;

/// Parameter key holding the register format.
pub const FORMAT_PARAMETER: &str = "Format";

/// Value category a format decodes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ConvertType {
    /// No conversion; shown as hex.
    #[default]
    None,
    /// Unsigned decimal.
    UnsignedInt,
    /// Sign-extended decimal.
    SignedInt,
    /// Floating point.
    Float,
    /// Text.
    String,
}

impl ConvertType {
    /// Classifies a format string without validating it.
    #[must_use]
    pub fn from_format(format: &str) -> Self {
        match format {
            "d" => Self::SignedInt,
            "u" => Self::UnsignedInt,
            "fp16" | "linear11" => Self::Float,
            "x" | "X" => Self::String,
            _ if format.eq_ignore_ascii_case("IP") => Self::String,
            _ if format.starts_with(['t', 'T']) => Self::String,
            _ if format.starts_with(['M', 'm']) => Self::Float,
            _ => Self::None,
        }
    }
}

/// A validated format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueFormat {
    /// `u`
    Unsigned,
    /// `d`
    Signed,
    /// `fp16`
    Fp16,
    /// `linear11`
    Linear11,
    /// `M...` / `m...`
    Linear(LinearTransform),
    /// `t...` / `T...`
    Enum(EnumTable),
    /// `IP`
    Ip,
    /// `x` (bare) or `X` (prefixed)
    Hex {
        /// Emit a `0x` prefix.
        prefixed: bool,
    },
}

impl ValueFormat {
    /// Parses a format string.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::FormattingNotImplemented`] for unknown formats
    /// and propagates codec parse failures.
    pub fn parse(format: &str) -> Result<Self, RegisterError> {
        match ConvertType::from_format(format) {
            ConvertType::None => Err(RegisterError::unsupported_format(format)),
            ConvertType::UnsignedInt => Ok(Self::Unsigned),
            ConvertType::SignedInt => Ok(Self::Signed),
            ConvertType::Float => match format {
                "fp16" => Ok(Self::Fp16),
                "linear11" => Ok(Self::Linear11),
                _ => LinearTransform::parse(format).map(Self::Linear),
            },
            ConvertType::String => match format {
                "x" => Ok(Self::Hex { prefixed: false }),
                "X" => Ok(Self::Hex { prefixed: true }),
                _ if format.eq_ignore_ascii_case("IP") => Ok(Self::Ip),
                _ => EnumTable::parse(format).map(Self::Enum),
            },
        }
    }

    /// Returns the value category of this format.
    #[must_use]
    pub const fn convert_type(&self) -> ConvertType {
        match self {
            Self::Unsigned => ConvertType::UnsignedInt,
            Self::Signed => ConvertType::SignedInt,
            Self::Fp16 | Self::Linear11 | Self::Linear(_) => ConvertType::Float,
            Self::Enum(_) | Self::Ip | Self::Hex { .. } => ConvertType::String,
        }
    }

    /// Decodes a raw value. `sign_bits` is the field width used for sign
    /// extension of signed formats; `None` leaves the value unextended.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn decode(&self, raw: u64, sign_bits: Option<u32>) -> ConvertedValue {
        match self {
            Self::Unsigned => ConvertedValue::Unsigned(raw),
            Self::Signed => ConvertedValue::Signed(
                sign_bits.map_or(raw as i64, |bits| sign_extend(raw, bits)),
            ),
            Self::Fp16 => ConvertedValue::Float(decode_fp16(raw as u16)),
            Self::Linear11 => ConvertedValue::Float(decode_linear11(raw as u16)),
            Self::Linear(transform) => ConvertedValue::Float(transform.apply(raw)),
            Self::Enum(table) => ConvertedValue::Text(table.label(raw)),
            Self::Ip => ConvertedValue::Text(format_ip(raw)),
            Self::Hex { prefixed } => ConvertedValue::Text(format_hex(raw, *prefixed)),
        }
    }
}

/// A decoded register value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConvertedValue {
    /// Unsigned integer.
    Unsigned(u64),
    /// Signed integer.
    Signed(i64),
    /// Floating point.
    Float(f64),
    /// Text.
    Text(String),
}

impl fmt::Display for ConvertedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsigned(value) => write!(f, "{value}"),
            Self::Signed(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// Half of a merged register pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairHalf {
    /// `_LO` suffix.
    Lo,
    /// `_HI` suffix.
    Hi,
}

/// Splits a `_LO`/`_HI` suffix (any case) off a register name.
#[must_use]
pub fn split_pair_name(name: &str) -> Option<(&str, PairHalf)> {
    let split = name.len().checked_sub(3)?;
    let (base, suffix) = (name.get(..split)?, name.get(split..)?);
    if base.is_empty() {
        return None;
    }
    if suffix.eq_ignore_ascii_case("_LO") {
        Some((base, PairHalf::Lo))
    } else if suffix.eq_ignore_ascii_case("_HI") {
        Some((base, PairHalf::Hi))
    } else {
        None
    }
}

/// Returns the `(lo, hi)` register names of a pair when both halves exist.
#[must_use]
pub fn resolve_pair<B: RegisterBackend + ?Sized>(
    backend: &B,
    name: &str,
) -> Option<(String, String)> {
    let (base, _) = split_pair_name(name)?;
    let lower = name.ends_with(|c: char| c.is_ascii_lowercase());
    let (lo, hi) = if lower {
        (format!("{base}_lo"), format!("{base}_hi"))
    } else {
        (format!("{base}_LO"), format!("{base}_HI"))
    };
    (backend.address(&lo).is_ok() && backend.address(&hi).is_ok()).then_some((lo, hi))
}

/// Number of contiguous set bits starting at the lowest set bit of `mask`.
#[must_use]
pub const fn contiguous_bit_count(mask: u32) -> u32 {
    if mask == 0 {
        0
    } else {
        (mask >> mask.trailing_zeros()).trailing_ones()
    }
}

/// Two's-complement sign extension of the low `bits` bits of `value`.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub const fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits == 0 {
        return 0;
    }
    if bits >= 64 {
        return value as i64;
    }
    let field = value & ((1u64 << bits) - 1);
    let sign = 1u64 << (bits - 1);
    (field ^ sign) as i64 - sign as i64
}

/// Reads a register, merging `_LO`/`_HI` halves into one value.
///
/// Both halves are read on every call; the high half is shifted by the
/// contiguous width of the low half's mask.
///
/// # Errors
///
/// Propagates backend lookup and read failures.
pub fn compute_merged_value<B: RegisterBackend + ?Sized>(
    backend: &mut B,
    name: &str,
) -> Result<u64, RegisterError> {
    let Some((lo, hi)) = resolve_pair(backend, name) else {
        return Ok(u64::from(backend.read_name(name)?));
    };
    let width = contiguous_bit_count(backend.mask(&lo)?);
    let low = u64::from(backend.read_name(&lo)?);
    let high = u64::from(backend.read_name(&hi)?);
    Ok(low | (high << width))
}

/// Classifies a register by its `Format` parameter.
///
/// # Errors
///
/// Returns [`RegisterError::BadRegName`] for unknown registers.
pub fn convert_type<B: RegisterBackend + ?Sized>(
    backend: &B,
    name: &str,
) -> Result<ConvertType, RegisterError> {
    Ok(backend
        .parameter(name, FORMAT_PARAMETER)?
        .map_or(ConvertType::None, |format| ConvertType::from_format(&format)))
}

/// Reads a register and decodes it according to its `Format` parameter.
///
/// Registers without a format decode as unsigned. Signed values are sign
/// extended using the register mask unless the register is a merged pair.
///
/// # Errors
///
/// Returns [`RegisterError::FormattingNotImplemented`] for unknown formats and
/// propagates backend failures.
pub fn read_convert<B: RegisterBackend + ?Sized>(
    backend: &mut B,
    name: &str,
) -> Result<ConvertedValue, RegisterError> {
    let Some(format) = backend.parameter(name, FORMAT_PARAMETER)? else {
        return compute_merged_value(backend, name).map(ConvertedValue::Unsigned);
    };
    let format = ValueFormat::parse(&format)?;
    let raw = compute_merged_value(backend, name)?;
    let sign_bits = if resolve_pair(backend, name).is_some() {
        None
    } else {
        Some(contiguous_bit_count(backend.mask(name)?))
    };
    Ok(format.decode(raw, sign_bits))
}
