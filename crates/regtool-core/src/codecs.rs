//! Stateless decoders for the register `Format` language.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::error::RegisterError;

/// Decodes an IEEE-754 half-precision bit pattern.
#[must_use]
pub fn decode_fp16(raw: u16) -> f64 {
    let negative = raw & 0x8000 != 0;
    let exponent = (raw >> 10) & 0x1F;
    let significand = raw & 0x03FF;
    let fraction = f64::from(significand) / 1024.0;

    let magnitude = match exponent {
        0 => fraction * 2f64.powi(-14),
        0x1F if significand == 0 => f64::INFINITY,
        0x1F => return f64::NAN,
        _ => (1.0 + fraction) * 2f64.powi(i32::from(exponent) - 15),
    };

    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Decodes a PMBus linear11 word: 11-bit signed mantissa, 5-bit signed exponent.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn decode_linear11(raw: u16) -> f64 {
    let mantissa = ((raw << 5) as i16) >> 5;
    let exponent = (raw as i16) >> 11;
    f64::from(mantissa) * 2f64.powi(i32::from(exponent))
}

/// Renders the low 32 bits as a dotted-quad IPv4 address, most significant
/// byte first.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn format_ip(raw: u64) -> String {
    Ipv4Addr::from(raw as u32).to_string()
}

/// Renders a value as uppercase hex, optionally with a `0x` prefix.
#[must_use]
pub fn format_hex(raw: u64, prefixed: bool) -> String {
    if prefixed {
        format!("0x{raw:X}")
    } else {
        format!("{raw:X}")
    }
}

/// Parses a decimal or `0x`-prefixed hexadecimal number.
pub(crate) fn parse_number(token: &str) -> Option<u64> {
    token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .map_or_else(|| token.parse().ok(), |hex| u64::from_str_radix(hex, 16).ok())
}

/// Underscore-delimited tokens following the leading format letter.
fn format_tokens(format: &str) -> impl Iterator<Item = &str> {
    format
        .get(1..)
        .unwrap_or_default()
        .split('_')
        .filter(|token| !token.is_empty())
}

/// Linear scaling `y = ±(m_num/m_den)·x ± (b_num/b_den)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearTransform {
    slope_negative: bool,
    slope_num: u64,
    slope_den: u64,
    offset_negative: bool,
    offset_num: u64,
    offset_den: u64,
}

impl LinearTransform {
    /// Parses `M<sign>_<m_num>_<m_den>_<sign>_<b_num>_<b_den>`.
    ///
    /// A sign token of `0` selects a negative term.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::FormattingNotImplemented`] unless exactly six
    /// numbers follow the leading letter, and [`RegisterError::BadValue`] for a
    /// zero denominator.
    pub fn parse(format: &str) -> Result<Self, RegisterError> {
        let values = format_tokens(format)
            .map(parse_number)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| RegisterError::unsupported_format(format))?;
        let &[slope_sign, slope_num, slope_den, offset_sign, offset_num, offset_den] =
            values.as_slice()
        else {
            return Err(RegisterError::unsupported_format(format));
        };
        if slope_den == 0 || offset_den == 0 {
            return Err(RegisterError::bad_value(format!(
                "zero denominator in format {format}"
            )));
        }
        Ok(Self {
            slope_negative: slope_sign == 0,
            slope_num,
            slope_den,
            offset_negative: offset_sign == 0,
            offset_num,
            offset_den,
        })
    }

    /// Applies the transform to a raw value.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn apply(&self, raw: u64) -> f64 {
        let mut slope = self.slope_num as f64 / self.slope_den as f64;
        if self.slope_negative {
            slope = -slope;
        }
        let mut offset = self.offset_num as f64 / self.offset_den as f64;
        if self.offset_negative {
            offset = -offset;
        }
        slope.mul_add(raw as f64, offset)
    }
}

/// Integer to label table parsed from `t`/`T` formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumTable {
    labels: BTreeMap<u64, String>,
    show_value: bool,
}

impl EnumTable {
    /// Parses `t_<value>_<label>...` (bare label) or `T_<value>_<label>...`
    /// (label followed by the hex value).
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::FormattingNotImplemented`] when the format is
    /// not an enumeration, and [`RegisterError::BadValue`] for a non-numeric
    /// value or a value without a label.
    pub fn parse(format: &str) -> Result<Self, RegisterError> {
        let show_value = match format.chars().next() {
            Some('t') => false,
            Some('T') => true,
            _ => return Err(RegisterError::unsupported_format(format)),
        };
        let tokens: Vec<&str> = format_tokens(format).collect();
        let mut labels = BTreeMap::new();
        for pair in tokens.chunks(2) {
            let [value, label] = pair else {
                return Err(RegisterError::bad_value(format!(
                    "enumeration value without label in format {format}"
                )));
            };
            let value = parse_number(value).ok_or_else(|| {
                RegisterError::bad_value(format!(
                    "enumeration value {value} is not a number in format {format}"
                ))
            })?;
            labels.insert(value, (*label).to_string());
        }
        Ok(Self { labels, show_value })
    }

    /// Looks up `raw`, falling back to `0x<HEX>` for unmapped values.
    #[must_use]
    pub fn label(&self, raw: u64) -> String {
        match self.labels.get(&raw) {
            Some(label) if self.show_value => format!("{label} (0x{raw:X})"),
            Some(label) => label.clone(),
            None => format_hex(raw, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{
        decode_fp16, decode_linear11, format_hex, format_ip, EnumTable, LinearTransform,
    };
    use crate::error::ErrorKind;

    #[rstest]
    #[case(0x0000, 0.0)]
    #[case(0x3C00, 1.0)]
    #[case(0xC100, -2.5)]
    #[case(0x7BFF, 65504.0)]
    #[case(0x0001, 2f64.powi(-24))]
    #[case(0x3555, 0.333_251_953_125)]
    fn fp16_decodes_known_patterns(#[case] raw: u16, #[case] expected: f64) {
        assert_eq!(decode_fp16(raw).to_bits(), expected.to_bits());
    }

    #[test]
    fn fp16_special_patterns() {
        assert_eq!(decode_fp16(0x7C00).to_bits(), f64::INFINITY.to_bits());
        assert_eq!(decode_fp16(0xFC00).to_bits(), f64::NEG_INFINITY.to_bits());
        assert!(decode_fp16(0x7C01).is_nan());
        assert!(decode_fp16(0xFE00).is_nan());
    }

    #[rstest]
    #[case(0b11110_000_0110_0100, 25.0)]
    #[case(0x0001, 1.0)]
    #[case(0x07FF, -1.0)]
    #[case(0b00010_000_0000_0011, 12.0)]
    fn linear11_decodes_mantissa_and_exponent(#[case] raw: u16, #[case] expected: f64) {
        assert_eq!(decode_linear11(raw).to_bits(), expected.to_bits());
    }

    #[test]
    fn linear_transform_applies_signs_independently() {
        let transform = LinearTransform::parse("M1_3_2_0_1_2").unwrap();
        assert_eq!(transform.apply(4).to_bits(), 5.5f64.to_bits());
        let negative = LinearTransform::parse("m_0_1_1_1_10_1").unwrap();
        assert_eq!(negative.apply(3).to_bits(), 7.0f64.to_bits());
        let hex = LinearTransform::parse("M1_0x10_1_1_0_1").unwrap();
        assert_eq!(hex.apply(2).to_bits(), 32.0f64.to_bits());
    }

    #[rstest]
    #[case("M1_1_1")]
    #[case("M1_1_1_1_1_1_1")]
    #[case("M1_a_1_1_1_1")]
    fn malformed_linear_transform_is_not_implemented(#[case] format: &str) {
        let err = LinearTransform::parse(format).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormattingNotImplemented);
    }

    #[test]
    fn linear_transform_rejects_zero_denominator() {
        let err = LinearTransform::parse("M1_1_0_1_1_1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadValue);
    }

    #[rstest]
    #[case("t_0_OFF_1_ON", 1, "ON")]
    #[case("T_0_OFF_1_ON", 0, "OFF (0x0)")]
    #[case("T_0_OFF_1_ON", 2, "0x2")]
    #[case("t_0x10_HIGH_3_LOW", 16, "HIGH")]
    #[case("T_10_TEN", 10, "TEN (0xA)")]
    fn enum_table_labels(#[case] format: &str, #[case] raw: u64, #[case] expected: &str) {
        assert_eq!(EnumTable::parse(format).unwrap().label(raw), expected);
    }

    #[test]
    fn enum_table_requires_label_per_value() {
        let err = EnumTable::parse("t_0_OFF_1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadValue);
    }

    #[test]
    fn ip_and_hex_rendering() {
        assert_eq!(format_ip(0xC0A8_0001), "192.168.0.1");
        assert_eq!(format_ip(0x1_0A00_0002), "10.0.0.2");
        assert_eq!(format_hex(0xBEEF, false), "BEEF");
        assert_eq!(format_hex(0xBEEF, true), "0xBEEF");
    }
}
