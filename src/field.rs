//! Field types, the field descriptor, the `Decimal` fixed-point type, the
//! per-record `Value`, and the resolver that binds a field to one of the
//! six converter kinds (spec §4.2).

use std::fmt;

use chrono::{Datelike, NaiveDate};

use crate::encoding::TextEncoding;
use crate::error::{DBaseErrorKind, FieldConvertError};

/// The four field type codes this core supports: `C`, `N`, `D`, `L`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Character,
    Numeric,
    Date,
    Logical,
}

impl FieldType {
    pub fn code(self) -> u8 {
        match self {
            FieldType::Character => b'C',
            FieldType::Numeric => b'N',
            FieldType::Date => b'D',
            FieldType::Logical => b'L',
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'C' => Some(FieldType::Character),
            b'N' => Some(FieldType::Numeric),
            b'D' => Some(FieldType::Date),
            b'L' => Some(FieldType::Logical),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code() as char)
    }
}

/// Describes one column of a table: name, type, on-disk width, and
/// decimal-digit count (spec §3, `FieldSpec`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub length: u8,
    pub decimal: u8,
}

impl FieldSpec {
    /// Construct a field descriptor, enforcing the invariants from spec §3.
    pub fn new(name: impl Into<String>, field_type: FieldType, length: u8, decimal: u8) -> DBaseResultField {
        let name = name.into();
        if name.is_empty() || name.len() > 10 || !name.is_ascii() {
            return Err(DBaseErrorKind::ConsistencyError(format!(
                "field name {name:?} must be 1-10 ASCII characters"
            )));
        }
        match field_type {
            FieldType::Numeric if length == 0 || length >= 20 => {
                return Err(DBaseErrorKind::ConsistencyError(format!(
                    "numeric field '{name}' width {length} must be in 1..20"
                )))
            }
            FieldType::Character if length == 0 => {
                return Err(DBaseErrorKind::ConsistencyError(format!(
                    "character field '{name}' width must be non-zero"
                )))
            }
            FieldType::Logical if length != 1 => {
                return Err(DBaseErrorKind::ConsistencyError(format!(
                    "logical field '{name}' width must be 1, got {length}"
                )))
            }
            FieldType::Date if length != 8 => {
                return Err(DBaseErrorKind::ConsistencyError(format!(
                    "date field '{name}' width must be 8, got {length}"
                )))
            }
            _ => {}
        }
        if decimal > 0 && field_type != FieldType::Numeric {
            return Err(DBaseErrorKind::ConsistencyError(format!(
                "field '{name}' has a decimal count but is not numeric"
            )));
        }
        if length > 0 && decimal as usize >= length as usize {
            return Err(DBaseErrorKind::ConsistencyError(format!(
                "field '{name}' decimal count {decimal} must be < width {length}"
            )));
        }
        Ok(FieldSpec { name, field_type, length, decimal })
    }
}

type DBaseResultField = Result<FieldSpec, DBaseErrorKind>;

/// Fixed-point decimal: an integer mantissa paired with a fractional scale.
///
/// The on-disk DBF representation is already textual and exact, so this
/// avoids binary floating point entirely. The mantissa is `i128` (rather
/// than the teacher's `i64`) because spec §3 allows `N` fields up to 19
/// digits, which can overflow `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decimal {
    mantissa: i128,
    scale: u8,
}

impl Decimal {
    pub fn new(mantissa: i128, scale: u8) -> Self {
        Decimal { mantissa, scale }
    }

    pub fn zero(scale: u8) -> Self {
        Decimal { mantissa: 0, scale }
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    fn pow10(exp: u8) -> i128 {
        10i128.pow(exp as u32)
    }

    /// The portion before the decimal point.
    pub fn integral(&self) -> i128 {
        self.mantissa / Self::pow10(self.scale)
    }

    /// The portion after the decimal point, always non-negative.
    pub fn fractional(&self) -> i128 {
        (self.mantissa % Self::pow10(self.scale)).abs()
    }

    /// Lossy conversion to `f64`, for callers that don't need exactness.
    pub fn to_f64_lossy(&self) -> f64 {
        self.mantissa as f64 / Self::pow10(self.scale) as f64
    }

    /// Parse a decimal string and quantize it to exactly `scale`
    /// fractional digits, rounding half away from zero if the source has
    /// more digits than `scale` (spec §4.1, "Decimal").
    pub fn parse_quantized(s: &str, scale: u8) -> Result<Self, FieldConvertError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Decimal::zero(scale));
        }
        let negative = trimmed.starts_with('-');
        let unsigned = trimmed.trim_start_matches(['+', '-']);
        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((i, f)) => (i, f),
            None => (unsigned, ""),
        };
        let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (!int_part.is_empty() && !is_digits(int_part)) || (!frac_part.is_empty() && !is_digits(frac_part)) {
            return Err(FieldConvertError::InvalidNumber { value: s.to_string() });
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(FieldConvertError::InvalidNumber { value: s.to_string() });
        }

        let int_val: i128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| FieldConvertError::InvalidNumber { value: s.to_string() })?
        };

        let (frac_val, carry) = round_fraction(frac_part, scale);
        let mantissa = (int_val + carry) * Self::pow10(scale) + frac_val;
        let mantissa = if negative { -mantissa } else { mantissa };
        Ok(Decimal { mantissa, scale })
    }
}

fn round_fraction(frac: &str, scale: u8) -> (i128, i128) {
    let scale = scale as usize;
    if frac.len() <= scale {
        let mut val: i128 = 0;
        if !frac.is_empty() {
            val = frac.parse().unwrap_or(0);
        }
        // pad on the right: "5" at scale 2 means "50", not "05"
        let pad = scale - frac.len();
        (val * 10i128.pow(pad as u32), 0)
    } else {
        let (keep, rest) = frac.split_at(scale);
        let mut val: i128 = if keep.is_empty() { 0 } else { keep.parse().unwrap_or(0) };
        let round_up = rest.as_bytes().first().is_some_and(|&b| b >= b'5');
        let mut carry = 0;
        if round_up {
            val += 1;
            let pow = 10i128.pow(scale as u32);
            if val >= pow {
                val -= pow;
                carry = 1;
            }
        }
        (val, carry)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let s = format!("{sign}{}.{:0width$}", self.integral().abs(), self.fractional(), width = self.scale as usize);
        match f.width() {
            Some(w) => write!(f, "{s:>w$}"),
            None => write!(f, "{s}"),
        }
    }
}

/// Text content of a `C` field: either decoded to Unicode, or kept as the
/// raw trimmed bytes, per the reader/writer's unicode-mode setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextValue {
    Unicode(String),
    Raw(Vec<u8>),
}

/// A single field's value. Integer, decimal, date, and text each carry a
/// dedicated absent sentinel distinct from their zero/empty value (spec
/// §9, "Absent values"); decoding a record never produces that sentinel
/// except for `Date` (the only type with a distinguishable blank encoding
/// on disk) -- see spec §4.1.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(Option<i128>),
    Decimal(Option<Decimal>),
    Date(Option<NaiveDate>),
    Boolean(bool),
    Text(Option<TextValue>),
}

/// Which of the six converter pairs a field resolves to (spec §4.2).
/// Resolved once per field at schema-construction time, not per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConverterKind {
    TextUnicode,
    TextBytes,
    DecimalFp,
    Integer,
    Date,
    Boolean,
}

pub(crate) fn resolve(field_type: FieldType, decimal: u8, unicode_mode: bool) -> ConverterKind {
    match field_type {
        FieldType::Character if unicode_mode => ConverterKind::TextUnicode,
        FieldType::Character => ConverterKind::TextBytes,
        FieldType::Numeric if decimal > 0 => ConverterKind::DecimalFp,
        FieldType::Numeric => ConverterKind::Integer,
        FieldType::Date => ConverterKind::Date,
        FieldType::Logical => ConverterKind::Boolean,
    }
}

fn trim_space_and_nul(raw: &[u8]) -> &[u8] {
    let mut end = raw.len();
    while end > 0 && (raw[end - 1] == b' ' || raw[end - 1] == 0) {
        end -= 1;
    }
    &raw[..end]
}

fn ascii_of(raw: &[u8]) -> &str {
    // Field content outside C fields is always ASCII digits/sign/space by
    // construction of the format; fall back to empty on garbage so callers
    // get a clean parse error instead of a panic.
    std::str::from_utf8(raw).unwrap_or("")
}

pub(crate) fn decode_field(
    kind: ConverterKind,
    raw: &[u8],
    field: &FieldSpec,
    codec: Option<TextEncoding>,
) -> Result<Value, FieldConvertError> {
    log::trace!("decoding field '{}' ({kind:?}, {} bytes)", field.name, raw.len());
    match kind {
        ConverterKind::TextBytes => Ok(Value::Text(Some(TextValue::Raw(trim_space_and_nul(raw).to_vec())))),
        ConverterKind::TextUnicode => {
            let encoding = codec.expect("unicode mode field without a resolved encoding");
            Ok(Value::Text(Some(TextValue::Unicode(encoding.decode(trim_space_and_nul(raw))))))
        }
        ConverterKind::Integer => {
            let s = ascii_of(raw).trim().trim_matches('\0');
            if s.is_empty() {
                Ok(Value::Integer(Some(0)))
            } else {
                let n: i128 = s.parse()?;
                Ok(Value::Integer(Some(n)))
            }
        }
        ConverterKind::DecimalFp => {
            let s = ascii_of(raw).trim().trim_matches('\0');
            Ok(Value::Decimal(Some(Decimal::parse_quantized(s, field.decimal)?)))
        }
        ConverterKind::Date => {
            let s = ascii_of(raw).trim();
            if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
                return Ok(Value::Date(None));
            }
            let y: i32 = s[0..4].parse().unwrap_or(0);
            let m: u32 = s[4..6].parse().unwrap_or(0);
            let d: u32 = s[6..8].parse().unwrap_or(0);
            Ok(Value::Date(NaiveDate::from_ymd_opt(y, m, d)))
        }
        ConverterKind::Boolean => {
            let s = ascii_of(raw).trim();
            Ok(Value::Boolean(matches!(s, "Y" | "y" | "T" | "t")))
        }
    }
}

fn type_mismatch(expected: &'static str) -> FieldConvertError {
    FieldConvertError::TypeMismatch { expected }
}

fn pad_right(bytes: &mut Vec<u8>, width: usize) {
    while bytes.len() < width {
        bytes.push(b' ');
    }
}

pub(crate) fn encode_field(
    kind: ConverterKind,
    value: &Value,
    field: &FieldSpec,
    codec: Option<TextEncoding>,
) -> Result<Vec<u8>, FieldConvertError> {
    log::trace!("encoding field '{}' ({kind:?})", field.name);
    let width = field.length as usize;
    match kind {
        ConverterKind::TextUnicode => {
            let text: &str = match value {
                Value::Text(Some(TextValue::Unicode(s))) => s,
                Value::Text(Some(TextValue::Raw(_))) => return Err(type_mismatch("Unicode text")),
                Value::Text(None) => "",
                _ => return Err(type_mismatch("Character")),
            };
            let encoding = codec.expect("unicode mode field without a resolved encoding");
            let mut bytes = encoding.encode(text)?;
            bytes.truncate(width);
            pad_right(&mut bytes, width);
            Ok(bytes)
        }
        ConverterKind::TextBytes => {
            let mut bytes = match value {
                Value::Text(Some(TextValue::Raw(b))) => b.clone(),
                Value::Text(Some(TextValue::Unicode(s))) => s.as_bytes().to_vec(),
                Value::Text(None) => Vec::new(),
                _ => return Err(type_mismatch("Character")),
            };
            bytes.truncate(width);
            pad_right(&mut bytes, width);
            Ok(bytes)
        }
        ConverterKind::Integer => {
            let n = match value {
                Value::Integer(Some(n)) => *n,
                Value::Integer(None) => 0,
                _ => return Err(type_mismatch("Numeric")),
            };
            let s = format!("{n:>width$}");
            if s.len() != width {
                return Err(FieldConvertError::WrongWidth { expected: width, actual: s.len() });
            }
            Ok(s.into_bytes())
        }
        ConverterKind::DecimalFp => {
            let d = match value {
                Value::Decimal(Some(d)) => *d,
                Value::Decimal(None) => Decimal::zero(field.decimal),
                _ => return Err(type_mismatch("Numeric")),
            };
            let s = format!("{d:>width$}");
            if s.len() != width {
                return Err(FieldConvertError::WrongWidth { expected: width, actual: s.len() });
            }
            Ok(s.into_bytes())
        }
        ConverterKind::Date => match value {
            Value::Date(Some(date)) => {
                Ok(format!("{:04}{:02}{:02}", date.year(), date.month(), date.day()).into_bytes())
            }
            Value::Date(None) => Ok(vec![b' '; width]),
            _ => Err(type_mismatch("Date")),
        },
        ConverterKind::Boolean => match value {
            Value::Boolean(b) => Ok(vec![if *b { b'T' } else { b'F' }]),
            _ => Err(type_mismatch("Logical")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_spec_rejects_bad_widths() {
        assert!(FieldSpec::new("ID", FieldType::Numeric, 20, 0).is_err());
        assert!(FieldSpec::new("FLAG", FieldType::Logical, 2, 0).is_err());
        assert!(FieldSpec::new("DOB", FieldType::Date, 7, 0).is_err());
        assert!(FieldSpec::new("TOO_LONG_NAME", FieldType::Character, 5, 0).is_err());
        assert!(FieldSpec::new("AMT", FieldType::Character, 5, 2).is_err());
    }

    #[test]
    fn decimal_quantizes_and_rounds() {
        assert_eq!(Decimal::parse_quantized("12.34", 2).unwrap().to_string(), "12.34");
        assert_eq!(Decimal::parse_quantized("5", 2).unwrap().to_string(), "5.00");
        assert_eq!(Decimal::parse_quantized("", 2).unwrap().to_string(), "0.00");
        assert_eq!(Decimal::parse_quantized("1.005", 2).unwrap().to_string(), "1.01");
        assert_eq!(Decimal::parse_quantized("1.999", 2).unwrap().to_string(), "2.00");
        assert_eq!(Decimal::parse_quantized("-0.5", 1).unwrap().to_string(), "-0.5");
    }

    #[test]
    fn decimal_display_respects_width() {
        let d = Decimal::parse_quantized("12.34", 2).unwrap();
        assert_eq!(format!("{d:>8}"), "   12.34");
    }

    #[test]
    fn integer_decode_tolerates_nul_padding() {
        // OpenOffice writes right-zero-padded (NUL) integers in N fields.
        let field = FieldSpec::new("INT_FLD", FieldType::Numeric, 4, 0).unwrap();
        let v = decode_field(ConverterKind::Integer, b"25\0\0", &field, None).unwrap();
        assert_eq!(v, Value::Integer(Some(25)));
    }

    #[test]
    fn date_decode_absent_on_malformed_input() {
        let field = FieldSpec::new("DTE_FLD", FieldType::Date, 8, 0).unwrap();
        assert_eq!(decode_field(ConverterKind::Date, b"        ", &field, None).unwrap(), Value::Date(None));
        assert_eq!(decode_field(ConverterKind::Date, b"foo", &field, None).unwrap(), Value::Date(None));
        assert_eq!(
            decode_field(ConverterKind::Date, b"20060507", &field, None).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2006, 5, 7))
        );
    }

    #[test]
    fn boolean_decode_defaults_false() {
        let field = FieldSpec::new("BLN_FLD", FieldType::Logical, 1, 0).unwrap();
        assert_eq!(decode_field(ConverterKind::Boolean, b"t", &field, None).unwrap(), Value::Boolean(true));
        assert_eq!(decode_field(ConverterKind::Boolean, b"x", &field, None).unwrap(), Value::Boolean(false));
        assert_eq!(decode_field(ConverterKind::Boolean, b" ", &field, None).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn text_encode_truncates_and_pads() {
        let field = FieldSpec::new("CHR_FLD", FieldType::Character, 4, 0).unwrap();
        let value = Value::Text(Some(TextValue::Raw(b"hello".to_vec())));
        let encoded = encode_field(ConverterKind::TextBytes, &value, &field, None).unwrap();
        assert_eq!(encoded, b"hell");

        let short = Value::Text(Some(TextValue::Raw(b"hi".to_vec())));
        let encoded = encode_field(ConverterKind::TextBytes, &short, &field, None).unwrap();
        assert_eq!(encoded, b"hi  ");
    }

    #[test]
    fn numeric_encode_raises_when_value_overflows_width() {
        let field = FieldSpec::new("ID", FieldType::Numeric, 3, 0).unwrap();
        let value = Value::Integer(Some(12345));
        assert!(encode_field(ConverterKind::Integer, &value, &field, None).is_err());
    }

    #[test]
    fn integer_decode_tolerates_19_digit_width() {
        // a legal N field of width 19, decimal 0, holding a value beyond i64::MAX
        let field = FieldSpec::new("BIG", FieldType::Numeric, 19, 0).unwrap();
        let v = decode_field(ConverterKind::Integer, b"9999999999999999999", &field, None).unwrap();
        assert_eq!(v, Value::Integer(Some(9_999_999_999_999_999_999)));
    }

    #[test]
    fn decimal_with_zero_scale_matches_integer_field() {
        let field = FieldSpec::new("N0", FieldType::Numeric, 4, 0).unwrap();
        let decoded = decode_field(ConverterKind::Integer, b"  42", &field, None).unwrap();
        assert_eq!(decoded, Value::Integer(Some(42)));
    }

    #[test]
    fn absent_date_round_trips_through_encode() {
        let field = FieldSpec::new("DTE_FLD", FieldType::Date, 8, 0).unwrap();
        let bytes = encode_field(ConverterKind::Date, &Value::Date(None), &field, None).unwrap();
        assert_eq!(bytes, b"        ");
    }
}
