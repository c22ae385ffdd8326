//! Numeric literal decoding.
//!
//! ```text
//! literal  = prefix? digits ('.' digits)? exponent? ('_' suffix)?
//! prefix   = "0x" | "0X" | "0b" | "0B" | "0" digit  (16, 2, 8; else 10)
//! exponent = ('e' | 'E') sign? decimal               (base 10, scales by 10^n)
//!          | ('p' | 'P') sign? decimal               (other bases, scales by 2^n)
//! suffix   = ['F'|'f']? ['S'|'s']? decimal '.' decimal ['S'|'s']?
//! ```
//!
//! Without a suffix, a literal with a fractional part becomes a signed
//! 16.15 fixed value and anything else an unsigned 32.0 fixed value.

use std::fmt;
use std::str::FromStr;

use num::{BigInt, BigRational};
use num_traits::{One, Pow, Zero};

use crate::error::LiteralError;
use crate::ty::{TypeFixed, TypeFloat};
use crate::value::{Value, ValueFixed};

/// Widest integer or fraction field a suffix may name.
pub const MAX_SUFFIX_BITS: u32 = 1024;

/// Largest exponent magnitude accepted.
pub const MAX_EXPONENT: i64 = 4096;

/// Layout selected by a literal's `_` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LiteralSuffix {
    pub float: bool,
    pub signed: bool,
    pub bits_i: u32,
    pub bits_f: u32,
    pub satur: bool,
}

impl LiteralSuffix {
    /// Layout of an unsuffixed integral literal.
    pub const INTEGRAL: Self = Self {
        float: false,
        signed: false,
        bits_i: 32,
        bits_f: 0,
        satur: false,
    };

    /// Layout of an unsuffixed literal with a fractional part.
    pub const FRACTIONAL: Self = Self {
        float: false,
        signed: true,
        bits_i: 16,
        bits_f: 15,
        satur: false,
    };
}

impl FromStr for LiteralSuffix {
    type Err = LiteralError;

    /// Parse the text after the `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || LiteralError::BadSuffix(s.to_string());
        let mut rest = s;

        let float = rest.starts_with(&['F', 'f'][..]);
        if float {
            rest = &rest[1..];
        }
        let signed = rest.starts_with(&['S', 's'][..]);
        if signed {
            rest = &rest[1..];
        }
        let satur = rest.ends_with(&['S', 's'][..]);
        if satur {
            rest = &rest[..rest.len() - 1];
        }

        let (i, f) = rest.split_once('.').ok_or_else(bad)?;
        let all_digits = |t: &str| !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(i) || !all_digits(f) {
            return Err(bad());
        }
        let width = |t: &str| -> Result<u32, LiteralError> {
            let bits = t.parse::<u64>().unwrap_or(u64::MAX);
            match u32::try_from(bits) {
                Ok(bits) if bits <= MAX_SUFFIX_BITS => Ok(bits),
                _ => Err(LiteralError::TooWide {
                    bits: u32::try_from(bits).unwrap_or(u32::MAX),
                    max: MAX_SUFFIX_BITS,
                }),
            }
        };
        Ok(Self {
            float,
            signed,
            bits_i: width(i)?,
            bits_f: width(f)?,
            satur,
        })
    }
}

impl fmt::Display for LiteralSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.float {
            write!(f, "F")?;
        }
        if self.signed {
            write!(f, "S")?;
        }
        write!(f, "{}.{}", self.bits_i, self.bits_f)?;
        if self.satur {
            write!(f, "S")?;
        }
        Ok(())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Number parsing
// ══════════════════════════════════════════════════════════════════════════════

/// Split off the base prefix.
fn parse_base(s: &str) -> (u32, &str) {
    let b = s.as_bytes();
    match b {
        [b'0', b'x' | b'X', ..] => (16, &s[2..]),
        [b'0', b'b' | b'B', ..] => (2, &s[2..]),
        [b'0', b'0'..=b'9', ..] => (8, &s[1..]),
        _ => (10, s),
    }
}

fn is_exponent_marker(c: char, base: u32) -> bool {
    if base == 10 {
        matches!(c, 'e' | 'E')
    } else {
        matches!(c, 'p' | 'P')
    }
}

/// Consume digits of `base`, returning their value and count.
fn parse_digits(s: &str, base: u32) -> Result<(BigInt, u32, &str), LiteralError> {
    let mut value = BigInt::zero();
    let mut count = 0;
    for (i, c) in s.char_indices() {
        if !c.is_ascii_alphanumeric() || is_exponent_marker(c, base) {
            return Ok((value, count, &s[i..]));
        }
        let digit = c
            .to_digit(base)
            .ok_or(LiteralError::BadDigit { digit: c, base })?;
        value = value * base + digit;
        count += 1;
    }
    Ok((value, count, ""))
}

fn parse_exponent(s: &str) -> Result<(i64, &str), LiteralError> {
    let end = s
        .char_indices()
        .skip(1)
        .find(|&(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(i, _)| i);
    let (num, rest) = s.split_at(end);
    let bad = || LiteralError::BadExponent(s.to_string());
    if num.is_empty() || num == "+" || num == "-" {
        return Err(bad());
    }
    let num = num.strip_prefix('+').unwrap_or(num);
    let digits = num.trim_start_matches('-').trim_start_matches('0');
    if digits.len() > 18 {
        let neg = num.starts_with('-');
        return Err(LiteralError::ExponentRange(if neg { i64::MIN } else { i64::MAX }));
    }
    let exp: i64 = num.parse().map_err(|_| bad())?;
    if exp.abs() > MAX_EXPONENT {
        return Err(LiteralError::ExponentRange(exp));
    }
    Ok((exp, rest))
}

/// Decode a numeric literal into a constant.
pub fn parse_number(text: &str) -> Result<Value, LiteralError> {
    if text.is_empty() {
        return Err(LiteralError::Empty);
    }
    let (base, s) = parse_base(text);

    let (val_i, dig_i, mut s) = parse_digits(s, base)?;

    let mut val_f = BigInt::zero();
    let mut dig_f = 0;
    let has_point = s.starts_with('.');
    if has_point {
        (val_f, dig_f, s) = parse_digits(&s[1..], base)?;
    }
    if dig_i == 0 && dig_f == 0 {
        return Err(LiteralError::Empty);
    }

    let mut exp = 0i64;
    if let Some(c) = s.chars().next() {
        if is_exponent_marker(c, base) {
            (exp, s) = parse_exponent(&s[1..])?;
        }
    }

    let suffix = match s.strip_prefix('_') {
        Some(sfx) => sfx.parse::<LiteralSuffix>()?,
        None if !s.is_empty() => return Err(LiteralError::Trailing(s.to_string())),
        None if has_point => LiteralSuffix::FRACTIONAL,
        None => LiteralSuffix::INTEGRAL,
    };

    let mut value = BigRational::from_integer(val_i)
        + BigRational::new(val_f, Pow::pow(BigInt::from(base), dig_f));
    let scale_base = if base == 10 { 10u32 } else { 2 };
    let scale = BigRational::from_integer(Pow::pow(BigInt::from(scale_base), exp.unsigned_abs()));
    if exp >= 0 {
        value *= scale;
    } else {
        value /= scale;
    }

    Ok(if suffix.float {
        Value::float(
            value,
            TypeFloat::new(suffix.bits_i, suffix.bits_f, suffix.signed, suffix.satur),
        )
    } else {
        let ty = TypeFixed::new(suffix.bits_i, suffix.bits_f, suffix.signed, suffix.satur);
        let scaled = value * BigRational::from_integer(BigInt::one() << ty.bits_f);
        Value::Fixed(ValueFixed::new(scaled.trunc().to_integer(), ty))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const U32: TypeFixed = TypeFixed::new(32, 0, false, false);

    #[test]
    fn test_plain_integers() {
        assert_eq!(parse_number("5").unwrap(), Value::fixed(5, U32));
        assert_eq!(parse_number("0").unwrap(), Value::fixed(0, U32));
        assert_eq!(parse_number("0x1F").unwrap(), Value::fixed(31, U32));
        assert_eq!(parse_number("0b101").unwrap(), Value::fixed(5, U32));
        assert_eq!(parse_number("017").unwrap(), Value::fixed(15, U32));
    }

    #[test]
    fn test_fraction_defaults_to_s16_15() {
        let t = TypeFixed::new(16, 15, true, false);
        assert_eq!(parse_number("1.5").unwrap(), Value::fixed_raw(3 << 14, t));
        assert_eq!(parse_number("0.25").unwrap(), Value::fixed_raw(1 << 13, t));
    }

    #[test]
    fn test_explicit_suffix() {
        assert_eq!(parse_number("2_32.0").unwrap(), Value::fixed(2, U32));
        let t = TypeFixed::new(16, 16, true, false);
        assert_eq!(parse_number("1.5_s16.16").unwrap(), Value::fixed_raw(3 << 15, t));
    }

    #[test]
    fn test_saturating_suffix() {
        let t = TypeFixed::new(8, 0, false, true);
        assert_eq!(parse_number("300_8.0s").unwrap(), Value::fixed(255, t));
    }

    #[test]
    fn test_exponents() {
        assert_eq!(parse_number("1e3").unwrap(), Value::fixed(1000, U32));
        assert_eq!(parse_number("0x1p4").unwrap(), Value::fixed(16, U32));
        let t = TypeFixed::new(16, 15, true, false);
        assert_eq!(parse_number("0.5e0").unwrap(), Value::fixed_raw(1 << 14, t));
    }

    #[test]
    fn test_negative_exponent_without_point_stays_integral() {
        assert_eq!(parse_number("15e-1").unwrap(), Value::fixed(1, U32));
        assert_eq!(parse_number("5e-1").unwrap(), Value::fixed(0, U32));
    }

    #[test]
    fn test_oversized_suffix_rejected() {
        assert_eq!(
            parse_number("1_4294967295.1").unwrap_err(),
            LiteralError::TooWide {
                bits: u32::MAX,
                max: MAX_SUFFIX_BITS
            }
        );
        assert!(matches!(
            parse_number("1.5_16.99999999999999999999"),
            Err(LiteralError::TooWide { .. })
        ));
        assert!(matches!(
            parse_number("1_16.1025"),
            Err(LiteralError::TooWide { bits: 1025, .. })
        ));
        assert!(parse_number("1_16.1024").is_ok());
    }

    #[test]
    fn test_exponent_range() {
        assert_eq!(
            parse_number("1e99999999999").unwrap_err(),
            LiteralError::ExponentRange(99999999999)
        );
        assert_eq!(
            parse_number("1e-5000").unwrap_err(),
            LiteralError::ExponentRange(-5000)
        );
        assert!(matches!(
            parse_number("1e99999999999999999999999"),
            Err(LiteralError::ExponentRange(i64::MAX))
        ));
        assert!(parse_number("1e4096_4096.0").is_err());
    }

    #[test]
    fn test_width_saturates() {
        assert_eq!(TypeFixed::new(u32::MAX, 1, true, false).bits(), u32::MAX);
    }

    #[test]
    fn test_hex_e_is_a_digit() {
        assert_eq!(parse_number("0x1e").unwrap(), Value::fixed(30, U32));
    }

    #[test]
    fn test_float_suffix() {
        let v = parse_number("1.25_F8.23").unwrap();
        assert_eq!(
            v,
            Value::float(
                BigRational::new(5.into(), 4.into()),
                TypeFloat::new(8, 23, false, false)
            )
        );
    }

    #[test]
    fn test_malformed() {
        assert_eq!(
            parse_number("08").unwrap_err(),
            LiteralError::BadDigit { digit: '8', base: 8 }
        );
        assert!(matches!(parse_number("1_32"), Err(LiteralError::BadSuffix(_))));
        assert!(matches!(parse_number("12z"), Err(LiteralError::BadDigit { .. })));
        assert!(matches!(parse_number("1.2.3"), Err(LiteralError::Trailing(_))));
        assert!(matches!(parse_number("1e"), Err(LiteralError::BadExponent(_))));
        assert_eq!(parse_number("").unwrap_err(), LiteralError::Empty);
        assert_eq!(parse_number("0x").unwrap_err(), LiteralError::Empty);
    }

    #[test]
    fn test_suffix_roundtrip() {
        for float in [false, true] {
            for signed in [false, true] {
                for satur in [false, true] {
                    for (bits_i, bits_f) in [(0, 0), (1, 0), (16, 15), (32, 0), (7, 24), (64, 64)] {
                        let sfx = LiteralSuffix {
                            float,
                            signed,
                            bits_i,
                            bits_f,
                            satur,
                        };
                        let text = sfx.to_string();
                        assert_eq!(text.parse::<LiteralSuffix>().unwrap(), sfx, "{text}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_suffix_lowercase() {
        let sfx: LiteralSuffix = "fs8.23s".parse().unwrap();
        assert!(sfx.float && sfx.signed && sfx.satur);
        assert_eq!((sfx.bits_i, sfx.bits_f), (8, 23));
    }
}
