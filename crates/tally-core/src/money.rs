//! # Money Module
//!
//! The `Money` type plus the codec between the representations that cross
//! the service boundary.
//!
//! ## Representations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CANONICAL   "1099"     base-10 integer string, minor units (cents)    │
//! │  LEGACY      "10.99"    fixed two-decimal string, major units          │
//! │  PERCENT     "12.5"  ─► 1250 basis points (0..=10000)                  │
//! │                                                                         │
//! │  All three are converted with string/integer arithmetic only.          │
//! │  A binary float never touches a money value.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rounding
//! [`multiply_minor_by_quantity`] is the only place in the money pipeline
//! that rounds (half-up, away from zero). Percentages truncate toward zero
//! in [`apply_percent_minor`].
//!
//! ## Usage
//! ```rust
//! use tally_core::money::{decimal_to_minor_units, minor_units_to_decimal_string, Money};
//!
//! let price = Money::from_minor(1099);
//! assert_eq!(minor_units_to_decimal_string(price.minor()), "10.99");
//! assert_eq!(decimal_to_minor_units("10.99").unwrap(), 1099);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use thiserror::Error;

use crate::quantity::{Quantity, QUANTITY_FACTOR};

/// 100% in basis points.
pub const MAX_BASIS_POINTS: u32 = 10_000;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// - **i64 (signed)**: legacy decimal inputs may be negative before
///   validation rejects them
/// - **Single field tuple struct**: zero-cost abstraction over i64
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Multiplies by an exact quantity, rounding once to the nearest minor
    /// unit (half-up).
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    /// use tally_core::quantity::Quantity;
    ///
    /// let per_kg = Money::from_minor(999);
    /// let qty = Quantity::parse("0.335", 3).unwrap();
    /// // 999 × 0.335 = 334.665 → 335
    /// assert_eq!(per_kg.times_quantity(qty).unwrap().minor(), 335);
    /// ```
    pub fn times_quantity(&self, quantity: Quantity) -> Option<Money> {
        let product = self.0 as i128 * quantity.scaled() as i128;
        let factor = QUANTITY_FACTOR as i128;
        let whole = product / factor;
        let rem = (product % factor).abs();
        let rounded = if rem * 2 >= factor {
            whole + product.signum()
        } else {
            whole
        };
        i64::try_from(rounded).ok().map(Money)
    }

    /// The legacy decimal representation (`"10.99"`).
    pub fn to_decimal_string(&self) -> String {
        minor_units_to_decimal_string(self.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&minor_units_to_decimal_string(self.0))
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Codec Errors
// =============================================================================

/// Why a money string could not be decoded.
///
/// Callers translate this into the field-specific business code
/// (`INVALID_PRICE`, `INVALID_PAYMENT_AMOUNT`, `DISCOUNT_INVALID_VALUE`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyParseError {
    #[error("value is empty")]
    Empty,

    #[error("'{0}' is not a valid amount")]
    InvalidFormat(String),

    #[error("'{0}' has more than {1} decimal places")]
    TooManyDecimals(String, usize),

    #[error("'{0}' is out of range")]
    Overflow(String),

    #[error("minor units {minor} and decimal amount {legacy} disagree")]
    Mismatch { minor: String, legacy: String },
}

// =============================================================================
// Codec Functions
// =============================================================================

/// Parses a canonical minor-unit string. Digits only: no sign, no
/// separators, no whitespace.
pub fn parse_minor_units_string(s: &str) -> Result<i64, MoneyParseError> {
    if s.is_empty() {
        return Err(MoneyParseError::Empty);
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MoneyParseError::InvalidFormat(s.to_string()));
    }
    s.parse::<i64>()
        .map_err(|_| MoneyParseError::Overflow(s.to_string()))
}

/// Splits `[-]digits[.digits]` into sign, integer digits and fraction digits.
fn split_decimal(s: &str, max_decimals: usize) -> Result<(bool, &str, &str), MoneyParseError> {
    if s.is_empty() {
        return Err(MoneyParseError::Empty);
    }
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (int_part, frac_part) = match body.split_once('.') {
        Some((_, "")) => return Err(MoneyParseError::InvalidFormat(s.to_string())),
        Some((i, f)) => (i, f),
        None => (body, ""),
    };
    if int_part.is_empty()
        || !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(MoneyParseError::InvalidFormat(s.to_string()));
    }
    if frac_part.len() > max_decimals {
        return Err(MoneyParseError::TooManyDecimals(s.to_string(), max_decimals));
    }
    Ok((negative, int_part, frac_part))
}

/// Accumulates `int_part` and `frac_part` (right-padded to `decimals`) into a
/// scaled integer.
fn scaled_value(
    original: &str,
    negative: bool,
    int_part: &str,
    frac_part: &str,
    decimals: usize,
) -> Result<i128, MoneyParseError> {
    let overflow = || MoneyParseError::Overflow(original.to_string());
    let mut value: i128 = 0;
    for b in int_part.bytes().chain(frac_part.bytes()) {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add((b - b'0') as i128))
            .ok_or_else(overflow)?;
        if value > u64::MAX as i128 {
            return Err(overflow());
        }
    }
    for _ in frac_part.len()..decimals {
        value *= 10;
    }
    Ok(if negative { -value } else { value })
}

/// Converts a legacy decimal string (at most two fractional digits) to
/// minor units, exactly.
///
/// ## Example
/// ```rust
/// use tally_core::money::decimal_to_minor_units;
///
/// assert_eq!(decimal_to_minor_units("12").unwrap(), 1200);
/// assert_eq!(decimal_to_minor_units("12.5").unwrap(), 1250);
/// assert_eq!(decimal_to_minor_units("-5.50").unwrap(), -550);
/// assert!(decimal_to_minor_units("1.999").is_err());
/// ```
pub fn decimal_to_minor_units(s: &str) -> Result<i64, MoneyParseError> {
    let (negative, int_part, frac_part) = split_decimal(s, 2)?;
    let value = scaled_value(s, negative, int_part, frac_part, 2)?;
    i64::try_from(value).map_err(|_| MoneyParseError::Overflow(s.to_string()))
}

/// Formats minor units as a fixed two-decimal string.
pub fn minor_units_to_decimal_string(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let magnitude = (minor as i128).unsigned_abs();
    format!("{}{}.{:02}", sign, magnitude / 100, magnitude % 100)
}

/// Line total = unit price × quantity, rounded once (half-up).
///
/// `quantity` is validated against `max_quantity_scale` first, so a caller
/// cannot sneak extra precision past the unit.
pub fn multiply_minor_by_quantity(
    unit_price_minor: i64,
    quantity: &str,
    max_quantity_scale: u32,
) -> crate::error::CoreResult<i64> {
    let qty = Quantity::parse(quantity, max_quantity_scale)?;
    Money::from_minor(unit_price_minor)
        .times_quantity(qty)
        .map(|m| m.minor())
        .ok_or_else(|| crate::error::CoreError::InvalidPrice {
            reason: "line total is out of range".to_string(),
        })
}

/// Converts a percent string (`"12.5"`) to basis points (`1250`).
///
/// At most two fractional digits; must be within 0..=100%.
pub fn percent_string_to_basis_points(s: &str) -> Result<u32, MoneyParseError> {
    let (negative, int_part, frac_part) = split_decimal(s, 2)?;
    if negative {
        return Err(MoneyParseError::InvalidFormat(s.to_string()));
    }
    let value = scaled_value(s, false, int_part, frac_part, 2)?;
    if value > MAX_BASIS_POINTS as i128 {
        return Err(MoneyParseError::Overflow(s.to_string()));
    }
    Ok(value as u32)
}

/// Formats basis points as a two-decimal percent string (`1250 → "12.50"`).
pub fn basis_points_to_percent_string(bps: u32) -> String {
    format!("{}.{:02}", bps / 100, bps % 100)
}

/// `amount × bps / 10000`, truncated toward zero.
///
/// ## Example
/// ```rust
/// use tally_core::money::apply_percent_minor;
///
/// assert_eq!(apply_percent_minor(999, 1000), 99); // 99.9 → 99
/// ```
pub fn apply_percent_minor(amount_minor: i64, basis_points: u32) -> i64 {
    let value = amount_minor as i128 * basis_points as i128 / MAX_BASIS_POINTS as i128;
    // |value| <= |amount_minor| whenever bps <= 10000
    value as i64
}

// =============================================================================
// Dual-field inputs
// =============================================================================

/// A money value as supplied at the boundary: canonical minor units, a
/// legacy decimal, or both.
///
/// Resolved once into [`Money`]; nothing deeper in the pipeline branches on
/// which field the client used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoneyInput {
    Minor(String),
    LegacyDecimal(String),
    /// Both fields supplied; they must agree exactly.
    Both { minor: String, legacy: String },
}

impl MoneyInput {
    /// Builds the input from the two optional wire fields.
    pub fn from_fields(minor: Option<&str>, legacy: Option<&str>) -> Option<Self> {
        match (minor, legacy) {
            (Some(m), Some(l)) => Some(MoneyInput::Both {
                minor: m.to_string(),
                legacy: l.to_string(),
            }),
            (Some(m), None) => Some(MoneyInput::Minor(m.to_string())),
            (None, Some(l)) => Some(MoneyInput::LegacyDecimal(l.to_string())),
            (None, None) => None,
        }
    }

    /// Normalizes to minor units.
    pub fn resolve(&self) -> Result<Money, MoneyParseError> {
        match self {
            MoneyInput::Minor(m) => parse_minor_units_string(m).map(Money::from_minor),
            MoneyInput::LegacyDecimal(l) => decimal_to_minor_units(l).map(Money::from_minor),
            MoneyInput::Both { minor, legacy } => {
                let a = parse_minor_units_string(minor)?;
                let b = decimal_to_minor_units(legacy)?;
                if a != b {
                    return Err(MoneyParseError::Mismatch {
                        minor: minor.clone(),
                        legacy: legacy.clone(),
                    });
                }
                Ok(Money::from_minor(a))
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minor_units_digits_only() {
        assert_eq!(parse_minor_units_string("1500").unwrap(), 1500);
        assert_eq!(parse_minor_units_string("0").unwrap(), 0);
        assert_eq!(parse_minor_units_string(""), Err(MoneyParseError::Empty));
        for bad in ["-1", "1.0", " 1", "1e3", "+5", "1_000"] {
            assert!(parse_minor_units_string(bad).is_err(), "input {bad:?}");
        }
        assert!(matches!(
            parse_minor_units_string("99999999999999999999"),
            Err(MoneyParseError::Overflow(_))
        ));
    }

    #[test]
    fn test_decimal_round_trip_is_exact() {
        for m in [0, 1, 5, 99, 100, 1099, -1, -550, 123_456_789, i64::MAX, i64::MIN] {
            let s = minor_units_to_decimal_string(m);
            assert_eq!(decimal_to_minor_units(&s).unwrap(), m, "via {s}");
        }
    }

    #[test]
    fn test_decimal_formats() {
        assert_eq!(minor_units_to_decimal_string(0), "0.00");
        assert_eq!(minor_units_to_decimal_string(5), "0.05");
        assert_eq!(minor_units_to_decimal_string(-550), "-5.50");
        assert_eq!(decimal_to_minor_units("0.1").unwrap(), 10);
        assert!(decimal_to_minor_units("1.").is_err());
        assert!(decimal_to_minor_units(".5").is_err());
        assert!(matches!(
            decimal_to_minor_units("1.001"),
            Err(MoneyParseError::TooManyDecimals(_, 2))
        ));
    }

    #[test]
    fn test_multiply_rounds_half_up_once() {
        assert_eq!(multiply_minor_by_quantity(500, "3", 0).unwrap(), 1500);
        // 333 × 1.5 = 499.5 → 500
        assert_eq!(multiply_minor_by_quantity(333, "1.5", 1).unwrap(), 500);
        // 100 × 0.00499 = 0.499 → 0
        assert_eq!(multiply_minor_by_quantity(100, "0.00499", 5).unwrap(), 0);
        assert!(multiply_minor_by_quantity(100, "1.123", 2).is_err());
    }

    #[test]
    fn test_percent_codec() {
        assert_eq!(percent_string_to_basis_points("12.5").unwrap(), 1250);
        assert_eq!(percent_string_to_basis_points("100").unwrap(), 10_000);
        assert_eq!(percent_string_to_basis_points("0.01").unwrap(), 1);
        assert!(percent_string_to_basis_points("100.01").is_err());
        assert!(percent_string_to_basis_points("-1").is_err());
        assert!(percent_string_to_basis_points("1.005").is_err());
        assert_eq!(basis_points_to_percent_string(1250), "12.50");
        assert_eq!(basis_points_to_percent_string(5), "0.05");
    }

    #[test]
    fn test_apply_percent_truncates() {
        assert_eq!(apply_percent_minor(10_000, 1000), 1000);
        assert_eq!(apply_percent_minor(999, 1000), 99);
        assert_eq!(apply_percent_minor(5000, 10_000), 5000);
        assert_eq!(apply_percent_minor(1, 9999), 0);
    }

    #[test]
    fn test_money_input_resolution() {
        let minor = MoneyInput::from_fields(Some("500"), None).unwrap();
        assert_eq!(minor.resolve().unwrap().minor(), 500);

        let legacy = MoneyInput::from_fields(None, Some("5.00")).unwrap();
        assert_eq!(legacy.resolve().unwrap().minor(), 500);

        let agree = MoneyInput::from_fields(Some("500"), Some("5")).unwrap();
        assert_eq!(agree.resolve().unwrap().minor(), 500);

        let disagree = MoneyInput::from_fields(Some("500"), Some("4.99")).unwrap();
        assert!(matches!(
            disagree.resolve(),
            Err(MoneyParseError::Mismatch { .. })
        ));

        assert!(MoneyInput::from_fields(None, None).is_none());
    }

    #[test]
    fn test_display_uses_decimal_string() {
        assert_eq!(Money::from_minor(1099).to_string(), "10.99");
        assert_eq!(Money::from_minor(-1).to_string(), "-0.01");
    }
}
