//! # Quantity Module
//!
//! Exact decimal quantities for stock and cart lines.
//!
//! ## Representation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  "1.25" kg  ──parse──►  Quantity(125000)   (scaled by 10^5)            │
//! │                                                                         │
//! │  • Every unit allows 0-5 decimal places (its precision scale)           │
//! │  • Internally we always carry 5 places, so sums across units and the   │
//! │    on_hand_cached column in SQLite are plain integer arithmetic        │
//! │  • Display drops trailing zeros: Quantity(125000) → "1.25"             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No floating point is used anywhere in this module.

use std::fmt;
use std::ops::Neg;

use crate::error::{CoreError, CoreResult};

/// Number of decimal places carried internally.
pub const QUANTITY_SCALE: u32 = 5;

/// 10^QUANTITY_SCALE.
pub const QUANTITY_FACTOR: i64 = 100_000;

/// Largest integer a JavaScript client can represent exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

/// A signed exact decimal quantity with up to five fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Quantity(i64);

impl Quantity {
    /// Zero quantity.
    pub const ZERO: Quantity = Quantity(0);

    /// Wraps an already-scaled value (as stored in the database).
    #[inline]
    pub const fn from_scaled(scaled: i64) -> Self {
        Quantity(scaled)
    }

    /// Whole units.
    pub fn from_units(units: i64) -> CoreResult<Self> {
        units
            .checked_mul(QUANTITY_FACTOR)
            .map(Quantity)
            .ok_or_else(|| CoreError::invalid_quantity(&units.to_string(), "out of range"))
    }

    /// The value scaled by 10^5.
    #[inline]
    pub const fn scaled(&self) -> i64 {
        self.0
    }

    /// Parses a decimal string, enforcing the unit's precision scale.
    ///
    /// ## Rules
    /// - Optional leading `-`, then one or more digits
    /// - Optional `.` followed by one or more digits
    /// - Fractional digits must not exceed `max_scale` (0-5); at scale 0 any
    ///   fractional part is rejected, even `"1.0"`
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::quantity::Quantity;
    ///
    /// assert_eq!(Quantity::parse("1.12", 2).unwrap().to_string(), "1.12");
    /// assert!(Quantity::parse("1.123", 2).is_err());
    /// assert!(Quantity::parse("1.5", 0).is_err());
    /// ```
    pub fn parse(input: &str, max_scale: u32) -> CoreResult<Self> {
        let max_scale = max_scale.min(QUANTITY_SCALE);

        let (negative, body) = match input.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, input),
        };

        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (body, None),
        };

        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::invalid_quantity(input, "not a decimal number"));
        }

        let frac_digits = match frac_part {
            Some(f) if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) => {
                return Err(CoreError::invalid_quantity(input, "not a decimal number"));
            }
            Some(f) => f,
            None => "",
        };

        if frac_digits.len() as u32 > max_scale {
            return Err(CoreError::InvalidQuantityPrecision {
                value: input.to_string(),
                max_scale,
            });
        }

        let overflow = || CoreError::invalid_quantity(input, "out of range");

        let mut scaled: i128 = 0;
        for b in int_part.bytes() {
            scaled = scaled
                .checked_mul(10)
                .and_then(|v| v.checked_add((b - b'0') as i128))
                .ok_or_else(overflow)?;
            if scaled > i64::MAX as i128 {
                return Err(overflow());
            }
        }
        scaled *= QUANTITY_FACTOR as i128;

        let mut frac: i128 = 0;
        for b in frac_digits.bytes() {
            frac = frac * 10 + (b - b'0') as i128;
        }
        for _ in frac_digits.len() as u32..QUANTITY_SCALE {
            frac *= 10;
        }
        scaled += frac;

        // Symmetric range so abs() and negation never overflow.
        if scaled > i64::MAX as i128 {
            return Err(overflow());
        }
        if negative {
            scaled = -scaled;
        }

        i64::try_from(scaled).map(Quantity).map_err(|_| overflow())
    }

    /// Parses a quantity that must be strictly positive (cart lines).
    pub fn parse_positive(input: &str, max_scale: u32) -> CoreResult<Self> {
        let qty = Self::parse(input, max_scale)?;
        if !qty.is_positive() {
            return Err(CoreError::invalid_quantity(input, "must be greater than zero"));
        }
        Ok(qty)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Quantity(self.0.abs())
    }

    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_add(other.0).map(Quantity)
    }

    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_sub(other.0).map(Quantity)
    }

    /// Rounds half-up (away from zero) to a whole number for the legacy
    /// integer quantity column.
    ///
    /// Fails instead of clamping when the result is beyond what a
    /// JavaScript client can represent exactly.
    pub fn to_legacy_int(&self) -> CoreResult<i64> {
        let whole = self.0 / QUANTITY_FACTOR;
        let rem = (self.0 % QUANTITY_FACTOR).abs();
        let rounded = if rem * 2 >= QUANTITY_FACTOR {
            whole + self.0.signum()
        } else {
            whole
        };
        if rounded.abs() > MAX_SAFE_INTEGER {
            return Err(CoreError::invalid_quantity(
                &self.to_string(),
                "exceeds the legacy integer range",
            ));
        }
        Ok(rounded)
    }
}

impl Neg for Quantity {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Quantity(-self.0)
    }
}

/// Canonical decimal string: no exponent, trailing zeros removed.
impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = (self.0 as i128).unsigned_abs();
        let factor = QUANTITY_FACTOR as u128;
        let sign = if self.0 < 0 { "-" } else { "" };
        let whole = magnitude / factor;
        let frac = magnitude % factor;

        if frac == 0 {
            return write!(f, "{}{}", sign, whole);
        }

        let digits = format!("{:05}", frac);
        write!(f, "{}{}.{}", sign, whole, digits.trim_end_matches('0'))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_parse_respects_unit_scale() {
        assert_eq!(Quantity::parse("1.12", 2).unwrap().scaled(), 112_000);
        let err = Quantity::parse("1.123", 2).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidQuantityPrecision);
    }

    #[test]
    fn test_scale_zero_rejects_any_fraction() {
        assert!(Quantity::parse("3", 0).is_ok());
        let err = Quantity::parse("3.0", 0).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidQuantityPrecision);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "-", "1.", ".5", "1e3", " 1", "1,5", "+1", "abc", "1.2.3"] {
            let err = Quantity::parse(bad, 5).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidQuantity, "input {bad:?}");
        }
    }

    #[test]
    fn test_parse_negative_and_display() {
        let q = Quantity::parse("-2.5", 3).unwrap();
        assert_eq!(q.scaled(), -250_000);
        assert_eq!(q.to_string(), "-2.5");
        assert_eq!(Quantity::parse("0.00001", 5).unwrap().to_string(), "0.00001");
        assert_eq!(Quantity::parse("7", 0).unwrap().to_string(), "7");
        assert_eq!(Quantity::parse("7.50", 2).unwrap().to_string(), "7.5");
    }

    #[test]
    fn test_parse_positive() {
        assert!(Quantity::parse_positive("0", 2).is_err());
        assert!(Quantity::parse_positive("-1", 2).is_err());
        assert!(Quantity::parse_positive("0.01", 2).is_ok());
    }

    #[test]
    fn test_parse_overflow() {
        let err = Quantity::parse("99999999999999999999", 0).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidQuantity);
    }

    #[test]
    fn test_parse_range_is_symmetric() {
        let err = Quantity::parse("-92233720368547.75808", 5).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidQuantity);

        let low = Quantity::parse("-92233720368547.75807", 5).unwrap();
        let high = Quantity::parse("92233720368547.75807", 5).unwrap();
        assert_eq!(low.abs(), high);
        assert_eq!(-high, low);
    }

    #[test]
    fn test_legacy_int_rounds_half_up() {
        assert_eq!(Quantity::parse("2.5", 1).unwrap().to_legacy_int().unwrap(), 3);
        assert_eq!(Quantity::parse("2.49999", 5).unwrap().to_legacy_int().unwrap(), 2);
        assert_eq!(Quantity::parse("-2.5", 1).unwrap().to_legacy_int().unwrap(), -3);
        assert_eq!(Quantity::parse("0.4", 1).unwrap().to_legacy_int().unwrap(), 0);
    }
}
