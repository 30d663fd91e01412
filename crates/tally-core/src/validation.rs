//! # Validation Module
//!
//! Field-level checks that have no dedicated business code. Failures become
//! [`ValidationError`] and surface as `VALIDATION_ERROR`.
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_idempotency_key, validate_sku};
//!
//! assert_eq!(validate_idempotency_key("  k1 ").unwrap(), "k1");
//! assert!(validate_sku("COF-250G").is_ok());
//! ```

use crate::error::ValidationError;
use crate::quantity::QUANTITY_SCALE;
use crate::{MAX_CART_LINES, MAX_IDEMPOTENCY_KEY_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a client idempotency key and returns it trimmed.
///
/// Emptiness is reported by callers as `IDEMPOTENCY_KEY_REQUIRED`; this only
/// rejects keys that are present but too long.
pub fn validate_idempotency_key(key: &str) -> ValidationResult<&str> {
    let key = key.trim();

    if key.is_empty() {
        return Err(ValidationError::Required {
            field: "idempotencyKey".to_string(),
        });
    }

    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(ValidationError::TooLong {
            field: "idempotencyKey".to_string(),
            max: MAX_IDEMPOTENCY_KEY_LEN,
        });
    }

    Ok(key)
}

/// Validates a SKU.
///
/// ## Rules
/// - 1 to 50 characters after trimming
/// - Letters, digits, hyphens and underscores only
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a display name (product, attribute, option, discount...).
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// A unit's precision scale must be 0-5.
pub fn validate_precision_scale(scale: i64) -> ValidationResult<()> {
    if !(0..=QUANTITY_SCALE as i64).contains(&scale) {
        return Err(ValidationError::OutOfRange {
            field: "precisionScale".to_string(),
            min: 0,
            max: QUANTITY_SCALE as i64,
        });
    }
    Ok(())
}

/// Validates cart size (number of lines).
pub fn validate_cart_size(lines: usize) -> ValidationResult<()> {
    if lines > MAX_CART_LINES {
        return Err(ValidationError::OutOfRange {
            field: "cart".to_string(),
            min: 1,
            max: MAX_CART_LINES as i64,
        });
    }

    Ok(())
}

/// Clamps a requested page size into `1..=max`, defaulting when absent.
pub fn page_limit(requested: Option<i64>, default: i64, max: i64) -> ValidationResult<i64> {
    match requested {
        None => Ok(default.min(max)),
        Some(limit) if limit < 1 => Err(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max,
        }),
        Some(limit) => Ok(limit.min(max)),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_idempotency_key() {
        assert_eq!(validate_idempotency_key("abc").unwrap(), "abc");
        assert_eq!(validate_idempotency_key("  abc\n").unwrap(), "abc");
        assert!(validate_idempotency_key("   ").is_err());
        assert!(validate_idempotency_key(&"k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("COKE-330").is_ok());
        assert!(validate_sku("product_1").is_ok());

        assert!(validate_sku("").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(100)).is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("name", "Flat White").is_ok());
        assert!(validate_name("name", " ").is_err());
        assert!(validate_name("name", &"x".repeat(201)).is_err());
    }

    #[test]
    fn test_validate_precision_scale() {
        assert!(validate_precision_scale(0).is_ok());
        assert!(validate_precision_scale(5).is_ok());
        assert!(validate_precision_scale(6).is_err());
        assert!(validate_precision_scale(-1).is_err());
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(validate_cart_size(1).is_ok());
        assert!(validate_cart_size(MAX_CART_LINES).is_ok());
        assert!(validate_cart_size(MAX_CART_LINES + 1).is_err());
    }

    #[test]
    fn test_page_limit() {
        assert_eq!(page_limit(None, 50, 200).unwrap(), 50);
        assert_eq!(page_limit(Some(500), 50, 200).unwrap(), 200);
        assert_eq!(page_limit(Some(10), 50, 200).unwrap(), 10);
        assert!(page_limit(Some(0), 50, 200).is_err());
    }
}
