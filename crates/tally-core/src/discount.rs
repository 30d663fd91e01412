//! # Discount Application
//!
//! Discounts are applied one after another against a running net total.
//!
//! ```text
//! subtotal 5000
//!   │  FIXED 10000 ──► clamp to remaining 5000 ──► applied 5000
//!   ▼
//! net 0
//!   │  PERCENT 10% ──► 10% of 0 ──► applied 0
//!   ▼
//! net 0      discountTotal = subtotal - net = 5000
//! ```
//!
//! `ORDER` discounts work on the running net. `PRODUCT` discounts work on
//! the remaining total of that product's lines. Either way the applied amount
//! never exceeds what is left, so the net can never go negative.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};
use crate::money::{apply_percent_minor, MAX_BASIS_POINTS};
use crate::types::{Discount, DiscountScope, DiscountType};

/// Snapshot of one applied discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountApplication {
    pub discount_id: Option<String>,
    pub scope: DiscountScope,
    pub name_snapshot: String,
    pub type_snapshot: DiscountType,
    pub value_snapshot_minor: i64,
    pub amount_applied_minor: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountOutcome {
    pub applications: Vec<DiscountApplication>,
    pub net_before_tax_minor: i64,
    pub discount_total_minor: i64,
}

/// Removes repeated discount ids, keeping the first occurrence.
pub fn dedupe_discount_ids<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        let id = id.into();
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

fn validate_value(discount: &Discount) -> CoreResult<()> {
    match discount.discount_type {
        DiscountType::Percent => {
            if !(0..=MAX_BASIS_POINTS as i64).contains(&discount.value_minor) {
                return Err(CoreError::DiscountInvalidValue {
                    reason: format!(
                        "'{}' has {} basis points, expected 0-{}",
                        discount.name, discount.value_minor, MAX_BASIS_POINTS
                    ),
                });
            }
        }
        DiscountType::Fixed => {
            if discount.value_minor < 0 {
                return Err(CoreError::DiscountInvalidValue {
                    reason: format!("'{}' has a negative amount", discount.name),
                });
            }
        }
    }
    if discount.scope == DiscountScope::Product && discount.product_id.is_none() {
        return Err(CoreError::DiscountInvalidValue {
            reason: format!("'{}' is product-scoped but names no product", discount.name),
        });
    }
    Ok(())
}

/// Applies `discounts` in order.
///
/// `lines` is `(product_id, line_total_minor)` for each cart line; it is
/// only consulted by `PRODUCT` discounts.
pub fn apply_discounts(
    subtotal_minor: i64,
    lines: &[(String, i64)],
    discounts: &[Discount],
) -> CoreResult<DiscountOutcome> {
    let mut product_remaining: HashMap<&str, i64> = HashMap::new();
    for (product_id, total) in lines {
        *product_remaining.entry(product_id.as_str()).or_insert(0) += *total;
    }

    let mut net = subtotal_minor;
    let mut applications = Vec::with_capacity(discounts.len());

    for discount in discounts {
        validate_value(discount)?;

        let base = match discount.scope {
            DiscountScope::Order => net,
            DiscountScope::Product => discount
                .product_id
                .as_deref()
                .and_then(|id| product_remaining.get(id).copied())
                .unwrap_or(0),
        };

        let raw = match discount.discount_type {
            DiscountType::Fixed => discount.value_minor,
            DiscountType::Percent => apply_percent_minor(base, discount.value_minor as u32),
        };
        let applied = raw.min(base).min(net).max(0);

        net -= applied;
        if discount.scope == DiscountScope::Product {
            if let Some(remaining) = discount
                .product_id
                .as_deref()
                .and_then(|id| product_remaining.get_mut(id))
            {
                *remaining -= applied;
            }
        }

        applications.push(DiscountApplication {
            discount_id: Some(discount.id.clone()),
            scope: discount.scope,
            name_snapshot: discount.name.clone(),
            type_snapshot: discount.discount_type,
            value_snapshot_minor: discount.value_minor,
            amount_applied_minor: applied,
        });
    }

    Ok(DiscountOutcome {
        applications,
        net_before_tax_minor: net,
        discount_total_minor: subtotal_minor - net,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn discount(id: &str, kind: DiscountType, scope: DiscountScope, value: i64) -> Discount {
        Discount {
            id: id.to_string(),
            business_id: "b1".to_string(),
            name: format!("Discount {id}"),
            discount_type: kind,
            scope,
            value_minor: value,
            product_id: None,
            is_active: true,
            is_archived: false,
        }
    }

    #[test]
    fn test_fixed_discount_is_clamped_to_subtotal() {
        let d = discount("d1", DiscountType::Fixed, DiscountScope::Order, 10_000);
        let out = apply_discounts(5000, &[("p1".into(), 5000)], &[d]).unwrap();
        assert_eq!(out.applications[0].amount_applied_minor, 5000);
        assert_eq!(out.net_before_tax_minor, 0);
        assert_eq!(out.discount_total_minor, 5000);
    }

    #[test]
    fn test_sequential_application_uses_running_net() {
        let ten_pct = discount("d1", DiscountType::Percent, DiscountScope::Order, 1000);
        let fixed = discount("d2", DiscountType::Fixed, DiscountScope::Order, 500);
        let out = apply_discounts(10_000, &[], &[ten_pct.clone(), fixed.clone()]).unwrap();
        // 10% of 10000 = 1000, then 500 off 9000
        assert_eq!(out.net_before_tax_minor, 8500);

        let out = apply_discounts(10_000, &[], &[fixed, ten_pct]).unwrap();
        // 500 off, then 10% of 9500 = 950
        assert_eq!(out.net_before_tax_minor, 8550);
        assert_eq!(out.applications[1].amount_applied_minor, 950);
    }

    #[test]
    fn test_percent_truncates() {
        let d = discount("d1", DiscountType::Percent, DiscountScope::Order, 1000);
        let out = apply_discounts(999, &[], &[d]).unwrap();
        assert_eq!(out.applications[0].amount_applied_minor, 99);
        assert_eq!(out.net_before_tax_minor, 900);
    }

    #[test]
    fn test_product_discount_limited_to_product_lines() {
        let mut d = discount("d1", DiscountType::Fixed, DiscountScope::Product, 800);
        d.product_id = Some("p2".to_string());
        let lines = vec![("p1".to_string(), 1000), ("p2".to_string(), 300)];
        let out = apply_discounts(1300, &lines, &[d.clone(), d]).unwrap();
        assert_eq!(out.applications[0].amount_applied_minor, 300);
        assert_eq!(out.applications[1].amount_applied_minor, 0);
        assert_eq!(out.net_before_tax_minor, 1000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let pct = discount("d1", DiscountType::Percent, DiscountScope::Order, 10_001);
        let err = apply_discounts(100, &[], &[pct]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DiscountInvalidValue);

        let fixed = discount("d2", DiscountType::Fixed, DiscountScope::Order, -1);
        assert!(apply_discounts(100, &[], &[fixed]).is_err());

        let orphan = discount("d3", DiscountType::Fixed, DiscountScope::Product, 1);
        assert!(apply_discounts(100, &[], &[orphan]).is_err());
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        assert_eq!(dedupe_discount_ids(["a", "b", "a", "c", "b"]), vec!["a", "b", "c"]);
    }
}
