//! # Checkout Math
//!
//! Everything checkout decides without touching storage. The orchestrator in
//! `tally-service` loads catalog state, then runs these phases in order:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CheckoutInput                                                         │
//! │     │                                                                   │
//! │     ├─► price_line()          per line: product, quantity, base price,  │
//! │     │                         attributes, modifiers, totals             │
//! │     │                                                                   │
//! │     └─► SalePlan::build()     aggregate stock check                     │
//! │                               discounts                                 │
//! │                               payments                                  │
//! │                               SALE movement drafts                      │
//! │                                                                         │
//! │  SaleDraft ──► tally-db commits ──► SaleWithDetails ──► CheckoutResult  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The sale tree is built bottom-up (modifiers → line → sale), and each level
//! checks its own totals before the next level is assembled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::attributes::{validate_attribute_selections, AttributeSelectionInput, AttributeSnapshot, ProductAttributeLink};
use crate::discount::{apply_discounts, DiscountApplication};
use crate::error::{CoreError, CoreResult};
use crate::inventory::MovementView;
use crate::modifiers::{check_asserted_total, validate_modifier_selections, ModifierGroupState, SelectedModifier};
use crate::money::{minor_units_to_decimal_string, multiply_minor_by_quantity, Money, MoneyInput};
use crate::quantity::Quantity;
use crate::types::{
    format_timestamp, Discount, DiscountScope, DiscountType, PaymentMethod, Product, SaleStatus,
    SaleWithDetails,
};
use crate::validation::{validate_cart_size, validate_idempotency_key};

// =============================================================================
// Input
// =============================================================================

/// Checkout request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutInput {
    pub idempotency_key: Option<String>,
    pub device_id: Option<String>,
    #[serde(default)]
    pub cart: Vec<CartLineInput>,
    #[serde(default)]
    pub payments: Vec<PaymentInput>,
    #[serde(default)]
    pub discounts: Vec<DiscountRef>,
}

impl CheckoutInput {
    /// The trimmed idempotency key. Checkout never makes one up.
    pub fn require_key(&self) -> CoreResult<&str> {
        match self.idempotency_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(validate_idempotency_key(key)?),
            _ => Err(CoreError::IdempotencyKeyRequired),
        }
    }

    /// Rejects empty and oversized carts.
    pub fn check_cart(&self) -> CoreResult<()> {
        if self.cart.is_empty() {
            return Err(CoreError::CartEmpty);
        }
        validate_cart_size(self.cart.len())?;
        Ok(())
    }
}

/// One cart line. The price may come as canonical minor units, a legacy
/// decimal, both (they must agree), or neither (product price is used).
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartLineInput {
    pub product_id: String,
    pub quantity: String,
    pub unit_price_minor: Option<String>,
    pub unit_price: Option<String>,
    #[serde(default)]
    pub selected_modifier_option_ids: Vec<String>,
    #[serde(default)]
    pub selected_attributes: Vec<AttributeSelectionInput>,
    pub total_modifiers_delta_minor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInput {
    pub method: PaymentMethod,
    pub amount_minor: Option<String>,
    pub amount: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DiscountRef {
    pub discount_id: String,
}

// =============================================================================
// Drafts
// =============================================================================

/// A fully priced cart line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDraft {
    pub product_id: String,
    pub product_name: String,
    pub track_inventory: bool,
    /// Stock seen when the line was priced; only used by the pre-check.
    pub on_hand_snapshot: Quantity,
    pub quantity: Quantity,
    pub quantity_legacy_int: i64,
    pub base_unit_price_minor: i64,
    pub total_modifiers_delta_minor: i64,
    pub unit_price_minor: i64,
    pub line_total_minor: i64,
    pub modifiers: Vec<SelectedModifier>,
    pub attributes: Vec<AttributeSnapshot>,
}

impl LineDraft {
    /// Modifier rows must add up to the line's delta, and the unit price must
    /// be base plus delta.
    pub fn check(&self) -> CoreResult<()> {
        let sum: i64 = self.modifiers.iter().map(|m| m.price_delta_minor).sum();
        if sum != self.total_modifiers_delta_minor
            || self.base_unit_price_minor + self.total_modifiers_delta_minor != self.unit_price_minor
        {
            return Err(CoreError::ModifierTotalMismatch {
                product_id: self.product_id.clone(),
                computed_minor: sum,
                asserted_minor: self.total_modifiers_delta_minor,
            });
        }
        Ok(())
    }

    pub fn selected_modifier_option_ids(&self) -> Vec<String> {
        self.modifiers.iter().map(|m| m.option_id.clone()).collect()
    }
}

fn resolve_base_price(product: &Product, line: &CartLineInput) -> CoreResult<Money> {
    let price = match MoneyInput::from_fields(
        line.unit_price_minor.as_deref(),
        line.unit_price.as_deref(),
    ) {
        Some(input) => input.resolve().map_err(|e| CoreError::InvalidPrice {
            reason: e.to_string(),
        })?,
        None => product.price().ok_or_else(|| CoreError::InvalidPrice {
            reason: format!("no price supplied and '{}' has no default price", product.name),
        })?,
    };
    if price.is_negative() {
        return Err(CoreError::InvalidPrice {
            reason: format!("price {} is negative", price),
        });
    }
    Ok(price)
}

/// Prices one cart line against live catalog state.
///
/// `attribute_links` and `modifier_groups` are what the store has linked to
/// `product` right now.
pub fn price_line(
    product: &Product,
    line: &CartLineInput,
    attribute_links: &[ProductAttributeLink],
    modifier_groups: &[ModifierGroupState],
) -> CoreResult<LineDraft> {
    if !product.is_active {
        return Err(CoreError::ProductInactive(product.id.clone()));
    }

    let scale = product.quantity_scale();
    let quantity = Quantity::parse_positive(&line.quantity, scale)?;
    let base = resolve_base_price(product, line)?;

    let attributes = validate_attribute_selections(attribute_links, &line.selected_attributes)?;
    let modifiers = validate_modifier_selections(modifier_groups, &line.selected_modifier_option_ids)?;
    check_asserted_total(
        &product.id,
        modifiers.delta_minor,
        line.total_modifiers_delta_minor.as_deref(),
    )?;

    let unit_price = base
        .checked_add(Money::from_minor(modifiers.delta_minor))
        .filter(|p| !p.is_negative())
        .ok_or_else(|| CoreError::InvalidPrice {
            reason: "unit price with modifiers is out of range".to_string(),
        })?;
    let line_total_minor = multiply_minor_by_quantity(unit_price.minor(), &line.quantity, scale)?;

    let draft = LineDraft {
        product_id: product.id.clone(),
        product_name: product.name.clone(),
        track_inventory: product.track_inventory,
        on_hand_snapshot: product.on_hand(),
        quantity,
        quantity_legacy_int: quantity.to_legacy_int()?,
        base_unit_price_minor: base.minor(),
        total_modifiers_delta_minor: modifiers.delta_minor,
        unit_price_minor: unit_price.minor(),
        line_total_minor,
        modifiers: modifiers.rows,
        attributes,
    };
    draft.check()?;
    Ok(draft)
}

/// Total requested per product across all lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRequirement {
    pub product_id: String,
    pub product_name: String,
    pub track_inventory: bool,
    pub on_hand: Quantity,
    pub requested: Quantity,
}

impl StockRequirement {
    pub fn out_of_stock(&self, on_hand: Quantity) -> CoreError {
        let shortfall = self
            .requested
            .checked_sub(on_hand)
            .unwrap_or(self.requested);
        CoreError::OutOfStock {
            product_id: self.product_id.clone(),
            product_name: self.product_name.clone(),
            on_hand: on_hand.to_string(),
            requested: self.requested.to_string(),
            shortfall: shortfall.to_string(),
        }
    }
}

/// Sums quantities per product, ordered by product id.
pub fn aggregate_requested(lines: &[LineDraft]) -> CoreResult<Vec<StockRequirement>> {
    let mut by_product: BTreeMap<&str, StockRequirement> = BTreeMap::new();
    for line in lines {
        match by_product.get_mut(line.product_id.as_str()) {
            Some(req) => {
                req.requested = req.requested.checked_add(line.quantity).ok_or_else(|| {
                    CoreError::InvalidQuantity {
                        value: line.quantity.to_string(),
                        reason: "combined quantity is out of range".to_string(),
                    }
                })?;
            }
            None => {
                by_product.insert(
                    &line.product_id,
                    StockRequirement {
                        product_id: line.product_id.clone(),
                        product_name: line.product_name.clone(),
                        track_inventory: line.track_inventory,
                        on_hand: line.on_hand_snapshot,
                        requested: line.quantity,
                    },
                );
            }
        }
    }
    Ok(by_product.into_values().collect())
}

/// Fails fast when a tracked product cannot cover the requested total.
///
/// Only a pre-check: the conditional decrement at commit is authoritative.
pub fn check_stock(requirements: &[StockRequirement]) -> CoreResult<()> {
    for req in requirements.iter().filter(|r| r.track_inventory) {
        match req.on_hand.checked_sub(req.requested) {
            Some(left) if !left.is_negative() => {}
            _ => return Err(req.out_of_stock(req.on_hand)),
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentDraft {
    pub method: PaymentMethod,
    pub amount_minor: i64,
}

/// Resolves each payment amount to minor units. Amounts must be present and
/// non-negative.
pub fn resolve_payments(payments: &[PaymentInput]) -> CoreResult<Vec<PaymentDraft>> {
    payments
        .iter()
        .map(|p| {
            let input = MoneyInput::from_fields(p.amount_minor.as_deref(), p.amount.as_deref())
                .ok_or_else(|| CoreError::InvalidPaymentAmount {
                    reason: "amountMinor or amount is required".to_string(),
                })?;
            let amount = input.resolve().map_err(|e| CoreError::InvalidPaymentAmount {
                reason: e.to_string(),
            })?;
            if amount.is_negative() {
                return Err(CoreError::InvalidPaymentAmount {
                    reason: format!("amount {} is negative", amount),
                });
            }
            Ok(PaymentDraft {
                method: p.method,
                amount_minor: amount.minor(),
            })
        })
        .collect()
}

/// Sum of payments; must cover `total_minor`.
pub fn check_payment_total(total_minor: i64, payments: &[PaymentDraft]) -> CoreResult<i64> {
    let paid = payments
        .iter()
        .try_fold(0i64, |acc, p| acc.checked_add(p.amount_minor))
        .ok_or_else(|| CoreError::InvalidPaymentAmount {
            reason: "payment total is out of range".to_string(),
        })?;
    if paid < total_minor {
        return Err(CoreError::InsufficientPayment {
            total_minor,
            paid_minor: paid,
        });
    }
    Ok(paid)
}

/// `sha256(checkoutKey + ":" + productId)` as lowercase hex.
///
/// Replaying a checkout reproduces the same movement keys, so the ledger's
/// per-business uniqueness deduplicates them.
pub fn derive_movement_key(checkout_key: &str, product_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(checkout_key.as_bytes());
    hasher.update(b":");
    hasher.update(product_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A SALE movement to write at commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementDraft {
    pub product_id: String,
    pub product_name: String,
    pub requested: Quantity,
    /// Always negative.
    pub quantity_delta: Quantity,
    pub idempotency_key: String,
}

/// Who and when, fixed before the draft is built.
#[derive(Debug, Clone)]
pub struct SaleHeader {
    pub id: String,
    pub business_id: String,
    pub user_id: String,
    pub device_id: Option<String>,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

/// The whole sale tree, ready to commit in one transaction.
#[derive(Debug, Clone)]
pub struct SaleDraft {
    pub header: SaleHeader,
    pub lines: Vec<LineDraft>,
    pub payments: Vec<PaymentDraft>,
    pub discounts: Vec<DiscountApplication>,
    pub subtotal_minor: i64,
    pub discount_total_minor: i64,
    pub tax_total_minor: i64,
    pub total_minor: i64,
    pub movements: Vec<MovementDraft>,
}

impl SaleDraft {
    /// Runs the aggregate stock check, discounts and payments over priced
    /// lines and derives the movement drafts.
    ///
    /// `discounts` must already be resolved, deduplicated and live.
    pub fn build(
        header: SaleHeader,
        lines: Vec<LineDraft>,
        discounts: &[Discount],
        payments: &[PaymentInput],
    ) -> CoreResult<SaleDraft> {
        let requirements = aggregate_requested(&lines)?;
        check_stock(&requirements)?;

        let subtotal_minor = lines
            .iter()
            .try_fold(0i64, |acc, l| acc.checked_add(l.line_total_minor))
            .ok_or_else(|| CoreError::InvalidPrice {
                reason: "subtotal is out of range".to_string(),
            })?;

        let line_totals: Vec<(String, i64)> = lines
            .iter()
            .map(|l| (l.product_id.clone(), l.line_total_minor))
            .collect();
        let outcome = apply_discounts(subtotal_minor, &line_totals, discounts)?;

        let tax_total_minor = 0;
        let total_minor = outcome.net_before_tax_minor + tax_total_minor;

        let payments = resolve_payments(payments)?;
        check_payment_total(total_minor, &payments)?;

        let movements = requirements
            .into_iter()
            .filter(|r| r.track_inventory && r.requested.is_positive())
            .map(|r| MovementDraft {
                idempotency_key: derive_movement_key(&header.idempotency_key, &r.product_id),
                quantity_delta: -r.requested,
                product_id: r.product_id,
                product_name: r.product_name,
                requested: r.requested,
            })
            .collect();

        Ok(SaleDraft {
            header,
            lines,
            payments,
            discounts: outcome.applications,
            subtotal_minor,
            discount_total_minor: outcome.discount_total_minor,
            tax_total_minor,
            total_minor,
            movements,
        })
    }
}

// =============================================================================
// Result
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LineModifierView {
    pub modifier_option_id: String,
    pub modifier_group_id: String,
    pub option_name: String,
    pub group_name: String,
    pub price_delta_minor: String,
    pub price_delta: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LineItemView {
    pub id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: String,
    pub quantity_legacy_int: i64,
    pub base_unit_price_minor: String,
    pub unit_price_minor: String,
    pub unit_price: String,
    pub total_modifiers_delta_minor: String,
    pub line_total_minor: String,
    pub line_total: String,
    pub selected_modifier_option_ids: Vec<String>,
    pub selected_attributes: Vec<AttributeSnapshot>,
    pub modifiers: Vec<LineModifierView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub id: String,
    pub method: PaymentMethod,
    pub amount_minor: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DiscountView {
    pub id: String,
    pub discount_id: Option<String>,
    pub scope: DiscountScope,
    pub name: String,
    #[serde(rename = "type")]
    pub discount_type: DiscountType,
    /// Basis points for PERCENT, minor units for FIXED.
    pub value_minor: String,
    pub amount_applied_minor: String,
    pub amount_applied: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleView {
    pub id: String,
    pub idempotency_key: String,
    pub status: SaleStatus,
    pub device_id: Option<String>,
    pub subtotal_minor: String,
    pub subtotal: String,
    pub discount_total_minor: String,
    pub discount_total: String,
    pub tax_total_minor: String,
    pub tax_total: String,
    pub total_minor: String,
    pub total: String,
    pub created_at: String,
    pub line_items: Vec<LineItemView>,
    pub payments: Vec<PaymentView>,
    pub discounts: Vec<DiscountView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptView {
    pub paid_total_minor: String,
    pub paid_total: String,
    pub change_due_minor: String,
    pub change_due: String,
    pub item_count: i64,
}

/// What checkout returns, first call and replays alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResult {
    pub sale: SaleView,
    pub movements: Vec<MovementView>,
    pub receipt: ReceiptView,
}

impl CheckoutResult {
    /// Shapes a committed sale read back from storage.
    pub fn from_record(record: &SaleWithDetails) -> CheckoutResult {
        let sale = &record.sale;

        let line_items = record
            .lines
            .iter()
            .map(|entry| {
                let l = &entry.line;
                LineItemView {
                    id: l.id.clone(),
                    product_id: l.product_id.clone(),
                    product_name: l.product_name.clone(),
                    quantity: Quantity::from_scaled(l.quantity_scaled).to_string(),
                    quantity_legacy_int: l.quantity_legacy_int,
                    base_unit_price_minor: l.base_unit_price_minor.to_string(),
                    unit_price_minor: l.unit_price_minor.to_string(),
                    unit_price: minor_units_to_decimal_string(l.unit_price_minor),
                    total_modifiers_delta_minor: l.total_modifiers_delta_minor.to_string(),
                    line_total_minor: l.line_total_minor.to_string(),
                    line_total: minor_units_to_decimal_string(l.line_total_minor),
                    selected_modifier_option_ids: entry.selected_modifier_option_ids.clone(),
                    selected_attributes: entry.selected_attributes.clone(),
                    modifiers: entry
                        .modifiers
                        .iter()
                        .map(|m| LineModifierView {
                            modifier_option_id: m.modifier_option_id.clone(),
                            modifier_group_id: m.modifier_group_id.clone(),
                            option_name: m.option_name.clone(),
                            group_name: m.group_name.clone(),
                            price_delta_minor: m.price_delta_minor.to_string(),
                            price_delta: minor_units_to_decimal_string(m.price_delta_minor),
                        })
                        .collect(),
                }
            })
            .collect();

        let payments: Vec<PaymentView> = record
            .payments
            .iter()
            .map(|p| PaymentView {
                id: p.id.clone(),
                method: p.method,
                amount_minor: p.amount_minor.to_string(),
                amount: minor_units_to_decimal_string(p.amount_minor),
            })
            .collect();

        let discounts = record
            .discounts
            .iter()
            .map(|d| DiscountView {
                id: d.id.clone(),
                discount_id: d.discount_id.clone(),
                scope: d.scope,
                name: d.name_snapshot.clone(),
                discount_type: d.type_snapshot,
                value_minor: d.value_snapshot_minor.to_string(),
                amount_applied_minor: d.amount_applied_minor.to_string(),
                amount_applied: minor_units_to_decimal_string(d.amount_applied_minor),
            })
            .collect();

        let paid: i64 = record.payments.iter().map(|p| p.amount_minor).sum();
        let change_due = (paid - sale.total_minor).max(0);

        CheckoutResult {
            sale: SaleView {
                id: sale.id.clone(),
                idempotency_key: sale.idempotency_key.clone(),
                status: sale.status,
                device_id: sale.device_id.clone(),
                subtotal_minor: sale.subtotal_minor.to_string(),
                subtotal: minor_units_to_decimal_string(sale.subtotal_minor),
                discount_total_minor: sale.discount_total_minor.to_string(),
                discount_total: minor_units_to_decimal_string(sale.discount_total_minor),
                tax_total_minor: sale.tax_total_minor.to_string(),
                tax_total: minor_units_to_decimal_string(sale.tax_total_minor),
                total_minor: sale.total_minor.to_string(),
                total: minor_units_to_decimal_string(sale.total_minor),
                created_at: format_timestamp(&sale.created_at),
                line_items,
                payments,
                discounts,
            },
            movements: record.movements.iter().map(MovementView::from).collect(),
            receipt: ReceiptView {
                paid_total_minor: paid.to_string(),
                paid_total: minor_units_to_decimal_string(paid),
                change_due_minor: change_due.to_string(),
                change_due: minor_units_to_decimal_string(change_due),
                item_count: record.lines.len() as i64,
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::modifiers::ModifierOptionState;

    fn product(id: &str, on_hand_units: i64, scale: i64) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            business_id: "b1".to_string(),
            name: format!("Product {id}"),
            sku: None,
            unit_id: None,
            precision_scale: scale,
            price_minor: Some(500),
            track_inventory: true,
            on_hand_cached: on_hand_units * 100_000,
            reorder_point: None,
            reorder_quantity: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn line(product_id: &str, qty: &str, price_minor: Option<&str>) -> CartLineInput {
        CartLineInput {
            product_id: product_id.to_string(),
            quantity: qty.to_string(),
            unit_price_minor: price_minor.map(str::to_string),
            ..Default::default()
        }
    }

    fn header(key: &str) -> SaleHeader {
        SaleHeader {
            id: "s1".to_string(),
            business_id: "b1".to_string(),
            user_id: "u1".to_string(),
            device_id: None,
            idempotency_key: key.to_string(),
            created_at: Utc::now(),
        }
    }

    fn cash(amount_minor: &str) -> PaymentInput {
        PaymentInput {
            method: PaymentMethod::Cash,
            amount_minor: Some(amount_minor.to_string()),
            amount: None,
        }
    }

    fn extras() -> Vec<ModifierGroupState> {
        vec![ModifierGroupState {
            group_id: "g1".to_string(),
            group_name: "Extras".to_string(),
            min_selected: 0,
            max_selected: None,
            options: vec![
                ModifierOptionState {
                    id: "shot".to_string(),
                    group_id: "g1".to_string(),
                    name: "Extra shot".to_string(),
                    price_delta_minor: 100,
                    is_active: true,
                },
                ModifierOptionState {
                    id: "syrup".to_string(),
                    group_id: "g1".to_string(),
                    name: "Syrup".to_string(),
                    price_delta_minor: 50,
                    is_active: true,
                },
            ],
        }]
    }

    #[test]
    fn test_price_line_basic() {
        let p = product("p1", 10, 0);
        let draft = price_line(&p, &line("p1", "3", Some("500")), &[], &[]).unwrap();
        assert_eq!(draft.unit_price_minor, 500);
        assert_eq!(draft.line_total_minor, 1500);
        assert_eq!(draft.quantity_legacy_int, 3);
    }

    #[test]
    fn test_price_line_quantity_scale() {
        let p = product("p1", 10, 2);
        let err = price_line(&p, &line("p1", "1.123", Some("100")), &[], &[]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidQuantityPrecision);
        assert!(price_line(&p, &line("p1", "1.12", Some("100")), &[], &[]).is_ok());
    }

    #[test]
    fn test_price_line_price_sources() {
        let p = product("p1", 10, 0);

        let mut l = line("p1", "1", None);
        assert_eq!(price_line(&p, &l, &[], &[]).unwrap().unit_price_minor, 500);

        l.unit_price = Some("7.25".to_string());
        assert_eq!(price_line(&p, &l, &[], &[]).unwrap().unit_price_minor, 725);

        l.unit_price = Some("-1.00".to_string());
        let err = price_line(&p, &l, &[], &[]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPrice);

        l.unit_price = Some("7.25".to_string());
        l.unit_price_minor = Some("700".to_string());
        let err = price_line(&p, &l, &[], &[]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPrice);

        let mut no_default = product("p2", 1, 0);
        no_default.price_minor = None;
        let err = price_line(&no_default, &line("p2", "1", None), &[], &[]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPrice);
    }

    #[test]
    fn test_inactive_product_rejected() {
        let mut p = product("p1", 10, 0);
        p.is_active = false;
        let err = price_line(&p, &line("p1", "1", Some("1")), &[], &[]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProductInactive);
    }

    #[test]
    fn test_modifier_mismatch_rejected() {
        let p = product("p1", 10, 0);
        let mut l = line("p1", "1", Some("500"));
        l.selected_modifier_option_ids = vec!["shot".to_string(), "syrup".to_string()];
        l.total_modifiers_delta_minor = Some("100".to_string());
        let err = price_line(&p, &l, &[], &extras()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ModifierTotalMismatch);

        l.total_modifiers_delta_minor = Some("150".to_string());
        let draft = price_line(&p, &l, &[], &extras()).unwrap();
        assert_eq!(draft.unit_price_minor, 650);
        assert_eq!(draft.modifiers.len(), 2);
    }

    #[test]
    fn test_line_total_rounds_once() {
        let p = product("p1", 10, 3);
        // 999 × 0.335 = 334.665 → 335
        let draft = price_line(&p, &line("p1", "0.335", Some("999")), &[], &[]).unwrap();
        assert_eq!(draft.line_total_minor, 335);
        assert_eq!(draft.quantity_legacy_int, 0);
    }

    #[test]
    fn test_aggregate_stock_across_lines() {
        let p = product("p1", 4, 0);
        let lines = vec![
            price_line(&p, &line("p1", "3", Some("100")), &[], &[]).unwrap(),
            price_line(&p, &line("p1", "2", Some("100")), &[], &[]).unwrap(),
        ];
        let reqs = aggregate_requested(&lines).unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].requested.to_string(), "5");

        let err = check_stock(&reqs).unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfStock);
        let details = err.details().unwrap();
        assert_eq!(details["shortfall"], "1");
        assert_eq!(details["onHandCached"], "4");
    }

    #[test]
    fn test_untracked_products_skip_stock_check() {
        let mut p = product("p1", 0, 0);
        p.track_inventory = false;
        let lines = vec![price_line(&p, &line("p1", "3", Some("100")), &[], &[]).unwrap()];
        let draft = SaleDraft::build(header("k"), lines, &[], &[cash("300")]).unwrap();
        assert!(draft.movements.is_empty());
    }

    #[test]
    fn test_build_end_to_end() {
        let p = product("p1", 10, 0);
        let lines = vec![price_line(&p, &line("p1", "3", Some("500")), &[], &[]).unwrap()];
        let draft = SaleDraft::build(header("k1"), lines, &[], &[cash("1500")]).unwrap();

        assert_eq!(draft.subtotal_minor, 1500);
        assert_eq!(draft.total_minor, 1500);
        assert_eq!(draft.tax_total_minor, 0);
        assert_eq!(draft.movements.len(), 1);
        assert_eq!(draft.movements[0].quantity_delta.to_string(), "-3");
        assert_eq!(draft.movements[0].idempotency_key, derive_movement_key("k1", "p1"));
    }

    #[test]
    fn test_fixed_discount_clamped_in_draft() {
        let p = product("p1", 10, 0);
        let lines = vec![price_line(&p, &line("p1", "10", Some("500")), &[], &[]).unwrap()];
        let discount = Discount {
            id: "d1".to_string(),
            business_id: "b1".to_string(),
            name: "Big".to_string(),
            discount_type: DiscountType::Fixed,
            scope: DiscountScope::Order,
            value_minor: 10_000,
            product_id: None,
            is_active: true,
            is_archived: false,
        };
        let draft = SaleDraft::build(header("k"), lines, &[discount], &[]).unwrap();
        assert_eq!(draft.discounts[0].amount_applied_minor, 5000);
        assert_eq!(draft.total_minor, 0);
        assert_eq!(draft.discount_total_minor, 5000);
    }

    #[test]
    fn test_payments() {
        let p = product("p1", 10, 0);
        let lines = vec![price_line(&p, &line("p1", "3", Some("500")), &[], &[]).unwrap()];
        let err = SaleDraft::build(header("k"), lines.clone(), &[], &[cash("1499")]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientPayment);
        assert_eq!(err.details().unwrap()["shortfallMinor"], "1");

        let legacy = PaymentInput {
            method: PaymentMethod::Ewallet,
            amount_minor: None,
            amount: Some("-1.00".to_string()),
        };
        let err = SaleDraft::build(header("k"), lines.clone(), &[], &[legacy]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPaymentAmount);

        let split = [cash("1000"), cash("700")];
        let draft = SaleDraft::build(header("k"), lines, &[], &split).unwrap();
        assert_eq!(check_payment_total(draft.total_minor, &draft.payments).unwrap(), 1700);
    }

    #[test]
    fn test_movement_key_is_deterministic() {
        let a = derive_movement_key("k1", "p1");
        assert_eq!(a, derive_movement_key("k1", "p1"));
        assert_ne!(a, derive_movement_key("k1", "p2"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_require_key_and_cart() {
        let mut input = CheckoutInput::default();
        assert_eq!(input.require_key().unwrap_err().code(), ErrorCode::IdempotencyKeyRequired);
        input.idempotency_key = Some("  ".to_string());
        assert_eq!(input.require_key().unwrap_err().code(), ErrorCode::IdempotencyKeyRequired);
        input.idempotency_key = Some(" k1 ".to_string());
        assert_eq!(input.require_key().unwrap(), "k1");

        assert_eq!(input.check_cart().unwrap_err().code(), ErrorCode::CartEmpty);
    }

    #[test]
    fn test_input_accepts_camel_case_json() {
        let input: CheckoutInput = serde_json::from_str(
            r#"{
                "idempotencyKey": "k1",
                "cart": [{"productId": "p1", "quantity": "3", "unitPriceMinor": "500",
                          "selectedAttributes": [{"attributeId": "a", "optionId": "o", "optionName": "ignored"}]}],
                "payments": [{"method": "CASH", "amountMinor": "1500"}]
            }"#,
        )
        .unwrap();
        assert_eq!(input.cart[0].unit_price_minor.as_deref(), Some("500"));
        assert_eq!(input.cart[0].selected_attributes[0].option_id, "o");
        assert_eq!(input.payments[0].method, PaymentMethod::Cash);
        assert!(input.discounts.is_empty());
    }
}
