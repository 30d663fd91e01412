//! # Inventory Ledger Logic
//!
//! The pure half of the ledger: input shapes, sign normalization, key
//! resolution, low-stock/reorder math and the wire views. Storage and the
//! conditional counter update live in `tally-db`.
//!
//! ## Movement sign
//! ```text
//! ┌──────────────┬──────────────────────────────┐
//! │  reason      │  delta written to the ledger │
//! ├──────────────┼──────────────────────────────┤
//! │  STOCK_IN    │  +|qty|                      │
//! │  STOCK_OUT   │  -|qty|                      │
//! │  ADJUSTMENT  │  qty as sent                 │
//! │  SALE        │  qty as sent                 │
//! └──────────────┴──────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::quantity::Quantity;
use crate::types::{format_timestamp, InventoryMovement, MovementReason, Product};
use crate::validation::validate_idempotency_key;

// =============================================================================
// Adjustment
// =============================================================================

/// Body of a stock adjustment request.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AdjustStockInput {
    pub product_id: String,
    pub store_id: Option<String>,
    /// Decimal string; validated against the product unit's scale.
    pub quantity_delta: String,
    pub reason: MovementReason,
    pub idempotency_key: Option<String>,
    pub note: Option<String>,
}

/// Result of an adjustment. `applied` is false on an idempotent replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AdjustStockResult {
    pub applied: bool,
    pub movement_id: String,
    pub on_hand_cached: String,
    pub created_at: String,
}

/// Applies the reason's sign rule to a parsed quantity.
pub fn normalize_delta(reason: MovementReason, quantity: Quantity) -> Quantity {
    match reason {
        MovementReason::StockIn => quantity.abs(),
        MovementReason::StockOut => -quantity.abs(),
        MovementReason::Adjustment | MovementReason::Sale => quantity,
    }
}

/// Parses and normalizes an adjustment quantity. Zero is rejected.
pub fn parse_adjustment_delta(
    reason: MovementReason,
    raw: &str,
    max_scale: u32,
) -> CoreResult<Quantity> {
    let quantity = Quantity::parse(raw, max_scale)?;
    if quantity.is_zero() {
        return Err(CoreError::InvalidQuantity {
            value: raw.to_string(),
            reason: "must not be zero".to_string(),
        });
    }
    Ok(normalize_delta(reason, quantity))
}

/// Picks the adjustment's idempotency key: the body field wins, then the
/// `Idempotency-Key` header.
pub fn resolve_adjustment_key(body: Option<&str>, header: Option<&str>) -> CoreResult<String> {
    let candidate = [body, header]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|k| !k.is_empty())
        .ok_or(CoreError::IdempotencyKeyRequired)?;
    Ok(validate_idempotency_key(candidate)?.to_string())
}

// =============================================================================
// Low stock / reorder
// =============================================================================

/// True when a tracked product is at or below its reorder point.
pub fn is_low_stock(product: &Product) -> bool {
    match product.reorder_point() {
        Some(point) => product.track_inventory && product.on_hand() <= point,
        None => false,
    }
}

/// How much to order for a low-stock product.
///
/// The configured reorder quantity if set, otherwise enough to get back to
/// the reorder point; never less than the reorder point itself when that
/// gap is not positive.
pub fn suggest_reorder_quantity(product: &Product) -> Option<Quantity> {
    if !is_low_stock(product) {
        return None;
    }
    let point = product.reorder_point()?;
    if let Some(qty) = product.reorder_quantity().filter(|q| q.is_positive()) {
        return Some(qty);
    }
    let gap = point.checked_sub(product.on_hand())?;
    Some(if gap.is_positive() { gap } else { point })
}

// =============================================================================
// Views
// =============================================================================

/// Wire view of a ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MovementView {
    pub id: String,
    pub product_id: String,
    pub store_id: Option<String>,
    pub quantity_delta: String,
    pub reason: MovementReason,
    pub idempotency_key: String,
    pub related_sale_id: Option<String>,
    pub note: Option<String>,
    pub created_at: String,
}

impl From<&InventoryMovement> for MovementView {
    fn from(m: &InventoryMovement) -> Self {
        MovementView {
            id: m.id.clone(),
            product_id: m.product_id.clone(),
            store_id: m.store_id.clone(),
            quantity_delta: m.delta().to_string(),
            reason: m.reason,
            idempotency_key: m.idempotency_key.clone(),
            related_sale_id: m.related_sale_id.clone(),
            note: m.note.clone(),
            created_at: format_timestamp(&m.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MovementsPage {
    pub items: Vec<MovementView>,
    pub next_cursor: Option<String>,
}

/// Stock summary of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockLevelView {
    pub product_id: String,
    pub name: String,
    pub sku: Option<String>,
    pub track_inventory: bool,
    pub on_hand_cached: String,
    pub reorder_point: Option<String>,
    pub reorder_quantity: Option<String>,
    pub precision_scale: i64,
    pub updated_at: String,
}

impl From<&Product> for StockLevelView {
    fn from(p: &Product) -> Self {
        StockLevelView {
            product_id: p.id.clone(),
            name: p.name.clone(),
            sku: p.sku.clone(),
            track_inventory: p.track_inventory,
            on_hand_cached: p.on_hand().to_string(),
            reorder_point: p.reorder_point().map(|q| q.to_string()),
            reorder_quantity: p.reorder_quantity().map(|q| q.to_string()),
            precision_scale: p.precision_scale,
            updated_at: format_timestamp(&p.updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReorderSuggestion {
    #[serde(flatten)]
    pub product: StockLevelView,
    pub suggested_quantity: String,
}

/// Product detail with its most recent movements.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct InventoryProductDetail {
    pub product: StockLevelView,
    pub is_low_stock: bool,
    pub recent_movements: Vec<MovementView>,
}

/// Latest change across products and movements, for offline change
/// detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Watermark {
    pub products_updated_at: Option<String>,
    pub movements_created_at: Option<String>,
    pub watermark: Option<String>,
}

impl Watermark {
    pub fn new(products: Option<DateTime<Utc>>, movements: Option<DateTime<Utc>>) -> Self {
        let latest = products.into_iter().chain(movements).max();
        Watermark {
            products_updated_at: products.as_ref().map(format_timestamp),
            movements_created_at: movements.as_ref().map(format_timestamp),
            watermark: latest.as_ref().map(format_timestamp),
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
    use chrono::TimeZone;

    fn product(on_hand: &str, point: Option<&str>, qty: Option<&str>) -> Product {
        let now = Utc::now();
        let scaled = |s: &str| Quantity::parse(s, 5).unwrap().scaled();
        Product {
            id: "p1".into(),
            business_id: "b1".into(),
            name: "Beans".into(),
            sku: Some("BEANS".into()),
            unit_id: None,
            precision_scale: 2,
            price_minor: Some(900),
            track_inventory: true,
            on_hand_cached: scaled(on_hand),
            reorder_point: point.map(scaled),
            reorder_quantity: qty.map(scaled),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_normalize_delta_by_reason() {
        let three = Quantity::from_units(3).unwrap();
        assert_eq!(normalize_delta(MovementReason::StockIn, -three), three);
        assert_eq!(normalize_delta(MovementReason::StockOut, three), -three);
        assert_eq!(normalize_delta(MovementReason::Adjustment, -three), -three);
        assert_eq!(normalize_delta(MovementReason::Sale, -three), -three);
    }

    #[test]
    fn test_parse_adjustment_delta() {
        let q = parse_adjustment_delta(MovementReason::StockOut, "1.25", 2).unwrap();
        assert_eq!(q.to_string(), "-1.25");

        let err = parse_adjustment_delta(MovementReason::StockIn, "1.125", 2).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidQuantityPrecision);

        let err = parse_adjustment_delta(MovementReason::Adjustment, "0", 2).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidQuantity);

        let err =
            parse_adjustment_delta(MovementReason::StockIn, "-92233720368547.75808", 5).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidQuantity);
    }

    #[test]
    fn test_resolve_adjustment_key() {
        assert_eq!(resolve_adjustment_key(Some("body"), Some("hdr")).unwrap(), "body");
        assert_eq!(resolve_adjustment_key(Some("  "), Some(" hdr ")).unwrap(), "hdr");
        assert_eq!(resolve_adjustment_key(None, Some("hdr")).unwrap(), "hdr");
        let err = resolve_adjustment_key(None, None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::IdempotencyKeyRequired);
    }

    #[test]
    fn test_low_stock_and_reorder() {
        assert!(!is_low_stock(&product("5", None, None)));
        assert!(!is_low_stock(&product("5", Some("4"), None)));
        assert!(is_low_stock(&product("4", Some("4"), None)));

        let p = product("1", Some("4"), Some("12"));
        assert_eq!(suggest_reorder_quantity(&p).unwrap().to_string(), "12");

        let p = product("1.5", Some("4"), None);
        assert_eq!(suggest_reorder_quantity(&p).unwrap().to_string(), "2.5");

        let p = product("0", Some("0"), None);
        assert_eq!(suggest_reorder_quantity(&p).unwrap().to_string(), "0");

        let mut untracked = product("0", Some("4"), None);
        untracked.track_inventory = false;
        assert!(suggest_reorder_quantity(&untracked).is_none());
    }

    #[test]
    fn test_watermark_takes_latest() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let w = Watermark::new(Some(a), Some(b));
        assert_eq!(w.watermark.as_deref(), Some("2024-02-01T00:00:00.000000Z"));

        let empty = Watermark::new(None, None);
        assert!(empty.watermark.is_none());
    }
}
