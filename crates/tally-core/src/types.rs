//! # Domain Types
//!
//! Read models and closed enums shared by every layer of Tally.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Catalog (read live per request)      Ledger / Sales (write-once)       │
//! │  ─────────────────────────────────    ─────────────────────────────     │
//! │  Unit        precision_scale 0-5      InventoryMovement                 │
//! │  Product     on_hand_cached (scaled)  SaleRecord                        │
//! │  Device      is_active                 ├── SaleLineItemRecord           │
//! │  Store       is_active                 │    └── SaleLineModifierRecord  │
//! │  Discount    PERCENT | FIXED           ├── SalePaymentRecord            │
//! │                                        └── SaleDiscountRecord           │
//! │                                                                         │
//! │  Enums: SaleStatus, PaymentMethod, MovementReason, DiscountType,        │
//! │         DiscountScope, SelectionType                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scaled columns
//! Quantities (`on_hand_cached`, `reorder_point`, `quantity_delta`, ...) are
//! stored as integers scaled by 10^5. Wrap them with
//! [`Quantity::from_scaled`] before doing anything else.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::attributes::AttributeSnapshot;
use ts_rs::TS;

use crate::money::Money;
use crate::quantity::{Quantity, QUANTITY_SCALE};

/// Canonical timestamp text: RFC 3339, UTC, microseconds, `Z` suffix.
///
/// Fixed width, so string order equals chronological order. Every timestamp
/// written to the database goes through this function.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// =============================================================================
// Enums
// =============================================================================

/// The status of a sale. Sales are only ever written once checkout succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    Completed,
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Completed
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Ewallet,
    BankTransfer,
    Other,
}

/// Why stock moved.
///
/// The sign of a movement is derived from this in
/// [`crate::inventory::normalize_delta`].
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementReason {
    /// Decrement written by checkout.
    Sale,
    /// Goods received.
    StockIn,
    /// Goods removed (damage, loss, transfer out).
    StockOut,
    /// Manual correction; sign as supplied.
    Adjustment,
}

impl MovementReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementReason::Sale => "SALE",
            MovementReason::StockIn => "STOCK_IN",
            MovementReason::StockOut => "STOCK_OUT",
            MovementReason::Adjustment => "ADJUSTMENT",
        }
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    /// `value_minor` holds basis points (0-10000).
    Percent,
    /// `value_minor` holds minor currency units.
    Fixed,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountScope {
    Order,
    Product,
}

/// How many options of one attribute may be picked.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionType {
    Single,
    Multi,
}

// =============================================================================
// Catalog
// =============================================================================

/// A unit of measure. `precision_scale` is the number of decimal places a
/// quantity in this unit may carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Unit {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub precision_scale: i64,
}

/// A product as seen by checkout and the ledger.
///
/// `precision_scale` is joined in from the product's unit (0 when the product
/// has no unit).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub sku: Option<String>,
    pub unit_id: Option<String>,
    pub precision_scale: i64,
    /// Default price; used when a cart line carries no price.
    pub price_minor: Option<i64>,
    pub track_inventory: bool,
    /// Running total of movement deltas, scaled by 10^5.
    pub on_hand_cached: i64,
    pub reorder_point: Option<i64>,
    pub reorder_quantity: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn on_hand(&self) -> Quantity {
        Quantity::from_scaled(self.on_hand_cached)
    }

    /// Decimal places allowed for quantities of this product.
    pub fn quantity_scale(&self) -> u32 {
        self.precision_scale.clamp(0, QUANTITY_SCALE as i64) as u32
    }

    #[inline]
    pub fn price(&self) -> Option<Money> {
        self.price_minor.map(Money::from_minor)
    }

    pub fn reorder_point(&self) -> Option<Quantity> {
        self.reorder_point.map(Quantity::from_scaled)
    }

    pub fn reorder_quantity(&self) -> Option<Quantity> {
        self.reorder_quantity.map(Quantity::from_scaled)
    }
}

/// A registered POS terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Device {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Store {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A live discount definition. Sales keep a snapshot, so this row may change
/// freely after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Discount {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub discount_type: DiscountType,
    pub scope: DiscountScope,
    /// Basis points for PERCENT, minor units for FIXED.
    pub value_minor: i64,
    /// Target product for PRODUCT scope.
    pub product_id: Option<String>,
    pub is_active: bool,
    pub is_archived: bool,
}

// =============================================================================
// Ledger
// =============================================================================

/// One append-only ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryMovement {
    pub id: String,
    pub business_id: String,
    pub product_id: String,
    pub store_id: Option<String>,
    /// Signed, scaled by 10^5.
    pub quantity_delta: i64,
    pub reason: MovementReason,
    pub idempotency_key: String,
    pub related_sale_id: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Counter value left by the transaction that wrote this row.
    pub on_hand_after: Option<i64>,
}

impl InventoryMovement {
    #[inline]
    pub fn delta(&self) -> Quantity {
        Quantity::from_scaled(self.quantity_delta)
    }

    #[inline]
    pub fn on_hand_after(&self) -> Option<Quantity> {
        self.on_hand_after.map(Quantity::from_scaled)
    }
}

// =============================================================================
// Sales
// =============================================================================

/// Header row of a committed sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleRecord {
    pub id: String,
    pub business_id: String,
    pub idempotency_key: String,
    pub status: SaleStatus,
    pub user_id: String,
    pub device_id: Option<String>,
    pub subtotal_minor: i64,
    pub discount_total_minor: i64,
    pub tax_total_minor: i64,
    pub total_minor: i64,
    pub created_at: DateTime<Utc>,
}

/// A line item as stored. The two selection columns hold JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleLineItemRecord {
    pub id: String,
    pub sale_id: String,
    pub position: i64,
    pub product_id: String,
    pub product_name: String,
    pub quantity_scaled: i64,
    pub quantity_legacy_int: i64,
    pub base_unit_price_minor: i64,
    pub unit_price_minor: i64,
    pub total_modifiers_delta_minor: i64,
    pub line_total_minor: i64,
    pub selected_modifier_option_ids: String,
    pub selected_attributes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleLineModifierRecord {
    pub id: String,
    pub line_item_id: String,
    pub modifier_option_id: String,
    pub modifier_group_id: String,
    pub option_name: String,
    pub group_name: String,
    pub price_delta_minor: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SalePaymentRecord {
    pub id: String,
    pub sale_id: String,
    pub position: i64,
    pub method: PaymentMethod,
    pub amount_minor: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleDiscountRecord {
    pub id: String,
    pub sale_id: String,
    pub position: i64,
    pub discount_id: Option<String>,
    pub scope: DiscountScope,
    pub name_snapshot: String,
    pub type_snapshot: DiscountType,
    pub value_snapshot_minor: i64,
    pub amount_applied_minor: i64,
}

/// A line item with its modifier rows and its decoded selection columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleLineWithModifiers {
    pub line: SaleLineItemRecord,
    pub selected_modifier_option_ids: Vec<String>,
    pub selected_attributes: Vec<AttributeSnapshot>,
    pub modifiers: Vec<SaleLineModifierRecord>,
}

/// Everything written by one checkout, read back in position order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleWithDetails {
    pub sale: SaleRecord,
    pub lines: Vec<SaleLineWithModifiers>,
    pub payments: Vec<SalePaymentRecord>,
    pub discounts: Vec<SaleDiscountRecord>,
    pub movements: Vec<InventoryMovement>,
}

// =============================================================================
// Unit Tests
// =============================================================================
